//! Dynamic values relayed between endpoints
//!
//! Every property read produces a [`Value`] and every write consumes one.
//! [`ValueType`] describes what a property can hold and drives the
//! best-effort coercion applied before a write, including the null rules:
//! null becomes the type's default for value types and empty text for text.
//! Rust field types convert to and from `Value` through [`BindValue`].

use std::fmt;
use std::rc::Rc;

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::collection::ObservableList;
use crate::error::{BindError, Result};
use crate::reflect::{ObjectRef, TypeKey};

/// RGBA color with channels in `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const CLEAR: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    /// Create a color from channel values
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `#RRGGBB` or `#RRGGBBAA` (leading `#` optional)
    pub fn parse_hex(s: &str) -> Option<Self> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 && hex.len() != 8 {
            return None;
        }
        let channel = |i: usize| {
            u8::from_str_radix(hex.get(i..i + 2)?, 16)
                .ok()
                .map(|v| f32::from(v) / 255.0)
        };
        let a = if hex.len() == 8 { channel(6)? } else { 1.0 };
        Some(Self::rgba(channel(0)?, channel(2)?, channel(4)?, a))
    }

    /// Format as `#RRGGBBAA`
    pub fn to_hex(&self) -> String {
        let byte = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!(
            "#{:02X}{:02X}{:02X}{:02X}",
            byte(self.r),
            byte(self.g),
            byte(self.b),
            byte(self.a)
        )
    }
}

/// A value read from or written to an endpoint
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Color(Color),
    DateTime(NaiveDateTime),
    Duration(TimeDelta),
    List(Vec<Value>),
    Collection(ObservableList),
    Object(ObjectRef),
    Error(Rc<BindError>),
}

impl Value {
    /// Name of the variant, used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Color(_) => "color",
            Value::DateTime(_) => "date-time",
            Value::Duration(_) => "duration",
            Value::List(_) => "list",
            Value::Collection(_) => "collection",
            Value::Object(_) => "object",
            Value::Error(_) => "error",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Runtime type used for template selection; `None` for null
    pub fn type_key(&self) -> Option<TypeKey> {
        Some(match self {
            Value::Null => return None,
            Value::Bool(_) => TypeKey::of::<bool>(),
            Value::Int(_) => TypeKey::of::<i64>(),
            Value::Float(_) => TypeKey::of::<f64>(),
            Value::Text(_) => TypeKey::of::<String>(),
            Value::Color(_) => TypeKey::of::<Color>(),
            Value::DateTime(_) => TypeKey::of::<NaiveDateTime>(),
            Value::Duration(_) => TypeKey::of::<TimeDelta>(),
            Value::List(_) => TypeKey::of::<Vec<Value>>(),
            Value::Collection(_) => TypeKey::of::<ObservableList>(),
            Value::Object(obj) => obj.type_key(),
            Value::Error(_) => TypeKey::of::<BindError>(),
        })
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float view of a numeric value (ints widen)
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&ObservableList> {
        match self {
            Value::Collection(list) => Some(list),
            _ => None,
        }
    }
}

/// Reference-like variants compare by identity, everything else by value
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Color(a), Value::Color(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Duration(a), Value::Duration(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Collection(a), Value::Collection(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Error(a), Value::Error(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
            Value::Color(c) => f.write_str(&c.to_hex()),
            Value::DateTime(dt) => write!(f, "{}", dt.format(DATE_TIME_FORMAT)),
            Value::Duration(d) => f.write_str(&format_duration(*d)),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Collection(list) => write!(f, "[{} items]", list.len()),
            Value::Object(obj) => f.write_str(obj.type_key().name()),
            Value::Error(err) => write!(f, "{err}"),
        }
    }
}

/// Default text format for date-times
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a duration as `[-]H:MM:SS[.mmm]`
pub fn format_duration(d: TimeDelta) -> String {
    let sign = if d < TimeDelta::zero() { "-" } else { "" };
    let d = d.abs();
    let secs = d.num_seconds();
    let millis = d.subsec_nanos() / 1_000_000;
    let base = format!("{sign}{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60);
    if millis > 0 {
        format!("{base}.{millis:03}")
    } else {
        base
    }
}

/// Declared type of a property, adapter input or adapter output
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Accepts anything unchanged
    Any,
    Bool,
    Int,
    Float,
    Text,
    Color,
    DateTime,
    Duration,
    List,
    Collection,
    Object,
    Error,
    /// Value type that may also hold null
    Nullable(Box<ValueType>),
}

impl ValueType {
    /// Wrap in `Nullable`
    pub fn nullable(inner: ValueType) -> Self {
        ValueType::Nullable(Box::new(inner))
    }

    /// Whether null can be stored as-is
    pub fn is_nullable(&self) -> bool {
        matches!(
            self,
            ValueType::Any
                | ValueType::Nullable(_)
                | ValueType::Object
                | ValueType::Collection
                | ValueType::Error
        )
    }

    /// The value a null write is replaced with
    pub fn null_value(&self) -> Value {
        match self {
            ValueType::Bool => Value::Bool(false),
            ValueType::Int => Value::Int(0),
            ValueType::Float => Value::Float(0.0),
            ValueType::Text => Value::Text(String::new()),
            ValueType::Color => Value::Color(Color::default()),
            ValueType::DateTime => Value::DateTime(NaiveDateTime::default()),
            ValueType::Duration => Value::Duration(TimeDelta::zero()),
            ValueType::List => Value::List(Vec::new()),
            _ => Value::Null,
        }
    }

    /// Whether `value` already has this type
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ValueType::Any, _)
                | (ValueType::Bool, Value::Bool(_))
                | (ValueType::Int, Value::Int(_))
                | (ValueType::Float, Value::Float(_))
                | (ValueType::Text, Value::Text(_))
                | (ValueType::Color, Value::Color(_))
                | (ValueType::DateTime, Value::DateTime(_))
                | (ValueType::Duration, Value::Duration(_))
                | (ValueType::List, Value::List(_))
                | (ValueType::Collection, Value::Collection(_))
                | (ValueType::Object, Value::Object(_))
                | (ValueType::Error, Value::Error(_))
        ) || matches!((self, value), (ValueType::Nullable(inner), v) if v.is_null() || inner.accepts(v))
    }

    /// Best-effort conversion of `value` to this type
    ///
    /// Null follows the null rules, numerics widen, scalars format to text and
    /// text parses back to scalars. Anything else is a conversion error.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        if let ValueType::Nullable(inner) = self {
            return if value.is_null() {
                Ok(Value::Null)
            } else {
                inner.coerce(value)
            };
        }
        if value.is_null() {
            return Ok(self.null_value());
        }
        if self.accepts(&value) {
            return Ok(value);
        }
        let found = value.type_name();
        let converted = match (self, value) {
            (ValueType::Float, Value::Int(i)) => Some(Value::Float(i as f64)),
            (ValueType::Int, Value::Float(f))
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 =>
            {
                Some(Value::Int(f as i64))
            }
            (ValueType::Int, Value::Bool(b)) => Some(Value::Int(i64::from(b))),
            (
                ValueType::Text,
                v @ (Value::Bool(_)
                | Value::Int(_)
                | Value::Float(_)
                | Value::Color(_)
                | Value::DateTime(_)
                | Value::Duration(_)),
            ) => Some(Value::Text(v.to_string())),
            (ValueType::Bool, Value::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            (ValueType::Int, Value::Text(s)) => s.trim().parse().ok().map(Value::Int),
            (ValueType::Float, Value::Text(s)) => s.trim().parse().ok().map(Value::Float),
            (ValueType::Color, Value::Text(s)) => Color::parse_hex(&s).map(Value::Color),
            (ValueType::List, Value::Collection(list)) => Some(Value::List(list.items())),
            _ => None,
        };
        converted.ok_or_else(|| BindError::conversion(self, found))
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Any => f.write_str("any"),
            ValueType::Bool => f.write_str("bool"),
            ValueType::Int => f.write_str("int"),
            ValueType::Float => f.write_str("float"),
            ValueType::Text => f.write_str("text"),
            ValueType::Color => f.write_str("color"),
            ValueType::DateTime => f.write_str("date-time"),
            ValueType::Duration => f.write_str("duration"),
            ValueType::List => f.write_str("list"),
            ValueType::Collection => f.write_str("collection"),
            ValueType::Object => f.write_str("object"),
            ValueType::Error => f.write_str("error"),
            ValueType::Nullable(inner) => write!(f, "{inner}?"),
        }
    }
}

/// Conversion between a Rust field type and [`Value`]
///
/// Implemented for the scalar types a view-model typically exposes. Used by
/// the accessors generated with `#[derive(Bindable)]`.
pub trait BindValue: Sized {
    /// Declared type reported to the registry
    fn value_type() -> ValueType;

    /// Read the field into a value
    fn to_value(&self) -> Value;

    /// Convert a (coerced) value back into the field type
    fn from_value(value: Value) -> Result<Self>;
}

macro_rules! int_bind_value {
    ($($ty:ty),*) => {$(
        impl BindValue for $ty {
            fn value_type() -> ValueType {
                ValueType::Int
            }

            /// Values above `i64::MAX` saturate, with a warning
            fn to_value(&self) -> Value {
                match i64::try_from(*self) {
                    Ok(i) => Value::Int(i),
                    Err(_) => {
                        tracing::warn!(
                            value = %self,
                            ty = stringify!($ty),
                            "Integer out of range for a bound value, saturating"
                        );
                        Value::Int(i64::MAX)
                    }
                }
            }

            fn from_value(value: Value) -> Result<Self> {
                match value {
                    Value::Int(i) => <$ty>::try_from(i)
                        .map_err(|_| BindError::conversion(stringify!($ty), i)),
                    other => Err(BindError::conversion(stringify!($ty), other.type_name())),
                }
            }
        }
    )*};
}

int_bind_value!(i32, i64, u32, u64, usize);

impl BindValue for f64 {
    fn value_type() -> ValueType {
        ValueType::Float
    }

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        value
            .as_float()
            .ok_or_else(|| BindError::conversion("f64", value.type_name()))
    }
}

impl BindValue for f32 {
    fn value_type() -> ValueType {
        ValueType::Float
    }

    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self> {
        value
            .as_float()
            .map(|f| f as f32)
            .ok_or_else(|| BindError::conversion("f32", value.type_name()))
    }
}

macro_rules! variant_bind_value {
    ($ty:ty, $variant:ident, $value_type:ident) => {
        impl BindValue for $ty {
            fn value_type() -> ValueType {
                ValueType::$value_type
            }

            fn to_value(&self) -> Value {
                Value::$variant(self.clone())
            }

            fn from_value(value: Value) -> Result<Self> {
                match value {
                    Value::$variant(v) => Ok(v),
                    other => Err(BindError::conversion(
                        ValueType::$value_type,
                        other.type_name(),
                    )),
                }
            }
        }
    };
}

variant_bind_value!(bool, Bool, Bool);
variant_bind_value!(String, Text, Text);
variant_bind_value!(Color, Color, Color);
variant_bind_value!(NaiveDateTime, DateTime, DateTime);
variant_bind_value!(TimeDelta, Duration, Duration);
variant_bind_value!(ObservableList, Collection, Collection);
variant_bind_value!(ObjectRef, Object, Object);
variant_bind_value!(Rc<BindError>, Error, Error);

impl BindValue for Value {
    fn value_type() -> ValueType {
        ValueType::Any
    }

    fn to_value(&self) -> Value {
        self.clone()
    }

    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl<T: BindValue> BindValue for Option<T> {
    fn value_type() -> ValueType {
        let inner = T::value_type();
        if inner.is_nullable() {
            inner
        } else {
            ValueType::nullable(inner)
        }
    }

    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, T::to_value)
    }

    fn from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl<T: BindValue> BindValue for Vec<T> {
    fn value_type() -> ValueType {
        ValueType::List
    }

    fn to_value(&self) -> Value {
        Value::List(self.iter().map(T::to_value).collect())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(BindError::conversion(ValueType::List, other.type_name())),
        }
    }
}
