//! Built-in adapters registered by [`AdapterRegistry::with_builtins`](super::AdapterRegistry::with_builtins)

use chrono::{DateTime, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

use super::{AdapterDescriptor, AdapterOptions};
use crate::error::{BindError, Result};
use crate::value::{format_duration, Color, Value, ValueType, DATE_TIME_FORMAT};

pub const BOOL_INVERSION: &str = "bool_inversion";
pub const BOOL_TO_STRING: &str = "bool_to_string";
pub const BOOL_TO_COLOR: &str = "bool_to_color";
pub const DATETIME_TO_STRING: &str = "datetime_to_string";
pub const STRING_TO_DATETIME: &str = "string_to_datetime";
pub const DATETIME_TO_FLOAT: &str = "datetime_to_float";
pub const FLOAT_TO_DATETIME: &str = "float_to_datetime";
pub const DURATION_TO_FLOAT: &str = "duration_to_float";
pub const FLOAT_TO_DURATION: &str = "float_to_duration";
pub const DURATION_TO_STRING: &str = "duration_to_string";
pub const FLOAT_TO_STRING: &str = "float_to_string";
pub const STRING_TO_FLOAT: &str = "string_to_float";
pub const INT_TO_STRING: &str = "int_to_string";
pub const STRING_TO_INT: &str = "string_to_int";
pub const STRING_TO_LIST: &str = "string_to_list";
pub const LIST_TO_STRING: &str = "list_to_string";
pub const ERROR_TO_STRING: &str = "error_to_string";

/// Options for `bool_to_string`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoolTextOptions {
    pub true_text: String,
    pub false_text: String,
}

impl BoolTextOptions {
    pub const KIND: &'static str = "bool_text";
}

impl Default for BoolTextOptions {
    fn default() -> Self {
        Self {
            true_text: "True".into(),
            false_text: "False".into(),
        }
    }
}

/// Options for `bool_to_color`; colors are `#RRGGBB[AA]` strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoolColorOptions {
    pub true_color: String,
    pub false_color: String,
}

impl BoolColorOptions {
    pub const KIND: &'static str = "bool_color";
}

impl Default for BoolColorOptions {
    fn default() -> Self {
        Self {
            true_color: Color::WHITE.to_hex(),
            false_color: Color::BLACK.to_hex(),
        }
    }
}

/// Options for the date-time text adapters (`chrono` format string)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateTimeFormatOptions {
    pub format: String,
}

impl DateTimeFormatOptions {
    pub const KIND: &'static str = "date_time_format";
}

impl Default for DateTimeFormatOptions {
    fn default() -> Self {
        Self {
            format: DATE_TIME_FORMAT.into(),
        }
    }
}

/// Options for `float_to_string`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloatFormatOptions {
    /// Fixed number of decimals; shortest round-trip form when unset
    pub decimals: Option<usize>,
}

impl FloatFormatOptions {
    pub const KIND: &'static str = "float_format";
}

/// Options for the list text adapters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListSeparatorOptions {
    pub separator: String,
}

impl ListSeparatorOptions {
    pub const KIND: &'static str = "list_separator";
}

impl Default for ListSeparatorOptions {
    fn default() -> Self {
        Self {
            separator: ",".into(),
        }
    }
}

/// All built-in descriptors
pub fn descriptors() -> Vec<AdapterDescriptor> {
    vec![
        AdapterDescriptor::from_fn(
            BOOL_INVERSION,
            ValueType::Bool,
            ValueType::Bool,
            bool_inversion,
        ),
        AdapterDescriptor::from_fn(BOOL_TO_STRING, ValueType::Bool, ValueType::Text, bool_to_string)
            .with_options(BoolTextOptions::KIND),
        AdapterDescriptor::from_fn(BOOL_TO_COLOR, ValueType::Bool, ValueType::Color, bool_to_color)
            .with_options(BoolColorOptions::KIND),
        AdapterDescriptor::from_fn(
            DATETIME_TO_STRING,
            ValueType::DateTime,
            ValueType::Text,
            datetime_to_string,
        )
        .with_options(DateTimeFormatOptions::KIND),
        AdapterDescriptor::from_fn(
            STRING_TO_DATETIME,
            ValueType::Text,
            ValueType::DateTime,
            string_to_datetime,
        )
        .with_options(DateTimeFormatOptions::KIND),
        AdapterDescriptor::from_fn(
            DATETIME_TO_FLOAT,
            ValueType::DateTime,
            ValueType::Float,
            datetime_to_float,
        ),
        AdapterDescriptor::from_fn(
            FLOAT_TO_DATETIME,
            ValueType::Float,
            ValueType::DateTime,
            float_to_datetime,
        ),
        AdapterDescriptor::from_fn(
            DURATION_TO_FLOAT,
            ValueType::Duration,
            ValueType::Float,
            duration_to_float,
        ),
        AdapterDescriptor::from_fn(
            FLOAT_TO_DURATION,
            ValueType::Float,
            ValueType::Duration,
            float_to_duration,
        ),
        AdapterDescriptor::from_fn(
            DURATION_TO_STRING,
            ValueType::Duration,
            ValueType::Text,
            duration_to_string,
        ),
        AdapterDescriptor::from_fn(
            FLOAT_TO_STRING,
            ValueType::Float,
            ValueType::Text,
            float_to_string,
        )
        .with_options(FloatFormatOptions::KIND),
        AdapterDescriptor::from_fn(
            STRING_TO_FLOAT,
            ValueType::Text,
            ValueType::Float,
            string_to_float,
        ),
        AdapterDescriptor::from_fn(INT_TO_STRING, ValueType::Int, ValueType::Text, int_to_string),
        AdapterDescriptor::from_fn(STRING_TO_INT, ValueType::Text, ValueType::Int, string_to_int),
        AdapterDescriptor::from_fn(STRING_TO_LIST, ValueType::Text, ValueType::List, string_to_list)
            .with_options(ListSeparatorOptions::KIND),
        AdapterDescriptor::from_fn(LIST_TO_STRING, ValueType::List, ValueType::Text, list_to_string)
            .with_options(ListSeparatorOptions::KIND),
        AdapterDescriptor::from_fn(
            ERROR_TO_STRING,
            ValueType::Error,
            ValueType::Text,
            error_to_string,
        ),
    ]
}

fn options_or_default<T>(options: Option<&AdapterOptions>) -> Result<T>
where
    T: Default + serde::de::DeserializeOwned,
{
    options.map_or_else(|| Ok(T::default()), AdapterOptions::parse)
}

fn failure(id: &str, reason: impl ToString) -> BindError {
    BindError::Adapter {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

fn expect_bool(id: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(*b),
        other => Err(failure(id, format!("expected bool, got {}", other.type_name()))),
    }
}

fn expect_float(id: &str, value: &Value) -> Result<f64> {
    value
        .as_float()
        .ok_or_else(|| failure(id, format!("expected float, got {}", value.type_name())))
}

fn expect_text<'a>(id: &str, value: &'a Value) -> Result<&'a str> {
    match value {
        Value::Null => Ok(""),
        Value::Text(s) => Ok(s),
        other => Err(failure(id, format!("expected text, got {}", other.type_name()))),
    }
}

fn bool_inversion(value: Value, _: Option<&AdapterOptions>) -> Result<Value> {
    Ok(Value::Bool(!expect_bool(BOOL_INVERSION, &value)?))
}

fn bool_to_string(value: Value, options: Option<&AdapterOptions>) -> Result<Value> {
    let opts: BoolTextOptions = options_or_default(options)?;
    let text = if expect_bool(BOOL_TO_STRING, &value)? {
        opts.true_text
    } else {
        opts.false_text
    };
    Ok(Value::Text(text))
}

fn bool_to_color(value: Value, options: Option<&AdapterOptions>) -> Result<Value> {
    let opts: BoolColorOptions = options_or_default(options)?;
    let hex = if expect_bool(BOOL_TO_COLOR, &value)? {
        opts.true_color
    } else {
        opts.false_color
    };
    Color::parse_hex(&hex)
        .map(Value::Color)
        .ok_or_else(|| failure(BOOL_TO_COLOR, format!("invalid color `{hex}`")))
}

fn datetime_to_string(value: Value, options: Option<&AdapterOptions>) -> Result<Value> {
    let opts: DateTimeFormatOptions = options_or_default(options)?;
    match value {
        Value::Null => Ok(Value::Text(String::new())),
        Value::DateTime(dt) => Ok(Value::Text(dt.format(&opts.format).to_string())),
        other => Err(failure(
            DATETIME_TO_STRING,
            format!("expected date-time, got {}", other.type_name()),
        )),
    }
}

fn string_to_datetime(value: Value, options: Option<&AdapterOptions>) -> Result<Value> {
    let opts: DateTimeFormatOptions = options_or_default(options)?;
    let text = expect_text(STRING_TO_DATETIME, &value)?;
    NaiveDateTime::parse_from_str(text.trim(), &opts.format)
        .map(Value::DateTime)
        .map_err(|e| failure(STRING_TO_DATETIME, e))
}

/// Seconds since the Unix epoch
fn datetime_to_float(value: Value, _: Option<&AdapterOptions>) -> Result<Value> {
    match value {
        Value::DateTime(dt) => Ok(Value::Float(dt.and_utc().timestamp_millis() as f64 / 1000.0)),
        other => Err(failure(
            DATETIME_TO_FLOAT,
            format!("expected date-time, got {}", other.type_name()),
        )),
    }
}

fn float_to_datetime(value: Value, _: Option<&AdapterOptions>) -> Result<Value> {
    let secs = expect_float(FLOAT_TO_DATETIME, &value)?;
    DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
        .map(|dt| Value::DateTime(dt.naive_utc()))
        .ok_or_else(|| failure(FLOAT_TO_DATETIME, format!("{secs} is out of range")))
}

/// Duration in seconds
fn duration_to_float(value: Value, _: Option<&AdapterOptions>) -> Result<Value> {
    match value {
        Value::Duration(d) => Ok(Value::Float(d.num_milliseconds() as f64 / 1000.0)),
        other => Err(failure(
            DURATION_TO_FLOAT,
            format!("expected duration, got {}", other.type_name()),
        )),
    }
}

fn float_to_duration(value: Value, _: Option<&AdapterOptions>) -> Result<Value> {
    let secs = expect_float(FLOAT_TO_DURATION, &value)?;
    TimeDelta::try_milliseconds((secs * 1000.0).round() as i64)
        .map(Value::Duration)
        .ok_or_else(|| failure(FLOAT_TO_DURATION, format!("{secs} is out of range")))
}

fn duration_to_string(value: Value, _: Option<&AdapterOptions>) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Text(String::new())),
        Value::Duration(d) => Ok(Value::Text(format_duration(d))),
        other => Err(failure(
            DURATION_TO_STRING,
            format!("expected duration, got {}", other.type_name()),
        )),
    }
}

fn float_to_string(value: Value, options: Option<&AdapterOptions>) -> Result<Value> {
    let opts: FloatFormatOptions = options_or_default(options)?;
    let f = expect_float(FLOAT_TO_STRING, &value)?;
    Ok(Value::Text(match opts.decimals {
        Some(decimals) => format!("{f:.decimals$}"),
        None => f.to_string(),
    }))
}

fn string_to_float(value: Value, _: Option<&AdapterOptions>) -> Result<Value> {
    let text = expect_text(STRING_TO_FLOAT, &value)?.trim();
    if text.is_empty() {
        return Ok(Value::Float(0.0));
    }
    text.parse()
        .map(Value::Float)
        .map_err(|e| failure(STRING_TO_FLOAT, format!("`{text}`: {e}")))
}

fn int_to_string(value: Value, _: Option<&AdapterOptions>) -> Result<Value> {
    match value {
        Value::Int(i) => Ok(Value::Text(i.to_string())),
        other => Err(failure(
            INT_TO_STRING,
            format!("expected int, got {}", other.type_name()),
        )),
    }
}

fn string_to_int(value: Value, _: Option<&AdapterOptions>) -> Result<Value> {
    let text = expect_text(STRING_TO_INT, &value)?.trim();
    if text.is_empty() {
        return Ok(Value::Int(0));
    }
    text.parse()
        .map(Value::Int)
        .map_err(|e| failure(STRING_TO_INT, format!("`{text}`: {e}")))
}

fn string_to_list(value: Value, options: Option<&AdapterOptions>) -> Result<Value> {
    let opts: ListSeparatorOptions = options_or_default(options)?;
    let text = expect_text(STRING_TO_LIST, &value)?;
    if text.trim().is_empty() {
        return Ok(Value::List(Vec::new()));
    }
    Ok(Value::List(
        text.split(opts.separator.as_str())
            .map(|item| Value::Text(item.trim().to_string()))
            .collect(),
    ))
}

fn list_to_string(value: Value, options: Option<&AdapterOptions>) -> Result<Value> {
    let opts: ListSeparatorOptions = options_or_default(options)?;
    let items = match value {
        Value::Null => Vec::new(),
        Value::List(items) => items,
        Value::Collection(list) => list.items(),
        other => {
            return Err(failure(
                LIST_TO_STRING,
                format!("expected list, got {}", other.type_name()),
            ))
        }
    };
    let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
    Ok(Value::Text(parts.join(&opts.separator)))
}

fn error_to_string(value: Value, _: Option<&AdapterOptions>) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Text(String::new())),
        Value::Error(err) => Ok(Value::Text(err.to_string())),
        other => Ok(Value::Text(other.to_string())),
    }
}
