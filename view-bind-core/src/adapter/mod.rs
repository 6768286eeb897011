//! Adapter registry and conversion pipeline
//!
//! An adapter converts a value between two [`ValueType`]s. Descriptors are
//! registered under a stable id; the first registration of an id wins and
//! later ones are ignored. A descriptor may declare an options kind, in which
//! case every conversion needs matching [`AdapterOptions`].
//!
//! ```
//! use view_bind_core::adapter::AdapterRegistry;
//! use view_bind_core::Value;
//!
//! let registry = AdapterRegistry::with_builtins();
//! let invert = registry.get("bool_inversion").unwrap().unwrap();
//! let adapter = invert.create_default();
//! assert_eq!(adapter.convert(Value::Bool(true), None).unwrap(), Value::Bool(false));
//! ```

pub mod builtin;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{BindError, Result};
use crate::value::{Value, ValueType};

/// A value converter
pub trait Adapter {
    /// Convert `value`; `options` is only passed to adapters declaring an
    /// options kind
    fn convert(&self, value: Value, options: Option<&AdapterOptions>) -> Result<Value>;
}

impl<F> Adapter for F
where
    F: Fn(Value, Option<&AdapterOptions>) -> Result<Value>,
{
    fn convert(&self, value: Value, options: Option<&AdapterOptions>) -> Result<Value> {
        self(value, options)
    }
}

/// Per-binding options payload for one adapter
///
/// `kind` names the options type and must match the adapter's declared
/// options kind. `values` is parsed into a typed struct by the adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterOptions {
    pub kind: String,
    #[serde(default)]
    pub values: serde_json::Value,
}

impl AdapterOptions {
    pub fn new(kind: impl Into<String>, values: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            values,
        }
    }

    /// Options with an empty payload; typed fields fall back to their defaults
    pub fn empty(kind: impl Into<String>) -> Self {
        Self::new(kind, serde_json::Value::Object(Default::default()))
    }

    /// Deserialize the payload into a typed options struct
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.values.clone())?)
    }
}

type Constructor = Rc<dyn Fn() -> Rc<dyn Adapter>>;

/// Registered adapter: id, declared types, options kind and constructor
#[derive(Clone)]
pub struct AdapterDescriptor {
    pub id: String,
    pub input: ValueType,
    pub output: ValueType,
    pub options_kind: Option<String>,
    construct: Constructor,
}

impl AdapterDescriptor {
    pub fn new<A, F>(id: impl Into<String>, input: ValueType, output: ValueType, construct: F) -> Self
    where
        A: Adapter + 'static,
        F: Fn() -> A + 'static,
    {
        Self {
            id: id.into(),
            input,
            output,
            options_kind: None,
            construct: Rc::new(move || Rc::new(construct()) as Rc<dyn Adapter>),
        }
    }

    /// Stateless adapter backed by a plain function
    pub fn from_fn(
        id: impl Into<String>,
        input: ValueType,
        output: ValueType,
        convert: fn(Value, Option<&AdapterOptions>) -> Result<Value>,
    ) -> Self {
        Self::new(id, input, output, move || convert)
    }

    /// Require options of `kind` on every conversion
    pub fn with_options(mut self, kind: impl Into<String>) -> Self {
        self.options_kind = Some(kind.into());
        self
    }

    /// Plain construction, bypassing any [`AdapterFactory`]
    pub fn create_default(&self) -> BoundAdapter {
        self.create(&DefaultAdapterFactory)
    }

    /// Instantiate through `factory`
    pub fn create(&self, factory: &dyn AdapterFactory) -> BoundAdapter {
        BoundAdapter {
            descriptor: self.clone(),
            adapter: factory.create(self),
        }
    }

    /// Whether the adapter can read values of `ty`
    pub fn accepts_input(&self, ty: &ValueType) -> bool {
        self.input == ValueType::Any || self.input == *ty
    }
}

impl fmt::Debug for AdapterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterDescriptor")
            .field("id", &self.id)
            .field("input", &self.input)
            .field("output", &self.output)
            .field("options_kind", &self.options_kind)
            .finish()
    }
}

/// Creates adapter instances; hosts plug in their own to inject dependencies
pub trait AdapterFactory {
    fn create(&self, descriptor: &AdapterDescriptor) -> Rc<dyn Adapter>;
}

/// Factory calling the descriptor's constructor
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAdapterFactory;

impl AdapterFactory for DefaultAdapterFactory {
    fn create(&self, descriptor: &AdapterDescriptor) -> Rc<dyn Adapter> {
        (descriptor.construct)()
    }
}

/// Adapter instance paired with its descriptor, enforcing the options rules
#[derive(Clone)]
pub struct BoundAdapter {
    descriptor: AdapterDescriptor,
    adapter: Rc<dyn Adapter>,
}

impl BoundAdapter {
    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn descriptor(&self) -> &AdapterDescriptor {
        &self.descriptor
    }

    /// Convert `value`, checking `options` against the declared options kind
    ///
    /// Adapters without an options kind ignore any supplied options.
    pub fn convert(&self, value: Value, options: Option<&AdapterOptions>) -> Result<Value> {
        let options = match &self.descriptor.options_kind {
            None => None,
            Some(expected) => {
                let options = options.ok_or_else(|| BindError::MissingAdapterOptions {
                    id: self.descriptor.id.clone(),
                    expected: expected.clone(),
                })?;
                if options.kind != *expected {
                    return Err(BindError::AdapterOptionsMismatch {
                        id: self.descriptor.id.clone(),
                        expected: expected.clone(),
                        found: options.kind.clone(),
                    });
                }
                Some(options)
            }
        };
        self.adapter.convert(value, options)
    }
}

impl fmt::Debug for BoundAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BoundAdapter").field(&self.descriptor.id).finish()
    }
}

#[derive(Default)]
struct Entries {
    by_id: HashMap<String, Rc<AdapterDescriptor>>,
    order: Vec<String>,
}

/// Registry of adapter descriptors keyed by id
#[derive(Default)]
pub struct AdapterRegistry {
    entries: RefCell<Entries>,
}

impl AdapterRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-filled with the built-in adapters
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for descriptor in builtin::descriptors() {
            registry.register(descriptor);
        }
        registry
    }

    /// Register `descriptor`; an id that is already present is left untouched
    pub fn register(&self, descriptor: AdapterDescriptor) -> bool {
        let mut entries = self.entries.borrow_mut();
        if entries.by_id.contains_key(&descriptor.id) {
            tracing::warn!(id = %descriptor.id, "Adapter already registered, keeping first");
            return false;
        }
        entries.order.push(descriptor.id.clone());
        entries
            .by_id
            .insert(descriptor.id.clone(), Rc::new(descriptor));
        true
    }

    /// Look up an adapter; an empty id means "no adapter"
    pub fn get(&self, id: &str) -> Result<Option<Rc<AdapterDescriptor>>> {
        if id.is_empty() {
            return Ok(None);
        }
        self.entries
            .borrow()
            .by_id
            .get(id)
            .cloned()
            .map(Some)
            .ok_or_else(|| BindError::AdapterNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.borrow().by_id.contains_key(id)
    }

    /// Ids of adapters matching `predicate`, in registration order
    pub fn ids(&self, predicate: impl Fn(&AdapterDescriptor) -> bool) -> Vec<String> {
        let entries = self.entries.borrow();
        entries
            .order
            .iter()
            .filter(|id| predicate(&entries.by_id[*id]))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.entries.borrow().order)
            .finish()
    }
}
