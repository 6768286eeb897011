//! Binding runtime: the context object owning registries and configuration
//!
//! One [`BindingRuntime`] is built at startup and shared (usually through a
//! [`SharedScene`](crate::scene::SharedScene)) with every binding. Tests build
//! their own, so registries never leak between them.
//!
//! ```
//! use view_bind_core::adapter::{AdapterDescriptor, BoundAdapter};
//! use view_bind_core::runtime::BindingRuntime;
//! use view_bind_core::{Value, ValueType};
//!
//! let runtime = BindingRuntime::builder()
//!     .adapter(AdapterDescriptor::from_fn("double", ValueType::Int, ValueType::Int, |v, _| {
//!         Ok(Value::Int(v.as_int().unwrap_or_default() * 2))
//!     }))
//!     .build();
//!
//! let adapter: BoundAdapter = runtime.create_adapter("double").unwrap().unwrap();
//! assert_eq!(adapter.convert(Value::Int(4), None).unwrap(), Value::Int(8));
//! assert!(runtime.create_adapter("").unwrap().is_none());
//! ```

use std::fmt;

use crate::adapter::{AdapterDescriptor, AdapterFactory, AdapterRegistry, BoundAdapter, DefaultAdapterFactory};
use crate::binding::SubViewModelProvider;
use crate::config::BindingConfig;
use crate::endpoint::{parse_end_point_reference, EndPointReference};
use crate::error::Result;
use crate::reflect::{Describe, TypeDescriptor};
use crate::registry::{TypeModule, TypeRegistry};
use crate::template::TemplateItem;

/// Registries, adapter factory and configuration shared by all bindings
pub struct BindingRuntime {
    types: TypeRegistry,
    adapters: AdapterRegistry,
    adapter_factory: Box<dyn AdapterFactory>,
    config: BindingConfig,
}

impl BindingRuntime {
    /// Runtime with default configuration and the built-in adapters
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> BindingRuntimeBuilder {
        BindingRuntimeBuilder::new()
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    /// Instantiate the adapter registered under `id` through the factory
    ///
    /// An empty id means no adapter; an unknown id is `AdapterNotFound`.
    pub fn create_adapter(&self, id: &str) -> Result<Option<BoundAdapter>> {
        Ok(self
            .adapters
            .get(id)?
            .map(|descriptor| descriptor.create(self.adapter_factory.as_ref())))
    }

    /// Parse a `Type.member` reference with the configured host namespaces
    pub fn parse_reference(&self, reference: &str) -> Result<EndPointReference> {
        parse_end_point_reference(reference, &self.config.resolver.host_namespaces)
    }
}

impl Default for BindingRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BindingRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingRuntime")
            .field("types", &self.types.len())
            .field("adapters", &self.adapters.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Builder for [`BindingRuntime`]
pub struct BindingRuntimeBuilder {
    types: TypeRegistry,
    adapters: Vec<AdapterDescriptor>,
    adapter_factory: Box<dyn AdapterFactory>,
    config: BindingConfig,
    builtin_adapters: bool,
}

impl BindingRuntimeBuilder {
    fn new() -> Self {
        Self {
            types: TypeRegistry::new(),
            adapters: Vec::new(),
            adapter_factory: Box::new(DefaultAdapterFactory),
            config: BindingConfig::default(),
            builtin_adapters: true,
        }
    }

    pub fn config(mut self, config: BindingConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a custom adapter; built-ins registered first win on id clashes
    pub fn adapter(mut self, descriptor: AdapterDescriptor) -> Self {
        self.adapters.push(descriptor);
        self
    }

    /// Register a type module, scanned on first lookup
    pub fn module(self, module: impl TypeModule + 'static) -> Self {
        self.types.add_module(module);
        self
    }

    pub fn register<T: Describe>(self) -> Self {
        self.types.register_type::<T>();
        self
    }

    pub fn descriptor(self, descriptor: TypeDescriptor) -> Self {
        self.types.register(descriptor);
        self
    }

    /// Factory used to construct adapter instances
    pub fn adapter_factory(mut self, factory: impl AdapterFactory + 'static) -> Self {
        self.adapter_factory = Box::new(factory);
        self
    }

    pub fn without_builtin_adapters(mut self) -> Self {
        self.builtin_adapters = false;
        self
    }

    pub fn build(self) -> BindingRuntime {
        let adapters = if self.builtin_adapters {
            AdapterRegistry::with_builtins()
        } else {
            AdapterRegistry::new()
        };
        for descriptor in self.adapters {
            adapters.register(descriptor);
        }
        self.types.register_type::<TemplateItem>();
        self.types.register_type::<SubViewModelProvider>();
        tracing::debug!(adapters = adapters.len(), "Binding runtime ready");
        BindingRuntime {
            types: self.types,
            adapters,
            adapter_factory: self.adapter_factory,
            config: self.config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Adapter;
    use crate::error::BindError;
    use crate::value::{Value, ValueType};
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_runtimes_are_isolated() {
        let a = BindingRuntime::builder()
            .adapter(AdapterDescriptor::from_fn("custom", ValueType::Any, ValueType::Any, |v, _| Ok(v)))
            .build();
        let b = BindingRuntime::new();
        assert!(a.adapters().contains("custom"));
        assert!(!b.adapters().contains("custom"));
        assert!(matches!(b.create_adapter("custom"), Err(BindError::AdapterNotFound(_))));
    }

    #[test]
    fn test_without_builtins() {
        let runtime = BindingRuntime::builder().without_builtin_adapters().build();
        assert!(runtime.adapters().is_empty());
        assert!(runtime.types().find_by_name("TemplateItem").len() == 1);
    }

    struct CountingFactory(Rc<Cell<usize>>);

    impl AdapterFactory for CountingFactory {
        fn create(&self, descriptor: &AdapterDescriptor) -> Rc<dyn Adapter> {
            self.0.set(self.0.get() + 1);
            DefaultAdapterFactory.create(descriptor)
        }
    }

    #[test]
    fn test_adapters_are_built_through_the_factory() {
        let count = Rc::new(Cell::new(0));
        let runtime = BindingRuntime::builder()
            .adapter_factory(CountingFactory(Rc::clone(&count)))
            .build();
        let adapter = runtime.create_adapter("bool_inversion").unwrap().unwrap();
        assert_eq!(adapter.convert(Value::Bool(true), None).unwrap(), Value::Bool(false));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_parse_reference_uses_config() {
        let mut config = BindingConfig::default();
        config.resolver.host_namespaces = vec!["Host.".to_string()];
        let runtime = BindingRuntime::builder().config(config).build();
        assert_eq!(runtime.parse_reference("Host.Ui.Label.text").unwrap().type_name, "Label");
        assert_eq!(
            runtime.parse_reference("Engine.Ui.Label.text").unwrap().type_name,
            "Engine.Ui.Label"
        );
    }
}
