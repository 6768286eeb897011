//! view-bind: declarative MVVM data binding for game UIs
//!
//! View-models describe their bindable members with `#[derive(Bindable)]`.
//! Binding components attached to scene nodes keep view properties in sync
//! with them, forward view events to commands and instantiate templates for
//! collections.
//!
//! # Example
//! ```ignore
//! use view_bind::prelude::*;
//!
//! #[derive(Bindable, Default)]
//! #[bindable(view_model, name = "Inventory", methods(clear))]
//! struct Inventory {
//!     #[bindable(notifier)]
//!     notifier: PropertyNotifier,
//!     #[bindable(binding)]
//!     items: ObservableList,
//! }
//!
//! impl Inventory {
//!     fn clear(&mut self) {
//!         self.items.clear();
//!     }
//! }
//! ```

// Re-export everything from core
pub use view_bind_core::*;

// Re-export derive macros
pub use view_bind_macros::Bindable;

/// Prelude for convenient imports
pub mod prelude {
    // Reflection
    pub use view_bind_core::{
        BindValue, Bindable, Describe, MemberFlags, ObjectRef, TypeDescriptor, TypeKey, TypeKind,
        ViewModelProvider,
    };

    // Observation
    pub use view_bind_core::{CollectionChange, NativeEvent, ObservableList, PropertyNotifier};

    // Bindings
    pub use view_bind_core::{
        Binding, CollectionBinding, EventBinding, OneWayPropertyBinding, SubViewModelBinding,
        TemplateBinding, ToggleActiveBinding, TwoWayPropertyBinding,
    };

    // Runtime
    pub use view_bind_core::{
        AdapterDescriptor, AdapterOptions, BindCx, BindError, BindingConfig, BindingRuntime,
        NodeId, Scene, SharedScene, Template, Value, ValueType,
    };

    // Derive macros
    pub use view_bind_macros::Bindable;
}
