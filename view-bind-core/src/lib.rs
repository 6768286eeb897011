//! Core runtime for view-bind
//!
//! Declarative MVVM data binding between view-models and view components
//! living in a node hierarchy.
//!
//! # Core Concepts
//!
//! - **Reflection**: types describe their bindable members once through a
//!   [`TypeDescriptor`]; the [`TypeRegistry`] answers member and ancestry
//!   queries
//! - **Endpoints**: `Type.member` references resolved against the nearest
//!   matching view-model in scope
//! - **Adapters**: named value converters applied between the two ends
//! - **Bindings**: components attached to scene nodes that keep properties
//!   in sync, forward events to commands, and instantiate templates
//! - **Scene**: the node hierarchy the bindings live in, driven through a
//!   [`SharedScene`]
//!
//! # Basic Example
//!
//! ```ignore
//! use view_bind::prelude::*;
//!
//! #[derive(Bindable, Default)]
//! #[bindable(view_model, name = "Player")]
//! struct Player {
//!     #[bindable(notifier)]
//!     notifier: PropertyNotifier,
//!     #[bindable(binding)]
//!     name: String,
//! }
//!
//! let runtime = BindingRuntime::builder().register::<Player>().build();
//! let scene = SharedScene::new(runtime);
//! let root = scene.update(|cx| cx.scene_mut().spawn_root("hud"));
//! scene.update(|cx| {
//!     cx.scene_mut().add_component(root, ObjectRef::new(Player::default()))?;
//!     cx.scene_mut().add_binding(root, OneWayPropertyBinding::new("Player.name", "Label.text"))
//! })?;
//! scene.connect(root)?;
//! ```

pub mod adapter;
pub mod binding;
pub mod collection;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod notify;
pub mod reflect;
pub mod registry;
pub mod resolver;
pub mod runtime;
pub mod scene;
pub mod sync;
pub mod template;
pub mod testing;
pub mod value;

// Reflection exports
pub use reflect::{
    Bindable, Describe, MemberFlags, ObjectRef, TypeDescriptor, TypeKey, TypeKind,
    ViewModelProvider,
};
pub use registry::{BindableMember, MemberKind, TypeModule, TypeRegistry};
pub use value::{BindValue, Color, Value, ValueType};

// Observation exports
pub use collection::{CollectionChange, ObservableList};
pub use event::{EventWatcher, NativeEvent};
pub use notify::{PropertyNotifier, PropertyWatcher};

// Engine exports
pub use adapter::{Adapter, AdapterDescriptor, AdapterOptions, AdapterRegistry};
pub use endpoint::PropertyEndPoint;
pub use error::{BindError, Result};
pub use sync::{PropertySync, SyncGuard};

// Runtime exports
pub use config::BindingConfig;
pub use runtime::{BindingRuntime, BindingRuntimeBuilder};
pub use scene::{BindCx, Dispatcher, NodeId, Scene, SharedScene};

// Binding exports
pub use binding::{
    Binding, CollectionBinding, EventBinding, OneWayPropertyBinding, SubViewModelBinding,
    TemplateBinding, ToggleActiveBinding, TwoWayPropertyBinding,
};
pub use template::{Template, TemplateFactory, TemplateSelector};

// Testing exports
pub use testing::{BindingHarness, CallCounter, TestView};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::binding::{
        Binding, CollectionBinding, EventBinding, OneWayPropertyBinding, SubViewModelBinding,
        TemplateBinding, ToggleActiveBinding, TwoWayPropertyBinding,
    };
    pub use crate::collection::{CollectionChange, ObservableList};
    pub use crate::error::BindError;
    pub use crate::event::NativeEvent;
    pub use crate::notify::PropertyNotifier;
    pub use crate::reflect::{Bindable, Describe, ObjectRef, TypeDescriptor, TypeKind};
    pub use crate::runtime::BindingRuntime;
    pub use crate::scene::{BindCx, NodeId, Scene, SharedScene};
    pub use crate::template::Template;
    pub use crate::value::{Value, ValueType};
}
