//! Test utilities for view-bind
//!
//! - [`CallCounter`]: counts callback invocations
//! - [`failing_adapter`]: adapter descriptor whose conversion always fails
//! - [`TestView`]: a view component with text, number and toggle properties
//!   and `changed` / `clicked` events
//! - [`BindingHarness`]: a shared scene with a root node and helpers for
//!   attaching components and bindings
//!
//! # Example
//!
//! ```
//! use view_bind_core::testing::{BindingHarness, TestView};
//!
//! let harness = BindingHarness::new();
//! let node = harness.spawn("label", harness.root());
//! let label = harness.attach(node, TestView::with_text("hello"));
//! assert_eq!(harness.children(harness.root()), vec![node]);
//! assert_eq!(TestView::text(&label), "hello");
//! harness.connect().unwrap();
//! ```

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

use crate::adapter::{AdapterDescriptor, AdapterOptions};
use crate::binding::Binding;
use crate::error::{BindError, Result};
use crate::event::NativeEvent;
use crate::notify::PropertyNotifier;
use crate::reflect::{Bindable, Describe, ObjectRef, TypeDescriptor, TypeKey, TypeKind};
use crate::runtime::BindingRuntime;
use crate::scene::{NodeId, Scene, SharedScene};
use crate::value::{Value, ValueType};

/// Counts how often a callback ran
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Rc<Cell<usize>>);

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callback incrementing this counter
    pub fn callback(&self) -> impl Fn() + 'static {
        let count = Rc::clone(&self.0);
        move || count.set(count.get() + 1)
    }

    pub fn count(&self) -> usize {
        self.0.get()
    }

    pub fn reset(&self) {
        self.0.set(0);
    }
}

/// Adapter registered under `id` that rejects every value
pub fn failing_adapter(id: &str) -> AdapterDescriptor {
    let name = id.to_string();
    AdapterDescriptor::new(id, ValueType::Any, ValueType::Any, move || {
        let name = name.clone();
        move |value: Value, _: Option<&AdapterOptions>| -> Result<Value> {
            Err(BindError::Adapter {
                id: name.clone(),
                reason: format!("rejected {}", value.type_name()),
            })
        }
    })
}

/// Minimal view component
///
/// Properties: `text`, `value` (float), `checked`. Events: `changed` (one
/// text argument) and `clicked` (none).
pub struct TestView {
    pub text: String,
    pub value: f64,
    pub checked: bool,
    notifier: PropertyNotifier,
    changed: NativeEvent,
    clicked: NativeEvent,
}

impl Default for TestView {
    fn default() -> Self {
        Self {
            text: String::new(),
            value: 0.0,
            checked: false,
            notifier: PropertyNotifier::new(),
            changed: NativeEvent::new(vec![ValueType::Text]),
            clicked: NativeEvent::unit(),
        }
    }
}

impl TestView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Self::default()
        }
    }

    pub fn text(view: &ObjectRef) -> String {
        view.with(|v: &TestView| v.text.clone()).unwrap_or_default()
    }

    pub fn value(view: &ObjectRef) -> f64 {
        view.with(|v: &TestView| v.value).unwrap_or_default()
    }

    /// Simulate user input: set `text` and raise `changed`
    pub fn type_text(view: &ObjectRef, text: &str) {
        let event = view.with_mut(|v: &mut TestView| {
            v.text = text.to_string();
            v.changed.clone()
        });
        if let Some(event) = event {
            if let Err(err) = event.invoke(&[Value::Text(text.to_string())]) {
                tracing::warn!(error = %err, "TestView changed event failed");
            }
        }
    }

    /// Simulate a click
    pub fn click(view: &ObjectRef) {
        if let Some(event) = view.event("clicked") {
            if let Err(err) = event.invoke(&[]) {
                tracing::warn!(error = %err, "TestView clicked event failed");
            }
        }
    }
}

impl Bindable for TestView {
    fn type_key(&self) -> TypeKey {
        TypeKey::of::<Self>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn notifier(&self) -> Option<PropertyNotifier> {
        Some(self.notifier.clone())
    }

    fn event(&self, name: &str) -> Option<NativeEvent> {
        match name {
            "changed" => Some(self.changed.clone()),
            "clicked" => Some(self.clicked.clone()),
            _ => None,
        }
    }
}

impl Describe for TestView {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::builder::<TestView>("TestView")
            .kind(TypeKind::Component)
            .property("text", |v| v.text.clone(), Some(|v, t| v.text = t))
            .property("value", |v| v.value, Some(|v, x| v.value = x))
            .property("checked", |v| v.checked, Some(|v, c| v.checked = c))
            .event("changed")
            .event("clicked")
            .build()
    }
}

/// Scene with a root node, for driving bindings in tests
///
/// `TestView` is registered with the runtime.
pub struct BindingHarness {
    scene: SharedScene,
    root: NodeId,
}

impl Default for BindingHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl BindingHarness {
    pub fn new() -> Self {
        Self::with_runtime(BindingRuntime::new())
    }

    pub fn with_runtime(runtime: BindingRuntime) -> Self {
        runtime.types().register_type::<TestView>();
        let scene = SharedScene::new(runtime);
        let root = scene.update(|cx| cx.scene_mut().spawn_root("root"));
        Self { scene, root }
    }

    pub fn scene(&self) -> &SharedScene {
        &self.scene
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn runtime(&self) -> Rc<BindingRuntime> {
        self.scene.runtime()
    }

    /// # Panics
    ///
    /// Panics if `parent` does not exist.
    pub fn spawn(&self, name: &str, parent: NodeId) -> NodeId {
        self.scene
            .update(|cx| cx.scene_mut().spawn(name, parent))
            .unwrap_or_else(|err| panic!("cannot spawn {name:?}: {err}"))
    }

    /// Attach a new component and return its handle
    pub fn attach(&self, node: NodeId, component: impl Bindable) -> ObjectRef {
        let object = ObjectRef::new(component);
        self.attach_ref(node, &object);
        object
    }

    /// # Panics
    ///
    /// Panics if `node` does not exist.
    pub fn attach_ref(&self, node: NodeId, object: &ObjectRef) {
        self.scene
            .update(|cx| cx.scene_mut().add_component(node, object.clone()))
            .unwrap_or_else(|err| panic!("cannot attach component: {err}"));
    }

    /// # Panics
    ///
    /// Panics if `node` does not exist.
    pub fn bind(&self, node: NodeId, binding: impl Binding + 'static) {
        self.scene
            .update(|cx| cx.scene_mut().add_binding(node, binding))
            .unwrap_or_else(|err| panic!("cannot add binding: {err}"));
    }

    /// Connect everything under the root
    pub fn connect(&self) -> Result<()> {
        self.scene.connect(self.root)
    }

    pub fn disconnect(&self) {
        self.scene.disconnect(self.root);
    }

    pub fn read<R>(&self, f: impl FnOnce(&Scene) -> R) -> R {
        self.scene.read(f)
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.read(|scene| scene.children(node).to_vec())
    }

    pub fn is_active(&self, node: NodeId) -> bool {
        self.read(|scene| scene.is_active(node))
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.read(|scene| scene.contains(node))
    }

    pub fn component<T: 'static>(&self, node: NodeId) -> Option<ObjectRef> {
        self.read(|scene| scene.component::<T>(node))
    }

    /// Connected bindings on `node`
    pub fn connected_bindings(&self, node: NodeId) -> usize {
        self.read(|scene| scene.node(node).map_or(0, |n| n.connected_bindings()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterRegistry;

    #[test]
    fn test_call_counter() {
        let counter = CallCounter::new();
        let callback = counter.callback();
        callback();
        callback();
        assert_eq!(counter.count(), 2);
        counter.reset();
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn test_failing_adapter_fails() {
        let registry = AdapterRegistry::new();
        registry.register(failing_adapter("broken"));
        let adapter = registry.get("broken").unwrap().unwrap().create_default();
        assert!(matches!(
            adapter.convert(Value::Int(1), None),
            Err(BindError::Adapter { .. })
        ));
    }

    #[test]
    fn test_test_view_events() {
        let view = ObjectRef::new(TestView::new());
        let counter = CallCounter::new();
        let callback = counter.callback();
        view.event("changed").unwrap().add_listener(move |_| callback());
        TestView::type_text(&view, "abc");
        assert_eq!(TestView::text(&view), "abc");
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn test_harness_nodes() {
        let harness = BindingHarness::new();
        let child = harness.spawn("child", harness.root());
        let view = harness.attach(child, TestView::new());
        assert_eq!(harness.children(harness.root()), vec![child]);
        assert_eq!(harness.component::<TestView>(child), Some(view));
        assert!(harness.is_active(child));
    }
}
