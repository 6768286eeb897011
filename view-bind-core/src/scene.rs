//! Node arena, binding context and the deferred-operation dispatcher
//!
//! The [`Scene`] stands in for the host object hierarchy: nodes with a name,
//! an ordered list of children, attached components and bindings, and an
//! active flag. [`SharedScene`] owns a scene together with the
//! [`BindingRuntime`] and serializes every callback that needs the scene
//! through a FIFO [`Dispatcher`]. Operations scheduled while the scene is in
//! use run right after the current one finishes, in scheduling order.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::binding::Binding;
use crate::error::{BindError, Result};
use crate::reflect::{ObjectRef, TypeKey};
use crate::resolver::ScopeChain;
use crate::runtime::BindingRuntime;

/// Index of a node in a [`Scene`]; ids are never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// One node of the hierarchy
pub struct Node {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    components: Vec<ObjectRef>,
    bindings: Vec<Box<dyn Binding>>,
    active: bool,
}

impl Node {
    fn new(name: String, parent: Option<NodeId>) -> Self {
        Self {
            name,
            parent,
            children: Vec::new(),
            components: Vec::new(),
            bindings: Vec::new(),
            active: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn components(&self) -> &[ObjectRef] {
        &self.components
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Number of bindings currently connected
    pub fn connected_bindings(&self) -> usize {
        self.bindings.iter().filter(|b| b.is_connected()).count()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("components", &self.components.len())
            .field("bindings", &self.bindings.len())
            .field("active", &self.active)
            .finish()
    }
}

/// Arena of nodes
///
/// Nodes with no parent are either roots or detached (pooled) instances;
/// detached nodes are not reachable from any root.
#[derive(Default)]
pub struct Scene {
    nodes: Vec<Option<Node>>,
    roots: Vec<NodeId>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn_root(&mut self, name: impl Into<String>) -> NodeId {
        let id = self.insert(Node::new(name.into(), None));
        self.roots.push(id);
        id
    }

    /// Append a child to `parent`
    pub fn spawn(&mut self, name: impl Into<String>, parent: NodeId) -> Result<NodeId> {
        self.node_mut(parent)?;
        let id = self.insert(Node::new(name.into(), Some(parent)));
        self.node_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Node with no parent that is not a root
    pub fn spawn_detached(&mut self, name: impl Into<String>) -> NodeId {
        self.insert(Node::new(name.into(), None))
    }

    fn insert(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(node));
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(BindError::NodeNotFound(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(Node::name)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(Node::parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map_or(&[], Node::children)
    }

    pub fn components(&self, id: NodeId) -> &[ObjectRef] {
        self.node(id).map_or(&[], Node::components)
    }

    /// First direct child called `name`
    pub fn find_child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|child| self.name(*child) == Some(name))
    }

    /// Component of concrete type `T` on `id`
    pub fn component<T: 'static>(&self, id: NodeId) -> Option<ObjectRef> {
        let key = TypeKey::of::<T>();
        self.components(id)
            .iter()
            .find(|c| c.type_key() == key)
            .cloned()
    }

    pub fn add_component(&mut self, id: NodeId, component: ObjectRef) -> Result<()> {
        self.node_mut(id)?.components.push(component);
        Ok(())
    }

    pub fn insert_component(&mut self, id: NodeId, index: usize, component: ObjectRef) -> Result<()> {
        let components = &mut self.node_mut(id)?.components;
        let index = index.min(components.len());
        components.insert(index, component);
        Ok(())
    }

    pub fn remove_component(&mut self, id: NodeId, component: &ObjectRef) -> bool {
        let Ok(node) = self.node_mut(id) else {
            return false;
        };
        let before = node.components.len();
        node.components.retain(|c| !c.ptr_eq(component));
        node.components.len() != before
    }

    /// Attach a binding; it is connected by the next `connect_subtree`
    pub fn add_binding(&mut self, id: NodeId, binding: impl Binding + 'static) -> Result<()> {
        self.node_mut(id)?.bindings.push(Box::new(binding));
        Ok(())
    }

    pub(crate) fn take_bindings(&mut self, id: NodeId) -> Vec<Box<dyn Binding>> {
        self.node_mut(id)
            .map(|node| std::mem::take(&mut node.bindings))
            .unwrap_or_default()
    }

    pub(crate) fn restore_bindings(&mut self, id: NodeId, mut bindings: Vec<Box<dyn Binding>>) {
        if let Ok(node) = self.node_mut(id) {
            bindings.append(&mut node.bindings);
            node.bindings = bindings;
        }
    }

    pub fn is_active(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(Node::is_active)
    }

    /// Active and every ancestor active
    pub fn is_active_in_hierarchy(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current.and_then(|id| self.node(id)) {
            if !node.active {
                return false;
            }
            current = node.parent;
        }
        current.is_none() && self.contains(id)
    }

    pub fn set_active(&mut self, id: NodeId, active: bool) -> Result<()> {
        self.node_mut(id)?.active = active;
        Ok(())
    }

    /// Move `id` under `parent` at child position `index` (appends when `None`
    /// or out of range)
    pub fn attach(&mut self, id: NodeId, parent: NodeId, index: Option<usize>) -> Result<()> {
        if id == parent || self.ancestors(parent).contains(&id) {
            return Err(BindError::NodeNotFound(parent));
        }
        self.node_mut(parent)?;
        self.detach(id)?;
        self.node_mut(id)?.parent = Some(parent);
        let children = &mut self.node_mut(parent)?.children;
        let index = index.unwrap_or(children.len()).min(children.len());
        children.insert(index, id);
        Ok(())
    }

    /// Unlink `id` from its parent (or the root list)
    pub fn detach(&mut self, id: NodeId) -> Result<()> {
        let parent = self.node_mut(id)?.parent.take();
        match parent {
            Some(parent) => {
                if let Ok(parent) = self.node_mut(parent) {
                    parent.children.retain(|c| *c != id);
                }
            }
            None => self.roots.retain(|r| *r != id),
        }
        Ok(())
    }

    /// Remove `id` and its descendants, dropping their bindings
    ///
    /// Bindings must already be disconnected; [`BindCx::destroy`] does that
    /// first and is the public way to remove a node.
    pub(crate) fn remove(&mut self, id: NodeId) -> Result<()> {
        self.detach(id)?;
        for node in self.descendants(id) {
            if let Some(slot) = self.nodes.get_mut(node.0) {
                if let Some(removed) = slot.take() {
                    if removed.connected_bindings() > 0 {
                        tracing::warn!(
                            ?node,
                            connected = removed.connected_bindings(),
                            "Removed node still had connected bindings"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// `id` followed by its descendants in depth-first pre-order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if !self.contains(next) {
                continue;
            }
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Parent, grandparent, ... up to the root
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(node) = current {
            out.push(node);
            current = self.parent(node);
        }
        out
    }

    /// Components of `id` and each ancestor, nearest first
    pub fn scope_chain(&self, id: NodeId) -> ScopeChain {
        let mut chain = ScopeChain::default();
        if !self.contains(id) {
            return chain;
        }
        chain.push(id, self.components(id).to_vec());
        for ancestor in self.ancestors(id) {
            chain.push(ancestor, self.components(ancestor).to_vec());
        }
        chain
    }

    /// Slash-separated names from the root, for diagnostics
    pub fn path(&self, id: NodeId) -> String {
        let mut names: Vec<&str> = self
            .ancestors(id)
            .iter()
            .rev()
            .filter_map(|a| self.name(*a))
            .collect();
        names.extend(self.name(id));
        names.join("/")
    }
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene")
            .field("nodes", &self.len())
            .field("roots", &self.roots)
            .finish()
    }
}

/// Everything a binding needs while connecting or handling a change
pub struct BindCx<'a> {
    runtime: &'a Rc<BindingRuntime>,
    scene: &'a mut Scene,
    dispatcher: &'a Dispatcher,
}

impl<'a> BindCx<'a> {
    pub fn new(runtime: &'a Rc<BindingRuntime>, scene: &'a mut Scene, dispatcher: &'a Dispatcher) -> Self {
        Self {
            runtime,
            scene,
            dispatcher,
        }
    }

    pub fn runtime(&self) -> &Rc<BindingRuntime> {
        self.runtime
    }

    pub fn scene(&self) -> &Scene {
        self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        self.scene
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        self.dispatcher
    }

    pub fn scope_chain(&self, node: NodeId) -> ScopeChain {
        self.scene.scope_chain(node)
    }

    /// Connect every unconnected binding on `node` and its descendants
    ///
    /// A failing binding does not stop its siblings; the first error is
    /// returned once the whole subtree has been visited.
    pub fn connect_subtree(&mut self, node: NodeId) -> Result<()> {
        if !self.scene.contains(node) {
            return Err(BindError::NodeNotFound(node));
        }
        let mut first_error = None;
        self.connect_node(node, &mut first_error);
        first_error.map_or(Ok(()), Err)
    }

    fn connect_node(&mut self, node: NodeId, first_error: &mut Option<BindError>) {
        let mut bindings = self.scene.take_bindings(node);
        for binding in bindings.iter_mut() {
            if binding.is_connected() {
                continue;
            }
            if let Err(err) = binding.connect(self, node) {
                tracing::error!(
                    binding = binding.kind(),
                    path = %self.scene.path(node),
                    error = %err,
                    "Binding failed to connect"
                );
                first_error.get_or_insert(err);
            }
        }
        self.scene.restore_bindings(node, bindings);
        for child in self.scene.children(node).to_vec() {
            self.connect_node(child, first_error);
        }
    }

    /// Disconnect bindings on `node` and its descendants, deepest first
    pub fn disconnect_subtree(&mut self, node: NodeId) {
        for child in self.scene.children(node).to_vec().into_iter().rev() {
            self.disconnect_subtree(child);
        }
        let mut bindings = self.scene.take_bindings(node);
        for binding in bindings.iter_mut().rev() {
            if binding.is_connected() {
                binding.disconnect(self);
            }
        }
        self.scene.restore_bindings(node, bindings);
    }

    /// Disconnect and remove `node` with its descendants
    pub fn destroy(&mut self, node: NodeId) -> Result<()> {
        if !self.scene.contains(node) {
            return Err(BindError::NodeNotFound(node));
        }
        self.disconnect_subtree(node);
        tracing::debug!(path = %self.scene.path(node), "Destroying node");
        self.scene.remove(node)
    }
}

type Operation = Box<dyn FnOnce(&mut BindCx<'_>)>;

struct Shared {
    scene: RefCell<Scene>,
    runtime: Rc<BindingRuntime>,
    queue: RefCell<VecDeque<Operation>>,
    busy: Cell<bool>,
}

struct BusyFlag<'a>(&'a Cell<bool>);

impl<'a> BusyFlag<'a> {
    fn raise(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for BusyFlag<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Shared {
    fn run<R>(self: &Rc<Self>, f: impl FnOnce(&mut BindCx<'_>) -> R) -> R {
        let _busy = BusyFlag::raise(&self.busy);
        let dispatcher = Dispatcher {
            shared: Rc::downgrade(self),
        };
        let mut scene = self.scene.borrow_mut();
        let mut cx = BindCx::new(&self.runtime, &mut scene, &dispatcher);
        f(&mut cx)
    }

    fn drain(self: &Rc<Self>) {
        if self.busy.get() {
            return;
        }
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(operation) = next else {
                break;
            };
            self.run(operation);
        }
    }
}

/// Handle used by callbacks to run work against the scene
///
/// Holds the scene weakly; operations scheduled after the scene is gone are
/// dropped.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Weak<Shared>,
}

impl Dispatcher {
    /// Queue `operation`; runs immediately when the scene is idle
    pub fn schedule(&self, operation: impl FnOnce(&mut BindCx<'_>) + 'static) {
        let Some(shared) = self.shared.upgrade() else {
            tracing::trace!("Scene dropped, discarding operation");
            return;
        };
        shared.queue.borrow_mut().push_back(Box::new(operation));
        shared.drain();
    }

    /// Operations waiting to run
    pub fn pending(&self) -> usize {
        self.shared
            .upgrade()
            .map_or(0, |shared| shared.queue.borrow().len())
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Scene plus runtime, shared with the callbacks of connected bindings
///
/// `update`, `connect`, `disconnect` and `destroy` must not be called from
/// inside binding callbacks; schedule work on the [`Dispatcher`] instead.
#[derive(Clone)]
pub struct SharedScene {
    shared: Rc<Shared>,
}

impl SharedScene {
    pub fn new(runtime: impl Into<Rc<BindingRuntime>>) -> Self {
        Self::with_scene(runtime, Scene::new())
    }

    pub fn with_scene(runtime: impl Into<Rc<BindingRuntime>>, scene: Scene) -> Self {
        Self {
            shared: Rc::new(Shared {
                scene: RefCell::new(scene),
                runtime: runtime.into(),
                queue: RefCell::new(VecDeque::new()),
                busy: Cell::new(false),
            }),
        }
    }

    pub fn runtime(&self) -> Rc<BindingRuntime> {
        Rc::clone(&self.shared.runtime)
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher {
            shared: Rc::downgrade(&self.shared),
        }
    }

    /// Inspect the scene
    pub fn read<R>(&self, f: impl FnOnce(&Scene) -> R) -> R {
        f(&self.shared.scene.borrow())
    }

    /// Mutate the scene, then run whatever the change scheduled
    pub fn update<R>(&self, f: impl FnOnce(&mut BindCx<'_>) -> R) -> R {
        let result = self.shared.run(f);
        self.shared.drain();
        result
    }

    pub fn connect(&self, node: NodeId) -> Result<()> {
        self.update(|cx| cx.connect_subtree(node))
    }

    pub fn disconnect(&self, node: NodeId) {
        self.update(|cx| cx.disconnect_subtree(node));
    }

    pub fn destroy(&self, node: NodeId) -> Result<()> {
        self.update(|cx| cx.destroy(node))
    }

    /// Run any queued operations
    pub fn flush(&self) {
        self.shared.drain();
    }
}

impl fmt::Debug for SharedScene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedScene")
            .field("busy", &self.shared.busy.get())
            .field("pending", &self.shared.queue.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_and_hierarchy() {
        let mut scene = Scene::new();
        let root = scene.spawn_root("root");
        let a = scene.spawn("a", root).unwrap();
        let b = scene.spawn("b", root).unwrap();
        let c = scene.spawn("c", a).unwrap();

        assert_eq!(scene.children(root), &[a, b]);
        assert_eq!(scene.ancestors(c), vec![a, root]);
        assert_eq!(scene.descendants(root), vec![root, a, c, b]);
        assert_eq!(scene.path(c), "root/a/c");
        assert_eq!(scene.find_child(root, "b"), Some(b));
    }

    #[test]
    fn test_attach_detach_and_remove() {
        let mut scene = Scene::new();
        let root = scene.spawn_root("root");
        let a = scene.spawn("a", root).unwrap();
        let b = scene.spawn("b", root).unwrap();
        let pooled = scene.spawn_detached("pooled");

        scene.attach(pooled, root, Some(1)).unwrap();
        assert_eq!(scene.children(root), &[a, pooled, b]);

        scene.detach(pooled).unwrap();
        assert_eq!(scene.children(root), &[a, b]);
        assert!(scene.contains(pooled));
        assert!(!scene.is_active_in_hierarchy(pooled) || scene.parent(pooled).is_none());

        assert!(scene.attach(root, a, None).is_err());

        scene.remove(a).unwrap();
        assert!(!scene.contains(a));
        assert_eq!(scene.children(root), &[b]);
    }

    #[test]
    fn test_active_in_hierarchy() {
        let mut scene = Scene::new();
        let root = scene.spawn_root("root");
        let child = scene.spawn("child", root).unwrap();
        assert!(scene.is_active_in_hierarchy(child));
        scene.set_active(root, false).unwrap();
        assert!(!scene.is_active_in_hierarchy(child));
        assert!(scene.is_active(child));
    }

    #[test]
    fn test_missing_node_errors() {
        let mut scene = Scene::new();
        let ghost = NodeId::from_index(42);
        assert!(matches!(
            scene.spawn("x", ghost),
            Err(BindError::NodeNotFound(id)) if id == ghost
        ));
        assert!(scene.children(ghost).is_empty());
        assert!(scene.scope_chain(ghost).is_empty());
    }

    #[test]
    fn test_dispatcher_runs_in_order_after_current_operation() {
        let shared = SharedScene::new(BindingRuntime::new());
        let root = shared.update(|cx| cx.scene_mut().spawn_root("root"));
        let log = Rc::new(RefCell::new(Vec::new()));

        let dispatcher = shared.dispatcher();
        let outer_log = Rc::clone(&log);
        shared.update(move |cx| {
            let first = Rc::clone(&outer_log);
            dispatcher.schedule(move |cx| {
                first.borrow_mut().push(cx.scene().name(root).map(str::to_string));
            });
            let second = Rc::clone(&outer_log);
            dispatcher.schedule(move |_| second.borrow_mut().push(None));
            cx.scene_mut().spawn("child", root).unwrap();
            outer_log.borrow_mut().push(Some("update".to_string()));
        });

        assert_eq!(
            *log.borrow(),
            vec![Some("update".to_string()), Some("root".to_string()), None]
        );
        assert_eq!(shared.dispatcher().pending(), 0);
    }

    #[test]
    fn test_dispatcher_outlived_by_handle() {
        let dispatcher = SharedScene::new(BindingRuntime::new()).dispatcher();
        dispatcher.schedule(|_| panic!("scene is gone"));
        assert_eq!(dispatcher.pending(), 0);
    }
}
