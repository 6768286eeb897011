//! Template selection, pooling and instance bookkeeping
//!
//! A [`Template`] builds a node subtree for items of one view-model type.
//! [`find_template_for_type`] picks the template nearest to an item's runtime
//! type, walking its ancestry breadth-first; two candidates at the same
//! distance are an error. [`TemplateHost`] ties selection, an optional
//! [`TemplatePool`] and the [`InstantiatedTemplates`] map together for the
//! template and collection bindings.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;

use crate::error::{BindError, Result};
use crate::notify::PropertyNotifier;
use crate::reflect::{
    Bindable, Describe, ObjectRef, TypeDescriptor, TypeKey, TypeKind, ViewModelProvider,
};
use crate::registry::TypeRegistry;
use crate::scene::{BindCx, NodeId, Scene};
use crate::value::Value;

type BuildFn = Rc<dyn Fn(&mut Scene, NodeId) -> Result<()>>;

/// Prototype subtree tagged with the view-model type it expects
#[derive(Clone)]
pub struct Template {
    view_model_type: TypeKey,
    name: String,
    build: BuildFn,
}

impl Template {
    /// Template for items of type `T` (a concrete type or `dyn Interface`)
    ///
    /// `build` populates the freshly created instance node with components,
    /// bindings and children.
    pub fn new<T: ?Sized + 'static>(
        name: impl Into<String>,
        build: impl Fn(&mut Scene, NodeId) -> Result<()> + 'static,
    ) -> Self {
        Self::for_type(TypeKey::of::<T>(), name, build)
    }

    pub fn for_type(
        view_model_type: TypeKey,
        name: impl Into<String>,
        build: impl Fn(&mut Scene, NodeId) -> Result<()> + 'static,
    ) -> Self {
        Self {
            view_model_type,
            name: name.into(),
            build: Rc::new(build),
        }
    }

    pub fn view_model_type(&self) -> TypeKey {
        self.view_model_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("view_model_type", &self.view_model_type)
            .finish()
    }
}

/// Host capability for creating and tearing down template instances
pub trait TemplateFactory {
    /// Create an instance, parented under `parent` or detached
    fn instantiate(&mut self, template: &Template, parent: Option<NodeId>) -> Result<NodeId>;

    fn set_active(&mut self, instance: NodeId, active: bool) -> Result<()>;

    /// Release an instance whose bindings are already disconnected
    fn destroy(&mut self, instance: NodeId) -> Result<()>;
}

impl TemplateFactory for Scene {
    fn instantiate(&mut self, template: &Template, parent: Option<NodeId>) -> Result<NodeId> {
        let node = match parent {
            Some(parent) => self.spawn(template.name(), parent)?,
            None => self.spawn_detached(template.name()),
        };
        if let Err(err) = (template.build)(self, node) {
            self.remove(node)?;
            return Err(err);
        }
        tracing::debug!(template = template.name(), ?node, "Instantiated template");
        Ok(node)
    }

    fn set_active(&mut self, instance: NodeId, active: bool) -> Result<()> {
        Scene::set_active(self, instance, active)
    }

    fn destroy(&mut self, instance: NodeId) -> Result<()> {
        self.remove(instance)
    }
}

/// Template lookup by item type
///
/// The direct type-to-template map is built on first use and cached until
/// the template list changes.
#[derive(Debug, Default)]
pub struct TemplateSelector {
    templates: Vec<Template>,
    available: RefCell<Option<Rc<HashMap<TypeKey, Template>>>>,
}

impl TemplateSelector {
    pub fn new(templates: Vec<Template>) -> Self {
        Self {
            templates,
            available: RefCell::new(None),
        }
    }

    pub fn add(&mut self, template: Template) {
        self.templates.push(template);
        self.available.replace(None);
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    /// Direct map from view-model type to template
    ///
    /// Fails with `DuplicateTemplate` when two templates claim the same type.
    pub fn available(&self) -> Result<Rc<HashMap<TypeKey, Template>>> {
        if let Some(map) = self.available.borrow().as_ref() {
            return Ok(Rc::clone(map));
        }
        let mut map = HashMap::with_capacity(self.templates.len());
        for template in &self.templates {
            let key = template.view_model_type();
            if map.insert(key, template.clone()).is_some() {
                return Err(BindError::DuplicateTemplate(key.name().to_string()));
            }
        }
        let map = Rc::new(map);
        self.available.replace(Some(Rc::clone(&map)));
        Ok(map)
    }

    pub fn select(&self, registry: &TypeRegistry, key: TypeKey) -> Result<Template> {
        let available = self.available()?;
        find_template_for_type(registry, &available, key)
    }
}

/// Template for `key`, searched level by level through its ancestry
///
/// Level 0 is the type itself, level 1 its base and interfaces, and so on.
/// The first level with a match decides; more than one match there is
/// `AmbiguousType`, no match anywhere is `TemplateNotFound`.
pub fn find_template_for_type(
    registry: &TypeRegistry,
    available: &HashMap<TypeKey, Template>,
    key: TypeKey,
) -> Result<Template> {
    for level in registry.ancestry_levels(key) {
        let matches: Vec<&Template> = level.iter().filter_map(|ty| available.get(ty)).collect();
        match matches.as_slice() {
            [] => continue,
            [single] => return Ok((*single).clone()),
            many => {
                return Err(BindError::AmbiguousType {
                    type_name: registry.type_name(key),
                    candidates: many
                        .iter()
                        .map(|t| registry.type_name(t.view_model_type()))
                        .collect(),
                })
            }
        }
    }
    Err(BindError::TemplateNotFound(registry.type_name(key)))
}

/// Free lists of deactivated instances keyed by template type
#[derive(Debug, Default)]
pub struct TemplatePool {
    free: HashMap<TypeKey, VecDeque<NodeId>>,
}

impl TemplatePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&mut self, key: TypeKey) -> Option<NodeId> {
        self.free.get_mut(&key).and_then(VecDeque::pop_front)
    }

    pub fn release(&mut self, key: TypeKey, node: NodeId) {
        self.free.entry(key).or_default().push_back(node);
    }

    pub fn available(&self, key: TypeKey) -> usize {
        self.free.get(&key).map_or(0, VecDeque::len)
    }

    pub fn total(&self) -> usize {
        self.free.values().map(VecDeque::len).sum()
    }

    /// Empty the pool, returning every pooled node
    pub fn drain(&mut self) -> Vec<NodeId> {
        self.free.drain().flat_map(|(_, nodes)| nodes).collect()
    }
}

/// Live instance for one bound item
#[derive(Debug, Clone)]
pub struct TemplateInstance {
    pub item: Value,
    pub node: NodeId,
    pub template: TypeKey,
}

/// Bound items and their instances, in display order
///
/// Items are matched by [`Value`] equality, which is identity for objects
/// and collections.
#[derive(Debug, Default)]
pub struct InstantiatedTemplates {
    entries: Vec<TemplateInstance>,
}

impl InstantiatedTemplates {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, item: &Value) -> bool {
        self.position(item).is_some()
    }

    pub fn get(&self, item: &Value) -> Option<&TemplateInstance> {
        self.position(item).map(|i| &self.entries[i])
    }

    fn position(&self, item: &Value) -> Option<usize> {
        self.entries.iter().position(|e| e.item == *item)
    }

    /// Insert at `index` (appends when `None` or out of range); returns the
    /// slot used
    fn insert(&mut self, index: Option<usize>, instance: TemplateInstance) -> usize {
        let slot = index.unwrap_or(self.entries.len()).min(self.entries.len());
        self.entries.insert(slot, instance);
        slot
    }

    fn remove(&mut self, item: &Value) -> Option<TemplateInstance> {
        self.position(item).map(|i| self.entries.remove(i))
    }

    fn take_all(&mut self) -> Vec<TemplateInstance> {
        std::mem::take(&mut self.entries)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TemplateInstance> {
        self.entries.iter()
    }

    pub fn nodes(&self) -> Vec<NodeId> {
        self.entries.iter().map(|e| e.node).collect()
    }

    pub fn items(&self) -> Vec<Value> {
        self.entries.iter().map(|e| e.item.clone()).collect()
    }
}

/// Component attached to every template instance
///
/// Exposes the bound item as `TemplateItem.value` and, for object items, as
/// a view-model advertised under the template's type name.
pub struct TemplateItem {
    item: Value,
    type_name: String,
    notifier: PropertyNotifier,
}

impl TemplateItem {
    pub fn new(item: Value, type_name: impl Into<String>) -> Self {
        Self {
            item,
            type_name: type_name.into(),
            notifier: PropertyNotifier::new(),
        }
    }

    pub fn item(&self) -> &Value {
        &self.item
    }
}

impl Bindable for TemplateItem {
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

    fn as_view_model_provider(&self) -> Option<&dyn ViewModelProvider> {
        Some(self)
    }
}

impl ViewModelProvider for TemplateItem {
    fn view_model(&self) -> Option<ObjectRef> {
        self.item.as_object().cloned()
    }

    fn view_model_type_name(&self) -> String {
        self.type_name.clone()
    }
}

impl Describe for TemplateItem {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::builder::<TemplateItem>("TemplateItem")
            .kind(TypeKind::Component)
            .binding("value", |t| t.item.clone(), None)
            .build()
    }
}

/// Instances of one binding point
#[derive(Debug)]
pub struct TemplateHost {
    selector: TemplateSelector,
    pool: Option<TemplatePool>,
    instances: InstantiatedTemplates,
}

impl TemplateHost {
    pub fn new(selector: TemplateSelector, pooled: bool) -> Self {
        Self {
            selector,
            pool: pooled.then(TemplatePool::new),
            instances: InstantiatedTemplates::default(),
        }
    }

    pub fn selector(&self) -> &TemplateSelector {
        &self.selector
    }

    pub fn instances(&self) -> &InstantiatedTemplates {
        &self.instances
    }

    pub fn pool(&self) -> Option<&TemplatePool> {
        self.pool.as_ref()
    }

    /// Fill the pool with `count` inactive instances per template
    pub fn prewarm(&mut self, cx: &mut BindCx<'_>, count: usize) -> Result<()> {
        let Some(pool) = self.pool.as_mut() else {
            return Ok(());
        };
        let available = self.selector.available()?;
        for template in available.values() {
            let key = template.view_model_type();
            let type_name = cx.runtime().types().type_name(key);
            while pool.available(key) < count {
                let scene = cx.scene_mut();
                let node = scene.instantiate(template, None)?;
                scene.insert_component(node, 0, ObjectRef::new(TemplateItem::new(Value::Null, &type_name)))?;
                TemplateFactory::set_active(scene, node, false)?;
                pool.release(key, node);
            }
        }
        tracing::debug!(pooled = pool.total(), "Pre-warmed template pool");
        Ok(())
    }

    /// Instantiate (or reuse) a template for `item` under `parent`
    ///
    /// `index` is the item's position among this host's instances. The new
    /// instance's bindings are connected before returning.
    pub fn spawn(
        &mut self,
        cx: &mut BindCx<'_>,
        parent: NodeId,
        item: Value,
        index: Option<usize>,
    ) -> Result<NodeId> {
        if let Some(existing) = self.instances.get(&item) {
            tracing::warn!(?item, node = ?existing.node, "Item already has an instance, skipping");
            return Ok(existing.node);
        }
        let item_type = item
            .type_key()
            .ok_or_else(|| BindError::TemplateNotFound("null".to_string()))?;
        let template = self.selector.select(cx.runtime().types(), item_type)?;
        let key = template.view_model_type();
        let type_name = cx.runtime().types().type_name(key);

        let pooled = self.pool.as_mut().and_then(|pool| pool.acquire(key));
        let node = match pooled {
            Some(node) => {
                tracing::trace!(template = template.name(), ?node, "Reusing pooled instance");
                node
            }
            None => cx.scene_mut().instantiate(&template, None)?,
        };
        Self::set_item(cx.scene_mut(), node, item.clone(), &type_name)?;

        let slot = self.instances.insert(
            index,
            TemplateInstance {
                item,
                node,
                template: key,
            },
        );
        let position = self
            .instances
            .entries
            .get(slot + 1)
            .and_then(|next| cx.scene().children(parent).iter().position(|c| *c == next.node));
        let scene = cx.scene_mut();
        scene.attach(node, parent, position)?;
        TemplateFactory::set_active(scene, node, true)?;
        cx.connect_subtree(node)?;
        Ok(node)
    }

    fn set_item(scene: &mut Scene, node: NodeId, item: Value, type_name: &str) -> Result<()> {
        match scene.component::<TemplateItem>(node) {
            Some(existing) => {
                existing.with_mut(|t: &mut TemplateItem| {
                    t.item = item;
                    t.type_name = type_name.to_string();
                });
                Ok(())
            }
            None => scene.insert_component(node, 0, ObjectRef::new(TemplateItem::new(item, type_name))),
        }
    }

    /// Tear down the instance bound to `item`; returns whether one existed
    pub fn despawn(&mut self, cx: &mut BindCx<'_>, item: &Value) -> bool {
        match self.instances.remove(item) {
            Some(instance) => {
                self.release(cx, instance);
                true
            }
            None => {
                tracing::debug!(?item, "No instance for removed item");
                false
            }
        }
    }

    fn release(&mut self, cx: &mut BindCx<'_>, instance: TemplateInstance) {
        cx.disconnect_subtree(instance.node);
        let scene = cx.scene_mut();
        let result = match self.pool.as_mut() {
            Some(pool) => {
                if let Some(item) = scene.component::<TemplateItem>(instance.node) {
                    item.with_mut(|t: &mut TemplateItem| t.item = Value::Null);
                }
                let parked = scene
                    .detach(instance.node)
                    .and_then(|()| TemplateFactory::set_active(scene, instance.node, false));
                if parked.is_ok() {
                    pool.release(instance.template, instance.node);
                }
                parked
            }
            None => scene.destroy(instance.node),
        };
        if let Err(err) = result {
            tracing::warn!(node = ?instance.node, error = %err, "Failed to release template instance");
        }
    }

    /// Tear down every live instance
    pub fn clear(&mut self, cx: &mut BindCx<'_>) {
        let instances = self.instances.take_all();
        if !instances.is_empty() {
            tracing::debug!(count = instances.len(), "Clearing template instances");
        }
        for instance in instances {
            self.release(cx, instance);
        }
    }

    /// Clear and destroy pooled instances
    pub fn shutdown(&mut self, cx: &mut BindCx<'_>) {
        self.clear(cx);
        let pooled = self.pool.as_mut().map(TemplatePool::drain).unwrap_or_default();
        for node in pooled {
            if let Err(err) = cx.scene_mut().destroy(node) {
                tracing::warn!(?node, error = %err, "Failed to destroy pooled instance");
            }
        }
    }
}
