//! Type registry: descriptors by key and name, lazy module scanning, and
//! bindable-member discovery across base types and interfaces

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::reflect::{
    Describe, MethodDescriptor, PropertyDescriptor, TypeDescriptor, TypeKey, TypeKind,
};
use crate::value::ValueType;

/// Named group of type descriptors, scanned once by the registry
///
/// Built-in modules describe engine types and are never enumerated.
pub trait TypeModule {
    fn name(&self) -> &str;

    fn is_builtin(&self) -> bool {
        false
    }

    fn types(&self) -> Result<Vec<TypeDescriptor>>;
}

/// [`TypeModule`] assembled from [`Describe`] implementations
pub struct DescriptorModule {
    name: String,
    builtin: bool,
    describers: Vec<fn() -> TypeDescriptor>,
}

impl DescriptorModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            builtin: false,
            describers: Vec::new(),
        }
    }

    /// Mark the module as engine-owned
    pub fn builtin(mut self) -> Self {
        self.builtin = true;
        self
    }

    pub fn with<T: Describe>(mut self) -> Self {
        self.describers.push(T::describe);
        self
    }

    pub fn with_descriptor(mut self, describe: fn() -> TypeDescriptor) -> Self {
        self.describers.push(describe);
        self
    }
}

impl TypeModule for DescriptorModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_builtin(&self) -> bool {
        self.builtin
    }

    fn types(&self) -> Result<Vec<TypeDescriptor>> {
        Ok(self.describers.iter().map(|describe| describe()).collect())
    }
}

/// Kind of a discovered bindable member
#[derive(Debug, Clone, PartialEq)]
pub enum MemberKind {
    Property(ValueType),
    Method,
}

/// Bindable member paired with the view-model type it was discovered on
///
/// `declaring_type` is where the bindable tag lives (possibly an interface);
/// `view_model_type` is the concrete type the member is read from.
#[derive(Debug, Clone, PartialEq)]
pub struct BindableMember {
    pub name: String,
    pub kind: MemberKind,
    pub declaring_type: TypeKey,
    pub view_model_type: TypeKey,
}

impl BindableMember {
    pub fn is_method(&self) -> bool {
        matches!(self.kind, MemberKind::Method)
    }
}

impl fmt::Display for BindableMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.view_model_type, self.name)
    }
}

#[derive(Default)]
struct Catalog {
    descriptors: HashMap<TypeKey, Rc<TypeDescriptor>>,
    by_name: HashMap<String, Vec<TypeKey>>,
    order: Vec<TypeKey>,
}

/// Registry of type descriptors
///
/// Descriptors are write-once per key: a second registration of the same
/// type is ignored. Member lists are computed on first request and cached
/// for the registry's lifetime.
#[derive(Default)]
pub struct TypeRegistry {
    catalog: RefCell<Catalog>,
    pending: RefCell<Vec<Box<dyn TypeModule>>>,
    scanning: Cell<bool>,
    properties: RefCell<HashMap<TypeKey, Rc<[BindableMember]>>>,
    methods: RefCell<HashMap<TypeKey, Rc<[BindableMember]>>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor directly; returns `false` if the key was known
    pub fn register(&self, descriptor: TypeDescriptor) -> bool {
        let mut catalog = self.catalog.borrow_mut();
        if catalog.descriptors.contains_key(&descriptor.key) {
            tracing::debug!(type_name = %descriptor.name, "Type already registered, ignoring");
            return false;
        }
        let key = descriptor.key;
        catalog
            .by_name
            .entry(descriptor.name.clone())
            .or_default()
            .push(key);
        if descriptor.name != key.name() {
            catalog
                .by_name
                .entry(key.name().to_string())
                .or_default()
                .push(key);
        }
        catalog.order.push(key);
        catalog.descriptors.insert(key, Rc::new(descriptor));
        true
    }

    pub fn register_type<T: Describe>(&self) -> bool {
        self.register(T::describe())
    }

    /// Queue a module; it is scanned on the next lookup
    pub fn add_module(&self, module: impl TypeModule + 'static) {
        self.pending.borrow_mut().push(Box::new(module));
    }

    fn ensure_scanned(&self) {
        if self.scanning.get() || self.pending.borrow().is_empty() {
            return;
        }
        self.scanning.set(true);
        let modules: Vec<Box<dyn TypeModule>> = self.pending.borrow_mut().drain(..).collect();
        for module in modules {
            if module.is_builtin() {
                tracing::debug!(module = module.name(), "Skipping built-in module");
                continue;
            }
            match module.types() {
                Ok(types) => {
                    let count = types.len();
                    for descriptor in types {
                        self.register(descriptor);
                    }
                    tracing::debug!(module = module.name(), count, "Scanned type module");
                }
                Err(err) => {
                    tracing::warn!(module = module.name(), error = %err, "Type module scan failed");
                }
            }
        }
        self.scanning.set(false);
    }

    pub fn descriptor(&self, key: TypeKey) -> Option<Rc<TypeDescriptor>> {
        self.ensure_scanned();
        self.catalog.borrow().descriptors.get(&key).cloned()
    }

    /// Keys registered under a descriptor name or short Rust type name
    pub fn find_by_name(&self, name: &str) -> Vec<TypeKey> {
        self.ensure_scanned();
        self.catalog
            .borrow()
            .by_name
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether `key` is known under `name`
    pub fn matches_name(&self, key: TypeKey, name: &str) -> bool {
        if key.name() == name {
            return true;
        }
        self.descriptor(key).is_some_and(|d| d.name == name)
    }

    /// Display name for `key`, falling back to the Rust type name
    pub fn type_name(&self, key: TypeKey) -> String {
        self.descriptor(key)
            .map(|d| d.name.clone())
            .unwrap_or_else(|| key.name().to_string())
    }

    /// Registered keys of one kind, in registration order
    pub fn types_of_kind(&self, kind: TypeKind) -> Vec<TypeKey> {
        self.ensure_scanned();
        let catalog = self.catalog.borrow();
        catalog
            .order
            .iter()
            .filter(|key| catalog.descriptors[*key].kind == kind)
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ensure_scanned();
        self.catalog.borrow().descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Breadth-first ancestry: `[key]`, then every parent of that level, ...
    ///
    /// Each type appears in the first level it is reached at; unregistered
    /// parents terminate their branch.
    pub fn ancestry_levels(&self, key: TypeKey) -> Vec<Vec<TypeKey>> {
        let mut levels = Vec::new();
        let mut seen = HashSet::from([key]);
        let mut current = vec![key];
        while !current.is_empty() {
            let mut next = Vec::new();
            for ty in &current {
                if let Some(descriptor) = self.descriptor(*ty) {
                    for parent in descriptor.parents() {
                        if seen.insert(parent) {
                            next.push(parent);
                        }
                    }
                }
            }
            levels.push(std::mem::replace(&mut current, next));
        }
        levels
    }

    /// Whether `key` is `ancestor` or derives from / implements it
    pub fn is_assignable(&self, key: TypeKey, ancestor: TypeKey) -> bool {
        self.ancestry_levels(key)
            .iter()
            .any(|level| level.contains(&ancestor))
    }

    /// Property accessor on the concrete type
    pub fn property(&self, key: TypeKey, name: &str) -> Option<PropertyDescriptor> {
        self.descriptor(key)?.property(name).cloned()
    }

    /// Method invoker on the concrete type
    pub fn method(&self, key: TypeKey, name: &str) -> Option<MethodDescriptor> {
        self.descriptor(key)?.method(name).cloned()
    }

    /// Properties tagged bindable on the type or any of its ancestors
    pub fn bindable_properties(&self, key: TypeKey) -> Rc<[BindableMember]> {
        if let Some(cached) = self.properties.borrow().get(&key) {
            return Rc::clone(cached);
        }
        let members: Rc<[BindableMember]> = self
            .collect_members(key, |descriptor| {
                descriptor
                    .properties
                    .iter()
                    .filter(|p| p.is_bindable())
                    .map(|p| (p.name.clone(), MemberKind::Property(p.value_type.clone())))
                    .collect()
            })
            .into();
        self.properties.borrow_mut().insert(key, Rc::clone(&members));
        members
    }

    /// Zero-argument bindable methods that are not property accessors
    pub fn bindable_methods(&self, key: TypeKey) -> Rc<[BindableMember]> {
        if let Some(cached) = self.methods.borrow().get(&key) {
            return Rc::clone(cached);
        }
        let members: Rc<[BindableMember]> = self
            .collect_members(key, |descriptor| {
                descriptor
                    .methods
                    .iter()
                    .filter(|m| m.is_command())
                    .map(|m| (m.name.clone(), MemberKind::Method))
                    .collect()
            })
            .into();
        self.methods.borrow_mut().insert(key, Rc::clone(&members));
        members
    }

    fn collect_members(
        &self,
        key: TypeKey,
        select: impl Fn(&TypeDescriptor) -> Vec<(String, MemberKind)>,
    ) -> Vec<BindableMember> {
        let mut seen = HashSet::new();
        let mut members = Vec::new();
        for level in self.ancestry_levels(key) {
            for ty in level {
                let Some(descriptor) = self.descriptor(ty) else {
                    continue;
                };
                for (name, kind) in select(&descriptor) {
                    if seen.insert(name.clone()) {
                        members.push(BindableMember {
                            name,
                            kind,
                            declaring_type: ty,
                            view_model_type: key,
                        });
                    }
                }
            }
        }
        members
    }

    /// Whether `name` is a bindable property of `key`
    pub fn is_bindable_property(&self, key: TypeKey, name: &str) -> bool {
        self.bindable_properties(key).iter().any(|m| m.name == name)
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.catalog.borrow().descriptors.len())
            .field("pending_modules", &self.pending.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BindError;
    use crate::reflect::MemberFlags;

    struct Base {
        id: i64,
    }
    struct Derived {
        id: i64,
        name: String,
        hidden: i32,
    }
    trait Named {}

    fn named() -> TypeDescriptor {
        TypeDescriptor::interface::<dyn Named>("Named")
            .property("name", ValueType::Text, true)
            .method("rename", 0, MemberFlags::BINDABLE)
            .method("get_name", 0, MemberFlags::BINDABLE | MemberFlags::ACCESSOR)
            .build()
    }

    fn base() -> TypeDescriptor {
        TypeDescriptor::builder::<Base>("Base")
            .binding("id", |b| b.id, None)
            .build()
    }

    fn derived() -> TypeDescriptor {
        TypeDescriptor::builder::<Derived>("Derived")
            .base::<Base>()
            .implements::<dyn Named>()
            .property("id", |d| d.id, None)
            .property("name", |d| d.name.clone(), Some(|d, v| d.name = v))
            .property("hidden", |d| d.hidden, None)
            .declare_method("with_arg", 1, MemberFlags::BINDABLE)
            .build()
    }

    fn registry() -> TypeRegistry {
        let registry = TypeRegistry::new();
        registry.register(named());
        registry.register(base());
        registry.register(derived());
        registry
    }

    #[test]
    fn test_register_is_write_once() {
        let registry = registry();
        let replacement = TypeDescriptor::builder::<Base>("Other").build();
        assert!(!registry.register(replacement));
        assert_eq!(registry.type_name(TypeKey::of::<Base>()), "Base");
        assert_eq!(registry.find_by_name("Derived"), vec![TypeKey::of::<Derived>()]);
    }

    #[test]
    fn test_ancestry_levels() {
        let registry = registry();
        let levels = registry.ancestry_levels(TypeKey::of::<Derived>());
        assert_eq!(levels[0], vec![TypeKey::of::<Derived>()]);
        assert_eq!(
            levels[1],
            vec![TypeKey::of::<Base>(), TypeKey::of::<dyn Named>()]
        );
        assert_eq!(levels.len(), 2);
        assert!(registry.is_assignable(TypeKey::of::<Derived>(), TypeKey::of::<dyn Named>()));
        assert!(!registry.is_assignable(TypeKey::of::<Base>(), TypeKey::of::<Derived>()));
    }

    #[test]
    fn test_bindable_properties_include_inherited_tags() {
        let registry = registry();
        let key = TypeKey::of::<Derived>();
        let members = registry.bindable_properties(key);
        let names: Vec<_> = members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name"]);

        let name = members.iter().find(|m| m.name == "name").unwrap();
        assert_eq!(name.declaring_type, TypeKey::of::<dyn Named>());
        assert_eq!(name.view_model_type, key);
        assert!(!registry.is_bindable_property(key, "hidden"));
    }

    #[test]
    fn test_bindable_methods_filter_accessors_and_arity() {
        let registry = registry();
        let methods = registry.bindable_methods(TypeKey::of::<Derived>());
        let names: Vec<_> = methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["rename"]);
        assert!(methods[0].is_method());
    }

    struct Broken;

    impl TypeModule for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn types(&self) -> Result<Vec<TypeDescriptor>> {
            Err(BindError::TypeModule {
                module: "broken".into(),
                reason: "cannot enumerate".into(),
            })
        }
    }

    #[test]
    fn test_module_scan_skips_builtin_and_failures() {
        let registry = TypeRegistry::new();
        registry.add_module(Broken);
        registry.add_module(DescriptorModule::new("engine").builtin().with_descriptor(base));
        registry.add_module(DescriptorModule::new("game").with_descriptor(derived));

        assert_eq!(registry.len(), 1);
        assert!(registry.descriptor(TypeKey::of::<Derived>()).is_some());
        assert!(registry.descriptor(TypeKey::of::<Base>()).is_none());
    }
}
