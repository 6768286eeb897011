//! Declarative reflection: type keys, object handles and type descriptors
//!
//! Members are not discovered by walking live objects. Each type describes
//! itself once through a [`TypeDescriptor`] (usually generated by
//! `#[derive(Bindable)]`) that maps member names to typed accessor closures.
//! Descriptors are collected by the [`TypeRegistry`](crate::registry::TypeRegistry).
//!
//! Objects taking part in bindings are shared through [`ObjectRef`], a
//! single-threaded `Rc<RefCell<dyn Bindable>>` handle that compares by
//! identity.

use std::any::{Any, TypeId};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use bitflags::bitflags;

use crate::error::{BindError, Result};
use crate::event::NativeEvent;
use crate::notify::PropertyNotifier;
use crate::value::{BindValue, Value, ValueType};

/// Strongly-typed identity of a reflected type
///
/// Equality and hashing use the `TypeId` only; the name is carried for
/// diagnostics and name-based lookups.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
    full_name: &'static str,
}

impl TypeKey {
    /// Key for a Rust type (interfaces are modelled as marker types)
    pub fn of<T: ?Sized + 'static>() -> Self {
        let full_name = std::any::type_name::<T>();
        Self {
            id: TypeId::of::<T>(),
            name: short_type_name(full_name),
            full_name,
        }
    }

    /// Last path segment of the type name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Fully qualified type name
    pub fn full_name(&self) -> &'static str {
        self.full_name
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }
}

fn short_type_name(full: &'static str) -> &'static str {
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Capability seam implemented by every object that can take part in a binding
///
/// Use `#[derive(Bindable)]` to implement it together with [`Describe`].
pub trait Bindable: Any {
    /// Concrete type of this object
    fn type_key(&self) -> TypeKey;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Property-changed signal, if the object is observable
    fn notifier(&self) -> Option<PropertyNotifier> {
        None
    }

    /// Native event by name
    #[allow(unused_variables)]
    fn event(&self, name: &str) -> Option<NativeEvent> {
        None
    }

    /// Whether this object exposes a view-model on behalf of another object
    fn as_view_model_provider(&self) -> Option<&dyn ViewModelProvider> {
        None
    }
}

/// Exposes a view-model that is not itself attached to the scope
pub trait ViewModelProvider {
    /// The provided view-model, if one is currently assigned
    fn view_model(&self) -> Option<ObjectRef>;

    /// Type name the provided view-model is advertised as
    fn view_model_type_name(&self) -> String;
}

/// Types that can describe their reflected members
pub trait Describe {
    fn describe() -> TypeDescriptor;
}

/// Shared, identity-compared handle to a bindable object
#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<dyn Bindable>>);

impl ObjectRef {
    /// Wrap a fresh object
    pub fn new<T: Bindable>(value: T) -> Self {
        Self(Rc::new(RefCell::new(value)))
    }

    /// Share an object the caller keeps a typed handle to
    pub fn from_rc<T: Bindable>(rc: Rc<RefCell<T>>) -> Self {
        Self(rc)
    }

    pub fn type_key(&self) -> TypeKey {
        self.0.borrow().type_key()
    }

    pub fn borrow(&self) -> Ref<'_, dyn Bindable> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, dyn Bindable> {
        self.0.borrow_mut()
    }

    /// Run `f` against the concrete type, `None` if the type differs
    pub fn with<T: 'static, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let guard = self.0.borrow();
        guard.as_any().downcast_ref::<T>().map(f)
    }

    /// Mutable variant of [`with`](Self::with)
    ///
    /// Change notifications are not raised; call [`notify`](Self::notify)
    /// afterwards.
    pub fn with_mut<T: 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut guard = self.0.borrow_mut();
        guard.as_any_mut().downcast_mut::<T>().map(f)
    }

    /// Mutate the concrete object with notifications deferred
    ///
    /// Anything `f` raises on the object's notifier is delivered after the
    /// borrow is released, so watchers may read the object.
    pub fn update<T: 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let notifier = self.notifier();
        let _deferred = notifier.as_ref().map(PropertyNotifier::defer);
        self.with_mut(f)
    }

    pub fn notifier(&self) -> Option<PropertyNotifier> {
        self.0.borrow().notifier()
    }

    /// Raise a property-changed notification on behalf of the object
    pub fn notify(&self, property: &str) {
        if let Some(notifier) = self.notifier() {
            notifier.raise(property);
        }
    }

    pub fn event(&self, name: &str) -> Option<NativeEvent> {
        self.0.borrow().event(name)
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Address-based identity, stable while the object is alive
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(inner) => write!(f, "ObjectRef({}@{:#x})", inner.type_key().name(), self.id()),
            Err(_) => write!(f, "ObjectRef(<borrowed>@{:#x})", self.id()),
        }
    }
}

bitflags! {
    /// Member attributes recorded in descriptors
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MemberFlags: u8 {
        /// Tagged as a binding target
        const BINDABLE = 1 << 0;
        /// Has a getter
        const READABLE = 1 << 1;
        /// Has a setter
        const WRITABLE = 1 << 2;
        /// Method is a property accessor, never offered as a command
        const ACCESSOR = 1 << 3;
    }
}

/// What role a described type plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Data object exposing bindable members
    ViewModel,
    /// View-side component (label, slider, ...)
    Component,
    /// Declaration-only type other types implement
    Interface,
}

/// Reads a property from a type-erased object
pub type Getter = Rc<dyn Fn(&dyn Any) -> Result<Value>>;

/// Writes a property; returns whether the stored value changed
pub type Setter = Rc<dyn Fn(&mut dyn Any, Value) -> Result<bool>>;

/// Calls a zero-argument method
pub type Invoker = Rc<dyn Fn(&mut dyn Any) -> Result<()>>;

/// Reflected property
#[derive(Clone)]
pub struct PropertyDescriptor {
    pub name: String,
    pub value_type: ValueType,
    pub flags: MemberFlags,
    /// Type that declares the member
    pub declaring_type: TypeKey,
    pub(crate) get: Option<Getter>,
    pub(crate) set: Option<Setter>,
}

impl PropertyDescriptor {
    pub fn is_bindable(&self) -> bool {
        self.flags.contains(MemberFlags::BINDABLE)
    }

    /// Whether the descriptor carries accessors (interfaces only declare)
    pub fn has_accessors(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }

    /// Read the property from `owner`
    pub fn get(&self, owner: &dyn Any) -> Result<Value> {
        match &self.get {
            Some(get) => get(owner),
            None => Err(BindError::Invocation {
                method: self.name.clone(),
                reason: "property has no getter".into(),
            }),
        }
    }

    /// Write the property on `owner`
    pub fn set(&self, owner: &mut dyn Any, value: Value) -> Result<bool> {
        match &self.set {
            Some(set) => set(owner, value),
            None => Err(BindError::ReadOnly(self.name.clone())),
        }
    }
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .field("flags", &self.flags)
            .field("declaring_type", &self.declaring_type)
            .finish()
    }
}

/// Reflected method
#[derive(Clone)]
pub struct MethodDescriptor {
    pub name: String,
    pub arity: usize,
    pub flags: MemberFlags,
    pub declaring_type: TypeKey,
    pub(crate) invoke: Option<Invoker>,
}

impl MethodDescriptor {
    /// Bindable, zero-argument, not an accessor
    pub fn is_command(&self) -> bool {
        self.flags.contains(MemberFlags::BINDABLE)
            && !self.flags.contains(MemberFlags::ACCESSOR)
            && self.arity == 0
    }

    pub fn invoke(&self, owner: &mut dyn Any) -> Result<()> {
        match &self.invoke {
            Some(invoke) if self.arity == 0 => invoke(owner),
            _ => Err(BindError::Invocation {
                method: self.name.clone(),
                reason: format!("method takes {} argument(s) or has no body", self.arity),
            }),
        }
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("flags", &self.flags)
            .finish()
    }
}

/// Reflected native event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDescriptor {
    pub name: String,
}

/// Everything the binding engine knows about one type
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub key: TypeKey,
    pub name: String,
    pub kind: TypeKind,
    pub base: Option<TypeKey>,
    pub interfaces: Vec<TypeKey>,
    pub properties: Vec<PropertyDescriptor>,
    pub methods: Vec<MethodDescriptor>,
    pub events: Vec<EventDescriptor>,
}

impl TypeDescriptor {
    /// Start describing a concrete type
    pub fn builder<T: 'static>(name: impl Into<String>) -> TypeDescriptorBuilder<T> {
        TypeDescriptorBuilder::new(name, TypeKind::ViewModel)
    }

    /// Start describing an interface marker type
    pub fn interface<T: ?Sized + 'static>(name: impl Into<String>) -> InterfaceBuilder {
        InterfaceBuilder {
            descriptor: TypeDescriptor::empty(TypeKey::of::<T>(), name.into(), TypeKind::Interface),
        }
    }

    fn empty(key: TypeKey, name: String, kind: TypeKind) -> Self {
        Self {
            key,
            name,
            kind,
            base: None,
            interfaces: Vec::new(),
            properties: Vec::new(),
            methods: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn has_event(&self, name: &str) -> bool {
        self.events.iter().any(|e| e.name == name)
    }

    /// Base type followed by interfaces
    pub fn parents(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.base.iter().copied().chain(self.interfaces.iter().copied())
    }
}

/// Typed builder for concrete type descriptors
pub struct TypeDescriptorBuilder<T> {
    descriptor: TypeDescriptor,
    _marker: std::marker::PhantomData<fn(T)>,
}

impl<T: 'static> TypeDescriptorBuilder<T> {
    fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            descriptor: TypeDescriptor::empty(TypeKey::of::<T>(), name.into(), kind),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn kind(mut self, kind: TypeKind) -> Self {
        self.descriptor.kind = kind;
        self
    }

    /// Record the base type (for template matching and inherited tags)
    pub fn base<B: 'static>(mut self) -> Self {
        self.descriptor.base = Some(TypeKey::of::<B>());
        self
    }

    pub fn implements<I: ?Sized + 'static>(mut self) -> Self {
        self.descriptor.interfaces.push(TypeKey::of::<I>());
        self
    }

    /// Reflected property that is not a binding target by itself
    pub fn property<V>(self, name: &str, get: fn(&T) -> V, set: Option<fn(&mut T, V)>) -> Self
    where
        V: BindValue + PartialEq + 'static,
    {
        self.push_property(name, MemberFlags::empty(), get, set)
    }

    /// Property tagged as bindable
    pub fn binding<V>(self, name: &str, get: fn(&T) -> V, set: Option<fn(&mut T, V)>) -> Self
    where
        V: BindValue + PartialEq + 'static,
    {
        self.push_property(name, MemberFlags::BINDABLE, get, set)
    }

    fn push_property<V>(
        mut self,
        name: &str,
        flags: MemberFlags,
        get: fn(&T) -> V,
        set: Option<fn(&mut T, V)>,
    ) -> Self
    where
        V: BindValue + PartialEq + 'static,
    {
        let type_name = self.descriptor.name.clone();
        let getter: Getter = {
            let type_name = type_name.clone();
            Rc::new(move |owner: &dyn Any| {
                owner
                    .downcast_ref::<T>()
                    .map(|this| get(this).to_value())
                    .ok_or_else(|| BindError::conversion(&type_name, "foreign object"))
            })
        };
        let setter: Option<Setter> = set.map(|set| {
            Rc::new(move |owner: &mut dyn Any, value: Value| {
                let this = owner
                    .downcast_mut::<T>()
                    .ok_or_else(|| BindError::conversion(&type_name, "foreign object"))?;
                let value = V::from_value(value)?;
                if get(this) == value {
                    return Ok(false);
                }
                set(this, value);
                Ok(true)
            }) as Setter
        });
        let mut flags = flags | MemberFlags::READABLE;
        if setter.is_some() {
            flags |= MemberFlags::WRITABLE;
        }
        self.descriptor.properties.push(PropertyDescriptor {
            name: name.to_string(),
            value_type: V::value_type(),
            flags,
            declaring_type: self.descriptor.key,
            get: Some(getter),
            set: setter,
        });
        self
    }

    /// Bindable zero-argument method
    pub fn method(mut self, name: &str, invoke: fn(&mut T)) -> Self {
        let method = name.to_string();
        let invoker: Invoker = Rc::new(move |owner: &mut dyn Any| {
            let this = owner
                .downcast_mut::<T>()
                .ok_or_else(|| BindError::Invocation {
                    method: method.clone(),
                    reason: "foreign object".into(),
                })?;
            invoke(this);
            Ok(())
        });
        self.descriptor.methods.push(MethodDescriptor {
            name: name.to_string(),
            arity: 0,
            flags: MemberFlags::BINDABLE,
            declaring_type: self.descriptor.key,
            invoke: Some(invoker),
        });
        self
    }

    /// Method known only by signature; never invocable by the engine
    pub fn declare_method(mut self, name: &str, arity: usize, flags: MemberFlags) -> Self {
        self.descriptor.methods.push(MethodDescriptor {
            name: name.to_string(),
            arity,
            flags,
            declaring_type: self.descriptor.key,
            invoke: None,
        });
        self
    }

    pub fn event(mut self, name: &str) -> Self {
        self.descriptor.events.push(EventDescriptor {
            name: name.to_string(),
        });
        self
    }

    pub fn build(self) -> TypeDescriptor {
        self.descriptor
    }
}

/// Builder for declaration-only interface descriptors
pub struct InterfaceBuilder {
    descriptor: TypeDescriptor,
}

impl InterfaceBuilder {
    /// Interface extending another interface
    pub fn extends<I: ?Sized + 'static>(mut self) -> Self {
        self.descriptor.interfaces.push(TypeKey::of::<I>());
        self
    }

    /// Declare a property implementors expose
    pub fn property(mut self, name: &str, value_type: ValueType, bindable: bool) -> Self {
        let flags = if bindable {
            MemberFlags::BINDABLE
        } else {
            MemberFlags::empty()
        };
        self.descriptor.properties.push(PropertyDescriptor {
            name: name.to_string(),
            value_type,
            flags,
            declaring_type: self.descriptor.key,
            get: None,
            set: None,
        });
        self
    }

    /// Declare a method implementors expose
    pub fn method(mut self, name: &str, arity: usize, flags: MemberFlags) -> Self {
        self.descriptor.methods.push(MethodDescriptor {
            name: name.to_string(),
            arity,
            flags,
            declaring_type: self.descriptor.key,
            invoke: None,
        });
        self
    }

    pub fn build(self) -> TypeDescriptor {
        self.descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        count: i32,
        label: String,
    }

    impl Bindable for Counter {
        fn type_key(&self) -> TypeKey {
            TypeKey::of::<Self>()
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn counter_descriptor() -> TypeDescriptor {
        TypeDescriptor::builder::<Counter>("Counter")
            .binding("count", |c| c.count, Some(|c, v| c.count = v))
            .property("label", |c| c.label.clone(), None)
            .method("increment", |c| c.count += 1)
            .build()
    }

    #[test]
    fn test_type_key_names() {
        let key = TypeKey::of::<Counter>();
        assert_eq!(key.name(), "Counter");
        assert!(key.full_name().ends_with("::Counter"));
        assert_eq!(key, TypeKey::of::<Counter>());
        assert_ne!(key, TypeKey::of::<String>());
        assert_eq!(TypeKey::of::<Vec<String>>().name(), "Vec<alloc::string::String>");
    }

    #[test]
    fn test_descriptor_accessors() {
        let desc = counter_descriptor();
        let mut counter = Counter::default();

        let count = desc.property("count").unwrap();
        assert!(count.is_bindable());
        assert!(count.flags.contains(MemberFlags::WRITABLE));
        assert_eq!(count.value_type, ValueType::Int);

        assert!(count.set(&mut counter, Value::Int(3)).unwrap());
        assert!(!count.set(&mut counter, Value::Int(3)).unwrap());
        assert_eq!(count.get(&counter).unwrap(), Value::Int(3));

        let label = desc.property("label").unwrap();
        assert!(!label.is_bindable());
        assert!(matches!(
            label.set(&mut counter, Value::Text("x".into())),
            Err(BindError::ReadOnly(_))
        ));
    }

    #[test]
    fn test_method_invoke() {
        let desc = counter_descriptor();
        let mut counter = Counter::default();
        let method = desc.method("increment").unwrap();
        assert!(method.is_command());
        method.invoke(&mut counter).unwrap();
        assert_eq!(counter.count, 1);
    }

    #[test]
    fn test_object_ref_identity() {
        let a = ObjectRef::new(Counter::default());
        let b = a.clone();
        let c = ObjectRef::new(Counter::default());
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.with(|c: &Counter| c.count), Some(0));
        assert_eq!(a.with(|s: &String| s.len()), None);
        a.with_mut(|c: &mut Counter| c.count = 9);
        assert_eq!(b.with(|c: &Counter| c.count), Some(9));
    }
}
