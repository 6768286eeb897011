use view_bind::prelude::*;
use view_bind::reflect::PropertyDescriptor;
use view_bind::{MemberKind, TypeRegistry, ViewModelProvider};

#[derive(Bindable, Default)]
#[bindable(view_model, name = "Player", methods(heal, reset))]
struct Player {
    #[bindable(notifier)]
    notifier: PropertyNotifier,
    #[bindable(binding)]
    health: f64,
    #[bindable(binding, name = "displayName", read_only)]
    name: String,
    #[bindable(property)]
    level: i32,
    #[bindable(event)]
    died: NativeEvent,
    #[allow(dead_code)]
    cache: Vec<u8>,
}

impl Player {
    fn heal(&mut self) {
        self.health = 100.0;
        self.notifier.raise("health");
    }

    fn reset(&mut self) {
        self.health = 0.0;
        self.level = 1;
    }
}

#[derive(Bindable, Default)]
#[bindable(component)]
struct Gauge {
    #[bindable(binding)]
    fill: f64,
}

trait Shape {}

#[derive(Bindable, Default)]
struct Entity {
    #[bindable(binding)]
    id: i64,
}

#[derive(Bindable, Default)]
#[bindable(base = "Entity", implements(Shape))]
struct Circle {
    #[bindable(binding)]
    radius: f64,
}

struct Slot {
    current: Option<ObjectRef>,
}

impl ViewModelProvider for Slot {
    fn view_model(&self) -> Option<ObjectRef> {
        self.current.clone()
    }

    fn view_model_type_name(&self) -> String {
        "Player".to_string()
    }
}

#[derive(Bindable)]
#[bindable(component, provider)]
#[allow(dead_code)]
struct SlotComponent {
    slot: Slot,
}

impl ViewModelProvider for SlotComponent {
    fn view_model(&self) -> Option<ObjectRef> {
        self.slot.view_model()
    }

    fn view_model_type_name(&self) -> String {
        self.slot.view_model_type_name()
    }
}

fn property(desc: &TypeDescriptor, name: &str) -> PropertyDescriptor {
    desc.property(name)
        .unwrap_or_else(|| panic!("missing property {name}"))
        .clone()
}

#[test]
fn test_descriptor_members() {
    let desc = Player::describe();
    assert_eq!(desc.name, "Player");
    assert_eq!(desc.kind, TypeKind::ViewModel);

    let health = property(&desc, "health");
    assert!(health.is_bindable());
    assert!(health.flags.contains(MemberFlags::WRITABLE));
    assert_eq!(health.value_type, ValueType::Float);

    let name = property(&desc, "displayName");
    assert!(name.is_bindable());
    assert!(!name.flags.contains(MemberFlags::WRITABLE));
    assert!(desc.property("name").is_none());

    let level = property(&desc, "level");
    assert!(!level.is_bindable());
    assert_eq!(level.value_type, ValueType::Int);

    assert!(desc.property("cache").is_none());
    assert!(desc.has_event("died"));
    assert!(desc.method("heal").is_some_and(|m| m.is_command()));
    assert!(desc.method("reset").is_some_and(|m| m.is_command()));
}

#[test]
fn test_accessors_read_and_write_fields() {
    let desc = Player::describe();
    let player = ObjectRef::new(Player {
        name: "Ada".into(),
        ..Player::default()
    });

    let name = property(&desc, "displayName");
    assert_eq!(
        name.get(player.borrow().as_any()).unwrap(),
        Value::Text("Ada".into())
    );

    let health = property(&desc, "health");
    let changed = health
        .set(player.borrow_mut().as_any_mut(), Value::Float(42.0))
        .unwrap();
    assert!(changed);
    assert_eq!(player.with(|p: &Player| p.health), Some(42.0));

    desc.method("heal")
        .unwrap()
        .invoke(player.borrow_mut().as_any_mut())
        .unwrap();
    assert_eq!(player.with(|p: &Player| p.health), Some(100.0));
}

#[test]
fn test_bindable_impl_exposes_notifier_and_events() {
    let player = ObjectRef::new(Player::default());
    assert_eq!(player.type_key(), TypeKey::of::<Player>());
    assert!(player.notifier().is_some());
    assert!(player.event("died").is_some());
    assert!(player.event("missing").is_none());

    let gauge = ObjectRef::new(Gauge::default());
    assert!(gauge.notifier().is_none());
    assert!(gauge.borrow().as_view_model_provider().is_none());
}

#[test]
fn test_component_kind() {
    assert_eq!(Gauge::describe().kind, TypeKind::Component);
    assert_eq!(Gauge::describe().name, "Gauge");
}

#[test]
fn test_base_and_interfaces() {
    let registry = TypeRegistry::new();
    registry.register_type::<Entity>();
    registry.register_type::<Circle>();
    registry.register(TypeDescriptor::interface::<dyn Shape>("Shape").build());

    let circle = TypeKey::of::<Circle>();
    let levels = registry.ancestry_levels(circle);
    assert_eq!(levels[0], vec![circle]);
    assert_eq!(
        levels[1],
        vec![TypeKey::of::<Entity>(), TypeKey::of::<dyn Shape>()]
    );
    assert!(registry.is_assignable(circle, TypeKey::of::<Entity>()));

    let inherited: Vec<String> = registry
        .bindable_properties(circle)
        .iter()
        .filter(|m| matches!(m.kind, MemberKind::Property(_)))
        .map(|m| m.name.clone())
        .collect();
    assert!(inherited.contains(&"radius".to_string()));
    assert!(inherited.contains(&"id".to_string()));
}

#[test]
fn test_provider_forwarding() {
    let player = ObjectRef::new(Player::default());
    let slot = ObjectRef::new(SlotComponent {
        slot: Slot {
            current: Some(player.clone()),
        },
    });
    let borrowed = slot.borrow();
    let provider = borrowed.as_view_model_provider().unwrap();
    assert_eq!(provider.view_model_type_name(), "Player");
    assert_eq!(provider.view_model(), Some(player));
}
