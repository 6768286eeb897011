//! Endpoint references and live property endpoints
//!
//! A reference has the form `<type-name>.<member-name>` and is split on the
//! last `.`, so type names may themselves be namespaced. Type names under a
//! host namespace (`Engine.` by default) are reduced to their last segment.

use std::fmt;

use crate::adapter::{AdapterOptions, BoundAdapter};
use crate::error::{BindError, Result};
use crate::notify::PropertyWatcher;
use crate::reflect::{ObjectRef, PropertyDescriptor};
use crate::registry::TypeRegistry;
use crate::value::{Value, ValueType};

/// Parsed `<type-name>.<member-name>` reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndPointReference {
    pub type_name: String,
    pub member: String,
}

impl fmt::Display for EndPointReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.member)
    }
}

/// Split a reference into type and member
///
/// Fails when there is no separator or either segment is empty. When the
/// type segment starts with one of `host_namespaces`, only its last segment
/// is kept.
pub fn parse_end_point_reference(
    reference: &str,
    host_namespaces: &[String],
) -> Result<EndPointReference> {
    let invalid = |reason| BindError::InvalidEndPoint {
        reference: reference.to_string(),
        reason,
    };
    let (type_name, member) = reference
        .rsplit_once('.')
        .ok_or_else(|| invalid("missing `.` separator"))?;
    if member.is_empty() {
        return Err(invalid("empty member name"));
    }
    if type_name.is_empty() {
        return Err(invalid("empty type name"));
    }
    let type_name = if host_namespaces.iter().any(|ns| type_name.starts_with(ns.as_str())) {
        type_name.rsplit('.').next().unwrap_or(type_name)
    } else {
        type_name
    };
    if type_name.is_empty() {
        return Err(invalid("empty type name"));
    }
    Ok(EndPointReference {
        type_name: type_name.to_string(),
        member: member.to_string(),
    })
}

/// Resolved binding target: owner, cached accessor and optional adapter
///
/// An endpoint whose member could not be resolved is *dead*: reads return
/// null and writes are dropped, both with an error log.
pub struct PropertyEndPoint {
    owner: ObjectRef,
    member: String,
    property: Option<PropertyDescriptor>,
    adapter: Option<BoundAdapter>,
    options: Option<AdapterOptions>,
}

impl PropertyEndPoint {
    /// Resolve `member` on `owner`, producing a dead endpoint on failure
    pub fn new(registry: &TypeRegistry, owner: ObjectRef, member: &str) -> Self {
        let property = registry.property(owner.type_key(), member);
        if property.is_none() {
            tracing::error!(
                owner = %owner.type_key(),
                member,
                "Property not found, end-point is dead"
            );
        }
        Self {
            owner,
            member: member.to_string(),
            property,
            adapter: None,
            options: None,
        }
    }

    /// Resolve `member` on `owner`, failing with `MemberNotFound`
    pub fn resolve(registry: &TypeRegistry, owner: ObjectRef, member: &str) -> Result<Self> {
        let property = registry
            .property(owner.type_key(), member)
            .ok_or_else(|| BindError::MemberNotFound {
                type_name: registry.type_name(owner.type_key()),
                member: member.to_string(),
            })?;
        Ok(Self {
            owner,
            member: member.to_string(),
            property: Some(property),
            adapter: None,
            options: None,
        })
    }

    /// Attach the adapter applied to values written to this endpoint
    pub fn with_adapter(mut self, adapter: Option<BoundAdapter>, options: Option<AdapterOptions>) -> Self {
        self.adapter = adapter;
        self.options = options;
        self
    }

    pub fn owner(&self) -> &ObjectRef {
        &self.owner
    }

    pub fn member(&self) -> &str {
        &self.member
    }

    pub fn is_dead(&self) -> bool {
        self.property.is_none()
    }

    pub fn adapter(&self) -> Option<&BoundAdapter> {
        self.adapter.as_ref()
    }

    /// Declared type of the member; `Any` for dead endpoints
    pub fn value_type(&self) -> ValueType {
        self.property
            .as_ref()
            .map_or(ValueType::Any, |p| p.value_type.clone())
    }

    pub fn get_value(&self) -> Result<Value> {
        let Some(property) = &self.property else {
            tracing::error!(member = %self.member, "Read from dead end-point");
            return Ok(Value::Null);
        };
        let owner = self.owner.borrow();
        property.get(owner.as_any())
    }

    /// Coerce and write `value`, then raise a change notification if the
    /// stored value changed
    ///
    /// A failed coercion is logged and the raw value is still attempted.
    pub fn set_value(&self, value: Value) -> Result<()> {
        let Some(property) = &self.property else {
            tracing::error!(member = %self.member, "Write to dead end-point");
            return Ok(());
        };
        let value = match property.value_type.coerce(value.clone()) {
            Ok(coerced) => coerced,
            Err(err) => {
                tracing::warn!(
                    member = %self.member,
                    error = %err,
                    "Coercion failed, writing raw value"
                );
                value
            }
        };
        let changed = {
            let mut owner = self.owner.borrow_mut();
            property.set(owner.as_any_mut(), value)?
        };
        if changed {
            self.owner.notify(&self.member);
        }
        Ok(())
    }

    /// Run the endpoint's adapter over `value`; identity without one
    pub fn adapt(&self, value: Value) -> Result<Value> {
        match &self.adapter {
            Some(adapter) => adapter.convert(value, self.options.as_ref()),
            None => Ok(value),
        }
    }

    /// Watch the member for change notifications
    pub fn watch(&self, callback: impl Fn() + 'static) -> PropertyWatcher {
        PropertyWatcher::new(&self.owner, &self.member, callback)
    }
}

impl fmt::Debug for PropertyEndPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyEndPoint")
            .field("owner", &self.owner)
            .field("member", &self.member)
            .field("dead", &self.is_dead())
            .field("adapter", &self.adapter)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterRegistry;
    use crate::notify::PropertyNotifier;
    use crate::reflect::{Bindable, TypeDescriptor, TypeKey};
    use proptest::prelude::*;
    use std::any::Any;
    use std::cell::Cell;
    use std::rc::Rc;

    fn namespaces() -> Vec<String> {
        vec!["Engine.".to_string()]
    }

    #[test]
    fn test_parse_splits_on_last_separator() {
        let parsed = parse_end_point_reference("Game.Player.name", &namespaces()).unwrap();
        assert_eq!(parsed.type_name, "Game.Player");
        assert_eq!(parsed.member, "name");
    }

    #[test]
    fn test_parse_strips_host_namespace() {
        let parsed = parse_end_point_reference("Engine.UI.Label.text", &namespaces()).unwrap();
        assert_eq!(parsed.type_name, "Label");
        assert_eq!(parsed.member, "text");
        assert_eq!(parsed.to_string(), "Label.text");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "Player", "Player.", ".name", "."] {
            assert!(
                matches!(
                    parse_end_point_reference(bad, &namespaces()),
                    Err(BindError::InvalidEndPoint { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    proptest! {
        #[test]
        fn prop_well_formed_references_parse(
            ty in "[A-Za-z_][A-Za-z0-9_]{0,12}",
            member in "[A-Za-z_][A-Za-z0-9_]{0,12}",
        ) {
            let parsed = parse_end_point_reference(&format!("{ty}.{member}"), &[]).unwrap();
            prop_assert_eq!(parsed.type_name, ty);
            prop_assert_eq!(parsed.member, member);
        }

        #[test]
        fn prop_references_without_separator_fail(s in "[A-Za-z0-9_ ]{0,20}") {
            prop_assert!(parse_end_point_reference(&s, &[]).is_err());
        }

        #[test]
        fn prop_empty_segment_fails(s in "[A-Za-z0-9_]{1,12}") {
            let no_member = format!("{s}.");
            let no_type = format!(".{s}");
            prop_assert!(parse_end_point_reference(&no_member, &[]).is_err());
            prop_assert!(parse_end_point_reference(&no_type, &[]).is_err());
        }
    }

    struct Score {
        value: i64,
        caption: String,
        notifier: PropertyNotifier,
    }

    impl Bindable for Score {
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
    }

    fn setup() -> (TypeRegistry, ObjectRef) {
        let registry = TypeRegistry::new();
        registry.register(
            TypeDescriptor::builder::<Score>("Score")
                .binding("value", |s| s.value, Some(|s, v| s.value = v))
                .binding("caption", |s| s.caption.clone(), Some(|s, v| s.caption = v))
                .build(),
        );
        let score = ObjectRef::new(Score {
            value: 1,
            caption: "x".into(),
            notifier: PropertyNotifier::new(),
        });
        (registry, score)
    }

    #[test]
    fn test_set_value_coerces_and_notifies_once() {
        let (registry, score) = setup();
        let endpoint = PropertyEndPoint::resolve(&registry, score.clone(), "value").unwrap();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _watcher = endpoint.watch(move || h.set(h.get() + 1));

        endpoint.set_value(Value::Float(5.0)).unwrap();
        assert_eq!(endpoint.get_value().unwrap(), Value::Int(5));
        assert_eq!(hits.get(), 1);

        endpoint.set_value(Value::Int(5)).unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_null_writes_use_defaults() {
        let (registry, score) = setup();
        let value = PropertyEndPoint::resolve(&registry, score.clone(), "value").unwrap();
        let caption = PropertyEndPoint::resolve(&registry, score.clone(), "caption").unwrap();

        value.set_value(Value::Null).unwrap();
        caption.set_value(Value::Null).unwrap();
        assert_eq!(value.get_value().unwrap(), Value::Int(0));
        assert_eq!(caption.get_value().unwrap(), Value::Text(String::new()));
    }

    #[test]
    fn test_failed_coercion_still_attempts_raw_value() {
        let (registry, score) = setup();
        let value = PropertyEndPoint::resolve(&registry, score, "value").unwrap();
        let err = value.set_value(Value::Text("abc".into())).unwrap_err();
        assert!(matches!(err, BindError::Conversion { .. }));
    }

    #[test]
    fn test_dead_end_point_is_soft() {
        let (registry, score) = setup();
        let dead = PropertyEndPoint::new(&registry, score.clone(), "missing");
        assert!(dead.is_dead());
        assert_eq!(dead.get_value().unwrap(), Value::Null);
        dead.set_value(Value::Int(3)).unwrap();

        assert!(matches!(
            PropertyEndPoint::resolve(&registry, score, "missing"),
            Err(BindError::MemberNotFound { .. })
        ));
    }

    #[test]
    fn test_adapt_uses_attached_adapter() {
        let (registry, score) = setup();
        let adapters = AdapterRegistry::with_builtins();
        let adapter = adapters
            .get("int_to_string")
            .unwrap()
            .map(|d| d.create_default());
        let caption = PropertyEndPoint::resolve(&registry, score, "caption")
            .unwrap()
            .with_adapter(adapter, None);
        let adapted = caption.adapt(Value::Int(12)).unwrap();
        caption.set_value(adapted).unwrap();
        assert_eq!(caption.get_value().unwrap(), Value::Text("12".into()));
    }
}
