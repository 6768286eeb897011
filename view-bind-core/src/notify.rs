//! Property-changed notification and watchers

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::reflect::ObjectRef;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Rc<dyn Fn(&str)>;

#[derive(Default)]
struct NotifierInner {
    next_id: u64,
    handlers: Vec<(SubscriptionId, Handler)>,
    deferred: usize,
    queued: Vec<String>,
}

/// Named property-changed signal owned by an observable object
///
/// Cloning yields another handle to the same signal. Handlers run
/// synchronously in subscription order; a handler may subscribe or
/// unsubscribe during dispatch, which takes effect on the next `raise`.
#[derive(Clone, Default)]
pub struct PropertyNotifier {
    inner: Rc<RefCell<NotifierInner>>,
}

impl PropertyNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every property change
    pub fn subscribe(&self, handler: impl Fn(&str) + 'static) -> SubscriptionId {
        let mut inner = self.inner.borrow_mut();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.handlers.push((id, Rc::new(handler)));
        id
    }

    /// Remove a subscription; returns `false` if it was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.handlers.len();
        inner.handlers.retain(|(sub, _)| *sub != id);
        inner.handlers.len() != before
    }

    /// Notify subscribers that `property` changed
    ///
    /// While a [`DeferredNotifications`] guard is alive the name is queued
    /// instead and delivered when the last guard drops.
    pub fn raise(&self, property: &str) {
        let handlers: Vec<Handler> = {
            let mut inner = self.inner.borrow_mut();
            if inner.deferred > 0 {
                inner.queued.push(property.to_string());
                return;
            }
            inner.handlers.iter().map(|(_, h)| Rc::clone(h)).collect()
        };
        for handler in handlers {
            handler(property);
        }
    }

    /// Hold back notifications until the returned guard drops
    pub fn defer(&self) -> DeferredNotifications {
        self.inner.borrow_mut().deferred += 1;
        DeferredNotifications(self.clone())
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().handlers.len()
    }
}

impl fmt::Debug for PropertyNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyNotifier")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Guard returned by [`PropertyNotifier::defer`]
pub struct DeferredNotifications(PropertyNotifier);

impl Drop for DeferredNotifications {
    fn drop(&mut self) {
        let queued = {
            let mut inner = self.0.inner.borrow_mut();
            inner.deferred = inner.deferred.saturating_sub(1);
            if inner.deferred == 0 {
                std::mem::take(&mut inner.queued)
            } else {
                Vec::new()
            }
        };
        for property in queued {
            self.0.raise(&property);
        }
    }
}

/// Invokes a callback whenever one named property of an object changes
///
/// Owners without a notifier are accepted; the watcher is then inert.
/// Dropping the watcher disposes it.
pub struct PropertyWatcher {
    owner: Option<ObjectRef>,
    property: String,
    subscription: Option<(PropertyNotifier, SubscriptionId)>,
}

impl PropertyWatcher {
    pub fn new(owner: &ObjectRef, property: &str, callback: impl Fn() + 'static) -> Self {
        let subscription = owner.notifier().map(|notifier| {
            let watched = property.to_string();
            let id = notifier.subscribe(move |changed| {
                if changed == watched {
                    callback();
                }
            });
            (notifier, id)
        });
        if subscription.is_none() {
            tracing::trace!(
                owner = %owner.type_key(),
                property,
                "Owner is not observable, watcher is inert"
            );
        }
        Self {
            owner: Some(owner.clone()),
            property: property.to_string(),
            subscription,
        }
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    /// Whether the watcher still holds a live subscription
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn owner(&self) -> Option<&ObjectRef> {
        self.owner.as_ref()
    }

    /// Unsubscribe and release the owner; safe to call repeatedly
    pub fn dispose(&mut self) {
        if let Some((notifier, id)) = self.subscription.take() {
            notifier.unsubscribe(id);
        }
        self.owner = None;
    }
}

impl Drop for PropertyWatcher {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for PropertyWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyWatcher")
            .field("property", &self.property)
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::{Bindable, TypeKey};
    use std::any::Any;
    use std::cell::Cell;

    struct Observable {
        notifier: PropertyNotifier,
    }

    impl Bindable for Observable {
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

    struct Plain;

    impl Bindable for Plain {
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

    #[test]
    fn test_subscribe_unsubscribe() {
        let notifier = PropertyNotifier::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let id = notifier.subscribe(move |_| h.set(h.get() + 1));

        notifier.raise("x");
        assert_eq!(hits.get(), 1);

        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));
        notifier.raise("x");
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_watcher_filters_by_name() {
        let notifier = PropertyNotifier::new();
        let owner = ObjectRef::new(Observable {
            notifier: notifier.clone(),
        });
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _watcher = PropertyWatcher::new(&owner, "X", move || h.set(h.get() + 1));

        notifier.raise("Y");
        assert_eq!(hits.get(), 0);
        notifier.raise("X");
        assert_eq!(hits.get(), 1);
        notifier.raise("Y");
        notifier.raise("X");
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn test_watcher_dispose_is_idempotent() {
        let notifier = PropertyNotifier::new();
        let owner = ObjectRef::new(Observable {
            notifier: notifier.clone(),
        });
        let mut watcher = PropertyWatcher::new(&owner, "X", || {});
        assert_eq!(notifier.subscriber_count(), 1);

        watcher.dispose();
        watcher.dispose();
        assert_eq!(notifier.subscriber_count(), 0);
        assert!(watcher.owner().is_none());
        assert!(!watcher.is_subscribed());
    }

    #[test]
    fn test_watcher_on_plain_owner_is_inert() {
        let owner = ObjectRef::new(Plain);
        let mut watcher = PropertyWatcher::new(&owner, "X", || panic!("never called"));
        assert!(!watcher.is_subscribed());
        watcher.dispose();
    }

    #[test]
    fn test_deferred_notifications_flush_in_order() {
        let notifier = PropertyNotifier::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        notifier.subscribe(move |p| s.borrow_mut().push(p.to_string()));

        {
            let _outer = notifier.defer();
            notifier.raise("a");
            {
                let _inner = notifier.defer();
                notifier.raise("b");
            }
            assert!(seen.borrow().is_empty());
        }
        assert_eq!(*seen.borrow(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let notifier = PropertyNotifier::new();
        let owner = ObjectRef::new(Observable {
            notifier: notifier.clone(),
        });
        {
            let _watcher = PropertyWatcher::new(&owner, "X", || {});
            assert_eq!(notifier.subscriber_count(), 1);
        }
        assert_eq!(notifier.subscriber_count(), 0);
    }
}
