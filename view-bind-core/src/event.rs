//! Native view events and the watchers that turn them into re-syncs
//!
//! A [`NativeEvent`] is declared with the types of its arguments. The binding
//! engine supports events with at most two arguments; the arity is read once
//! when an [`EventWatcher`] is built and selects an [`EventDispatch`] variant.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::{BindError, Result};
use crate::reflect::ObjectRef;
use crate::value::{Value, ValueType};

/// Largest number of event arguments the engine can watch
pub const MAX_EVENT_ARITY: usize = 2;

/// Identifies a listener registered on a [`NativeEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Rc<dyn Fn(&[Value])>;

struct EventInner {
    params: Vec<ValueType>,
    next_id: u64,
    listeners: Vec<(ListenerId, Listener)>,
}

/// Event raised by a view component (click, value changed, ...)
#[derive(Clone)]
pub struct NativeEvent {
    inner: Rc<RefCell<EventInner>>,
}

impl NativeEvent {
    /// Event carrying arguments of the given types
    pub fn new(params: Vec<ValueType>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(EventInner {
                params,
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    /// Argument-less event
    pub fn unit() -> Self {
        Self::new(Vec::new())
    }

    pub fn arity(&self) -> usize {
        self.inner.borrow().params.len()
    }

    pub fn params(&self) -> Vec<ValueType> {
        self.inner.borrow().params.clone()
    }

    pub fn add_listener(&self, listener: impl Fn(&[Value]) + 'static) -> ListenerId {
        let mut inner = self.inner.borrow_mut();
        let id = ListenerId(inner.next_id);
        inner.next_id += 1;
        inner.listeners.push((id, Rc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.listeners.len();
        inner.listeners.retain(|(l, _)| *l != id);
        inner.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    /// Raise the event; the argument count must match the declaration
    pub fn invoke(&self, args: &[Value]) -> Result<()> {
        let listeners: Vec<Listener> = {
            let inner = self.inner.borrow();
            if args.len() != inner.params.len() {
                return Err(BindError::InvalidEvent {
                    event: "<native>".into(),
                    reason: format!(
                        "expected {} argument(s), got {}",
                        inner.params.len(),
                        args.len()
                    ),
                });
            }
            inner.listeners.iter().map(|(_, l)| Rc::clone(l)).collect()
        };
        for listener in listeners {
            listener(args);
        }
        Ok(())
    }
}

impl Default for NativeEvent {
    fn default() -> Self {
        Self::unit()
    }
}

impl fmt::Debug for NativeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("NativeEvent")
            .field("params", &inner.params)
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

/// Arguments last delivered by a watched event
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EventArgs {
    #[default]
    None,
    One(Value),
    Two(Value, Value),
}

/// Arity-specific dispatch selected when the watcher is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDispatch {
    Nullary,
    Unary,
    Binary,
}

impl EventDispatch {
    fn for_arity(event: &str, arity: usize) -> Result<Self> {
        match arity {
            0 => Ok(EventDispatch::Nullary),
            1 => Ok(EventDispatch::Unary),
            2 => Ok(EventDispatch::Binary),
            n => Err(BindError::InvalidEvent {
                event: event.to_string(),
                reason: format!("{n} arguments, at most {MAX_EVENT_ARITY} are supported"),
            }),
        }
    }

    fn capture(self, args: &[Value]) -> EventArgs {
        match (self, args) {
            (EventDispatch::Unary, [a]) => EventArgs::One(a.clone()),
            (EventDispatch::Binary, [a, b]) => EventArgs::Two(a.clone(), b.clone()),
            _ => EventArgs::None,
        }
    }
}

/// Calls an argument-less callback whenever a component's event fires
///
/// Arguments are cached (see [`last_args`](Self::last_args)) before the
/// callback runs; they are never passed through.
pub struct EventWatcher {
    event: Option<NativeEvent>,
    listener: Option<ListenerId>,
    dispatch: EventDispatch,
    last_args: Rc<RefCell<EventArgs>>,
}

impl EventWatcher {
    pub fn new(component: &ObjectRef, event_name: &str, callback: impl Fn() + 'static) -> Result<Self> {
        let event = component
            .event(event_name)
            .ok_or_else(|| BindError::EventNotFound {
                type_name: component.type_key().name().to_string(),
                event: event_name.to_string(),
            })?;
        let dispatch = EventDispatch::for_arity(event_name, event.arity())?;
        let last_args = Rc::new(RefCell::new(EventArgs::None));

        let cache = Rc::clone(&last_args);
        let listener = event.add_listener(move |args| {
            *cache.borrow_mut() = dispatch.capture(args);
            callback();
        });

        tracing::debug!(event = event_name, ?dispatch, "Watching native event");
        Ok(Self {
            event: Some(event),
            listener: Some(listener),
            dispatch,
            last_args,
        })
    }

    pub fn dispatch(&self) -> EventDispatch {
        self.dispatch
    }

    pub fn last_args(&self) -> EventArgs {
        self.last_args.borrow().clone()
    }

    /// Remove the listener; safe to call repeatedly
    pub fn dispose(&mut self) {
        if let (Some(event), Some(listener)) = (self.event.take(), self.listener.take()) {
            event.remove_listener(listener);
        }
    }
}

impl Drop for EventWatcher {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for EventWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventWatcher")
            .field("dispatch", &self.dispatch)
            .field("attached", &self.event.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::{Bindable, TypeKey};
    use std::any::Any;
    use std::cell::Cell;

    struct Widget {
        clicked: NativeEvent,
        changed: NativeEvent,
        dragged: NativeEvent,
        wide: NativeEvent,
    }

    impl Widget {
        fn new() -> Self {
            Self {
                clicked: NativeEvent::unit(),
                changed: NativeEvent::new(vec![ValueType::Float]),
                dragged: NativeEvent::new(vec![ValueType::Float, ValueType::Float]),
                wide: NativeEvent::new(vec![ValueType::Int; 3]),
            }
        }
    }

    impl Bindable for Widget {
        fn type_key(&self) -> TypeKey {
            TypeKey::of::<Self>()
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
        fn event(&self, name: &str) -> Option<NativeEvent> {
            match name {
                "clicked" => Some(self.clicked.clone()),
                "changed" => Some(self.changed.clone()),
                "dragged" => Some(self.dragged.clone()),
                "wide" => Some(self.wide.clone()),
                _ => None,
            }
        }
    }

    fn counter() -> (Rc<Cell<usize>>, impl Fn() + 'static) {
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        (hits, move || h.set(h.get() + 1))
    }

    #[test]
    fn test_nullary_event() {
        let widget = ObjectRef::new(Widget::new());
        let (hits, cb) = counter();
        let watcher = EventWatcher::new(&widget, "clicked", cb).unwrap();
        assert_eq!(watcher.dispatch(), EventDispatch::Nullary);

        widget.event("clicked").unwrap().invoke(&[]).unwrap();
        assert_eq!(hits.get(), 1);
        assert_eq!(watcher.last_args(), EventArgs::None);
    }

    #[test]
    fn test_unary_and_binary_cache_args() {
        let widget = ObjectRef::new(Widget::new());
        let (hits, cb) = counter();
        let unary = EventWatcher::new(&widget, "changed", cb).unwrap();
        widget
            .event("changed")
            .unwrap()
            .invoke(&[Value::Float(0.5)])
            .unwrap();
        assert_eq!(hits.get(), 1);
        assert_eq!(unary.last_args(), EventArgs::One(Value::Float(0.5)));

        let (hits2, cb2) = counter();
        let binary = EventWatcher::new(&widget, "dragged", cb2).unwrap();
        assert_eq!(binary.dispatch(), EventDispatch::Binary);
        widget
            .event("dragged")
            .unwrap()
            .invoke(&[Value::Float(1.0), Value::Float(2.0)])
            .unwrap();
        assert_eq!(hits2.get(), 1);
        assert_eq!(
            binary.last_args(),
            EventArgs::Two(Value::Float(1.0), Value::Float(2.0))
        );
    }

    #[test]
    fn test_arity_above_two_fails() {
        let widget = ObjectRef::new(Widget::new());
        let result = EventWatcher::new(&widget, "wide", || {});
        assert!(matches!(result, Err(BindError::InvalidEvent { .. })));
        assert_eq!(widget.event("wide").unwrap().listener_count(), 0);
    }

    #[test]
    fn test_unknown_event() {
        let widget = ObjectRef::new(Widget::new());
        let result = EventWatcher::new(&widget, "missing", || {});
        assert!(matches!(result, Err(BindError::EventNotFound { .. })));
    }

    #[test]
    fn test_dispose_removes_listener() {
        let widget = ObjectRef::new(Widget::new());
        let (hits, cb) = counter();
        let mut watcher = EventWatcher::new(&widget, "clicked", cb).unwrap();
        let event = widget.event("clicked").unwrap();
        assert_eq!(event.listener_count(), 1);

        watcher.dispose();
        watcher.dispose();
        assert_eq!(event.listener_count(), 0);
        event.invoke(&[]).unwrap();
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn test_invoke_checks_argument_count() {
        let event = NativeEvent::new(vec![ValueType::Bool]);
        assert!(event.invoke(&[]).is_err());
        assert!(event.invoke(&[Value::Bool(true)]).is_ok());
    }
}
