//! Observable list with add/remove/reset change notification

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::value::Value;

/// Change delivered to collection subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionChange {
    /// Items inserted starting at `index` (`None` when the position is unknown)
    Add {
        items: Vec<Value>,
        index: Option<usize>,
    },
    /// Items removed, previously starting at `index`
    Remove {
        items: Vec<Value>,
        index: Option<usize>,
    },
    /// Contents changed wholesale; consumers must resynchronize from scratch
    Reset,
}

/// Identifies a collection subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollectionSubscription(u64);

type ChangeHandler = Rc<dyn Fn(&CollectionChange)>;

#[derive(Default)]
struct ListInner {
    items: Vec<Value>,
    next_id: u64,
    handlers: Vec<(CollectionSubscription, ChangeHandler)>,
}

/// Shared list of values raising [`CollectionChange`] notifications
///
/// Clones share storage. Handlers run after the mutation completes, so they
/// may read the list freely.
#[derive(Clone, Default)]
pub struct ObservableList {
    inner: Rc<RefCell<ListInner>>,
}

impl ObservableList {
    pub fn new() -> Self {
        Self::default()
    }

    /// List pre-filled with `items`, no notification raised
    pub fn from_items(items: impl IntoIterator<Item = Value>) -> Self {
        let list = Self::new();
        list.inner.borrow_mut().items = items.into_iter().collect();
        list
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.inner.borrow().items.get(index).cloned()
    }

    /// Snapshot of the current items
    pub fn items(&self) -> Vec<Value> {
        self.inner.borrow().items.clone()
    }

    pub fn index_of(&self, item: &Value) -> Option<usize> {
        self.inner.borrow().items.iter().position(|v| v == item)
    }

    pub fn push(&self, item: Value) {
        let index = self.len();
        self.insert(index, item);
    }

    /// Insert at `index`; indices past the end append
    pub fn insert(&self, index: usize, item: Value) {
        let index = {
            let mut inner = self.inner.borrow_mut();
            let index = index.min(inner.items.len());
            inner.items.insert(index, item.clone());
            index
        };
        self.emit(&CollectionChange::Add {
            items: vec![item],
            index: Some(index),
        });
    }

    pub fn extend(&self, items: impl IntoIterator<Item = Value>) {
        let items: Vec<Value> = items.into_iter().collect();
        if items.is_empty() {
            return;
        }
        let index = {
            let mut inner = self.inner.borrow_mut();
            let index = inner.items.len();
            inner.items.extend(items.iter().cloned());
            index
        };
        self.emit(&CollectionChange::Add {
            items,
            index: Some(index),
        });
    }

    pub fn remove_at(&self, index: usize) -> Option<Value> {
        let removed = {
            let mut inner = self.inner.borrow_mut();
            if index >= inner.items.len() {
                return None;
            }
            inner.items.remove(index)
        };
        self.emit(&CollectionChange::Remove {
            items: vec![removed.clone()],
            index: Some(index),
        });
        Some(removed)
    }

    /// Remove the first occurrence of `item`
    pub fn remove(&self, item: &Value) -> bool {
        match self.index_of(item) {
            Some(index) => self.remove_at(index).is_some(),
            None => false,
        }
    }

    pub fn clear(&self) {
        self.inner.borrow_mut().items.clear();
        self.emit(&CollectionChange::Reset);
    }

    /// Replace all contents, raising a single `Reset`
    pub fn replace_all(&self, items: impl IntoIterator<Item = Value>) {
        self.inner.borrow_mut().items = items.into_iter().collect();
        self.emit(&CollectionChange::Reset);
    }

    pub fn subscribe(&self, handler: impl Fn(&CollectionChange) + 'static) -> CollectionSubscription {
        let mut inner = self.inner.borrow_mut();
        let id = CollectionSubscription(inner.next_id);
        inner.next_id += 1;
        inner.handlers.push((id, Rc::new(handler)));
        id
    }

    pub fn unsubscribe(&self, id: CollectionSubscription) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.handlers.len();
        inner.handlers.retain(|(sub, _)| *sub != id);
        inner.handlers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().handlers.len()
    }

    pub fn ptr_eq(&self, other: &ObservableList) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn emit(&self, change: &CollectionChange) {
        let handlers: Vec<ChangeHandler> = self
            .inner
            .borrow()
            .handlers
            .iter()
            .map(|(_, h)| Rc::clone(h))
            .collect();
        for handler in handlers {
            handler(change);
        }
    }
}

/// Lists compare by identity
impl PartialEq for ObservableList {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ObservableList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ObservableList")
            .field("len", &inner.items.len())
            .field("subscribers", &inner.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(list: &ObservableList) -> Rc<RefCell<Vec<CollectionChange>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        list.subscribe(move |change| sink.borrow_mut().push(change.clone()));
        log
    }

    #[test]
    fn test_add_reports_index() {
        let list = ObservableList::new();
        let log = recorder(&list);

        list.push(Value::Int(1));
        list.insert(0, Value::Int(0));
        list.insert(99, Value::Int(2));

        assert_eq!(list.items(), vec![Value::Int(0), Value::Int(1), Value::Int(2)]);
        assert_eq!(
            log.borrow()[1],
            CollectionChange::Add {
                items: vec![Value::Int(0)],
                index: Some(0)
            }
        );
        assert_eq!(
            log.borrow()[2],
            CollectionChange::Add {
                items: vec![Value::Int(2)],
                index: Some(2)
            }
        );
    }

    #[test]
    fn test_remove_and_clear() {
        let list = ObservableList::from_items([Value::Int(1), Value::Int(2)]);
        let log = recorder(&list);

        assert!(list.remove(&Value::Int(2)));
        assert!(!list.remove(&Value::Int(5)));
        list.clear();

        let log = log.borrow();
        assert_eq!(
            log[0],
            CollectionChange::Remove {
                items: vec![Value::Int(2)],
                index: Some(1)
            }
        );
        assert_eq!(log[1], CollectionChange::Reset);
        assert!(list.is_empty());
    }

    #[test]
    fn test_handler_can_read_list() {
        let list = ObservableList::new();
        let seen = Rc::new(RefCell::new(0));
        let (l, s) = (list.clone(), Rc::clone(&seen));
        list.subscribe(move |_| *s.borrow_mut() = l.len());

        list.extend([Value::Int(1), Value::Int(2)]);
        assert_eq!(*seen.borrow(), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let list = ObservableList::new();
        let log = Rc::new(RefCell::new(0));
        let l = Rc::clone(&log);
        let id = list.subscribe(move |_| *l.borrow_mut() += 1);
        assert!(list.unsubscribe(id));
        list.push(Value::Null);
        assert_eq!(*log.borrow(), 0);
        assert_eq!(list.subscriber_count(), 0);
    }
}
