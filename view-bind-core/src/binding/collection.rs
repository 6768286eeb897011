use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::collection::{CollectionChange, CollectionSubscription, ObservableList};
use crate::endpoint::PropertyEndPoint;
use crate::error::{BindError, Result};
use crate::notify::PropertyWatcher;
use crate::scene::{BindCx, Dispatcher, NodeId};
use crate::template::{Template, TemplateHost, TemplateSelector};
use crate::value::{Value, ValueType};

use super::{view_model_end_point, Binding, Connection};

/// One template instance per item of an observable list
///
/// Adds instantiate at the reported index, removes tear down the instance of
/// each removed item and a reset tears everything down before rebuilding
/// from the list's current contents. Replacing the list
/// property itself rebinds from scratch. A plain list value is populated once
/// and never tracked.
///
/// Pooling follows `pool.enabled` in the runtime config unless overridden.
#[derive(Debug)]
pub struct CollectionBinding {
    view_model_property: String,
    templates: Vec<Template>,
    pooled: Option<bool>,
    state: Option<Connected>,
}

#[derive(Debug)]
struct Connected {
    bound: Rc<Bound>,
    watcher: PropertyWatcher,
}

#[derive(Debug)]
struct Bound {
    node: NodeId,
    source: PropertyEndPoint,
    host: RefCell<TemplateHost>,
    list: RefCell<Option<(ObservableList, CollectionSubscription)>>,
    connection: Connection,
    dispatcher: Dispatcher,
}

impl Bound {
    fn bind_collection(self: &Rc<Self>, cx: &mut BindCx<'_>) -> Result<()> {
        let items = match self.source.get_value()? {
            Value::Null => return Ok(()),
            Value::Collection(list) => {
                self.subscribe(&list);
                list.items()
            }
            Value::List(items) => items,
            other => {
                return Err(BindError::conversion(ValueType::Collection, other.type_name()));
            }
        };
        let mut host = self.host.borrow_mut();
        for (index, item) in items.into_iter().enumerate() {
            host.spawn(cx, self.node, item, Some(index))?;
        }
        Ok(())
    }

    fn subscribe(self: &Rc<Self>, list: &ObservableList) {
        let weak: Weak<Self> = Rc::downgrade(self);
        let subscription = list.subscribe(move |change| {
            let Some(bound) = weak.upgrade() else {
                return;
            };
            if !bound.connection.is_open() {
                return;
            }
            let change = change.clone();
            let target = Rc::clone(&bound);
            bound
                .dispatcher
                .schedule(move |cx| target.apply(cx, change));
        });
        self.list.replace(Some((list.clone(), subscription)));
    }

    fn unbind_collection(&self, cx: &mut BindCx<'_>) {
        if let Some((list, subscription)) = self.list.take() {
            list.unsubscribe(subscription);
        }
        self.host.borrow_mut().clear(cx);
    }

    fn rebind_collection(self: &Rc<Self>, cx: &mut BindCx<'_>) {
        if !self.connection.is_open() {
            return;
        }
        tracing::debug!(property = self.source.member(), "Collection property replaced, rebinding");
        self.unbind_collection(cx);
        if let Err(err) = self.bind_collection(cx) {
            tracing::error!(property = self.source.member(), error = %err, "Collection rebind failed");
        }
    }

    fn apply(&self, cx: &mut BindCx<'_>, change: CollectionChange) {
        if !self.connection.is_open() {
            return;
        }
        let mut host = self.host.borrow_mut();
        match change {
            CollectionChange::Add { items, index } => {
                for (offset, item) in items.into_iter().enumerate() {
                    let index = index.map(|start| start + offset);
                    if let Err(err) = host.spawn(cx, self.node, item, index) {
                        tracing::error!(?index, error = %err, "Failed to instantiate item template");
                    }
                }
            }
            CollectionChange::Remove { items, .. } => {
                for item in &items {
                    host.despawn(cx, item);
                }
            }
            CollectionChange::Reset => {
                host.clear(cx);
                let items = self
                    .list
                    .borrow()
                    .as_ref()
                    .map(|(list, _)| list.items())
                    .unwrap_or_default();
                for (index, item) in items.into_iter().enumerate() {
                    if let Err(err) = host.spawn(cx, self.node, item, Some(index)) {
                        tracing::error!(index, error = %err, "Failed to instantiate item template");
                    }
                }
            }
        }
    }
}

impl CollectionBinding {
    pub fn new(view_model_property: impl Into<String>, templates: Vec<Template>) -> Self {
        Self {
            view_model_property: view_model_property.into(),
            templates,
            pooled: None,
            state: None,
        }
    }

    /// Override the configured pooling
    pub fn pooled(mut self, pooled: bool) -> Self {
        self.pooled = Some(pooled);
        self
    }

    /// Instance nodes in item order
    pub fn instances(&self) -> Vec<NodeId> {
        self.state
            .as_ref()
            .map(|s| s.bound.host.borrow().instances().nodes())
            .unwrap_or_default()
    }

    /// Instances parked in the pool
    pub fn pooled_count(&self) -> usize {
        self.state
            .as_ref()
            .and_then(|s| s.bound.host.borrow().pool().map(|p| p.total()))
            .unwrap_or(0)
    }
}

impl Binding for CollectionBinding {
    fn kind(&self) -> &'static str {
        "collection"
    }

    fn connect(&mut self, cx: &mut BindCx<'_>, node: NodeId) -> Result<()> {
        let source = view_model_end_point(cx, node, &self.view_model_property, None)?;
        let pool_config = cx.runtime().config().pool.clone();
        let pooled = self.pooled.unwrap_or(pool_config.enabled);
        let mut host = TemplateHost::new(TemplateSelector::new(self.templates.clone()), pooled);
        host.prewarm(cx, pool_config.initial_size)?;

        let bound = Rc::new(Bound {
            node,
            source,
            host: RefCell::new(host),
            list: RefCell::new(None),
            connection: Connection::open(),
            dispatcher: cx.dispatcher().clone(),
        });
        if let Err(err) = bound.bind_collection(cx) {
            bound.connection.close();
            bound.unbind_collection(cx);
            bound.host.borrow_mut().shutdown(cx);
            return Err(err);
        }

        let watcher = bound.source.watch({
            let bound = Rc::clone(&bound);
            move || {
                if !bound.connection.is_open() {
                    return;
                }
                let target = Rc::clone(&bound);
                bound
                    .dispatcher
                    .schedule(move |cx| target.rebind_collection(cx));
            }
        });

        tracing::debug!(
            source = %self.view_model_property,
            pooled,
            "Connected collection binding"
        );
        self.state = Some(Connected { bound, watcher });
        Ok(())
    }

    fn disconnect(&mut self, cx: &mut BindCx<'_>) {
        if let Some(mut state) = self.state.take() {
            state.bound.connection.close();
            state.watcher.dispose();
            state.bound.unbind_collection(cx);
            state.bound.host.borrow_mut().shutdown(cx);
            tracing::debug!(source = %self.view_model_property, "Disconnected collection binding");
        }
    }

    fn is_connected(&self) -> bool {
        self.state.is_some()
    }
}
