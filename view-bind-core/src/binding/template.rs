use std::cell::RefCell;
use std::rc::Rc;

use crate::endpoint::PropertyEndPoint;
use crate::error::Result;
use crate::notify::PropertyWatcher;
use crate::scene::{BindCx, NodeId};
use crate::template::{Template, TemplateHost, TemplateSelector};

use super::{view_model_end_point, Binding, Connection};

/// Shows one template instance for the current value of a view-model property
///
/// The template is chosen by the value's runtime type. When the property
/// changes the old instance is torn down and a new one selected; a null value
/// shows nothing. Pooling is off unless requested.
#[derive(Debug)]
pub struct TemplateBinding {
    view_model_property: String,
    templates: Vec<Template>,
    pooled: bool,
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
    connection: Connection,
}

impl Bound {
    fn populate(&self, cx: &mut BindCx<'_>) -> Result<()> {
        let value = self.source.get_value()?;
        if value.is_null() {
            return Ok(());
        }
        self.host.borrow_mut().spawn(cx, self.node, value, None)?;
        Ok(())
    }

    fn rebind(&self, cx: &mut BindCx<'_>) {
        if !self.connection.is_open() {
            return;
        }
        self.host.borrow_mut().clear(cx);
        if let Err(err) = self.populate(cx) {
            tracing::error!(
                property = self.source.member(),
                error = %err,
                "Template rebind failed"
            );
        }
    }
}

impl TemplateBinding {
    pub fn new(view_model_property: impl Into<String>, templates: Vec<Template>) -> Self {
        Self {
            view_model_property: view_model_property.into(),
            templates,
            pooled: false,
            state: None,
        }
    }

    /// Park replaced instances for reuse instead of destroying them
    pub fn pooled(mut self, pooled: bool) -> Self {
        self.pooled = pooled;
        self
    }

    /// Node of the live instance, if any
    pub fn instance(&self) -> Option<NodeId> {
        let state = self.state.as_ref()?;
        let host = state.bound.host.borrow();
        let node = host.instances().iter().next().map(|i| i.node);
        node
    }
}

impl Binding for TemplateBinding {
    fn kind(&self) -> &'static str {
        "template"
    }

    fn connect(&mut self, cx: &mut BindCx<'_>, node: NodeId) -> Result<()> {
        let source = view_model_end_point(cx, node, &self.view_model_property, None)?;
        let host = TemplateHost::new(TemplateSelector::new(self.templates.clone()), self.pooled);
        let bound = Rc::new(Bound {
            node,
            source,
            host: RefCell::new(host),
            connection: Connection::open(),
        });
        if let Err(err) = bound.populate(cx) {
            bound.connection.close();
            bound.host.borrow_mut().shutdown(cx);
            return Err(err);
        }

        let dispatcher = cx.dispatcher().clone();
        let watcher = bound.source.watch({
            let bound = Rc::clone(&bound);
            move || {
                if !bound.connection.is_open() {
                    return;
                }
                let bound = Rc::clone(&bound);
                dispatcher.schedule(move |cx| bound.rebind(cx));
            }
        });

        tracing::debug!(source = %self.view_model_property, "Connected template binding");
        self.state = Some(Connected { bound, watcher });
        Ok(())
    }

    fn disconnect(&mut self, cx: &mut BindCx<'_>) {
        if let Some(mut state) = self.state.take() {
            state.bound.connection.close();
            state.watcher.dispose();
            state.bound.host.borrow_mut().shutdown(cx);
            tracing::debug!(source = %self.view_model_property, "Disconnected template binding");
        }
    }

    fn is_connected(&self) -> bool {
        self.state.is_some()
    }
}
