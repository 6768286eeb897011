use std::rc::Rc;

use crate::adapter::AdapterOptions;
use crate::endpoint::PropertyEndPoint;
use crate::error::Result;
use crate::notify::PropertyWatcher;
use crate::scene::{BindCx, NodeId};
use crate::sync::PropertySync;

use super::{resolve_component, view_model_end_point, AdapterSlot, Binding, Connection};

/// Copies a view-model property into a view property whenever it changes
///
/// A missing view-model member fails the connect; a missing view member
/// leaves a dead end-point that only logs.
#[derive(Debug)]
pub struct OneWayPropertyBinding {
    view_model_property: String,
    view_property: String,
    adapter: AdapterSlot,
    state: Option<Connected>,
}

#[derive(Debug)]
struct Connected {
    sync: Rc<PropertySync>,
    watcher: PropertyWatcher,
    connection: Connection,
}

impl OneWayPropertyBinding {
    /// Bind `view_model_property` (`Type.member`) to `view_property`
    pub fn new(view_model_property: impl Into<String>, view_property: impl Into<String>) -> Self {
        Self {
            view_model_property: view_model_property.into(),
            view_property: view_property.into(),
            adapter: AdapterSlot::default(),
            state: None,
        }
    }

    /// Adapter applied to values written to the view
    pub fn adapter(mut self, id: impl Into<String>, options: Option<AdapterOptions>) -> Self {
        self.adapter = AdapterSlot::new(id, options);
        self
    }

    pub fn sync(&self) -> Option<&PropertySync> {
        self.state.as_ref().map(|s| s.sync.as_ref())
    }
}

impl Binding for OneWayPropertyBinding {
    fn kind(&self) -> &'static str {
        "one_way"
    }

    fn connect(&mut self, cx: &mut BindCx<'_>, node: NodeId) -> Result<()> {
        let source = view_model_end_point(cx, node, &self.view_model_property, None)?;
        let (view_ref, view) = resolve_component(cx, node, &self.view_property)?;
        let dest = self.adapter.apply(
            cx,
            PropertyEndPoint::new(cx.runtime().types(), view, &view_ref.member),
        )?;

        let sync = Rc::new(
            PropertySync::new(source, dest)
                .log_suppressed_errors(cx.runtime().config().sync.log_suppressed_errors),
        );
        let connection = Connection::open();
        let watcher = sync.source().watch({
            let sync = Rc::clone(&sync);
            let connection = connection.clone();
            move || {
                if connection.is_open() {
                    sync.sync_from_source();
                }
            }
        });
        sync.sync_from_source();

        tracing::debug!(
            source = %self.view_model_property,
            dest = %self.view_property,
            "Connected one-way binding"
        );
        self.state = Some(Connected {
            sync,
            watcher,
            connection,
        });
        Ok(())
    }

    fn disconnect(&mut self, _cx: &mut BindCx<'_>) {
        if let Some(mut state) = self.state.take() {
            state.connection.close();
            state.watcher.dispose();
            tracing::debug!(source = %self.view_model_property, "Disconnected one-way binding");
        }
    }

    fn is_connected(&self) -> bool {
        self.state.is_some()
    }
}
