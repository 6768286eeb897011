use std::rc::Rc;

use crate::adapter::AdapterOptions;
use crate::endpoint::PropertyEndPoint;
use crate::error::Result;
use crate::event::EventWatcher;
use crate::notify::PropertyWatcher;
use crate::scene::{BindCx, NodeId};
use crate::sync::PropertySync;

use super::{resolve_component, view_model_end_point, AdapterSlot, Binding, Connection};

/// View-model property and view property kept in step both ways
///
/// The view-model side is watched through its notifier; the view side is
/// read back when `view_event` fires. Failed writes back to the view-model
/// are routed to the optional exception property.
///
/// ```ignore
/// TwoWayPropertyBinding::new("Settings.volume", "Slider.value", "Slider.changed")
///     .view_model_adapter("string_to_float", None)
///     .exception_property("Settings.volume_error")
///     .exception_adapter("error_to_string", None);
/// ```
#[derive(Debug)]
pub struct TwoWayPropertyBinding {
    view_model_property: String,
    view_property: String,
    view_event: String,
    view_adapter: AdapterSlot,
    view_model_adapter: AdapterSlot,
    exception_property: Option<String>,
    exception_adapter: AdapterSlot,
    state: Option<Connected>,
}

#[derive(Debug)]
struct Connected {
    sync: Rc<PropertySync>,
    property_watcher: PropertyWatcher,
    event_watcher: EventWatcher,
    connection: Connection,
}

impl TwoWayPropertyBinding {
    pub fn new(
        view_model_property: impl Into<String>,
        view_property: impl Into<String>,
        view_event: impl Into<String>,
    ) -> Self {
        Self {
            view_model_property: view_model_property.into(),
            view_property: view_property.into(),
            view_event: view_event.into(),
            view_adapter: AdapterSlot::default(),
            view_model_adapter: AdapterSlot::default(),
            exception_property: None,
            exception_adapter: AdapterSlot::default(),
            state: None,
        }
    }

    /// Adapter for values flowing to the view
    pub fn view_adapter(mut self, id: impl Into<String>, options: Option<AdapterOptions>) -> Self {
        self.view_adapter = AdapterSlot::new(id, options);
        self
    }

    /// Adapter for values flowing back to the view-model
    pub fn view_model_adapter(mut self, id: impl Into<String>, options: Option<AdapterOptions>) -> Self {
        self.view_model_adapter = AdapterSlot::new(id, options);
        self
    }

    /// View-model property (`Type.member`) receiving sync failures
    pub fn exception_property(mut self, reference: impl Into<String>) -> Self {
        self.exception_property = Some(reference.into());
        self
    }

    /// Adapter applied to errors before they reach the exception property
    pub fn exception_adapter(mut self, id: impl Into<String>, options: Option<AdapterOptions>) -> Self {
        self.exception_adapter = AdapterSlot::new(id, options);
        self
    }

    pub fn sync(&self) -> Option<&PropertySync> {
        self.state.as_ref().map(|s| s.sync.as_ref())
    }
}

impl Binding for TwoWayPropertyBinding {
    fn kind(&self) -> &'static str {
        "two_way"
    }

    fn connect(&mut self, cx: &mut BindCx<'_>, node: NodeId) -> Result<()> {
        let source = view_model_end_point(cx, node, &self.view_model_property, None)?;
        let source = self.view_model_adapter.apply(cx, source)?;
        let (view_ref, view) = resolve_component(cx, node, &self.view_property)?;
        let dest = self.view_adapter.apply(
            cx,
            PropertyEndPoint::new(cx.runtime().types(), view.clone(), &view_ref.member),
        )?;
        let sink = match &self.exception_property {
            Some(reference) => {
                let sink = view_model_end_point(cx, node, reference, None)?;
                Some(self.exception_adapter.apply(cx, sink)?)
            }
            None => None,
        };
        let (event_ref, event_owner) = resolve_component(cx, node, &self.view_event)?;

        let sync = Rc::new(
            PropertySync::new(source, dest)
                .with_error_sink(sink)
                .log_suppressed_errors(cx.runtime().config().sync.log_suppressed_errors),
        );
        let connection = Connection::open();
        let event_watcher = EventWatcher::new(&event_owner, &event_ref.member, {
            let sync = Rc::clone(&sync);
            let connection = connection.clone();
            move || {
                if connection.is_open() {
                    sync.sync_from_dest();
                }
            }
        })?;
        let property_watcher = sync.source().watch({
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
            view_model = %self.view_model_property,
            view = %self.view_property,
            event = %self.view_event,
            "Connected two-way binding"
        );
        self.state = Some(Connected {
            sync,
            property_watcher,
            event_watcher,
            connection,
        });
        Ok(())
    }

    fn disconnect(&mut self, _cx: &mut BindCx<'_>) {
        if let Some(mut state) = self.state.take() {
            state.connection.close();
            state.property_watcher.dispose();
            state.event_watcher.dispose();
            tracing::debug!(view_model = %self.view_model_property, "Disconnected two-way binding");
        }
    }

    fn is_connected(&self) -> bool {
        self.state.is_some()
    }
}
