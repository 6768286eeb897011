use crate::error::{BindError, Result};
use crate::event::EventWatcher;
use crate::notify::PropertyNotifier;
use crate::reflect::{MethodDescriptor, ObjectRef};
use crate::scene::{BindCx, NodeId};

use super::{resolve_component, resolve_view_model, Binding, Connection};

/// Calls a zero-argument view-model method when a view event fires
///
/// Event arguments are dropped. A failing method is logged; it never
/// disconnects the binding.
#[derive(Debug)]
pub struct EventBinding {
    view_event: String,
    view_model_method: String,
    state: Option<Connected>,
}

#[derive(Debug)]
struct Connected {
    watcher: EventWatcher,
    connection: Connection,
}

impl EventBinding {
    /// Bind `view_event` (`Component.event`) to `view_model_method`
    /// (`Type.method`)
    pub fn new(view_event: impl Into<String>, view_model_method: impl Into<String>) -> Self {
        Self {
            view_event: view_event.into(),
            view_model_method: view_model_method.into(),
            state: None,
        }
    }
}

fn invoke_command(view_model: &ObjectRef, method: &MethodDescriptor) -> Result<()> {
    let notifier = view_model.notifier();
    let _deferred = notifier.as_ref().map(PropertyNotifier::defer);
    let mut owner = view_model.borrow_mut();
    method.invoke(owner.as_any_mut())
}

impl Binding for EventBinding {
    fn kind(&self) -> &'static str {
        "event"
    }

    fn connect(&mut self, cx: &mut BindCx<'_>, node: NodeId) -> Result<()> {
        let (method_ref, view_model) = resolve_view_model(cx, node, &self.view_model_method, None)?;
        let types = cx.runtime().types();
        let method = types
            .method(view_model.type_key(), &method_ref.member)
            .ok_or_else(|| BindError::MemberNotFound {
                type_name: types.type_name(view_model.type_key()),
                member: method_ref.member.clone(),
            })?;
        if !method.is_command() {
            return Err(BindError::Invocation {
                method: method_ref.to_string(),
                reason: "not a bindable zero-argument method".into(),
            });
        }
        let (event_ref, component) = resolve_component(cx, node, &self.view_event)?;

        let connection = Connection::open();
        let watcher = EventWatcher::new(&component, &event_ref.member, {
            let connection = connection.clone();
            let name = method_ref.to_string();
            move || {
                if !connection.is_open() {
                    return;
                }
                if let Err(err) = invoke_command(&view_model, &method) {
                    tracing::warn!(method = %name, error = %err, "Bound method failed");
                }
            }
        })?;

        tracing::debug!(
            event = %self.view_event,
            method = %self.view_model_method,
            "Connected event binding"
        );
        self.state = Some(Connected {
            watcher,
            connection,
        });
        Ok(())
    }

    fn disconnect(&mut self, _cx: &mut BindCx<'_>) {
        if let Some(mut state) = self.state.take() {
            state.connection.close();
            state.watcher.dispose();
        }
    }

    fn is_connected(&self) -> bool {
        self.state.is_some()
    }
}
