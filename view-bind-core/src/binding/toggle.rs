use std::rc::Rc;

use crate::endpoint::PropertyEndPoint;
use crate::error::Result;
use crate::notify::PropertyWatcher;
use crate::scene::{BindCx, NodeId};
use crate::template::TemplateFactory;
use crate::value::{Value, ValueType};

use super::{view_model_end_point, Binding, Connection};

/// Activates or deactivates a node from a boolean view-model property
#[derive(Debug)]
pub struct ToggleActiveBinding {
    view_model_property: String,
    invert: bool,
    target: Option<NodeId>,
    state: Option<Connected>,
}

#[derive(Debug)]
struct Connected {
    watcher: PropertyWatcher,
    connection: Connection,
}

impl ToggleActiveBinding {
    pub fn new(view_model_property: impl Into<String>) -> Self {
        Self {
            view_model_property: view_model_property.into(),
            invert: false,
            target: None,
            state: None,
        }
    }

    /// Deactivate when the property is true
    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }

    /// Toggle another node instead of the binding's own
    pub fn target(mut self, node: NodeId) -> Self {
        self.target = Some(node);
        self
    }
}

fn apply(cx: &mut BindCx<'_>, source: &PropertyEndPoint, target: NodeId, invert: bool) {
    let active = source
        .get_value()
        .and_then(|value| ValueType::Bool.coerce(value))
        .map(|value| matches!(value, Value::Bool(true)) != invert);
    match active {
        Ok(active) => {
            if let Err(err) = TemplateFactory::set_active(cx.scene_mut(), target, active) {
                tracing::warn!(?target, error = %err, "Failed to toggle node");
            }
        }
        Err(err) => tracing::warn!(property = source.member(), error = %err, "Cannot read toggle state"),
    }
}

impl Binding for ToggleActiveBinding {
    fn kind(&self) -> &'static str {
        "toggle_active"
    }

    fn connect(&mut self, cx: &mut BindCx<'_>, node: NodeId) -> Result<()> {
        let source = Rc::new(view_model_end_point(cx, node, &self.view_model_property, None)?);
        let target = self.target.unwrap_or(node);
        let invert = self.invert;
        apply(cx, &source, target, invert);

        let connection = Connection::open();
        let dispatcher = cx.dispatcher().clone();
        let watcher = source.watch({
            let source = Rc::clone(&source);
            let connection = connection.clone();
            move || {
                if !connection.is_open() {
                    return;
                }
                let source = Rc::clone(&source);
                let connection = connection.clone();
                dispatcher.schedule(move |cx| {
                    if connection.is_open() {
                        apply(cx, &source, target, invert);
                    }
                });
            }
        });

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
