use std::any::Any;
use std::rc::Rc;

use crate::endpoint::PropertyEndPoint;
use crate::error::Result;
use crate::notify::PropertyWatcher;
use crate::reflect::{Bindable, Describe, ObjectRef, TypeDescriptor, TypeKey, TypeKind, ViewModelProvider};
use crate::scene::{BindCx, NodeId};

use super::{view_model_end_point, Binding, Connection};

/// Provider component exposing a child view-model to a subtree
pub struct SubViewModelProvider {
    view_model: Option<ObjectRef>,
    type_name: String,
}

impl SubViewModelProvider {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            view_model: None,
            type_name: type_name.into(),
        }
    }
}

impl Bindable for SubViewModelProvider {
    fn type_key(&self) -> TypeKey {
        TypeKey::of::<Self>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn as_view_model_provider(&self) -> Option<&dyn ViewModelProvider> {
        Some(self)
    }
}

impl ViewModelProvider for SubViewModelProvider {
    fn view_model(&self) -> Option<ObjectRef> {
        self.view_model.clone()
    }

    fn view_model_type_name(&self) -> String {
        self.type_name.clone()
    }
}

impl Describe for SubViewModelProvider {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::builder::<SubViewModelProvider>("SubViewModelProvider")
            .kind(TypeKind::Component)
            .build()
    }
}

/// Publishes a view-model held in a property of an outer view-model
///
/// Bindings below this node can reference the inner view-model by
/// `type_name`. When the property changes, the node's children are
/// disconnected and connected again against the new value. Bindings on the
/// same node only see the provider if they come after this one.
#[derive(Debug)]
pub struct SubViewModelBinding {
    view_model_property: String,
    type_name: String,
    state: Option<Connected>,
}

#[derive(Debug)]
struct Connected {
    node: NodeId,
    provider: ObjectRef,
    watcher: PropertyWatcher,
    connection: Connection,
}

impl SubViewModelBinding {
    /// Expose `view_model_property` (`Outer.member`) as a view-model named
    /// `type_name`
    pub fn new(view_model_property: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            view_model_property: view_model_property.into(),
            type_name: type_name.into(),
            state: None,
        }
    }
}

fn publish(source: &PropertyEndPoint, provider: &ObjectRef) {
    let view_model = match source.get_value() {
        Ok(value) => value.as_object().cloned(),
        Err(err) => {
            tracing::warn!(property = source.member(), error = %err, "Cannot read sub view-model");
            None
        }
    };
    provider.with_mut(|p: &mut SubViewModelProvider| p.view_model = view_model);
}

fn reconnect_children(cx: &mut BindCx<'_>, node: NodeId) {
    for child in cx.scene().children(node).to_vec() {
        cx.disconnect_subtree(child);
        if let Err(err) = cx.connect_subtree(child) {
            tracing::error!(?child, error = %err, "Failed to reconnect after sub view-model change");
        }
    }
}

impl Binding for SubViewModelBinding {
    fn kind(&self) -> &'static str {
        "sub_view_model"
    }

    fn connect(&mut self, cx: &mut BindCx<'_>, node: NodeId) -> Result<()> {
        let provider = ObjectRef::new(SubViewModelProvider::new(&self.type_name));
        let source = Rc::new(view_model_end_point(
            cx,
            node,
            &self.view_model_property,
            Some(&provider),
        )?);
        publish(&source, &provider);
        cx.scene_mut().add_component(node, provider.clone())?;

        let connection = Connection::open();
        let dispatcher = cx.dispatcher().clone();
        let watcher = source.watch({
            let source = Rc::clone(&source);
            let provider = provider.clone();
            let connection = connection.clone();
            move || {
                if !connection.is_open() {
                    return;
                }
                let source = Rc::clone(&source);
                let provider = provider.clone();
                let connection = connection.clone();
                dispatcher.schedule(move |cx| {
                    if connection.is_open() {
                        publish(&source, &provider);
                        reconnect_children(cx, node);
                    }
                });
            }
        });

        tracing::debug!(
            source = %self.view_model_property,
            type_name = %self.type_name,
            "Connected sub view-model binding"
        );
        self.state = Some(Connected {
            node,
            provider,
            watcher,
            connection,
        });
        Ok(())
    }

    fn disconnect(&mut self, cx: &mut BindCx<'_>) {
        if let Some(mut state) = self.state.take() {
            state.connection.close();
            state.watcher.dispose();
            cx.scene_mut().remove_component(state.node, &state.provider);
        }
    }

    fn is_connected(&self) -> bool {
        self.state.is_some()
    }
}
