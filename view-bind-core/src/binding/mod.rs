//! Binding components attached to scene nodes
//!
//! Each binding resolves its references when its node is connected and
//! releases every subscription when disconnected. Connecting an already
//! connected binding is skipped by the scene; disconnecting twice is a no-op.
//!
//! | binding | source | target |
//! |---|---|---|
//! | [`OneWayPropertyBinding`] | view-model property | view property |
//! | [`TwoWayPropertyBinding`] | view-model property | view property, written back on a view event |
//! | [`EventBinding`] | view event | view-model command |
//! | [`TemplateBinding`] | view-model property | one template instance |
//! | [`CollectionBinding`] | observable list | one template instance per item |
//! | [`ToggleActiveBinding`] | view-model bool | node active state |
//! | [`SubViewModelBinding`] | view-model property | view-model for the node's subtree |

mod collection;
mod event;
mod one_way;
mod sub_view_model;
mod template;
mod toggle;
mod two_way;

pub use collection::CollectionBinding;
pub use event::EventBinding;
pub use one_way::OneWayPropertyBinding;
pub use sub_view_model::{SubViewModelBinding, SubViewModelProvider};
pub use template::TemplateBinding;
pub use toggle::ToggleActiveBinding;
pub use two_way::TwoWayPropertyBinding;

use std::cell::Cell;
use std::rc::Rc;

use crate::adapter::AdapterOptions;
use crate::endpoint::{EndPointReference, PropertyEndPoint};
use crate::error::Result;
use crate::reflect::ObjectRef;
use crate::resolver::{find_component, find_view_model};
use crate::scene::{BindCx, NodeId};

/// Lifecycle of one binding component
pub trait Binding {
    /// Short name used in diagnostics
    fn kind(&self) -> &'static str;

    /// Resolve references and subscribe; configuration errors abort the
    /// binding
    fn connect(&mut self, cx: &mut BindCx<'_>, node: NodeId) -> Result<()>;

    /// Release subscriptions and owned instances
    fn disconnect(&mut self, cx: &mut BindCx<'_>);

    fn is_connected(&self) -> bool;
}

/// Open while a binding is connected; callbacks check it before acting
#[derive(Debug, Clone)]
pub(crate) struct Connection(Rc<Cell<bool>>);

impl Connection {
    pub(crate) fn open() -> Self {
        Self(Rc::new(Cell::new(true)))
    }

    pub(crate) fn is_open(&self) -> bool {
        self.0.get()
    }

    pub(crate) fn close(&self) {
        self.0.set(false);
    }
}

/// Parse `reference` and find the view-model it names in `node`'s scope
pub(crate) fn resolve_view_model(
    cx: &BindCx<'_>,
    node: NodeId,
    reference: &str,
    exclude: Option<&ObjectRef>,
) -> Result<(EndPointReference, ObjectRef)> {
    let parsed = cx.runtime().parse_reference(reference)?;
    let chain = cx.scope_chain(node);
    let view_model = find_view_model(cx.runtime().types(), &chain, &parsed.type_name, exclude)?;
    Ok((parsed, view_model))
}

/// Parse `reference` and find the component it names on `node`
pub(crate) fn resolve_component(
    cx: &BindCx<'_>,
    node: NodeId,
    reference: &str,
) -> Result<(EndPointReference, ObjectRef)> {
    let parsed = cx.runtime().parse_reference(reference)?;
    let component = find_component(
        cx.runtime().types(),
        node,
        cx.scene().components(node),
        &parsed.type_name,
    )?;
    Ok((parsed, component))
}

/// Strict endpoint on the view-model named by `reference`
pub(crate) fn view_model_end_point(
    cx: &BindCx<'_>,
    node: NodeId,
    reference: &str,
    exclude: Option<&ObjectRef>,
) -> Result<PropertyEndPoint> {
    let (parsed, view_model) = resolve_view_model(cx, node, reference, exclude)?;
    PropertyEndPoint::resolve(cx.runtime().types(), view_model, &parsed.member)
}

/// Adapter id plus options for one direction of a binding
#[derive(Debug, Clone, Default)]
pub struct AdapterSlot {
    pub id: String,
    pub options: Option<AdapterOptions>,
}

impl AdapterSlot {
    pub fn new(id: impl Into<String>, options: Option<AdapterOptions>) -> Self {
        Self {
            id: id.into(),
            options,
        }
    }

    /// Attach this slot's adapter to `end_point`
    ///
    /// An adapter declaring an options kind gets empty options of that kind
    /// when the slot has none, so its typed defaults apply.
    pub(crate) fn apply(&self, cx: &BindCx<'_>, end_point: PropertyEndPoint) -> Result<PropertyEndPoint> {
        let adapter = cx.runtime().create_adapter(&self.id)?;
        let options = self.options.clone().or_else(|| {
            adapter
                .as_ref()
                .and_then(|a| a.descriptor().options_kind.as_deref())
                .map(AdapterOptions::empty)
        });
        Ok(end_point.with_adapter(adapter, options))
    }
}
