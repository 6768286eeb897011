//! Error taxonomy for binding setup and value relay
//!
//! Configuration errors (bad references, missing members, missing adapters,
//! template lookup failures) are returned from `connect` and abort that one
//! binding. Conversion errors raised while a binding is live are caught by
//! [`PropertySync`](crate::sync::PropertySync) and never reach the caller.

use thiserror::Error;

use crate::scene::NodeId;

/// Errors produced while resolving, connecting or relaying bindings
#[derive(Debug, Error)]
pub enum BindError {
    /// Malformed `<type-name>.<member-name>` reference
    #[error("invalid end-point reference `{reference}`: {reason}")]
    InvalidEndPoint {
        reference: String,
        reason: &'static str,
    },

    /// No scope in the chain exposes the requested view-model
    #[error("view-model `{type_name}` not found after searching {searched} scope(s)")]
    ViewModelNotFound { type_name: String, searched: usize },

    /// No component of the requested type is attached to the binding's node
    #[error("component `{type_name}` not found on node {node:?}")]
    ComponentNotFound { type_name: String, node: NodeId },

    /// The owning type has no accessor for the member
    #[error("member `{member}` not found on `{type_name}`")]
    MemberNotFound { type_name: String, member: String },

    /// Non-empty adapter id with no registered descriptor
    #[error("adapter `{0}` is not registered")]
    AdapterNotFound(String),

    /// Adapter declares an options type but none was supplied
    #[error("adapter `{id}` requires options of kind `{expected}`")]
    MissingAdapterOptions { id: String, expected: String },

    /// Supplied options belong to another adapter
    #[error("adapter `{id}` expects options of kind `{expected}`, got `{found}`")]
    AdapterOptionsMismatch {
        id: String,
        expected: String,
        found: String,
    },

    /// Options payload does not deserialize into the adapter's option type
    #[error("invalid adapter options: {0}")]
    InvalidAdapterOptions(#[from] serde_json::Error),

    /// Adapter conversion failed
    #[error("adapter `{id}` failed: {reason}")]
    Adapter { id: String, reason: String },

    /// No template matches the type or any of its ancestors
    #[error("no template found for type `{0}`")]
    TemplateNotFound(String),

    /// More than one template matches at the same ancestry distance
    #[error("ambiguous template for type `{type_name}`, candidates: {candidates:?}")]
    AmbiguousType {
        type_name: String,
        candidates: Vec<String>,
    },

    /// Two templates registered for the same exact view-model type
    #[error("duplicate template for type `{0}`")]
    DuplicateTemplate(String),

    /// Event exists but cannot be watched
    #[error("invalid event `{event}`: {reason}")]
    InvalidEvent { event: String, reason: String },

    /// Component exposes no event with this name
    #[error("event `{event}` not found on `{type_name}`")]
    EventNotFound { type_name: String, event: String },

    /// Value cannot be represented as the requested type
    #[error("cannot convert {found} to {expected}")]
    Conversion { expected: String, found: String },

    /// Write attempted on a property without a setter
    #[error("property `{0}` is read-only")]
    ReadOnly(String),

    /// Bound method failed or could not be called
    #[error("cannot invoke `{method}`: {reason}")]
    Invocation { method: String, reason: String },

    /// Node id does not refer to a live node
    #[error("node {0:?} does not exist")]
    NodeNotFound(NodeId),

    /// Configuration document could not be parsed
    #[error("invalid binding config: {0}")]
    InvalidConfig(#[source] serde_json::Error),

    /// A type module failed to enumerate its types
    #[error("type module `{module}` failed: {reason}")]
    TypeModule { module: String, reason: String },
}

impl BindError {
    /// Shorthand for a conversion failure
    pub fn conversion(expected: impl ToString, found: impl ToString) -> Self {
        Self::Conversion {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Whether this error describes a misconfigured binding rather than a
    /// failure while relaying a value
    pub fn is_configuration(&self) -> bool {
        !matches!(
            self,
            BindError::Conversion { .. }
                | BindError::Adapter { .. }
                | BindError::ReadOnly(_)
                | BindError::Invocation { .. }
        )
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, BindError>;
