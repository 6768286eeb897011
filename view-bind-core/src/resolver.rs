//! View-model and component lookup over an explicit scope chain
//!
//! A [`ScopeChain`] lists the objects attached to a binding's node followed by
//! those of each ancestor, nearest first. Lookups are linear scans of that
//! list; the first scope producing a match wins.

use std::collections::HashSet;

use crate::error::{BindError, Result};
use crate::reflect::{ObjectRef, TypeKey, TypeKind};
use crate::registry::{BindableMember, TypeRegistry};
use crate::scene::NodeId;

/// Objects attached to one node
#[derive(Debug, Clone)]
pub struct Scope {
    pub node: NodeId,
    pub objects: Vec<ObjectRef>,
}

/// Ordered scopes from a binding's node up to the root
#[derive(Debug, Clone, Default)]
pub struct ScopeChain {
    scopes: Vec<Scope>,
}

impl ScopeChain {
    pub fn new(scopes: Vec<Scope>) -> Self {
        Self { scopes }
    }

    pub fn push(&mut self, node: NodeId, objects: Vec<ObjectRef>) {
        self.scopes.push(Scope { node, objects });
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Every object in chain order
    pub fn objects(&self) -> impl Iterator<Item = &ObjectRef> {
        self.scopes.iter().flat_map(|scope| scope.objects.iter())
    }
}

/// Find the nearest object exposing a view-model named `type_name`
///
/// An object matches when its own type is registered under that name, or
/// when it is a view-model provider advertising that name. A matching
/// provider with no view-model assigned fails the lookup. `exclude` skips one
/// object, typically the caller's own provider.
pub fn find_view_model(
    registry: &TypeRegistry,
    chain: &ScopeChain,
    type_name: &str,
    exclude: Option<&ObjectRef>,
) -> Result<ObjectRef> {
    let not_found = || BindError::ViewModelNotFound {
        type_name: type_name.to_string(),
        searched: chain.len(),
    };
    for object in chain.objects() {
        if exclude.is_some_and(|excluded| excluded.ptr_eq(object)) {
            continue;
        }
        if registry.matches_name(object.type_key(), type_name) {
            return Ok(object.clone());
        }
        let borrowed = object.borrow();
        if let Some(provider) = borrowed.as_view_model_provider() {
            if provider.view_model_type_name() == type_name {
                return provider.view_model().ok_or_else(not_found);
            }
        }
    }
    Err(not_found())
}

/// Find a component of `type_name` among the objects on `node`
pub fn find_component(
    registry: &TypeRegistry,
    node: NodeId,
    objects: &[ObjectRef],
    type_name: &str,
) -> Result<ObjectRef> {
    objects
        .iter()
        .find(|object| registry.matches_name(object.type_key(), type_name))
        .cloned()
        .ok_or_else(|| BindError::ComponentNotFound {
            type_name: type_name.to_string(),
            node,
        })
}

/// Types of every view-model reachable from the chain, nearest first
///
/// Logs a warning when none is found.
pub fn find_available_view_model_types(registry: &TypeRegistry, chain: &ScopeChain) -> Vec<TypeKey> {
    let mut seen = HashSet::new();
    let mut types = Vec::new();
    for object in chain.objects() {
        let key = object.type_key();
        if registry
            .descriptor(key)
            .is_some_and(|d| d.kind == TypeKind::ViewModel)
        {
            if seen.insert(key) {
                types.push(key);
            }
            continue;
        }
        let borrowed = object.borrow();
        let Some(provider) = borrowed.as_view_model_provider() else {
            continue;
        };
        let provided = match provider.view_model() {
            Some(view_model) => vec![view_model.type_key()],
            None => registry.find_by_name(&provider.view_model_type_name()),
        };
        for key in provided {
            if seen.insert(key) {
                types.push(key);
            }
        }
    }
    if types.is_empty() {
        tracing::warn!(scopes = chain.len(), "No bindable view-models found in scope");
    }
    types
}

/// Bindable properties of each type, in type order
pub fn find_bindable_properties(registry: &TypeRegistry, types: &[TypeKey]) -> Vec<BindableMember> {
    types
        .iter()
        .flat_map(|key| registry.bindable_properties(*key).to_vec())
        .collect()
}

/// Bindable zero-argument methods of each type, in type order
pub fn find_bindable_methods(registry: &TypeRegistry, types: &[TypeKey]) -> Vec<BindableMember> {
    types
        .iter()
        .flat_map(|key| registry.bindable_methods(*key).to_vec())
        .collect()
}
