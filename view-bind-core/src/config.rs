//! Runtime configuration
//!
//! Every field has a default, so a partial JSON document only overrides what
//! it names:
//!
//! ```
//! use view_bind_core::config::BindingConfig;
//!
//! let config = BindingConfig::from_json_str(r#"{ "pool": { "initial_size": 4 } }"#).unwrap();
//! assert!(config.pool.enabled);
//! assert_eq!(config.pool.initial_size, 4);
//! assert_eq!(config.resolver.host_namespaces, vec!["Engine.".to_string()]);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{BindError, Result};

/// Top-level configuration owned by the [`BindingRuntime`](crate::runtime::BindingRuntime)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    pub resolver: ResolverConfig,
    pub pool: PoolConfig,
    pub sync: SyncConfig,
}

impl BindingConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(BindError::InvalidConfig)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(BindError::InvalidConfig)
    }
}

/// Endpoint reference parsing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Type-name prefixes reduced to their last segment
    pub host_namespaces: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            host_namespaces: vec!["Engine.".to_string()],
        }
    }
}

/// Template instance pooling for collection bindings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub enabled: bool,
    /// Instances created per template when a binding connects
    pub initial_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_size: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Log sync failures that have no error sink
    pub log_suppressed_errors: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            log_suppressed_errors: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = BindingConfig::from_json_str("{}").unwrap();
        assert_eq!(config, BindingConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = BindingConfig::from_json_str(
            r#"{
                "resolver": { "host_namespaces": ["Engine.", "Host."] },
                "pool": { "enabled": false },
                "sync": { "log_suppressed_errors": false }
            }"#,
        )
        .unwrap();
        assert_eq!(config.resolver.host_namespaces.len(), 2);
        assert!(!config.pool.enabled);
        assert_eq!(config.pool.initial_size, 0);
        assert!(!config.sync.log_suppressed_errors);
    }

    #[test]
    fn test_round_trip_and_invalid() {
        let json = BindingConfig::default().to_json_string().unwrap();
        assert_eq!(
            BindingConfig::from_json_str(&json).unwrap(),
            BindingConfig::default()
        );
        assert!(matches!(
            BindingConfig::from_json_str(r#"{ "pool": { "enabled": "yes" } }"#),
            Err(BindError::InvalidConfig(_))
        ));
    }
}
