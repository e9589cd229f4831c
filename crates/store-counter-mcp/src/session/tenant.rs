//! Multi-tenant registry: one lazily created [`SessionRegistry`] per user.

use std::collections::HashMap;
use std::sync::Arc;

use store_counter::{EngineConfig, SessionRegistry};

use crate::types::{McpError, McpResult};

const MAX_USER_ID_LEN: usize = 64;

/// Registry of per-user session registries for multi-tenant mode.
pub struct TenantRegistry {
    base: EngineConfig,
    tenants: HashMap<String, Arc<SessionRegistry>>,
}

impl TenantRegistry {
    /// Each tenant gets `base` with its bucket logs under `{log_dir}/{user_id}`.
    pub fn new(base: EngineConfig) -> Self {
        Self {
            base,
            tenants: HashMap::new(),
        }
    }

    /// Get or create the registry for the given user ID.
    pub fn get_or_create(&mut self, user_id: &str) -> McpResult<Arc<SessionRegistry>> {
        validate_user_id(user_id)?;

        if let Some(registry) = self.tenants.get(user_id) {
            return Ok(registry.clone());
        }

        let config = EngineConfig {
            log_dir: self.base.log_dir.as_ref().map(|dir| dir.join(user_id)),
            ..self.base.clone()
        };
        tracing::info!("Opening session registry for user '{user_id}'");

        let registry = Arc::new(SessionRegistry::new(config)?);
        self.tenants.insert(user_id.to_string(), registry.clone());
        Ok(registry)
    }

    /// Number of tenants seen so far.
    pub fn count(&self) -> usize {
        self.tenants.len()
    }
}

fn validate_user_id(user_id: &str) -> McpResult<()> {
    let valid = !user_id.is_empty()
        && user_id.len() <= MAX_USER_ID_LEN
        && user_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(McpError::InvalidParams(format!(
            "Invalid user id '{user_id}': use up to {MAX_USER_ID_LEN} letters, digits, '-' or '_'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_user_same_registry() {
        let mut tenants = TenantRegistry::new(EngineConfig::default());
        let a = tenants.get_or_create("store-12").unwrap();
        let b = tenants.get_or_create("store-12").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        tenants.get_or_create("store-13").unwrap();
        assert_eq!(tenants.count(), 2);
    }

    #[test]
    fn test_rejects_path_like_user_ids() {
        let mut tenants = TenantRegistry::new(EngineConfig::default());
        assert!(tenants.get_or_create("../etc").is_err());
        assert!(tenants.get_or_create("").is_err());
        assert_eq!(tenants.count(), 0);
    }

    #[test]
    fn test_logs_go_to_user_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut tenants = TenantRegistry::new(EngineConfig {
            log_dir: Some(dir.path().to_path_buf()),
            ..EngineConfig::default()
        });
        let registry = tenants.get_or_create("alice").unwrap();
        assert_eq!(
            registry.config().log_dir.as_deref(),
            Some(dir.path().join("alice").as_path())
        );
    }
}
