//! Shared state of the comparison service.
//!
//! Contains the ConfigRegistry and shared service state. The registry is
//! bounded: once [`MAX_REGISTERED_CONFIGS`] configs are stored, new ones are
//! refused until the process restarts.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use serde::{Deserialize, Serialize};

use crate::canonical::canonical_hash_hex;
use crate::compare::CompareConfig;

/// Default number of configs a registry holds.
pub const MAX_REGISTERED_CONFIGS: usize = 64;

/// A new config was refused because the registry is at capacity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Config registry is full ({capacity} configs)")]
pub struct RegistryFull {
    /// Capacity of the registry.
    pub capacity: usize,
}

/// Reference to a registered comparison config by hash.
///
/// This enables hash-stable config references across requests.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConfigRef {
    /// Config schema identifier (e.g., "compare_config_v1")
    pub config_id: String,
    /// xxHash64 of canonical config JSON
    pub params_hash: String,
}

impl ConfigRef {
    /// Create a config reference from a CompareConfig.
    pub fn from_config(config: &CompareConfig) -> Self {
        Self {
            config_id: config.config_id().to_string(),
            params_hash: config.params_hash(),
        }
    }
}

/// Registry of immutable comparison configs with stable hashes.
///
/// The registry itself has a fingerprint that changes when configs change.
#[derive(Debug, Clone)]
pub struct ConfigRegistry {
    configs: BTreeMap<ConfigRef, CompareConfig>,
    registry_fingerprint: String,
    capacity: usize,
}

impl ConfigRegistry {
    /// Registry with no configs.
    pub fn new() -> Self {
        Self::with_capacity(MAX_REGISTERED_CONFIGS)
    }

    /// Empty registry holding at most `capacity` configs.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut registry = Self {
            configs: BTreeMap::new(),
            registry_fingerprint: String::new(),
            capacity,
        };
        registry.update_fingerprint();
        registry
    }

    /// Create a registry with the default and minimal configs pre-registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.insert(CompareConfig::default());
        registry.insert(CompareConfig::minimal());
        registry
    }

    /// Register a config and return its reference.
    ///
    /// If the config already exists (same hash), returns the existing reference.
    ///
    /// # Errors
    /// [`RegistryFull`] if the config is new and the registry is at capacity.
    pub fn register(&mut self, config: CompareConfig) -> Result<ConfigRef, RegistryFull> {
        let config_ref = ConfigRef::from_config(&config);
        if !self.configs.contains_key(&config_ref) && self.configs.len() >= self.capacity {
            tracing::warn!(
                capacity = self.capacity,
                params_hash = %config_ref.params_hash,
                "Config registry full, refusing config"
            );
            return Err(RegistryFull {
                capacity: self.capacity,
            });
        }
        Ok(self.insert(config))
    }

    fn insert(&mut self, config: CompareConfig) -> ConfigRef {
        let config_ref = ConfigRef::from_config(&config);
        if !self.configs.contains_key(&config_ref) {
            self.configs.insert(config_ref.clone(), config);
            self.update_fingerprint();
        }
        config_ref
    }

    /// Resolve a config reference.
    pub fn resolve(&self, config_ref: &ConfigRef) -> Option<&CompareConfig> {
        self.configs.get(config_ref)
    }

    /// All registered config references.
    pub fn list(&self) -> Vec<ConfigRef> {
        self.configs.keys().cloned().collect()
    }

    /// The registry fingerprint.
    pub fn fingerprint(&self) -> &str {
        &self.registry_fingerprint
    }

    /// Number of registered configs.
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    /// Maximum number of configs.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    fn update_fingerprint(&mut self) {
        let refs: Vec<_> = self.configs.keys().collect();
        self.registry_fingerprint = canonical_hash_hex(&refs);
    }
}

impl Default for ConfigRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Shared service state.
///
/// The service keeps no per-document state; only the config registry is shared.
#[derive(Debug, Clone, Default)]
pub struct ServiceState {
    /// Registry of available comparison configs.
    pub config_registry: Arc<RwLock<ConfigRegistry>>,
}

impl ServiceState {
    /// Create state with the default registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create state with a custom registry.
    pub fn with_registry(registry: ConfigRegistry) -> Self {
        Self {
            config_registry: Arc::new(RwLock::new(registry)),
        }
    }

    /// Resolve an optional reference, falling back to the default config.
    pub fn resolve_config(&self, config_ref: Option<&ConfigRef>) -> Option<(CompareConfig, ConfigRef)> {
        match config_ref {
            None => {
                let config = CompareConfig::default();
                let config_ref = ConfigRef::from_config(&config);
                Some((config, config_ref))
            }
            Some(r) => {
                let registry = self.config_registry.read().unwrap_or_else(|e| e.into_inner());
                registry.resolve(r).map(|c| (c.clone(), r.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_registry_register() {
        let mut registry = ConfigRegistry::new();
        let ref1 = registry.register(CompareConfig::default()).unwrap();
        let ref2 = registry.register(CompareConfig::default()).unwrap();

        assert_eq!(ref1, ref2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_config_registry_fingerprint_changes() {
        let mut registry = ConfigRegistry::new();
        let initial = registry.fingerprint().to_string();
        registry.register(CompareConfig::minimal()).unwrap();
        assert_ne!(registry.fingerprint(), initial);
    }

    #[test]
    fn test_config_registry_capacity() {
        let mut registry = ConfigRegistry::with_capacity(1);
        registry.register(CompareConfig::default()).unwrap();

        let err = registry.register(CompareConfig::minimal()).unwrap_err();
        assert_eq!(err, RegistryFull { capacity: 1 });
        assert_eq!(registry.len(), 1);

        // Known configs resolve to their reference even when full.
        assert!(registry.register(CompareConfig::default()).is_ok());
    }

    #[test]
    fn test_resolve_config() {
        let state = ServiceState::new();
        let (config, _) = state.resolve_config(None).unwrap();
        assert_eq!(config, CompareConfig::default());

        let minimal_ref = ConfigRef::from_config(&CompareConfig::minimal());
        let (config, r) = state.resolve_config(Some(&minimal_ref)).unwrap();
        assert_eq!(config, CompareConfig::minimal());
        assert_eq!(r, minimal_ref);

        let unknown = ConfigRef {
            config_id: "compare_config_v1".into(),
            params_hash: "0000000000000000".into(),
        };
        assert!(state.resolve_config(Some(&unknown)).is_none());
    }
}
