//! Feature store handle
//!
//! Owns the shared state of one service instance: the read-only mapping model
//! and the lock manager. Request handlers receive a clone of the handle (or a
//! reference to it) instead of reaching for process-wide statics.

use std::sync::Arc;
use thiserror::Error;

use crate::config::{ConfigError, StoreConfig};
use crate::feature_catalog::{FeatureMappingConfig, MappingModel, SchemaConfigError};
use crate::locking::FeatureLockManager;
use crate::query_translator::{AliasManager, PropertyNameMapper};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Schema(#[from] SchemaConfigError),
}

#[derive(Debug, Clone)]
pub struct FeatureStore {
    config: StoreConfig,
    mapping: Arc<MappingModel>,
    locks: Arc<FeatureLockManager>,
}

impl FeatureStore {
    /// Build a store from configuration, loading the mapping file if one is set
    pub fn from_config(config: StoreConfig) -> Result<Self, StoreError> {
        config.check()?;
        let mapping = match &config.mapping_file {
            Some(path) => {
                log::info!("Loading feature mapping from '{}'", path);
                FeatureMappingConfig::from_yaml_file(path)?.to_mapping_model()?
            }
            None => {
                log::warn!("No mapping file configured; no feature types are mapped");
                MappingModel::default()
            }
        };
        Ok(Self::new(config, mapping))
    }

    pub fn new(config: StoreConfig, mapping: MappingModel) -> Self {
        let locks = FeatureLockManager::new(config.lock_settings());
        Self::with_lock_manager(config, mapping, locks)
    }

    pub fn with_lock_manager(
        config: StoreConfig,
        mapping: MappingModel,
        locks: FeatureLockManager,
    ) -> Self {
        FeatureStore {
            config,
            mapping: Arc::new(mapping),
            locks: Arc::new(locks),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn mapping(&self) -> &MappingModel {
        &self.mapping
    }

    pub fn locks(&self) -> &FeatureLockManager {
        &self.locks
    }

    /// Start a query translation with an empty alias space
    pub fn translation(&self) -> PropertyNameMapper<'_> {
        PropertyNameMapper::with_alias_manager(
            &self.mapping,
            AliasManager::with_prefix_len(self.config.alias_prefix_len),
        )
    }
}
