//! Versioned, immutable configuration snapshots.
//!
//! A [`ConfigStore`] hands out `Arc<ConfigSnapshot>` clones. A request keeps
//! the snapshot it started with even if a reload swaps in a newer one while
//! it is in flight; snapshots are never mutated in place.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::config::{load_config, Config};
use crate::models::{Connector, QueryConnectorBinding, QueryDefinition};

/// One immutable view of every configuration record.
#[derive(Debug)]
pub struct ConfigSnapshot {
    pub version: u64,
    pub loaded_at: DateTime<Utc>,
    pub config: Config,
}

impl ConfigSnapshot {
    pub fn new(version: u64, config: Config) -> Self {
        Self {
            version,
            loaded_at: Utc::now(),
            config,
        }
    }

    pub fn binding(&self, query_id: &str) -> Option<&QueryConnectorBinding> {
        self.config.query_connectors.get(query_id)
    }

    pub fn connector(&self, id: &str) -> Option<&Connector> {
        self.config.connectors.get(id)
    }

    pub fn query(&self, id: &str) -> Option<&QueryDefinition> {
        self.config.queries.get(id)
    }
}

/// Holds the current snapshot and swaps it atomically on reload.
pub struct ConfigStore {
    current: RwLock<Arc<ConfigSnapshot>>,
    source: Option<PathBuf>,
}

impl ConfigStore {
    pub fn new(config: Config) -> Self {
        Self {
            current: RwLock::new(Arc::new(ConfigSnapshot::new(1, config))),
            source: None,
        }
    }

    /// Loads the store from a TOML file so it can later be [`reload`](Self::reload)ed.
    pub fn from_path(path: &Path) -> Result<Self> {
        let config = load_config(path)?;
        Ok(Self {
            current: RwLock::new(Arc::new(ConfigSnapshot::new(1, config))),
            source: Some(path.to_path_buf()),
        })
    }

    /// The snapshot current at call time.
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Installs `config` as the next version and returns it.
    pub fn replace(&self, config: Config) -> Arc<ConfigSnapshot> {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let next = Arc::new(ConfigSnapshot::new(guard.version + 1, config));
        *guard = Arc::clone(&next);
        tracing::info!(version = next.version, "configuration snapshot swapped");
        next
    }

    /// Re-reads the source file. A file that fails to load leaves the
    /// current snapshot in place.
    pub fn reload(&self) -> Result<Arc<ConfigSnapshot>> {
        let Some(path) = &self.source else {
            anyhow::bail!("configuration store was not loaded from a file");
        };
        let config = load_config(path)?;
        Ok(self.replace(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_bumps_version_and_keeps_old_snapshot() {
        let store = ConfigStore::new(Config::default());
        let first = store.snapshot();
        assert_eq!(first.version, 1);

        let mut next = Config::default();
        next.settings.debug_mode = true;
        store.replace(next);

        let second = store.snapshot();
        assert_eq!(second.version, 2);
        assert!(second.config.settings.debug_mode);
        assert!(!first.config.settings.debug_mode);
    }

    #[test]
    fn test_reload_without_source_fails() {
        let store = ConfigStore::new(Config::default());
        assert!(store.reload().is_err());
    }
}
