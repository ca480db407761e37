//! Configuration loading, validation, and hot-reload management.

pub mod hot_reload;
pub mod loader;
pub mod model;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::RwLock;

pub use model::AppConfig;

/// Holds the active configuration and where it came from.
pub struct ConfigManager {
    config: Arc<RwLock<AppConfig>>,
    config_path: PathBuf,
    require_endpoint: bool,
}

impl ConfigManager {
    /// Creates a new ConfigManager by loading and validating the config file.
    pub fn new(config_path: &Path, require_endpoint: bool) -> Result<Self> {
        let config = loader::load_and_validate(config_path, require_endpoint)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path: config_path.to_path_buf(),
            require_endpoint,
        })
    }

    /// Returns a shared reference to the current configuration.
    pub fn get_config(&self) -> Arc<RwLock<AppConfig>> {
        Arc::clone(&self.config)
    }

    /// Returns the path to the configuration file.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Whether reloads must keep a backend endpoint configured.
    pub fn require_endpoint(&self) -> bool {
        self.require_endpoint
    }
}
