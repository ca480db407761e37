//! Configuration hot-reload functionality.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, RwLock};

use super::loader::load_and_validate;
use super::model::AppConfig;
use super::ConfigManager;
use crate::error::ConfigError;
use crate::queue::SubmissionQueue;

/// Watches the configuration file and retunes the queue on changes.
pub struct ConfigWatcher {
    config: Arc<RwLock<AppConfig>>,
    config_path: PathBuf,
    require_endpoint: bool,
    queue: SubmissionQueue,
    reload_tx: mpsc::Sender<ConfigReloadEvent>,
}

/// Events emitted by the configuration watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigReloadEvent {
    /// Configuration was successfully reloaded and applied to the queue.
    Reloaded,
    /// Configuration reload failed; the previous settings stay in effect.
    ValidationFailed { message: String },
}

impl ConfigWatcher {
    /// Creates a new configuration watcher.
    pub fn new(
        manager: &ConfigManager,
        queue: SubmissionQueue,
        reload_tx: mpsc::Sender<ConfigReloadEvent>,
    ) -> Self {
        Self {
            config: manager.get_config(),
            config_path: manager.config_path().to_path_buf(),
            require_endpoint: manager.require_endpoint(),
            queue,
            reload_tx,
        }
    }

    /// Starts watching the configuration file for changes.
    ///
    /// The returned watcher must be kept alive for events to keep flowing.
    pub fn start(self) -> Result<RecommendedWatcher, ConfigError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            },
            Config::default(),
        )
        .map_err(|e| self.watch_error(e))?;

        watcher
            .watch(&self.config_path, RecursiveMode::NonRecursive)
            .map_err(|e| self.watch_error(e))?;

        tokio::spawn(async move {
            self.handle_changes(rx).await;
        });

        Ok(watcher)
    }

    fn watch_error(&self, e: notify::Error) -> ConfigError {
        ConfigError::WatchFailed {
            path: self.config_path.clone(),
            message: e.to_string(),
        }
    }

    /// Handles file change events with debouncing.
    async fn handle_changes(self, mut rx: mpsc::UnboundedReceiver<notify::Event>) {
        let debounce_duration = Duration::from_millis(500);

        while let Some(event) = rx.recv().await {
            if !event.kind.is_modify() {
                continue;
            }

            // Let the editor finish writing, then collapse the burst of events.
            tokio::time::sleep(debounce_duration).await;
            while rx.try_recv().is_ok() {}

            match self.try_reload().await {
                Ok(()) => {
                    tracing::info!("Configuration reloaded successfully");
                    let _ = self.reload_tx.send(ConfigReloadEvent::Reloaded).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Configuration reload failed");
                    let _ = self
                        .reload_tx
                        .send(ConfigReloadEvent::ValidationFailed {
                            message: format!("{:#}", e),
                        })
                        .await;
                }
            }
        }

        tracing::warn!("Config watcher channel closed");
    }

    /// Loads, validates, and applies the new configuration.
    async fn try_reload(&self) -> anyhow::Result<()> {
        let new_config = load_and_validate(&self.config_path, self.require_endpoint)?;

        self.queue
            .reconfigure(new_config.queue.clone(), new_config.event_log.clone());

        let mut config = self.config.write().await;
        *config = new_config;

        Ok(())
    }
}
