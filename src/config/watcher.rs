//! Configuration file watcher for hot reload.
//!
//! File events and SIGHUP both end in the same place: the file is loaded,
//! validated, and the resulting config is sent to the server's reload loop.
//! A file that fails to load is logged and the running config stays active.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GatewayConfig;
use crate::observability::metrics;

/// Loads the config file on demand and forwards accepted configs.
#[derive(Debug, Clone)]
pub struct ReloadTrigger {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl ReloadTrigger {
    /// Load the file and queue it for the server. Returns whether it was accepted.
    pub fn reload(&self, cause: &'static str) -> bool {
        match load_config(&self.path) {
            Ok(config) => {
                tracing::info!(path = ?self.path, cause, routes = config.routes.len(), "Configuration reloaded from disk");
                self.update_tx.send(config).is_ok()
            }
            Err(e) => {
                tracing::error!(path = ?self.path, cause, error = %e, "Failed to reload config, keeping current configuration");
                metrics::record_route_reload(false);
                false
            }
        }
    }
}

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    trigger: ReloadTrigger,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let trigger = ReloadTrigger {
            path: path.to_path_buf(),
            update_tx,
        };
        (Self { trigger }, update_rx)
    }

    /// Handle for reloads that do not come from file events (SIGHUP, admin).
    pub fn trigger(&self) -> ReloadTrigger {
        self.trigger.clone()
    }

    /// Start watching the file. Dropping the returned watcher stops it.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let trigger = self.trigger.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    tracing::info!("Config file change detected, reloading");
                    trigger.reload("file_change");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.trigger.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.trigger.path, "Config watcher started");
        Ok(watcher)
    }
}
