//! Generic TOML-file-backed configuration, generalized from the teacher's
//! `ServerSettings` (`utils/settings.rs`): read on startup, defaulted and
//! written back if absent, watched for external edits, and exposed through a
//! `tokio::sync::watch` channel so a config edit takes effect without a
//! restart wherever the field is safely hot-swappable.
//!
//! Fields that require a restart to take effect (e.g. the bind port) are
//! still hot-reloaded into the channel; it is the binary's responsibility to
//! document which fields it only reads once at startup.

use std::{path::PathBuf, sync::Arc, time::SystemTime};

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::{utils::HandleErr, Shutdown};

pub struct ConfigStore<T> {
    path: PathBuf,
    sender: Arc<watch::Sender<T>>,
    receiver: watch::Receiver<T>,
}

impl<T> Clone for ConfigStore<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
        }
    }
}

impl<T> ConfigStore<T>
where
    T: Default + Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Loads `path`, writing a default config file if none exists yet, and
    /// spawns a background task that re-reads the file when its modified
    /// time advances.
    pub async fn load(path: impl Into<PathBuf>, shutdown: Shutdown) -> Self {
        let path = path.into();

        let config = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => toml::from_str(&contents)
                .log_err_with_msg("failed to parse config file, using the default config instead")
                .unwrap_or_default(),
            Err(_) => {
                let default = T::default();
                Self::write_file(&path, &default).await;
                default
            }
        };

        let (sender, receiver) = watch::channel(config);
        let sender = Arc::new(sender);

        let store = Self {
            path,
            sender,
            receiver,
        };

        tokio::spawn(store.clone().watch_file(shutdown));

        store
    }

    pub fn current(&self) -> T {
        self.receiver.borrow().clone()
    }

    pub fn receiver(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }

    async fn write_file(path: &PathBuf, config: &T) {
        let Some(serialized) = toml::to_string_pretty(config)
            .log_err_with_msg("failed to serialize config, leaving the file untouched")
        else {
            return;
        };

        tokio::fs::write(path, serialized)
            .await
            .log_warn_with_msg("failed to write config file")
            .ignore();
    }

    async fn watch_file(self, shutdown: Shutdown) {
        let mut last_changed = Self::modified_time(&self.path).await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(tokio::time::Duration::from_secs(2)) => {}
            }

            let changed = Self::modified_time(&self.path).await;
            if changed <= last_changed {
                continue;
            }
            last_changed = changed;

            let Some(contents) = tokio::fs::read_to_string(&self.path)
                .await
                .log_warn_with_msg("failed to read config file after it changed")
            else {
                continue;
            };

            match toml::from_str(&contents) {
                Ok(config) => {
                    info!("reloaded config from {}", self.path.display());
                    self.sender.send_if_modified(|current| {
                        let changed = *current != config;
                        if changed {
                            *current = config;
                        }
                        changed
                    });
                }
                Err(err) => {
                    error!("failed to parse reloaded config file, keeping previous config: {err}");
                }
            }
        }
    }

    async fn modified_time(path: &PathBuf) -> SystemTime {
        tokio::fs::metadata(path)
            .await
            .and_then(|meta| meta.modified())
            .unwrap_or_else(|_| SystemTime::now())
    }
}
