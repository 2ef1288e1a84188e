//! Configuration file watcher for hot reload.
//!
//! Editors tend to emit several events per save; a reload is only published
//! when the file content actually changed and still validates.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::loader::parse_config;
use crate::config::schema::CaptureProxyConfig;

/// Watches the configuration file and publishes validated reloads.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<CaptureProxyConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end for reloaded configurations.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<CaptureProxyConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let initial = std::fs::read_to_string(&self.path).ok();
        let reloader = Reloader {
            path: self.path.clone(),
            last_content: Mutex::new(initial),
            update_tx: self.update_tx,
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => reloader.reload(),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

struct Reloader {
    path: PathBuf,
    last_content: Mutex<Option<String>>,
    update_tx: mpsc::UnboundedSender<CaptureProxyConfig>,
}

impl Reloader {
    fn reload(&self) {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "Config file unreadable, keeping current configuration");
                return;
            }
        };

        let Ok(mut last) = self.last_content.lock() else {
            return;
        };
        if last.as_deref() == Some(content.as_str()) {
            return;
        }

        match parse_config(&content) {
            Ok(config) => {
                *last = Some(content);
                tracing::info!(path = ?self.path, "Config change detected, reloading");
                let _ = self.update_tx.send(config);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn reloader_for(file: &tempfile::NamedTempFile) -> (Reloader, mpsc::UnboundedReceiver<CaptureProxyConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let reloader = Reloader {
            path: file.path().to_path_buf(),
            last_content: Mutex::new(std::fs::read_to_string(file.path()).ok()),
            update_tx,
        };
        (reloader, update_rx)
    }

    #[test]
    fn unchanged_content_is_not_republished() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[capture]\nservice_name = \"a\"\n").unwrap();
        let (reloader, mut rx) = reloader_for(&file);

        reloader.reload();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn changed_content_is_published_once() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let (reloader, mut rx) = reloader_for(&file);

        std::fs::write(file.path(), "[capture]\nbody_capture_size = 16\n").unwrap();
        reloader.reload();
        reloader.reload();

        let config = rx.try_recv().unwrap();
        assert_eq!(config.capture.body_capture_size, 16);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn invalid_content_is_skipped() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let (reloader, mut rx) = reloader_for(&file);

        std::fs::write(file.path(), "[exporter]\nworkers = 0\n").unwrap();
        reloader.reload();
        assert!(rx.try_recv().is_err());
    }
}
