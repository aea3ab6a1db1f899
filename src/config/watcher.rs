//! Configuration file watcher for hot reload.
//!
//! The parent directory is watched rather than the file itself, so editors
//! that save by writing a new file and renaming it over the old one are seen.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::AppConfig;

/// Watches one configuration file and sends every valid new version.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<AppConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<AppConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. Keep the returned watcher alive for as long as updates
    /// are wanted; dropping it stops the watch.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let tx = self.update_tx;
        let target = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if touches(&event, &target) => reload(&target, &tx),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}

fn touches(event: &Event, target: &Path) -> bool {
    (event.kind.is_modify() || event.kind.is_create())
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == target.file_name())
}

fn reload(path: &Path, tx: &mpsc::UnboundedSender<AppConfig>) {
    tracing::info!(path = ?path, "Config file change detected, reloading");
    match load_config(path) {
        Ok(config) => {
            if tx.send(config).is_err() {
                tracing::debug!("Config receiver dropped, ignoring reload");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to reload config, keeping current configuration")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, EventKind, ModifyKind};

    #[test]
    fn test_only_events_for_the_file_count() {
        let target = Path::new("/etc/router/router.toml");

        let hit = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/etc/router/router.toml"));
        assert!(touches(&hit, target));

        let renamed_in = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/etc/router/router.toml"));
        assert!(touches(&renamed_in, target));

        let other = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/etc/router/other.toml"));
        assert!(!touches(&other, target));

        let removed = Event::new(EventKind::Remove(notify::event::RemoveKind::File))
            .add_path(PathBuf::from("/etc/router/router.toml"));
        assert!(!touches(&removed, target));
    }

    #[tokio::test]
    async fn test_reload_sends_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("router.toml");
        std::fs::write(&path, "[routing]\nmax_depth = 9\n").unwrap();

        let (watcher, mut rx) = ConfigWatcher::new(&path);
        reload(&path, &watcher.update_tx);
        assert_eq!(rx.recv().await.unwrap().routing.max_depth, 9);

        std::fs::write(&path, "[routing]\nmax_depth = 0\n").unwrap();
        reload(&path, &watcher.update_tx);
        assert!(rx.try_recv().is_err());
    }
}
