//! Staging-directory watcher
//!
//! Watches the staging directory for newly dropped `.nzb` files and hands
//! each one to the supervisor's upload path. Uploads for one watcher run
//! sequentially; every outcome is logged with the file identity, and a
//! failed upload leaves the file in place for the next attempt or manual
//! inspection.

use crate::error::{Error, Result};
use crate::supervisor::TransferSupervisor;
use notify::{
    Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Watches one staging directory and uploads every new NZB file.
pub struct UploadWatcher {
    /// Filesystem watcher instance
    watcher: RecommendedWatcher,

    /// Channel for receiving filesystem events
    rx: mpsc::UnboundedReceiver<notify::Result<Event>>,

    /// Supervisor driving the upload path
    supervisor: Arc<TransferSupervisor>,

    /// Watched staging directory
    watch_dir: PathBuf,
}

impl UploadWatcher {
    /// Create a watcher for the given staging directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FolderWatch`] if the filesystem watcher cannot be
    /// initialized.
    pub fn new(supervisor: Arc<TransferSupervisor>, watch_dir: PathBuf) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let watcher = RecommendedWatcher::new(
            move |res| {
                if let Err(e) = tx.send(res) {
                    error!("failed to forward filesystem event: {}", e);
                }
            },
            NotifyConfig::default(),
        )
        .map_err(|e| Error::FolderWatch(e.to_string()))?;

        Ok(Self {
            watcher,
            rx,
            supervisor,
            watch_dir,
        })
    }

    /// Start watching the staging directory, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FolderWatch`] when the directory cannot be created
    /// or registered with the watcher.
    pub fn start(&mut self) -> Result<()> {
        if !self.watch_dir.exists() {
            std::fs::create_dir_all(&self.watch_dir).map_err(|e| {
                Error::FolderWatch(format!("failed to create staging directory: {}", e))
            })?;
            info!(path = %self.watch_dir.display(), "created staging directory");
        }

        self.watcher
            .watch(&self.watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| Error::FolderWatch(format!("failed to watch staging directory: {}", e)))?;

        info!(path = %self.watch_dir.display(), "watching staging directory");
        Ok(())
    }

    /// Run the watcher event loop until the event channel closes.
    pub async fn run(mut self) {
        info!("upload watcher started");

        while let Some(result) = self.rx.recv().await {
            match result {
                Ok(event) => self.handle_event(event).await,
                Err(e) => error!("filesystem watcher error: {}", e),
            }
        }

        info!("upload watcher stopped");
    }

    /// Dispatch one filesystem event.
    async fn handle_event(&self, event: Event) {
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => {
                for path in event.paths {
                    if is_nzb_file(&path) {
                        self.process_staged_file(&path).await;
                    }
                }
            }
            _ => {
                // Ignore other event types (delete, access, etc.)
            }
        }
    }

    /// Upload one staged file through the supervisor.
    async fn process_staged_file(&self, path: &Path) {
        debug!(path = %path.display(), "staged file detected");

        // Writers may still be flushing; give the file a moment to settle
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        // A Modify event often trails the Create that already consumed the file
        if !path.exists() {
            debug!(path = %path.display(), "staged file already consumed");
            return;
        }

        match self.supervisor.handle_upload(path).await {
            Ok(ack) => {
                info!(
                    path = %path.display(),
                    item_id = ack.usenetdownload_id,
                    "staged file uploaded"
                );
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "staged file upload failed");
            }
        }
    }
}

/// Check for the `.nzb` extension, case-insensitively.
fn is_nzb_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("nzb"))
        .unwrap_or(false)
}
