//! # usenet-relay
//!
//! Automated relay between a local filesystem and a remote usenet
//! processing service reachable only over HTTP.
//!
//! New NZB files dropped into a staging directory are uploaded to the
//! service for remote processing. When the service signals that a job is
//! ready, the resulting artifact is pulled back as several concurrent
//! byte-range requests into one temp file, verified against the expected
//! size and MD5 digest, and only then atomically published into the
//! download directory. Both paths run under a bounded retry policy.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use usenet_relay::{Config, TransferSupervisor, UploadWatcher, server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let supervisor = Arc::new(TransferSupervisor::new(&config)?);
//!
//!     // Upload new files from the staging directory
//!     let mut watcher =
//!         UploadWatcher::new(supervisor.clone(), config.transfer.watch_dir.clone())?;
//!     watcher.start()?;
//!     tokio::spawn(watcher.run());
//!
//!     // Receive "job ready" callbacks
//!     server::start_server(supervisor, config.bind_address).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Inbound "job ready" notification payloads
pub mod notification;
/// Remote service metadata client
pub mod remote;
/// Bounded retry with escalating delay
pub mod retry;
/// Inbound notification endpoint
pub mod server;
/// Transfer coordination façade
pub mod supervisor;
/// Parallel chunked download with integrity verification
pub mod transfer;
/// Multipart upload of staged files
pub mod uploader;
/// Staging-directory watcher
pub mod watcher;

// Re-export commonly used types
pub use config::{ApiConfig, Config, RetryConfig, TransferConfig};
pub use error::{Error, IntegrityError, Result};
pub use notification::{Notification, NotificationData, extract_release_name};
pub use remote::{ApiEnvelope, ItemQuery, RemoteClient, RemoteFile, RemoteItem, UploadAck};
pub use retry::{IsRetryable, run_with_retry};
pub use supervisor::TransferSupervisor;
pub use transfer::{ChunkedDownloader, DownloadSession, TransferTarget, partition_ranges};
pub use uploader::{CachedUploadHook, Uploader};
pub use watcher::UploadWatcher;

/// Wait for a termination signal.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal
///   registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
#[cfg(unix)]
pub async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

/// Wait for a termination signal (Ctrl+C on non-Unix platforms).
#[cfg(not(unix))]
pub async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
