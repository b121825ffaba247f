//! Multipart upload of staged files to the remote ingest endpoint
//!
//! The source file is read once before the retry loop (an unreadable source
//! is a precondition failure, not a retry), pushed as a multipart body under
//! the bounded retry policy, and deleted from disk only after the service
//! confirmed acceptance. When the acknowledgment reports the object was
//! already cached remotely, the registered hook is invoked — chasing the
//! cached copy is the caller's business rule, not the uploader's.

use crate::config::{Config, RetryConfig};
use crate::error::{Error, Result};
use crate::remote::{ApiEnvelope, RemoteClient, UploadAck};
use crate::retry::run_with_retry;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Multipart field name the ingest endpoint expects for the file content
const FILE_FIELD: &str = "file";
/// Companion text field carrying the base name without its extension
const NAME_FIELD: &str = "name";

/// Hook invoked after a successful upload whose acknowledgment reports the
/// object was already present remotely.
#[async_trait]
pub trait CachedUploadHook: Send + Sync {
    /// Called with the acknowledgment of the cached object.
    async fn on_cached(&self, ack: &UploadAck);
}

/// Pushes one local file to the remote ingest endpoint.
pub struct Uploader {
    remote: RemoteClient,
    retry: RetryConfig,
    cached_hook: Option<Arc<dyn CachedUploadHook>>,
}

impl Uploader {
    /// Create an uploader using the shared remote client and the configured
    /// upload retry policy.
    pub fn new(config: &Config, remote: RemoteClient) -> Self {
        Self {
            remote,
            retry: config.upload_retry.clone(),
            cached_hook: None,
        }
    }

    /// Register the cached-object hook.
    pub fn with_cached_hook(mut self, hook: Arc<dyn CachedUploadHook>) -> Self {
        self.cached_hook = Some(hook);
        self
    }

    /// Upload the file at `path` and delete it once the service confirms.
    ///
    /// # Errors
    ///
    /// - [`Error::SourceFile`] when the file cannot be read (no attempt is
    ///   consumed);
    /// - [`Error::RetriesExhausted`] when every attempt failed; the source
    ///   file is left in place.
    pub async fn upload(&self, path: &Path) -> Result<UploadAck> {
        let bytes = tokio::fs::read(path).await.map_err(|source| Error::SourceFile {
            path: path.to_path_buf(),
            source,
        })?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| Error::SourceFile {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "path has no usable filename",
                ),
            })?;
        let stem = path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or(&file_name)
            .to_string();

        let operation = format!("upload {file_name}");
        let (ack, detail) = run_with_retry(&self.retry, &operation, || {
            self.attempt(&bytes, &file_name, &stem)
        })
        .await?;

        tracing::info!(file = %file_name, item_id = ack.usenetdownload_id, "upload accepted");

        // Cleanup failure is a warning, never an upload failure
        match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::info!(path = %path.display(), "source file deleted"),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "upload succeeded but source file could not be deleted")
            }
        }

        if detail.to_lowercase().contains("cached") {
            tracing::info!(
                item_id = ack.usenetdownload_id,
                detail = %detail,
                "service already holds a cached copy"
            );
            if let Some(hook) = &self.cached_hook {
                hook.on_cached(&ack).await;
            }
        }

        Ok(ack)
    }

    async fn attempt(
        &self,
        bytes: &[u8],
        file_name: &str,
        stem: &str,
    ) -> Result<(UploadAck, String)> {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new()
            .part(FILE_FIELD, part)
            .text(NAME_FIELD, stem.to_string());

        let response = self
            .remote
            .http()
            .post(self.remote.endpoint("v1/api/usenet/createusenetdownload"))
            .bearer_auth(self.remote.token())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                operation: "upload",
                status: status.as_u16(),
            });
        }

        let envelope: ApiEnvelope<UploadAck> = response.json().await?;
        if !envelope.success {
            return Err(Error::Rejected {
                operation: "upload",
                detail: envelope.detail,
            });
        }

        let ack = envelope.data.ok_or(Error::Rejected {
            operation: "upload",
            detail: "response carried no data".to_string(),
        })?;
        Ok((ack, envelope.detail))
    }
}
