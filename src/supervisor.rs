//! Transfer coordination façade
//!
//! The supervisor owns one wired instance of each transfer component. It
//! resolves symbolic requests (a release name from a notification, a remote
//! id from a cached-upload ack) into concrete transfer targets and drives
//! the corresponding engine path. It adds no retry of its own — retrying is
//! the lower components' concern — and propagates the first error it meets.

use crate::config::Config;
use crate::error::Result;
use crate::remote::{ItemQuery, RemoteClient, UploadAck};
use crate::transfer::ChunkedDownloader;
use crate::uploader::{CachedUploadHook, Uploader};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Coordinates uploads and downloads against one remote service account.
pub struct TransferSupervisor {
    remote: RemoteClient,
    uploader: Uploader,
    downloader: ChunkedDownloader,
    release_remote: bool,
}

impl TransferSupervisor {
    /// Wire up the supervisor from the process configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::Config`] when the API base URL is invalid.
    pub fn new(config: &Config) -> Result<Self> {
        let remote = RemoteClient::new(config)?;
        let downloader = ChunkedDownloader::new(config, remote.http().clone());

        // Cache hits on upload jump straight to the download path
        let hook = Arc::new(CachedRedirect {
            remote: remote.clone(),
            downloader: downloader.clone(),
            release_remote: config.release_remote,
        });
        let uploader = Uploader::new(config, remote.clone()).with_cached_hook(hook);

        Ok(Self {
            remote,
            uploader,
            downloader,
            release_remote: config.release_remote,
        })
    }

    /// Upload one staged file; the source is deleted on confirmed success.
    pub async fn handle_upload(&self, path: &Path) -> Result<UploadAck> {
        self.uploader.upload(path).await
    }

    /// Fetch one ready remote object and return the published local path.
    pub async fn handle_ready(&self, query: ItemQuery) -> Result<PathBuf> {
        fetch_ready(
            &self.remote,
            &self.downloader,
            &query,
            self.release_remote,
        )
        .await
    }
}

/// Resolve, download, publish, and optionally release the remote copy.
async fn fetch_ready(
    remote: &RemoteClient,
    downloader: &ChunkedDownloader,
    query: &ItemQuery,
    release_remote: bool,
) -> Result<PathBuf> {
    let target = remote.resolve_target(query).await?;
    let url = remote
        .request_download_link(target.item_id, target.file_id)
        .await?;
    let path = downloader.download(&url, &target).await?;

    if release_remote {
        // The download is already published; a failed release is a warning,
        // and the call is never retried.
        if let Err(e) = remote.release(target.item_id).await {
            tracing::warn!(item_id = target.item_id, error = %e, "could not release remote copy");
        }
    }

    Ok(path)
}

/// Hook that redirects a cached-upload acknowledgment into the download path.
struct CachedRedirect {
    remote: RemoteClient,
    downloader: ChunkedDownloader,
    release_remote: bool,
}

#[async_trait]
impl CachedUploadHook for CachedRedirect {
    async fn on_cached(&self, ack: &UploadAck) {
        let query = ItemQuery::ById(ack.usenetdownload_id);
        match fetch_ready(&self.remote, &self.downloader, &query, self.release_remote).await {
            Ok(path) => {
                tracing::info!(
                    item_id = ack.usenetdownload_id,
                    path = %path.display(),
                    "cached object fetched"
                );
            }
            Err(e) => {
                tracing::error!(
                    item_id = ack.usenetdownload_id,
                    error = %e,
                    "cached object fetch failed"
                );
            }
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiConfig, RetryConfig, TransferConfig};
    use crate::error::Error;
    use crate::transfer::test_support::{RangeResponder, patterned_body};
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path as url_path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        _dirs: TempDir,
        config: Config,
        server: MockServer,
        body: Vec<u8>,
    }

    async fn fixture() -> Fixture {
        let dirs = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let body = patterned_body(1000);

        let config = Config {
            api: ApiConfig {
                base_url: server.uri(),
                token: "tok-123".to_string(),
            },
            transfer: TransferConfig {
                watch_dir: dirs.path().join("watch"),
                download_dir: dirs.path().join("downloads"),
                temp_dir: dirs.path().join("temp"),
                chunk_count: 4,
            },
            upload_retry: fast_retry(),
            download_retry: fast_retry(),
            bind_address: ([127, 0, 0, 1], 0).into(),
            release_remote: true,
        };
        std::fs::create_dir_all(&config.transfer.watch_dir).unwrap();
        std::fs::create_dir_all(&config.transfer.download_dir).unwrap();
        std::fs::create_dir_all(&config.transfer.temp_dir).unwrap();

        Fixture {
            _dirs: dirs,
            config,
            server,
            body,
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    async fn mount_listing(fx: &Fixture) {
        let digest = format!("{:x}", md5::compute(&fx.body));
        Mock::given(method("GET"))
            .and(url_path("/v1/api/usenet/mylist"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "error": null,
                "detail": "",
                "data": [{
                    "id": 42,
                    "name": "Some.Release.2024",
                    "size": 1000,
                    "download_finished": true,
                    "files": [{
                        "id": 9,
                        "md5": digest,
                        "name": "a/some.release.mkv",
                        "size": 1000,
                        "mimetype": "video/x-matroska",
                        "short_name": "some.release.mkv"
                    }]
                }]
            })))
            .mount(&fx.server)
            .await;
    }

    async fn mount_link_and_object(fx: &Fixture) {
        Mock::given(method("GET"))
            .and(url_path("/v1/api/usenet/requestdl"))
            .and(query_param("usenet_id", "42"))
            .and(query_param("file_id", "9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "error": null,
                "detail": "",
                "data": format!("{}/signed/object", fx.server.uri())
            })))
            .mount(&fx.server)
            .await;

        Mock::given(method("GET"))
            .and(url_path("/signed/object"))
            .respond_with(RangeResponder::new(fx.body.clone()))
            .mount(&fx.server)
            .await;
    }

    #[tokio::test]
    async fn handle_ready_by_name_resolves_downloads_and_releases() {
        let fx = fixture().await;
        mount_listing(&fx).await;
        mount_link_and_object(&fx).await;
        Mock::given(method("POST"))
            .and(url_path("/v1/api/usenet/controlusenetdownload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true, "detail": "deleted", "data": null
            })))
            .expect(1)
            .mount(&fx.server)
            .await;

        let supervisor = TransferSupervisor::new(&fx.config).unwrap();
        let published = supervisor
            .handle_ready(ItemQuery::ByName("Some.Release.2024".to_string()))
            .await
            .unwrap();

        assert_eq!(
            published,
            fx.config.transfer.download_dir.join("some.release.mkv")
        );
        assert_eq!(std::fs::read(&published).unwrap(), fx.body);
    }

    #[tokio::test]
    async fn failed_release_does_not_fail_the_published_download() {
        let fx = fixture().await;
        mount_listing(&fx).await;
        mount_link_and_object(&fx).await;
        Mock::given(method("POST"))
            .and(url_path("/v1/api/usenet/controlusenetdownload"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&fx.server)
            .await;

        let supervisor = TransferSupervisor::new(&fx.config).unwrap();
        let published = supervisor
            .handle_ready(ItemQuery::ById(42))
            .await
            .unwrap();
        assert!(published.exists());
    }

    #[tokio::test]
    async fn resolution_failure_propagates_without_link_request() {
        let fx = fixture().await;
        Mock::given(method("GET"))
            .and(url_path("/v1/api/usenet/mylist"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true, "error": null, "detail": "", "data": []
            })))
            .mount(&fx.server)
            .await;
        Mock::given(method("GET"))
            .and(url_path("/v1/api/usenet/requestdl"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&fx.server)
            .await;

        let supervisor = TransferSupervisor::new(&fx.config).unwrap();
        let err = supervisor
            .handle_ready(ItemQuery::ByName("Missing".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn cached_upload_flows_into_the_download_path() {
        let fx = fixture().await;
        mount_listing(&fx).await;
        mount_link_and_object(&fx).await;
        Mock::given(method("POST"))
            .and(url_path("/v1/api/usenet/controlusenetdownload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true, "detail": "deleted", "data": null
            })))
            .mount(&fx.server)
            .await;
        Mock::given(method("POST"))
            .and(url_path("/v1/api/usenet/createusenetdownload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "error": null,
                "detail": "Found cached usenet download. Using cached download.",
                "data": { "hash": "h", "usenetdownload_id": 42, "auth_id": "a" }
            })))
            .mount(&fx.server)
            .await;

        let nzb = fx.config.transfer.watch_dir.join("Some.Release.2024.nzb");
        std::fs::write(&nzb, "<nzb/>").unwrap();

        let supervisor = TransferSupervisor::new(&fx.config).unwrap();
        supervisor.handle_upload(&nzb).await.unwrap();

        // The hook runs inside handle_upload, so the artifact is already here
        let published = fx.config.transfer.download_dir.join("some.release.mkv");
        assert_eq!(std::fs::read(&published).unwrap(), fx.body);
        assert!(!nzb.exists(), "source cleanup still happens on the cached path");
    }
}
