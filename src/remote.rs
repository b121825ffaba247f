//! Remote service metadata client
//!
//! Thin typed wrapper over the service's JSON API: listing stored items,
//! resolving a [`TransferTarget`] from a lookup query, requesting a signed
//! download URL, and releasing a server-side copy. All requests carry the
//! bearer token; every response is the same `{success, error, detail, data}`
//! envelope.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::transfer::TransferTarget;
use serde::{Deserialize, Serialize};
use url::Url;

/// Standard response envelope used by every remote endpoint
#[derive(Clone, Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiEnvelope<T> {
    /// Whether the service accepted the request
    pub success: bool,
    /// Machine-readable error payload, if any
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    /// Human-readable outcome description
    #[serde(default)]
    pub detail: String,
    /// Endpoint-specific payload
    #[serde(default)]
    pub data: Option<T>,
}

/// One stored item on the remote service
#[derive(Clone, Debug, Deserialize)]
pub struct RemoteItem {
    /// Remote item identifier
    pub id: i64,
    /// Item name (matches the uploaded release name)
    pub name: String,
    /// Total item size in bytes
    #[serde(default)]
    pub size: u64,
    /// Whether the item was served from the service's cache
    #[serde(default)]
    pub cached: bool,
    /// Whether remote processing has finished
    #[serde(default)]
    pub download_finished: bool,
    /// Files belonging to the item
    #[serde(default)]
    pub files: Vec<RemoteFile>,
}

/// One file within a remote item
#[derive(Clone, Debug, Deserialize)]
pub struct RemoteFile {
    /// Remote file identifier
    pub id: i64,
    /// Hex MD5 digest of the file content, when the service computed one
    #[serde(default)]
    pub md5: Option<String>,
    /// Full remote path/name
    #[serde(default)]
    pub name: String,
    /// File size in bytes
    #[serde(default)]
    pub size: u64,
    /// MIME type reported by the service
    #[serde(default)]
    pub mimetype: String,
    /// Short (base) filename, used as the local filename
    #[serde(default)]
    pub short_name: String,
}

/// Acknowledgment payload returned by the ingest endpoint
#[derive(Clone, Debug, Deserialize)]
pub struct UploadAck {
    /// Content hash assigned by the service
    #[serde(default)]
    pub hash: String,
    /// Identifier of the created (or cached) remote item
    pub usenetdownload_id: i64,
    /// Authorization context identifier
    #[serde(default)]
    pub auth_id: String,
}

/// Lookup strategy for resolving a remote item into a [`TransferTarget`]
///
/// `ByName` serves the notification path (the callback only carries a
/// release name); `ById` serves the cached-upload path (the ack carries the
/// remote identifier).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemQuery {
    /// Match on the item's name
    ByName(String),
    /// Match on the item's remote identifier
    ById(i64),
}

impl ItemQuery {
    fn matches(&self, item: &RemoteItem) -> bool {
        match self {
            ItemQuery::ByName(name) => item.name == *name,
            ItemQuery::ById(id) => item.id == *id,
        }
    }
}

impl std::fmt::Display for ItemQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemQuery::ByName(name) => write!(f, "name '{name}'"),
            ItemQuery::ById(id) => write!(f, "id {id}"),
        }
    }
}

/// Client for the remote service's metadata API
#[derive(Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl RemoteClient {
    /// Create a client from the process configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configured base URL does not parse.
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = Url::parse(&config.api.base_url).map_err(|e| Error::Config {
            message: format!("invalid API base URL '{}': {e}", config.api.base_url),
            key: Some("API_BASE_URL".to_string()),
        })?;

        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            token: config.api.token.clone(),
        })
    }

    /// The shared HTTP client, for collaborators issuing their own requests.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// The configured bearer token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Absolute URL for an API path under the configured base.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// List all items currently stored for this account.
    pub async fn list_items(&self) -> Result<Vec<RemoteItem>> {
        let response = self
            .http
            .get(self.endpoint("v1/api/usenet/mylist"))
            .bearer_auth(&self.token)
            .send()
            .await?;

        unwrap_envelope(response, "list items").await
    }

    /// Resolve a lookup query into a transfer target.
    ///
    /// Matches the item per the query, then picks the first file whose MIME
    /// type marks it as video and whose short name is not a sample.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no item matches or the matching item
    /// has no usable file.
    pub async fn resolve_target(&self, query: &ItemQuery) -> Result<TransferTarget> {
        let items = self.list_items().await?;

        let item = items
            .iter()
            .find(|item| query.matches(item))
            .ok_or_else(|| Error::NotFound(format!("no item with {query}")))?;

        let file = select_video_file(item)
            .ok_or_else(|| Error::NotFound(format!("item {} has no usable video file", item.id)))?;

        tracing::debug!(
            item_id = item.id,
            file_id = file.id,
            name = %file.short_name,
            size = file.size,
            "resolved transfer target"
        );

        Ok(TransferTarget {
            item_id: item.id,
            file_id: file.id,
            name: file.short_name.clone(),
            size: file.size,
            md5: file.md5.clone(),
        })
    }

    /// Request a signed download URL for one file of an item.
    pub async fn request_download_link(&self, item_id: i64, file_id: i64) -> Result<String> {
        let response = self
            .http
            .get(self.endpoint("v1/api/usenet/requestdl"))
            .query(&[
                ("token", self.token.as_str()),
                ("usenet_id", &item_id.to_string()),
                ("file_id", &file_id.to_string()),
                ("zip", "false"),
            ])
            .bearer_auth(&self.token)
            .send()
            .await?;

        unwrap_envelope(response, "request download link").await
    }

    /// Ask the service to delete its copy of an item.
    ///
    /// A non-success response is an error; this call is never retried.
    pub async fn release(&self, item_id: i64) -> Result<()> {
        let response = self
            .http
            .post(self.endpoint("v1/api/usenet/controlusenetdownload"))
            .bearer_auth(&self.token)
            .json(&ControlRequest {
                usenet_id: item_id,
                operation: "delete",
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                operation: "release remote item",
                status: status.as_u16(),
            });
        }

        tracing::info!(item_id, "released remote copy");
        Ok(())
    }
}

#[derive(Serialize)]
struct ControlRequest {
    usenet_id: i64,
    operation: &'static str,
}

/// Pick the file worth fetching: video MIME type, not a sample.
fn select_video_file(item: &RemoteItem) -> Option<&RemoteFile> {
    item.files.iter().find(|file| {
        file.mimetype.starts_with("video/")
            && !file.short_name.to_lowercase().contains("sample")
    })
}

/// Check status, parse the envelope, and extract its payload.
pub(crate) async fn unwrap_envelope<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(Error::Status {
            operation,
            status: status.as_u16(),
        });
    }

    let envelope: ApiEnvelope<T> = response.json().await?;
    if !envelope.success {
        return Err(Error::Rejected {
            operation,
            detail: envelope.detail,
        });
    }

    envelope.data.ok_or(Error::Rejected {
        operation,
        detail: "response carried no data".to_string(),
    })
}
