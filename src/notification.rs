//! Inbound "job ready" notification payloads
//!
//! The remote service calls back with a small JSON body whose free-text
//! message embeds the release name. Only that name is extracted here; acting
//! on it belongs to the supervisor.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Notification delivered to the callback endpoint
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Notification {
    /// Notification kind as reported by the service
    #[serde(rename = "type", default)]
    pub kind: String,

    /// When the service emitted the notification
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    /// Notification content
    pub data: NotificationData,
}

/// Content of a notification
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NotificationData {
    /// Short human-readable title
    #[serde(default)]
    pub title: String,

    /// Free-text message embedding the release name
    #[serde(default)]
    pub message: String,
}

// The pattern is a literal and compiles unconditionally.
#[allow(clippy::expect_used)]
static RELEASE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"download (.+?) has").expect("release-name pattern"));

/// Extract the release name from a notification message.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when the message does not contain the
/// expected `download <name> has` phrase.
pub fn extract_release_name(message: &str) -> Result<String> {
    RELEASE_NAME
        .captures(message)
        .and_then(|captures| captures.get(1))
        .map(|capture| capture.as_str().to_string())
        .ok_or_else(|| Error::NotFound("notification message carries no release name".to_string()))
}
