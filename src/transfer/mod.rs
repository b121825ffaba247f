//! Parallel chunked download with integrity verification
//!
//! A download attempt partitions the remote object into disjoint byte
//! ranges, fetches them concurrently into one temp file, waits for every
//! fetcher at a join barrier, verifies the assembled file against the
//! expected size and MD5 digest, and only then renames it into the
//! destination directory. Failed or unverifiable attempts discard the temp
//! file and are retried under the bounded retry policy.

mod chunk;

use crate::config::Config;
use crate::error::{Error, IntegrityError, Result};
use crate::retry::run_with_retry;
use std::io::SeekFrom;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Resolved identity and metadata of a remote object to download
///
/// Produced by the metadata lookup, immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferTarget {
    /// Remote item identifier
    pub item_id: i64,
    /// Remote file identifier within the item
    pub file_id: i64,
    /// Display name, used as the local filename
    pub name: String,
    /// Expected size in bytes
    pub size: u64,
    /// Expected hex MD5 digest of the whole object, when the service has one
    pub md5: Option<String>,
}

/// Shared state of one download attempt
///
/// Holds the open temp file, the aggregate byte counter and the attempt
/// start time. Ranges never overlap, so positioned writes only need the
/// mutex for the seek+write pair; the counter is lock-free.
pub struct DownloadSession {
    file: tokio::sync::Mutex<tokio::fs::File>,
    bytes_done: AtomicU64,
    total: u64,
    started: Instant,
    name: String,
}

impl DownloadSession {
    /// Wrap an open temp file for an attempt over `total` bytes.
    pub fn new(file: tokio::fs::File, total: u64, name: String) -> Self {
        Self {
            file: tokio::sync::Mutex::new(file),
            bytes_done: AtomicU64::new(0),
            total,
            started: Instant::now(),
            name,
        }
    }

    /// Write `buf` at the absolute offset, holding the file lock only for
    /// the seek+write pair.
    pub async fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(buf).await?;
        Ok(())
    }

    /// Record `n` transferred bytes; returns the new aggregate count.
    pub fn add_bytes(&self, n: u64) -> u64 {
        self.bytes_done.fetch_add(n, Ordering::Relaxed) + n
    }

    /// Aggregate bytes written so far.
    pub fn bytes_done(&self) -> u64 {
        self.bytes_done.load(Ordering::Relaxed)
    }

    /// Expected total size of the object.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Display name of the object being fetched.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Completion percentage, advisory only.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.bytes_done() as f64 / self.total as f64 * 100.0
    }

    /// Instantaneous throughput in KB/s, advisory only.
    pub fn throughput_kbps(&self) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.bytes_done() as f64 / elapsed / 1024.0
    }

    /// Flush buffered writes and sync the file to disk.
    pub async fn sync(&self) -> Result<()> {
        let mut file = self.file.lock().await;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
}

/// Partition `[0, size)` into `chunks` disjoint, ordered ranges.
///
/// Ranges have equal width except the last, which absorbs the remainder.
/// Sizes too small to split collapse into a single range; a zero size
/// yields no ranges at all.
pub fn partition_ranges(size: u64, chunks: u64) -> Vec<Range<u64>> {
    if size == 0 || chunks == 0 {
        return Vec::new();
    }

    let width = size / chunks;
    if width == 0 {
        return vec![0..size];
    }

    let mut ranges = Vec::with_capacity(chunks as usize);
    for i in 0..chunks {
        let start = i * width;
        let end = if i == chunks - 1 { size } else { start + width };
        ranges.push(start..end);
    }
    ranges
}

// Distinguishes temp files of concurrent attempts within one process.
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Downloads one remote object as several concurrent byte-range requests,
/// verifies the result, and atomically publishes it.
#[derive(Clone)]
pub struct ChunkedDownloader {
    client: reqwest::Client,
    download_dir: PathBuf,
    temp_dir: PathBuf,
    chunk_count: u64,
    retry: crate::config::RetryConfig,
}

impl ChunkedDownloader {
    /// Create a downloader bound to the configured directories and chunking.
    pub fn new(config: &Config, client: reqwest::Client) -> Self {
        Self {
            client,
            download_dir: config.transfer.download_dir.clone(),
            temp_dir: config.transfer.temp_dir.clone(),
            chunk_count: config.transfer.chunk_count,
            retry: config.download_retry.clone(),
        }
    }

    /// Download `target` from `url` and return the published path.
    ///
    /// Each attempt runs the full fetch-join-verify-publish sequence; chunk
    /// failures and integrity mismatches discard the attempt's temp file and
    /// consume one unit of the retry bound. Temp-file and rename failures
    /// are resource errors and end the job immediately.
    pub async fn download(&self, url: &str, target: &TransferTarget) -> Result<PathBuf> {
        let operation = format!("download {}", target.name);
        run_with_retry(&self.retry, &operation, || self.attempt(url, target)).await
    }

    async fn attempt(&self, url: &str, target: &TransferTarget) -> Result<PathBuf> {
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let temp_path = self.temp_dir.join(format!("{}.{seq}.part", target.name));

        let result = self.run_attempt(url, target, &temp_path).await;

        if result.is_err() {
            match tokio::fs::remove_file(&temp_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %temp_path.display(), error = %e, "failed to discard temp file")
                }
            }
        }

        result
    }

    async fn run_attempt(
        &self,
        url: &str,
        target: &TransferTarget,
        temp_path: &Path,
    ) -> Result<PathBuf> {
        let file = tokio::fs::File::create(temp_path).await?;
        let session = Arc::new(DownloadSession::new(
            file,
            target.size,
            target.name.clone(),
        ));

        let ranges = partition_ranges(target.size, self.chunk_count);
        tracing::debug!(
            name = %target.name,
            size = target.size,
            chunks = ranges.len(),
            "starting download attempt"
        );

        let cancel = CancellationToken::new();
        let mut handles = Vec::with_capacity(ranges.len());
        for range in ranges {
            let client = self.client.clone();
            let url = url.to_string();
            let session = Arc::clone(&session);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                let result = chunk::fetch_chunk(&client, &url, range, &session, &cancel).await;
                if result.is_err() {
                    // stop sibling fetchers; the attempt is already lost
                    cancel.cancel();
                }
                result
            }));
        }

        // Join barrier: every fetcher finishes (or fails) before any result
        // is acted on. The primary cause is a non-cancellation error;
        // cancellations only exist because that error fired.
        let mut first_error: Option<Error> = None;
        for joined in futures::future::join_all(handles).await {
            let error = match joined {
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => e,
                Err(join_err) => Error::Io(std::io::Error::other(format!(
                    "chunk task failed: {join_err}"
                ))),
            };
            match &first_error {
                None => first_error = Some(error),
                Some(existing) if is_cancellation(existing) && !is_cancellation(&error) => {
                    first_error = Some(error)
                }
                Some(_) => {}
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        session.sync().await?;
        tracing::debug!(
            name = %target.name,
            bytes = session.bytes_done(),
            kbps = format_args!("{:.2}", session.throughput_kbps()),
            "all chunks joined"
        );
        drop(session);

        verify_assembled(temp_path, target).await?;

        let final_path = self.download_dir.join(&target.name);
        tokio::fs::rename(temp_path, &final_path).await?;

        tracing::info!(
            name = %target.name,
            path = %final_path.display(),
            size = target.size,
            "download published"
        );
        Ok(final_path)
    }
}

/// A fetcher abort caused by sibling cancellation, never a primary cause.
fn is_cancellation(error: &Error) -> bool {
    matches!(error, Error::Io(io) if io.kind() == std::io::ErrorKind::Interrupted)
}

/// Verify the assembled temp file against the target's size and digest.
async fn verify_assembled(path: &Path, target: &TransferTarget) -> Result<()> {
    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() != target.size {
        return Err(Error::Integrity(IntegrityError::SizeMismatch {
            expected: target.size,
            actual: metadata.len(),
        }));
    }

    if let Some(expected) = &target.md5 {
        let actual = file_md5_hex(path).await?;
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(Error::Integrity(IntegrityError::DigestMismatch {
                expected: expected.clone(),
                actual,
            }));
        }
    }

    Ok(())
}

/// Whole-file MD5 as a lowercase hex string.
async fn file_md5_hex(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut context = md5::Context::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        context.consume(&buf[..n]);
    }
    Ok(format!("{:x}", context.compute()))
}
