//! Single byte-range fetcher
//!
//! One fetcher owns one `[start, end)` slice of the remote object. The
//! response body is streamed frame by frame; each frame lands at the current
//! absolute offset, which starts at `start` and advances by the length of
//! every write. The shared file lock is held only for one positioned write
//! at a time, and the progress counter is updated outside it.

use super::DownloadSession;
use crate::error::{Error, Result};
use reqwest::StatusCode;
use std::ops::Range;
use tokio_util::sync::CancellationToken;

/// Fetch one byte range of `url` into the session's temp file.
///
/// Returns the number of bytes this fetcher wrote. A non-2xx status, a
/// truncated body, or a mid-stream read failure is a fetch error; sibling
/// cancellation aborts promptly.
///
/// Servers that ignore the `Range` header answer 200 with the full object.
/// In that case the fetcher owning offset 0 consumes the entire body so the
/// assembled file is still byte-correct, and every other fetcher yields.
pub(crate) async fn fetch_chunk(
    client: &reqwest::Client,
    url: &str,
    range: Range<u64>,
    session: &DownloadSession,
    cancel: &CancellationToken,
) -> Result<u64> {
    if range.is_empty() {
        return Ok(0);
    }

    let range_header = format!("bytes={}-{}", range.start, range.end - 1);
    let send = client
        .get(url)
        .header(reqwest::header::RANGE, range_header)
        .send();

    let mut response = tokio::select! {
        result = send => result?,
        _ = cancel.cancelled() => return Err(cancelled(&range)),
    };

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Status {
            operation: "chunk fetch",
            status: status.as_u16(),
        });
    }

    // 200 instead of 206: the server ignored the range and is streaming the
    // whole object. Only the offset-0 fetcher writes it; the rest yield.
    let full_body = status == StatusCode::OK;
    if full_body && range.start != 0 {
        tracing::debug!(
            start = range.start,
            "server ignored range request, deferring to the offset-0 fetcher"
        );
        return Ok(0);
    }

    let start = if full_body { 0 } else { range.start };
    let expected_end = if full_body { session.total() } else { range.end };

    let mut offset = start;
    loop {
        let frame = tokio::select! {
            frame = response.chunk() => frame?,
            _ = cancel.cancelled() => return Err(cancelled(&range)),
        };
        let Some(bytes) = frame else { break };
        if bytes.is_empty() {
            continue;
        }

        session.write_at(offset, &bytes).await?;
        offset += bytes.len() as u64;
        session.add_bytes(bytes.len() as u64);

        tracing::trace!(
            name = %session.name(),
            percent = format_args!("{:.2}", session.percent()),
            kbps = format_args!("{:.2}", session.throughput_kbps()),
            "download progress"
        );
    }

    if offset < expected_end {
        return Err(Error::Rejected {
            operation: "chunk fetch",
            detail: format!(
                "range {}-{} delivered {} of {} bytes",
                start,
                expected_end,
                offset - start,
                expected_end - start
            ),
        });
    }

    Ok(offset - start)
}

fn cancelled(range: &Range<u64>) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::Interrupted,
        format!("chunk {}-{} cancelled", range.start, range.end),
    ))
}
