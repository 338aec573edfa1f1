//! Upload session control: chunk iteration, retries, session replacement.

use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::DriveApi;
use crate::chunked::{ChunkRange, ChunkReader, chunk_ranges};
use crate::outcome::{TransferOutcome, transfer_chunk};
use crate::{DEFAULT_MAX_RETRIES, TransferError};

/// Progress callback, invoked after each accepted chunk with the cumulative
/// bytes the current session holds.
///
/// The first `Err` disables reporting for the rest of the upload; it never
/// fails the transfer.
pub type ProgressFn =
    Box<dyn FnMut(u64) -> Result<(), Box<dyn std::error::Error + Send + Sync>> + Send>;

/// Tunables for one upload.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Chunk size in bytes; 0 picks a size from the file size.
    pub chunk_size: u64,
    /// Attempts per chunk before the upload fails.
    pub max_retries: u32,
    /// Pause between attempts on the same chunk.
    pub retry_delay: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// Drives one file upload through a drive upload session.
pub struct Uploader<'a> {
    api: &'a dyn DriveApi,
    cancel: CancellationToken,
}

impl<'a> Uploader<'a> {
    pub fn new(api: &'a dyn DriveApi, cancel: CancellationToken) -> Self {
        Self { api, cancel }
    }

    /// Uploads `local` to `remote_path` and returns the created item's id.
    ///
    /// Chunks are sent sequentially. Each chunk gets up to
    /// `opts.max_retries` attempts; the first stale-session failure on a
    /// chunk replaces the session (once per chunk, rewinds included), and
    /// when the replacement expects an offset other than the current chunk
    /// start, the cursor rewinds there and the bytes in between are sent
    /// again.
    pub async fn upload(
        &self,
        local: &Path,
        remote_path: &str,
        opts: &UploadOptions,
        mut progress: Option<ProgressFn>,
    ) -> Result<String, TransferError> {
        self.check_cancelled()?;
        self.api.ensure_token_valid().await?;

        let mut reader = ChunkReader::open(local, opts.chunk_size).await?;
        let total_size = reader.file_size();
        let chunk_size = reader.chunk_size();
        let ranges = chunk_ranges(total_size, chunk_size);

        let session = self
            .api
            .create_session(remote_path)
            .await
            .map_err(|e| TransferError::SessionCreate(e.to_string()))?;
        let mut session_url = session.upload_url;

        info!(
            path = %local.display(),
            remote = remote_path,
            total_bytes = total_size,
            chunk_size,
            chunks = ranges.len(),
            "upload session created"
        );

        let mut transferred: u64 = 0;
        let mut ix = 0;
        // One replacement per range for the whole upload; a rewind that
        // revisits a range does not arm it again.
        let mut recreated = vec![false; ranges.len()];

        while ix < ranges.len() {
            let range = ranges[ix];
            let bytes = self.read_range(&mut reader, range).await?;

            let mut attempt = 0;

            // Breaks with the offset to rewind to when a replacement
            // session moved the cursor; `None` means the chunk landed.
            let rewind = loop {
                attempt += 1;
                self.check_cancelled()?;
                self.api.ensure_token_valid().await?;

                match transfer_chunk(self.api, &session_url, range, total_size, &bytes).await {
                    TransferOutcome::Success => {
                        debug!(chunk = %range, attempt, "chunk accepted");
                        break None;
                    }
                    TransferOutcome::Retryable(reason) if attempt < opts.max_retries => {
                        warn!(chunk = %range, attempt, reason = %reason, "chunk attempt failed");
                        let mut rewind_to = None;
                        if reason.session_stale() && !recreated[ix] {
                            recreated[ix] = true;
                            rewind_to = self
                                .replace_session(
                                    remote_path,
                                    &mut session_url,
                                    range,
                                    chunk_size,
                                    total_size,
                                )
                                .await?;
                        }
                        self.sleep(opts.retry_delay).await?;
                        if rewind_to.is_some() {
                            break rewind_to;
                        }
                    }
                    TransferOutcome::Retryable(reason) => {
                        return Err(TransferError::ChunkFailed {
                            range,
                            attempts: attempt,
                            last_error: reason.to_string(),
                        });
                    }
                    TransferOutcome::Fatal(err) => {
                        return Err(match err {
                            e @ TransferError::ChunkSizeMismatch { .. } => e,
                            e => TransferError::ChunkFailed {
                                range,
                                attempts: attempt,
                                last_error: e.to_string(),
                            },
                        });
                    }
                }
            };

            match rewind {
                Some(offset) => {
                    transferred = offset;
                    ix = if offset >= total_size {
                        ranges.len()
                    } else {
                        (offset / chunk_size) as usize
                    };
                }
                None => {
                    transferred += range.len;
                    if let Some(mut cb) = progress.take() {
                        match cb(transferred) {
                            Ok(()) => progress = Some(cb),
                            Err(e) => {
                                warn!(error = %e, "progress callback failed; reporting disabled");
                            }
                        }
                    }
                    ix += 1;
                }
            }
        }

        self.check_cancelled()?;
        self.api.ensure_token_valid().await?;
        let item_id = self
            .api
            .item_id_by_path(remote_path)
            .await
            .map_err(|e| TransferError::ItemLookup(e.to_string()))?;

        info!(item_id = %item_id, total_bytes = total_size, "upload complete");
        Ok(item_id)
    }

    /// Creates a replacement session after a stale-session failure.
    ///
    /// Returns the offset to rewind to when the new session expects
    /// something other than the current chunk start. A failed creation is
    /// logged, not fatal: the next attempt reuses the old URL.
    async fn replace_session(
        &self,
        remote_path: &str,
        session_url: &mut String,
        range: ChunkRange,
        chunk_size: u64,
        total_size: u64,
    ) -> Result<Option<u64>, TransferError> {
        match self.api.create_session(remote_path).await {
            Ok(session) => {
                *session_url = session.upload_url;
                let expected = session.next_expected_offset.unwrap_or(0);
                if expected == range.start {
                    info!(chunk = %range, "replacement session lines up with current chunk");
                    Ok(None)
                } else if expected >= total_size || expected % chunk_size == 0 {
                    warn!(
                        chunk = %range,
                        expected,
                        "replacement session expects a different offset; moving cursor"
                    );
                    Ok(Some(expected.min(total_size)))
                } else {
                    Err(TransferError::MisalignedSession {
                        offset: expected,
                        chunk_size,
                    })
                }
            }
            Err(e) => {
                warn!(chunk = %range, error = %e, "failed to replace session; keeping old URL");
                Ok(None)
            }
        }
    }

    async fn read_range(
        &self,
        reader: &mut ChunkReader,
        range: ChunkRange,
    ) -> Result<Vec<u8>, TransferError> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        if reader.offset() != range.start {
            reader.seek_to(range.start).await?;
        }
        match reader.next_chunk().await? {
            Some(chunk) => Ok(chunk.data),
            None => Err(TransferError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "file ended before the planned range",
            ))),
        }
    }

    fn check_cancelled(&self) -> Result<(), TransferError> {
        if self.cancel.is_cancelled() {
            Err(TransferError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleeps for `delay` unless cancellation arrives first.
    async fn sleep(&self, delay: Duration) -> Result<(), TransferError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(TransferError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
