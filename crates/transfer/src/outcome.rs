//! Single chunk attempt and response classification.

use std::fmt;

use crate::TransferError;
use crate::api::{ChunkPut, DriveApi};
use crate::chunked::ChunkRange;

/// Classification of one chunk transfer attempt.
#[derive(Debug)]
pub enum TransferOutcome {
    /// The server accepted the chunk (200, 201 or 202).
    Success,
    /// Worth another attempt; the reason says whether the session is stale.
    Retryable(RetryReason),
    /// Not recoverable at this layer.
    Fatal(TransferError),
}

/// Why a retryable attempt failed.
#[derive(Debug, Clone)]
pub enum RetryReason {
    /// 416: the session no longer lines up with what the server holds.
    InvalidRange { body: String },
    /// 409 whose body reports a concurrent modification of the item.
    ResourceModified { body: String },
    /// The request never produced an HTTP status.
    Transport(String),
}

impl RetryReason {
    /// True when the server signalled a session worth replacing.
    pub fn session_stale(&self) -> bool {
        matches!(
            self,
            RetryReason::InvalidRange { .. } | RetryReason::ResourceModified { .. }
        )
    }
}

impl fmt::Display for RetryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryReason::InvalidRange { body } => write!(f, "invalid range (416): {body}"),
            RetryReason::ResourceModified { body } => {
                write!(f, "resource modified (409): {body}")
            }
            RetryReason::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

/// Performs exactly one chunk PUT and classifies the result.
///
/// The caller owns the retry loop; this function never retries. The byte
/// slice is validated against the range before anything is sent.
pub async fn transfer_chunk(
    api: &dyn DriveApi,
    session_url: &str,
    range: ChunkRange,
    total_size: u64,
    bytes: &[u8],
) -> TransferOutcome {
    if bytes.len() as u64 != range.len {
        return TransferOutcome::Fatal(TransferError::ChunkSizeMismatch {
            range,
            got: bytes.len(),
            expected: range.len,
        });
    }

    match api.put_chunk(session_url, range, total_size, bytes).await {
        Ok(put) => classify(put),
        Err(e) => TransferOutcome::Retryable(RetryReason::Transport(e.to_string())),
    }
}

fn classify(put: ChunkPut) -> TransferOutcome {
    match put.status {
        200 | 201 | 202 => TransferOutcome::Success,
        416 => TransferOutcome::Retryable(RetryReason::InvalidRange { body: put.body }),
        409 if put.body.contains("resourceModified") => {
            TransferOutcome::Retryable(RetryReason::ResourceModified { body: put.body })
        }
        status => TransferOutcome::Fatal(TransferError::Api {
            status,
            body: put.body,
        }),
    }
}
