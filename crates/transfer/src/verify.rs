//! Post-upload integrity verification against the server-reported hash.

use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::TransferError;
use crate::api::DriveApi;

/// Outcome of an integrity check.
///
/// Never a hard failure: an upload that cannot be verified is reported as
/// such, not rolled back. Only cancellation surfaces as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Local and remote digests match.
    Verified,
    /// Both digests were obtained and they differ.
    Mismatch { local: String, remote: String },
    /// The remote hash (or the local file) could not be read.
    Unverifiable { reason: String },
}

/// Tunables for one verification.
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Attempts to fetch the remote hash before giving up.
    pub retries: u32,
    /// Pause between attempts; the service computes hashes asynchronously
    /// and large files can lag noticeably.
    pub retry_delay: Duration,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            retries: 5,
            retry_delay: Duration::from_secs(10),
        }
    }
}

/// Compares the QuickXorHash of `local` with the hash the service reports
/// for `item_id`.
pub async fn verify_file(
    api: &dyn DriveApi,
    local: &Path,
    item_id: &str,
    opts: &VerifyOptions,
    cancel: &CancellationToken,
) -> Result<Verification, TransferError> {
    let retries = opts.retries.max(1);
    let mut last_reason = String::from("remote hash not available");
    let mut remote = None;

    for attempt in 1..=retries {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        match api.item_hash(item_id).await {
            Ok(Some(hash)) => {
                remote = Some(hash);
                break;
            }
            Ok(None) => {
                debug!(attempt, "remote hash not ready yet");
            }
            Err(e) => {
                warn!(attempt, error = %e, "failed to fetch remote hash");
                last_reason = e.to_string();
            }
        }
        if attempt < retries {
            tokio::select! {
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                _ = tokio::time::sleep(opts.retry_delay) => {}
            }
        }
    }

    let Some(remote) = remote else {
        return Ok(Verification::Unverifiable {
            reason: last_reason,
        });
    };

    let local_hash = match skylift_quickxor::hash_file(local).await {
        Ok(hash) => hash,
        Err(e) => {
            return Ok(Verification::Unverifiable {
                reason: format!("could not hash local file: {e}"),
            });
        }
    };

    if local_hash == remote {
        Ok(Verification::Verified)
    } else {
        Ok(Verification::Mismatch {
            local: local_hash,
            remote,
        })
    }
}
