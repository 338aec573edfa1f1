//! Chunked drive uploads with session recovery and integrity verification.
//!
//! The upload pipeline:
//! 1. Create an upload session for the destination path.
//! 2. Send the file as sequential chunk PUTs, retrying failed chunks and
//!    replacing the session when the server reports it stale.
//! 3. Resolve the uploaded item id, then compare the local QuickXorHash
//!    against the hash the service reports.
//!
//! The drive endpoints are reached through the [`DriveApi`] trait so the
//! controller can be driven against scripted doubles in tests.

mod api;
mod chunked;
mod outcome;
mod progress;
mod uploader;
mod verify;

pub use api::{ChunkPut, DriveApi, UploadSession};
pub use chunked::{
    ChunkRange, ChunkReader, FileChunk, chunk_ranges, clamp_chunk_size, recommended_chunk_size,
};
pub use outcome::{RetryReason, TransferOutcome, transfer_chunk};
pub use progress::TransferRate;
pub use uploader::{ProgressFn, UploadOptions, Uploader};
pub use verify::{Verification, VerifyOptions, verify_file};

/// Session chunks must be a multiple of this (320 KiB) or the service may
/// reject every range after the first.
pub const CHUNK_ALIGNMENT: u64 = 320 * 1024;

/// Hard ceiling the service places on a single chunk PUT: 160 units of
/// alignment, 50 MiB.
pub const MAX_CHUNK_SIZE: u64 = 160 * CHUNK_ALIGNMENT;

/// Attempts per chunk before an upload gives up.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to create upload session: {0}")]
    SessionCreate(String),

    #[error("chunk {range} failed after {attempts} attempt(s): {last_error}")]
    ChunkFailed {
        range: chunked::ChunkRange,
        attempts: u32,
        last_error: String,
    },

    #[error("chunk {range}: read {got} bytes, expected {expected}")]
    ChunkSizeMismatch {
        range: chunked::ChunkRange,
        got: usize,
        expected: u64,
    },

    #[error("replacement session expects offset {offset}, not aligned to chunk size {chunk_size}")]
    MisalignedSession { offset: u64, chunk_size: u64 },

    #[error("failed to resolve uploaded item: {0}")]
    ItemLookup(String),

    #[error("cancelled")]
    Cancelled,
}
