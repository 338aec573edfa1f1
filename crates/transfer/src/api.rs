//! Abstraction over the drive endpoints the upload pipeline talks to.

use std::future::Future;
use std::pin::Pin;

use crate::TransferError;
use crate::chunked::ChunkRange;

/// An upload session as the controller sees it.
#[derive(Debug, Clone)]
pub struct UploadSession {
    /// Pre-authorized URL chunk PUTs go to.
    pub upload_url: String,
    /// First byte the server expects next, when it reports one.
    pub next_expected_offset: Option<u64>,
}

/// Raw result of a single chunk PUT that produced an HTTP response.
#[derive(Debug, Clone)]
pub struct ChunkPut {
    pub status: u16,
    pub body: String,
}

/// Drive operations the uploader and verifier depend on.
///
/// Implemented by the HTTP client layer; lets the retry and recovery logic
/// be tested against scripted doubles.
pub trait DriveApi: Send + Sync {
    /// Refreshes the access token if it is expired.
    fn ensure_token_valid(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransferError>> + Send + '_>>;

    /// Creates an upload session for `remote_path`, replacing any existing
    /// item at that path.
    fn create_session(
        &self,
        remote_path: &str,
    ) -> Pin<Box<dyn Future<Output = Result<UploadSession, TransferError>> + Send + '_>>;

    /// Sends one chunk to `session_url`.
    ///
    /// Any HTTP response, success or not, comes back as `Ok(ChunkPut)`;
    /// `Err` means the request never produced a status.
    fn put_chunk(
        &self,
        session_url: &str,
        range: ChunkRange,
        total_size: u64,
        bytes: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<ChunkPut, TransferError>> + Send + '_>>;

    /// Resolves the item id at `remote_path`.
    fn item_id_by_path(
        &self,
        remote_path: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String, TransferError>> + Send + '_>>;

    /// Fetches the base64 QuickXorHash the service reports for an item.
    ///
    /// `Ok(None)` when the item exists but the hash is not available yet;
    /// the service computes hashes asynchronously after upload.
    fn item_hash(
        &self,
        item_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, TransferError>> + Send + '_>>;
}
