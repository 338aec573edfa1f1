//! Graph drive API client.
//!
//! Async HTTP client using `reqwest`. Every authenticated call refreshes
//! the access token through the [`TokenGuard`] first; chunk PUTs go to the
//! pre-authorized session URL without a token.

use std::future::Future;
use std::pin::Pin;

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE};

use skylift_transfer::{ChunkPut, ChunkRange, DriveApi, TransferError, UploadSession};

use crate::auth::{Credential, CredentialError, DEFAULT_TOKEN_URL, TokenGuard, TokenRefreshError};
use crate::types::{
    ConflictBehavior, DriveItem, DriveQuota, UploadSessionItem, UploadSessionRequest,
    UploadSessionResponse,
};

const DEFAULT_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Errors from the Graph client.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    TokenRefresh(#[from] TokenRefreshError),
}

/// Client for one drive account.
pub struct DriveClient {
    http: reqwest::Client,
    base_url: String,
    guard: TokenGuard,
}

impl DriveClient {
    /// Creates a client against the public Graph endpoints.
    pub fn new(credential: Credential) -> Result<Self, GraphError> {
        Self::with_endpoints(credential, DEFAULT_BASE_URL, DEFAULT_TOKEN_URL)
    }

    /// Creates a client against custom endpoints (sovereign clouds, tests).
    pub fn with_endpoints(
        credential: Credential,
        base_url: &str,
        token_url: &str,
    ) -> Result<Self, GraphError> {
        let http = reqwest::Client::builder().build()?;
        let guard = TokenGuard::new(http.clone(), token_url, credential);
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            guard,
        })
    }

    /// The token guard backing this client.
    pub fn token_guard(&self) -> &TokenGuard {
        &self.guard
    }

    /// Refreshes if needed and returns the current access token.
    async fn bearer(&self) -> Result<String, GraphError> {
        self.guard.ensure_valid().await?;
        Ok(self.guard.access_token())
    }

    /// Creates an upload session for `remote_path`, replacing any existing
    /// item at that path.
    pub async fn create_upload_session(
        &self,
        remote_path: &str,
    ) -> Result<UploadSessionResponse, GraphError> {
        let token = self.bearer().await?;
        let url = format!(
            "{}/me/drive/root:/{}:/createUploadSession",
            self.base_url,
            encode_path(remote_path)
        );
        let request = UploadSessionRequest {
            item: UploadSessionItem {
                conflict_behavior: ConflictBehavior::Replace,
            },
        };

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&request)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GraphError::Api {
                status: status.as_u16(),
                body,
            });
        }
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Sends one chunk to a session URL.
    ///
    /// Returns `Ok` for every HTTP response, including failure statuses,
    /// so the transfer layer can classify them. `Err` means the request
    /// never got a status.
    pub async fn upload_chunk(
        &self,
        session_url: &str,
        range: ChunkRange,
        total_size: u64,
        bytes: &[u8],
    ) -> Result<ChunkPut, GraphError> {
        // An empty range still creates the item: `bytes */0` with no body.
        let content_range = match range.end_inclusive() {
            Some(end) => format!("bytes {}-{}/{}", range.start, end, total_size),
            None => format!("bytes */{total_size}"),
        };

        let resp = self
            .http
            .put(session_url)
            .header(CONTENT_RANGE, content_range)
            .header(CONTENT_LENGTH, bytes.len() as u64)
            .body(bytes.to_vec())
            .send()
            .await?;
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Ok(ChunkPut { status, body })
    }

    /// Fetches item metadata at a drive path.
    pub async fn item_by_path(&self, remote_path: &str) -> Result<DriveItem, GraphError> {
        let url = format!(
            "{}/me/drive/root:/{}",
            self.base_url,
            encode_path(remote_path)
        );
        self.get_json(&url).await
    }

    /// Fetches item metadata by item id.
    pub async fn item_by_id(&self, item_id: &str) -> Result<DriveItem, GraphError> {
        let url = format!("{}/me/drive/items/{item_id}", self.base_url);
        self.get_json(&url).await
    }

    /// Fetches the drive quota facet.
    pub async fn quota(&self) -> Result<DriveQuota, GraphError> {
        let url = format!("{}/me/drive/quota", self.base_url);
        self.get_json(&url).await
    }

    /// Performs an authenticated GET and deserializes the JSON response.
    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, GraphError> {
        let token = self.bearer().await?;
        let resp = self.http.get(url).bearer_auth(&token).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GraphError::Api {
                status: status.as_u16(),
                body,
            });
        }
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Percent-encodes a drive path, keeping `/` separators intact.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| utf8_percent_encode(segment, NON_ALPHANUMERIC).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Parses the first offset out of `nextExpectedRanges` entries like
/// `"26214400-"` or `"0-1048575"`.
fn next_expected_offset(ranges: Option<&[String]>) -> Option<u64> {
    let first = ranges?.first()?;
    first.split('-').next()?.parse().ok()
}

/// Maps client errors onto the transfer crate's error space.
fn to_transfer_error(e: GraphError) -> TransferError {
    match e {
        GraphError::Api { status, body } => TransferError::Api { status, body },
        GraphError::TokenRefresh(e) => TransferError::TokenRefresh(e.to_string()),
        other => TransferError::Network(other.to_string()),
    }
}

impl DriveApi for DriveClient {
    fn ensure_token_valid(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransferError>> + Send + '_>> {
        Box::pin(async {
            self.guard
                .ensure_valid()
                .await
                .map_err(|e| TransferError::TokenRefresh(e.to_string()))
        })
    }

    fn create_session(
        &self,
        remote_path: &str,
    ) -> Pin<Box<dyn Future<Output = Result<UploadSession, TransferError>> + Send + '_>> {
        let remote_path = remote_path.to_string();
        Box::pin(async move {
            let resp = self
                .create_upload_session(&remote_path)
                .await
                .map_err(to_transfer_error)?;
            let next_expected_offset = next_expected_offset(resp.next_expected_ranges.as_deref());
            Ok(UploadSession {
                upload_url: resp.upload_url,
                next_expected_offset,
            })
        })
    }

    fn put_chunk(
        &self,
        session_url: &str,
        range: ChunkRange,
        total_size: u64,
        bytes: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<ChunkPut, TransferError>> + Send + '_>> {
        let session_url = session_url.to_string();
        let bytes = bytes.to_vec();
        Box::pin(async move {
            self.upload_chunk(&session_url, range, total_size, &bytes)
                .await
                .map_err(to_transfer_error)
        })
    }

    fn item_id_by_path(
        &self,
        remote_path: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String, TransferError>> + Send + '_>> {
        let remote_path = remote_path.to_string();
        Box::pin(async move {
            let item = self
                .item_by_path(&remote_path)
                .await
                .map_err(to_transfer_error)?;
            Ok(item.id)
        })
    }

    fn item_hash(
        &self,
        item_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, TransferError>> + Send + '_>> {
        let item_id = item_id.to_string();
        Box::pin(async move {
            let item = self.item_by_id(&item_id).await.map_err(to_transfer_error)?;
            Ok(item
                .file
                .and_then(|f| f.hashes)
                .and_then(|h| h.quick_xor_hash))
        })
    }
}
