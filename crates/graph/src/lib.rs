//! Microsoft Graph drive backend.
//!
//! Wraps the Graph endpoints the uploader needs: OAuth token refresh,
//! upload session management, chunk PUTs, item metadata and drive quota.
//! [`DriveClient`] implements [`skylift_transfer::DriveApi`], so the
//! transfer crate can drive it without knowing about HTTP.

pub mod auth;
pub mod client;
pub mod types;

pub use auth::{Credential, CredentialError, DEFAULT_TOKEN_URL, TokenGuard, TokenRefreshError};
pub use client::{DriveClient, GraphError};
pub use types::{
    ConflictBehavior, DriveItem, DriveQuota, FileFacet, Hashes, TokenResponse,
    UploadSessionItem, UploadSessionRequest, UploadSessionResponse,
};
