//! Wire types for the Graph drive endpoints.
//!
//! Response types keep only the fields the uploader consumes and tolerate
//! everything else the service sends alongside them.

use serde::{Deserialize, Serialize};

/// Token endpoint response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Rotated refresh token. The endpoint may omit it, in which case the
    /// previous one stays valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Lifetime of `access_token` in seconds.
    pub expires_in: i64,
}

/// How the service resolves a name collision when creating an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictBehavior {
    Fail,
    Replace,
    Rename,
}

/// Body of the createUploadSession request.
#[derive(Debug, Clone, Serialize)]
pub struct UploadSessionRequest {
    pub item: UploadSessionItem,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadSessionItem {
    #[serde(rename = "@microsoft.graph.conflictBehavior")]
    pub conflict_behavior: ConflictBehavior,
}

/// createUploadSession response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSessionResponse {
    /// Pre-authorized URL the chunk PUTs go to.
    pub upload_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date_time: Option<String>,
    /// Byte ranges the server still expects, e.g. `["26214400-"]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_expected_ranges: Option<Vec<String>>,
}

/// Drive item metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileFacet>,
}

/// File facet: present on files, absent on folders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFacet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashes: Option<Hashes>,
}

/// Content hashes the service computed for an item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hashes {
    /// Base64 QuickXorHash; missing right after upload until the service
    /// catches up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_xor_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256_hash: Option<String>,
}

/// Drive quota facet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveQuota {
    pub total: u64,
    pub used: u64,
    pub remaining: u64,
    #[serde(default)]
    pub deleted: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}
