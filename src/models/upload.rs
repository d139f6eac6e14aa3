use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::FileMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Expired,
    #[serde(other)]
    Unknown,
}

/// One upload row as the backend serializes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: Uuid,
    pub original_filename: String,
    pub file_size: u64,
    #[serde(default)]
    pub file_size_display: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub download_password: Option<String>,
    pub download_token: Uuid,
    pub status: UploadStatus,
    #[serde(default)]
    pub pricing_tier: Option<String>,
    #[serde(default)]
    pub requires_payment: bool,
    #[serde(default)]
    pub pricing_amount: Option<f64>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub download_count: u32,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateEntriesRequest<'a> {
    pub files: &'a [FileMetadata],
}

/// Response to registering an upload intent: always a single record, even for batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEntriesResponse {
    pub upload: UploadRecord,
    #[serde(default)]
    pub is_zip: bool,
    #[serde(default)]
    pub contained_files: Vec<String>,
    #[serde(default)]
    pub total_files: Option<usize>,
    #[serde(default)]
    pub total_size: Option<u64>,
    #[serde(default)]
    pub pricing_tier: Option<String>,
    #[serde(default)]
    pub pricing_amount: Option<u64>,
    #[serde(default)]
    pub requires_payment: bool,
}

/// Response to the multipart content transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResponse {
    #[serde(default)]
    pub success: bool,
    pub upload: UploadRecord,
    #[serde(default)]
    pub is_zip: bool,
    #[serde(default)]
    pub files_in_archive: Option<usize>,
}

/// What the user gets to share once an upload completes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadResult {
    pub upload_id: Uuid,
    pub download_token: Uuid,
    pub password: String,
    pub filename: String,
    pub is_archive: bool,
    pub contained_files: Vec<String>,
    pub total_size: u64,
    pub status: UploadStatus,
    pub download_link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareLink {
    pub download_link: String,
    pub download_password: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Public metadata shown on the download page before the password is entered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadInfo {
    pub id: Uuid,
    pub filename: String,
    pub file_size: u64,
    #[serde(default)]
    pub file_size_display: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub download_count: u32,
}

impl DownloadInfo {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| now > at).unwrap_or(false)
    }
}

#[derive(Debug, Serialize)]
pub struct DownloadRequest<'a> {
    pub password: &'a str,
}
