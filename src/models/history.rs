use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::UploadRecord;

#[derive(Debug, Clone, Deserialize)]
pub struct TransferStatistics {
    pub total_uploads: u64,
    pub total_downloads: u64,
    pub total_storage_bytes: u64,
    #[serde(default)]
    pub total_storage_display: Option<String>,
}

/// Uploads created together from one batch.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferBatch {
    pub batch_id: String,
    #[serde(default)]
    pub is_batch_upload: bool,
    pub file_count: usize,
    pub total_size: u64,
    #[serde(default)]
    pub total_size_display: Option<String>,
    #[serde(default)]
    pub total_downloads: u64,
    #[serde(default)]
    pub pricing_tier: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub files: Vec<UploadRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferHistory {
    pub statistics: TransferStatistics,
    #[serde(default)]
    pub recent_uploads: Vec<UploadRecord>,
    #[serde(default)]
    pub all_uploads: Vec<UploadRecord>,
    #[serde(default)]
    pub grouped_batches: Vec<TransferBatch>,
    #[serde(default)]
    pub total_batches: usize,
}
