use serde::Serialize;

use crate::{
    errors::{ClientError, Result},
    models::CandidateFile,
};

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;

pub const FREE_LIMIT_BYTES: u64 = 100 * MIB;
pub const PREMIUM_LIMIT_BYTES: u64 = GIB;
pub const MAX_BATCH_BYTES: u64 = 5 * GIB;
pub const DEFAULT_MAX_FILES: usize = 5;

/// Price bracket keyed by aggregate upload size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingTier {
    Free,
    Premium,
    Large,
    OverLimit,
}

impl PricingTier {
    /// `None` for `OverLimit`, which cannot be bought.
    pub fn price_cents(self) -> Option<u32> {
        match self {
            PricingTier::Free => Some(0),
            PricingTier::Premium => Some(300),
            PricingTier::Large => Some(800),
            PricingTier::OverLimit => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PricingTier::Free => "Free",
            PricingTier::Premium => "$3",
            PricingTier::Large => "$8",
            PricingTier::OverLimit => "Too Large",
        }
    }

    /// Name the backend uses for the tier.
    pub fn as_str(self) -> &'static str {
        match self {
            PricingTier::Free => "free",
            PricingTier::Premium => "premium",
            PricingTier::Large => "large",
            PricingTier::OverLimit => "invalid",
        }
    }

    /// Inclusive byte range covered by the tier; `OverLimit` is unbounded above.
    pub fn size_range(self) -> (u64, Option<u64>) {
        match self {
            PricingTier::Free => (0, Some(FREE_LIMIT_BYTES)),
            PricingTier::Premium => (FREE_LIMIT_BYTES + 1, Some(PREMIUM_LIMIT_BYTES)),
            PricingTier::Large => (PREMIUM_LIMIT_BYTES + 1, Some(MAX_BATCH_BYTES)),
            PricingTier::OverLimit => (MAX_BATCH_BYTES + 1, None),
        }
    }

    pub fn requires_payment(self) -> bool {
        self.price_cents().map(|p| p > 0).unwrap_or(false)
    }

    pub fn is_uploadable(self) -> bool {
        self != PricingTier::OverLimit
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricingSummary {
    pub total_size: u64,
    pub formatted_size: String,
    pub file_count: usize,
    pub tier: PricingTier,
    pub total_price_cents: u32,
    pub requires_payment: bool,
}

impl PricingSummary {
    pub fn empty() -> Self {
        Self {
            total_size: 0,
            formatted_size: format_file_size(0),
            file_count: 0,
            tier: PricingTier::Free,
            total_price_cents: 0,
            requires_payment: false,
        }
    }

    pub fn price_label(&self) -> String {
        format_price(self.total_price_cents)
    }
}

pub fn classify_size(bytes: u64) -> PricingTier {
    if bytes <= FREE_LIMIT_BYTES {
        PricingTier::Free
    } else if bytes <= PREMIUM_LIMIT_BYTES {
        PricingTier::Premium
    } else if bytes <= MAX_BATCH_BYTES {
        PricingTier::Large
    } else {
        PricingTier::OverLimit
    }
}

/// Badge tier for a single file, shown before the batch is aggregated.
pub fn classify_file(file: &CandidateFile) -> PricingTier {
    classify_size(file.size)
}

/// Classifies the batch by the sum of its sizes, never per file.
pub fn calculate_total_pricing(files: &[CandidateFile]) -> PricingSummary {
    if files.is_empty() {
        return PricingSummary::empty();
    }

    let total_size = files
        .iter()
        .fold(0u64, |sum, file| sum.saturating_add(file.size));
    let tier = classify_size(total_size);
    let total_price_cents = tier.price_cents().unwrap_or(0);

    PricingSummary {
        total_size,
        formatted_size: format_file_size(total_size),
        file_count: files.len(),
        tier,
        total_price_cents,
        requires_payment: total_price_cents > 0,
    }
}

pub fn validate_files(files: &[CandidateFile], max_files: usize) -> Result<()> {
    if files.is_empty() {
        return Err(ClientError::validation("files", "No files selected"));
    }

    if files.len() > max_files {
        return Err(ClientError::validation(
            "files",
            format!("Maximum {} files allowed", max_files),
        ));
    }

    // Any single oversized file already pushes the total over the cap.
    let total_size = files
        .iter()
        .fold(0u64, |sum, file| sum.saturating_add(file.size));
    if total_size > MAX_BATCH_BYTES {
        return Err(ClientError::validation(
            "files",
            "Total file size exceeds 5GB maximum",
        ));
    }

    Ok(())
}

/// Human-readable size in base-1024 units, two decimals at most (`1.5 MB`, `100 MB`).
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut index = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && index < UNITS.len() - 1 {
        value /= 1024.0;
        index += 1;
    }

    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[index])
}

pub fn format_price(cents: u32) -> String {
    if cents % 100 == 0 {
        format!("${}", cents / 100)
    } else {
        format!("${}.{:02}", cents / 100, cents % 100)
    }
}
