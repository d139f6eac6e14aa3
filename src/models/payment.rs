use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<Uuid>,
    /// Amount in cents.
    pub amount: u32,
    pub payment_tier: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub checkout_session_id: String,
    pub checkout_url: String,
    pub payment_id: Uuid,
    pub amount: u32,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    Refunded,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub status: PaymentStatus,
    pub amount: u32,
    #[serde(default)]
    pub payment_tier: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Outcome carried back on the return URL after the hosted checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentReturn {
    Success { session_id: Option<String> },
    Canceled,
}

impl PaymentReturn {
    /// Reads `payment=success|canceled` (and `session_id`) from a return URL.
    /// Returns `None` when the URL does not carry a payment outcome.
    pub fn from_url(url: &str) -> Option<Self> {
        let url = Url::parse(url).ok()?;
        let mut outcome = None;
        let mut session_id = None;

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "payment" => outcome = Some(value.into_owned()),
                "session_id" => session_id = Some(value.into_owned()),
                _ => {}
            }
        }

        match outcome.as_deref() {
            Some("success") => Some(PaymentReturn::Success { session_id }),
            Some("canceled") | Some("cancelled") => Some(PaymentReturn::Canceled),
            _ => None,
        }
    }
}
