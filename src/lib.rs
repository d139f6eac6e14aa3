//! Client core for SecureShare.
//!
//! Prices upload batches and drives the create, transfer and finalize upload
//! flow with progress reporting. Also owns the authenticated session: token
//! persistence, startup checks, single-flight refresh and proactive refresh
//! scheduling. All storage, encryption, archiving and payment settlement
//! happen on the backend this crate talks to.

pub mod auth;
pub mod client;
pub mod config;
pub mod errors;
pub mod models;
pub mod services;
pub mod storage;
pub mod telemetry;

pub use auth::{AuthSession, Registration, SessionSnapshot, SessionState, TokenPair};
pub use client::SecureShareClient;
pub use config::Config;
pub use errors::{ClientError, DownloadError, Result};
pub use models::{CandidateFile, UploadResult};
pub use services::{
    calculate_total_pricing, format_file_size, PricingSummary, PricingTier, UploadManager,
    UploadSnapshot, UploadState,
};
