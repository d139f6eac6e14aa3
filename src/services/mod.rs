pub mod auth_api;
pub mod files_api;
pub mod http;
pub mod payments;
pub mod pricing;
pub mod upload_manager;

pub use auth_api::{AuthApi, HttpAuthApi};
pub use files_api::{HttpFilesApi, ProgressSender, TransferProgress, UploadApi};
pub use http::ApiClient;
pub use payments::PaymentsApi;
pub use pricing::*;
pub use upload_manager::{UploadManager, UploadSnapshot, UploadState};
