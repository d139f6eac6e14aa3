use std::sync::Arc;
use uuid::Uuid;

use crate::{
    auth::AuthSession,
    config::Config,
    errors::{ClientError, Result},
    models::{
        CandidateFile, CheckoutSession, DownloadInfo, PaymentRecord, ShareLink, TransferHistory,
        UploadRecord, UploadResult,
    },
    services::{
        auth_api::HttpAuthApi,
        files_api::HttpFilesApi,
        http::ApiClient,
        payments::PaymentsApi,
        pricing::{calculate_total_pricing, PricingSummary},
        upload_manager::UploadManager,
    },
    storage::{create_token_store, TokenStore},
};

/// Everything an application needs, wired from one [`Config`].
///
/// Calls that need an account go through [`AuthSession::authorized`], so a
/// rejected access token is refreshed once before the call is retried.
pub struct SecureShareClient {
    config: Config,
    session: AuthSession,
    files: HttpFilesApi,
    payments: PaymentsApi,
    uploads: UploadManager,
}

impl SecureShareClient {
    pub fn new(config: Config) -> Result<Self> {
        let store = create_token_store(&config);
        Self::with_token_store(config, store)
    }

    pub fn with_token_store(config: Config, store: Arc<dyn TokenStore>) -> Result<Self> {
        let api = ApiClient::from_config(&config)?;
        let files = HttpFilesApi::new(api.clone());
        let session = AuthSession::new(Arc::new(HttpAuthApi::new(api.clone())), store, &config);
        let uploads = UploadManager::new(Arc::new(files.clone()), &config);
        let payments = PaymentsApi::new(api, config.app_origin.clone());

        tracing::info!(api = %config.api_base_url, "SecureShare client ready");
        Ok(Self {
            config,
            session,
            files,
            payments,
            uploads,
        })
    }

    pub fn from_env() -> Result<Self> {
        let config = Config::from_env().map_err(ClientError::Internal)?;
        Self::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    pub fn uploads(&self) -> &UploadManager {
        &self.uploads
    }

    pub fn files(&self) -> &HttpFilesApi {
        &self.files
    }

    pub fn payments(&self) -> &PaymentsApi {
        &self.payments
    }

    pub fn quote(&self, files: &[CandidateFile]) -> PricingSummary {
        calculate_total_pricing(files)
    }

    /// Uploads with the session's access token. A rejected token is
    /// refreshed and the whole batch started again as a new record.
    pub async fn upload(&self, files: &[CandidateFile]) -> Result<UploadResult> {
        let uploads = &self.uploads;
        self.session
            .authorized(|token| async move { uploads.start_upload(files, &token).await })
            .await
    }

    pub async fn list_uploads(&self) -> Result<Vec<UploadRecord>> {
        let files = &self.files;
        self.session
            .authorized(|token| async move { files.list_uploads(&token).await })
            .await
    }

    pub async fn transfer_history(&self) -> Result<TransferHistory> {
        let files = &self.files;
        self.session
            .authorized(|token| async move { files.transfer_history(&token).await })
            .await
    }

    pub async fn delete_upload(&self, upload_id: Uuid) -> Result<()> {
        let files = &self.files;
        self.session
            .authorized(|token| async move { files.delete_upload(&token, upload_id).await })
            .await
    }

    pub async fn share_link(&self, upload_id: Uuid) -> Result<ShareLink> {
        let files = &self.files;
        self.session
            .authorized(|token| async move { files.share_link(&token, upload_id).await })
            .await
    }

    pub async fn create_checkout_session(
        &self,
        summary: &PricingSummary,
        upload_id: Option<Uuid>,
    ) -> Result<CheckoutSession> {
        let payments = &self.payments;
        self.session
            .authorized(|token| async move {
                payments
                    .create_checkout_session(&token, summary, upload_id)
                    .await
            })
            .await
    }

    pub async fn payment_status(&self, payment_id: Uuid) -> Result<PaymentRecord> {
        let payments = &self.payments;
        self.session
            .authorized(|token| async move { payments.payment_status(&token, payment_id).await })
            .await
    }

    pub async fn payment_history(&self) -> Result<Vec<PaymentRecord>> {
        let payments = &self.payments;
        self.session
            .authorized(|token| async move { payments.payment_history(&token).await })
            .await
    }

    /// Public lookup; works without signing in.
    pub async fn download_info(&self, download_token: Uuid) -> Result<DownloadInfo> {
        self.files.download_info(download_token).await
    }
}
