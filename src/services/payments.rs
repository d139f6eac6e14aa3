use uuid::Uuid;

use crate::{
    errors::{ClientError, Result},
    models::{CheckoutRequest, CheckoutSession, PaymentRecord},
    services::{http::ApiClient, pricing::PricingSummary},
};

/// Hosted-checkout calls. Payment happens before any upload record exists,
/// so failures here never touch upload state.
#[derive(Clone, Debug)]
pub struct PaymentsApi {
    api: ApiClient,
    app_origin: String,
}

impl PaymentsApi {
    pub fn new(api: ApiClient, app_origin: impl Into<String>) -> Self {
        Self {
            api,
            app_origin: app_origin.into().trim_end_matches('/').to_string(),
        }
    }

    /// Builds the checkout payload for a priced batch. Free and over-limit
    /// batches have nothing to buy.
    pub fn checkout_request(
        &self,
        summary: &PricingSummary,
        upload_id: Option<Uuid>,
    ) -> Result<CheckoutRequest> {
        if !summary.requires_payment {
            return Err(ClientError::Payment(format!(
                "No payment required for the {} tier",
                summary.tier.label()
            )));
        }

        Ok(CheckoutRequest {
            upload_id,
            amount: summary.total_price_cents,
            payment_tier: summary.tier.as_str().to_string(),
            success_url: format!("{}/dashboard?payment=success", self.app_origin),
            cancel_url: format!("{}/dashboard?payment=canceled", self.app_origin),
        })
    }

    pub async fn create_checkout_session(
        &self,
        token: &str,
        summary: &PricingSummary,
        upload_id: Option<Uuid>,
    ) -> Result<CheckoutSession> {
        let request = self.checkout_request(summary, upload_id)?;
        tracing::info!(
            tier = %request.payment_tier,
            amount = request.amount,
            "Creating checkout session"
        );

        self.api
            .post_json("payments/create-checkout/", &request, Some(token))
            .await
            .map_err(into_payment_error)
    }

    pub async fn payment_status(&self, token: &str, payment_id: Uuid) -> Result<PaymentRecord> {
        self.api
            .get(&format!("payments/{}/status/", payment_id), Some(token))
            .await
            .map_err(into_payment_error)
    }

    pub async fn payment_history(&self, token: &str) -> Result<Vec<PaymentRecord>> {
        self.api
            .get("payments/history/", Some(token))
            .await
            .map_err(into_payment_error)
    }
}

/// Authorization failures pass through untouched so the session can refresh.
fn into_payment_error(err: ClientError) -> ClientError {
    if err.is_unauthorized() {
        return err;
    }
    ClientError::Payment(err.user_message())
}
