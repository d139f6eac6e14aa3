use async_trait::async_trait;
use serde_json::Value;

use crate::{
    errors::Result,
    models::{
        AuthResponse, ChangePasswordRequest, LoginRequest, ProfileUpdate, RefreshRequest,
        RefreshResponse, RegisterRequest, User,
    },
    services::http::ApiClient,
};

/// Account endpoints the session talks to.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse>;

    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse>;

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse>;

    async fn logout(&self, access_token: &str, refresh_token: &str) -> Result<()>;

    async fn profile(&self, access_token: &str) -> Result<User>;

    async fn update_profile(&self, access_token: &str, update: &ProfileUpdate) -> Result<User>;

    async fn change_password(
        &self,
        access_token: &str,
        request: &ChangePasswordRequest,
    ) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct HttpAuthApi {
    api: ApiClient,
}

impl HttpAuthApi {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse> {
        tracing::debug!(email = %request.email, "Sending login request");
        self.api.post_json("auth/login/", request, None).await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse> {
        tracing::debug!(email = %request.email, "Sending registration request");
        self.api.post_json("auth/register/", request, None).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse> {
        let body = RefreshRequest {
            refresh: refresh_token,
        };
        self.api.post_json("auth/token/refresh/", &body, None).await
    }

    async fn logout(&self, access_token: &str, refresh_token: &str) -> Result<()> {
        let body = RefreshRequest {
            refresh: refresh_token,
        };
        self.api
            .post_unit("auth/logout/", &body, Some(access_token))
            .await
    }

    async fn profile(&self, access_token: &str) -> Result<User> {
        self.api.get("auth/profile/", Some(access_token)).await
    }

    async fn update_profile(&self, access_token: &str, update: &ProfileUpdate) -> Result<User> {
        self.api
            .put_json("auth/profile/", update, Some(access_token))
            .await
    }

    async fn change_password(
        &self,
        access_token: &str,
        request: &ChangePasswordRequest,
    ) -> Result<()> {
        let _: Value = self
            .api
            .post_json("auth/change-password/", request, Some(access_token))
            .await?;
        Ok(())
    }
}
