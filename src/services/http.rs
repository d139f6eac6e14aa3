use reqwest::{multipart::Form, Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

use crate::{
    config::Config,
    errors::{ClientError, Result},
};

/// Thin reqwest wrapper shared by every backend adapter.
///
/// Paths are relative to the API base (`auth/login/`, `files/bulk/create/`).
/// Non-success responses are normalized through [`ClientError::from_response`].
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    transfer_timeout: Duration,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(ClientError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transfer_timeout: Duration::from_secs(2 * 60 * 60),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let mut api = Self::new(config.api_base_url.clone(), config.request_timeout())?;
        Ok(api.with_transfer_timeout(config.upload_timeout()))
    }

    /// Budget for requests that move file content in either direction.
    pub fn with_transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = timeout;
        self
    }

    pub fn transfer_timeout(&self) -> Duration {
        self.transfer_timeout
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let request = self.client.request(method, self.build_url(path));
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, token: Option<&str>) -> Result<T> {
        let response = self.send(self.request(Method::GET, path, token)).await?;
        Ok(response.json().await?)
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        token: Option<&str>,
    ) -> Result<T> {
        let request = self.request(Method::POST, path, token).json(body);
        let response = self.send(request).await?;
        Ok(response.json().await?)
    }

    /// POST whose response body is ignored.
    pub async fn post_unit<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        token: Option<&str>,
    ) -> Result<()> {
        let request = self.request(Method::POST, path, token).json(body);
        self.send(request).await?;
        Ok(())
    }

    pub async fn put_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        token: Option<&str>,
    ) -> Result<T> {
        let request = self.request(Method::PUT, path, token).json(body);
        let response = self.send(request).await?;
        Ok(response.json().await?)
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<()> {
        self.send(self.request(Method::DELETE, path, token)).await?;
        Ok(())
    }

    /// Multipart POST using the transfer timeout instead of the request timeout.
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: Form,
        token: Option<&str>,
    ) -> Result<T> {
        let request = self
            .request(Method::POST, path, token)
            .multipart(form)
            .timeout(self.transfer_timeout);
        let response = self.send(request).await?;
        Ok(response.json().await?)
    }

    /// Sends the request and turns any non-2xx status into a normalized error.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        let err = ClientError::from_response(status, &body);
        tracing::error!(%status, %url, error = %err, "API request failed");
        Err(err)
    }
}
