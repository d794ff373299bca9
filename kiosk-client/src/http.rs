//! HTTP transport for backend calls

use crate::{ClientConfig, ClientError, ClientResult};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// JSON-over-HTTP client
///
/// Every request carries the `apikey` header; authenticated calls add a
/// bearer token. Every request has a finite timeout.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl HttpClient {
    /// Create a new HTTP client from configuration
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            anon_key: config.anon_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        token: Option<&str>,
    ) -> ClientResult<T> {
        let mut request = self
            .client
            .post(self.url(path))
            .header("apikey", &self.anon_key)
            .json(body);

        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        Self::handle_response(response).await
    }

    /// POST and ignore the response body
    pub async fn post_ack<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        token: Option<&str>,
    ) -> ClientResult<()> {
        let mut request = self
            .client
            .post(self.url(path))
            .header("apikey", &self.anon_key)
            .json(body);

        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        Self::check_status(response).await.map(|_| ())
    }

    async fn check_status(response: reqwest::Response) -> ClientResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ClientError::Unauthorized),
            _ => Err(ClientError::Api {
                status: status.as_u16(),
                body,
            }),
        }
    }

    /// Handle the HTTP response
    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
        let response = Self::check_status(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ClientError::InvalidResponse(format!("{e}: {}", String::from_utf8_lossy(&bytes))))
    }
}
