//! HTTP client for the chat server REST API.
//!
//! Handles the auth headers, custom headers, timeout management, SSL
//! certificate handling, exponential backoff retry for reads, and the
//! request/response lifecycle.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use rl_core::config::{AppConfig, ServerConfig};
use rl_core::constants;
use rl_core::error::{RlError, RlResult};
use rl_models::Credential;

use crate::response::{parse_envelope, ServerResponse};

/// Retry configuration for HTTP requests.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Base delay between retries (doubles each attempt).
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// HTTP status codes that trigger a retry.
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            retryable_statuses: vec![502, 503, 504],
        }
    }
}

/// HTTP client for the chat server.
///
/// Wraps reqwest::Client with the server's header authentication, retry
/// logic and error handling. Clones share the logged-in credential.
#[derive(Clone)]
pub struct ApiClient {
    inner: Client,
    /// Base URL for the API (e.g. "https://chat.example.com/api/v1").
    api_root: String,
    /// Server origin (scheme + host, no path).
    origin: String,
    /// Credential sent as `X-Auth-Token` / `X-User-Id`.
    credential: Arc<RwLock<Option<Credential>>>,
    /// Extended timeout for uploads.
    extended_timeout: Duration,
    /// Custom headers from server config.
    custom_headers: Vec<(String, String)>,
    /// Retry configuration.
    retry_config: RetryConfig,
}

impl ApiClient {
    /// Create a new ApiClient from server configuration.
    pub fn new(config: &ServerConfig) -> RlResult<Self> {
        let sanitized_address = AppConfig::sanitize_server_address(&config.address);
        let timeout = Duration::from_millis(config.api_timeout_ms);

        let mut builder = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(15))
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30));

        // Handle self-signed certificates
        if config.accept_self_signed_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let inner = builder
            .build()
            .map_err(|e| RlError::Http(format!("failed to build HTTP client: {e}")))?;

        let origin = derive_origin(&sanitized_address);
        let api_root = format!("{origin}/api/{}", constants::API_VERSION);

        let mut custom_headers: Vec<(String, String)> = config
            .custom_headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        custom_headers.sort();

        Ok(Self {
            inner,
            api_root,
            origin,
            credential: Arc::new(RwLock::new(None)),
            extended_timeout: timeout * constants::EXTENDED_TIMEOUT_MULTIPLIER as u32,
            custom_headers,
            retry_config: RetryConfig::default(),
        })
    }

    /// Set custom retry configuration.
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Get the current API root URL.
    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    /// Get the server origin. Attachment paths are relative to it.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Use `credential` for every following request.
    pub async fn set_credential(&self, credential: Credential) {
        debug!("api credential set for user {}", credential.user_id);
        *self.credential.write().await = Some(credential);
    }

    /// Forget the credential.
    pub async fn clear_credential(&self) {
        *self.credential.write().await = None;
    }

    /// The credential in use, if logged in.
    pub async fn credential(&self) -> Option<Credential> {
        self.credential.read().await.clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_root)
    }

    /// Apply custom and auth headers to a request builder.
    async fn apply_headers(&self, mut builder: RequestBuilder) -> RequestBuilder {
        for (key, value) in &self.custom_headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(credential) = self.credential.read().await.as_ref() {
            builder = builder
                .header("X-Auth-Token", credential.token.as_str())
                .header("X-User-Id", credential.user_id.as_str());
        }
        builder
    }

    /// Internal: build a request for the given method, URL, and optional JSON body.
    async fn build_request(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> RequestBuilder {
        let mut builder = self.inner.request(method, url);
        if let Some(b) = body {
            builder = builder.json(b);
        }
        self.apply_headers(builder).await
    }

    /// Execute a request, retrying up to `max_retries` times with
    /// exponential backoff.
    async fn request_with_retry(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        max_retries: u32,
    ) -> RlResult<Response> {
        let url = self.url(path);
        debug!("{} {}", method, path);

        let mut last_error: Option<RlError> = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                let delay = self.calculate_retry_delay(attempt - 1);
                warn!(
                    "retrying {} {} (attempt {}/{}) after {:.1}s",
                    method,
                    path,
                    attempt + 1,
                    max_retries + 1,
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
            }

            let builder = self.build_request(method.clone(), &url, body).await;

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    if self
                        .retry_config
                        .retryable_statuses
                        .contains(&status.as_u16())
                        && attempt < max_retries
                    {
                        warn!("retryable status {} from {}", status.as_u16(), path);
                        last_error = Some(RlError::ServerError {
                            status: status.as_u16(),
                            message: format!("retryable status {status}"),
                        });
                        continue;
                    }

                    return Self::check_status(response).await;
                }
                Err(e) => {
                    let is_retryable = e.is_timeout() || e.is_connect();
                    let err = Self::classify_error(e);

                    if is_retryable && attempt < max_retries {
                        warn!("retryable error on {}: {}", path, err);
                        last_error = Some(err);
                        continue;
                    }

                    return Err(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| RlError::Http("max retries exceeded".into())))
    }

    /// Calculate retry delay with exponential backoff.
    fn calculate_retry_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.retry_config.base_delay.as_millis() as u64;
        let delay_ms = base_ms.saturating_mul(1u64 << attempt.min(16));
        let max_ms = self.retry_config.max_delay.as_millis() as u64;
        Duration::from_millis(delay_ms.min(max_ms))
    }

    // --- Public HTTP methods ---

    /// Execute a GET request with automatic retry.
    pub async fn get(&self, path: &str) -> RlResult<Response> {
        self.request_with_retry(Method::GET, path, None, self.retry_config.max_retries)
            .await
    }

    /// Execute a POST request with a JSON body.
    ///
    /// Posts are not retried: the server may have acted on a request whose
    /// response was lost.
    pub async fn post(&self, path: &str, body: &serde_json::Value) -> RlResult<Response> {
        self.request_with_retry(Method::POST, path, Some(body), 0)
            .await
    }

    /// Execute a POST request with a multipart form (for file uploads).
    /// Multipart forms cannot be cloned, so no automatic retry on this method.
    pub async fn post_multipart(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> RlResult<Response> {
        let url = self.url(path);
        debug!("POST (multipart) {}", path);

        let builder = self
            .inner
            .post(&url)
            .multipart(form)
            .timeout(self.extended_timeout);
        let builder = self.apply_headers(builder).await;

        let response = builder.send().await.map_err(Self::classify_error)?;

        Self::check_status(response).await
    }

    // --- Response helpers ---

    /// Read the body and unwrap the server envelope.
    pub async fn parse_response<T: DeserializeOwned>(response: Response) -> RlResult<T> {
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| RlError::Http(format!("failed to read response body: {e}")))?;
        let envelope: ServerResponse<T> = parse_envelope(&text)?;
        envelope.into_result(status)
    }

    /// Convenience: GET + parse.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> RlResult<T> {
        let resp = self.get(path).await?;
        Self::parse_response(resp).await
    }

    /// Convenience: POST + parse.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> RlResult<T> {
        let resp = self.post(path, body).await?;
        Self::parse_response(resp).await
    }

    /// Check the HTTP status code and convert to RlError if needed.
    async fn check_status(response: Response) -> RlResult<Response> {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(RlError::Auth(error_text(&body, status)));
        }

        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(RlError::ServerError {
                status: status.as_u16(),
                message: error_text(&body, status),
            });
        }

        Ok(response)
    }

    /// Classify a reqwest error into an RlError variant.
    fn classify_error(e: reqwest::Error) -> RlError {
        if e.is_timeout() {
            RlError::Timeout(e.to_string())
        } else if e.is_connect() {
            RlError::Http(format!("connection failed: {e}"))
        } else {
            RlError::Http(e.to_string())
        }
    }
}

/// Best error text from an error response body.
fn error_text(body: &str, status: StatusCode) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|v| v.get(name))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };
    field("error")
        .or_else(|| field("message"))
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("server returned {status}")
            } else {
                body.trim().to_string()
            }
        })
}

/// Derive the origin (scheme + host + optional port) from a server address.
fn derive_origin(address: &str) -> String {
    if let Ok(url) = reqwest::Url::parse(address) {
        let host = url.host_str().unwrap_or("localhost");
        match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        }
    } else {
        address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ServerConfig {
        ServerConfig {
            address: "http://localhost:3001".into(),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn test_derive_origin() {
        assert_eq!(
            derive_origin("https://chat.example.com/some/path"),
            "https://chat.example.com"
        );
        assert_eq!(
            derive_origin("http://192.168.1.100:3001"),
            "http://192.168.1.100:3001"
        );
    }

    #[test]
    fn test_api_root() {
        let client = ApiClient::new(&test_config()).unwrap();
        assert_eq!(client.api_root(), "http://localhost:3001/api/v1");
        assert_eq!(client.url("/im.list"), "http://localhost:3001/api/v1/im.list");
    }

    #[test]
    fn test_retry_delay_calculation() {
        let client = ApiClient::new(&test_config()).unwrap();
        assert_eq!(client.calculate_retry_delay(0), Duration::from_secs(1));
        assert_eq!(client.calculate_retry_delay(1), Duration::from_secs(2));
        assert_eq!(client.calculate_retry_delay(2), Duration::from_secs(4));
    }

    #[test]
    fn test_retry_delay_capped() {
        let client = ApiClient::new(&test_config()).unwrap();
        let d10 = client.calculate_retry_delay(40);
        assert!(d10 <= Duration::from_secs(4));
    }

    #[test]
    fn test_error_text() {
        assert_eq!(
            error_text(r#"{"success":false,"error":"error-not-allowed"}"#, StatusCode::BAD_REQUEST),
            "error-not-allowed"
        );
        assert_eq!(
            error_text(r#"{"status":"error","message":"You must be logged in to do this."}"#, StatusCode::UNAUTHORIZED),
            "You must be logged in to do this."
        );
        assert_eq!(
            error_text("", StatusCode::BAD_GATEWAY),
            "server returned 502 Bad Gateway"
        );
    }

    #[tokio::test]
    async fn test_credential_shared_between_clones() {
        let client = ApiClient::new(&test_config()).unwrap();
        let clone = client.clone();
        client.set_credential(Credential::new("u1", "tok")).await;
        assert_eq!(clone.credential().await.unwrap().user_id, "u1");
        clone.clear_credential().await;
        assert!(client.credential().await.is_none());
    }
}
