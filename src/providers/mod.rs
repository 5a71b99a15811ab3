//! IP reputation providers.
//!
//! Every provider turns one third-party answer into a [`Finding`]. Providers
//! never touch the verdict directly; the engine folds findings in order and
//! evaluates each provider's [`Gate`]s afterwards.

pub mod apivoid;
pub mod blacklists;
pub mod cleantalk;
pub mod ip_api;
pub mod iphub;
pub mod ipqualityscore;
pub mod maxmind;
mod page;
pub mod team_cymru;
pub mod threat_intel;

use crate::config::Settings;
use crate::text;
use crate::verdict::{Finding, Gate};
use async_trait::async_trait;
use reqwest::header::CONNECTION;
use reqwest::{Client, Proxy, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;

/// Error from a reputation provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited")]
    RateLimited,

    #[error("Unexpected status: {0}")]
    Status(u16),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Http(e)
        }
    }
}

/// One lookup as seen by a provider.
#[derive(Debug, Clone, Copy)]
pub struct Probe {
    pub ip: Ipv4Addr,
    /// Timeout for each request the provider makes.
    pub timeout: Duration,
}

/// Trait for IP reputation providers.
#[async_trait]
pub trait ReputationProvider: Send + Sync {
    /// Query the provider about `probe.ip`.
    async fn inspect(&self, probe: &Probe) -> Result<Finding, ProviderError>;

    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Whether this provider is enabled.
    fn is_enabled(&self) -> bool;

    /// Only consulted in score mode.
    fn score_only(&self) -> bool {
        false
    }

    /// Checks evaluated after this provider contributes, in order.
    fn gates(&self) -> &[Gate] {
        &[]
    }
}

/// HTTP client shared by all providers.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Build the client from global settings.
    pub fn new(settings: &Settings) -> Result<Self, ProviderError> {
        let mut builder = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(Duration::from_millis(settings.timeout_ms))
            .danger_accept_invalid_certs(settings.accept_invalid_certs);

        if let Some(url) = settings.proxy_url() {
            let proxy = Proxy::all(&url).map_err(|e| ProviderError::Client(e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| ProviderError::Client(e.to_string()))?;

        Ok(Self { client })
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.client.post(url)
    }

    /// Send `request` and return the body of a successful response.
    pub async fn text(
        &self,
        request: RequestBuilder,
        timeout: Duration,
    ) -> Result<String, ProviderError> {
        let response = request
            .header(CONNECTION, "keep-alive")
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }

        Ok(response.text().await?)
    }

    /// Send `request` and decode the JSON object it returns.
    pub async fn json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        timeout: Duration,
    ) -> Result<T, ProviderError> {
        let body = self.text(request, timeout).await?;
        parse_json(&body)
    }
}

/// Decode a response body into `T`, treating anything but a JSON object as invalid.
pub fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, ProviderError> {
    let object = text::decode_str(body);
    if object.is_empty() {
        return Err(ProviderError::InvalidResponse(
            "body is not a JSON object".to_string(),
        ));
    }
    serde_json::from_value(Value::Object(object))
        .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {}", e)))
}

/// A field value, or "Unknown" when the provider left it out.
pub(crate) fn or_unknown(value: Option<String>) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => "Unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Sample {
        block: i64,
    }

    #[test]
    fn test_parse_json_object() {
        let sample: Sample = parse_json(r#"{"block": 1, "ip": "1.2.3.4"}"#).unwrap();
        assert_eq!(sample.block, 1);
    }

    #[test]
    fn test_parse_json_rejects_html() {
        let err = parse_json::<Sample>("<html>blocked</html>").unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[test]
    fn test_parse_json_missing_field() {
        let err = parse_json::<Sample>(r#"{"ip": "1.2.3.4"}"#).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[test]
    fn test_or_unknown() {
        assert_eq!(or_unknown(None), "Unknown");
        assert_eq!(or_unknown(Some(" ".to_string())), "Unknown");
        assert_eq!(or_unknown(Some("Hanoi".to_string())), "Hanoi");
    }

    #[test]
    fn test_http_client_builds_with_proxy() {
        let mut settings = Settings::default();
        settings.proxy = Some("127.0.0.1:3128".to_string());
        assert!(HttpClient::new(&settings).is_ok());
    }

    #[test]
    fn test_provider_error_display() {
        assert_eq!(ProviderError::Status(503).to_string(), "Unexpected status: 503");
        assert_eq!(ProviderError::Timeout.to_string(), "Request timed out");
    }
}
