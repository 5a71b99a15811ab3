//! HTTP endpoint exposing the filter.

use crate::config::IpExtractionConfig;
use crate::engine::IpFilter;
use crate::verdict::ReputationVerdict;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, info};

/// Body of `POST /ip-filter`.
#[derive(Debug, Deserialize)]
pub struct FilterRequest {
    /// IP to assess. Falls back to the caller's address when absent.
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub fast: bool,
    #[serde(default = "default_true")]
    pub score: bool,
}

fn default_true() -> bool {
    true
}

impl Default for FilterRequest {
    fn default() -> Self {
        Self {
            ip: None,
            fast: false,
            score: true,
        }
    }
}

impl FilterRequest {
    /// Decode a request body. An empty body is a request with every field defaulted.
    pub fn from_body(body: &[u8]) -> Result<Self, ApiError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body).map_err(|e| ApiError::InvalidBody(e.to_string()))
    }
}

/// Errors returned to HTTP callers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("The ip field is required.")]
    MissingIp,

    #[error("Malformed JSON body: {0}")]
    InvalidBody(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, body) = match self {
            ApiError::MissingIp => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({
                    "message": message,
                    "errors": { "ip": [message] },
                }),
            ),
            ApiError::InvalidBody(_) => (StatusCode::BAD_REQUEST, json!({ "message": message })),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Clone)]
struct AppState {
    filter: Arc<IpFilter>,
    ip_extraction: Arc<IpExtractionConfig>,
}

/// Router with the filter endpoint attached.
pub fn router(filter: Arc<IpFilter>, ip_extraction: IpExtractionConfig) -> Router {
    let state = AppState {
        filter,
        ip_extraction: Arc::new(ip_extraction),
    };

    Router::new()
        .route("/ip-filter", post(filter_ip))
        .with_state(state)
}

/// Serve `router` on `addr` until SIGINT/SIGTERM.
pub async fn serve(router: Router, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, "Listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received"),
        _ = terminate => info!("SIGTERM received"),
    }
}

async fn filter_ip(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ReputationVerdict>, ApiError> {
    let request = FilterRequest::from_body(&body)?;
    let ip = match request.ip.filter(|ip| !ip.trim().is_empty()) {
        Some(ip) => ip,
        None => {
            let flat = flatten_headers(&headers);
            let ip = extract_client_ip(&flat, &state.ip_extraction).ok_or(ApiError::MissingIp)?;
            debug!(ip = %ip, "Using client ip from headers");
            ip.to_string()
        }
    };

    let verdict = state
        .filter
        .validate(&ip, request.fast, request.score)
        .await;
    Ok(Json(verdict))
}

/// Extract client IP from request headers.
pub fn extract_client_ip(
    headers: &HashMap<String, String>,
    config: &IpExtractionConfig,
) -> Option<IpAddr> {
    for header_name in &config.headers {
        let header_lower = header_name.to_lowercase();
        if let Some(value) = headers.get(&header_lower) {
            let ip_str = if config.use_first_ip {
                // X-Forwarded-For: client, proxy1, proxy2
                value.split(',').next()?.trim()
            } else {
                value.split(',').last()?.trim()
            };

            if let Ok(ip) = ip_str.parse() {
                return Some(ip);
            }
        }
    }
    None
}

/// Lowercase header names, first value wins.
fn flatten_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut flat = HashMap::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            flat.entry(name.as_str().to_lowercase())
                .or_insert_with(|| value.to_string());
        }
    }
    flat
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    fn app() -> Router {
        let filter = Arc::new(IpFilter::with_providers(Config::default(), vec![]));
        router(filter, IpExtractionConfig::default())
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn post_json(app: Router, body: &str, forwarded: Option<&str>) -> (StatusCode, Value) {
        let mut request = Request::post("/ip-filter").header(header::CONTENT_TYPE, "application/json");
        if let Some(forwarded) = forwarded {
            request = request.header("x-forwarded-for", forwarded);
        }
        send(app, request.body(Body::from(body.to_string())).unwrap()).await
    }

    #[tokio::test]
    async fn test_filter_valid_ip() {
        let (status, body) = post_json(app(), r#"{"ip": "8.8.8.8"}"#, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["query"], "8.8.8.8");
        assert_eq!(body["recommend"], true);
        assert_eq!(body["location"]["country"], "Unknown");
    }

    #[tokio::test]
    async fn test_filter_invalid_ip() {
        let (status, body) = post_json(app(), r#"{"ip": "not-an-ip", "fast": true}"#, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["recommend"], false);
        assert_eq!(body["reason"], "Invalid ip format");
    }

    #[tokio::test]
    async fn test_filter_falls_back_to_forwarded_ip() {
        let (status, body) = post_json(app(), "{}", Some("203.0.113.7, 10.0.0.1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["query"], "203.0.113.7");
    }

    #[tokio::test]
    async fn test_filter_without_body_uses_forwarded_ip() {
        let request = Request::post("/ip-filter")
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["query"], "203.0.113.7");
    }

    #[tokio::test]
    async fn test_filter_without_body_or_headers() {
        let request = Request::post("/ip-filter").body(Body::empty()).unwrap();
        let (status, body) = send(app(), request).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["errors"]["ip"][0], "The ip field is required.");
    }

    #[tokio::test]
    async fn test_filter_malformed_body() {
        let (status, body) = post_json(app(), "{\"ip\": ", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().starts_with("Malformed JSON body"));
    }

    #[test]
    fn test_request_defaults() {
        let request = FilterRequest::from_body(b"  ").unwrap();
        assert!(request.ip.is_none());
        assert!(!request.fast);
        assert!(request.score);

        let request = FilterRequest::from_body(br#"{"ip": "1.2.3.4", "fast": true}"#).unwrap();
        assert_eq!(request.ip.as_deref(), Some("1.2.3.4"));
        assert!(request.fast);
        assert!(request.score);
    }

    #[tokio::test]
    async fn test_filter_requires_ip() {
        let (status, body) = post_json(app(), r#"{"ip": "  "}"#, None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["message"], "The ip field is required.");
        assert_eq!(body["errors"]["ip"][0], "The ip field is required.");
    }

    #[test]
    fn test_extract_client_ip_xff() {
        let config = IpExtractionConfig {
            headers: vec!["x-forwarded-for".to_string()],
            use_first_ip: true,
        };

        let mut headers = HashMap::new();
        headers.insert(
            "x-forwarded-for".to_string(),
            "1.2.3.4, 5.6.7.8, 9.10.11.12".to_string(),
        );

        let ip = extract_client_ip(&headers, &config);
        assert_eq!(ip, Some("1.2.3.4".parse().unwrap()));
    }

    #[test]
    fn test_extract_client_ip_xff_last() {
        let config = IpExtractionConfig {
            headers: vec!["x-forwarded-for".to_string()],
            use_first_ip: false,
        };

        let mut headers = HashMap::new();
        headers.insert(
            "x-forwarded-for".to_string(),
            "1.2.3.4, 5.6.7.8, 9.10.11.12".to_string(),
        );

        let ip = extract_client_ip(&headers, &config);
        assert_eq!(ip, Some("9.10.11.12".parse().unwrap()));
    }

    #[test]
    fn test_extract_client_ip_priority() {
        let config = IpExtractionConfig {
            headers: vec!["x-forwarded-for".to_string(), "x-real-ip".to_string()],
            use_first_ip: true,
        };

        let mut headers = HashMap::new();
        headers.insert("x-real-ip".to_string(), "5.6.7.8".to_string());
        assert_eq!(
            extract_client_ip(&headers, &config),
            Some("5.6.7.8".parse().unwrap())
        );

        headers.insert("x-forwarded-for".to_string(), "1.2.3.4".to_string());
        assert_eq!(
            extract_client_ip(&headers, &config),
            Some("1.2.3.4".parse().unwrap())
        );
    }

    #[test]
    fn test_extract_client_ip_none() {
        let headers = HashMap::new();
        assert!(extract_client_ip(&headers, &IpExtractionConfig::default()).is_none());
    }

    #[test]
    fn test_flatten_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "192.168.1.1".parse().unwrap());
        headers.append("x-test", "value1".parse().unwrap());
        headers.append("x-test", "value2".parse().unwrap());

        let flat = flatten_headers(&headers);
        assert_eq!(flat.get("x-real-ip"), Some(&"192.168.1.1".to_string()));
        assert_eq!(flat.get("x-test"), Some(&"value1".to_string()));
    }
}
