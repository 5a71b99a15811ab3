//! IPQualityScore proxy/VPN/Tor detection provider.

use super::{HttpClient, Probe, ProviderError, ReputationProvider};
use crate::verdict::{Finding, Gate};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct IpqsResponse {
    #[serde(default = "default_true")]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    mobile: bool,
    #[serde(default)]
    proxy: bool,
    #[serde(default)]
    vpn: bool,
    #[serde(default)]
    active_vpn: bool,
    #[serde(default)]
    is_crawler: bool,
    #[serde(default)]
    tor: bool,
    #[serde(default)]
    active_tor: bool,
    #[serde(default)]
    recent_abuse: bool,
    #[serde(default)]
    fraud_score: Option<i64>,
}

fn default_true() -> bool {
    true
}

/// Mobile, proxy, Tor and abuse flags from IPQualityScore.
pub struct IpQualityScoreProvider {
    http: HttpClient,
    api_key: String,
}

impl IpQualityScoreProvider {
    pub fn new(http: HttpClient, api_key: String) -> Self {
        Self { http, api_key }
    }
}

fn assess(response: IpqsResponse) -> Result<Finding, ProviderError> {
    if !response.success {
        return Err(ProviderError::InvalidResponse(
            response
                .message
                .unwrap_or_else(|| "request was not successful".to_string()),
        ));
    }

    Ok(Finding {
        mobile: response.mobile,
        proxy: response.proxy || response.vpn || response.active_vpn || response.is_crawler,
        botnet: response.tor || response.active_tor,
        spam_ip: response.recent_abuse,
        ..Finding::default()
    })
}

#[async_trait]
impl ReputationProvider for IpQualityScoreProvider {
    async fn inspect(&self, probe: &Probe) -> Result<Finding, ProviderError> {
        let url = format!(
            "https://ipqualityscore.com/api/json/ip/{}/{}",
            self.api_key, probe.ip
        );
        let request = self.http.get(&url).query(&[("strictness", "1")]);
        let response: IpqsResponse = self.http.json(request, probe.timeout).await?;
        debug!(ip = %probe.ip, fraud_score = ?response.fraud_score, "IPQualityScore lookup complete");
        assess(response)
    }

    fn name(&self) -> &str {
        "ipqualityscore"
    }

    fn is_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn gates(&self) -> &[Gate] {
        &[Gate::Proxy, Gate::Botnet, Gate::SpamIp]
    }
}
