//! APIVoid IP reputation provider.

use super::{HttpClient, Probe, ProviderError, ReputationProvider};
use crate::verdict::{Finding, Gate};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

const URL: &str = "https://endpoint.apivoid.com/ipverify/v1/pay-as-you-go/";

#[derive(Debug, Deserialize)]
struct ApiVoidResponse {
    data: ApiVoidData,
}

#[derive(Debug, Deserialize)]
struct ApiVoidData {
    report: Report,
}

#[derive(Debug, Deserialize)]
struct Report {
    blacklists: Blacklists,
    risk_score: RiskScore,
    anonymity: Anonymity,
}

#[derive(Debug, Deserialize)]
struct Blacklists {
    detections: u32,
    engines_count: u32,
}

#[derive(Debug, Deserialize)]
struct RiskScore {
    result: i64,
}

#[derive(Debug, Deserialize)]
struct Anonymity {
    #[serde(default)]
    is_proxy: bool,
    #[serde(default)]
    is_webproxy: bool,
    #[serde(default)]
    is_tor: bool,
    #[serde(default)]
    is_vpn: bool,
    #[serde(default)]
    is_hosting: bool,
}

/// Blacklist engines, risk score and anonymity flags from APIVoid.
pub struct ApiVoidProvider {
    http: HttpClient,
    api_key: String,
}

impl ApiVoidProvider {
    pub fn new(http: HttpClient, api_key: String) -> Self {
        Self { http, api_key }
    }
}

fn assess(response: ApiVoidResponse) -> Finding {
    let report = response.data.report;
    let anonymity = report.anonymity;

    Finding {
        proxy: anonymity.is_proxy || anonymity.is_webproxy || anonymity.is_tor,
        hosting: anonymity.is_vpn || anonymity.is_hosting,
        ..Finding::tally(report.blacklists.detections, report.blacklists.engines_count)
    }
    .with_fraud_score(report.risk_score.result)
}

#[async_trait]
impl ReputationProvider for ApiVoidProvider {
    async fn inspect(&self, probe: &Probe) -> Result<Finding, ProviderError> {
        debug!(ip = %probe.ip, "Querying APIVoid");
        let request = self
            .http
            .get(URL)
            .query(&[("key", self.api_key.clone()), ("ip", probe.ip.to_string())]);
        let response: ApiVoidResponse = self.http.json(request, probe.timeout).await?;
        Ok(assess(response))
    }

    fn name(&self) -> &str {
        "apivoid"
    }

    fn is_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn gates(&self) -> &[Gate] {
        &[Gate::Fraudulent, Gate::Proxy, Gate::Hosting]
    }
}
