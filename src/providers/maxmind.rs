//! MaxMind minFraud score provider.

use super::{HttpClient, Probe, ProviderError, ReputationProvider};
use crate::config::MaxmindCredentials;
use crate::verdict::Finding;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const SCORE_URL: &str = "https://minfraud.maxmind.com/minfraud/v2.0/score";

/// minFraud Score response (only the fields we use).
#[derive(Debug, Deserialize)]
struct ScoreResponse {
    #[serde(default)]
    ip_address: Option<IpAddressRisk>,
}

#[derive(Debug, Deserialize)]
struct IpAddressRisk {
    /// Risk of the IP, 0.01-99.
    #[serde(default)]
    risk: Option<f64>,
}

/// IP risk from the minFraud Score web service. Score mode only.
pub struct MaxmindProvider {
    http: HttpClient,
    credentials: MaxmindCredentials,
}

impl MaxmindProvider {
    pub fn new(http: HttpClient, credentials: MaxmindCredentials) -> Self {
        Self { http, credentials }
    }
}

fn assess(response: ScoreResponse) -> Finding {
    match response.ip_address.and_then(|ip| ip.risk) {
        Some(risk) if risk > 0.0 => Finding::default().with_fraud_score(risk.round() as i64),
        _ => Finding::default(),
    }
}

#[async_trait]
impl ReputationProvider for MaxmindProvider {
    async fn inspect(&self, probe: &Probe) -> Result<Finding, ProviderError> {
        debug!(ip = %probe.ip, "Querying minFraud");
        let request = self
            .http
            .post(SCORE_URL)
            .basic_auth(&self.credentials.account, Some(&self.credentials.license))
            .json(&json!({ "device": { "ip_address": probe.ip.to_string() } }));
        let response: ScoreResponse = self.http.json(request, probe.timeout).await?;
        Ok(assess(response))
    }

    fn name(&self) -> &str {
        "maxmind"
    }

    fn is_enabled(&self) -> bool {
        self.credentials.is_complete()
    }

    fn score_only(&self) -> bool {
        true
    }
}
