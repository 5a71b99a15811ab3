//! CleanTalk spam check provider.

use super::{HttpClient, Probe, ProviderError, ReputationProvider};
use crate::verdict::{Finding, Gate};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct CleanTalkResponse {
    #[serde(default)]
    data: HashMap<String, CleanTalkRecord>,
}

#[derive(Debug, Deserialize)]
struct CleanTalkRecord {
    #[serde(default)]
    in_antispam: Option<i64>,
    #[serde(default)]
    in_security: Option<i64>,
    /// Share of spam activity, 0-1.
    #[serde(default)]
    spam_rate: Option<f64>,
}

/// Spam database membership and spam rate from CleanTalk.
pub struct CleanTalkProvider {
    http: HttpClient,
    api_key: String,
}

impl CleanTalkProvider {
    pub fn new(http: HttpClient, api_key: String) -> Self {
        Self { http, api_key }
    }
}

fn assess(mut response: CleanTalkResponse, ip: &str) -> Finding {
    let Some(record) = response.data.remove(ip) else {
        return Finding::default();
    };

    let finding = Finding {
        spam: record.in_antispam == Some(1),
        in_security: record.in_security == Some(1),
        ..Finding::default()
    };

    match record.spam_rate {
        Some(rate) => finding.with_fraud_score((rate * 100.0).round() as i64),
        None => finding,
    }
}

#[async_trait]
impl ReputationProvider for CleanTalkProvider {
    async fn inspect(&self, probe: &Probe) -> Result<Finding, ProviderError> {
        debug!(ip = %probe.ip, "Querying CleanTalk");
        let ip = probe.ip.to_string();
        let request = self.http.get("https://api.cleantalk.org/").query(&[
            ("method_name", "spam_check"),
            ("auth_key", self.api_key.as_str()),
            ("ip", ip.as_str()),
        ]);
        let response: CleanTalkResponse = self.http.json(request, probe.timeout).await?;
        Ok(assess(response, &ip))
    }

    fn name(&self) -> &str {
        "cleantalk"
    }

    fn is_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn gates(&self) -> &[Gate] {
        &[Gate::Spam, Gate::Fraudulent]
    }
}
