//! Threat intelligence portals: FortiGuard, Talos and Scamalytics.

use super::page::{selector, Page};
use super::{HttpClient, Probe, ProviderError, ReputationProvider};
use crate::text::{fetch_value, leading_int};
use crate::verdict::{Finding, Reputation};
use async_trait::async_trait;
use scraper::Selector;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::debug;

static STRONG: LazyLock<Selector> = LazyLock::new(|| selector("strong"));

/// FortiGuard botnet C&C lookup.
pub struct FortiGuardProvider {
    http: HttpClient,
    enabled: bool,
}

impl FortiGuardProvider {
    pub fn new(http: HttpClient, enabled: bool) -> Self {
        Self { http, enabled }
    }
}

fn assess_fortiguard(page: &str) -> Finding {
    let page = Page::parse(page);
    let not_found = page.texts(&STRONG).any(|text| text == "not been found");
    let botnet = !not_found && page.text().to_ascii_lowercase().contains("botnet");
    Finding {
        botnet,
        ..Finding::default()
    }
}

#[async_trait]
impl ReputationProvider for FortiGuardProvider {
    async fn inspect(&self, probe: &Probe) -> Result<Finding, ProviderError> {
        debug!(ip = %probe.ip, "Querying FortiGuard");
        let ip = probe.ip.to_string();
        let request = self
            .http
            .post("https://www.fortiguard.com/learnmore/botnetip")
            .form(&[("value", ip.as_str())]);
        let page = self.http.text(request, probe.timeout).await?;
        Ok(assess_fortiguard(&page))
    }

    fn name(&self) -> &str {
        "fortiguard"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[derive(Debug, Deserialize)]
struct TalosResponse {
    reputation: TalosReputation,
}

#[derive(Debug, Deserialize)]
struct TalosReputation {
    #[serde(default)]
    spam_level: Option<String>,
    threat_level_mnemonic: String,
}

/// Cisco Talos reputation: email spam level and overall reputation.
pub struct TalosProvider {
    http: HttpClient,
    enabled: bool,
}

impl TalosProvider {
    pub fn new(http: HttpClient, enabled: bool) -> Self {
        Self { http, enabled }
    }
}

fn assess_talos(response: TalosResponse) -> Finding {
    let reputation = response.reputation;
    Finding {
        spam_email: reputation.spam_level,
        reputation: Some(Reputation::from_mnemonic(&reputation.threat_level_mnemonic)),
        ..Finding::default()
    }
}

#[async_trait]
impl ReputationProvider for TalosProvider {
    async fn inspect(&self, probe: &Probe) -> Result<Finding, ProviderError> {
        debug!(ip = %probe.ip, "Querying Talos");
        let request = self
            .http
            .get("https://talosintelligence.com/cloud_intel/ip_reputation")
            .query(&[("ip", probe.ip.to_string())]);
        let response: TalosResponse = self.http.json(request, probe.timeout).await?;
        Ok(assess_talos(response))
    }

    fn name(&self) -> &str {
        "talosintelligence"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Scamalytics fraud score page.
pub struct ScamalyticsProvider {
    http: HttpClient,
    enabled: bool,
}

impl ScamalyticsProvider {
    pub fn new(http: HttpClient, enabled: bool) -> Self {
        Self { http, enabled }
    }
}

fn assess_scamalytics(page: &str) -> Result<Finding, ProviderError> {
    let score = leading_int(&fetch_value(page, "Fraud Score: ", "<")).ok_or_else(|| {
        ProviderError::InvalidResponse("fraud score not found on page".to_string())
    })?;
    Ok(Finding::default().with_fraud_score(score))
}

#[async_trait]
impl ReputationProvider for ScamalyticsProvider {
    async fn inspect(&self, probe: &Probe) -> Result<Finding, ProviderError> {
        debug!(ip = %probe.ip, "Querying Scamalytics");
        let url = format!("https://scamalytics.com/ip/{}", probe.ip);
        let page = self.http.text(self.http.get(&url), probe.timeout).await?;
        assess_scamalytics(&page)
    }

    fn name(&self) -> &str {
        "scamalytics"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::parse_json;

    #[test]
    fn test_fortiguard_not_found() {
        let page = "<h2>Botnet IP</h2><p>1.2.3.4 has <strong>not been found</strong> in our database</p>";
        assert!(!assess_fortiguard(page).botnet);
    }

    #[test]
    fn test_fortiguard_found() {
        let page = "<h2>Botnet IP</h2><p>1.2.3.4 is a Mirai botnet C&C</p>";
        assert!(assess_fortiguard(page).botnet);
    }

    #[test]
    fn test_fortiguard_unrelated_page() {
        assert!(!assess_fortiguard("<html>Access denied</html>").botnet);
    }

    #[test]
    fn test_fortiguard_ignores_markup() {
        let page = r#"<html><body class="botnet-lookup"><p>Nothing to report</p></body></html>"#;
        assert!(!assess_fortiguard(page).botnet);
    }

    #[test]
    fn test_talos_untrusted() {
        let body = r#"{"reputation": {"spam_level": "Critical", "threat_level_mnemonic": "Untrusted"}}"#;
        let finding = assess_talos(parse_json(body).unwrap());
        assert_eq!(finding.spam_email.as_deref(), Some("Critical"));
        assert_eq!(finding.reputation, Some(Reputation::Bad));
    }

    #[test]
    fn test_talos_neutral() {
        let body = r#"{"reputation": {"spam_level": "None", "threat_level_mnemonic": "Neutral"}}"#;
        let finding = assess_talos(parse_json(body).unwrap());
        assert_eq!(finding.reputation, Some(Reputation::Normal));
    }

    #[test]
    fn test_scamalytics_score() {
        let page = "<div class=\"score\">Fraud Score: 87</div>";
        assert_eq!(assess_scamalytics(page).unwrap().fraud_score, Some(87));
    }

    #[test]
    fn test_scamalytics_missing_score() {
        assert!(assess_scamalytics("<html>captcha</html>").is_err());
    }
}
