//! Team Cymru reputation search provider.

use super::page::{selector, Page};
use super::{HttpClient, Probe, ProviderError, ReputationProvider};
use crate::verdict::Finding;
use async_trait::async_trait;
use scraper::Selector;
use std::sync::LazyLock;
use tracing::debug;

const URL: &str = "https://reputation.team-cymru.com/script/search.php";

/// Category cells that mark an IP as part of a botnet or attack infrastructure.
const BOTNET_CATEGORIES: &[&str] = &["bot", "controller", "darknet", "phishing", "scanner"];

static LOW_RISK_ROW: LazyLock<Selector> = LazyLock::new(|| selector("tbody > tr.low"));
static RESULT_CELL: LazyLock<Selector> = LazyLock::new(|| selector("tbody td"));

/// Team Cymru reputation table: listing, proxy, botnet and spam signals.
pub struct TeamCymruProvider {
    http: HttpClient,
    enabled: bool,
}

impl TeamCymruProvider {
    pub fn new(http: HttpClient, enabled: bool) -> Self {
        Self { http, enabled }
    }
}

fn assess(page: &str) -> Finding {
    let page = Page::parse(page);
    // A low-risk row means the IP is clean.
    let listed = !page.exists(&LOW_RISK_ROW);
    let categories: Vec<String> = page
        .texts(&RESULT_CELL)
        .map(|cell| cell.to_ascii_lowercase())
        .collect();
    let has = |category: &str| categories.iter().any(|cell| cell == category);

    Finding {
        proxy: has("proxy"),
        botnet: BOTNET_CATEGORIES.iter().any(|category| has(*category)),
        spam_email: has("spam").then(|| "Critical".to_string()),
        ..Finding::listing(listed)
    }
}

#[async_trait]
impl ReputationProvider for TeamCymruProvider {
    async fn inspect(&self, probe: &Probe) -> Result<Finding, ProviderError> {
        debug!(ip = %probe.ip, "Querying Team Cymru");
        let ip = probe.ip.to_string();
        let request = self.http.post(URL).form(&[("ips", ip.as_str())]);
        let page = self.http.text(request, probe.timeout).await?;
        Ok(assess(&page))
    }

    fn name(&self) -> &str {
        "team-cymru"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_ip() {
        let page = r#"<table><tbody><tr class="low"><td>8.8.8.8</td><td>none</td></tr></tbody></table>"#;
        let finding = assess(page);
        assert_eq!((finding.listed, finding.checked), (0, 1));
        assert!(!finding.proxy);
        assert!(!finding.botnet);
        assert!(finding.spam_email.is_none());
    }

    #[test]
    fn test_malicious_ip() {
        let page = r#"<table><tbody><tr class="high"><td>1.2.3.4</td><td>scanner</td><td>spam</td><td>proxy</td></tr></tbody></table>"#;
        let finding = assess(page);
        assert_eq!((finding.listed, finding.checked), (1, 1));
        assert!(finding.proxy);
        assert!(finding.botnet);
        assert_eq!(finding.spam_email.as_deref(), Some("Critical"));
    }

    #[test]
    fn test_category_must_fill_cell() {
        let page = r#"<table><tbody><tr class="medium"><td>1.2.3.4</td><td>botnet-free proxy list</td></tr></tbody></table>"#;
        let finding = assess(page);
        assert_eq!(finding.listed, 1);
        assert!(!finding.proxy);
        assert!(!finding.botnet);
    }
}
