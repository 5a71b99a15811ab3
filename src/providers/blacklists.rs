//! Blacklist lookups scraped from public web tools.
//!
//! Each of these adds to the running listed/checked tally and nothing else.

use super::page::{selector, Page};
use super::{HttpClient, Probe, ProviderError, ReputationProvider};
use crate::text::leading_int;
use crate::verdict::Finding;
use async_trait::async_trait;
use scraper::Selector;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::debug;

static CID_INPUT: LazyLock<Selector> = LazyLock::new(|| selector(r#"input[name="cid"]"#));
static FAILURE_MESSAGE: LazyLock<Selector> = LazyLock::new(|| selector(".failure-message"));
static TABLE_CELL: LazyLock<Selector> = LazyLock::new(|| selector("td"));
static VALLI_LISTED: LazyLock<Selector> =
    LazyLock::new(|| selector("span.global_data_cntBlacklisted_DNSBLBlacklistTest"));
static VALLI_TOTAL: LazyLock<Selector> =
    LazyLock::new(|| selector("span.global_data_cnt_DNSBLBlacklistTest"));
static STRONG: LazyLock<Selector> = LazyLock::new(|| selector("strong"));

/// Barracuda Central reputation lookup.
///
/// The lookup form carries a `cid` token that must be posted back.
pub struct BarracudaProvider {
    http: HttpClient,
    enabled: bool,
}

const BARRACUDA_URL: &str = "https://www.barracudacentral.org/lookups/lookup-reputation";

impl BarracudaProvider {
    pub fn new(http: HttpClient, enabled: bool) -> Self {
        Self { http, enabled }
    }
}

fn barracuda_cid(form_page: &str) -> String {
    Page::parse(form_page)
        .attr(&CID_INPUT, "value")
        .unwrap_or_default()
}

fn assess_barracuda(page: &str) -> Finding {
    Finding::listing(Page::parse(page).exists(&FAILURE_MESSAGE))
}

#[async_trait]
impl ReputationProvider for BarracudaProvider {
    async fn inspect(&self, probe: &Probe) -> Result<Finding, ProviderError> {
        let form_page = self
            .http
            .text(self.http.get(BARRACUDA_URL), probe.timeout)
            .await?;
        let cid = barracuda_cid(&form_page);
        debug!(ip = %probe.ip, cid_found = !cid.is_empty(), "Querying Barracuda Central");

        let ip = probe.ip.to_string();
        let form = [
            ("lookup_entry", ip.as_str()),
            ("cid", cid.as_str()),
            ("submit", "Check Reputation"),
        ];
        let page = self
            .http
            .text(self.http.post(BARRACUDA_URL).form(&form), probe.timeout)
            .await?;
        Ok(assess_barracuda(&page))
    }

    fn name(&self) -> &str {
        "barracudacentral"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// getipintel.net proxy/VPN check, bad-IP flag only.
pub struct GetIpIntelProvider {
    http: HttpClient,
    enabled: bool,
    contact: String,
}

#[derive(Debug, Deserialize)]
struct GetIpIntelResponse {
    #[serde(rename = "BadIP")]
    bad_ip: i64,
}

impl GetIpIntelProvider {
    pub fn new(http: HttpClient, enabled: bool, contact: String) -> Self {
        Self {
            http,
            enabled,
            contact,
        }
    }
}

#[async_trait]
impl ReputationProvider for GetIpIntelProvider {
    async fn inspect(&self, probe: &Probe) -> Result<Finding, ProviderError> {
        debug!(ip = %probe.ip, "Querying getipintel");
        let ip = probe.ip.to_string();
        let request = self.http.get("https://check.getipintel.net/check.php").query(&[
            ("ip", ip.as_str()),
            ("contact", self.contact.as_str()),
            ("format", "json"),
            ("oflags", "b"),
        ]);
        let response: GetIpIntelResponse = self.http.json(request, probe.timeout).await?;
        Ok(Finding::listing(response.bad_ip == 1))
    }

    fn name(&self) -> &str {
        "getipintel"
    }

    fn is_enabled(&self) -> bool {
        // The service refuses queries without a contact address.
        self.enabled && !self.contact.is_empty()
    }
}

/// EasyDMARC reputation check, one table row per blacklist.
pub struct EasyDmarcProvider {
    http: HttpClient,
    enabled: bool,
}

impl EasyDmarcProvider {
    pub fn new(http: HttpClient, enabled: bool) -> Self {
        Self { http, enabled }
    }
}

fn assess_easydmarc(page: &str) -> Finding {
    let page = Page::parse(page);
    let count = |status: &str| {
        u32::try_from(page.count_text(&TABLE_CELL, status)).unwrap_or(u32::MAX)
    };
    let listed = count("Listed");
    let clean = count("Not listed");
    Finding::tally(listed, listed.saturating_add(clean))
}

#[async_trait]
impl ReputationProvider for EasyDmarcProvider {
    async fn inspect(&self, probe: &Probe) -> Result<Finding, ProviderError> {
        debug!(ip = %probe.ip, "Querying EasyDMARC");
        let request = self
            .http
            .get("https://easydmarc.com/tools/ip-domain-reputation-check")
            .query(&[("term", probe.ip.to_string())]);
        let page = self.http.text(request, probe.timeout).await?;
        Ok(assess_easydmarc(&page))
    }

    fn name(&self) -> &str {
        "easydmarc"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// multirbl.valli.org DNSBL summary counters.
pub struct ValliProvider {
    http: HttpClient,
    enabled: bool,
}

impl ValliProvider {
    pub fn new(http: HttpClient, enabled: bool) -> Self {
        Self { http, enabled }
    }
}

fn assess_valli(page: &str) -> Finding {
    let page = Page::parse(page);
    let counter = |span: &Selector| {
        page.first_text(span)
            .and_then(|text| leading_int(&text))
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0)
    };
    let listed = counter(&VALLI_LISTED);
    let total = counter(&VALLI_TOTAL);
    // A listed count above the engine total is a broken page.
    Finding::tally(listed.min(total), total)
}

#[async_trait]
impl ReputationProvider for ValliProvider {
    async fn inspect(&self, probe: &Probe) -> Result<Finding, ProviderError> {
        debug!(ip = %probe.ip, "Querying multirbl.valli.org");
        let url = format!("https://multirbl.valli.org/lookup/{}.html", probe.ip);
        let page = self.http.text(self.http.get(&url), probe.timeout).await?;
        Ok(assess_valli(&page))
    }

    fn name(&self) -> &str {
        "valli"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// UCEPROTECT RBL check.
pub struct UceProtectProvider {
    http: HttpClient,
    enabled: bool,
}

impl UceProtectProvider {
    pub fn new(http: HttpClient, enabled: bool) -> Self {
        Self { http, enabled }
    }
}

fn assess_uceprotect(page: &str) -> Finding {
    Finding::listing(Page::parse(page).texts(&STRONG).any(|text| text == "LISTED"))
}

#[async_trait]
impl ReputationProvider for UceProtectProvider {
    async fn inspect(&self, probe: &Probe) -> Result<Finding, ProviderError> {
        debug!(ip = %probe.ip, "Querying UCEPROTECT");
        let ip = probe.ip.to_string();
        let form = [
            ("whattocheck", "IP"),
            ("ipr", ip.as_str()),
            ("subchannel", "5756107b7be"),
        ];
        let request = self
            .http
            .post("https://www.uceprotect.net/en/rblcheck.php")
            .form(&form);
        let page = self.http.text(request, probe.timeout).await?;
        Ok(assess_uceprotect(&page))
    }

    fn name(&self) -> &str {
        "uceprotect"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Project Honey Pot IP page. Any data at all counts as a listing.
pub struct ProjectHoneypotProvider {
    http: HttpClient,
    enabled: bool,
}

impl ProjectHoneypotProvider {
    pub fn new(http: HttpClient, enabled: bool) -> Self {
        Self { http, enabled }
    }
}

fn assess_projecthoneypot(page: &str) -> Finding {
    Finding::listing(!Page::parse(page).text().contains("t have data on this IP currently"))
}

#[async_trait]
impl ReputationProvider for ProjectHoneypotProvider {
    async fn inspect(&self, probe: &Probe) -> Result<Finding, ProviderError> {
        debug!(ip = %probe.ip, "Querying Project Honey Pot");
        let url = format!("https://www.projecthoneypot.org/ip_{}", probe.ip);
        let page = self.http.text(self.http.get(&url), probe.timeout).await?;
        Ok(assess_projecthoneypot(&page))
    }

    fn name(&self) -> &str {
        "projecthoneypot"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::providers::parse_json;

    #[test]
    fn test_barracuda_cid() {
        let page = r#"<form><input type="hidden" name="cid" value="a1b2c3"><input name="x"></form>"#;
        assert_eq!(barracuda_cid(page), "a1b2c3");
        assert_eq!(barracuda_cid("<form></form>"), "");
    }

    #[test]
    fn test_barracuda_listing() {
        let listed = assess_barracuda(r#"<p class="alert failure-message">poor reputation</p>"#);
        assert_eq!((listed.listed, listed.checked), (1, 1));

        let clean = assess_barracuda(r#"<p class="success-message">no failure-message here</p>"#);
        assert_eq!((clean.listed, clean.checked), (0, 1));
    }

    #[test]
    fn test_getipintel_bad_ip() {
        let response: GetIpIntelResponse =
            parse_json(r#"{"status": "success", "result": "1", "BadIP": 1}"#).unwrap();
        assert_eq!(response.bad_ip, 1);
    }

    #[test]
    fn test_getipintel_needs_contact() {
        let http = HttpClient::new(&Settings::default()).unwrap();
        assert!(!GetIpIntelProvider::new(http.clone(), true, String::new()).is_enabled());
        assert!(GetIpIntelProvider::new(http, true, "ops@example.com".to_string()).is_enabled());
    }

    #[test]
    fn test_easydmarc_counts_rows() {
        let page = r#"<table>
            <tr><td>Spamhaus</td><td class="status">Listed</td></tr>
            <tr><td>SORBS</td><td>Not listed</td></tr>
            <tr><td>Barracuda</td><td> Not listed </td></tr>
        </table>"#;
        let finding = assess_easydmarc(page);
        assert_eq!((finding.listed, finding.checked), (1, 3));
    }

    #[test]
    fn test_easydmarc_ignores_other_cells() {
        let page = "<table><tr><td>Listed engines</td><td>Listed by 0</td></tr></table>";
        let finding = assess_easydmarc(page);
        assert_eq!((finding.listed, finding.checked), (0, 0));
    }

    #[test]
    fn test_valli_counters() {
        let page = r#"<span class="global_data_cntBlacklisted_DNSBLBlacklistTest">4</span> of
                      <span class="global_data_cnt_DNSBLBlacklistTest">192</span>"#;
        let finding = assess_valli(page);
        assert_eq!((finding.listed, finding.checked), (4, 192));
    }

    #[test]
    fn test_valli_listed_capped_at_total() {
        let page = r#"<span class="global_data_cntBlacklisted_DNSBLBlacklistTest">4294967295</span>
                      <span class="global_data_cnt_DNSBLBlacklistTest">3</span>"#;
        let finding = assess_valli(page);
        assert_eq!((finding.listed, finding.checked), (3, 3));
    }

    #[test]
    fn test_valli_missing_counters() {
        let finding = assess_valli("<html>maintenance</html>");
        assert_eq!((finding.listed, finding.checked), (0, 0));
    }

    #[test]
    fn test_uceprotect_listing() {
        assert_eq!(assess_uceprotect("IP is <strong>LISTED</strong> in level 1").listed, 1);
        assert_eq!(assess_uceprotect("IP is <strong>not listed</strong>").listed, 0);
        assert_eq!(assess_uceprotect("LISTED in the FAQ").listed, 0);
    }

    #[test]
    fn test_projecthoneypot_listing() {
        let clean = assess_projecthoneypot("We don't have data on this IP currently.");
        assert_eq!((clean.listed, clean.checked), (0, 1));

        let listed = assess_projecthoneypot("Harvester, first seen 2023-01-02");
        assert_eq!((listed.listed, listed.checked), (1, 1));
    }
}
