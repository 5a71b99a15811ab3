//! Verdict types and the rules for folding provider findings into them.

use serde::{Deserialize, Serialize};

/// Fraud score at or above which an IP is considered fraudulent.
pub const FRAUD_THRESHOLD: i64 = 75;

/// Blacklist percentage at or above which an IP is considered blacklisted.
pub const BLACKLIST_THRESHOLD: u8 = 75;

/// Reason recorded when the input is not a valid IPv4 address.
pub const INVALID_IP_REASON: &str = "Invalid ip format";

const UNKNOWN: &str = "Unknown";

/// Overall reputation category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reputation {
    Good,
    Bad,
    Normal,
    #[default]
    Unknown,
}

impl Reputation {
    /// Map a threat level mnemonic ("trusted", "untrusted", ...) to a category.
    pub fn from_mnemonic(mnemonic: &str) -> Self {
        match mnemonic.trim().to_lowercase().as_str() {
            "trusted" => Reputation::Good,
            "untrusted" => Reputation::Bad,
            "unknown" => Reputation::Unknown,
            _ => Reputation::Normal,
        }
    }
}

/// Trust signals gathered from all providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trustable {
    pub mobile: bool,
    pub proxy: bool,
    pub hosting: bool,
    pub botnet: bool,
    pub spam: bool,
    pub spam_ip: bool,
    pub in_security: bool,
    pub spam_email: String,
    /// Number of blacklist engines that answered.
    pub total_server: u32,
    /// Fraud score, 0-100.
    pub fraud_score: u8,
    /// Percentage of blacklist engines listing the IP, 0-100.
    pub blacklist: u8,
    pub reputation: Reputation,
}

impl Default for Trustable {
    fn default() -> Self {
        Self {
            mobile: false,
            proxy: false,
            hosting: false,
            botnet: false,
            spam: false,
            spam_ip: false,
            in_security: false,
            spam_email: UNKNOWN.to_string(),
            total_server: 0,
            fraud_score: 0,
            blacklist: 0,
            reputation: Reputation::Unknown,
        }
    }
}

/// Geolocation of the IP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub country: String,
    #[serde(rename = "countryCode")]
    pub country_code: String,
    pub region: String,
    #[serde(rename = "regionName")]
    pub region_name: String,
    pub city: String,
    pub zip: String,
    pub lat: String,
    pub lon: String,
    pub timezone: String,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            country: UNKNOWN.to_string(),
            country_code: UNKNOWN.to_string(),
            region: UNKNOWN.to_string(),
            region_name: UNKNOWN.to_string(),
            city: UNKNOWN.to_string(),
            zip: UNKNOWN.to_string(),
            lat: UNKNOWN.to_string(),
            lon: UNKNOWN.to_string(),
            timezone: UNKNOWN.to_string(),
        }
    }
}

/// Network ownership of the IP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dns {
    pub isp: String,
    pub org: String,
    #[serde(rename = "as")]
    pub asn: String,
    pub asname: String,
}

impl Default for Dns {
    fn default() -> Self {
        Self {
            isp: UNKNOWN.to_string(),
            org: UNKNOWN.to_string(),
            asn: UNKNOWN.to_string(),
            asname: UNKNOWN.to_string(),
        }
    }
}

/// Final trust verdict for one IP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationVerdict {
    /// Normalized input.
    pub query: String,
    /// Whether the IP can be trusted.
    pub recommend: bool,
    /// First disqualifying reason, empty when recommended.
    pub reason: String,
    pub trustable: Trustable,
    pub location: Location,
    pub dns: Dns,
}

impl ReputationVerdict {
    /// Fresh verdict with every field at its default.
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            recommend: true,
            reason: String::new(),
            trustable: Trustable::default(),
            location: Location::default(),
            dns: Dns::default(),
        }
    }
}

/// One provider's contribution to a verdict.
///
/// Flags only ever raise the verdict's flags; they never clear them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Finding {
    pub location: Option<Location>,
    pub dns: Option<Dns>,
    pub mobile: bool,
    pub proxy: bool,
    pub hosting: bool,
    pub botnet: bool,
    pub spam: bool,
    pub spam_ip: bool,
    pub in_security: bool,
    pub spam_email: Option<String>,
    pub reputation: Option<Reputation>,
    pub fraud_score: Option<i64>,
    /// Blacklist engines listing the IP.
    pub listed: u32,
    /// Blacklist engines that answered.
    pub checked: u32,
}

impl Finding {
    /// A single blacklist engine's answer.
    pub fn listing(listed: bool) -> Self {
        Self::tally(u32::from(listed), 1)
    }

    /// Several blacklist engines' answers at once.
    pub fn tally(listed: u32, checked: u32) -> Self {
        Self {
            listed,
            checked,
            ..Self::default()
        }
    }

    /// Set the fraud score.
    pub fn with_fraud_score(mut self, score: i64) -> Self {
        self.fraud_score = Some(score);
        self
    }
}

/// A disqualifying check evaluated after a provider contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Fraudulent,
    Proxy,
    Hosting,
    Botnet,
    Spam,
    SpamIp,
    Blacklisted,
}

impl Gate {
    /// Reason recorded on the verdict when this gate trips.
    pub fn reason(&self) -> &'static str {
        match self {
            Gate::Fraudulent => "This ip was marked as fraudulent",
            Gate::Proxy => "This ip was marked as proxy",
            Gate::Hosting => "This ip was marked as hosting",
            Gate::Botnet => "This ip was marked as botnet",
            Gate::Spam | Gate::SpamIp => "This ip was marked as spam",
            Gate::Blacklisted => "This ip was marked as blacklisted",
        }
    }

    /// Whether the assessment so far trips this gate.
    ///
    /// The fraud gate only applies in score mode.
    pub fn is_tripped(&self, assessment: &Assessment, score: bool) -> bool {
        let trustable = &assessment.verdict.trustable;
        match self {
            Gate::Fraudulent => score && assessment.fraud_score >= FRAUD_THRESHOLD,
            Gate::Proxy => trustable.proxy,
            Gate::Hosting => trustable.hosting,
            Gate::Botnet => trustable.botnet,
            Gate::Spam => trustable.spam,
            Gate::SpamIp => trustable.spam_ip,
            Gate::Blacklisted => assessment.blacklist_percentage() >= BLACKLIST_THRESHOLD,
        }
    }
}

/// A verdict under construction plus the running tallies behind it.
#[derive(Debug, Clone)]
pub struct Assessment {
    verdict: ReputationVerdict,
    listed: u32,
    checked: u32,
    /// -1 until some provider reports a score.
    fraud_score: i64,
}

impl Assessment {
    /// Start assessing `query`.
    pub fn new(query: &str) -> Self {
        Self {
            verdict: ReputationVerdict::new(query),
            listed: 0,
            checked: 0,
            fraud_score: -1,
        }
    }

    /// The verdict as it stands.
    #[cfg(test)]
    pub fn verdict(&self) -> &ReputationVerdict {
        &self.verdict
    }

    /// Whether some step already disqualified the IP.
    #[cfg(test)]
    pub fn is_disqualified(&self) -> bool {
        !self.verdict.recommend
    }

    /// Fold a provider's finding into the verdict.
    pub fn apply(&mut self, finding: Finding) {
        let trustable = &mut self.verdict.trustable;
        trustable.mobile |= finding.mobile;
        trustable.proxy |= finding.proxy;
        trustable.hosting |= finding.hosting;
        trustable.botnet |= finding.botnet;
        trustable.spam |= finding.spam;
        trustable.spam_ip |= finding.spam_ip;
        trustable.in_security |= finding.in_security;

        if let Some(level) = finding.spam_email {
            trustable.spam_email = level;
        }
        if let Some(reputation) = finding.reputation {
            trustable.reputation = reputation;
        }
        if let Some(score) = finding.fraud_score {
            self.fraud_score = self.fraud_score.max(score);
        }
        if let Some(location) = finding.location {
            self.verdict.location = location;
        }
        if let Some(dns) = finding.dns {
            self.verdict.dns = dns;
        }

        // Counts come from scraped pages.
        self.listed = self.listed.saturating_add(finding.listed);
        self.checked = self.checked.saturating_add(finding.checked);
    }

    /// Mark the IP as not recommended. The first reason wins.
    pub fn disqualify(&mut self, reason: &str) {
        if self.verdict.reason.is_empty() {
            self.verdict.reason = reason.to_string();
        }
        self.verdict.recommend = false;
    }

    /// Percentage of answering blacklist engines that list the IP.
    pub fn blacklist_percentage(&self) -> u8 {
        if self.checked == 0 || self.listed == 0 {
            return 0;
        }
        let ratio = f64::from(self.listed) / f64::from(self.checked);
        (ratio * 100.0).round().min(100.0) as u8
    }

    /// Running fraud score clamped to 0-100.
    pub fn clamped_fraud_score(&self) -> u8 {
        self.fraud_score.clamp(0, 100) as u8
    }

    /// Clamp scores, compute percentages and hand out the verdict.
    pub fn finish(mut self) -> ReputationVerdict {
        self.verdict.trustable.fraud_score = self.clamped_fraud_score();
        self.verdict.trustable.blacklist = self.blacklist_percentage();
        self.verdict.trustable.total_server = self.checked;
        self.verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_verdict_defaults() {
        let verdict = ReputationVerdict::new("137.184.121.249");
        assert_eq!(verdict.query, "137.184.121.249");
        assert!(verdict.recommend);
        assert!(verdict.reason.is_empty());
        assert_eq!(verdict.trustable.reputation, Reputation::Unknown);
        assert_eq!(verdict.trustable.spam_email, "Unknown");
        assert_eq!(verdict.location.country_code, "Unknown");
        assert_eq!(verdict.dns.asname, "Unknown");
    }

    #[test]
    fn test_verdict_serialized_field_names() {
        let json = serde_json::to_value(ReputationVerdict::new("1.2.3.4")).unwrap();
        assert!(json["location"].get("countryCode").is_some());
        assert!(json["location"].get("regionName").is_some());
        assert!(json["dns"].get("as").is_some());
        assert_eq!(json["trustable"]["reputation"], "Unknown");
        assert_eq!(json["trustable"]["fraud_score"], 0);
    }

    #[test]
    fn test_reputation_from_mnemonic() {
        assert_eq!(Reputation::from_mnemonic("Trusted"), Reputation::Good);
        assert_eq!(Reputation::from_mnemonic("UNTRUSTED"), Reputation::Bad);
        assert_eq!(Reputation::from_mnemonic("unknown"), Reputation::Unknown);
        assert_eq!(Reputation::from_mnemonic("Neutral"), Reputation::Normal);
    }

    #[test]
    fn test_apply_only_raises_flags() {
        let mut assessment = Assessment::new("1.2.3.4");
        assessment.apply(Finding {
            proxy: true,
            ..Finding::default()
        });
        assessment.apply(Finding::default());
        assert!(assessment.verdict().trustable.proxy);
    }

    #[test]
    fn test_apply_keeps_highest_fraud_score() {
        let mut assessment = Assessment::new("1.2.3.4");
        assessment.apply(Finding::default().with_fraud_score(40));
        assessment.apply(Finding::default().with_fraud_score(12));
        assert_eq!(assessment.clamped_fraud_score(), 40);
    }

    #[test]
    fn test_fraud_score_clamped() {
        let mut assessment = Assessment::new("1.2.3.4");
        assert_eq!(assessment.clamped_fraud_score(), 0);

        assessment.apply(Finding::default().with_fraud_score(250));
        let verdict = assessment.finish();
        assert_eq!(verdict.trustable.fraud_score, 100);
    }

    #[test]
    fn test_blacklist_percentage() {
        let mut assessment = Assessment::new("1.2.3.4");
        assert_eq!(assessment.blacklist_percentage(), 0);

        assessment.apply(Finding::tally(0, 40));
        assert_eq!(assessment.blacklist_percentage(), 0);

        assessment.apply(Finding::listing(true));
        assessment.apply(Finding::listing(true));
        // 2 of 42
        assert_eq!(assessment.blacklist_percentage(), 5);

        let verdict = assessment.finish();
        assert_eq!(verdict.trustable.blacklist, 5);
        assert_eq!(verdict.trustable.total_server, 42);
    }

    #[test]
    fn test_tally_saturates() {
        let mut assessment = Assessment::new("1.2.3.4");
        assessment.apply(Finding::tally(0, u32::MAX));
        assessment.apply(Finding::listing(true));
        assessment.apply(Finding::tally(u32::MAX, 0));

        let verdict = assessment.finish();
        assert_eq!(verdict.trustable.total_server, u32::MAX);
        assert_eq!(verdict.trustable.blacklist, 100);
    }

    #[test]
    fn test_blacklist_percentage_rounds() {
        let mut assessment = Assessment::new("1.2.3.4");
        assessment.apply(Finding::tally(2, 3));
        assert_eq!(assessment.blacklist_percentage(), 67);
    }

    #[test]
    fn test_first_reason_wins() {
        let mut assessment = Assessment::new("1.2.3.4");
        assessment.disqualify(Gate::Proxy.reason());
        assessment.disqualify(Gate::Botnet.reason());
        assert!(assessment.is_disqualified());
        assert_eq!(assessment.verdict().reason, "This ip was marked as proxy");
    }

    #[test]
    fn test_fraud_gate_requires_score_mode() {
        let mut assessment = Assessment::new("1.2.3.4");
        assessment.apply(Finding::default().with_fraud_score(80));
        assert!(Gate::Fraudulent.is_tripped(&assessment, true));
        assert!(!Gate::Fraudulent.is_tripped(&assessment, false));
    }

    #[test]
    fn test_blacklisted_gate() {
        let mut assessment = Assessment::new("1.2.3.4");
        assessment.apply(Finding::tally(3, 4));
        assert!(Gate::Blacklisted.is_tripped(&assessment, false));
    }
}
