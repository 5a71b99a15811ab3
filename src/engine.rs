//! IP filter: polls every provider in turn and folds the answers into a verdict.

use crate::cache::{cache_key, VerdictCache};
use crate::config::Config;
use crate::providers::apivoid::ApiVoidProvider;
use crate::providers::blacklists::{
    BarracudaProvider, EasyDmarcProvider, GetIpIntelProvider, ProjectHoneypotProvider,
    UceProtectProvider, ValliProvider,
};
use crate::providers::cleantalk::CleanTalkProvider;
use crate::providers::ip_api::IpApiProvider;
use crate::providers::iphub::IpHubProvider;
use crate::providers::ipqualityscore::IpQualityScoreProvider;
use crate::providers::maxmind::MaxmindProvider;
use crate::providers::team_cymru::TeamCymruProvider;
use crate::providers::threat_intel::{FortiGuardProvider, ScamalyticsProvider, TalosProvider};
use crate::providers::{HttpClient, Probe, ReputationProvider};
use crate::verdict::{Assessment, Gate, ReputationVerdict, INVALID_IP_REASON};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Checks evaluated once every provider has answered.
const FINAL_GATES: [Gate; 2] = [Gate::Fraudulent, Gate::Blacklisted];

/// How often expired verdicts are purged from the cache.
pub const CACHE_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// IP filter.
pub struct IpFilter {
    config: Arc<Config>,
    providers: Vec<Box<dyn ReputationProvider>>,
    cache: VerdictCache,
}

impl IpFilter {
    /// Create a filter with every provider the configuration enables.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http = HttpClient::new(&config.settings)?;
        let providers = default_providers(&config, &http);
        Ok(Self::with_providers(config, providers))
    }

    /// Create a filter polling exactly `providers`, in order.
    pub fn with_providers(config: Config, providers: Vec<Box<dyn ReputationProvider>>) -> Self {
        let cache = VerdictCache::new(
            config.settings.cache_ttl_seconds,
            config.settings.cache_max_entries,
        );

        let enabled: Vec<&str> = providers
            .iter()
            .filter(|p| p.is_enabled())
            .map(|p| p.name())
            .collect();
        info!(
            providers = enabled.len(),
            names = ?enabled,
            "IP filter initialized"
        );

        Self {
            config: Arc::new(config),
            providers,
            cache,
        }
    }

    /// Assess `ip`, serving repeated lookups from the cache.
    pub async fn validate(&self, ip: &str, fast: bool, score: bool) -> ReputationVerdict {
        let key = cache_key(&normalize(ip), fast, score);
        if let Some(verdict) = self.cache.get(&key) {
            debug!(ip = %verdict.query, "Verdict served from cache");
            return verdict;
        }

        let verdict = self.handle(ip, fast, score).await;
        self.cache.set(key, verdict.clone());
        verdict
    }

    /// Assess `ip` against every enabled provider.
    ///
    /// In fast mode the first tripped gate ends the lookup. Otherwise every
    /// provider is polled and the first tripped gate only sets the reason.
    /// Provider failures are logged and skipped.
    pub async fn handle(&self, ip: &str, fast: bool, score: bool) -> ReputationVerdict {
        let query = normalize(ip);
        let mut assessment = Assessment::new(&query);

        let Ok(addr) = query.parse::<Ipv4Addr>() else {
            debug!(ip = %query, "Rejecting malformed ip");
            assessment.disqualify(INVALID_IP_REASON);
            return assessment.finish();
        };

        let probe = Probe {
            ip: addr,
            timeout: self.config.settings.timeout(fast),
        };

        for provider in &self.providers {
            if !provider.is_enabled() || (provider.score_only() && !score) {
                continue;
            }

            let started = Instant::now();
            match provider.inspect(&probe).await {
                Ok(finding) => {
                    debug!(
                        provider = provider.name(),
                        ip = %addr,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Provider lookup complete"
                    );
                    assessment.apply(finding);
                }
                Err(e) => {
                    warn!(
                        provider = provider.name(),
                        error = %e,
                        ip = %addr,
                        "Provider lookup failed"
                    );
                    continue;
                }
            }

            let tripped = provider
                .gates()
                .iter()
                .find(|gate| gate.is_tripped(&assessment, score));
            if let Some(gate) = tripped {
                assessment.disqualify(gate.reason());
                if fast {
                    info!(
                        ip = %addr,
                        provider = provider.name(),
                        reason = gate.reason(),
                        "Stopping early"
                    );
                    return assessment.finish();
                }
            }
        }

        for gate in FINAL_GATES {
            if gate.is_tripped(&assessment, score) {
                assessment.disqualify(gate.reason());
            }
        }

        let verdict = assessment.finish();
        info!(
            ip = %verdict.query,
            recommend = verdict.recommend,
            reason = %verdict.reason,
            fraud_score = verdict.trustable.fraud_score,
            blacklist = verdict.trustable.blacklist,
            "IP assessed"
        );
        verdict
    }

    /// Number of cached verdicts.
    pub fn cached_verdicts(&self) -> usize {
        self.cache.len()
    }

    /// Drop expired verdicts from the cache.
    pub fn purge_expired(&self) {
        if self.cache.is_empty() {
            return;
        }
        let before = self.cache.len();
        self.cache.cleanup();
        debug!(
            removed = before.saturating_sub(self.cache.len()),
            "Purged expired verdicts"
        );
    }

    /// Purge expired verdicts every `every` until the filter is dropped.
    pub fn spawn_cache_cleanup(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let filter = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(filter) = filter.upgrade() else {
                    break;
                };
                filter.purge_expired();
            }
        })
    }
}

/// Trim and lowercase the raw input.
fn normalize(ip: &str) -> String {
    ip.trim().to_lowercase()
}

/// All providers, in polling order.
fn default_providers(config: &Config, http: &HttpClient) -> Vec<Box<dyn ReputationProvider>> {
    let credentials = &config.credentials;
    let switches = &config.providers;

    vec![
        Box::new(IpApiProvider::new(http.clone(), credentials.ip_api.clone()))
            as Box<dyn ReputationProvider>,
        Box::new(MaxmindProvider::new(http.clone(), credentials.maxmind.clone())),
        Box::new(ApiVoidProvider::new(http.clone(), credentials.apivoid.clone())),
        Box::new(BarracudaProvider::new(http.clone(), switches.barracudacentral)),
        Box::new(GetIpIntelProvider::new(
            http.clone(),
            switches.getipintel,
            credentials.getipintel_contact.clone(),
        )),
        Box::new(EasyDmarcProvider::new(http.clone(), switches.easydmarc)),
        Box::new(ValliProvider::new(http.clone(), switches.valli)),
        Box::new(UceProtectProvider::new(http.clone(), switches.uceprotect)),
        Box::new(ProjectHoneypotProvider::new(http.clone(), switches.projecthoneypot)),
        Box::new(TeamCymruProvider::new(http.clone(), switches.team_cymru)),
        Box::new(FortiGuardProvider::new(http.clone(), switches.fortiguard)),
        Box::new(TalosProvider::new(http.clone(), switches.talosintelligence)),
        Box::new(ScamalyticsProvider::new(http.clone(), switches.scamalytics)),
        Box::new(CleanTalkProvider::new(http.clone(), credentials.cleantalk.clone())),
        Box::new(IpHubProvider::new(http.clone(), credentials.iphub.clone())),
        Box::new(IpQualityScoreProvider::new(
            http.clone(),
            credentials.ipqualityscore.clone(),
        )),
    ]
}
