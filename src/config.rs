//! Configuration types for the IP filter.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::LazyLock;
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Global settings.
    #[serde(default)]
    pub settings: Settings,

    /// HTTP endpoint configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Provider API keys and accounts.
    #[serde(default)]
    pub credentials: Credentials,

    /// On/off switches for the keyless, scraped providers.
    #[serde(default)]
    pub providers: ProviderSwitches,
}

/// Global settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Per-request timeout in fast mode (milliseconds).
    #[serde(default = "default_fast_timeout")]
    pub fast_timeout_ms: u64,

    /// Per-request timeout otherwise (milliseconds).
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// How long a verdict stays cached.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,

    /// Upper bound on cached verdicts.
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    /// User agent sent to every provider.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Outbound proxy for provider requests ("host:port" or a full URL).
    #[serde(default)]
    pub proxy: Option<String>,

    /// Skip TLS certificate verification.
    #[serde(default = "default_true")]
    pub accept_invalid_certs: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fast_timeout_ms: default_fast_timeout(),
            timeout_ms: default_timeout(),
            cache_ttl_seconds: default_cache_ttl(),
            cache_max_entries: default_cache_max_entries(),
            user_agent: default_user_agent(),
            proxy: None,
            accept_invalid_certs: true,
        }
    }
}

impl Settings {
    /// Request timeout for the given mode.
    pub fn timeout(&self, fast: bool) -> Duration {
        if fast {
            Duration::from_millis(self.fast_timeout_ms)
        } else {
            Duration::from_millis(self.timeout_ms)
        }
    }

    /// Proxy URL with a scheme, if a proxy is configured.
    pub fn proxy_url(&self) -> Option<String> {
        let proxy = self.proxy.as_deref()?.trim();
        if proxy.is_empty() {
            return None;
        }
        if proxy.starts_with("http://") || proxy.starts_with("https://") {
            Some(proxy.to_string())
        } else {
            Some(format!("http://{}", proxy))
        }
    }
}

fn default_fast_timeout() -> u64 {
    3000
}

fn default_timeout() -> u64 {
    10000
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_cache_max_entries() -> usize {
    10000
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Safari/537.36".to_string()
}

/// HTTP endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// How to find the caller's IP when the request body has none.
    #[serde(default)]
    pub ip_extraction: IpExtractionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            ip_extraction: IpExtractionConfig::default(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

/// IP extraction configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IpExtractionConfig {
    /// Headers to check for client IP, in order of preference.
    #[serde(default = "default_ip_headers")]
    pub headers: Vec<String>,

    /// Use first IP from X-Forwarded-For (true) or last IP (false).
    #[serde(default = "default_true")]
    pub use_first_ip: bool,
}

impl Default for IpExtractionConfig {
    fn default() -> Self {
        Self {
            headers: default_ip_headers(),
            use_first_ip: true,
        }
    }
}

fn default_ip_headers() -> Vec<String> {
    vec![
        "x-forwarded-for".to_string(),
        "x-real-ip".to_string(),
        "cf-connecting-ip".to_string(),
    ]
}

/// Provider credentials. An empty key disables the provider.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Credentials {
    /// ip-api.com pro key. Empty uses the free endpoint.
    #[serde(default)]
    pub ip_api: String,

    #[serde(default)]
    pub maxmind: MaxmindCredentials,

    #[serde(default)]
    pub apivoid: String,

    #[serde(default)]
    pub cleantalk: String,

    #[serde(default)]
    pub iphub: String,

    #[serde(default)]
    pub ipqualityscore: String,

    /// Contact address getipintel requires on every query.
    #[serde(default)]
    pub getipintel_contact: String,
}

/// MaxMind minFraud account.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MaxmindCredentials {
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub license: String,
}

impl MaxmindCredentials {
    /// Both halves of the account are present.
    pub fn is_complete(&self) -> bool {
        !self.account.is_empty() && !self.license.is_empty()
    }
}

/// Switches for the providers that need no key.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderSwitches {
    #[serde(default = "default_true")]
    pub barracudacentral: bool,
    #[serde(default = "default_true")]
    pub getipintel: bool,
    #[serde(default = "default_true")]
    pub easydmarc: bool,
    #[serde(default = "default_true")]
    pub valli: bool,
    #[serde(default = "default_true")]
    pub uceprotect: bool,
    #[serde(default = "default_true")]
    pub projecthoneypot: bool,
    #[serde(default = "default_true")]
    pub team_cymru: bool,
    #[serde(default = "default_true")]
    pub fortiguard: bool,
    #[serde(default = "default_true")]
    pub talosintelligence: bool,
    #[serde(default = "default_true")]
    pub scamalytics: bool,
}

impl Default for ProviderSwitches {
    fn default() -> Self {
        Self::all(true)
    }
}

impl ProviderSwitches {
    /// Every switch set to `on`.
    pub fn all(on: bool) -> Self {
        Self {
            barracudacentral: on,
            getipintel: on,
            easydmarc: on,
            valli: on,
            uceprotect: on,
            projecthoneypot: on,
            team_cymru: on,
            fortiguard: on,
            talosintelligence: on,
            scamalytics: on,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let expanded = expand_env_vars(&content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from `IP_FILTER_*` environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self::from_lookup(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let key = |name: &str| lookup(name).map(|v| v.trim().to_string()).unwrap_or_default();
        let switch = |name: &str| match lookup(name) {
            Some(value) => {
                let value = value.trim();
                !value.is_empty() && !value.eq_ignore_ascii_case("off")
            }
            None => true,
        };

        let mut config = Config::default();
        if let Some(listen) = lookup("IP_FILTER_LISTEN") {
            config.server.listen = listen;
        }
        if let Some(proxy) = lookup("IP_FILTER_PROXY") {
            config.settings.proxy = Some(proxy);
        }

        config.credentials = Credentials {
            ip_api: key("IP_FILTER_IP_API"),
            maxmind: MaxmindCredentials {
                account: key("IP_FILTER_MAXMIND_ACCOUNT"),
                license: key("IP_FILTER_MAXMIND_LICENSE"),
            },
            apivoid: key("IP_FILTER_APIVOID_KEY"),
            cleantalk: key("IP_FILTER_CLEANTALK_KEY"),
            iphub: key("IP_FILTER_IPHUB_KEY"),
            ipqualityscore: key("IP_FILTER_IPQUALITYSCORE_KEY"),
            getipintel_contact: key("IP_FILTER_GETIPINTEL_CONTACT"),
        };

        config.providers = ProviderSwitches {
            barracudacentral: switch("IP_FILTER_BARRACUDACENTRAL"),
            getipintel: switch("IP_FILTER_GETIPINTEL"),
            easydmarc: switch("IP_FILTER_EASYDMARC"),
            valli: switch("IP_FILTER_VALLI"),
            uceprotect: switch("IP_FILTER_UCEPROTECT"),
            projecthoneypot: switch("IP_FILTER_PROJECTHONEYPOT"),
            team_cymru: switch("IP_FILTER_TEAM_CYMRU"),
            fortiguard: switch("IP_FILTER_FORTIGUARD"),
            talosintelligence: switch("IP_FILTER_TALOSINTELLIGENCE"),
            scamalytics: switch("IP_FILTER_SCAMALYTICS"),
        };

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.settings.fast_timeout_ms == 0 || self.settings.timeout_ms == 0 {
            anyhow::bail!("timeouts must be greater than zero");
        }

        if self.settings.cache_max_entries == 0 {
            anyhow::bail!("cache_max_entries must be greater than zero");
        }

        if self.server.listen.parse::<SocketAddr>().is_err() {
            anyhow::bail!("Invalid listen address: {}", self.server.listen);
        }

        let maxmind = &self.credentials.maxmind;
        if maxmind.account.is_empty() != maxmind.license.is_empty() {
            anyhow::bail!("MaxMind needs both account and license");
        }

        Ok(())
    }

    /// Generate example configuration YAML.
    pub fn example() -> String {
        r#"# IP Filter Configuration

settings:
  fast_timeout_ms: 3000        # Per-request timeout in fast mode
  timeout_ms: 10000            # Per-request timeout otherwise
  cache_ttl_seconds: 3600      # Cache verdicts for 1 hour
  cache_max_entries: 10000
  # proxy: "127.0.0.1:3128"    # Outbound proxy for provider requests
  accept_invalid_certs: true

server:
  listen: "127.0.0.1:8080"
  ip_extraction:               # Used when the request body has no ip
    headers:
      - "x-forwarded-for"
      - "x-real-ip"
      - "cf-connecting-ip"
    use_first_ip: true

# Keyed providers are skipped while their key is empty
credentials:
  ip_api: "${IP_FILTER_IP_API}"              # Empty uses the free endpoint
  maxmind:
    account: "${IP_FILTER_MAXMIND_ACCOUNT}"
    license: "${IP_FILTER_MAXMIND_LICENSE}"
  apivoid: "${IP_FILTER_APIVOID_KEY}"
  cleantalk: "${IP_FILTER_CLEANTALK_KEY}"
  iphub: "${IP_FILTER_IPHUB_KEY}"
  ipqualityscore: "${IP_FILTER_IPQUALITYSCORE_KEY}"
  getipintel_contact: "admin@example.com"

# Scraped providers, on by default
providers:
  barracudacentral: true
  getipintel: true
  easydmarc: true
  valli: true
  uceprotect: true
  projecthoneypot: true
  team_cymru: true
  fortiguard: true
  talosintelligence: true
  scamalytics: true
"#
        .to_string()
    }
}

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid"));

/// Expand environment variables in the format ${VAR_NAME}.
fn expand_env_vars(content: &str) -> String {
    ENV_VAR
        .replace_all(content, |caps: &Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}
