//! IPHub proxy detection provider.

use super::{HttpClient, Probe, ProviderError, ReputationProvider};
use crate::verdict::{Finding, Gate};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct IpHubResponse {
    /// 0 = residential, 1 = non-residential (proxy/hosting), 2 = mixed.
    block: i64,
}

/// Non-residential IP detection from IPHub.
pub struct IpHubProvider {
    http: HttpClient,
    api_key: String,
}

impl IpHubProvider {
    pub fn new(http: HttpClient, api_key: String) -> Self {
        Self { http, api_key }
    }
}

fn assess(response: IpHubResponse) -> Finding {
    Finding {
        proxy: response.block == 1,
        ..Finding::default()
    }
}

#[async_trait]
impl ReputationProvider for IpHubProvider {
    async fn inspect(&self, probe: &Probe) -> Result<Finding, ProviderError> {
        debug!(ip = %probe.ip, "Querying IPHub");
        let url = format!("http://v2.api.iphub.info/ip/{}", probe.ip);
        let request = self.http.get(&url).header("X-Key", &self.api_key);
        let response: IpHubResponse = self.http.json(request, probe.timeout).await?;
        Ok(assess(response))
    }

    fn name(&self) -> &str {
        "iphub"
    }

    fn is_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn gates(&self) -> &[Gate] {
        &[Gate::Proxy]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::parse_json;

    #[test]
    fn test_block_levels() {
        let hosting = r#"{"ip": "1.2.3.4", "countryCode": "US", "asn": 14061, "block": 1}"#;
        assert!(assess(parse_json(hosting).unwrap()).proxy);

        let mixed = r#"{"ip": "1.2.3.4", "block": 2}"#;
        assert!(!assess(parse_json(mixed).unwrap()).proxy);

        let residential = r#"{"ip": "1.2.3.4", "block": 0}"#;
        assert!(!assess(parse_json(residential).unwrap()).proxy);
    }
}
