//! ip-api.com geolocation provider.

use super::{or_unknown, HttpClient, Probe, ProviderError, ReputationProvider};
use crate::verdict::{Dns, Finding, Gate, Location};
use async_trait::async_trait;
use serde::Deserialize;
use std::net::Ipv4Addr;
use tracing::debug;

const FIELDS: &str = "status,message,continent,continentCode,country,countryCode,countryCode3,region,regionName,city,district,zip,lat,lon,timezone,offset,currentTime,currency,callingCode,isp,org,as,asname,reverse,mobile,proxy,hosting,query";

/// ip-api.com response.
#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(rename = "countryCode", default)]
    country_code: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(rename = "regionName", default)]
    region_name: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    zip: Option<String>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    timezone: Option<String>,
    #[serde(default)]
    isp: Option<String>,
    #[serde(default)]
    org: Option<String>,
    #[serde(rename = "as", default)]
    asn: Option<String>,
    #[serde(default)]
    asname: Option<String>,
    #[serde(default)]
    mobile: bool,
    #[serde(default)]
    proxy: bool,
    #[serde(default)]
    hosting: bool,
}

/// Geolocation, ISP and proxy/hosting flags from ip-api.com.
///
/// Uses the pro endpoint when a key is configured, the free one otherwise.
pub struct IpApiProvider {
    http: HttpClient,
    api_key: String,
}

impl IpApiProvider {
    pub fn new(http: HttpClient, api_key: String) -> Self {
        Self { http, api_key }
    }

    fn url(&self, ip: &Ipv4Addr) -> String {
        if self.api_key.is_empty() {
            format!("http://ip-api.com/json/{}?fields={}", ip, FIELDS)
        } else {
            format!(
                "https://pro.ip-api.com/json/{}?fields={}&key={}",
                ip, FIELDS, self.api_key
            )
        }
    }
}

fn assess(response: IpApiResponse) -> Result<Finding, ProviderError> {
    if response.status != "success" {
        return Err(ProviderError::InvalidResponse(format!(
            "ip-api status {}: {}",
            response.status,
            response.message.unwrap_or_default()
        )));
    }

    let location = Location {
        country: or_unknown(response.country),
        country_code: or_unknown(response.country_code),
        region: or_unknown(response.region),
        region_name: or_unknown(response.region_name),
        city: or_unknown(response.city),
        zip: or_unknown(response.zip),
        lat: or_unknown(response.lat.map(|v| v.to_string())),
        lon: or_unknown(response.lon.map(|v| v.to_string())),
        timezone: or_unknown(response.timezone),
    };

    let dns = Dns {
        isp: or_unknown(response.isp),
        org: or_unknown(response.org),
        asn: or_unknown(response.asn),
        asname: or_unknown(response.asname),
    };

    Ok(Finding {
        location: Some(location),
        dns: Some(dns),
        mobile: response.mobile,
        proxy: response.proxy || response.hosting,
        hosting: response.hosting,
        ..Finding::default()
    })
}

#[async_trait]
impl ReputationProvider for IpApiProvider {
    async fn inspect(&self, probe: &Probe) -> Result<Finding, ProviderError> {
        debug!(ip = %probe.ip, pro = !self.api_key.is_empty(), "Querying ip-api");
        let request = self.http.get(&self.url(&probe.ip));
        let response: IpApiResponse = self.http.json(request, probe.timeout).await?;
        assess(response)
    }

    fn name(&self) -> &str {
        "ip-api"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn gates(&self) -> &[Gate] {
        &[Gate::Proxy]
    }
}
