//! IP Filter.
//!
//! Checks an IP address against geolocation, blacklist and fraud-scoring
//! services and folds their answers into a single trust verdict.
//!
//! # Features
//!
//! - **Geolocation** - Location, ISP and mobile/proxy/hosting flags from ip-api
//! - **Fraud Scores** - MaxMind minFraud, APIVoid, CleanTalk and Scamalytics
//! - **Blacklists** - Running listed/checked tally over public RBL tools
//! - **Proxy & Tor Detection** - IPHub, IPQualityScore and Team Cymru
//! - **Fast Mode** - Stop at the first disqualifying signal
//! - **Caching** - Verdicts cached per (ip, fast, score) for one hour
//!
//! # Example Configuration
//!
//! ```yaml
//! settings:
//!   fast_timeout_ms: 3000
//!   timeout_ms: 10000
//!
//! credentials:
//!   apivoid: "${IP_FILTER_APIVOID_KEY}"
//!   iphub: "${IP_FILTER_IPHUB_KEY}"
//!
//! providers:
//!   valli: false
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod providers;
pub mod server;
pub mod text;
pub mod verdict;

pub use config::Config;
pub use engine::IpFilter;
pub use verdict::ReputationVerdict;
