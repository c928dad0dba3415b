use serde::{Deserialize, Serialize};
use std::net::IpAddr;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EdnsClientSubnetConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Source address advertised to upstreams. When unset, a fixed public
    /// default is used so upstream answers stay location-stable.
    #[serde(default)]
    pub source: Option<IpAddr>,
}

impl Default for EdnsClientSubnetConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            source: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DnsConfig {
    /// Upstream endpoints; supports `udp://`, `tcp://`, plain addresses, and
    /// the reserved-domain form `[/example.org/]addr`.
    #[serde(default)]
    pub upstream_dns: Vec<String>,

    /// Plain resolvers used to resolve hostname-form upstream endpoints.
    #[serde(default)]
    pub bootstrap_dns: Vec<String>,

    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Short-circuit AAAA queries with an empty answer.
    #[serde(default)]
    pub aaaa_disabled: bool,

    /// Suppress query-log entries for ANY queries.
    #[serde(default)]
    pub refuse_any: bool,

    /// Request DNSSEC records from upstreams; strip signatures the client
    /// did not ask for.
    #[serde(default)]
    pub enable_dnssec: bool,

    #[serde(default)]
    pub edns_client_subnet: EdnsClientSubnetConfig,

    /// Queries per second per client; 0 disables rate limiting.
    #[serde(default)]
    pub ratelimit: u32,

    /// Clients exempt from rate limiting (addresses or CIDRs).
    #[serde(default)]
    pub ratelimit_whitelist: Vec<String>,

    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            upstream_dns: vec![],
            bootstrap_dns: vec![],
            query_timeout_ms: default_query_timeout_ms(),
            aaaa_disabled: false,
            refuse_any: false,
            enable_dnssec: false,
            edns_client_subnet: EdnsClientSubnetConfig::default(),
            ratelimit: 0,
            ratelimit_whitelist: vec![],
            cache_enabled: true,
            cache_size: default_cache_size(),
        }
    }
}

fn default_query_timeout_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_cache_size() -> usize {
    4096
}
