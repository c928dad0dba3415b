use super::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr};

/// How a blocked query is answered.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockingMode {
    /// Rule-supplied address when present, NXDOMAIN otherwise.
    #[default]
    Default,
    /// Unspecified address (0.0.0.0 / ::).
    NullIp,
    /// Operator-configured address pair.
    CustomIp,
    /// Always NXDOMAIN.
    Nxdomain,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlockingConfig {
    /// Master switch for all request/response filtering.
    #[serde(default = "default_true")]
    pub protection_enabled: bool,

    #[serde(default)]
    pub mode: BlockingMode,

    /// Required (both) when `mode = "custom_ip"`.
    #[serde(default)]
    pub blocking_ipv4: Option<Ipv4Addr>,

    #[serde(default)]
    pub blocking_ipv6: Option<Ipv6Addr>,

    /// TTL stamped on synthesized answers.
    #[serde(default = "default_blocked_response_ttl")]
    pub blocked_response_ttl: u32,

    /// Substitution host for safe-browsing matches.
    #[serde(default = "default_safe_browsing_host")]
    pub safe_browsing_block_host: String,

    /// Substitution host for parental-control matches.
    #[serde(default = "default_parental_host")]
    pub parental_block_host: String,

    /// Smallest filter-list id considered user-defined (smaller ids are
    /// system lists and never reach the post-response hook).
    #[serde(default = "default_user_filter_id_min")]
    pub user_filter_id_min: i64,
}

impl BlockingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mode == BlockingMode::CustomIp
            && (self.blocking_ipv4.is_none() || self.blocking_ipv6.is_none())
        {
            return Err(ConfigError::Validation(
                "blocking_mode custom_ip requires both blocking_ipv4 and blocking_ipv6"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            protection_enabled: true,
            mode: BlockingMode::Default,
            blocking_ipv4: None,
            blocking_ipv6: None,
            blocked_response_ttl: default_blocked_response_ttl(),
            safe_browsing_block_host: default_safe_browsing_host(),
            parental_block_host: default_parental_host(),
            user_filter_id_min: default_user_filter_id_min(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_blocked_response_ttl() -> u32 {
    10
}

fn default_safe_browsing_host() -> String {
    "standard-block.dns.adguard.com".to_string()
}

fn default_parental_host() -> String {
    "family-block.dns.adguard.com".to_string()
}

fn default_user_filter_id_min() -> i64 {
    10
}
