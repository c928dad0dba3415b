use serde::{Deserialize, Serialize};

/// Packet-filter hook settings: answers of allowlisted domains are inserted
/// into this nftables set after the response is sent.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FirewallConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_family")]
    pub family: String,

    #[serde(default = "default_table")]
    pub table: String,

    #[serde(default = "default_set")]
    pub set: String,

    /// Element timeout handed to nft, e.g. "30m".
    #[serde(default = "default_timeout")]
    pub timeout: String,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            family: default_family(),
            table: default_table(),
            set: default_set(),
            timeout: default_timeout(),
        }
    }
}

fn default_family() -> String {
    "ip".to_string()
}

fn default_table() -> String {
    "gfw".to_string()
}

fn default_set() -> String {
    "temp".to_string()
}

fn default_timeout() -> String {
    "30m".to_string()
}
