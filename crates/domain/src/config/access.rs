use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AccessConfig {
    /// When non-empty, only these clients (addresses or CIDRs) are served.
    #[serde(default)]
    pub allowed_clients: Vec<String>,

    #[serde(default)]
    pub disallowed_clients: Vec<String>,

    /// Names refused outright, before any filtering runs.
    #[serde(default)]
    pub blocked_hosts: Vec<String>,
}
