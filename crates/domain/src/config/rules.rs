use serde::{Deserialize, Serialize};

/// A user rewrite rule: `domain` answered with `answer`, which is either an
/// IP address or a canonical name.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RewriteRule {
    pub domain: String,
    pub answer: String,
}

/// Rule tables consumed by the default (table-driven) filter engine shipped
/// with the binary. A real deployment replaces that engine wholesale, at
/// which point this section is simply unused.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RulesConfig {
    #[serde(default)]
    pub block: Vec<String>,

    #[serde(default)]
    pub allow: Vec<String>,

    #[serde(default)]
    pub safe_browsing: Vec<String>,

    #[serde(default)]
    pub parental: Vec<String>,

    #[serde(default)]
    pub rewrites: Vec<RewriteRule>,
}
