use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;

/// Identifies why the filter engine matched (or passed) a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FilterReason {
    /// No rule matched; the query goes through untouched.
    #[default]
    NotFilteredNotFound,
    /// An allow rule matched; the query is explicitly exempt from filtering.
    NotFilteredAllowList,
    /// A deny rule matched.
    FilteredBlockList,
    /// The safe-browsing category matched; answers are substituted.
    FilteredSafeBrowsing,
    /// The parental-control category matched; answers are substituted.
    FilteredParental,
    /// A search engine is forced onto its safe endpoint.
    FilteredSafeSearch,
    /// The query is malformed beyond repair.
    FilteredInvalid,
    /// A blocked-service rule matched.
    FilteredBlockedService,
    /// A user rewrite rule matched (CNAME and/or fixed addresses).
    Rewrite,
    /// A hosts-table entry matched (address or PTR).
    RewriteHosts,
}

impl FilterReason {
    pub fn to_str(&self) -> &'static str {
        match self {
            FilterReason::NotFilteredNotFound => "not_filtered_not_found",
            FilterReason::NotFilteredAllowList => "not_filtered_allow_list",
            FilterReason::FilteredBlockList => "filtered_block_list",
            FilterReason::FilteredSafeBrowsing => "filtered_safe_browsing",
            FilterReason::FilteredParental => "filtered_parental",
            FilterReason::FilteredSafeSearch => "filtered_safe_search",
            FilterReason::FilteredInvalid => "filtered_invalid",
            FilterReason::FilteredBlockedService => "filtered_blocked_service",
            FilterReason::Rewrite => "rewrite",
            FilterReason::RewriteHosts => "rewrite_hosts",
        }
    }
}

impl std::fmt::Display for FilterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

/// Structured outcome of a filter engine check for one host.
///
/// `filtered` means the query must not reach upstream as-is; the remaining
/// fields carry whatever the matched rule needs the forwarder to know
/// (substitution addresses, a canonical name, a PTR target).
#[derive(Debug, Clone, Default)]
pub struct FilterVerdict {
    pub filtered: bool,
    pub reason: FilterReason,
    /// Text of the matched rule, if any.
    pub rule: Option<Arc<str>>,
    /// Identifier of the rule list the match came from.
    pub filter_id: i64,
    /// Addresses carried by rewrite rules.
    pub ip_list: Vec<IpAddr>,
    /// Canonical name carried by CNAME rewrite rules.
    pub canon_name: Option<String>,
    /// PTR target carried by hosts-table reverse entries.
    pub reverse_host: Option<String>,
    /// Single address carried by blocking rules that pin one.
    pub ip: Option<IpAddr>,
}

impl FilterVerdict {
    /// A verdict that blocks the query outright.
    pub fn block(reason: FilterReason, rule: impl Into<Arc<str>>, filter_id: i64) -> Self {
        FilterVerdict {
            filtered: true,
            reason,
            rule: Some(rule.into()),
            filter_id,
            ..FilterVerdict::default()
        }
    }

    /// A verdict that passes the query through because an allow rule matched.
    pub fn allow(rule: impl Into<Arc<str>>, filter_id: i64) -> Self {
        FilterVerdict {
            filtered: false,
            reason: FilterReason::NotFilteredAllowList,
            rule: Some(rule.into()),
            filter_id,
            ..FilterVerdict::default()
        }
    }

    /// A rewrite verdict carrying fixed answers and/or a canonical name.
    pub fn rewrite(ip_list: Vec<IpAddr>, canon_name: Option<String>) -> Self {
        FilterVerdict {
            filtered: false,
            reason: FilterReason::Rewrite,
            ip_list,
            canon_name,
            ..FilterVerdict::default()
        }
    }
}

/// Per-client snapshot of which filtering layers apply to one request.
///
/// Built from the engine defaults and overlaid by the per-client hook before
/// the pipeline runs; immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct RequestFilterSettings {
    pub filtering_enabled: bool,
    pub safe_search_enabled: bool,
    pub safe_browsing_enabled: bool,
    pub parental_enabled: bool,
    pub blocked_services: Vec<Arc<str>>,
}
