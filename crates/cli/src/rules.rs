//! Table-driven filter engine backed by the `[rules]` config section.
//!
//! This is deliberately small: exact and subdomain matches over operator
//! lists, plus address/CNAME rewrites. Deployments with real rule feeds
//! replace it behind the `FilterEngine` port.

use hickory_proto::rr::RecordType;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use warden_dns_application::ports::FilterEngine;
use warden_dns_domain::{
    DomainError, FilterReason, FilterVerdict, RequestFilterSettings, RulesConfig,
};

/// Rule-list id reported for operator rules. They are user-defined by
/// definition, so the id sits above the default system-list threshold.
const OPERATOR_RULES_FILTER_ID: i64 = 10;

#[derive(Debug, Clone)]
enum RewriteTarget {
    Address(IpAddr),
    CanonicalName(String),
}

pub struct TableFilterEngine {
    block: HashSet<String>,
    allow: HashSet<String>,
    safe_browsing: HashSet<String>,
    parental: HashSet<String>,
    rewrites: HashMap<String, RewriteTarget>,
}

impl TableFilterEngine {
    pub fn from_config(rules: &RulesConfig) -> Self {
        let normalize =
            |entries: &[String]| entries.iter().map(|e| e.to_lowercase()).collect::<HashSet<_>>();

        let rewrites = rules
            .rewrites
            .iter()
            .map(|rule| {
                let target = match rule.answer.parse::<IpAddr>() {
                    Ok(ip) => RewriteTarget::Address(ip),
                    Err(_) => RewriteTarget::CanonicalName(rule.answer.clone()),
                };
                (rule.domain.to_lowercase(), target)
            })
            .collect();

        TableFilterEngine {
            block: normalize(&rules.block),
            allow: normalize(&rules.allow),
            safe_browsing: normalize(&rules.safe_browsing),
            parental: normalize(&rules.parental),
            rewrites,
        }
    }

    /// Exact or subdomain match of `host` against `entries`.
    fn matched_entry<'a>(host: &str, entries: &'a HashSet<String>) -> Option<&'a str> {
        if let Some(entry) = entries.get(host) {
            return Some(entry.as_str());
        }
        let mut rest = host;
        while let Some((_, parent)) = rest.split_once('.') {
            if let Some(entry) = entries.get(parent) {
                return Some(entry.as_str());
            }
            rest = parent;
        }
        None
    }
}

impl FilterEngine for TableFilterEngine {
    fn default_settings(&self) -> RequestFilterSettings {
        RequestFilterSettings {
            filtering_enabled: true,
            safe_search_enabled: false,
            safe_browsing_enabled: true,
            parental_enabled: true,
            blocked_services: Vec::new(),
        }
    }

    fn check_host(
        &self,
        host: &str,
        qtype: RecordType,
        settings: &RequestFilterSettings,
    ) -> Result<FilterVerdict, DomainError> {
        let verdict = self.check_host_rules(host, qtype, settings)?;
        if verdict.reason != FilterReason::NotFilteredNotFound {
            return Ok(verdict);
        }

        let host = host.to_lowercase();
        if settings.safe_browsing_enabled {
            if let Some(entry) = Self::matched_entry(&host, &self.safe_browsing) {
                return Ok(FilterVerdict::block(
                    FilterReason::FilteredSafeBrowsing,
                    entry.to_string(),
                    OPERATOR_RULES_FILTER_ID,
                ));
            }
        }
        if settings.parental_enabled {
            if let Some(entry) = Self::matched_entry(&host, &self.parental) {
                return Ok(FilterVerdict::block(
                    FilterReason::FilteredParental,
                    entry.to_string(),
                    OPERATOR_RULES_FILTER_ID,
                ));
            }
        }

        Ok(FilterVerdict::default())
    }

    fn check_host_rules(
        &self,
        host: &str,
        _qtype: RecordType,
        settings: &RequestFilterSettings,
    ) -> Result<FilterVerdict, DomainError> {
        if !settings.filtering_enabled {
            return Ok(FilterVerdict::default());
        }
        let host = host.to_lowercase();

        if let Some(entry) = Self::matched_entry(&host, &self.allow) {
            return Ok(FilterVerdict::allow(
                entry.to_string(),
                OPERATOR_RULES_FILTER_ID,
            ));
        }
        if let Some(entry) = Self::matched_entry(&host, &self.block) {
            return Ok(FilterVerdict::block(
                FilterReason::FilteredBlockList,
                entry.to_string(),
                OPERATOR_RULES_FILTER_ID,
            ));
        }
        if let Some(target) = self.rewrites.get(&host) {
            let verdict = match target {
                RewriteTarget::Address(ip) => FilterVerdict::rewrite(vec![*ip], None),
                RewriteTarget::CanonicalName(canon) => {
                    FilterVerdict::rewrite(Vec::new(), Some(canon.clone()))
                }
            };
            return Ok(verdict);
        }

        Ok(FilterVerdict::default())
    }
}
