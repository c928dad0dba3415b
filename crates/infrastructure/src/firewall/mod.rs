//! Post-response packet-filter hook.
//!
//! Answers of allowlisted domains (from user-defined rule lists) are pushed
//! into a kernel nftables set so the firewall can route or exempt them. The
//! hook is advisory: entries travel through a bounded queue with drop-oldest
//! overflow, and every failure ends at a warn log, never at the client.

mod rules;

pub use rules::RuleSet;

use hickory_proto::rr::RData;
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tokio::sync::Notify;
use tracing::{debug, warn};
use warden_dns_application::ports::{QueryRecord, ResolvedHook};
use warden_dns_domain::FilterReason;

const QUEUE_CAPACITY: usize = 1000;

#[derive(Debug, Clone)]
pub struct PacketFilterConfig {
    pub family: String,
    pub table: String,
    pub set: String,
    /// nftables element timeout, e.g. "30m".
    pub timeout: String,
    /// Smallest filter-list id treated as user-defined.
    pub min_filter_id: i64,
}

impl Default for PacketFilterConfig {
    fn default() -> Self {
        PacketFilterConfig {
            family: "ip".to_string(),
            table: "gfw".to_string(),
            set: "temp".to_string(),
            timeout: "30m".to_string(),
            min_filter_id: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSetEntry {
    pub domain: String,
    pub ip: Ipv4Addr,
}

impl FilterSetEntry {
    fn key(&self) -> String {
        format!("{}/{}", self.domain, self.ip)
    }
}

/// Entries a record contributes to the packet-filter set: the A answers of a
/// non-filtered query that matched a user-defined allow rule.
pub fn filter_set_entries(record: &QueryRecord, min_filter_id: i64) -> Vec<FilterSetEntry> {
    if record.verdict.filtered
        || record.verdict.reason != FilterReason::NotFilteredAllowList
        || record.verdict.filter_id < min_filter_id
    {
        return Vec::new();
    }
    let Some(answer) = &record.answer else {
        return Vec::new();
    };

    answer
        .answers()
        .iter()
        .filter_map(|rr| match rr.data() {
            Some(RData::A(a)) => Some(FilterSetEntry {
                domain: rr.name().to_utf8().trim_end_matches('.').to_lowercase(),
                ip: a.0,
            }),
            _ => None,
        })
        .collect()
}

struct HookQueue {
    entries: Mutex<VecDeque<FilterSetEntry>>,
    notify: Notify,
}

pub struct PacketFilterHook {
    config: PacketFilterConfig,
    queue: Arc<HookQueue>,
    /// Keys currently sitting in the queue, so repeat answers do not pile up
    /// behind a slow `nft`.
    pending: RuleSet,
}

impl PacketFilterHook {
    /// Create the hook and spawn its worker task. Must be called from within
    /// a tokio runtime.
    pub fn new(config: PacketFilterConfig) -> Arc<Self> {
        let hook = Arc::new(PacketFilterHook {
            config,
            queue: Arc::new(HookQueue {
                entries: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
            }),
            pending: RuleSet::new(),
        });

        let worker = hook.clone();
        tokio::spawn(async move {
            worker.run_worker().await;
        });
        hook
    }

    fn enqueue(&self, entry: FilterSetEntry) {
        if !self.pending.insert(entry.key()) {
            return;
        }
        let mut entries = self.queue.entries.lock().unwrap();
        entries.push_back(entry);
        if entries.len() > QUEUE_CAPACITY {
            if let Some(dropped) = entries.pop_front() {
                self.pending.remove(&dropped.key());
                debug!(domain = %dropped.domain, "Packet-filter queue full, dropping oldest entry");
            }
        }
        drop(entries);
        self.queue.notify.notify_one();
    }

    async fn run_worker(&self) {
        loop {
            let entry = self.queue.entries.lock().unwrap().pop_front();
            match entry {
                Some(entry) => {
                    self.pending.remove(&entry.key());
                    self.apply(&entry).await;
                }
                None => self.queue.notify.notified().await,
            }
        }
    }

    async fn apply(&self, entry: &FilterSetEntry) {
        let ip = entry.ip.to_string();
        let result = Command::new("nft")
            .args(["add", "element", &self.config.family, &self.config.table, &self.config.set])
            .arg("{")
            .arg(&ip)
            .args(["timeout", &self.config.timeout, "}"])
            .output()
            .await;

        match result {
            Ok(output) if output.status.success() => {
                debug!(domain = %entry.domain, ip = %ip, "Inserted into packet-filter set");
            }
            Ok(output) => {
                warn!(
                    domain = %entry.domain,
                    ip = %ip,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "nft rejected the element"
                );
            }
            Err(e) => {
                warn!(domain = %entry.domain, ip = %ip, error = %e, "Could not run nft");
            }
        }
    }
}

impl ResolvedHook for PacketFilterHook {
    fn on_resolved(&self, record: &QueryRecord) {
        for entry in filter_set_entries(record, self.config.min_filter_id) {
            self.enqueue(entry);
        }
    }
}
