#![allow(dead_code)]

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::dnssec::rdata::{DNSSECRData, RRSIG};
use hickory_proto::rr::dnssec::Algorithm;
use hickory_proto::rr::rdata::{AAAA, CNAME, NS, A};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use warden_dns_domain::{DomainError, FilterVerdict, RequestFilterSettings, StatsEntry};

use warden_dns_application::ports::{
    Exchange, FilterEngine, QueryLogSink, QueryRecord, ResolvedHook, StatsSink, UpstreamResolver,
};

pub const TEST_ID: u16 = 0x2b1c;

// ── message builders ───────────────────────────────────────────────────────

pub fn query(name: &str, qtype: RecordType) -> Message {
    let mut req = Message::new();
    req.set_id(TEST_ID)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true);
    req.add_query(Query::query(Name::from_str(name).unwrap(), qtype));
    req
}

pub fn a_record(name: &str, ip: &str, ttl: u32) -> Record {
    Record::from_rdata(
        Name::from_str(name).unwrap(),
        ttl,
        RData::A(A(ip.parse().unwrap())),
    )
}

pub fn aaaa_record(name: &str, ip: &str, ttl: u32) -> Record {
    Record::from_rdata(
        Name::from_str(name).unwrap(),
        ttl,
        RData::AAAA(AAAA(ip.parse().unwrap())),
    )
}

pub fn cname_record(name: &str, target: &str, ttl: u32) -> Record {
    Record::from_rdata(
        Name::from_str(name).unwrap(),
        ttl,
        RData::CNAME(CNAME(Name::from_str(target).unwrap())),
    )
}

pub fn ns_record(name: &str, target: &str, ttl: u32) -> Record {
    Record::from_rdata(
        Name::from_str(name).unwrap(),
        ttl,
        RData::NS(NS(Name::from_str(target).unwrap())),
    )
}

pub fn rrsig_record(name: &str, covered: RecordType, ttl: u32) -> Record {
    let rrsig = RRSIG::new(
        covered,
        Algorithm::RSASHA256,
        2,
        ttl,
        0,
        0,
        12345,
        Name::from_str("example.").unwrap(),
        vec![0xde, 0xad, 0xbe, 0xef],
    );
    Record::from_rdata(
        Name::from_str(name).unwrap(),
        ttl,
        RData::DNSSEC(DNSSECRData::RRSIG(rrsig)),
    )
}

// ── mock filter engine ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockFilterEngine {
    defaults: RequestFilterSettings,
    host_verdicts: Mutex<HashMap<String, FilterVerdict>>,
    rule_verdicts: Mutex<HashMap<String, FilterVerdict>>,
    checked_hosts: Mutex<Vec<(String, RequestFilterSettings)>>,
    checked_rule_hosts: Mutex<Vec<String>>,
}

impl MockFilterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verdict returned by `check_host` for `host`.
    pub fn set_verdict(&self, host: &str, verdict: FilterVerdict) {
        self.host_verdicts
            .lock()
            .unwrap()
            .insert(host.to_string(), verdict);
    }

    /// Verdict returned by `check_host_rules` for `host`.
    pub fn set_rule_verdict(&self, host: &str, verdict: FilterVerdict) {
        self.rule_verdicts
            .lock()
            .unwrap()
            .insert(host.to_string(), verdict);
    }

    pub fn checked_hosts(&self) -> Vec<(String, RequestFilterSettings)> {
        self.checked_hosts.lock().unwrap().clone()
    }

    pub fn checked_rule_hosts(&self) -> Vec<String> {
        self.checked_rule_hosts.lock().unwrap().clone()
    }
}

impl FilterEngine for MockFilterEngine {
    fn default_settings(&self) -> RequestFilterSettings {
        self.defaults.clone()
    }

    fn check_host(
        &self,
        host: &str,
        _qtype: RecordType,
        settings: &RequestFilterSettings,
    ) -> Result<FilterVerdict, DomainError> {
        self.checked_hosts
            .lock()
            .unwrap()
            .push((host.to_string(), settings.clone()));
        Ok(self
            .host_verdicts
            .lock()
            .unwrap()
            .get(host)
            .cloned()
            .unwrap_or_default())
    }

    fn check_host_rules(
        &self,
        host: &str,
        _qtype: RecordType,
        _settings: &RequestFilterSettings,
    ) -> Result<FilterVerdict, DomainError> {
        self.checked_rule_hosts.lock().unwrap().push(host.to_string());
        Ok(self
            .rule_verdicts
            .lock()
            .unwrap()
            .get(host)
            .cloned()
            .unwrap_or_default())
    }
}

/// A filter engine whose checks always fail.
pub struct FailingFilterEngine;

impl FilterEngine for FailingFilterEngine {
    fn default_settings(&self) -> RequestFilterSettings {
        RequestFilterSettings::default()
    }

    fn check_host(
        &self,
        host: &str,
        _qtype: RecordType,
        _settings: &RequestFilterSettings,
    ) -> Result<FilterVerdict, DomainError> {
        Err(DomainError::FilterFailure {
            host: host.to_string(),
            reason: "rule storage unavailable".to_string(),
        })
    }

    fn check_host_rules(
        &self,
        host: &str,
        qtype: RecordType,
        settings: &RequestFilterSettings,
    ) -> Result<FilterVerdict, DomainError> {
        self.check_host(host, qtype, settings)
    }
}

// ── mock upstream resolver ─────────────────────────────────────────────────

pub struct MockUpstream {
    answers: Mutex<HashMap<String, (Vec<Record>, Vec<Record>)>>,
    ips: Mutex<HashMap<String, Vec<IpAddr>>>,
    requests: Mutex<Vec<(Message, usize)>>,
    calls: AtomicUsize,
}

impl MockUpstream {
    pub fn new() -> Self {
        MockUpstream {
            answers: Mutex::new(HashMap::new()),
            ips: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answers returned for queries on `qname` (absolute, lowercase).
    pub fn set_answers(&self, qname: &str, answers: Vec<Record>) {
        self.set_sections(qname, answers, vec![]);
    }

    pub fn set_sections(&self, qname: &str, answers: Vec<Record>, authority: Vec<Record>) {
        self.answers
            .lock()
            .unwrap()
            .insert(qname.to_lowercase(), (answers, authority));
    }

    pub fn set_ips(&self, host: &str, ips: Vec<IpAddr>) {
        self.ips.lock().unwrap().insert(host.to_lowercase(), ips);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests seen, with the length of the per-request upstream override.
    pub fn requests(&self) -> Vec<(Message, usize)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpstreamResolver for MockUpstream {
    async fn exchange(
        &self,
        req: &Message,
        upstreams: Option<&[warden_dns_domain::UpstreamSpec]>,
    ) -> Result<Exchange, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap()
            .push((req.clone(), upstreams.map(|u| u.len()).unwrap_or(0)));

        let qname = req
            .queries()
            .first()
            .map(|q| q.name().to_utf8().to_lowercase())
            .unwrap_or_default();

        let sections = self.answers.lock().unwrap().get(&qname).cloned();
        let (answers, authority) = sections.ok_or(DomainError::TransportAllServersUnreachable)?;

        let mut response = Message::new();
        response
            .set_id(req.id())
            .set_message_type(MessageType::Response)
            .set_op_code(req.op_code())
            .set_recursion_desired(req.recursion_desired())
            .set_recursion_available(true);
        for q in req.queries() {
            response.add_query(q.clone());
        }
        for record in answers {
            response.add_answer(record);
        }
        for record in authority {
            response.add_name_server(record);
        }

        Ok(Exchange {
            response,
            upstream: Some(Arc::from("127.0.0.53:53")),
        })
    }

    async fn lookup_ips(&self, host: &str) -> Result<Vec<IpAddr>, DomainError> {
        self.ips
            .lock()
            .unwrap()
            .get(&host.to_lowercase())
            .cloned()
            .ok_or(DomainError::TransportAllServersUnreachable)
    }
}

// ── recording sinks ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingQueryLog {
    records: Mutex<Vec<QueryRecord>>,
}

impl RecordingQueryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<QueryRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl QueryLogSink for RecordingQueryLog {
    fn log(&self, record: &QueryRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}

#[derive(Default)]
pub struct RecordingStats {
    entries: Mutex<Vec<StatsEntry>>,
}

impl RecordingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<StatsEntry> {
        self.entries.lock().unwrap().clone()
    }
}

impl StatsSink for RecordingStats {
    fn update(&self, entry: StatsEntry) {
        self.entries.lock().unwrap().push(entry);
    }
}

#[derive(Default)]
pub struct RecordingHook {
    records: Mutex<Vec<QueryRecord>>,
}

impl RecordingHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<QueryRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl ResolvedHook for RecordingHook {
    fn on_resolved(&self, record: &QueryRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}
