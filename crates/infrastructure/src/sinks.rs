//! Default query-log and statistics sinks.
//!
//! The real query log and statistics stores are external collaborators; the
//! binary falls back to these tracing-backed sinks when none are wired in.

use hickory_proto::op::ResponseCode;
use tracing::{debug, info};
use warden_dns_application::ports::{QueryLogSink, QueryRecord, StatsSink};
use warden_dns_domain::StatsEntry;

pub fn rcode_to_status(rcode: ResponseCode) -> &'static str {
    match rcode {
        ResponseCode::NoError => "NOERROR",
        ResponseCode::NXDomain => "NXDOMAIN",
        ResponseCode::ServFail => "SERVFAIL",
        ResponseCode::Refused => "REFUSED",
        ResponseCode::NotImp => "NOTIMP",
        ResponseCode::FormErr => "FORMERR",
        _ => "UNKNOWN",
    }
}

/// Writes one structured log line per finished request.
#[derive(Debug, Default)]
pub struct TracingQueryLog;

impl QueryLogSink for TracingQueryLog {
    fn log(&self, record: &QueryRecord) {
        let domain = record
            .question
            .queries()
            .first()
            .map(|q| q.name().to_utf8())
            .unwrap_or_default();
        let status = record
            .answer
            .as_ref()
            .map(|answer| rcode_to_status(answer.response_code()))
            .unwrap_or("NONE");

        info!(
            domain = %domain,
            client = ?record.client,
            status = status,
            reason = %record.verdict.reason,
            rule = ?record.verdict.rule,
            elapsed_ms = record.elapsed.as_millis() as u64,
            upstream = ?record.upstream,
            rewritten = record.orig_answer.is_some(),
            "query"
        );
    }
}

/// Emits statistics samples at debug level.
#[derive(Debug, Default)]
pub struct TracingStats;

impl StatsSink for TracingStats {
    fn update(&self, entry: StatsEntry) {
        debug!(
            domain = %entry.domain,
            client = ?entry.client,
            elapsed_ms = entry.elapsed_ms,
            result = ?entry.result,
            "stats"
        );
    }
}
