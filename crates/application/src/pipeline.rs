//! The request pipeline: six ordered stages over one mutable context.
//!
//! Each stage either lets the walk continue, halts it because the response is
//! already final, or fails the whole request. Collaborators are captured once
//! at construction; a pipeline value is built per request from whatever the
//! server currently holds, so reconfiguration never swaps them mid-walk.

mod context;

pub use context::{ClientProtocol, DnsContext};

use hickory_proto::op::{Edns, Message, Query};
use hickory_proto::rr::rdata::{AAAA, A};
use hickory_proto::rr::{RData, Record, RecordType};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tracing::debug;
use warden_dns_domain::{
    BlockingConfig, Config, DomainError, FilterReason, FilterVerdict, StatsEntry,
};

use crate::blocking::blocked_response;
use crate::ports::{
    FilterEngine, QueryLogSink, QueryRecord, ResolvedHook, ServerHooks, StatsSink,
    UpstreamResolver,
};
use crate::response;

/// Mozilla's canary domain: answering NXDOMAIN keeps Firefox from silently
/// switching users to its own DoH resolver.
const MOZILLA_CANARY: &str = "use-application-dns.net.";

enum StageFlow {
    Continue,
    Halt,
}

type StageResult = Result<StageFlow, DomainError>;

#[derive(Clone, Copy)]
enum Stage {
    ScreenRequest,
    FilterRequest,
    ForwardUpstream,
    ScrubDnssec,
    FilterResponse,
    RecordOutcome,
}

const STAGES: [Stage; 6] = [
    Stage::ScreenRequest,
    Stage::FilterRequest,
    Stage::ForwardUpstream,
    Stage::ScrubDnssec,
    Stage::FilterResponse,
    Stage::RecordOutcome,
];

/// Configuration slice the pipeline reads per request.
#[derive(Debug, Clone)]
pub struct QueryPipelineConfig {
    pub blocking: BlockingConfig,
    pub aaaa_disabled: bool,
    pub refuse_any: bool,
    pub enable_dnssec: bool,
}

impl QueryPipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        QueryPipelineConfig {
            blocking: config.blocking.clone(),
            aaaa_disabled: config.dns.aaaa_disabled,
            refuse_any: config.dns.refuse_any,
            enable_dnssec: config.dns.enable_dnssec,
        }
    }
}

pub struct QueryPipeline {
    config: QueryPipelineConfig,
    hooks: ServerHooks,
    upstream: Arc<dyn UpstreamResolver>,
    internal: Arc<dyn UpstreamResolver>,
    filter: Option<Arc<dyn FilterEngine>>,
    query_log: Option<Arc<dyn QueryLogSink>>,
    stats: Option<Arc<dyn StatsSink>>,
    resolved_hook: Option<Arc<dyn ResolvedHook>>,
}

impl QueryPipeline {
    pub fn new(
        config: QueryPipelineConfig,
        upstream: Arc<dyn UpstreamResolver>,
        internal: Arc<dyn UpstreamResolver>,
    ) -> Self {
        QueryPipeline {
            config,
            hooks: ServerHooks::default(),
            upstream,
            internal,
            filter: None,
            query_log: None,
            stats: None,
            resolved_hook: None,
        }
    }

    pub fn with_filter(mut self, filter: Arc<dyn FilterEngine>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_query_log(mut self, query_log: Arc<dyn QueryLogSink>) -> Self {
        self.query_log = Some(query_log);
        self
    }

    pub fn with_stats(mut self, stats: Arc<dyn StatsSink>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn with_resolved_hook(mut self, hook: Arc<dyn ResolvedHook>) -> Self {
        self.resolved_hook = Some(hook);
        self
    }

    pub fn with_hooks(mut self, hooks: ServerHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Walk the stages. On success `ctx.res` is always set; on error the
    /// caller owes the client a SERVFAIL.
    pub async fn execute(&self, ctx: &mut DnsContext) -> Result<(), DomainError> {
        for stage in STAGES {
            let flow = match stage {
                Stage::ScreenRequest => self.screen_request(ctx)?,
                Stage::FilterRequest => self.filter_request(ctx).await?,
                Stage::ForwardUpstream => self.forward_upstream(ctx).await?,
                Stage::ScrubDnssec => self.scrub_dnssec(ctx)?,
                Stage::FilterResponse => self.filter_response(ctx).await?,
                Stage::RecordOutcome => self.record_outcome(ctx)?,
            };
            if let StageFlow::Halt = flow {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Stage 1: coarse gates that never need the filter engine.
    fn screen_request(&self, ctx: &mut DnsContext) -> StageResult {
        let qtype = ctx.qtype();

        if self.config.aaaa_disabled && qtype == Some(RecordType::AAAA) {
            debug!(host = ?ctx.host(), "AAAA queries are disabled, answering empty");
            ctx.res = Some(response::reply_to(&ctx.req));
            return Ok(StageFlow::Halt);
        }

        if let Some(observer) = &self.hooks.on_dns_request {
            observer(ctx);
        }

        if matches!(qtype, Some(RecordType::A) | Some(RecordType::AAAA)) {
            if let Some(question) = ctx.question() {
                if question.name().to_utf8().eq_ignore_ascii_case(MOZILLA_CANARY) {
                    ctx.res = Some(response::nxdomain(
                        &ctx.req,
                        self.config.blocking.blocked_response_ttl,
                    ));
                    return Ok(StageFlow::Halt);
                }
            }
        }

        Ok(StageFlow::Continue)
    }

    /// Stage 2: ask the filter engine about the queried name.
    async fn filter_request(&self, ctx: &mut DnsContext) -> StageResult {
        let filter = match &self.filter {
            Some(filter) if self.config.blocking.protection_enabled => filter,
            _ => {
                ctx.protection_enabled = false;
                return Ok(StageFlow::Continue);
            }
        };
        ctx.protection_enabled = true;

        let mut settings = filter.default_settings();
        settings.filtering_enabled = true;
        if let (Some(overlay), Some(addr)) = (&self.hooks.filter_handler, ctx.client_addr) {
            overlay(addr.ip(), &mut settings);
        }

        let Some(question) = ctx.question().cloned() else {
            ctx.settings = Some(settings);
            return Ok(StageFlow::Continue);
        };
        let host = question.name().to_utf8().trim_end_matches('.').to_string();
        let qtype = question.query_type();

        let verdict = filter.check_host(&host, qtype, &settings)?;
        let ttl = self.config.blocking.blocked_response_ttl;

        if verdict.filtered {
            debug!(host = %host, reason = %verdict.reason, rule = ?verdict.rule, "Query filtered");
            ctx.res = Some(
                blocked_response(
                    &ctx.req,
                    &verdict,
                    &self.config.blocking,
                    self.internal.as_ref(),
                )
                .await,
            );
        } else if matches!(
            verdict.reason,
            FilterReason::Rewrite | FilterReason::RewriteHosts
        ) && !verdict.ip_list.is_empty()
        {
            let mut resp = response::reply_to(&ctx.req);
            let mut answer_name = question.name().clone();
            if let Some(canon) = &verdict.canon_name {
                resp.add_answer(response::cname_answer(&ctx.req, canon, ttl)?);
                answer_name = response::fqdn(canon)?;
            }
            for ip in &verdict.ip_list {
                match (qtype, ipv4_form(*ip)) {
                    (RecordType::A, Some(v4)) => {
                        resp.add_answer(Record::from_rdata(
                            answer_name.clone(),
                            ttl,
                            RData::A(A(v4)),
                        ));
                    }
                    (RecordType::AAAA, None) => {
                        if let IpAddr::V6(v6) = ip {
                            resp.add_answer(Record::from_rdata(
                                answer_name.clone(),
                                ttl,
                                RData::AAAA(AAAA(*v6)),
                            ));
                        }
                    }
                    _ => {}
                }
            }
            ctx.res = Some(resp);
        } else if verdict.reason == FilterReason::Rewrite {
            if let Some(canon) = &verdict.canon_name {
                // Resolve the canonical name upstream; stage 5 restores the
                // question the client actually asked.
                let canon_name = response::fqdn(canon)?;
                ctx.orig_question = Some(question);
                replace_question(&mut ctx.req, |q| {
                    q.set_name(canon_name);
                });
            }
        } else if verdict.reason == FilterReason::RewriteHosts {
            if let Some(reverse) = &verdict.reverse_host {
                let mut resp = response::reply_to(&ctx.req);
                resp.add_answer(response::ptr_answer(&ctx.req, reverse, ttl)?);
                ctx.res = Some(resp);
            }
        }

        ctx.settings = Some(settings);
        ctx.verdict = verdict;
        Ok(StageFlow::Continue)
    }

    /// Stage 3: forward to upstream unless a response already exists.
    async fn forward_upstream(&self, ctx: &mut DnsContext) -> StageResult {
        if ctx.res.is_some() {
            return Ok(StageFlow::Continue);
        }

        if let (Some(by_client), Some(addr)) = (&self.hooks.upstreams_by_client, ctx.client_addr) {
            let upstreams = by_client(addr.ip());
            if !upstreams.is_empty() {
                debug!(client = %addr.ip(), "Using per-client upstream servers");
                ctx.upstreams = Some(upstreams);
            }
        }

        if self.config.enable_dnssec {
            let needs_opt = match ctx.req.extensions_mut() {
                Some(edns) => {
                    if edns.dnssec_ok() {
                        ctx.orig_req_dnssec = true;
                    } else {
                        edns.set_dnssec_ok(true);
                    }
                    false
                }
                None => true,
            };
            if needs_opt {
                let mut edns = Edns::new();
                edns.set_max_payload(4096);
                edns.set_version(0);
                edns.set_dnssec_ok(true);
                ctx.req.set_edns(edns);
            }
        }

        let exchange = self
            .upstream
            .exchange(&ctx.req, ctx.upstreams.as_deref())
            .await?;
        ctx.upstream_addr = exchange.upstream;
        ctx.res = Some(exchange.response);
        ctx.response_from_upstream = true;
        Ok(StageFlow::Continue)
    }

    /// Stage 4: remove signatures we asked for but the client did not.
    fn scrub_dnssec(&self, ctx: &mut DnsContext) -> StageResult {
        if !ctx.response_from_upstream || !self.config.enable_dnssec || ctx.orig_req_dnssec {
            return Ok(StageFlow::Continue);
        }

        if let Some(res) = ctx.res.as_mut() {
            let before = res.answers().len() + res.name_servers().len();
            res.answers_mut()
                .retain(|r| r.record_type() != RecordType::RRSIG);
            res.name_servers_mut()
                .retain(|r| r.record_type() != RecordType::RRSIG);
            let removed = before - res.answers().len() - res.name_servers().len();
            if removed > 0 {
                debug!(removed, "Stripped RRSIG records the client did not request");
            }
        }

        Ok(StageFlow::Continue)
    }

    /// Stage 5: response-side filtering and rewrite restoration.
    async fn filter_response(&self, ctx: &mut DnsContext) -> StageResult {
        if ctx.verdict.reason == FilterReason::Rewrite && ctx.verdict.canon_name.is_some() {
            self.restore_rewritten_question(ctx)?;
            return Ok(StageFlow::Continue);
        }

        if ctx.verdict.reason == FilterReason::NotFilteredAllowList {
            return Ok(StageFlow::Continue);
        }

        if !ctx.protection_enabled || !ctx.response_from_upstream {
            return Ok(StageFlow::Continue);
        }
        let (Some(filter), Some(settings)) = (&self.filter, ctx.settings.clone()) else {
            return Ok(StageFlow::Continue);
        };
        let Some(qtype) = ctx.qtype() else {
            return Ok(StageFlow::Continue);
        };

        let candidates: Vec<String> = ctx
            .res
            .as_ref()
            .map(|res| res.answers().iter().filter_map(answer_host).collect())
            .unwrap_or_default();

        for host in candidates {
            let verdict = filter.check_host_rules(&host, qtype, &settings)?;
            if verdict.filtered {
                debug!(host = ?ctx.host(), matched = %host, "Response matched a filter rule");
                let replacement = blocked_response(
                    &ctx.req,
                    &verdict,
                    &self.config.blocking,
                    self.internal.as_ref(),
                )
                .await;
                ctx.orig_resp = ctx.res.replace(replacement);
                ctx.verdict = verdict;
                return Ok(StageFlow::Continue);
            }
        }

        ctx.verdict = FilterVerdict::default();
        Ok(StageFlow::Continue)
    }

    /// Stage 6: query log, side-effect hook, statistics.
    fn record_outcome(&self, ctx: &mut DnsContext) -> StageResult {
        let elapsed = ctx.start_time.elapsed();

        let suppress_log = self.config.refuse_any && ctx.qtype() == Some(RecordType::ANY);
        if !suppress_log && (self.query_log.is_some() || self.resolved_hook.is_some()) {
            let record = QueryRecord {
                question: ctx.req.clone(),
                answer: ctx.res.clone(),
                orig_answer: ctx.orig_resp.clone(),
                verdict: ctx.verdict.clone(),
                elapsed,
                client: ctx.client_ip(),
                upstream: ctx.upstream_addr.clone(),
            };
            if let Some(query_log) = &self.query_log {
                query_log.log(&record);
            }
            if let Some(hook) = &self.resolved_hook {
                hook.on_resolved(&record);
            }
        }

        if let Some(stats) = &self.stats {
            let domain = ctx
                .question()
                .map(|q| q.name().to_utf8().trim_end_matches('.').to_lowercase())
                .unwrap_or_default();
            stats.update(StatsEntry {
                domain: domain.into(),
                client: ctx.client_ip(),
                elapsed_ms: elapsed.as_millis() as u32,
                result: ctx.verdict.reason.into(),
            });
        }

        Ok(StageFlow::Continue)
    }

    /// Undo the stage-2 canonical-name rewrite: the client gets its own
    /// question back, preceded by the CNAME that explains the answers.
    fn restore_rewritten_question(&self, ctx: &mut DnsContext) -> Result<(), DomainError> {
        let Some(orig_question) = ctx.orig_question.clone() else {
            return Ok(());
        };
        let ttl = self.config.blocking.blocked_response_ttl;

        let restored = orig_question.clone();
        replace_question(&mut ctx.req, move |q| {
            *q = restored;
        });

        if let Some(res) = ctx.res.as_mut() {
            let restored = orig_question;
            replace_question(res, move |q| {
                *q = restored;
            });

            if !res.answers().is_empty() {
                let canon = ctx.verdict.canon_name.as_deref().unwrap_or_default();
                let cname = response::cname_answer(&ctx.req, canon, ttl)?;
                let mut answers = res.take_answers();
                let mut prepended = Vec::with_capacity(answers.len() + 1);
                prepended.push(cname);
                prepended.append(&mut answers);
                res.insert_answers(prepended);
            }
        }
        Ok(())
    }
}

fn replace_question(msg: &mut Message, edit: impl FnOnce(&mut Query)) {
    let mut queries = msg.take_queries();
    if let Some(first) = queries.first_mut() {
        edit(first);
    }
    for query in queries {
        msg.add_query(query);
    }
}

/// The 4-byte form of an address, if it has one (plain or v6-mapped).
fn ipv4_form(ip: IpAddr) -> Option<Ipv4Addr> {
    match ip {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped(),
    }
}

fn answer_host(record: &Record) -> Option<String> {
    match record.data()? {
        RData::CNAME(target) => Some(target.0.to_utf8().trim_end_matches('.').to_string()),
        RData::A(a) => Some(a.0.to_string()),
        RData::AAAA(aaaa) => Some(aaaa.0.to_string()),
        _ => None,
    }
}
