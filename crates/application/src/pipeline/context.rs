use hickory_proto::op::{Message, Query};
use hickory_proto::rr::RecordType;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use warden_dns_domain::{FilterVerdict, RequestFilterSettings, UpstreamSpec};

/// Transport the client reached us over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientProtocol {
    Udp,
    Tcp,
    Https,
}

impl ClientProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientProtocol::Udp => "udp",
            ClientProtocol::Tcp => "tcp",
            ClientProtocol::Https => "https",
        }
    }
}

/// Per-request state threaded through the pipeline stages.
///
/// Created when a query arrives, dropped when the response leaves. The
/// request message is mutated in place by exactly two stages (canonical-name
/// rewrite and DNSSEC flag injection); `orig_question` and `orig_req_dnssec`
/// preserve what those mutations destroy.
#[derive(Debug, Clone)]
pub struct DnsContext {
    pub req: Message,
    pub res: Option<Message>,
    pub client_addr: Option<SocketAddr>,
    pub protocol: ClientProtocol,
    /// Per-client upstream override, when the host supplied one.
    pub upstreams: Option<Vec<UpstreamSpec>>,
    pub start_time: Instant,
    /// Filter settings snapshot for this client.
    pub settings: Option<RequestFilterSettings>,
    pub verdict: FilterVerdict,
    /// Upstream answer that response-side filtering replaced.
    pub orig_resp: Option<Message>,
    /// Question as the client sent it, kept across a canonical-name rewrite.
    pub orig_question: Option<Query>,
    /// True when the client itself asked for DNSSEC records.
    pub orig_req_dnssec: bool,
    pub response_from_upstream: bool,
    pub protection_enabled: bool,
    /// Address of the upstream that answered, for the query log.
    pub upstream_addr: Option<Arc<str>>,
}

impl DnsContext {
    pub fn new(req: Message, protocol: ClientProtocol, client_addr: Option<SocketAddr>) -> Self {
        DnsContext {
            req,
            res: None,
            client_addr,
            protocol,
            upstreams: None,
            start_time: Instant::now(),
            settings: None,
            verdict: FilterVerdict::default(),
            orig_resp: None,
            orig_question: None,
            orig_req_dnssec: false,
            response_from_upstream: false,
            protection_enabled: false,
            upstream_addr: None,
        }
    }

    pub fn question(&self) -> Option<&Query> {
        self.req.queries().first()
    }

    pub fn qtype(&self) -> Option<RecordType> {
        self.question().map(|q| q.query_type())
    }

    /// Queried name with the trailing dot stripped, as filter engines see it.
    pub fn host(&self) -> Option<String> {
        self.question()
            .map(|q| q.name().to_utf8().trim_end_matches('.').to_string())
    }

    pub fn client_ip(&self) -> Option<IpAddr> {
        self.client_addr.map(|addr| addr.ip())
    }
}
