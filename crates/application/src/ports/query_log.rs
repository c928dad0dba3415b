use hickory_proto::op::Message;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use warden_dns_domain::FilterVerdict;

/// Everything the query log (and the post-response hook) learns about one
/// finished request.
#[derive(Debug, Clone)]
pub struct QueryRecord {
    /// The client's request, with its original question restored if the
    /// pipeline rewrote it.
    pub question: Message,
    pub answer: Option<Message>,
    /// Upstream answer that response-side filtering replaced, if any.
    pub orig_answer: Option<Message>,
    pub verdict: FilterVerdict,
    pub elapsed: Duration,
    pub client: Option<IpAddr>,
    pub upstream: Option<Arc<str>>,
}

/// Opaque query-log collaborator. Implementations must not block the caller;
/// queue internally if persistence is slow.
pub trait QueryLogSink: Send + Sync {
    fn log(&self, record: &QueryRecord);
}
