use async_trait::async_trait;
use hickory_proto::op::Message;
use std::net::IpAddr;
use std::sync::Arc;
use warden_dns_domain::{DomainError, UpstreamSpec};

/// A completed upstream exchange.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub response: Message,
    /// Address of the upstream that produced the response; `None` when the
    /// proxy served it from its own cache.
    pub upstream: Option<Arc<str>>,
}

/// The upstream proxy collaborator: transport, load distribution, and caching
/// live behind this trait.
#[async_trait]
pub trait UpstreamResolver: Send + Sync {
    /// Forward `req` and return the first usable response. `upstreams`
    /// overrides the configured server set for this request only.
    async fn exchange(
        &self,
        req: &Message,
        upstreams: Option<&[UpstreamSpec]>,
    ) -> Result<Exchange, DomainError>;

    /// Plain host-to-address lookup (A + AAAA), no filtering, no logging.
    async fn lookup_ips(&self, host: &str) -> Result<Vec<IpAddr>, DomainError>;
}
