use std::net::IpAddr;
use std::sync::Arc;
use warden_dns_domain::{RequestFilterSettings, UpstreamSpec};

use crate::pipeline::DnsContext;

/// Observer invoked for every accepted request before any processing.
pub type OnDnsRequest = Arc<dyn Fn(&DnsContext) + Send + Sync>;

/// Overlays per-client filter settings onto the engine defaults.
pub type FilterSettingsOverlay = Arc<dyn Fn(IpAddr, &mut RequestFilterSettings) + Send + Sync>;

/// Supplies a per-client upstream override; an empty return means "use the
/// configured servers".
pub type UpstreamsByClient = Arc<dyn Fn(IpAddr) -> Vec<UpstreamSpec> + Send + Sync>;

/// Optional host-supplied callbacks, carried alongside the file config.
#[derive(Clone, Default)]
pub struct ServerHooks {
    pub on_dns_request: Option<OnDnsRequest>,
    pub filter_handler: Option<FilterSettingsOverlay>,
    pub upstreams_by_client: Option<UpstreamsByClient>,
}

impl std::fmt::Debug for ServerHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHooks")
            .field("on_dns_request", &self.on_dns_request.is_some())
            .field("filter_handler", &self.filter_handler.is_some())
            .field("upstreams_by_client", &self.upstreams_by_client.is_some())
            .finish()
    }
}
