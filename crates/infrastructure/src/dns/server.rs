//! Server lifecycle: prepare / start / stop / reconfigure, plus the
//! per-request entry point that gates access and runs the pipeline.
//!
//! Collaborators live behind one `RwLock`. The request path takes the lock
//! only long enough to clone `Arc`s out of it; in-flight requests therefore
//! keep working on the old collaborator set while `reconfigure` swaps in a
//! new one.

use async_trait::async_trait;
use hickory_proto::op::Message;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use warden_dns_domain::{AccessList, Config, DomainError, UpstreamEntry, UpstreamSpec};

use warden_dns_application::ports::{
    FilterEngine, QueryLogSink, ResolvedHook, ServerHooks, StatsSink, UpstreamResolver,
};
use warden_dns_application::response;
use warden_dns_application::{ClientProtocol, DnsContext, QueryPipeline, QueryPipelineConfig};

use super::proxy::{DnsProxy, ProxyConfig, RequestHandler};

/// Listeners may not release their descriptors synchronously on stop; give
/// the OS a moment before binding again.
const RECONFIGURE_GRACE: Duration = Duration::from_millis(100);

/// Fixed EDNS client-subnet source used when none is configured, so upstream
/// answers stay location-stable across clients.
const DEFAULT_EDNS_SOURCE: IpAddr = IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8));

const INTERNAL_CACHE_SIZE: usize = 4096;

#[derive(Default)]
struct ServerState {
    config: Option<Config>,
    hooks: ServerHooks,
    proxy: Option<Arc<DnsProxy>>,
    internal: Option<Arc<DnsProxy>>,
    access: Option<Arc<AccessList>>,
    filter: Option<Arc<dyn FilterEngine>>,
    query_log: Option<Arc<dyn QueryLogSink>>,
    stats: Option<Arc<dyn StatsSink>>,
    resolved_hook: Option<Arc<dyn ResolvedHook>>,
    is_running: bool,
}

/// Everything one request needs, captured under a brief read guard.
struct Snapshot {
    config: Config,
    hooks: ServerHooks,
    proxy: Arc<DnsProxy>,
    internal: Arc<DnsProxy>,
    access: Arc<AccessList>,
    filter: Option<Arc<dyn FilterEngine>>,
    query_log: Option<Arc<dyn QueryLogSink>>,
    stats: Option<Arc<dyn StatsSink>>,
    resolved_hook: Option<Arc<dyn ResolvedHook>>,
}

impl ServerState {
    fn snapshot(&self) -> Option<Snapshot> {
        Some(Snapshot {
            config: self.config.clone()?,
            hooks: self.hooks.clone(),
            proxy: self.proxy.clone()?,
            internal: self.internal.clone()?,
            access: self.access.clone()?,
            filter: self.filter.clone(),
            query_log: self.query_log.clone(),
            stats: self.stats.clone(),
            resolved_hook: self.resolved_hook.clone(),
        })
    }
}

/// The filtering forwarder.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use warden_dns_domain::Config;
/// # use warden_dns_application::ports::ServerHooks;
/// # use warden_dns_infrastructure::dns::DnsServer;
/// # async fn run() -> Result<(), warden_dns_domain::DomainError> {
/// let server = Arc::new(DnsServer::new(None, None, None, None));
/// server.prepare(Config::default(), ServerHooks::default()).await?;
/// server.start().await?;
/// // ...
/// server.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct DnsServer {
    state: RwLock<ServerState>,
}

impl DnsServer {
    pub fn new(
        filter: Option<Arc<dyn FilterEngine>>,
        query_log: Option<Arc<dyn QueryLogSink>>,
        stats: Option<Arc<dyn StatsSink>>,
        resolved_hook: Option<Arc<dyn ResolvedHook>>,
    ) -> Self {
        DnsServer {
            state: RwLock::new(ServerState {
                filter,
                query_log,
                stats,
                resolved_hook,
                ..ServerState::default()
            }),
        }
    }

    /// Validate `config` and build the proxies, the internal resolver, and
    /// the access controller. Does not touch any listener.
    pub async fn prepare(&self, config: Config, hooks: ServerHooks) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        Self::prepare_locked(&mut state, config, hooks).await
    }

    async fn prepare_locked(
        state: &mut ServerState,
        config: Config,
        hooks: ServerHooks,
    ) -> Result<(), DomainError> {
        config
            .validate()
            .map_err(|e| DomainError::Config(e.to_string()))?;

        let (mut general, mut reserved) = parse_upstream_entries(&config.dns.upstream_dns)?;

        let bootstrap = bootstrap_proxy(&config)?;
        resolve_hostname_upstreams(&bootstrap, &mut general).await?;
        for (_, specs) in reserved.iter_mut() {
            resolve_hostname_upstreams(&bootstrap, specs).await?;
        }

        let timeout = Duration::from_millis(config.dns.query_timeout_ms);
        let edns_subnet = config.dns.edns_client_subnet.enabled.then(|| {
            config
                .dns
                .edns_client_subnet
                .source
                .unwrap_or(DEFAULT_EDNS_SOURCE)
        });
        if let Some(source) = edns_subnet {
            info!(source = %source, "EDNS client subnet pinned");
        }

        let primary = ProxyConfig {
            upstreams: general.clone(),
            reserved: reserved.clone(),
            timeout,
            cache_enabled: config.dns.cache_enabled,
            cache_size: config.dns.cache_size,
            edns_subnet,
            ratelimit: config.dns.ratelimit,
            ratelimit_whitelist: config.dns.ratelimit_whitelist.clone(),
        };

        let internal = ProxyConfig {
            upstreams: general,
            reserved,
            timeout,
            cache_enabled: true,
            cache_size: INTERNAL_CACHE_SIZE,
            edns_subnet: None,
            ratelimit: 0,
            ratelimit_whitelist: Vec::new(),
        };

        let access = AccessList::new(
            &config.access.allowed_clients,
            &config.access.disallowed_clients,
            &config.access.blocked_hosts,
        )?;

        state.access = Some(Arc::new(access));
        state.internal = Some(Arc::new(DnsProxy::new(internal)));
        state.proxy = Some(Arc::new(DnsProxy::new(primary)));
        state.config = Some(config);
        state.hooks = hooks;
        Ok(())
    }

    /// Bind the listeners. Requires a successful `prepare` first.
    pub async fn start(self: &Arc<Self>) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        Self::start_locked(self, &mut state)
    }

    fn start_locked(server: &Arc<Self>, state: &mut ServerState) -> Result<(), DomainError> {
        let config = state.config.as_ref().ok_or(DomainError::NotPrepared)?;
        let proxy = state.proxy.clone().ok_or(DomainError::NotPrepared)?;

        let bind_addr: SocketAddr = format!(
            "{}:{}",
            config.server.bind_address, config.server.dns_port
        )
        .parse()
        .map_err(|_| {
            DomainError::Config(format!(
                "invalid bind address '{}'",
                config.server.bind_address
            ))
        })?;

        proxy.start(
            bind_addr,
            Arc::new(PipelineRequestHandler {
                server: server.clone(),
            }),
        )?;
        state.is_running = true;
        info!(bind_address = %bind_addr, "DNS server started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        Self::stop_locked(&mut state);
        Ok(())
    }

    fn stop_locked(state: &mut ServerState) {
        if let Some(proxy) = &state.proxy {
            proxy.stop();
        }
        state.is_running = false;
    }

    pub async fn is_running(&self) -> bool {
        self.state.read().await.is_running
    }

    /// Stop, re-prepare with `config`, and start again, atomically with
    /// respect to every other lifecycle operation.
    pub async fn reconfigure(
        self: &Arc<Self>,
        config: Config,
        hooks: ServerHooks,
    ) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        info!("Reconfiguring the DNS server");

        Self::stop_locked(&mut state);
        tokio::time::sleep(RECONFIGURE_GRACE).await;

        Self::prepare_locked(&mut state, config, hooks)
            .await
            .map_err(|e| DomainError::Reconfigure(e.to_string()))?;
        Self::start_locked(self, &mut state).map_err(|e| DomainError::Reconfigure(e.to_string()))?;
        Ok(())
    }

    /// Drop every collaborator. In-flight requests finish on the references
    /// they captured at entry.
    pub async fn close(&self) {
        let mut state = self.state.write().await;
        Self::stop_locked(&mut state);
        *state = ServerState::default();
    }

    /// Snapshot of the active configuration.
    pub async fn current_config(&self) -> Option<Config> {
        self.state.read().await.config.clone()
    }

    /// Host-to-address lookup through the internal resolver. No filtering,
    /// no logging; callable before `start`.
    pub async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, DomainError> {
        let internal = {
            let state = self.state.read().await;
            state.internal.clone()
        }
        .ok_or(DomainError::NotPrepared)?;
        internal.lookup_ips(host).await
    }

    /// Raw DNS exchange through the internal resolver. No filtering, no
    /// logging; callable before `start`.
    pub async fn exchange(&self, req: &Message) -> Result<Message, DomainError> {
        let internal = {
            let state = self.state.read().await;
            state.internal.clone()
        }
        .ok_or(DomainError::NotPrepared)?;
        Ok(internal.exchange(req, None).await?.response)
    }

    /// Entry point for one query: access gate, then the pipeline.
    ///
    /// `None` means "send nothing" (administratively blocked client or host,
    /// or a server that is not prepared).
    pub async fn handle_query(
        &self,
        req: Message,
        client: Option<SocketAddr>,
        protocol: ClientProtocol,
    ) -> Option<Message> {
        let snapshot = {
            let state = self.state.read().await;
            state.snapshot()
        }?;

        if let Some(addr) = client {
            if snapshot.access.is_blocked_addr(addr.ip()) {
                debug!(client = %addr.ip(), "Client is blocked by access settings");
                return None;
            }
        }
        if req.queries().len() == 1 {
            let host = req.queries()[0].name().to_utf8();
            if snapshot.access.is_blocked_host(&host) {
                debug!(host = %host, "Host is blocked by access settings");
                return None;
            }
        }

        let proxy: Arc<dyn UpstreamResolver> = snapshot.proxy.clone();
        let internal: Arc<dyn UpstreamResolver> = snapshot.internal.clone();
        let mut pipeline = QueryPipeline::new(
            QueryPipelineConfig::from_config(&snapshot.config),
            proxy,
            internal,
        )
        .with_hooks(snapshot.hooks.clone());
        if let Some(filter) = snapshot.filter.clone() {
            pipeline = pipeline.with_filter(filter);
        }
        if let Some(query_log) = snapshot.query_log.clone() {
            pipeline = pipeline.with_query_log(query_log);
        }
        if let Some(stats) = snapshot.stats.clone() {
            pipeline = pipeline.with_stats(stats);
        }
        if let Some(hook) = snapshot.resolved_hook.clone() {
            pipeline = pipeline.with_resolved_hook(hook);
        }

        let mut ctx = DnsContext::new(req, protocol, client);
        match pipeline.execute(&mut ctx).await {
            Ok(()) => match ctx.res {
                Some(res) => Some(res),
                None => {
                    warn!(host = ?ctx.host(), "Pipeline finished without a response");
                    Some(response::servfail(&ctx.req))
                }
            },
            Err(e) => {
                warn!(host = ?ctx.host(), error = %e, "Query processing failed");
                Some(response::servfail(&ctx.req))
            }
        }
    }
}

struct PipelineRequestHandler {
    server: Arc<DnsServer>,
}

#[async_trait]
impl RequestHandler for PipelineRequestHandler {
    async fn handle(
        &self,
        req: Message,
        client: SocketAddr,
        protocol: ClientProtocol,
    ) -> Option<Message> {
        self.server.handle_query(req, Some(client), protocol).await
    }
}

fn parse_upstream_entries(
    raw: &[String],
) -> Result<(Vec<UpstreamSpec>, Vec<(String, Vec<UpstreamSpec>)>), DomainError> {
    let mut general = Vec::new();
    let mut reserved: Vec<(String, Vec<UpstreamSpec>)> = Vec::new();

    for line in raw {
        let entry: UpstreamEntry = line.parse()?;
        if entry.is_general() {
            general.push(entry.spec);
        } else {
            for domain in entry.domains {
                match reserved.iter_mut().find(|(d, _)| *d == domain) {
                    Some((_, specs)) => specs.push(entry.spec.clone()),
                    None => reserved.push((domain, vec![entry.spec.clone()])),
                }
            }
        }
    }

    if general.is_empty() {
        return Err(DomainError::Config(
            "no general upstream servers configured".to_string(),
        ));
    }
    Ok((general, reserved))
}

fn bootstrap_proxy(config: &Config) -> Result<DnsProxy, DomainError> {
    let mut upstreams = Vec::new();
    for entry in &config.dns.bootstrap_dns {
        let spec: UpstreamSpec = entry.parse()?;
        if spec.needs_resolution() {
            return Err(DomainError::Config(format!(
                "bootstrap server '{}' must be an address, not a hostname",
                entry
            )));
        }
        upstreams.push(spec);
    }
    Ok(DnsProxy::new(ProxyConfig {
        upstreams,
        timeout: Duration::from_millis(config.dns.query_timeout_ms),
        ..ProxyConfig::default()
    }))
}

async fn resolve_hostname_upstreams(
    bootstrap: &DnsProxy,
    specs: &mut [UpstreamSpec],
) -> Result<(), DomainError> {
    for spec in specs.iter_mut() {
        let Some((hostname, port)) = spec.addr().unresolved_parts() else {
            continue;
        };
        let hostname = hostname.to_string();

        let ips = bootstrap.lookup_ips(&hostname).await?;
        let ip = *ips.first().ok_or_else(|| {
            DomainError::Config(format!("could not resolve upstream host '{}'", hostname))
        })?;
        debug!(host = %hostname, ip = %ip, "Bootstrapped upstream host");
        *spec = spec.with_resolved_addr(SocketAddr::new(ip, port));
    }
    Ok(())
}
