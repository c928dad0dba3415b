//! The DNS proxy: listeners on the client side, failover forwarding on the
//! upstream side, and a response cache in between.
//!
//! A proxy either listens (the primary instance, driven by a
//! [`RequestHandler`]) or is used purely programmatically (the internal
//! instance behind blocked-host substitution and `resolve`/`exchange`).

use async_trait::async_trait;
use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::opt::EdnsOption;
use hickory_proto::rr::{RData, RecordType};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use warden_dns_domain::{DomainError, UpstreamSpec};

use warden_dns_application::ports::{Exchange, UpstreamResolver};
use warden_dns_application::response;
use warden_dns_application::ClientProtocol;

use super::cache::{CacheKey, ResponseCache};
use super::forwarding::{read_with_length_prefix, write_with_length_prefix, Forwarder};
use super::ratelimit::RateLimiter;

/// EDNS option code for client subnet (RFC 7871).
const EDNS_CODE_CLIENT_SUBNET: u16 = 8;

/// Advertised prefix lengths for the pinned EDNS client subnet.
const ECS_V4_PREFIX: u8 = 24;
const ECS_V6_PREFIX: u8 = 56;

const MIN_UDP_PAYLOAD: u16 = 512;

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Servers answering queries no reserved entry claims.
    pub upstreams: Vec<UpstreamSpec>,
    /// Domain-suffix routed servers, most specific suffix wins.
    pub reserved: Vec<(String, Vec<UpstreamSpec>)>,
    pub timeout: Duration,
    pub cache_enabled: bool,
    pub cache_size: usize,
    /// When set, every outgoing query carries this EDNS client subnet.
    pub edns_subnet: Option<IpAddr>,
    pub ratelimit: u32,
    pub ratelimit_whitelist: Vec<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            upstreams: Vec::new(),
            reserved: Vec::new(),
            timeout: Duration::from_secs(10),
            cache_enabled: false,
            cache_size: 4096,
            edns_subnet: None,
            ratelimit: 0,
            ratelimit_whitelist: Vec::new(),
        }
    }
}

/// Request sink for a listening proxy. `None` drops the request silently
/// (the access-control contract for administratively blocked clients).
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(
        &self,
        req: Message,
        client: SocketAddr,
        protocol: ClientProtocol,
    ) -> Option<Message>;
}

pub struct DnsProxy {
    config: ProxyConfig,
    forwarder: Forwarder,
    cache: Option<Mutex<ResponseCache>>,
    ratelimit: RateLimiter,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DnsProxy {
    pub fn new(config: ProxyConfig) -> Self {
        let cache = config
            .cache_enabled
            .then(|| Mutex::new(ResponseCache::new(config.cache_size)));
        let forwarder = Forwarder::new(config.timeout);
        let ratelimit = RateLimiter::new(config.ratelimit, &config.ratelimit_whitelist);
        DnsProxy {
            config,
            forwarder,
            cache,
            ratelimit,
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Bind UDP and TCP listeners on `bind_addr` and dispatch every request
    /// to `handler`. One UDP worker per core, sharing the port.
    pub fn start(
        self: &Arc<Self>,
        bind_addr: SocketAddr,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<(), DomainError> {
        let num_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let mut workers = self.workers.lock().unwrap();

        for worker_id in 0..num_workers {
            let socket = Arc::new(create_udp_socket(bind_addr)?);
            let proxy = self.clone();
            let handler = handler.clone();
            workers.push(tokio::spawn(async move {
                run_udp_worker(proxy, socket, handler, worker_id).await;
            }));
        }

        let listener = create_tcp_listener(bind_addr)?;
        let handler_tcp = handler.clone();
        workers.push(tokio::spawn(async move {
            run_tcp_acceptor(listener, handler_tcp).await;
        }));

        info!(bind_address = %bind_addr, num_workers, "DNS proxy listening");
        Ok(())
    }

    /// Abort the listener tasks and release the sockets.
    pub fn stop(&self) {
        let mut workers = self.workers.lock().unwrap();
        for worker in workers.drain(..) {
            worker.abort();
        }
    }

    fn servers_for(&self, qname: &str) -> &[UpstreamSpec] {
        let host = qname.trim_end_matches('.').to_lowercase();
        let mut best: Option<(usize, &Vec<UpstreamSpec>)> = None;
        for (domain, specs) in &self.config.reserved {
            if host == *domain || host.ends_with(&format!(".{}", domain)) {
                match best {
                    Some((len, _)) if domain.len() <= len => {}
                    _ => best = Some((domain.len(), specs)),
                }
            }
        }
        best.map(|(_, specs)| specs.as_slice())
            .unwrap_or(&self.config.upstreams)
    }

    /// Clone of `req` ready for the wire: fresh transaction id, pinned EDNS
    /// client subnet when configured.
    fn prepare_outgoing(&self, req: &Message) -> Message {
        let mut outgoing = req.clone();
        outgoing.set_id(fastrand::u16(..));

        if let Some(source) = self.config.edns_subnet {
            if outgoing.extensions().is_none() {
                let mut edns = Edns::new();
                edns.set_max_payload(4096);
                edns.set_version(0);
                outgoing.set_edns(edns);
            }
            if let Some(edns) = outgoing.extensions_mut() {
                edns.options_mut().insert(EdnsOption::Unknown(
                    EDNS_CODE_CLIENT_SUBNET,
                    ecs_option_data(source),
                ));
            }
        }

        outgoing
    }

    async fn exchange_internal(
        &self,
        req: &Message,
        override_servers: Option<&[UpstreamSpec]>,
    ) -> Result<Exchange, DomainError> {
        let qname = req
            .queries()
            .first()
            .map(|q| q.name().to_utf8())
            .unwrap_or_default();

        // Per-request server overrides bypass the shared cache; their answers
        // are client-specific by definition.
        let cache_key = match override_servers {
            None => self.cache.as_ref().and_then(|_| CacheKey::from_message(req)),
            Some(_) => None,
        };
        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(hit) = cache.lock().unwrap().get(key, req.id()) {
                debug!(qname = %qname, "Answering from proxy cache");
                return Ok(Exchange {
                    response: hit,
                    upstream: None,
                });
            }
        }

        let servers = override_servers.unwrap_or_else(|| self.servers_for(&qname));
        if servers.is_empty() {
            return Err(DomainError::TransportAllServersUnreachable);
        }

        let outgoing = self.prepare_outgoing(req);
        let message_bytes = outgoing
            .to_vec()
            .map_err(|e| DomainError::InvalidDnsMessage(e.to_string()))?;

        let mut last_error = None;
        for spec in servers {
            match self.forwarder.exchange(spec, &message_bytes).await {
                Ok(raw) => {
                    let mut parsed = match Message::from_vec(&raw) {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            warn!(server = %spec, error = %e, "Unparseable upstream response");
                            last_error = Some(DomainError::InvalidDnsMessage(e.to_string()));
                            continue;
                        }
                    };
                    if parsed.id() != outgoing.id() {
                        warn!(server = %spec, "Upstream response id mismatch");
                        last_error = Some(DomainError::InvalidDnsMessage(
                            "transaction id mismatch".to_string(),
                        ));
                        continue;
                    }

                    parsed.set_id(req.id());

                    if let (Some(cache), Some(key)) = (&self.cache, cache_key.clone()) {
                        if cacheable(&parsed) {
                            cache.lock().unwrap().insert(key, parsed.clone());
                        }
                    }

                    return Ok(Exchange {
                        response: parsed,
                        upstream: Some(Arc::from(spec.to_string().as_str())),
                    });
                }
                Err(e) => {
                    warn!(server = %spec, error = %e, "Upstream exchange failed, failing over");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(DomainError::TransportAllServersUnreachable))
    }
}

#[async_trait]
impl UpstreamResolver for DnsProxy {
    async fn exchange(
        &self,
        req: &Message,
        upstreams: Option<&[UpstreamSpec]>,
    ) -> Result<Exchange, DomainError> {
        self.exchange_internal(req, upstreams).await
    }

    async fn lookup_ips(&self, host: &str) -> Result<Vec<IpAddr>, DomainError> {
        let name = response::fqdn(host)?;
        let mut ips = Vec::new();
        let mut last_error = None;

        for qtype in [RecordType::A, RecordType::AAAA] {
            let mut req = Message::new();
            req.set_id(fastrand::u16(..))
                .set_message_type(MessageType::Query)
                .set_op_code(OpCode::Query)
                .set_recursion_desired(true);
            req.add_query(Query::query(name.clone(), qtype));

            match self.exchange_internal(&req, None).await {
                Ok(exchange) => {
                    for record in exchange.response.answers() {
                        match record.data() {
                            Some(RData::A(a)) => ips.push(IpAddr::V4(a.0)),
                            Some(RData::AAAA(aaaa)) => ips.push(IpAddr::V6(aaaa.0)),
                            _ => {}
                        }
                    }
                }
                Err(e) => last_error = Some(e),
            }
        }

        match (ips.is_empty(), last_error) {
            (true, Some(e)) => Err(e),
            _ => Ok(ips),
        }
    }
}

fn cacheable(response: &Message) -> bool {
    matches!(
        response.response_code(),
        ResponseCode::NoError | ResponseCode::NXDomain
    )
}

/// RFC 7871 option data for a fixed source address, truncated to the
/// advertised prefix.
fn ecs_option_data(source: IpAddr) -> Vec<u8> {
    let (family, prefix, octets): (u16, u8, Vec<u8>) = match source {
        IpAddr::V4(v4) => (1, ECS_V4_PREFIX, v4.octets().to_vec()),
        IpAddr::V6(v6) => (2, ECS_V6_PREFIX, v6.octets().to_vec()),
    };
    let addr_len = (usize::from(prefix) + 7) / 8;

    let mut data = Vec::with_capacity(4 + addr_len);
    data.extend_from_slice(&family.to_be_bytes());
    data.push(prefix);
    data.push(0);
    data.extend_from_slice(&octets[..addr_len]);
    data
}

/// Serialize a response for UDP, truncating when it exceeds what the client
/// can receive.
fn encode_udp_response(response: &Message, max_size: usize) -> Result<Vec<u8>, DomainError> {
    let bytes = response
        .to_vec()
        .map_err(|e| DomainError::InvalidDnsMessage(e.to_string()))?;
    if bytes.len() <= max_size {
        return Ok(bytes);
    }

    let mut truncated = response.clone();
    truncated.set_truncated(true);
    truncated.take_answers();
    truncated.take_name_servers();
    truncated
        .to_vec()
        .map_err(|e| DomainError::InvalidDnsMessage(e.to_string()))
}

async fn run_udp_worker(
    proxy: Arc<DnsProxy>,
    socket: Arc<UdpSocket>,
    handler: Arc<dyn RequestHandler>,
    worker_id: usize,
) {
    let mut recv_buf = [0u8; 4096];

    loop {
        let (received, from) = match socket.recv_from(&mut recv_buf).await {
            Ok(x) => x,
            Err(e) => {
                error!(worker = worker_id, error = %e, "UDP recv error");
                continue;
            }
        };

        if proxy.ratelimit.should_drop(from.ip()) {
            debug!(client = %from.ip(), "Rate limit exceeded, dropping datagram");
            continue;
        }

        let packet = recv_buf[..received].to_vec();
        let socket = socket.clone();
        let handler = handler.clone();
        tokio::spawn(async move {
            let req = match Message::from_vec(&packet) {
                Ok(req) => req,
                Err(e) => {
                    debug!(client = %from, error = %e, "Dropping unparseable datagram");
                    return;
                }
            };

            let max_size = req
                .extensions()
                .as_ref()
                .map(|edns| edns.max_payload().max(MIN_UDP_PAYLOAD))
                .unwrap_or(MIN_UDP_PAYLOAD) as usize;

            if let Some(resp) = handler.handle(req, from, ClientProtocol::Udp).await {
                match encode_udp_response(&resp, max_size) {
                    Ok(bytes) => {
                        let _ = socket.send_to(&bytes, from).await;
                    }
                    Err(e) => warn!(client = %from, error = %e, "Failed to encode response"),
                }
            }
        });
    }
}

async fn run_tcp_acceptor(listener: TcpListener, handler: Arc<dyn RequestHandler>) {
    loop {
        let (stream, from) = match listener.accept().await {
            Ok(x) => x,
            Err(e) => {
                error!(error = %e, "TCP accept error");
                continue;
            }
        };
        let handler = handler.clone();
        tokio::spawn(async move {
            serve_tcp_connection(stream, from, handler).await;
        });
    }
}

async fn serve_tcp_connection(
    mut stream: TcpStream,
    from: SocketAddr,
    handler: Arc<dyn RequestHandler>,
) {
    loop {
        let request_bytes = match read_with_length_prefix(&mut stream).await {
            Ok(bytes) => bytes,
            Err(_) => return,
        };

        let req = match Message::from_vec(&request_bytes) {
            Ok(req) => req,
            Err(e) => {
                debug!(client = %from, error = %e, "Dropping unparseable TCP message");
                return;
            }
        };

        if let Some(resp) = handler.handle(req, from, ClientProtocol::Tcp).await {
            let bytes = match resp.to_vec() {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(client = %from, error = %e, "Failed to encode response");
                    return;
                }
            };
            if write_with_length_prefix(&mut stream, &bytes).await.is_err() {
                return;
            }
        }
    }
}

fn create_udp_socket(bind_addr: SocketAddr) -> Result<UdpSocket, DomainError> {
    let domain = if bind_addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let io_err = |e: std::io::Error| DomainError::TransportIo {
        server: bind_addr.to_string(),
        reason: e.to_string(),
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).map_err(io_err)?;
    if bind_addr.is_ipv6() {
        socket.set_only_v6(false).map_err(io_err)?;
    }
    socket.set_reuse_address(true).map_err(io_err)?;
    #[cfg(unix)]
    socket.set_reuse_port(true).map_err(io_err)?;
    socket.bind(&bind_addr.into()).map_err(io_err)?;
    socket.set_nonblocking(true).map_err(io_err)?;
    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).map_err(io_err)
}

fn create_tcp_listener(bind_addr: SocketAddr) -> Result<TcpListener, DomainError> {
    let domain = if bind_addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let io_err = |e: std::io::Error| DomainError::TransportIo {
        server: bind_addr.to_string(),
        reason: e.to_string(),
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP)).map_err(io_err)?;
    if bind_addr.is_ipv6() {
        socket.set_only_v6(false).map_err(io_err)?;
    }
    socket.set_reuse_address(true).map_err(io_err)?;
    #[cfg(unix)]
    socket.set_reuse_port(true).map_err(io_err)?;
    socket.bind(&bind_addr.into()).map_err(io_err)?;
    socket.listen(1024).map_err(io_err)?;
    socket.set_nonblocking(true).map_err(io_err)?;
    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener).map_err(io_err)
}
