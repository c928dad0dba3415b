use crate::errors::DomainError;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

const DEFAULT_DNS_PORT: u16 = 53;

/// An upstream server address that may still need bootstrap resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UpstreamAddr {
    Resolved(SocketAddr),
    Unresolved { hostname: Arc<str>, port: u16 },
}

impl UpstreamAddr {
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match self {
            UpstreamAddr::Resolved(addr) => Some(*addr),
            UpstreamAddr::Unresolved { .. } => None,
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            UpstreamAddr::Resolved(addr) => addr.port(),
            UpstreamAddr::Unresolved { port, .. } => *port,
        }
    }

    /// Returns (hostname, port) when this address still needs resolution.
    pub fn unresolved_parts(&self) -> Option<(&str, u16)> {
        match self {
            UpstreamAddr::Unresolved { hostname, port } => Some((hostname, *port)),
            UpstreamAddr::Resolved(_) => None,
        }
    }
}

impl fmt::Display for UpstreamAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamAddr::Resolved(addr) => write!(f, "{}", addr),
            UpstreamAddr::Unresolved { hostname, port } => write!(f, "{}:{}", hostname, port),
        }
    }
}

/// A single upstream endpoint and the transport used to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UpstreamSpec {
    Udp { addr: UpstreamAddr },
    Tcp { addr: UpstreamAddr },
}

impl UpstreamSpec {
    pub fn addr(&self) -> &UpstreamAddr {
        match self {
            UpstreamSpec::Udp { addr } | UpstreamSpec::Tcp { addr } => addr,
        }
    }

    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.addr().socket_addr()
    }

    pub fn needs_resolution(&self) -> bool {
        matches!(self.addr(), UpstreamAddr::Unresolved { .. })
    }

    /// Copy of this endpoint with its hostname replaced by a resolved address.
    pub fn with_resolved_addr(&self, resolved: SocketAddr) -> Self {
        match self {
            UpstreamSpec::Udp { .. } => UpstreamSpec::Udp {
                addr: UpstreamAddr::Resolved(resolved),
            },
            UpstreamSpec::Tcp { .. } => UpstreamSpec::Tcp {
                addr: UpstreamAddr::Resolved(resolved),
            },
        }
    }

    pub fn protocol_name(&self) -> &'static str {
        match self {
            UpstreamSpec::Udp { .. } => "UDP",
            UpstreamSpec::Tcp { .. } => "TCP",
        }
    }
}

impl fmt::Display for UpstreamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamSpec::Udp { addr } => write!(f, "udp://{}", addr),
            UpstreamSpec::Tcp { addr } => write!(f, "tcp://{}", addr),
        }
    }
}

fn parse_host_port(s: &str) -> Option<(&str, u16)> {
    if let Some(rest) = s.strip_prefix('[') {
        let end = rest.find(']')?;
        let host = &rest[..end];
        let port = rest[end + 1..].strip_prefix(':')?.parse::<u16>().ok()?;
        Some((host, port))
    } else if let Some((host, port_str)) = s.rsplit_once(':') {
        let port = port_str.parse::<u16>().ok()?;
        Some((host, port))
    } else {
        None
    }
}

fn parse_upstream_addr(addr_str: &str) -> Result<UpstreamAddr, DomainError> {
    if let Ok(addr) = addr_str.parse::<SocketAddr>() {
        return Ok(UpstreamAddr::Resolved(addr));
    }
    if let Ok(ip) = addr_str.parse::<std::net::IpAddr>() {
        return Ok(UpstreamAddr::Resolved(SocketAddr::new(ip, DEFAULT_DNS_PORT)));
    }
    if let Some((host, port)) = parse_host_port(addr_str) {
        if !host.is_empty() && host.parse::<std::net::IpAddr>().is_err() {
            return Ok(UpstreamAddr::Unresolved {
                hostname: host.into(),
                port,
            });
        }
    }
    if !addr_str.is_empty() && !addr_str.contains(':') && !addr_str.contains('/') {
        return Ok(UpstreamAddr::Unresolved {
            hostname: addr_str.into(),
            port: DEFAULT_DNS_PORT,
        });
    }
    Err(DomainError::Config(format!(
        "invalid upstream address '{}'",
        addr_str
    )))
}

impl FromStr for UpstreamSpec {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(addr_str) = s.strip_prefix("udp://") {
            return Ok(UpstreamSpec::Udp {
                addr: parse_upstream_addr(addr_str)?,
            });
        }
        if let Some(addr_str) = s.strip_prefix("tcp://") {
            return Ok(UpstreamSpec::Tcp {
                addr: parse_upstream_addr(addr_str)?,
            });
        }
        if s.contains("://") {
            return Err(DomainError::Config(format!(
                "unsupported upstream scheme in '{}'; expected udp://, tcp://, or a plain address",
                s
            )));
        }
        Ok(UpstreamSpec::Udp {
            addr: parse_upstream_addr(s)?,
        })
    }
}

/// One line of upstream configuration.
///
/// The reserved-domain form `[/example.org/]tcp://10.0.0.1:53` routes the
/// named domains (and their subdomains) to this endpoint only; an empty domain
/// list means the endpoint serves every query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamEntry {
    pub domains: Vec<String>,
    pub spec: UpstreamSpec,
}

impl UpstreamEntry {
    pub fn is_general(&self) -> bool {
        self.domains.is_empty()
    }
}

impl FromStr for UpstreamEntry {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix("[/") {
            let (domain_part, addr_part) = rest.split_once("/]").ok_or_else(|| {
                DomainError::Config(format!("unterminated domain list in upstream '{}'", s))
            })?;
            let domains: Vec<String> = domain_part
                .split('/')
                .filter(|d| !d.is_empty())
                .map(|d| d.trim_end_matches('.').to_lowercase())
                .collect();
            if domains.is_empty() {
                return Err(DomainError::Config(format!(
                    "empty domain list in upstream '{}'",
                    s
                )));
            }
            return Ok(UpstreamEntry {
                domains,
                spec: addr_part.parse()?,
            });
        }
        Ok(UpstreamEntry {
            domains: Vec::new(),
            spec: s.parse()?,
        })
    }
}
