use crate::errors::DomainError;
use ipnetwork::IpNetwork;
use std::collections::HashSet;
use std::net::IpAddr;

/// One entry of a client access list: an exact address or a CIDR network.
#[derive(Debug, Clone)]
enum ClientMatcher {
    Addr(IpAddr),
    Net(IpNetwork),
}

impl ClientMatcher {
    fn parse(entry: &str) -> Result<Self, DomainError> {
        if let Ok(addr) = entry.parse::<IpAddr>() {
            return Ok(ClientMatcher::Addr(addr));
        }
        entry
            .parse::<IpNetwork>()
            .map(ClientMatcher::Net)
            .map_err(|_| DomainError::InvalidCidr(entry.to_string()))
    }

    fn matches(&self, ip: IpAddr) -> bool {
        match self {
            ClientMatcher::Addr(addr) => *addr == ip,
            ClientMatcher::Net(net) => net.contains(ip),
        }
    }
}

/// Administrative access control, compiled once at prepare time.
///
/// A non-empty `allowed` list switches the controller into allowlist mode:
/// every client outside it is blocked and `disallowed` is ignored.
/// `blocked_hosts` are matched exactly, case-insensitively, against the query
/// name with its trailing dot stripped.
#[derive(Debug, Default)]
pub struct AccessList {
    allowed: Vec<ClientMatcher>,
    disallowed: Vec<ClientMatcher>,
    blocked_hosts: HashSet<String>,
}

impl AccessList {
    pub fn new(
        allowed: &[String],
        disallowed: &[String],
        blocked_hosts: &[String],
    ) -> Result<Self, DomainError> {
        let parse_all = |entries: &[String]| -> Result<Vec<ClientMatcher>, DomainError> {
            entries.iter().map(|e| ClientMatcher::parse(e)).collect()
        };

        Ok(AccessList {
            allowed: parse_all(allowed)?,
            disallowed: parse_all(disallowed)?,
            blocked_hosts: blocked_hosts.iter().map(|h| h.to_lowercase()).collect(),
        })
    }

    pub fn is_blocked_addr(&self, ip: IpAddr) -> bool {
        if !self.allowed.is_empty() {
            return !self.allowed.iter().any(|m| m.matches(ip));
        }
        self.disallowed.iter().any(|m| m.matches(ip))
    }

    pub fn is_blocked_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_lowercase();
        self.blocked_hosts.contains(&host)
    }
}
