use super::{read_with_length_prefix, write_with_length_prefix, MAX_UDP_RESPONSE_SIZE};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, warn};
use warden_dns_domain::{DomainError, UpstreamSpec};

/// TC bit of the third header byte.
const FLAG_TRUNCATED: u8 = 0x02;

/// One-shot exchanges against a single upstream server.
pub struct Forwarder {
    timeout: Duration,
}

impl Forwarder {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Send `message_bytes` to `spec` and return the raw response.
    ///
    /// UDP answers carrying the TC bit are transparently retried over TCP
    /// against the same server.
    pub async fn exchange(
        &self,
        spec: &UpstreamSpec,
        message_bytes: &[u8],
    ) -> Result<Vec<u8>, DomainError> {
        let server = spec
            .socket_addr()
            .ok_or_else(|| DomainError::Config(format!("unresolved upstream '{}'", spec)))?;

        match spec {
            UpstreamSpec::Udp { .. } => {
                let response = self.exchange_udp(server, message_bytes).await?;
                if response.len() > 2 && response[2] & FLAG_TRUNCATED != 0 {
                    debug!(server = %server, "UDP response truncated, retrying over TCP");
                    return self.exchange_tcp(server, message_bytes).await;
                }
                Ok(response)
            }
            UpstreamSpec::Tcp { .. } => self.exchange_tcp(server, message_bytes).await,
        }
    }

    async fn exchange_udp(
        &self,
        server: SocketAddr,
        message_bytes: &[u8],
    ) -> Result<Vec<u8>, DomainError> {
        let bind_addr: SocketAddr = if server.is_ipv4() {
            "0.0.0.0:0".parse().unwrap()
        } else {
            "[::]:0".parse().unwrap()
        };

        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| DomainError::TransportIo {
                server: server.to_string(),
                reason: format!("failed to bind UDP socket: {}", e),
            })?;

        tokio::time::timeout(self.timeout, socket.send_to(message_bytes, server))
            .await
            .map_err(|_| DomainError::TransportTimeout {
                server: server.to_string(),
            })?
            .map_err(|e| DomainError::TransportIo {
                server: server.to_string(),
                reason: format!("failed to send query: {}", e),
            })?;

        let mut recv_buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
        loop {
            let (received, from) =
                tokio::time::timeout(self.timeout, socket.recv_from(&mut recv_buf))
                    .await
                    .map_err(|_| DomainError::TransportTimeout {
                        server: server.to_string(),
                    })?
                    .map_err(|e| DomainError::TransportIo {
                        server: server.to_string(),
                        reason: format!("failed to receive response: {}", e),
                    })?;

            // Unsolicited datagrams from other sources are ignored, not fatal.
            if from.ip() != server.ip() {
                warn!(expected = %server, received_from = %from, "UDP response from unexpected source");
                continue;
            }

            let mut response = recv_buf;
            response.truncate(received);
            return Ok(response);
        }
    }

    async fn exchange_tcp(
        &self,
        server: SocketAddr,
        message_bytes: &[u8],
    ) -> Result<Vec<u8>, DomainError> {
        let mut stream = tokio::time::timeout(self.timeout, TcpStream::connect(server))
            .await
            .map_err(|_| DomainError::TransportTimeout {
                server: server.to_string(),
            })?
            .map_err(|e| DomainError::TransportIo {
                server: server.to_string(),
                reason: format!("connection failed: {}", e),
            })?;

        tokio::time::timeout(self.timeout, write_with_length_prefix(&mut stream, message_bytes))
            .await
            .map_err(|_| DomainError::TransportTimeout {
                server: server.to_string(),
            })?
            .map_err(|e| DomainError::TransportIo {
                server: server.to_string(),
                reason: format!("failed to send query: {}", e),
            })?;

        tokio::time::timeout(self.timeout, read_with_length_prefix(&mut stream))
            .await
            .map_err(|_| DomainError::TransportTimeout {
                server: server.to_string(),
            })?
    }
}
