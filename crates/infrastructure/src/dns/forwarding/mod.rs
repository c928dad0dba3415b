//! Client-side DNS transports (RFC 1035 §4.2).
//!
//! UDP first; responses with the TC bit set are retried over TCP with the
//! standard 2-byte length framing.

mod forwarder;

pub use forwarder::Forwarder;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use warden_dns_domain::DomainError;

pub(crate) const MAX_UDP_RESPONSE_SIZE: usize = 4096;
pub(crate) const MAX_TCP_MESSAGE_SIZE: usize = 65_535;

pub(crate) async fn write_with_length_prefix<S>(
    stream: &mut S,
    message_bytes: &[u8],
) -> std::io::Result<()>
where
    S: AsyncWriteExt + Unpin,
{
    let length = (message_bytes.len() as u16).to_be_bytes();
    stream.write_all(&length).await?;
    stream.write_all(message_bytes).await?;
    stream.flush().await
}

pub(crate) async fn read_with_length_prefix<S>(stream: &mut S) -> Result<Vec<u8>, DomainError>
where
    S: AsyncReadExt + Unpin,
{
    let mut len_buf = [0u8; 2];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| DomainError::TransportIo {
            server: "peer".to_string(),
            reason: format!("failed to read length prefix: {}", e),
        })?;

    let response_len = u16::from_be_bytes(len_buf) as usize;
    if response_len > MAX_TCP_MESSAGE_SIZE {
        return Err(DomainError::InvalidDnsMessage(format!(
            "framed message too large: {} bytes",
            response_len
        )));
    }

    let mut response = vec![0u8; response_len];
    stream
        .read_exact(&mut response)
        .await
        .map_err(|e| DomainError::TransportIo {
            server: "peer".to_string(),
            reason: format!("failed to read framed message: {}", e),
        })?;

    Ok(response)
}
