//! Maps a filter verdict onto the DNS message actually sent to the client.

use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Record, RecordType};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::warn;
use warden_dns_domain::{BlockingConfig, BlockingMode, FilterReason, FilterVerdict};

use crate::ports::UpstreamResolver;
use crate::response;

/// Build the response for a query the filter engine decided to block.
///
/// Only A and AAAA questions get address answers; everything else is refused
/// with NXDOMAIN so clients cannot sidestep the block via other types.
pub async fn blocked_response(
    req: &Message,
    verdict: &FilterVerdict,
    blocking: &BlockingConfig,
    internal: &dyn UpstreamResolver,
) -> Message {
    let ttl = blocking.blocked_response_ttl;
    let qtype = req.queries().first().map(|q| q.query_type());

    if qtype != Some(RecordType::A) && qtype != Some(RecordType::AAAA) {
        return response::nxdomain(req, ttl);
    }

    match verdict.reason {
        FilterReason::FilteredSafeBrowsing => {
            substituted_host_response(req, &blocking.safe_browsing_block_host, ttl, internal).await
        }
        FilterReason::FilteredParental => {
            substituted_host_response(req, &blocking.parental_block_host, ttl, internal).await
        }
        _ => {
            // Safe-search rules carry the coerced endpoint address; it wins
            // over the blocking mode.
            if verdict.reason == FilterReason::FilteredSafeSearch {
                if let Some(ip) = verdict.ip {
                    return response::with_ip(req, ip, ttl);
                }
            }

            match blocking.mode {
                BlockingMode::NullIp => match qtype {
                    Some(RecordType::A) => response::a_record(req, Ipv4Addr::UNSPECIFIED, ttl),
                    _ => response::aaaa_record(req, Ipv6Addr::UNSPECIFIED, ttl),
                },
                BlockingMode::CustomIp => match qtype {
                    Some(RecordType::A) => match blocking.blocking_ipv4 {
                        Some(ip) => response::a_record(req, ip, ttl),
                        None => response::nxdomain(req, ttl),
                    },
                    _ => match blocking.blocking_ipv6 {
                        Some(ip) => response::aaaa_record(req, ip, ttl),
                        None => response::nxdomain(req, ttl),
                    },
                },
                BlockingMode::Nxdomain => response::nxdomain(req, ttl),
                BlockingMode::Default => match verdict.ip {
                    Some(ip) => response::with_ip(req, ip, ttl),
                    None => response::nxdomain(req, ttl),
                },
            }
        }
    }
}

/// Answer with the addresses of `block_host` instead of the queried name.
///
/// A literal address short-circuits; a hostname is resolved through the
/// internal resolver and its answers are re-labelled to the original qname so
/// the reply stays well-formed. Resolution failure turns into SERVFAIL.
async fn substituted_host_response(
    req: &Message,
    block_host: &str,
    ttl: u32,
    internal: &dyn UpstreamResolver,
) -> Message {
    if let Ok(ip) = block_host.parse::<IpAddr>() {
        return response::with_ip(req, ip, ttl);
    }

    let (orig_name, qtype) = match req.queries().first() {
        Some(q) => (q.name().clone(), q.query_type()),
        None => return response::servfail(req),
    };

    let lookup_name = match response::fqdn(block_host) {
        Ok(name) => name,
        Err(_) => {
            warn!(host = %block_host, "Substitution host is not a valid name");
            return response::servfail(req);
        }
    };

    // The transaction id is stamped by the resolver on send.
    let mut lookup = Message::new();
    lookup
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true);
    lookup.add_query(Query::query(lookup_name, qtype));

    match internal.exchange(&lookup, None).await {
        Ok(exchange) => {
            let mut resp = response::reply_to(req);
            for answer in exchange.response.answers() {
                if let Some(rdata) = answer.data() {
                    resp.add_answer(Record::from_rdata(
                        orig_name.clone(),
                        answer.ttl(),
                        rdata.clone(),
                    ));
                }
            }
            resp
        }
        Err(e) => {
            warn!(host = %block_host, error = %e, "Could not look up substitution host");
            response::servfail(req)
        }
    }
}
