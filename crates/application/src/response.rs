//! DNS response synthesis.
//!
//! Every function here builds a reply from the request as template, so the
//! id, opcode, question section, and recursion-desired bit always mirror the
//! client's message. Name compression is applied by the wire encoder on emit.

use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::rdata::{AAAA, CNAME, PTR, SOA, A};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use warden_dns_domain::DomainError;

/// TTL used on SOA records when `blocked_response_ttl` is configured as 0.
pub const FALLBACK_SOA_TTL: u32 = 3600;

/// Primary NS name advertised in synthesized SOA records. The exact value is
/// irrelevant to resolvers; it only has to be stable for negative caching.
const SOA_PRIMARY_NS: &str = "fake-for-negative-caching.adguard.com.";

const SOA_SERIAL: u32 = 100_500;
const SOA_REFRESH: i32 = 1800;
const SOA_RETRY: i32 = 900;
const SOA_EXPIRE: i32 = 604_800;
const SOA_MINIMUM: u32 = 86_400;

fn question_name(req: &Message) -> Name {
    req.queries()
        .first()
        .map(|q| q.name().clone())
        .unwrap_or_else(Name::root)
}

/// Parse `host` into an FQDN, appending the root label when missing.
pub fn fqdn(host: &str) -> Result<Name, DomainError> {
    let mut name =
        Name::from_utf8(host).map_err(|_| DomainError::InvalidDomainName(host.to_string()))?;
    name.set_fqdn(true);
    Ok(name)
}

/// Fresh reply mirroring the request's id, opcode, question, and RD bit.
pub fn reply_to(req: &Message) -> Message {
    let mut resp = Message::new();
    resp.set_id(req.id())
        .set_message_type(MessageType::Response)
        .set_op_code(req.op_code())
        .set_recursion_desired(req.recursion_desired())
        .set_recursion_available(true);
    for query in req.queries() {
        resp.add_query(query.clone());
    }
    resp
}

pub fn a_answer(req: &Message, ip: Ipv4Addr, ttl: u32) -> Record {
    Record::from_rdata(question_name(req), ttl, RData::A(A(ip)))
}

pub fn aaaa_answer(req: &Message, ip: Ipv6Addr, ttl: u32) -> Record {
    Record::from_rdata(question_name(req), ttl, RData::AAAA(AAAA(ip)))
}

/// CNAME answer from the request's qname to `target` (made absolute).
pub fn cname_answer(req: &Message, target: &str, ttl: u32) -> Result<Record, DomainError> {
    Ok(Record::from_rdata(
        question_name(req),
        ttl,
        RData::CNAME(CNAME(fqdn(target)?)),
    ))
}

pub fn ptr_answer(req: &Message, target: &str, ttl: u32) -> Result<Record, DomainError> {
    Ok(Record::from_rdata(
        question_name(req),
        ttl,
        RData::PTR(PTR(fqdn(target)?)),
    ))
}

pub fn a_record(req: &Message, ip: Ipv4Addr, ttl: u32) -> Message {
    let mut resp = reply_to(req);
    resp.add_answer(a_answer(req, ip, ttl));
    resp
}

pub fn aaaa_record(req: &Message, ip: Ipv6Addr, ttl: u32) -> Message {
    let mut resp = reply_to(req);
    resp.add_answer(aaaa_answer(req, ip, ttl));
    resp
}

/// NXDOMAIN with an SOA in the authority section for negative caching.
pub fn nxdomain(req: &Message, blocked_ttl: u32) -> Message {
    let mut resp = reply_to(req);
    resp.set_response_code(ResponseCode::NXDomain);
    resp.add_name_server(soa_record(req, blocked_ttl));
    resp
}

pub fn servfail(req: &Message) -> Message {
    let mut resp = reply_to(req);
    resp.set_response_code(ResponseCode::ServFail);
    resp
}

/// A or AAAA reply depending on the question type and the address family.
///
/// Mismatched combinations (an IPv6 address for an A question, or any
/// non-address question type) produce an empty NOERROR reply.
pub fn with_ip(req: &Message, ip: IpAddr, ttl: u32) -> Message {
    let qtype = req.queries().first().map(|q| q.query_type());
    match (qtype, ip) {
        (Some(RecordType::A), IpAddr::V4(v4)) => a_record(req, v4, ttl),
        (Some(RecordType::A), IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
            Some(v4) => a_record(req, v4, ttl),
            None => reply_to(req),
        },
        (Some(RecordType::AAAA), IpAddr::V6(v6)) if v6.to_ipv4_mapped().is_none() => {
            aaaa_record(req, v6, ttl)
        }
        _ => reply_to(req),
    }
}

/// SOA for the question's zone.
///
/// The numeric fields are fixed: they only matter for zone transfers, which
/// never happen here. The rname is `hostmaster.` prefixed onto the zone when
/// the zone is non-empty and does not itself start with a dot.
fn soa_record(req: &Message, blocked_ttl: u32) -> Record {
    let zone = question_name(req);
    let zone_str = zone.to_utf8();

    let mut rname = String::from("hostmaster.");
    if !zone_str.is_empty() && !zone_str.starts_with('.') {
        rname.push_str(&zone_str);
    }

    let soa = SOA::new(
        Name::from_ascii(SOA_PRIMARY_NS).unwrap_or_else(|_| Name::root()),
        Name::from_utf8(&rname).unwrap_or_else(|_| Name::root()),
        SOA_SERIAL,
        SOA_REFRESH,
        SOA_RETRY,
        SOA_EXPIRE,
        SOA_MINIMUM,
    );

    let ttl = if blocked_ttl == 0 {
        FALLBACK_SOA_TTL
    } else {
        blocked_ttl
    };

    Record::from_rdata(zone, ttl, RData::SOA(soa))
}
