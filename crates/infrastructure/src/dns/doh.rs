//! DNS-over-HTTPS handler surface (RFC 8484).
//!
//! `register_handlers` is pure: it mounts the `/dns-query` route onto the
//! router it is given and returns it. Calling it at most once per router is
//! the host application's contract; nothing here keeps global state.

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hickory_proto::op::Message;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;
use warden_dns_application::ClientProtocol;

use super::server::DnsServer;

const DNS_MESSAGE_CONTENT_TYPE: &str = "application/dns-message";

/// Mount the DoH endpoint onto `router`.
pub fn register_handlers(router: Router, server: Arc<DnsServer>) -> Router {
    router.route(
        "/dns-query",
        get(doh_get).post(doh_post).with_state(server),
    )
}

#[derive(Deserialize)]
struct DohQuery {
    dns: Option<String>,
}

async fn doh_get(
    State(server): State<Arc<DnsServer>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Query(params): Query<DohQuery>,
) -> Response {
    let Some(encoded) = params.dns else {
        return (StatusCode::BAD_REQUEST, "missing 'dns' query parameter").into_response();
    };
    let Ok(packet) = URL_SAFE_NO_PAD.decode(encoded.as_bytes()) else {
        return (StatusCode::BAD_REQUEST, "invalid base64url payload").into_response();
    };
    serve_packet(server, connect_info, &packet).await
}

async fn doh_post(
    State(server): State<Arc<DnsServer>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    if content_type != Some(DNS_MESSAGE_CONTENT_TYPE) {
        return (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "expected application/dns-message",
        )
            .into_response();
    }
    serve_packet(server, connect_info, &body).await
}

async fn serve_packet(
    server: Arc<DnsServer>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    packet: &[u8],
) -> Response {
    let req = match Message::from_vec(packet) {
        Ok(req) => req,
        Err(e) => {
            debug!(error = %e, "Unparseable DoH payload");
            return (StatusCode::BAD_REQUEST, "unparseable DNS message").into_response();
        }
    };

    let client = connect_info.map(|ConnectInfo(addr)| addr);
    let Some(response) = server.handle_query(req, client, ClientProtocol::Https).await else {
        return StatusCode::FORBIDDEN.into_response();
    };

    match response.to_vec() {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, DNS_MESSAGE_CONTENT_TYPE)],
            bytes,
        )
            .into_response(),
        Err(e) => {
            debug!(error = %e, "Failed to encode DoH response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
