use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RecordType};
use std::str::FromStr;
use std::sync::Arc;
use warden_dns_application::ports::ServerHooks;
use warden_dns_application::ClientProtocol;
use warden_dns_domain::{Config, DomainError};
use warden_dns_infrastructure::dns::DnsServer;

fn test_config(dns_port: u16) -> Config {
    let mut config = Config::default();
    config.server.bind_address = "127.0.0.1".to_string();
    config.server.dns_port = dns_port;
    // Never contacted by these tests; prepare only needs it to parse.
    config.dns.upstream_dns = vec!["udp://127.0.0.1:1".to_string()];
    config.dns.bootstrap_dns = vec!["127.0.0.1:1".to_string()];
    config
}

fn query(name: &str, qtype: RecordType) -> Message {
    let mut req = Message::new();
    req.set_id(0x11ee)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true);
    req.add_query(Query::query(Name::from_str(name).unwrap(), qtype));
    req
}

fn client() -> Option<std::net::SocketAddr> {
    Some("192.0.2.10:53000".parse().unwrap())
}

#[tokio::test]
async fn test_lifecycle_prepare_start_stop() {
    let server = Arc::new(DnsServer::new(None, None, None, None));
    assert!(!server.is_running().await);

    server
        .prepare(test_config(55531), ServerHooks::default())
        .await
        .unwrap();
    assert!(!server.is_running().await);

    server.start().await.unwrap();
    assert!(server.is_running().await);

    server.stop().await.unwrap();
    assert!(!server.is_running().await);
}

#[tokio::test]
async fn test_reconfigure_moves_to_new_port() {
    let server = Arc::new(DnsServer::new(None, None, None, None));
    server
        .prepare(test_config(55532), ServerHooks::default())
        .await
        .unwrap();
    server.start().await.unwrap();

    server
        .reconfigure(test_config(55533), ServerHooks::default())
        .await
        .unwrap();
    assert!(server.is_running().await);
    assert_eq!(
        server.current_config().await.unwrap().server.dns_port,
        55533
    );

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_reconfigure_failure_leaves_server_stopped() {
    let server = Arc::new(DnsServer::new(None, None, None, None));
    server
        .prepare(test_config(55534), ServerHooks::default())
        .await
        .unwrap();
    server.start().await.unwrap();

    let mut bad = test_config(55534);
    bad.dns.upstream_dns = vec!["tls://dns.example:853".to_string()];
    let result = server.reconfigure(bad, ServerHooks::default()).await;

    assert!(matches!(result, Err(DomainError::Reconfigure(_))));
    assert!(!server.is_running().await);
}

#[tokio::test]
async fn test_prepare_rejects_custom_ip_without_addresses() {
    let server = DnsServer::new(None, None, None, None);
    let mut config = test_config(55535);
    config.blocking.mode = warden_dns_domain::BlockingMode::CustomIp;
    config.blocking.blocking_ipv4 = Some("198.51.100.1".parse().unwrap());

    let result = server.prepare(config, ServerHooks::default()).await;
    assert!(matches!(result, Err(DomainError::Config(_))));
}

#[tokio::test]
async fn test_resolve_before_prepare_is_rejected() {
    let server = DnsServer::new(None, None, None, None);
    let result = server.resolve("example.com").await;
    assert!(matches!(result, Err(DomainError::NotPrepared)));
}

#[tokio::test]
async fn test_unprepared_server_drops_queries() {
    let server = DnsServer::new(None, None, None, None);
    let response = server
        .handle_query(query("example.com.", RecordType::A), client(), ClientProtocol::Udp)
        .await;
    assert!(response.is_none());
}

#[tokio::test]
async fn test_disallowed_client_is_dropped() {
    let server = DnsServer::new(None, None, None, None);
    let mut config = test_config(55536);
    config.access.disallowed_clients = vec!["192.0.2.0/24".to_string()];
    server.prepare(config, ServerHooks::default()).await.unwrap();

    let response = server
        .handle_query(query("example.com.", RecordType::A), client(), ClientProtocol::Udp)
        .await;
    assert!(response.is_none());
}

#[tokio::test]
async fn test_blocked_host_is_dropped() {
    let server = DnsServer::new(None, None, None, None);
    let mut config = test_config(55537);
    config.access.blocked_hosts = vec!["forbidden.example".to_string()];
    server.prepare(config, ServerHooks::default()).await.unwrap();

    let response = server
        .handle_query(query("forbidden.example.", RecordType::A), client(), ClientProtocol::Udp)
        .await;
    assert!(response.is_none());
}

#[tokio::test]
async fn test_allowlist_mode_drops_everyone_else() {
    let server = DnsServer::new(None, None, None, None);
    let mut config = test_config(55538);
    config.access.allowed_clients = vec!["10.0.0.0/8".to_string()];
    server.prepare(config, ServerHooks::default()).await.unwrap();

    let response = server
        .handle_query(query("example.com.", RecordType::A), client(), ClientProtocol::Udp)
        .await;
    assert!(response.is_none());
}

#[tokio::test]
async fn test_mozilla_canary_answered_without_upstream() {
    // The upstream points at a dead port; the canary never gets that far.
    let server = DnsServer::new(None, None, None, None);
    server
        .prepare(test_config(55539), ServerHooks::default())
        .await
        .unwrap();

    let response = server
        .handle_query(
            query("use-application-dns.net.", RecordType::A),
            client(),
            ClientProtocol::Udp,
        )
        .await
        .expect("canary must be answered");
    assert_eq!(response.response_code(), ResponseCode::NXDomain);
    assert_eq!(response.id(), 0x11ee);
}

#[tokio::test]
async fn test_close_drops_collaborators() {
    let server = Arc::new(DnsServer::new(None, None, None, None));
    server
        .prepare(test_config(55541), ServerHooks::default())
        .await
        .unwrap();
    server.close().await;

    assert!(server.current_config().await.is_none());
    let response = server
        .handle_query(query("example.com.", RecordType::A), client(), ClientProtocol::Udp)
        .await;
    assert!(response.is_none());
}

#[tokio::test]
async fn test_aaaa_disabled_answered_without_upstream() {
    let server = DnsServer::new(None, None, None, None);
    let mut config = test_config(55540);
    config.dns.aaaa_disabled = true;
    server.prepare(config, ServerHooks::default()).await.unwrap();

    let response = server
        .handle_query(query("example.com.", RecordType::AAAA), client(), ClientProtocol::Udp)
        .await
        .expect("AAAA must be answered");
    assert!(response.answers().is_empty());
    assert_eq!(response.response_code(), ResponseCode::NoError);
}
