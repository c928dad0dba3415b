use axum::Router;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use warden_dns_application::ports::{FilterEngine, ResolvedHook, ServerHooks};
use warden_dns_domain::CliOverrides;
use warden_dns_infrastructure::dns::doh::register_handlers;
use warden_dns_infrastructure::dns::DnsServer;
use warden_dns_infrastructure::firewall::{PacketFilterConfig, PacketFilterHook};
use warden_dns_infrastructure::sinks::{TracingQueryLog, TracingStats};

mod bootstrap;
mod rules;

#[derive(Parser)]
#[command(name = "warden-dns")]
#[command(version)]
#[command(about = "Warden DNS - filtering recursive DNS forwarder")]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<String>,

    /// DNS listening port
    #[arg(short = 'd', long)]
    dns_port: Option<u16>,

    /// HTTP (DoH) listening port
    #[arg(short = 'w', long)]
    http_port: Option<u16>,

    /// Bind address
    #[arg(short = 'b', long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let overrides = CliOverrides {
        dns_port: cli.dns_port,
        http_port: cli.http_port,
        bind_address: cli.bind.clone(),
        log_level: cli.log_level.clone(),
    };

    let config = bootstrap::load_config(cli.config.as_deref(), overrides)?;
    bootstrap::init_logging(&config);

    info!("Starting warden-dns v{}", env!("CARGO_PKG_VERSION"));

    let filter: Arc<dyn FilterEngine> = Arc::new(rules::TableFilterEngine::from_config(&config.rules));

    let resolved_hook: Option<Arc<dyn ResolvedHook>> = if config.firewall.enabled {
        info!(
            table = %config.firewall.table,
            set = %config.firewall.set,
            "Packet-filter hook enabled"
        );
        Some(PacketFilterHook::new(PacketFilterConfig {
            family: config.firewall.family.clone(),
            table: config.firewall.table.clone(),
            set: config.firewall.set.clone(),
            timeout: config.firewall.timeout.clone(),
            min_filter_id: config.blocking.user_filter_id_min,
        }))
    } else {
        None
    };

    let server = Arc::new(DnsServer::new(
        Some(filter),
        Some(Arc::new(TracingQueryLog)),
        Some(Arc::new(TracingStats)),
        resolved_hook,
    ));

    server.prepare(config.clone(), ServerHooks::default()).await?;
    server.start().await?;

    // DoH and future admin handlers share the HTTP listener.
    let router = register_handlers(Router::new(), server.clone());
    let http_addr: SocketAddr = format!(
        "{}:{}",
        config.server.bind_address, config.server.http_port
    )
    .parse()?;
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    info!(bind_address = %http_addr, "HTTP server listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        {
            error!(error = %e, "HTTP server error");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    server.stop().await?;
    server.close().await;
    Ok(())
}
