mod access;
mod blocking;
mod dns;
mod errors;
mod firewall;
mod logging;
mod root;
mod rules;
mod server;

pub use access::AccessConfig;
pub use blocking::{BlockingConfig, BlockingMode};
pub use dns::{DnsConfig, EdnsClientSubnetConfig};
pub use errors::ConfigError;
pub use firewall::FirewallConfig;
pub use logging::LoggingConfig;
pub use root::{CliOverrides, Config, DEFAULT_BOOTSTRAP_DNS, DEFAULT_UPSTREAM_DNS};
pub use rules::{RewriteRule, RulesConfig};
pub use server::ServerConfig;
