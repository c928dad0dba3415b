pub mod access;
pub mod config;
pub mod errors;
pub mod filtering;
pub mod stats;
pub mod upstream;

pub use access::AccessList;
pub use config::{
    AccessConfig, BlockingConfig, BlockingMode, CliOverrides, Config, ConfigError, DnsConfig,
    EdnsClientSubnetConfig, FirewallConfig, LoggingConfig, RewriteRule, RulesConfig, ServerConfig,
};
pub use errors::DomainError;
pub use filtering::{FilterReason, FilterVerdict, RequestFilterSettings};
pub use stats::{ResultClass, StatsEntry};
pub use upstream::{UpstreamAddr, UpstreamEntry, UpstreamSpec};
