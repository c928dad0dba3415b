use serde::{Deserialize, Serialize};

use super::access::AccessConfig;
use super::blocking::BlockingConfig;
use super::dns::DnsConfig;
use super::errors::ConfigError;
use super::firewall::FirewallConfig;
use super::logging::LoggingConfig;
use super::rules::RulesConfig;
use super::server::ServerConfig;
use crate::access::AccessList;
use crate::upstream::UpstreamEntry;

/// Upstreams used when the operator configured none.
pub const DEFAULT_UPSTREAM_DNS: &[&str] = &["udp://9.9.9.10:53", "udp://149.112.112.10:53"];

/// Plain resolvers used to bootstrap hostname-form upstream endpoints.
pub const DEFAULT_BOOTSTRAP_DNS: &[&str] =
    &["9.9.9.10", "149.112.112.10", "2620:fe::10", "2620:fe::fe:10"];

/// Main configuration structure for warden-dns.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Listening ports and bind address.
    #[serde(default)]
    pub server: ServerConfig,

    /// Forwarding, DNSSEC, EDNS, and rate-limit settings.
    #[serde(default)]
    pub dns: DnsConfig,

    /// Blocking mode and substitution hosts.
    #[serde(default)]
    pub blocking: BlockingConfig,

    /// Client and host access control.
    #[serde(default)]
    pub access: AccessConfig,

    /// Rule tables for the default filter engine.
    #[serde(default)]
    pub rules: RulesConfig,

    /// Packet-filter hook for allowlisted answers.
    #[serde(default)]
    pub firewall: FirewallConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file or use defaults.
    ///
    /// Priority order:
    /// 1. Explicitly provided path
    /// 2. warden-dns.toml in current directory
    /// 3. /etc/warden-dns/config.toml
    /// 4. Default configuration
    pub fn load(path: Option<&str>, cli_overrides: CliOverrides) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = path {
            Self::from_file(path)?
        } else if std::path::Path::new("warden-dns.toml").exists() {
            Self::from_file("warden-dns.toml")?
        } else if std::path::Path::new("/etc/warden-dns/config.toml").exists() {
            Self::from_file("/etc/warden-dns/config.toml")?
        } else {
            Self::default()
        };

        config.apply_cli_overrides(cli_overrides);
        config.apply_upstream_defaults();
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn apply_cli_overrides(&mut self, overrides: CliOverrides) {
        if let Some(port) = overrides.dns_port {
            self.server.dns_port = port;
        }
        if let Some(port) = overrides.http_port {
            self.server.http_port = port;
        }
        if let Some(bind) = overrides.bind_address {
            self.server.bind_address = bind;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    /// Fill in stock upstreams when the operator configured none.
    fn apply_upstream_defaults(&mut self) {
        if self.dns.upstream_dns.is_empty() {
            self.dns.upstream_dns = DEFAULT_UPSTREAM_DNS.iter().map(|s| s.to_string()).collect();
        }
        if self.dns.bootstrap_dns.is_empty() {
            self.dns.bootstrap_dns = DEFAULT_BOOTSTRAP_DNS
                .iter()
                .map(|s| s.to_string())
                .collect();
        }
    }

    /// Validate configuration. Every error here must fail preparation; none
    /// of them is recoverable at request time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.dns_port == 0 {
            return Err(ConfigError::Validation("DNS port cannot be 0".to_string()));
        }

        self.blocking.validate()?;

        for entry in &self.dns.upstream_dns {
            entry
                .parse::<UpstreamEntry>()
                .map_err(|e| ConfigError::Validation(e.to_string()))?;
        }

        AccessList::new(
            &self.access.allowed_clients,
            &self.access.disallowed_clients,
            &self.access.blocked_hosts,
        )
        .map_err(|e| ConfigError::Validation(e.to_string()))?;

        Ok(())
    }

    /// Save configuration to file.
    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, toml_string)
            .map_err(|e| ConfigError::FileWrite(path.to_string(), e.to_string()))?;
        Ok(())
    }
}

/// Command-line overrides for configuration.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub dns_port: Option<u16>,
    pub http_port: Option<u16>,
    pub bind_address: Option<String>,
    pub log_level: Option<String>,
}
