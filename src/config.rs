//! Server Configuration
//!
//! Every setting can be given as a command-line flag or an environment
//! variable; flags win.
//!
//! ### CLI
//! ```bash
//! ./apiserver --port 8080 --tls-port 8443 --tls-self-signed --acceptors 2
//! ```
//!
//! ### Environment
//! ```bash
//! API_PORT=8080 API_WORKERS=8 LOG_LEVEL=debug ./apiserver
//! ```

use crate::request::{AggregatorConfig, HeaderWhitelist, DEFAULT_MAX_CONTENT_LENGTH};
use clap::Parser;
use std::path::PathBuf;
use thiserror::Error;

/// Reasons a configuration is rejected at startup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("acceptors must be >= 1")]
    NoAcceptors,

    #[error("workers must be >= 1")]
    NoWorkers,

    #[error("max content length must be > 0")]
    ZeroContentLength,

    #[error("plaintext and TLS ports must differ (both {0})")]
    PortClash(u16),

    #[error("--tls-cert and --tls-key must be given together")]
    PartialKeyPair,

    #[error("--tls-port needs --tls-cert/--tls-key or --tls-self-signed")]
    NoTlsIdentity,
}

/// API server configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "apiserver")]
#[command(about = "Minimal HTTP/1.1 JSON API server")]
#[command(version)]
pub struct Config {
    /// Host/IP to bind
    #[arg(long, default_value = "0.0.0.0", env = "API_HOST")]
    pub host: String,

    /// Plaintext HTTP port
    #[arg(short, long, default_value_t = crate::DEFAULT_PORT, env = "API_PORT")]
    pub port: u16,

    /// HTTPS port; TLS is disabled when unset
    #[arg(long, env = "API_TLS_PORT")]
    pub tls_port: Option<u16>,

    /// PEM certificate chain for the TLS listener
    #[arg(long, env = "API_TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key for the TLS listener
    #[arg(long, env = "API_TLS_KEY")]
    pub tls_key: Option<PathBuf>,

    /// Serve TLS with a generated self-signed certificate
    #[arg(long, env = "API_TLS_SELF_SIGNED")]
    pub tls_self_signed: bool,

    /// Accept tasks per listener
    #[arg(long, default_value_t = 1, env = "API_ACCEPTORS")]
    pub acceptors: usize,

    /// Runtime worker threads (defaults to one per core)
    #[arg(long, env = "API_WORKERS")]
    pub workers: Option<usize>,

    /// Largest request body accepted, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_CONTENT_LENGTH, env = "API_MAX_CONTENT_LENGTH")]
    pub max_content_length: usize,

    /// Request headers copied into the handler context
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "token,email,test",
        env = "API_CONTEXT_HEADERS"
    )]
    pub context_headers: Vec<String>,

    /// Never gzip responses, even when the client accepts it
    #[arg(long = "no-compression", env = "API_NO_COMPRESSION")]
    pub disable_compression: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,
}

impl Config {
    /// Plaintext bind address (host:port)
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// TLS bind address, if TLS is enabled
    pub fn tls_address(&self) -> Option<String> {
        self.tls_port.map(|port| format!("{}:{}", self.host, port))
    }

    /// Aggregation limits and header whitelist for every connection.
    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            max_content_length: self.max_content_length,
            headers: HeaderWhitelist::new(&self.context_headers),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.acceptors == 0 {
            return Err(ConfigError::NoAcceptors);
        }
        if self.workers == Some(0) {
            return Err(ConfigError::NoWorkers);
        }
        if self.max_content_length == 0 {
            return Err(ConfigError::ZeroContentLength);
        }
        if self.tls_cert.is_some() != self.tls_key.is_some() {
            return Err(ConfigError::PartialKeyPair);
        }
        if let Some(tls_port) = self.tls_port {
            if tls_port == self.port {
                return Err(ConfigError::PortClash(tls_port));
            }
            if self.tls_cert.is_none() && !self.tls_self_signed {
                return Err(ConfigError::NoTlsIdentity);
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: crate::DEFAULT_HOST.to_string(),
            port: crate::DEFAULT_PORT,
            tls_port: None,
            tls_cert: None,
            tls_key: None,
            tls_self_signed: false,
            acceptors: 1,
            workers: None,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            context_headers: vec!["token".into(), "email".into(), "test".into()],
            disable_compression: false,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.acceptors, 1);
        assert_eq!(config.max_content_length, 65536);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_address() {
        let mut config = Config::default();
        config.host = "127.0.0.1".to_string();
        assert_eq!(config.address(), "127.0.0.1:8080");
        assert_eq!(config.tls_address(), None);

        config.tls_port = Some(8443);
        assert_eq!(config.tls_address().as_deref(), Some("127.0.0.1:8443"));
    }

    #[test]
    fn test_parse_flags() {
        let config = Config::try_parse_from([
            "apiserver",
            "--port",
            "9000",
            "--tls-port",
            "9443",
            "--tls-self-signed",
            "--acceptors",
            "4",
            "--workers",
            "2",
            "--context-headers",
            "token,X-Trace",
            "--no-compression",
        ])
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.tls_port, Some(9443));
        assert!(config.tls_self_signed);
        assert_eq!(config.acceptors, 4);
        assert_eq!(config.workers, Some(2));
        assert_eq!(config.context_headers, vec!["token", "X-Trace"]);
        assert!(config.disable_compression);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_aggregator_config_uses_headers() {
        let mut config = Config::default();
        config.context_headers = vec!["X-Trace".to_string()];
        config.max_content_length = 10;

        let aggregator = config.aggregator_config();
        assert_eq!(aggregator.max_content_length, 10);
        assert!(aggregator.headers.contains("x-trace"));
        assert!(!aggregator.headers.contains("email"));
    }

    #[test]
    fn test_validate_zero_acceptors() {
        let mut config = Config::default();
        config.acceptors = 0;
        assert_eq!(config.validate(), Err(ConfigError::NoAcceptors));
    }

    #[test]
    fn test_validate_zero_workers() {
        let mut config = Config::default();
        config.workers = Some(0);
        assert_eq!(config.validate(), Err(ConfigError::NoWorkers));
    }

    #[test]
    fn test_validate_zero_content_length() {
        let mut config = Config::default();
        config.max_content_length = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroContentLength));
    }

    #[test]
    fn test_validate_port_clash() {
        let mut config = Config::default();
        config.tls_port = Some(config.port);
        config.tls_self_signed = true;
        assert_eq!(config.validate(), Err(ConfigError::PortClash(8080)));
    }

    #[test]
    fn test_validate_half_key_pair() {
        let mut config = Config::default();
        config.tls_cert = Some(PathBuf::from("cert.pem"));
        assert_eq!(config.validate(), Err(ConfigError::PartialKeyPair));
    }

    #[test]
    fn test_validate_tls_without_identity() {
        let mut config = Config::default();
        config.tls_port = Some(8443);
        assert_eq!(config.validate(), Err(ConfigError::NoTlsIdentity));

        config.tls_cert = Some(PathBuf::from("cert.pem"));
        config.tls_key = Some(PathBuf::from("key.pem"));
        assert!(config.validate().is_ok());
    }
}
