//! Configuration module for the dial probe
//!
//! CLI arguments with environment variable fallbacks, and the runtime
//! settings the dialer consumes.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::time::Duration;

use crate::core::resolver::DNS_RESOLVE_TIMEOUT;
use crate::transport::connect::{ConnectOptions, DEFAULT_CONNECT_TIMEOUT, HAPPY_EYEBALLS_DELAY};

/// Parse duration string (e.g., "60s", "200ms", "1m") or plain seconds
fn parse_duration(s: &str) -> Result<Duration, String> {
    if let Ok(d) = humantime::parse_duration(s) {
        return Ok(d);
    }
    s.parse::<u64>().map(Duration::from_secs).map_err(|_| {
        format!(
            "Invalid duration '{}'. Use formats like '5s', '200ms', '1m' or plain seconds",
            s
        )
    })
}

/// Default number of cached hostnames
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Default idle budget for reads and writes on a dialed transport
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// CLI arguments for the dial probe
///
/// Supports environment variables with PROXY_CONN_ prefix
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Resolve and connect to a proxied target the way the proxy does"
)]
#[command(rename_all = "snake_case")]
pub struct CliArgs {
    /// Target endpoint (e.g., "http://example.com/", "socks5://10.0.0.1:1080")
    #[arg(env = "PROXY_CONN_TARGET")]
    pub target: String,

    /// Maximum number of hostnames kept in the resolution cache
    #[arg(long, env = "PROXY_CONN_CACHE_CAPACITY", default_value_t = DEFAULT_CACHE_CAPACITY)]
    pub cache_capacity: usize,

    /// Per address connect timeout (default: 5s)
    #[arg(long, env = "PROXY_CONN_CONNECT_TIMEOUT", default_value = "5s", value_parser = parse_duration)]
    pub connect_timeout: Duration,

    /// Read/write deadline once connected (default: 30s)
    #[arg(long, env = "PROXY_CONN_IO_TIMEOUT", default_value = "30s", value_parser = parse_duration)]
    pub io_timeout: Duration,

    /// DNS resolution timeout (default: 10s)
    #[arg(long, env = "PROXY_CONN_DNS_TIMEOUT", default_value = "10s", value_parser = parse_duration)]
    pub dns_timeout: Duration,

    /// Head start of IPv6 over IPv4 attempts (default: 200ms)
    #[arg(long, env = "PROXY_CONN_HAPPY_EYEBALLS_DELAY", default_value = "200ms", value_parser = parse_duration)]
    pub happy_eyeballs_delay: Duration,

    /// Bytes per second in each direction, negative for unbounded
    #[arg(long, env = "PROXY_CONN_RATE_LIMIT", default_value_t = -1, allow_negative_numbers = true)]
    pub rate_limit: i64,

    /// Enable TCP_NODELAY on dialed connections (default: true)
    #[arg(long, env = "PROXY_CONN_TCP_NODELAY", default_value_t = true, action = clap::ArgAction::Set)]
    pub tcp_nodelay: bool,

    /// Log mode: trace, debug, info, warn, error (default: info)
    #[arg(long, env = "PROXY_CONN_LOG_MODE", default_value = "info")]
    pub log_mode: String,
}

impl CliArgs {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the CLI arguments
    pub fn validate(&self) -> Result<()> {
        if self.target.is_empty() {
            return Err(anyhow!("target endpoint is required"));
        }
        if self.cache_capacity == 0 {
            return Err(anyhow!("cache_capacity must be greater than 0"));
        }
        if self.connect_timeout.is_zero() {
            return Err(anyhow!("connect_timeout must be greater than 0"));
        }
        if self.dns_timeout.is_zero() {
            return Err(anyhow!("dns_timeout must be greater than 0"));
        }
        Ok(())
    }
}

/// Runtime connection settings
#[derive(Debug, Clone, Copy)]
pub struct DialConfig {
    pub cache_capacity: usize,
    pub connect: ConnectOptions,
    pub dns_timeout: Duration,
    pub io_timeout: Duration,
    /// Bytes per second, negative for unbounded
    pub rate_limit: i64,
    pub tcp_nodelay: bool,
}

impl DialConfig {
    pub fn from_cli(cli: &CliArgs) -> Self {
        Self {
            cache_capacity: cli.cache_capacity,
            connect: ConnectOptions {
                connect_timeout: cli.connect_timeout,
                happy_eyeballs_delay: cli.happy_eyeballs_delay,
            },
            dns_timeout: cli.dns_timeout,
            io_timeout: cli.io_timeout,
            rate_limit: cli.rate_limit,
            tcp_nodelay: cli.tcp_nodelay,
        }
    }
}

impl Default for DialConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            connect: ConnectOptions {
                connect_timeout: DEFAULT_CONNECT_TIMEOUT,
                happy_eyeballs_delay: HAPPY_EYEBALLS_DELAY,
            },
            dns_timeout: DNS_RESOLVE_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
            rate_limit: -1,
            tcp_nodelay: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_cli_args() -> CliArgs {
        CliArgs {
            target: "http://example.com/".to_string(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            connect_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(30),
            dns_timeout: Duration::from_secs(10),
            happy_eyeballs_delay: Duration::from_millis(200),
            rate_limit: -1,
            tcp_nodelay: true,
            log_mode: "info".to_string(),
        }
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("200ms").unwrap(), Duration::from_millis(200));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_cli_args_validate_success() {
        assert!(create_test_cli_args().validate().is_ok());
    }

    #[test]
    fn test_cli_args_validate_empty_target() {
        let mut cli = create_test_cli_args();
        cli.target = String::new();
        let result = cli.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("target"));
    }

    #[test]
    fn test_cli_args_validate_zero_capacity() {
        let mut cli = create_test_cli_args();
        cli.cache_capacity = 0;
        assert!(cli.validate().unwrap_err().to_string().contains("cache_capacity"));
    }

    #[test]
    fn test_cli_args_validate_zero_timeouts() {
        let mut cli = create_test_cli_args();
        cli.connect_timeout = Duration::ZERO;
        assert!(cli.validate().is_err());

        let mut cli = create_test_cli_args();
        cli.dns_timeout = Duration::ZERO;
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_cli_parse_from_args() {
        let cli = CliArgs::try_parse_from([
            "proxy-conn",
            "socks5://10.0.0.1",
            "--cache_capacity",
            "16",
            "--connect_timeout",
            "750ms",
            "--rate_limit",
            "-1",
            "--tcp_nodelay",
            "false",
        ])
        .unwrap();
        assert_eq!(cli.target, "socks5://10.0.0.1");
        assert_eq!(cli.cache_capacity, 16);
        assert_eq!(cli.connect_timeout, Duration::from_millis(750));
        assert_eq!(cli.rate_limit, -1);
        assert!(!cli.tcp_nodelay);
        assert_eq!(cli.happy_eyeballs_delay, Duration::from_millis(200));
    }

    #[test]
    fn test_dial_config_from_cli() {
        let mut cli = create_test_cli_args();
        cli.rate_limit = 4096;
        cli.happy_eyeballs_delay = Duration::from_millis(50);
        let config = DialConfig::from_cli(&cli);
        assert_eq!(config.rate_limit, 4096);
        assert_eq!(config.connect.happy_eyeballs_delay, Duration::from_millis(50));
        assert_eq!(config.connect.connect_timeout, Duration::from_secs(5));
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_dial_config_default_matches_cli_defaults() {
        let from_cli = DialConfig::from_cli(&create_test_cli_args());
        let default = DialConfig::default();
        assert_eq!(from_cli.cache_capacity, default.cache_capacity);
        assert_eq!(from_cli.dns_timeout, default.dns_timeout);
        assert_eq!(from_cli.io_timeout, default.io_timeout);
        assert_eq!(from_cli.rate_limit, default.rate_limit);
        assert_eq!(from_cli.connect.connect_timeout, default.connect.connect_timeout);
    }
}
