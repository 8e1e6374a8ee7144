use std::str::FromStr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level '{}'", s)),
        }
    }
}

/// 未设置 `RUST_LOG` 时使用的过滤指令
pub fn default_directive(log_mode: &str) -> String {
    let level = log_mode.parse::<LogLevel>().unwrap_or_default();
    format!("proxy_conn={}", level.as_str())
}

pub fn init_logger(log_mode: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(log_mode)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(true)
                .with_ansi(true)
                .compact(),
        )
        .init();
}

pub mod log {
    pub use tracing::{debug, error, info, trace, warn};

    /// 记录域名解析事件
    pub fn resolve(host: &str, cached: bool, count: usize) {
        debug!(host = host, cached = cached, addresses = count, "Resolve");
    }

    /// 记录传输层事件
    pub fn transport(transport: &str, event: &str, details: Option<&str>) {
        if let Some(details) = details {
            debug!(transport = transport, event = event, details = details, "Transport");
        } else {
            debug!(transport = transport, event = event, "Transport");
        }
    }

    /// 记录拨号失败事件
    pub fn dial_failure(target: &str, error: &crate::error::ProxyError) {
        if error.is_timeout() {
            warn!(dest = target, error = %error, "Dial timed out");
        } else {
            warn!(dest = target, error = %error, "Dial failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parse() {
        assert_eq!("DEBUG".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!("warn".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive("trace"), "proxy_conn=trace");
        assert_eq!(default_directive("bogus"), "proxy_conn=info");
    }
}
