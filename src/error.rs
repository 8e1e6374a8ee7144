use std::io;
use thiserror::Error;

use crate::core::endpoint::ParseError;
use crate::core::errc::{ErrorCode, TransportDomain, TRANSPORT};
use crate::core::socks::SocksErrc;

/// 解析、寻址与传输失败的统一错误类型
#[derive(Error, Debug)]
pub enum ProxyError {
    /// 底层 socket 的 IO 错误
    #[error("IO error: {0}")]
    Io(#[source] io::Error),

    /// 操作完成前截止时间已到
    #[error("operation timed out")]
    Timeout,

    /// 传输已关闭，操作被取消
    #[error("operation aborted")]
    Aborted,

    /// 传输尚未连接
    #[error("transport is not connected")]
    NotConnected,

    /// 调用方参数错误
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// 目标地址格式错误
    #[error("endpoint parse error: {0}")]
    Parse(#[from] ParseError),

    /// 域名解析失败
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    /// 解析成功但没有可用地址
    #[error("no addresses for {0}")]
    NoAddresses(String),

    /// 所有解析地址均连接失败
    #[error("{target} unreachable after {attempts} attempt(s): {last}")]
    Unreachable {
        target: String,
        attempts: usize,
        #[source]
        last: Box<ProxyError>,
    },

    /// 通过已注册错误域上报的错误
    #[error("{0}")]
    Protocol(ErrorCode),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, ProxyError>;

impl From<io::Error> for ProxyError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut => ProxyError::Timeout,
            _ => ProxyError::Io(err),
        }
    }
}

impl From<ErrorCode> for ProxyError {
    fn from(code: ErrorCode) -> Self {
        ProxyError::Protocol(code)
    }
}

impl ProxyError {
    /// 是否超时（包括解析超时）
    pub fn is_timeout(&self) -> bool {
        match self {
            ProxyError::Timeout => true,
            ProxyError::Resolve { source, .. } => source.kind() == io::ErrorKind::TimedOut,
            _ => false,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, ProxyError::Aborted)
    }

    /// 是否值得换下一个地址重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProxyError::Timeout | ProxyError::Io(_))
    }

    /// 内置错误域中的错误码
    pub fn code(&self) -> Option<ErrorCode> {
        let transport = |value| Some(ErrorCode::new(&TRANSPORT, value));
        match self {
            ProxyError::Timeout => transport(TransportDomain::TIMEOUT),
            ProxyError::Aborted => transport(TransportDomain::ABORTED),
            ProxyError::NotConnected => transport(TransportDomain::NOT_CONNECTED),
            ProxyError::NoAddresses(_) => transport(TransportDomain::NO_ADDRESSES),
            ProxyError::Unreachable { .. } => transport(TransportDomain::UNREACHABLE),
            ProxyError::Parse(e) => Some(e.code()),
            ProxyError::Protocol(code) => Some(*code),
            _ => None,
        }
    }

    /// 对应的 SOCKS 应答码
    pub fn to_socks(&self) -> SocksErrc {
        match self {
            ProxyError::Timeout => SocksErrc::TtlExpired,
            ProxyError::Io(e) => match e.kind() {
                io::ErrorKind::ConnectionRefused => SocksErrc::ConnectionRefused,
                _ => SocksErrc::GeneralFailure,
            },
            ProxyError::Resolve { .. } | ProxyError::NoAddresses(_) => SocksErrc::HostUnreachable,
            ProxyError::Unreachable { last, .. } => last.to_socks(),
            ProxyError::Protocol(code) => SocksErrc::from_code(code).unwrap_or(SocksErrc::GeneralFailure),
            _ => SocksErrc::GeneralFailure,
        }
    }
}
