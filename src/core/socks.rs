//! SOCKS error domain
//!
//! Values start at 1000 and are append-only: new codes go at the end, existing
//! ones are never renumbered.

use super::errc::{ErrorCode, ErrorDomain};

/// Fallback message for values outside the SOCKS range
pub const SOCKS_UNKNOWN_MESSAGE: &str = "SOCKS Unknown PROXY error";

/// SOCKS reply codes
const SOCKS5_SUCCEEDED: u8 = 0x00;
const SOCKS5_GENERAL_FAILURE: u8 = 0x01;
const SOCKS5_NOT_ALLOWED: u8 = 0x02;
const SOCKS5_NETWORK_UNREACHABLE: u8 = 0x03;
const SOCKS5_HOST_UNREACHABLE: u8 = 0x04;
const SOCKS5_CONNECTION_REFUSED: u8 = 0x05;
const SOCKS5_TTL_EXPIRED: u8 = 0x06;
const SOCKS5_COMMAND_NOT_SUPPORTED: u8 = 0x07;
const SOCKS5_ADDRESS_TYPE_NOT_SUPPORTED: u8 = 0x08;

const SOCKS4_GRANTED: u8 = 90;
const SOCKS4_REJECTED_OR_FAILED: u8 = 91;
const SOCKS4_CANNOT_CONNECT_IDENTD: u8 = 92;
const SOCKS4_INCORRECT_USERID: u8 = 93;

/// SOCKS failure codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum SocksErrc {
    UnsupportedVersion = 1000,
    UsernameRequired = 1001,
    UnsupportedAuthenticationVersion = 1002,
    AuthenticationError = 1003,
    GeneralFailure = 1004,
    ConnectionNotAllowedByRuleset = 1005,
    NetworkUnreachable = 1006,
    HostUnreachable = 1007,
    ConnectionRefused = 1008,
    TtlExpired = 1009,
    CommandNotSupported = 1010,
    AddressTypeNotSupported = 1011,
    Unassigned = 1012,
    UnknownError = 1013,
    NoIdentd = 1014,
    IdentdError = 1015,
    RequestRejectedOrFailed = 1016,
    RequestRejectedCannotConnect = 1017,
    RequestRejectedIncorrectUserid = 1018,
}

impl SocksErrc {
    pub const ALL: [SocksErrc; 19] = [
        SocksErrc::UnsupportedVersion,
        SocksErrc::UsernameRequired,
        SocksErrc::UnsupportedAuthenticationVersion,
        SocksErrc::AuthenticationError,
        SocksErrc::GeneralFailure,
        SocksErrc::ConnectionNotAllowedByRuleset,
        SocksErrc::NetworkUnreachable,
        SocksErrc::HostUnreachable,
        SocksErrc::ConnectionRefused,
        SocksErrc::TtlExpired,
        SocksErrc::CommandNotSupported,
        SocksErrc::AddressTypeNotSupported,
        SocksErrc::Unassigned,
        SocksErrc::UnknownError,
        SocksErrc::NoIdentd,
        SocksErrc::IdentdError,
        SocksErrc::RequestRejectedOrFailed,
        SocksErrc::RequestRejectedCannotConnect,
        SocksErrc::RequestRejectedIncorrectUserid,
    ];

    pub fn value(self) -> i32 {
        self as i32
    }

    pub fn from_value(value: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.value() == value)
    }

    /// Inverse of [`SocksErrc::code`]; `None` for codes of other domains
    pub fn from_code(code: &ErrorCode) -> Option<Self> {
        if code.domain_name() != SOCKS.name() {
            return None;
        }
        Self::from_value(code.value())
    }

    pub fn code(self) -> ErrorCode {
        ErrorCode::new(&SOCKS, self.value())
    }

    pub fn message(self) -> &'static str {
        match self {
            SocksErrc::UnsupportedVersion => "SOCKS unsupported version",
            SocksErrc::UsernameRequired => "SOCKS username required",
            SocksErrc::UnsupportedAuthenticationVersion => "SOCKS unsupported authentication version",
            SocksErrc::AuthenticationError => "SOCKS authentication error",
            SocksErrc::GeneralFailure => "SOCKS general failure",
            SocksErrc::ConnectionNotAllowedByRuleset => "SOCKS connection not allowed by ruleset",
            SocksErrc::NetworkUnreachable => "SOCKS network unreachable",
            SocksErrc::HostUnreachable => "SOCKS host unreachable",
            SocksErrc::ConnectionRefused => "SOCKS connection refused",
            SocksErrc::TtlExpired => "SOCKS TTL expired",
            SocksErrc::CommandNotSupported => "SOCKS command not supported",
            SocksErrc::AddressTypeNotSupported => "SOCKS Address type not supported",
            SocksErrc::Unassigned => "SOCKS unassigned",
            SocksErrc::UnknownError => "SOCKS unknown error",
            SocksErrc::NoIdentd => "SOCKS no identd running",
            SocksErrc::IdentdError => "SOCKS identd error",
            SocksErrc::RequestRejectedOrFailed => "SOCKS request rejected or failed",
            SocksErrc::RequestRejectedCannotConnect => {
                "SOCKS request rejected because SOCKS server cannot connect to identd on the client"
            }
            SocksErrc::RequestRejectedIncorrectUserid => {
                "SOCKS request rejected because the client program and identd report different user-ids"
            }
        }
    }

    /// Map a SOCKS5 reply byte (RFC 1928 REP field). `None` means success.
    pub fn from_socks5_reply(rep: u8) -> Option<Self> {
        let errc = match rep {
            SOCKS5_SUCCEEDED => return None,
            SOCKS5_GENERAL_FAILURE => SocksErrc::GeneralFailure,
            SOCKS5_NOT_ALLOWED => SocksErrc::ConnectionNotAllowedByRuleset,
            SOCKS5_NETWORK_UNREACHABLE => SocksErrc::NetworkUnreachable,
            SOCKS5_HOST_UNREACHABLE => SocksErrc::HostUnreachable,
            SOCKS5_CONNECTION_REFUSED => SocksErrc::ConnectionRefused,
            SOCKS5_TTL_EXPIRED => SocksErrc::TtlExpired,
            SOCKS5_COMMAND_NOT_SUPPORTED => SocksErrc::CommandNotSupported,
            SOCKS5_ADDRESS_TYPE_NOT_SUPPORTED => SocksErrc::AddressTypeNotSupported,
            _ => SocksErrc::Unassigned,
        };
        Some(errc)
    }

    /// SOCKS5 reply byte to send for this failure
    pub fn to_socks5_reply(self) -> u8 {
        match self {
            SocksErrc::ConnectionNotAllowedByRuleset => SOCKS5_NOT_ALLOWED,
            SocksErrc::NetworkUnreachable => SOCKS5_NETWORK_UNREACHABLE,
            SocksErrc::HostUnreachable => SOCKS5_HOST_UNREACHABLE,
            SocksErrc::ConnectionRefused => SOCKS5_CONNECTION_REFUSED,
            SocksErrc::TtlExpired => SOCKS5_TTL_EXPIRED,
            SocksErrc::CommandNotSupported => SOCKS5_COMMAND_NOT_SUPPORTED,
            SocksErrc::AddressTypeNotSupported => SOCKS5_ADDRESS_TYPE_NOT_SUPPORTED,
            _ => SOCKS5_GENERAL_FAILURE,
        }
    }

    /// Map a SOCKS4 reply byte (CD field). `None` means request granted.
    pub fn from_socks4_reply(cd: u8) -> Option<Self> {
        let errc = match cd {
            SOCKS4_GRANTED => return None,
            SOCKS4_CANNOT_CONNECT_IDENTD => SocksErrc::RequestRejectedCannotConnect,
            SOCKS4_INCORRECT_USERID => SocksErrc::RequestRejectedIncorrectUserid,
            SOCKS4_REJECTED_OR_FAILED => SocksErrc::RequestRejectedOrFailed,
            _ => SocksErrc::RequestRejectedOrFailed,
        };
        Some(errc)
    }
}

impl From<SocksErrc> for ErrorCode {
    fn from(errc: SocksErrc) -> Self {
        errc.code()
    }
}

/// The "SOCKS" domain
#[derive(Debug)]
pub struct SocksDomain;

pub static SOCKS: SocksDomain = SocksDomain;

impl ErrorDomain for SocksDomain {
    fn name(&self) -> &'static str {
        "SOCKS"
    }

    fn message(&self, value: i32) -> &'static str {
        SocksErrc::from_value(value).map_or(SOCKS_UNKNOWN_MESSAGE, SocksErrc::message)
    }
}
