//! Error domains
//!
//! An error domain is a named space of numeric codes, each with one canonical
//! message. Domains are `'static` values; comparing two [`ErrorCode`]s never
//! looks at message text. The process-wide registry is written once at
//! startup and read-only afterwards, so lookups need no locking.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use crate::core::socks::SOCKS;
use crate::error::{ProxyError, Result};

/// Message returned for a domain name that was never registered
pub const UNKNOWN_DOMAIN_MESSAGE: &str = "unknown error domain";

/// A named, independently numbered error code space
pub trait ErrorDomain: Send + Sync + 'static {
    /// Domain name, unique within the registry
    fn name(&self) -> &'static str;

    /// Canonical message for `value`. Unknown values return the domain's
    /// fallback message.
    fn message(&self, value: i32) -> &'static str;
}

/// A (domain, value) pair
#[derive(Clone, Copy)]
pub struct ErrorCode {
    domain: &'static dyn ErrorDomain,
    value: i32,
}

impl ErrorCode {
    pub const fn new(domain: &'static dyn ErrorDomain, value: i32) -> Self {
        Self { domain, value }
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn domain(&self) -> &'static dyn ErrorDomain {
        self.domain
    }

    pub fn domain_name(&self) -> &'static str {
        self.domain.name()
    }

    pub fn message(&self) -> &'static str {
        self.domain.message(self.value)
    }
}

impl PartialEq for ErrorCode {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.domain.name() == other.domain.name()
    }
}

impl Eq for ErrorCode {}

impl Hash for ErrorCode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.domain.name().hash(state);
        self.value.hash(state);
    }
}

impl fmt::Debug for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorCode")
            .field("domain", &self.domain.name())
            .field("value", &self.value)
            .finish()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for ErrorCode {}

/// Build an error code in `domain`
pub fn make_error(domain: &'static dyn ErrorDomain, value: i32) -> ErrorCode {
    ErrorCode::new(domain, value)
}

/// Message for `value` in `domain`; never fails
pub fn message(domain: &dyn ErrorDomain, value: i32) -> &'static str {
    domain.message(value)
}

/// Failures of the endpoint parser
#[derive(Debug)]
pub struct EndpointDomain;

pub static ENDPOINT: EndpointDomain = EndpointDomain;

impl EndpointDomain {
    pub const INVALID_SCHEME: i32 = 1;
    pub const MISSING_SEPARATOR: i32 = 2;
    pub const EMPTY_AUTHORITY: i32 = 3;
    pub const INVALID_PORT: i32 = 4;
    pub const INVALID_HOST: i32 = 5;
}

impl ErrorDomain for EndpointDomain {
    fn name(&self) -> &'static str {
        "endpoint"
    }

    fn message(&self, value: i32) -> &'static str {
        match value {
            Self::INVALID_SCHEME => "invalid scheme",
            Self::MISSING_SEPARATOR => "missing \"://\" after scheme",
            Self::EMPTY_AUTHORITY => "empty authority",
            Self::INVALID_PORT => "invalid port",
            Self::INVALID_HOST => "invalid host",
            _ => "unknown endpoint error",
        }
    }
}

/// Failures of the transport layer that are not plain socket errors
#[derive(Debug)]
pub struct TransportDomain;

pub static TRANSPORT: TransportDomain = TransportDomain;

impl TransportDomain {
    pub const TIMEOUT: i32 = 1;
    pub const ABORTED: i32 = 2;
    pub const NOT_CONNECTED: i32 = 3;
    pub const NO_ADDRESSES: i32 = 4;
    pub const UNREACHABLE: i32 = 5;
}

impl ErrorDomain for TransportDomain {
    fn name(&self) -> &'static str {
        "transport"
    }

    fn message(&self, value: i32) -> &'static str {
        match value {
            Self::TIMEOUT => "operation timed out",
            Self::ABORTED => "operation aborted",
            Self::NOT_CONNECTED => "transport is not connected",
            Self::NO_ADDRESSES => "no addresses to connect to",
            Self::UNREACHABLE => "all connection attempts failed",
            _ => "unknown transport error",
        }
    }
}

/// Set of error domains keyed by name
pub struct Registry {
    domains: Vec<&'static dyn ErrorDomain>,
}

impl Registry {
    /// Registry holding the SOCKS, endpoint and transport domains
    pub fn with_builtins() -> Self {
        Self {
            domains: vec![&SOCKS, &ENDPOINT, &TRANSPORT],
        }
    }

    /// Add a domain; names must be unique
    pub fn register(&mut self, domain: &'static dyn ErrorDomain) -> Result<()> {
        if self.lookup(domain.name()).is_some() {
            return Err(ProxyError::InvalidArgument(format!(
                "error domain {} already registered",
                domain.name()
            )));
        }
        self.domains.push(domain);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&'static dyn ErrorDomain> {
        self.domains.iter().copied().find(|d| d.name() == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.domains.iter().map(|d| d.name())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Install the process-wide registry: the built-in domains plus `extra`.
///
/// Must run once at startup, before the first [`lookup`]. Fails if the
/// registry is already in place or a name collides.
pub fn install(extra: &[&'static dyn ErrorDomain]) -> Result<()> {
    let mut registry = Registry::with_builtins();
    for domain in extra {
        registry.register(*domain)?;
    }
    REGISTRY
        .set(registry)
        .map_err(|_| ProxyError::InvalidArgument("error domains already installed".to_string()))
}

/// The process-wide registry. Falls back to the built-in domains when
/// [`install`] was never called.
pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::with_builtins)
}

pub fn lookup(name: &str) -> Option<&'static dyn ErrorDomain> {
    registry().lookup(name)
}

/// Message for `value` in the domain called `name`
pub fn message_by_name(name: &str, value: i32) -> &'static str {
    lookup(name).map_or(UNKNOWN_DOMAIN_MESSAGE, |d| d.message(value))
}
