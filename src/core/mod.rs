//! Core connection resolution module
//!
//! - Endpoint parsing of proxied targets
//! - Error domains (SOCKS, endpoint, transport)
//! - LRU resolution cache and the resolver in front of it

pub mod cache;
pub mod endpoint;
pub mod errc;
pub mod resolver;
pub mod socks;

pub use cache::{CacheStats, ResolutionCache, SharedCache, CACHE_TTL};
pub use endpoint::{EndpointDescriptor, OwnedEndpoint, ParseError};
pub use errc::{ErrorCode, ErrorDomain};
pub use resolver::{CachingResolver, Resolve, SystemResolver};
pub use socks::SocksErrc;
