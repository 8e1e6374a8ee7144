//! Connection resolution and transport core of a forward proxy
//!
//! Architecture:
//! - `core/`: endpoint parsing, error domains, resolution cache and resolver
//! - `transport/`: rate-limited, deadline-aware stream transports and
//!   multi-address connect
//! - `dialer`: parse → resolve → connect for one proxied target

pub mod config;
pub mod core;
pub mod dialer;
pub mod error;
pub mod logger;
pub mod transport;

pub use dialer::Dialer;
pub use error::{ProxyError, Result};
