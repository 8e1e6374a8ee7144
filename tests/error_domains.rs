//! Process-wide domain registry.
//!
//! Kept in its own test binary: installing the registry is a one-shot
//! operation for the whole process.

use proxy_conn::core::errc::{self, ErrorDomain};
use proxy_conn::core::SocksErrc;

#[cfg(test)]
mod tests {
    use super::*;

    struct HttpDomain;

    static HTTP: HttpDomain = HttpDomain;

    impl ErrorDomain for HttpDomain {
        fn name(&self) -> &'static str {
            "http"
        }

        fn message(&self, value: i32) -> &'static str {
            match value {
                400 => "bad request",
                407 => "proxy authentication required",
                _ => "unknown http error",
            }
        }
    }

    #[test]
    fn test_install_then_lookup() {
        errc::install(&[&HTTP]).unwrap();

        assert_eq!(errc::message_by_name("http", 407), "proxy authentication required");
        assert_eq!(errc::message_by_name("http", 1), "unknown http error");
        assert_eq!(errc::message_by_name("SOCKS", 1011), "SOCKS Address type not supported");
        assert_eq!(errc::message_by_name("ftp", 1), errc::UNKNOWN_DOMAIN_MESSAGE);

        let names: Vec<_> = errc::registry().names().collect();
        assert_eq!(names, vec!["SOCKS", "endpoint", "transport", "http"]);

        // a second install fails and leaves the registry alone
        assert!(errc::install(&[]).is_err());
        assert!(errc::lookup("http").is_some());

        // codes from different domains never compare equal
        let http = errc::make_error(&HTTP, 1008);
        assert_ne!(http, SocksErrc::ConnectionRefused.code());
        assert_eq!(
            errc::make_error(errc::lookup("SOCKS").unwrap(), 1008),
            SocksErrc::ConnectionRefused.code()
        );
    }
}
