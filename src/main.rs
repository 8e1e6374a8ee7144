//! Dial probe: resolve and connect to one target with the proxy's settings

// Use mimalloc as the global allocator for better performance
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::Result;
use std::time::Instant;

use proxy_conn::config::{CliArgs, DialConfig};
use proxy_conn::core::errc;
use proxy_conn::logger::{self, log};
use proxy_conn::Dialer;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CliArgs::parse_args();
    cli.validate()?;

    logger::init_logger(&cli.log_mode);
    errc::install(&[])?;

    let config = DialConfig::from_cli(&cli);
    log::info!(
        target_endpoint = %cli.target,
        connect_timeout = ?config.connect.connect_timeout,
        rate_limit = config.rate_limit,
        "Dialing"
    );

    let dialer = Dialer::from_config(config)?;
    let started = Instant::now();
    let (mut transport, remote) = match dialer.dial(&cli.target).await {
        Ok(dialed) => dialed,
        Err(e) => {
            log::dial_failure(&cli.target, &e);
            if let Some(code) = e.code() {
                log::info!(domain = code.domain_name(), code = code.value(), "Error code");
            }
            log::info!(socks_reply = e.to_socks().to_socks5_reply(), "SOCKS5 reply");
            return Err(e.into());
        }
    };

    transport.expires_after(config.io_timeout);
    let local = transport.local_endpoint()?;
    log::info!(
        remote = %remote,
        local = %local,
        elapsed = ?started.elapsed(),
        "Connected"
    );

    transport.shutdown().await?;
    transport.close();
    Ok(())
}
