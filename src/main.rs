//! ws-echo-relay: A WebSocket echo relay server
//!
//! Echoes every text or binary message back to its sender, byte for byte:
//! - Messages that fit the fixed echo buffer are accumulated and written
//!   in one piece
//! - Larger messages are streamed through chunk by chunk without buffering
//! - Configuration via CLI arguments or TOML file

mod config;
mod connection;
mod relay;
mod server;
mod transport;

use config::Config;
use server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        path = %config.path,
        buffer_size = config.buffer_size,
        tcp_fastopen = config.tcp_fastopen,
        "Starting ws-echo-relay server"
    );

    // One event per connection is processed to completion at a time; a
    // current-thread runtime keeps all relays on a single thread.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()?;

    runtime.block_on(Server::new(config).run())?;

    Ok(())
}
