//! gopher-server: A minimal Gopher protocol server
//!
//! Serves a directory tree over Gopher:
//! - Empty selector returns a listing of the serve directory
//! - Selectors ending in `/` return a listing of that subdirectory
//! - Any other selector returns the raw bytes of that file
//!
//! Features:
//! - One request per connection, one task per connection
//! - Lookups confined to the serve directory
//! - Optional per-connection deadline and connection limit
//! - Configuration via CLI arguments or TOML file

mod config;
mod protocol;
mod server;
mod storage;

use config::Config;
use server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
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
        host = %config.host,
        port = config.port,
        directory = %config.directory.display(),
        max_connections = config.max_connections,
        timeout = config.timeout,
        "Starting gopher server"
    );

    let server = Server::new(config)?;
    server.run().await?;
    Ok(())
}
