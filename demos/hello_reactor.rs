//! Runs the demo handler on the configured port (9999 by default).
//!
//! ```text
//! cargo run --example hello_reactor
//! curl -i http://127.0.0.1:9999/
//! ```

use pollhttp::{DemoHandler, Server, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config = ServerConfig::from_env()?;
    let server = Server::bind(config, DemoHandler)?;
    info!(port = server.local_addr().port(), "starting server, waiting for requests");

    server.run()?;
    Ok(())
}
