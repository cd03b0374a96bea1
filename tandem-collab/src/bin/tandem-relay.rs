//! Standalone relay server binary.
//!
//! ```text
//! tandem-relay [bind_addr]
//! ```
//!
//! Defaults to `127.0.0.1:9090`. Logging via `RUST_LOG`.

use tandem_collab::{RelayServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let bind_addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:9090".to_string());

    let server = RelayServer::new(ServerConfig {
        bind_addr,
        ..ServerConfig::default()
    });

    log::info!("starting relay on {}", server.bind_addr());
    server.run().await
}
