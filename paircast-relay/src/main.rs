//! `paircast-relay`: re-broadcasts every submitted chat message to every
//! connected client.
//!
//! ```bash
//! paircast-relay                          # listens on 0.0.0.0:4000
//! paircast-relay --bind 127.0.0.1:8080
//! RELAY_LOG=debug paircast-relay
//! ```

use std::sync::Arc;

use clap::Parser;
use paircast_relay::config::{RelayCliArgs, RelayConfig};
use paircast_relay::relay::{RelayState, start_server_with_state};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = match RelayConfig::load(&RelayCliArgs::parse()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("paircast-relay: {e}");
            std::process::exit(2);
        }
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let state = Arc::new(RelayState::with_config(config.max_payload_size));
    let listen = config.bind_addr.to_string();
    let (addr, server) = match start_server_with_state(&listen, Arc::clone(&state)).await {
        Ok(started) => started,
        Err(e) => {
            tracing::error!(addr = %listen, error = %e, "cannot start relay");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, max_payload = config.max_payload_size, "relay listening");

    tokio::select! {
        joined = server => {
            if let Err(e) = joined {
                tracing::error!(error = %e, "relay server task ended abnormally");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(
                clients = state.connection_count().await,
                "interrupt received, closing client connections"
            );
            state.close_all_connections().await;
        }
    }
}
