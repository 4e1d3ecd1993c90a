//! Real-Time Chat Hub - Entry Point
//!
//! Starts the TCP listener and accepts connections until a shutdown signal
//! arrives, then drains connection tasks within a grace period.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use chathub::{handle_connection, Broadcaster, Dispatcher, NlpServices, Registry, ServerConfig, ServerContext};

/// How long connection tasks get to wind down after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chathub=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chathub=info")),
        )
        .init();

    let config = ServerConfig::from_env();

    // Get bind address from command line or config
    let addr = env::args().nth(1).unwrap_or_else(|| config.addr.clone());

    // Start TCP listener
    let listener = TcpListener::bind(&addr).await?;
    info!("Chat hub listening on {}", addr);
    info!("NLP collaborators at {}", config.nlp_base_url);

    let registry = Arc::new(Registry::new());
    let broadcaster = Broadcaster::new(registry.clone());
    let nlp = NlpServices::over_http(&config.nlp_base_url, config.nlp_timeout);
    let dispatcher = Arc::new(Dispatcher::new(nlp, broadcaster.clone()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ctx = ServerContext {
        registry,
        broadcaster,
        dispatcher,
        shutdown: shutdown_rx,
    };

    // Connection accept loop
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        info!("New connection from {}", peer);
                        let ctx = ctx.clone();

                        // Spawn handler task for each connection
                        connections.spawn(async move {
                            if let Err(e) = handle_connection(stream, peer.to_string(), ctx).await {
                                info!("Connection handler finished with: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    // Stop accepting, tell every connection task to wind down, then drain
    drop(listener);
    let _ = shutdown_tx.send(true);

    let drain = async {
        while connections.join_next().await.is_some() {}
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!("Shutdown grace period elapsed, aborting remaining connections");
        connections.shutdown().await;
    }

    info!("Chat hub stopped");
    Ok(())
}
