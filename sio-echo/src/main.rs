//! Socket.IO 1.x Echo Client
//!
//! Connects to an echo server, emits the greeting events and logs every
//! session notification until Ctrl+C or the session ends.

mod client;

use clap::Parser;
use sio_client::{ClientConfig, SessionEvent};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server URL; its path selects the endpoint
    #[arg(long, env = "SIO_URL", default_value = "http://localhost:9000")]
    url: String,

    /// Endpoint to request instead of the URL path
    #[arg(long, env = "SIO_ENDPOINT")]
    endpoint: Option<String>,

    /// Handshake, connect and reply timeout in milliseconds
    #[arg(long, env = "SIO_TIMEOUT", default_value = "10000")]
    timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let timeout = Duration::from_millis(args.timeout);
    let mut config = ClientConfig::default()
        .with_handshake_timeout(timeout)
        .with_connect_timeout(timeout);
    if let Some(endpoint) = args.endpoint {
        config = config.with_endpoint(endpoint);
    }

    let client = client::EchoClient::connect(&args.url, config, args.timeout).await?;
    let mut events = client.session().events();

    client.greet().await?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    info!("{}", client::describe(&event));
                    if matches!(event, SessionEvent::Failed(_) | SessionEvent::TransportClosed) {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => warn!("Missed {} notifications", missed),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    client.close().await?;
    info!("Echo client shutting down. Goodbye.");
    Ok(())
}
