// MIT License
//
// Copyright (c) 2025 Mike Chambers
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

use clap::Parser;
use sio_echo_server::{serve, EchoConfig, EchoState};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sio-echo-server")]
#[command(about = "Socket.IO 1.x echo server", long_about = None)]
struct Args {
    /// Host to bind to
    #[arg(long, env = "SIO_ECHO_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "SIO_ECHO_PORT", default_value = "9000")]
    port: u16,

    /// Heartbeat timeout advertised in the handshake, in seconds (0 disables)
    #[arg(long, default_value_t = 60)]
    heartbeat_timeout: u32,

    /// Close timeout advertised in the handshake, in seconds (0 disables)
    #[arg(long, default_value_t = 30)]
    close_timeout: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = Args::parse();
    let state = EchoState::new(EchoConfig {
        heartbeat_timeout: args.heartbeat_timeout,
        close_timeout: args.close_timeout,
    });

    let addr = SocketAddr::from((args.host.parse::<std::net::IpAddr>()?, args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Socket.IO echo server running on http://{}", addr);
    info!("Status endpoint: http://{}/status", addr);

    serve(listener, state).await?;
    Ok(())
}
