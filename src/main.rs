use std::time::Duration;

use clap::Parser;
use switchboard::signaling::{DEFAULT_SIGNALING_PORT, ServerConfig, SignalingServer};
use tracing_subscriber::EnvFilter;

/// Presence and call-signaling relay for peer-to-peer audio/video
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to accept WebSocket connections on
    #[arg(long, env = "SWITCHBOARD_BIND", default_value_t = format!("0.0.0.0:{}", DEFAULT_SIGNALING_PORT))]
    bind: String,

    /// Seconds between keep-alive pings
    #[arg(long, env = "SWITCHBOARD_PING_INTERVAL_SECS", default_value_t = 30)]
    ping_interval_secs: u64,

    /// Seconds to wait for a pong before dropping the connection
    #[arg(long, env = "SWITCHBOARD_PONG_TIMEOUT_SECS", default_value_t = 10)]
    pong_timeout_secs: u64,

    /// Longest accepted display name, in characters
    #[arg(long, env = "SWITCHBOARD_MAX_DISPLAY_NAME_LEN", default_value_t = 64)]
    max_display_name_len: usize,

    /// Capacity of the registry command queue
    #[arg(long, env = "SWITCHBOARD_COMMAND_BUFFER", default_value_t = 1024)]
    command_buffer: usize,
}

impl From<&Args> for ServerConfig {
    fn from(args: &Args) -> Self {
        Self {
            ping_interval: Duration::from_secs(args.ping_interval_secs.max(1)),
            pong_timeout: Duration::from_secs(args.pong_timeout_secs),
            max_display_name_len: args.max_display_name_len,
            command_buffer: args.command_buffer.max(1),
        }
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    println!("   Switchboard signaling relay");
    println!("   Binding to {}", args.bind);
    println!("   Press Ctrl+C to stop\n");

    let server = SignalingServer::new(ServerConfig::from(&args));

    tokio::select! {
        result = server.run(&args.bind) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
            Ok(())
        }
    }
}
