use clap::Parser;
use log::info;
use server::network::{Server, ServerConfig};
use std::time::Duration;

/// Authoritative avatar lobby server
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,
    /// Port to listen on
    #[clap(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,
    /// Milliseconds between server ticks
    #[clap(short, long, default_value = "100")]
    tick_ms: u64,
    /// Per-read and per-write socket timeout in milliseconds
    #[clap(long, default_value = "5000")]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        tick_interval: Duration::from_millis(args.tick_ms.max(1)),
        io_timeout: Duration::from_millis(args.timeout_ms),
    };

    let mut server = Server::bind(config).await?;

    tokio::select! {
        _ = server.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
