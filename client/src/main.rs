use clap::Parser;
use client::input::{InputEvent, InputManager};
use client::network::{Client, ClientConfig, ReconnectPolicy};
use client::rendering::{Hud, Renderer};
use log::{error, info};
use macroquad::prelude::*;
use shared::{DEFAULT_IO_TIMEOUT, DEFAULT_PORT};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server host to connect to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Window width
    #[arg(short = 'w', long, default_value = "1024")]
    width: i32,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "768")]
    height: i32,

    /// Delay before the first reconnect attempt
    #[arg(long, default_value = "0")]
    reconnect_delay_ms: u64,

    /// Upper bound for the doubling reconnect delay
    #[arg(long, default_value = "5000")]
    max_reconnect_delay_ms: u64,

    /// Give up after this many failed reconnect attempts
    #[arg(long)]
    max_reconnect_attempts: Option<u32>,
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: "Avatar Lobby".to_owned(),
        window_width: args.width,
        window_height: args.height,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    // Sockets live on this runtime; each frame blocks on it briefly.
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            return;
        }
    };

    let config = ClientConfig {
        server_addr: format!("{}:{}", args.host, args.port),
        io_timeout: DEFAULT_IO_TIMEOUT,
        reconnect: ReconnectPolicy {
            initial_delay: Duration::from_millis(args.reconnect_delay_ms),
            max_delay: Duration::from_millis(args.max_reconnect_delay_ms),
            max_attempts: args.max_reconnect_attempts,
        },
    };

    info!("Starting client...");
    info!("Connecting to: {}", config.server_addr);
    info!("Controls: click to walk, type and press Enter to chat");
    info!("Chat commands: /whisper <text>, /setskin");

    let mut client = Client::new(config);
    let mut renderer = Renderer::new(screen_width(), screen_height());
    let mut input = InputManager::new();

    loop {
        renderer.resize(screen_width(), screen_height());

        for event in input.update(&renderer) {
            match event {
                InputEvent::MoveTo(target) => {
                    runtime.block_on(client.request_move(target, &mut renderer))
                }
                InputEvent::Chat(text) => runtime.block_on(client.submit_chat(&text, &mut renderer)),
            }
        }

        runtime.block_on(client.update(&mut renderer));
        renderer.update(get_frame_time());

        renderer.draw(&Hud {
            status: client.status().to_string(),
            local_id: client.local_id(),
            chat_draft: input.chat_draft().to_string(),
        });

        next_frame().await;
    }
}
