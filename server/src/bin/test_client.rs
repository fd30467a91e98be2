//! Headless client for poking a running server from the command line.
//!
//! Joins, walks in a small circle, shouts, whispers and asks for a new skin,
//! printing every message the server sends back.

use clap::Parser;
use shared::codec::Message;
use shared::transport::{FramedStream, TransportError};
use shared::{DEFAULT_IO_TIMEOUT, DEFAULT_PORT};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::sleep;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server host
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// How long to stay connected
    #[clap(short, long, default_value = "10")]
    seconds: u64,
}

async fn send(stream: &mut FramedStream<TcpStream>, message: Message) -> Result<(), TransportError> {
    println!("-> {:?}", message);
    stream.send(&message.encode()).await
}

/// Prints whatever arrives within `window`.
async fn drain(stream: &mut FramedStream<TcpStream>, window: Duration) -> Result<(), TransportError> {
    let deadline = Instant::now() + window;

    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match tokio::time::timeout(left, stream.receive()).await {
            Ok(Ok(payload)) => match Message::decode(&payload) {
                Ok(Message::AvatarSnapshot { avatars }) => {
                    println!("<- snapshot with {} avatars", avatars.len());
                    for avatar in avatars {
                        println!(
                            "     avatar {}: ({:.2}, {:.2}, {:.2}) skin {}",
                            avatar.id,
                            avatar.position.x,
                            avatar.position.y,
                            avatar.position.z,
                            avatar.skin
                        );
                    }
                }
                Ok(message) => println!("<- {:?}", message),
                Err(e) => println!("<- undecodable message: {}", e),
            },
            Ok(Err(e)) => return Err(e),
            Err(_) => break,
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    println!("Connecting to {}", addr);
    let mut stream = FramedStream::connect(&addr, DEFAULT_IO_TIMEOUT).await?;
    println!("Connected from {}", stream.get_ref().local_addr()?);

    match Message::decode(&stream.receive().await?)? {
        Message::AssignId { id } => println!("Assigned avatar {}", id),
        other => {
            println!("Expected AssignId but got: {:?}", other);
            return Ok(());
        }
    }

    send(&mut stream, Message::ChatCommand { text: "hello lobby".into() }).await?;
    send(&mut stream, Message::ChatCommand { text: "/whisper anyone close?".into() }).await?;
    send(&mut stream, Message::SkinChangeRequest).await?;

    let started = Instant::now();
    let mut step = 0u32;

    while started.elapsed() < Duration::from_secs(args.seconds) {
        let angle = step as f32 * 0.5;
        send(
            &mut stream,
            Message::MoveRequest {
                x: angle.cos() * 5.0,
                y: 0.0,
                z: angle.sin() * 5.0,
            },
        )
        .await?;
        step += 1;

        drain(&mut stream, Duration::from_secs(1)).await?;
    }

    stream.shutdown().await;
    println!("Test client finished");

    // Give the close a moment to reach the server before exiting.
    sleep(Duration::from_millis(100)).await;
    Ok(())
}
