//! Client session: one TCP connection to the server, driven per frame.

use crate::game::ClientGameState;
use crate::rendering::AvatarRenderer;
use log::{debug, error, info, warn};
use shared::codec::Message;
use shared::transport::{FramedStream, Liveness};
use shared::{Vec3, DEFAULT_IO_TIMEOUT, DEFAULT_PORT, SKIN_COMMAND};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

/// When to retry after losing the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Wait before the first retry. Zero retries immediately.
    pub initial_delay: Duration,
    /// Upper bound for the doubling delay.
    pub max_delay: Duration,
    /// Failed attempts allowed before giving up. `None` never gives up.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before attempt number `attempt` (counting from 1).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(31);
        self.initial_delay
            .saturating_mul(1u32 << doublings)
            .min(self.max_delay)
    }

    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: String,
    pub io_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: format!("127.0.0.1:{}", DEFAULT_PORT),
            io_timeout: DEFAULT_IO_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Reconnecting { attempt: u32 },
    GaveUp,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Reconnecting { attempt } => write!(f, "reconnecting (attempt {})", attempt),
            ConnectionStatus::GaveUp => write!(f, "disconnected"),
        }
    }
}

/// Outgoing message for a line typed into the chat box.
pub fn chat_message(text: &str) -> Message {
    if text.trim().eq_ignore_ascii_case(SKIN_COMMAND) {
        Message::SkinChangeRequest
    } else {
        Message::ChatCommand {
            text: text.to_string(),
        }
    }
}

pub struct Client {
    config: ClientConfig,
    stream: Option<FramedStream<TcpStream>>,
    game: ClientGameState,
    /// Failed connection attempts since the last success
    failed_attempts: u32,
    next_attempt: Instant,
    gave_up: bool,
}

impl Client {
    /// Creates a disconnected client; the first [`Client::update`] connects.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            stream: None,
            game: ClientGameState::new(),
            failed_attempts: 0,
            next_attempt: Instant::now(),
            gave_up: false,
        }
    }

    pub async fn connect(&mut self) -> std::io::Result<()> {
        info!("Connecting to {}", self.config.server_addr);
        let stream = FramedStream::connect(&self.config.server_addr, self.config.io_timeout).await?;

        info!("Connected to {}", self.config.server_addr);
        self.stream = Some(stream);
        self.failed_attempts = 0;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn status(&self) -> ConnectionStatus {
        if self.stream.is_some() {
            ConnectionStatus::Connected
        } else if self.gave_up {
            ConnectionStatus::GaveUp
        } else {
            ConnectionStatus::Reconnecting {
                attempt: self.failed_attempts + 1,
            }
        }
    }

    pub fn state(&self) -> &ClientGameState {
        &self.game
    }

    pub fn local_id(&self) -> Option<i32> {
        self.game.local_id()
    }

    /// Per-frame step: reconnect if due, otherwise handle at most one
    /// message from the server.
    pub async fn update<R: AvatarRenderer>(&mut self, renderer: &mut R) {
        let Some(stream) = self.stream.as_mut() else {
            self.try_reconnect().await;
            return;
        };

        let message = match stream.probe().await {
            Liveness::Idle => return,
            Liveness::Dead => Err("server closed the connection".to_string()),
            Liveness::Readable => match stream.receive().await {
                Ok(payload) => Message::decode(&payload).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            },
        };

        match message {
            Ok(message) => self.handle_message(message, renderer),
            Err(reason) => self.lose_connection(&reason, renderer).await,
        }
    }

    /// Sends a chat line; `/setskin` asks for a new skin instead.
    pub async fn submit_chat<R: AvatarRenderer>(&mut self, text: &str, renderer: &mut R) {
        self.send(chat_message(text), renderer).await;
    }

    /// Predicts the move locally and asks the server for it.
    pub async fn request_move<R: AvatarRenderer>(&mut self, target: Vec3, renderer: &mut R) {
        if !self.is_connected() {
            return;
        }

        self.game.predict_move(target, renderer);
        self.send(
            Message::MoveRequest {
                x: target.x,
                y: target.y,
                z: target.z,
            },
            renderer,
        )
        .await;
    }

    async fn send<R: AvatarRenderer>(&mut self, message: Message, renderer: &mut R) {
        let Some(stream) = self.stream.as_mut() else {
            debug!("Not connected, dropping {}", message.name());
            return;
        };

        if let Err(e) = stream.send(&message.encode()).await {
            self.lose_connection(&e.to_string(), renderer).await;
        }
    }

    fn handle_message<R: AvatarRenderer>(&mut self, message: Message, renderer: &mut R) {
        match message {
            Message::AssignId { id } => {
                self.game.apply_assign_id(id);
            }
            Message::AvatarSnapshot { avatars } => self.game.apply_snapshot(&avatars, renderer),
            Message::Chat { avatar_id, text } => self.game.apply_chat(avatar_id, &text, renderer),
            other => warn!("Unexpected {} from server", other.name()),
        }
    }

    /// Drops the session and retries straight away when the policy has no
    /// initial delay.
    async fn lose_connection<R: AvatarRenderer>(&mut self, reason: &str, renderer: &mut R) {
        warn!("Lost connection: {}", reason);

        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await;
        }
        self.game.reset(renderer);

        self.failed_attempts = 0;
        self.next_attempt = Instant::now() + self.config.reconnect.delay_for(1);
        self.try_reconnect().await;
    }

    async fn try_reconnect(&mut self) {
        if self.gave_up || Instant::now() < self.next_attempt {
            return;
        }

        let attempt = self.failed_attempts + 1;
        if !self.config.reconnect.allows(attempt) {
            error!(
                "Giving up on {} after {} attempts",
                self.config.server_addr, self.failed_attempts
            );
            self.gave_up = true;
            return;
        }

        if let Err(e) = self.connect().await {
            warn!("Connection attempt {} failed: {}", attempt, e);
            self.failed_attempts = attempt;
            self.next_attempt = Instant::now() + self.config.reconnect.delay_for(attempt + 1);
        }
    }
}
