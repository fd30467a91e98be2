//! Server network layer: TCP accept, per-tick client polling and dispatch

use crate::broadcast::{chat_recipients, deliver, route_chat, snapshot_message};
use crate::client_manager::{Client, ClientManager, ConnectionId};
use crate::world::WorldState;
use log::{debug, info, warn};
use shared::codec::Message;
use shared::transport::{poll_now, Liveness};
use shared::{Vec3, DEFAULT_IO_TIMEOUT, DEFAULT_PORT};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{interval, MissedTickBehavior};

/// Ticks between periodic status lines
const STATUS_LOG_INTERVAL: u64 = 600;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub tick_interval: Duration,
    /// Bound on every individual socket read or write
    pub io_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", DEFAULT_PORT),
            tick_interval: Duration::from_millis(100),
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }
}

/// Why a connection was dropped. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    PeerClosed,
    Malformed,
    SendFailed,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DisconnectReason::PeerClosed => "peer closed",
            DisconnectReason::Malformed => "malformed message",
            DisconnectReason::SendFailed => "send failed",
        };
        f.write_str(text)
    }
}

/// Authoritative lobby server.
///
/// Everything runs on one cooperative loop: each tick accepts pending
/// connections, then gives every client one chance to deliver a message.
/// No socket operation waits for data that is not already there, so a
/// quiet client never holds up the others.
pub struct Server {
    listener: TcpListener,
    clients: ClientManager,
    world: WorldState,
    config: ServerConfig,
    ticks: u64,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        Self::bind_with_world(config, WorldState::new()).await
    }

    /// Binds with a caller-supplied world, e.g. one with a fixed seed.
    pub async fn bind_with_world(config: ServerConfig, world: WorldState) -> io::Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            clients: ClientManager::new(config.io_timeout),
            world,
            config,
            ticks: 0,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn connection_count(&self) -> usize {
        self.clients.len()
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    /// Runs ticks forever at the configured interval.
    pub async fn run(&mut self) {
        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Server started successfully ({} ms tick)",
            self.config.tick_interval.as_millis()
        );

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// One pass of the server loop.
    pub async fn tick(&mut self) {
        for (stream, addr) in self.accept_pending().await {
            self.admit(stream, addr).await;
        }

        self.poll_clients().await;

        self.ticks += 1;
        if self.ticks % STATUS_LOG_INTERVAL == 0 && !self.clients.is_empty() {
            self.log_status();
        }
    }

    /// Drains every connection already waiting in the accept queue.
    async fn accept_pending(&mut self) -> Vec<(TcpStream, SocketAddr)> {
        let mut pending = Vec::new();

        while let Some(result) = poll_now(self.listener.accept()).await {
            match result {
                Ok(connection) => pending.push(connection),
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    break;
                }
            }
        }

        pending
    }

    async fn admit(&mut self, stream: TcpStream, addr: SocketAddr) {
        let client = self.clients.accept(stream, addr);
        self.activate(client).await;
    }

    /// Gives the client its avatar. The client only becomes active, and
    /// the others only hear about it, once the id has been delivered.
    async fn activate(&mut self, mut client: Client) {
        let avatar = self.world.register(client.id);
        let assign = Message::AssignId { id: avatar.id }.encode();

        if let Err(e) = client.send(&assign).await {
            warn!("Could not assign avatar to {}: {}", client.addr, e);
            self.world.unregister(client.id);
            client.close().await;
            return;
        }

        info!("Client {} joined as avatar {}", client.id, avatar.id);
        self.clients.insert(client);
        self.broadcast_snapshot().await;
    }

    async fn poll_clients(&mut self) {
        for id in self.clients.ids() {
            match self.read_one(id).await {
                None => {}
                Some(Ok(message)) => self.handle_message(id, message).await,
                Some(Err(reason)) => self.disconnect(id, reason).await,
            }
        }
    }

    /// Reads at most one message from `id`. `None` when there is nothing
    /// to read or the client is already gone.
    async fn read_one(&mut self, id: ConnectionId) -> Option<Result<Message, DisconnectReason>> {
        let client = self.clients.get_mut(id)?;

        match client.probe().await {
            Liveness::Idle => None,
            Liveness::Dead => Some(Err(DisconnectReason::PeerClosed)),
            Liveness::Readable => {
                let result = match client.receive().await {
                    Ok(payload) => Message::decode(&payload).map_err(|e| {
                        warn!("Undecodable message from client {}: {}", id, e);
                        DisconnectReason::Malformed
                    }),
                    Err(e) if e.is_malformed() => {
                        warn!("Bad frame from client {}: {}", id, e);
                        Err(DisconnectReason::Malformed)
                    }
                    Err(e) => {
                        debug!("Receive from client {} failed: {}", id, e);
                        Err(DisconnectReason::PeerClosed)
                    }
                };
                Some(result)
            }
        }
    }

    async fn handle_message(&mut self, id: ConnectionId, message: Message) {
        match message {
            Message::MoveRequest { x, y, z } => {
                if let Ok(avatar) = self.world.apply_move(id, Vec3::new(x, y, z)) {
                    debug!("Avatar {} moved to ({:.2}, {:.2}, {:.2})", avatar.id, x, y, z);
                    self.broadcast_snapshot().await;
                }
            }
            Message::SkinChangeRequest => {
                if let Some(avatar) = self.world.apply_skin_change(id) {
                    debug!("Avatar {} now wears skin {}", avatar.id, avatar.skin);
                    self.broadcast_snapshot().await;
                }
            }
            Message::ChatCommand { text } => self.dispatch_chat(id, &text).await,
            other => {
                warn!("Unexpected {} from client {}", other.name(), id);
            }
        }
    }

    async fn dispatch_chat(&mut self, id: ConnectionId, text: &str) {
        let Some(sender) = self.world.avatar(id) else {
            return;
        };

        let route = route_chat(text);
        let recipients = chat_recipients(&route, &sender, &self.world, &self.clients);
        let payload = Message::Chat {
            avatar_id: sender.id,
            text: route.text().to_string(),
        }
        .encode();

        debug!(
            "Chat from avatar {} to {} recipients",
            sender.id,
            recipients.len()
        );
        let failed = deliver(&mut self.clients, &recipients, &payload).await;
        self.disconnect_failed(failed).await;
    }

    /// Sends the full world to every active client, then drops whoever
    /// could not be reached. Each drop is announced with a fresh snapshot.
    async fn broadcast_snapshot(&mut self) {
        let failed = self.send_snapshot().await;
        self.disconnect_failed(failed).await;
    }

    async fn send_snapshot(&mut self) -> Vec<ConnectionId> {
        let payload = snapshot_message(&self.world).encode();
        let recipients = self.clients.ids();
        deliver(&mut self.clients, &recipients, &payload).await
    }

    /// Works through failed recipients one at a time. Announcing a removal
    /// can itself fail on another client, which joins the queue.
    async fn disconnect_failed(&mut self, failed: Vec<ConnectionId>) {
        let mut queue = failed;

        while let Some(id) = queue.pop() {
            if self.remove(id, DisconnectReason::SendFailed).await {
                queue.extend(self.send_snapshot().await);
            }
        }
    }

    async fn disconnect(&mut self, id: ConnectionId, reason: DisconnectReason) {
        if self.remove(id, reason).await {
            self.broadcast_snapshot().await;
        }
    }

    /// Drops the connection and its avatar. Returns whether an avatar
    /// existed, i.e. whether the others need a new snapshot.
    async fn remove(&mut self, id: ConnectionId, reason: DisconnectReason) -> bool {
        let avatar = self.world.unregister(id);

        match avatar {
            Some(avatar) => info!(
                "Client {} (avatar {}) disconnected: {}",
                id, avatar.id, reason
            ),
            None => debug!("Connection {} dropped: {}", id, reason),
        }

        if let Some(client) = self.clients.remove(id) {
            client.close().await;
        }

        avatar.is_some()
    }

    fn log_status(&mut self) {
        let quietest = self
            .clients
            .ids()
            .into_iter()
            .filter_map(|id| self.clients.get_mut(id).map(|client| client.idle_for()))
            .max()
            .unwrap_or_default();

        debug!(
            "Tick {}: {} clients, {} avatars, longest silence {:.1}s",
            self.ticks,
            self.clients.len(),
            self.world.len(),
            quietest.as_secs_f32()
        );
    }
}
