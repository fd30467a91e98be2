//! Registry of live client connections.
//!
//! The client manager owns every accepted socket and hands out the opaque
//! [`ConnectionId`] the rest of the server uses to refer to a connection.
//! It knows nothing about avatars; the pairing of connection and avatar is
//! kept by [`crate::world::WorldState`].

use log::{debug, info};
use shared::transport::{FramedStream, Liveness, TransportError};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

/// Server-internal handle for one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One accepted connection and its framed stream.
#[derive(Debug)]
pub struct Client {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    /// Last time a complete message arrived from this client
    pub last_seen: Instant,
    stream: FramedStream<TcpStream>,
}

impl Client {
    pub fn new(id: ConnectionId, addr: SocketAddr, stream: FramedStream<TcpStream>) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            stream,
        }
    }

    pub async fn probe(&self) -> Liveness {
        self.stream.probe().await
    }

    pub async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.stream.send(payload).await
    }

    pub async fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        let payload = self.stream.receive().await?;
        self.last_seen = Instant::now();
        Ok(payload)
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen.elapsed()
    }

    pub async fn close(mut self) {
        self.stream.shutdown().await;
    }

    /// Closes our write half while keeping the client registered, so the
    /// next send to it fails.
    #[cfg(test)]
    pub(crate) async fn shutdown_writes(&mut self) {
        self.stream.shutdown().await;
    }
}

/// Owns all active clients.
pub struct ClientManager {
    clients: HashMap<ConnectionId, Client>,
    next_connection_id: u64,
    io_timeout: Duration,
}

impl ClientManager {
    pub fn new(io_timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            next_connection_id: 0,
            io_timeout,
        }
    }

    /// Wraps a freshly accepted socket. The client is not active until
    /// [`ClientManager::insert`] is called.
    pub fn accept(&mut self, stream: TcpStream, addr: SocketAddr) -> Client {
        let id = ConnectionId(self.next_connection_id);
        self.next_connection_id += 1;

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle for {}: {}", addr, e);
        }

        info!("Connection {} accepted from {}", id, addr);
        Client::new(id, addr, FramedStream::with_timeout(stream, self.io_timeout))
    }

    pub fn insert(&mut self, client: Client) {
        self.clients.insert(client.id, client);
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<Client> {
        self.clients.remove(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Client> {
        self.clients.get_mut(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.clients.contains_key(&id)
    }

    /// Ids of every active client, in ascending accept order.
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.clients.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
