//! # Lobby Server Library
//!
//! Authoritative server for the avatar lobby. It owns the only true copy of
//! every avatar, validates what clients ask for, and tells everyone about the
//! result.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative State
//! Clients never set state directly. They send requests (move here, change
//! my skin, say this) and the server decides. Accepted changes are broadcast
//! as a full snapshot of the world; rejected ones are dropped without reply.
//!
//! ### Connection Lifecycle
//! - Accepting connections and spawning an avatar for each
//! - Delivering the avatar id before anyone else learns about it
//! - Detecting closed peers and malformed traffic
//! - Removing the avatar and telling the remaining clients
//!
//! ### Chat
//! Chat lines go to everybody, or, when prefixed with `/whisper `, only to
//! avatars standing within earshot of the speaker.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Tick Loop
//! All state lives in one [`network::Server`] value driven by one loop. Each
//! tick drains the accept queue and then gives every client the chance to
//! deliver one message. Socket checks never wait, so a slow client cannot
//! stall the tick for the others.
//!
//! ### Framed TCP
//! Messages travel as length-prefixed binary frames over TCP; see
//! [`shared::transport`] and [`shared::codec`].
//!
//! ## Module Organization
//!
//! ### World (`world`)
//! Avatar storage, spawn rules, and validation of move and skin requests.
//!
//! ### Client Manager (`client_manager`)
//! Registry of accepted sockets keyed by [`client_manager::ConnectionId`].
//!
//! ### Broadcast (`broadcast`)
//! Chat routing and best-effort delivery to a set of recipients.
//!
//! ### Network (`network`)
//! The server loop tying the other three together.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let mut server = Server::bind(ServerConfig::default()).await?;
//!     server.run().await;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod client_manager;
pub mod network;
pub mod world;
