//! # Lobby Client Library
//!
//! Client side of the avatar lobby: connects to the server, shows every
//! avatar it hears about, and lets the player walk around and chat.
//!
//! ## Architecture Overview
//!
//! The server is the authority. The client only asks, then shows whatever
//! the server's snapshots say, with one exception that keeps clicks feeling
//! instant:
//!
//! ### Optimistic Prediction
//! A click starts the local avatar walking straight away, before the server
//! has seen the request. The server's answer arrives as a snapshot a tick
//! later.
//!
//! ### Reconciliation
//! Snapshots are compared with the position the client last assumed. The
//! local avatar is only pulled back when the server's position differs from
//! its prediction by more than a small threshold, so confirmations of our
//! own prediction don't cause a visible snap. Remote avatars walk to their new spot, or are
//! placed directly when the change is tiny.
//!
//! ### Per-Frame Driving
//! The session is stepped from the render loop. Each frame checks the
//! socket once without waiting and handles at most one message.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! Local id, authoritative and shown positions, reconciliation rules.
//!
//! ### Input Module (`input`)
//! Click-to-move and the chat input line.
//!
//! ### Network Module (`network`)
//! The TCP session, outgoing requests and the reconnect policy.
//!
//! ### Rendering Module (`rendering`)
//! The [`rendering::AvatarRenderer`] trait and its macroquad implementation.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientConfig};
//! use client::rendering::RecordingRenderer;
//!
//! # async fn run() {
//! let mut client = Client::new(ClientConfig::default());
//! let mut renderer = RecordingRenderer::new();
//!
//! loop {
//!     client.update(&mut renderer).await;
//!     // draw, read input, client.request_move(..), client.submit_chat(..)
//! }
//! # }
//! ```

pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
