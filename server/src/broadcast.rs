//! Turns state changes into outgoing messages and picks who receives them.
//!
//! Delivery never stops at the first failed recipient: every recipient gets
//! its copy, failures are collected, and the caller disconnects the failed
//! ones once the pass is complete.

use crate::client_manager::{ClientManager, ConnectionId};
use crate::world::WorldState;
use log::{debug, warn};
use shared::codec::Message;
use shared::{Avatar, WHISPER_PREFIX, WHISPER_RADIUS};

/// How a chat command is distributed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatRoute {
    /// Everyone hears it.
    Shout(String),
    /// Only avatars near the speaker hear it. Prefix already stripped.
    Whisper(String),
}

impl ChatRoute {
    pub fn text(&self) -> &str {
        match self {
            ChatRoute::Shout(text) | ChatRoute::Whisper(text) => text,
        }
    }
}

/// Classifies raw chat text by its (case-insensitive) whisper prefix.
pub fn route_chat(text: &str) -> ChatRoute {
    let is_whisper = text
        .get(..WHISPER_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(WHISPER_PREFIX));

    if is_whisper {
        ChatRoute::Whisper(text[WHISPER_PREFIX.len()..].to_string())
    } else {
        ChatRoute::Shout(text.to_string())
    }
}

/// Recipients of a chat line from `sender`, fixed at the moment of dispatch.
///
/// Whispers go to every connection whose avatar is within
/// [`WHISPER_RADIUS`] of the sender, the sender included.
pub fn chat_recipients(
    route: &ChatRoute,
    sender: &Avatar,
    world: &WorldState,
    clients: &ClientManager,
) -> Vec<ConnectionId> {
    match route {
        ChatRoute::Shout(_) => clients.ids(),
        ChatRoute::Whisper(_) => {
            let mut nearby: Vec<ConnectionId> = world
                .connections_near(&sender.position, WHISPER_RADIUS)
                .into_iter()
                .filter(|id| clients.contains(*id))
                .collect();
            nearby.sort();
            nearby
        }
    }
}

pub fn snapshot_message(world: &WorldState) -> Message {
    Message::AvatarSnapshot {
        avatars: world.snapshot(),
    }
}

/// Sends `payload` to each recipient in turn and returns the ones that
/// failed. Recipients that are no longer registered are skipped.
pub async fn deliver(
    clients: &mut ClientManager,
    recipients: &[ConnectionId],
    payload: &[u8],
) -> Vec<ConnectionId> {
    let mut failed = Vec::new();

    for id in recipients {
        let Some(client) = clients.get_mut(*id) else {
            continue;
        };

        if let Err(e) = client.send(payload).await {
            warn!("Send to client {} failed: {}", id, e);
            failed.push(*id);
        }
    }

    debug!(
        "Delivered {} bytes to {}/{} recipients",
        payload.len(),
        recipients.len() - failed.len(),
        recipients.len()
    );
    failed
}
