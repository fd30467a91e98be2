//! Authoritative avatar state.
//!
//! `WorldState` is the single source of truth for every avatar in the lobby.
//! It is owned by the server loop and only changes through the operations
//! below; callers get copies of avatars, never references into the store.

use crate::client_manager::ConnectionId;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{within_play_area, Avatar, Vec3};
use std::collections::HashMap;
use std::f32::consts::TAU;
use thiserror::Error;

/// New avatars spawn at most this far from the origin.
pub const SPAWN_RADIUS: f32 = 10.0;
/// Skins handed out on connect are drawn from `0..INITIAL_SKIN_COUNT`.
pub const INITIAL_SKIN_COUNT: i32 = 10;
/// Skins handed out on request are drawn from `0..REQUESTED_SKIN_COUNT`.
pub const REQUESTED_SKIN_COUNT: i32 = 1000;

#[derive(Debug, Error, PartialEq)]
pub enum MoveRejected {
    #[error("target ({x}, {z}) is outside the play area")]
    OutOfBounds { x: f32, z: f32 },
    #[error("target contains a non-finite coordinate")]
    NotFinite,
    #[error("connection has no avatar")]
    UnknownConnection,
}

pub struct WorldState {
    avatars: HashMap<ConnectionId, Avatar>,
    next_avatar_id: i32,
    rng: StdRng,
}

impl WorldState {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic spawn positions and skins, for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            avatars: HashMap::new(),
            next_avatar_id: 0,
            rng,
        }
    }

    /// Creates the avatar owned by `connection`.
    ///
    /// Ids count up from zero and are never handed out twice, even after
    /// the owning connection leaves.
    pub fn register(&mut self, connection: ConnectionId) -> Avatar {
        let id = self.next_avatar_id;
        self.next_avatar_id += 1;

        let angle = self.rng.gen_range(0.0..TAU);
        let distance = self.rng.gen_range(0.0..SPAWN_RADIUS);
        let position = Vec3::new(angle.cos() * distance, 0.0, angle.sin() * distance);
        let skin = self.rng.gen_range(0..INITIAL_SKIN_COUNT);

        let avatar = Avatar::new(id, position, skin);
        info!(
            "Avatar {} spawned at ({:.2}, {:.2}) with skin {}",
            id, position.x, position.z, skin
        );
        self.avatars.insert(connection, avatar);
        avatar
    }

    pub fn unregister(&mut self, connection: ConnectionId) -> Option<Avatar> {
        self.avatars.remove(&connection)
    }

    /// Moves the avatar if `target` lies within the play area.
    ///
    /// Only the horizontal distance is checked; height is free.
    pub fn apply_move(
        &mut self,
        connection: ConnectionId,
        target: Vec3,
    ) -> Result<Avatar, MoveRejected> {
        let avatar = self
            .avatars
            .get_mut(&connection)
            .ok_or(MoveRejected::UnknownConnection)?;

        if !target.is_finite() {
            warn!("Avatar {} sent a non-finite move", avatar.id);
            return Err(MoveRejected::NotFinite);
        }

        if !within_play_area(&target) {
            warn!(
                "Avatar {} illegal move to ({}, {})",
                avatar.id, target.x, target.z
            );
            return Err(MoveRejected::OutOfBounds {
                x: target.x,
                z: target.z,
            });
        }

        avatar.position = target;
        Ok(*avatar)
    }

    /// Assigns a new random skin. Returns `None` for unknown connections.
    pub fn apply_skin_change(&mut self, connection: ConnectionId) -> Option<Avatar> {
        let skin = self.rng.gen_range(0..REQUESTED_SKIN_COUNT);
        let avatar = self.avatars.get_mut(&connection)?;
        avatar.skin = skin;
        Some(*avatar)
    }

    pub fn avatar(&self, connection: ConnectionId) -> Option<Avatar> {
        self.avatars.get(&connection).copied()
    }

    /// Every avatar, in no particular order.
    pub fn snapshot(&self) -> Vec<Avatar> {
        self.avatars.values().copied().collect()
    }

    /// Connections whose avatar stands within `radius` of `origin` on the
    /// floor plane, boundary included.
    pub fn connections_near(&self, origin: &Vec3, radius: f32) -> Vec<ConnectionId> {
        self.avatars
            .iter()
            .filter(|(_, avatar)| origin.horizontal_distance(&avatar.position) <= radius)
            .map(|(connection, _)| *connection)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.avatars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.avatars.is_empty()
    }
}

impl Default for WorldState {
    fn default() -> Self {
        Self::new()
    }
}
