//! Client-side view of the lobby and reconciliation against the server.
//!
//! Two positions are tracked per avatar: the last authoritative position the
//! server sent (or, for the local avatar, the position it last assumed), and
//! the position the client is currently showing. For the local avatar the
//! shown position runs ahead of the server (optimistic prediction);
//! corrections only kick in when the server disagrees with what was assumed
//! by more than [`CORRECTION_THRESHOLD`].

use crate::rendering::AvatarRenderer;
use log::{debug, info, warn};
use shared::{within_play_area, Avatar, Vec3};
use std::collections::{HashMap, HashSet};

/// Distance between the assumed and authoritative local position large
/// enough to override the optimistic render.
pub const CORRECTION_THRESHOLD: f32 = 0.1;
/// Authoritative change of a remote avatar large enough to animate.
pub const MOTION_THRESHOLD: f32 = 0.01;

#[derive(Debug, Default)]
pub struct ClientGameState {
    local_id: Option<i32>,
    server_positions: HashMap<i32, Vec3>,
    rendered_positions: HashMap<i32, Vec3>,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local_id(&self) -> Option<i32> {
        self.local_id
    }

    pub fn server_position(&self, id: i32) -> Option<Vec3> {
        self.server_positions.get(&id).copied()
    }

    pub fn rendered_position(&self, id: i32) -> Option<Vec3> {
        self.rendered_positions.get(&id).copied()
    }

    /// Number of avatars currently shown.
    pub fn avatar_count(&self) -> usize {
        self.rendered_positions.len()
    }

    /// Records the id the server gave us. Only the first one per session
    /// counts; returns whether this one was taken.
    pub fn apply_assign_id(&mut self, id: i32) -> bool {
        if let Some(current) = self.local_id {
            warn!("Ignoring second avatar id {} (already {})", id, current);
            return false;
        }

        info!("Assigned avatar id {}", id);
        self.local_id = Some(id);
        true
    }

    /// Brings the view in line with a full authoritative snapshot.
    pub fn apply_snapshot<R: AvatarRenderer>(&mut self, avatars: &[Avatar], renderer: &mut R) {
        let Some(local_id) = self.local_id else {
            warn!("Snapshot arrived before an avatar id, ignoring");
            return;
        };

        let present: HashSet<i32> = avatars.iter().map(|avatar| avatar.id).collect();
        let departed: Vec<i32> = self
            .server_positions
            .keys()
            .copied()
            .filter(|id| *id != local_id && !present.contains(id))
            .collect();

        for id in departed {
            debug!("Avatar {} left", id);
            self.forget(id, renderer);
        }

        for avatar in avatars {
            self.reconcile(avatar, local_id, renderer);
        }
    }

    fn reconcile<R: AvatarRenderer>(&mut self, avatar: &Avatar, local_id: i32, renderer: &mut R) {
        let id = avatar.id;
        let authoritative = avatar.position;

        match self.server_positions.get(&id).copied() {
            None => {
                renderer.spawn(id, authoritative);
                self.rendered_positions.insert(id, authoritative);
            }
            Some(assumed) if id == local_id => {
                // Small differences are our own prediction being confirmed.
                if assumed.distance(&authoritative) > CORRECTION_THRESHOLD {
                    debug!("Correcting local avatar to authoritative position");
                    renderer.move_to(id, authoritative);
                    self.rendered_positions.insert(id, authoritative);
                }
            }
            Some(previous) => {
                if previous.distance(&authoritative) > MOTION_THRESHOLD {
                    renderer.move_to(id, authoritative);
                } else {
                    renderer.set_position(id, authoritative);
                }
                self.rendered_positions.insert(id, authoritative);
            }
        }

        self.server_positions.insert(id, authoritative);
        renderer.set_skin(id, avatar.skin);
        renderer.set_highlighted(id, id == local_id);
    }

    /// Shows the local avatar walking to `target` right away.
    ///
    /// Returns false when nothing was predicted: no avatar yet, or a target
    /// the server is going to refuse anyway.
    pub fn predict_move<R: AvatarRenderer>(&mut self, target: Vec3, renderer: &mut R) -> bool {
        let Some(local_id) = self.local_id else {
            return false;
        };

        if !target.is_finite() || !within_play_area(&target) {
            debug!("Not predicting move outside the play area");
            return false;
        }

        if !self.rendered_positions.contains_key(&local_id) {
            return false;
        }

        renderer.move_to(local_id, target);
        self.rendered_positions.insert(local_id, target);
        // Assumed until the next snapshot says otherwise.
        self.server_positions.insert(local_id, target);
        true
    }

    pub fn apply_chat<R: AvatarRenderer>(&mut self, avatar_id: i32, text: &str, renderer: &mut R) {
        if !self.rendered_positions.contains_key(&avatar_id) {
            warn!("Chat from unknown avatar {} dropped", avatar_id);
            return;
        }

        info!("[{}] {}", avatar_id, text);
        renderer.say(avatar_id, text);
    }

    /// Tears down every avatar and forgets the session's id.
    pub fn reset<R: AvatarRenderer>(&mut self, renderer: &mut R) {
        let mut ids: Vec<i32> = self.rendered_positions.keys().copied().collect();
        ids.sort();
        for id in ids {
            renderer.despawn(id);
        }

        self.server_positions.clear();
        self.rendered_positions.clear();
        self.local_id = None;
    }

    fn forget<R: AvatarRenderer>(&mut self, id: i32, renderer: &mut R) {
        renderer.despawn(id);
        self.server_positions.remove(&id);
        self.rendered_positions.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::{RecordingRenderer, RenderCall};

    fn avatar(id: i32, x: f32, z: f32) -> Avatar {
        Avatar::new(id, Vec3::new(x, 0.0, z), 1)
    }

    /// State with local id 0 and avatars 0 and 1 already spawned at the
    /// origin and (5, 5). Recorded calls are cleared.
    fn joined() -> (ClientGameState, RecordingRenderer) {
        let mut state = ClientGameState::new();
        let mut renderer = RecordingRenderer::new();
        state.apply_assign_id(0);
        state.apply_snapshot(&[avatar(0, 0.0, 0.0), avatar(1, 5.0, 5.0)], &mut renderer);
        renderer.take();
        (state, renderer)
    }

    #[test]
    fn test_assign_id_only_once() {
        let mut state = ClientGameState::new();
        assert!(state.apply_assign_id(4));
        assert!(!state.apply_assign_id(9));
        assert_eq!(state.local_id(), Some(4));
    }

    #[test]
    fn test_snapshot_before_assign_is_ignored() {
        let mut state = ClientGameState::new();
        let mut renderer = RecordingRenderer::new();

        state.apply_snapshot(&[avatar(0, 1.0, 1.0)], &mut renderer);
        assert!(renderer.calls.is_empty());
        assert_eq!(state.avatar_count(), 0);
    }

    #[test]
    fn test_first_snapshot_spawns_everyone() {
        let mut state = ClientGameState::new();
        let mut renderer = RecordingRenderer::new();
        state.apply_assign_id(1);

        state.apply_snapshot(&[avatar(0, 2.0, 0.0), avatar(1, -1.0, 3.0)], &mut renderer);

        assert_eq!(
            renderer.calls,
            vec![
                RenderCall::Spawn(0, Vec3::new(2.0, 0.0, 0.0)),
                RenderCall::SetSkin(0, 1),
                RenderCall::SetHighlighted(0, false),
                RenderCall::Spawn(1, Vec3::new(-1.0, 0.0, 3.0)),
                RenderCall::SetSkin(1, 1),
                RenderCall::SetHighlighted(1, true),
            ]
        );
        assert_eq!(state.avatar_count(), 2);
    }

    #[test]
    fn test_small_local_drift_is_not_corrected() {
        let (mut state, mut renderer) = joined();

        state.apply_snapshot(&[avatar(0, 0.05, 0.0), avatar(1, 5.0, 5.0)], &mut renderer);

        let calls = renderer.take();
        assert!(!calls.iter().any(|call| matches!(call, RenderCall::MoveTo(0, _))));
        assert_eq!(state.server_position(0), Some(Vec3::new(0.05, 0.0, 0.0)));
        assert_eq!(state.rendered_position(0), Some(Vec3::ZERO));
    }

    #[test]
    fn test_large_local_drift_is_corrected() {
        let (mut state, mut renderer) = joined();

        state.apply_snapshot(&[avatar(0, 0.2, 0.0), avatar(1, 5.0, 5.0)], &mut renderer);

        let calls = renderer.take();
        assert!(calls.contains(&RenderCall::MoveTo(0, Vec3::new(0.2, 0.0, 0.0))));
        assert_eq!(state.rendered_position(0), Some(Vec3::new(0.2, 0.0, 0.0)));
    }

    #[test]
    fn test_confirmed_prediction_keeps_render() {
        let (mut state, mut renderer) = joined();
        let target = Vec3::new(3.0, 0.0, 4.0);

        assert!(state.predict_move(target, &mut renderer));
        assert_eq!(renderer.take(), vec![RenderCall::MoveTo(0, target)]);
        assert_eq!(state.server_position(0), Some(target));

        state.apply_snapshot(&[avatar(0, 3.0, 4.0), avatar(1, 5.0, 5.0)], &mut renderer);
        let calls = renderer.take();
        assert!(!calls
            .iter()
            .any(|call| matches!(call, RenderCall::MoveTo(0, _) | RenderCall::SetPosition(0, _))));
        assert_eq!(state.rendered_position(0), Some(target));
    }

    #[test]
    fn test_prediction_close_to_authoritative_is_kept() {
        let (mut state, mut renderer) = joined();
        let target = Vec3::new(3.0, 0.0, 4.0);
        state.predict_move(target, &mut renderer);
        renderer.take();

        state.apply_snapshot(&[avatar(0, 3.05, 4.0), avatar(1, 5.0, 5.0)], &mut renderer);

        let calls = renderer.take();
        assert!(!calls.iter().any(|call| matches!(call, RenderCall::MoveTo(0, _))));
        assert_eq!(state.rendered_position(0), Some(target));
        assert_eq!(state.server_position(0), Some(Vec3::new(3.05, 0.0, 4.0)));
    }

    #[test]
    fn test_prediction_far_from_authoritative_is_corrected() {
        let (mut state, mut renderer) = joined();
        state.predict_move(Vec3::new(3.0, 0.0, 4.0), &mut renderer);
        renderer.take();

        let authoritative = Vec3::new(3.2, 0.0, 4.0);
        state.apply_snapshot(&[avatar(0, 3.2, 4.0), avatar(1, 5.0, 5.0)], &mut renderer);

        let calls = renderer.take();
        assert!(calls.contains(&RenderCall::MoveTo(0, authoritative)));
        assert_eq!(state.rendered_position(0), Some(authoritative));
        assert_eq!(state.server_position(0), Some(authoritative));
    }

    #[test]
    fn test_rejected_prediction_is_pulled_back() {
        let (mut state, mut renderer) = joined();
        state.predict_move(Vec3::new(3.0, 0.0, 4.0), &mut renderer);
        renderer.take();

        // The server never moved us.
        state.apply_snapshot(&[avatar(0, 0.0, 0.0), avatar(1, 5.0, 5.0)], &mut renderer);

        assert!(renderer.take().contains(&RenderCall::MoveTo(0, Vec3::ZERO)));
        assert_eq!(state.rendered_position(0), Some(Vec3::ZERO));
    }

    #[test]
    fn test_small_remote_change_snaps() {
        let (mut state, mut renderer) = joined();

        state.apply_snapshot(&[avatar(0, 0.0, 0.0), avatar(1, 5.005, 5.0)], &mut renderer);

        let calls = renderer.take();
        assert!(calls.contains(&RenderCall::SetPosition(1, Vec3::new(5.005, 0.0, 5.0))));
        assert!(!calls.iter().any(|call| matches!(call, RenderCall::MoveTo(1, _))));
    }

    #[test]
    fn test_large_remote_change_animates() {
        let (mut state, mut renderer) = joined();

        state.apply_snapshot(&[avatar(0, 0.0, 0.0), avatar(1, 5.05, 5.0)], &mut renderer);

        let calls = renderer.take();
        assert!(calls.contains(&RenderCall::MoveTo(1, Vec3::new(5.05, 0.0, 5.0))));
        assert_eq!(state.server_position(1), Some(Vec3::new(5.05, 0.0, 5.0)));
    }

    #[test]
    fn test_missing_remote_is_torn_down() {
        let (mut state, mut renderer) = joined();

        state.apply_snapshot(&[avatar(0, 0.0, 0.0)], &mut renderer);

        let calls = renderer.take();
        assert_eq!(calls[0], RenderCall::Despawn(1));
        assert_eq!(state.server_position(1), None);
        assert_eq!(state.rendered_position(1), None);
        assert_eq!(state.avatar_count(), 1);
    }

    #[test]
    fn test_skin_applied_and_local_highlighted() {
        let (mut state, mut renderer) = joined();

        state.apply_snapshot(
            &[Avatar::new(0, Vec3::ZERO, 712), avatar(1, 5.0, 5.0)],
            &mut renderer,
        );

        let calls = renderer.take();
        assert!(calls.contains(&RenderCall::SetSkin(0, 712)));
        assert!(calls.contains(&RenderCall::SetHighlighted(0, true)));
        assert!(calls.contains(&RenderCall::SetHighlighted(1, false)));
    }

    #[test]
    fn test_prediction_outside_play_area_skipped() {
        let (mut state, mut renderer) = joined();

        assert!(!state.predict_move(Vec3::new(25.0, 0.0, 0.0), &mut renderer));
        assert!(!state.predict_move(Vec3::new(f32::NAN, 0.0, 0.0), &mut renderer));
        assert!(renderer.calls.is_empty());
        assert_eq!(state.rendered_position(0), Some(Vec3::ZERO));
    }

    #[test]
    fn test_prediction_requires_local_avatar() {
        let mut state = ClientGameState::new();
        let mut renderer = RecordingRenderer::new();

        assert!(!state.predict_move(Vec3::ZERO, &mut renderer));
        state.apply_assign_id(2);
        assert!(!state.predict_move(Vec3::ZERO, &mut renderer));
        assert!(renderer.calls.is_empty());
    }

    #[test]
    fn test_chat_for_known_and_unknown_avatars() {
        let (mut state, mut renderer) = joined();

        state.apply_chat(1, "hi", &mut renderer);
        state.apply_chat(42, "ghost", &mut renderer);

        assert_eq!(renderer.take(), vec![RenderCall::Say(1, "hi".to_string())]);
    }

    #[test]
    fn test_reset_despawns_everything() {
        let (mut state, mut renderer) = joined();

        state.reset(&mut renderer);

        assert_eq!(
            renderer.take(),
            vec![RenderCall::Despawn(0), RenderCall::Despawn(1)]
        );
        assert_eq!(state.local_id(), None);
        assert_eq!(state.avatar_count(), 0);
        assert!(state.apply_assign_id(5));
    }
}
