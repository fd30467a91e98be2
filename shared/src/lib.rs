//! Types and protocol shared by the lobby server and its clients.
//!
//! The [`codec`] module defines the closed set of wire messages and their
//! binary encoding; [`transport`] turns a byte stream into discrete frames.
//! Everything both sides must agree on (ports, radii, size caps) lives here
//! so the two binaries cannot drift apart.

pub mod codec;
pub mod transport;

use std::time::Duration;

/// Port the server listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 55555;
/// Largest frame payload either side will accept (10 MiB).
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;
/// Bound applied to every individual socket read or write.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_millis(5000);

/// Moves whose horizontal distance from the origin exceeds this are rejected.
pub const MAX_MOVE_RADIUS: f32 = 20.0;
/// Whispers reach avatars within this horizontal distance of the sender.
pub const WHISPER_RADIUS: f32 = 3.0;
/// Chat prefix (case-insensitive) that turns a message into a whisper.
pub const WHISPER_PREFIX: &str = "/whisper ";
/// Chat text (case-insensitive) the client turns into a skin change request.
pub const SKIN_COMMAND: &str = "/setskin";

/// A point in the lobby. `y` is height; the floor is the x/z plane.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Full Euclidean distance.
    pub fn distance(&self, other: &Vec3) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let dz = other.z - self.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Distance measured on the floor plane only (ignores `y`).
    pub fn horizontal_distance(&self, other: &Vec3) -> f32 {
        let dx = other.x - self.x;
        let dz = other.z - self.z;
        (dx * dx + dz * dz).sqrt()
    }

    /// Steps towards `target` by at most `max_step`, never overshooting.
    pub fn move_towards(&self, target: &Vec3, max_step: f32) -> Vec3 {
        let distance = self.distance(target);
        if distance <= max_step || distance == 0.0 {
            return *target;
        }

        let t = max_step / distance;
        Vec3 {
            x: self.x + (target.x - self.x) * t,
            y: self.y + (target.y - self.y) * t,
            z: self.z + (target.z - self.z) * t,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Returns true when `position` lies inside the walkable area.
pub fn within_play_area(position: &Vec3) -> bool {
    Vec3::ZERO.horizontal_distance(position) <= MAX_MOVE_RADIUS
}

/// Authoritative record of one connected client's avatar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Avatar {
    pub id: i32,
    pub position: Vec3,
    pub skin: i32,
}

impl Avatar {
    pub fn new(id: i32, position: Vec3, skin: i32) -> Self {
        Self { id, position, skin }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_avatar_creation() {
        let avatar = Avatar::new(3, Vec3::new(1.0, 0.0, -2.0), 7);
        assert_eq!(avatar.id, 3);
        assert_eq!(avatar.skin, 7);
        assert_eq!(avatar.position, Vec3::new(1.0, 0.0, -2.0));
    }

    #[test]
    fn test_horizontal_distance_ignores_height() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 50.0, 4.0);
        assert_approx_eq!(a.horizontal_distance(&b), 5.0, 1e-6);
        assert!(a.distance(&b) > 50.0);
    }

    #[test]
    fn test_move_towards_does_not_overshoot() {
        let start = Vec3::new(0.0, 0.0, 0.0);
        let target = Vec3::new(10.0, 0.0, 0.0);

        let step = start.move_towards(&target, 4.0);
        assert_approx_eq!(step.x, 4.0, 1e-6);

        let arrived = step.move_towards(&target, 100.0);
        assert_eq!(arrived, target);
    }

    #[test]
    fn test_move_towards_same_point() {
        let point = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(point.move_towards(&point, 0.5), point);
    }

    #[test]
    fn test_play_area_boundary() {
        assert!(within_play_area(&Vec3::new(20.0, 0.0, 0.0)));
        assert!(within_play_area(&Vec3::new(5.0, 100.0, 5.0)));
        assert!(!within_play_area(&Vec3::new(15.0, 0.0, 15.0)));
        assert!(!within_play_area(&Vec3::new(f32::NAN, 0.0, 0.0)));
    }
}
