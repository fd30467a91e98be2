//! Avatar presentation.
//!
//! [`AvatarRenderer`] is everything the reconciliation logic needs from a
//! view. [`Renderer`] draws a top-down macroquad view of the floor plane;
//! [`RecordingRenderer`] just remembers what it was told.

use macroquad::prelude::*;
use shared::{Vec3, MAX_MOVE_RADIUS};
use std::collections::{HashMap, VecDeque};

/// Visual side of the avatar lobby.
pub trait AvatarRenderer {
    fn spawn(&mut self, id: i32, position: Vec3);
    fn despawn(&mut self, id: i32);
    /// Places the avatar without animation.
    fn set_position(&mut self, id: i32, position: Vec3);
    /// Walks the avatar towards `target`.
    fn move_to(&mut self, id: i32, target: Vec3);
    fn set_skin(&mut self, id: i32, skin: i32);
    fn set_highlighted(&mut self, id: i32, highlighted: bool);
    /// Shows `text` in a speech bubble over the avatar.
    fn say(&mut self, id: i32, text: &str);
}

/// World units per second an avatar walks.
pub const WALK_SPEED: f32 = 6.0;
/// How long one speech bubble stays up.
pub const BUBBLE_SECONDS: f32 = 4.0;
/// Empty border around the play area, in world units.
const VIEW_MARGIN: f32 = 2.0;

const PALETTE: [Color; 10] = [
    Color::new(0.90, 0.30, 0.30, 1.0),
    Color::new(0.95, 0.60, 0.20, 1.0),
    Color::new(0.95, 0.85, 0.25, 1.0),
    Color::new(0.45, 0.80, 0.30, 1.0),
    Color::new(0.20, 0.70, 0.60, 1.0),
    Color::new(0.25, 0.65, 0.95, 1.0),
    Color::new(0.35, 0.40, 0.90, 1.0),
    Color::new(0.65, 0.35, 0.85, 1.0),
    Color::new(0.90, 0.40, 0.70, 1.0),
    Color::new(0.75, 0.75, 0.75, 1.0),
];

/// Maps any skin number, including negative ones, onto the palette.
pub fn skin_index(skin: i32) -> usize {
    skin.rem_euclid(PALETTE.len() as i32) as usize
}

#[derive(Debug, Clone)]
struct Bubble {
    text: String,
    remaining: f32,
}

#[derive(Debug, Clone)]
struct AvatarView {
    position: Vec3,
    target: Vec3,
    skin: i32,
    highlighted: bool,
    bubbles: VecDeque<Bubble>,
}

impl AvatarView {
    fn new(position: Vec3) -> Self {
        Self {
            position,
            target: position,
            skin: 0,
            highlighted: false,
            bubbles: VecDeque::new(),
        }
    }

    fn update(&mut self, dt: f32) {
        self.position = self.position.move_towards(&self.target, WALK_SPEED * dt);

        // Bubbles are shown one at a time, oldest first.
        if let Some(bubble) = self.bubbles.front_mut() {
            bubble.remaining -= dt;
            if bubble.remaining <= 0.0 {
                self.bubbles.pop_front();
            }
        }
    }
}

/// Status line contents drawn over the scene.
#[derive(Debug, Clone, Default)]
pub struct Hud {
    pub status: String,
    pub local_id: Option<i32>,
    pub chat_draft: String,
}

pub struct Renderer {
    width: f32,
    height: f32,
    avatars: HashMap<i32, AvatarView>,
}

impl Renderer {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            avatars: HashMap::new(),
        }
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        self.width = width;
        self.height = height;
    }

    /// Pixels per world unit, sized so the whole play area fits.
    fn scale(&self) -> f32 {
        self.width.min(self.height) / (2.0 * (MAX_MOVE_RADIUS + VIEW_MARGIN))
    }

    /// Top-down projection: world x goes right, world z goes down.
    pub fn world_to_screen(&self, position: &Vec3) -> (f32, f32) {
        let scale = self.scale();
        (
            self.width / 2.0 + position.x * scale,
            self.height / 2.0 + position.z * scale,
        )
    }

    /// Floor point under a screen position (y = 0).
    pub fn screen_to_world(&self, x: f32, y: f32) -> Vec3 {
        let scale = self.scale();
        Vec3::new(
            (x - self.width / 2.0) / scale,
            0.0,
            (y - self.height / 2.0) / scale,
        )
    }

    pub fn avatar_position(&self, id: i32) -> Option<Vec3> {
        self.avatars.get(&id).map(|view| view.position)
    }

    /// Text of the bubble currently shown over `id`.
    pub fn current_bubble(&self, id: i32) -> Option<&str> {
        self.avatars
            .get(&id)?
            .bubbles
            .front()
            .map(|bubble| bubble.text.as_str())
    }

    /// Advances walking animations and bubble timers.
    pub fn update(&mut self, dt: f32) {
        for view in self.avatars.values_mut() {
            view.update(dt);
        }
    }

    pub fn draw(&self, hud: &Hud) {
        clear_background(Color::from_rgba(26, 26, 26, 255));

        self.draw_floor();

        let mut ids: Vec<&i32> = self.avatars.keys().collect();
        ids.sort();
        for id in ids {
            self.draw_avatar(*id, &self.avatars[id]);
        }

        self.draw_hud(hud);
    }

    fn draw_floor(&self) {
        let (cx, cy) = self.world_to_screen(&Vec3::ZERO);
        let radius = MAX_MOVE_RADIUS * self.scale();

        draw_circle(cx, cy, radius, Color::from_rgba(48, 48, 48, 255));
        draw_circle_lines(cx, cy, radius, 2.0, Color::from_rgba(90, 90, 90, 255));
    }

    fn draw_avatar(&self, id: i32, view: &AvatarView) {
        let (x, y) = self.world_to_screen(&view.position);
        let size = 0.6 * self.scale();

        draw_circle(x, y, size, PALETTE[skin_index(view.skin)]);
        if view.highlighted {
            draw_circle_lines(x, y, size + 4.0, 3.0, WHITE);
        }
        draw_text(&id.to_string(), x - 4.0, y + size + 14.0, 16.0, LIGHTGRAY);

        if let Some(bubble) = view.bubbles.front() {
            self.draw_bubble(x, y - size - 10.0, &bubble.text);
        }
    }

    fn draw_bubble(&self, x: f32, bottom: f32, text: &str) {
        let font_size = 18.0;
        let dims = measure_text(text, None, font_size as u16, 1.0);
        let padding = 6.0;
        let w = dims.width + padding * 2.0;
        let h = font_size + padding;
        let left = x - w / 2.0;
        let top = bottom - h;

        draw_rectangle(left, top, w, h, Color::from_rgba(240, 240, 240, 230));
        draw_text(text, left + padding, bottom - padding, font_size, BLACK);
    }

    fn draw_hud(&self, hud: &Hud) {
        let status = match hud.local_id {
            Some(id) => format!("{} | avatar {} | {} online", hud.status, id, self.avatars.len()),
            None => hud.status.clone(),
        };
        draw_text(&status, 10.0, 20.0, 18.0, WHITE);

        let prompt = format!("> {}", hud.chat_draft);
        draw_rectangle(0.0, self.height - 30.0, self.width, 30.0, Color::from_rgba(0, 0, 0, 160));
        draw_text(&prompt, 10.0, self.height - 10.0, 18.0, WHITE);
    }
}

impl AvatarRenderer for Renderer {
    fn spawn(&mut self, id: i32, position: Vec3) {
        self.avatars.insert(id, AvatarView::new(position));
    }

    fn despawn(&mut self, id: i32) {
        self.avatars.remove(&id);
    }

    fn set_position(&mut self, id: i32, position: Vec3) {
        if let Some(view) = self.avatars.get_mut(&id) {
            view.position = position;
            view.target = position;
        }
    }

    fn move_to(&mut self, id: i32, target: Vec3) {
        if let Some(view) = self.avatars.get_mut(&id) {
            view.target = target;
        }
    }

    fn set_skin(&mut self, id: i32, skin: i32) {
        if let Some(view) = self.avatars.get_mut(&id) {
            view.skin = skin;
        }
    }

    fn set_highlighted(&mut self, id: i32, highlighted: bool) {
        if let Some(view) = self.avatars.get_mut(&id) {
            view.highlighted = highlighted;
        }
    }

    fn say(&mut self, id: i32, text: &str) {
        if let Some(view) = self.avatars.get_mut(&id) {
            view.bubbles.push_back(Bubble {
                text: text.to_string(),
                remaining: BUBBLE_SECONDS,
            });
        }
    }
}

/// One call made on a [`RecordingRenderer`].
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    Spawn(i32, Vec3),
    Despawn(i32),
    SetPosition(i32, Vec3),
    MoveTo(i32, Vec3),
    SetSkin(i32, i32),
    SetHighlighted(i32, bool),
    Say(i32, String),
}

/// Headless renderer that logs every call in order.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    pub calls: Vec<RenderCall>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns and clears the recorded calls.
    pub fn take(&mut self) -> Vec<RenderCall> {
        std::mem::take(&mut self.calls)
    }
}

impl AvatarRenderer for RecordingRenderer {
    fn spawn(&mut self, id: i32, position: Vec3) {
        self.calls.push(RenderCall::Spawn(id, position));
    }

    fn despawn(&mut self, id: i32) {
        self.calls.push(RenderCall::Despawn(id));
    }

    fn set_position(&mut self, id: i32, position: Vec3) {
        self.calls.push(RenderCall::SetPosition(id, position));
    }

    fn move_to(&mut self, id: i32, target: Vec3) {
        self.calls.push(RenderCall::MoveTo(id, target));
    }

    fn set_skin(&mut self, id: i32, skin: i32) {
        self.calls.push(RenderCall::SetSkin(id, skin));
    }

    fn set_highlighted(&mut self, id: i32, highlighted: bool) {
        self.calls.push(RenderCall::SetHighlighted(id, highlighted));
    }

    fn say(&mut self, id: i32, text: &str) {
        self.calls.push(RenderCall::Say(id, text.to_string()));
    }
}
