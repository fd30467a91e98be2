//! Mouse and keyboard handling: click to walk, type to chat.

use crate::rendering::Renderer;
use macroquad::prelude::*;
use shared::Vec3;

/// Longest chat line the input box accepts, in characters.
pub const MAX_CHAT_CHARS: usize = 200;

/// Something the player asked for this frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    MoveTo(Vec3),
    Chat(String),
}

/// Editable chat line.
#[derive(Debug, Clone, Default)]
pub struct ChatLine {
    text: String,
}

impl ChatLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn push(&mut self, c: char) {
        if c.is_control() || self.text.chars().count() >= MAX_CHAT_CHARS {
            return;
        }
        self.text.push(c);
    }

    pub fn backspace(&mut self) {
        self.text.pop();
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    /// Takes the line for sending. Blank lines are kept in the box.
    pub fn submit(&mut self) -> Option<String> {
        if self.text.trim().is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.text))
    }
}

/// Collects player input once per frame.
pub struct InputManager {
    chat: ChatLine,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            chat: ChatLine::new(),
        }
    }

    pub fn chat_draft(&self) -> &str {
        self.chat.text()
    }

    /// Samples macroquad's input state and returns the resulting events.
    pub fn update(&mut self, renderer: &Renderer) -> Vec<InputEvent> {
        let mut events = Vec::new();

        while let Some(c) = get_char_pressed() {
            self.chat.push(c);
        }

        if is_key_pressed(KeyCode::Backspace) {
            self.chat.backspace();
        }
        if is_key_pressed(KeyCode::Escape) {
            self.chat.clear();
        }
        if is_key_pressed(KeyCode::Enter) || is_key_pressed(KeyCode::KpEnter) {
            if let Some(text) = self.chat.submit() {
                events.push(InputEvent::Chat(text));
            }
        }

        if is_mouse_button_pressed(MouseButton::Left) {
            let (x, y) = mouse_position();
            events.push(InputEvent::MoveTo(renderer.screen_to_world(x, y)));
        }

        events
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}
