//! Binary encoding of lobby messages.
//!
//! Every payload starts with an `i32` discriminator followed by the fields of
//! that message kind in a fixed order:
//!
//! ```text
//! i32   little-endian, 4 bytes
//! f32   little-endian IEEE-754, 4 bytes
//! text  [i32 byte count][UTF-8 bytes]
//! list  [i32 element count][elements...]
//! ```
//!
//! Decoding never panics: short buffers, negative lengths, unknown kinds and
//! leftover bytes all come back as a [`DecodeError`].

use crate::{Avatar, Vec3};
use thiserror::Error;

/// Discriminator values. Fixed by agreement between client and server.
pub mod kind {
    pub const ASSIGN_ID: i32 = 1;
    pub const AVATAR_SNAPSHOT: i32 = 2;
    pub const CHAT: i32 = 3;
    pub const CHAT_COMMAND: i32 = 4;
    pub const SKIN_CHANGE_REQUEST: i32 = 5;
    pub const MOVE_REQUEST: i32 = 6;
}

/// Encoded size of one avatar inside a snapshot.
const AVATAR_WIRE_SIZE: usize = 4 * 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("buffer ended after {available} bytes, needed {needed} more")]
    UnexpectedEnd { needed: usize, available: usize },
    #[error("negative length prefix {0}")]
    NegativeLength(i32),
    #[error("text is not valid UTF-8")]
    InvalidUtf8,
    #[error("unknown message kind {0}")]
    UnknownKind(i32),
    #[error("{0} unread bytes after message")]
    TrailingBytes(usize),
}

/// Every message that can cross the wire, in either direction.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Server tells a freshly accepted client which avatar is theirs.
    AssignId { id: i32 },
    /// Full list of avatars, sent after every state change.
    AvatarSnapshot { avatars: Vec<Avatar> },
    /// Chat line spoken by `avatar_id`.
    Chat { avatar_id: i32, text: String },
    /// Raw chat text typed by a client (may carry the whisper prefix).
    ChatCommand { text: String },
    /// Client asks for a new random skin.
    SkinChangeRequest,
    /// Client asks to move its avatar to the given point.
    MoveRequest { x: f32, y: f32, z: f32 },
}

impl Message {
    pub fn kind(&self) -> i32 {
        match self {
            Message::AssignId { .. } => kind::ASSIGN_ID,
            Message::AvatarSnapshot { .. } => kind::AVATAR_SNAPSHOT,
            Message::Chat { .. } => kind::CHAT,
            Message::ChatCommand { .. } => kind::CHAT_COMMAND,
            Message::SkinChangeRequest => kind::SKIN_CHANGE_REQUEST,
            Message::MoveRequest { .. } => kind::MOVE_REQUEST,
        }
    }

    /// Short human-readable name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Message::AssignId { .. } => "AssignId",
            Message::AvatarSnapshot { .. } => "AvatarSnapshot",
            Message::Chat { .. } => "Chat",
            Message::ChatCommand { .. } => "ChatCommand",
            Message::SkinChangeRequest => "SkinChangeRequest",
            Message::MoveRequest { .. } => "MoveRequest",
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut writer = PacketWriter::new();
        writer.write_i32(self.kind());

        match self {
            Message::AssignId { id } => writer.write_i32(*id),
            Message::AvatarSnapshot { avatars } => {
                writer.write_len(avatars.len());
                for avatar in avatars {
                    writer.write_avatar(avatar);
                }
            }
            Message::Chat { avatar_id, text } => {
                writer.write_i32(*avatar_id);
                writer.write_str(text);
            }
            Message::ChatCommand { text } => writer.write_str(text),
            Message::SkinChangeRequest => {}
            Message::MoveRequest { x, y, z } => {
                writer.write_f32(*x);
                writer.write_f32(*y);
                writer.write_f32(*z);
            }
        }

        writer.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Message, DecodeError> {
        let mut reader = PacketReader::new(bytes);

        let message = match reader.read_i32()? {
            kind::ASSIGN_ID => Message::AssignId {
                id: reader.read_i32()?,
            },
            kind::AVATAR_SNAPSHOT => {
                let count = reader.read_len()?;
                reader.ensure(count.saturating_mul(AVATAR_WIRE_SIZE))?;
                let mut avatars = Vec::with_capacity(count);
                for _ in 0..count {
                    avatars.push(reader.read_avatar()?);
                }
                Message::AvatarSnapshot { avatars }
            }
            kind::CHAT => Message::Chat {
                avatar_id: reader.read_i32()?,
                text: reader.read_string()?,
            },
            kind::CHAT_COMMAND => Message::ChatCommand {
                text: reader.read_string()?,
            },
            kind::SKIN_CHANGE_REQUEST => Message::SkinChangeRequest,
            kind::MOVE_REQUEST => Message::MoveRequest {
                x: reader.read_f32()?,
                y: reader.read_f32()?,
                z: reader.read_f32()?,
            },
            other => return Err(DecodeError::UnknownKind(other)),
        };

        reader.finish()?;
        Ok(message)
    }
}

/// Appends primitives in wire order.
#[derive(Debug, Default)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_str(&mut self, text: &str) {
        self.write_len(text.len());
        self.buf.extend_from_slice(text.as_bytes());
    }

    pub fn write_avatar(&mut self, avatar: &Avatar) {
        self.write_i32(avatar.id);
        self.write_i32(avatar.skin);
        self.write_f32(avatar.position.x);
        self.write_f32(avatar.position.y);
        self.write_f32(avatar.position.z);
    }

    // Lengths above i32::MAX cannot be represented; frames are capped far
    // below that, so saturating here only affects payloads the transport
    // refuses anyway.
    fn write_len(&mut self, len: usize) {
        self.write_i32(i32::try_from(len).unwrap_or(i32::MAX));
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads primitives in wire order from a borrowed buffer.
#[derive(Debug)]
pub struct PacketReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn ensure(&self, needed: usize) -> Result<(), DecodeError> {
        if self.remaining() < needed {
            return Err(DecodeError::UnexpectedEnd {
                needed,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], DecodeError> {
        self.ensure(count)?;
        let slice = &self.bytes[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    fn take_array(&mut self) -> Result<[u8; 4], DecodeError> {
        let slice = self.take(4)?;
        Ok([slice[0], slice[1], slice[2], slice[3]])
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }

    fn read_len(&mut self) -> Result<usize, DecodeError> {
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| DecodeError::NegativeLength(len))
    }

    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_len()?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }

    pub fn read_avatar(&mut self) -> Result<Avatar, DecodeError> {
        let id = self.read_i32()?;
        let skin = self.read_i32()?;
        let x = self.read_f32()?;
        let y = self.read_f32()?;
        let z = self.read_f32()?;
        Ok(Avatar::new(id, Vec3::new(x, y, z), skin))
    }

    /// Fails if anything is left unread.
    pub fn finish(&self) -> Result<(), DecodeError> {
        match self.remaining() {
            0 => Ok(()),
            left => Err(DecodeError::TrailingBytes(left)),
        }
    }
}
