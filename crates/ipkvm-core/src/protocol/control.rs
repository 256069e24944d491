//! Remote control messages sent by network viewers.
//!
//! Each transport message carries exactly one control message; framing is
//! handled by the transport. Byte 0 is the discriminator:
//!
//! ```text
//! 0x01 Keyboard        [0x01][modifiers:1][key:1]
//! 0x02 Mouse absolute  [0x02][buttons:1][x:2 LE][y:2 LE][wheel:1 signed]
//! ```
//!
//! Absolute coordinates arrive in `0..=32767` and are rescaled to the
//! `0..=4095` range of the injection chip.

use thiserror::Error;
use tracing::debug;

use crate::domain::command::{HidCommand, ModifierMask, MouseButtons};

/// Largest coordinate a viewer may send on either axis.
pub const NETWORK_COORD_MAX: u16 = 32767;

/// Minimum length of a keyboard message, discriminator included.
pub const KEYBOARD_MESSAGE_LEN: usize = 3;

/// Minimum length of an absolute mouse message, discriminator included.
pub const MOUSE_ABSOLUTE_MESSAGE_LEN: usize = 7;

/// Errors produced while decoding a control message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    /// The message is empty.
    #[error("empty control message")]
    Empty,

    /// The message is shorter than its discriminator requires.
    #[error("control message 0x{kind:02X} too short: need {needed} bytes, got {available}")]
    TooShort {
        kind: u8,
        needed: usize,
        available: usize,
    },

    /// The discriminator byte is not a known message type.
    #[error("unknown control message type: 0x{0:02X}")]
    UnknownType(u8),
}

/// Discriminator byte of a control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlMessageType {
    Keyboard = 0x01,
    MouseAbsolute = 0x02,
}

impl TryFrom<u8> for ControlMessageType {
    type Error = ControlError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(ControlMessageType::Keyboard),
            0x02 => Ok(ControlMessageType::MouseAbsolute),
            other => Err(ControlError::UnknownType(other)),
        }
    }
}

impl ControlMessageType {
    /// Minimum message length for this type.
    pub fn min_len(self) -> usize {
        match self {
            ControlMessageType::Keyboard => KEYBOARD_MESSAGE_LEN,
            ControlMessageType::MouseAbsolute => MOUSE_ABSOLUTE_MESSAGE_LEN,
        }
    }
}

/// A decoded control message, coordinates still in network range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    Keyboard {
        modifiers: ModifierMask,
        key_code: u8,
    },
    MouseAbsolute {
        buttons: MouseButtons,
        x: u16,
        y: u16,
        wheel: i8,
    },
}

impl ControlMessage {
    /// Converts the message into the hardware command it stands for.
    pub fn to_command(self) -> HidCommand {
        match self {
            ControlMessage::Keyboard {
                modifiers,
                key_code,
            } => HidCommand::keyboard(modifiers, key_code),
            ControlMessage::MouseAbsolute {
                buttons,
                x,
                y,
                wheel,
            } => HidCommand::mouse_absolute(
                scale_network_coordinate(x),
                scale_network_coordinate(y),
                buttons,
                i32::from(wheel),
            ),
        }
    }

    /// Serializes the message in the wire layout described in the module docs.
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            ControlMessage::Keyboard {
                modifiers,
                key_code,
            } => vec![
                ControlMessageType::Keyboard as u8,
                modifiers.bits(),
                key_code,
            ],
            ControlMessage::MouseAbsolute {
                buttons,
                x,
                y,
                wheel,
            } => {
                let mut buf = Vec::with_capacity(MOUSE_ABSOLUTE_MESSAGE_LEN);
                buf.push(ControlMessageType::MouseAbsolute as u8);
                buf.push(buttons.bits());
                buf.extend_from_slice(&x.to_le_bytes());
                buf.extend_from_slice(&y.to_le_bytes());
                buf.push(wheel as u8);
                buf
            }
        }
    }
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Decodes a single control message.
///
/// Trailing bytes beyond the minimum length are ignored.
///
/// # Errors
///
/// Returns [`ControlError`] for empty, too-short, or unknown messages.
pub fn decode_control(buf: &[u8]) -> Result<ControlMessage, ControlError> {
    let (&kind_byte, _) = buf.split_first().ok_or(ControlError::Empty)?;
    let kind = ControlMessageType::try_from(kind_byte)?;
    require_len(buf, kind)?;

    match kind {
        ControlMessageType::Keyboard => Ok(ControlMessage::Keyboard {
            modifiers: ModifierMask::from_bits(buf[1]),
            key_code: buf[2],
        }),
        ControlMessageType::MouseAbsolute => Ok(ControlMessage::MouseAbsolute {
            buttons: MouseButtons::from_bits(buf[1]),
            x: u16::from_le_bytes([buf[2], buf[3]]),
            y: u16::from_le_bytes([buf[4], buf[5]]),
            wheel: buf.get(6).map(|&b| b as i8).unwrap_or(0),
        }),
    }
}

/// Decodes `buf` into hardware commands, dropping malformed input.
///
/// Too-short and unknown messages yield an empty vector; the reason is
/// logged at `debug` level.
pub fn parse_commands(buf: &[u8]) -> Vec<HidCommand> {
    match decode_control(buf) {
        Ok(msg) => vec![msg.to_command()],
        Err(e) => {
            debug!("dropping control message: {e}");
            Vec::new()
        }
    }
}

/// Rescales a `0..=32767` viewer coordinate into `0..=4095`.
///
/// Values above 32767 are treated as 32767.
pub fn scale_network_coordinate(value: u16) -> i32 {
    let v = i64::from(value.min(NETWORK_COORD_MAX));
    (v * 4095 / i64::from(NETWORK_COORD_MAX)) as i32
}

fn require_len(buf: &[u8], kind: ControlMessageType) -> Result<(), ControlError> {
    let needed = kind.min_len();
    if buf.len() < needed {
        return Err(ControlError::TooShort {
            kind: kind as u8,
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
