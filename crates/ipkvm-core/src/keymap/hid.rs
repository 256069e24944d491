//! USB HID Usage IDs (page 0x07, Keyboard/Keypad page).
//!
//! These are the single-byte key codes the injection chip places in the key
//! slots of a keyboard report. Codes name physical key positions, not
//! characters: `!` and `1` share [`HidKeyCode::Digit1`] and the shift state
//! travels separately in the modifier mask.
//!
//! Reference: USB HID Usage Tables 1.3, Section 10 (Keyboard/Keypad page 0x07).
//!
//! [`HidKeyCode::Unknown`] (0x00) is the "no key" code. A keyboard report
//! carrying it releases every held key.

use serde::{Deserialize, Serialize};

use crate::domain::command::ModifierMask;

/// First modifier usage (left control). The eight modifiers are contiguous
/// and their order matches the bit order of the report's modifier byte.
const FIRST_MODIFIER: u8 = 0xE0;
const LAST_MODIFIER: u8 = 0xE7;

/// Declares [`HidKeyCode`] and its byte lookup from a single table, so the
/// enum and `from_u8` cannot drift apart.
macro_rules! usage_codes {
    {
        $(#[$meta:meta])* $vis:vis enum $name:ident {
            $( $key:ident => $code:literal ),* $(,)?
        }
    } => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u8)]
        $vis enum $name {
            $( $key = $code, )*
            /// Sentinel for keys with no HID mapping.
            Unknown = 0x00,
        }

        impl $name {
            /// Converts a raw usage byte to a key code.
            ///
            /// Bytes that name no key in this table yield `Unknown`.
            pub fn from_u8(value: u8) -> Self {
                match value {
                    $( $code => Self::$key, )*
                    _ => Self::Unknown,
                }
            }
        }
    };
}

usage_codes! {
    /// USB HID Usage ID for keyboard keys (page 0x07).
    ///
    /// The discriminant of each variant is its usage byte.
    pub enum HidKeyCode {
        // 0x04..=0x1D
        KeyA => 0x04, KeyB => 0x05, KeyC => 0x06, KeyD => 0x07, KeyE => 0x08,
        KeyF => 0x09, KeyG => 0x0A, KeyH => 0x0B, KeyI => 0x0C, KeyJ => 0x0D,
        KeyK => 0x0E, KeyL => 0x0F, KeyM => 0x10, KeyN => 0x11, KeyO => 0x12,
        KeyP => 0x13, KeyQ => 0x14, KeyR => 0x15, KeyS => 0x16, KeyT => 0x17,
        KeyU => 0x18, KeyV => 0x19, KeyW => 0x1A, KeyX => 0x1B, KeyY => 0x1C,
        KeyZ => 0x1D,

        // Top row digits; 0 comes last on the keyboard and in the table.
        Digit1 => 0x1E, Digit2 => 0x1F, Digit3 => 0x20, Digit4 => 0x21,
        Digit5 => 0x22, Digit6 => 0x23, Digit7 => 0x24, Digit8 => 0x25,
        Digit9 => 0x26, Digit0 => 0x27,

        Enter => 0x28, Escape => 0x29, Backspace => 0x2A, Tab => 0x2B,
        Space => 0x2C, Minus => 0x2D, Equal => 0x2E, BracketLeft => 0x2F,
        BracketRight => 0x30, Backslash => 0x31, Semicolon => 0x33,
        Quote => 0x34, Backquote => 0x35, Comma => 0x36, Period => 0x37,
        Slash => 0x38, CapsLock => 0x39,

        F1 => 0x3A, F2 => 0x3B, F3 => 0x3C, F4 => 0x3D, F5 => 0x3E, F6 => 0x3F,
        F7 => 0x40, F8 => 0x41, F9 => 0x42, F10 => 0x43, F11 => 0x44, F12 => 0x45,

        PrintScreen => 0x46, ScrollLock => 0x47, Pause => 0x48, Insert => 0x49,
        Home => 0x4A, PageUp => 0x4B, Delete => 0x4C, End => 0x4D,
        PageDown => 0x4E, ArrowRight => 0x4F, ArrowLeft => 0x50,
        ArrowDown => 0x51, ArrowUp => 0x52,

        NumLock => 0x53, NumpadDivide => 0x54, NumpadMultiply => 0x55,
        NumpadSubtract => 0x56, NumpadAdd => 0x57, NumpadEnter => 0x58,
        Numpad1 => 0x59, Numpad2 => 0x5A, Numpad3 => 0x5B, Numpad4 => 0x5C,
        Numpad5 => 0x5D, Numpad6 => 0x5E, Numpad7 => 0x5F, Numpad8 => 0x60,
        Numpad9 => 0x61, Numpad0 => 0x62, NumpadDecimal => 0x63,

        ContextMenu => 0x65,

        ControlLeft => 0xE0, ShiftLeft => 0xE1, AltLeft => 0xE2, MetaLeft => 0xE3,
        ControlRight => 0xE4, ShiftRight => 0xE5, AltRight => 0xE6, MetaRight => 0xE7,
    }
}

impl HidKeyCode {
    /// Returns the usage byte placed in a keyboard report key slot.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_modifier(self) -> bool {
        (FIRST_MODIFIER..=LAST_MODIFIER).contains(&self.as_u8())
    }

    /// Returns the modifier-mask bit that stands for this key, if it is a
    /// modifier. Modifier keys travel in the mask, never in a key slot.
    pub fn modifier_bit(self) -> Option<ModifierMask> {
        self.is_modifier()
            .then(|| ModifierMask::from_bits(1 << (self.as_u8() - FIRST_MODIFIER)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Representative key codes with their usage bytes.
    const STANDARD_KEYS: &[(u8, HidKeyCode)] = &[
        (0x04, HidKeyCode::KeyA),
        (0x1D, HidKeyCode::KeyZ),
        (0x1E, HidKeyCode::Digit1),
        (0x27, HidKeyCode::Digit0),
        (0x28, HidKeyCode::Enter),
        (0x29, HidKeyCode::Escape),
        (0x2A, HidKeyCode::Backspace),
        (0x2B, HidKeyCode::Tab),
        (0x2C, HidKeyCode::Space),
        (0x38, HidKeyCode::Slash),
        (0x39, HidKeyCode::CapsLock),
        (0x3A, HidKeyCode::F1),
        (0x45, HidKeyCode::F12),
        (0x46, HidKeyCode::PrintScreen),
        (0x4C, HidKeyCode::Delete),
        (0x4F, HidKeyCode::ArrowRight),
        (0x52, HidKeyCode::ArrowUp),
        (0x53, HidKeyCode::NumLock),
        (0x62, HidKeyCode::Numpad0),
        (0x65, HidKeyCode::ContextMenu),
        (0xE0, HidKeyCode::ControlLeft),
        (0xE7, HidKeyCode::MetaRight),
    ];

    #[test]
    fn test_from_u8_and_as_u8_agree_for_standard_keys() {
        for &(raw, expected) in STANDARD_KEYS {
            // Arrange / Act
            let code = HidKeyCode::from_u8(raw);

            // Assert
            assert_eq!(code, expected, "from_u8(0x{raw:02X}) should produce {expected:?}");
            assert_eq!(code.as_u8(), raw, "{code:?}.as_u8() should return 0x{raw:02X}");
        }
    }

    #[test]
    fn test_unassigned_bytes_return_unknown() {
        for unassigned in [0x00, 0x01, 0x02, 0x03, 0x32, 0x64, 0xA0, 0xFF] {
            assert_eq!(
                HidKeyCode::from_u8(unassigned),
                HidKeyCode::Unknown,
                "0x{unassigned:02X} should map to Unknown"
            );
        }
    }

    #[test]
    fn test_unknown_code_is_the_release_byte() {
        assert_eq!(HidKeyCode::Unknown.as_u8(), 0x00);
    }

    #[test]
    fn test_all_letter_keys_are_contiguous_from_0x04() {
        for i in 0..26u8 {
            let code = HidKeyCode::from_u8(0x04 + i);
            assert_ne!(code, HidKeyCode::Unknown, "letter {i} must be mapped");
        }
        assert_eq!(HidKeyCode::KeyZ.as_u8() - HidKeyCode::KeyA.as_u8(), 25);
    }

    #[test]
    fn test_modifier_bits_follow_report_layout() {
        // Arrange
        let expected = [
            (HidKeyCode::ControlLeft, 0x01),
            (HidKeyCode::ShiftLeft, 0x02),
            (HidKeyCode::AltLeft, 0x04),
            (HidKeyCode::MetaLeft, 0x08),
            (HidKeyCode::ControlRight, 0x10),
            (HidKeyCode::ShiftRight, 0x20),
            (HidKeyCode::AltRight, 0x40),
            (HidKeyCode::MetaRight, 0x80),
        ];

        for (key, bit) in expected {
            // Act
            let mask = key.modifier_bit();

            // Assert
            assert!(key.is_modifier());
            assert_eq!(mask.map(ModifierMask::bits), Some(bit), "{key:?}");
        }
    }

    #[test]
    fn test_non_modifier_keys_have_no_modifier_bit() {
        for k in [HidKeyCode::KeyA, HidKeyCode::Enter, HidKeyCode::F1, HidKeyCode::Unknown] {
            assert!(!k.is_modifier(), "{k:?} should NOT be a modifier key");
            assert_eq!(k.modifier_bit(), None);
        }
    }
}
