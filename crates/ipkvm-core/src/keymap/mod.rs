//! Key code tables for keyboard event translation.
//!
//! The canonical representation is USB HID Usage IDs (page 0x07, Keyboard/Keypad),
//! which is what the injection chip expects in its key slots. Local desktop
//! key identifiers are translated to HID at the input boundary.

pub mod hid;
pub mod x11;

pub use hid::HidKeyCode;

/// Static lookup from local key identifiers to HID usage codes.
pub struct KeyCodeTable;

impl KeyCodeTable {
    /// Translates an X11 KeySym to a [`HidKeyCode`].
    ///
    /// Shifted symbols resolve to the same code as their unshifted key.
    /// Returns [`HidKeyCode::Unknown`] if no mapping exists.
    pub fn from_keysym(keysym: u32) -> HidKeyCode {
        x11::keysym_to_hid(keysym)
    }

    /// Returns the byte to place in a keyboard report key slot for `keysym`.
    ///
    /// Modifier keys and unmapped keys yield `0`: modifiers are reported
    /// through the modifier mask only.
    pub fn slot_code(keysym: u32) -> u8 {
        let code = Self::from_keysym(keysym);
        if code.is_modifier() {
            0
        } else {
            code.as_u8()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_code_for_plain_key_is_usage_byte() {
        assert_eq!(KeyCodeTable::slot_code(0x0061), 0x04); // XK_a
    }

    #[test]
    fn test_slot_code_for_modifier_key_is_zero() {
        // Arrange: XK_Shift_L is mapped, but never occupies a key slot
        let keysym = 0xFFE1;

        // Act
        let code = KeyCodeTable::slot_code(keysym);

        // Assert
        assert_eq!(KeyCodeTable::from_keysym(keysym), HidKeyCode::ShiftLeft);
        assert_eq!(code, 0);
    }

    #[test]
    fn test_slot_code_for_unmapped_key_is_zero() {
        assert_eq!(KeyCodeTable::slot_code(0x00E9), 0);
    }
}
