//! Normalized hardware commands consumed by the serial HID driver.
//!
//! Every input source (local pointer/keyboard, remote control messages)
//! is reduced to a [`HidCommand`] before it reaches the injection chip.
//! A command is created once, queued, and consumed exactly once.

use serde::{Deserialize, Serialize};

/// Largest coordinate on either axis of an absolute pointer report.
pub const ABSOLUTE_MAX: i32 = 4095;

/// Magnitude limit of a relative pointer delta or a wheel step.
pub const RELATIVE_LIMIT: i32 = 127;

/// Discriminates how the four parameters of a [`HidCommand`] are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HidCommandKind {
    /// `(x, y, buttons, wheel)` with `x, y` in `0..=4095`.
    MouseAbsolute,
    /// `(dx, dy, buttons, wheel)` with `dx, dy` in `-127..=127`.
    MouseRelative,
    /// `(modifiers, key_code, 0, 0)`; key code `0` releases all keys.
    Keyboard,
}

/// One hardware command.
///
/// Use the constructors rather than building the struct directly: they
/// apply the range limits the chip expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HidCommand {
    pub kind: HidCommandKind,
    pub p1: i32,
    pub p2: i32,
    pub p3: i32,
    pub p4: i32,
}

impl HidCommand {
    /// Absolute pointer report. Coordinates are clamped to `0..=4095`.
    pub fn mouse_absolute(x: i32, y: i32, buttons: MouseButtons, wheel: i32) -> Self {
        Self {
            kind: HidCommandKind::MouseAbsolute,
            p1: x.clamp(0, ABSOLUTE_MAX),
            p2: y.clamp(0, ABSOLUTE_MAX),
            p3: i32::from(buttons.bits()),
            p4: clamp_relative(wheel),
        }
    }

    /// Relative pointer report. Deltas are clamped to `-127..=127`.
    pub fn mouse_relative(dx: i32, dy: i32, buttons: MouseButtons, wheel: i32) -> Self {
        Self {
            kind: HidCommandKind::MouseRelative,
            p1: clamp_relative(dx),
            p2: clamp_relative(dy),
            p3: i32::from(buttons.bits()),
            p4: clamp_relative(wheel),
        }
    }

    /// Keyboard report with a single key slot.
    pub fn keyboard(modifiers: ModifierMask, key_code: u8) -> Self {
        Self {
            kind: HidCommandKind::Keyboard,
            p1: i32::from(modifiers.bits()),
            p2: i32::from(key_code),
            p3: 0,
            p4: 0,
        }
    }

    /// Keyboard report that releases every non-modifier key.
    pub fn key_release(modifiers: ModifierMask) -> Self {
        Self::keyboard(modifiers, 0)
    }

    /// Press-then-release pair for `buttons` without pointer movement.
    pub fn click(buttons: MouseButtons) -> [Self; 2] {
        [
            Self::mouse_relative(0, 0, buttons, 0),
            Self::mouse_relative(0, 0, MouseButtons::NONE, 0),
        ]
    }

    /// Button mask of a pointer command (`0` for keyboard commands).
    pub fn buttons(&self) -> MouseButtons {
        match self.kind {
            HidCommandKind::Keyboard => MouseButtons::NONE,
            _ => MouseButtons::from_bits(self.p3 as u8),
        }
    }
}

/// Clamps a signed value into the `-127..=127` range of relative reports.
pub fn clamp_relative(value: i32) -> i32 {
    value.clamp(-RELATIVE_LIMIT, RELATIVE_LIMIT)
}

// ── Button mask ───────────────────────────────────────────────────────────────

/// Pointer button bitmask as carried in HID mouse reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MouseButtons(u8);

impl MouseButtons {
    pub const NONE: Self = Self(0x00);
    pub const LEFT: Self = Self(0x01);
    pub const RIGHT: Self = Self(0x02);
    pub const MIDDLE: Self = Self(0x04);

    /// Keeps only the three defined button bits.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0x07)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for MouseButtons {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for MouseButtons {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

// ── Modifier mask ─────────────────────────────────────────────────────────────

/// Keyboard modifier bitmask: bits 0..3 are the left-hand Ctrl, Shift, Alt,
/// Meta keys and bits 4..7 the right-hand ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ModifierMask(u8);

impl ModifierMask {
    pub const NONE: Self = Self(0x00);
    pub const LEFT_CTRL: Self = Self(0x01);
    pub const LEFT_SHIFT: Self = Self(0x02);
    pub const LEFT_ALT: Self = Self(0x04);
    pub const LEFT_META: Self = Self(0x08);
    pub const RIGHT_CTRL: Self = Self(0x10);
    pub const RIGHT_SHIFT: Self = Self(0x20);
    pub const RIGHT_ALT: Self = Self(0x40);
    pub const RIGHT_META: Self = Self(0x80);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ModifierMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for ModifierMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mouse_absolute_clamps_coordinates_into_twelve_bit_range() {
        // Arrange / Act
        let cmd = HidCommand::mouse_absolute(-20, 9000, MouseButtons::LEFT, 0);

        // Assert
        assert_eq!(cmd.kind, HidCommandKind::MouseAbsolute);
        assert_eq!((cmd.p1, cmd.p2), (0, ABSOLUTE_MAX));
        assert_eq!(cmd.p3, 0x01);
    }

    #[test]
    fn test_mouse_relative_clamps_each_axis_independently() {
        // Arrange / Act
        let cmd = HidCommand::mouse_relative(300, -42, MouseButtons::NONE, -500);

        // Assert
        assert_eq!(cmd.p1, 127);
        assert_eq!(cmd.p2, -42, "in-range deltas must pass through unchanged");
        assert_eq!(cmd.p4, -127);
    }

    #[test]
    fn test_key_release_carries_zero_key_code_and_modifiers() {
        // Arrange / Act
        let cmd = HidCommand::key_release(ModifierMask::LEFT_SHIFT);

        // Assert
        assert_eq!(cmd.kind, HidCommandKind::Keyboard);
        assert_eq!(cmd.p1, 0x02);
        assert_eq!(cmd.p2, 0);
    }

    #[test]
    fn test_click_presses_then_releases_without_moving() {
        // Arrange / Act
        let [press, release] = HidCommand::click(MouseButtons::RIGHT);

        // Assert
        assert_eq!(press.kind, HidCommandKind::MouseRelative);
        assert_eq!((press.p1, press.p2), (0, 0));
        assert_eq!(press.buttons(), MouseButtons::RIGHT);
        assert_eq!(release.kind, HidCommandKind::MouseRelative);
        assert_eq!((release.p1, release.p2), (0, 0));
        assert_eq!(release.buttons(), MouseButtons::NONE);
    }

    #[test]
    fn test_button_mask_keeps_only_defined_bits() {
        let buttons = MouseButtons::from_bits(0xFF);
        assert_eq!(buttons.bits(), 0x07);
        assert!(buttons.contains(MouseButtons::LEFT | MouseButtons::MIDDLE));
    }

    #[test]
    fn test_modifier_mask_layout_matches_report_bits() {
        let mask = ModifierMask::LEFT_CTRL | ModifierMask::RIGHT_META;
        assert_eq!(mask.bits(), 0x81);
        assert!(mask.contains(ModifierMask::RIGHT_META));
        assert!(!mask.contains(ModifierMask::LEFT_ALT));
    }

    #[test]
    fn test_buttons_accessor_is_empty_for_keyboard_commands() {
        let cmd = HidCommand::keyboard(ModifierMask::from_bits(0x07), 0x04);
        assert!(cmd.buttons().is_empty());
    }
}
