//! Serial HID injection: the driver side of the command pipeline.
//!
//! The orchestrator drains the command queue into a [`HidDriver`]. The
//! production driver talks to a CH9329 chip over a serial port; the
//! dry-run driver only logs, and the recording driver captures commands
//! for tests.

use ipkvm_core::{HidCommand, HidCommandKind, ModifierMask, MouseButtons};
use thiserror::Error;

pub mod ch9329;
pub mod logging;
pub mod mock;

pub use ch9329::Ch9329Driver;
pub use logging::LoggingHidDriver;

/// Error type for HID driver operations.
#[derive(Debug, Error)]
pub enum HidError {
    /// The serial port could not be opened or configured.
    #[error("failed to open serial port {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },

    /// Writing to or reading from the port failed.
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The chip did not answer a query.
    #[error("no response from HID chip")]
    NoResponse,

    /// The chip answered with a malformed or unexpected frame.
    #[error("unexpected response from HID chip: {0}")]
    BadResponse(String),
}

/// A device that injects keyboard and mouse reports into the target.
///
/// Values passed in are already range-limited by [`HidCommand`]'s
/// constructors.
pub trait HidDriver: Send {
    /// Sends an absolute pointer report (`x`, `y` in `0..=4095`).
    fn send_mouse_absolute(
        &mut self,
        buttons: MouseButtons,
        x: u16,
        y: u16,
        wheel: i8,
    ) -> Result<(), HidError>;

    /// Sends a relative pointer report.
    fn send_mouse_relative(
        &mut self,
        buttons: MouseButtons,
        dx: i8,
        dy: i8,
        wheel: i8,
    ) -> Result<(), HidError>;

    /// Sends a keyboard report with one key slot; `key == 0` releases all keys.
    fn send_keyboard(&mut self, modifiers: ModifierMask, key: u8) -> Result<(), HidError>;

    /// Routes `cmd` to the matching report.
    fn dispatch(&mut self, cmd: &HidCommand) -> Result<(), HidError> {
        match cmd.kind {
            HidCommandKind::MouseAbsolute => self.send_mouse_absolute(
                cmd.buttons(),
                cmd.p1.clamp(0, i32::from(u16::MAX)) as u16,
                cmd.p2.clamp(0, i32::from(u16::MAX)) as u16,
                to_i8(cmd.p4),
            ),
            HidCommandKind::MouseRelative => self.send_mouse_relative(
                cmd.buttons(),
                to_i8(cmd.p1),
                to_i8(cmd.p2),
                to_i8(cmd.p4),
            ),
            HidCommandKind::Keyboard => {
                self.send_keyboard(ModifierMask::from_bits(cmd.p1 as u8), cmd.p2 as u8)
            }
        }
    }
}

fn to_i8(value: i32) -> i8 {
    value.clamp(i32::from(i8::MIN), i32::from(i8::MAX)) as i8
}

#[cfg(test)]
mod tests {
    use super::mock::RecordingHidDriver;
    use super::*;

    #[test]
    fn test_dispatch_routes_each_kind_to_its_report() {
        // Arrange
        let mut driver = RecordingHidDriver::new();
        let commands = [
            HidCommand::mouse_absolute(4095, 12, MouseButtons::LEFT, -1),
            HidCommand::mouse_relative(-127, 5, MouseButtons::RIGHT, 2),
            HidCommand::keyboard(ModifierMask::LEFT_ALT, 0x2B),
        ];

        // Act
        for cmd in &commands {
            driver.dispatch(cmd).unwrap();
        }

        // Assert
        assert_eq!(driver.sent(), commands.to_vec());
    }
}
