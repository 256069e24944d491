//! Recording HID driver for tests.
//!
//! Every report is stored as the [`HidCommand`] it came from. The log is
//! shared through an `Arc`, so a test keeps a handle after moving the driver
//! into the orchestrator.

use std::sync::{Arc, Mutex};

use ipkvm_core::{HidCommand, ModifierMask, MouseButtons};

use super::{HidDriver, HidError};

/// A [`HidDriver`] that records every report it is asked to send.
#[derive(Debug, Clone, Default)]
pub struct RecordingHidDriver {
    sent: Arc<Mutex<Vec<HidCommand>>>,
}

impl RecordingHidDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every report sent so far.
    pub fn sent(&self) -> Vec<HidCommand> {
        self.sent.lock().expect("lock poisoned").clone()
    }

    fn record(&self, cmd: HidCommand) {
        self.sent.lock().expect("lock poisoned").push(cmd);
    }
}

impl HidDriver for RecordingHidDriver {
    fn send_mouse_absolute(
        &mut self,
        buttons: MouseButtons,
        x: u16,
        y: u16,
        wheel: i8,
    ) -> Result<(), HidError> {
        self.record(HidCommand::mouse_absolute(
            i32::from(x),
            i32::from(y),
            buttons,
            i32::from(wheel),
        ));
        Ok(())
    }

    fn send_mouse_relative(
        &mut self,
        buttons: MouseButtons,
        dx: i8,
        dy: i8,
        wheel: i8,
    ) -> Result<(), HidError> {
        self.record(HidCommand::mouse_relative(
            i32::from(dx),
            i32::from(dy),
            buttons,
            i32::from(wheel),
        ));
        Ok(())
    }

    fn send_keyboard(&mut self, modifiers: ModifierMask, key: u8) -> Result<(), HidError> {
        self.record(HidCommand::keyboard(modifiers, key));
        Ok(())
    }
}
