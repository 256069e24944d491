//! Dry-run HID driver used when no serial port is configured.

use ipkvm_core::{ModifierMask, MouseButtons};
use tracing::debug;

use super::{HidDriver, HidError};

/// Logs every report at `debug` level instead of sending it.
#[derive(Debug, Default)]
pub struct LoggingHidDriver {
    reports: u64,
}

impl LoggingHidDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of reports accepted so far.
    pub fn reports(&self) -> u64 {
        self.reports
    }
}

impl HidDriver for LoggingHidDriver {
    fn send_mouse_absolute(
        &mut self,
        buttons: MouseButtons,
        x: u16,
        y: u16,
        wheel: i8,
    ) -> Result<(), HidError> {
        self.reports += 1;
        debug!("dry-run mouse abs: x={x} y={y} wheel={wheel} buttons={:#04x}", buttons.bits());
        Ok(())
    }

    fn send_mouse_relative(
        &mut self,
        buttons: MouseButtons,
        dx: i8,
        dy: i8,
        wheel: i8,
    ) -> Result<(), HidError> {
        self.reports += 1;
        debug!("dry-run mouse rel: dx={dx} dy={dy} wheel={wheel} buttons={:#04x}", buttons.bits());
        Ok(())
    }

    fn send_keyboard(&mut self, modifiers: ModifierMask, key: u8) -> Result<(), HidError> {
        self.reports += 1;
        debug!("dry-run keyboard: modifiers={:#04x} key={key:#04x}", modifiers.bits());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_report_is_counted() {
        let mut driver = LoggingHidDriver::new();
        driver.send_keyboard(ModifierMask::NONE, 0x04).unwrap();
        driver
            .send_mouse_relative(MouseButtons::NONE, 1, -1, 0)
            .unwrap();
        assert_eq!(driver.reports(), 2);
    }
}
