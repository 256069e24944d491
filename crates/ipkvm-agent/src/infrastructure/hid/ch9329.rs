//! CH9329 serial-to-USB-HID driver.
//!
//! The chip enumerates on the target as a keyboard plus an absolute and a
//! relative mouse, and accepts reports over a UART (9600 baud 8N1 by
//! default).
//!
//! Frame layout, all sent by the host:
//!
//! ```text
//! [0x57][0xAB][addr][cmd][len][data: len bytes][sum]
//! ```
//!
//! `sum` is the low byte of the sum of every preceding byte. Replies use the
//! same layout with `cmd | 0x80`.

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use ipkvm_core::{ModifierMask, MouseButtons};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info};

use super::{HidDriver, HidError};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Two-byte frame header.
pub const FRAME_HEADER: [u8; 2] = [0x57, 0xAB];

/// Factory-default chip address.
pub const DEFAULT_ADDRESS: u8 = 0x00;

/// Factory-default UART speed.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Bit set in the command byte of every reply.
const REPLY_FLAG: u8 = 0x80;

/// How long to wait for a reply before giving up.
const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Command codes understood by the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Ch9329Command {
    GetInfo = 0x01,
    KeyboardGeneral = 0x02,
    MouseAbsolute = 0x04,
    MouseRelative = 0x05,
}

/// Builds a complete frame for `cmd` carrying `data`.
pub fn encode_frame(address: u8, cmd: Ch9329Command, data: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(6 + data.len());
    frame.extend_from_slice(&FRAME_HEADER);
    frame.push(address);
    frame.push(cmd as u8);
    frame.push(data.len() as u8);
    frame.extend_from_slice(data);
    frame.push(checksum(&frame));
    frame
}

/// Low byte of the sum of `bytes`.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Keyboard report payload: modifiers, reserved byte, six key slots.
pub fn keyboard_payload(modifiers: ModifierMask, key: u8) -> [u8; 8] {
    [modifiers.bits(), 0x00, key, 0x00, 0x00, 0x00, 0x00, 0x00]
}

/// Absolute mouse payload; coordinates are little-endian in `0..=4095`.
pub fn mouse_absolute_payload(buttons: MouseButtons, x: u16, y: u16, wheel: i8) -> [u8; 7] {
    let [xl, xh] = x.to_le_bytes();
    let [yl, yh] = y.to_le_bytes();
    [0x02, buttons.bits(), xl, xh, yl, yh, wheel as u8]
}

/// Relative mouse payload.
pub fn mouse_relative_payload(buttons: MouseButtons, dx: i8, dy: i8, wheel: i8) -> [u8; 5] {
    [0x01, buttons.bits(), dx as u8, dy as u8, wheel as u8]
}

// ── Driver ────────────────────────────────────────────────────────────────────

/// Chip identification returned by [`Ch9329Driver::check_connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipInfo {
    pub version: u8,
    pub usb_connected: bool,
    pub lock_state: u8,
}

/// Driver for a CH9329 attached through any byte transport.
///
/// Production code uses a serial port (see [`Ch9329Driver::open`]); tests
/// substitute an in-memory transport.
pub struct Ch9329Driver<T> {
    transport: T,
    address: u8,
}

impl Ch9329Driver<Box<dyn SerialPort>> {
    /// Opens `path` at `baud_rate`, 8N1, no flow control.
    ///
    /// # Errors
    ///
    /// Returns [`HidError::Open`] if the port cannot be opened.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, HidError> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|source| HidError::Open {
                path: path.to_string(),
                source,
            })?;

        info!("opened HID serial port {path} at {baud_rate} baud");
        Ok(Self::new(port))
    }
}

impl<T: Read + Write + Send> Ch9329Driver<T> {
    /// Wraps an already-open transport using the default chip address.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            address: DEFAULT_ADDRESS,
        }
    }

    /// Queries the chip and validates its reply.
    ///
    /// # Errors
    ///
    /// Returns [`HidError::NoResponse`] on timeout and
    /// [`HidError::BadResponse`] if the reply is malformed.
    pub fn check_connection(&mut self) -> Result<ChipInfo, HidError> {
        self.write_frame(Ch9329Command::GetInfo, &[])?;
        let payload = self.read_reply(Ch9329Command::GetInfo)?;
        if payload.len() < 3 {
            return Err(HidError::BadResponse(format!(
                "info payload too short: {} bytes",
                payload.len()
            )));
        }
        let info = ChipInfo {
            version: payload[0],
            usb_connected: payload[1] != 0,
            lock_state: payload[2],
        };
        debug!("CH9329 info: {info:?}");
        Ok(info)
    }

    /// Consumes the driver and returns the transport.
    pub fn into_inner(self) -> T {
        self.transport
    }

    fn write_frame(&mut self, cmd: Ch9329Command, data: &[u8]) -> Result<(), HidError> {
        let frame = encode_frame(self.address, cmd, data);
        self.transport.write_all(&frame)?;
        self.transport.flush()?;
        Ok(())
    }

    fn read_reply(&mut self, cmd: Ch9329Command) -> Result<Vec<u8>, HidError> {
        let mut head = [0u8; 5];
        self.read_exact_or_timeout(&mut head)?;

        if head[..2] != FRAME_HEADER {
            return Err(HidError::BadResponse(format!("bad header {:02X?}", &head[..2])));
        }
        if head[3] != cmd as u8 | REPLY_FLAG {
            return Err(HidError::BadResponse(format!(
                "reply to 0x{:02X}, expected 0x{:02X}",
                head[3],
                cmd as u8 | REPLY_FLAG
            )));
        }

        let mut rest = vec![0u8; usize::from(head[4]) + 1];
        self.read_exact_or_timeout(&mut rest)?;
        let (payload, sum) = rest.split_at(rest.len() - 1);

        let expected = checksum(&head).wrapping_add(checksum(payload));
        if sum[0] != expected {
            return Err(HidError::BadResponse(format!(
                "checksum 0x{:02X}, expected 0x{expected:02X}",
                sum[0]
            )));
        }
        Ok(payload.to_vec())
    }

    fn read_exact_or_timeout(&mut self, buf: &mut [u8]) -> Result<(), HidError> {
        match self.transport.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::UnexpectedEof) => {
                Err(HidError::NoResponse)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl<T: Read + Write + Send> HidDriver for Ch9329Driver<T> {
    fn send_mouse_absolute(
        &mut self,
        buttons: MouseButtons,
        x: u16,
        y: u16,
        wheel: i8,
    ) -> Result<(), HidError> {
        let data = mouse_absolute_payload(buttons, x, y, wheel);
        self.write_frame(Ch9329Command::MouseAbsolute, &data)
    }

    fn send_mouse_relative(
        &mut self,
        buttons: MouseButtons,
        dx: i8,
        dy: i8,
        wheel: i8,
    ) -> Result<(), HidError> {
        let data = mouse_relative_payload(buttons, dx, dy, wheel);
        self.write_frame(Ch9329Command::MouseRelative, &data)
    }

    fn send_keyboard(&mut self, modifiers: ModifierMask, key: u8) -> Result<(), HidError> {
        let data = keyboard_payload(modifiers, key);
        self.write_frame(Ch9329Command::KeyboardGeneral, &data)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// In-memory transport: reads from a canned reply, records writes.
    struct FakePort {
        reply: Cursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl FakePort {
        fn with_reply(reply: Vec<u8>) -> Self {
            Self {
                reply: Cursor::new(reply),
                written: Vec::new(),
            }
        }
    }

    impl Read for FakePort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.reply.read(buf)
        }
    }

    impl Write for FakePort {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn info_reply() -> Vec<u8> {
        let mut frame = vec![0x57, 0xAB, 0x00, 0x81, 0x08, 0x30, 0x01, 0x02, 0, 0, 0, 0, 0];
        frame.push(checksum(&frame));
        frame
    }

    #[test]
    fn test_encode_frame_appends_length_and_checksum() {
        // Arrange / Act
        let frame = encode_frame(0x00, Ch9329Command::GetInfo, &[]);

        // Assert: 0x57 + 0xAB + 0x00 + 0x01 + 0x00 = 0x103 → 0x03
        assert_eq!(frame, vec![0x57, 0xAB, 0x00, 0x01, 0x00, 0x03]);
    }

    #[test]
    fn test_keyboard_report_places_key_in_first_slot() {
        // Arrange
        let mut driver = Ch9329Driver::new(FakePort::with_reply(Vec::new()));

        // Act
        driver
            .send_keyboard(ModifierMask::LEFT_SHIFT, 0x04)
            .unwrap();

        // Assert
        let written = driver.into_inner().written;
        assert_eq!(&written[..5], &[0x57, 0xAB, 0x00, 0x02, 0x08]);
        assert_eq!(&written[5..13], &[0x02, 0x00, 0x04, 0, 0, 0, 0, 0]);
        assert_eq!(written[13], checksum(&written[..13]));
    }

    #[test]
    fn test_absolute_report_is_little_endian() {
        assert_eq!(
            mouse_absolute_payload(MouseButtons::LEFT, 0x0FFF, 0x0102, -1),
            [0x02, 0x01, 0xFF, 0x0F, 0x02, 0x01, 0xFF]
        );
    }

    #[test]
    fn test_relative_report_encodes_signed_deltas() {
        assert_eq!(
            mouse_relative_payload(MouseButtons::NONE, -127, 127, 0),
            [0x01, 0x00, 0x81, 0x7F, 0x00]
        );
    }

    #[test]
    fn test_check_connection_parses_info_reply() {
        // Arrange
        let mut driver = Ch9329Driver::new(FakePort::with_reply(info_reply()));

        // Act
        let info = driver.check_connection().expect("valid reply");

        // Assert
        assert_eq!(info.version, 0x30);
        assert!(info.usb_connected);
        assert_eq!(info.lock_state, 0x02);
    }

    #[test]
    fn test_check_connection_without_reply_reports_no_response() {
        let mut driver = Ch9329Driver::new(FakePort::with_reply(Vec::new()));
        assert!(matches!(driver.check_connection(), Err(HidError::NoResponse)));
    }

    #[test]
    fn test_check_connection_rejects_bad_checksum() {
        // Arrange
        let mut reply = info_reply();
        let last = reply.len() - 1;
        reply[last] = reply[last].wrapping_add(1);
        let mut driver = Ch9329Driver::new(FakePort::with_reply(reply));

        // Act / Assert
        assert!(matches!(
            driver.check_connection(),
            Err(HidError::BadResponse(_))
        ));
    }
}
