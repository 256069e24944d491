//! Pixel formats, resolutions and device descriptions.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Four-character pixel format code as used by V4L2.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FourCc([u8; 4]);

impl FourCc {
    /// Packed YUV 4:2:2, `Y0 U Y1 V`.
    pub const YUYV: FourCc = FourCc(*b"YUYV");
    /// Motion-JPEG, one JPEG image per frame.
    pub const MJPG: FourCc = FourCc(*b"MJPG");

    pub const fn new(code: &[u8; 4]) -> Self {
        FourCc(*code)
    }

    /// Decodes the little-endian `u32` form used in kernel structures.
    pub const fn from_u32(value: u32) -> Self {
        FourCc(value.to_le_bytes())
    }

    pub const fn to_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    pub const fn bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            let c = if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({self})")
    }
}

impl FromStr for FourCc {
    type Err = String;

    /// Parses exactly four ASCII characters, case-sensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| format!("pixel format must be four characters, got {s:?}"))?;
        if !bytes.iter().all(u8::is_ascii) {
            return Err(format!("pixel format must be ASCII, got {s:?}"));
        }
        Ok(FourCc(bytes))
    }
}

impl TryFrom<String> for FourCc {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FourCc> for String {
    fn from(value: FourCc) -> Self {
        value.to_string()
    }
}

/// Pixel formats the agent knows how to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Yuyv,
    Mjpeg,
}

impl PixelFormat {
    /// Returns `None` for formats without a converter.
    pub fn from_fourcc(fourcc: FourCc) -> Option<Self> {
        match fourcc {
            FourCc::YUYV => Some(PixelFormat::Yuyv),
            FourCc::MJPG => Some(PixelFormat::Mjpeg),
            _ => None,
        }
    }

    pub fn fourcc(self) -> FourCc {
        match self {
            PixelFormat::Yuyv => FourCc::YUYV,
            PixelFormat::Mjpeg => FourCc::MJPG,
        }
    }
}

/// Frame width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn pixels(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One entry of a device's format list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDescription {
    pub fourcc: FourCc,
    pub description: String,
}

/// A capture-capable video node found by device discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub path: PathBuf,
    pub card: String,
    pub driver: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_u32_form_is_little_endian() {
        // V4L2_PIX_FMT_YUYV
        assert_eq!(FourCc::YUYV.to_u32(), 0x5659_5559);
        assert_eq!(FourCc::from_u32(0x4750_4A4D), FourCc::MJPG);
    }

    #[test]
    fn test_fourcc_parse_requires_four_ascii_characters() {
        assert_eq!("YUYV".parse::<FourCc>(), Ok(FourCc::YUYV));
        assert!("YUV".parse::<FourCc>().is_err());
        assert!("YUYV2".parse::<FourCc>().is_err());
    }

    #[test]
    fn test_only_known_formats_have_a_pixel_format() {
        assert_eq!(PixelFormat::from_fourcc(FourCc::YUYV), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(FourCc::new(b"NV12")), None);
    }
}
