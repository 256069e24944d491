//! H.264 encoding of captured frames for network viewers.
//!
//! [`FrameEncoder`] owns the per-stream state (planar staging buffer,
//! timestamps, GOP cadence) and drives an [`H264Backend`]. The production
//! backend is OpenH264; tests use [`mock::FakeEncoderFactory`].
//!
//! Encoders are always built through an [`EncoderFactory`] so the
//! orchestrator can rebuild one wholesale whenever the capture geometry
//! changes.

pub mod convert;
pub mod mock;
pub mod openh264;

use thiserror::Error;
use tracing::debug;

use crate::infrastructure::capture::Resolution;

pub use self::openh264::OpenH264Factory;
use convert::{i420_len, yuyv_to_i420};

/// Frames between forced key frames.
pub const DEFAULT_GOP: u32 = 30;

/// Lower bound for the bitrate heuristic, in bits per second.
pub const MIN_BITRATE: u32 = 400_000;

/// Error type for encoder construction and encoding.
#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("unsupported encoder geometry {width}x{height}")]
    UnsupportedGeometry { width: u32, height: u32 },

    #[error("encoder backend error: {0}")]
    Backend(String),

    #[error("frame size mismatch: expected {expected} bytes, got {actual}")]
    FrameSize { expected: usize, actual: usize },
}

/// Static encoder configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    pub resolution: Resolution,
    pub fps: u32,
    /// Target bitrate in bits per second.
    pub bitrate: u32,
    pub gop: u32,
}

impl EncoderSettings {
    /// Settings for a stream of `resolution` frames at `fps`.
    pub fn for_capture(resolution: Resolution, fps: u32) -> Self {
        Self {
            resolution,
            fps: fps.max(1),
            bitrate: bitrate_for(resolution),
            gop: DEFAULT_GOP,
        }
    }
}

/// Bitrate heuristic: two bytes per pixel, at least [`MIN_BITRATE`].
pub fn bitrate_for(resolution: Resolution) -> u32 {
    let raw = resolution.pixels().saturating_mul(2);
    u32::try_from(raw).unwrap_or(u32::MAX).max(MIN_BITRATE)
}

/// One planar 4:2:0 frame, `Y | U | V`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I420Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl I420Frame {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; i420_len(width, height)],
        }
    }

    /// Borrows the `Y`, `U` and `V` planes.
    pub fn planes(&self) -> (&[u8], &[u8], &[u8]) {
        let luma = self.width as usize * self.height as usize;
        let chroma = (self.width as usize / 2) * (self.height as usize / 2);
        let (y, uv) = self.data.split_at(luma.min(self.data.len()));
        let (u, v) = uv.split_at(chroma.min(uv.len()));
        (y, u, v)
    }
}

/// A low-latency H.264 encoder implementation.
///
/// A submitted frame may yield zero, one or several packets; callers drain
/// [`receive_packet`](Self::receive_packet) until it returns `None`.
pub trait H264Backend {
    /// Makes the next submitted frame an IDR frame.
    fn force_intra_frame(&mut self);

    fn submit(&mut self, frame: &I420Frame, pts: u64) -> Result<(), EncoderError>;

    fn receive_packet(&mut self) -> Option<Vec<u8>>;
}

/// Builds encoders on demand.
pub trait EncoderFactory: Send {
    /// # Errors
    ///
    /// Returns an error if the backend cannot be constructed for `settings`.
    fn create(&self, settings: EncoderSettings) -> Result<FrameEncoder, EncoderError>;
}

/// Converts YUYV frames and feeds them to an [`H264Backend`].
pub struct FrameEncoder {
    settings: EncoderSettings,
    backend: Box<dyn H264Backend>,
    staging: I420Frame,
    next_pts: u64,
}

impl FrameEncoder {
    /// Wraps `backend` for frames described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`EncoderError::UnsupportedGeometry`] if either dimension is
    /// zero or odd; 4:2:0 subsampling needs even sizes.
    pub fn new(
        settings: EncoderSettings,
        backend: Box<dyn H264Backend>,
    ) -> Result<Self, EncoderError> {
        validate_geometry(settings.resolution)?;
        let Resolution { width, height } = settings.resolution;
        Ok(Self {
            settings,
            backend,
            staging: I420Frame::new(width, height),
            next_pts: 0,
        })
    }

    pub fn settings(&self) -> EncoderSettings {
        self.settings
    }

    /// Number of frames submitted so far.
    pub fn frames_encoded(&self) -> u64 {
        self.next_pts
    }

    /// Encodes one YUYV frame and hands every resulting packet to `sink`.
    ///
    /// Returns the number of packets produced.
    pub fn encode<F>(&mut self, yuyv: &[u8], mut sink: F) -> Result<usize, EncoderError>
    where
        F: FnMut(&[u8]),
    {
        let Resolution { width, height } = self.settings.resolution;
        yuyv_to_i420(yuyv, width, height, &mut self.staging.data)?;

        let pts = self.next_pts;
        self.next_pts += 1;
        if pts % u64::from(self.settings.gop.max(1)) == 0 {
            self.backend.force_intra_frame();
        }
        self.backend.submit(&self.staging, pts)?;

        let mut packets = 0;
        while let Some(packet) = self.backend.receive_packet() {
            sink(&packet);
            packets += 1;
        }
        if packets == 0 {
            debug!("frame {pts} produced no packets");
        }
        Ok(packets)
    }
}

/// Rejects geometry the encoder cannot handle.
pub fn validate_geometry(resolution: Resolution) -> Result<(), EncoderError> {
    let Resolution { width, height } = resolution;
    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
        return Err(EncoderError::UnsupportedGeometry { width, height });
    }
    Ok(())
}
