//! Video capture: device lifecycle, zero-copy buffer exchange and pixel
//! conversion.
//!
//! [`CaptureDevice`] holds the capture logic and talks to hardware only
//! through the [`CaptureDriver`] trait. On Linux the production driver is
//! [`V4l2Driver`]; tests use [`mock::MockCaptureDriver`].

pub mod convert;
pub mod device;
pub mod format;
pub mod mock;
pub mod pool;
#[cfg(target_os = "linux")]
pub mod v4l2;

use thiserror::Error;

pub use device::CaptureDevice;
pub use format::{DeviceInfo, FormatDescription, FourCc, PixelFormat, Resolution};
pub use pool::{BufferHandle, BufferPool, SlotState};
#[cfg(target_os = "linux")]
pub use v4l2::{list_devices, V4l2Driver};

/// Number of buffers requested from the driver when capture starts.
pub const BUFFER_COUNT: u32 = 4;

/// Error type for capture operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open capture device {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("capture device is not open")]
    NotOpen,

    #[error("capture is not running")]
    NotCapturing,

    #[error("format negotiation failed: {0}")]
    Negotiation(String),

    #[error("buffer setup failed: {0}")]
    Buffer(String),

    #[error("driver granted no capture buffers")]
    NoBuffers,

    #[error("stream control failed: {0}")]
    Stream(String),

    #[error("device I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported pixel format {0}")]
    UnsupportedFormat(FourCc),

    #[error("frame too short: expected {expected} bytes, got {actual}")]
    ShortFrame { expected: usize, actual: usize },

    #[error("failed to decode frame: {0}")]
    Decode(#[from] image::ImageError),

    #[error("buffer {0} is not held by the application")]
    SlotNotDequeued(u32),

    #[error("buffer {0} is already held by the application")]
    SlotAlreadyDequeued(u32),

    #[error("unknown buffer index {0}")]
    UnknownSlot(u32),

    #[error("buffer handle belongs to a previous capture session")]
    StaleHandle,
}

/// A driver-mapped buffer region.
///
/// Dropping the value releases the mapping.
pub trait FrameMemory: Send {
    fn as_slice(&self) -> &[u8];
}

impl FrameMemory for Vec<u8> {
    fn as_slice(&self) -> &[u8] {
        self
    }
}

/// Low-level access to one video capture node.
///
/// Methods map one-to-one onto driver requests; ordering and buffer
/// ownership are enforced by [`CaptureDevice`].
pub trait CaptureDriver: Send {
    fn open(&mut self, path: &str) -> Result<(), CaptureError>;

    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Appends the node's formats to `out`. Entries pushed before an error
    /// stay in `out`.
    fn enum_formats(&self, out: &mut Vec<FormatDescription>) -> Result<(), CaptureError>;

    /// Appends the discrete frame sizes for `fourcc` to `out`.
    fn enum_resolutions(
        &self,
        fourcc: FourCc,
        out: &mut Vec<Resolution>,
    ) -> Result<(), CaptureError>;

    /// Appends the discrete frame rates (frames per second) for `fourcc` at
    /// `resolution` to `out`.
    fn enum_frame_rates(
        &self,
        fourcc: FourCc,
        resolution: Resolution,
        out: &mut Vec<u32>,
    ) -> Result<(), CaptureError>;

    /// Requests a format and returns the size the driver actually chose.
    fn set_format(
        &mut self,
        resolution: Resolution,
        fourcc: FourCc,
    ) -> Result<Resolution, CaptureError>;

    fn set_frame_rate(&mut self, fps: u32) -> Result<(), CaptureError>;

    /// Requests `count` buffers and returns how many were granted.
    /// `count == 0` releases the current allocation.
    fn request_buffers(&mut self, count: u32) -> Result<u32, CaptureError>;

    fn map_buffer(&mut self, index: u32) -> Result<Box<dyn FrameMemory>, CaptureError>;

    /// Hands buffer `index` to the driver for filling.
    fn queue_buffer(&mut self, index: u32) -> Result<(), CaptureError>;

    /// Waits for a filled buffer; returns its index and valid byte count.
    fn dequeue_buffer(&mut self) -> Result<(u32, usize), CaptureError>;

    fn stream_on(&mut self) -> Result<(), CaptureError>;

    fn stream_off(&mut self) -> Result<(), CaptureError>;
}
