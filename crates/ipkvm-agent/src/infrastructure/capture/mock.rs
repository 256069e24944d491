//! Mock capture driver for unit and integration testing.
//!
//! Buffers are plain vectors filled with a flat YUYV frame whose luma is
//! derived from the buffer index, so consecutive frames differ. Clones share
//! state, which lets a test keep a handle after moving the driver into a
//! [`CaptureDevice`](super::CaptureDevice) or the orchestrator.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use super::format::{FormatDescription, FourCc, Resolution};
use super::{CaptureDriver, CaptureError, FrameMemory};

#[derive(Debug, Default)]
struct MockState {
    open: bool,
    streaming: bool,
    resolution: Resolution,
    forced_resolution: Option<Resolution>,
    buffer_count: u32,
    queued: VecDeque<u32>,
    fail_open: bool,
    fail_set_format: bool,
    fail_dequeue: bool,
    fail_queue: bool,
    enumeration_limit: Option<usize>,
    calls: Vec<String>,
    formats_set: Vec<(Resolution, FourCc)>,
}

/// A [`CaptureDriver`] backed by heap memory.
#[derive(Debug, Clone, Default)]
pub struct MockCaptureDriver {
    state: Arc<Mutex<MockState>>,
}

/// Heap buffer that logs its own unmapping.
struct MockMemory {
    data: Vec<u8>,
    state: Arc<Mutex<MockState>>,
}

impl FrameMemory for MockMemory {
    fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for MockMemory {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.calls.push("unmap".to_string());
        }
    }
}

impl MockCaptureDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the driver negotiate `resolution` whatever is requested.
    pub fn force_resolution(&self, resolution: Resolution) {
        self.with(|s| s.forced_resolution = Some(resolution));
    }

    pub fn fail_open(&self, fail: bool) {
        self.with(|s| s.fail_open = fail);
    }

    pub fn fail_set_format(&self, fail: bool) {
        self.with(|s| s.fail_set_format = fail);
    }

    pub fn fail_dequeue(&self, fail: bool) {
        self.with(|s| s.fail_dequeue = fail);
    }

    /// Makes every `queue_buffer` call fail.
    pub fn fail_queue(&self, fail: bool) {
        self.with(|s| s.fail_queue = fail);
    }

    /// Fails every enumeration before its first entry.
    pub fn fail_enumeration(&self, fail: bool) {
        self.fail_enumeration_after(fail.then_some(0));
    }

    /// Fails enumerations after `limit` entries; `None` lists everything.
    pub fn fail_enumeration_after(&self, limit: Option<usize>) {
        self.with(|s| s.enumeration_limit = limit);
    }

    /// Driver requests made so far, oldest first.
    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    pub fn clear_calls(&self) {
        self.with(|s| s.calls.clear());
    }

    /// Every `(requested size, format)` passed to `set_format`.
    pub fn formats_set(&self) -> Vec<(Resolution, FourCc)> {
        self.with(|s| s.formats_set.clone())
    }

    pub fn is_streaming(&self) -> bool {
        self.with(|s| s.streaming)
    }

    fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock().expect("lock poisoned"))
    }

    fn record(&self, call: impl Into<String>) {
        self.with(|s| s.calls.push(call.into()));
    }

    fn enumerate<T: Clone>(
        &self,
        what: &str,
        entries: &[T],
        out: &mut Vec<T>,
    ) -> Result<(), CaptureError> {
        let limit = self.with(|s| s.enumeration_limit);
        for (i, entry) in entries.iter().enumerate() {
            if limit.is_some_and(|l| i >= l) {
                return Err(unavailable(what));
            }
            out.push(entry.clone());
        }
        Ok(())
    }
}

fn unavailable(what: &str) -> CaptureError {
    CaptureError::Io(io::Error::new(io::ErrorKind::Other, format!("mock: {what}")))
}

impl CaptureDriver for MockCaptureDriver {
    fn open(&mut self, path: &str) -> Result<(), CaptureError> {
        self.record(format!("open({path})"));
        self.with(|s| {
            if s.fail_open {
                return Err(CaptureError::Open {
                    path: path.to_string(),
                    source: io::Error::new(io::ErrorKind::NotFound, "mock: no such device"),
                });
            }
            s.open = true;
            Ok(())
        })
    }

    fn close(&mut self) {
        self.record("close");
        self.with(|s| s.open = false);
    }

    fn is_open(&self) -> bool {
        self.with(|s| s.open)
    }

    fn enum_formats(&self, out: &mut Vec<FormatDescription>) -> Result<(), CaptureError> {
        let formats = [
            FormatDescription {
                fourcc: FourCc::YUYV,
                description: "YUYV 4:2:2".to_string(),
            },
            FormatDescription {
                fourcc: FourCc::MJPG,
                description: "Motion-JPEG".to_string(),
            },
        ];
        self.enumerate("enum formats", &formats, out)
    }

    fn enum_resolutions(
        &self,
        _fourcc: FourCc,
        out: &mut Vec<Resolution>,
    ) -> Result<(), CaptureError> {
        let sizes = [Resolution::new(640, 480), Resolution::new(1280, 720)];
        self.enumerate("enum frame sizes", &sizes, out)
    }

    fn enum_frame_rates(
        &self,
        _fourcc: FourCc,
        _resolution: Resolution,
        out: &mut Vec<u32>,
    ) -> Result<(), CaptureError> {
        self.enumerate("enum frame intervals", &[30, 15], out)
    }

    fn set_format(
        &mut self,
        resolution: Resolution,
        fourcc: FourCc,
    ) -> Result<Resolution, CaptureError> {
        self.record(format!("set_format({resolution} {fourcc})"));
        self.with(|s| {
            if s.fail_set_format {
                return Err(CaptureError::Negotiation("mock: format rejected".to_string()));
            }
            s.formats_set.push((resolution, fourcc));
            s.resolution = s.forced_resolution.unwrap_or(resolution);
            Ok(s.resolution)
        })
    }

    fn set_frame_rate(&mut self, fps: u32) -> Result<(), CaptureError> {
        self.record(format!("set_frame_rate({fps})"));
        Ok(())
    }

    fn request_buffers(&mut self, count: u32) -> Result<u32, CaptureError> {
        self.record(format!("request_buffers({count})"));
        self.with(|s| {
            s.buffer_count = count;
            s.queued.clear();
        });
        Ok(count)
    }

    fn map_buffer(&mut self, index: u32) -> Result<Box<dyn FrameMemory>, CaptureError> {
        self.record(format!("map({index})"));
        let (resolution, count) = self.with(|s| (s.resolution, s.buffer_count));
        if index >= count {
            return Err(CaptureError::Buffer(format!("mock: no buffer {index}")));
        }
        let luma = 16 + (index as u8).wrapping_mul(40);
        let data = [luma, 128]
            .repeat(resolution.pixels() as usize);
        Ok(Box::new(MockMemory {
            data,
            state: Arc::clone(&self.state),
        }))
    }

    fn queue_buffer(&mut self, index: u32) -> Result<(), CaptureError> {
        self.with(|s| {
            if index >= s.buffer_count {
                return Err(CaptureError::Buffer(format!("mock: no buffer {index}")));
            }
            if s.fail_queue {
                return Err(unavailable("queue buffer"));
            }
            s.queued.push_back(index);
            Ok(())
        })
    }

    fn dequeue_buffer(&mut self) -> Result<(u32, usize), CaptureError> {
        self.with(|s| {
            if s.fail_dequeue || !s.streaming {
                return Err(unavailable("dequeue"));
            }
            let index = s.queued.pop_front().ok_or_else(|| unavailable("no queued buffer"))?;
            Ok((index, s.resolution.pixels() as usize * 2))
        })
    }

    fn stream_on(&mut self) -> Result<(), CaptureError> {
        self.record("stream_on");
        self.with(|s| s.streaming = true);
        Ok(())
    }

    fn stream_off(&mut self) -> Result<(), CaptureError> {
        self.record("stream_off");
        self.with(|s| s.streaming = false);
        Ok(())
    }
}
