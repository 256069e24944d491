//! CaptureDevice: lifecycle and zero-copy buffer exchange for one capture
//! node.
//!
//! # Buffer protocol
//!
//! ```text
//! start_capturing ─▶ all slots queued (Kernel)
//! dequeue()        ─▶ BufferHandle, slot owned by Application
//! frame()/convert_frame(&handle)   read the mapped memory in place
//! enqueue(handle)  ─▶ slot back to Kernel
//! ```
//!
//! Every handle returned by [`CaptureDevice::dequeue`] must be passed to
//! [`CaptureDevice::enqueue`] exactly once; [`CaptureDevice::outstanding`]
//! reports how many are still held. A slot the driver refused to take back
//! stays with the device and is queued again before the next dequeue.

use std::thread;
use std::time::Duration;

use image::RgbImage;
use tracing::{debug, info, warn};

use super::convert::{decode_mjpeg, yuyv_to_rgb};
use super::format::{FormatDescription, FourCc, PixelFormat, Resolution};
use super::pool::{BufferHandle, BufferPool};
use super::{CaptureDriver, CaptureError, BUFFER_COUNT};

/// Settle time between stopping the stream and releasing the device.
const CLOSE_SETTLE: Duration = Duration::from_millis(20);

/// A capture node driven through `D`.
pub struct CaptureDevice<D: CaptureDriver> {
    driver: D,
    path: Option<String>,
    pool: BufferPool,
    /// Slots whose requeue failed, retried before the next dequeue.
    requeue: Vec<u32>,
    capturing: bool,
    resolution: Resolution,
    fourcc: FourCc,
    fps: u32,
    rgb_scratch: Vec<u8>,
}

impl<D: CaptureDriver> CaptureDevice<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            path: None,
            pool: BufferPool::new(),
            requeue: Vec::new(),
            capturing: false,
            resolution: Resolution::default(),
            fourcc: FourCc::YUYV,
            fps: 0,
            rgb_scratch: Vec::new(),
        }
    }

    /// Opens `path`, closing any previously open node first.
    ///
    /// # Errors
    ///
    /// Returns the driver's error if the node cannot be opened.
    pub fn open(&mut self, path: &str) -> Result<(), CaptureError> {
        self.close();
        self.driver.open(path)?;
        self.path = Some(path.to_string());
        info!("opened capture device {path}");
        Ok(())
    }

    /// Stops capturing and releases the node. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.stop_capturing();
        if self.driver.is_open() {
            thread::sleep(CLOSE_SETTLE);
            self.driver.close();
            if let Some(path) = self.path.take() {
                info!("closed capture device {path}");
            }
        }
        self.path = None;
    }

    pub fn is_open(&self) -> bool {
        self.driver.is_open()
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Negotiated frame size; valid while capturing.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }

    pub fn format(&self) -> FourCc {
        self.fourcc
    }

    pub fn frame_rate(&self) -> u32 {
        self.fps
    }

    /// Number of mapped buffers.
    pub fn buffer_count(&self) -> usize {
        self.pool.len()
    }

    /// Number of dequeued buffers not yet returned.
    pub fn outstanding(&self) -> usize {
        self.pool.outstanding()
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    // ── Enumeration ───────────────────────────────────────────────────────────

    /// Formats the node offers. A failed query ends the list; entries read
    /// before it are kept.
    pub fn enumerate_formats(&self) -> Vec<FormatDescription> {
        let mut formats = Vec::new();
        if let Err(e) = self.driver.enum_formats(&mut formats) {
            debug!("format enumeration ended after {} entries: {e}", formats.len());
        }
        formats
    }

    /// Discrete frame sizes for `fourcc`. A failed query ends the list.
    pub fn enumerate_resolutions(&self, fourcc: FourCc) -> Vec<Resolution> {
        let mut sizes = Vec::new();
        if let Err(e) = self.driver.enum_resolutions(fourcc, &mut sizes) {
            debug!(
                "resolution enumeration for {fourcc} ended after {} entries: {e}",
                sizes.len()
            );
        }
        sizes
    }

    /// Discrete frame rates for `fourcc` at `resolution`. A failed query ends
    /// the list.
    pub fn enumerate_frame_rates(&self, fourcc: FourCc, resolution: Resolution) -> Vec<u32> {
        let mut rates = Vec::new();
        if let Err(e) = self.driver.enum_frame_rates(fourcc, resolution, &mut rates) {
            debug!(
                "frame rate enumeration for {fourcc} {resolution} ended after {} entries: {e}",
                rates.len()
            );
        }
        rates
    }

    // ── Streaming ─────────────────────────────────────────────────────────────

    /// Negotiates the format, maps and queues the buffer pool, and starts the
    /// stream. Any running capture is stopped first.
    ///
    /// The driver may adjust the requested size; read [`resolution`](Self::resolution)
    /// afterwards for the size actually delivered.
    ///
    /// # Errors
    ///
    /// Any failed step stops the attempt and releases whatever was set up.
    pub fn start_capturing(
        &mut self,
        width: u32,
        height: u32,
        fourcc: FourCc,
        fps: u32,
    ) -> Result<(), CaptureError> {
        if !self.driver.is_open() {
            return Err(CaptureError::NotOpen);
        }
        self.stop_capturing();

        let negotiated = self.driver.set_format(Resolution::new(width, height), fourcc)?;
        if negotiated != Resolution::new(width, height) {
            info!("driver adjusted {width}x{height} to {negotiated}");
        }
        if let Err(e) = self.driver.set_frame_rate(fps) {
            warn!("could not set {fps} fps, keeping driver default: {e}");
        }

        if let Err(e) = self.setup_buffers() {
            self.release_buffers();
            return Err(e);
        }

        self.resolution = negotiated;
        self.fourcc = fourcc;
        self.fps = fps;
        if PixelFormat::from_fourcc(fourcc) == Some(PixelFormat::Yuyv) {
            self.rgb_scratch
                .resize(negotiated.pixels() as usize * 3, 0);
        }
        self.capturing = true;
        info!(
            "capture started: {negotiated} {fourcc} @ {fps} fps, {} buffers",
            self.pool.len()
        );
        Ok(())
    }

    /// Stops the stream, unmaps every buffer and releases the driver's
    /// allocation, in that order. No-op when not capturing.
    pub fn stop_capturing(&mut self) {
        if !self.capturing {
            return;
        }
        if let Err(e) = self.driver.stream_off() {
            warn!("stream off failed: {e}");
        }
        let outstanding = self.pool.outstanding();
        if outstanding > 0 {
            warn!("stopping capture with {outstanding} buffers still dequeued");
        }
        self.release_buffers();
        self.capturing = false;
        info!("capture stopped");
    }

    /// Waits for the next filled buffer.
    ///
    /// Returns `None` when not capturing or on a transient driver failure.
    pub fn dequeue(&mut self) -> Option<BufferHandle> {
        if !self.capturing {
            return None;
        }
        self.retry_requeue();
        let (index, bytes_used) = match self.driver.dequeue_buffer() {
            Ok(v) => v,
            Err(e) => {
                debug!("dequeue failed: {e}");
                return None;
            }
        };
        if let Err(e) = self.pool.mark_dequeued(index) {
            warn!("driver returned buffer {index} out of turn: {e}");
            return None;
        }
        Some(BufferHandle::new(index, bytes_used, self.pool.generation()))
    }

    /// Returns a dequeued buffer to the driver.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::StaleHandle`] if capture was restarted since
    /// the buffer was dequeued, or the driver's error if queueing fails. A
    /// slot the driver refused is kept and queued again before the next
    /// [`dequeue`](Self::dequeue), so the handle is still consumed.
    pub fn enqueue(&mut self, handle: BufferHandle) -> Result<(), CaptureError> {
        if handle.generation() != self.pool.generation() {
            return Err(CaptureError::StaleHandle);
        }
        let index = handle.index();
        self.pool.check_dequeued(index)?;
        if let Err(e) = self.driver.queue_buffer(index) {
            warn!("requeue of buffer {index} failed, will retry: {e}");
            self.requeue.push(index);
            return Err(e);
        }
        self.pool.mark_queued(index)
    }

    fn retry_requeue(&mut self) {
        while let Some(&index) = self.requeue.last() {
            if let Err(e) = self.driver.queue_buffer(index) {
                debug!("buffer {index} still not queueable: {e}");
                return;
            }
            self.requeue.pop();
            if let Err(e) = self.pool.mark_queued(index) {
                warn!("requeued buffer {index} was not held: {e}");
            }
        }
    }

    /// The raw bytes of a dequeued buffer, read in place.
    pub fn frame(&self, handle: &BufferHandle) -> Result<&[u8], CaptureError> {
        self.pool.data(handle)
    }

    /// Converts a dequeued buffer to an owned RGB image.
    ///
    /// YUYV frames go through an internal scratch buffer which the returned
    /// image never aliases.
    pub fn convert_frame(&mut self, handle: &BufferHandle) -> Result<RgbImage, CaptureError> {
        let data = self.pool.data(handle)?;
        let Resolution { width, height } = self.resolution;

        match PixelFormat::from_fourcc(self.fourcc) {
            Some(PixelFormat::Yuyv) => {
                yuyv_to_rgb(data, width, height, &mut self.rgb_scratch)?;
                RgbImage::from_raw(width, height, self.rgb_scratch.clone()).ok_or(
                    CaptureError::ShortFrame {
                        expected: width as usize * height as usize * 3,
                        actual: self.rgb_scratch.len(),
                    },
                )
            }
            Some(PixelFormat::Mjpeg) => decode_mjpeg(data),
            None => Err(CaptureError::UnsupportedFormat(self.fourcc)),
        }
    }

    /// Dequeues, converts and re-enqueues one frame.
    ///
    /// Returns `Ok(None)` if no frame was available.
    pub fn capture_frame(&mut self) -> Result<Option<RgbImage>, CaptureError> {
        let Some(handle) = self.dequeue() else {
            return Ok(None);
        };
        let converted = self.convert_frame(&handle);
        self.enqueue(handle)?;
        converted.map(Some)
    }

    fn setup_buffers(&mut self) -> Result<(), CaptureError> {
        let granted = self.driver.request_buffers(BUFFER_COUNT)?;
        if granted == 0 {
            return Err(CaptureError::NoBuffers);
        }
        for index in 0..granted {
            let memory = self.driver.map_buffer(index)?;
            self.pool.push(memory);
            self.driver.queue_buffer(index)?;
        }
        self.driver.stream_on()
    }

    fn release_buffers(&mut self) {
        self.requeue.clear();
        self.pool.clear();
        if let Err(e) = self.driver.request_buffers(0) {
            debug!("releasing driver buffers failed: {e}");
        }
    }
}

impl<D: CaptureDriver> Drop for CaptureDevice<D> {
    fn drop(&mut self) {
        self.close();
    }
}
