//! V4L2 capture driver (Linux).
//!
//! Format negotiation and enumeration use the `v4l` crate's `Capture`
//! interface. Buffer exchange uses raw `VIDIOC_*` requests on the same file
//! descriptor so dequeue and enqueue stay separate operations.

use std::fs;
use std::io;
use std::mem;
use std::os::raw::c_void;
use std::path::PathBuf;
use std::ptr;

use tracing::{debug, warn};
use v4l::buffer::Type as BufferType;
use v4l::capability::Flags;
use v4l::frameinterval::FrameIntervalEnum;
use v4l::framesize::FrameSizeEnum;
use v4l::memory::Memory;
use v4l::v4l2::{self, vidioc};
use v4l::v4l_sys::{v4l2_buffer, v4l2_requestbuffers};
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::format::{DeviceInfo, FormatDescription, FourCc, Resolution};
use super::{CaptureDriver, CaptureError, FrameMemory};

/// Upper bound on waiting for a frame before reporting a transient failure.
const DEQUEUE_POLL_TIMEOUT_MS: i32 = 2000;

/// One `mmap`ed driver buffer.
struct MmapRegion {
    ptr: *mut u8,
    len: usize,
}

// SAFETY: the region is a private shared mapping owned by this value; it is
// only read through `&self` and unmapped once in `drop`.
unsafe impl Send for MmapRegion {}

impl FrameMemory for MmapRegion {
    fn as_slice(&self) -> &[u8] {
        // SAFETY: `ptr` points at `len` mapped bytes until `drop`.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl Drop for MmapRegion {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`len` come from a successful `mmap` and are unmapped once.
        unsafe {
            libc::munmap(self.ptr.cast::<c_void>(), self.len);
        }
    }
}

/// [`CaptureDriver`] for a V4L2 video node.
#[derive(Default)]
pub struct V4l2Driver {
    device: Option<Device>,
}

impl V4l2Driver {
    pub fn new() -> Self {
        Self::default()
    }

    fn device(&self) -> Result<&Device, CaptureError> {
        self.device.as_ref().ok_or(CaptureError::NotOpen)
    }

    fn fd(&self) -> Result<i32, CaptureError> {
        Ok(self.device()?.handle().fd())
    }

    fn empty_buffer(index: u32) -> v4l2_buffer {
        // SAFETY: v4l2_buffer is a plain C struct; all-zero is a valid value.
        let mut buf: v4l2_buffer = unsafe { mem::zeroed() };
        buf.type_ = BufferType::VideoCapture as u32;
        buf.memory = Memory::Mmap as u32;
        buf.index = index;
        buf
    }

    fn stream_request(&self, request: vidioc::_IOC_TYPE) -> Result<(), CaptureError> {
        let fd = self.fd()?;
        let mut typ = BufferType::VideoCapture as u32;
        // SAFETY: STREAMON/STREAMOFF take a pointer to the buffer type.
        unsafe { v4l2::ioctl(fd, request, (&mut typ as *mut u32).cast::<c_void>()) }
            .map_err(|e| CaptureError::Stream(e.to_string()))
    }
}

impl CaptureDriver for V4l2Driver {
    fn open(&mut self, path: &str) -> Result<(), CaptureError> {
        let device = Device::with_path(path).map_err(|source| CaptureError::Open {
            path: path.to_string(),
            source,
        })?;
        self.device = Some(device);
        Ok(())
    }

    fn close(&mut self) {
        self.device = None;
    }

    fn is_open(&self) -> bool {
        self.device.is_some()
    }

    fn enum_formats(&self, out: &mut Vec<FormatDescription>) -> Result<(), CaptureError> {
        let formats = self.device()?.enum_formats()?;
        out.extend(formats.into_iter().map(|d| FormatDescription {
            fourcc: FourCc::new(&d.fourcc.repr),
            description: d.description,
        }));
        Ok(())
    }

    fn enum_resolutions(
        &self,
        fourcc: FourCc,
        out: &mut Vec<Resolution>,
    ) -> Result<(), CaptureError> {
        let sizes = self.device()?.enum_framesizes(FourCC::new(fourcc.bytes()))?;
        out.extend(sizes.into_iter().filter_map(|s| match s.size {
            FrameSizeEnum::Discrete(d) => Some(Resolution::new(d.width, d.height)),
            FrameSizeEnum::Stepwise(_) => None,
        }));
        Ok(())
    }

    fn enum_frame_rates(
        &self,
        fourcc: FourCc,
        resolution: Resolution,
        out: &mut Vec<u32>,
    ) -> Result<(), CaptureError> {
        let intervals = self.device()?.enum_frameintervals(
            FourCC::new(fourcc.bytes()),
            resolution.width,
            resolution.height,
        )?;
        out.extend(intervals.into_iter().filter_map(|i| match i.interval {
            FrameIntervalEnum::Discrete(f) if f.numerator > 0 => Some(f.denominator / f.numerator),
            _ => None,
        }));
        Ok(())
    }

    fn set_format(
        &mut self,
        resolution: Resolution,
        fourcc: FourCc,
    ) -> Result<Resolution, CaptureError> {
        let device = self.device()?;
        let mut format = device
            .format()
            .map_err(|e| CaptureError::Negotiation(e.to_string()))?;
        format.width = resolution.width;
        format.height = resolution.height;
        format.fourcc = FourCC::new(fourcc.bytes());

        let actual = device
            .set_format(&format)
            .map_err(|e| CaptureError::Negotiation(e.to_string()))?;
        if actual.fourcc != format.fourcc {
            return Err(CaptureError::Negotiation(format!(
                "driver substituted {} for {fourcc}",
                actual.fourcc
            )));
        }
        Ok(Resolution::new(actual.width, actual.height))
    }

    fn set_frame_rate(&mut self, fps: u32) -> Result<(), CaptureError> {
        self.device()?
            .set_params(&Parameters::with_fps(fps))
            .map_err(|e| CaptureError::Negotiation(e.to_string()))?;
        Ok(())
    }

    fn request_buffers(&mut self, count: u32) -> Result<u32, CaptureError> {
        let fd = self.fd()?;
        // SAFETY: plain C struct; all-zero is valid.
        let mut req: v4l2_requestbuffers = unsafe { mem::zeroed() };
        req.count = count;
        req.type_ = BufferType::VideoCapture as u32;
        req.memory = Memory::Mmap as u32;
        // SAFETY: REQBUFS takes a pointer to v4l2_requestbuffers.
        unsafe {
            v4l2::ioctl(
                fd,
                vidioc::VIDIOC_REQBUFS,
                (&mut req as *mut v4l2_requestbuffers).cast::<c_void>(),
            )
        }
        .map_err(|e| CaptureError::Buffer(format!("REQBUFS({count}): {e}")))?;
        Ok(req.count)
    }

    fn map_buffer(&mut self, index: u32) -> Result<Box<dyn FrameMemory>, CaptureError> {
        let fd = self.fd()?;
        let mut buf = Self::empty_buffer(index);
        // SAFETY: QUERYBUF takes a pointer to v4l2_buffer.
        unsafe {
            v4l2::ioctl(
                fd,
                vidioc::VIDIOC_QUERYBUF,
                (&mut buf as *mut v4l2_buffer).cast::<c_void>(),
            )
        }
        .map_err(|e| CaptureError::Buffer(format!("QUERYBUF({index}): {e}")))?;

        let len = buf.length as usize;
        // SAFETY: `m.offset` is the active union member for MMAP buffers.
        let offset = unsafe { buf.m.offset };
        // SAFETY: maps the driver-provided region; failure is checked below.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                offset as libc::off_t,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(CaptureError::Buffer(format!(
                "mmap({index}): {}",
                io::Error::last_os_error()
            )));
        }
        Ok(Box::new(MmapRegion {
            ptr: ptr.cast::<u8>(),
            len,
        }))
    }

    fn queue_buffer(&mut self, index: u32) -> Result<(), CaptureError> {
        let fd = self.fd()?;
        let mut buf = Self::empty_buffer(index);
        // SAFETY: QBUF takes a pointer to v4l2_buffer.
        unsafe {
            v4l2::ioctl(
                fd,
                vidioc::VIDIOC_QBUF,
                (&mut buf as *mut v4l2_buffer).cast::<c_void>(),
            )
        }
        .map_err(|e| CaptureError::Buffer(format!("QBUF({index}): {e}")))
    }

    fn dequeue_buffer(&mut self) -> Result<(u32, usize), CaptureError> {
        let fd = self.fd()?;

        // The node is opened non-blocking; wait for a frame first.
        let mut pollfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        // SAFETY: one valid pollfd.
        let ready = unsafe { libc::poll(&mut pollfd, 1, DEQUEUE_POLL_TIMEOUT_MS) };
        if ready < 0 {
            return Err(io::Error::last_os_error().into());
        }
        if ready == 0 {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no frame within poll timeout").into());
        }

        let mut buf = Self::empty_buffer(0);
        // SAFETY: DQBUF takes a pointer to v4l2_buffer.
        unsafe {
            v4l2::ioctl(
                fd,
                vidioc::VIDIOC_DQBUF,
                (&mut buf as *mut v4l2_buffer).cast::<c_void>(),
            )
        }?;
        Ok((buf.index, buf.bytesused as usize))
    }

    fn stream_on(&mut self) -> Result<(), CaptureError> {
        self.stream_request(vidioc::VIDIOC_STREAMON)
    }

    fn stream_off(&mut self) -> Result<(), CaptureError> {
        self.stream_request(vidioc::VIDIOC_STREAMOFF)
    }
}

/// Lists `/dev/video*` nodes that support streaming capture.
///
/// Nodes whose name contains `-` are skipped; those are codec or metadata
/// nodes on most boards.
pub fn list_devices() -> Vec<DeviceInfo> {
    let entries = match fs::read_dir("/dev") {
        Ok(entries) => entries,
        Err(e) => {
            warn!("cannot scan /dev: {e}");
            return Vec::new();
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.starts_with("video") && !name.contains('-')
        })
        .map(|entry| entry.path())
        .collect();
    paths.sort();

    paths
        .into_iter()
        .filter_map(|path| {
            let device = match Device::with_path(&path) {
                Ok(device) => device,
                Err(e) => {
                    debug!("skipping {}: {e}", path.display());
                    return None;
                }
            };
            let caps = device.query_caps().ok()?;
            if !caps
                .capabilities
                .contains(Flags::VIDEO_CAPTURE | Flags::STREAMING)
            {
                debug!("skipping {}: not a streaming capture node", path.display());
                return None;
            }
            Some(DeviceInfo {
                path,
                card: caps.card,
                driver: caps.driver,
            })
        })
        .collect()
}
