//! Fake encoder backend for tests.
//!
//! Every factory clone shares one log, so a test can inspect what the
//! orchestrator built after handing the factory over.

use std::sync::{Arc, Mutex};

use super::{EncoderError, EncoderFactory, EncoderSettings, FrameEncoder, H264Backend, I420Frame};

/// One frame handed to a fake backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub pts: u64,
    pub intra: bool,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug)]
struct FakeState {
    created: Vec<EncoderSettings>,
    submissions: Vec<Submission>,
    packets_per_frame: usize,
    fail_create: bool,
}

/// [`EncoderFactory`] producing in-memory backends.
#[derive(Debug, Clone)]
pub struct FakeEncoderFactory {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeEncoderFactory {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                created: Vec::new(),
                submissions: Vec::new(),
                packets_per_frame: 1,
                fail_create: false,
            })),
        }
    }
}

impl FakeEncoderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_packets_per_frame(&self, count: usize) {
        self.with(|s| s.packets_per_frame = count);
    }

    pub fn fail_create(&self, fail: bool) {
        self.with(|s| s.fail_create = fail);
    }

    /// Settings of every encoder built so far, oldest first.
    pub fn created(&self) -> Vec<EncoderSettings> {
        self.with(|s| s.created.clone())
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.with(|s| s.submissions.clone())
    }

    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().expect("lock poisoned"))
    }
}

impl EncoderFactory for FakeEncoderFactory {
    fn create(&self, settings: EncoderSettings) -> Result<FrameEncoder, EncoderError> {
        if self.with(|s| s.fail_create) {
            return Err(EncoderError::Backend("fake: create failed".to_string()));
        }
        let encoder = FrameEncoder::new(
            settings,
            Box::new(FakeBackend {
                state: Arc::clone(&self.state),
                intra_pending: false,
                pending: 0,
                last_pts: 0,
            }),
        )?;
        self.with(|s| s.created.push(settings));
        Ok(encoder)
    }
}

struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
    intra_pending: bool,
    pending: usize,
    last_pts: u64,
}

impl H264Backend for FakeBackend {
    fn force_intra_frame(&mut self) {
        self.intra_pending = true;
    }

    fn submit(&mut self, frame: &I420Frame, pts: u64) -> Result<(), EncoderError> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.submissions.push(Submission {
            pts,
            intra: std::mem::take(&mut self.intra_pending),
            width: frame.width,
            height: frame.height,
        });
        self.pending = state.packets_per_frame;
        self.last_pts = pts;
        Ok(())
    }

    fn receive_packet(&mut self) -> Option<Vec<u8>> {
        if self.pending == 0 {
            return None;
        }
        self.pending -= 1;
        // Annex-B start code followed by the frame number.
        let mut packet = vec![0, 0, 0, 1];
        packet.extend_from_slice(&self.last_pts.to_be_bytes());
        Some(packet)
    }
}
