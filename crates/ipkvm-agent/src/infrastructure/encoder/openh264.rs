//! OpenH264 software encoder backend.

use std::collections::VecDeque;

use openh264::encoder::{
    BitRate, Complexity, Encoder, EncoderConfig, FrameRate, IntraFramePeriod, UsageType,
};
use openh264::formats::YUVSlices;
use openh264::OpenH264API;
use tracing::info;

use super::{EncoderError, EncoderFactory, EncoderSettings, FrameEncoder, H264Backend, I420Frame};

/// [`H264Backend`] tuned for real-time camera content: low complexity, and
/// an IDR period matching the stream's GOP.
///
/// OpenH264 never buffers frames for reordering, so every submitted frame
/// yields its whole bitstream at once. Frames are read straight from the
/// staging planes without copying.
pub struct OpenH264Backend {
    encoder: Encoder,
    pending: VecDeque<Vec<u8>>,
}

impl OpenH264Backend {
    /// # Errors
    ///
    /// Returns [`EncoderError::Backend`] if the library rejects `settings`.
    pub fn new(settings: &EncoderSettings) -> Result<Self, EncoderError> {
        let config = EncoderConfig::new()
            .bitrate(BitRate::from_bps(settings.bitrate))
            .max_frame_rate(FrameRate::from_hz(settings.fps as f32))
            .usage_type(UsageType::CameraVideoRealTime)
            .complexity(Complexity::Low)
            .intra_frame_period(IntraFramePeriod::from_num_frames(settings.gop));
        let encoder = Encoder::with_api_config(OpenH264API::from_source(), config)
            .map_err(|e| EncoderError::Backend(e.to_string()))?;
        Ok(Self {
            encoder,
            pending: VecDeque::new(),
        })
    }
}

impl H264Backend for OpenH264Backend {
    fn force_intra_frame(&mut self) {
        self.encoder.force_intra_frame();
    }

    fn submit(&mut self, frame: &I420Frame, _pts: u64) -> Result<(), EncoderError> {
        let (width, height) = (frame.width as usize, frame.height as usize);
        let yuv = YUVSlices::new(
            frame.planes(),
            (width, height),
            (width, width / 2, width / 2),
        );
        let bitstream = self
            .encoder
            .encode(&yuv)
            .map_err(|e| EncoderError::Backend(e.to_string()))?;
        let packet = bitstream.to_vec();
        if !packet.is_empty() {
            self.pending.push_back(packet);
        }
        Ok(())
    }

    fn receive_packet(&mut self) -> Option<Vec<u8>> {
        self.pending.pop_front()
    }
}

/// Builds [`FrameEncoder`]s on top of [`OpenH264Backend`].
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenH264Factory;

impl EncoderFactory for OpenH264Factory {
    fn create(&self, settings: EncoderSettings) -> Result<FrameEncoder, EncoderError> {
        super::validate_geometry(settings.resolution)?;
        let backend = OpenH264Backend::new(&settings)?;
        info!(
            "H.264 encoder ready: {} @ {} fps, {} bit/s, gop {}",
            settings.resolution, settings.fps, settings.bitrate, settings.gop
        );
        FrameEncoder::new(settings, Box::new(backend))
    }
}
