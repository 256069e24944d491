//! HardwareOrchestrator: the single worker that owns every piece of hardware.
//!
//! # Ownership
//!
//! One dedicated thread owns the capture device, the H.264 encoder, the
//! stream server and the HID driver. Nothing else ever touches them, so none
//! of them needs a lock. Other threads only talk to the worker through a
//! small shared state (desired [`HardwareConfig`], two dirty flags, `paused`,
//! `aborting`) guarded by a mutex and a condition variable.
//!
//! # Reconciliation
//!
//! Setters merge into the desired configuration and raise a dirty flag. At
//! the top of each iteration the worker snapshots and clears the flags under
//! the lock, then releases it before doing any hardware work:
//!
//! - **capture dirty**: restart capture with the new parameters. On failure
//!   the worker pauses. On success the network side is reconciled too,
//!   because the encoder geometry follows the negotiated capture size.
//! - **network dirty**: drop the encoder unconditionally; then either make
//!   sure a server listens on the configured port and build a fresh encoder
//!   for the current capture geometry, or drop the server.
//!
//! Encoder and server are always rebuilt wholesale, never patched.
//!
//! # Loop
//!
//! ```text
//! ┌─▶ wait while paused and clean (10 ms ticks) ── aborting? ──▶ exit
//! │   reconcile dirty state
//! │   inbound viewer messages ──▶ CommandQueue
//! │   long-press poll          ──▶ CommandQueue
//! │   CommandQueue ──drain──▶ HidDriver
//! │   dequeue ─▶ preview sink
//! │           └▶ encoder ─▶ broadcast (only with viewers)
//! └── enqueue
//! ```
//!
//! While paused the worker still wakes every [`IDLE_TICK`] so queued HID
//! commands and the long-press timer keep being serviced.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use image::RgbImage;
use ipkvm_core::protocol::control::parse_commands;
use ipkvm_core::Size;
use tracing::{debug, error, info, trace, warn};

use crate::application::command_queue::CommandQueue;
use crate::application::hid_translator::HidTranslator;
use crate::infrastructure::capture::{
    CaptureDevice, CaptureDriver, FourCc, PixelFormat, Resolution,
};
use crate::infrastructure::encoder::{EncoderFactory, EncoderSettings, FrameEncoder};
use crate::infrastructure::hid::HidDriver;
use crate::infrastructure::network::{ServerFactory, StreamServer};

/// Worker sleep when there is nothing to capture, and the paused wait slice.
pub const IDLE_TICK: Duration = Duration::from_millis(10);

// ── Configuration ─────────────────────────────────────────────────────────────

/// Desired hardware configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareConfig {
    pub width: u32,
    pub height: u32,
    pub fourcc: FourCc,
    pub fps: u32,
    pub network_enabled: bool,
    pub network_port: u16,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fourcc: FourCc::YUYV,
            fps: 30,
            network_enabled: false,
            network_port: 8080,
        }
    }
}

/// Receives every captured frame, converted to RGB.
pub trait FrameSink: Send + Sync {
    fn deliver(&self, frame: RgbImage);
}

impl<F> FrameSink for F
where
    F: Fn(RgbImage) + Send + Sync,
{
    fn deliver(&self, frame: RgbImage) {
        self(frame)
    }
}

/// Everything the worker takes ownership of.
pub struct OrchestratorParts<D: CaptureDriver> {
    /// An opened (not yet capturing) device.
    pub capture: CaptureDevice<D>,
    pub hid: Box<dyn HidDriver>,
    /// Drained into `hid` every tick; viewer messages are pushed here too.
    pub queue: CommandQueue,
    /// Polled for long presses when present.
    pub translator: Option<Arc<HidTranslator>>,
    pub frame_sink: Option<Arc<dyn FrameSink>>,
    pub encoders: Box<dyn EncoderFactory>,
    pub servers: Box<dyn ServerFactory>,
}

// ── Shared state ──────────────────────────────────────────────────────────────

#[derive(Debug)]
struct ControlState {
    aborting: bool,
    paused: bool,
    config: HardwareConfig,
    capture_dirty: bool,
    network_dirty: bool,
}

impl ControlState {
    fn is_dirty(&self) -> bool {
        self.capture_dirty || self.network_dirty
    }

    /// Snapshots pending work and clears the flags.
    fn take_sync(&mut self) -> Option<SyncRequest> {
        if !self.is_dirty() {
            return None;
        }
        let request = SyncRequest {
            config: self.config,
            capture: self.capture_dirty,
            network: self.network_dirty,
        };
        self.capture_dirty = false;
        self.network_dirty = false;
        Some(request)
    }
}

#[derive(Debug, Clone, Copy)]
struct SyncRequest {
    config: HardwareConfig,
    capture: bool,
    network: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<ControlState>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, f: impl FnOnce(&mut ControlState)) {
        f(&mut self.lock());
        self.wake.notify_all();
    }
}

// ── Public handle ─────────────────────────────────────────────────────────────

/// Handle to the hardware worker. All methods may be called from any thread.
///
/// Dropping the handle shuts the worker down and waits for it.
pub struct HardwareOrchestrator {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl HardwareOrchestrator {
    /// Spawns the worker. It starts paused with `config` as the desired
    /// state; nothing touches the hardware until a setter raises a flag.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn<D>(parts: OrchestratorParts<D>, config: HardwareConfig) -> std::io::Result<Self>
    where
        D: CaptureDriver + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(ControlState {
                aborting: false,
                paused: true,
                config,
                capture_dirty: false,
                network_dirty: false,
            }),
            wake: Condvar::new(),
        });

        // Encoder and server are built on the worker and never leave it.
        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("ipkvm-hardware".to_string())
            .spawn(move || Worker::new(worker_shared, parts).run())?;

        Ok(Self {
            shared,
            worker: Some(handle),
        })
    }

    /// Resumes frame processing.
    pub fn start(&self) {
        self.shared.update(|s| s.paused = false);
    }

    /// Suspends frame processing. HID commands are still delivered.
    pub fn stop(&self) {
        self.shared.update(|s| s.paused = true);
    }

    /// Requests a capture restart with new parameters and unpauses.
    pub fn reconfigure_capture(&self, width: u32, height: u32, fourcc: FourCc, fps: u32) {
        self.shared.update(|s| {
            s.config.width = width;
            s.config.height = height;
            s.config.fourcc = fourcc;
            s.config.fps = fps;
            s.capture_dirty = true;
            s.paused = false;
        });
    }

    /// Requests a stream server on `port` plus an encoder for viewers.
    pub fn enable_network(&self, port: u16) {
        self.shared.update(|s| {
            s.config.network_enabled = true;
            s.config.network_port = port;
            s.network_dirty = true;
        });
    }

    /// Requests teardown of the stream server and encoder.
    pub fn disable_network(&self) {
        self.shared.update(|s| {
            s.config.network_enabled = false;
            s.network_dirty = true;
        });
    }

    pub fn is_paused(&self) -> bool {
        self.shared.lock().paused
    }

    /// The desired configuration (not necessarily applied yet).
    pub fn config(&self) -> HardwareConfig {
        self.shared.lock().config
    }

    /// Stops the worker and waits for it to release the hardware.
    ///
    /// Idempotent.
    pub fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.shared.update(|s| {
            s.aborting = true;
            s.paused = false;
        });
        if worker.join().is_err() {
            error!("hardware worker panicked");
        }
    }
}

impl Drop for HardwareOrchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

struct Worker<D: CaptureDriver> {
    shared: Arc<Shared>,
    capture: CaptureDevice<D>,
    hid: Box<dyn HidDriver>,
    queue: CommandQueue,
    translator: Option<Arc<HidTranslator>>,
    frame_sink: Option<Arc<dyn FrameSink>>,
    encoders: Box<dyn EncoderFactory>,
    servers: Box<dyn ServerFactory>,
    encoder: Option<FrameEncoder>,
    /// Requested port and the server bound for it.
    server: Option<(u16, Box<dyn StreamServer>)>,
}

impl<D: CaptureDriver> Worker<D> {
    fn new(shared: Arc<Shared>, parts: OrchestratorParts<D>) -> Self {
        Self {
            shared,
            capture: parts.capture,
            hid: parts.hid,
            queue: parts.queue,
            translator: parts.translator,
            frame_sink: parts.frame_sink,
            encoders: parts.encoders,
            servers: parts.servers,
            encoder: None,
            server: None,
        }
    }

    fn run(mut self) {
        info!("hardware worker started");
        loop {
            let (paused, sync) = {
                let mut state = self.shared.lock();
                if state.aborting {
                    break;
                }
                if state.paused && !state.is_dirty() {
                    state = self
                        .shared
                        .wake
                        .wait_timeout(state, IDLE_TICK)
                        .map(|(guard, _)| guard)
                        .unwrap_or_else(|poisoned| poisoned.into_inner().0);
                    if state.aborting {
                        break;
                    }
                }
                let sync = state.take_sync();
                (state.paused, sync)
            };

            let paused = match sync {
                Some(request) => !self.reconcile(request) || paused,
                None => paused,
            };

            self.pump_inbound_messages();
            if let Some(translator) = &self.translator {
                translator.poll_long_press(Instant::now());
            }
            self.drain_hid();

            if paused {
                continue;
            }
            if self.capture.is_capturing() {
                self.pump_frame();
            } else {
                thread::sleep(IDLE_TICK);
            }
        }

        // Tear down in dependency order before the device closes on drop.
        self.encoder = None;
        self.server = None;
        self.capture.stop_capturing();
        info!("hardware worker stopped");
    }

    /// Applies one snapshot of dirty state. Returns `false` if capture
    /// failed to start and the worker paused itself.
    fn reconcile(&mut self, request: SyncRequest) -> bool {
        let mut network = request.network;
        let config = request.config;

        if request.capture {
            // The encoder is bound to the old geometry either way.
            self.encoder = None;
            if let Err(e) =
                self.capture
                    .start_capturing(config.width, config.height, config.fourcc, config.fps)
            {
                warn!(
                    "capture start failed for {}x{} {} @ {} fps, pausing: {e}",
                    config.width, config.height, config.fourcc, config.fps
                );
                self.shared.update(|s| {
                    s.paused = true;
                    // Keep a pending network change for the next pass.
                    s.network_dirty |= network;
                });
                return false;
            }
            self.publish_source_size();
            network = true;
        }

        if network {
            self.reconcile_network(&config);
        }
        true
    }

    fn reconcile_network(&mut self, config: &HardwareConfig) {
        self.encoder = None;

        if !config.network_enabled {
            if self.server.take().is_some() {
                info!("network streaming disabled");
            }
            return;
        }

        let port = config.network_port;
        if !matches!(&self.server, Some((bound, _)) if *bound == port) {
            // Release the old port before binding the new one.
            self.server = None;
            match self.servers.bind(port) {
                Ok(server) => self.server = Some((port, server)),
                Err(e) => {
                    warn!("network streaming unavailable: {e}");
                    return;
                }
            }
        }

        if !self.capture.is_capturing() {
            debug!("not capturing, encoder deferred");
            return;
        }
        if PixelFormat::from_fourcc(self.capture.format()) != Some(PixelFormat::Yuyv) {
            info!(
                "no encoder for {} capture, video streaming disabled",
                self.capture.format()
            );
            return;
        }

        let settings = EncoderSettings::for_capture(self.capture.resolution(), self.capture.frame_rate());
        match self.encoders.create(settings) {
            Ok(encoder) => self.encoder = Some(encoder),
            Err(e) => warn!("encoder unavailable, video streaming disabled: {e}"),
        }
    }

    /// Tells the translator what size the driver actually delivers.
    fn publish_source_size(&self) {
        let Some(translator) = &self.translator else {
            return;
        };
        let Resolution { width, height } = self.capture.resolution();
        let to_i32 = |v: u32| i32::try_from(v).unwrap_or(i32::MAX);
        translator.set_source_size(Size::new(to_i32(width), to_i32(height)));
    }

    fn pump_inbound_messages(&mut self) {
        let Some((_, server)) = self.server.as_mut() else {
            return;
        };
        for message in server.drain_messages() {
            let commands = parse_commands(&message);
            if commands.is_empty() {
                debug!("dropped {}-byte control message", message.len());
                continue;
            }
            if self.queue.push_all(commands).is_err() {
                // The queue already logged the drop.
                break;
            }
        }
    }

    fn drain_hid(&mut self) {
        for cmd in self.queue.drain() {
            if let Err(e) = self.hid.dispatch(&cmd) {
                warn!("HID write failed: {e}");
            }
        }
    }

    fn pump_frame(&mut self) {
        let Some(handle) = self.capture.dequeue() else {
            thread::sleep(IDLE_TICK);
            return;
        };

        if let Some(sink) = &self.frame_sink {
            match self.capture.convert_frame(&handle) {
                Ok(image) => sink.deliver(image),
                Err(e) => debug!("frame conversion failed: {e}"),
            }
        }

        if let (Some(encoder), Some((_, server))) = (self.encoder.as_mut(), self.server.as_ref()) {
            if server.client_count() > 0 {
                match self.capture.frame(&handle) {
                    Ok(data) => match encoder.encode(data, |packet| server.broadcast(packet)) {
                        Ok(packets) => trace!("broadcast {packets} packets"),
                        Err(e) => warn!("encode failed: {e}"),
                    },
                    Err(e) => warn!("cannot read buffer {}: {e}", handle.index()),
                }
            }
        }

        let index = handle.index();
        if let Err(e) = self.capture.enqueue(handle) {
            warn!("failed to return buffer {index}: {e}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::capture::mock::MockCaptureDriver;
    use crate::infrastructure::encoder::mock::FakeEncoderFactory;
    use crate::infrastructure::hid::mock::RecordingHidDriver;
    use crate::infrastructure::network::mock::FakeServerFactory;
    use ipkvm_core::{HidCommand, HidCommandKind, ModifierMask, MouseButtons};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Rig {
        orchestrator: HardwareOrchestrator,
        driver: MockCaptureDriver,
        hid: RecordingHidDriver,
        queue: CommandQueue,
        encoders: FakeEncoderFactory,
        servers: FakeServerFactory,
        frames: Arc<AtomicUsize>,
    }

    fn rig_with(driver: MockCaptureDriver) -> Rig {
        let mut capture = CaptureDevice::new(driver.clone());
        capture.open("/dev/video0").unwrap();
        let hid = RecordingHidDriver::new();
        let queue = CommandQueue::new();
        let encoders = FakeEncoderFactory::new();
        let servers = FakeServerFactory::new();
        let frames = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&frames);

        let parts = OrchestratorParts {
            capture,
            hid: Box::new(hid.clone()),
            queue: queue.clone(),
            translator: None,
            frame_sink: Some(Arc::new(move |_frame: RgbImage| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
            encoders: Box::new(encoders.clone()),
            servers: Box::new(servers.clone()),
        };
        let orchestrator = HardwareOrchestrator::spawn(parts, HardwareConfig::default()).unwrap();
        Rig {
            orchestrator,
            driver,
            hid,
            queue,
            encoders,
            servers,
            frames,
        }
    }

    fn rig() -> Rig {
        rig_with(MockCaptureDriver::new())
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn test_starts_paused_with_default_config() {
        let rig = rig();
        assert!(rig.orchestrator.is_paused());
        assert_eq!(rig.orchestrator.config(), HardwareConfig::default());
        assert!(!rig.driver.is_streaming());
    }

    #[test]
    fn test_start_and_stop_toggle_paused() {
        // Arrange
        let rig = rig();

        // Act / Assert
        rig.orchestrator.start();
        assert!(!rig.orchestrator.is_paused());
        rig.orchestrator.stop();
        assert!(rig.orchestrator.is_paused());
    }

    #[test]
    fn test_reconfigure_capture_unpauses_and_streams_frames() {
        // Arrange
        let rig = rig();

        // Act
        rig.orchestrator
            .reconfigure_capture(320, 240, FourCc::YUYV, 30);

        // Assert
        assert!(!rig.orchestrator.is_paused());
        assert!(wait_until(|| rig.frames.load(Ordering::SeqCst) >= 3));
        assert!(rig.driver.is_streaming());
        assert!(rig.encoders.created().is_empty(), "network is off");
    }

    #[test]
    fn test_failed_capture_start_pauses_worker() {
        // Arrange
        let driver = MockCaptureDriver::new();
        driver.fail_set_format(true);
        let rig = rig_with(driver);

        // Act
        rig.orchestrator
            .reconfigure_capture(640, 480, FourCc::YUYV, 30);

        // Assert
        assert!(wait_until(|| rig.orchestrator.is_paused()));
        assert!(!rig.driver.is_streaming());
    }

    #[test]
    fn test_network_change_survives_failed_capture_start() {
        // Arrange
        let driver = MockCaptureDriver::new();
        driver.fail_set_format(true);
        let rig = rig_with(driver);

        // Act
        rig.orchestrator.enable_network(9000);
        rig.orchestrator
            .reconfigure_capture(640, 480, FourCc::YUYV, 30);

        // Assert: server still comes up, no encoder without capture
        assert!(wait_until(|| rig.servers.bound_ports() == vec![9000]));
        assert!(rig.encoders.created().is_empty());
    }

    #[test]
    fn test_encoder_uses_negotiated_geometry() {
        // Arrange: the driver only does 320x240
        let driver = MockCaptureDriver::new();
        driver.force_resolution(Resolution::new(320, 240));
        let rig = rig_with(driver);

        // Act
        rig.orchestrator.enable_network(8080);
        rig.orchestrator
            .reconfigure_capture(640, 480, FourCc::YUYV, 30);

        // Assert
        assert!(wait_until(|| !rig.encoders.created().is_empty()));
        let settings = rig.encoders.created()[0];
        assert_eq!(settings.resolution, Resolution::new(320, 240));
        assert_eq!(settings.bitrate, 400_000);
    }

    #[test]
    fn test_frames_are_broadcast_only_with_viewers() {
        // Arrange
        let rig = rig();
        rig.orchestrator.enable_network(8080);
        rig.orchestrator
            .reconfigure_capture(64, 48, FourCc::YUYV, 30);
        assert!(wait_until(|| rig.frames.load(Ordering::SeqCst) >= 3));
        assert!(rig.servers.broadcasts().is_empty());

        // Act
        rig.servers.set_client_count(1);

        // Assert
        assert!(wait_until(|| rig.servers.broadcasts().len() >= 3));
    }

    #[test]
    fn test_mjpeg_capture_builds_no_encoder() {
        // Arrange
        let rig = rig();

        // Act
        rig.orchestrator.enable_network(8080);
        rig.orchestrator
            .reconfigure_capture(640, 480, FourCc::MJPG, 30);

        // Assert
        assert!(wait_until(|| rig.driver.is_streaming()));
        assert!(wait_until(|| rig.servers.live_servers() == 1));
        assert!(rig.encoders.created().is_empty());
    }

    #[test]
    fn test_disable_network_drops_server() {
        // Arrange
        let rig = rig();
        rig.orchestrator.enable_network(8080);
        assert!(wait_until(|| rig.servers.live_servers() == 1));

        // Act
        rig.orchestrator.disable_network();

        // Assert
        assert!(wait_until(|| rig.servers.live_servers() == 0));
        assert!(!rig.orchestrator.config().network_enabled);
    }

    #[test]
    fn test_port_change_rebuilds_server() {
        // Arrange
        let rig = rig();
        rig.orchestrator.enable_network(8080);
        assert!(wait_until(|| rig.servers.bound_ports() == vec![8080]));

        // Act
        rig.orchestrator.enable_network(9090);

        // Assert
        assert!(wait_until(|| rig.servers.bound_ports() == vec![8080, 9090]));
        assert!(wait_until(|| rig.servers.live_servers() == 1));
    }

    #[test]
    fn test_queued_commands_reach_driver_while_paused() {
        // Arrange
        let rig = rig();
        let cmd = HidCommand::keyboard(ModifierMask::LEFT_SHIFT, 0x04);

        // Act
        rig.queue.push(cmd).unwrap();

        // Assert
        assert!(rig.orchestrator.is_paused());
        assert!(wait_until(|| rig.hid.sent() == vec![cmd]));
        assert!(rig.queue.is_empty());
    }

    #[test]
    fn test_viewer_messages_are_parsed_and_dispatched() {
        // Arrange
        let rig = rig();
        rig.orchestrator.enable_network(8080);
        assert!(wait_until(|| rig.servers.live_servers() == 1));

        // Act: one valid key press, one truncated mouse message
        rig.servers.inject_message(vec![0x01, 0x02, 0x04]);
        rig.servers.inject_message(vec![0x02, 0x01, 0x00]);

        // Assert
        assert!(wait_until(|| !rig.hid.sent().is_empty()));
        let sent = rig.hid.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, HidCommandKind::Keyboard);
        assert_eq!(sent[0].p2, 0x04);
    }

    #[test]
    fn test_long_press_is_polled_by_worker() {
        // Arrange
        let driver = MockCaptureDriver::new();
        let mut capture = CaptureDevice::new(driver);
        capture.open("/dev/video0").unwrap();
        let hid = RecordingHidDriver::new();
        let queue = CommandQueue::new();
        let translator = Arc::new(HidTranslator::new(queue.clone()));
        translator.set_mode(crate::application::hid_translator::PointerMode::Relative);
        let parts = OrchestratorParts {
            capture,
            hid: Box::new(hid.clone()),
            queue,
            translator: Some(Arc::clone(&translator)),
            frame_sink: None,
            encoders: Box::new(FakeEncoderFactory::new()),
            servers: Box::new(FakeServerFactory::new()),
        };
        let _orchestrator = HardwareOrchestrator::spawn(parts, HardwareConfig::default()).unwrap();

        // Act: a press that started well over the threshold ago
        use crate::application::hid_translator::{PointerButton, PointerEvent, PointerEventKind};
        use ipkvm_core::Point;
        let press = PointerEvent::new(
            PointerEventKind::Press(PointerButton::Left),
            Point::new(10, 10),
            Point::new(10, 10),
            MouseButtons::LEFT,
        )
        .at(Instant::now() - Duration::from_secs(1));
        translator.on_pointer_event(&press);

        // Assert: right button down, then release
        assert!(wait_until(|| hid.sent().len() == 2));
        let sent = hid.sent();
        assert_eq!(sent[0].buttons(), MouseButtons::RIGHT);
        assert_eq!(sent[1].buttons(), MouseButtons::NONE);
    }

    #[test]
    fn test_negotiated_capture_size_reaches_translator() {
        // Arrange: the driver only does 1280x720, the preview is 640x360
        let driver = MockCaptureDriver::new();
        driver.force_resolution(Resolution::new(1280, 720));
        let mut capture = CaptureDevice::new(driver);
        capture.open("/dev/video0").unwrap();
        let queue = CommandQueue::new();
        let translator = Arc::new(HidTranslator::new(queue.clone()));
        translator.set_widget_size(Size::new(640, 360));
        let parts = OrchestratorParts {
            capture,
            hid: Box::new(RecordingHidDriver::new()),
            queue,
            translator: Some(Arc::clone(&translator)),
            frame_sink: None,
            encoders: Box::new(FakeEncoderFactory::new()),
            servers: Box::new(FakeServerFactory::new()),
        };
        let orchestrator = HardwareOrchestrator::spawn(parts, HardwareConfig::default()).unwrap();

        // Act
        orchestrator.reconfigure_capture(1920, 1080, FourCc::YUYV, 30);

        // Assert: the letterbox uses the size the driver chose
        assert!(wait_until(|| translator.display_mapping().is_some()));
        let mapping = translator.display_mapping().unwrap();
        assert_eq!(mapping.source(), Size::new(1280, 720));
        assert_eq!(mapping.widget(), Size::new(640, 360));
    }

    #[test]
    fn test_shutdown_releases_hardware() {
        // Arrange
        let mut rig = rig();
        rig.orchestrator
            .reconfigure_capture(64, 48, FourCc::YUYV, 30);
        assert!(wait_until(|| rig.driver.is_streaming()));

        // Act
        rig.orchestrator.shutdown();
        rig.orchestrator.shutdown();

        // Assert
        assert!(!rig.driver.is_streaming());
        let calls = rig.driver.calls();
        assert_eq!(calls.last().map(String::as_str), Some("close"));
    }
}
