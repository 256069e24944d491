//! Integration tests for the agent pipeline.
//!
//! These tests exercise the public API end-to-end with in-memory fakes:
//! `HidTranslator` + `CommandQueue` + `HardwareOrchestrator` driving a mock
//! capture driver, a recording HID driver, and fake encoder/server
//! factories.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ipkvm_agent::application::command_queue::CommandQueue;
use ipkvm_agent::application::hid_translator::{
    HidTranslator, KeyEvent, KeyModifiers, PointerButton, PointerEvent, PointerEventKind,
    PointerMode,
};
use ipkvm_agent::application::orchestrator::{
    HardwareConfig, HardwareOrchestrator, OrchestratorParts,
};
use ipkvm_agent::infrastructure::capture::mock::MockCaptureDriver;
use ipkvm_agent::infrastructure::capture::{CaptureDevice, CaptureError, FourCc, Resolution};
use ipkvm_agent::infrastructure::encoder::mock::FakeEncoderFactory;
use ipkvm_agent::infrastructure::hid::mock::RecordingHidDriver;
use ipkvm_agent::infrastructure::network::mock::FakeServerFactory;
use ipkvm_agent::infrastructure::network::INBOUND_CAPACITY;
use ipkvm_core::{HidCommand, HidCommandKind, ModifierMask, MouseButtons, Point, Size};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

struct Agent {
    orchestrator: HardwareOrchestrator,
    driver: MockCaptureDriver,
    hid: RecordingHidDriver,
    translator: Arc<HidTranslator>,
    encoders: FakeEncoderFactory,
    servers: FakeServerFactory,
}

fn spawn_agent() -> Agent {
    let driver = MockCaptureDriver::new();
    let mut capture = CaptureDevice::new(driver.clone());
    capture.open("/dev/video0").expect("mock open");

    let hid = RecordingHidDriver::new();
    let queue = CommandQueue::new();
    let translator = Arc::new(HidTranslator::new(queue.clone()));
    let encoders = FakeEncoderFactory::new();
    let servers = FakeServerFactory::new();

    let parts = OrchestratorParts {
        capture,
        hid: Box::new(hid.clone()),
        queue,
        translator: Some(Arc::clone(&translator)),
        frame_sink: None,
        encoders: Box::new(encoders.clone()),
        servers: Box::new(servers.clone()),
    };
    let orchestrator =
        HardwareOrchestrator::spawn(parts, HardwareConfig::default()).expect("spawn worker");

    Agent {
        orchestrator,
        driver,
        hid,
        translator,
        encoders,
        servers,
    }
}

// ── Reconfiguration ───────────────────────────────────────────────────────────

#[test]
fn test_capture_restart_rebuilds_encoder_with_new_geometry() {
    // Arrange: streaming at 640x480 with a viewer connected
    let agent = spawn_agent();
    agent.servers.set_client_count(1);
    agent.orchestrator.enable_network(8080);
    agent
        .orchestrator
        .reconfigure_capture(640, 480, FourCc::YUYV, 30);
    assert!(wait_until(|| agent
        .encoders
        .submissions()
        .iter()
        .any(|s| (s.width, s.height) == (640, 480))));

    // Act: only the capture side changes
    agent
        .orchestrator
        .reconfigure_capture(320, 240, FourCc::YUYV, 30);

    // Assert: a second encoder exists for the new size, and frames encoded
    // after it was built all carry the new geometry
    assert!(wait_until(|| agent.encoders.created().len() == 2));
    let created = agent.encoders.created();
    assert_eq!(created[0].resolution, Resolution::new(640, 480));
    assert_eq!(created[1].resolution, Resolution::new(320, 240));

    assert!(wait_until(|| agent
        .encoders
        .submissions()
        .iter()
        .any(|s| (s.width, s.height) == (320, 240))));
    let submissions = agent.encoders.submissions();
    let first_new = submissions
        .iter()
        .position(|s| s.width == 320)
        .expect("new geometry submitted");
    assert!(submissions[first_new..].iter().all(|s| s.width == 320));
    // A fresh encoder starts its timestamps and GOP over.
    assert_eq!(submissions[first_new].pts, 0);
    assert!(submissions[first_new].intra);
}

#[test]
fn test_reenabling_same_port_keeps_server_and_rebuilds_encoder() {
    // Arrange
    let agent = spawn_agent();
    agent.orchestrator.enable_network(8080);
    agent
        .orchestrator
        .reconfigure_capture(64, 48, FourCc::YUYV, 30);
    assert!(wait_until(|| agent.encoders.created().len() == 1));

    // Act: re-enabling on the same port is a network reconciliation
    agent.orchestrator.enable_network(8080);

    // Assert: the server survives, the encoder is rebuilt once
    assert!(wait_until(|| agent.encoders.created().len() == 2));
    assert_eq!(agent.servers.bound_ports(), vec![8080]);
    assert_eq!(agent.servers.live_servers(), 1);
}

#[test]
fn test_shutdown_stops_stream_and_closes_device() {
    // Arrange
    let mut agent = spawn_agent();
    agent
        .orchestrator
        .reconfigure_capture(64, 48, FourCc::YUYV, 30);
    assert!(wait_until(|| agent.driver.is_streaming()));

    // Act
    agent.orchestrator.shutdown();

    // Assert: stream off precedes unmapping, device closed last
    let calls = agent.driver.calls();
    let stream_off = calls.iter().rposition(|c| c == "stream_off").expect("stream_off");
    let unmap = calls.iter().rposition(|c| c == "unmap").expect("unmap");
    let release = calls
        .iter()
        .rposition(|c| c == "request_buffers(0)")
        .expect("release");
    assert!(stream_off < unmap && unmap < release);
    assert_eq!(calls.last().map(String::as_str), Some("close"));
}

// ── Input pipeline ────────────────────────────────────────────────────────────

#[test]
fn test_local_key_press_reaches_hid_driver() {
    // Arrange
    let agent = spawn_agent();
    agent.translator.set_mode(PointerMode::Absolute);
    let shift = KeyModifiers {
        shift: true,
        ..KeyModifiers::default()
    };

    // Act: 'A' with shift, an autorepeat, then release
    agent.translator.on_key_event(&KeyEvent::press(0x0041, shift));
    agent
        .translator
        .on_key_event(&KeyEvent::press(0x0041, shift).repeated());
    agent
        .translator
        .on_key_event(&KeyEvent::release(0x0041, KeyModifiers::default()));

    // Assert
    assert!(wait_until(|| agent.hid.sent().len() >= 2));
    thread::sleep(Duration::from_millis(30));
    let sent = agent.hid.sent();
    assert_eq!(
        sent,
        vec![
            HidCommand::keyboard(ModifierMask::LEFT_SHIFT, 0x04),
            HidCommand::key_release(ModifierMask::NONE),
        ]
    );
}

#[test]
fn test_absolute_pointer_maps_through_letterbox() {
    // Arrange: 640x480 source shown 1:1
    let agent = spawn_agent();
    agent.translator.set_mode(PointerMode::Absolute);
    agent
        .translator
        .set_source_geometry(Size::new(640, 480), Size::new(640, 480));

    // Act: move to the far corner with the left button held
    let event = PointerEvent::new(
        PointerEventKind::Move,
        Point::new(639, 479),
        Point::new(639, 479),
        MouseButtons::LEFT,
    );
    assert!(agent.translator.on_pointer_event(&event));

    // Assert
    assert!(wait_until(|| agent.hid.sent().len() == 1));
    let cmd = agent.hid.sent()[0];
    assert_eq!(cmd.kind, HidCommandKind::MouseAbsolute);
    assert_eq!((cmd.p1, cmd.p2), (639 * 4095 / 640, 479 * 4095 / 480));
    assert_eq!(cmd.buttons(), MouseButtons::LEFT);
}

#[test]
fn test_relative_tap_becomes_one_click() {
    // Arrange
    let agent = spawn_agent();
    agent.translator.set_mode(PointerMode::Relative);
    let now = Instant::now();
    let at = Point::new(100, 100);

    // Act: press, jiggle by 3, release after 100 ms
    let press = PointerEvent::new(
        PointerEventKind::Press(PointerButton::Left),
        at,
        at,
        MouseButtons::LEFT,
    )
    .at(now);
    let jiggle = PointerEvent::new(
        PointerEventKind::Move,
        Point::new(102, 101),
        Point::new(102, 101),
        MouseButtons::LEFT,
    )
    .at(now + Duration::from_millis(50));
    let release = PointerEvent::new(
        PointerEventKind::Release(PointerButton::Left),
        Point::new(102, 101),
        Point::new(102, 101),
        MouseButtons::NONE,
    )
    .at(now + Duration::from_millis(100));
    agent.translator.on_pointer_event(&press);
    agent.translator.on_pointer_event(&jiggle);
    agent.translator.on_pointer_event(&release);

    // Assert: the jiggle (first move, zero delta) plus one left click
    assert!(wait_until(|| agent.hid.sent().len() == 3));
    thread::sleep(Duration::from_millis(30));
    let buttons: Vec<MouseButtons> = agent.hid.sent().iter().map(|c| c.buttons()).collect();
    assert_eq!(
        buttons,
        vec![MouseButtons::NONE, MouseButtons::LEFT, MouseButtons::NONE]
    );
    assert!(!buttons.contains(&MouseButtons::RIGHT));
}

#[test]
fn test_viewer_mouse_message_is_rescaled_and_injected() {
    // Arrange
    let agent = spawn_agent();
    agent.orchestrator.enable_network(8080);
    assert!(wait_until(|| agent.servers.live_servers() == 1));

    // Act: x = 32767, y = 0, left button, wheel -1
    agent
        .servers
        .inject_message(vec![0x02, 0x01, 0xFF, 0x7F, 0x00, 0x00, 0xFF]);

    // Assert
    assert!(wait_until(|| !agent.hid.sent().is_empty()));
    assert_eq!(
        agent.hid.sent()[0],
        HidCommand::mouse_absolute(4095, 0, MouseButtons::LEFT, -1)
    );
}

#[test]
fn test_viewer_flood_is_capped_at_inbound_capacity() {
    // Arrange: a viewer sends twice the buffer before the first drain
    let agent = spawn_agent();
    for _ in 0..INBOUND_CAPACITY * 2 {
        agent.servers.inject_message(vec![0x01, 0x00, 0x04]);
    }

    // Act
    agent.orchestrator.enable_network(8080);

    // Assert: only the buffered messages reach the HID driver
    assert!(wait_until(|| agent.hid.sent().len() == INBOUND_CAPACITY));
    thread::sleep(Duration::from_millis(30));
    assert_eq!(agent.hid.sent().len(), INBOUND_CAPACITY);
    assert_eq!(agent.servers.dropped_messages(), INBOUND_CAPACITY);
    assert!(agent
        .hid
        .sent()
        .iter()
        .all(|c| *c == HidCommand::keyboard(ModifierMask::NONE, 0x04)));
}

// ── Buffer accounting ─────────────────────────────────────────────────────────

#[test]
fn test_every_dequeue_is_balanced_by_one_enqueue() {
    // Arrange
    let driver = MockCaptureDriver::new();
    let mut device = CaptureDevice::new(driver);
    device.open("/dev/video0").expect("open");
    device
        .start_capturing(64, 48, FourCc::YUYV, 30)
        .expect("start");

    // Act: hold every buffer, then give them back in reverse order
    let mut held = Vec::new();
    while let Some(handle) = device.dequeue() {
        held.push(handle);
    }
    assert_eq!(device.outstanding(), device.buffer_count());
    while let Some(handle) = held.pop() {
        device.enqueue(handle).expect("enqueue");
    }

    // Assert
    assert_eq!(device.outstanding(), 0);
    assert!(device.capture_frame().expect("frame").is_some());
}

#[test]
fn test_handle_from_previous_session_is_rejected() {
    // Arrange
    let driver = MockCaptureDriver::new();
    let mut device = CaptureDevice::new(driver);
    device.open("/dev/video0").expect("open");
    device
        .start_capturing(64, 48, FourCc::YUYV, 30)
        .expect("start");
    let stale = device.dequeue().expect("frame");

    // Act
    device
        .start_capturing(32, 24, FourCc::YUYV, 30)
        .expect("restart");
    let result = device.enqueue(stale);

    // Assert
    assert!(matches!(result, Err(CaptureError::StaleHandle)));
    assert_eq!(device.outstanding(), 0);
}
