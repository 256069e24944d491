//! IP-KVM agent entry point.
//!
//! Opens the capture device and the HID injection chip, hands both to the
//! hardware orchestrator, and streams H.264 video to WebSocket viewers until
//! Ctrl-C.
//!
//! # Usage
//!
//! ```text
//! ipkvm-agent [OPTIONS]
//!
//! Options:
//!   --config <PATH>     Config file [default: $XDG_CONFIG_HOME/ipkvm/config.toml]
//!   --device <PATH>     Capture device, e.g. /dev/video0
//!   --width/--height    Requested capture size
//!   --format <FOURCC>   YUYV or MJPG
//!   --fps <N>           Requested frame rate
//!   --port <PORT>       Viewer WebSocket port
//!   --no-network        Capture and inject only; no viewers
//!   --serial <PATH>     CH9329 serial port (dry-run logging when absent)
//!   --baud <RATE>       Serial baud rate
//!   --list-devices      Print capture devices and exit
//!   --list-serial       Print serial ports and exit
//! ```
//!
//! Every option can also come from an `IPKVM_*` environment variable. Flags
//! override the config file, which overrides the built-in defaults.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load config, apply CLI overrides
//!  └─ open capture device + HID driver
//!  └─ HardwareOrchestrator::spawn   -- owns all hardware on one thread
//!       ├─ reconfigure_capture
//!       └─ enable_network
//!  └─ wait for Ctrl-C, then shutdown (joins the worker)
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use image::RgbImage;
use tracing::{info, trace, warn};
use tracing_subscriber::EnvFilter;

use ipkvm_agent::application::command_queue::CommandQueue;
use ipkvm_agent::application::hid_translator::HidTranslator;
use ipkvm_agent::application::orchestrator::{
    FrameSink, HardwareOrchestrator, OrchestratorParts,
};
use ipkvm_agent::infrastructure::capture::{CaptureDevice, CaptureDriver, FourCc};
use ipkvm_agent::infrastructure::encoder::OpenH264Factory;
use ipkvm_agent::infrastructure::hid::{Ch9329Driver, HidDriver, LoggingHidDriver};
use ipkvm_agent::infrastructure::network::WebSocketServerFactory;
use ipkvm_agent::infrastructure::storage::config::{load_config, load_config_from, AppConfig};
use ipkvm_core::Size;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// IP-KVM agent.
///
/// Captures the target's screen, streams it to network viewers, and injects
/// keyboard and mouse input through a CH9329 serial HID chip.
#[derive(Debug, Parser)]
#[command(
    name = "ipkvm-agent",
    about = "Capture, stream and inject input for an IP-KVM",
    version
)]
struct Cli {
    /// Configuration file to load instead of the default location.
    #[arg(long, env = "IPKVM_CONFIG")]
    config: Option<PathBuf>,

    /// Capture device node.
    #[arg(long, env = "IPKVM_DEVICE")]
    device: Option<String>,

    /// Requested capture width; the driver may adjust it.
    #[arg(long, env = "IPKVM_WIDTH")]
    width: Option<u32>,

    /// Requested capture height; the driver may adjust it.
    #[arg(long, env = "IPKVM_HEIGHT")]
    height: Option<u32>,

    /// Pixel format as a four-character code (`YUYV` or `MJPG`).
    ///
    /// Only YUYV capture can be streamed; MJPG is preview-only.
    #[arg(long, env = "IPKVM_FORMAT")]
    format: Option<FourCc>,

    /// Requested frame rate.
    #[arg(long, env = "IPKVM_FPS")]
    fps: Option<u32>,

    /// TCP port viewers connect to (ws://host:PORT).
    #[arg(long, env = "IPKVM_PORT")]
    port: Option<u16>,

    /// Disable the viewer stream server.
    #[arg(long, env = "IPKVM_NO_NETWORK")]
    no_network: bool,

    /// Serial port of the CH9329 HID chip.
    #[arg(long, env = "IPKVM_SERIAL")]
    serial: Option<String>,

    /// Serial baud rate of the HID chip.
    #[arg(long, env = "IPKVM_BAUD")]
    baud: Option<u32>,

    /// Print capture devices with their formats, sizes and rates, then exit.
    #[arg(long)]
    list_devices: bool,

    /// Print available serial ports, then exit.
    #[arg(long)]
    list_serial: bool,
}

impl Cli {
    /// Loads the config file and applies the command-line overrides.
    fn into_app_config(self) -> anyhow::Result<AppConfig> {
        let mut cfg = match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => load_config().context("failed to load config")?,
        };

        if let Some(device) = self.device {
            cfg.capture.device = device;
        }
        if let Some(width) = self.width {
            cfg.capture.width = width;
        }
        if let Some(height) = self.height {
            cfg.capture.height = height;
        }
        if let Some(format) = self.format {
            cfg.capture.format = format;
        }
        if let Some(fps) = self.fps {
            cfg.capture.fps = fps;
        }
        if let Some(port) = self.port {
            cfg.network.port = port;
        }
        if self.no_network {
            cfg.network.enabled = false;
        }
        if let Some(serial) = self.serial {
            cfg.hid.serial_port = Some(serial);
        }
        if let Some(baud) = self.baud {
            cfg.hid.baud_rate = baud;
        }
        Ok(cfg)
    }
}

// ── Preview sink ──────────────────────────────────────────────────────────────

/// Stands in for the desktop preview: counts frames and traces their size.
#[derive(Debug, Default)]
struct PreviewStats {
    frames: AtomicU64,
}

impl FrameSink for PreviewStats {
    fn deliver(&self, frame: RgbImage) {
        let n = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        trace!("preview frame {n}: {}x{}", frame.width(), frame.height());
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let list_devices = cli.list_devices;
    let list_serial = cli.list_serial;
    let cfg = cli.into_app_config()?;

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.agent.log_level)),
        )
        .init();

    if list_serial {
        print_serial_ports()?;
        return Ok(());
    }
    if list_devices {
        print_capture_devices();
        return Ok(());
    }

    info!("IP-KVM agent starting");

    let capture = open_capture(&cfg.capture.device)?;
    let hid = open_hid(&cfg)?;

    let hw = cfg.hardware_config();
    let queue = CommandQueue::new();
    let translator = Arc::new(HidTranslator::new(queue.clone()));
    translator.set_mode(cfg.hid.pointer_mode);
    // Headless: the preview is the frame itself. The worker fills in the
    // source size once the driver has negotiated it.
    translator.set_widget_size(Size::new(
        i32::try_from(hw.width).unwrap_or(i32::MAX),
        i32::try_from(hw.height).unwrap_or(i32::MAX),
    ));

    let preview = Arc::new(PreviewStats::default());
    let parts = OrchestratorParts {
        capture,
        hid,
        queue,
        translator: Some(translator),
        frame_sink: Some(Arc::clone(&preview) as Arc<dyn FrameSink>),
        encoders: Box::new(OpenH264Factory),
        servers: Box::new(WebSocketServerFactory),
    };

    let mut orchestrator = HardwareOrchestrator::spawn(parts, hw)
        .context("failed to start hardware worker")?;
    if hw.network_enabled {
        orchestrator.enable_network(hw.network_port);
    }
    orchestrator.reconfigure_capture(hw.width, hw.height, hw.fourcc, hw.fps);

    info!("IP-KVM agent ready. Press Ctrl-C to exit.");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutdown signal received");

    // Joining blocks; keep it off the async workers.
    tokio::task::spawn_blocking(move || orchestrator.shutdown())
        .await
        .context("hardware worker shutdown failed")?;

    info!(
        "IP-KVM agent stopped after {} frames",
        preview.frames.load(Ordering::Relaxed)
    );
    Ok(())
}

// ── Hardware setup ────────────────────────────────────────────────────────────

/// Opens the HID chip, or the dry-run driver when no port is configured.
fn open_hid(cfg: &AppConfig) -> anyhow::Result<Box<dyn HidDriver>> {
    let Some(path) = cfg.hid.serial_port.as_deref() else {
        info!("no HID serial port configured, input will only be logged");
        return Ok(Box::new(LoggingHidDriver::new()));
    };

    let mut driver = Ch9329Driver::open(path, cfg.hid.baud_rate)
        .with_context(|| format!("failed to open HID chip on {path}"))?;
    match driver.check_connection() {
        Ok(info) => info!(
            "HID chip version {:#04x}, target USB {}",
            info.version,
            if info.usb_connected { "connected" } else { "not connected" }
        ),
        // The chip may still accept reports; keep going.
        Err(e) => warn!("HID chip did not answer the connection check: {e}"),
    }
    Ok(Box::new(driver))
}

#[cfg(target_os = "linux")]
fn open_capture(
    path: &str,
) -> anyhow::Result<CaptureDevice<ipkvm_agent::infrastructure::capture::V4l2Driver>> {
    use ipkvm_agent::infrastructure::capture::V4l2Driver;

    let mut device = CaptureDevice::new(V4l2Driver::new());
    device
        .open(path)
        .with_context(|| format!("failed to open capture device {path}"))?;
    Ok(device)
}

#[cfg(not(target_os = "linux"))]
fn open_capture(
    _path: &str,
) -> anyhow::Result<CaptureDevice<ipkvm_agent::infrastructure::capture::mock::MockCaptureDriver>> {
    anyhow::bail!("video capture needs V4L2 and is only supported on Linux")
}

// ── Listing utilities ─────────────────────────────────────────────────────────

fn print_serial_ports() -> anyhow::Result<()> {
    let ports = serialport::available_ports().context("failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("no serial ports found");
    }
    for port in ports {
        println!("{}\t{:?}", port.port_name, port.port_type);
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn print_capture_devices() {
    use ipkvm_agent::infrastructure::capture::{list_devices, V4l2Driver};

    let devices = list_devices();
    if devices.is_empty() {
        println!("no capture devices found");
    }
    for info in devices {
        println!("{} ({}, {})", info.path.display(), info.card, info.driver);
        let mut device = CaptureDevice::new(V4l2Driver::new());
        if let Err(e) = device.open(&info.path.to_string_lossy()) {
            println!("  unavailable: {e}");
            continue;
        }
        print_modes(&device);
    }
}

#[cfg(not(target_os = "linux"))]
fn print_capture_devices() {
    println!("capture device discovery is only supported on Linux");
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn print_modes<D: CaptureDriver>(device: &CaptureDevice<D>) {
    for format in device.enumerate_formats() {
        println!("  {} {}", format.fourcc, format.description);
        for resolution in device.enumerate_resolutions(format.fourcc) {
            let rates = device.enumerate_frame_rates(format.fourcc, resolution);
            let rates: Vec<String> = rates.iter().map(u32::to_string).collect();
            println!("    {resolution} @ {} fps", rates.join("/"));
        }
    }
}
