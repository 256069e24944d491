//! Infrastructure layer for the agent.
//!
//! Contains the device- and OS-facing adapters: V4L2 capture, the H.264
//! encoder, the WebSocket stream server, the serial HID driver, and
//! configuration storage. Each concern exposes a trait (`CaptureDriver`,
//! `H264Backend`/`EncoderFactory`, `StreamServer`/`ServerFactory`,
//! `HidDriver`) plus an in-memory implementation for tests.

pub mod capture;
pub mod encoder;
pub mod hid;
pub mod network;
pub mod storage;
