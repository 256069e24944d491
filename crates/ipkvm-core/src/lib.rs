//! # ipkvm-core
//!
//! Shared library for the IP-KVM containing the hardware command model,
//! the letterbox coordinate mapping, key code tables, and the remote control
//! protocol.
//!
//! It has no dependencies on devices, sockets, or UI toolkits, so everything
//! here can be tested on any machine.
//!
//! # Overview
//!
//! The IP-KVM sits next to a target computer. A capture card feeds the
//! target's screen into the agent, which shows it locally and streams it to
//! network viewers. Keyboard and mouse input from the local desktop and from
//! those viewers is injected into the target through a serial HID chip.
//!
//! - **`domain`** – [`HidCommand`], the uniform command every input is
//!   reduced to, plus the [`DisplayMapping`] that turns preview coordinates
//!   into the chip's 12-bit absolute range.
//!
//! - **`keymap`** – USB HID usage codes and the table that maps local key
//!   identifiers (X11 KeySyms) onto them.
//!
//! - **`protocol`** – decoding of the small binary control messages viewers
//!   send over the network.

pub mod domain;
pub mod keymap;
pub mod protocol;

pub use domain::command::{HidCommand, HidCommandKind, ModifierMask, MouseButtons};
pub use domain::geometry::{DisplayMapping, Point, Rect, Size};
pub use keymap::{HidKeyCode, KeyCodeTable};
pub use protocol::control::{ControlError, ControlMessage};
