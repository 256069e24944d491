//! Application layer use cases for the agent.
//!
//! The application layer turns input into hardware commands and decides
//! when hardware is (re)configured. It talks to devices only through the
//! traits exported by `infrastructure`, so every use case here runs against
//! in-memory fakes in tests.
//!
//! # Sub-modules
//!
//! - **`command_queue`** – Bounded FIFO of [`HidCommand`]s shared by every
//!   input producer and drained by the orchestrator.
//!
//! - **`hid_translator`** – Turns local pointer/key events and viewer
//!   control messages into commands; owns the absolute/relative pointer
//!   modes and the tap/drag/long-press gesture machine.
//!
//! - **`orchestrator`** – The single worker thread that owns capture,
//!   encoder, stream server and HID driver, and reconciles desired against
//!   actual configuration.
//!
//! [`HidCommand`]: ipkvm_core::HidCommand

pub mod command_queue;
pub mod hid_translator;
pub mod orchestrator;
