//! Network control protocol spoken by remote viewers.

pub mod control;

pub use control::{decode_control, parse_commands, ControlError, ControlMessage};
