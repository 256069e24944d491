//! Domain entities for the IP-KVM.
//!
//! Pure data and arithmetic with no device, network, or UI dependencies:
//!
//! - **`command`** – the normalized [`HidCommand`](command::HidCommand) that
//!   every input source is reduced to, plus the button and modifier bitmasks
//!   carried inside it.
//! - **`geometry`** – sizes, points, rectangles, and the letterbox
//!   [`DisplayMapping`](geometry::DisplayMapping) used to turn preview-widget
//!   coordinates into absolute pointer coordinates.

pub mod command;
pub mod geometry;
