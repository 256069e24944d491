//! HidTranslator: turns local desktop input and remote control messages into
//! [`HidCommand`]s on the shared [`CommandQueue`].
//!
//! # Pointer modes
//!
//! - [`PointerMode::None`]: nothing is intercepted; events fall through to the
//!   UI.
//! - [`PointerMode::Absolute`]: the pointer position inside the letterboxed
//!   preview is mapped onto the target's `0..=4095` absolute range.
//! - [`PointerMode::Relative`]: touch-style control. Moves are sent as
//!   deltas, a short tap becomes a left click and a long press (over 500 ms
//!   without dragging) becomes a right click.
//!
//! # Gestures
//!
//! In relative mode the real left-button press is never forwarded, because
//! whether it is a tap, a drag or a long press is only known later. The
//! gesture state machine is:
//!
//! ```text
//! Idle ──press──▶ Pressed ──move > 5──▶ Dragging
//!                    │
//!                    └──poll, > 500 ms──▶ LongPressFired
//!
//! any ──release──▶ Idle   (Pressed on release ⇒ synthesized left click)
//! ```
//!
//! The long-press timer is polled by the orchestrator loop through
//! [`HidTranslator::poll_long_press`], not driven by events.
//!
//! # Threading
//!
//! All methods take `&self`; state lives behind a mutex so the UI thread and
//! the orchestrator worker can share one `Arc<HidTranslator>`.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use ipkvm_core::protocol::control::parse_commands;
use ipkvm_core::{DisplayMapping, HidCommand, KeyCodeTable, ModifierMask, MouseButtons, Point, Size};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::command_queue::CommandQueue;

/// Hold time after which an undragged press becomes a right click.
pub const LONG_PRESS_THRESHOLD: Duration = Duration::from_millis(500);

/// Manhattan distance from the press position beyond which a press is a drag.
pub const DRAG_THRESHOLD: i32 = 5;

// ── Event types ───────────────────────────────────────────────────────────────

/// How local pointer events are translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerMode {
    /// Local events are not intercepted.
    #[default]
    None,
    /// Preview position maps to an absolute target position.
    Absolute,
    /// Touch-style relative control with tap and long-press gestures.
    Relative,
}

/// A physical pointer button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Left,
    Right,
    Middle,
}

impl PointerButton {
    pub fn mask(self) -> MouseButtons {
        match self {
            PointerButton::Left => MouseButtons::LEFT,
            PointerButton::Right => MouseButtons::RIGHT,
            PointerButton::Middle => MouseButtons::MIDDLE,
        }
    }
}

/// What happened to the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEventKind {
    Press(PointerButton),
    Release(PointerButton),
    Move,
    /// Wheel rotation in notches; positive is away from the user.
    Wheel(i32),
}

/// A local pointer event as delivered by the desktop toolkit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerEvent {
    pub kind: PointerEventKind,
    /// Position in preview-widget coordinates.
    pub position: Point,
    /// Position in global screen coordinates.
    pub global_position: Point,
    /// Buttons held once this event has been applied.
    pub buttons: MouseButtons,
    pub timestamp: Instant,
}

impl PointerEvent {
    /// Creates an event stamped with the current time.
    pub fn new(
        kind: PointerEventKind,
        position: Point,
        global_position: Point,
        buttons: MouseButtons,
    ) -> Self {
        Self {
            kind,
            position,
            global_position,
            buttons,
            timestamp: Instant::now(),
        }
    }

    /// Replaces the timestamp.
    pub fn at(mut self, timestamp: Instant) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Modifier state as reported by the desktop toolkit.
///
/// The toolkit does not distinguish left from right, so every flag maps to
/// the left-hand bit of the HID modifier mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyModifiers {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
}

impl KeyModifiers {
    pub fn to_mask(self) -> ModifierMask {
        let mut mask = ModifierMask::NONE;
        if self.ctrl {
            mask |= ModifierMask::LEFT_CTRL;
        }
        if self.shift {
            mask |= ModifierMask::LEFT_SHIFT;
        }
        if self.alt {
            mask |= ModifierMask::LEFT_ALT;
        }
        if self.meta {
            mask |= ModifierMask::LEFT_META;
        }
        mask
    }
}

/// A local key press or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// X11 KeySym of the key.
    pub keysym: u32,
    pub pressed: bool,
    pub autorepeat: bool,
    pub modifiers: KeyModifiers,
}

impl KeyEvent {
    pub fn press(keysym: u32, modifiers: KeyModifiers) -> Self {
        Self {
            keysym,
            pressed: true,
            autorepeat: false,
            modifiers,
        }
    }

    pub fn release(keysym: u32, modifiers: KeyModifiers) -> Self {
        Self {
            keysym,
            pressed: false,
            autorepeat: false,
            modifiers,
        }
    }

    /// Marks the event as generated by key autorepeat.
    pub fn repeated(mut self) -> Self {
        self.autorepeat = true;
        self
    }
}

// ── InputSink ─────────────────────────────────────────────────────────────────

/// Receiver of local and remote input events.
///
/// The desktop event source and the network message path call into this
/// directly.
pub trait InputSink: Send + Sync {
    /// Handles a pointer event; returns `true` if it was consumed.
    fn on_pointer_event(&self, event: &PointerEvent) -> bool;

    /// Handles a key event; returns `true` if it was consumed.
    fn on_key_event(&self, event: &KeyEvent) -> bool;

    /// Handles one remote control message; returns the number of commands
    /// queued.
    fn on_network_message(&self, bytes: &[u8]) -> usize;
}

// ── Translator ────────────────────────────────────────────────────────────────

/// Long-press / tap recognition state for relative mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gesture {
    Idle,
    Pressed { started: Instant, origin: Point },
    Dragging,
    LongPressFired,
}

#[derive(Debug)]
struct TranslatorState {
    mode: PointerMode,
    source: Size,
    widget: Size,
    mapping: Option<DisplayMapping>,
    last_global: Option<Point>,
    gesture: Gesture,
}

/// Produces [`HidCommand`]s from local and network input.
#[derive(Debug)]
pub struct HidTranslator {
    queue: CommandQueue,
    state: Mutex<TranslatorState>,
}

impl HidTranslator {
    /// Creates a translator in [`PointerMode::None`] that pushes to `queue`.
    pub fn new(queue: CommandQueue) -> Self {
        Self {
            queue,
            state: Mutex::new(TranslatorState {
                mode: PointerMode::None,
                source: Size::default(),
                widget: Size::default(),
                mapping: None,
                last_global: None,
                gesture: Gesture::Idle,
            }),
        }
    }

    /// The queue commands are pushed to.
    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn mode(&self) -> PointerMode {
        self.lock().mode
    }

    /// Switches translation strategy and resets any gesture in progress.
    pub fn set_mode(&self, mode: PointerMode) {
        let mut state = self.lock();
        if state.mode != mode {
            info!("pointer mode {:?} -> {:?}", state.mode, mode);
        }
        state.mode = mode;
        state.gesture = Gesture::Idle;
        state.last_global = None;
    }

    /// Records the capture resolution and preview size and recomputes the
    /// letterbox. If either size is empty the previous mapping is kept.
    pub fn set_source_geometry(&self, source: Size, widget: Size) {
        let mut state = self.lock();
        state.source = source;
        state.widget = widget;
        Self::update_mapping(&mut state);
    }

    /// Records a new capture resolution, keeping the current preview size.
    pub fn set_source_size(&self, source: Size) {
        let mut state = self.lock();
        state.source = source;
        Self::update_mapping(&mut state);
    }

    /// Records a new preview size, keeping the current source size.
    pub fn set_widget_size(&self, widget: Size) {
        let mut state = self.lock();
        state.widget = widget;
        Self::update_mapping(&mut state);
    }

    /// The current letterbox, if one has been computed.
    pub fn display_mapping(&self) -> Option<DisplayMapping> {
        self.lock().mapping
    }

    /// Translates a local pointer event.
    ///
    /// Returns `true` (consumed) whenever a pointer mode is active, even if
    /// the event produced no command.
    pub fn on_pointer_event(&self, event: &PointerEvent) -> bool {
        let mut state = self.lock();
        let commands = match state.mode {
            PointerMode::None => return false,
            PointerMode::Absolute => Self::translate_absolute(&state, event),
            PointerMode::Relative => Self::translate_relative(&mut state, event),
        };
        drop(state);
        self.enqueue(commands);
        true
    }

    /// Translates a local key event.
    ///
    /// Autorepeat events are consumed without producing commands. A press
    /// sends the key's HID code with the held modifiers; a release sends
    /// code `0`. Keys with no mapping send code `0` with the held modifiers.
    pub fn on_key_event(&self, event: &KeyEvent) -> bool {
        if self.mode() == PointerMode::None {
            return false;
        }
        if event.autorepeat {
            return true;
        }

        let mods = event.modifiers.to_mask();
        let cmd = if event.pressed {
            let code = KeyCodeTable::slot_code(event.keysym);
            if code == 0 {
                debug!("keysym 0x{:04X} has no key slot code", event.keysym);
            }
            HidCommand::keyboard(mods, code)
        } else {
            HidCommand::key_release(mods)
        };
        self.enqueue(vec![cmd]);
        true
    }

    /// Parses one remote control message and queues its commands.
    ///
    /// Malformed messages are dropped. Network input is accepted in every
    /// pointer mode.
    pub fn on_network_message(&self, bytes: &[u8]) -> usize {
        self.enqueue(parse_commands(bytes))
    }

    /// Evaluates the long-press timer at `now`.
    ///
    /// Fires at most one right click per press. Returns `true` if it fired.
    pub fn poll_long_press(&self, now: Instant) -> bool {
        let mut state = self.lock();
        if state.mode != PointerMode::Relative {
            return false;
        }
        let Gesture::Pressed { started, .. } = state.gesture else {
            return false;
        };
        if now.saturating_duration_since(started) <= LONG_PRESS_THRESHOLD {
            return false;
        }

        state.gesture = Gesture::LongPressFired;
        drop(state);
        debug!("long press, synthesizing right click");
        self.enqueue(HidCommand::click(MouseButtons::RIGHT).to_vec());
        true
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn lock(&self) -> std::sync::MutexGuard<'_, TranslatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_mapping(state: &mut TranslatorState) {
        match DisplayMapping::compute(state.source, state.widget) {
            Some(mapping) => {
                debug!(
                    "letterbox: source {:?} widget {:?} rect {:?}",
                    state.source,
                    state.widget,
                    mapping.display_rect()
                );
                state.mapping = Some(mapping);
            }
            None => debug!(
                "ignoring empty geometry: source {:?} widget {:?}",
                state.source, state.widget
            ),
        }
    }

    fn translate_absolute(state: &TranslatorState, event: &PointerEvent) -> Vec<HidCommand> {
        let Some((x, y)) = state
            .mapping
            .and_then(|mapping| mapping.map_absolute(event.position))
        else {
            return Vec::new();
        };
        let wheel = match event.kind {
            PointerEventKind::Wheel(steps) => steps,
            _ => 0,
        };
        vec![HidCommand::mouse_absolute(x, y, event.buttons, wheel)]
    }

    fn translate_relative(state: &mut TranslatorState, event: &PointerEvent) -> Vec<HidCommand> {
        match event.kind {
            PointerEventKind::Press(PointerButton::Left) => {
                state.gesture = Gesture::Pressed {
                    started: event.timestamp,
                    origin: event.global_position,
                };
                Vec::new()
            }
            PointerEventKind::Release(PointerButton::Left) => {
                let tapped = matches!(state.gesture, Gesture::Pressed { .. });
                state.gesture = Gesture::Idle;
                if tapped {
                    HidCommand::click(MouseButtons::LEFT).to_vec()
                } else {
                    Vec::new()
                }
            }
            PointerEventKind::Move => {
                let current = event.global_position;
                let last = state.last_global.replace(current).unwrap_or(current);

                if let Gesture::Pressed { origin, .. } = state.gesture {
                    if current.manhattan_distance(origin) > DRAG_THRESHOLD {
                        state.gesture = Gesture::Dragging;
                    }
                }

                vec![HidCommand::mouse_relative(
                    current.x - last.x,
                    current.y - last.y,
                    MouseButtons::NONE,
                    0,
                )]
            }
            PointerEventKind::Wheel(steps) => {
                vec![HidCommand::mouse_relative(0, 0, MouseButtons::NONE, steps)]
            }
            PointerEventKind::Press(_) | PointerEventKind::Release(_) => Vec::new(),
        }
    }

    fn enqueue(&self, commands: Vec<HidCommand>) -> usize {
        let mut queued = 0;
        for cmd in commands {
            if self.queue.push(cmd).is_err() {
                break;
            }
            queued += 1;
        }
        queued
    }
}

impl InputSink for HidTranslator {
    fn on_pointer_event(&self, event: &PointerEvent) -> bool {
        HidTranslator::on_pointer_event(self, event)
    }

    fn on_key_event(&self, event: &KeyEvent) -> bool {
        HidTranslator::on_key_event(self, event)
    }

    fn on_network_message(&self, bytes: &[u8]) -> usize {
        HidTranslator::on_network_message(self, bytes)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
