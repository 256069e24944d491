//! CommandQueue: bounded FIFO of hardware commands shared by all producers.
//!
//! Producers are the UI event path (through the HID translator) and the
//! orchestrator's own network-message parser. The orchestrator is the only
//! consumer and drains the queue to empty on every loop tick.
//!
//! The queue is an explicit value: clone it and hand the clone to each
//! producer. All clones refer to the same underlying channel.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use ipkvm_core::HidCommand;
use thiserror::Error;
use tracing::warn;

/// Default number of commands the queue holds before rejecting pushes.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Error returned when a command cannot be queued.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("command queue is full ({capacity} commands pending)")]
    Full { capacity: usize },
}

/// Bounded multi-producer FIFO of [`HidCommand`]s.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    tx: Sender<HidCommand>,
    rx: Receiver<HidCommand>,
    capacity: usize,
}

impl CommandQueue {
    /// Creates a queue holding at most [`DEFAULT_QUEUE_CAPACITY`] commands.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Creates a queue holding at most `capacity` commands (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self { tx, rx, capacity }
    }

    /// Appends `cmd` without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Full`] if the consumer has fallen behind by a
    /// full queue; the command is discarded.
    pub fn push(&self, cmd: HidCommand) -> Result<(), QueueError> {
        match self.tx.try_send(cmd) {
            Ok(()) => Ok(()),
            // Both ends live inside `self`, so the channel cannot disconnect.
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                warn!("command queue full, dropping {:?}", cmd.kind);
                Err(QueueError::Full {
                    capacity: self.capacity,
                })
            }
        }
    }

    /// Pushes every command in order, stopping at the first rejection.
    ///
    /// # Errors
    ///
    /// Returns the first [`QueueError`] encountered.
    pub fn push_all<I>(&self, commands: I) -> Result<(), QueueError>
    where
        I: IntoIterator<Item = HidCommand>,
    {
        commands.into_iter().try_for_each(|cmd| self.push(cmd))
    }

    /// Removes and returns the oldest command, if any.
    pub fn try_pop(&self) -> Option<HidCommand> {
        self.rx.try_recv().ok()
    }

    /// Removes every pending command and returns them oldest first.
    pub fn drain(&self) -> Vec<HidCommand> {
        self.rx.try_iter().collect()
    }

    /// Number of commands waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
