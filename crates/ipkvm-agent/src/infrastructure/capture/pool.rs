//! Capture buffer slots and their kernel/application ownership.
//!
//! Each slot wraps one driver-mapped memory region. A slot is owned either
//! by the kernel (queued, being filled) or by the application (dequeued,
//! being read). Dequeue and enqueue are the only transitions.

use super::{CaptureError, FrameMemory};

/// Who may touch a slot's memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Kernel,
    Application,
}

struct Slot {
    memory: Box<dyn FrameMemory>,
    state: SlotState,
}

/// A dequeued buffer.
///
/// The handle is consumed by [`CaptureDevice::enqueue`](super::CaptureDevice::enqueue),
/// so a buffer cannot be returned twice through the same handle.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "every dequeued buffer must be enqueued again"]
pub struct BufferHandle {
    index: u32,
    bytes_used: usize,
    generation: u64,
}

impl BufferHandle {
    pub(crate) fn new(index: u32, bytes_used: usize, generation: u64) -> Self {
        Self {
            index,
            bytes_used,
            generation,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Bytes of valid frame data in the buffer.
    pub fn bytes_used(&self) -> usize {
        self.bytes_used
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }
}

/// Arena of mapped buffers indexed by driver buffer index.
pub struct BufferPool {
    slots: Vec<Slot>,
    generation: u64,
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            generation: 0,
        }
    }

    /// Adds a freshly mapped region in kernel ownership.
    pub fn push(&mut self, memory: Box<dyn FrameMemory>) {
        self.slots.push(Slot {
            memory,
            state: SlotState::Kernel,
        });
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Identifies the current set of slots; bumped by [`clear`](Self::clear).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self, index: u32) -> Option<SlotState> {
        self.slots.get(index as usize).map(|s| s.state)
    }

    /// Number of slots currently held by the application.
    pub fn outstanding(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state == SlotState::Application)
            .count()
    }

    /// Kernel → application.
    pub fn mark_dequeued(&mut self, index: u32) -> Result<(), CaptureError> {
        let slot = self.slot_mut(index)?;
        if slot.state == SlotState::Application {
            return Err(CaptureError::SlotAlreadyDequeued(index));
        }
        slot.state = SlotState::Application;
        Ok(())
    }

    /// Fails unless the slot is held by the application.
    pub fn check_dequeued(&self, index: u32) -> Result<(), CaptureError> {
        match self.state(index) {
            Some(SlotState::Application) => Ok(()),
            Some(SlotState::Kernel) => Err(CaptureError::SlotNotDequeued(index)),
            None => Err(CaptureError::UnknownSlot(index)),
        }
    }

    /// Application → kernel.
    pub fn mark_queued(&mut self, index: u32) -> Result<(), CaptureError> {
        self.check_dequeued(index)?;
        self.slot_mut(index)?.state = SlotState::Kernel;
        Ok(())
    }

    /// Valid bytes of the buffer behind `handle`.
    pub fn data(&self, handle: &BufferHandle) -> Result<&[u8], CaptureError> {
        if handle.generation() != self.generation {
            return Err(CaptureError::StaleHandle);
        }
        self.check_dequeued(handle.index())?;
        let bytes = self.slots[handle.index() as usize].memory.as_slice();
        Ok(&bytes[..handle.bytes_used().min(bytes.len())])
    }

    /// Drops (unmaps) every slot and starts a new generation.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.generation += 1;
    }

    fn slot_mut(&mut self, index: u32) -> Result<&mut Slot, CaptureError> {
        self.slots
            .get_mut(index as usize)
            .ok_or(CaptureError::UnknownSlot(index))
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_with(n: usize) -> BufferPool {
        let mut pool = BufferPool::new();
        for i in 0..n {
            pool.push(Box::new(vec![i as u8; 8]));
        }
        pool
    }

    #[test]
    fn test_slots_start_in_kernel_ownership() {
        let pool = pool_with(4);
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.state(3), Some(SlotState::Kernel));
    }

    #[test]
    fn test_dequeue_enqueue_round_trip_updates_accounting() {
        // Arrange
        let mut pool = pool_with(4);

        // Act
        pool.mark_dequeued(1).unwrap();
        pool.mark_dequeued(3).unwrap();
        let mid = pool.outstanding();
        pool.mark_queued(3).unwrap();
        pool.mark_queued(1).unwrap();

        // Assert: any return order is fine
        assert_eq!(mid, 2);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_double_enqueue_is_detected() {
        // Arrange
        let mut pool = pool_with(2);
        pool.mark_dequeued(0).unwrap();
        pool.mark_queued(0).unwrap();

        // Act
        let second = pool.mark_queued(0);

        // Assert
        assert!(matches!(second, Err(CaptureError::SlotNotDequeued(0))));
    }

    #[test]
    fn test_double_dequeue_and_unknown_index_are_detected() {
        let mut pool = pool_with(1);
        pool.mark_dequeued(0).unwrap();
        assert!(matches!(pool.mark_dequeued(0), Err(CaptureError::SlotAlreadyDequeued(0))));
        assert!(matches!(pool.mark_dequeued(7), Err(CaptureError::UnknownSlot(7))));
    }

    #[test]
    fn test_data_is_limited_to_bytes_used() {
        // Arrange
        let mut pool = pool_with(2);
        pool.mark_dequeued(1).unwrap();
        let handle = BufferHandle::new(1, 5, pool.generation());

        // Act
        let data = pool.data(&handle).unwrap();

        // Assert
        assert_eq!(data, &[1u8; 5]);
    }

    #[test]
    fn test_handles_from_before_clear_are_stale() {
        // Arrange
        let mut pool = pool_with(1);
        pool.mark_dequeued(0).unwrap();
        let handle = BufferHandle::new(0, 8, pool.generation());

        // Act
        pool.clear();
        pool.push(Box::new(vec![0u8; 8]));

        // Assert
        assert!(matches!(pool.data(&handle), Err(CaptureError::StaleHandle)));
    }
}
