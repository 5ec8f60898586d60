//! Per-tick command buffering.
//!
//! Each work-group invocation owns a [`CommandBuffer`] exclusively while it
//! runs. The integer-watermark snapshot/restore pair is what makes the
//! scheduler's retry policy cheap: rewinding a failed system is a truncate,
//! not a replay.

use std::sync::{Mutex, PoisonError};

use crate::engine::commands::Command;

/// FIFO buffer of deferred commands accumulated during a tick.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Appends a command.
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Returns the current length as a watermark for [`CommandBuffer::restore`].
    pub fn snapshot(&self) -> usize {
        self.commands.len()
    }

    /// Truncates the buffer back to `watermark`; watermarks beyond the
    /// current length are a no-op.
    pub fn restore(&mut self, watermark: usize) {
        self.commands.truncate(watermark);
    }

    /// Returns the buffered commands in push order and resets the buffer.
    pub fn drain(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }
}

/// Reuses command buffers across ticks and async jobs to bound allocation.
#[derive(Debug, Default)]
pub struct CommandBufferPool {
    free: Mutex<Vec<CommandBuffer>>,
}

impl CommandBufferPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a buffer from the pool, or allocates a fresh one.
    pub fn acquire(&self) -> CommandBuffer {
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        free.pop().unwrap_or_default()
    }

    /// Returns a buffer to the pool, dropping any leftover commands.
    pub fn release(&self, mut buffer: CommandBuffer) {
        buffer.commands.clear();
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        free.push(buffer);
    }
}
