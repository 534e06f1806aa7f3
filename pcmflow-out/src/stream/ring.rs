//! Device buffer ring
//!
//! Owns the session's device buffers and fills them in order. Buffers come
//! back from the device in the order they were queued, so the cursor always
//! lands on a free buffer once `queued < capacity`.

use crate::audio::device::{
    log_device_error, BufferId, DeviceResult, PlaybackDevice, SourceState,
};
use crate::audio::types::Payload;
use std::sync::Arc;
use tracing::{debug, trace};

/// Largest ring a session may allocate
pub const MAX_BUFFERS: usize = 32;

/// Ring size for a latency setting: two buffers plus `latency`, at most [`MAX_BUFFERS`]
pub fn buffer_count(latency: u32) -> usize {
    (latency as usize).saturating_add(2).min(MAX_BUFFERS)
}

pub struct BufferRing {
    device: Arc<dyn PlaybackDevice>,
    buffers: Vec<BufferId>,
    cursor: usize,
    queued: usize,
}

impl BufferRing {
    /// Allocate `count` device buffers (at least two)
    pub fn new(device: Arc<dyn PlaybackDevice>, count: usize) -> DeviceResult<Self> {
        let count = count.clamp(2, MAX_BUFFERS);
        let buffers = device.generate_buffers(count)?;
        debug!("Allocated {} device buffers", buffers.len());
        Ok(Self {
            device,
            buffers,
            cursor: 0,
            queued: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.buffers.len()
    }

    /// Index of the next buffer to fill
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Buffers submitted and not yet reclaimed
    pub fn queued(&self) -> usize {
        self.queued
    }

    pub fn buffer_ids(&self) -> &[BufferId] {
        &self.buffers
    }

    /// Unqueue every buffer the device has finished playing
    pub fn reclaim_processed(&mut self) -> usize {
        let processed = match self.device.processed_buffers() {
            Ok(n) => n,
            Err(e) => {
                log_device_error("querying processed buffers", &e);
                return 0;
            }
        };
        if processed == 0 {
            return 0;
        }

        match self.device.unqueue_buffers(processed) {
            Ok(ids) => {
                self.queued = self.queued.saturating_sub(ids.len());
                trace!("Reclaimed {} buffers, {} still queued", ids.len(), self.queued);
                ids.len()
            }
            Err(e) => {
                log_device_error("unqueuing buffers", &e);
                0
            }
        }
    }

    pub fn has_free_slot(&self) -> bool {
        self.queued < self.buffers.len()
    }

    /// Write `payload` into the buffer under the cursor
    pub fn fill(&mut self, payload: Payload<'_>, sample_rate: u32) -> DeviceResult<()> {
        let id = self.buffers[self.cursor];
        self.device.buffer_data(id, payload, sample_rate)
    }

    /// Queue the buffer under the cursor for playback
    pub fn submit(&mut self) -> DeviceResult<()> {
        self.device.queue_buffer(self.buffers[self.cursor])?;
        self.queued += 1;
        Ok(())
    }

    pub fn advance_cursor(&mut self) {
        self.cursor = (self.cursor + 1) % self.buffers.len();
    }

    /// Resume playback if the source stopped, returning true when it was resumed
    pub fn ensure_playing(&self) -> DeviceResult<bool> {
        if self.device.source_state() == SourceState::Playing {
            return Ok(false);
        }
        self.device.play()?;
        debug!("Playback stopped (underrun), resumed");
        Ok(true)
    }

    /// Stop the source, detach and delete all buffers
    pub fn release(&mut self) {
        if let Err(e) = self.device.stop() {
            log_device_error("stopping source", &e);
        }
        if let Err(e) = self.device.detach_buffers() {
            log_device_error("detaching buffers", &e);
        }
        if !self.buffers.is_empty() {
            if let Err(e) = self.device.delete_buffers(&self.buffers) {
                log_device_error("deleting buffers", &e);
            }
        }
        debug!("Released {} device buffers", self.buffers.len());
        self.buffers.clear();
        self.queued = 0;
        self.cursor = 0;
    }
}
