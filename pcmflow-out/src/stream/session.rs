//! Streaming session and the per-cycle algorithm
//!
//! A session holds everything that lives from start to stop: the device
//! buffer ring, the negotiated capabilities, and the processing stages.
//! The stream thread owns it exclusively and hands it back when it exits.
//!
//! One cycle:
//!
//! ```text
//! reclaim processed -> no free slot? -> Starved (caller waits)
//!       |
//! pull -> tempo ingest -> drain -> below threshold? -> Skipped
//!       |
//! encode (format from capabilities) -> fill -> rejected? -> downgrade, Rejected
//!       |
//! submit -> advance cursor -> resume if stopped -> Queued
//! ```

use crate::audio::device::{log_device_error, BufferId};
use crate::audio::types::{f32_to_i16, OutputFormat, Payload, STEREO_CHANNELS};
use crate::stream::capability::{CapabilityFlags, CapabilityNegotiator};
use crate::stream::ring::BufferRing;
use crate::stream::source::{SampleSource, MAX_FRAMES_PER_CYCLE};
use crate::stream::surround::SurroundStage;
use crate::stream::tempo::TempoSync;
use crate::stream::wake::WakeSignal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// Flags shared between the stream thread and its controller
#[derive(Debug, Default)]
pub struct StreamControl {
    running: AtomicBool,
    muted: AtomicBool,
    flush_tempo: AtomicBool,
    playback: Mutex<()>,
    wake: WakeSignal,
}

impl StreamControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Acquire)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Release);
    }

    /// Serializes a mute change and its stop/play call against the stream
    /// thread's muted check and underrun resume
    pub fn playback_guard(&self) -> MutexGuard<'_, ()> {
        self.playback.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask the stream thread to drop its stretch history on the next cycle
    pub fn request_tempo_flush(&self) {
        self.flush_tempo.store(true, Ordering::Release);
    }

    fn take_tempo_flush(&self) -> bool {
        self.flush_tempo.swap(false, Ordering::AcqRel)
    }

    pub fn wake(&self) {
        self.wake.set();
    }

    pub fn wait(&self) {
        self.wake.wait();
    }
}

/// What one cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every buffer is queued and none has finished
    Starved,
    /// Too few frames drained for the active mode; nothing submitted
    Skipped { frames: usize },
    /// A buffer was filled and queued
    Queued {
        slot: usize,
        format: OutputFormat,
        frames: usize,
        /// Playback had stopped and was restarted
        resumed: bool,
    },
    /// The device rejected the format; samples dropped
    Rejected { format: OutputFormat },
    /// A device call failed; samples dropped
    DeviceError,
}

pub struct StreamSession {
    ring: BufferRing,
    capabilities: CapabilityNegotiator,
    source: SampleSource,
    tempo: TempoSync,
    surround: SurroundStage,
    control: Arc<StreamControl>,
    sample_rate: u32,
    drained: Vec<f32>,
    encoded: Vec<i16>,
}

impl StreamSession {
    pub fn new(
        ring: BufferRing,
        capabilities: CapabilityNegotiator,
        source: SampleSource,
        tempo: TempoSync,
        surround: SurroundStage,
        control: Arc<StreamControl>,
    ) -> Self {
        let sample_rate = source.mixer().sample_rate();
        let drain_frames = MAX_FRAMES_PER_CYCLE * ring.capacity();
        Self {
            ring,
            capabilities,
            source,
            tempo,
            surround,
            control,
            sample_rate,
            drained: vec![0.0; drain_frames * STEREO_CHANNELS],
            encoded: Vec::new(),
        }
    }

    pub fn capabilities(&self) -> CapabilityFlags {
        self.capabilities.flags()
    }

    pub fn ring(&self) -> &BufferRing {
        &self.ring
    }

    pub fn buffer_ids(&self) -> &[BufferId] {
        self.ring.buffer_ids()
    }

    /// Run cycles until the run flag is cleared
    pub fn run(&mut self) {
        while self.control.is_running() {
            if self.run_cycle() == CycleOutcome::Starved {
                self.control.wait();
            }
        }
        trace!("Stream loop exiting");
    }

    pub fn run_cycle(&mut self) -> CycleOutcome {
        self.ring.reclaim_processed();
        if !self.ring.has_free_slot() {
            return CycleOutcome::Starved;
        }

        if self.control.take_tempo_flush() {
            self.tempo.flush();
        }

        self.source.pull(MAX_FRAMES_PER_CYCLE);
        let speed = TempoSync::resolve_speed(self.source.mixer());
        self.tempo.ingest(self.source.samples(), speed);
        let frames = self.tempo.drain(&mut self.drained);

        let minimum = if self.capabilities.flags().surround {
            self.surround.min_window()
        } else {
            0
        };
        if frames <= minimum {
            trace!("Drained {} frames (minimum {}), skipping", frames, minimum);
            return CycleOutcome::Skipped { frames };
        }

        let format = self.capabilities.select_format();
        let stereo = &self.drained[..frames * STEREO_CHANNELS];
        let rate = self.sample_rate;
        let filled = match format {
            OutputFormat::SurroundF32 => {
                let surround = self.surround.decode(stereo);
                self.ring.fill(Payload::SurroundF32(surround), rate)
            }
            OutputFormat::SurroundI16 => {
                let surround = self.surround.decode(stereo);
                f32_to_i16(surround, &mut self.encoded);
                self.ring.fill(Payload::SurroundI16(&self.encoded), rate)
            }
            OutputFormat::StereoF32 => self.ring.fill(Payload::StereoF32(stereo), rate),
            OutputFormat::StereoI16 => {
                f32_to_i16(stereo, &mut self.encoded);
                self.ring.fill(Payload::StereoI16(&self.encoded), rate)
            }
        };

        if let Err(e) = filled {
            if e.is_format_unsupported() {
                self.capabilities.downgrade(format);
                return CycleOutcome::Rejected { format };
            }
            log_device_error("filling buffer", &e);
            return CycleOutcome::DeviceError;
        }

        if let Err(e) = self.ring.submit() {
            log_device_error("queuing buffer", &e);
            return CycleOutcome::DeviceError;
        }

        let slot = self.ring.cursor();
        self.ring.advance_cursor();

        let resumed = {
            let _playback = self.control.playback_guard();
            if self.control.is_muted() {
                false
            } else {
                self.ring.ensure_playing().unwrap_or_else(|e| {
                    log_device_error("starting playback", &e);
                    false
                })
            }
        };

        trace!("Queued {} frames as {} in slot {}", frames, format, slot);
        CycleOutcome::Queued {
            slot,
            format,
            frames,
            resumed,
        }
    }

    /// Stop the source and release every device buffer
    pub fn release(&mut self) {
        self.ring.release();
    }
}
