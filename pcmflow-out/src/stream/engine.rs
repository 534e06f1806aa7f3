//! Stream lifecycle and control surface
//!
//! [`AudioStream`] opens the device, builds a session and runs it on the
//! `audio-stream` thread. Control calls (volume, mute, data notifications)
//! may come from any thread.
//!
//! **Shutdown:** `stop()` clears the run flag, wakes the thread and joins
//! it. The session comes back from the thread and its buffers are released
//! here, then the device is closed.

use crate::audio::device::{log_device_error, AudioHost, BufferId, PlaybackDevice};
use crate::dsp::{Dpl2Decoder, SurroundDecoder, TimeStretch, Wsola, WsolaConfig};
use crate::error::{Error, Result};
use crate::stream::capability::CapabilityNegotiator;
use crate::stream::ring::{buffer_count, BufferRing};
use crate::stream::session::{StreamControl, StreamSession};
use crate::stream::source::{AudioClock, Mixer, SampleSource};
use crate::stream::surround::SurroundStage;
use crate::stream::tempo::TempoSync;
use pcmflow_common::config::MAX_VOLUME_PERCENT;
use pcmflow_common::AudioSettings;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use tracing::{error, info, warn};

/// Builds the tempo stretch engine for a new session
pub type StretchFactory = Box<dyn Fn() -> Box<dyn TimeStretch> + Send + Sync>;

/// Builds the surround decoder for a new session at the given sample rate
pub type DecoderFactory = Box<dyn Fn(u32) -> Box<dyn SurroundDecoder> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Running,
    Stopping,
}

/// Cloneable handle for producers to signal new samples
#[derive(Clone)]
pub struct StreamNotifier {
    control: Arc<StreamControl>,
}

impl StreamNotifier {
    pub fn notify(&self) {
        self.control.wake();
    }
}

struct ActiveStream {
    device: Arc<dyn PlaybackDevice>,
    buffers: Vec<BufferId>,
    thread: JoinHandle<StreamSession>,
}

pub struct AudioStream {
    host: Arc<dyn AudioHost>,
    mixer: Arc<dyn Mixer>,
    clock: Arc<dyn AudioClock>,
    settings: AudioSettings,
    stretch_factory: StretchFactory,
    decoder_factory: DecoderFactory,
    control: Arc<StreamControl>,
    volume: AtomicU8,
    state: Mutex<StreamState>,
    active: Mutex<Option<ActiveStream>>,
}

impl AudioStream {
    /// Create an idle stream using the WSOLA stretcher and the DPL2 decoder
    pub fn new(
        host: Arc<dyn AudioHost>,
        mixer: Arc<dyn Mixer>,
        clock: Arc<dyn AudioClock>,
        settings: AudioSettings,
    ) -> Self {
        let volume = settings.volume.min(MAX_VOLUME_PERCENT);
        Self {
            host,
            mixer,
            clock,
            settings,
            stretch_factory: Box::new(|| {
                Box::new(Wsola::new(WsolaConfig::default(), 2, 48000)) as Box<dyn TimeStretch>
            }),
            decoder_factory: Box::new(|rate| {
                Box::new(Dpl2Decoder::new(rate)) as Box<dyn SurroundDecoder>
            }),
            control: Arc::new(StreamControl::new()),
            volume: AtomicU8::new(volume),
            state: Mutex::new(StreamState::Idle),
            active: Mutex::new(None),
        }
    }

    /// Replace the tempo stretch engine used by future sessions
    pub fn with_stretch(mut self, factory: StretchFactory) -> Self {
        self.stretch_factory = factory;
        self
    }

    /// Replace the surround decoder used by future sessions
    pub fn with_decoder(mut self, factory: DecoderFactory) -> Self {
        self.decoder_factory = factory;
        self
    }

    pub fn notifier(&self) -> StreamNotifier {
        StreamNotifier {
            control: Arc::clone(&self.control),
        }
    }

    pub fn state(&self) -> StreamState {
        *self.state_guard()
    }

    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::Relaxed)
    }

    pub fn is_muted(&self) -> bool {
        self.control.is_muted()
    }

    fn state_guard(&self) -> MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn active_guard(&self) -> MutexGuard<'_, Option<ActiveStream>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gain(&self) -> f32 {
        self.volume() as f32 / 100.0
    }

    /// Open the output device and start the stream thread.
    ///
    /// # Errors
    /// - [`Error::AlreadyRunning`] if a session is active
    /// - [`Error::NoDevice`] when no device is configured and none is available
    /// - [`Error::DeviceOpen`] / [`Error::ContextCreation`] from the host
    /// - [`Error::BufferAllocation`] when device buffers cannot be created
    /// - [`Error::ThreadSpawn`] when the stream thread cannot be started
    pub fn start(&self) -> Result<()> {
        let mut active = self.active_guard();
        if active.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let device_name = match &self.settings.device {
            Some(name) => name.clone(),
            None => self.host.default_device_name().ok_or_else(|| {
                error!("No sound devices found");
                Error::NoDevice
            })?,
        };

        let sample_rate = self.mixer.sample_rate();
        let device = self.host.open(&device_name, sample_rate).map_err(|e| {
            error!("{}", e);
            e
        })?;

        let count = buffer_count(self.settings.latency);
        let ring = match BufferRing::new(Arc::clone(&device), count) {
            Ok(ring) => ring,
            Err(e) => {
                log_device_error("generating buffers", &e);
                device.close();
                return Err(Error::BufferAllocation(e));
            }
        };
        device.set_gain(self.gain());

        let capabilities =
            CapabilityNegotiator::probe(&device.renderer(), self.settings.dpl2_decoder);
        let source = SampleSource::new(Arc::clone(&self.mixer), Arc::clone(&self.clock));
        let tempo = TempoSync::new((self.stretch_factory)(), sample_rate);
        let surround = SurroundStage::new((self.decoder_factory)(sample_rate));

        self.control.set_running(true);

        let mut session = StreamSession::new(
            ring,
            capabilities,
            source,
            tempo,
            surround,
            Arc::clone(&self.control),
        );
        let buffers = session.buffer_ids().to_vec();

        let spawned = std::thread::Builder::new()
            .name("audio-stream".to_string())
            .spawn(move || {
                session.run();
                session
            });

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                error!("Failed to spawn audio stream thread: {}", e);
                self.control.set_running(false);
                release_buffers(device.as_ref(), &buffers);
                device.close();
                return Err(Error::ThreadSpawn(e));
            }
        };

        info!(
            "Audio stream started on {} ({} buffers, {}Hz)",
            device_name,
            buffers.len(),
            sample_rate
        );
        *active = Some(ActiveStream {
            device,
            buffers,
            thread,
        });
        *self.state_guard() = StreamState::Running;
        Ok(())
    }

    /// Stop the stream thread and release the device. Does nothing when idle.
    pub fn stop(&self) {
        let mut active = self.active_guard();
        let Some(stream) = active.take() else {
            return;
        };
        *self.state_guard() = StreamState::Stopping;

        self.control.set_running(false);
        self.control.wake();

        match stream.thread.join() {
            Ok(mut session) => session.release(),
            Err(_) => {
                error!("Audio stream thread panicked");
                release_buffers(stream.device.as_ref(), &stream.buffers);
            }
        }
        stream.device.close();

        *self.state_guard() = StreamState::Idle;
        info!("Audio stream stopped");
    }

    /// Set volume in percent; values above 100 are clamped
    pub fn set_volume(&self, percent: u8) {
        if percent > MAX_VOLUME_PERCENT {
            warn!("Volume {} above {}, clamping", percent, MAX_VOLUME_PERCENT);
        }
        self.volume
            .store(percent.min(MAX_VOLUME_PERCENT), Ordering::Relaxed);
        if let Some(stream) = self.active_guard().as_ref() {
            stream.device.set_gain(self.gain());
        }
    }

    /// Wake the stream thread; producers call this when new samples are ready
    pub fn notify_new_data_available(&self) {
        self.control.wake();
    }

    /// Mute stops playback and flushes tempo history; unmute resumes at once
    pub fn set_muted(&self, muted: bool) {
        let active = self.active_guard();
        {
            let _playback = self.control.playback_guard();
            self.control.set_muted(muted);
            let Some(stream) = active.as_ref() else {
                return;
            };

            if muted {
                self.control.request_tempo_flush();
                if let Err(e) = stream.device.stop() {
                    log_device_error("stopping source", &e);
                }
            } else if let Err(e) = stream.device.play() {
                log_device_error("starting playback", &e);
            }
        }
        self.control.wake();
        info!("Audio {}", if muted { "muted" } else { "unmuted" });
    }
}

impl Drop for AudioStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Teardown used when the session is not available to release its own ring
fn release_buffers(device: &dyn PlaybackDevice, buffers: &[BufferId]) {
    if let Err(e) = device.stop() {
        log_device_error("stopping source", &e);
    }
    if let Err(e) = device.detach_buffers() {
        log_device_error("detaching buffers", &e);
    }
    if let Err(e) = device.delete_buffers(buffers) {
        log_device_error("deleting buffers", &e);
    }
}
