//! Audio output using cpal
//!
//! Implements the queued-buffer device API on top of a cpal output stream.
//!
//! ```text
//! stream thread                         cpal callback (real-time)
//! buffer_data() -> slot store
//! queue_buffer() --- queued ring ---->  Playhead plays buffers in order
//! unqueue_buffers() <-- done ring ----  finished buffers handed back
//! ```
//!
//! The cpal `Stream` is not `Send`, so it lives on a keeper thread for the
//! lifetime of the device; play/stop/gain reach the callback through atomics.
//! A callback that runs out of queued buffers leaves the playing state, which
//! the stream loop observes as an underrun.

use crate::audio::device::{
    AudioHost, BufferId, DeviceError, DeviceResult, PlaybackDevice, SourceState,
};
use crate::audio::resampler::StreamResampler;
use crate::audio::types::{OutputFormat, Payload, STEREO_CHANNELS, SURROUND_CHANNELS};
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig};
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Capacity of the queues between the stream thread and the callback
const QUEUE_CAPACITY: usize = 64;

/// Host backed by the platform's default cpal host
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalHost;

impl CpalHost {
    pub fn new() -> Self {
        Self
    }

    /// List available audio output devices.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::DeviceOpen {
                device: "<enumeration>".to_string(),
                reason: format!("Failed to enumerate devices: {}", e),
            })?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }
}

impl AudioHost for CpalHost {
    fn default_device_name(&self) -> Option<String> {
        cpal::default_host()
            .default_output_device()
            .and_then(|device| device.name().ok())
    }

    fn open(&self, device: &str, sample_rate: u32) -> Result<Arc<dyn PlaybackDevice>> {
        let device = CpalDevice::open(device, sample_rate)?;
        Ok(Arc::new(device))
    }
}

/// Negotiated stream parameters
#[derive(Debug, Clone)]
struct StreamInfo {
    renderer: String,
    channels: usize,
    sample_rate: u32,
    float32: bool,
}

/// State shared with the real-time callback
struct Shared {
    playing: AtomicBool,
    started: AtomicBool,
    flush: AtomicBool,
    gain_bits: AtomicU32,
    underruns: AtomicU64,
}

/// A buffer handed to the callback
struct QueuedBuffer {
    id: BufferId,
    samples: Vec<f32>,
}

enum Slot {
    /// Owned by the device side, holding the last data written
    Idle(Vec<f32>),
    /// Travelling through the callback queues
    Queued,
}

struct Queues {
    slots: HashMap<BufferId, Slot>,
    next_id: BufferId,
    to_callback: HeapProd<QueuedBuffer>,
    from_callback: HeapCons<QueuedBuffer>,
}

struct Keeper {
    shutdown: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Output device driving a cpal stream from queued buffers
pub struct CpalDevice {
    info: StreamInfo,
    shared: Arc<Shared>,
    queues: Mutex<Queues>,
    resampler: Mutex<Option<StreamResampler>>,
    keeper: Mutex<Option<Keeper>>,
}

impl CpalDevice {
    /// Open `device_name` and start a stream at `sample_rate` (or the device default).
    ///
    /// # Errors
    /// - [`Error::DeviceOpen`] when the device is missing or has no usable config
    /// - [`Error::ContextCreation`] when the output stream cannot be built or started
    pub fn open(device_name: &str, sample_rate: u32) -> Result<Self> {
        let shared = Arc::new(Shared {
            playing: AtomicBool::new(false),
            started: AtomicBool::new(false),
            flush: AtomicBool::new(false),
            gain_bits: AtomicU32::new(1.0f32.to_bits()),
            underruns: AtomicU64::new(0),
        });

        let (to_callback, queued) = HeapRb::<QueuedBuffer>::new(QUEUE_CAPACITY).split();
        let (done, from_callback) = HeapRb::<QueuedBuffer>::new(QUEUE_CAPACITY).split();

        let playhead = Playhead {
            queued,
            done,
            current: None,
            position: 0,
            shared: Arc::clone(&shared),
        };

        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<StreamInfo>>(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let name = device_name.to_string();

        // The stream must be created and dropped on the same thread
        let handle = std::thread::Builder::new()
            .name("cpal-output".to_string())
            .spawn(move || {
                let stream = match build_stream(&name, sample_rate, playhead) {
                    Ok((stream, info)) => {
                        let _ = ready_tx.send(Ok(info));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Park until the device is closed (message or sender dropped)
                let _ = shutdown_rx.recv();
                if let Err(e) = stream.pause() {
                    warn!("Failed to pause output stream: {}", e);
                }
                drop(stream);
                debug!("Output stream released");
            })?;

        let info = match ready_rx.recv() {
            Ok(Ok(info)) => info,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(Error::ContextCreation {
                    device: device_name.to_string(),
                    reason: "output thread exited during setup".to_string(),
                });
            }
        };

        info!(
            "Opened output device: {} ({} channels @ {}Hz, float32={})",
            info.renderer, info.channels, info.sample_rate, info.float32
        );

        Ok(Self {
            info,
            shared,
            queues: Mutex::new(Queues {
                slots: HashMap::new(),
                next_id: 1,
                to_callback,
                from_callback,
            }),
            resampler: Mutex::new(None),
            keeper: Mutex::new(Some(Keeper {
                shutdown: shutdown_tx,
                handle,
            })),
        })
    }

    fn queues(&self) -> MutexGuard<'_, Queues> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Convert normalized `samples` at `sample_rate` to the device stream rate
    fn to_device_rate(
        &self,
        samples: Vec<f32>,
        sample_rate: u32,
        channels: usize,
    ) -> DeviceResult<Vec<f32>> {
        if sample_rate == self.info.sample_rate {
            return Ok(samples);
        }

        let mut cached = self.resampler.lock().unwrap_or_else(PoisonError::into_inner);
        if !cached.as_ref().is_some_and(|r| r.matches(sample_rate, channels)) {
            *cached = Some(StreamResampler::new(sample_rate, self.info.sample_rate, channels)?);
        }
        match cached.as_mut() {
            Some(resampler) => resampler.process(&samples),
            None => Ok(samples),
        }
    }
}

/// Reject payload formats the device stream cannot play
fn check_format(info: &StreamInfo, format: OutputFormat) -> DeviceResult<()> {
    if format.is_float() && !info.float32 {
        return Err(DeviceError::FormatUnsupported);
    }
    if format.is_surround() && info.channels < SURROUND_CHANNELS {
        return Err(DeviceError::FormatUnsupported);
    }
    Ok(())
}

/// Spread interleaved `samples` of `channels` width over `device_channels`.
///
/// Missing device channels are silent; extra source channels are dropped.
fn spread_channels(samples: &[f32], channels: usize, device_channels: usize, out: &mut Vec<f32>) {
    out.clear();
    out.reserve(samples.len() / channels * device_channels);
    for frame in samples.chunks_exact(channels) {
        for ch in 0..device_channels {
            out.push(frame.get(ch).copied().unwrap_or(0.0));
        }
    }
}

impl PlaybackDevice for CpalDevice {
    fn renderer(&self) -> String {
        self.info.renderer.clone()
    }

    fn generate_buffers(&self, count: usize) -> DeviceResult<Vec<BufferId>> {
        let mut queues = self.queues();
        if queues.slots.len() + count > QUEUE_CAPACITY {
            return Err(DeviceError::OutOfMemory);
        }
        let ids: Vec<BufferId> = (0..count)
            .map(|i| queues.next_id + i as BufferId)
            .collect();
        queues.next_id += count as BufferId;
        for &id in &ids {
            queues.slots.insert(id, Slot::Idle(Vec::new()));
        }
        Ok(ids)
    }

    fn delete_buffers(&self, ids: &[BufferId]) -> DeviceResult<()> {
        let mut queues = self.queues();
        for id in ids {
            match queues.slots.get(id) {
                None => return Err(DeviceError::InvalidName),
                Some(Slot::Queued) => return Err(DeviceError::InvalidOperation),
                Some(Slot::Idle(_)) => {}
            }
        }
        for id in ids {
            queues.slots.remove(id);
        }
        Ok(())
    }

    fn buffer_data(
        &self,
        id: BufferId,
        payload: Payload<'_>,
        sample_rate: u32,
    ) -> DeviceResult<()> {
        let format = payload.format();
        check_format(&self.info, format)?;

        let mut normalized = Vec::with_capacity(payload.len());
        payload.extend_normalized(&mut normalized);
        let samples = self.to_device_rate(normalized, sample_rate, format.channels())?;

        let mut queues = self.queues();
        match queues.slots.get_mut(&id) {
            None => Err(DeviceError::InvalidName),
            Some(Slot::Queued) => Err(DeviceError::InvalidOperation),
            Some(Slot::Idle(buffer)) => {
                spread_channels(&samples, format.channels(), self.info.channels, buffer);
                Ok(())
            }
        }
    }

    fn queue_buffer(&self, id: BufferId) -> DeviceResult<()> {
        let mut queues = self.queues();
        let samples = match queues.slots.get_mut(&id) {
            None => return Err(DeviceError::InvalidName),
            Some(Slot::Queued) => return Err(DeviceError::InvalidOperation),
            Some(slot) => match std::mem::replace(slot, Slot::Queued) {
                Slot::Idle(samples) => samples,
                Slot::Queued => Vec::new(),
            },
        };

        if let Err(rejected) = queues.to_callback.try_push(QueuedBuffer { id, samples }) {
            queues.slots.insert(id, Slot::Idle(rejected.samples));
            return Err(DeviceError::InvalidOperation);
        }
        Ok(())
    }

    fn processed_buffers(&self) -> DeviceResult<usize> {
        Ok(self.queues().from_callback.occupied_len())
    }

    fn unqueue_buffers(&self, count: usize) -> DeviceResult<Vec<BufferId>> {
        let mut queues = self.queues();
        let mut ids = Vec::with_capacity(count);
        while ids.len() < count {
            let Some(finished) = queues.from_callback.try_pop() else {
                break;
            };
            if let Some(slot) = queues.slots.get_mut(&finished.id) {
                *slot = Slot::Idle(finished.samples);
                ids.push(finished.id);
            }
        }
        if ids.len() < count {
            return Err(DeviceError::InvalidValue);
        }
        Ok(ids)
    }

    fn source_state(&self) -> SourceState {
        if self.shared.playing.load(Ordering::Acquire) {
            SourceState::Playing
        } else if self.shared.started.load(Ordering::Acquire) {
            SourceState::Stopped
        } else {
            SourceState::Initial
        }
    }

    fn play(&self) -> DeviceResult<()> {
        self.shared.started.store(true, Ordering::Release);
        self.shared.playing.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&self) -> DeviceResult<()> {
        self.shared.playing.store(false, Ordering::Release);
        self.shared.flush.store(true, Ordering::Release);
        Ok(())
    }

    fn detach_buffers(&self) -> DeviceResult<()> {
        self.shared.flush.store(true, Ordering::Release);
        let mut queues = self.queues();
        while let Some(finished) = queues.from_callback.try_pop() {
            if let Some(slot) = queues.slots.get_mut(&finished.id) {
                *slot = Slot::Idle(finished.samples);
            }
        }
        // Buffers still inside the callback queue are abandoned with the stream
        for slot in queues.slots.values_mut() {
            if matches!(slot, Slot::Queued) {
                *slot = Slot::Idle(Vec::new());
            }
        }
        Ok(())
    }

    fn set_gain(&self, gain: f32) {
        let gain = gain.max(0.0);
        self.shared.gain_bits.store(gain.to_bits(), Ordering::Relaxed);
        debug!("Output gain set to {:.2}", gain);
    }

    fn close(&self) {
        let keeper = self
            .keeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(keeper) = keeper {
            self.shared.playing.store(false, Ordering::Release);
            let _ = keeper.shutdown.send(());
            if keeper.handle.join().is_err() {
                error!("Output thread panicked during shutdown");
            }
            info!(
                "Closed output device: {} ({} underruns)",
                self.info.renderer,
                self.shared.underruns.load(Ordering::Relaxed)
            );
        }
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.close();
    }
}

/// Plays queued buffers from inside the cpal callback
struct Playhead {
    queued: HeapCons<QueuedBuffer>,
    done: HeapProd<QueuedBuffer>,
    current: Option<QueuedBuffer>,
    position: usize,
    shared: Arc<Shared>,
}

impl Playhead {
    /// Fill one device callback buffer. Real-time safe: no locks, no allocation.
    fn render<T>(&mut self, data: &mut [T])
    where
        T: Sample + FromSample<f32>,
    {
        if self.shared.flush.swap(false, Ordering::AcqRel) {
            self.retire_all();
        }

        if !self.shared.playing.load(Ordering::Acquire) {
            data.fill(T::EQUILIBRIUM);
            return;
        }

        let gain = f32::from_bits(self.shared.gain_bits.load(Ordering::Relaxed));
        let mut starved = false;
        for out in data.iter_mut() {
            match self.next_sample() {
                Some(sample) => *out = T::from_sample((sample * gain).clamp(-1.0, 1.0)),
                None => {
                    starved = true;
                    *out = T::EQUILIBRIUM;
                }
            }
        }

        if starved {
            self.shared.playing.store(false, Ordering::Release);
            self.shared.underruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn next_sample(&mut self) -> Option<f32> {
        loop {
            if let Some(buffer) = &self.current {
                if let Some(&sample) = buffer.samples.get(self.position) {
                    self.position += 1;
                    return Some(sample);
                }
            }
            if let Some(finished) = self.current.take() {
                let _ = self.done.try_push(finished);
            }
            let next = self.queued.try_pop()?;
            self.current = Some(next);
            self.position = 0;
        }
    }

    fn retire_all(&mut self) {
        if let Some(finished) = self.current.take() {
            let _ = self.done.try_push(finished);
        }
        while let Some(pending) = self.queued.try_pop() {
            let _ = self.done.try_push(pending);
        }
        self.position = 0;
    }
}

fn find_device(host: &cpal::Host, name: &str) -> Result<cpal::Device> {
    let mut devices = host.output_devices().map_err(|e| Error::DeviceOpen {
        device: name.to_string(),
        reason: format!("Failed to enumerate devices: {}", e),
    })?;
    devices
        .find(|d| d.name().ok().as_deref() == Some(name))
        .ok_or_else(|| Error::DeviceOpen {
            device: name.to_string(),
            reason: "device not found".to_string(),
        })
}

/// Pick the best stream configuration for `sample_rate`.
///
/// Prefers 5.1 over stereo and f32 over i16 at the requested rate, falling back
/// to the device default config.
fn best_config(
    device: &cpal::Device,
    name: &str,
    sample_rate: u32,
) -> Result<(StreamConfig, SampleFormat, bool)> {
    let open_error = |reason: String| Error::DeviceOpen {
        device: name.to_string(),
        reason,
    };

    let ranges: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| open_error(format!("Failed to get device configs: {}", e)))?
        .collect();

    let float32 = ranges.iter().any(|r| r.sample_format() == SampleFormat::F32);

    let preferences = [
        (SURROUND_CHANNELS, SampleFormat::F32),
        (SURROUND_CHANNELS, SampleFormat::I16),
        (STEREO_CHANNELS, SampleFormat::F32),
        (STEREO_CHANNELS, SampleFormat::I16),
    ];
    for (channels, format) in preferences {
        let found = ranges.iter().find(|r| {
            r.channels() as usize == channels
                && r.sample_format() == format
                && r.min_sample_rate().0 <= sample_rate
                && r.max_sample_rate().0 >= sample_rate
        });
        if let Some(range) = found {
            let config = range
                .clone()
                .with_sample_rate(cpal::SampleRate(sample_rate))
                .config();
            return Ok((config, format, float32));
        }
    }

    let default = device
        .default_output_config()
        .map_err(|e| open_error(format!("Failed to get default config: {}", e)))?;
    warn!(
        "No {}Hz stereo/5.1 config on {}, using device default ({}Hz, {} channels)",
        sample_rate,
        name,
        default.sample_rate().0,
        default.channels()
    );
    let format = default.sample_format();
    Ok((default.config(), format, float32))
}

fn build_stream(
    name: &str,
    sample_rate: u32,
    playhead: Playhead,
) -> Result<(cpal::Stream, StreamInfo)> {
    let host = cpal::default_host();
    let device = find_device(&host, name)?;
    let (config, format, float32) = best_config(&device, name, sample_rate)?;

    let context_error = |reason: String| Error::ContextCreation {
        device: name.to_string(),
        reason,
    };

    let stream = match format {
        SampleFormat::F32 => build_typed_stream::<f32>(&device, &config, playhead),
        SampleFormat::I16 => build_typed_stream::<i16>(&device, &config, playhead),
        SampleFormat::U16 => build_typed_stream::<u16>(&device, &config, playhead),
        other => return Err(context_error(format!("Unsupported sample format: {:?}", other))),
    }
    .map_err(|e| context_error(format!("Failed to build stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| context_error(format!("Failed to start stream: {}", e)))?;

    let info = StreamInfo {
        renderer: format!("{} / {}", host.id().name(), name),
        channels: config.channels as usize,
        sample_rate: config.sample_rate.0,
        float32,
    };
    Ok((stream, info))
}

fn build_typed_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut playhead: Playhead,
) -> std::result::Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| playhead.render(data),
        move |err| error!("Audio stream error: {}", err),
        None,
    )
}
