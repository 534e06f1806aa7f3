//! Scripted playback device and host
//!
//! Records every call, rejects configured formats, and only marks buffers
//! processed when the test says so. When every queued buffer is processed
//! while playing, the source drops to `Stopped` like a real device underrun.
//! A one-shot hook can run inside the next state query to interleave a
//! control call with the stream thread.

use pcmflow_out::audio::{
    AudioHost, BufferId, DeviceError, DeviceResult, OutputFormat, Payload, PlaybackDevice,
    SourceState,
};
use pcmflow_out::{Error, Result};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// Observable device state
#[derive(Debug)]
pub struct DeviceLog {
    pub renderer: String,
    pub next_id: BufferId,
    pub allocated: Vec<BufferId>,
    pub queue: VecDeque<BufferId>,
    pub processed: usize,
    pub rejected: HashSet<OutputFormat>,
    pub fail_generate: bool,
    /// (buffer, format, frames) for every successful fill
    pub fills: Vec<(BufferId, OutputFormat, usize)>,
    /// Buffers in the order they were queued
    pub submitted: Vec<BufferId>,
    pub last_samples: Vec<f32>,
    pub state: SourceState,
    pub play_calls: usize,
    pub stop_calls: usize,
    pub detach_calls: usize,
    pub delete_calls: usize,
    pub close_calls: usize,
    pub gain: f32,
    pub max_outstanding: usize,
    /// Teardown calls in order
    pub events: Vec<&'static str>,
}

type StateHook = Box<dyn FnOnce() + Send>;

pub struct MockDevice {
    log: Mutex<DeviceLog>,
    state_hook: Mutex<Option<StateHook>>,
}

impl MockDevice {
    pub fn new(renderer: &str) -> Arc<Self> {
        Arc::new(Self {
            log: Mutex::new(DeviceLog {
                renderer: renderer.to_string(),
                next_id: 100,
                allocated: Vec::new(),
                queue: VecDeque::new(),
                processed: 0,
                rejected: HashSet::new(),
                fail_generate: false,
                fills: Vec::new(),
                submitted: Vec::new(),
                last_samples: Vec::new(),
                state: SourceState::Initial,
                play_calls: 0,
                stop_calls: 0,
                detach_calls: 0,
                delete_calls: 0,
                close_calls: 0,
                gain: 1.0,
                max_outstanding: 0,
                events: Vec::new(),
            }),
            state_hook: Mutex::new(None),
        })
    }

    pub fn log(&self) -> MutexGuard<'_, DeviceLog> {
        self.log.lock().unwrap()
    }

    /// Reject every future fill with `format`
    pub fn reject(&self, format: OutputFormat) {
        self.log().rejected.insert(format);
    }

    /// Run `hook` at the start of the next `source_state` call, with no lock held
    pub fn on_next_state_query(&self, hook: impl FnOnce() + Send + 'static) {
        *self.state_hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn fail_buffer_allocation(&self) {
        self.log().fail_generate = true;
    }

    /// Mark the next `count` queued buffers as played
    pub fn complete(&self, count: usize) {
        let mut log = self.log();
        log.processed = (log.processed + count).min(log.queue.len());
        if log.processed == log.queue.len() && log.state == SourceState::Playing {
            log.state = SourceState::Stopped;
        }
    }

    pub fn complete_all(&self) {
        let queued = self.log().queue.len();
        self.complete(queued);
    }

    pub fn outstanding(&self) -> usize {
        self.log().queue.len()
    }
}

impl PlaybackDevice for MockDevice {
    fn renderer(&self) -> String {
        self.log().renderer.clone()
    }

    fn generate_buffers(&self, count: usize) -> DeviceResult<Vec<BufferId>> {
        let mut log = self.log();
        if log.fail_generate {
            return Err(DeviceError::OutOfMemory);
        }
        let start = log.next_id;
        let ids: Vec<BufferId> = (start..start + count as BufferId).collect();
        log.next_id += count as BufferId;
        log.allocated.extend_from_slice(&ids);
        Ok(ids)
    }

    fn delete_buffers(&self, ids: &[BufferId]) -> DeviceResult<()> {
        let mut log = self.log();
        log.delete_calls += 1;
        log.events.push("delete");
        log.allocated.retain(|id| !ids.contains(id));
        Ok(())
    }

    fn buffer_data(
        &self,
        id: BufferId,
        payload: Payload<'_>,
        _sample_rate: u32,
    ) -> DeviceResult<()> {
        let mut log = self.log();
        let format = payload.format();
        if log.rejected.contains(&format) {
            return Err(DeviceError::FormatUnsupported);
        }
        if !log.allocated.contains(&id) {
            return Err(DeviceError::InvalidName);
        }
        log.fills.push((id, format, payload.frames()));
        log.last_samples.clear();
        payload.extend_normalized(&mut log.last_samples);
        Ok(())
    }

    fn queue_buffer(&self, id: BufferId) -> DeviceResult<()> {
        let mut log = self.log();
        log.queue.push_back(id);
        log.submitted.push(id);
        log.max_outstanding = log.max_outstanding.max(log.queue.len());
        Ok(())
    }

    fn processed_buffers(&self) -> DeviceResult<usize> {
        Ok(self.log().processed)
    }

    fn unqueue_buffers(&self, count: usize) -> DeviceResult<Vec<BufferId>> {
        let mut log = self.log();
        if count > log.processed {
            return Err(DeviceError::InvalidValue);
        }
        log.processed -= count;
        Ok(log.queue.drain(..count).collect())
    }

    fn source_state(&self) -> SourceState {
        let hook = self.state_hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        self.log().state
    }

    fn play(&self) -> DeviceResult<()> {
        let mut log = self.log();
        log.play_calls += 1;
        log.state = SourceState::Playing;
        Ok(())
    }

    fn stop(&self) -> DeviceResult<()> {
        let mut log = self.log();
        log.stop_calls += 1;
        log.events.push("stop");
        log.state = SourceState::Stopped;
        log.processed = log.queue.len();
        Ok(())
    }

    fn detach_buffers(&self) -> DeviceResult<()> {
        let mut log = self.log();
        log.detach_calls += 1;
        log.events.push("detach");
        log.queue.clear();
        log.processed = 0;
        Ok(())
    }

    fn set_gain(&self, gain: f32) {
        self.log().gain = gain;
    }

    fn close(&self) {
        let mut log = self.log();
        log.close_calls += 1;
        log.events.push("close");
    }
}

/// How `MockHost::open` behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenBehavior {
    Succeed,
    FailOpen,
    FailContext,
}

pub struct MockHost {
    pub device: Arc<MockDevice>,
    default_name: Option<String>,
    behavior: OpenBehavior,
    opened: Mutex<Vec<(String, u32)>>,
}

impl MockHost {
    pub fn new(device: Arc<MockDevice>) -> Arc<Self> {
        Self::with(device, Some("Mock Output"), OpenBehavior::Succeed)
    }

    pub fn with(
        device: Arc<MockDevice>,
        default_name: Option<&str>,
        behavior: OpenBehavior,
    ) -> Arc<Self> {
        Arc::new(Self {
            device,
            default_name: default_name.map(str::to_string),
            behavior,
            opened: Mutex::new(Vec::new()),
        })
    }

    /// (device name, sample rate) for every open call
    pub fn opened(&self) -> Vec<(String, u32)> {
        self.opened.lock().unwrap().clone()
    }
}

impl AudioHost for MockHost {
    fn default_device_name(&self) -> Option<String> {
        self.default_name.clone()
    }

    fn open(&self, device: &str, sample_rate: u32) -> Result<Arc<dyn PlaybackDevice>> {
        self.opened
            .lock()
            .unwrap()
            .push((device.to_string(), sample_rate));
        match self.behavior {
            OpenBehavior::Succeed => Ok(self.device.clone()),
            OpenBehavior::FailOpen => Err(Error::DeviceOpen {
                device: device.to_string(),
                reason: "mock refused".to_string(),
            }),
            OpenBehavior::FailContext => {
                // Device was opened, context failed: the host closes it again
                self.device.close();
                Err(Error::ContextCreation {
                    device: device.to_string(),
                    reason: "mock refused".to_string(),
                })
            }
        }
    }
}
