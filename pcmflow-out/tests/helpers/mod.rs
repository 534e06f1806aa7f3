//! Test helper modules for pcmflow-out integration tests
//!
//! - MockDevice / MockHost: scripted queued-buffer device
//! - ScriptedMixer: deterministic upstream producer
//! - PassThroughStretch: stretch engine that copies input to output

#![allow(dead_code)]

pub mod mixer;
pub mod mock_device;
pub mod stretch;

pub use mixer::ScriptedMixer;
pub use mock_device::{MockDevice, MockHost, OpenBehavior};
pub use stretch::{PassThroughStretch, StretchCall, StretchLog};

use pcmflow_out::dsp::Dpl2Decoder;
use pcmflow_out::stream::{
    BufferRing, CapabilityFlags, CapabilityNegotiator, FixedClock, SampleSource, StreamControl,
    StreamSession, SurroundStage, TempoSync,
};
use std::sync::Arc;

/// Clock yielding 48 frames per cycle
pub fn default_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::default())
}

/// Clock yielding the full 256 frames per cycle
pub fn full_block_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock {
        ticks_per_second: 486_000_000,
        dma_sample_rate: 6_000,
    })
}

/// A session wired to mocks, ready for `run_cycle`
pub struct TestSession {
    pub session: StreamSession,
    pub control: Arc<StreamControl>,
    pub device: Arc<MockDevice>,
    pub mixer: Arc<ScriptedMixer>,
    pub stretch: StretchLog,
}

pub fn test_session(buffers: usize, flags: CapabilityFlags) -> TestSession {
    test_session_with_clock(buffers, flags, default_clock())
}

pub fn test_session_with_clock(
    buffers: usize,
    flags: CapabilityFlags,
    clock: Arc<FixedClock>,
) -> TestSession {
    let device = MockDevice::new("Mock Renderer");
    let mixer = Arc::new(ScriptedMixer::new());
    let (stretch, log) = PassThroughStretch::new();

    let ring = BufferRing::new(device.clone(), buffers).unwrap();
    let source = SampleSource::new(mixer.clone(), clock);
    let tempo = TempoSync::new(Box::new(stretch), 48000);
    let surround = SurroundStage::new(Box::new(Dpl2Decoder::new(48000)));
    let control = Arc::new(StreamControl::new());
    control.set_running(true);

    let session = StreamSession::new(
        ring,
        CapabilityNegotiator::with_flags(flags),
        source,
        tempo,
        surround,
        control.clone(),
    );

    TestSession {
        session,
        control,
        device,
        mixer,
        stretch: log,
    }
}

pub fn stereo_float() -> CapabilityFlags {
    CapabilityFlags {
        surround: false,
        float32: true,
    }
}
