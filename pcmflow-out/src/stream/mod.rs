//! Stream loop and its stages
//!
//! ```text
//! SampleSource -> TempoSync -> [SurroundStage] -> BufferRing -> device
//!                        ^                            |
//!                        +---- StreamSession (one cycle at a time)
//! ```

pub mod capability;
pub mod engine;
pub mod ring;
pub mod session;
pub mod source;
pub mod surround;
pub mod tempo;
pub mod wake;

pub use capability::{CapabilityFlags, CapabilityNegotiator};
pub use engine::{AudioStream, DecoderFactory, StreamNotifier, StreamState, StretchFactory};
pub use ring::{buffer_count, BufferRing, MAX_BUFFERS};
pub use session::{CycleOutcome, StreamControl, StreamSession};
pub use source::{frames_due, AudioClock, FixedClock, Mixer, SampleSource, MAX_FRAMES_PER_CYCLE};
pub use surround::SurroundStage;
pub use tempo::{tempo_policy, TempoDecision, TempoSync};
pub use wake::WakeSignal;
