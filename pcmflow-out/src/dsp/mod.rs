//! Signal processing stages ahead of the device
//!
//! - [`wsola`]: tempo stretching for emulation speed changes
//! - [`dpl2`]: stereo to 5.1 matrix decoding

pub mod dpl2;
pub mod wsola;

pub use dpl2::{Dpl2Decoder, SurroundDecoder, DPL2_MIN_WINDOW};
pub use wsola::{TimeStretch, Wsola, WsolaConfig, MAX_TEMPO};
