//! Output format capability negotiation
//!
//! Flags start from the device probe and the surround setting, and can only be
//! cleared afterwards: a format the device rejected once is never tried again
//! in the same session.

use crate::audio::types::OutputFormat;
use tracing::{info, warn};

/// Renderer identities that advertise float output but cannot play it
const FLOAT32_BROKEN_RENDERERS: &[&str] = &["X-Fi"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityFlags {
    pub surround: bool,
    pub float32: bool,
}

#[derive(Debug)]
pub struct CapabilityNegotiator {
    flags: CapabilityFlags,
}

impl CapabilityNegotiator {
    /// Probe initial capabilities for `renderer` with surround decoding as configured
    pub fn probe(renderer: &str, surround_requested: bool) -> Self {
        let mut flags = CapabilityFlags {
            surround: surround_requested,
            float32: true,
        };

        if let Some(known) = FLOAT32_BROKEN_RENDERERS
            .iter()
            .find(|name| renderer.contains(*name))
        {
            info!("Renderer {} matches {}: float32 output disabled", renderer, known);
            flags.float32 = false;
        }

        if cfg!(target_os = "macos") {
            flags.float32 = false;
            flags.surround = false;
        }

        info!(
            "Output capabilities: surround={}, float32={}",
            flags.surround, flags.float32
        );
        Self { flags }
    }

    /// Start from explicit flags
    pub fn with_flags(flags: CapabilityFlags) -> Self {
        Self { flags }
    }

    pub fn flags(&self) -> CapabilityFlags {
        self.flags
    }

    /// Highest fidelity format the current flags allow
    pub fn select_format(&self) -> OutputFormat {
        match (self.flags.surround, self.flags.float32) {
            (true, true) => OutputFormat::SurroundF32,
            (true, false) => OutputFormat::SurroundI16,
            (false, true) => OutputFormat::StereoF32,
            (false, false) => OutputFormat::StereoI16,
        }
    }

    /// Record that the device rejected `format`.
    ///
    /// Surround rejections disable surround, stereo float rejections disable
    /// float32. A stereo int16 rejection has nothing left to fall back to.
    /// Returns true when a flag was cleared.
    pub fn downgrade(&mut self, format: OutputFormat) -> bool {
        match format {
            OutputFormat::SurroundF32 | OutputFormat::SurroundI16 if self.flags.surround => {
                self.flags.surround = false;
                warn!("Unable to set {} buffer, disabling surround output", format);
                true
            }
            OutputFormat::StereoF32 if self.flags.float32 => {
                self.flags.float32 = false;
                warn!("Unable to set {} buffer, falling back to int16", format);
                true
            }
            OutputFormat::StereoI16 => {
                warn!("Device rejected {} buffer, no further fallback", format);
                false
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_os = "macos"))]
    fn test_probe_defaults() {
        let caps = CapabilityNegotiator::probe("OpenAL Soft", false);
        assert_eq!(
            caps.flags(),
            CapabilityFlags {
                surround: false,
                float32: true
            }
        );
        assert_eq!(caps.select_format(), OutputFormat::StereoF32);
    }

    #[test]
    fn test_xfi_disables_float() {
        let caps = CapabilityNegotiator::probe("SB X-Fi Audio [0001]", false);
        assert!(!caps.flags().float32);
        assert_eq!(caps.select_format(), OutputFormat::StereoI16);
    }

    #[test]
    #[cfg(not(target_os = "macos"))]
    fn test_surround_requested() {
        let caps = CapabilityNegotiator::probe("ALSA / default", true);
        assert_eq!(caps.select_format(), OutputFormat::SurroundF32);
    }

    #[test]
    fn test_downgrade_is_monotonic() {
        let mut caps = CapabilityNegotiator::with_flags(CapabilityFlags {
            surround: true,
            float32: true,
        });

        assert!(caps.downgrade(OutputFormat::SurroundF32));
        assert_eq!(caps.select_format(), OutputFormat::StereoF32);
        // Surround already off
        assert!(!caps.downgrade(OutputFormat::SurroundI16));

        assert!(caps.downgrade(OutputFormat::StereoF32));
        assert_eq!(caps.select_format(), OutputFormat::StereoI16);

        assert!(!caps.downgrade(OutputFormat::StereoI16));
        assert_eq!(
            caps.flags(),
            CapabilityFlags {
                surround: false,
                float32: false
            }
        );
    }

    #[test]
    fn test_surround_int16_rejection_keeps_float() {
        let mut caps = CapabilityNegotiator::with_flags(CapabilityFlags {
            surround: true,
            float32: false,
        });
        assert!(caps.downgrade(OutputFormat::SurroundI16));
        assert_eq!(caps.select_format(), OutputFormat::StereoI16);
    }
}
