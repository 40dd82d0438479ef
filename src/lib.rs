//! Real-time streaming tempo (BPM) detection core.
//!
//! Feed mono audio samples into a [`Detector`] as they arrive; it re-chunks
//! them internally, runs a windowed spectral analysis, derives an
//! onset-strength signal, picks causal peaks, and clusters inter-peak
//! intervals into a confidence-scored BPM estimate delivered through a
//! callback. Every stage is allocation-free once the detector has warmed up.

mod config;
mod driver;
mod error;
mod fft;
mod onset;
mod peaks;
mod ringbuffer;
mod tempo;
mod util;

pub use config::{BandCount, Configuration};
pub use driver::{Detector, DiagnosticEvent};
pub use error::DetectorError;
pub use peaks::Peak;
