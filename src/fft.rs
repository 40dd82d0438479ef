use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::config::Configuration;

/// Lower edge of the log-spaced band ladder, in Hz.
const BAND_RANGE_LOW_HZ: f32 = 100.0;
/// Upper edge of the log-spaced band ladder, in Hz.
const BAND_RANGE_HIGH_HZ: f32 = 5512.0;

/// Computes a Hann-windowed magnitude spectrum per chunk and collapses it
/// into `B` logarithmically spaced band energies.
///
/// Owns its FFT plan and scratch buffers so that steady-state calls to
/// [`SpectralAnalyzer::band_energies`] never allocate.
pub struct SpectralAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    chunk_size: usize,
    /// `(low_hz, high_hz)` per band.
    band_edges: Vec<(f32, f32)>,
    scratch: Vec<Complex<f32>>,
}

impl SpectralAnalyzer {
    pub fn new(config: &Configuration) -> Self {
        let chunk_size = config.chunk_size;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(chunk_size);

        let window = hann_window(chunk_size);
        let band_count = config.frequency_bands.count();
        let band_edges = log_band_edges(band_count);

        Self {
            fft,
            window,
            chunk_size,
            band_edges,
            scratch: vec![Complex::new(0.0, 0.0); chunk_size],
        }
    }

    pub fn band_count(&self) -> usize {
        self.band_edges.len()
    }

    /// Compute band energies for one chunk of exactly `chunk_size` samples,
    /// writing into `out` (length must equal [`SpectralAnalyzer::band_count`]).
    pub fn band_energies(&mut self, chunk: &[f32], sample_rate: u32, out: &mut [f32]) {
        debug_assert_eq!(chunk.len(), self.chunk_size);
        debug_assert_eq!(out.len(), self.band_edges.len());

        for ((sample, window), slot) in chunk
            .iter()
            .zip(self.window.iter())
            .zip(self.scratch.iter_mut())
        {
            *slot = Complex::new(sample * window, 0.0);
        }

        self.fft.process(&mut self.scratch);

        let num_bins = self.chunk_size / 2;
        let bin_hz = sample_rate as f32 / self.chunk_size as f32;

        for (band_idx, &(low, high)) in self.band_edges.iter().enumerate() {
            let mut sum = 0.0f32;
            let mut count = 0u32;
            for k in 0..num_bins {
                let center = k as f32 * bin_hz;
                if center >= low && center < high {
                    sum += self.scratch[k].norm();
                    count += 1;
                }
            }
            out[band_idx] = if count > 0 { sum / count as f32 } else { 0.0 };
        }
    }
}

fn hann_window(size: usize) -> Vec<f32> {
    if size <= 1 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (size - 1) as f32).cos()))
        .collect()
}

/// Log-spaced band edges spanning `BAND_RANGE_LOW_HZ`..`BAND_RANGE_HIGH_HZ`,
/// producing `band_count` bands (bands-per-octave = `band_count / 6`, since
/// the range spans roughly six octaves).
fn log_band_edges(band_count: usize) -> Vec<(f32, f32)> {
    let ratio = (BAND_RANGE_HIGH_HZ / BAND_RANGE_LOW_HZ).ln();
    (0..band_count)
        .map(|i| {
            let low = BAND_RANGE_LOW_HZ * ((i as f32 / band_count as f32) * ratio).exp();
            let high = BAND_RANGE_LOW_HZ * (((i + 1) as f32 / band_count as f32) * ratio).exp();
            (low, high)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_edges_are_monotonic_and_span_range() {
        let edges = log_band_edges(12);
        assert_eq!(edges.len(), 12);
        assert!((edges[0].0 - BAND_RANGE_LOW_HZ).abs() < 0.01);
        assert!((edges.last().unwrap().1 - BAND_RANGE_HIGH_HZ).abs() < 0.01);
        for window in edges.windows(2) {
            assert!(window[0].1 <= window[1].0 + 1e-3);
        }
    }

    #[test]
    fn pure_tone_energy_concentrates_in_one_band() {
        let config = Configuration {
            sample_rate: 22_050,
            ..Configuration::default()
        };
        let mut analyzer = SpectralAnalyzer::new(&config);
        let freq = 440.0f32;
        let chunk: Vec<f32> = (0..config.chunk_size)
            .map(|i| (2.0 * PI * freq * i as f32 / config.sample_rate as f32).sin())
            .collect();

        let mut energies = vec![0.0; analyzer.band_count()];
        analyzer.band_energies(&chunk, config.sample_rate, &mut energies);

        let total: f32 = energies.iter().sum();
        assert!(total > 0.0);
        let max = energies.iter().cloned().fold(0.0, f32::max);
        assert!(max / total > 0.3, "energy should concentrate, got {energies:?}");
    }

    #[test]
    fn silence_yields_zero_energy() {
        let config = Configuration::default();
        let mut analyzer = SpectralAnalyzer::new(&config);
        let chunk = vec![0.0f32; config.chunk_size];
        let mut energies = vec![0.0; analyzer.band_count()];
        analyzer.band_energies(&chunk, config.sample_rate, &mut energies);
        assert!(energies.iter().all(|&e| e == 0.0));
    }
}
