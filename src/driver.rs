use std::collections::VecDeque;

use crate::config::Configuration;
use crate::error::DetectorError;
use crate::fft::SpectralAnalyzer;
use crate::onset::{OnsetExtractor, OsfSample};
use crate::peaks::PeakPicker;
use crate::tempo::TempoEstimator;

/// A diagnostic tick emitted once per processed chunk (`OnsetSample`) or
/// once per detected peak (`PeakDetected`), independent of the main beat
/// callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiagnosticEvent {
    OnsetSample { timestamp: f64, magnitude: f32 },
    PeakDetected { timestamp: f64 },
}

/// Streaming tempo (BPM) detector.
///
/// Owns the full pipeline (spectral analysis, onset-strength, peak picking,
/// tempo estimation) and a FIFO sample queue that lets callers push audio in
/// whatever block sizes are convenient — the detector re-chunks internally
/// to `chunk_size`-sample, `hop_size`-aligned windows.
pub struct Detector {
    config: Configuration,
    analyzer: SpectralAnalyzer,
    onset: OnsetExtractor,
    picker: PeakPicker,
    tempo: TempoEstimator,

    /// FIFO of not-yet-consumed samples, reserved to `chunk_size + hop_size`
    /// at construction. `process_block` only ever extends it by at most
    /// `hop_size` samples before draining it back below `chunk_size`, so it
    /// never needs to reallocate no matter how large a single caller-supplied
    /// block is.
    queue: VecDeque<f32>,
    chunk_scratch: Vec<f32>,
    band_scratch: Vec<f32>,

    timestamp: f64,
    time_window: Option<(f64, f64)>,

    beat_handler: Option<Box<dyn FnMut(f64, f32) + Send>>,
    diagnostic_handler: Option<Box<dyn FnMut(DiagnosticEvent) + Send>>,
}

impl Detector {
    pub fn new(config: Configuration) -> Result<Self, DetectorError> {
        config.validate()?;

        let analyzer = SpectralAnalyzer::new(&config);
        let band_count = analyzer.band_count();
        let queue_capacity = config.chunk_size + config.hop_size;

        Ok(Self {
            onset: OnsetExtractor::new(band_count),
            picker: PeakPicker::new(&config),
            tempo: TempoEstimator::new(&config),
            analyzer,
            queue: VecDeque::with_capacity(queue_capacity),
            chunk_scratch: vec![0.0; config.chunk_size],
            band_scratch: vec![0.0; band_count],
            timestamp: 0.0,
            time_window: None,
            beat_handler: None,
            diagnostic_handler: None,
            config,
        })
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Install the callback invoked whenever the tempo estimator emits a
    /// new BPM reading.
    pub fn set_beat_handler<F>(&mut self, handler: F)
    where
        F: FnMut(f64, f32) + Send + 'static,
    {
        self.beat_handler = Some(Box::new(handler));
    }

    /// Install the callback invoked once per chunk (onset magnitude) and
    /// once per peak. Purely observational; never affects detection state.
    pub fn set_diagnostic_handler<F>(&mut self, handler: F)
    where
        F: FnMut(DiagnosticEvent) + Send + 'static,
    {
        self.diagnostic_handler = Some(Box::new(handler));
    }

    /// Restrict callback emission to `[start, end)` seconds of stream time,
    /// for offline sources that only care about a sub-range of a larger
    /// buffer. Internal pipeline state still advances across the whole
    /// stream; only the handler calls are gated. `None` emits unconditionally.
    pub fn set_time_window(&mut self, window: Option<(f64, f64)>) {
        self.time_window = window;
    }

    /// Current stream timestamp, in seconds.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn confidence(&self) -> i32 {
        self.tempo.confidence()
    }

    /// Push a block of mono samples of any length, timestamped at the
    /// first sample. Internally re-chunks to `chunk_size`/`hop_size`-aligned
    /// windows and drives the full pipeline for every window that becomes
    /// available. `first_sample_timestamp` only re-calibrates the internal
    /// clock when the sample queue is empty (a fresh epoch or post-`reset`);
    /// within a contiguous run of blocks the clock advances purely by
    /// `hop_size / sample_rate` per chunk, matching the producer contract of
    /// monotonically non-decreasing, gap-free timestamps.
    ///
    /// `samples` may be arbitrarily long (an entire offline buffer in one
    /// call); internally it is folded into the queue in `hop_size`-sized
    /// slices so the queue's length never exceeds its reserved capacity,
    /// regardless of how large a single call's input is.
    pub fn process_block(&mut self, samples: &[f32], first_sample_timestamp: f64) {
        if self.queue.is_empty() {
            self.timestamp = first_sample_timestamp;
        }
        for batch in samples.chunks(self.config.hop_size) {
            self.queue.extend(batch.iter().copied());
            self.drain_ready_chunks();
        }
    }

    fn drain_ready_chunks(&mut self) {
        while self.queue.len() >= self.config.chunk_size {
            for (slot, sample) in self.chunk_scratch.iter_mut().zip(self.queue.iter()) {
                *slot = *sample;
            }

            self.analyzer
                .band_energies(&self.chunk_scratch, self.config.sample_rate, &mut self.band_scratch);

            self.dispatch_chunk();

            for _ in 0..self.config.hop_size {
                self.queue.pop_front();
            }
            self.timestamp += self.config.hop_size as f64 / self.config.sample_rate as f64;
        }
    }

    fn in_window(&self, timestamp: f64) -> bool {
        match self.time_window {
            None => true,
            Some((start, end)) => timestamp >= start && timestamp < end,
        }
    }

    fn dispatch_chunk(&mut self) {
        let ts = self.timestamp;
        let Some(osf_magnitude) = self.onset.push(&self.band_scratch) else {
            return;
        };

        if self.in_window(ts) {
            if let Some(handler) = &mut self.diagnostic_handler {
                handler(DiagnosticEvent::OnsetSample {
                    timestamp: ts,
                    magnitude: osf_magnitude,
                });
            }
        }

        let Some(peak) = self.picker.push(OsfSample {
            timestamp: ts,
            magnitude: osf_magnitude,
        }) else {
            return;
        };

        log::trace!("peak at {:.4}s, magnitude {:.4}", peak.timestamp, peak.magnitude);
        if self.in_window(peak.timestamp) {
            if let Some(handler) = &mut self.diagnostic_handler {
                handler(DiagnosticEvent::PeakDetected {
                    timestamp: peak.timestamp,
                });
            }
        }

        let Some((beat_timestamp, bpm)) = self.tempo.push(peak) else {
            return;
        };

        log::debug!("beat emission: {bpm:.2} BPM at {beat_timestamp:.4}s");
        if self.in_window(beat_timestamp) {
            if let Some(handler) = &mut self.beat_handler {
                handler(beat_timestamp, bpm);
            }
        }
    }

    /// Reset all pipeline state and stream timestamp back to zero. Callback
    /// registrations and the time window survive a reset.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.onset.reset();
        self.picker.reset();
        self.tempo.reset();
        self.timestamp = 0.0;
    }

    /// Reset and adopt a new configuration in one step. Required whenever
    /// `min_tempo`/`max_tempo` change, since already-folded `PeakInterval`
    /// entries in the tempo estimator's history would otherwise be stale
    /// relative to the new active range.
    pub fn reset_with_config(&mut self, config: Configuration) -> Result<(), DetectorError> {
        config.validate()?;

        let analyzer = SpectralAnalyzer::new(&config);
        let band_count = analyzer.band_count();
        let queue_capacity = config.chunk_size + config.hop_size;

        self.analyzer = analyzer;
        self.onset = OnsetExtractor::new(band_count);
        self.picker = PeakPicker::new(&config);
        self.tempo = TempoEstimator::new(&config);
        self.queue = VecDeque::with_capacity(queue_capacity);
        self.chunk_scratch = vec![0.0; config.chunk_size];
        self.band_scratch = vec![0.0; band_count];
        self.timestamp = 0.0;
        self.config = config;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn click_train(config: &Configuration, bpm: f32, seconds: f32) -> Vec<f32> {
        let period_samples = (config.sample_rate as f32 * 60.0 / bpm) as usize;
        let total_samples = (config.sample_rate as f32 * seconds) as usize;
        let mut buf = vec![0.0f32; total_samples];
        let mut i = 0;
        while i < total_samples {
            for k in 0..8.min(total_samples - i) {
                buf[i + k] = 1.0 - (k as f32 / 8.0);
            }
            i += period_samples;
        }
        buf
    }

    #[test]
    fn construction_rejects_invalid_config() {
        let mut config = Configuration::default();
        config.chunk_size = 1000; // not a power of two
        assert!(Detector::new(config).is_err());
    }

    #[test]
    fn reset_zeroes_timestamp_and_confidence() {
        let config = Configuration::default();
        let mut detector = Detector::new(config).unwrap();
        let audio = click_train(&config, 120.0, 6.0);
        detector.process_block(&audio, 0.0);
        detector.reset();
        assert_eq!(detector.timestamp(), 0.0);
        assert_eq!(detector.confidence(), 0);
    }

    #[test]
    fn beat_handler_eventually_fires_on_steady_click_train() {
        let config = Configuration::default();
        let mut detector = Detector::new(config).unwrap();
        let bpms: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&bpms);
        detector.set_beat_handler(move |_, bpm| sink.lock().unwrap().push(bpm));

        let audio = click_train(&config, 120.0, 10.0);
        detector.process_block(&audio, 0.0);

        let recorded = bpms.lock().unwrap();
        assert!(!recorded.is_empty());
        assert!((recorded.last().unwrap() - 120.0).abs() < 5.0);
    }

    #[test]
    fn rechunking_into_many_small_pushes_matches_one_big_push() {
        let config = Configuration::default();
        let audio = click_train(&config, 100.0, 6.0);

        let mut whole = Detector::new(config).unwrap();
        let whole_beats: Arc<Mutex<Vec<(f64, f32)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&whole_beats);
        whole.set_beat_handler(move |t, bpm| sink.lock().unwrap().push((t, bpm)));
        whole.process_block(&audio, 0.0);

        let mut chunked = Detector::new(config).unwrap();
        let chunked_beats: Arc<Mutex<Vec<(f64, f32)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&chunked_beats);
        chunked.set_beat_handler(move |t, bpm| sink.lock().unwrap().push((t, bpm)));
        for sample in &audio {
            chunked.process_block(std::slice::from_ref(sample), 0.0);
        }

        assert_eq!(*whole_beats.lock().unwrap(), *chunked_beats.lock().unwrap());
    }

    #[test]
    fn diagnostic_handler_sees_one_event_per_peak() {
        let config = Configuration::default();
        let mut detector = Detector::new(config).unwrap();
        let peak_count = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&peak_count);
        detector.set_diagnostic_handler(move |event| {
            if let DiagnosticEvent::PeakDetected { .. } = event {
                *sink.lock().unwrap() += 1;
            }
        });
        let audio = click_train(&config, 120.0, 6.0);
        detector.process_block(&audio, 0.0);
        assert!(*peak_count.lock().unwrap() > 0);
    }
}
