use std::collections::VecDeque;

use crate::config::Configuration;
use crate::peaks::Peak;
use crate::util::median_f32;

/// Octave/ratio multiples checked for tempo-correction before a genuine
/// destabilization is declared. Order matters:
/// the first multiple within tolerance wins.
const OCTAVE_MULTIPLES: [f32; 4] = [0.5, 1.33333, 1.5, 2.0];

/// Margin (BPM) within which a new estimate is considered "the same tempo"
/// as the last measured one.
const STABLE_TOLERANCE_BPM: f32 = 2.0;

/// A peak whose inter-peak interval has been folded into the active tempo
/// range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakInterval {
    pub timestamp: f64,
    pub magnitude: f32,
    pub interval: f32,
}

/// Confidence-tracked tempo state, mutated only from the estimator's own
/// `push` calls.
#[derive(Debug, Clone, Copy)]
struct TempoState {
    last_measured_tempo: f32,
    confidence: i32,
    first_pass: bool,
}

impl Default for TempoState {
    fn default() -> Self {
        Self {
            last_measured_tempo: 0.0,
            confidence: 0,
            first_pass: true,
        }
    }
}

/// Clusters inter-peak intervals into BPM hypotheses with confidence
/// tracking and octave-error handling.
pub struct TempoEstimator {
    min_tempo: f32,
    max_tempo: f32,
    bucket_count: usize,
    peak_history_length: f32,

    history: VecDeque<PeakInterval>,
    last_peak_timestamp: Option<f64>,
    state: TempoState,
    buckets: Vec<Vec<f32>>,
}

impl TempoEstimator {
    pub fn new(config: &Configuration) -> Self {
        Self {
            min_tempo: config.min_tempo,
            max_tempo: config.max_tempo,
            bucket_count: config.bucket_count,
            peak_history_length: config.peak_history_length,
            history: VecDeque::new(),
            last_peak_timestamp: None,
            state: TempoState::default(),
            buckets: vec![Vec::new(); config.bucket_count],
        }
    }

    fn interval_range(&self) -> (f32, f32) {
        (60.0 / self.max_tempo, 60.0 / self.min_tempo)
    }

    /// Current confidence, always in `[0, 10]`.
    pub fn confidence(&self) -> i32 {
        self.state.confidence
    }

    /// Feed one peak event. Returns `Some((timestamp, bpm))` if a tempo
    /// emission should be delivered to the consumer this tick.
    pub fn push(&mut self, peak: Peak) -> Option<(f64, f32)> {
        let raw_interval = match self.last_peak_timestamp {
            None => {
                self.last_peak_timestamp = Some(peak.timestamp);
                return None;
            }
            Some(last) => (peak.timestamp - last) as f32,
        };
        self.last_peak_timestamp = Some(peak.timestamp);

        let (min_i, max_i) = self.interval_range();
        let folded = fold_interval(raw_interval, min_i, max_i);

        self.history.push_back(PeakInterval {
            timestamp: peak.timestamp,
            magnitude: peak.magnitude,
            interval: folded,
        });
        if self.state.first_pass {
            log::trace!("tempo estimator: first folded interval {folded:.4}s");
            self.state.first_pass = false;
        }

        let span = self.history.back().unwrap().timestamp - self.history.front().unwrap().timestamp;
        if span < self.peak_history_length as f64 {
            return None;
        }

        self.analyze_buckets(peak.timestamp)
    }

    fn analyze_buckets(&mut self, now: f64) -> Option<(f64, f32)> {
        let (min_i, max_i) = self.interval_range();
        let span = (max_i - min_i).max(f32::EPSILON);

        for bucket in &mut self.buckets {
            bucket.clear();
        }
        for entry in &self.history {
            let idx = (((entry.interval - min_i) / span) * self.bucket_count as f32).round();
            let idx = (idx as i64).clamp(0, self.bucket_count as i64 - 1) as usize;
            self.buckets[idx].push(entry.interval);
        }

        // Prune the history to the sliding window.
        let cutoff = now - self.peak_history_length as f64;
        while let Some(front) = self.history.front() {
            if front.timestamp < cutoff {
                self.history.pop_front();
            } else {
                break;
            }
        }

        // Stable sort ascending by population; ties preserve ascending
        // bucket index, so the last entry among ties is the highest index
        // (higher interval, lower tempo).
        let mut order: Vec<usize> = (0..self.bucket_count).collect();
        order.sort_by_key(|&i| self.buckets[i].len());
        let predominant_idx = *order.last().expect("bucket_count > 0");

        if self.buckets[predominant_idx].is_empty() {
            log::trace!("tempo estimator: predominant bucket empty, skipping emission");
            return None;
        }

        let median_interval = median_f32(&mut self.buckets[predominant_idx]);
        let bpm = 60.0 / median_interval;

        self.apply_confidence_and_octave(now, bpm)
    }

    fn apply_confidence_and_octave(&mut self, timestamp: f64, bpm: f32) -> Option<(f64, f32)> {
        let last = self.state.last_measured_tempo;

        if last == 0.0 || (bpm - last).abs() < STABLE_TOLERANCE_BPM {
            self.state.confidence = (self.state.confidence + 1).min(10);
            self.state.last_measured_tempo = bpm;
            return Some((timestamp, bpm));
        }

        for &m in &OCTAVE_MULTIPLES {
            if (m * last - bpm).abs() < 3.0 * m {
                let emitted = bpm / m;
                log::debug!(
                    "tempo estimator: octave-corrected {bpm:.2} BPM -> {emitted:.2} BPM (x{m})"
                );
                self.state.last_measured_tempo = emitted;
                return Some((timestamp, emitted));
            }
        }

        let pre_decrement_confidence = self.state.confidence;
        self.state.confidence = (self.state.confidence - 1).max(0);
        // This assignment happens regardless of whether the tick is
        // suppressed, so a suppressed tick's raw `bpm` becomes the
        // comparison baseline for the next tick.
        self.state.last_measured_tempo = bpm;

        if pre_decrement_confidence > 7 {
            log::debug!(
                "tempo estimator: suppressing transient {bpm:.2} BPM (confidence was {pre_decrement_confidence})"
            );
            None
        } else {
            Some((timestamp, bpm))
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.last_peak_timestamp = None;
        self.state = TempoState::default();
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }
}

/// Fold `interval` into `[min_i, max_i]` by repeated doubling/halving,
/// neutralizing octave ambiguity.
fn fold_interval(mut interval: f32, min_i: f32, max_i: f32) -> f32 {
    while interval < min_i {
        interval *= 2.0;
    }
    while interval > max_i {
        interval /= 2.0;
    }
    interval
}
