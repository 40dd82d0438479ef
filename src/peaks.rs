use crate::config::Configuration;
use crate::onset::OsfSample;
use crate::ringbuffer::RingBuffer;

/// A detected onset peak: a strictly-increasing timestamp and its OSF
/// magnitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub timestamp: f64,
    pub magnitude: f32,
}

/// Causal peak picker: a pure transducer from OSF samples
/// to peak events, gated by an adaptive recent-history threshold and an
/// optional temporal coalescing pass. Has no knowledge of the driver or the
/// tempo estimator that consumes its output; driven entirely through
/// `push -> Option<Peak>`.
pub struct PeakPicker {
    trailing: RingBuffer<f32>,
    osf_rate: f32,
    recent_max_threshold_ratio: f32,
    coalesce_interval: f32,
    counter: u64,
    last_magnitude: f32,
    is_onsetting: bool,
    queue: Vec<Peak>,
}

impl PeakPicker {
    pub fn new(config: &Configuration) -> Self {
        let osf_rate = config.osf_rate();
        let window_len = (osf_rate * config.recent_history_duration).round().max(1.0) as usize;
        Self {
            trailing: RingBuffer::with_capacity(window_len),
            osf_rate,
            recent_max_threshold_ratio: config.recent_max_threshold_ratio,
            coalesce_interval: config.coalesce_interval,
            counter: 0,
            last_magnitude: 0.0,
            is_onsetting: false,
            queue: Vec::with_capacity(8),
        }
    }

    /// Feed one OSF sample, returning at most one peak (either the
    /// immediately-detected local max, when coalescing is disabled, or a
    /// peak released from the coalescing queue once it has aged past
    /// `coalesce_interval`).
    pub fn push(&mut self, sample: OsfSample) -> Option<Peak> {
        let recent_max = self.trailing.max();
        let threshold = recent_max * self.recent_max_threshold_ratio;
        self.trailing.push(sample.magnitude);

        let mut immediate = None;
        let warmed_up = self.counter as f32 > self.osf_rate;
        if warmed_up && sample.magnitude < self.last_magnitude && self.is_onsetting {
            let peak = Peak {
                timestamp: sample.timestamp - 1.0 / self.osf_rate as f64,
                magnitude: self.last_magnitude,
            };
            self.is_onsetting = false;
            if peak.magnitude >= threshold {
                if self.coalesce_interval == 0.0 {
                    immediate = Some(peak);
                } else {
                    self.queue.push(peak);
                }
            }
        } else {
            self.is_onsetting = sample.magnitude > self.last_magnitude;
        }

        self.counter += 1;
        self.last_magnitude = sample.magnitude;

        if immediate.is_some() {
            return immediate;
        }
        self.drain_coalesced(sample.timestamp)
    }

    fn drain_coalesced(&mut self, now: f64) -> Option<Peak> {
        let first = self.queue.first()?;
        if now - first.timestamp <= self.coalesce_interval as f64 {
            return None;
        }

        let mut best_idx = 0;
        let mut best_mag = self.queue[0].magnitude;
        for (i, p) in self.queue.iter().enumerate().skip(1) {
            if p.magnitude > best_mag {
                best_mag = p.magnitude;
                best_idx = i;
            }
        }
        let chosen = self.queue[best_idx];
        self.queue.clear();
        Some(chosen)
    }

    pub fn reset(&mut self) {
        self.trailing.clear();
        self.counter = 0;
        self.last_magnitude = 0.0;
        self.is_onsetting = false;
        self.queue.clear();
    }
}
