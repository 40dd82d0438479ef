use crate::error::DetectorError;

/// Number of logarithmically spaced frequency bands the spectrum is
/// collapsed into. Spec-fixed to one of three supported resolutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandCount {
    /// 1 band per octave.
    Six,
    /// 2 bands per octave.
    Twelve,
    /// 5 bands per octave.
    Thirty,
}

impl BandCount {
    pub fn count(self) -> usize {
        match self {
            BandCount::Six => 6,
            BandCount::Twelve => 12,
            BandCount::Thirty => 30,
        }
    }

    fn from_count(n: usize) -> Option<Self> {
        match n {
            6 => Some(BandCount::Six),
            12 => Some(BandCount::Twelve),
            30 => Some(BandCount::Thirty),
            _ => None,
        }
    }
}

/// Immutable session configuration for a [`crate::Detector`].
///
/// Constructed once via [`Configuration::new`] (or [`Configuration::default`]
/// followed by field overrides) and validated eagerly at
/// [`crate::Detector::new`]. Changing `min_tempo`/`max_tempo` mid-session
/// would desynchronize already-folded entries in the peak history, so doing
/// so requires building a fresh `Detector`.
#[derive(Debug, Clone, Copy)]
pub struct Configuration {
    pub sample_rate: u32,
    pub chunk_size: usize,
    pub hop_size: usize,
    pub min_tempo: f32,
    pub max_tempo: f32,
    pub frequency_bands: BandCount,
    pub bucket_count: usize,
    pub peak_history_length: f32,
    pub coalesce_interval: f32,
    pub recent_max_threshold_ratio: f32,
    pub recent_history_duration: f32,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            sample_rate: 22_050,
            chunk_size: 2048,
            hop_size: 90,
            min_tempo: 40.0,
            max_tempo: 240.0,
            frequency_bands: BandCount::Twelve,
            bucket_count: 10,
            peak_history_length: 4.0,
            coalesce_interval: 0.1,
            recent_max_threshold_ratio: 0.6,
            recent_history_duration: 1.25,
        }
    }
}

impl Configuration {
    /// Build a configuration with the given sample rate, chunk size, hop
    /// size and band count, defaults otherwise. Returns
    /// [`DetectorError::InvalidConfig`] if the combination is invalid; see
    /// [`Configuration::validate`].
    pub fn new(
        sample_rate: u32,
        chunk_size: usize,
        hop_size: usize,
        band_count: usize,
    ) -> Result<Self, DetectorError> {
        let frequency_bands = BandCount::from_count(band_count).ok_or_else(|| {
            DetectorError::InvalidConfig(format!(
                "unsupported band count {band_count}, expected one of 6, 12, 30"
            ))
        })?;

        let config = Self {
            sample_rate,
            chunk_size,
            hop_size,
            frequency_bands,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// The onset-strength sample rate implied by `sample_rate`/`hop_size`.
    pub fn osf_rate(&self) -> f32 {
        self.sample_rate as f32 / self.hop_size as f32
    }

    /// Validate the configuration, returning the specific invalid field.
    pub fn validate(&self) -> Result<(), DetectorError> {
        if self.sample_rate == 0 {
            return Err(DetectorError::InvalidConfig(
                "sample_rate must be non-zero".into(),
            ));
        }
        if !self.chunk_size.is_power_of_two() {
            return Err(DetectorError::InvalidConfig(format!(
                "chunk_size {} is not a power of two",
                self.chunk_size
            )));
        }
        if self.hop_size == 0 || self.hop_size > self.chunk_size {
            return Err(DetectorError::InvalidConfig(format!(
                "hop_size {} must be in (0, chunk_size]",
                self.hop_size
            )));
        }
        if self.min_tempo <= 0.0 || self.max_tempo <= 0.0 || self.min_tempo >= self.max_tempo {
            return Err(DetectorError::InvalidConfig(format!(
                "min_tempo ({}) must be positive and less than max_tempo ({})",
                self.min_tempo, self.max_tempo
            )));
        }
        if self.bucket_count == 0 {
            return Err(DetectorError::InvalidConfig(
                "bucket_count must be non-zero".into(),
            ));
        }
        if self.peak_history_length <= 0.0 {
            return Err(DetectorError::InvalidConfig(
                "peak_history_length must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Configuration::default().validate().unwrap();
    }

    #[test]
    fn rejects_non_power_of_two_chunk_size() {
        let err = Configuration::new(22_050, 2000, 90, 12).unwrap_err();
        assert!(matches!(err, DetectorError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_unsupported_band_count() {
        let err = Configuration::new(22_050, 2048, 90, 8).unwrap_err();
        assert!(matches!(err, DetectorError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_inverted_tempo_range() {
        let mut config = Configuration::default();
        config.min_tempo = 200.0;
        config.max_tempo = 100.0;
        assert!(config.validate().is_err());
    }
}
