use thiserror::Error;

/// Errors surfaced by the detection core.
///
/// Per the core's error handling policy, the only error that ever crosses
/// an API boundary is a configuration error raised at construction time.
/// Everything else that can go wrong at runtime (an empty histogram bucket,
/// an all-zero spectrum, a warmup tick) is absorbed internally and expressed
/// as "no emission this tick".
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("invalid detector configuration: {0}")]
    InvalidConfig(String),
}
