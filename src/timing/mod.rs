//! Packet timing: emission timestamps and delay statistics.
//!
//! Synthesized packets are spaced around a target packet rate taken from the
//! background capture, with a per-attack jitter ceiling.

pub mod distribution;
pub mod model;
pub mod stats;

pub use distribution::WeightedDistribution;
pub use model::{TimingModel, DELAY_CEILINGS, MIN_DELAY_FACTOR};
pub use stats::{delay_stats, mean, percentile, std_dev};

/// Error from constructing a [`TimingModel`].
#[derive(Debug, thiserror::Error)]
pub enum TimingError {
    #[error("packet rate must be a positive finite number, got {0}")]
    InvalidRate(f64),

    #[error("start timestamp must be finite, got {0}")]
    InvalidStart(f64),

    #[error("delay ceiling {max_delay} must exceed the minimum gap {min_delay}")]
    InvalidCeiling { max_delay: f64, min_delay: f64 },

    #[error("delay distribution: {0}")]
    Distribution(String),
}
