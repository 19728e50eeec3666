//! Emission timestamps for synthesized packets.
//!
//! Each attack samples one delay ceiling from a fixed distribution of
//! multiples of the nominal inter-packet gap `1/R`. Every gap after the first
//! packet is then a uniform draw in `[0.1/R, ceiling)`. Most attacks run close
//! to the nominal rate; a minority are stretched up to 10x.

use rand::Rng;

use super::distribution::WeightedDistribution;
use super::TimingError;

/// Delay ceilings as `(multiple of 1/R, frequency)`.
pub const DELAY_CEILINGS: [(f64, u64); 4] = [(1.0, 70), (2.0, 30), (5.0, 15), (10.0, 3)];

/// Smallest gap between two packets, as a multiple of `1/R`.
pub const MIN_DELAY_FACTOR: f64 = 0.1;

/// Timestamp generator for one attack instance.
#[derive(Debug, Clone)]
pub struct TimingModel {
    rate: f64,
    min_delay: f64,
    max_delay: f64,
    current: f64,
    started: bool,
}

impl TimingModel {
    /// Create a model for `rate` packets per second starting at `start`,
    /// sampling the delay ceiling once from [`DELAY_CEILINGS`].
    pub fn new<R: Rng + ?Sized>(rate: f64, start: f64, rng: &mut R) -> Result<Self, TimingError> {
        check_rate(rate)?;
        let ceilings = WeightedDistribution::new(DELAY_CEILINGS.map(|(k, w)| (k / rate, w)))
            .map_err(|e| TimingError::Distribution(e.to_string()))?;
        let max_delay = ceilings.sample(rng);
        Self::with_max_delay(rate, start, max_delay)
    }

    /// Create a model with an explicit delay ceiling.
    pub fn with_max_delay(rate: f64, start: f64, max_delay: f64) -> Result<Self, TimingError> {
        check_rate(rate)?;
        if !start.is_finite() {
            return Err(TimingError::InvalidStart(start));
        }
        let min_delay = MIN_DELAY_FACTOR / rate;
        if !(max_delay.is_finite() && max_delay > min_delay) {
            return Err(TimingError::InvalidCeiling {
                max_delay,
                min_delay,
            });
        }
        Ok(Self {
            rate,
            min_delay,
            max_delay,
            current: start,
            started: false,
        })
    }

    /// Timestamp for the next packet.
    ///
    /// The first call returns the start timestamp unchanged.
    pub fn next_timestamp<R: Rng + ?Sized>(&mut self, rng: &mut R) -> f64 {
        if self.started {
            self.current += rng.gen_range(self.min_delay..self.max_delay);
        } else {
            self.started = true;
        }
        self.current
    }

    /// The next `n` timestamps.
    pub fn timestamps<R: Rng + ?Sized>(&mut self, n: usize, rng: &mut R) -> Vec<f64> {
        (0..n).map(|_| self.next_timestamp(rng)).collect()
    }

    /// Target rate in packets per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn min_delay(&self) -> f64 {
        self.min_delay
    }

    /// Delay ceiling sampled for this instance.
    pub fn max_delay(&self) -> f64 {
        self.max_delay
    }
}

fn check_rate(rate: f64) -> Result<(), TimingError> {
    if rate.is_finite() && rate > 0.0 {
        Ok(())
    } else {
        Err(TimingError::InvalidRate(rate))
    }
}
