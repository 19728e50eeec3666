//! Weighted discrete distribution over arbitrary values.
//!
//! Used for the per-attack delay ceiling and for picking a TTL from an
//! observed TTL histogram. Draws come from the caller's RNG so a seeded run
//! is reproducible end to end.

use rand::distributions::{Distribution, WeightedError, WeightedIndex};
use rand::Rng;

/// A finite set of values with integer frequencies.
#[derive(Debug, Clone)]
pub struct WeightedDistribution<T> {
    values: Vec<T>,
    index: WeightedIndex<u64>,
}

impl<T: Clone> WeightedDistribution<T> {
    /// Build from `(value, frequency)` pairs.
    ///
    /// Fails when there are no pairs or every frequency is zero.
    pub fn new<I>(pairs: I) -> Result<Self, WeightedError>
    where
        I: IntoIterator<Item = (T, u64)>,
    {
        let (values, weights): (Vec<T>, Vec<u64>) = pairs.into_iter().unzip();
        let index = WeightedIndex::new(weights)?;
        Ok(Self { values, index })
    }

    /// Draw one value.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> T {
        self.values[self.index.sample(rng)].clone()
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }
}
