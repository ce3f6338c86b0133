//! Generators of random values.

use rand::prelude::*;
use rand_distr::Exp;
use rand_pcg::Pcg64;

use crate::empirical::EmpiricalDistribution;

/// Infinite stream of values, e.g. inter-arrival or service times.
pub trait Generator {
    /// Returns the next value.
    fn next(&mut self) -> f64;

    /// Returns the expected value of the stream.
    fn mean(&self) -> f64;
}

/// Generator which always returns the same value.
pub struct ConstantGenerator {
    value: f64,
}

impl ConstantGenerator {
    /// Creates generator with the given value.
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

impl Generator for ConstantGenerator {
    fn next(&mut self) -> f64 {
        self.value
    }

    fn mean(&self) -> f64 {
        self.value
    }
}

/// Generator of exponentially distributed values.
pub struct ExponentialGenerator {
    rate: f64,
    dist: Exp<f64>,
    rand: Pcg64,
}

impl ExponentialGenerator {
    /// Creates generator with the given rate (inverse of the mean).
    ///
    /// Panics if the rate is not positive.
    pub fn new(rate: f64, seed: u64) -> Self {
        assert!(rate > 0., "Exponential rate must be positive, got {}", rate);
        let dist = Exp::new(rate).unwrap_or_else(|_| panic!("Invalid exponential rate {}", rate));
        Self {
            rate,
            dist,
            rand: Pcg64::seed_from_u64(seed),
        }
    }
}

impl Generator for ExponentialGenerator {
    fn next(&mut self) -> f64 {
        self.dist.sample(&mut self.rand)
    }

    fn mean(&self) -> f64 {
        1. / self.rate
    }
}

/// Generator which samples an empirical distribution by inverting its CDF.
pub struct EmpiricalGenerator {
    cdf: EmpiricalDistribution,
    scale: f64,
    rand: Pcg64,
}

impl EmpiricalGenerator {
    /// Creates generator whose values are the distribution samples multiplied by `scale`.
    pub fn new(cdf: EmpiricalDistribution, scale: f64, seed: u64) -> Self {
        Self {
            cdf,
            scale,
            rand: Pcg64::seed_from_u64(seed),
        }
    }
}

impl Generator for EmpiricalGenerator {
    fn next(&mut self) -> f64 {
        let p = self.rand.gen_range(0.0..1.0);
        self.scale * self.cdf.quantile(p)
    }

    fn mean(&self) -> f64 {
        self.scale * self.cdf.mean()
    }
}
