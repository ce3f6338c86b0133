//! Running moments of a sample stream.

use serde::{Deserialize, Serialize};

/// Keeps the count, sum, sum of squares, minimum and maximum of the samples added to it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimpleStatistic {
    count: f64,
    sum: f64,
    sum_sq: f64,
    min: f64,
    max: f64,
}

impl Default for SimpleStatistic {
    fn default() -> Self {
        Self::new()
    }
}

impl SimpleStatistic {
    /// Creates an empty statistic.
    pub fn new() -> Self {
        Self {
            count: 0.,
            sum: 0.,
            sum_sq: 0.,
            min: f64::MAX,
            max: f64::MIN,
        }
    }

    /// Adds a sample.
    pub fn add_sample(&mut self, value: f64) {
        self.count += 1.;
        self.sum += value;
        self.sum_sq += value * value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Returns the number of samples.
    pub fn count(&self) -> u64 {
        self.count as u64
    }

    /// Returns the sample mean, or 0 if there are no samples.
    pub fn average(&self) -> f64 {
        if self.count == 0. {
            return 0.;
        }
        self.sum / self.count
    }

    /// Returns the sample standard deviation, or 0 if there are less than two samples.
    pub fn std_dev(&self) -> f64 {
        if self.count < 2. {
            return 0.;
        }
        let numerator = self.count * self.sum_sq - self.sum * self.sum;
        // rounding may make the numerator slightly negative for constant streams
        (numerator.max(0.) / (self.count * (self.count - 1.))).sqrt()
    }

    /// Returns the sum of all samples.
    pub fn total_accumulation(&self) -> f64 {
        self.sum
    }

    /// Returns the smallest sample (`f64::MAX` if empty).
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Returns the largest sample (`f64::MIN` if empty).
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Returns a statistic describing the union of both sample sets.
    pub fn combine(&self, other: &SimpleStatistic) -> SimpleStatistic {
        SimpleStatistic {
            count: self.count + other.count,
            sum: self.sum + other.sum,
            sum_sq: self.sum_sq + other.sum_sq,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}
