//! Sequential convergence detection for simulation output metrics.
//!
//! Every tracked metric is a [`Statistic`] that goes through warm-up, calibration and steady-state phases.
//! During calibration the sample stream is tested for independence with a runs test to find the lag spacing
//! needed to decorrelate it, and in steady state the retained samples feed running moments and a histogram
//! used for mean and quantile confidence estimates.

#![warn(missing_docs)]

pub mod chi_squared;
pub mod collection;
pub mod histogram;
pub mod names;
pub mod sequence;
pub mod simple;
pub mod statistic;
pub mod time_weighted;

pub use collection::StatsCollection;
pub use histogram::Histogram;
pub use names::{MetricName, StatName, TimeWeightedStatName};
pub use sequence::Sequence;
pub use simple::SimpleStatistic;
pub use statistic::{Phase, Statistic, StatisticSettings};
pub use time_weighted::TimeWeightedStatistic;

/// Z value of the two-sided 95% confidence interval.
pub const Z_95_CONFIDENCE: f64 = 1.96;

/// Minimum number of retained steady-state samples before a metric may report convergence.
pub const MIN_CONVERGE_SAMPLES: u64 = 100;
