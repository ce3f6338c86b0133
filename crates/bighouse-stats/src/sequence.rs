//! Calibration buffer and the runs test used to find a decorrelating lag spacing.

use serde::{Deserialize, Serialize};

use crate::chi_squared::chi_squared_quantile;
use crate::simple::SimpleStatistic;

/// A buffered sequence of raw samples.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Sequence {
    values: Vec<f64>,
    stat: SimpleStatistic,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum RunState {
    // seen one value of a new run, direction unknown
    First,
    // seen two values, the next comparison decides the direction
    Second,
    Up,
    Down,
}

impl Sequence {
    /// Creates an empty sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value.
    pub fn insert(&mut self, value: f64) {
        self.values.push(value);
        self.stat.add_sample(value);
    }

    /// Returns the buffered values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Returns the number of buffered values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing was buffered.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the smallest buffered value.
    pub fn min_value(&self) -> f64 {
        self.stat.min()
    }

    /// Returns the largest buffered value.
    pub fn max_value(&self) -> f64 {
        self.stat.max()
    }

    /// Drops the buffered values.
    pub fn clear(&mut self) {
        self.values = Vec::new();
        self.stat = SimpleStatistic::new();
    }

    /// Returns the smallest lag spacing for which the spaced sequence looks independent by the runs test.
    ///
    /// Panics if no spacing up to `max_lag_spacing` passes the test.
    pub fn calculate_lag_spacing(&self, max_lag_spacing: usize, max_run: usize, confidence: f64) -> usize {
        let mut spacing = 1;
        loop {
            let spaced = spaced_sequence(&self.values, spacing);
            if is_independent_by_runs_test(&run_counts(&spaced, max_run), confidence) {
                return spacing;
            }
            spacing += 1;
            if spacing > max_lag_spacing {
                panic!(
                    "Needed lag spacing exceeds the maximum of {} for a sequence of {} values",
                    max_lag_spacing,
                    self.values.len()
                );
            }
        }
    }
}

/// Counts monotone runs by length (Knuth's runs up and down, the value after a run is skipped).
///
/// Runs longer than `max_run` are counted in the last bucket.
pub fn run_counts(values: &[f64], max_run: usize) -> Vec<u64> {
    assert!(max_run > 0, "Maximum run length must be positive");
    let mut counts = vec![0; max_run];
    let mut state = RunState::First;
    let mut run_length = 0;
    let mut last_value = 0.;
    for &value in values {
        match state {
            RunState::First => state = RunState::Second,
            RunState::Second => {
                if value > last_value {
                    state = RunState::Up;
                    run_length = 1;
                } else if value < last_value {
                    state = RunState::Down;
                    run_length = 1;
                }
            }
            RunState::Up | RunState::Down => {
                let continues = if state == RunState::Up {
                    value > last_value
                } else {
                    value < last_value
                };
                if continues {
                    run_length += 1;
                } else {
                    // the value breaking the run does not start the next one
                    counts[run_length.min(max_run) - 1] += 1;
                    state = RunState::First;
                    run_length = 0;
                }
            }
        }
        last_value = value;
    }
    counts
}

/// Tests whether the run counts are consistent with an independent sequence.
///
/// Compares `sum((c_k - N p_k)^2 / (N p_k))` against the chi-squared quantile with as many degrees of freedom
/// as there are buckets. For the counting done by [`run_counts`] a run of `k` steps has probability
/// `p_k = 2 (k + 1) / (k + 2)!`, and the last bucket holds the tail `2 / (m + 1)!`.
pub fn is_independent_by_runs_test(run_counts: &[u64], confidence: f64) -> bool {
    let total: f64 = run_counts.iter().map(|&c| c as f64).sum();
    if total == 0. {
        // a constant sequence has no runs and nothing to decorrelate
        return true;
    }
    let buckets = run_counts.len();
    // (k + 1)! for the current run length k
    let mut factorial = 1.;
    let mut test_statistic = 0.;
    for (i, &count) in run_counts.iter().enumerate() {
        let k = (i + 1) as f64;
        factorial *= k + 1.;
        let probability = if i + 1 == buckets {
            2. / factorial
        } else {
            2. * (k + 1.) / (factorial * (k + 2.))
        };
        let expected = total * probability;
        let diff = count as f64 - expected;
        test_statistic += diff * diff / expected;
    }
    test_statistic < chi_squared_quantile(confidence, buckets)
}

/// Returns every `spacing`-th element, starting with the first one.
pub fn spaced_sequence(values: &[f64], spacing: usize) -> Vec<f64> {
    let n_items = values.len() / spacing;
    values.iter().step_by(spacing).take(n_items).copied().collect()
}
