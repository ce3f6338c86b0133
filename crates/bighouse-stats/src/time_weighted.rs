//! Statistic of a continuously observed step-function signal.

use serde::{Deserialize, Serialize};

use crate::names::TimeWeightedStatName;
use crate::statistic::{Statistic, StatisticSettings};

/// Default length of the integration window in seconds.
pub const DEFAULT_WINDOW: f64 = 0.01;

/// Integrates a piecewise-constant signal over fixed windows and feeds the window averages
/// (area under the signal divided by the window length) into a [`Statistic`].
///
/// A sample `(value, time)` means that the signal has value `value` from `time` until the next sample.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeWeightedStatistic {
    name: TimeWeightedStatName,
    stat: Statistic,
    window: f64,
    window_start: f64,
    last_time: f64,
    last_value: Option<f64>,
    area: f64,
}

impl TimeWeightedStatistic {
    /// Creates a time-weighted statistic with the given window length.
    pub fn new(name: TimeWeightedStatName, settings: StatisticSettings, window: f64) -> Self {
        assert!(window > 0., "Time-weighted window must be positive, got {}", window);
        Self::from_statistic(name, Statistic::new(name, settings), window)
    }

    pub(crate) fn from_statistic(name: TimeWeightedStatName, stat: Statistic, window: f64) -> Self {
        Self {
            name,
            stat,
            window,
            window_start: 0.,
            last_time: 0.,
            last_value: None,
            area: 0.,
        }
    }

    pub(crate) fn fake(name: TimeWeightedStatName) -> Self {
        Self::from_statistic(name, Statistic::fake(name), DEFAULT_WINDOW)
    }

    /// Records that the signal changed to `value` at `time`.
    ///
    /// Every window completed since the previous sample produces one sample of the inner statistic.
    pub fn add_sample(&mut self, value: f64, time: f64) {
        if self.stat.is_fake() {
            return;
        }
        let previous = match self.last_value.replace(value) {
            Some(previous) => previous,
            None => {
                self.window_start = time;
                self.last_time = time;
                return;
            }
        };
        if time < self.last_time {
            panic!(
                "{}: sample at {} is older than the previous sample at {}",
                self.name, time, self.last_time
            );
        }
        while time >= self.window_start + self.window {
            let window_end = self.window_start + self.window;
            self.area += previous * (window_end - self.last_time);
            let average = self.area / self.window;
            if average < 0. {
                panic!(
                    "{}: window average is negative ({}) for value {} in window starting at {}",
                    self.name, average, previous, self.window_start
                );
            }
            self.stat.add_sample(average);
            self.area = 0.;
            self.last_time = window_end;
            self.window_start = window_end;
        }
        self.area += previous * (time - self.last_time);
        self.last_time = time;
    }

    /// Returns the metric name.
    pub fn name(&self) -> TimeWeightedStatName {
        self.name
    }

    /// Returns the window length.
    pub fn window(&self) -> f64 {
        self.window
    }

    /// Changes the window length, which is only allowed before the first sample.
    pub fn set_window(&mut self, window: f64) {
        assert!(self.last_value.is_none(), "Cannot change the window of {} after sampling started", self.name);
        assert!(window > 0., "Time-weighted window must be positive, got {}", window);
        self.window = window;
    }

    /// Returns the statistic of window averages.
    pub fn stat(&self) -> &Statistic {
        &self.stat
    }

    /// Returns the statistic of window averages.
    pub fn stat_mut(&mut self) -> &mut Statistic {
        &mut self.stat
    }

    pub(crate) fn take_warm_report(&mut self) -> bool {
        self.stat.take_warm_report()
    }

    /// Combines the window-average statistics of two independent runs.
    pub fn combine(&self, other: &TimeWeightedStatistic) -> TimeWeightedStatistic {
        Self::from_statistic(self.name, self.stat.combine(&other.stat), self.window)
    }
}
