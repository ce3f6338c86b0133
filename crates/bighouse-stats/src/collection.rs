//! Registry of all metrics tracked by an experiment.

use indexmap::IndexMap;
use log::info;
use serde::{Deserialize, Serialize};

use crate::names::{MetricName, StatName, TimeWeightedStatName};
use crate::statistic::{Statistic, StatisticSettings};
use crate::time_weighted::TimeWeightedStatistic;

/// Holds the statistics of an experiment, implements the warm-up barrier between them
/// and the global convergence check.
///
/// Samples for metrics that were never registered are silently dropped.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatsCollection {
    stats: IndexMap<StatName, Statistic>,
    time_weighted: IndexMap<TimeWeightedStatName, TimeWeightedStatistic>,
    // warm-up metrics that have not yet discarded all of their warm-up samples
    warming: Vec<MetricName>,
    #[serde(skip)]
    fake: Option<Statistic>,
    #[serde(skip)]
    fake_time_weighted: Option<TimeWeightedStatistic>,
}

impl StatsCollection {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sampled metric.
    ///
    /// Panics if the metric is already registered.
    pub fn add_statistic(&mut self, name: StatName, settings: StatisticSettings) {
        self.insert_statistic(name, Statistic::new(name, settings));
    }

    /// Registers a sampled metric whose histogram uses preset bin edges.
    pub fn add_statistic_with_x_values(&mut self, name: StatName, settings: StatisticSettings, x_values: &[f64]) {
        self.insert_statistic(name, Statistic::with_x_values(name, settings, x_values));
    }

    fn insert_statistic(&mut self, name: StatName, mut stat: Statistic) {
        if self.stats.contains_key(&name) {
            panic!("Already added {}", name);
        }
        stat.set_other_stats_warmed(self.warming.is_empty());
        self.stats.insert(name, stat);
    }

    /// Registers a time-weighted metric.
    ///
    /// Panics if the metric is already registered.
    pub fn add_time_weighted_statistic(&mut self, name: TimeWeightedStatName, settings: StatisticSettings, window: f64) {
        if self.time_weighted.contains_key(&name) {
            panic!("Already added {}", name);
        }
        let mut stat = TimeWeightedStatistic::new(name, settings, window);
        stat.stat_mut().set_other_stats_warmed(self.warming.is_empty());
        self.time_weighted.insert(name, stat);
    }

    /// Makes every metric wait in warm-up until the given metric has discarded its warm-up samples.
    ///
    /// Unregistered metrics are ignored.
    pub fn set_warmup_metric(&mut self, name: impl Into<MetricName>) {
        let name = name.into();
        if !self.contains(name) || self.warming.contains(&name) {
            return;
        }
        self.warming.push(name);
        self.set_other_stats_warmed(false);
    }

    /// Returns true if the metric is registered.
    pub fn contains(&self, name: impl Into<MetricName>) -> bool {
        match name.into() {
            MetricName::Stat(name) => self.stats.contains_key(&name),
            MetricName::TimeWeighted(name) => self.time_weighted.contains_key(&name),
        }
    }

    /// Returns true if no metric is registered.
    pub fn is_empty(&self) -> bool {
        self.stats.is_empty() && self.time_weighted.is_empty()
    }

    /// Returns true if any time-weighted metric is registered.
    pub fn has_time_weighted(&self) -> bool {
        !self.time_weighted.is_empty()
    }

    /// Adds a sample to a sampled metric.
    pub fn add_sample(&mut self, name: StatName, value: f64) {
        let warmed = match self.stats.get_mut(&name) {
            Some(stat) => {
                stat.add_sample(value);
                stat.take_warm_report()
            }
            None => false,
        };
        if warmed {
            self.report_warmed(name.into());
        }
    }

    /// Records a new value of a time-weighted metric.
    pub fn add_time_weighted_sample(&mut self, name: TimeWeightedStatName, value: f64, time: f64) {
        let warmed = match self.time_weighted.get_mut(&name) {
            Some(stat) => {
                stat.add_sample(value, time);
                stat.take_warm_report()
            }
            None => false,
        };
        if warmed {
            self.report_warmed(name.into());
        }
    }

    fn report_warmed(&mut self, name: MetricName) {
        info!(target: "stats", "{} reported it is warm", name);
        let was_warming = self.warming.len();
        self.warming.retain(|n| *n != name);
        if self.warming.is_empty() && was_warming > 0 {
            self.set_other_stats_warmed(true);
        }
    }

    fn set_other_stats_warmed(&mut self, warmed: bool) {
        for stat in self.stats.values_mut() {
            stat.set_other_stats_warmed(warmed);
        }
        for stat in self.time_weighted.values_mut() {
            stat.stat_mut().set_other_stats_warmed(warmed);
        }
    }

    /// Returns the statistic of a sampled metric, or a no-op statistic if it is not registered.
    pub fn stat(&mut self, name: StatName) -> &mut Statistic {
        match self.stats.get_index_of(&name) {
            Some(index) => &mut self.stats[index],
            None => self.fake.insert(Statistic::fake(name)),
        }
    }

    /// Returns the statistic of a time-weighted metric, or a no-op statistic if it is not registered.
    pub fn time_weighted_stat(&mut self, name: TimeWeightedStatName) -> &mut TimeWeightedStatistic {
        match self.time_weighted.get_index_of(&name) {
            Some(index) => &mut self.time_weighted[index],
            None => self.fake_time_weighted.insert(TimeWeightedStatistic::fake(name)),
        }
    }

    /// Returns the registered statistic of a metric.
    pub fn get(&self, name: impl Into<MetricName>) -> Option<&Statistic> {
        match name.into() {
            MetricName::Stat(name) => self.stats.get(&name),
            MetricName::TimeWeighted(name) => self.time_weighted.get(&name).map(|s| s.stat()),
        }
    }

    /// Iterates over all registered statistics, time-weighted ones last.
    pub fn statistics(&self) -> impl Iterator<Item = &Statistic> {
        self.stats.values().chain(self.time_weighted.values().map(|s| s.stat()))
    }

    fn statistics_mut(&mut self) -> impl Iterator<Item = &mut Statistic> {
        self.stats
            .values_mut()
            .chain(self.time_weighted.values_mut().map(|s| s.stat_mut()))
    }

    /// Returns true if every registered metric has converged.
    pub fn all_converged(&self) -> bool {
        self.statistics().all(|s| s.is_converged())
    }

    /// Returns true if every registered metric is in steady state.
    pub fn all_steady_state(&self) -> bool {
        self.statistics().all(|s| s.is_steady_state())
    }

    /// Switches every metric to histogram-range-only calibration.
    pub fn set_just_bins(&mut self, just_bins: bool) {
        for stat in self.statistics_mut() {
            stat.set_just_bins(just_bins);
        }
    }

    /// Returns the histogram bin edges of every metric that has a histogram.
    pub fn histogram_x_values(&self) -> IndexMap<MetricName, Vec<f64>> {
        self.statistics()
            .filter_map(|s| s.histogram_x_values().map(|x| (s.name(), x.to_vec())))
            .collect()
    }

    /// Presets the histogram bin edges of registered metrics.
    pub fn set_histogram_x_values(&mut self, x_values: &IndexMap<MetricName, Vec<f64>>) {
        for stat in self.statistics_mut() {
            if let Some(x) = x_values.get(&stat.name()) {
                stat.set_histogram_x_values(x);
            }
        }
    }

    /// Returns one summary line per metric.
    pub fn summary(&self) -> Vec<String> {
        self.statistics().map(|s| s.summary()).collect()
    }

    /// Combines the metrics of two independent runs.
    ///
    /// Panics if the other collection misses a metric registered here.
    pub fn combine(&self, other: &StatsCollection) -> StatsCollection {
        let mut combined = StatsCollection::new();
        for (name, stat) in self.stats.iter() {
            let theirs = other
                .stats
                .get(name)
                .unwrap_or_else(|| panic!("Cannot combine collections: {} is missing", name));
            combined.stats.insert(*name, stat.combine(theirs));
        }
        for (name, stat) in self.time_weighted.iter() {
            let theirs = other
                .time_weighted
                .get(name)
                .unwrap_or_else(|| panic!("Cannot combine collections: {} is missing", name));
            combined.time_weighted.insert(*name, stat.combine(theirs));
        }
        combined
    }
}
