//! Per-metric convergence detector.

use std::cell::Cell;
use std::collections::BTreeSet;

use log::info;
use serde::{Deserialize, Serialize};

use crate::histogram::Histogram;
use crate::names::MetricName;
use crate::sequence::Sequence;
use crate::simple::SimpleStatistic;
use crate::{MIN_CONVERGE_SAMPLES, Z_95_CONFIDENCE};

/// Phase of a statistic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Samples are discarded until the warm-up count is reached and all warm-up metrics are warm.
    Warmup,
    /// Samples are buffered to find the lag spacing and the histogram range.
    Calibration,
    /// Every lag-th sample is retained.
    SteadyState,
}

/// Accuracy targets and calibration parameters of a statistic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticSettings {
    /// Number of samples discarded during warm-up.
    pub warmup_samples: u64,
    /// Required relative half-width of the 95% confidence interval of the mean.
    pub mean_accuracy: f64,
    /// Target quantile, e.g. 0.95.
    pub quantile: f64,
    /// Required relative half-width of the 95% confidence interval of the target quantile.
    pub quantile_accuracy: f64,
    /// Largest lag spacing tried during calibration.
    pub max_lag: usize,
    /// Number of run-length buckets of the runs test.
    pub max_run: usize,
    /// Confidence of the runs test.
    pub lag_confidence: f64,
    /// Number of samples buffered during calibration.
    pub calibration_samples: usize,
    /// Number of samples buffered during calibration when only the histogram range is needed.
    pub just_bins_samples: usize,
    /// Number of histogram bins.
    pub histogram_bins: usize,
}

impl Default for StatisticSettings {
    fn default() -> Self {
        Self {
            warmup_samples: 0,
            mean_accuracy: 0.05,
            quantile: 0.95,
            quantile_accuracy: 0.05,
            max_lag: 40,
            max_run: 50,
            lag_confidence: 0.99,
            calibration_samples: 5000,
            just_bins_samples: 100,
            histogram_bins: 10000,
        }
    }
}

impl StatisticSettings {
    /// Creates settings with the given targets and default calibration parameters.
    pub fn new(warmup_samples: u64, mean_accuracy: f64, quantile: f64, quantile_accuracy: f64) -> Self {
        Self {
            warmup_samples,
            mean_accuracy,
            quantile,
            quantile_accuracy,
            ..Default::default()
        }
    }
}

/// Online estimator of the mean and a quantile of a metric, which detects when enough
/// decorrelated samples were collected to meet the accuracy targets.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Statistic {
    name: MetricName,
    settings: StatisticSettings,
    phase: Phase,
    other_stats_warmed: bool,
    warm_reported: bool,
    warm_report_pending: bool,
    just_bins: bool,
    fake: bool,
    combined: bool,
    lineage: BTreeSet<u64>,

    good_samples: u64,
    discarded_warmup_samples: u64,
    discarded_steady_state_samples: u64,
    calibration_samples: u64,
    total_samples: u64,

    calibration: Sequence,
    lag: usize,
    histogram: Option<Histogram>,
    simple: SimpleStatistic,

    #[serde(skip)]
    quantile_accuracy_cache: Cell<Option<(u64, f64)>>,
}

impl Statistic {
    /// Creates a statistic in the warm-up phase.
    pub fn new(name: impl Into<MetricName>, settings: StatisticSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            phase: Phase::Warmup,
            other_stats_warmed: false,
            warm_reported: false,
            warm_report_pending: false,
            just_bins: false,
            fake: false,
            combined: false,
            lineage: BTreeSet::from([rand::random::<u64>()]),
            good_samples: 0,
            discarded_warmup_samples: 0,
            discarded_steady_state_samples: 0,
            calibration_samples: 0,
            total_samples: 0,
            calibration: Sequence::new(),
            lag: 1,
            histogram: None,
            simple: SimpleStatistic::new(),
            quantile_accuracy_cache: Cell::new(None),
        }
    }

    /// Creates a statistic whose histogram uses the given bin edges instead of the calibrated range.
    pub fn with_x_values(name: impl Into<MetricName>, settings: StatisticSettings, x_values: &[f64]) -> Self {
        let mut stat = Self::new(name, settings);
        stat.histogram = Some(Histogram::with_x_values(x_values));
        stat
    }

    /// Creates a statistic that silently ignores all samples.
    pub(crate) fn fake(name: impl Into<MetricName>) -> Self {
        let mut stat = Self::new(name, StatisticSettings::default());
        stat.fake = true;
        stat
    }

    /// Adds a sample.
    ///
    /// Panics if the statistic is a combination of other statistics or if the sample accounting breaks.
    pub fn add_sample(&mut self, value: f64) {
        if self.fake {
            return;
        }
        if self.combined {
            panic!("Shouldn't add samples to {} after being combined", self.name);
        }
        if self.phase == Phase::Warmup && self.is_warm() && self.other_stats_warmed {
            self.enter_calibration();
        }
        match self.phase {
            Phase::Warmup => {
                self.discarded_warmup_samples += 1;
                if self.is_warm() && !self.warm_reported {
                    self.warm_reported = true;
                    self.warm_report_pending = true;
                }
            }
            Phase::Calibration => {
                self.calibration.insert(value);
                self.calibration_samples += 1;
                if self.just_bins && self.calibration.len() >= self.settings.just_bins_samples {
                    let min_value = self.calibration.min_value();
                    let max_value = self.calibration.max_value();
                    info!(
                        target: "stats",
                        "{} creating histogram with min {} max {}", self.name, min_value / 2., max_value * 2.
                    );
                    self.histogram = Some(Histogram::new(self.settings.histogram_bins, min_value / 2., max_value * 2.));
                    self.enter_steady_state();
                } else if self.calibration.len() >= self.settings.calibration_samples {
                    self.lag = self.calibration.calculate_lag_spacing(
                        self.settings.max_lag,
                        self.settings.max_run,
                        self.settings.lag_confidence,
                    );
                    if self.histogram.is_none() {
                        let min_value = self.calibration.min_value();
                        let max_value = self.calibration.max_value();
                        info!(
                            target: "stats",
                            "{} creating histogram with min {} max {}", self.name, min_value, max_value
                        );
                        self.histogram = Some(Histogram::new(self.settings.histogram_bins, min_value, max_value));
                    }
                    self.enter_steady_state();
                }
            }
            Phase::SteadyState => {
                if self.total_samples % self.lag as u64 == 0 {
                    self.keep_sample(value);
                } else {
                    self.discarded_steady_state_samples += 1;
                }
            }
        }
        self.total_samples += 1;
        self.check_accounting();
    }

    fn is_warm(&self) -> bool {
        self.discarded_warmup_samples >= self.settings.warmup_samples
    }

    fn enter_calibration(&mut self) {
        self.phase = Phase::Calibration;
        info!(target: "stats", "{} entered calibration", self.name);
    }

    fn enter_steady_state(&mut self) {
        self.phase = Phase::SteadyState;
        // the buffered values are no longer needed, only their count
        self.calibration.clear();
        info!(target: "stats", "{} entered steady state, lag spacing of {}", self.name, self.lag);
    }

    fn keep_sample(&mut self, value: f64) {
        self.simple.add_sample(value);
        if let Some(histogram) = self.histogram.as_mut() {
            histogram.add_sample(value);
        }
        self.good_samples += 1;
    }

    fn check_accounting(&self) {
        let accounted = self.good_samples
            + self.discarded_warmup_samples
            + self.discarded_steady_state_samples
            + self.calibration_samples;
        if self.total_samples != accounted {
            panic!(
                "{}: total samples {} != good samples {} + calibration samples {} + discarded steady state samples {} + discarded warmup samples {}",
                self.name,
                self.total_samples,
                self.good_samples,
                self.calibration_samples,
                self.discarded_steady_state_samples,
                self.discarded_warmup_samples
            );
        }
    }

    /// Returns true once after the statistic has discarded all of its warm-up samples.
    pub(crate) fn take_warm_report(&mut self) -> bool {
        std::mem::replace(&mut self.warm_report_pending, false)
    }

    /// Lets the statistic leave warm-up once it is warm itself.
    pub fn set_other_stats_warmed(&mut self, warmed: bool) {
        self.other_stats_warmed = warmed;
    }

    /// Switches calibration to only determine the histogram range from a small number of samples.
    pub fn set_just_bins(&mut self, just_bins: bool) {
        self.just_bins = just_bins;
    }

    /// Replaces the histogram with an empty one using the given bin edges.
    pub fn set_histogram_x_values(&mut self, x_values: &[f64]) {
        self.histogram = Some(Histogram::with_x_values(x_values));
        self.quantile_accuracy_cache.set(None);
    }

    /// Returns the histogram bin edges, if the histogram exists.
    pub fn histogram_x_values(&self) -> Option<&[f64]> {
        self.histogram.as_ref().map(|h| h.x_values())
    }

    /// Returns the histogram, if it exists.
    pub fn histogram(&self) -> Option<&Histogram> {
        self.histogram.as_ref()
    }

    /// Returns the metric name.
    pub fn name(&self) -> MetricName {
        self.name
    }

    /// Returns the settings.
    pub fn settings(&self) -> &StatisticSettings {
        &self.settings
    }

    /// Returns the current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the lag spacing found during calibration.
    pub fn lag(&self) -> usize {
        self.lag
    }

    /// Returns true for the no-op statistic handed out for unregistered metrics.
    pub fn is_fake(&self) -> bool {
        self.fake
    }

    /// Returns true if the statistic was produced by [`combine`](Self::combine).
    pub fn is_combined(&self) -> bool {
        self.combined
    }

    /// Returns the number of retained steady-state samples.
    pub fn good_samples(&self) -> u64 {
        self.good_samples
    }

    /// Returns the number of samples discarded during warm-up.
    pub fn discarded_warmup_samples(&self) -> u64 {
        self.discarded_warmup_samples
    }

    /// Returns the number of steady-state samples skipped by the lag spacing.
    pub fn discarded_steady_state_samples(&self) -> u64 {
        self.discarded_steady_state_samples
    }

    /// Returns the number of samples consumed by calibration.
    pub fn calibration_samples(&self) -> u64 {
        self.calibration_samples
    }

    /// Returns the number of samples added.
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    /// Returns the mean of retained samples.
    pub fn average(&self) -> f64 {
        self.simple.average()
    }

    /// Returns the standard deviation of retained samples.
    pub fn std_dev(&self) -> f64 {
        self.simple.std_dev()
    }

    /// Returns the sum of retained samples.
    pub fn total_accumulation(&self) -> f64 {
        self.simple.total_accumulation()
    }

    /// Returns the running moments of retained samples.
    pub fn simple_statistic(&self) -> &SimpleStatistic {
        &self.simple
    }

    /// Returns the target quantile.
    pub fn target_quantile(&self) -> f64 {
        self.settings.quantile
    }

    /// Returns the estimated quantile, or 0 if there is no histogram yet.
    pub fn quantile(&self, quantile: f64) -> f64 {
        match &self.histogram {
            Some(histogram) => histogram.quantile(quantile),
            None => 0.,
        }
    }

    /// Returns the estimated CDF value, or 0 if there is no histogram yet.
    pub fn cdf_value(&self, x: f64) -> f64 {
        match &self.histogram {
            Some(histogram) => histogram.cdf_value(x),
            None => 0.,
        }
    }

    /// Returns the relative half-width of the 95% confidence interval of the mean.
    pub fn mean_accuracy(&self) -> f64 {
        if self.good_samples == 0 {
            return f64::INFINITY;
        }
        let std_dev = self.std_dev();
        if std_dev == 0. {
            return 0.;
        }
        Z_95_CONFIDENCE * std_dev / (self.good_samples as f64).sqrt() / self.average().abs()
    }

    /// Returns the relative half-width of the 95% confidence interval of the target quantile.
    ///
    /// The interval bounds are the histogram quantiles at `p -/+ z * sqrt(p (1 - p) / n)`.
    pub fn quantile_accuracy(&self) -> f64 {
        if let Some((samples, accuracy)) = self.quantile_accuracy_cache.get() {
            if samples == self.good_samples {
                return accuracy;
            }
        }
        let accuracy = self.compute_quantile_accuracy();
        self.quantile_accuracy_cache.set(Some((self.good_samples, accuracy)));
        accuracy
    }

    fn compute_quantile_accuracy(&self) -> f64 {
        let histogram = match &self.histogram {
            Some(histogram) if self.good_samples > 0 => histogram,
            _ => return f64::INFINITY,
        };
        let p = self.settings.quantile;
        let delta = Z_95_CONFIDENCE * (p * (1. - p) / self.good_samples as f64).sqrt();
        let low = histogram.quantile((p - delta).max(0.));
        let high = histogram.quantile((p + delta).min(1.));
        let half_width = (high - low) / 2.;
        if half_width == 0. {
            return 0.;
        }
        half_width / histogram.quantile(p).abs()
    }

    /// Returns true if the mean meets its accuracy target.
    pub fn is_mean_converged(&self) -> bool {
        self.mean_accuracy() < self.settings.mean_accuracy
    }

    /// Returns true if the target quantile meets its accuracy target.
    pub fn is_quantile_converged(&self) -> bool {
        self.quantile_accuracy() < self.settings.quantile_accuracy
    }

    /// Returns true in the steady-state phase.
    pub fn is_steady_state(&self) -> bool {
        self.phase == Phase::SteadyState
    }

    /// Returns true if the statistic is in steady state, has enough retained samples
    /// and both the mean and the target quantile meet their accuracy targets.
    pub fn is_converged(&self) -> bool {
        self.good_samples >= MIN_CONVERGE_SAMPLES
            && self.is_steady_state()
            && self.is_mean_converged()
            && self.is_quantile_converged()
    }

    /// Combines two statistics of the same metric collected by independent runs.
    ///
    /// Counts and moments are summed, histograms are summed bin-wise and the result is already in steady state.
    /// Panics if the metrics differ, if either side has no histogram, if the histogram bins differ
    /// or if the same samples would be counted twice.
    pub fn combine(&self, other: &Statistic) -> Statistic {
        if self.name != other.name {
            panic!("Cannot combine statistics of different metrics {} and {}", self.name, other.name);
        }
        if !self.lineage.is_disjoint(&other.lineage) {
            panic!("Cannot combine {} with a statistic it already includes", self.name);
        }
        let histogram = match (&self.histogram, &other.histogram) {
            (Some(mine), Some(theirs)) => mine.combine(theirs),
            _ => panic!("Cannot combine {} before both histograms are built", self.name),
        };
        Statistic {
            name: self.name,
            settings: self.settings.clone(),
            phase: Phase::SteadyState,
            other_stats_warmed: true,
            warm_reported: true,
            warm_report_pending: false,
            just_bins: false,
            fake: false,
            combined: true,
            lineage: self.lineage.union(&other.lineage).copied().collect(),
            good_samples: self.good_samples + other.good_samples,
            discarded_warmup_samples: self.discarded_warmup_samples.min(other.discarded_warmup_samples),
            discarded_steady_state_samples: self.discarded_steady_state_samples + other.discarded_steady_state_samples,
            calibration_samples: self.calibration_samples + other.calibration_samples,
            total_samples: self.total_samples + other.total_samples,
            calibration: Sequence::new(),
            lag: self.lag,
            histogram: Some(histogram),
            simple: self.simple.combine(&other.simple),
            quantile_accuracy_cache: Cell::new(None),
        }
    }

    /// Returns a one-line description of the current estimates.
    pub fn summary(&self) -> String {
        format!(
            "name: {}, average: {}, average accuracy: {}, quantile target: {}, quantile: {}, quantile accuracy: {}, \
            good samples: {}, warmup samples: {}, calibration samples: {}, std dev: {}, lag: {}",
            self.name,
            self.average(),
            self.mean_accuracy(),
            self.target_quantile(),
            self.quantile(self.target_quantile()),
            self.quantile_accuracy(),
            self.good_samples,
            self.discarded_warmup_samples,
            self.calibration_samples,
            self.std_dev(),
            self.lag
        )
    }
}
