//! Fixed-resolution histogram used for quantile estimation.

use serde::{Deserialize, Serialize};

/// Histogram with fixed bin upper edges.
///
/// A sample lands in the first bin whose upper edge is not smaller than the sample,
/// samples beyond the last edge land in the last bin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    x_values: Vec<f64>,
    y_values: Vec<f64>,
}

impl Histogram {
    /// Creates a histogram with `n_bins` equal bins spanning `[min_value, max_value]`.
    pub fn new(n_bins: usize, min_value: f64, max_value: f64) -> Self {
        assert!(n_bins > 0, "Histogram needs at least one bin");
        let width = if max_value > min_value {
            max_value - min_value
        } else {
            // degenerate range of a constant stream
            min_value.abs().max(1.) * 1e-6
        };
        let delta = width / n_bins as f64;
        let x_values = (0..n_bins).map(|i| min_value + (i + 1) as f64 * delta).collect();
        Self {
            x_values,
            y_values: vec![0.; n_bins],
        }
    }

    /// Creates an empty histogram with the given bin upper edges.
    pub fn with_x_values(x_values: &[f64]) -> Self {
        assert!(!x_values.is_empty(), "Histogram needs at least one bin");
        assert!(
            x_values.windows(2).all(|w| w[0] < w[1]),
            "Histogram bin edges must be strictly increasing"
        );
        Self {
            x_values: x_values.to_vec(),
            y_values: vec![0.; x_values.len()],
        }
    }

    /// Adds a sample to its bin.
    pub fn add_sample(&mut self, value: f64) {
        let bin = self.x_values.partition_point(|&x| x < value).min(self.x_values.len() - 1);
        self.y_values[bin] += 1.;
    }

    /// Returns the bin upper edges.
    pub fn x_values(&self) -> &[f64] {
        &self.x_values
    }

    /// Returns the bin counts.
    pub fn y_values(&self) -> &[f64] {
        &self.y_values
    }

    /// Returns the total number of samples.
    pub fn total(&self) -> f64 {
        self.y_values.iter().sum()
    }

    // Lower edge of the first bin, assuming it has the same width as the second one.
    fn lower_edge(&self) -> f64 {
        if self.x_values.len() > 1 {
            2. * self.x_values[0] - self.x_values[1]
        } else {
            0.
        }
    }

    fn cdf(&self) -> Vec<f64> {
        let total = self.total();
        let mut running = 0.;
        self.y_values
            .iter()
            .map(|y| {
                running += y / total;
                running
            })
            .collect()
    }

    /// Returns the value below which the given fraction of samples lies, interpolating inside the bin.
    pub fn quantile(&self, quantile: f64) -> f64 {
        if self.total() == 0. {
            return 0.;
        }
        let cdf = self.cdf();
        let bin = cdf.partition_point(|&c| c < quantile).min(cdf.len() - 1);
        let (bottom_cdf, bottom_x) = if bin == 0 {
            (0., self.lower_edge())
        } else {
            (cdf[bin - 1], self.x_values[bin - 1])
        };
        interpolate(bottom_cdf, cdf[bin], bottom_x, self.x_values[bin], quantile)
    }

    /// Returns the fraction of samples below the given value, interpolating inside the bin.
    pub fn cdf_value(&self, x: f64) -> f64 {
        if self.total() == 0. {
            return 0.;
        }
        let cdf = self.cdf();
        let bin = self.x_values.partition_point(|&v| v < x).min(cdf.len() - 1);
        let (bottom_x, bottom_cdf) = if bin == 0 {
            (self.lower_edge(), 0.)
        } else {
            (self.x_values[bin - 1], cdf[bin - 1])
        };
        interpolate(bottom_x, self.x_values[bin], bottom_cdf, cdf[bin], x).clamp(0., 1.)
    }

    /// Returns a histogram with bin-wise summed counts.
    ///
    /// Panics if the histograms have different bin edges.
    pub fn combine(&self, other: &Histogram) -> Histogram {
        let same_edges = self.x_values.len() == other.x_values.len()
            && self
                .x_values
                .iter()
                .zip(other.x_values.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits());
        if !same_edges {
            panic!("Cannot combine histograms with different x values");
        }
        Histogram {
            x_values: self.x_values.clone(),
            y_values: self
                .y_values
                .iter()
                .zip(other.y_values.iter())
                .map(|(a, b)| a + b)
                .collect(),
        }
    }
}

fn interpolate(bottom_x: f64, top_x: f64, bottom_y: f64, top_y: f64, x: f64) -> f64 {
    if top_x == bottom_x {
        return top_y;
    }
    bottom_y + (top_y - bottom_y) / (top_x - bottom_x) * (x - bottom_x)
}
