//! Empirical distribution given by points of its CDF.

use serde::{Deserialize, Serialize};

/// Piecewise-linear distribution defined by CDF points `(x_i, y_i)`.
///
/// The first point must be `(0, 0)`, both coordinates must be non-decreasing and `y_i` must not exceed 1.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmpiricalDistribution {
    xs: Vec<f64>,
    ys: Vec<f64>,
    mean: f64,
}

impl EmpiricalDistribution {
    /// Creates a distribution from CDF points.
    ///
    /// Panics if the points do not describe a valid CDF.
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> Self {
        Self::try_new(xs, ys).unwrap_or_else(|e| panic!("Invalid empirical distribution: {}", e))
    }

    /// Creates a distribution from CDF points, returning an error if they do not describe a valid CDF.
    pub fn try_new(xs: Vec<f64>, ys: Vec<f64>) -> Result<Self, String> {
        if xs.len() != ys.len() {
            return Err(format!(
                "x and y vectors must have the same length, got {} and {}",
                xs.len(),
                ys.len()
            ));
        }
        if xs.is_empty() {
            return Err("no points".to_string());
        }
        if xs[0] != 0. || ys[0] != 0. {
            return Err(format!("the first point must be 0 0, got {} {}", xs[0], ys[0]));
        }
        let mut mean = 0.;
        for i in 1..xs.len() {
            if ys[i] < ys[i - 1] {
                return Err(format!("y values must be non-decreasing, ys[{}] = {} < {}", i, ys[i], ys[i - 1]));
            }
            if xs[i] < xs[i - 1] {
                return Err(format!("x values must be non-decreasing, xs[{}] = {} < {}", i, xs[i], xs[i - 1]));
            }
            if ys[i] > 1. {
                return Err(format!("probability can't be greater than 1, ys[{}] = {}", i, ys[i]));
            }
            mean += xs[i] * (ys[i] - ys[i - 1]);
        }
        Ok(Self { xs, ys, mean })
    }

    /// Parses lines of two whitespace-separated numbers `x y`, multiplying every `x` by `scale`.
    ///
    /// Empty lines and lines starting with `#` are skipped.
    pub fn parse(text: &str, scale: f64) -> Result<Self, String> {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() != 2 {
                return Err(format!("line {}: expected 2 values, got {}", line_no + 1, parts.len()));
            }
            let x: f64 = parts[0]
                .parse()
                .map_err(|e| format!("line {}: bad x value {:?}: {}", line_no + 1, parts[0], e))?;
            let y: f64 = parts[1]
                .parse()
                .map_err(|e| format!("line {}: bad y value {:?}: {}", line_no + 1, parts[1], e))?;
            xs.push(x * scale);
            ys.push(y);
        }
        Self::try_new(xs, ys)
    }

    /// Discretizes the exponential distribution with rate `lambda` into `bins` points spread over `[0, x_max]`.
    pub fn exponential(lambda: f64, bins: usize, x_max: f64) -> Self {
        assert!(bins >= 2, "Need at least 2 bins, got {}", bins);
        let step = x_max / (bins - 1) as f64;
        let xs: Vec<f64> = (0..bins).map(|i| step * i as f64).collect();
        let ys = xs.iter().map(|x| 1. - (-lambda * x).exp()).collect();
        Self::new(xs, ys)
    }

    /// Returns the mean of the distribution.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Returns the x coordinates of the CDF points.
    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    /// Returns the CDF values at the points.
    pub fn ys(&self) -> &[f64] {
        &self.ys
    }

    /// Returns the value below which the given fraction of the distribution lies.
    pub fn quantile(&self, quantile: f64) -> f64 {
        let bin = search_for_bin(&self.ys, quantile);
        interpolate_bin(&self.ys, &self.xs, bin, quantile)
    }

    /// Returns the fraction of the distribution below `x`.
    pub fn cdf_value(&self, x: f64) -> f64 {
        if x < self.xs[0] {
            return 0.;
        }
        let bin = search_for_bin(&self.xs, x);
        interpolate_bin(&self.xs, &self.ys, bin, x)
    }
}

/// Returns the index of the last point not greater than `value`, clamped to the valid range.
fn search_for_bin(values: &[f64], value: f64) -> usize {
    values.partition_point(|v| *v <= value).saturating_sub(1).min(values.len() - 1)
}

fn interpolate_bin(from: &[f64], to: &[f64], bin: usize, value: f64) -> f64 {
    if bin == from.len() - 1 {
        return to[bin];
    }
    let (x0, x1) = (from[bin], from[bin + 1]);
    let (y0, y1) = (to[bin], to[bin + 1]);
    if x1 == x0 {
        return y0;
    }
    (y1 - y0) / (x1 - x0) * (value - x0) + y0
}
