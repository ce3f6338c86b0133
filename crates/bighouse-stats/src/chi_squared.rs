//! Chi-squared distribution quantiles.

use statrs::function::gamma::gamma_lr;

/// Cumulative distribution function of the chi-squared distribution.
pub fn chi_squared_cdf(x: f64, degrees_freedom: usize) -> f64 {
    if x <= 0. {
        return 0.;
    }
    gamma_lr(degrees_freedom as f64 / 2., x / 2.)
}

/// Returns `x` such that `chi_squared_cdf(x, degrees_freedom) == quantile`.
pub fn chi_squared_quantile(quantile: f64, degrees_freedom: usize) -> f64 {
    assert!(
        (0. ..1.).contains(&quantile),
        "Chi-squared quantile must be in [0, 1), got {}",
        quantile
    );
    assert!(degrees_freedom > 0, "Chi-squared distribution needs positive degrees of freedom");
    if quantile == 0. {
        return 0.;
    }
    let mut low = 0.;
    let mut high = degrees_freedom as f64 + 1.;
    while chi_squared_cdf(high, degrees_freedom) < quantile {
        low = high;
        high *= 2.;
    }
    for _ in 0..200 {
        let mid = 0.5 * (low + high);
        if chi_squared_cdf(mid, degrees_freedom) < quantile {
            low = mid;
        } else {
            high = mid;
        }
        if high - low < 1e-12 * high.max(1.) {
            break;
        }
    }
    0.5 * (low + high)
}
