//! Numeric primitives shared by the mixture models: Gaussian CDF/PDF, the
//! log-normal family, and a numerically stable `logsumexp`.

use ndarray::{Array1, Array2, Axis};
use statrs::function::erf::erf;
use std::f64::consts::{PI, SQRT_2};

use crate::error::{Error, Result};

/// Lower clamp applied to every scale parameter and to every value that
/// would otherwise be passed to `ln` in a log-scale family.
pub const EPS: f64 = 1e-12;

/// `Φ(x; μ, σ)`, with `σ` lower-clamped to [`EPS`].
pub fn normal_cdf(x: f64, mu: f64, sigma: f64) -> f64 {
    let sigma = sigma.max(EPS);
    let z = (x - mu) / (sigma * SQRT_2);
    0.5 * (1.0 + erf(z))
}

/// `ln φ(x; μ, σ)`, with `σ` lower-clamped to [`EPS`].
pub fn normal_lpdf(x: f64, mu: f64, sigma: f64) -> f64 {
    let sigma = sigma.max(EPS);
    let z = (x - mu) / sigma;
    -0.5 * z * z - sigma.ln() - 0.5 * (2.0 * PI).ln()
}

/// `Φ_lognormal(x; μ, σ)`, defined only for `x >= 0`. Values below [`EPS`]
/// are clamped before taking the log, so the result is ≈0 rather than NaN.
pub fn lognormal_cdf(x: f64, mu: f64, sigma: f64) -> Result<f64> {
    if x < 0.0 {
        return Err(Error::InvalidArgument(format!(
            "negative argument to lognormal_cdf: {x}"
        )));
    }
    let sigma = sigma.max(EPS);
    let top = x.max(EPS).ln() - mu;
    let bottom = sigma * SQRT_2;
    Ok(0.5 * (1.0 + erf(top / bottom)))
}

/// `ln p_lognormal(x; μ, σ) = -½((ln x − μ)/σ)² − ln(σ x √(2π))`.
///
/// `x` must be strictly positive; callers that may pass `x <= 0` should
/// clamp to [`EPS`] first (the discretized samplers always do).
pub fn lognormal_lpdf(x: f64, mu: f64, sigma: f64) -> f64 {
    let sigma = sigma.max(EPS);
    let x = x.max(EPS);
    let z = (x.ln() - mu) / sigma;
    -0.5 * z * z - (sigma * x * (2.0 * PI).sqrt()).ln()
}

/// `ln(Φ_lognormal(x) − Φ_lognormal(x−q))`, the log-mass of a quantization
/// bin under the log-normal density.
///
/// When `q / x` is tiny, the direct CDF subtraction loses precision to
/// catastrophic cancellation; in that regime we fall back to a
/// midpoint-rule approximation using the density itself, which is accurate
/// to `O((q/x)^2)`.
pub fn qlognormal_lpdf(x: f64, mu: f64, sigma: f64, q: f64) -> Result<f64> {
    if q / x.max(EPS) < 1e-4 {
        return Ok(lognormal_lpdf(x, mu, sigma) + q.max(EPS).ln());
    }
    let hi = lognormal_cdf(x, mu, sigma)?;
    let lo = lognormal_cdf((x - q).max(0.0), mu, sigma)?;
    Ok((hi - lo).max(EPS).ln())
}

/// Row-wise `log(sum(exp(.)))`, stabilized by subtracting each row's max.
/// Does not produce NaN/Inf for entries in `[-1e300, 1e300]`.
pub fn logsumexp_rows(m: &Array2<f64>) -> Array1<f64> {
    let row_max = m.fold_axis(Axis(1), f64::NEG_INFINITY, |&a, &b| a.max(b));
    let mut out = Array1::zeros(m.nrows());
    for (i, row) in m.axis_iter(Axis(0)).enumerate() {
        let rmax = row_max[i];
        if rmax.is_infinite() {
            out[i] = rmax;
            continue;
        }
        let sum: f64 = row.iter().map(|&x| (x - rmax).exp()).sum();
        out[i] = sum.ln() + rmax;
    }
    out
}

/// `log(sum(exp(.)))` over a flat slice, stabilized the same way.
pub fn logsumexp(xs: &[f64]) -> f64 {
    let rmax = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if rmax.is_infinite() {
        return rmax;
    }
    let sum: f64 = xs.iter().map(|&x| (x - rmax).exp()).sum();
    sum.ln() + rmax
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr2;

    #[test]
    fn normal_cdf_at_mean_is_half() {
        assert_relative_eq!(normal_cdf(0.0, 0.0, 1.0), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn normal_cdf_clamps_degenerate_sigma() {
        // should not divide by zero or panic
        let p = normal_cdf(1.0, 0.0, 0.0);
        assert!(p.is_finite());
        assert!(p > 0.5);
    }

    #[test]
    fn lognormal_cdf_rejects_negative_x() {
        assert!(lognormal_cdf(-1.0, 0.0, 1.0).is_err());
    }

    #[test]
    fn lognormal_cdf_near_zero_is_near_zero() {
        let p = lognormal_cdf(1e-30, 0.0, 1.0).unwrap();
        assert!(p < 1e-3);
    }

    #[test]
    fn logsumexp_matches_naive_for_small_values() {
        let xs = [0.1, 0.2, -0.3];
        let naive = xs.iter().map(|x| x.exp()).sum::<f64>().ln();
        assert_relative_eq!(logsumexp(&xs), naive, epsilon = 1e-10);
    }

    #[test]
    fn logsumexp_handles_extreme_magnitudes() {
        let xs = [1e300, 1e300 - 1.0, -1e300];
        let r = logsumexp(&xs);
        assert!(r.is_finite());
    }

    #[test]
    fn logsumexp_rows_matches_logsumexp_per_row() {
        let m = arr2(&[[0.1, 0.2, -0.3], [5.0, 5.0, 5.0]]);
        let rows = logsumexp_rows(&m);
        assert!((rows[0] - logsumexp(&[0.1, 0.2, -0.3])).abs() < 1e-10);
        assert!((rows[1] - logsumexp(&[5.0, 5.0, 5.0])).abs() < 1e-10);
    }

    #[test]
    fn qlognormal_lpdf_is_finite_for_tiny_q() {
        let lp = qlognormal_lpdf(1.0, 0.0, 1.0, 1e-8).unwrap();
        assert!(lp.is_finite());
    }
}
