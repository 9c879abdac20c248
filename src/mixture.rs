//! Gaussian mixture model (GMM1) and its log-space analogue (LGMM1): the
//! sampling/density primitives every [`crate::distributions::Family`] adapter
//! is built from.

use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::{Error, Result};
use crate::numeric::{self, EPS};

/// Optional truncation window. `None` means untruncated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub low: f64,
    pub high: f64,
}

/// Optional quantization step. `None` means continuous.
pub type Step = Option<f64>;

/// A one-dimensional Gaussian mixture: `weights` sum to 1, `sigmas` are all
/// positive, all three arrays have equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct Gmm1 {
    pub weights: Vec<f64>,
    pub mus: Vec<f64>,
    pub sigmas: Vec<f64>,
    pub bounds: Option<Bounds>,
    pub step: Step,
}

/// `⌈x/q + 10⁻⁸⌉·q`, the quantization used by untruncated discretized
/// sampling and by the refinement step in [`crate::ei`].
pub fn snap(x: f64, q: f64) -> f64 {
    ((x / q + 1e-8).ceil() * q).max(q)
}

/// `⌈x/q⌉·q`, the quantization used when discretizing a *truncated* draw.
/// Unlike [`snap`], this does not floor the result up to `q`: flooring
/// would make the lowest grid point (e.g. `low` itself) unreachable, so
/// rejection against `[low, high)` is left to enforce the bound instead.
fn ceil_to_grid(x: f64, q: f64) -> f64 {
    (x / q).ceil() * q
}

fn categorical_index<R: Rng>(weights: &[f64], rng: &mut R) -> usize {
    let total: f64 = weights.iter().sum();
    let mut draw = rng.gen::<f64>() * total;
    for (k, &w) in weights.iter().enumerate() {
        draw -= w;
        if draw <= 0.0 {
            return k;
        }
    }
    weights.len() - 1
}

impl Gmm1 {
    /// Draws one sample, applying truncation (rejection sampling, bounded by
    /// `max_attempts`) and quantization if configured.
    pub fn sample<R: Rng>(&self, rng: &mut R, max_attempts: usize) -> Result<f64> {
        match self.bounds {
            None => Ok(self.draw_one(rng)),
            Some(b) => {
                for _ in 0..max_attempts {
                    let x = self.draw_one_truncated(rng);
                    if x >= b.low && x < b.high {
                        return Ok(x);
                    }
                }
                Err(Error::Degenerate(format!(
                    "GMM1 truncated sampler exceeded {max_attempts} attempts"
                )))
            }
        }
    }

    fn draw_raw<R: Rng>(&self, rng: &mut R) -> f64 {
        let k = categorical_index(&self.weights, rng);
        let normal = Normal::new(self.mus[k], self.sigmas[k].max(EPS)).expect("finite sigma");
        normal.sample(rng)
    }

    fn draw_one<R: Rng>(&self, rng: &mut R) -> f64 {
        let x = self.draw_raw(rng);
        match self.step {
            Some(q) => snap(x, q),
            None => x,
        }
    }

    /// Like [`Self::draw_one`], but quantizes with [`ceil_to_grid`] so the
    /// lowest grid point stays reachable under the caller's rejection loop.
    fn draw_one_truncated<R: Rng>(&self, rng: &mut R) -> f64 {
        let x = self.draw_raw(rng);
        match self.step {
            Some(q) => ceil_to_grid(x, q),
            None => x,
        }
    }

    /// `p_accept = Σ_k w_k (Φ((high-μ_k)/σ_k) - Φ((low-μ_k)/σ_k))`, or 1 when
    /// untruncated.
    fn p_accept(&self) -> f64 {
        match self.bounds {
            None => 1.0,
            Some(b) => self
                .weights
                .iter()
                .zip(self.mus.iter())
                .zip(self.sigmas.iter())
                .map(|((&w, &mu), &sigma)| {
                    w * (numeric::normal_cdf(b.high, mu, sigma) - numeric::normal_cdf(b.low, mu, sigma))
                })
                .sum(),
        }
    }

    /// Log-density at each point in `xs`.
    pub fn lpdf(&self, xs: &[f64]) -> Vec<f64> {
        let k = self.weights.len();
        match self.step {
            Some(q) => self.lpdf_discretized(xs, q),
            None => {
                let p_accept = self.p_accept().max(EPS);
                let mut m = Array2::<f64>::zeros((xs.len(), k));
                for (s, &x) in xs.iter().enumerate() {
                    for c in 0..k {
                        let sigma = self.sigmas[c].max(EPS);
                        let z = (x - self.mus[c]) / sigma;
                        let log_norm = (self.weights[c].max(EPS) / (sigma * (2.0 * std::f64::consts::PI).sqrt())
                            / p_accept)
                            .ln();
                        m[[s, c]] = log_norm - 0.5 * z * z;
                    }
                }
                numeric::logsumexp_rows(&m).to_vec()
            }
        }
    }

    fn lpdf_discretized(&self, xs: &[f64], q: f64) -> Vec<f64> {
        xs.iter()
            .map(|&x| {
                let mass: f64 = self
                    .weights
                    .iter()
                    .zip(self.mus.iter())
                    .zip(self.sigmas.iter())
                    .map(|((&w, &mu), &sigma)| {
                        w * (numeric::normal_cdf(x, mu, sigma) - numeric::normal_cdf(x - q, mu, sigma))
                    })
                    .sum();
                mass.max(EPS).ln()
            })
            .collect()
    }
}

/// The log-space analogue of [`Gmm1`]: samples are `exp(N(μ_k, σ_k))`, and
/// truncation bounds are compared against the **log-scale** draw (see
/// spec's log-family truncation convention in `DESIGN.md`).
#[derive(Debug, Clone, PartialEq)]
pub struct Lgmm1 {
    pub weights: Vec<f64>,
    pub mus: Vec<f64>,
    pub sigmas: Vec<f64>,
    /// Bounds on the pre-exponentiation (log-scale) draw.
    pub log_bounds: Option<Bounds>,
    /// Quantization step in natural scale, applied after exponentiating.
    pub step: Step,
}

impl Lgmm1 {
    pub fn sample<R: Rng>(&self, rng: &mut R, max_attempts: usize) -> Result<f64> {
        match self.log_bounds {
            None => Ok(self.draw_one(rng)),
            Some(b) => {
                for _ in 0..max_attempts {
                    let k = categorical_index(&self.weights, rng);
                    let normal =
                        Normal::new(self.mus[k], self.sigmas[k].max(EPS)).expect("finite sigma");
                    let z = normal.sample(rng);
                    if z >= b.low && z < b.high {
                        let x = z.exp();
                        return Ok(match self.step {
                            Some(q) => snap(x, q),
                            None => x,
                        });
                    }
                }
                Err(Error::Degenerate(format!(
                    "LGMM1 truncated sampler exceeded {max_attempts} attempts"
                )))
            }
        }
    }

    fn draw_one<R: Rng>(&self, rng: &mut R) -> f64 {
        let k = categorical_index(&self.weights, rng);
        let normal = Normal::new(self.mus[k], self.sigmas[k].max(EPS)).expect("finite sigma");
        let x = normal.sample(rng).exp();
        match self.step {
            Some(q) => snap(x, q),
            None => x,
        }
    }

    /// Log-density at each (natural-scale, strictly positive) point in `xs`.
    pub fn lpdf(&self, xs: &[f64]) -> Result<Vec<f64>> {
        match self.step {
            Some(q) => xs
                .iter()
                .map(|&x| {
                    let mass: f64 = self
                        .weights
                        .iter()
                        .zip(self.mus.iter())
                        .zip(self.sigmas.iter())
                        .map(|((&w, &mu), &sigma)| {
                            Ok(w * ((numeric::lognormal_cdf(x, mu, sigma)?
                                - numeric::lognormal_cdf((x - q).max(0.0), mu, sigma)?)
                            .max(0.0)))
                        })
                        .collect::<Result<Vec<f64>>>()?
                        .into_iter()
                        .sum();
                    Ok(mass.max(EPS).ln())
                })
                .collect(),
            None => {
                let k = self.weights.len();
                let mut m = Array2::<f64>::zeros((xs.len(), k));
                for (s, &x) in xs.iter().enumerate() {
                    for c in 0..k {
                        m[[s, c]] = self.weights[c].max(EPS).ln()
                            + numeric::lognormal_lpdf(x, self.mus[c], self.sigmas[c]);
                    }
                }
                Ok(numeric::logsumexp_rows(&m).to_vec())
            }
        }
    }
}
