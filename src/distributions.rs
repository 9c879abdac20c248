//! Distribution adapters (C3): the closed set of nine prior families and the
//! posterior each one builds from observations, per spec §3/§4.3. This
//! replaces the symbolic DAG-rewrite of the source with a direct `match`
//! dispatch owned by [`Family`] itself (REDESIGN FLAGS, spec §9).

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::mixture::{Bounds, Gmm1, Lgmm1};
use crate::parzen::adaptive_parzen_normal;

/// The closed set of prior distribution families a parameter may have.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Family {
    Uniform { low: f64, high: f64 },
    QUniform { low: f64, high: f64, q: f64 },
    LogUniform { low: f64, high: f64 },
    QLogUniform { low: f64, high: f64, q: f64 },
    Normal { mu: f64, sigma: f64 },
    QNormal { mu: f64, sigma: f64, q: f64 },
    LogNormal { mu: f64, sigma: f64 },
    QLogNormal { mu: f64, sigma: f64, q: f64 },
    RandInt { upper: u32 },
}

/// A posterior adapter bound to one side (below/above) of the γ-split: a
/// value sampler and a log-density evaluator.
#[derive(Debug, Clone, PartialEq)]
pub enum Posterior {
    Real(Gmm1),
    Log(Lgmm1),
    Categorical { pmf: Vec<f64> },
}

impl Posterior {
    pub fn sample<R: Rng>(&self, rng: &mut R, max_rejection_attempts: usize) -> Result<f64> {
        match self {
            Posterior::Real(g) => g.sample(rng, max_rejection_attempts),
            Posterior::Log(l) => l.sample(rng, max_rejection_attempts),
            Posterior::Categorical { pmf } => {
                let mut draw = rng.gen::<f64>();
                for (k, &p) in pmf.iter().enumerate() {
                    draw -= p;
                    if draw <= 0.0 {
                        return Ok(k as f64);
                    }
                }
                Ok((pmf.len() - 1) as f64)
            }
        }
    }

    pub fn lpdf(&self, xs: &[f64]) -> Result<Vec<f64>> {
        match self {
            Posterior::Real(g) => Ok(g.lpdf(xs)),
            Posterior::Log(l) => l.lpdf(xs),
            Posterior::Categorical { pmf } => Ok(xs
                .iter()
                .map(|&x| {
                    let k = x.round() as usize;
                    pmf.get(k).copied().unwrap_or(crate::numeric::EPS).max(crate::numeric::EPS).ln()
                })
                .collect()),
        }
    }

    /// Whether this posterior's domain is continuous and hence eligible for
    /// the refinement step (spec §4.6: `randint` is never refined).
    pub fn is_continuous(&self) -> bool {
        !matches!(self, Posterior::Categorical { .. })
    }
}

/// Natural-log transform applied to observations before fitting the
/// adaptive Parzen estimator for any log-scale family, per spec's
/// resolution of the log-family "Open question": log observations for
/// every log family, no exceptions.
fn log_transform(obs: &[f64]) -> Vec<f64> {
    obs.iter().map(|&x| x.max(crate::numeric::EPS).ln()).collect()
}

/// Rounds `x` to the nearest multiple of `q` measured from `low`, then
/// clamps into `[low, high]` so quantization can never push a draw outside
/// its declared support.
fn quantize_from(x: f64, q: f64, low: f64, high: f64) -> f64 {
    let snapped = low + ((x - low) / q).round() * q;
    snapped.clamp(low, high)
}

impl Family {
    fn validate(&self) -> Result<()> {
        let bad_bounds = |low: f64, high: f64| {
            if low >= high {
                Err(Error::InvalidArgument(format!(
                    "invalid bounds: low ({low}) >= high ({high})"
                )))
            } else {
                Ok(())
            }
        };
        match *self {
            Family::Uniform { low, high } => bad_bounds(low, high),
            Family::QUniform { low, high, .. } => bad_bounds(low, high),
            Family::LogUniform { low, high } => bad_bounds(low, high),
            Family::QLogUniform { low, high, .. } => bad_bounds(low, high),
            Family::Normal { sigma, .. } | Family::QNormal { sigma, .. } => {
                if sigma <= 0.0 {
                    Err(Error::InvalidArgument(format!("non-positive sigma: {sigma}")))
                } else {
                    Ok(())
                }
            }
            Family::LogNormal { sigma, .. } | Family::QLogNormal { sigma, .. } => {
                if sigma <= 0.0 {
                    Err(Error::InvalidArgument(format!("non-positive sigma: {sigma}")))
                } else {
                    Ok(())
                }
            }
            Family::RandInt { upper } => {
                if upper == 0 {
                    Err(Error::InvalidArgument("randint upper must be > 0".into()))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Draws directly from the prior, bypassing posterior construction
    /// entirely. Used for the warm-up phase (spec §4.7 step 2), i.e. genuine
    /// random search, not a degenerate single-observation posterior.
    ///
    /// For `Uniform`/`QUniform`/`LogUniform`/`QLogUniform` this draws
    /// uniformly (log-uniformly) over the family's declared bounds: feeding
    /// an empty observation set through the `n == 0` adaptive-Parzen case
    /// and sampling the resulting single-component mixture would instead
    /// give a *truncated Gaussian* centered at the bounds' midpoint, which
    /// is not the same distribution. The remaining families' `n == 0` case
    /// already coincides with their true prior (a single Gaussian, or a
    /// uniform categorical for `RandInt`), so they delegate to `posterior`.
    pub fn sample_prior<R: Rng>(&self, rng: &mut R, max_rejection_attempts: usize) -> Result<f64> {
        self.validate()?;
        match *self {
            Family::Uniform { low, high } => Ok(rng.gen_range(low..high)),
            Family::QUniform { low, high, q } => {
                let u = rng.gen_range(low..high);
                Ok(quantize_from(u, q, low, high))
            }
            Family::LogUniform { low, high } => Ok(rng.gen_range(low..high).exp()),
            Family::QLogUniform { low, high, q } => {
                let u = rng.gen_range(low..high).exp();
                Ok(quantize_from(u, q, low.exp(), high.exp()))
            }
            _ => self.posterior(&[], 0.3).and_then(|p| p.sample(rng, max_rejection_attempts)),
        }
    }

    /// Builds the posterior adapter for this family given the observations
    /// filtered to one side of the γ-split (spec §4.3).
    pub fn posterior(&self, obs: &[f64], prior_weight: f64) -> Result<Posterior> {
        self.validate()?;
        match *self {
            Family::Uniform { low, high } => {
                let prior_mu = (low + high) / 2.0;
                let prior_sigma = high - low;
                let ap = adaptive_parzen_normal(obs, prior_weight, prior_mu, prior_sigma);
                Ok(Posterior::Real(Gmm1 {
                    weights: ap.weights,
                    mus: ap.mus,
                    sigmas: ap.sigmas,
                    bounds: Some(Bounds { low, high }),
                    step: None,
                }))
            }
            Family::QUniform { low, high, q } => {
                let prior_mu = (low + high) / 2.0;
                let prior_sigma = high - low;
                let ap = adaptive_parzen_normal(obs, prior_weight, prior_mu, prior_sigma);
                Ok(Posterior::Real(Gmm1 {
                    weights: ap.weights,
                    mus: ap.mus,
                    sigmas: ap.sigmas,
                    bounds: Some(Bounds { low, high }),
                    step: Some(q),
                }))
            }
            Family::LogUniform { low, high } => {
                let prior_mu = (low + high) / 2.0;
                let prior_sigma = high - low;
                let log_obs = log_transform(obs);
                let ap = adaptive_parzen_normal(&log_obs, prior_weight, prior_mu, prior_sigma);
                Ok(Posterior::Log(Lgmm1 {
                    weights: ap.weights,
                    mus: ap.mus,
                    sigmas: ap.sigmas,
                    log_bounds: Some(Bounds { low, high }),
                    step: None,
                }))
            }
            Family::QLogUniform { low, high, q } => {
                let prior_mu = (low + high) / 2.0;
                let prior_sigma = high - low;
                let log_obs = log_transform(obs);
                let ap = adaptive_parzen_normal(&log_obs, prior_weight, prior_mu, prior_sigma);
                Ok(Posterior::Log(Lgmm1 {
                    weights: ap.weights,
                    mus: ap.mus,
                    sigmas: ap.sigmas,
                    log_bounds: Some(Bounds { low, high }),
                    step: Some(q),
                }))
            }
            Family::Normal { mu, sigma } => {
                let ap = adaptive_parzen_normal(obs, prior_weight, mu, sigma);
                Ok(Posterior::Real(Gmm1 {
                    weights: ap.weights,
                    mus: ap.mus,
                    sigmas: ap.sigmas,
                    bounds: None,
                    step: None,
                }))
            }
            Family::QNormal { mu, sigma, q } => {
                let ap = adaptive_parzen_normal(obs, prior_weight, mu, sigma);
                Ok(Posterior::Real(Gmm1 {
                    weights: ap.weights,
                    mus: ap.mus,
                    sigmas: ap.sigmas,
                    bounds: None,
                    step: Some(q),
                }))
            }
            Family::LogNormal { mu, sigma } => {
                let log_obs = log_transform(obs);
                let ap = adaptive_parzen_normal(&log_obs, prior_weight, mu, sigma);
                Ok(Posterior::Log(Lgmm1 {
                    weights: ap.weights,
                    mus: ap.mus,
                    sigmas: ap.sigmas,
                    log_bounds: None,
                    step: None,
                }))
            }
            Family::QLogNormal { mu, sigma, q } => {
                let log_obs = log_transform(obs);
                let ap = adaptive_parzen_normal(&log_obs, prior_weight, mu, sigma);
                Ok(Posterior::Log(Lgmm1 {
                    weights: ap.weights,
                    mus: ap.mus,
                    sigmas: ap.sigmas,
                    log_bounds: None,
                    step: Some(q),
                }))
            }
            Family::RandInt { upper } => {
                let mut counts = vec![prior_weight; upper as usize];
                for &v in obs {
                    let k = v.round() as usize;
                    if k < counts.len() {
                        counts[k] += 1.0;
                    }
                }
                let total: f64 = counts.iter().sum();
                let pmf = counts.into_iter().map(|c| c / total).collect();
                Ok(Posterior::Categorical { pmf })
            }
        }
    }

    /// The variable's refinement bounds per spec §4.6 (`None` for `randint`,
    /// which is never refined).
    pub fn refine_bounds(&self) -> Option<(f64, f64)> {
        const M: f64 = 1e4;
        const EPS: f64 = 1e-12;
        match *self {
            Family::Uniform { low, high } | Family::QUniform { low, high, .. } => Some((low, high)),
            Family::LogUniform { low, high } | Family::QLogUniform { low, high, .. } => {
                Some((low.exp().max(EPS), high.exp()))
            }
            Family::Normal { .. } | Family::QNormal { .. } => Some((-M, M)),
            Family::LogNormal { .. } | Family::QLogNormal { .. } => Some((EPS, M)),
            Family::RandInt { .. } => None,
        }
    }

    /// The quantization step, if any.
    pub fn step(&self) -> Option<f64> {
        match *self {
            Family::QUniform { q, .. }
            | Family::QLogUniform { q, .. }
            | Family::QNormal { q, .. }
            | Family::QLogNormal { q, .. } => Some(q),
            _ => None,
        }
    }
}
