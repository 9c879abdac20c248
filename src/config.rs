use serde::{Deserialize, Serialize};

/// Tunable hyperparameters for [`crate::optimizer::TpeOptimizer`].
///
/// All fields have defaults matching the reference implementation; callers
/// typically only override a handful of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Quantile that separates "good" trials from the rest.
    pub gamma: f64,
    /// Weight given to the synthetic prior component in every Parzen mixture.
    pub prior_weight: f64,
    /// Number of candidates drawn from the "below" posterior per `suggest`
    /// call. Values greater than 1 are accepted only when refinement is
    /// disabled; the default engine always refines, so values greater than
    /// 1 currently fail with [`crate::Error::Unsupported`].
    pub n_ei_candidates: usize,
    /// Below this many usable trials, `suggest` delegates to the prior
    /// sampler instead of building a posterior.
    pub n_startup_jobs: usize,
    /// If non-zero, only the this-many lowest-loss trials are kept before
    /// modeling (hard top-L truncation).
    pub linear_forgetting: usize,
    /// Maximum rejection-sampling attempts before a truncated draw fails
    /// with [`crate::Error::Degenerate`].
    pub max_rejection_attempts: usize,
    /// Maximum objective evaluations spent refining a single candidate.
    pub refine_budget: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            gamma: 0.15,
            prior_weight: 0.3,
            n_ei_candidates: 1,
            n_startup_jobs: 5,
            linear_forgetting: 0,
            max_rejection_attempts: 10_000,
            refine_budget: 500,
        }
    }
}
