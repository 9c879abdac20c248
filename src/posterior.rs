//! Posterior construction (C5): for one side of the γ-split, builds a
//! per-parameter [`Posterior`] adapter from the search space and the
//! filtered observations, and assembles per-tid log-likelihoods across all
//! active parameters.
//!
//! This is the direct visitor the REDESIGN FLAGS (spec §9) call for: no
//! expression DAG, just a `BTreeMap<String, Family>` walked once per side.

use std::collections::BTreeMap;

use crate::distributions::{Family, Posterior};
use crate::error::Result;
use crate::trial::{filter_by_gamma, observations_for, Observations, Side, Trial};

/// The flat parameter table the REDESIGN FLAGS call for: `parameter_id ->
/// family`. Conditional activation is implicit — a trial's `spec` simply
/// omits an inactive parameter's entry.
pub type SearchSpace = BTreeMap<String, Family>;

/// One side's fully-built posterior: a [`Posterior`] adapter per parameter,
/// plus the observation vectors used to build it (kept for refinement's
/// bookkeeping).
pub struct SidePosterior {
    pub adapters: BTreeMap<String, Posterior>,
    pub observations: BTreeMap<String, Observations>,
}

/// Builds the posterior for one side of the γ-split: every parameter in
/// `space` gets an adapter fit to that parameter's observations restricted
/// to `side`'s tid set.
pub fn build_posterior(
    space: &SearchSpace,
    trials: &[Trial],
    below_set: &[u64],
    side: Side,
    prior_weight: f64,
) -> Result<SidePosterior> {
    let mut adapters = BTreeMap::new();
    let mut observations = BTreeMap::new();
    for (name, family) in space {
        let all_obs = observations_for(trials, name);
        let side_obs = filter_by_gamma(&all_obs, below_set, side);
        let adapter = family.posterior(&side_obs.vals, prior_weight)?;
        adapters.insert(name.clone(), adapter);
        observations.insert(name.clone(), side_obs);
    }
    Ok(SidePosterior { adapters, observations })
}

/// Sums `lpdf` contributions across every parameter active in `point`
/// (spec §4.5, "log-likelihood assembler"). Parameters the posterior
/// doesn't cover are treated as inactive and contribute 0.
pub fn log_likelihood(posterior: &SidePosterior, point: &BTreeMap<String, f64>) -> Result<f64> {
    let mut total = 0.0;
    for (name, &value) in point {
        if let Some(adapter) = posterior.adapters.get(name) {
            total += adapter.lpdf(&[value])?[0];
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trial::{TrialResult, TrialStatus};

    fn trial(tid: u64, x: f64, loss: f64) -> Trial {
        Trial {
            tid,
            parent_tid: None,
            spec: BTreeMap::from([("x".to_string(), x)]),
            result: TrialResult {
                status: TrialStatus::Ok,
                loss,
            },
        }
    }

    #[test]
    fn build_posterior_produces_one_adapter_per_parameter() {
        let mut space = SearchSpace::new();
        space.insert("x".to_string(), Family::Normal { mu: 0.0, sigma: 1.0 });
        let trials = vec![trial(1, -1.0, 1.0), trial(2, 2.0, 4.0)];
        let below = vec![1];
        let sp = build_posterior(&space, &trials, &below, Side::Below, 0.3).unwrap();
        assert!(sp.adapters.contains_key("x"));
        assert_eq!(sp.observations["x"].vals, vec![-1.0]);
    }

    #[test]
    fn log_likelihood_sums_active_parameters_only() {
        // "y" is not in the search space at all, so even if a point names it
        // (e.g. a stale key from another run), it is silently zero-filled.
        let mut space = SearchSpace::new();
        space.insert("x".to_string(), Family::Normal { mu: 0.0, sigma: 1.0 });
        let trials = vec![trial(1, -1.0, 1.0)];
        let below = vec![1];
        let sp = build_posterior(&space, &trials, &below, Side::Below, 0.3).unwrap();

        let mut point = BTreeMap::new();
        point.insert("x".to_string(), 0.0);
        let ll_x_only = log_likelihood(&sp, &point).unwrap();
        let expected_x = sp.adapters["x"].lpdf(&[0.0]).unwrap()[0];
        assert!((ll_x_only - expected_x).abs() < 1e-12);

        point.insert("y".to_string(), 0.0);
        let ll_with_unknown_param = log_likelihood(&sp, &point).unwrap();
        assert_eq!(ll_with_unknown_param, ll_x_only);
    }
}
