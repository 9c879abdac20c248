//! The orchestrator (C7): the single public entry point that ties C1–C6
//! together into one `suggest` call (spec §4.7).

use rand::Rng;
use std::time::Instant;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::posterior::{build_posterior, SearchSpace};
use crate::trial::{
    apply_linear_forgetting, check_unique_tids, dedup_by_parent, gamma_split, loss_vectors, Side,
    Trial, TrialResult, TrialStatus,
};

/// The Tree-structured Parzen Estimator: a search space plus tuned
/// hyperparameters, ready to field `suggest` calls against a trial history.
#[derive(Debug, Clone)]
pub struct TpeOptimizer {
    space: SearchSpace,
    config: Config,
}

impl TpeOptimizer {
    pub fn new(space: SearchSpace, config: Config) -> Self {
        TpeOptimizer { space, config }
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Proposes the next parameter assignment(s) to evaluate, given the
    /// trial history observed so far.
    ///
    /// Current contract: `new_ids` must have exactly one element (spec §6).
    pub fn suggest<R: Rng>(&self, new_ids: &[u64], trials: &[Trial], rng: &mut R) -> Result<Vec<Trial>> {
        self.suggest_with_deadline(new_ids, trials, rng, None)
    }

    /// As [`Self::suggest`], but the refinement inner loop honors `deadline`
    /// cooperatively (spec §5, "Cancellation").
    pub fn suggest_with_deadline<R: Rng>(
        &self,
        new_ids: &[u64],
        trials: &[Trial],
        rng: &mut R,
        deadline: Option<Instant>,
    ) -> Result<Vec<Trial>> {
        if new_ids.len() != 1 {
            return Err(Error::Unsupported(format!(
                "suggest currently handles exactly one new id, got {}",
                new_ids.len()
            )));
        }
        if self.config.n_ei_candidates > 1 {
            return Err(Error::Unsupported(
                "n_ei_candidates > 1 combined with refinement is not supported".into(),
            ));
        }
        let new_id = new_ids[0];

        check_unique_tids(trials)?;

        let usable = dedup_by_parent(trials);
        log::debug!(
            "suggest({new_id}): {} raw trials, {} after dedup",
            trials.len(),
            usable.len()
        );

        if usable.len() < self.config.n_startup_jobs {
            log::info!(
                "suggest({new_id}): only {} usable trials (< n_startup_jobs={}), delegating to prior",
                usable.len(),
                self.config.n_startup_jobs
            );
            return Ok(vec![self.sample_from_prior(new_id, rng)?]);
        }

        let forgotten = apply_linear_forgetting(&usable, self.config.linear_forgetting);
        if forgotten.len() < usable.len() {
            log::debug!(
                "suggest({new_id}): linear forgetting kept {}/{} trials",
                forgotten.len(),
                usable.len()
            );
        }

        // No placeholder tid is needed for the candidate slot: this engine
        // scores a candidate by direct evaluation against a
        // `BTreeMap<String, f64>` (see posterior::log_likelihood), never by
        // inserting a node into a shared graph.
        let (l_idxs, l_vals) = loss_vectors(&forgotten);
        let (below_set, _above_set) = gamma_split(&l_idxs, &l_vals, self.config.gamma);
        log::debug!(
            "suggest({new_id}): gamma={}, {} below / {} above",
            self.config.gamma,
            below_set.len(),
            l_idxs.len() - below_set.len()
        );

        let below = build_posterior(&self.space, &forgotten, &below_set, Side::Below, self.config.prior_weight)?;
        let above = build_posterior(&self.space, &forgotten, &below_set, Side::Above, self.config.prior_weight)?;

        let candidate = crate::ei::suggest_candidate(
            &self.space,
            &below,
            &above,
            rng,
            self.config.max_rejection_attempts,
            self.config.refine_budget,
            deadline,
        )?;
        log::info!("suggest({new_id}): winning EI score {:.4}", candidate.ei_score);

        Ok(vec![Trial {
            tid: new_id,
            parent_tid: None,
            spec: candidate.spec,
            result: TrialResult {
                status: TrialStatus::Running,
                loss: 0.0,
            },
        }])
    }

    fn sample_from_prior<R: Rng>(&self, new_id: u64, rng: &mut R) -> Result<Trial> {
        let mut spec = std::collections::BTreeMap::new();
        for (name, family) in &self.space {
            spec.insert(name.clone(), family.sample_prior(rng, self.config.max_rejection_attempts)?);
        }
        Ok(Trial {
            tid: new_id,
            parent_tid: None,
            spec,
            result: TrialResult {
                status: TrialStatus::Running,
                loss: 0.0,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::Family;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn trial(tid: u64, x: f64, loss: f64) -> Trial {
        Trial {
            tid,
            parent_tid: None,
            spec: std::collections::BTreeMap::from([("x".to_string(), x)]),
            result: TrialResult {
                status: TrialStatus::Ok,
                loss,
            },
        }
    }

    #[test]
    fn rejects_multi_point_requests() {
        let mut space = SearchSpace::new();
        space.insert("x".to_string(), Family::Uniform { low: 0.0, high: 1.0 });
        let opt = TpeOptimizer::new(space, Config::default());
        let mut rng = StdRng::seed_from_u64(1);
        let err = opt.suggest(&[1, 2], &[], &mut rng).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn warm_up_phase_delegates_to_prior() {
        let mut space = SearchSpace::new();
        space.insert("x".to_string(), Family::Uniform { low: 0.0, high: 1.0 });
        let opt = TpeOptimizer::new(space, Config::default());
        let mut rng = StdRng::seed_from_u64(1);
        let out = opt.suggest(&[42], &[], &mut rng).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].tid, 42);
        let x = out[0].spec["x"];
        assert!(x >= 0.0 && x < 1.0);
    }

    #[test]
    fn duplicate_tid_is_data_corruption() {
        let mut space = SearchSpace::new();
        space.insert("x".to_string(), Family::Uniform { low: 0.0, high: 1.0 });
        let opt = TpeOptimizer::new(space, Config::default());
        let mut rng = StdRng::seed_from_u64(1);
        let trials = vec![trial(1, 0.1, 1.0), trial(1, 0.2, 2.0)];
        let err = opt.suggest(&[99], &trials, &mut rng).unwrap_err();
        assert!(matches!(err, Error::DataCorruption(1)));
    }

    #[test]
    fn models_after_startup_phase() {
        let mut space = SearchSpace::new();
        space.insert("x".to_string(), Family::Normal { mu: 0.0, sigma: 1.0 });
        let cfg = Config {
            gamma: 0.3,
            n_startup_jobs: 0,
            ..Config::default()
        };
        let opt = TpeOptimizer::new(space, cfg);
        let trials: Vec<Trial> = (-3..=6)
            .map(|x| trial(x as u64 + 10, x as f64, (x * x) as f64))
            .collect();
        let mut rng = StdRng::seed_from_u64(7);
        let out = opt.suggest(&[1000], &trials, &mut rng).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].spec["x"].is_finite());
    }

    #[test]
    fn n_ei_candidates_above_one_is_unsupported() {
        let mut space = SearchSpace::new();
        space.insert("x".to_string(), Family::Uniform { low: 0.0, high: 1.0 });
        let cfg = Config {
            n_ei_candidates: 2,
            n_startup_jobs: 0,
            ..Config::default()
        };
        let opt = TpeOptimizer::new(space, cfg);
        let mut rng = StdRng::seed_from_u64(1);
        let err = opt.suggest(&[1], &[], &mut rng).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }
}
