//! The data model (spec §3) and the trial filter (C4, spec §4.4).

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A parameter's concrete value. Every family's internal representation is
/// a real number; `randint` category indices are exact in `f64` for the
/// ranges this engine supports.
pub type ParamValue = f64;

/// Outcome of a trial evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Ok,
    Failed,
    Running,
}

/// The scalar result of an evaluated trial. Only meaningful when
/// `status == TrialStatus::Ok`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub status: TrialStatus,
    pub loss: f64,
}

/// An evaluated (or pending) parameter assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub tid: u64,
    pub parent_tid: Option<u64>,
    pub spec: BTreeMap<String, ParamValue>,
    pub result: TrialResult,
}

/// Per-parameter observation vectors: `idxs[k]` is the tid that produced
/// `vals[k]`. Invariant: `idxs` is strictly increasing and duplicate-free.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Observations {
    pub idxs: Vec<u64>,
    pub vals: Vec<f64>,
}

/// The γ-split selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Below,
    Above,
}

/// Checks that no two trials share a `tid`; returns [`crate::Error::DataCorruption`]
/// naming the first offender otherwise.
pub fn check_unique_tids(trials: &[Trial]) -> Result<()> {
    let mut seen = std::collections::BTreeSet::new();
    for t in trials {
        if !seen.insert(t.tid) {
            return Err(crate::Error::DataCorruption(t.tid));
        }
    }
    Ok(())
}

/// Deduplicates by `parent_tid` (or `tid` if absent), keeping the
/// lowest-loss trial per group and breaking ties by first encountered
/// (spec §4.7 step 1). Only `Ok` trials are considered; others are dropped.
pub fn dedup_by_parent(trials: &[Trial]) -> Vec<Trial> {
    let mut best: BTreeMap<u64, Trial> = BTreeMap::new();
    for t in trials {
        if t.result.status != TrialStatus::Ok {
            continue;
        }
        let key = t.parent_tid.unwrap_or(t.tid);
        match best.get(&key) {
            Some(existing) if existing.result.loss <= t.result.loss => {}
            _ => {
                best.insert(key, t.clone());
            }
        }
    }
    let mut out: Vec<Trial> = best.into_values().collect();
    out.sort_by_key(|t| t.tid);
    out
}

/// Keeps only the `cap` lowest-loss trials (linear forgetting, spec §4.7
/// step 3). A `cap` of 0 means "disabled"; all trials are kept.
pub fn apply_linear_forgetting(trials: &[Trial], cap: usize) -> Vec<Trial> {
    if cap == 0 || trials.len() <= cap {
        return trials.to_vec();
    }
    let mut ranked: Vec<&Trial> = trials.iter().collect();
    ranked.sort_by_key(|t| OrderedFloat(t.result.loss));
    ranked.truncate(cap);
    let mut out: Vec<Trial> = ranked.into_iter().cloned().collect();
    out.sort_by_key(|t| t.tid);
    out
}

/// Splits `l_idxs`/`l_vals` (the global per-trial loss vectors) into below-γ
/// and above-γ tid sets per spec §4.4 steps 1–2.
pub fn gamma_split(l_idxs: &[u64], l_vals: &[f64], gamma: f64) -> (Vec<u64>, Vec<u64>) {
    let n_below = (gamma * l_vals.len() as f64).ceil() as usize;
    let mut order: Vec<usize> = (0..l_idxs.len()).collect();
    order.sort_by_key(|&i| OrderedFloat(l_vals[i]));
    let below: Vec<u64> = order[..n_below.min(order.len())].iter().map(|&i| l_idxs[i]).collect();
    let above: Vec<u64> = order[n_below.min(order.len())..].iter().map(|&i| l_idxs[i]).collect();
    (below, above)
}

/// Filters a parameter's observations to the requested `side` of a
/// precomputed γ-split, returning values in ascending tid order (spec
/// §4.4 steps 3–4).
pub fn filter_by_gamma(obs: &Observations, below_set: &[u64], side: Side) -> Observations {
    let below: std::collections::BTreeSet<u64> = below_set.iter().copied().collect();
    let mut pairs: Vec<(u64, f64)> = obs
        .idxs
        .iter()
        .zip(obs.vals.iter())
        .filter(|(tid, _)| {
            let in_below = below.contains(tid);
            match side {
                Side::Below => in_below,
                Side::Above => !in_below,
            }
        })
        .map(|(&tid, &val)| (tid, val))
        .collect();
    pairs.sort_by_key(|(tid, _)| *tid);
    Observations {
        idxs: pairs.iter().map(|(tid, _)| *tid).collect(),
        vals: pairs.iter().map(|(_, val)| *val).collect(),
    }
}

/// Builds per-parameter observation vectors from a trial slice, scanning in
/// ascending tid order so `idxs` comes out strictly increasing by
/// construction.
pub fn observations_for(trials: &[Trial], param: &str) -> Observations {
    let mut ordered: Vec<&Trial> = trials.iter().collect();
    ordered.sort_by_key(|t| t.tid);
    let mut obs = Observations::default();
    for t in ordered {
        if let Some(&v) = t.spec.get(param) {
            obs.idxs.push(t.tid);
            obs.vals.push(v);
        }
    }
    obs
}

/// The global per-trial loss vectors for all `Ok` trials in ascending tid
/// order.
pub fn loss_vectors(trials: &[Trial]) -> (Vec<u64>, Vec<f64>) {
    let mut ordered: Vec<&Trial> = trials
        .iter()
        .filter(|t| t.result.status == TrialStatus::Ok)
        .collect();
    ordered.sort_by_key(|t| t.tid);
    (
        ordered.iter().map(|t| t.tid).collect(),
        ordered.iter().map(|t| t.result.loss).collect(),
    )
}
