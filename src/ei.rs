//! EI evaluator & refiner (C6): draws a candidate from the "below"
//! posterior, scores it by log-density ratio against "above", and refines
//! its continuous coordinates by a bounded, derivative-free coordinate
//! search in the manner of Powell's method (spec §4.6).

use std::collections::BTreeMap;
use std::time::Instant;

use rand::Rng;

use crate::distributions::Family;
use crate::error::Result;
use crate::mixture::snap;
use crate::posterior::{log_likelihood, SearchSpace, SidePosterior};

/// Penalty returned for an out-of-bounds refinement candidate, so the
/// search steers away from it without a hard failure (spec §4.6 step 4).
const BIG: f64 = 1e15;

/// A scored, possibly-refined suggestion.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub spec: BTreeMap<String, f64>,
    pub ei_score: f64,
}

/// Draws one candidate from `below`, scores it, and (budget and deadline
/// permitting) refines its continuous coordinates before returning the
/// winning point (spec §4.6 steps 1–7).
pub fn suggest_candidate<R: Rng>(
    space: &SearchSpace,
    below: &SidePosterior,
    above: &SidePosterior,
    rng: &mut R,
    max_rejection_attempts: usize,
    refine_budget: usize,
    deadline: Option<Instant>,
) -> Result<Candidate> {
    let mut point = BTreeMap::new();
    for (name, adapter) in &below.adapters {
        point.insert(name.clone(), adapter.sample(rng, max_rejection_attempts)?);
    }

    let raw_ei = ei_score(&point, below, above)?;

    let refined_point = refine(space, below, above, &point, refine_budget, deadline)?;
    let refined_ei = ei_score(&refined_point, below, above)?;

    // Fall back to the pre-refinement candidate if refinement didn't help
    // or drifted a coordinate out of its family's bounds.
    let escaped_bounds = refined_point.iter().any(|(name, &x)| {
        space
            .get(name)
            .and_then(Family::refine_bounds)
            .map(|(lo, hi)| x < lo || x > hi)
            .unwrap_or(false)
    });

    if escaped_bounds || refined_ei < raw_ei {
        if escaped_bounds {
            log::warn!("refinement escaped its bounds; falling back to the unrefined candidate");
        }
        Ok(Candidate {
            spec: point,
            ei_score: raw_ei,
        })
    } else {
        Ok(Candidate {
            spec: refined_point,
            ei_score: refined_ei,
        })
    }
}

fn ei_score(point: &BTreeMap<String, f64>, below: &SidePosterior, above: &SidePosterior) -> Result<f64> {
    let ll_below = log_likelihood(below, point)?;
    let ll_above = log_likelihood(above, point)?;
    Ok(ll_below - ll_above)
}

/// `-(ℓ_below - ℓ_above)` at `point` with `name` overridden to `x`, snapped
/// to `q` if discretized, and penalized with [`BIG`] outside `(lo, hi)`.
fn objective(
    name: &str,
    x: f64,
    lo: f64,
    hi: f64,
    step: Option<f64>,
    point: &BTreeMap<String, f64>,
    below: &SidePosterior,
    above: &SidePosterior,
) -> Result<f64> {
    if x < lo || x > hi {
        return Ok(BIG);
    }
    let snapped = step.map(|q| snap(x, q)).unwrap_or(x);
    let mut candidate = point.clone();
    candidate.insert(name.to_string(), snapped);
    Ok(-ei_score(&candidate, below, above)?)
}

/// Golden-section search over `[lo, hi]` minimizing `objective`, spending at
/// most `max_evals` evaluations. Returns the best `x` found.
fn golden_section_minimize(
    name: &str,
    lo: f64,
    hi: f64,
    step: Option<f64>,
    point: &BTreeMap<String, f64>,
    below: &SidePosterior,
    above: &SidePosterior,
    max_evals: usize,
) -> Result<(f64, usize)> {
    const GR: f64 = 0.6180339887498949; // 1/phi

    if max_evals < 2 || !lo.is_finite() || !hi.is_finite() || hi <= lo {
        return Ok((point.get(name).copied().unwrap_or(lo), 0));
    }

    let mut a = lo;
    let mut b = hi;
    let mut c = b - GR * (b - a);
    let mut d = a + GR * (b - a);
    let mut fc = objective(name, c, lo, hi, step, point, below, above)?;
    let mut fd = objective(name, d, lo, hi, step, point, below, above)?;
    let mut spent = 2;

    while spent + 1 <= max_evals && (b - a).abs() > 1e-9 * (hi - lo).max(1.0) {
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            c = b - GR * (b - a);
            fc = objective(name, c, lo, hi, step, point, below, above)?;
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + GR * (b - a);
            fd = objective(name, d, lo, hi, step, point, below, above)?;
        }
        spent += 1;
    }

    let best = if fc < fd { c } else { d };
    let best = step.map(|q| snap(best, q)).unwrap_or(best);
    Ok((best, spent))
}

/// Coordinate-wise bounded refinement of every continuous parameter in
/// `space`, budgeted to `refine_budget` total objective evaluations and to
/// `deadline` wall-clock time (cooperative cancellation, spec §5).
fn refine(
    space: &SearchSpace,
    below: &SidePosterior,
    above: &SidePosterior,
    point: &BTreeMap<String, f64>,
    refine_budget: usize,
    deadline: Option<Instant>,
) -> Result<BTreeMap<String, f64>> {
    let continuous: Vec<&String> = space
        .keys()
        .filter(|name| below.adapters.get(*name).map(|a| a.is_continuous()).unwrap_or(false))
        .collect();

    if continuous.is_empty() || refine_budget == 0 {
        return Ok(point.clone());
    }

    let mut current = point.clone();
    let mut budget_left = refine_budget;
    let per_coord_evals = (refine_budget / (continuous.len() * 3).max(1)).max(4);

    for _sweep in 0..3 {
        if budget_left < 2 {
            break;
        }
        for name in &continuous {
            if budget_left < 2 {
                break;
            }
            if let Some(dl) = deadline {
                if Instant::now() >= dl {
                    return Ok(current);
                }
            }
            let Some((lo, hi)) = space[*name].refine_bounds() else {
                continue;
            };
            let step = space[*name].step();
            let evals = per_coord_evals.min(budget_left);
            let (best_x, spent) =
                golden_section_minimize(name, lo, hi, step, &current, below, above, evals)?;
            current.insert((*name).clone(), best_x);
            budget_left = budget_left.saturating_sub(spent);
        }
    }

    Ok(current)
}
