//! End-to-end scenarios S1-S6.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use tpe::distributions::Family;
use tpe::posterior::SearchSpace;
use tpe::trial::{Trial, TrialResult, TrialStatus};
use tpe::{Config, Error, TpeOptimizer};

fn ok_trial(tid: u64, param: &str, value: f64, loss: f64) -> Trial {
    Trial {
        tid,
        parent_tid: None,
        spec: BTreeMap::from([(param.to_string(), value)]),
        result: TrialResult {
            status: TrialStatus::Ok,
            loss,
        },
    }
}

#[test]
fn s1_warm_up_phase_delegates_to_prior() {
    let mut space = SearchSpace::new();
    space.insert("x".to_string(), Family::Uniform { low: 0.0, high: 1.0 });
    let opt = TpeOptimizer::new(space, Config::default());
    let mut rng = StdRng::seed_from_u64(42);

    let out = opt.suggest(&[42], &[], &mut rng).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].tid, 42);
    let x = out[0].spec["x"];
    assert!(x >= 0.0 && x < 1.0);
}

#[test]
fn s2_single_parameter_normal_prefers_low_magnitude() {
    let mut space = SearchSpace::new();
    space.insert("x".to_string(), Family::Normal { mu: 0.0, sigma: 1.0 });
    let cfg = Config {
        gamma: 0.3,
        prior_weight: 0.3,
        n_startup_jobs: 0,
        ..Config::default()
    };
    let opt = TpeOptimizer::new(space, cfg);

    let trials: Vec<Trial> = (-3..=6).map(|x| ok_trial(x as u64 + 100, "x", x as f64, (x * x) as f64)).collect();

    let mut hits = 0;
    for seed in 0..20u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let out = opt.suggest(&[9000 + seed], &trials, &mut rng).unwrap();
        if out[0].spec["x"].abs() < 2.0 {
            hits += 1;
        }
    }
    assert!(hits >= 14, "expected most suggestions to have |x| < 2, got {hits}/20");
}

#[test]
fn s3_quantized_parameter_concentrates_near_optimum() {
    let mut space = SearchSpace::new();
    space.insert(
        "k".to_string(),
        Family::QUniform {
            low: 0.0,
            high: 10.0,
            q: 1.0,
        },
    );
    let cfg = Config {
        gamma: 0.3,
        n_startup_jobs: 0,
        ..Config::default()
    };
    let opt = TpeOptimizer::new(space, cfg);

    let trials: Vec<Trial> = (0..=10)
        .map(|k| ok_trial(k as u64 + 200, "k", k as f64, ((k - 3) * (k - 3)) as f64))
        .collect();

    let mut rng = StdRng::seed_from_u64(1);
    let out = opt.suggest(&[9999], &trials, &mut rng).unwrap();
    let k = out[0].spec["k"];
    assert_eq!(k.fract(), 0.0);
    assert!((2.0..=4.0).contains(&k), "k={k} expected near 3");
}

#[test]
fn s4_categorical_concentrates_on_winning_bin() {
    let mut space = SearchSpace::new();
    space.insert("c".to_string(), Family::RandInt { upper: 4 });
    let cfg = Config {
        n_startup_jobs: 0,
        ..Config::default()
    };
    let opt = TpeOptimizer::new(space, cfg);

    let trials: Vec<Trial> = (0..20)
        .map(|i| {
            let c = (i % 4) as f64;
            let loss = if c == 2.0 { 0.0 } else { 1.0 };
            ok_trial(i as u64 + 300, "c", c, loss)
        })
        .collect();

    let mut hits = 0;
    for seed in 0..20u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let out = opt.suggest(&[5000 + seed], &trials, &mut rng).unwrap();
        if out[0].spec["c"] == 2.0 {
            hits += 1;
        }
    }
    assert!(hits >= 18, "expected c=2 in >=90% of draws, got {hits}/20");
}

#[test]
fn s5_log_scale_suggestion_is_within_an_order_of_magnitude() {
    let mut space = SearchSpace::new();
    space.insert(
        "lambda".to_string(),
        Family::LogUniform {
            low: (1e-4f64).ln(),
            high: 0.0,
        },
    );
    let cfg = Config {
        gamma: 0.3,
        n_startup_jobs: 0,
        ..Config::default()
    };
    let opt = TpeOptimizer::new(space, cfg);

    let values = [1e-4, 1e-3, 1e-2, 1e-1, 1.0];
    let trials: Vec<Trial> = values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let loss = (v.log10() + 2.0).abs();
            ok_trial(i as u64 + 400, "lambda", v, loss)
        })
        .collect();

    let mut rng = StdRng::seed_from_u64(0);
    let out = opt.suggest(&[8000], &trials, &mut rng).unwrap();
    let lambda = out[0].spec["lambda"];
    assert!(lambda > 0.0);
    assert!(
        (1e-3..=1e-1).contains(&lambda),
        "lambda={lambda} expected within an order of magnitude of 1e-2"
    );
}

#[test]
fn s6_duplicate_tid_is_data_corruption() {
    let mut space = SearchSpace::new();
    space.insert("x".to_string(), Family::Uniform { low: 0.0, high: 1.0 });
    let opt = TpeOptimizer::new(space, Config::default());
    let mut rng = StdRng::seed_from_u64(0);

    let trials = vec![ok_trial(1, "x", 0.1, 1.0), ok_trial(1, "x", 0.2, 2.0)];
    let err = opt.suggest(&[7], &trials, &mut rng).unwrap_err();
    assert!(matches!(err, Error::DataCorruption(1)));
}

/// Independent `suggest` calls, each with its own RNG, may run concurrently
/// without sharing evaluation scratch state (spec, "Parallelism").
#[test]
fn independent_suggest_calls_are_safe_in_parallel() {
    let mut space = SearchSpace::new();
    space.insert("x".to_string(), Family::Normal { mu: 0.0, sigma: 1.0 });
    let opt = TpeOptimizer::new(space, Config::default());

    let trials: Vec<Trial> = (0..8).map(|i| ok_trial(i as u64, "x", i as f64, (i * i) as f64)).collect();

    let results: Vec<f64> = (0..16u64)
        .into_par_iter()
        .map(|seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            let out = opt.suggest(&[10_000 + seed], &trials, &mut rng).unwrap();
            out[0].spec["x"]
        })
        .collect();

    assert_eq!(results.len(), 16);
    assert!(results.iter().all(|x| x.is_finite()));
}
