//! Demo CLI: reads a search-space file and a trial-history file, prints one
//! suggested trial.

use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::Parser;
use rand::SeedableRng;

use tpe::{Config, SearchSpace, Trial, TpeOptimizer};

#[derive(Parser, Debug)]
#[clap(about = "Propose the next TPE trial given a search space and trial history")]
struct Args {
    /// JSON file holding a `SearchSpace` (parameter name -> family).
    #[clap(long)]
    search_space: PathBuf,

    /// JSON file holding a `Vec<Trial>` trial history. Omit for a cold start.
    #[clap(long)]
    trials: Option<PathBuf>,

    /// JSON file holding a `Config` override. Omit to use the documented defaults.
    #[clap(long)]
    config: Option<PathBuf>,

    /// The new trial id to suggest a value for.
    #[clap(long, default_value_t = 0)]
    new_id: u64,

    /// RNG seed, for reproducible suggestions.
    #[clap(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();

    let space: SearchSpace = serde_json::from_str(&fs::read_to_string(&args.search_space)?)?;
    let trials: Vec<Trial> = match &args.trials {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => Vec::new(),
    };
    let config: Config = match &args.config {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => Config::default(),
    };

    let optimizer = TpeOptimizer::new(space, config);
    let mut rng = rand::rngs::StdRng::seed_from_u64(args.seed);
    let suggestions = optimizer.suggest(&[args.new_id], &trials, &mut rng)?;

    println!("{}", serde_json::to_string_pretty(&suggestions[0])?);
    Ok(())
}
