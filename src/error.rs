use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for this crate.
///
/// Numerical clamping (σ below ε, x below ε in log domain) never produces
/// one of these; only structural problems do.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A hyperparameter combination is malformed (e.g. `low >= high`, a
    /// negative σ, or a negative argument to `lognormal_cdf`).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A request that this engine's current contract does not handle
    /// (multi-point `suggest`, an unknown distribution family, or
    /// `n_EI_candidates > 1` combined with refinement).
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A sampler could not produce a valid draw within its attempt budget,
    /// or the refiner's output escaped its bounds beyond recovery.
    #[error("degenerate: {0}")]
    Degenerate(String),

    /// The trial set contains two trials with the same `tid`.
    #[error("duplicate trial id {0}: trial set is corrupted")]
    DataCorruption(u64),
}
