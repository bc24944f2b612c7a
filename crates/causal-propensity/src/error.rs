use thiserror::Error;

/// Errors raised while fitting or scoring propensity models.
#[derive(Debug, Error)]
pub enum PropensityError {
    #[error("expected {expected} rows, found {found}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("model was fitted on {expected} features, input has {found}")]
    FeatureMismatch { expected: usize, found: usize },

    #[error("input contains no rows or no feature columns")]
    EmptyInput,

    #[error("labels must be 0 or 1, found {0}")]
    NonBinaryLabel(f64),

    #[error("labels contain a single class, both 0 and 1 are required")]
    SingleClass,

    /// NaN or infinite values.
    #[error("found {0} NaN or infinite values in input")]
    NaNFound(usize),

    #[error("model has not been fitted")]
    NotFitted,

    #[error("clip bounds must satisfy 0 < lower < upper < 1, got ({lower}, {upper})")]
    InvalidClipBounds { lower: f64, upper: f64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, PropensityError>;
