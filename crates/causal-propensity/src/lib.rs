//! causal-propensity: propensity score estimation for causal inference.
//!
//! The crate fits a treatment-assignment model on a feature matrix, returns
//! clipped probabilities of treatment and optionally recalibrates them with
//! isotonic regression. Two model families are provided, cross-validated
//! elastic-net logistic regression and gradient boosted trees with optional
//! early stopping, both built on `ndarray` and parallelised with `rayon`.
//!
//! Any type implementing [`Classifier`] can be passed to
//! [`compute_propensity_score`]; models that only produce hard labels are
//! accepted and reported through the [`DiagnosticSink`].
pub mod calibration;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod metrics;
pub mod model_selection;
pub mod models;
pub mod score;

pub use calibration::{calibrate, IsotonicRegression};
pub use config::{ClipBounds, EarlyStoppingConfig, ElasticNetConfig, GradientBoostingConfig, ModelConfig, ModelType};
pub use diagnostics::{Diagnostic, DiagnosticSink, LogSink, NullSink};
pub use error::{PropensityError, Result};
pub use models::{
    build_model, Classifier, ElasticNetPropensityModel, GradientBoostedPropensityModel,
    LogisticRegressionPropensityModel, ProbabilisticClassifier, PropensityModel,
};
pub use score::{compute_propensity_score, ScoreOptions};
