use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{PropensityError, Result};

/// Lower and upper bounds applied to every score a propensity model returns.
///
/// Keeping scores away from 0 and 1 makes downstream inverse-propensity
/// weighting numerically safe. Bounds must satisfy `0 < lower < upper < 1`.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(try_from = "(f64, f64)", into = "(f64, f64)")]
pub struct ClipBounds {
    lower: f64,
    upper: f64,
}

impl ClipBounds {
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        // Written so that NaN bounds are rejected too.
        if !(lower > 0.0 && lower < upper && upper < 1.0) {
            return Err(PropensityError::InvalidClipBounds { lower, upper });
        }
        Ok(Self { lower, upper })
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    pub fn contains(&self, p: f64) -> bool {
        p >= self.lower && p <= self.upper
    }

    /// Clamp every score into `[lower, upper]`.
    pub fn clip(&self, scores: Array1<f64>) -> Array1<f64> {
        let (lower, upper) = (self.lower, self.upper);
        scores.mapv_into(|p| p.clamp(lower, upper))
    }
}

impl Default for ClipBounds {
    fn default() -> Self {
        Self {
            lower: 1e-3,
            upper: 1.0 - 1e-3,
        }
    }
}

impl TryFrom<(f64, f64)> for ClipBounds {
    type Error = PropensityError;

    fn try_from((lower, upper): (f64, f64)) -> Result<Self> {
        ClipBounds::new(lower, upper)
    }
}

impl From<ClipBounds> for (f64, f64) {
    fn from(bounds: ClipBounds) -> Self {
        (bounds.lower, bounds.upper)
    }
}

/// Score used to pick the best `(C, l1_ratio)` pair during cross-validation.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scoring {
    #[default]
    Accuracy,
    RocAuc,
    NegLogLoss,
}

/// Hyper-parameters of the cross-validated elastic-net logistic regression.
///
/// The objective minimised for a given `(C, l1_ratio)` is
/// `0.5 * (1 - l1_ratio) * ||w||² + l1_ratio * ||w||₁ + C * Σ logloss`,
/// the intercept is not penalised.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ElasticNetConfig {
    /// Inverse regularization strengths to search.
    pub cs: Vec<f64>,
    /// L1/L2 mixing ratios to search, each in `[0, 1]`.
    pub l1_ratios: Vec<f64>,
    /// Number of stratified folds.
    pub n_fold: usize,
    /// Seed for the fold shuffle.
    pub random_state: u64,
    /// Maximum number of outer (IRLS) iterations per fit.
    pub max_iter: usize,
    /// Convergence tolerance on the largest coefficient update.
    pub tol: f64,
    pub fit_intercept: bool,
    pub scoring: Scoring,
    /// Worker threads for the grid search, `None` uses every core.
    pub n_jobs: Option<usize>,
}

impl Default for ElasticNetConfig {
    fn default() -> Self {
        Self {
            cs: itertools_num::linspace(1e-3, 1.0 - 1e-3, 4)
                .map(|e: f64| 10f64.powf(e))
                .collect(),
            l1_ratios: itertools_num::linspace(1e-3, 1.0 - 1e-3, 4).collect(),
            n_fold: 4,
            random_state: 42,
            max_iter: 100,
            tol: 1e-4,
            fit_intercept: true,
            scoring: Scoring::Accuracy,
            n_jobs: None,
        }
    }
}

impl ElasticNetConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cs.is_empty() || self.cs.iter().any(|&c| !(c > 0.0)) {
            return Err(PropensityError::InvalidConfig(
                "cs must be a non-empty list of positive values".to_string(),
            ));
        }
        if self.l1_ratios.is_empty() || self.l1_ratios.iter().any(|r| !(0.0..=1.0).contains(r)) {
            return Err(PropensityError::InvalidConfig(
                "l1_ratios must be a non-empty list of values in [0, 1]".to_string(),
            ));
        }
        if self.n_fold < 2 {
            return Err(PropensityError::InvalidConfig(format!(
                "n_fold must be at least 2, got {}",
                self.n_fold
            )));
        }
        if self.max_iter == 0 || !(self.tol > 0.0) {
            return Err(PropensityError::InvalidConfig(
                "max_iter and tol must be positive".to_string(),
            ));
        }
        if self.n_jobs == Some(0) {
            return Err(PropensityError::InvalidConfig("n_jobs must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Hyper-parameters of the gradient-boosted tree classifier.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GradientBoostingConfig {
    pub max_depth: u32,
    pub learning_rate: f64,
    pub n_estimators: usize,
    /// Fraction of columns sampled for each tree.
    pub colsample_bytree: f64,
    /// Minimum hessian sum required in each child.
    pub min_child_weight: f64,
    /// L2 penalty on leaf weights.
    pub reg_lambda: f64,
    /// Minimum gain required to split a node.
    pub gamma: f64,
    pub random_state: u64,
    /// Worker threads for split finding, `None` uses every core.
    pub n_jobs: Option<usize>,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            max_depth: 8,
            learning_rate: 0.1,
            n_estimators: 100,
            colsample_bytree: 0.8,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            gamma: 0.0,
            random_state: 42,
            n_jobs: None,
        }
    }
}

impl GradientBoostingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(PropensityError::InvalidConfig("n_estimators must be at least 1".to_string()));
        }
        if !(self.learning_rate > 0.0) {
            return Err(PropensityError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.colsample_bytree > 0.0 && self.colsample_bytree <= 1.0) {
            return Err(PropensityError::InvalidConfig(format!(
                "colsample_bytree must be in (0, 1], got {}",
                self.colsample_bytree
            )));
        }
        if self.min_child_weight < 0.0 || self.reg_lambda < 0.0 || self.gamma < 0.0 {
            return Err(PropensityError::InvalidConfig(
                "min_child_weight, reg_lambda and gamma must be non-negative".to_string(),
            ));
        }
        if self.n_jobs == Some(0) {
            return Err(PropensityError::InvalidConfig("n_jobs must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Early stopping on a held-out validation split.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct EarlyStoppingConfig {
    /// Rounds without validation improvement before training stops.
    pub rounds: usize,
    /// Fraction of the training rows held out for validation.
    pub val_size: f64,
}

impl Default for EarlyStoppingConfig {
    fn default() -> Self {
        Self {
            rounds: 10,
            val_size: 0.2,
        }
    }
}

/// Supported propensity models and their hyper-parameters.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub enum ModelType {
    ElasticNet(ElasticNetConfig),
    GradientBoosted {
        #[serde(default)]
        config: GradientBoostingConfig,
        #[serde(default)]
        early_stopping: Option<EarlyStoppingConfig>,
    },
}

impl Default for ModelType {
    fn default() -> Self {
        ModelType::ElasticNet(ElasticNetConfig::default())
    }
}

impl FromStr for ModelType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "elasticnet" | "elastic_net" | "logistic" | "logistic_regression" => {
                Ok(ModelType::ElasticNet(ElasticNetConfig::default()))
            }
            "gbdt" | "gradient_boosted" => Ok(ModelType::GradientBoosted {
                config: GradientBoostingConfig::default(),
                early_stopping: None,
            }),
            "gbdt_early_stop" => Ok(ModelType::GradientBoosted {
                config: GradientBoostingConfig::default(),
                early_stopping: Some(EarlyStoppingConfig::default()),
            }),
            _ => Err(format!(
                "Unknown model type: {}. Expected one of elasticnet, logistic, gbdt, gbdt_early_stop",
                s
            )),
        }
    }
}

/// Central configuration for propensity models in the crate.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct ModelConfig {
    #[serde(default)]
    pub clip_bounds: ClipBounds,

    #[serde(flatten)]
    pub model_type: ModelType,
}

impl ModelConfig {
    pub fn new(clip_bounds: ClipBounds, model_type: ModelType) -> Self {
        Self {
            clip_bounds,
            model_type,
        }
    }
}
