use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

use crate::config::{ClipBounds, EarlyStoppingConfig, ElasticNetConfig, GradientBoostingConfig};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::{PropensityError, Result};
use crate::metrics::roc_auc_score;
use crate::model_selection::train_test_split;
use crate::models::classifier_trait::{Classifier, ProbabilisticClassifier};
use crate::models::gbdt::GradientBoostingClassifier;
use crate::models::logistic::LogisticRegressionCv;

/// Validation splits drawn before giving up on a training side with both
/// classes.
const MAX_SPLIT_ATTEMPTS: usize = 10;

/// Shared contract of the propensity models.
///
/// A variant only has to supply its probabilistic estimator and clip bounds;
/// clipping and `fit_predict` come for free. `Classifier::predict` of every
/// propensity model returns the clipped positive-class probabilities.
pub trait PropensityModel: Classifier {
    /// The underlying classifier.
    fn estimator(&self) -> &dyn ProbabilisticClassifier;

    fn clip_bounds(&self) -> ClipBounds;

    /// Positive-class probabilities from the estimator, clipped to
    /// [`clip_bounds`](Self::clip_bounds).
    fn predict_clipped(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let p = self.estimator().predict_proba(x)?;
        Ok(self.clip_bounds().clip(p))
    }

    /// Fit on `(x, y)` and predict propensity scores for the same rows. The
    /// in-sample AUC is reported to `sink`.
    fn fit_predict(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>, sink: &dyn DiagnosticSink) -> Result<Array1<f64>> {
        self.fit(x, y)?;
        let scores = self.predict(x)?;
        sink.emit(Diagnostic::AucScore(roc_auc_score(y, scores.view())));
        Ok(scores)
    }

    fn into_classifier(self: Box<Self>) -> Box<dyn Classifier>;
}

/// Propensity model based on cross-validated elastic-net logistic regression.
#[derive(Debug, Clone, Default)]
pub struct LogisticRegressionPropensityModel {
    model: LogisticRegressionCv,
    clip_bounds: ClipBounds,
}

/// Same model as [`LogisticRegressionPropensityModel`] under its penalty name.
pub type ElasticNetPropensityModel = LogisticRegressionPropensityModel;

impl LogisticRegressionPropensityModel {
    pub fn new(config: ElasticNetConfig, clip_bounds: ClipBounds) -> Result<Self> {
        Ok(Self {
            model: LogisticRegressionCv::new(config)?,
            clip_bounds,
        })
    }

    pub fn model(&self) -> &LogisticRegressionCv {
        &self.model
    }
}

impl Classifier for LogisticRegressionPropensityModel {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        self.model.fit(x, y)
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        self.predict_clipped(x)
    }

    fn probabilistic(&self) -> Option<&dyn ProbabilisticClassifier> {
        Some(self)
    }

    fn name(&self) -> &str {
        "elastic_net_propensity"
    }
}

impl ProbabilisticClassifier for LogisticRegressionPropensityModel {
    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        self.predict_clipped(x)
    }
}

impl PropensityModel for LogisticRegressionPropensityModel {
    fn estimator(&self) -> &dyn ProbabilisticClassifier {
        &self.model
    }

    fn clip_bounds(&self) -> ClipBounds {
        self.clip_bounds
    }

    fn into_classifier(self: Box<Self>) -> Box<dyn Classifier> {
        self
    }
}

/// Gradient boosted propensity model with optional early stopping.
///
/// With early stopping, every `fit` holds out a random validation split that
/// is *not* seeded, so two early-stopped fits on identical data can end at
/// different iterations even though the trees themselves use a fixed seed.
/// The split is not stratified either: it is redrawn until the training side
/// holds both classes, and `fit` fails with `SingleClass` if that never
/// happens within a few draws (very rare classes only).
#[derive(Debug, Clone, Default)]
pub struct GradientBoostedPropensityModel {
    model: GradientBoostingClassifier,
    early_stopping: Option<EarlyStoppingConfig>,
    clip_bounds: ClipBounds,
}

impl GradientBoostedPropensityModel {
    pub fn new(
        config: GradientBoostingConfig,
        early_stopping: Option<EarlyStoppingConfig>,
        clip_bounds: ClipBounds,
    ) -> Result<Self> {
        Ok(Self {
            model: GradientBoostingClassifier::new(config)?,
            early_stopping,
            clip_bounds,
        })
    }

    /// Default boosting parameters with early stopping after 10 rounds on a
    /// 20% validation split.
    pub fn with_early_stopping() -> Self {
        Self {
            early_stopping: Some(EarlyStoppingConfig::default()),
            ..Self::default()
        }
    }

    pub fn early_stop(&self) -> bool {
        self.early_stopping.is_some()
    }

    pub fn model(&self) -> &GradientBoostingClassifier {
        &self.model
    }

    /// Fit with early stopping on a validation split of `stop_val_size`,
    /// overriding the configured fraction for this call. Without early
    /// stopping this is a plain `fit` and the fraction is ignored.
    pub fn fit_with_validation_size(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>, stop_val_size: f64) -> Result<()> {
        let Some(early_stopping) = self.early_stopping else {
            return self.model.fit(x, y);
        };
        if x.nrows() != y.len() {
            return Err(PropensityError::LengthMismatch {
                expected: x.nrows(),
                found: y.len(),
            });
        }

        let mut rng = rand::thread_rng();
        let mut split = train_test_split(x.nrows(), stop_val_size, &mut rng)?;
        for attempt in 1..MAX_SPLIT_ATTEMPTS {
            if has_both_classes(y, &split.0) {
                break;
            }
            log::debug!("Training side of validation split {} holds a single class, redrawing", attempt);
            split = train_test_split(x.nrows(), stop_val_size, &mut rng)?;
        }
        let (train, val) = split;
        let x_train = x.select(Axis(0), &train);
        let y_train = y.select(Axis(0), &train);
        let x_val = x.select(Axis(0), &val);
        let y_val = y.select(Axis(0), &val);
        log::debug!(
            "Early stopping with {} training rows and {} validation rows",
            train.len(),
            val.len()
        );

        self.model.fit_with_eval(
            x_train.view(),
            y_train.view(),
            Some((x_val.view(), y_val.view())),
            Some(early_stopping.rounds),
        )
    }
}

fn has_both_classes(y: ArrayView1<f64>, rows: &[usize]) -> bool {
    let positives = rows.iter().filter(|&&i| y[i] == 1.0).count();
    positives > 0 && positives < rows.len()
}

impl Classifier for GradientBoostedPropensityModel {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        let val_size = self.early_stopping.map_or(0.0, |es| es.val_size);
        self.fit_with_validation_size(x, y, val_size)
    }

    /// Clipped probabilities. After an early-stopped fit only the trees up
    /// to the best validation iteration are used.
    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        self.predict_clipped(x)
    }

    fn probabilistic(&self) -> Option<&dyn ProbabilisticClassifier> {
        Some(self)
    }

    fn name(&self) -> &str {
        "gradient_boosted_propensity"
    }
}

impl ProbabilisticClassifier for GradientBoostedPropensityModel {
    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        self.predict_clipped(x)
    }
}

impl PropensityModel for GradientBoostedPropensityModel {
    fn estimator(&self) -> &dyn ProbabilisticClassifier {
        &self.model
    }

    fn clip_bounds(&self) -> ClipBounds {
        self.clip_bounds
    }

    fn into_classifier(self: Box<Self>) -> Box<dyn Classifier> {
        self
    }
}
