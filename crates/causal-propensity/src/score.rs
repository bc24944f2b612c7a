use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::calibration::calibrate;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::{PropensityError, Result};
use crate::models::classifier_trait::Classifier;
use crate::models::propensity::ElasticNetPropensityModel;

/// Optional inputs of [`compute_propensity_score`].
#[derive(Debug, Clone, Copy)]
pub struct ScoreOptions<'a> {
    /// Rows to score. Defaults to the training features.
    pub x_pred: Option<ArrayView2<'a, f64>>,
    /// Treatment of the scored rows, used for calibration. Defaults to the
    /// training treatment.
    pub treatment_pred: Option<ArrayView1<'a, f64>>,
    /// Recalibrate the scores with isotonic regression.
    pub calibrate: bool,
}

impl Default for ScoreOptions<'_> {
    fn default() -> Self {
        Self {
            x_pred: None,
            treatment_pred: None,
            calibrate: true,
        }
    }
}

impl<'a> ScoreOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn x_pred(mut self, x_pred: ArrayView2<'a, f64>) -> Self {
        self.x_pred = Some(x_pred);
        self
    }

    pub fn treatment_pred(mut self, treatment_pred: ArrayView1<'a, f64>) -> Self {
        self.treatment_pred = Some(treatment_pred);
        self
    }

    pub fn calibrate(mut self, calibrate: bool) -> Self {
        self.calibrate = calibrate;
        self
    }
}

/// Fit a propensity model on `(x, treatment)` and score `x_pred`.
///
/// Without `p_model` an [`ElasticNetPropensityModel`] with default settings is
/// trained. Models without a probability output are scored with their hard
/// labels and a [`Diagnostic::ProbabilityFallback`] is emitted.
///
/// The crate's own propensity models expose their clipped probabilities
/// through [`Classifier::probabilistic`], so passing one as `p_model` never
/// takes the fallback path and no fallback diagnostic is emitted for it.
///
/// With calibration the fitted model is dropped and `None` is returned in its
/// place; otherwise the fitted model is handed back. Every returned score is
/// kept at least `1.001 ε` away from 0 and 1. A model that produces NaN or
/// infinite scores yields [`PropensityError::NaNFound`].
///
/// ```no_run
/// use causal_propensity::{compute_propensity_score, LogSink, ScoreOptions};
/// use ndarray::{array, Array2};
///
/// let x = Array2::from_shape_vec((4, 1), vec![0.1, 0.4, 0.6, 0.9]).unwrap();
/// let t = array![0.0, 0.0, 1.0, 1.0];
/// let (scores, model) = compute_propensity_score(x.view(), t.view(), None, ScoreOptions::default(), &LogSink)?;
/// assert_eq!(scores.len(), 4);
/// assert!(model.is_none());
/// # Ok::<(), causal_propensity::PropensityError>(())
/// ```
pub fn compute_propensity_score<'a>(
    x: ArrayView2<'a, f64>,
    treatment: ArrayView1<'a, f64>,
    p_model: Option<Box<dyn Classifier>>,
    options: ScoreOptions<'a>,
    sink: &dyn DiagnosticSink,
) -> Result<(Array1<f64>, Option<Box<dyn Classifier>>)> {
    let treatment_pred = options.treatment_pred.unwrap_or(treatment);
    let x_pred = options.x_pred.unwrap_or(x);

    let mut model: Box<dyn Classifier> = match p_model {
        Some(model) => model,
        None => Box::new(ElasticNetPropensityModel::default()),
    };
    model.fit(x, treatment)?;

    let mut scores = match model.probabilistic() {
        Some(probabilistic) => probabilistic.predict_proba(x_pred)?,
        None => {
            sink.emit(Diagnostic::ProbabilityFallback {
                model: model.name().to_string(),
            });
            model.predict(x_pred)?
        }
    };
    let non_finite = scores.iter().filter(|p| !p.is_finite()).count();
    if non_finite > 0 {
        return Err(PropensityError::NaNFound(non_finite));
    }

    let model = if options.calibrate {
        sink.emit(Diagnostic::Calibrated);
        scores = calibrate(scores.view(), treatment_pred)?;
        None
    } else {
        Some(model)
    };

    let eps = f64::EPSILON;
    scores.mapv_inplace(|p| {
        if p < eps {
            eps * 1.001
        } else if p > 1.0 - eps {
            1.0 - eps * 1.001
        } else {
            p
        }
    });

    Ok((scores, model))
}
