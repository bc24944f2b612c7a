use ndarray::{Array1, ArrayView1, ArrayView2};
use std::fmt;

use crate::error::Result;

/// A binary classifier trained on a feature matrix and 0/1 labels.
///
/// This is the contract `compute_propensity_score` works against. Any model
/// can be plugged in; models that can produce class probabilities advertise
/// it through [`Classifier::probabilistic`].
pub trait Classifier: fmt::Debug + Send + Sync {
    /// Fit the model. `y` uses the crate convention (1 for treated, 0 for control).
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()>;

    /// The model's native prediction for each row. Label-only classifiers
    /// return hard 0/1 labels here.
    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>>;

    /// Probability capability, `None` when the model only predicts labels.
    fn probabilistic(&self) -> Option<&dyn ProbabilisticClassifier> {
        None
    }

    /// Optional human readable name for the model
    fn name(&self) -> &str {
        "classifier"
    }
}

/// A classifier that can estimate the probability of the positive class.
pub trait ProbabilisticClassifier: Classifier {
    /// Probability of label 1 for each row of `x`.
    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>>;
}
