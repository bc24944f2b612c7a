use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::GradientBoostingConfig;
use crate::error::{PropensityError, Result};
use crate::metrics::log_loss;
use crate::models::classifier_trait::{Classifier, ProbabilisticClassifier};
use crate::models::early_stopping::EarlyStopping;
use crate::models::tree::{grow_tree, RegressionTree, TreeParams};
use crate::models::utils::{sigmoid, validate_features, validate_training_data, with_thread_pool};

const MIN_HESSIAN: f64 = 1e-16;

#[derive(Debug, Clone)]
struct Forest {
    base_margin: f64,
    trees: Vec<RegressionTree>,
    n_features: usize,
    best_iteration: Option<usize>,
    best_score: Option<f64>,
}

impl Forest {
    fn margin(&self, x: ArrayView2<f64>, n_trees: usize) -> Array1<f64> {
        let trees = &self.trees[..n_trees.min(self.trees.len())];
        Array1::from_iter(
            x.rows()
                .into_iter()
                .map(|row| self.base_margin + trees.iter().map(|t| t.predict_row(row)).sum::<f64>()),
        )
    }
}

/// Gradient Boosting Decision Tree (GBDT) classifier with a binary logistic
/// objective.
///
/// Each round fits a regression tree to the gradient and hessian of the log
/// loss on a column subsample drawn from a generator seeded with
/// `random_state`, so fits without an eval set are reproducible.
#[derive(Debug, Clone, Default)]
pub struct GradientBoostingClassifier {
    config: GradientBoostingConfig,
    fitted: Option<Forest>,
}

impl GradientBoostingClassifier {
    pub fn new(config: GradientBoostingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, fitted: None })
    }

    pub fn config(&self) -> &GradientBoostingConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Number of trained trees.
    pub fn n_trees(&self) -> usize {
        self.fitted.as_ref().map_or(0, |f| f.trees.len())
    }

    /// Zero-based round with the best eval-set log loss, set only when the
    /// model was trained with early stopping.
    pub fn best_iteration(&self) -> Option<usize> {
        self.fitted.as_ref().and_then(|f| f.best_iteration)
    }

    /// Eval-set log loss at [`best_iteration`](Self::best_iteration).
    pub fn best_score(&self) -> Option<f64> {
        self.fitted.as_ref().and_then(|f| f.best_score)
    }

    /// Fit the model, optionally monitoring an evaluation set.
    ///
    /// With `early_stopping_rounds`, training stops once the eval-set log
    /// loss has not improved for that many rounds. All trained trees are kept,
    /// predictions only use those up to the best iteration.
    pub fn fit_with_eval(
        &mut self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        eval_set: Option<(ArrayView2<f64>, ArrayView1<f64>)>,
        early_stopping_rounds: Option<usize>,
    ) -> Result<()> {
        validate_training_data(x, y)?;
        if let Some((x_eval, y_eval)) = eval_set {
            validate_features(x_eval, x.ncols())?;
            if x_eval.nrows() != y_eval.len() {
                return Err(PropensityError::LengthMismatch {
                    expected: x_eval.nrows(),
                    found: y_eval.len(),
                });
            }
        }
        if early_stopping_rounds.is_some() && eval_set.is_none() {
            return Err(PropensityError::InvalidConfig(
                "early stopping requires an eval set".to_string(),
            ));
        }

        let forest = with_thread_pool(self.config.n_jobs, || Ok(self.boost(x, y, eval_set, early_stopping_rounds)))?;
        self.fitted = Some(forest);
        Ok(())
    }

    fn boost(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        eval_set: Option<(ArrayView2<f64>, ArrayView1<f64>)>,
        early_stopping_rounds: Option<usize>,
    ) -> Forest {
        let cfg = &self.config;
        let (n_rows, n_features) = x.dim();

        let mean = (y.sum() / n_rows as f64).clamp(1e-6, 1.0 - 1e-6);
        let base_margin = (mean / (1.0 - mean)).ln();

        let params = TreeParams {
            max_depth: cfg.max_depth,
            min_child_weight: cfg.min_child_weight,
            reg_lambda: cfg.reg_lambda,
            gamma: cfg.gamma,
            learning_rate: cfg.learning_rate,
        };
        let n_sampled = ((cfg.colsample_bytree * n_features as f64).floor() as usize).clamp(1, n_features);
        let mut rng = StdRng::seed_from_u64(cfg.random_state);

        let mut margin = vec![base_margin; n_rows];
        let mut eval_margin = eval_set.map(|(x_eval, _)| vec![base_margin; x_eval.nrows()]);
        let mut grad = vec![0.0; n_rows];
        let mut hess = vec![0.0; n_rows];
        let mut early_stop = early_stopping_rounds.map(EarlyStopping::new);
        let mut trees = Vec::with_capacity(cfg.n_estimators);

        for round in 0..cfg.n_estimators {
            for i in 0..n_rows {
                let p = sigmoid(margin[i]);
                grad[i] = p - y[i];
                hess[i] = (p * (1.0 - p)).max(MIN_HESSIAN);
            }

            let mut features = rand::seq::index::sample(&mut rng, n_features, n_sampled).into_vec();
            features.sort_unstable();

            let tree = grow_tree(x, &grad, &hess, &features, params);
            for (m, row) in margin.iter_mut().zip(x.rows()) {
                *m += tree.predict_row(row);
            }

            if let (Some((x_eval, y_eval)), Some(em)) = (eval_set, eval_margin.as_mut()) {
                for (m, row) in em.iter_mut().zip(x_eval.rows()) {
                    *m += tree.predict_row(row);
                }
                let p_eval = Array1::from_iter(em.iter().map(|&m| sigmoid(m)));
                let loss = log_loss(y_eval, p_eval.view());
                log::trace!("[{}] validation logloss: {:.6}", round, loss);

                trees.push(tree);
                if let Some(es) = early_stop.as_mut() {
                    if es.should_stop(loss) {
                        log::debug!(
                            "Stopping. Best iteration: [{}] validation logloss: {:.6}",
                            es.best_round(),
                            es.best_value().unwrap_or(loss)
                        );
                        break;
                    }
                }
            } else {
                trees.push(tree);
            }
        }

        Forest {
            base_margin,
            trees,
            n_features,
            best_iteration: early_stop.as_ref().map(|es| es.best_round()),
            best_score: early_stop.as_ref().and_then(|es| es.best_value()),
        }
    }
}

impl Classifier for GradientBoostingClassifier {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        self.fit_with_eval(x, y, None, None)
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        Ok(self.predict_proba(x)?.mapv_into(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }

    fn probabilistic(&self) -> Option<&dyn ProbabilisticClassifier> {
        Some(self)
    }

    fn name(&self) -> &str {
        "gradient_boosting"
    }
}

impl ProbabilisticClassifier for GradientBoostingClassifier {
    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let forest = self.fitted.as_ref().ok_or(PropensityError::NotFitted)?;
        validate_features(x, forest.n_features)?;
        let n_trees = forest.best_iteration.map_or(forest.trees.len(), |best| best + 1);
        Ok(forest.margin(x, n_trees).mapv_into(sigmoid))
    }
}
