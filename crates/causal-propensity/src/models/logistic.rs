use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

use crate::config::{ElasticNetConfig, Scoring};
use crate::error::{PropensityError, Result};
use crate::metrics::{accuracy, log_loss, roc_auc_score};
use crate::model_selection::StratifiedKFold;
use crate::models::classifier_trait::{Classifier, ProbabilisticClassifier};
use crate::models::utils::{sigmoid, validate_features, validate_training_data, with_thread_pool};

/// IRLS weights are floored so the quadratic approximation stays well posed
/// on (nearly) separable data.
const MIN_IRLS_WEIGHT: f64 = 1e-5;
const MAX_INNER_SWEEPS: usize = 100;

/// Mean cross-validation score of one grid point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CvScore {
    pub c: f64,
    pub l1_ratio: f64,
    pub mean_score: f64,
}

#[derive(Debug, Clone)]
struct LogisticFit {
    coef: Array1<f64>,
    intercept: f64,
    c: f64,
    l1_ratio: f64,
    cv_scores: Vec<CvScore>,
}

/// Elastic-net logistic regression with the regularization strength and the
/// L1/L2 mix picked by stratified k-fold cross-validation.
///
/// Every `(C, l1_ratio)` pair of the configured grid is fitted on each
/// training fold and scored on the held-out fold. The pair with the best
/// mean score (first one on ties) is refitted on the full training set.
#[derive(Debug, Clone, Default)]
pub struct LogisticRegressionCv {
    config: ElasticNetConfig,
    fitted: Option<LogisticFit>,
}

impl LogisticRegressionCv {
    pub fn new(config: ElasticNetConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, fitted: None })
    }

    pub fn config(&self) -> &ElasticNetConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Coefficients of the refitted model.
    pub fn coef(&self) -> Option<&Array1<f64>> {
        self.fitted.as_ref().map(|f| &f.coef)
    }

    pub fn intercept(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.intercept)
    }

    /// Selected inverse regularization strength.
    pub fn best_c(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.c)
    }

    /// Selected L1/L2 mixing ratio.
    pub fn best_l1_ratio(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.l1_ratio)
    }

    pub fn cv_scores(&self) -> &[CvScore] {
        self.fitted.as_ref().map(|f| f.cv_scores.as_slice()).unwrap_or(&[])
    }

    fn grid(&self) -> Vec<(f64, f64)> {
        self.config
            .l1_ratios
            .iter()
            .flat_map(|&l1_ratio| self.config.cs.iter().map(move |&c| (c, l1_ratio)))
            .collect()
    }

    fn score(&self, y: ArrayView1<f64>, p: ArrayView1<f64>) -> f64 {
        match self.config.scoring {
            Scoring::Accuracy => accuracy(y, p),
            Scoring::RocAuc => roc_auc_score(y, p).unwrap_or(0.5),
            Scoring::NegLogLoss => -log_loss(y, p),
        }
    }

    fn cross_validate(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<Vec<CvScore>> {
        let folds = StratifiedKFold::new(self.config.n_fold, true, self.config.random_state).split(y)?;
        let grid = self.grid();
        let tasks: Vec<(usize, usize)> = (0..grid.len())
            .flat_map(|g| (0..folds.len()).map(move |f| (g, f)))
            .collect();

        let fold_scores: Vec<f64> = with_thread_pool(self.config.n_jobs, || {
            tasks
                .par_iter()
                .map(|&(g, f)| {
                    let (c, l1_ratio) = grid[g];
                    let (train, test) = &folds[f];
                    let x_train = x.select(Axis(0), train);
                    let y_train = y.select(Axis(0), train);
                    let (coef, intercept) =
                        fit_elastic_net(x_train.view(), y_train.view(), c, l1_ratio, &self.config);

                    let x_test = x.select(Axis(0), test);
                    let y_test = y.select(Axis(0), test);
                    let p = (x_test.dot(&coef) + intercept).mapv_into(sigmoid);
                    Ok(self.score(y_test.view(), p.view()))
                })
                .collect::<Result<Vec<f64>>>()
        })?;

        let n_folds = folds.len() as f64;
        let scores = grid
            .iter()
            .enumerate()
            .map(|(g, &(c, l1_ratio))| {
                let start = g * folds.len();
                let mean_score = fold_scores[start..start + folds.len()].iter().sum::<f64>() / n_folds;
                log::trace!("C={:.4}, l1_ratio={:.4}: mean CV score {:.6}", c, l1_ratio, mean_score);
                CvScore {
                    c,
                    l1_ratio,
                    mean_score,
                }
            })
            .collect();
        Ok(scores)
    }
}

impl Classifier for LogisticRegressionCv {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        validate_training_data(x, y)?;

        let cv_scores = self.cross_validate(x, y)?;
        let best = cv_scores
            .iter()
            .fold(None::<&CvScore>, |best, s| match best {
                Some(b) if b.mean_score >= s.mean_score => Some(b),
                _ => Some(s),
            })
            .copied()
            .ok_or_else(|| PropensityError::InvalidConfig("empty hyper-parameter grid".to_string()))?;

        log::debug!(
            "Selected C={:.4}, l1_ratio={:.4} with mean CV score {:.6}",
            best.c,
            best.l1_ratio,
            best.mean_score
        );

        let (coef, intercept) = fit_elastic_net(x, y, best.c, best.l1_ratio, &self.config);
        self.fitted = Some(LogisticFit {
            coef,
            intercept,
            c: best.c,
            l1_ratio: best.l1_ratio,
            cv_scores,
        });
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        Ok(self.predict_proba(x)?.mapv_into(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }

    fn probabilistic(&self) -> Option<&dyn ProbabilisticClassifier> {
        Some(self)
    }

    fn name(&self) -> &str {
        "logistic_regression_cv"
    }
}

impl ProbabilisticClassifier for LogisticRegressionCv {
    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let fitted = self.fitted.as_ref().ok_or(PropensityError::NotFitted)?;
        validate_features(x, fitted.coef.len())?;
        Ok((x.dot(&fitted.coef) + fitted.intercept).mapv_into(sigmoid))
    }
}

#[inline]
fn soft_threshold(z: f64, gamma: f64) -> f64 {
    if z > gamma {
        z - gamma
    } else if z < -gamma {
        z + gamma
    } else {
        0.0
    }
}

/// Fit one elastic-net logistic regression.
///
/// Minimises `(1/n) Σ logloss + λ ((1 - ρ)/2 ||w||² + ρ ||w||₁)` with
/// `λ = 1 / (C n)`, which has the same minimiser as the `C`-weighted
/// objective. Each outer iteration forms the IRLS quadratic approximation of
/// the log-likelihood and solves it by cyclic coordinate descent with soft
/// thresholding.
fn fit_elastic_net(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    c: f64,
    l1_ratio: f64,
    config: &ElasticNetConfig,
) -> (Array1<f64>, f64) {
    let (n_rows, n_features) = x.dim();
    let n = n_rows as f64;
    let lambda = 1.0 / (c * n);
    let l1 = lambda * l1_ratio;
    let l2 = lambda * (1.0 - l1_ratio);

    let mut coef = Array1::<f64>::zeros(n_features);
    let mut intercept = if config.fit_intercept {
        let mean = (y.sum() / n).clamp(1e-6, 1.0 - 1e-6);
        (mean / (1.0 - mean)).ln()
    } else {
        0.0
    };

    for iteration in 0..config.max_iter {
        let eta = x.dot(&coef) + intercept;
        let prob = eta.mapv_into(sigmoid);
        let weights = prob.mapv(|p| (p * (1.0 - p)).max(MIN_IRLS_WEIGHT));
        // Working residual z - eta of the quadratic approximation.
        let mut resid = (&y - &prob) / &weights;

        let col_sq: Vec<f64> = (0..n_features)
            .map(|j| {
                x.column(j)
                    .iter()
                    .zip(weights.iter())
                    .map(|(&xij, &wi)| wi * xij * xij)
                    .sum::<f64>()
                    / n
            })
            .collect();
        let weight_sum = weights.sum();

        let coef_old = coef.clone();
        let intercept_old = intercept;

        for _ in 0..MAX_INNER_SWEEPS {
            let mut max_delta: f64 = 0.0;

            for j in 0..n_features {
                let denom = col_sq[j] + l2;
                if denom <= 0.0 {
                    continue;
                }
                let xj = x.column(j);
                let partial = xj
                    .iter()
                    .zip(weights.iter())
                    .zip(resid.iter())
                    .map(|((&xij, &wi), &ri)| wi * xij * ri)
                    .sum::<f64>()
                    / n
                    + col_sq[j] * coef[j];
                let updated = soft_threshold(partial, l1) / denom;
                let delta = updated - coef[j];
                if delta != 0.0 {
                    resid.scaled_add(-delta, &xj);
                    coef[j] = updated;
                    max_delta = max_delta.max(delta.abs());
                }
            }

            if config.fit_intercept {
                let delta = (&weights * &resid).sum() / weight_sum;
                if delta != 0.0 {
                    resid -= delta;
                    intercept += delta;
                    max_delta = max_delta.max(delta.abs());
                }
            }

            if max_delta < config.tol {
                break;
            }
        }

        let change = coef
            .iter()
            .zip(coef_old.iter())
            .map(|(a, b)| (a - b).abs())
            .fold((intercept - intercept_old).abs(), f64::max);
        if change < config.tol {
            log::trace!("Elastic net (C={}, l1_ratio={}) converged after {} iterations", c, l1_ratio, iteration + 1);
            return (coef, intercept);
        }
    }

    log::debug!(
        "Elastic net (C={}, l1_ratio={}) did not converge within {} iterations",
        c,
        l1_ratio,
        config.max_iter
    );
    (coef, intercept)
}
