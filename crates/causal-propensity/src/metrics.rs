//! Scoring functions shared by cross-validation, early stopping and the
//! propensity diagnostics.
use ndarray::ArrayView1;

/// Probabilities are clamped to `[EPS, 1 - EPS]` before taking logs.
const LOG_LOSS_EPS: f64 = 1e-15;

fn trapezoid_area(x0: f64, x1: f64, y0: f64, y1: f64) -> f64 {
    (x0 - x1).abs() * (y0 + y1) * 0.5
}

/// Area under the ROC curve of `scores` against binary labels `y`.
///
/// Tied scores contribute half a pair each. Returns `None` when the labels
/// contain a single class, where the AUC is undefined. `y` and `scores` must
/// have the same length.
pub fn roc_auc_score(y: ArrayView1<f64>, scores: ArrayView1<f64>) -> Option<f64> {
    debug_assert_eq!(y.len(), scores.len(), "labels and scores differ in length");
    if y.is_empty() || y.len() != scores.len() {
        return None;
    }

    let mut indices = (0..y.len()).collect::<Vec<_>>();
    indices.sort_unstable_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut auc = 0.0;
    let mut tp = 0.0;
    let mut fp = 0.0;
    let mut tp_prev = 0.0;
    let mut fp_prev = 0.0;

    for (rank, &i) in indices.iter().enumerate() {
        if rank > 0 && scores[i] != scores[indices[rank - 1]] {
            auc += trapezoid_area(fp_prev, fp, tp_prev, tp);
            tp_prev = tp;
            fp_prev = fp;
        }
        if y[i] > 0.5 {
            tp += 1.0;
        } else {
            fp += 1.0;
        }
    }
    auc += trapezoid_area(fp_prev, fp, tp_prev, tp);

    if tp == 0.0 || fp == 0.0 {
        return None;
    }
    Some(auc / (tp * fp))
}

/// Mean binary cross-entropy of probabilities `p` against labels `y`.
pub fn log_loss(y: ArrayView1<f64>, p: ArrayView1<f64>) -> f64 {
    if y.is_empty() {
        return 0.0;
    }
    let total: f64 = y
        .iter()
        .zip(p.iter())
        .map(|(&y_, &p_)| {
            let p_ = p_.clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS);
            -(y_ * p_.ln() + (1.0 - y_) * (1.0 - p_).ln())
        })
        .sum();
    total / y.len() as f64
}

/// Fraction of rows where `p >= 0.5` agrees with the label.
pub fn accuracy(y: ArrayView1<f64>, p: ArrayView1<f64>) -> f64 {
    if y.is_empty() {
        return 0.0;
    }
    let correct = y
        .iter()
        .zip(p.iter())
        .filter(|(y_, p_)| (**p_ >= 0.5) == (**y_ > 0.5))
        .count();
    correct as f64 / y.len() as f64
}
