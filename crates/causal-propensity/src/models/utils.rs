use ndarray::{ArrayView1, ArrayView2};

use crate::error::{PropensityError, Result};

#[inline]
pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn count_non_finite(x: ArrayView2<f64>) -> usize {
    x.iter().filter(|v| !v.is_finite()).count()
}

/// Check a training set before it reaches an estimator: matching lengths,
/// finite features, 0/1 labels and both classes present.
pub fn validate_training_data(x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(PropensityError::EmptyInput);
    }
    if x.nrows() != y.len() {
        return Err(PropensityError::LengthMismatch {
            expected: x.nrows(),
            found: y.len(),
        });
    }
    let non_finite = count_non_finite(x);
    if non_finite > 0 {
        return Err(PropensityError::NaNFound(non_finite));
    }
    if let Some(&bad) = y.iter().find(|&&l| l != 0.0 && l != 1.0) {
        return Err(PropensityError::NonBinaryLabel(bad));
    }
    let positives = y.iter().filter(|&&l| l == 1.0).count();
    if positives == 0 || positives == y.len() {
        return Err(PropensityError::SingleClass);
    }
    Ok(())
}

/// Check a prediction input against the number of features seen in `fit`
/// and reject non-finite values.
pub fn validate_features(x: ArrayView2<f64>, n_features: usize) -> Result<()> {
    if x.ncols() != n_features {
        return Err(PropensityError::FeatureMismatch {
            expected: n_features,
            found: x.ncols(),
        });
    }
    let non_finite = count_non_finite(x);
    if non_finite > 0 {
        return Err(PropensityError::NaNFound(non_finite));
    }
    Ok(())
}

/// Run `op` on a dedicated rayon pool of `n_jobs` threads, or on the global
/// pool when `n_jobs` is `None`.
pub fn with_thread_pool<T, F>(n_jobs: Option<usize>, op: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> Result<T> + Send,
{
    match n_jobs {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(n).build()?;
            pool.install(op)
        }
        None => op(),
    }
}
