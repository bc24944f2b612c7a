//! Row splitters used for cross-validation and early-stopping validation sets.
use ndarray::ArrayView1;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::error::{PropensityError, Result};

/// Train and test row indices of one fold.
pub type Fold = (Vec<usize>, Vec<usize>);

/// K-fold splitter that keeps the class balance of a binary label vector in
/// every fold.
#[derive(Debug, Clone)]
pub struct StratifiedKFold {
    n_splits: usize,
    shuffle: bool,
    random_state: u64,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize, shuffle: bool, random_state: u64) -> Self {
        Self {
            n_splits,
            shuffle,
            random_state,
        }
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Split rows into `n_splits` folds.
    ///
    /// Rows of each class are (optionally) shuffled with the configured seed
    /// and dealt to the folds in turn, continuing where the previous class
    /// stopped so fold sizes differ by at most one.
    pub fn split(&self, y: ArrayView1<f64>) -> Result<Vec<Fold>> {
        let n_samples = y.len();
        if self.n_splits < 2 {
            return Err(PropensityError::InvalidConfig(format!(
                "n_splits must be at least 2, got {}",
                self.n_splits
            )));
        }
        if self.n_splits > n_samples {
            return Err(PropensityError::InvalidConfig(format!(
                "cannot split {} rows into {} folds",
                n_samples, self.n_splits
            )));
        }

        let mut positives: Vec<usize> = (0..n_samples).filter(|&i| y[i] > 0.5).collect();
        let mut negatives: Vec<usize> = (0..n_samples).filter(|&i| y[i] <= 0.5).collect();

        let smallest = positives.len().min(negatives.len());
        if smallest < self.n_splits {
            log::warn!(
                "The least populated class has only {} members, which is less than n_splits={}",
                smallest,
                self.n_splits
            );
        }

        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.random_state);
            negatives.shuffle(&mut rng);
            positives.shuffle(&mut rng);
        }

        let mut fold_of = vec![0usize; n_samples];
        for (k, &idx) in negatives.iter().chain(positives.iter()).enumerate() {
            fold_of[idx] = k % self.n_splits;
        }

        let folds = (0..self.n_splits)
            .map(|fold| {
                let (test, train): (Vec<usize>, Vec<usize>) =
                    (0..n_samples).partition(|&i| fold_of[i] == fold);
                log::trace!(
                    "Fold {} with {} training rows and {} testing rows",
                    fold,
                    train.len(),
                    test.len()
                );
                (train, test)
            })
            .collect();

        Ok(folds)
    }
}

/// Randomly partition `n_samples` row indices into a train and a test set.
///
/// The test set holds `ceil(test_size * n_samples)` rows. Both sides must be
/// non-empty.
pub fn train_test_split<R: Rng + ?Sized>(
    n_samples: usize,
    test_size: f64,
    rng: &mut R,
) -> Result<Fold> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(PropensityError::InvalidConfig(format!(
            "test_size must be in (0, 1), got {}",
            test_size
        )));
    }
    let n_test = (test_size * n_samples as f64).ceil() as usize;
    if n_test == 0 || n_test >= n_samples {
        return Err(PropensityError::InvalidConfig(format!(
            "test_size={} leaves an empty split for {} rows",
            test_size, n_samples
        )));
    }

    let mut indices: Vec<usize> = (0..n_samples).collect();
    indices.shuffle(rng);
    let train = indices.split_off(n_test);
    Ok((train, indices))
}
