use ndarray::{Array1, ArrayView1};

use crate::error::{PropensityError, Result};

/// Least-squares isotonic (non-decreasing) regression of a target on a single
/// input, fitted with the pool-adjacent-violators algorithm.
///
/// Fitted values are clipped to `[y_min, y_max]`. Inputs outside the range seen
/// during `fit` are clipped to it instead of extrapolated, inputs between two
/// thresholds are linearly interpolated.
#[derive(Debug, Clone)]
pub struct IsotonicRegression {
    y_min: f64,
    y_max: f64,
    thresholds: Vec<f64>,
    values: Vec<f64>,
}

impl IsotonicRegression {
    pub fn new(y_min: f64, y_max: f64) -> Result<Self> {
        if !(y_min <= y_max) {
            return Err(PropensityError::InvalidConfig(format!(
                "y_min ({}) must not exceed y_max ({})",
                y_min, y_max
            )));
        }
        Ok(Self {
            y_min,
            y_max,
            thresholds: Vec::new(),
            values: Vec::new(),
        })
    }

    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn fit(&mut self, x: ArrayView1<f64>, y: ArrayView1<f64>) -> Result<()> {
        if x.is_empty() {
            return Err(PropensityError::EmptyInput);
        }
        if x.len() != y.len() {
            return Err(PropensityError::LengthMismatch {
                expected: x.len(),
                found: y.len(),
            });
        }
        let nan_count = x.iter().chain(y.iter()).filter(|v| !v.is_finite()).count();
        if nan_count > 0 {
            return Err(PropensityError::NaNFound(nan_count));
        }

        let mut order: Vec<usize> = (0..x.len()).collect();
        order.sort_unstable_by(|&a, &b| x[a].total_cmp(&x[b]));

        // Pool equal inputs first: (x, sum_y, count).
        let mut unique: Vec<(f64, f64, f64)> = Vec::with_capacity(x.len());
        for &i in &order {
            match unique.last_mut() {
                Some(last) if last.0 == x[i] => {
                    last.1 += y[i];
                    last.2 += 1.0;
                }
                _ => unique.push((x[i], y[i], 1.0)),
            }
        }

        // Blocks of (sum_y, count, number of unique inputs covered).
        let mut blocks: Vec<(f64, f64, usize)> = Vec::with_capacity(unique.len());
        for &(_, sum_y, count) in &unique {
            let mut block = (sum_y, count, 1usize);
            while let Some(prev) = blocks.last() {
                if prev.0 / prev.1 >= block.0 / block.1 {
                    block = (block.0 + prev.0, block.1 + prev.1, block.2 + prev.2);
                    blocks.pop();
                } else {
                    break;
                }
            }
            blocks.push(block);
        }

        let mut values = Vec::with_capacity(unique.len());
        for &(sum_y, count, span) in &blocks {
            let value = (sum_y / count).clamp(self.y_min, self.y_max);
            values.extend(std::iter::repeat(value).take(span));
        }

        self.thresholds = unique.iter().map(|u| u.0).collect();
        self.values = values;
        Ok(())
    }

    pub fn transform(&self, x: ArrayView1<f64>) -> Result<Array1<f64>> {
        if self.thresholds.is_empty() {
            return Err(PropensityError::NotFitted);
        }
        let nan_count = x.iter().filter(|v| !v.is_finite()).count();
        if nan_count > 0 {
            return Err(PropensityError::NaNFound(nan_count));
        }
        let last = self.thresholds.len() - 1;
        Ok(x.mapv(|p| {
            if p <= self.thresholds[0] {
                return self.values[0];
            }
            if p >= self.thresholds[last] {
                return self.values[last];
            }
            let idx = self.thresholds.partition_point(|&t| t <= p) - 1;
            let (x0, x1) = (self.thresholds[idx], self.thresholds[idx + 1]);
            let (y0, y1) = (self.values[idx], self.values[idx + 1]);
            y0 + (y1 - y0) * (p - x0) / (x1 - x0)
        }))
    }

    pub fn fit_transform(&mut self, x: ArrayView1<f64>, y: ArrayView1<f64>) -> Result<Array1<f64>> {
        self.fit(x, y)?;
        self.transform(x)
    }
}

/// Calibrate propensity scores against observed treatment with isotonic
/// regression.
///
/// The result is a non-decreasing function of `ps`, clipped to
/// `[2ε, 1 - 2ε]` where `ε` is `f64::EPSILON`.
pub fn calibrate(ps: ArrayView1<f64>, treatment: ArrayView1<f64>) -> Result<Array1<f64>> {
    let two_eps = 2.0 * f64::EPSILON;
    let mut isotonic = IsotonicRegression::new(two_eps, 1.0 - two_eps)?;
    isotonic.fit_transform(ps, treatment)
}
