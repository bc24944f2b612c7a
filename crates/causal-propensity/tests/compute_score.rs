//! End-to-end tests for `compute_propensity_score` and its diagnostics.

use std::sync::Mutex;

use causal_propensity::models::{Classifier, GradientBoostedPropensityModel, LogisticRegressionPropensityModel};
use causal_propensity::{
    compute_propensity_score, Diagnostic, DiagnosticSink, NullSink, PropensityError, Result, ScoreOptions,
};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<Diagnostic>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<Diagnostic> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl DiagnosticSink for RecordingSink {
    fn emit(&self, event: Diagnostic) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Predicts hard labels from the sign of the first covariate and has no
/// probability output.
#[derive(Debug, Default)]
struct SignClassifier {
    fitted: bool,
}

impl Classifier for SignClassifier {
    fn fit(&mut self, _x: ArrayView2<f64>, _y: ArrayView1<f64>) -> Result<()> {
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        if !self.fitted {
            return Err(PropensityError::NotFitted);
        }
        Ok(x.column(0).mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }))
    }

    fn name(&self) -> &str {
        "sign"
    }
}

fn random_data(seed: u64) -> (Array2<f64>, Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let x = Array2::from_shape_fn((100, 3), |_| rng.gen_range(-1.0..1.0));
    let t = Array1::from_iter((0..100).map(|_| if rng.gen_bool(0.5) { 1.0 } else { 0.0 }));
    (x, t)
}

fn is_non_decreasing_in(scores: &Array1<f64>, by: ArrayView1<f64>) -> bool {
    let mut order: Vec<usize> = (0..by.len()).collect();
    order.sort_by(|&a, &b| by[a].total_cmp(&by[b]));
    order.windows(2).all(|w| scores[w[0]] <= scores[w[1]])
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

#[test]
fn default_model_calibrates_and_drops_the_model() -> anyhow::Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let (x, t) = random_data(42);
    let sink = RecordingSink::default();

    let (scores, model) = compute_propensity_score(x.view(), t.view(), None, ScoreOptions::default(), &sink)?;

    assert_eq!(scores.len(), 100);
    assert!(scores.iter().all(|&p| p > 0.0 && p < 1.0));
    assert!(model.is_none());
    assert_eq!(sink.events(), vec![Diagnostic::Calibrated]);
    Ok(())
}

#[test]
fn calibrated_scores_follow_the_raw_ranking() -> anyhow::Result<()> {
    let (x, t) = random_data(3);
    let (raw, model) = compute_propensity_score(
        x.view(),
        t.view(),
        Some(Box::new(LogisticRegressionPropensityModel::default())),
        ScoreOptions::new().calibrate(false),
        &NullSink,
    )?;
    assert!(model.is_some());

    let (calibrated, _) = compute_propensity_score(x.view(), t.view(), None, ScoreOptions::default(), &NullSink)?;
    assert!(is_non_decreasing_in(&calibrated, raw.view()));
    Ok(())
}

// ---------------------------------------------------------------------------
// Returned model
// ---------------------------------------------------------------------------

#[test]
fn uncalibrated_call_returns_the_supplied_model() -> anyhow::Result<()> {
    let (x, t) = random_data(5);
    let supplied: Box<dyn Classifier> = Box::new(GradientBoostedPropensityModel::default());
    let supplied_addr = &*supplied as *const dyn Classifier as *const ();

    let options = ScoreOptions::new().calibrate(false);
    let (scores, model) = compute_propensity_score(x.view(), t.view(), Some(supplied), options, &NullSink)?;

    let model = model.ok_or(PropensityError::NotFitted)?;
    assert!(std::ptr::eq(&*model as *const dyn Classifier as *const (), supplied_addr));
    assert_eq!(model.predict(x.view())?, scores);
    Ok(())
}

#[test]
fn calibrated_call_drops_the_supplied_model() -> anyhow::Result<()> {
    let (x, t) = random_data(5);
    let supplied: Box<dyn Classifier> = Box::new(GradientBoostedPropensityModel::with_early_stopping());
    let (scores, model) = compute_propensity_score(x.view(), t.view(), Some(supplied), ScoreOptions::default(), &NullSink)?;
    assert!(model.is_none());
    assert!(scores.iter().all(|&p| p > 0.0 && p < 1.0));
    Ok(())
}

// ---------------------------------------------------------------------------
// Label-only classifiers
// ---------------------------------------------------------------------------

#[test]
fn label_only_model_triggers_fallback() -> anyhow::Result<()> {
    let (x, t) = random_data(11);
    let sink = RecordingSink::default();
    let options = ScoreOptions::new().calibrate(false);

    let (scores, _) =
        compute_propensity_score(x.view(), t.view(), Some(Box::new(SignClassifier::default())), options, &sink)?;

    assert_eq!(
        sink.events(),
        vec![Diagnostic::ProbabilityFallback {
            model: "sign".to_string()
        }]
    );
    // Hard labels are nudged off the boundaries, never returned as 0 or 1.
    let eps = f64::EPSILON;
    assert!(scores.iter().all(|&p| p == eps * 1.001 || p == 1.0 - eps * 1.001));
    Ok(())
}

#[test]
fn label_only_model_can_still_be_calibrated() -> anyhow::Result<()> {
    let (x, t) = random_data(11);
    let sink = RecordingSink::default();
    let (scores, model) = compute_propensity_score(
        x.view(),
        t.view(),
        Some(Box::new(SignClassifier::default())),
        ScoreOptions::default(),
        &sink,
    )?;

    assert!(model.is_none());
    assert_eq!(sink.events().len(), 2);
    assert!(matches!(sink.events()[1], Diagnostic::Calibrated));
    let two_eps = 2.0 * f64::EPSILON;
    assert!(scores.iter().all(|&p| p >= two_eps && p <= 1.0 - two_eps));
    Ok(())
}

// ---------------------------------------------------------------------------
// Prediction inputs
// ---------------------------------------------------------------------------

#[test]
fn scores_a_separate_prediction_set() -> anyhow::Result<()> {
    let (x, t) = random_data(13);
    let (x_new, t_new) = random_data(14);
    let options = ScoreOptions::new()
        .x_pred(x_new.slice(s![..40, ..]))
        .treatment_pred(t_new.slice(s![..40]));

    let (scores, _) = compute_propensity_score(x.view(), t.view(), None, options, &NullSink)?;
    assert_eq!(scores.len(), 40);
    Ok(())
}

#[test]
fn mismatched_prediction_treatment_is_an_error() {
    let (x, t) = random_data(13);
    let short = t.slice(s![..10]);
    let options = ScoreOptions::new().treatment_pred(short);
    let result = compute_propensity_score(x.view(), t.view(), None, options, &NullSink);
    assert!(matches!(result, Err(PropensityError::LengthMismatch { .. })));
}

#[test]
fn wrong_feature_count_is_an_error() {
    let (x, t) = random_data(13);
    let narrow = x.slice(s![.., ..2]);
    let options = ScoreOptions::new().x_pred(narrow).calibrate(false);
    let result = compute_propensity_score(x.view(), t.view(), None, options, &NullSink);
    assert!(matches!(
        result,
        Err(PropensityError::FeatureMismatch { expected: 3, found: 2 })
    ));
}

#[test]
fn propensity_models_score_without_fallback() -> anyhow::Result<()> {
    let (x, t) = random_data(17);
    let sink = RecordingSink::default();
    let options = ScoreOptions::new().calibrate(false);
    let (scores, _) = compute_propensity_score(
        x.view(),
        t.view(),
        Some(Box::new(LogisticRegressionPropensityModel::default())),
        options,
        &sink,
    )?;

    assert!(sink.events().is_empty());
    assert!(scores.iter().all(|&p| (1e-3..=1.0 - 1e-3).contains(&p)));
    Ok(())
}

#[test]
fn nan_prediction_rows_never_become_scores() {
    let (x, t) = random_data(19);
    let mut x_pred = x.clone();
    x_pred[[0, 0]] = f64::NAN;
    let options = ScoreOptions::new().x_pred(x_pred.view()).calibrate(false);
    let result = compute_propensity_score(x.view(), t.view(), None, options, &NullSink);
    assert!(matches!(result, Err(PropensityError::NaNFound(1))));
}
