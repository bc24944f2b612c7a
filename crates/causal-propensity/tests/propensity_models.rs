//! Integration tests for the propensity model variants and the model factory.

use causal_propensity::config::{ClipBounds, EarlyStoppingConfig, GradientBoostingConfig, ModelConfig};
use causal_propensity::models::{
    build_model, Classifier, ElasticNetPropensityModel, GradientBoostedPropensityModel,
    LogisticRegressionPropensityModel, PropensityModel,
};
use causal_propensity::{NullSink, PropensityError};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 100 x 3 uniform features, roughly half of the units treated.
fn random_data(seed: u64) -> (Array2<f64>, Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let x = Array2::from_shape_fn((100, 3), |_| rng.gen_range(0.0..1.0));
    let t = Array1::from_iter((0..100).map(|i| (i % 2) as f64));
    (x, t)
}

/// Treatment driven by the first covariate with some label noise.
fn confounded_data(n: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let x = Array2::from_shape_fn((n, 3), |_| rng.gen_range(-1.0..1.0));
    let t = Array1::from_iter(x.rows().into_iter().map(|row| {
        let p = 1.0 / (1.0 + (-3.0_f64 * row[0]).exp());
        if rng.gen_bool(p) {
            1.0
        } else {
            0.0
        }
    }));
    (x, t)
}

// ---------------------------------------------------------------------------
// Shared contract
// ---------------------------------------------------------------------------

#[test]
fn scores_stay_within_default_clip_bounds() -> anyhow::Result<()> {
    init_logger();
    let (x, t) = random_data(7);
    let bounds = ClipBounds::default();

    let mut models: Vec<Box<dyn PropensityModel>> = vec![
        Box::new(LogisticRegressionPropensityModel::default()),
        Box::new(GradientBoostedPropensityModel::default()),
        Box::new(GradientBoostedPropensityModel::with_early_stopping()),
    ];
    for model in models.iter_mut() {
        let scores = model.fit_predict(x.view(), t.view(), &NullSink)?;
        assert_eq!(scores.len(), 100, "{}", model.name());
        assert!(scores.iter().all(|&p| bounds.contains(p)), "{}", model.name());
    }
    Ok(())
}

#[test]
fn custom_clip_bounds_are_enforced() -> anyhow::Result<()> {
    let (x, t) = confounded_data(200, 3);
    let bounds = ClipBounds::new(0.2, 0.8)?;
    let mut model = GradientBoostedPropensityModel::new(GradientBoostingConfig::default(), None, bounds)?;
    model.fit(x.view(), t.view())?;
    let scores = model.predict(x.view())?;

    assert!(scores.iter().all(|&p| (0.2..=0.8).contains(&p)));
    assert!(scores.iter().any(|&p| p == 0.2));
    assert!(scores.iter().any(|&p| p == 0.8));
    Ok(())
}

#[test]
fn invalid_clip_bounds_are_rejected() {
    for (lower, upper) in [(0.0, 0.5), (0.6, 0.4), (0.1, 1.0), (f64::NAN, 0.9)] {
        assert!(matches!(
            ClipBounds::new(lower, upper),
            Err(PropensityError::InvalidClipBounds { .. })
        ));
    }
}

#[test]
fn predict_before_fit_is_an_error() {
    let (x, _) = random_data(1);
    let logistic = LogisticRegressionPropensityModel::default();
    let boosted = GradientBoostedPropensityModel::default();
    assert!(matches!(logistic.predict(x.view()), Err(PropensityError::NotFitted)));
    assert!(matches!(boosted.predict(x.view()), Err(PropensityError::NotFitted)));
}

#[test]
fn estimator_errors_propagate_unchanged() {
    let (x, _) = random_data(1);
    let mut model = LogisticRegressionPropensityModel::default();

    let short = Array1::from_elem(10, 1.0);
    assert!(matches!(
        model.fit(x.view(), short.view()),
        Err(PropensityError::LengthMismatch { expected: 100, found: 10 })
    ));

    let ones = Array1::from_elem(100, 1.0);
    assert!(matches!(model.fit(x.view(), ones.view()), Err(PropensityError::SingleClass)));

    let mut labels = Array1::from_iter((0..100).map(|i| (i % 2) as f64));
    labels[5] = 2.0;
    assert!(matches!(
        model.fit(x.view(), labels.view()),
        Err(PropensityError::NonBinaryLabel(v)) if v == 2.0
    ));
}

#[test]
fn refit_replaces_learned_state() -> anyhow::Result<()> {
    let (x, t) = confounded_data(150, 11);
    let mut model = GradientBoostedPropensityModel::default();
    model.fit(x.view(), t.view())?;
    let first = model.predict(x.view())?;

    let flipped = t.mapv(|v| 1.0 - v);
    model.fit(x.view(), flipped.view())?;
    let second = model.predict(x.view())?;

    let corr: f64 = first.iter().zip(second.iter()).map(|(a, b)| (a - 0.5) * (b - 0.5)).sum();
    assert!(corr < 0.0);
    Ok(())
}

// ---------------------------------------------------------------------------
// Elastic net
// ---------------------------------------------------------------------------

#[test]
fn elastic_net_and_logistic_names_fit_the_same_model() -> anyhow::Result<()> {
    let (x, t) = confounded_data(120, 5);
    let mut a = ElasticNetPropensityModel::default();
    let mut b = LogisticRegressionPropensityModel::default();
    a.fit(x.view(), t.view())?;
    b.fit(x.view(), t.view())?;

    assert_eq!(a.model().coef(), b.model().coef());
    assert_eq!(a.model().intercept(), b.model().intercept());
    assert_eq!(a.predict(x.view())?, b.predict(x.view())?);
    Ok(())
}

#[test]
fn elastic_net_ranks_treated_units_higher() -> anyhow::Result<()> {
    let (x, t) = confounded_data(300, 21);
    let mut model = LogisticRegressionPropensityModel::default();
    model.fit(x.view(), t.view())?;

    let coef = model.model().coef().ok_or(PropensityError::NotFitted)?;
    assert!(coef[0] > 0.0);
    assert_eq!(model.model().cv_scores().len(), 16);

    let scores = model.predict(x.view())?;
    let auc = causal_propensity::metrics::roc_auc_score(t.view(), scores.view()).unwrap_or(0.0);
    assert!(auc > 0.75, "auc {}", auc);
    Ok(())
}

// ---------------------------------------------------------------------------
// Gradient boosting
// ---------------------------------------------------------------------------

#[test]
fn early_stopping_predictions_are_clipped() -> anyhow::Result<()> {
    init_logger();
    let (x, t) = random_data(42);
    let mut model = GradientBoostedPropensityModel::with_early_stopping();
    assert!(model.early_stop());

    model.fit(x.view(), t.view())?;
    let scores = model.predict(x.view())?;
    assert_eq!(scores.len(), 100);
    assert!(scores.iter().all(|&p| p >= 1e-3 && p <= 1.0 - 1e-3));

    let booster = model.model();
    let best = booster.best_iteration().ok_or(PropensityError::NotFitted)?;
    assert!(best < booster.n_trees());
    Ok(())
}

#[test]
fn early_stopping_stops_before_all_rounds_on_noise() -> anyhow::Result<()> {
    let (x, t) = random_data(9);
    let config = GradientBoostingConfig {
        n_estimators: 500,
        ..GradientBoostingConfig::default()
    };
    let early = EarlyStoppingConfig { rounds: 5, val_size: 0.3 };
    let mut model = GradientBoostedPropensityModel::new(config, Some(early), ClipBounds::default())?;
    model.fit(x.view(), t.view())?;
    assert!(model.model().n_trees() < 500);
    Ok(())
}

#[test]
fn validation_size_override_rejects_out_of_range_fractions() {
    let (x, t) = random_data(2);
    let mut model = GradientBoostedPropensityModel::with_early_stopping();
    for size in [0.0, 1.0, -0.5] {
        assert!(model.fit_with_validation_size(x.view(), t.view(), size).is_err());
    }
    assert!(model.fit_with_validation_size(x.view(), t.view(), 0.25).is_ok());
}

#[test]
fn boosting_without_early_stopping_is_reproducible() -> anyhow::Result<()> {
    let (x, t) = confounded_data(120, 8);
    let mut a = GradientBoostedPropensityModel::default();
    let mut b = GradientBoostedPropensityModel::default();
    a.fit(x.view(), t.view())?;
    b.fit(x.view(), t.view())?;
    assert_eq!(a.predict(x.view())?, b.predict(x.view())?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

#[test]
fn factory_builds_and_predicts() -> anyhow::Result<()> {
    let (x, t) = confounded_data(80, 4);
    for name in ["elasticnet", "logistic", "gbdt", "gbdt_early_stop"] {
        let config = ModelConfig::new(ClipBounds::new(0.01, 0.99)?, name.parse().map_err(anyhow::Error::msg)?);
        let mut model = build_model(&config)?;
        let scores = model.fit_predict(x.view(), t.view(), &NullSink)?;
        assert_eq!(scores.len(), x.nrows());
        assert!(scores.iter().all(|&p| (0.01..=0.99).contains(&p)), "{}", name);
    }
    Ok(())
}

#[test]
fn factory_models_convert_into_classifiers() -> anyhow::Result<()> {
    let (x, t) = confounded_data(80, 4);
    let model = build_model(&ModelConfig::default())?;
    let mut classifier = model.into_classifier();
    classifier.fit(x.view(), t.view())?;
    let probabilistic = classifier.probabilistic().ok_or(PropensityError::NotFitted)?;
    assert_eq!(probabilistic.predict_proba(x.view())?, classifier.predict(x.view())?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Non-finite and degenerate inputs
// ---------------------------------------------------------------------------

#[test]
fn infinite_feature_is_rejected_at_fit() {
    let (mut x, t) = random_data(3);
    x[[3, 0]] = f64::INFINITY;

    let mut logistic = LogisticRegressionPropensityModel::default();
    let mut boosted = GradientBoostedPropensityModel::default();
    assert!(matches!(logistic.fit(x.view(), t.view()), Err(PropensityError::NaNFound(1))));
    assert!(matches!(boosted.fit(x.view(), t.view()), Err(PropensityError::NaNFound(1))));
}

#[test]
fn non_finite_rows_are_rejected_at_predict() -> anyhow::Result<()> {
    let (x, t) = random_data(3);
    let mut model = LogisticRegressionPropensityModel::default();
    model.fit(x.view(), t.view())?;

    let mut x_pred = x.clone();
    x_pred[[0, 1]] = f64::NAN;
    x_pred[[5, 2]] = f64::NEG_INFINITY;
    assert!(matches!(model.predict(x_pred.view()), Err(PropensityError::NaNFound(2))));
    Ok(())
}

#[test]
fn zero_covariate_matrix_is_rejected() {
    let x = Array2::<f64>::zeros((10, 0));
    let t = Array1::from_iter((0..10).map(|i| (i % 2) as f64));
    let mut logistic = LogisticRegressionPropensityModel::default();
    let mut boosted = GradientBoostedPropensityModel::default();
    assert!(matches!(logistic.fit(x.view(), t.view()), Err(PropensityError::EmptyInput)));
    assert!(matches!(boosted.fit(x.view(), t.view()), Err(PropensityError::EmptyInput)));
}
