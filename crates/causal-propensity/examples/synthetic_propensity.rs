use anyhow::Result;
use causal_propensity::config::{ClipBounds, ModelConfig};
use causal_propensity::models::{build_model, PropensityModel};
use causal_propensity::{compute_propensity_score, LogSink, ScoreOptions};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn main() -> Result<()> {
    env_logger::init();

    // Treatment depends on the first two covariates, the third is noise
    let mut rng = StdRng::seed_from_u64(42);
    let x = Array2::from_shape_fn((500, 3), |_| rng.gen_range(-1.0..1.0));
    let t = Array1::from_iter(x.rows().into_iter().map(|row| {
        let p = 1.0 / (1.0 + (-(2.0_f64 * row[0] - row[1])).exp());
        if rng.gen_bool(p) {
            1.0
        } else {
            0.0
        }
    }));
    println!("Synthetic X shape: {:?}, treated: {}", x.shape(), t.sum());

    for name in ["elasticnet", "gbdt", "gbdt_early_stop"] {
        let config = ModelConfig::new(ClipBounds::default(), name.parse().map_err(anyhow::Error::msg)?);
        let mut model = build_model(&config)?;
        let scores = model.fit_predict(x.view(), t.view(), &LogSink)?;
        println!(
            "{:<16} min={:.4} max={:.4} mean={:.4}",
            name,
            scores.fold(f64::INFINITY, |a, &b| a.min(b)),
            scores.fold(f64::NEG_INFINITY, |a, &b| a.max(b)),
            scores.mean().unwrap_or(f64::NAN)
        );
    }

    let (calibrated, model) = compute_propensity_score(x.view(), t.view(), None, ScoreOptions::default(), &LogSink)?;
    println!(
        "Calibrated scores len={} first 5 = {:?}, model returned: {}",
        calibrated.len(),
        &calibrated.to_vec()[..5],
        model.is_some()
    );
    Ok(())
}
