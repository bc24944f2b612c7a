//! Informational events emitted while fitting and scoring.
//!
//! Sinks are passed to each call instead of living in a process-wide logger.
//! Nothing emitted here ever changes control flow.
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// AUC of in-sample propensity scores against the treatment labels.
    /// `None` when the labels contain a single class.
    AucScore(Option<f64>),
    /// The model has no probability output, hard-label predictions were used.
    ProbabilityFallback { model: String },
    /// Scores were recalibrated and the fitted model is not returned.
    Calibrated,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::AucScore(Some(auc)) => write!(f, "AUC score: {:.6}", auc),
            Diagnostic::AucScore(None) => write!(f, "AUC score: undefined for a single class"),
            Diagnostic::ProbabilityFallback { model } => {
                write!(f, "predict_proba not available for {}, using predict instead", model)
            }
            Diagnostic::Calibrated => write!(f, "Calibrating propensity scores. Returning p_model=None."),
        }
    }
}

pub trait DiagnosticSink {
    fn emit(&self, event: Diagnostic);
}

/// Forwards every event to the `log` facade at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn emit(&self, event: Diagnostic) {
        log::info!("{}", event);
    }
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn emit(&self, _event: Diagnostic) {}
}
