// In crates/strategies/src/lib.rs

use core_types::Symbol;

pub mod error;
pub mod features;
pub mod forest;
pub mod predictor;

// Re-export public types
pub use error::{Error, Result};
pub use features::{FeatureBuilder, FeatureFrame, FeatureRow};
pub use predictor::{ForestPredictor, Prediction};

/// The universal interface for a signal predictor.
///
/// A predictor turns a feature frame into a trading `Signal`. It is stateful:
/// it may train on the first frame it sees and keep the model across calls.
pub trait SignalPredictor: Send {
    /// The name of the predictor.
    fn name(&self) -> &'static str;

    /// Predicts the signal for the most recent row of `frame`.
    fn predict(&mut self, symbol: &Symbol, frame: &FeatureFrame) -> Result<Prediction>;
}

