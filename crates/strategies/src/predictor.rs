// In crates/strategies/src/predictor.rs

use app_config::ModelSettings;
use core_types::{Direction, Signal, Symbol};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::features::{FeatureFrame, FeatureRow, explain};
use crate::forest::{ForestConfig, RandomForest};
use crate::{Error, Result, SignalPredictor};

/// Fewest rows the model will train on.
pub const MIN_TRAINING_ROWS: usize = 10;
const TEST_SHARE: f64 = 0.2;

/// A signal together with the indicator values it was derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub signal: Signal,
    pub row: FeatureRow,
    pub explanation: String,
}

impl Prediction {
    /// Indicator values worth showing to an operator.
    pub fn indicator_summary(&self) -> Vec<(&'static str, f64)> {
        let r = &self.row;
        vec![
            ("RSI", r.rsi),
            ("Short MA", r.short_ma),
            ("Long MA", r.long_ma),
            ("MACD", r.macd),
            ("MACD Signal", r.macd_signal),
            ("Bollinger Upper", r.bollinger_upper),
            ("Bollinger Lower", r.bollinger_lower),
        ]
    }
}

/// Random-forest classifier over the indicator frame.
///
/// Trains lazily on the first frame it is given, and again every
/// `retrain_every` predictions when that is non-zero.
#[derive(Debug)]
pub struct ForestPredictor {
    settings: ModelSettings,
    forest: RandomForest,
    predictions_since_training: u32,
}

impl ForestPredictor {
    pub fn new(settings: ModelSettings) -> Self {
        let forest = RandomForest::new(ForestConfig {
            n_trees: settings.n_trees,
            max_depth: settings.max_depth,
            seed: settings.seed,
        });
        Self {
            settings,
            forest,
            predictions_since_training: 0,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.forest.is_trained()
    }

    fn needs_training(&self) -> bool {
        !self.forest.is_trained()
            || (self.settings.retrain_every > 0
                && self.predictions_since_training >= self.settings.retrain_every)
    }

    /// Fits on a shuffled 80% of `frame` and reports accuracy on the rest.
    pub fn train(&mut self, symbol: &Symbol, frame: &FeatureFrame) -> Result<f64> {
        let n = frame.len();
        if n < MIN_TRAINING_ROWS {
            return Err(Error::Untrainable(format!(
                "{n} rows, at least {MIN_TRAINING_ROWS} are required"
            )));
        }
        let features = frame.matrix();
        let labels = frame.labels();
        let ones = labels.iter().filter(|&&l| l == 1).count();
        if ones == 0 || ones == n {
            return Err(Error::Untrainable("every row carries the same label".into()));
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut StdRng::seed_from_u64(self.settings.seed));
        let test_n = ((n as f64) * TEST_SHARE).ceil() as usize;
        let (test_idx, train_idx) = order.split_at(test_n);

        let pick = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<u8>) {
            idx.iter().map(|&i| (features[i].clone(), labels[i])).unzip()
        };
        let (x_train, y_train) = pick(train_idx);
        let (x_test, y_test) = pick(test_idx);

        self.forest.fit(&x_train, &y_train);
        let accuracy = self.forest.accuracy(&x_test, &y_test);
        self.predictions_since_training = 0;

        tracing::info!(
            symbol = %symbol,
            rows = n,
            train = x_train.len(),
            test = x_test.len(),
            accuracy_pct = (accuracy * 10_000.0).round() / 100.0,
            "Model trained."
        );
        Ok(accuracy)
    }
}

impl SignalPredictor for ForestPredictor {
    fn name(&self) -> &'static str {
        "RandomForest"
    }

    fn predict(&mut self, symbol: &Symbol, frame: &FeatureFrame) -> Result<Prediction> {
        if self.needs_training() {
            self.train(symbol, frame)?;
        }
        if frame.width() != self.forest.n_features() {
            return Err(Error::ShapeMismatch {
                expected: self.forest.n_features(),
                got: frame.width(),
            });
        }
        let row = *frame.last().ok_or_else(|| Error::Untrainable("empty feature frame".into()))?;

        let p_one = self.forest.predict_proba(&row.values());
        let buy = p_one > 0.5;
        let confidence = if buy { p_one } else { 1.0 - p_one };
        let direction = if confidence < self.settings.min_confidence {
            Direction::Hold
        } else if buy {
            Direction::Buy
        } else {
            Direction::Sell
        };
        self.predictions_since_training += 1;

        tracing::info!(symbol = %symbol, %direction, confidence, "Prediction complete.");
        Ok(Prediction {
            signal: Signal::new(symbol.clone(), direction).with_confidence(confidence),
            explanation: explain(&row, buy),
            row,
        })
    }
}
