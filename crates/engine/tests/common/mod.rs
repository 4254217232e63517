#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use app_config::Settings;
use core_types::{Direction, Signal, Symbol};
use engine::Engine;
use execution::SimulationSettings;
use execution::simulated::SimulatedExchange;
use notifier::RecordingNotifier;
use strategies::{FeatureFrame, Prediction, SignalPredictor};
use tempfile::TempDir;

/// Answers with queued directions, then Hold.
pub struct ScriptedPredictor {
    script: Arc<Mutex<VecDeque<Direction>>>,
}

impl ScriptedPredictor {
    pub fn new(directions: impl IntoIterator<Item = Direction>) -> (Self, Arc<Mutex<VecDeque<Direction>>>) {
        let script = Arc::new(Mutex::new(directions.into_iter().collect()));
        (Self { script: script.clone() }, script)
    }
}

impl SignalPredictor for ScriptedPredictor {
    fn name(&self) -> &'static str {
        "Scripted"
    }

    fn predict(&mut self, symbol: &Symbol, frame: &FeatureFrame) -> strategies::Result<Prediction> {
        let direction = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Direction::Hold);
        let row = *frame.last().unwrap();
        Ok(Prediction {
            signal: Signal::new(symbol.clone(), direction),
            row,
            explanation: format!("scripted {direction}"),
        })
    }
}

/// A model that can never be trained.
pub struct UntrainablePredictor;

impl SignalPredictor for UntrainablePredictor {
    fn name(&self) -> &'static str {
        "Untrainable"
    }

    fn predict(&mut self, _symbol: &Symbol, _frame: &FeatureFrame) -> strategies::Result<Prediction> {
        Err(strategies::Error::Untrainable("every row has the same label".into()))
    }
}

pub fn btc() -> Symbol {
    Symbol("BTCUSDT".into())
}

pub fn settings(dir: &TempDir, symbols: &[&str]) -> Settings {
    let symbols = symbols
        .iter()
        .map(|s| format!("\"{s}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let positions = dir.path().join("positions.json");
    let journal = dir.path().join("trade_log.csv");
    let toml = format!(
        r#"
        [app]
        environment = "test"
        log_level = "info"
        simulation = true

        [exchange]
        api_key = "key"
        secret_key = "secret"

        [trading]
        symbols = [{symbols}]
        interval = "15m"
        period = "30d"
        leverage = 5
        investment_amount = 100.0
        stop_loss_percent = 0.05
        take_profit_percent = 0.10
        poll_interval_secs = 1

        [gateway]
        timeout_secs = 2
        max_retries = 3
        retry_base_delay_ms = 1

        [storage]
        positions_path = "{}"
        trade_log_path = "{}"
        log_dir = "{}"
        "#,
        positions.display(),
        journal.display(),
        dir.path().display(),
    );
    app_config::settings_from_toml(&toml).unwrap()
}

pub struct Harness {
    pub dir: TempDir,
    pub exchange: Arc<SimulatedExchange>,
    pub notifier: Arc<RecordingNotifier>,
    pub engine: Engine,
    pub script: Arc<Mutex<VecDeque<Direction>>>,
}

impl Harness {
    /// An engine on one symbol, trading a simulated exchange pinned at `price`.
    pub async fn new(price: rust_decimal::Decimal, directions: Vec<Direction>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self::in_dir(dir, price, directions).await
    }

    pub async fn in_dir(dir: TempDir, price: rust_decimal::Decimal, directions: Vec<Direction>) -> Self {
        let exchange = Arc::new(SimulatedExchange::new(SimulationSettings::default()));
        exchange.set_price(&btc(), price);
        let notifier = Arc::new(RecordingNotifier::new());
        let engine = Engine::new(
            settings(&dir, &["BTC-USD"]),
            exchange.clone(),
            exchange.clone(),
            notifier.clone(),
        )
        .unwrap();
        let (predictor, script) = ScriptedPredictor::new(directions);
        assert!(engine.set_predictor(&btc(), Box::new(predictor)).await);
        Self {
            dir,
            exchange,
            notifier,
            engine,
            script,
        }
    }

    pub fn push(&self, direction: Direction) {
        self.script.lock().unwrap().push_back(direction);
    }
}
