// In crates/risk/src/lib.rs

use core_types::{Position, Signal, Symbol};
use rust_decimal::Decimal;

pub mod error;
pub mod fixed_percent;

// Re-export public types
pub use error::{Error, Result};
pub use fixed_percent::{FixedPercentRisk, RiskParams};

/// What the lifecycle manager should do for a symbol on this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    OpenLong,
    OpenShort,
    /// Close the open position, then open the opposite side.
    CloseAndReverse,
    Hold,
    /// Close the open position because a stop level was reached.
    CloseOnly,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Action::OpenLong => "OpenLong",
            Action::OpenShort => "OpenShort",
            Action::CloseAndReverse => "CloseAndReverse",
            Action::Hold => "Hold",
            Action::CloseOnly => "CloseOnly",
        };
        f.write_str(name)
    }
}

/// The universal interface for a risk management module.
///
/// A `RiskManager` turns a signal and the current position into an `Action`,
/// and owns the sizing and stop-level policy used when that action is carried out.
pub trait RiskManager: Send + Sync {
    /// The name of the risk management policy.
    fn name(&self) -> &'static str;

    /// Decides the action for `symbol`. Must not depend on anything but its inputs.
    ///
    /// # Arguments
    ///
    /// * `symbol`: The symbol being evaluated.
    /// * `signal`: The predictor's signal for this tick.
    /// * `position`: The confirmed position for the symbol, if one exists.
    /// * `price`: The latest traded price.
    fn evaluate(&self, symbol: &Symbol, signal: &Signal, position: Option<&Position>, price: Decimal) -> Action;

    /// Order quantity for a new position on `symbol` at `price`.
    fn position_size(&self, symbol: &Symbol, price: Decimal) -> Result<Decimal>;

    /// Stop-loss and take-profit prices for a position entered at `entry`.
    fn stop_levels(&self, side: core_types::Side, entry: Decimal) -> (Decimal, Decimal);

    /// Leverage applied to new positions.
    fn leverage(&self) -> u8;
}
