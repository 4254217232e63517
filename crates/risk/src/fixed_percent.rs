// In crates/risk/src/fixed_percent.rs

use std::collections::HashMap;

use app_config::Settings;
use core_types::{Direction, Position, Side, Signal, Symbol};
use num_traits::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::{Action, Error, Result, RiskManager};

/// Sizing and stop-level parameters, converted once from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskParams {
    /// Stop-loss distance as a fraction of entry.
    pub stop_loss_pct: Decimal,
    /// Take-profit distance as a fraction of entry.
    pub take_profit_pct: Decimal,
    pub leverage: u8,
    /// Margin committed per position, in quote currency.
    pub investment_amount: Decimal,
    pub default_lot_size: Decimal,
    pub lot_sizes: HashMap<Symbol, Decimal>,
}

fn to_decimal(name: &str, value: f64) -> Result<Decimal> {
    Decimal::from_f64(value)
        .ok_or_else(|| Error::InvalidParameters(format!("{name} ({value}) is not a finite number")))
}

impl RiskParams {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let t = &settings.trading;
        let symbols = settings
            .symbols()
            .map_err(|e| Error::InvalidParameters(e.to_string()))?;

        let mut lot_sizes = HashMap::new();
        for symbol in symbols {
            let lot = to_decimal("lot size", settings.lot_size_for(&symbol))?;
            lot_sizes.insert(symbol, lot);
        }

        Ok(Self {
            stop_loss_pct: to_decimal("stop_loss_percent", t.stop_loss_percent)?,
            take_profit_pct: to_decimal("take_profit_percent", t.take_profit_percent)?,
            leverage: t.leverage,
            investment_amount: to_decimal("investment_amount", t.investment_amount)?,
            default_lot_size: to_decimal("default_lot_size", t.default_lot_size)?,
            lot_sizes,
        })
    }

    pub fn lot_size(&self, symbol: &Symbol) -> Decimal {
        self.lot_sizes.get(symbol).copied().unwrap_or(self.default_lot_size)
    }
}

/// Fixed-fraction stop-loss/take-profit with fixed-margin sizing.
///
/// 1. A stop level reached by the current price closes the position, whatever the signal says.
/// 2. Otherwise the signal opens, holds or reverses; there is never more than one position.
#[derive(Debug, Clone)]
pub struct FixedPercentRisk {
    params: RiskParams,
}

impl FixedPercentRisk {
    pub fn new(params: RiskParams) -> Self {
        Self { params }
    }

    /// True when `price` has reached either stop level of `position`. Bounds are inclusive.
    pub fn is_breached(&self, position: &Position, price: Decimal) -> bool {
        let (sl, tp) = self.stop_levels(position.side, position.entry_price);
        match position.side {
            Side::Long => price <= sl || price >= tp,
            Side::Short => price >= sl || price <= tp,
        }
    }
}

impl RiskManager for FixedPercentRisk {
    fn name(&self) -> &'static str {
        "FixedPercentRisk"
    }

    fn evaluate(&self, symbol: &Symbol, signal: &Signal, position: Option<&Position>, price: Decimal) -> Action {
        if &signal.symbol != symbol {
            tracing::warn!(
                symbol = %symbol,
                signal_symbol = %signal.symbol,
                "Signal belongs to a different symbol; holding."
            );
            return Action::Hold;
        }

        let Some(position) = position else {
            return match signal.direction {
                Direction::Buy => Action::OpenLong,
                Direction::Sell => Action::OpenShort,
                Direction::Hold => Action::Hold,
            };
        };

        if !position.is_open() {
            // Only confirmed positions are acted on.
            tracing::warn!(symbol = %symbol, status = ?position.status, "Position is not confirmed open; holding.");
            return Action::Hold;
        }

        if self.is_breached(position, price) {
            return Action::CloseOnly;
        }

        match (position.side, signal.direction) {
            (Side::Long, Direction::Sell) | (Side::Short, Direction::Buy) => Action::CloseAndReverse,
            _ => Action::Hold,
        }
    }

    fn position_size(&self, symbol: &Symbol, price: Decimal) -> Result<Decimal> {
        let lot_size = self.params.lot_size(symbol);
        let amount = self.params.investment_amount;
        let leverage = self.params.leverage;
        if price <= Decimal::ZERO || lot_size <= Decimal::ZERO {
            return Err(Error::InvalidParameters(format!(
                "price ({price}) and lot size ({lot_size}) must be positive"
            )));
        }

        let raw = amount * Decimal::from(leverage) / price;
        let quantity = (raw / lot_size).floor() * lot_size;
        if quantity <= Decimal::ZERO {
            return Err(Error::InvalidSize {
                amount,
                leverage,
                price,
                lot_size,
            });
        }
        Ok(quantity.normalize())
    }

    fn stop_levels(&self, side: Side, entry: Decimal) -> (Decimal, Decimal) {
        let sl = self.params.stop_loss_pct;
        let tp = self.params.take_profit_pct;
        match side {
            Side::Long => (entry * (dec!(1) - sl), entry * (dec!(1) + tp)),
            Side::Short => (entry * (dec!(1) + sl), entry * (dec!(1) - tp)),
        }
    }

    fn leverage(&self) -> u8 {
        self.params.leverage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::PositionStatus;

    fn btc() -> Symbol {
        Symbol("BTCUSDT".into())
    }

    fn risk() -> FixedPercentRisk {
        FixedPercentRisk::new(RiskParams {
            stop_loss_pct: dec!(0.05),
            take_profit_pct: dec!(0.10),
            leverage: 5,
            investment_amount: dec!(100),
            default_lot_size: dec!(0.001),
            lot_sizes: HashMap::from([(Symbol("ETHUSDT".into()), dec!(0.1))]),
        })
    }

    fn open(side: Side) -> Position {
        Position {
            symbol: btc(),
            side,
            entry_price: dec!(100),
            quantity: dec!(1),
            leverage: 5,
            sl_price: dec!(95),
            tp_price: dec!(110),
            status: PositionStatus::Open,
            opened_at: None,
            closed_at: None,
            exit_price: None,
        }
    }

    fn signal(direction: Direction) -> Signal {
        Signal::new(btc(), direction)
    }

    #[test]
    fn flat_book_follows_the_signal() {
        let r = risk();
        assert_eq!(r.evaluate(&btc(), &signal(Direction::Buy), None, dec!(100)), Action::OpenLong);
        assert_eq!(r.evaluate(&btc(), &signal(Direction::Sell), None, dec!(100)), Action::OpenShort);
        assert_eq!(r.evaluate(&btc(), &signal(Direction::Hold), None, dec!(100)), Action::Hold);
    }

    #[test]
    fn decision_table_for_open_positions() {
        let r = risk();
        let long = open(Side::Long);
        let short = open(Side::Short);
        let cases = [
            (&long, Direction::Buy, Action::Hold),
            (&long, Direction::Sell, Action::CloseAndReverse),
            (&long, Direction::Hold, Action::Hold),
            (&short, Direction::Sell, Action::Hold),
            (&short, Direction::Buy, Action::CloseAndReverse),
            (&short, Direction::Hold, Action::Hold),
        ];
        for (pos, direction, expected) in cases {
            assert_eq!(r.evaluate(&btc(), &signal(direction), Some(pos), dec!(100)), expected);
        }
    }

    #[test]
    fn stop_levels_override_the_signal() {
        let r = risk();
        let long = open(Side::Long);
        let sell = signal(Direction::Sell);
        assert_eq!(r.evaluate(&btc(), &sell, Some(&long), dec!(94)), Action::CloseOnly);
        assert_eq!(r.evaluate(&btc(), &sell, Some(&long), dec!(111)), Action::CloseOnly);
        assert_eq!(r.evaluate(&btc(), &sell, Some(&long), dec!(100)), Action::CloseAndReverse);
        assert_eq!(r.evaluate(&btc(), &signal(Direction::Hold), Some(&long), dec!(100)), Action::Hold);
    }

    #[test]
    fn stop_bounds_are_inclusive_for_both_sides() {
        let r = risk();
        let hold = signal(Direction::Hold);
        let long = open(Side::Long);
        assert_eq!(r.evaluate(&btc(), &hold, Some(&long), dec!(95)), Action::CloseOnly);
        assert_eq!(r.evaluate(&btc(), &hold, Some(&long), dec!(110)), Action::CloseOnly);
        assert_eq!(r.evaluate(&btc(), &hold, Some(&long), dec!(95.01)), Action::Hold);

        let short = open(Side::Short);
        assert_eq!(r.evaluate(&btc(), &hold, Some(&short), dec!(105)), Action::CloseOnly);
        assert_eq!(r.evaluate(&btc(), &hold, Some(&short), dec!(90)), Action::CloseOnly);
        assert_eq!(r.evaluate(&btc(), &hold, Some(&short), dec!(104.99)), Action::Hold);
    }

    #[test]
    fn mismatched_signal_symbol_holds() {
        let r = risk();
        let eth_buy = Signal::new(Symbol("ETHUSDT".into()), Direction::Buy);
        assert_eq!(r.evaluate(&btc(), &eth_buy, None, dec!(100)), Action::Hold);
    }

    #[test]
    fn evaluate_is_repeatable() {
        let r = risk();
        let long = open(Side::Long);
        let sell = signal(Direction::Sell);
        let first = r.evaluate(&btc(), &sell, Some(&long), dec!(101));
        let second = r.evaluate(&btc(), &sell, Some(&long), dec!(101));
        assert_eq!(first, second);
        assert_eq!(long, open(Side::Long));
    }

    #[test]
    fn pending_positions_are_not_acted_on() {
        let r = risk();
        let mut pending = open(Side::Long);
        pending.status = PositionStatus::PendingClose;
        assert_eq!(r.evaluate(&btc(), &signal(Direction::Sell), Some(&pending), dec!(50)), Action::Hold);
    }

    #[test]
    fn size_rounds_down_to_the_lot() {
        let r = risk();
        // 100 * 5 / 3000 = 0.16666.. -> 0.166
        assert_eq!(r.position_size(&btc(), dec!(3000)).unwrap(), dec!(0.166));
        // ETH uses its own lot of 0.1: 500 / 2100 = 0.238.. -> 0.2
        assert_eq!(r.position_size(&Symbol("ETHUSDT".into()), dec!(2100)).unwrap(), dec!(0.2));
    }

    #[test]
    fn size_below_one_lot_is_rejected() {
        let r = risk();
        let err = r.position_size(&btc(), dec!(1000000)).unwrap_err();
        assert!(matches!(err, Error::InvalidSize { .. }));
        assert!(r.position_size(&btc(), dec!(0)).is_err());
    }

    #[test]
    fn stop_levels_mirror_for_shorts() {
        let r = risk();
        assert_eq!(r.stop_levels(Side::Long, dec!(100)), (dec!(95.00), dec!(110.00)));
        assert_eq!(r.stop_levels(Side::Short, dec!(100)), (dec!(105.00), dec!(90.00)));
    }
}
