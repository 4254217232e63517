// In crates/analytics/src/summary.rs

use core_types::{Position, Side};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Unrealised return of a position in percent of its entry price.
pub fn profit_percentage(entry: Decimal, current: Decimal, side: Side) -> Decimal {
    if entry.is_zero() {
        return Decimal::ZERO;
    }
    let change = (current - entry) / entry * dec!(100);
    match side {
        Side::Long => change,
        Side::Short => -change,
    }
}

/// One line of the open-positions summary.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPositionRow {
    pub position: Position,
    /// Latest price, when one could be read this tick.
    pub current_price: Option<Decimal>,
}

const HEADERS: [&str; 8] = [
    "Symbol",
    "Direction",
    "Order Size",
    "Entry Price",
    "Current Price",
    "Stop Loss",
    "Take Profit",
    "Profit Percentage",
];

/// Renders an aligned text table of open positions, or `None` when there are none.
pub fn open_positions_table(rows: &[OpenPositionRow]) -> Option<String> {
    if rows.is_empty() {
        return None;
    }

    let cells: Vec<[String; 8]> = rows
        .iter()
        .map(|row| {
            let p = &row.position;
            let current = row.current_price;
            [
                p.symbol.to_string(),
                p.side.to_string(),
                p.quantity.normalize().to_string(),
                p.entry_price.normalize().to_string(),
                current.map(|c| c.normalize().to_string()).unwrap_or_else(|| "n/a".into()),
                p.sl_price.round_dp(4).normalize().to_string(),
                p.tp_price.round_dp(4).normalize().to_string(),
                current
                    .map(|c| format!("{:.2}%", profit_percentage(p.entry_price, c, p.side)))
                    .unwrap_or_else(|| "n/a".into()),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &cells {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let separator = {
        let parts: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
        format!("+{}+", parts.join("+"))
    };
    let mut out = vec![separator.clone(), render_line(&HEADERS, &widths), separator.clone()];
    for row in &cells {
        let fields: Vec<&str> = row.iter().map(String::as_str).collect();
        out.push(render_line(&fields, &widths));
    }
    out.push(separator);
    Some(out.join("\n"))
}

fn render_line(fields: &[&str], widths: &[usize]) -> String {
    let parts: Vec<String> = fields
        .iter()
        .zip(widths)
        .map(|(f, w)| format!(" {f:<w$} ", w = *w))
        .collect();
    format!("|{}|", parts.join("|"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{PositionStatus, Symbol};

    fn position(side: Side) -> Position {
        Position {
            symbol: Symbol("BTCUSDT".into()),
            side,
            entry_price: dec!(100),
            quantity: dec!(1.5),
            leverage: 5,
            sl_price: dec!(95),
            tp_price: dec!(110),
            status: PositionStatus::Open,
            opened_at: None,
            closed_at: None,
            exit_price: None,
        }
    }

    #[test]
    fn profit_sign_depends_on_side() {
        assert_eq!(profit_percentage(dec!(100), dec!(105), Side::Long), dec!(5));
        assert_eq!(profit_percentage(dec!(100), dec!(105), Side::Short), dec!(-5));
        assert_eq!(profit_percentage(dec!(0), dec!(105), Side::Long), dec!(0));
    }

    #[test]
    fn table_is_aligned() {
        let rows = vec![
            OpenPositionRow {
                position: position(Side::Long),
                current_price: Some(dec!(102)),
            },
            OpenPositionRow {
                position: position(Side::Short),
                current_price: None,
            },
        ];
        let table = open_positions_table(&rows).unwrap();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines.iter().all(|l| l.len() == lines[0].len()));
        assert!(lines[3].contains("2.00%"));
        assert!(lines[4].contains("n/a"));
    }

    #[test]
    fn empty_book_has_no_table() {
        assert!(open_positions_table(&[]).is_none());
    }
}
