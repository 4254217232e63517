// In crates/notifier/src/messages.rs

use std::fmt::Display;

use core_types::{Position, Signal};
use rust_decimal::Decimal;

/// Alert for a freshly predicted signal.
pub fn signal_alert(signal: &Signal, close: f64, indicators: &[(&str, f64)], explanation: &str) -> String {
    let mut out = format!(
        "<b>Trading Signal Alert</b>\n\n<b>Symbol:</b> {}\n<b>Signal:</b> {}\n<b>Time:</b> {}\n<b>Close Price:</b> {:.2}\n",
        signal.symbol,
        signal.direction,
        signal.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        close,
    );
    if let Some(confidence) = signal.confidence {
        out.push_str(&format!("<b>Confidence:</b> {:.0}%\n", confidence * 100.0));
    }
    out.push_str("\n<b>Indicators Summary:</b>\n");
    for (name, value) in indicators {
        out.push_str(&format!("{name}: {value:.2}\n"));
    }
    out.push_str(&format!("\n<b>Decision Explanation:</b>\n{}\n", escape(explanation)));
    out
}

pub fn position_opened(position: &Position) -> String {
    format!(
        "<b>Position opened</b>\n{} {} {} @ {} (x{})\nSL: {} | TP: {}",
        position.symbol,
        position.side,
        position.quantity,
        position.entry_price,
        position.leverage,
        position.sl_price.round_dp(4),
        position.tp_price.round_dp(4),
    )
}

pub fn position_closed(position: &Position, exit_price: Decimal, reason: &str) -> String {
    let pnl = position.pnl_at(exit_price);
    format!(
        "<b>Position closed</b> ({})\n{} {} {}\nEntry: {} | Exit: {}\nPnL: {}",
        escape(reason),
        position.symbol,
        position.side,
        position.quantity,
        position.entry_price,
        exit_price,
        pnl.round_dp(4),
    )
}

pub fn position_closed_externally(position: &Position) -> String {
    format!(
        "<b>Position closed on the exchange</b>\n{} {} {} entered @ {} is no longer open.",
        position.symbol, position.side, position.quantity, position.entry_price,
    )
}

pub fn position_adopted(position: &Position) -> String {
    format!(
        "<b>Position recovered from the exchange</b>\n{} {} {} @ {}\nSL: {} | TP: {}",
        position.symbol,
        position.side,
        position.quantity,
        position.entry_price,
        position.sl_price.round_dp(4),
        position.tp_price.round_dp(4),
    )
}

/// Report for a failed cycle step.
pub fn failure(symbol: impl Display, stage: &str, error: impl Display) -> String {
    format!(
        "<b>Error</b> on {}\nStage: {}\n{}",
        symbol,
        escape(stage),
        escape(&error.to_string())
    )
}

/// Report sent before the bot halts.
pub fn fatal(error: impl Display) -> String {
    format!(
        "<b>Trading halted</b>\n{}\nOperator intervention required.",
        escape(&error.to_string())
    )
}

/// Escapes the characters Telegram's HTML mode treats as markup.
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Drops tags and decodes the escapes produced by `escape`, for plain-text sinks.
pub fn strip_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&lt;", "<").replace("&gt;", ">").replace("&amp;", "&")
}
