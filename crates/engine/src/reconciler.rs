// In crates/engine/src/reconciler.rs

use chrono::Utc;
use core_types::{Position, PositionStatus, Symbol};
use execution::ExchangePosition;
use notifier::messages;

use crate::Result;
use crate::lifecycle::LifecycleManager;

/// What a reconciliation pass changed for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Unchanged,
    /// An exchange position with no confirmed local record was taken over.
    Adopted,
    /// The local record was updated to the exchange's size and entry.
    Refreshed,
    /// The local position no longer exists on the exchange.
    ClosedExternally,
    /// A pending open that never reached the exchange was dropped.
    Discarded,
}

impl LifecycleManager {
    /// Brings the local record for `symbol` in line with the exchange, which is authoritative.
    ///
    /// Stop levels are not stored on the exchange, so they are recomputed from the
    /// exchange's entry price whenever a position is adopted or refreshed.
    pub async fn reconcile(&self, symbol: &Symbol) -> Result<ReconcileOutcome> {
        let gateway = self.gateway();
        let remote = self
            .retry()
            .call("get_position", symbol, || gateway.get_position(symbol))
            .await?;

        let mut store = self.store().lock().await;
        let local = store.get(symbol).cloned();
        // Sent once the store is released.
        let mut notices = Vec::new();

        let outcome = match (local, remote) {
            (None, None) => ReconcileOutcome::Unchanged,

            (Some(local), None) if local.status == PositionStatus::PendingOpen => {
                store.remove(symbol);
                tracing::warn!(symbol = %symbol, "Pending open never reached the exchange; discarded.");
                ReconcileOutcome::Discarded
            }

            (Some(local), None) => {
                let closed = Position {
                    closed_at: Some(Utc::now()),
                    exit_price: None,
                    ..local
                };
                store.archive(closed.clone());
                tracing::warn!(symbol = %symbol, side = %closed.side, "Position was closed on the exchange.");
                self.record_trade(&closed);
                notices.push(messages::position_closed_externally(&closed));
                ReconcileOutcome::ClosedExternally
            }

            (Some(local), Some(remote)) if local.status != PositionStatus::PendingOpen && local.side != remote.side => {
                let closed = Position {
                    closed_at: Some(Utc::now()),
                    exit_price: None,
                    ..local
                };
                store.archive(closed.clone());
                tracing::warn!(symbol = %symbol, local = %closed.side, remote = %remote.side, "Exchange holds the opposite side; adopting it.");
                self.record_trade(&closed);
                notices.push(messages::position_closed_externally(&closed));

                let adopted = self.adopt(&remote);
                store.upsert(adopted.clone());
                notices.push(messages::position_adopted(&adopted));
                ReconcileOutcome::Adopted
            }

            (Some(local), Some(remote)) if local.status != PositionStatus::PendingOpen => {
                let (sl_price, tp_price) = self.risk().stop_levels(remote.side, remote.entry_price);
                let refreshed = Position {
                    quantity: remote.quantity,
                    entry_price: remote.entry_price,
                    leverage: remote.leverage,
                    sl_price,
                    tp_price,
                    status: PositionStatus::Open,
                    ..local.clone()
                };
                if refreshed == local {
                    ReconcileOutcome::Unchanged
                } else {
                    tracing::info!(
                        symbol = %symbol,
                        quantity = %refreshed.quantity,
                        entry = %refreshed.entry_price,
                        "Local position refreshed from the exchange."
                    );
                    store.upsert(refreshed);
                    ReconcileOutcome::Refreshed
                }
            }

            // No local record, or a pending open whose order did land.
            (_, Some(remote)) => {
                let adopted = self.adopt(&remote);
                tracing::info!(
                    symbol = %symbol,
                    side = %adopted.side,
                    quantity = %adopted.quantity,
                    entry = %adopted.entry_price,
                    "Adopted position from the exchange."
                );
                store.upsert(adopted.clone());
                notices.push(messages::position_adopted(&adopted));
                ReconcileOutcome::Adopted
            }
        };

        if outcome != ReconcileOutcome::Unchanged {
            if let Err(e) = store.persist() {
                tracing::error!(symbol = %symbol, error = %e, "Failed to persist position snapshot.");
            }
        }
        drop(store);

        for notice in &notices {
            self.notifier().send(notice).await;
        }
        Ok(outcome)
    }

    fn adopt(&self, remote: &ExchangePosition) -> Position {
        let (sl_price, tp_price) = self.risk().stop_levels(remote.side, remote.entry_price);
        Position {
            symbol: remote.symbol.clone(),
            side: remote.side,
            entry_price: remote.entry_price,
            quantity: remote.quantity,
            leverage: remote.leverage,
            sl_price,
            tp_price,
            status: PositionStatus::Open,
            opened_at: Some(Utc::now()),
            closed_at: None,
            exit_price: None,
        }
    }
}
