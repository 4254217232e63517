mod common;

use common::{Harness, btc};
use core_types::{Direction, PositionStatus};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Buy), Just(Direction::Sell), Just(Direction::Hold)]
}

/// Replays `steps` through a full engine and checks the store after every tick.
async fn replay(steps: Vec<(Direction, u32)>) -> Result<(), TestCaseError> {
    let mut h = Harness::new(Decimal::from(100), Vec::new()).await;
    for (direction, price) in steps {
        h.exchange.set_price(&btc(), Decimal::from(price));
        h.push(direction);
        h.engine.run_tick().await.map_err(|e| TestCaseError::fail(e.to_string()))?;

        let store = h.engine.manager().store().lock().await;
        let live: Vec<_> = store.live_positions().collect();
        prop_assert!(live.len() <= 1);
        prop_assert!(live.iter().all(|p| p.status == PositionStatus::Open));

        // The local view always matches the exchange after a tick.
        match (store.open_position(&btc()), h.exchange.position(&btc())) {
            (Some(local), Some(remote)) => {
                prop_assert_eq!(local.side, remote.side);
                prop_assert_eq!(local.quantity, remote.quantity);
            }
            (None, None) => {}
            (local, remote) => {
                return Err(TestCaseError::fail(format!("diverged: {local:?} vs {remote:?}")));
            }
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn at_most_one_open_position(steps in prop::collection::vec((direction(), 80u32..=120), 1..12)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(replay(steps))?;
    }
}
