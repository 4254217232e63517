// In crates/engine/src/store.rs

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use core_types::{Position, PositionStatus, Symbol};
use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    positions: Vec<Position>,
    closed: Vec<Position>,
}

/// Live positions keyed by symbol, plus the archive of closed ones.
///
/// When a snapshot path is set, `persist` writes the whole store as JSON.
/// A loaded snapshot is only a starting point; the exchange is reconciled on top of it.
#[derive(Debug, Default)]
pub struct PositionStore {
    live: HashMap<Symbol, Position>,
    closed: Vec<Position>,
    snapshot_path: Option<PathBuf>,
}

impl PositionStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the snapshot at `path` if it exists; later `persist` calls write back to it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let snapshot = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<Snapshot>(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => return Err(e.into()),
        };

        let live = snapshot
            .positions
            .into_iter()
            .map(|p| (p.symbol.clone(), p))
            .collect::<HashMap<_, _>>();
        tracing::info!(
            path = %path.display(),
            live = live.len(),
            closed = snapshot.closed.len(),
            "Loaded position snapshot."
        );
        Ok(Self {
            live,
            closed: snapshot.closed,
            snapshot_path: Some(path),
        })
    }

    pub fn get(&self, symbol: &Symbol) -> Option<&Position> {
        self.live.get(symbol)
    }

    /// The position for `symbol` if it is confirmed open.
    pub fn open_position(&self, symbol: &Symbol) -> Option<&Position> {
        self.live.get(symbol).filter(|p| p.status == PositionStatus::Open)
    }

    pub fn upsert(&mut self, position: Position) {
        self.live.insert(position.symbol.clone(), position);
    }

    pub fn remove(&mut self, symbol: &Symbol) -> Option<Position> {
        self.live.remove(symbol)
    }

    /// Moves `position` into the closed archive, dropping any live record for its symbol.
    pub fn archive(&mut self, mut position: Position) {
        self.live.remove(&position.symbol);
        position.status = PositionStatus::Closed;
        self.closed.push(position);
    }

    pub fn live_positions(&self) -> impl Iterator<Item = &Position> {
        self.live.values()
    }

    pub fn closed_positions(&self) -> &[Position] {
        &self.closed
    }

    /// Writes the snapshot atomically (temp file, then rename). No-op for in-memory stores.
    pub fn persist(&self) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let mut positions: Vec<&Position> = self.live.values().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        let snapshot = serde_json::json!({
            "positions": positions,
            "closed": self.closed,
        });

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&snapshot)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
