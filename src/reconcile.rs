//! Reconciliation of incoming snapshots
//!
//! Sits between the snapshot sources (Poller, DemoSimulator) and the state
//! machine. Identical snapshots are filtered out before they reach the
//! reducer, server history is merged into the bounded [`History`], and a
//! corrupted poll is replaced by the safe default snapshot together with a
//! repair request for the server.

use tracing::{debug, warn};

use crate::history::History;
use crate::models::{CashoutRecord, GameSnapshot, HistoryEntry, RepairRequest, StatusResponse};

/// Longest body excerpt attached to a repair request
const REPAIR_SAMPLE_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    /// Hand this snapshot to the state machine
    Apply(GameSnapshot),
    /// Structurally identical to the last accepted snapshot
    Duplicate,
    /// Corrupted cycle: apply the fallback and fire the repair request
    Corrupted {
        fallback: GameSnapshot,
        repair: RepairRequest,
    },
}

/// What a full status payload changed besides the snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub snapshot: Reconciled,
    pub new_history: usize,
    pub online_players_changed: bool,
    pub cashouts_changed: bool,
}

#[derive(Debug, Default)]
pub struct Reconciler {
    last_accepted: Option<GameSnapshot>,
    history: History,
    online_players: u32,
    cashouts: Vec<CashoutRecord>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a full poll/sync payload
    pub fn accept_status(&mut self, status: StatusResponse) -> StatusUpdate {
        let new_history = self.history.merge(&status.history);
        if new_history > 0 {
            debug!(new = new_history, total = self.history.len(), "Merged server history");
        }

        let online_players_changed = self.online_players != status.online_players;
        self.online_players = status.online_players;

        let cashouts_changed = self.cashouts != status.cashouts;
        if cashouts_changed {
            self.cashouts = status.cashouts;
        }

        StatusUpdate {
            snapshot: self.accept_snapshot(status.game_state),
            new_history,
            online_players_changed,
            cashouts_changed,
        }
    }

    /// Filter one snapshot
    pub fn accept_snapshot(&mut self, snapshot: GameSnapshot) -> Reconciled {
        if !snapshot.is_well_formed() {
            warn!(
                multiplier = snapshot.multiplier,
                crash_point = ?snapshot.crash_point,
                "Snapshot failed numeric sanity checks"
            );
            let sample = serde_json::to_string(&snapshot).ok();
            return self.corrupted("snapshot failed numeric sanity checks", sample);
        }
        if self.last_accepted.as_ref() == Some(&snapshot) {
            return Reconciled::Duplicate;
        }
        self.last_accepted = Some(snapshot.clone());
        Reconciled::Apply(snapshot)
    }

    /// A poll whose body could not be decoded
    pub fn corrupted(&mut self, message: &str, sample: Option<String>) -> Reconciled {
        let sample = sample.map(|s| s.chars().take(REPAIR_SAMPLE_CHARS).collect::<String>());
        Reconciled::Corrupted {
            fallback: GameSnapshot::safe_default(),
            repair: RepairRequest::new(message, sample),
        }
    }

    /// Record a crash observed locally (demo rounds, or a server round whose
    /// history entry has not arrived yet)
    pub fn record_crash(&mut self, value: f64, timestamp: i64) -> bool {
        self.history.insert(HistoryEntry::new(value, timestamp))
    }

    /// Forget the structural-equality baseline; the next snapshot is always new
    pub fn reset_baseline(&mut self) {
        self.last_accepted = None;
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn online_players(&self) -> u32 {
        self.online_players
    }

    pub fn cashouts(&self) -> &[CashoutRecord] {
        &self.cashouts
    }
}
