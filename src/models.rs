// Core data model for the crash game client
// Wire types for the game server boundary plus the bet/cash-out/history records

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::settings::HISTORY_GREEN_THRESHOLD;

/// Wall-clock milliseconds since the epoch
#[inline]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ============================================================================
// Round state
// ============================================================================

/// Four-phase round cycle: Inactive -> Waiting -> Active -> Crashed -> Inactive
///
/// The server calls the join window `countdown`; locally it is `Waiting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundPhase {
    #[serde(alias = "Inactive")]
    Inactive,
    #[serde(rename = "countdown", alias = "Countdown", alias = "waiting", alias = "Waiting")]
    Waiting,
    #[serde(alias = "Active")]
    Active,
    #[serde(alias = "Crashed")]
    Crashed,
}

impl RoundPhase {
    /// The only phase reachable in one step
    pub fn next(self) -> Self {
        match self {
            RoundPhase::Inactive => RoundPhase::Waiting,
            RoundPhase::Waiting => RoundPhase::Active,
            RoundPhase::Active => RoundPhase::Crashed,
            RoundPhase::Crashed => RoundPhase::Inactive,
        }
    }
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RoundPhase::Inactive => "INACTIVE",
            RoundPhase::Waiting => "WAITING",
            RoundPhase::Active => "ACTIVE",
            RoundPhase::Crashed => "CRASHED",
        })
    }
}

/// A player entry as listed in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerEntry {
    pub username: String,
    #[serde(alias = "betAmount")]
    pub amount: f64,
    pub auto_cashout: Option<f64>,
    pub cashed_out_at: Option<f64>,
    pub win_amount: Option<f64>,
}

fn default_multiplier() -> f64 {
    1.0
}

/// One authoritative state payload, from the server or the demo simulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub state: RoundPhase,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default)]
    pub countdown: u32,
    #[serde(default)]
    pub crash_point: Option<f64>,
    #[serde(default)]
    pub players: Vec<PlayerEntry>,
    /// Required; a body without one is malformed
    pub timestamp: i64,
}

impl GameSnapshot {
    /// Substituted for a corrupted poll; timestamp 0 never outranks applied data
    pub fn safe_default() -> Self {
        Self {
            state: RoundPhase::Inactive,
            multiplier: 1.0,
            countdown: 0,
            crash_point: None,
            players: Vec::new(),
            timestamp: 0,
        }
    }

    /// Numeric sanity: finite multiplier >= 1.0 and a sane crash point
    pub fn is_well_formed(&self) -> bool {
        let multiplier_ok = self.multiplier.is_finite() && self.multiplier >= 1.0;
        let crash_ok = self
            .crash_point
            .map(|c| c.is_finite() && c >= 1.0)
            .unwrap_or(true);
        multiplier_ok && crash_ok && self.timestamp >= 0
    }
}

/// Response body of the status poll and the `sync` action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub game_state: GameSnapshot,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub online_players: u32,
    #[serde(default)]
    pub cashouts: Vec<CashoutRecord>,
}

// ============================================================================
// History
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HistoryColor {
    Green,
    #[default]
    Red,
}

impl HistoryColor {
    pub fn for_value(value: f64) -> Self {
        if value >= HISTORY_GREEN_THRESHOLD {
            HistoryColor::Green
        } else {
            HistoryColor::Red
        }
    }
}

/// A finished round's crash point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub value: f64,
    #[serde(default)]
    pub color: HistoryColor,
    pub timestamp: i64,
}

impl HistoryEntry {
    pub fn new(value: f64, timestamp: i64) -> Self {
        Self {
            value,
            color: HistoryColor::for_value(value),
            timestamp,
        }
    }
}

// ============================================================================
// Bets & cash-outs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BetStatus {
    Pending,
    Confirmed,
    Rejected,
}

/// A player's stake in one round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bet {
    pub id: String,
    pub username: String,
    pub amount: f64,
    pub auto_cashout_multiplier: f64,
    pub placed_at: i64,
    pub status: BetStatus,
    /// Local round counter the bet joins
    pub round: u64,
}

impl Bet {
    pub fn pending(username: &str, amount: f64, auto_cashout_multiplier: f64, round: u64) -> Self {
        Self {
            id: format!("bet-{:016x}", rand::random::<u64>()),
            username: username.to_string(),
            amount,
            auto_cashout_multiplier,
            placed_at: now_ms(),
            status: BetStatus::Pending,
            round,
        }
    }
}

/// A locked-in payout; at most one per player per round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashoutRecord {
    pub username: String,
    pub multiplier: f64,
    pub win_amount: f64,
    pub timestamp: i64,
}

// ============================================================================
// Action requests / responses
// ============================================================================

/// POST body for the game action endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ActionRequest {
    Sync {
        username: String,
    },
    #[serde(rename_all = "camelCase")]
    PlaceBet {
        username: String,
        bet_amount: f64,
        auto_cashout: f64,
    },
    Cashout {
        username: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashoutResponse {
    pub success: bool,
    #[serde(default)]
    pub multiplier: Option<f64>,
    #[serde(default)]
    pub win_amount: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Error shape returned by the server instead of a payload
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Fired on detected data corruption
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairRequest {
    pub error_data: RepairErrorData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepairErrorData {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample: Option<String>,
    pub timestamp: i64,
}

impl RepairRequest {
    pub fn new(message: impl Into<String>, sample: Option<String>) -> Self {
        Self {
            error_data: RepairErrorData {
                message: message.into(),
                sample,
                timestamp: now_ms(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RepairResponse {
    #[serde(default)]
    pub repaired: bool,
}

// ============================================================================
// Tests
// ============================================================================
