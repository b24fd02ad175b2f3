/// Typed engine events
/// The engine publishes what happened; presentation layers subscribe and
/// decide on toasts, sounds and animation.

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::connection::ConnectionMode;
use crate::error::ErrorClass;
use crate::models::{Bet, CashoutRecord, HistoryEntry, RoundPhase};

/// Capacity of the engine's event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    PhaseChanged {
        phase: RoundPhase,
        round: u64,
    },
    CountdownTick(u32),
    MultiplierUpdated {
        multiplier: f64,
        /// false for local extrapolation between snapshots
        authoritative: bool,
    },
    RoundCrashed {
        round: u64,
        crash_point: f64,
        lost_bet: Option<Bet>,
    },
    RoundAbandoned {
        round: u64,
    },
    BetPlaced(Bet),
    BetConfirmed(Bet),
    BetRejected {
        message: String,
        class: ErrorClass,
    },
    /// Bet taken out of play by a mode switch
    BetVoided {
        bet: Bet,
        refunded: bool,
    },
    /// Bet resolved as a loss outside the crash edge
    BetLost(Bet),
    CashoutAccepted(CashoutRecord),
    CashoutRejected {
        message: String,
        class: ErrorClass,
    },
    ConnectionModeChanged {
        from: ConnectionMode,
        to: ConnectionMode,
        consecutive_failures: u32,
    },
    HistoryUpdated {
        latest: Option<HistoryEntry>,
        len: usize,
    },
    /// User-facing notification, one per occurrence
    Notice {
        kind: NotificationKind,
        message: String,
    },
}

/// External toast/audio collaborator
pub trait Notifier: Send + 'static {
    fn notify(&self, kind: NotificationKind, message: &str);
}

impl<F> Notifier for F
where
    F: Fn(NotificationKind, &str) + Send + 'static,
{
    fn notify(&self, kind: NotificationKind, message: &str) {
        self(kind, message)
    }
}

/// Forward every `Notice` to `notifier` until the engine's sender is dropped
pub fn spawn_notifier<N: Notifier>(
    mut rx: broadcast::Receiver<EngineEvent>,
    notifier: N,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(EngineEvent::Notice { kind, message }) => notifier.notify(kind, &message),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notifier lagged behind engine events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event channel closed, notifier exiting");
                    break;
                }
            }
        }
    })
}
