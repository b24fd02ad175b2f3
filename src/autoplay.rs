/// Martingale auto-bettor
/// Watches engine events, joins every round with a martingale-sized stake and
/// cashes out once the multiplier reaches the target. The loss streak lives
/// here; `martingale::next_stake` stays a pure function.

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::engine::EngineHandle;
use crate::events::EngineEvent;
use crate::martingale::next_stake;
use crate::models::RoundPhase;
use crate::settings::MARTINGALE_CAP;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoBetConfig {
    pub base_stake: f64,
    /// Cash-out multiplier, also sent as the bet's auto-cashout
    pub target: f64,
    pub cap: f64,
}

impl AutoBetConfig {
    pub fn new(base_stake: f64, target: f64) -> Self {
        Self {
            base_stake,
            target,
            cap: MARTINGALE_CAP,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AutoAction {
    PlaceBet { amount: f64, auto_cashout: f64 },
    Cashout,
}

#[derive(Debug)]
pub struct AutoBettor {
    config: AutoBetConfig,
    /// Stakes lost in the current streak, oldest first
    streak: Vec<f64>,
    joined_round: bool,
    riding: bool,
    /// Set once per round when a cash-out goes out; cleared on `Inactive`
    cashing: bool,
}

impl AutoBettor {
    pub fn new(config: AutoBetConfig) -> Self {
        Self {
            config,
            streak: Vec::new(),
            joined_round: false,
            riding: false,
            cashing: false,
        }
    }

    pub fn loss_streak(&self) -> usize {
        self.streak.len()
    }

    pub fn next_stake(&self) -> f64 {
        if self.streak.is_empty() {
            self.config.base_stake
        } else {
            next_stake(&self.streak, self.config.base_stake, self.config.cap)
        }
    }

    pub fn on_event(&mut self, event: &EngineEvent) -> Option<AutoAction> {
        match event {
            EngineEvent::PhaseChanged {
                phase: RoundPhase::Waiting,
                ..
            } if !self.joined_round && !self.riding => {
                self.joined_round = true;
                Some(AutoAction::PlaceBet {
                    amount: self.next_stake(),
                    auto_cashout: self.config.target,
                })
            }
            EngineEvent::PhaseChanged {
                phase: RoundPhase::Inactive,
                ..
            } => {
                self.joined_round = false;
                self.cashing = false;
                None
            }
            EngineEvent::BetConfirmed(_) => {
                self.riding = true;
                None
            }
            EngineEvent::MultiplierUpdated { multiplier, .. }
                if self.riding && !self.cashing && *multiplier >= self.config.target =>
            {
                self.cashing = true;
                Some(AutoAction::Cashout)
            }
            EngineEvent::CashoutAccepted(record) => {
                debug!(win = record.win_amount, streak = self.streak.len(), "Streak reset");
                self.streak.clear();
                self.riding = false;
                None
            }
            EngineEvent::CashoutRejected { message, class } => {
                // Timing refusals were already retried; no further attempts this round
                debug!(%message, %class, "Auto cash-out refused, holding until next round");
                None
            }
            EngineEvent::RoundCrashed {
                lost_bet: Some(bet),
                ..
            }
            | EngineEvent::BetLost(bet) => {
                self.streak.push(bet.amount);
                self.riding = false;
                None
            }
            // Crash settled elsewhere (server-side auto cash-out) or nothing was riding
            EngineEvent::RoundCrashed { lost_bet: None, .. } | EngineEvent::BetVoided { .. } => {
                self.riding = false;
                None
            }
            _ => None,
        }
    }
}

/// Drive an engine until its event channel closes
pub async fn run_autoplay(handle: EngineHandle, config: AutoBetConfig) {
    let mut events = handle.subscribe();
    let mut bettor = AutoBettor::new(config);
    info!(
        base = config.base_stake,
        target = config.target,
        cap = config.cap,
        "Auto-bettor started"
    );

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Auto-bettor lagged behind engine events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let Some(action) = bettor.on_event(&event) else {
            continue;
        };
        let handle = handle.clone();
        match action {
            AutoAction::PlaceBet {
                amount,
                auto_cashout,
            } => {
                info!(amount, streak = bettor.loss_streak(), "Auto bet");
                tokio::spawn(async move {
                    if let Err(e) = handle.place_bet(amount, auto_cashout).await {
                        warn!(error = %e, "Auto bet failed");
                    }
                });
            }
            AutoAction::Cashout => {
                tokio::spawn(async move {
                    if let Err(e) = handle.cashout().await {
                        warn!(error = %e, "Auto cash-out failed");
                    }
                });
            }
        }
    }
    info!("Auto-bettor stopped");
}
