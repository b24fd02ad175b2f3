//! Round state machine
//!
//! [`LocalGameState`] is the engine's derived view of the current round. It is
//! a plain value: every change goes through [`reduce`], which takes the current
//! state and one [`StateInput`] and returns the next state together with the
//! [`StateEffect`]s that describe what happened.
//!
//! Guarantees enforced here:
//! - phases only move along `Inactive -> Waiting -> Active -> Crashed -> Inactive`;
//!   a snapshot that lands further ahead is reached by walking the cycle edge by edge
//! - within one `Active` period the multiplier never decreases
//! - snapshots are last-write-wins by their own timestamp
//! - at most one cash-out record per round

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

use crate::connection::ConnectionMode;
use crate::error::EngineError;
use crate::models::{Bet, BetStatus, CashoutRecord, GameSnapshot, RoundPhase};
use crate::settings::{EXTRAPOLATION_TICK, GROWTH_RATE};
use crate::timers::{TimerFired, TimerKind, TimerSet};

/// exp(GROWTH_RATE * elapsed_seconds)
#[inline]
pub fn growth_multiplier(elapsed: Duration) -> f64 {
    (GROWTH_RATE * elapsed.as_secs_f64()).exp()
}

/// Inverse of [`growth_multiplier`], used to back-date a round's start
#[inline]
pub fn elapsed_for(multiplier: f64) -> Duration {
    if !multiplier.is_finite() || multiplier <= 1.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(multiplier.ln() / GROWTH_RATE)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalGameState {
    pub phase: RoundPhase,
    pub multiplier: f64,
    pub countdown: u32,
    pub crash_point: Option<f64>,
    pub connection_mode: ConnectionMode,
    /// Local round counter, incremented on every entry into `Waiting`
    pub round: u64,
    /// Timestamp of the last applied snapshot
    pub last_timestamp: Option<i64>,
    pub active_bet: Option<Bet>,
    /// Set once per round, cleared on entry into `Inactive`/`Waiting`
    pub cashout: Option<CashoutRecord>,
    pub cashout_pending: bool,
}

impl Default for LocalGameState {
    fn default() -> Self {
        Self::new(ConnectionMode::Online)
    }
}

impl LocalGameState {
    pub fn new(connection_mode: ConnectionMode) -> Self {
        Self {
            phase: RoundPhase::Inactive,
            multiplier: 1.0,
            countdown: 0,
            crash_point: None,
            connection_mode,
            round: 0,
            last_timestamp: None,
            active_bet: None,
            cashout: None,
            cashout_pending: false,
        }
    }

    /// Round a bet placed now would join
    pub fn bet_round(&self) -> u64 {
        if self.phase == RoundPhase::Waiting {
            self.round
        } else {
            self.round + 1
        }
    }

    /// A bet that is pending or still riding
    pub fn has_open_bet(&self) -> bool {
        self.active_bet.is_some()
    }

    /// Client-side cash-out preconditions
    pub fn check_cashout(&self, username: &str) -> Result<&Bet, EngineError> {
        if self.cashout.as_ref().is_some_and(|c| c.username == username) {
            return Err(EngineError::validation("Already cashed out this round"));
        }
        let bet = match &self.active_bet {
            Some(bet) if bet.username == username => bet,
            _ => return Err(EngineError::validation("No active bet to cash out")),
        };
        if bet.status != BetStatus::Confirmed || bet.round != self.round {
            return Err(EngineError::validation("No active bet in this round"));
        }
        if self.phase != RoundPhase::Active {
            return Err(EngineError::validation("Round is not active"));
        }
        if self.cashout.is_some() {
            return Err(EngineError::validation("Already cashed out this round"));
        }
        if self.cashout_pending {
            return Err(EngineError::validation("Cash-out already in progress"));
        }
        Ok(bet)
    }
}

/// Inputs accepted by the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum StateInput {
    Snapshot(GameSnapshot),
    BetPending(Bet),
    BetConfirmed { id: String },
    BetFailed { id: String },
    CashoutPending,
    CashoutAccepted {
        multiplier: f64,
        win_amount: Option<f64>,
        timestamp: i64,
    },
    CashoutFailed,
    /// Mode switch: the running round is abandoned and ordering resets
    ModeChanged(ConnectionMode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DropReason {
    Stale,
    MultiplierRegressed,
    IllFormed,
    NoMatchingBet,
    BetAlreadyOpen,
    CashoutNotAllowed,
    DuplicateCashout,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StateEffect {
    PhaseEntered { phase: RoundPhase, round: u64 },
    CountdownChanged(u32),
    MultiplierRaised(f64),
    RoundCrashed {
        round: u64,
        crash_point: f64,
        lost_bet: Option<Bet>,
    },
    RoundAbandoned { round: u64, voided_bet: Option<Bet> },
    BetRecorded(Bet),
    BetConfirmed(Bet),
    BetDropped(Bet),
    /// A bet whose round ended without a cash-out, outside the crash edge
    BetLost(Bet),
    CashoutRecorded(CashoutRecord),
    Dropped(DropReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    pub state: LocalGameState,
    pub effects: Vec<StateEffect>,
}

impl Reduction {
    fn unchanged(state: &LocalGameState, reason: DropReason) -> Self {
        Self {
            state: state.clone(),
            effects: vec![StateEffect::Dropped(reason)],
        }
    }

    pub fn dropped(&self) -> Option<DropReason> {
        self.effects.iter().find_map(|e| match e {
            StateEffect::Dropped(reason) => Some(*reason),
            _ => None,
        })
    }

    pub fn entered(&self, phase: RoundPhase) -> bool {
        self.effects
            .iter()
            .any(|e| matches!(e, StateEffect::PhaseEntered { phase: p, .. } if *p == phase))
    }
}

/// Apply one input to a state
pub fn reduce(state: &LocalGameState, input: StateInput) -> Reduction {
    match input {
        StateInput::Snapshot(snapshot) => apply_snapshot(state, &snapshot),
        StateInput::BetPending(bet) => {
            if state.active_bet.is_some() {
                return Reduction::unchanged(state, DropReason::BetAlreadyOpen);
            }
            let mut next = state.clone();
            next.active_bet = Some(bet.clone());
            Reduction {
                state: next,
                effects: vec![StateEffect::BetRecorded(bet)],
            }
        }
        StateInput::BetConfirmed { id } => confirm_bet(state, &id),
        StateInput::BetFailed { id } => match &state.active_bet {
            Some(bet) if bet.id == id => {
                let mut next = state.clone();
                let mut dropped = bet.clone();
                dropped.status = BetStatus::Rejected;
                next.active_bet = None;
                Reduction {
                    state: next,
                    effects: vec![StateEffect::BetDropped(dropped)],
                }
            }
            _ => Reduction::unchanged(state, DropReason::NoMatchingBet),
        },
        StateInput::CashoutPending => {
            let username = state.active_bet.as_ref().map(|b| b.username.clone());
            match username {
                Some(name) if state.check_cashout(&name).is_ok() => {
                    let mut next = state.clone();
                    next.cashout_pending = true;
                    Reduction {
                        state: next,
                        effects: Vec::new(),
                    }
                }
                _ => Reduction::unchanged(state, DropReason::CashoutNotAllowed),
            }
        }
        StateInput::CashoutAccepted {
            multiplier,
            win_amount,
            timestamp,
        } => accept_cashout(state, multiplier, win_amount, timestamp),
        StateInput::CashoutFailed => {
            let mut next = state.clone();
            next.cashout_pending = false;
            let mut effects = Vec::new();
            let round_over = match &next.active_bet {
                Some(bet) => {
                    bet.status == BetStatus::Confirmed
                        && bet.round <= next.round
                        && !(next.phase == RoundPhase::Active && bet.round == next.round)
                }
                None => false,
            };
            if round_over {
                if let Some(bet) = next.active_bet.take() {
                    effects.push(StateEffect::BetLost(bet));
                }
            }
            Reduction { state: next, effects }
        }
        StateInput::ModeChanged(mode) => change_mode(state, mode),
    }
}

fn apply_snapshot(state: &LocalGameState, snapshot: &GameSnapshot) -> Reduction {
    if !snapshot.is_well_formed() {
        return Reduction::unchanged(state, DropReason::IllFormed);
    }
    if let Some(last) = state.last_timestamp {
        // Equal timestamps still apply; a repeat of the same payload is a no-op
        if snapshot.timestamp < last {
            return Reduction::unchanged(state, DropReason::Stale);
        }
    }

    let mut next = state.clone();
    let mut effects = Vec::new();

    if snapshot.state == next.phase {
        match next.phase {
            RoundPhase::Active => {
                if snapshot.multiplier < next.multiplier {
                    return Reduction::unchanged(state, DropReason::MultiplierRegressed);
                }
                if snapshot.multiplier > next.multiplier {
                    next.multiplier = snapshot.multiplier;
                    effects.push(StateEffect::MultiplierRaised(snapshot.multiplier));
                }
            }
            RoundPhase::Waiting => {
                if snapshot.countdown != next.countdown {
                    next.countdown = snapshot.countdown;
                    effects.push(StateEffect::CountdownChanged(snapshot.countdown));
                }
            }
            RoundPhase::Crashed => {
                if let Some(cp) = snapshot.crash_point {
                    next.crash_point = Some(cp);
                }
            }
            RoundPhase::Inactive => {}
        }
    } else {
        while next.phase != snapshot.state {
            let phase = next.phase.next();
            enter_phase(&mut next, phase, Some(snapshot), &mut effects);
        }
    }

    next.last_timestamp = Some(snapshot.timestamp);
    Reduction { state: next, effects }
}

/// Move `state` one edge forward into `phase`
fn enter_phase(
    state: &mut LocalGameState,
    phase: RoundPhase,
    target: Option<&GameSnapshot>,
    effects: &mut Vec<StateEffect>,
) {
    let is_target = target.map(|s| s.state == phase).unwrap_or(false);
    state.phase = phase;

    match phase {
        RoundPhase::Waiting => {
            state.round += 1;
            state.multiplier = 1.0;
            state.crash_point = None;
            state.cashout = None;
            state.countdown = match target {
                Some(s) if is_target => s.countdown,
                _ => 0,
            };
            effects.push(StateEffect::PhaseEntered {
                phase,
                round: state.round,
            });
        }
        RoundPhase::Active => {
            state.countdown = 0;
            state.multiplier = match target {
                Some(s) if is_target => s.multiplier.max(1.0),
                _ => 1.0,
            };
            effects.push(StateEffect::PhaseEntered {
                phase,
                round: state.round,
            });
        }
        RoundPhase::Crashed => {
            let crash_point = match target {
                Some(s) if is_target => s.crash_point.unwrap_or(s.multiplier.max(state.multiplier)),
                _ => state.multiplier,
            };
            state.crash_point = Some(crash_point);
            state.multiplier = crash_point;
            effects.push(StateEffect::PhaseEntered {
                phase,
                round: state.round,
            });

            let loses = match &state.active_bet {
                Some(bet) => {
                    bet.status == BetStatus::Confirmed
                        && bet.round == state.round
                        && state.cashout.is_none()
                        && !state.cashout_pending
                }
                None => false,
            };
            let lost_bet = if loses { state.active_bet.take() } else { None };
            effects.push(StateEffect::RoundCrashed {
                round: state.round,
                crash_point,
                lost_bet,
            });
        }
        RoundPhase::Inactive => {
            state.multiplier = 1.0;
            state.countdown = 0;
            state.crash_point = None;
            state.cashout = None;
            effects.push(StateEffect::PhaseEntered {
                phase,
                round: state.round,
            });

            let stale_bet = match &state.active_bet {
                Some(bet) => {
                    bet.status == BetStatus::Confirmed && bet.round <= state.round && !state.cashout_pending
                }
                None => false,
            };
            if stale_bet {
                if let Some(bet) = state.active_bet.take() {
                    effects.push(StateEffect::BetLost(bet));
                }
            }
        }
    }
}

fn confirm_bet(state: &LocalGameState, id: &str) -> Reduction {
    let bet = match &state.active_bet {
        Some(bet) if bet.id == id && bet.status == BetStatus::Pending => bet,
        _ => return Reduction::unchanged(state, DropReason::NoMatchingBet),
    };

    let mut next = state.clone();
    let mut confirmed = bet.clone();
    confirmed.status = BetStatus::Confirmed;

    // Confirmation that lands after its round already ended
    let round_over = confirmed.round < next.round
        || (confirmed.round == next.round
            && matches!(next.phase, RoundPhase::Crashed | RoundPhase::Inactive));

    let mut effects = vec![StateEffect::BetConfirmed(confirmed.clone())];
    if round_over {
        next.active_bet = None;
        effects.push(StateEffect::BetLost(confirmed));
    } else {
        next.active_bet = Some(confirmed);
    }
    Reduction {
        state: next,
        effects,
    }
}

fn accept_cashout(
    state: &LocalGameState,
    multiplier: f64,
    win_amount: Option<f64>,
    timestamp: i64,
) -> Reduction {
    let bet = match &state.active_bet {
        Some(bet) if state.cashout_pending && bet.status == BetStatus::Confirmed => bet,
        _ => return Reduction::unchanged(state, DropReason::NoMatchingBet),
    };
    let same_round = bet.round == state.round;
    if same_round && state.cashout.is_some() {
        return Reduction::unchanged(state, DropReason::DuplicateCashout);
    }

    let record = CashoutRecord {
        username: bet.username.clone(),
        multiplier,
        win_amount: win_amount.unwrap_or(bet.amount * multiplier),
        timestamp,
    };

    let mut next = state.clone();
    next.active_bet = None;
    next.cashout_pending = false;
    if same_round {
        next.cashout = Some(record.clone());
    }
    Reduction {
        state: next,
        effects: vec![StateEffect::CashoutRecorded(record)],
    }
}

fn change_mode(state: &LocalGameState, mode: ConnectionMode) -> Reduction {
    let mut next = state.clone();
    let mut effects = Vec::new();
    next.connection_mode = mode;

    // Online <-> Reconnecting keeps the same snapshot source
    if state.connection_mode.is_demo() == mode.is_demo() {
        return Reduction {
            state: next,
            effects,
        };
    }
    next.last_timestamp = None;

    let mid_round = next.phase != RoundPhase::Inactive || next.active_bet.is_some();
    if mid_round {
        let round = next.round;
        let voided_bet = next.active_bet.take();
        next.cashout_pending = false;
        while next.phase != RoundPhase::Inactive {
            let phase = next.phase.next();
            next.phase = phase;
            if phase == RoundPhase::Crashed {
                next.crash_point = Some(next.multiplier);
            }
            effects.push(StateEffect::PhaseEntered { phase, round });
        }
        next.multiplier = 1.0;
        next.countdown = 0;
        next.crash_point = None;
        next.cashout = None;
        effects.push(StateEffect::RoundAbandoned { round, voided_bet });
    }

    Reduction {
        state: next,
        effects,
    }
}

// ============================================================================
// Local extrapolation
// ============================================================================

/// Display multiplier between authoritative snapshots
///
/// While a round is `Active` the display value follows the growth formula
/// from the round's back-dated start time every [`EXTRAPOLATION_TICK`]. Every
/// authoritative update re-anchors the curve and overwrites the display value.
pub struct Extrapolator {
    timers: TimerSet,
    started: Option<Instant>,
    display: f64,
}

impl Extrapolator {
    pub fn new(timers: TimerSet) -> Self {
        Self {
            timers,
            started: None,
            display: 1.0,
        }
    }

    pub fn display(&self) -> f64 {
        self.display
    }

    pub fn is_running(&self) -> bool {
        self.timers.is_active(TimerKind::Extrapolate)
    }

    /// Follow the state after a reduction
    pub fn sync(&mut self, state: &LocalGameState) {
        self.display = state.multiplier;
        let extrapolate =
            state.phase == RoundPhase::Active && state.connection_mode != ConnectionMode::Demo;
        if !extrapolate {
            self.stop();
            return;
        }
        let now = Instant::now();
        self.started = Some(now.checked_sub(elapsed_for(state.multiplier)).unwrap_or(now));
        if !self.is_running() {
            self.timers.every(TimerKind::Extrapolate, EXTRAPOLATION_TICK);
        }
    }

    /// Returns the new display multiplier when it moved
    pub fn on_timer(&mut self, fired: &TimerFired) -> Option<f64> {
        if !self.timers.accept(fired) {
            return None;
        }
        let started = self.started?;
        let predicted = growth_multiplier(started.elapsed());
        if predicted > self.display {
            self.display = predicted;
            Some(predicted)
        } else {
            None
        }
    }

    pub fn stop(&mut self) {
        self.timers.cancel_all();
        self.started = None;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(state: RoundPhase, multiplier: f64, countdown: u32, timestamp: i64) -> GameSnapshot {
        GameSnapshot {
            state,
            multiplier,
            countdown,
            crash_point: None,
            players: Vec::new(),
            timestamp,
        }
    }

    fn crashed(crash_point: f64, timestamp: i64) -> GameSnapshot {
        GameSnapshot {
            crash_point: Some(crash_point),
            ..snap(RoundPhase::Crashed, crash_point, 0, timestamp)
        }
    }

    fn apply(state: &LocalGameState, s: GameSnapshot) -> Reduction {
        reduce(state, StateInput::Snapshot(s))
    }

    /// State in Active with a confirmed 50-coin bet for the current round
    fn active_with_bet(multiplier: f64) -> LocalGameState {
        let state = LocalGameState::default();
        let state = apply(&state, snap(RoundPhase::Waiting, 1.0, 5, 1_000)).state;
        let bet = Bet::pending("ann", 50.0, 2.0, state.bet_round());
        let id = bet.id.clone();
        let state = reduce(&state, StateInput::BetPending(bet)).state;
        let state = reduce(&state, StateInput::BetConfirmed { id }).state;
        apply(&state, snap(RoundPhase::Active, multiplier, 0, 2_000)).state
    }

    // =========================================================================
    // Test Suite: Snapshot ordering
    // =========================================================================

    #[test]
    fn test_same_snapshot_twice_is_noop() {
        let state = LocalGameState::default();
        let s = snap(RoundPhase::Waiting, 1.0, 4, 1_000);
        let first = apply(&state, s.clone());
        assert!(first.entered(RoundPhase::Waiting));

        let second = apply(&first.state, s);
        assert_eq!(second.state, first.state);
        assert!(second.effects.is_empty(), "{:?}", second.effects);
    }

    #[test]
    fn test_phase_change_within_same_timestamp_applied() {
        let state = apply(&LocalGameState::default(), snap(RoundPhase::Waiting, 1.0, 1, 7_000)).state;
        let r = apply(&state, snap(RoundPhase::Active, 1.0, 0, 7_000));
        assert_eq!(r.dropped(), None);
        assert!(r.entered(RoundPhase::Active));
        assert_eq!(r.state.phase, RoundPhase::Active);
    }

    #[test]
    fn test_older_snapshot_dropped() {
        let state = apply(&LocalGameState::default(), snap(RoundPhase::Active, 1.5, 0, 5_000)).state;
        let late = apply(&state, snap(RoundPhase::Waiting, 1.0, 3, 4_000));
        assert_eq!(late.dropped(), Some(DropReason::Stale));
        assert_eq!(late.state.phase, RoundPhase::Active);
    }

    #[test]
    fn test_multiplier_regression_dropped() {
        let state = apply(&LocalGameState::default(), snap(RoundPhase::Active, 1.8, 0, 5_000)).state;
        let r = apply(&state, snap(RoundPhase::Active, 1.6, 0, 6_000));
        assert_eq!(r.dropped(), Some(DropReason::MultiplierRegressed));
        assert_eq!(r.state.multiplier, 1.8);
        assert_eq!(r.state.last_timestamp, Some(5_000));
    }

    #[test]
    fn test_multiplier_monotonic_within_active() {
        let mut state = apply(&LocalGameState::default(), snap(RoundPhase::Active, 1.0, 0, 1)).state;
        let inputs = [1.1, 1.05, 1.3, 1.3, 1.2, 1.9, 2.4, 2.0];
        let mut seen = vec![state.multiplier];
        for (i, m) in inputs.iter().enumerate() {
            state = apply(&state, snap(RoundPhase::Active, *m, 0, 10 + i as i64)).state;
            seen.push(state.multiplier);
        }
        assert!(seen.windows(2).all(|w| w[1] >= w[0]), "{:?}", seen);
        assert_eq!(state.multiplier, 2.4);
    }

    #[test]
    fn test_ill_formed_snapshot_dropped() {
        let r = apply(&LocalGameState::default(), snap(RoundPhase::Active, 0.2, 0, 10));
        assert_eq!(r.dropped(), Some(DropReason::IllFormed));
    }

    #[test]
    fn test_safe_default_never_outranks_applied_data() {
        let state = apply(&LocalGameState::default(), snap(RoundPhase::Active, 1.5, 0, 5_000)).state;
        let r = apply(&state, GameSnapshot::safe_default());
        assert_eq!(r.dropped(), Some(DropReason::Stale));
        assert_eq!(r.state.phase, RoundPhase::Active);
    }

    // =========================================================================
    // Test Suite: Phase transitions
    // =========================================================================

    #[test]
    fn test_full_cycle_in_order() {
        let mut state = LocalGameState::default();
        let steps = [
            snap(RoundPhase::Waiting, 1.0, 5, 1),
            snap(RoundPhase::Active, 1.0, 0, 2),
            crashed(2.5, 3),
            snap(RoundPhase::Inactive, 1.0, 0, 4),
        ];
        let mut phases = Vec::new();
        for s in steps {
            let r = apply(&state, s);
            for e in &r.effects {
                if let StateEffect::PhaseEntered { phase, .. } = e {
                    phases.push(*phase);
                }
            }
            state = r.state;
        }
        assert_eq!(
            phases,
            vec![RoundPhase::Waiting, RoundPhase::Active, RoundPhase::Crashed, RoundPhase::Inactive]
        );
        assert_eq!(state.round, 1);
    }

    #[test]
    fn test_skipped_phase_is_walked() {
        // Waiting -> (missed Active) -> Crashed
        let state = apply(&LocalGameState::default(), snap(RoundPhase::Waiting, 1.0, 2, 1)).state;
        let r = apply(&state, crashed(1.3, 2));
        let phases: Vec<RoundPhase> = r
            .effects
            .iter()
            .filter_map(|e| match e {
                StateEffect::PhaseEntered { phase, .. } => Some(*phase),
                _ => None,
            })
            .collect();
        assert_eq!(phases, vec![RoundPhase::Active, RoundPhase::Crashed]);
        assert_eq!(r.state.crash_point, Some(1.3));
    }

    #[test]
    fn test_crashed_to_waiting_walks_through_inactive() {
        let state = apply(&LocalGameState::default(), crashed(2.0, 1)).state;
        let r = apply(&state, snap(RoundPhase::Waiting, 1.0, 5, 2));
        assert!(r.entered(RoundPhase::Inactive));
        assert!(r.entered(RoundPhase::Waiting));
        assert_eq!(r.state.countdown, 5);
    }

    #[test]
    fn test_countdown_updates() {
        let state = apply(&LocalGameState::default(), snap(RoundPhase::Waiting, 1.0, 5, 1)).state;
        let r = apply(&state, snap(RoundPhase::Waiting, 1.0, 3, 2));
        assert_eq!(r.effects, vec![StateEffect::CountdownChanged(3)]);
        assert_eq!(r.state.countdown, 3);
    }

    #[test]
    fn test_crash_point_from_multiplier_when_missing() {
        let state = apply(&LocalGameState::default(), snap(RoundPhase::Active, 1.7, 0, 1)).state;
        let r = apply(&state, snap(RoundPhase::Crashed, 1.9, 0, 2));
        assert_eq!(r.state.crash_point, Some(1.9));
    }

    // =========================================================================
    // Test Suite: Bets and cash-outs
    // =========================================================================

    #[test]
    fn test_bet_lost_on_crash() {
        let state = active_with_bet(1.4);
        let r = apply(&state, crashed(1.5, 3_000));
        let lost = r.effects.iter().find_map(|e| match e {
            StateEffect::RoundCrashed { lost_bet, .. } => lost_bet.clone(),
            _ => None,
        });
        assert_eq!(lost.map(|b| b.amount), Some(50.0));
        assert!(r.state.active_bet.is_none());
    }

    #[test]
    fn test_cashout_at_multiplier() {
        let state = active_with_bet(2.3);
        let state = reduce(&state, StateInput::CashoutPending).state;
        assert!(state.cashout_pending);

        let r = reduce(
            &state,
            StateInput::CashoutAccepted {
                multiplier: 2.3,
                win_amount: None,
                timestamp: 2_500,
            },
        );
        let record = r.state.cashout.clone().unwrap();
        assert!((record.win_amount - 115.0).abs() < 1e-9);
        assert!(r.state.active_bet.is_none());
        assert!(!r.state.cashout_pending);

        // Crash afterwards loses nothing
        let after = apply(&r.state, crashed(2.5, 3_000));
        assert!(after.effects.iter().any(|e| matches!(
            e,
            StateEffect::RoundCrashed { lost_bet: None, .. }
        )));
        assert!(after.state.cashout.is_some(), "record survives until Inactive");
    }

    #[test]
    fn test_second_cashout_rejected() {
        let state = active_with_bet(1.5);
        let state = reduce(&state, StateInput::CashoutPending).state;
        let state = reduce(
            &state,
            StateInput::CashoutAccepted {
                multiplier: 1.5,
                win_amount: Some(75.0),
                timestamp: 2_100,
            },
        )
        .state;

        assert!(state.check_cashout("ann").is_err());
        let r = reduce(&state, StateInput::CashoutPending);
        assert_eq!(r.dropped(), Some(DropReason::CashoutNotAllowed));
        let r = reduce(
            &state,
            StateInput::CashoutAccepted {
                multiplier: 1.6,
                win_amount: None,
                timestamp: 2_200,
            },
        );
        assert_eq!(r.dropped(), Some(DropReason::NoMatchingBet));
    }

    #[test]
    fn test_cashout_cleared_on_new_round() {
        let state = active_with_bet(1.5);
        let state = reduce(&state, StateInput::CashoutPending).state;
        let state = reduce(
            &state,
            StateInput::CashoutAccepted {
                multiplier: 1.5,
                win_amount: None,
                timestamp: 2_100,
            },
        )
        .state;
        let state = apply(&state, crashed(3.0, 3_000)).state;
        let state = apply(&state, snap(RoundPhase::Inactive, 1.0, 0, 4_000)).state;
        assert!(state.cashout.is_none());
    }

    #[test]
    fn test_cashout_requires_active_phase() {
        let state = apply(&LocalGameState::default(), snap(RoundPhase::Waiting, 1.0, 5, 1)).state;
        let bet = Bet::pending("ann", 10.0, 2.0, state.bet_round());
        let id = bet.id.clone();
        let state = reduce(&state, StateInput::BetPending(bet)).state;
        let state = reduce(&state, StateInput::BetConfirmed { id }).state;
        assert_eq!(
            state.check_cashout("ann"),
            Err(EngineError::validation("Round is not active"))
        );
    }

    #[test]
    fn test_cashout_without_bet_rejected() {
        let state = apply(&LocalGameState::default(), snap(RoundPhase::Active, 1.2, 0, 1)).state;
        assert!(matches!(state.check_cashout("ann"), Err(EngineError::Validation(_))));
    }

    #[test]
    fn test_pending_cashout_defers_crash_loss() {
        let state = active_with_bet(1.9);
        let state = reduce(&state, StateInput::CashoutPending).state;
        let r = apply(&state, crashed(2.0, 3_000));
        assert!(r.state.active_bet.is_some(), "cash-out result decides");

        let lost = reduce(&r.state, StateInput::CashoutFailed);
        assert!(matches!(lost.effects.as_slice(), [StateEffect::BetLost(_)]));
        assert!(lost.state.active_bet.is_none());
    }

    #[test]
    fn test_cashout_accepted_after_crash_snapshot() {
        let state = active_with_bet(1.9);
        let state = reduce(&state, StateInput::CashoutPending).state;
        let state = apply(&state, crashed(2.0, 3_000)).state;
        let r = reduce(
            &state,
            StateInput::CashoutAccepted {
                multiplier: 1.9,
                win_amount: Some(95.0),
                timestamp: 2_900,
            },
        );
        assert!(matches!(r.effects.as_slice(), [StateEffect::CashoutRecorded(_)]));
        assert_eq!(r.state.cashout.as_ref().map(|c| c.win_amount), Some(95.0));
    }

    #[test]
    fn test_second_bet_while_open_rejected() {
        let state = active_with_bet(1.1);
        let r = reduce(&state, StateInput::BetPending(Bet::pending("ann", 5.0, 2.0, 2)));
        assert_eq!(r.dropped(), Some(DropReason::BetAlreadyOpen));
    }

    #[test]
    fn test_bet_placed_between_rounds_joins_next_round() {
        let state = apply(&LocalGameState::default(), crashed(1.4, 1)).state;
        assert_eq!(state.bet_round(), state.round + 1);
        let bet = Bet::pending("ann", 10.0, 2.0, state.bet_round());
        let id = bet.id.clone();
        let state = reduce(&state, StateInput::BetPending(bet)).state;
        let state = reduce(&state, StateInput::BetConfirmed { id }).state;
        let state = apply(&state, snap(RoundPhase::Waiting, 1.0, 5, 2)).state;
        let state = apply(&state, snap(RoundPhase::Active, 1.2, 0, 3)).state;
        assert!(state.check_cashout("ann").is_ok());
    }

    #[test]
    fn test_late_confirmation_is_lost() {
        let state = apply(&LocalGameState::default(), snap(RoundPhase::Waiting, 1.0, 1, 1)).state;
        let bet = Bet::pending("ann", 10.0, 2.0, state.bet_round());
        let id = bet.id.clone();
        let state = reduce(&state, StateInput::BetPending(bet)).state;
        let state = apply(&state, crashed(1.1, 2)).state;
        let r = reduce(&state, StateInput::BetConfirmed { id });
        assert!(matches!(r.effects.last(), Some(StateEffect::BetLost(_))));
        assert!(r.state.active_bet.is_none());
    }

    #[test]
    fn test_failed_bet_removed() {
        let bet = Bet::pending("ann", 10.0, 2.0, 1);
        let id = bet.id.clone();
        let state = reduce(&LocalGameState::default(), StateInput::BetPending(bet)).state;
        let r = reduce(&state, StateInput::BetFailed { id });
        assert!(r.state.active_bet.is_none());
        assert!(matches!(r.effects.as_slice(), [StateEffect::BetDropped(b)] if b.status == BetStatus::Rejected));
    }

    // =========================================================================
    // Test Suite: Mode changes
    // =========================================================================

    #[test]
    fn test_mode_change_abandons_round_along_cycle() {
        let state = active_with_bet(1.6);
        let r = reduce(&state, StateInput::ModeChanged(ConnectionMode::Demo));
        let phases: Vec<RoundPhase> = r
            .effects
            .iter()
            .filter_map(|e| match e {
                StateEffect::PhaseEntered { phase, .. } => Some(*phase),
                _ => None,
            })
            .collect();
        assert_eq!(phases, vec![RoundPhase::Crashed, RoundPhase::Inactive]);
        assert!(matches!(
            r.effects.last(),
            Some(StateEffect::RoundAbandoned { voided_bet: Some(_), .. })
        ));
        assert_eq!(r.state.phase, RoundPhase::Inactive);
        assert_eq!(r.state.connection_mode, ConnectionMode::Demo);
        assert!(r.state.last_timestamp.is_none());
    }

    #[test]
    fn test_reconnecting_keeps_round() {
        let state = active_with_bet(1.6);
        let r = reduce(&state, StateInput::ModeChanged(ConnectionMode::Reconnecting));
        assert!(r.effects.is_empty());
        assert_eq!(r.state.phase, RoundPhase::Active);
        assert_eq!(r.state.last_timestamp, state.last_timestamp);
        assert!(r.state.active_bet.is_some());
    }

    #[test]
    fn test_mode_change_when_idle_only_resets_ordering() {
        let state = apply(&LocalGameState::default(), snap(RoundPhase::Inactive, 1.0, 0, 9_000)).state;
        let r = reduce(&state, StateInput::ModeChanged(ConnectionMode::Demo));
        assert!(r.effects.is_empty());
        assert!(r.state.last_timestamp.is_none());
        // Demo clock may start below the server clock
        let r = apply(&r.state, snap(RoundPhase::Waiting, 1.0, 5, 10));
        assert!(r.entered(RoundPhase::Waiting));
    }

    // =========================================================================
    // Test Suite: Growth formula
    // =========================================================================

    #[test]
    fn test_growth_formula() {
        assert_eq!(growth_multiplier(Duration::ZERO), 1.0);
        let ten = growth_multiplier(Duration::from_secs(10));
        assert!((ten - (0.5f64).exp()).abs() < 1e-12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extrapolator_follows_curve_and_yields_to_snapshots() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut extrapolator = Extrapolator::new(TimerSet::new(tx));

        let state = apply(&LocalGameState::default(), snap(RoundPhase::Active, 1.5, 0, 1)).state;
        extrapolator.sync(&state);
        assert!(extrapolator.is_running());

        let mut last = extrapolator.display();
        for _ in 0..5 {
            let fired = rx.recv().await.unwrap();
            if let Some(m) = extrapolator.on_timer(&fired) {
                assert!(m > last);
                last = m;
            }
        }
        assert!(last > 1.5);

        // Authoritative value wins even when below the prediction
        let state = apply(&state, snap(RoundPhase::Active, 1.51, 0, 2)).state;
        extrapolator.sync(&state);
        assert_eq!(extrapolator.display(), 1.51);

        let state = apply(&state, crashed(1.6, 3)).state;
        extrapolator.sync(&state);
        assert!(!extrapolator.is_running());
        assert_eq!(extrapolator.display(), 1.6);
    }

    #[test]
    fn test_elapsed_for_inverts_growth() {
        let elapsed = elapsed_for(2.0);
        assert!((growth_multiplier(elapsed) - 2.0).abs() < 1e-9);
        assert_eq!(elapsed_for(0.9), Duration::ZERO);
    }
}
