//! Sync engine event loop
//!
//! One task owns every piece of mutable state: the [`LocalGameState`], the
//! [`Reconciler`], the [`ConnectionSupervisor`] and the display
//! [`Extrapolator`]. Everything else reaches it through channels:
//!
//! - commands from [`EngineHandle`] (bounded mpsc)
//! - timer ticks from every [`TimerSet`] (unbounded mpsc)
//! - poll results from the Poller (unbounded mpsc)
//! - bet, cash-out and repair results from a [`JoinSet`]
//!
//! Handlers run one at a time inside a single `select!`, so the ordering rules
//! live in the state machine and no locking is needed. Observers get typed
//! [`EngineEvent`]s over a broadcast channel and the latest [`EngineView`]
//! over a watch channel.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

use crate::betting::{BetRequest, BettingClient};
use crate::connection::{
    ConnectionMode, ConnectionState, ConnectionSupervisor, SupervisorConfig, SupervisorEvent,
};
use crate::error::{ApiError, EngineError};
use crate::events::{EngineEvent, NotificationKind, EVENT_CHANNEL_CAPACITY};
use crate::game_api::GameApi;
use crate::identity::{validate_username, IdentityStore};
use crate::models::{
    now_ms, ActionResponse, Bet, BetStatus, CashoutRecord, CashoutResponse, HistoryEntry,
    RepairResponse, RoundPhase,
};
use crate::poller::PollResult;
use crate::reconcile::{Reconciled, Reconciler};
use crate::settings::{Config, ACTION_TIMEOUT};
use crate::state_machine::{reduce, DropReason, Extrapolator, LocalGameState, StateEffect, StateInput};
use crate::timers::{TimerFired, TimerKind, TimerSet};
use crate::wallet::Wallet;

const COMMAND_CHANNEL_CAPACITY: usize = 32;

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

#[derive(Debug)]
pub enum EngineCommand {
    PlaceBet {
        amount: f64,
        auto_cashout: f64,
        reply: Reply<Bet>,
    },
    Cashout {
        reply: Reply<CashoutRecord>,
    },
    SetUsername {
        username: String,
        reply: Reply<String>,
    },
    EnterDemo,
    GoOnline,
    Shutdown,
}

/// Everything a UI needs to render one frame
#[derive(Debug, Clone, Serialize)]
pub struct EngineView {
    pub state: LocalGameState,
    /// Extrapolated between snapshots, advisory only
    pub display_multiplier: f64,
    pub connection: ConnectionState,
    pub history: Vec<HistoryEntry>,
    pub online_players: u32,
    pub cashouts: Vec<CashoutRecord>,
    pub bet_in_flight: bool,
    pub cashout_in_flight: bool,
    pub username: Option<String>,
    pub balance: f64,
}

impl Default for EngineView {
    fn default() -> Self {
        Self {
            state: LocalGameState::default(),
            display_multiplier: 1.0,
            connection: ConnectionState::default(),
            history: Vec::new(),
            online_players: 0,
            cashouts: Vec::new(),
            bet_in_flight: false,
            cashout_in_flight: false,
            username: None,
            balance: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub supervisor: SupervisorConfig,
    /// Takes precedence over the identity store
    pub username: Option<String>,
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        Self {
            supervisor: SupervisorConfig {
                poll_interval: config.poll_interval,
                poll_timeout: config.poll_timeout,
                auto_probe: config.demo_auto_probe,
                demo_seed: config.demo_seed,
            },
            username: config.username.clone(),
        }
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Cloneable front door to a running engine
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    events: broadcast::Sender<EngineEvent>,
    view: watch::Receiver<EngineView>,
}

impl EngineHandle {
    /// Resolves once the bet is confirmed or finally rejected
    pub async fn place_bet(&self, amount: f64, auto_cashout: f64) -> Result<Bet, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::PlaceBet {
            amount,
            auto_cashout,
            reply,
        })
        .await?;
        rx.await.map_err(|_| EngineError::Stopped)?
    }

    pub async fn cashout(&self) -> Result<CashoutRecord, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Cashout { reply }).await?;
        rx.await.map_err(|_| EngineError::Stopped)?
    }

    /// Validated, persisted, and used for `sync` polls from then on
    pub async fn set_username(&self, username: &str) -> Result<String, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::SetUsername {
            username: username.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| EngineError::Stopped)?
    }

    pub async fn enter_demo(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::EnterDemo).await
    }

    pub async fn go_online(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::GoOnline).await
    }

    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::Shutdown).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn view(&self) -> watch::Receiver<EngineView> {
        self.view.clone()
    }

    /// Snapshot of the latest published view
    pub fn current(&self) -> EngineView {
        self.view.borrow().clone()
    }

    async fn send(&self, command: EngineCommand) -> Result<(), EngineError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| EngineError::Stopped)
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Results delivered back into the loop from spawned requests
enum ActionOutcome {
    Bet {
        bet: Bet,
        result: Result<ActionResponse, EngineError>,
        reply: Reply<Bet>,
    },
    Cashout {
        bet: Bet,
        result: Result<CashoutResponse, EngineError>,
        reply: Reply<CashoutRecord>,
    },
    Repair(Result<RepairResponse, ApiError>),
}

pub struct Engine<A: GameApi> {
    api: Arc<A>,
    wallet: Arc<dyn Wallet>,
    identity: Arc<dyn IdentityStore>,
    username: Option<String>,

    state: LocalGameState,
    reconciler: Reconciler,
    supervisor: ConnectionSupervisor<A>,
    extrapolator: Extrapolator,
    betting: BettingClient<A>,

    commands: mpsc::Receiver<EngineCommand>,
    timer_rx: mpsc::UnboundedReceiver<TimerFired>,
    poll_rx: mpsc::UnboundedReceiver<PollResult>,
    actions: JoinSet<ActionOutcome>,

    events: broadcast::Sender<EngineEvent>,
    view: watch::Sender<EngineView>,
}

impl<A: GameApi> Engine<A> {
    pub fn new(
        config: EngineConfig,
        api: Arc<A>,
        wallet: Arc<dyn Wallet>,
        identity: Arc<dyn IdentityStore>,
    ) -> (Self, EngineHandle) {
        let (command_tx, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (poll_tx, poll_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (view, view_rx) = watch::channel(EngineView::default());

        let username = match config.username {
            Some(name) => Some(name),
            None => match identity.load() {
                Ok(name) => name,
                Err(e) => {
                    warn!(error = %e, "Could not load saved username");
                    None
                }
            },
        };

        let mut supervisor = ConnectionSupervisor::new(
            Arc::clone(&api),
            timer_tx.clone(),
            poll_tx,
            config.supervisor,
        );
        supervisor.set_username(username.clone());

        let engine = Self {
            betting: BettingClient::new(Arc::clone(&api)),
            api,
            wallet,
            identity,
            username,
            state: LocalGameState::default(),
            reconciler: Reconciler::new(),
            supervisor,
            extrapolator: Extrapolator::new(TimerSet::new(timer_tx)),
            commands,
            timer_rx,
            poll_rx,
            actions: JoinSet::new(),
            events: events.clone(),
            view,
        };
        let handle = EngineHandle {
            commands: command_tx,
            events,
            view: view_rx,
        };
        (engine, handle)
    }

    /// Run until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        info!(username = ?self.username, "Engine starting");
        self.supervisor.start();
        self.publish_view();

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(EngineCommand::Shutdown) | None => break,
                    Some(command) => self.on_command(command),
                },
                Some(fired) = self.timer_rx.recv() => self.on_timer(fired),
                Some(result) = self.poll_rx.recv() => {
                    let events = self.supervisor.on_poll_result(result);
                    self.on_supervisor_events(events);
                }
                Some(joined) = self.actions.join_next(), if !self.actions.is_empty() => match joined {
                    Ok(outcome) => self.on_action(outcome),
                    Err(e) => warn!(error = %e, "Action task failed"),
                },
            }
        }

        self.teardown();
    }

    fn teardown(&mut self) {
        self.supervisor.shutdown();
        self.extrapolator.stop();
        self.actions.abort_all();
        info!("Engine stopped");
    }

    fn on_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::PlaceBet {
                amount,
                auto_cashout,
                reply,
            } => self.on_place_bet(amount, auto_cashout, reply),
            EngineCommand::Cashout { reply } => self.on_cashout(reply),
            EngineCommand::SetUsername { username, reply } => {
                let _ = reply.send(self.on_set_username(&username));
            }
            EngineCommand::EnterDemo => {
                info!("Demo mode requested");
                let events = self.supervisor.enter_demo();
                self.on_supervisor_events(events);
            }
            EngineCommand::GoOnline => {
                info!("Online mode requested");
                let events = self.supervisor.go_online();
                self.on_supervisor_events(events);
            }
            EngineCommand::Shutdown => {}
        }
    }

    fn on_timer(&mut self, fired: TimerFired) {
        if fired.kind == TimerKind::Extrapolate {
            if let Some(multiplier) = self.extrapolator.on_timer(&fired) {
                self.emit(EngineEvent::MultiplierUpdated {
                    multiplier,
                    authoritative: false,
                });
                self.publish_view();
            }
            return;
        }
        let events = self.supervisor.on_timer(&fired);
        self.on_supervisor_events(events);
    }

    // ------------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------------

    fn on_supervisor_events(&mut self, events: Vec<SupervisorEvent>) {
        if events.is_empty() {
            return;
        }
        for event in events {
            match event {
                SupervisorEvent::Status(status) => {
                    let update = self.reconciler.accept_status(status);
                    if update.new_history > 0 {
                        self.emit_history();
                    }
                    self.on_reconciled(update.snapshot);
                }
                SupervisorEvent::Corrupted { message, sample } => {
                    let reconciled = self.reconciler.corrupted(&message, sample);
                    self.on_reconciled(reconciled);
                }
                SupervisorEvent::Snapshot(snapshot) => {
                    let reconciled = self.reconciler.accept_snapshot(snapshot);
                    self.on_reconciled(reconciled);
                }
                SupervisorEvent::ModeChanged { from, to, state } => {
                    info!(%from, %to, failures = state.consecutive_failures, "Connection mode changed");
                    if from.is_demo() != to.is_demo() {
                        self.reconciler.reset_baseline();
                    }
                    self.emit(EngineEvent::ConnectionModeChanged {
                        from,
                        to,
                        consecutive_failures: state.consecutive_failures,
                    });
                    self.apply(StateInput::ModeChanged(to), from);
                }
                SupervisorEvent::Notice { kind, message } => self.notice(kind, message),
            }
        }
        self.publish_view();
    }

    fn on_reconciled(&mut self, reconciled: Reconciled) {
        match reconciled {
            Reconciled::Apply(snapshot) => {
                self.apply(StateInput::Snapshot(snapshot), self.state.connection_mode);
            }
            Reconciled::Duplicate => trace!("Duplicate snapshot ignored"),
            Reconciled::Corrupted { fallback, repair } => {
                warn!(message = %repair.error_data.message, "Corrupted poll, requesting repair");
                let api = Arc::clone(&self.api);
                self.actions.spawn(async move {
                    let result = match tokio::time::timeout(ACTION_TIMEOUT, api.report_corruption(repair)).await {
                        Ok(result) => result,
                        Err(_) => Err(ApiError::Timeout),
                    };
                    ActionOutcome::Repair(result)
                });
                self.apply(StateInput::Snapshot(fallback), self.state.connection_mode);
            }
        }
    }

    /// Run one input through the reducer and act on its effects
    ///
    /// `previous_mode` is the mode the effects were produced under; it only
    /// differs from the current mode for `ModeChanged`.
    fn apply(&mut self, input: StateInput, previous_mode: ConnectionMode) -> Option<DropReason> {
        let reduction = reduce(&self.state, input);
        let dropped = reduction.dropped();
        self.state = reduction.state;
        for effect in reduction.effects {
            self.on_effect(effect, previous_mode);
        }
        if dropped.is_none() {
            self.extrapolator.sync(&self.state);
        }
        dropped
    }

    fn on_effect(&mut self, effect: StateEffect, previous_mode: ConnectionMode) {
        match effect {
            StateEffect::PhaseEntered { phase, round } => {
                debug!(%phase, round, "Phase entered");
                self.emit(EngineEvent::PhaseChanged { phase, round });
                match phase {
                    RoundPhase::Waiting => self.emit(EngineEvent::CountdownTick(self.state.countdown)),
                    RoundPhase::Active => self.emit(EngineEvent::MultiplierUpdated {
                        multiplier: self.state.multiplier,
                        authoritative: true,
                    }),
                    _ => {}
                }
            }
            StateEffect::CountdownChanged(countdown) => self.emit(EngineEvent::CountdownTick(countdown)),
            StateEffect::MultiplierRaised(multiplier) => self.emit(EngineEvent::MultiplierUpdated {
                multiplier,
                authoritative: true,
            }),
            StateEffect::RoundCrashed {
                round,
                crash_point,
                lost_bet,
            } => {
                info!(round, crash_point, lost = lost_bet.is_some(), "Round crashed");
                let timestamp = self.state.last_timestamp.filter(|t| *t > 0).unwrap_or_else(now_ms);
                if self.reconciler.record_crash(crash_point, timestamp) {
                    self.emit_history();
                }
                self.emit(EngineEvent::RoundCrashed {
                    round,
                    crash_point,
                    lost_bet,
                });
            }
            StateEffect::RoundAbandoned { round, voided_bet } => {
                self.emit(EngineEvent::RoundAbandoned { round });
                if let Some(bet) = voided_bet {
                    self.void_bet(bet, previous_mode.is_demo());
                }
            }
            StateEffect::BetRecorded(bet) => self.emit(EngineEvent::BetPlaced(bet)),
            StateEffect::BetConfirmed(bet) => {
                self.wallet.add_balance(-bet.amount);
                info!(id = %bet.id, amount = bet.amount, round = bet.round, "Bet confirmed");
                self.emit(EngineEvent::BetConfirmed(bet));
            }
            StateEffect::BetDropped(bet) => debug!(id = %bet.id, "Bet dropped"),
            StateEffect::BetLost(bet) => {
                info!(id = %bet.id, amount = bet.amount, "Bet lost");
                self.emit(EngineEvent::BetLost(bet));
            }
            StateEffect::CashoutRecorded(record) => {
                self.wallet.add_balance(record.win_amount);
                info!(multiplier = record.multiplier, win = record.win_amount, "Cashed out");
                self.notice(
                    NotificationKind::Success,
                    format!(
                        "Cashed out at {:.2}x for {:.2}",
                        record.multiplier, record.win_amount
                    ),
                );
                self.emit(EngineEvent::CashoutAccepted(record));
            }
            StateEffect::Dropped(reason) => trace!(?reason, "Input dropped"),
        }
    }

    /// Bet taken out of play by a mode switch
    fn void_bet(&mut self, bet: Bet, demo: bool) {
        // A pending online bet is settled when its response arrives
        if bet.status != BetStatus::Confirmed {
            return;
        }
        if demo {
            self.wallet.add_balance(bet.amount);
        }
        let message = if demo {
            format!("Demo bet of {:.2} refunded", bet.amount)
        } else {
            format!("Bet of {:.2} left with the server round", bet.amount)
        };
        self.notice(NotificationKind::Info, message);
        self.emit(EngineEvent::BetVoided { bet, refunded: demo });
    }

    // ------------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------------

    fn require_username(&self) -> Result<String, EngineError> {
        self.username
            .clone()
            .ok_or_else(|| EngineError::validation("Set a username first"))
    }

    fn on_place_bet(&mut self, amount: f64, auto_cashout: f64, reply: Reply<Bet>) {
        let username = match self.require_username() {
            Ok(name) => name,
            Err(e) => return self.reject_bet(e, reply),
        };
        if let Err(e) = BettingClient::<A>::validate_bet(amount, auto_cashout) {
            return self.reject_bet(e, reply);
        }
        if amount > self.wallet.balance() {
            return self.reject_bet(EngineError::validation("Insufficient balance"), reply);
        }
        if self.state.has_open_bet() {
            return self.reject_bet(EngineError::validation("You already have a bet in play"), reply);
        }

        let bet = Bet::pending(&username, amount, auto_cashout, self.state.bet_round());
        let mode = self.state.connection_mode;

        if mode.is_demo() {
            if self.state.phase != RoundPhase::Waiting {
                return self.reject_bet(
                    EngineError::validation("Bets are only accepted during the countdown"),
                    reply,
                );
            }
            // Settled locally
            self.apply(StateInput::BetPending(bet.clone()), mode);
            self.apply(StateInput::BetConfirmed { id: bet.id.clone() }, mode);
            let confirmed = self.state.active_bet.clone().unwrap_or(bet);
            let _ = reply.send(Ok(confirmed));
            self.publish_view();
            return;
        }

        let request = BetRequest {
            username,
            amount,
            auto_cashout,
        };
        let future = match self.betting.place_bet(request) {
            Ok(future) => future,
            Err(e) => return self.reject_bet(e, reply),
        };
        self.apply(StateInput::BetPending(bet.clone()), mode);
        self.actions.spawn(async move {
            ActionOutcome::Bet {
                bet,
                result: future.await,
                reply,
            }
        });
        self.publish_view();
    }

    fn on_cashout(&mut self, reply: Reply<CashoutRecord>) {
        let username = match self.require_username() {
            Ok(name) => name,
            Err(e) => return self.reject_cashout(e, reply),
        };
        let bet = match self.state.check_cashout(&username) {
            Ok(bet) => bet.clone(),
            Err(e) => return self.reject_cashout(e, reply),
        };
        let mode = self.state.connection_mode;

        if mode.is_demo() {
            self.apply(StateInput::CashoutPending, mode);
            self.apply(
                StateInput::CashoutAccepted {
                    multiplier: self.state.multiplier,
                    win_amount: None,
                    timestamp: now_ms(),
                },
                mode,
            );
            let result = self
                .state
                .cashout
                .clone()
                .ok_or_else(|| EngineError::validation("Cash-out was not recorded"));
            let _ = reply.send(result);
            self.publish_view();
            return;
        }

        let future = match self.betting.cashout(&username) {
            Ok(future) => future,
            Err(e) => return self.reject_cashout(e, reply),
        };
        self.apply(StateInput::CashoutPending, mode);
        self.actions.spawn(async move {
            ActionOutcome::Cashout {
                bet,
                result: future.await,
                reply,
            }
        });
        self.publish_view();
    }

    fn on_set_username(&mut self, raw: &str) -> Result<String, EngineError> {
        let username = validate_username(raw).map_err(EngineError::Validation)?;
        if self.state.has_open_bet() {
            return Err(EngineError::validation("Cannot change username with a bet in play"));
        }
        if let Err(e) = self.identity.store(&username) {
            warn!(error = %e, "Could not persist username");
        }
        info!(%username, "Username set");
        self.username = Some(username.clone());
        self.supervisor.set_username(Some(username.clone()));
        self.publish_view();
        Ok(username)
    }

    fn on_action(&mut self, outcome: ActionOutcome) {
        match outcome {
            ActionOutcome::Bet { bet, result, reply } => {
                let mode = self.state.connection_mode;
                match result.and_then(accepted_bet) {
                    Ok(()) => {
                        let dropped = self.apply(StateInput::BetConfirmed { id: bet.id.clone() }, mode);
                        let mut confirmed = bet;
                        confirmed.status = BetStatus::Confirmed;
                        if dropped == Some(DropReason::NoMatchingBet) {
                            // Round abandoned while the request was out; the server holds the stake
                            self.wallet.add_balance(-confirmed.amount);
                            self.emit(EngineEvent::BetVoided {
                                bet: confirmed.clone(),
                                refunded: false,
                            });
                        }
                        let _ = reply.send(Ok(confirmed));
                    }
                    Err(e) => {
                        self.apply(StateInput::BetFailed { id: bet.id.clone() }, mode);
                        self.reject_bet(e, reply);
                    }
                }
            }
            ActionOutcome::Cashout { bet, result, reply } => {
                let mode = self.state.connection_mode;
                match result.and_then(accepted_cashout) {
                    Ok(response) => {
                        let multiplier = response.multiplier.unwrap_or(self.state.multiplier);
                        let dropped = self.apply(
                            StateInput::CashoutAccepted {
                                multiplier,
                                win_amount: response.win_amount,
                                timestamp: now_ms(),
                            },
                            mode,
                        );
                        let record = CashoutRecord {
                            username: bet.username.clone(),
                            multiplier,
                            win_amount: response.win_amount.unwrap_or(bet.amount * multiplier),
                            timestamp: now_ms(),
                        };
                        if dropped.is_some() {
                            // Bet was voided by a mode switch; the server still paid it
                            self.wallet.add_balance(record.win_amount);
                            self.emit(EngineEvent::CashoutAccepted(record.clone()));
                        }
                        let _ = reply.send(Ok(record));
                    }
                    Err(e) => {
                        self.apply(StateInput::CashoutFailed, mode);
                        self.reject_cashout(e, reply);
                    }
                }
            }
            ActionOutcome::Repair(result) => match result {
                Ok(response) => info!(repaired = response.repaired, "Repair request acknowledged"),
                Err(e) => warn!(error = %e, "Repair request failed"),
            },
        }
        self.publish_view();
    }

    fn reject_bet(&mut self, error: EngineError, reply: Reply<Bet>) {
        warn!(%error, class = %error.class(), "Bet rejected");
        self.emit(EngineEvent::BetRejected {
            message: error.to_string(),
            class: error.class(),
        });
        self.notice(NotificationKind::Error, error.to_string());
        let _ = reply.send(Err(error));
    }

    fn reject_cashout(&mut self, error: EngineError, reply: Reply<CashoutRecord>) {
        warn!(%error, class = %error.class(), "Cash-out rejected");
        self.emit(EngineEvent::CashoutRejected {
            message: error.to_string(),
            class: error.class(),
        });
        self.notice(NotificationKind::Error, error.to_string());
        let _ = reply.send(Err(error));
    }

    // ------------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------------

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn notice(&self, kind: NotificationKind, message: impl Into<String>) {
        self.emit(EngineEvent::Notice {
            kind,
            message: message.into(),
        });
    }

    fn emit_history(&self) {
        let history = self.reconciler.history();
        self.emit(EngineEvent::HistoryUpdated {
            latest: history.latest().copied(),
            len: history.len(),
        });
    }

    fn publish_view(&self) {
        let (bet_in_flight, cashout_in_flight) = match &self.username {
            Some(name) => self.betting.busy(name),
            None => (false, false),
        };
        self.view.send_replace(EngineView {
            state: self.state.clone(),
            display_multiplier: self.extrapolator.display(),
            connection: self.supervisor.state(),
            history: self.reconciler.history().to_vec(),
            online_players: self.reconciler.online_players(),
            cashouts: self.reconciler.cashouts().to_vec(),
            bet_in_flight,
            cashout_in_flight,
            username: self.username.clone(),
            balance: self.wallet.balance(),
        });
    }
}

fn accepted_bet(response: ActionResponse) -> Result<(), EngineError> {
    if response.success {
        Ok(())
    } else {
        Err(ApiError::Rejected(response.message.unwrap_or_else(|| "Bet was not accepted".into())).into())
    }
}

fn accepted_cashout(response: CashoutResponse) -> Result<CashoutResponse, EngineError> {
    if response.success {
        Ok(response)
    } else {
        let message = response
            .message
            .unwrap_or_else(|| "Cash-out was not accepted".into());
        Err(ApiError::Rejected(message).into())
    }
}
