//! Connection supervision
//!
//! [`ConnectionState`] is the pure decision table from consecutive poll
//! failures to a [`ConnectionMode`]. [`ConnectionSupervisor`] owns the two
//! snapshot sources, the [`Poller`] and the [`DemoSimulator`], and guarantees
//! that at most one of them has live timers: a mode switch cancels the
//! outgoing source before the incoming one creates anything.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::demo::{DemoSimulator, DemoTick};
use crate::error::ApiError;
use crate::events::NotificationKind;
use crate::game_api::GameApi;
use crate::models::{GameSnapshot, StatusResponse};
use crate::poller::{PollKind, PollResult, Poller};
use crate::settings::{DEMO_THRESHOLD, RECONNECTING_THRESHOLD};
use crate::timers::{TimerFired, TimerKind, TimerSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    Online,
    Reconnecting,
    Demo,
}

impl ConnectionMode {
    pub fn is_demo(self) -> bool {
        self == ConnectionMode::Demo
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionMode::Online => "ONLINE",
            ConnectionMode::Reconnecting => "RECONNECTING",
            ConnectionMode::Demo => "DEMO",
        })
    }
}

// ============================================================================
// Decision table
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    pub mode: ConnectionMode,
    pub consecutive_failures: u32,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            mode: ConnectionMode::Online,
            consecutive_failures: 0,
        }
    }
}

impl ConnectionState {
    /// Mode for a failure count while connected
    pub fn mode_for(consecutive_failures: u32) -> ConnectionMode {
        if consecutive_failures >= DEMO_THRESHOLD {
            ConnectionMode::Demo
        } else if consecutive_failures >= RECONNECTING_THRESHOLD {
            ConnectionMode::Reconnecting
        } else {
            ConnectionMode::Online
        }
    }

    /// Demo is sticky: only a probe or an explicit action leaves it
    pub fn on_poll_success(self) -> Self {
        let mode = if self.mode.is_demo() {
            ConnectionMode::Demo
        } else {
            ConnectionMode::Online
        };
        Self {
            mode,
            consecutive_failures: 0,
        }
    }

    pub fn on_poll_failure(self) -> Self {
        let consecutive_failures = self.consecutive_failures.saturating_add(1);
        let mode = if self.mode.is_demo() {
            ConnectionMode::Demo
        } else {
            Self::mode_for(consecutive_failures)
        };
        Self {
            mode,
            consecutive_failures,
        }
    }

    pub fn forced(mode: ConnectionMode) -> Self {
        Self {
            mode,
            consecutive_failures: 0,
        }
    }
}

// ============================================================================
// Supervisor
// ============================================================================

/// What the engine must process after a supervisor call, in order
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
    Status(StatusResponse),
    Corrupted {
        message: String,
        sample: Option<String>,
    },
    ModeChanged {
        from: ConnectionMode,
        to: ConnectionMode,
        state: ConnectionState,
    },
    Notice {
        kind: NotificationKind,
        message: String,
    },
    Snapshot(GameSnapshot),
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub auto_probe: bool,
    pub demo_seed: Option<u64>,
}

pub struct ConnectionSupervisor<A: GameApi> {
    state: ConnectionState,
    poller: Poller<A>,
    demo: DemoSimulator,
    auto_probe: bool,
    /// A probe succeeded during the current demo pause
    probe_ok: bool,
}

impl<A: GameApi> ConnectionSupervisor<A> {
    pub fn new(
        api: Arc<A>,
        timer_tx: mpsc::UnboundedSender<TimerFired>,
        poll_tx: mpsc::UnboundedSender<PollResult>,
        config: SupervisorConfig,
    ) -> Self {
        let poller = Poller::new(
            api,
            TimerSet::new(timer_tx.clone()),
            poll_tx,
            config.poll_interval,
            config.poll_timeout,
        );
        let demo = DemoSimulator::new(TimerSet::new(timer_tx), config.demo_seed);
        Self {
            state: ConnectionState::default(),
            poller,
            demo,
            auto_probe: config.auto_probe,
            probe_ok: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn poller(&self) -> &Poller<A> {
        &self.poller
    }

    pub fn demo(&self) -> &DemoSimulator {
        &self.demo
    }

    pub fn set_username(&mut self, username: Option<String>) {
        self.poller.set_username(username);
    }

    /// Begin in online mode
    pub fn start(&mut self) {
        self.demo.stop();
        self.poller.start();
    }

    pub fn shutdown(&mut self) {
        self.poller.stop();
        self.demo.stop();
        debug!("Connection supervisor shut down");
    }

    pub fn on_poll_result(&mut self, result: PollResult) -> Vec<SupervisorEvent> {
        let Some(result) = self.poller.on_result(result) else {
            return Vec::new();
        };
        match result.kind {
            PollKind::Probe => {
                self.on_probe_result(result.outcome);
                Vec::new()
            }
            PollKind::Scheduled => self.on_scheduled_result(result.outcome),
        }
    }

    fn on_scheduled_result(&mut self, outcome: Result<StatusResponse, ApiError>) -> Vec<SupervisorEvent> {
        let mut events = Vec::new();
        match outcome {
            Ok(status) => {
                let previous = self.state;
                self.state = self.state.on_poll_success();
                if previous.mode != self.state.mode {
                    info!("Connection restored");
                    events.push(self.mode_changed(previous.mode));
                    events.push(SupervisorEvent::Notice {
                        kind: NotificationKind::Success,
                        message: "Connection restored".to_string(),
                    });
                }
                events.push(SupervisorEvent::Status(status));
            }
            Err(ApiError::Malformed { message, sample }) => {
                warn!(%message, "Poll returned malformed data");
                events.push(SupervisorEvent::Corrupted { message, sample });
            }
            Err(e) => {
                let previous = self.state;
                self.state = self.state.on_poll_failure();
                let failures = self.state.consecutive_failures;
                match self.state.mode {
                    ConnectionMode::Online => {
                        debug!(failures, error = %e, "Poll failed, retrying silently");
                    }
                    ConnectionMode::Reconnecting => {
                        warn!(failures, error = %e, "Poll failed");
                        if previous.mode != ConnectionMode::Reconnecting {
                            events.push(self.mode_changed(previous.mode));
                            events.push(SupervisorEvent::Notice {
                                kind: NotificationKind::Warning,
                                message: "Connection lost, reconnecting...".to_string(),
                            });
                        }
                    }
                    ConnectionMode::Demo => {
                        warn!(failures, error = %e, "Server unreachable, switching to demo mode");
                        events.push(SupervisorEvent::Notice {
                            kind: NotificationKind::Error,
                            message: format!(
                                "Server unreachable after {} attempts, playing in demo mode",
                                failures
                            ),
                        });
                        self.switch_to_demo(previous.mode, &mut events);
                    }
                }
            }
        }
        events
    }

    fn on_probe_result(&mut self, outcome: Result<StatusResponse, ApiError>) {
        match outcome {
            Ok(_) if self.state.mode.is_demo() => {
                info!("Connectivity probe succeeded, returning online after this round");
                self.probe_ok = true;
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Connectivity probe failed"),
        }
    }

    pub fn on_timer(&mut self, fired: &TimerFired) -> Vec<SupervisorEvent> {
        let mut events = Vec::new();
        match fired.kind {
            TimerKind::Poll => {
                self.poller.on_tick(fired);
            }
            TimerKind::DemoCountdown | TimerKind::DemoGrowth | TimerKind::DemoPause => {
                match self.demo.on_timer(fired) {
                    DemoTick::Snapshot(snapshot) => {
                        if snapshot.crash_point.is_some() && self.auto_probe {
                            self.probe_ok = false;
                            self.poller.probe();
                        }
                        events.push(SupervisorEvent::Snapshot(snapshot));
                    }
                    DemoTick::PauseOver => {
                        if self.probe_ok {
                            self.switch_to_online(&mut events);
                        } else {
                            self.poller.cancel_probe();
                            events.push(SupervisorEvent::Snapshot(self.demo.begin_round()));
                        }
                    }
                    DemoTick::Ignored => {}
                }
            }
            TimerKind::Extrapolate => {}
        }
        events
    }

    /// Explicit user request
    pub fn enter_demo(&mut self) -> Vec<SupervisorEvent> {
        let mut events = Vec::new();
        if !self.state.mode.is_demo() {
            let from = self.state.mode;
            self.switch_to_demo(from, &mut events);
        }
        events
    }

    /// Explicit user request
    pub fn go_online(&mut self) -> Vec<SupervisorEvent> {
        let mut events = Vec::new();
        if self.state.mode.is_demo() {
            self.switch_to_online(&mut events);
        }
        events
    }

    fn switch_to_demo(&mut self, from: ConnectionMode, events: &mut Vec<SupervisorEvent>) {
        self.poller.stop();
        self.probe_ok = false;
        self.state = ConnectionState {
            mode: ConnectionMode::Demo,
            consecutive_failures: self.state.consecutive_failures,
        };
        events.push(self.mode_changed(from));
        events.push(SupervisorEvent::Snapshot(self.demo.start()));
    }

    fn switch_to_online(&mut self, events: &mut Vec<SupervisorEvent>) {
        self.demo.stop();
        self.poller.cancel_probe();
        self.probe_ok = false;
        let from = self.state.mode;
        self.state = ConnectionState::forced(ConnectionMode::Online);
        events.push(self.mode_changed(from));
        self.poller.start();
    }

    fn mode_changed(&self, from: ConnectionMode) -> SupervisorEvent {
        info!(from = %from, to = %self.state.mode, failures = self.state.consecutive_failures, "Connection mode changed");
        SupervisorEvent::ModeChanged {
            from,
            to: self.state.mode,
            state: self.state,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
