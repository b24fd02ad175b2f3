/// Snapshot poller
/// Issues one status request per poll tick while running. A tick is skipped
/// while the previous request is still in flight. Results travel to the engine
/// tagged with the poller generation; anything from an older generation
/// (stopped poller, cancelled probe) is discarded on arrival.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::ApiError;
use crate::game_api::GameApi;
use crate::models::StatusResponse;
use crate::timers::{TimerFired, TimerKind, TimerSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollKind {
    Scheduled,
    /// One-shot connectivity check while in demo mode
    Probe,
}

#[derive(Debug)]
pub struct PollResult {
    pub kind: PollKind,
    pub generation: u64,
    pub outcome: Result<StatusResponse, ApiError>,
}

pub struct Poller<A: GameApi> {
    api: Arc<A>,
    timers: TimerSet,
    results: mpsc::UnboundedSender<PollResult>,
    interval: Duration,
    timeout: Duration,
    generation: u64,
    running: bool,
    in_flight: Option<JoinHandle<()>>,
    probe: Option<JoinHandle<()>>,
    username: Option<String>,
    issued: u64,
}

impl<A: GameApi> Poller<A> {
    pub fn new(
        api: Arc<A>,
        timers: TimerSet,
        results: mpsc::UnboundedSender<PollResult>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            api,
            timers,
            results,
            interval,
            timeout,
            generation: 0,
            running: false,
            in_flight: None,
            probe: None,
            username: None,
            issued: 0,
        }
    }

    /// Start polling, first request immediately
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        if let Some(handle) = self.probe.take() {
            handle.abort();
        }
        self.generation += 1;
        self.running = true;
        self.timers.every_from(TimerKind::Poll, Duration::ZERO, self.interval);
        debug!(interval_ms = self.interval.as_millis() as u64, "Poller started");
    }

    /// Cancel the poll timer and any request in flight
    pub fn stop(&mut self) {
        if !self.running && self.in_flight.is_none() && self.probe.is_none() {
            return;
        }
        self.running = false;
        self.timers.cancel_all();
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
        if let Some(handle) = self.probe.take() {
            handle.abort();
        }
        self.generation += 1;
        debug!("Poller stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Requests issued since creation, probes included
    pub fn issued(&self) -> u64 {
        self.issued
    }

    /// Use the `sync` action instead of the bare status GET
    pub fn set_username(&mut self, username: Option<String>) {
        self.username = username;
    }

    /// Handle a poll tick; returns true when a request was issued
    pub fn on_tick(&mut self, fired: &TimerFired) -> bool {
        if !self.timers.accept(fired) || !self.running {
            return false;
        }
        if self.in_flight.is_some() {
            trace!("Previous poll still in flight, skipping tick");
            return false;
        }
        self.in_flight = Some(self.spawn_request(PollKind::Scheduled));
        true
    }

    /// Fire one connectivity probe unless one is already out
    pub fn probe(&mut self) {
        if self.probe.is_some() {
            return;
        }
        self.probe = Some(self.spawn_request(PollKind::Probe));
    }

    pub fn cancel_probe(&mut self) {
        if let Some(handle) = self.probe.take() {
            handle.abort();
            self.generation += 1;
        }
    }

    /// Filter a result arriving from a request task
    pub fn on_result(&mut self, result: PollResult) -> Option<PollResult> {
        if result.generation != self.generation {
            trace!(
                got = result.generation,
                current = self.generation,
                "Discarding stale poll result"
            );
            return None;
        }
        match result.kind {
            PollKind::Scheduled => {
                self.in_flight = None;
                if !self.running {
                    return None;
                }
            }
            PollKind::Probe => self.probe = None,
        }
        Some(result)
    }

    fn spawn_request(&mut self, kind: PollKind) -> JoinHandle<()> {
        self.issued += 1;
        let api = Arc::clone(&self.api);
        let tx = self.results.clone();
        let timeout = self.timeout;
        let generation = self.generation;
        let username = match kind {
            PollKind::Scheduled => self.username.clone(),
            PollKind::Probe => None,
        };

        tokio::spawn(async move {
            let request = async {
                match username.as_deref() {
                    Some(name) => api.sync(name).await,
                    None => api.fetch_status().await,
                }
            };
            let outcome = match tokio::time::timeout(timeout, request).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ApiError::Timeout),
            };
            let _ = tx.send(PollResult {
                kind,
                generation,
                outcome,
            });
        })
    }
}

impl<A: GameApi> Drop for Poller<A> {
    fn drop(&mut self) {
        self.stop();
    }
}
