//! Scripted `GameApi` for unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::ApiError;
use crate::game_api::GameApi;
use crate::models::{
    ActionResponse, CashoutResponse, GameSnapshot, RepairRequest, RepairResponse, RoundPhase,
    StatusResponse,
};

pub fn status(state: RoundPhase, multiplier: f64, countdown: u32, timestamp: i64) -> StatusResponse {
    StatusResponse {
        game_state: GameSnapshot {
            state,
            multiplier,
            countdown,
            crash_point: None,
            players: Vec::new(),
            timestamp,
        },
        history: Vec::new(),
        online_players: 1,
        cashouts: Vec::new(),
    }
}

#[derive(Default)]
struct Script {
    status: VecDeque<Result<StatusResponse, ApiError>>,
    default_status: Option<Result<StatusResponse, ApiError>>,
    bets: VecDeque<Result<ActionResponse, ApiError>>,
    cashouts: VecDeque<Result<CashoutResponse, ApiError>>,
    latency: Duration,
}

#[derive(Default)]
pub struct ScriptedApi {
    script: Mutex<Script>,
    status_calls: AtomicUsize,
    sync_calls: AtomicUsize,
    bet_calls: AtomicUsize,
    cashout_calls: AtomicUsize,
    repair_calls: AtomicUsize,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_status(&self, result: Result<StatusResponse, ApiError>) {
        self.script.lock().unwrap().status.push_back(result);
    }

    /// Returned once the status queue is empty
    pub fn set_default_status(&self, result: Result<StatusResponse, ApiError>) {
        self.script.lock().unwrap().default_status = Some(result);
    }

    pub fn push_bet(&self, result: Result<ActionResponse, ApiError>) {
        self.script.lock().unwrap().bets.push_back(result);
    }

    pub fn push_cashout(&self, result: Result<CashoutResponse, ApiError>) {
        self.script.lock().unwrap().cashouts.push_back(result);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.script.lock().unwrap().latency = latency;
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn sync_calls(&self) -> usize {
        self.sync_calls.load(Ordering::SeqCst)
    }

    pub fn bet_calls(&self) -> usize {
        self.bet_calls.load(Ordering::SeqCst)
    }

    pub fn cashout_calls(&self) -> usize {
        self.cashout_calls.load(Ordering::SeqCst)
    }

    pub fn repair_calls(&self) -> usize {
        self.repair_calls.load(Ordering::SeqCst)
    }

    fn next_status(&self) -> (Duration, Result<StatusResponse, ApiError>) {
        let mut script = self.script.lock().unwrap();
        let result = match script.status.pop_front() {
            Some(result) => result,
            None => script
                .default_status
                .clone()
                .unwrap_or_else(|| Err(ApiError::Connect("connection refused".into()))),
        };
        (script.latency, result)
    }

    async fn wait(latency: Duration) {
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

impl GameApi for ScriptedApi {
    async fn fetch_status(&self) -> Result<StatusResponse, ApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let (latency, result) = self.next_status();
        Self::wait(latency).await;
        result
    }

    async fn sync(&self, _username: &str) -> Result<StatusResponse, ApiError> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        let (latency, result) = self.next_status();
        Self::wait(latency).await;
        result
    }

    async fn place_bet(
        &self,
        _username: &str,
        _amount: f64,
        _auto_cashout: f64,
    ) -> Result<ActionResponse, ApiError> {
        self.bet_calls.fetch_add(1, Ordering::SeqCst);
        let (latency, result) = {
            let mut script = self.script.lock().unwrap();
            let result = script.bets.pop_front().unwrap_or(Ok(ActionResponse {
                success: true,
                message: None,
            }));
            (script.latency, result)
        };
        Self::wait(latency).await;
        result
    }

    async fn cashout(&self, _username: &str) -> Result<CashoutResponse, ApiError> {
        self.cashout_calls.fetch_add(1, Ordering::SeqCst);
        let (latency, result) = {
            let mut script = self.script.lock().unwrap();
            let result = script.cashouts.pop_front().unwrap_or(Ok(CashoutResponse {
                success: true,
                multiplier: None,
                win_amount: None,
                message: None,
            }));
            (script.latency, result)
        };
        Self::wait(latency).await;
        result
    }

    async fn report_corruption(&self, _request: RepairRequest) -> Result<RepairResponse, ApiError> {
        self.repair_calls.fetch_add(1, Ordering::SeqCst);
        Ok(RepairResponse { repaired: true })
    }
}
