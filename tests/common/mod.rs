// Shared helpers for the engine integration tests
//
// `FakeServer` is a GameApi whose status the test moves by hand, so a test
// can walk a round through countdown, flight and crash at its own pace.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;

use crash_sync::connection::SupervisorConfig;
use crash_sync::identity::MemoryIdentityStore;
use crash_sync::models::{
    ActionResponse, CashoutResponse, GameSnapshot, RepairRequest, RepairResponse, RoundPhase,
    StatusResponse,
};
use crash_sync::wallet::{LocalWallet, Wallet};
use crash_sync::{ApiError, Engine, EngineConfig, EngineEvent, EngineHandle, GameApi};

/// Game server stand-in with a settable status
#[derive(Default)]
pub struct FakeServer {
    /// None means the server is down
    status: Mutex<Option<StatusResponse>>,
    status_calls: AtomicUsize,
    sync_calls: AtomicUsize,
    bet_calls: AtomicUsize,
    cashout_calls: AtomicUsize,
}

impl FakeServer {
    pub fn offline() -> Self {
        Self::default()
    }

    pub fn set_status(&self, phase: RoundPhase, multiplier: f64, timestamp: i64) {
        let snapshot = GameSnapshot {
            state: phase,
            multiplier,
            countdown: if phase == RoundPhase::Waiting { 5 } else { 0 },
            crash_point: (phase == RoundPhase::Crashed).then_some(multiplier),
            players: Vec::new(),
            timestamp,
        };
        *self.status.lock().unwrap() = Some(StatusResponse {
            game_state: snapshot,
            history: Vec::new(),
            online_players: 3,
            cashouts: Vec::new(),
        });
    }

    pub fn go_offline(&self) {
        *self.status.lock().unwrap() = None;
    }

    /// status + sync requests
    pub fn polls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst) + self.sync_calls.load(Ordering::SeqCst)
    }

    pub fn bet_calls(&self) -> usize {
        self.bet_calls.load(Ordering::SeqCst)
    }

    pub fn cashout_calls(&self) -> usize {
        self.cashout_calls.load(Ordering::SeqCst)
    }

    fn current(&self) -> Result<StatusResponse, ApiError> {
        self.status
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ApiError::Connect("connection refused".into()))
    }
}

impl GameApi for FakeServer {
    async fn fetch_status(&self) -> Result<StatusResponse, ApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.current()
    }

    async fn sync(&self, _username: &str) -> Result<StatusResponse, ApiError> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        self.current()
    }

    async fn place_bet(
        &self,
        _username: &str,
        _amount: f64,
        _auto_cashout: f64,
    ) -> Result<ActionResponse, ApiError> {
        self.bet_calls.fetch_add(1, Ordering::SeqCst);
        self.current()?;
        Ok(ActionResponse {
            success: true,
            message: None,
        })
    }

    /// Pays out at whatever multiplier the round is showing
    async fn cashout(&self, _username: &str) -> Result<CashoutResponse, ApiError> {
        self.cashout_calls.fetch_add(1, Ordering::SeqCst);
        let status = self.current()?;
        Ok(CashoutResponse {
            success: true,
            multiplier: Some(status.game_state.multiplier),
            win_amount: None,
            message: None,
        })
    }

    async fn report_corruption(&self, _request: RepairRequest) -> Result<RepairResponse, ApiError> {
        Ok(RepairResponse { repaired: false })
    }
}

pub struct Rig {
    pub server: Arc<FakeServer>,
    pub wallet: Arc<LocalWallet>,
    pub handle: EngineHandle,
    pub events: broadcast::Receiver<EngineEvent>,
}

/// Spawn an engine against `server` with a 1000 starting balance
pub fn start(server: Arc<FakeServer>, poll_interval: Duration, auto_probe: bool) -> Rig {
    let config = EngineConfig {
        supervisor: SupervisorConfig {
            poll_interval,
            poll_timeout: Duration::from_secs(15),
            auto_probe,
            demo_seed: Some(21),
        },
        username: Some("ann".to_string()),
    };
    let wallet = Arc::new(LocalWallet::new(1000.0));
    let identity = Arc::new(MemoryIdentityStore::new(None));
    let (engine, handle) = Engine::new(
        config,
        Arc::clone(&server),
        Arc::clone(&wallet) as Arc<dyn Wallet>,
        identity,
    );
    let events = handle.subscribe();
    tokio::spawn(engine.run());
    Rig {
        server,
        wallet,
        handle,
        events,
    }
}

/// Wait (in virtual time) for the first event matching `pred`
pub async fn wait_for<F>(rx: &mut broadcast::Receiver<EngineEvent>, mut pred: F) -> EngineEvent
where
    F: FnMut(&EngineEvent) -> bool,
{
    let fut = async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("engine stopped"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(300), fut)
        .await
        .expect("event did not arrive")
}

/// Record every event except multiplier ticks, without lagging
pub fn record(mut rx: broadcast::Receiver<EngineEvent>) -> Arc<Mutex<Vec<EngineEvent>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(EngineEvent::MultiplierUpdated { .. }) => {}
                Ok(event) => sink.lock().unwrap().push(event),
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    log
}
