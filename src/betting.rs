/// Bet and cash-out actions
/// Client-side validation, single-in-flight discipline per (action, player),
/// and the bounded retry of timing errors. Each action returns a future the
/// engine spawns; the in-flight slot is held until that future completes.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::error::{ApiError, EngineError};
use crate::game_api::GameApi;
use crate::models::{ActionResponse, CashoutResponse};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::settings::{ACTION_TIMEOUT, MIN_AUTO_CASHOUT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BetAction {
    PlaceBet,
    Cashout,
}

type InFlightSet = Arc<Mutex<HashSet<(BetAction, String)>>>;

/// Releases the in-flight slot on drop, including when the task is aborted
struct InFlightGuard {
    set: InFlightSet,
    key: (BetAction, String),
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BetRequest {
    pub username: String,
    pub amount: f64,
    pub auto_cashout: f64,
}

pub struct BettingClient<A: GameApi> {
    api: Arc<A>,
    bet_policy: RetryPolicy,
    cashout_policy: RetryPolicy,
    in_flight: InFlightSet,
}

impl<A: GameApi> BettingClient<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self::with_policies(api, RetryPolicy::PLACE_BET, RetryPolicy::CASHOUT)
    }

    pub fn with_policies(api: Arc<A>, bet_policy: RetryPolicy, cashout_policy: RetryPolicy) -> Self {
        Self {
            api,
            bet_policy,
            cashout_policy,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Amount and auto-cashout rules shared by online and demo bets
    pub fn validate_bet(amount: f64, auto_cashout: f64) -> Result<(), EngineError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(EngineError::validation("Bet amount must be greater than zero"));
        }
        if !auto_cashout.is_finite() || auto_cashout < MIN_AUTO_CASHOUT {
            return Err(EngineError::validation(format!(
                "Auto cash-out must be at least {:.2}x",
                MIN_AUTO_CASHOUT
            )));
        }
        Ok(())
    }

    pub fn is_in_flight(&self, action: BetAction, username: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&(action, username.to_string()))
    }

    /// (bet, cash-out) in flight for this player
    pub fn busy(&self, username: &str) -> (bool, bool) {
        (
            self.is_in_flight(BetAction::PlaceBet, username),
            self.is_in_flight(BetAction::Cashout, username),
        )
    }

    fn claim(&self, action: BetAction, username: &str) -> Result<InFlightGuard, EngineError> {
        let key = (action, username.to_string());
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(key.clone()) {
            let message = match action {
                BetAction::PlaceBet => "A bet is already being placed",
                BetAction::Cashout => "Cash-out already in progress",
            };
            return Err(EngineError::validation(message));
        }
        Ok(InFlightGuard {
            set: Arc::clone(&self.in_flight),
            key,
        })
    }

    /// Validate and return the request future; nothing is sent until it is polled
    pub fn place_bet(
        &self,
        request: BetRequest,
    ) -> Result<impl Future<Output = Result<ActionResponse, EngineError>> + Send + 'static, EngineError>
    {
        Self::validate_bet(request.amount, request.auto_cashout)?;
        let guard = self.claim(BetAction::PlaceBet, &request.username)?;
        let api = Arc::clone(&self.api);
        let policy = self.bet_policy;

        Ok(async move {
            let _guard = guard;
            with_retry(policy, BetAction::PlaceBet, || {
                let api = Arc::clone(&api);
                let request = request.clone();
                async move {
                    bounded(api.place_bet(&request.username, request.amount, request.auto_cashout))
                        .await
                }
            })
            .await
        })
    }

    /// Round-state preconditions are checked by the caller; this enforces in-flight only
    pub fn cashout(
        &self,
        username: &str,
    ) -> Result<impl Future<Output = Result<CashoutResponse, EngineError>> + Send + 'static, EngineError>
    {
        let guard = self.claim(BetAction::Cashout, username)?;
        let api = Arc::clone(&self.api);
        let policy = self.cashout_policy;
        let username = username.to_string();

        Ok(async move {
            let _guard = guard;
            with_retry(policy, BetAction::Cashout, || {
                let api = Arc::clone(&api);
                let username = username.clone();
                async move { bounded(api.cashout(&username)).await }
            })
            .await
        })
    }
}

async fn bounded<T>(call: impl Future<Output = Result<T, ApiError>>) -> Result<T, ApiError> {
    match tokio::time::timeout(ACTION_TIMEOUT, call).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::Timeout),
    }
}

async fn with_retry<T, F, Fut>(policy: RetryPolicy, action: BetAction, mut call: F) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match call().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(?action, attempt, "Action succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => {
                let class = e.class();
                match policy.decide(attempt, class) {
                    RetryDecision::RetryAfter(delay) => {
                        warn!(?action, attempt, %class, error = %e, delay_ms = delay.as_millis() as u64, "Retrying action");
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::GiveUp => {
                        warn!(?action, attempt, %class, error = %e, "Action failed");
                        return Err(e.into());
                    }
                }
            }
        }
    }
}
