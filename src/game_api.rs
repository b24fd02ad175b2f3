/// Game server boundary
/// `GameApi` is the only surface through which the engine talks to the server.
/// `HttpGameApi` implements it over reqwest; tests substitute scripted fakes.

use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::models::{
    ActionRequest, ActionResponse, CashoutResponse, ErrorBody, RepairRequest, RepairResponse,
    StatusResponse,
};
use crate::settings::{ACTION_TIMEOUT, POLL_TIMEOUT, USER_AGENT};

/// Longest body excerpt kept in errors
const BODY_SAMPLE_CHARS: usize = 200;

pub trait GameApi: Send + Sync + 'static {
    /// GET the game status
    fn fetch_status(&self) -> impl Future<Output = Result<StatusResponse, ApiError>> + Send;

    /// Combined poll and identify
    fn sync(&self, username: &str) -> impl Future<Output = Result<StatusResponse, ApiError>> + Send;

    fn place_bet(
        &self,
        username: &str,
        amount: f64,
        auto_cashout: f64,
    ) -> impl Future<Output = Result<ActionResponse, ApiError>> + Send;

    fn cashout(&self, username: &str) -> impl Future<Output = Result<CashoutResponse, ApiError>> + Send;

    /// Advisory; callers never wait on the outcome
    fn report_corruption(
        &self,
        request: RepairRequest,
    ) -> impl Future<Output = Result<RepairResponse, ApiError>> + Send;
}

pub struct HttpGameApi {
    client: reqwest::Client,
    base_url: String,
    action_timeout: Duration,
}

impl HttpGameApi {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Self::with_timeouts(base_url, POLL_TIMEOUT, ACTION_TIMEOUT)
    }

    /// `poll_timeout` bounds status/sync calls, `action_timeout` bets, cash-outs and repairs
    pub fn with_timeouts(
        base_url: &str,
        poll_timeout: Duration,
        action_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(poll_timeout)
            .connect_timeout(Duration::from_secs(5))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ApiError::Connect(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            action_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn status_url(&self) -> String {
        format!("{}/api/game-status", self.base_url)
    }

    fn action_url(&self) -> String {
        format!("{}/api/game-action", self.base_url)
    }

    fn repair_url(&self) -> String {
        format!("{}/api/repair", self.base_url)
    }

    async fn post_action<T: DeserializeOwned>(
        &self,
        request: &ActionRequest,
        timeout: Duration,
    ) -> Result<T, ApiError> {
        let response = self
            .client
            .post(self.action_url())
            .timeout(timeout)
            .json(request)
            .send()
            .await?;
        decode(response).await
    }
}

impl GameApi for HttpGameApi {
    async fn fetch_status(&self) -> Result<StatusResponse, ApiError> {
        let response = self
            .client
            .get(self.status_url())
            .header("Accept", "application/json")
            .send()
            .await?;
        decode(response).await
    }

    async fn sync(&self, username: &str) -> Result<StatusResponse, ApiError> {
        let request = ActionRequest::Sync {
            username: username.to_string(),
        };
        // Sync doubles as the poll and gets the poll timeout
        let response = self.client.post(self.action_url()).json(&request).send().await?;
        decode(response).await
    }

    async fn place_bet(
        &self,
        username: &str,
        amount: f64,
        auto_cashout: f64,
    ) -> Result<ActionResponse, ApiError> {
        let request = ActionRequest::PlaceBet {
            username: username.to_string(),
            bet_amount: amount,
            auto_cashout,
        };
        self.post_action(&request, self.action_timeout).await
    }

    async fn cashout(&self, username: &str) -> Result<CashoutResponse, ApiError> {
        let request = ActionRequest::Cashout {
            username: username.to_string(),
        };
        self.post_action(&request, self.action_timeout).await
    }

    async fn report_corruption(&self, request: RepairRequest) -> Result<RepairResponse, ApiError> {
        let response = self
            .client
            .post(self.repair_url())
            .timeout(self.action_timeout)
            .json(&request)
            .send()
            .await?;
        decode(response).await
    }
}

/// Decode a response body, mapping the server's error shapes to `ApiError`
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();
    let body = response.text().await?;

    if status.is_server_error() {
        warn!(status = status.as_u16(), "Server error response");
        return Err(ApiError::Status {
            status: status.as_u16(),
            body: sample(&body),
        });
    }

    if let Ok(error) = serde_json::from_str::<ErrorBody>(&body) {
        if !error.success {
            let message = error
                .message
                .unwrap_or_else(|| "request rejected".to_string());
            debug!(status = status.as_u16(), %message, "Server rejected request");
            return Err(ApiError::Rejected(message));
        }
    }

    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            body: sample(&body),
        });
    }

    serde_json::from_str(&body).map_err(|e| ApiError::Malformed {
        message: e.to_string(),
        sample: Some(sample(&body)),
    })
}

fn sample(body: &str) -> String {
    body.chars().take(BODY_SAMPLE_CHARS).collect()
}
