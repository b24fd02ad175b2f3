//! Error taxonomy for the sync engine
//!
//! Every failure is classified into an [`ErrorClass`] at the component
//! boundary that produced it (Poller, BettingClient). The class decides
//! whether a failure is retried, counted toward the connection supervisor,
//! or surfaced to the player.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorClass {
    /// Timeout, connection refused, 5xx
    TransientNetwork,
    /// The round phase changed between client decision and server processing
    Timing,
    /// Client-side precondition violation, never sent to the server
    Validation,
    /// Malformed or non-JSON response
    DataCorruption,
    /// Too many consecutive poll failures
    TerminalConnectivity,
    /// Any other server refusal (e.g. insufficient balance)
    Rejected,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorClass::TransientNetwork => "TRANSIENT_NETWORK",
            ErrorClass::Timing => "TIMING",
            ErrorClass::Validation => "VALIDATION",
            ErrorClass::DataCorruption => "DATA_CORRUPTION",
            ErrorClass::TerminalConnectivity => "TERMINAL_CONNECTIVITY",
            ErrorClass::Rejected => "REJECTED",
        })
    }
}

/// Failure at the external API boundary
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("http {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {message}")]
    Malformed { message: String, sample: Option<String> },
    #[error("{0}")]
    Rejected(String),
}

impl ApiError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ApiError::Timeout | ApiError::Connect(_) => ErrorClass::TransientNetwork,
            ApiError::Status { status, .. } if *status >= 500 || *status == 408 || *status == 429 => {
                ErrorClass::TransientNetwork
            }
            ApiError::Status { .. } => ErrorClass::Rejected,
            ApiError::Malformed { .. } => ErrorClass::DataCorruption,
            ApiError::Rejected(message) => classify_rejection(message),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_decode() {
            ApiError::Malformed {
                message: e.to_string(),
                sample: None,
            }
        } else if let Some(status) = e.status() {
            ApiError::Status {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            ApiError::Connect(e.to_string())
        }
    }
}

/// Phrases the server uses when an action lands in the wrong round phase
const TIMING_PHRASES: [&str; 8] = [
    "not in join phase",
    "join phase has ended",
    "game is not active",
    "round is not active",
    "round already started",
    "game already started",
    "round already crashed",
    "game already crashed",
];

/// Classify a server refusal message
pub fn classify_rejection(message: &str) -> ErrorClass {
    let lower = message.to_ascii_lowercase();
    if TIMING_PHRASES.iter().any(|p| lower.contains(p)) {
        ErrorClass::Timing
    } else {
        ErrorClass::Rejected
    }
}

/// Errors surfaced by the engine and the betting client
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("network error: {0}")]
    TransientNetwork(String),
    #[error("round phase changed: {0}")]
    Timing(String),
    #[error("{0}")]
    Validation(String),
    #[error("corrupted server data: {0}")]
    DataCorruption(String),
    #[error("server unreachable after {failures} attempts")]
    TerminalConnectivity { failures: u32 },
    #[error("{0}")]
    Rejected(String),
    #[error("engine is not running")]
    Stopped,
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation(message.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            EngineError::TransientNetwork(_) => ErrorClass::TransientNetwork,
            EngineError::Timing(_) => ErrorClass::Timing,
            EngineError::Validation(_) => ErrorClass::Validation,
            EngineError::DataCorruption(_) => ErrorClass::DataCorruption,
            EngineError::TerminalConnectivity { .. } => ErrorClass::TerminalConnectivity,
            EngineError::Rejected(_) | EngineError::Stopped => ErrorClass::Rejected,
        }
    }
}

impl From<ApiError> for EngineError {
    fn from(e: ApiError) -> Self {
        let message = match &e {
            ApiError::Rejected(m) => m.clone(),
            other => other.to_string(),
        };
        match e.class() {
            ErrorClass::TransientNetwork => EngineError::TransientNetwork(message),
            ErrorClass::Timing => EngineError::Timing(message),
            ErrorClass::DataCorruption => EngineError::DataCorruption(message),
            ErrorClass::Validation => EngineError::Validation(message),
            ErrorClass::TerminalConnectivity => EngineError::TransientNetwork(message),
            ErrorClass::Rejected => EngineError::Rejected(message),
        }
    }
}
