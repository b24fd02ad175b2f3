/// Settings and configuration management
/// Handles tunable constants and environment variable loading/validation

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Polling & Timeouts
// ============================================================================

/// Fixed snapshot poll interval while Online/Reconnecting
pub const POLL_INTERVAL: Duration = Duration::from_millis(3000);
/// Snapshot polls tolerate slow connections
pub const POLL_TIMEOUT: Duration = Duration::from_secs(15);
/// Bound for place-bet / cash-out / repair requests
pub const ACTION_TIMEOUT: Duration = Duration::from_secs(10);

pub const USER_AGENT: &str = "crash_sync";

// ============================================================================
// Multiplier Growth
// ============================================================================

/// multiplier(t) = exp(GROWTH_RATE * elapsed_seconds)
pub const GROWTH_RATE: f64 = 0.05;
/// Local extrapolation tick between authoritative snapshots
pub const EXTRAPOLATION_TICK: Duration = Duration::from_millis(100);

// ============================================================================
// History
// ============================================================================

pub const HISTORY_CAPACITY: usize = 50;
/// Entries closer than this are the same crash
pub const HISTORY_DEDUP_WINDOW_MS: i64 = 5000;
/// Crash points at or above this are shown green
pub const HISTORY_GREEN_THRESHOLD: f64 = 2.0;

// ============================================================================
// Connection Supervisor Thresholds
// ============================================================================

/// consecutive failures at which the UI shows "reconnecting"
pub const RECONNECTING_THRESHOLD: u32 = 2;
/// consecutive failures at which the engine fails over to demo mode
pub const DEMO_THRESHOLD: u32 = 5;

// ============================================================================
// Demo Simulator
// ============================================================================

pub const DEMO_COUNTDOWN_SECS: u32 = 5;
pub const DEMO_COUNTDOWN_TICK: Duration = Duration::from_secs(1);
pub const DEMO_GROWTH_TICK: Duration = Duration::from_millis(100);
pub const DEMO_GROWTH_FACTOR: f64 = 1.05;
pub const DEMO_PAUSE: Duration = Duration::from_secs(5);
/// Demo crash points are drawn uniformly from [1, 1 + DEMO_CRASH_SPAN)
pub const DEMO_CRASH_SPAN: f64 = 10.0;

// ============================================================================
// Betting
// ============================================================================

pub const MIN_AUTO_CASHOUT: f64 = 1.01;
pub const MARTINGALE_CAP: f64 = 1000.0;

/// Timing errors on place-bet: 2 extra attempts, 500ms apart
pub const BET_MAX_RETRIES: u32 = 2;
pub const BET_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Cash-out retries are tighter, timing near the crash instant is fragile
pub const CASHOUT_MAX_RETRIES: u32 = 2;
pub const CASHOUT_RETRY_DELAY: Duration = Duration::from_millis(200);

// ============================================================================
// Runtime Configuration (loaded from environment)
// ============================================================================

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the game server, e.g. https://game.example.com
    pub api_url: String,
    /// Username override; falls back to the identity file when unset
    pub username: Option<String>,
    pub identity_path: PathBuf,
    pub starting_balance: f64,

    pub poll_interval: Duration,
    pub poll_timeout: Duration,

    // Demo mode
    pub demo_auto_probe: bool,
    pub demo_seed: Option<u64>,

    // Local read API
    pub api_enabled: bool,
    pub api_port: u16,
}

impl Config {
    /// Load configuration from `.env` and the process environment
    ///
    /// # Errors
    ///
    /// Returns errors with helpful messages if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("CRASH_API_URL").context(
            "CRASH_API_URL env var is required. Add it to your .env file.\n\
             Format: base URL of the game server\n\
             Example: CRASH_API_URL=https://game.example.com",
        )?;
        let api_url = api_url.trim().trim_end_matches('/').to_string();
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            anyhow::bail!(
                "CRASH_API_URL must start with http:// or https:// (found '{}')",
                api_url
            );
        }

        let username = match lookup("CRASH_USERNAME") {
            Some(raw) if !raw.trim().is_empty() => Some(
                crate::identity::validate_username(&raw)
                    .map_err(|e| anyhow::anyhow!("CRASH_USERNAME is invalid: {}", e))?,
            ),
            _ => None,
        };

        let starting_balance: f64 = parse_or(&lookup, "CRASH_START_BALANCE", 1000.0)?;
        if !starting_balance.is_finite() || starting_balance < 0.0 {
            anyhow::bail!(
                "CRASH_START_BALANCE must be a non-negative number (found {})",
                starting_balance
            );
        }

        let poll_interval_ms: u64 = parse_or(&lookup, "POLL_INTERVAL_MS", POLL_INTERVAL.as_millis() as u64)?;
        if poll_interval_ms == 0 {
            anyhow::bail!("POLL_INTERVAL_MS must be greater than zero");
        }
        let poll_timeout_secs: u64 = parse_or(&lookup, "POLL_TIMEOUT_SECS", POLL_TIMEOUT.as_secs())?;

        let demo_seed = match lookup("DEMO_SEED") {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u64>()
                    .with_context(|| format!("DEMO_SEED must be an unsigned integer (found '{}')", raw))?,
            ),
            None => None,
        };

        Ok(Self {
            api_url,
            username,
            identity_path: lookup("CRASH_IDENTITY_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".crash_identity.json")),
            starting_balance,
            poll_interval: Duration::from_millis(poll_interval_ms),
            poll_timeout: Duration::from_secs(poll_timeout_secs),
            demo_auto_probe: parse_bool(&lookup, "DEMO_AUTO_PROBE", true),
            demo_seed,
            api_enabled: parse_bool(&lookup, "API_ENABLED", false),
            api_port: parse_or(&lookup, "API_PORT", 8080)?,
        })
    }
}

/// Parse a value with default fallback when the key is absent
fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: '{}'", key, raw)),
        None => Ok(default),
    }
}

/// Parse boolean with support for "true", "1", "false", "0"
fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.eq_ignore_ascii_case("true") || v.trim() == "1")
        .unwrap_or(default)
}

// ============================================================================
// Tests
// ============================================================================
