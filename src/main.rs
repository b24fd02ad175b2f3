/// crash_client - Main entry point
/// Runs the sync engine against the game server, falls back to demo rounds
/// when the server is unreachable, and takes bet/cash-out commands on stdin

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use crash_sync::api::{start_api_server, ApiConfig};
use crash_sync::autoplay::{run_autoplay, AutoBetConfig};
use crash_sync::events::spawn_notifier;
use crash_sync::identity::{validate_username, FileIdentityStore};
use crash_sync::models::RoundPhase;
use crash_sync::settings::{Config, ACTION_TIMEOUT, MIN_AUTO_CASHOUT};
use crash_sync::wallet::LocalWallet;
use crash_sync::{Engine, EngineConfig, EngineEvent, EngineHandle, HttpGameApi, NotificationKind};

#[derive(Parser, Debug)]
#[command(name = "crash_client")]
#[command(about = "Crash game client with offline demo fallback")]
struct Args {
    /// Start in demo mode without waiting for failover
    #[arg(long)]
    demo: bool,

    /// Username for this session (overrides CRASH_USERNAME and the identity file)
    #[arg(long)]
    username: Option<String>,

    /// Let the martingale auto-bettor play every round
    #[arg(long)]
    auto_bet: bool,

    /// Auto-bettor base stake
    #[arg(long, default_value = "10")]
    base_stake: f64,

    /// Auto-bettor cash-out target
    #[arg(long, default_value = "2.0")]
    target: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("crash_sync=info")),
        )
        .init();

    let mut cfg = Config::from_env()?;
    if let Some(name) = &args.username {
        cfg.username = Some(validate_username(name).map_err(|e| anyhow!("--username is invalid: {}", e))?);
    }
    if args.auto_bet && (args.base_stake <= 0.0 || args.target < MIN_AUTO_CASHOUT) {
        anyhow::bail!(
            "--base-stake must be positive and --target at least {:.2}",
            MIN_AUTO_CASHOUT
        );
    }

    let api = Arc::new(
        HttpGameApi::with_timeouts(&cfg.api_url, cfg.poll_timeout, ACTION_TIMEOUT)
            .context("Failed to create HTTP client")?,
    );
    let wallet = Arc::new(LocalWallet::new(cfg.starting_balance));
    let identity = Arc::new(FileIdentityStore::new(cfg.identity_path.clone()));

    let (engine, handle) = Engine::new(EngineConfig::from(&cfg), api, wallet, identity);
    let _notifier = spawn_notifier(handle.subscribe(), print_notice);
    let _printer = tokio::spawn(print_events(handle.subscribe()));
    let engine_task = tokio::spawn(engine.run());

    println!("Game server: {}", cfg.api_url);
    println!("Starting balance: {:.2}", cfg.starting_balance);

    if args.demo {
        handle.enter_demo().await?;
    }

    // Start HTTP API server (if enabled)
    let api_handle = if cfg.api_enabled {
        let api_config = ApiConfig {
            enabled: true,
            port: cfg.api_port,
        };
        match start_api_server(api_config, handle.view()).await {
            Ok(h) => {
                println!("HTTP API server started on http://127.0.0.1:{}", cfg.api_port);
                println!("  - GET /health - Health check");
                println!("  - GET /state - Full engine view");
                println!("  - GET /history?limit=N - Crash history");
                Some(h)
            }
            Err(e) => {
                eprintln!("Warning: Failed to start API server: {}", e);
                None
            }
        }
    } else {
        None
    };

    if args.auto_bet {
        let config = AutoBetConfig::new(args.base_stake, args.target);
        println!(
            "Auto-bettor enabled: base {:.2}, target {:.2}x, cap {:.0}",
            config.base_stake, config.target, config.cap
        );
        tokio::spawn(run_autoplay(handle.clone(), config));
    }

    print_help();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !run_command(&handle, line.trim()).await {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("\nReceived shutdown signal, shutting down...");
                break;
            }
        }
    }

    let final_view = handle.current();
    let _ = handle.shutdown().await;
    engine_task.await.context("Engine task panicked")?;
    if let Some(h) = api_handle {
        h.abort();
    }

    println!("Final balance: {:.2}", final_view.balance);
    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  bet <amount> [auto]  - join the next round (auto cash-out default 2.0)");
    println!("  cashout              - cash out the running bet");
    println!("  user <name>          - set and remember your username");
    println!("  demo | online        - switch mode");
    println!("  status               - show round, balance and history");
    println!("  quit");
}

/// Returns false when the console should exit
async fn run_command(handle: &EngineHandle, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    match parts.next() {
        None => {}
        Some("bet") => {
            let amount = parts.next().and_then(|s| s.parse::<f64>().ok());
            let auto = parts.next().and_then(|s| s.parse::<f64>().ok()).unwrap_or(2.0);
            let Some(amount) = amount else {
                println!("Usage: bet <amount> [auto]");
                return true;
            };
            let handle = handle.clone();
            // Rejections arrive as notices
            tokio::spawn(async move {
                if let Ok(bet) = handle.place_bet(amount, auto).await {
                    println!("✅ Bet {:.2} @ {:.2}x confirmed for round {}", bet.amount, bet.auto_cashout_multiplier, bet.round);
                }
            });
        }
        Some("cashout") | Some("c") => {
            let handle = handle.clone();
            tokio::spawn(async move {
                let _ = handle.cashout().await;
            });
        }
        Some("user") => match parts.next() {
            Some(name) => match handle.set_username(name).await {
                Ok(name) => println!("Username set to {}", name),
                Err(e) => println!("❌ {}", e),
            },
            None => println!("Usage: user <name>"),
        },
        Some("demo") => {
            let _ = handle.enter_demo().await;
        }
        Some("online") => {
            let _ = handle.go_online().await;
        }
        Some("status") => print_status(handle),
        Some("quit") | Some("exit") | Some("q") => return false,
        Some("help") => print_help(),
        Some(other) => println!("Unknown command '{}', type help", other),
    }
    true
}

fn print_status(handle: &EngineHandle) {
    let view = handle.current();
    println!("{}", "=".repeat(50));
    println!(
        "Mode: {}  Phase: {}  Round: {}",
        view.connection.mode, view.state.phase, view.state.round
    );
    println!(
        "Multiplier: {:.2}x  Players online: {}",
        view.display_multiplier, view.online_players
    );
    println!(
        "User: {}  Balance: {:.2}",
        view.username.as_deref().unwrap_or("-"),
        view.balance
    );
    if let Some(bet) = &view.state.active_bet {
        println!("Bet: {:.2} ({:?}) round {}", bet.amount, bet.status, bet.round);
    }
    let recent: Vec<String> = view
        .history
        .iter()
        .take(10)
        .map(|h| format!("{:.2}x", h.value))
        .collect();
    println!("History: {}", recent.join(" "));
    println!("{}", "=".repeat(50));
}

fn print_notice(kind: NotificationKind, message: &str) {
    match kind {
        NotificationKind::Info => println!("ℹ️ {}", message),
        NotificationKind::Success => println!("💰 {}", message),
        NotificationKind::Warning => println!("⚠️ {}", message),
        NotificationKind::Error => eprintln!("❌ {}", message),
    }
}

async fn print_events(mut rx: broadcast::Receiver<EngineEvent>) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        };
        match event {
            EngineEvent::PhaseChanged {
                phase: RoundPhase::Waiting,
                round,
            } => println!("⏳ Round {} open for bets", round),
            EngineEvent::PhaseChanged {
                phase: RoundPhase::Active,
                round,
            } => println!("🚀 Round {} started", round),
            EngineEvent::RoundCrashed {
                crash_point,
                lost_bet,
                ..
            } => match lost_bet {
                Some(bet) => println!("💥 Crashed at {:.2}x, lost {:.2}", crash_point, bet.amount),
                None => println!("💥 Crashed at {:.2}x", crash_point),
            },
            EngineEvent::BetLost(bet) => println!("Bet of {:.2} lost", bet.amount),
            EngineEvent::ConnectionModeChanged { from, to, .. } => {
                println!("🔌 {} -> {}", from, to)
            }
            _ => {}
        }
    }
}
