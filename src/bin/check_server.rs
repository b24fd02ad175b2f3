// check_server.rs - One-shot connectivity and status check against the game server
//
// Usage:
//   cargo run --bin check_server                            # uses CRASH_API_URL
//   cargo run --bin check_server -- --url http://localhost:3000
//   cargo run --bin check_server -- --username ann          # use the sync action

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::time::Instant;

use crash_sync::game_api::{GameApi, HttpGameApi};
use crash_sync::identity::validate_username;
use crash_sync::reconcile::{Reconciled, Reconciler};

#[derive(Parser)]
#[command(name = "check_server")]
#[command(about = "Check that the game server is reachable and returns sane data")]
struct Args {
    /// Server base URL (defaults to CRASH_API_URL)
    #[arg(long)]
    url: Option<String>,

    /// Poll with the sync action as this user
    #[arg(long)]
    username: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let url = match args.url {
        Some(url) => url,
        None => std::env::var("CRASH_API_URL")
            .context("Pass --url or set CRASH_API_URL in your .env file")?,
    };
    let api = HttpGameApi::new(&url).context("Failed to create HTTP client")?;

    println!("Checking {} ...", api.base_url());
    let started = Instant::now();
    let result = match &args.username {
        Some(name) => {
            let name = validate_username(name).map_err(|e| anyhow!("--username is invalid: {}", e))?;
            api.sync(&name).await
        }
        None => api.fetch_status().await,
    };
    let elapsed_ms = started.elapsed().as_millis();

    let status = match result {
        Ok(status) => status,
        Err(e) => {
            println!("❌ FAILED after {}ms", elapsed_ms);
            println!("   Class: {}", e.class());
            println!("   Error: {}", e);
            anyhow::bail!("server check failed");
        }
    };

    println!("✅ Reachable ({}ms)", elapsed_ms);
    println!("{}", "=".repeat(50));
    let game = &status.game_state;
    println!("{:<20} {}", "Phase", game.state);
    println!("{:<20} {:.2}x", "Multiplier", game.multiplier);
    println!("{:<20} {}", "Countdown", game.countdown);
    if let Some(cp) = game.crash_point {
        println!("{:<20} {:.2}x", "Crash point", cp);
    }
    println!("{:<20} {}", "Players in round", game.players.len());
    println!("{:<20} {}", "Online players", status.online_players);
    println!("{:<20} {}", "History entries", status.history.len());
    println!("{:<20} {}", "Recent cashouts", status.cashouts.len());
    println!("{}", "=".repeat(50));

    let raw_history = status.history.len();
    let mut reconciler = Reconciler::new();
    let update = reconciler.accept_status(status);
    match update.snapshot {
        Reconciled::Corrupted { repair, .. } => {
            println!("⚠️ Snapshot failed sanity checks: {}", repair.error_data.message);
            anyhow::bail!("server returned corrupted data");
        }
        _ => println!("Snapshot passes sanity checks"),
    }
    if update.new_history > 0 {
        let history = reconciler.history();
        let recent: Vec<String> = history.iter().take(10).map(|h| format!("{:.2}x", h.value)).collect();
        println!(
            "History after dedup: {} of {} ({})",
            history.len(),
            raw_history,
            recent.join(" ")
        );
    }
    Ok(())
}
