// demo_rounds.rs - Offline statistics over simulated demo rounds
//
// Usage:
//   cargo run --bin demo_rounds                          # 1000 rounds, random seed
//   cargo run --bin demo_rounds -- --rounds 5000 --seed 42
//   cargo run --bin demo_rounds -- --target 1.5 --base-stake 5
//   cargo run --bin demo_rounds -- --format json

use anyhow::Result;
use clap::Parser;
use serde::Serialize;

use crash_sync::demo::{DemoRoundGenerator, RoundSummary};
use crash_sync::martingale::next_stake;
use crash_sync::models::{HistoryColor, HistoryEntry};
use crash_sync::settings::{DEMO_COUNTDOWN_SECS, DEMO_PAUSE, MARTINGALE_CAP};

#[derive(Parser)]
#[command(name = "demo_rounds")]
#[command(about = "Simulate demo rounds and backtest a martingale cash-out target")]
struct Args {
    /// Number of rounds to simulate
    #[arg(long, default_value = "1000")]
    rounds: u32,

    /// RNG seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Martingale base stake
    #[arg(long, default_value = "10")]
    base_stake: f64,

    /// Cash-out target multiplier
    #[arg(long, default_value = "2.0")]
    target: f64,

    /// Starting balance for the backtest
    #[arg(long, default_value = "1000")]
    balance: f64,

    /// Output format: table, json
    #[arg(long, default_value = "table")]
    format: String,
}

#[derive(Debug, Serialize)]
struct CrashStats {
    rounds: u32,
    min: f64,
    max: f64,
    mean: f64,
    median: f64,
    green_pct: f64,
    mean_active_ms: f64,
    mean_cycle_ms: f64,
}

#[derive(Debug, Serialize)]
struct Backtest {
    target: f64,
    base_stake: f64,
    wins: u32,
    losses: u32,
    longest_streak: usize,
    largest_stake: f64,
    final_balance: f64,
    /// Round at which the balance could no longer cover the next stake
    busted_at: Option<u32>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.rounds == 0 {
        anyhow::bail!("--rounds must be greater than zero");
    }
    if args.base_stake <= 0.0 || args.target <= 1.0 {
        anyhow::bail!("--base-stake must be positive and --target above 1.0");
    }

    let mut generator = DemoRoundGenerator::new(args.seed);
    let rounds: Vec<RoundSummary> = (0..args.rounds).map(|_| generator.simulate_round()).collect();

    let stats = crash_stats(&rounds);
    let backtest = backtest(&rounds, &args);

    match args.format.to_lowercase().as_str() {
        "json" => println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "crashes": stats,
                "backtest": backtest,
            }))?
        ),
        _ => print_table(&stats, &backtest, &rounds),
    }
    Ok(())
}

fn crash_stats(rounds: &[RoundSummary]) -> CrashStats {
    let mut points: Vec<f64> = rounds.iter().map(|r| r.crash_point).collect();
    points.sort_by(|a, b| a.total_cmp(b));
    let n = points.len() as f64;

    let green = rounds
        .iter()
        .filter(|r| HistoryColor::for_value(r.crash_point) == HistoryColor::Green)
        .count();
    let mean_active_ms = rounds.iter().map(|r| r.duration_ms() as f64).sum::<f64>() / n;
    let fixed_ms = (DEMO_COUNTDOWN_SECS as u64 * 1000 + DEMO_PAUSE.as_millis() as u64) as f64;

    CrashStats {
        rounds: rounds.len() as u32,
        min: points.first().copied().unwrap_or(0.0),
        max: points.last().copied().unwrap_or(0.0),
        mean: points.iter().sum::<f64>() / n,
        median: points[points.len() / 2],
        green_pct: green as f64 / n * 100.0,
        mean_active_ms,
        mean_cycle_ms: mean_active_ms + fixed_ms,
    }
}

/// A round is won when the multiplier passes the target before the crash
fn backtest(rounds: &[RoundSummary], args: &Args) -> Backtest {
    let mut balance = args.balance;
    let mut streak: Vec<f64> = Vec::new();
    let mut result = Backtest {
        target: args.target,
        base_stake: args.base_stake,
        wins: 0,
        losses: 0,
        longest_streak: 0,
        largest_stake: 0.0,
        final_balance: balance,
        busted_at: None,
    };

    for (i, round) in rounds.iter().enumerate() {
        let stake = if streak.is_empty() {
            args.base_stake
        } else {
            next_stake(&streak, args.base_stake, MARTINGALE_CAP)
        };
        if stake > balance {
            result.busted_at = Some(i as u32 + 1);
            break;
        }
        result.largest_stake = result.largest_stake.max(stake);
        balance -= stake;

        if round.last_multiplier >= args.target {
            balance += stake * args.target;
            result.wins += 1;
            streak.clear();
        } else {
            result.losses += 1;
            streak.push(stake);
            result.longest_streak = result.longest_streak.max(streak.len());
        }
    }

    result.final_balance = balance;
    result
}

fn print_table(stats: &CrashStats, backtest: &Backtest, rounds: &[RoundSummary]) {
    println!("\n=== DEMO ROUNDS ===\n");
    println!("{}", "=".repeat(70));
    println!("{:<30} {:>15}", "Rounds", stats.rounds);
    println!("{:<30} {:>14.2}x", "Min crash", stats.min);
    println!("{:<30} {:>14.2}x", "Max crash", stats.max);
    println!("{:<30} {:>14.2}x", "Mean crash", stats.mean);
    println!("{:<30} {:>14.2}x", "Median crash", stats.median);
    println!("{:<30} {:>14.1}%", "Green (>= 2.00x)", stats.green_pct);
    println!("{:<30} {:>13.0}ms", "Mean active phase", stats.mean_active_ms);
    println!("{:<30} {:>13.0}ms", "Mean full cycle", stats.mean_cycle_ms);
    println!("{}", "=".repeat(70));

    let recent: Vec<String> = rounds
        .iter()
        .rev()
        .take(10)
        .enumerate()
        .map(|(i, r)| {
            let entry = HistoryEntry::new(r.crash_point, i as i64);
            let marker = match entry.color {
                HistoryColor::Green => "+",
                HistoryColor::Red => "-",
            };
            format!("{}{:.2}x", marker, entry.value)
        })
        .collect();
    println!("Last rounds: {}", recent.join(" "));

    println!("\n=== MARTINGALE BACKTEST ===\n");
    println!("{}", "=".repeat(70));
    println!("{:<30} {:>14.2}x", "Target", backtest.target);
    println!("{:<30} {:>15.2}", "Base stake", backtest.base_stake);
    println!("{:<30} {:>15}", "Wins", backtest.wins);
    println!("{:<30} {:>15}", "Losses", backtest.losses);
    println!("{:<30} {:>15}", "Longest loss streak", backtest.longest_streak);
    println!("{:<30} {:>15.2}", "Largest stake", backtest.largest_stake);
    println!("{:<30} {:>15.2}", "Final balance", backtest.final_balance);
    match backtest.busted_at {
        Some(round) => println!("{:<30} {:>15}", "Busted at round", round),
        None => println!("{:<30} {:>15}", "Busted", "no"),
    }
    println!("{}", "=".repeat(70));
}
