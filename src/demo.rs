//! Demo mode round simulator
//!
//! Offline stand-in for the server. [`DemoRoundGenerator`] is the pure part:
//! crash point draws and the compounding growth step. [`DemoSimulator`] runs
//! rounds off its own [`TimerSet`]:
//!
//! 1. `Waiting` for [`DEMO_COUNTDOWN_SECS`], one countdown step per second
//! 2. `Active`, multiplier ×[`DEMO_GROWTH_FACTOR`] every 100ms until it reaches the crash point
//! 3. `Crashed`, then a [`DEMO_PAUSE`] before the next countdown
//!
//! Snapshot timestamps come from a virtual clock advanced by each tick's
//! period, so they are monotonic and spaced like the real round.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::models::{now_ms, GameSnapshot, RoundPhase};
use crate::settings::{
    DEMO_COUNTDOWN_SECS, DEMO_COUNTDOWN_TICK, DEMO_CRASH_SPAN, DEMO_GROWTH_FACTOR, DEMO_GROWTH_TICK,
    DEMO_PAUSE,
};
use crate::timers::{TimerFired, TimerKind, TimerSet};

// ============================================================================
// Round generation
// ============================================================================

pub struct DemoRoundGenerator {
    rng: StdRng,
}

impl DemoRoundGenerator {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Uniform on [1, 1 + DEMO_CRASH_SPAN)
    pub fn next_crash_point(&mut self) -> f64 {
        1.0 + self.rng.gen_range(0.0..DEMO_CRASH_SPAN)
    }

    /// Play one round without timers
    pub fn simulate_round(&mut self) -> RoundSummary {
        let crash_point = self.next_crash_point();
        let mut multiplier = 1.0;
        let mut growth_ticks = 0;
        while let GrowthStep::Grew(next) = growth_step(multiplier, crash_point) {
            multiplier = next;
            growth_ticks += 1;
        }
        RoundSummary {
            crash_point,
            last_multiplier: multiplier,
            growth_ticks,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GrowthStep {
    Grew(f64),
    Crashed,
}

/// One 100ms growth step: crash when the compounded value reaches the crash point
pub fn growth_step(multiplier: f64, crash_point: f64) -> GrowthStep {
    let next = multiplier * DEMO_GROWTH_FACTOR;
    if next >= crash_point {
        GrowthStep::Crashed
    } else {
        GrowthStep::Grew(next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundSummary {
    pub crash_point: f64,
    /// Last multiplier shown while `Active`
    pub last_multiplier: f64,
    pub growth_ticks: u32,
}

impl RoundSummary {
    pub fn duration_ms(&self) -> u64 {
        (self.growth_ticks as u64 + 1) * DEMO_GROWTH_TICK.as_millis() as u64
    }
}

// ============================================================================
// Timer-driven simulator
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DemoPhase {
    Stopped,
    Countdown,
    Growing,
    Paused,
}

/// Output of one simulator timer
#[derive(Debug, Clone, PartialEq)]
pub enum DemoTick {
    Snapshot(GameSnapshot),
    /// The post-crash pause elapsed; the owner decides whether to begin another round
    PauseOver,
    Ignored,
}

pub struct DemoSimulator {
    generator: DemoRoundGenerator,
    timers: TimerSet,
    phase: DemoPhase,
    countdown: u32,
    multiplier: f64,
    crash_point: f64,
    clock_ms: i64,
    rounds: u64,
}

impl DemoSimulator {
    pub fn new(timers: TimerSet, seed: Option<u64>) -> Self {
        Self {
            generator: DemoRoundGenerator::new(seed),
            timers,
            phase: DemoPhase::Stopped,
            countdown: 0,
            multiplier: 1.0,
            crash_point: 1.0,
            clock_ms: 0,
            rounds: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase != DemoPhase::Stopped
    }

    /// Timers currently owned by the simulator
    pub fn active_timers(&self) -> usize {
        self.timers.active()
    }

    pub fn rounds_started(&self) -> u64 {
        self.rounds
    }

    /// Start with a fresh countdown
    pub fn start(&mut self) -> GameSnapshot {
        self.timers.cancel_all();
        self.clock_ms = self.clock_ms.max(now_ms());
        info!("Demo simulator started");
        self.begin_round()
    }

    /// Cancel every simulator timer
    pub fn stop(&mut self) {
        if self.phase == DemoPhase::Stopped {
            return;
        }
        self.timers.cancel_all();
        self.phase = DemoPhase::Stopped;
        info!(rounds = self.rounds, "Demo simulator stopped");
    }

    /// Enter a new countdown; called on start and after each pause
    pub fn begin_round(&mut self) -> GameSnapshot {
        self.timers.cancel_all();
        self.phase = DemoPhase::Countdown;
        self.countdown = DEMO_COUNTDOWN_SECS;
        self.multiplier = 1.0;
        self.crash_point = self.generator.next_crash_point();
        self.rounds += 1;
        self.timers.every(TimerKind::DemoCountdown, DEMO_COUNTDOWN_TICK);
        debug!(round = self.rounds, "Demo countdown started");
        self.snapshot(RoundPhase::Waiting)
    }

    pub fn on_timer(&mut self, fired: &TimerFired) -> DemoTick {
        if !self.timers.accept(fired) {
            return DemoTick::Ignored;
        }
        match (fired.kind, self.phase) {
            (TimerKind::DemoCountdown, DemoPhase::Countdown) => {
                self.clock_ms += DEMO_COUNTDOWN_TICK.as_millis() as i64;
                self.countdown = self.countdown.saturating_sub(1);
                if self.countdown > 0 {
                    return DemoTick::Snapshot(self.snapshot(RoundPhase::Waiting));
                }
                self.timers.cancel(TimerKind::DemoCountdown);
                self.phase = DemoPhase::Growing;
                self.timers.every(TimerKind::DemoGrowth, DEMO_GROWTH_TICK);
                DemoTick::Snapshot(self.snapshot(RoundPhase::Active))
            }
            (TimerKind::DemoGrowth, DemoPhase::Growing) => {
                self.clock_ms += DEMO_GROWTH_TICK.as_millis() as i64;
                match growth_step(self.multiplier, self.crash_point) {
                    GrowthStep::Grew(next) => {
                        self.multiplier = next;
                        DemoTick::Snapshot(self.snapshot(RoundPhase::Active))
                    }
                    GrowthStep::Crashed => {
                        self.timers.cancel(TimerKind::DemoGrowth);
                        self.multiplier = self.crash_point;
                        self.phase = DemoPhase::Paused;
                        self.timers.after(TimerKind::DemoPause, DEMO_PAUSE);
                        debug!(crash_point = self.crash_point, "Demo round crashed");
                        DemoTick::Snapshot(self.snapshot(RoundPhase::Crashed))
                    }
                }
            }
            (TimerKind::DemoPause, DemoPhase::Paused) => {
                self.clock_ms += DEMO_PAUSE.as_millis() as i64;
                DemoTick::PauseOver
            }
            _ => DemoTick::Ignored,
        }
    }

    fn snapshot(&self, state: RoundPhase) -> GameSnapshot {
        GameSnapshot {
            state,
            multiplier: self.multiplier,
            countdown: if state == RoundPhase::Waiting { self.countdown } else { 0 },
            crash_point: (state == RoundPhase::Crashed).then_some(self.crash_point),
            players: Vec::new(),
            timestamp: self.clock_ms,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
