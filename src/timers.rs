/// Cancellable timer registry
/// Every periodic or one-shot timer the engine runs is a spawned tokio task
/// owned by a `TimerSet`. Firings are delivered as `TimerFired` messages on the
/// engine's timer channel. Cancelled timers are aborted and any firing already
/// in the channel is recognised as stale by its token.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Snapshot poll
    Poll,
    /// Demo countdown, 1s
    DemoCountdown,
    /// Demo multiplier growth, 100ms
    DemoGrowth,
    /// Demo post-crash pause, one-shot
    DemoPause,
    /// Display multiplier extrapolation between polls
    Extrapolate,
}

impl TimerKind {
    fn is_periodic(self) -> bool {
        !matches!(self, TimerKind::DemoPause)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub kind: TimerKind,
    pub token: u64,
}

struct Scheduled {
    kind: TimerKind,
    token: u64,
    handle: JoinHandle<()>,
}

pub struct TimerSet {
    tx: mpsc::UnboundedSender<TimerFired>,
    next_token: u64,
    scheduled: Vec<Scheduled>,
}

impl TimerSet {
    pub fn new(tx: mpsc::UnboundedSender<TimerFired>) -> Self {
        Self {
            tx,
            next_token: 0,
            scheduled: Vec::new(),
        }
    }

    /// Fire every `period`, first after `first`
    pub fn every_from(&mut self, kind: TimerKind, first: Duration, period: Duration) {
        let token = self.token();
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(TimerFired { kind, token }).is_err() {
                    break;
                }
            }
        });
        self.scheduled.push(Scheduled { kind, token, handle });
    }

    pub fn every(&mut self, kind: TimerKind, period: Duration) {
        self.every_from(kind, period, period);
    }

    /// Fire once after `delay`
    pub fn after(&mut self, kind: TimerKind, delay: Duration) {
        let token = self.token();
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(TimerFired { kind, token });
        });
        self.scheduled.push(Scheduled { kind, token, handle });
    }

    /// Whether a firing belongs to a live timer of this set. One-shot timers
    /// are retired on acceptance.
    pub fn accept(&mut self, fired: &TimerFired) -> bool {
        let Some(pos) = self
            .scheduled
            .iter()
            .position(|s| s.kind == fired.kind && s.token == fired.token)
        else {
            return false;
        };
        if !fired.kind.is_periodic() {
            self.scheduled.swap_remove(pos);
        }
        true
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        self.scheduled.retain(|s| {
            if s.kind == kind {
                s.handle.abort();
                false
            } else {
                true
            }
        });
    }

    pub fn cancel_all(&mut self) {
        for s in self.scheduled.drain(..) {
            s.handle.abort();
        }
    }

    pub fn is_active(&self, kind: TimerKind) -> bool {
        self.scheduled.iter().any(|s| s.kind == kind)
    }

    /// Number of live timers
    pub fn active(&self) -> usize {
        self.scheduled.len()
    }

    fn token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_periodic_timer_fires_each_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerSet::new(tx);
        timers.every_from(TimerKind::Poll, Duration::ZERO, Duration::from_secs(3));

        let first = rx.recv().await.unwrap();
        assert!(timers.accept(&first));

        tokio::time::advance(Duration::from_secs(3)).await;
        let second = rx.recv().await.unwrap();
        assert_eq!(second.kind, TimerKind::Poll);
        assert!(timers.accept(&second));
        assert_eq!(timers.active(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_stops_delivery_and_invalidates_queued() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerSet::new(tx);
        timers.every_from(TimerKind::DemoGrowth, Duration::ZERO, Duration::from_millis(100));
        let queued = rx.recv().await.unwrap();

        timers.cancel_all();
        assert_eq!(timers.active(), 0);
        assert!(!timers.accept(&queued));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_retired_after_accept() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerSet::new(tx);
        timers.after(TimerKind::DemoPause, Duration::from_secs(5));

        let fired = rx.recv().await.unwrap();
        assert!(timers.accept(&fired));
        assert!(!timers.accept(&fired));
        assert!(!timers.is_active(TimerKind::DemoPause));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_single_kind() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut timers = TimerSet::new(tx);
        timers.every(TimerKind::DemoCountdown, Duration::from_secs(1));
        timers.every(TimerKind::Extrapolate, Duration::from_millis(100));
        timers.cancel(TimerKind::DemoCountdown);
        assert!(!timers.is_active(TimerKind::DemoCountdown));
        assert!(timers.is_active(TimerKind::Extrapolate));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        {
            let mut timers = TimerSet::new(tx);
            timers.every(TimerKind::Poll, Duration::from_secs(1));
        }
        tokio::time::sleep(Duration::from_secs(3)).await;
        // All senders dropped with the aborted tasks
        assert!(rx.recv().await.is_none());
    }
}
