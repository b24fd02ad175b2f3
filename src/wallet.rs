/// Balance collaborator
/// The engine only reads the balance and applies signed deltas to it;
/// the economy that owns the coins lives outside this crate.

use std::sync::atomic::{AtomicU64, Ordering};

pub trait Wallet: Send + Sync + 'static {
    fn balance(&self) -> f64;
    /// Apply a signed delta
    fn add_balance(&self, amount: f64);
}

/// In-process wallet
#[derive(Debug)]
pub struct LocalWallet {
    bits: AtomicU64,
}

impl LocalWallet {
    pub fn new(balance: f64) -> Self {
        Self {
            bits: AtomicU64::new(balance.to_bits()),
        }
    }
}

impl Default for LocalWallet {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Wallet for LocalWallet {
    fn balance(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    fn add_balance(&self, amount: f64) {
        if !amount.is_finite() {
            return;
        }
        let _ = self
            .bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some((f64::from_bits(bits) + amount).to_bits())
            });
    }
}
