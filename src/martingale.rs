/// Martingale stake sizing
/// Doubles the last stake after a loss, capped at a maximum

pub use crate::settings::MARTINGALE_CAP as DEFAULT_CAP;

/// Compute the next stake from the stakes placed during the current loss streak
///
/// Returns `base_stake` when there is no history, otherwise twice the last
/// stake, never more than `cap`. The caller owns the history and clears it
/// after a win.
#[inline]
pub fn next_stake(previous_stakes: &[f64], base_stake: f64, cap: f64) -> f64 {
    match previous_stakes.last() {
        None => base_stake,
        Some(last) => (last * 2.0).min(cap),
    }
}
