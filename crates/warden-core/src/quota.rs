//! Atomic quota reservations.
//!
//! A quota check that reads a counter and increments it later can be raced
//! by concurrent requests. `QuotaHold::try_reserve` closes that window with a
//! compare-and-swap loop: the check and the increment are one atomic step.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Units reserved against a shared counter.
///
/// Dropping a hold without calling `commit` gives the units back, so a
/// request blocked or failed after the constraint stage never consumes
/// quota.
#[derive(Debug)]
pub struct QuotaHold {
    quota_id: String,
    counter: Arc<AtomicU64>,
    units: u64,
    settled: bool,
}

impl QuotaHold {
    /// Atomically add `units` to `counter` if the result stays within
    /// `limit`. Returns `None` when the reservation would exceed it.
    pub fn try_reserve(
        quota_id: impl Into<String>,
        counter: &Arc<AtomicU64>,
        units: u64,
        limit: u64,
    ) -> Option<Self> {
        let mut current = counter.load(Ordering::Acquire);
        loop {
            let next = current.checked_add(units)?;
            if next > limit {
                return None;
            }
            match counter.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
        Some(Self {
            quota_id: quota_id.into(),
            counter: Arc::clone(counter),
            units,
            settled: false,
        })
    }

    pub fn quota_id(&self) -> &str {
        &self.quota_id
    }

    pub fn units(&self) -> u64 {
        self.units
    }

    /// Keep the reserved units consumed.
    pub fn commit(mut self) {
        self.settled = true;
    }

    /// Give the reserved units back now.
    pub fn release(self) {}
}

impl Drop for QuotaHold {
    fn drop(&mut self) {
        if !self.settled {
            self.counter.fetch_sub(self.units, Ordering::AcqRel);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use super::QuotaHold;

    #[test]
    fn reserve_within_limit_then_commit() {
        let counter = Arc::new(AtomicU64::new(0));
        let hold = QuotaHold::try_reserve("q", &counter, 3, 10).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        hold.commit();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn dropped_hold_returns_units() {
        let counter = Arc::new(AtomicU64::new(8));
        {
            let _hold = QuotaHold::try_reserve("q", &counter, 2, 10).unwrap();
            assert_eq!(counter.load(Ordering::SeqCst), 10);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn reservation_past_limit_is_refused() {
        let counter = Arc::new(AtomicU64::new(9));
        assert!(QuotaHold::try_reserve("q", &counter, 2, 10).is_none());
        assert_eq!(counter.load(Ordering::SeqCst), 9);
    }

    /// Many threads racing for the last two units: exactly two win.
    #[test]
    fn concurrent_reservations_never_overshoot() {
        let counter = Arc::new(AtomicU64::new(8));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || {
                    QuotaHold::try_reserve("q", &counter, 1, 10).map(QuotaHold::commit).is_some()
                })
            })
            .collect();

        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(granted, 2);
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }
}
