//! Countdown latch shared by the coordinators.
//!
//! The remaining count is an atomic. Waiters sleep on a condition variable
//! and re-check the count under the gate mutex; `count_down` takes the same
//! mutex before notifying, so a decrement between the check and the sleep
//! cannot be missed. Deadlines are enforced by the same condition variable.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
pub(crate) struct CountdownLatch {
    remaining: AtomicUsize,
    gate: Mutex<()>,
    cond: Condvar,
}

impl CountdownLatch {
    pub(crate) fn new(count: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(count),
            gate: Mutex::new(()),
            cond: Condvar::new(),
        }
    }

    /// Decrement the count, waking waiters when it reaches zero.
    pub(crate) fn count_down(&self) {
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if previous == Ok(1) {
            let _gate = self.gate.lock();
            self.cond.notify_all();
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Block until the count reaches zero or `deadline` passes.
    ///
    /// Returns `true` if the count reached zero.
    pub(crate) fn wait(&self, deadline: Option<Instant>) -> bool {
        let mut gate = self.gate.lock();
        while self.remaining() > 0 {
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut gate, deadline).timed_out() {
                        return self.remaining() == 0;
                    }
                }
                None => self.cond.wait(&mut gate),
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn zero_count_is_open() {
        let latch = CountdownLatch::new(0);
        assert!(latch.wait(None));
        latch.count_down();
        assert_eq!(latch.remaining(), 0);
    }

    #[test]
    fn opens_after_all_count_down() {
        let latch = Arc::new(CountdownLatch::new(3));
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let latch = Arc::clone(&latch);
                std::thread::spawn(move || latch.count_down())
            })
            .collect();

        assert!(latch.wait(None));
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(latch.remaining(), 0);
    }

    #[test]
    fn times_out() {
        let latch = CountdownLatch::new(1);
        let start = Instant::now();
        assert!(!latch.wait(Some(start + Duration::from_millis(50))));
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(latch.remaining(), 1);
    }
}
