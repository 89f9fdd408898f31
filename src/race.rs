//! Countdown race: a fixed number of competing parties and a deadline.
//!
//! [`CountdownRace::run`] builds one task per party from a factory, starts
//! them all, and blocks until every party has reported or the timeout
//! elapses. Each party counts down a shared latch when it finishes and, if
//! it failed, appends its failure to a shared list first.
//!
//! A timeout only ends the caller's wait. Parties still running are not
//! stopped, and their late results are discarded.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use scoped_async::{AsyncConfig, AsyncManager};
//!
//! let manager = AsyncManager::new(AsyncConfig::default()).unwrap();
//!
//! let result = manager.race().run(3, Some(Duration::from_secs(5)), |entry| {
//!     move || {
//!         if entry.is_last_entry() {
//!             Err("last one trips")
//!         } else {
//!             Ok(())
//!         }
//!     }
//! });
//!
//! let err = result.unwrap_err();
//! let race = err.as_race().unwrap();
//! assert!(!race.timed_out());
//! assert!(race.single_cause().unwrap().to_string().contains("last one trips"));
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};

use crate::config::PropagationConfig;
use crate::error::{AggregatedRaceFailure, AsyncError, Result};
use crate::latch::CountdownLatch;
use crate::manager::{AsyncManager, SpawnOptions};
use crate::task::{Task, TaskFailure};

/// What a party knows about its place in the race.
#[derive(Debug, Clone)]
pub struct RaceEntry {
    entry_number: usize,
    party_count: usize,
    lock_room: Arc<Mutex<()>>,
}

impl RaceEntry {
    /// 1-based position of this party.
    pub fn entry_number(&self) -> usize {
        self.entry_number
    }

    /// Number of parties in the race.
    pub fn party_count(&self) -> usize {
        self.party_count
    }

    /// Whether this is the highest-numbered party.
    pub fn is_last_entry(&self) -> bool {
        self.entry_number == self.party_count
    }

    /// Lock shared by every party of this race, for critical sections.
    pub fn lock_room(&self) -> MutexGuard<'_, ()> {
        self.lock_room.lock()
    }
}

/// Per-invocation state touched by the parties.
#[derive(Debug)]
struct RaceState {
    latch: CountdownLatch,
    failures: Mutex<Vec<TaskFailure>>,
}

/// Runs a fixed number of competing parties and waits for them.
#[derive(Debug, Clone)]
pub struct CountdownRace<'a> {
    manager: &'a AsyncManager,
    name: Option<String>,
    propagation: Option<PropagationConfig>,
}

impl<'a> CountdownRace<'a> {
    /// Create a race on `manager`.
    pub fn new(manager: &'a AsyncManager) -> Self {
        Self {
            manager,
            name: None,
            propagation: None,
        }
    }

    /// Name the race; parties are named `<name>#<entry_number>`.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Select which context fields each party receives.
    pub fn with_propagation(mut self, propagation: PropagationConfig) -> Self {
        self.propagation = Some(propagation);
        self
    }

    /// Run `party_count` parties, each built by `racer`, and wait.
    ///
    /// `timeout` of `None` falls back to the manager's
    /// [`default_race_timeout`](crate::AsyncConfig::default_race_timeout),
    /// and waits without limit if that is unset too. So does a timeout
    /// such as `Duration::MAX` that overflows the clock.
    ///
    /// # Errors
    ///
    /// - [`AsyncError::Argument`] if `party_count` is zero; nothing runs.
    /// - [`AsyncError::Race`] if any party failed, or if the deadline passed
    ///   first. In the latter case the causes are only the failures seen so
    ///   far, possibly none.
    pub fn run<F, T>(&self, party_count: usize, timeout: Option<Duration>, mut racer: F) -> Result<()>
    where
        F: FnMut(RaceEntry) -> T,
        T: Task,
    {
        if party_count == 0 {
            return Err(AsyncError::argument("party count must be at least 1"));
        }

        let timeout = timeout.or_else(|| self.manager.config().default_race_timeout());
        let state = Arc::new(RaceState {
            latch: CountdownLatch::new(party_count),
            failures: Mutex::new(Vec::new()),
        });
        let lock_room = Arc::new(Mutex::new(()));

        tracing::debug!(
            parties = party_count,
            timeout = ?timeout,
            "countdown race started"
        );

        // Parties start as soon as they are scheduled, so the deadline
        // starts counting with the first of them. A timeout too large to
        // represent as an instant waits without limit.
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        for entry_number in 1..=party_count {
            let entry = RaceEntry {
                entry_number,
                party_count,
                lock_room: Arc::clone(&lock_room),
            };
            let task = racer(entry);
            let state = Arc::clone(&state);
            self.manager
                .spawn_observed(task, self.options_for(entry_number), move |outcome| {
                    if let Err(failure) = outcome.result {
                        state.failures.lock().push(failure);
                    }
                    state.latch.count_down();
                })?;
        }

        let all_finished = state.latch.wait(deadline);
        let remaining = state.latch.remaining();
        let causes = std::mem::take(&mut *state.failures.lock());

        if all_finished && causes.is_empty() {
            tracing::debug!(parties = party_count, "countdown race finished");
            return Ok(());
        }

        let finished = party_count - remaining;
        if all_finished {
            tracing::warn!(
                parties = party_count,
                failed = causes.len(),
                "countdown race finished with failures"
            );
        } else {
            tracing::warn!(
                parties = party_count,
                remaining,
                failed = causes.len(),
                "countdown race timed out"
            );
        }

        Err(AsyncError::Race(AggregatedRaceFailure::new(
            causes,
            party_count,
            finished,
            !all_finished,
        )))
    }

    fn options_for(&self, entry_number: usize) -> SpawnOptions {
        SpawnOptions {
            name: self.name.as_ref().map(|name| format!("{name}#{entry_number}")),
            propagation: self.propagation,
        }
    }
}
