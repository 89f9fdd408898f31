//! Fan out independent tasks and aggregate their failures.
//!
//! [`ParallelRunner::run`] schedules every task at once, blocks until all of
//! them have reported, and then either returns `Ok(())` or a single
//! [`AsyncError::Parallel`] holding every failure. A failing task does not
//! stop its siblings; there is no cancellation of started work.
//!
//! # Examples
//!
//! ```
//! use scoped_async::{AsyncConfig, AsyncManager};
//! use scoped_async::task::{boxed, BoxedTask};
//!
//! let manager = AsyncManager::new(AsyncConfig::default()).unwrap();
//!
//! let tasks: Vec<BoxedTask> = vec![
//!     boxed(|| Ok::<(), std::io::Error>(())),
//!     boxed(|| Err::<(), _>("disk full")),
//! ];
//!
//! let err = manager.parallel().run(tasks).unwrap_err();
//! let failure = err.as_parallel().unwrap();
//! assert_eq!(failure.causes().len(), 1);
//! assert!(failure.first_cause().unwrap().to_string().contains("disk full"));
//! ```

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::config::PropagationConfig;
use crate::error::{AggregatedFailure, AsyncError, Result};
use crate::latch::CountdownLatch;
use crate::manager::{AsyncManager, SpawnOptions};
use crate::task::{Task, TaskFailure};

/// A failure together with what is needed to order it.
#[derive(Debug)]
struct RecordedFailure {
    finished_at: Instant,
    index: usize,
    failure: TaskFailure,
}

/// Shared between the waiting caller and the workers of one run.
#[derive(Debug)]
struct Scoreboard {
    latch: CountdownLatch,
    failures: Mutex<Vec<RecordedFailure>>,
}

/// Runs a set of independent tasks concurrently.
#[derive(Debug, Clone)]
pub struct ParallelRunner<'a> {
    manager: &'a AsyncManager,
    name: Option<String>,
    propagation: Option<PropagationConfig>,
}

impl<'a> ParallelRunner<'a> {
    /// Create a runner on `manager`.
    pub fn new(manager: &'a AsyncManager) -> Self {
        Self {
            manager,
            name: None,
            propagation: None,
        }
    }

    /// Name the run; tasks are named `<name>#<index>`.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Select which context fields each task receives.
    pub fn with_propagation(mut self, propagation: PropagationConfig) -> Self {
        self.propagation = Some(propagation);
        self
    }

    /// Run every task and wait for all of them.
    ///
    /// An empty sequence succeeds immediately. With failures, the returned
    /// [`AggregatedFailure`] lists them in completion order (ties by
    /// submission order); its first cause is the earliest.
    ///
    /// If the manager stops accepting work part way through scheduling, the
    /// error is returned at once and the tasks already scheduled keep running.
    pub fn run<I, T>(&self, tasks: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Task,
    {
        let tasks: Vec<T> = tasks.into_iter().collect();
        let total = tasks.len();
        if total == 0 {
            return Ok(());
        }

        tracing::debug!(
            tasks = total,
            run = self.name.as_deref().unwrap_or(""),
            "parallel run started"
        );

        let board = Arc::new(Scoreboard {
            latch: CountdownLatch::new(total),
            failures: Mutex::new(Vec::new()),
        });

        for (index, task) in tasks.into_iter().enumerate() {
            let board = Arc::clone(&board);
            self.manager
                .spawn_observed(task, self.options_for(index), move |outcome| {
                    if let Err(failure) = outcome.result {
                        board.failures.lock().push(RecordedFailure {
                            finished_at: outcome.finished_at,
                            index,
                            failure,
                        });
                    }
                    board.latch.count_down();
                })?;
        }

        board.latch.wait(None);

        let mut recorded = std::mem::take(&mut *board.failures.lock());
        if recorded.is_empty() {
            tracing::debug!(tasks = total, "parallel run succeeded");
            return Ok(());
        }

        recorded.sort_by_key(|r| (r.finished_at, r.index));
        let causes: Vec<TaskFailure> = recorded.into_iter().map(|r| r.failure).collect();
        tracing::warn!(
            tasks = total,
            failed = causes.len(),
            "parallel run finished with failures"
        );
        Err(AsyncError::Parallel(AggregatedFailure::new(causes, total)))
    }

    /// Build one task per item with `f` and run them.
    ///
    /// ```
    /// use scoped_async::{AsyncConfig, AsyncManager};
    ///
    /// let manager = AsyncManager::new(AsyncConfig::default()).unwrap();
    /// let result = manager.parallel().run_each(1..=3, |n| {
    ///     move || if n == 2 { Err("two") } else { Ok(()) }
    /// });
    /// assert_eq!(result.unwrap_err().as_parallel().unwrap().causes().len(), 1);
    /// ```
    pub fn run_each<I, F, T>(&self, items: I, f: F) -> Result<()>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> T,
        T: Task,
    {
        self.run(items.into_iter().map(f))
    }

    fn options_for(&self, index: usize) -> SpawnOptions {
        SpawnOptions {
            name: self.name.as_ref().map(|name| format!("{name}#{index}")),
            propagation: self.propagation,
        }
    }
}
