//! Error types for scheduling and coordinating tasks.
//!
//! Individual task failures are represented by [`TaskFailure`] and never
//! escape a worker thread on their own. Callers of the coordinators only ever
//! see one [`AsyncError`] per invocation, which carries the aggregate:
//! [`AggregatedFailure`] for the parallel runner and
//! [`AggregatedRaceFailure`] for the countdown race.
//!
//! # Examples
//!
//! ```
//! use scoped_async::error::AsyncError;
//!
//! let err = AsyncError::argument("party count must be at least 1");
//! assert!(err.is_argument());
//! assert!(err.to_string().contains("party count"));
//! ```

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::task::TaskFailure;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AsyncError>;

/// Errors surfaced to the caller of an entry point.
#[derive(Debug, Error)]
pub enum AsyncError {
    /// Invalid input supplied synchronously; nothing was scheduled.
    #[error("invalid argument: {reason}")]
    Argument {
        /// What was wrong with the input.
        reason: String,
    },

    /// The manager has been shut down and no longer accepts work.
    #[error("async manager is shut down")]
    ShutDown,

    /// The worker runtime could not be started.
    #[error("failed to start worker runtime: {0}")]
    Startup(#[from] std::io::Error),

    /// Configuration could not be loaded or was invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// One or more tasks of a parallel run failed.
    #[error(transparent)]
    Parallel(AggregatedFailure),

    /// A countdown race ended with failures or timed out.
    #[error(transparent)]
    Race(AggregatedRaceFailure),
}

impl AsyncError {
    /// Create an [`AsyncError::Argument`].
    pub fn argument(reason: impl Into<String>) -> Self {
        Self::Argument {
            reason: reason.into(),
        }
    }

    /// Returns `true` for [`AsyncError::Argument`].
    pub fn is_argument(&self) -> bool {
        matches!(self, Self::Argument { .. })
    }

    /// Returns the aggregated parallel failure, if this is one.
    pub fn as_parallel(&self) -> Option<&AggregatedFailure> {
        match self {
            Self::Parallel(failure) => Some(failure),
            _ => None,
        }
    }

    /// Returns the aggregated race failure, if this is one.
    pub fn as_race(&self) -> Option<&AggregatedRaceFailure> {
        match self {
            Self::Race(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Failures collected from a parallel run.
///
/// Causes are kept in completion order. The first cause is not tracked
/// separately; it is simply the head of that list.
#[derive(Debug)]
pub struct AggregatedFailure {
    causes: Vec<TaskFailure>,
    total: usize,
}

impl AggregatedFailure {
    /// Build an aggregate from causes already in completion order.
    ///
    /// `total` is the number of tasks that took part, failed or not.
    pub fn new(causes: Vec<TaskFailure>, total: usize) -> Self {
        Self { causes, total }
    }

    /// The earliest-completed failure.
    pub fn first_cause(&self) -> Option<&TaskFailure> {
        self.causes.first()
    }

    /// Every failure, in completion order.
    pub fn causes(&self) -> &[TaskFailure] {
        &self.causes
    }

    /// Consume the aggregate, returning the causes.
    pub fn into_causes(self) -> Vec<TaskFailure> {
        self.causes
    }

    /// Number of tasks that ran.
    pub fn total(&self) -> usize {
        self.total
    }
}

impl fmt::Display for AggregatedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} parallel tasks failed",
            self.causes.len(),
            self.total
        )?;
        if let Some(first) = self.first_cause() {
            write!(f, "; first cause: {first}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregatedFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.first_cause()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

/// Failures collected from a countdown race.
///
/// A race fails either because every party reported and at least one of
/// them failed, or because the deadline passed first. [`timed_out`] records
/// which of the two happened. On timeout the cause list only holds the
/// failures observed before the deadline; parties still running (or that
/// succeeded late) are not represented.
///
/// [`timed_out`]: AggregatedRaceFailure::timed_out
#[derive(Debug)]
pub struct AggregatedRaceFailure {
    causes: Vec<TaskFailure>,
    party_count: usize,
    finished: usize,
    timed_out: bool,
}

impl AggregatedRaceFailure {
    pub(crate) fn new(
        causes: Vec<TaskFailure>,
        party_count: usize,
        finished: usize,
        timed_out: bool,
    ) -> Self {
        Self {
            causes,
            party_count,
            finished,
            timed_out,
        }
    }

    /// The earliest failure reported by any party.
    pub fn first_cause(&self) -> Option<&TaskFailure> {
        self.causes.first()
    }

    /// The only cause, when exactly one party failed.
    pub fn single_cause(&self) -> Option<&TaskFailure> {
        match self.causes.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    /// Every failure observed, in completion order.
    pub fn causes(&self) -> &[TaskFailure] {
        &self.causes
    }

    /// Consume the aggregate, returning the causes.
    pub fn into_causes(self) -> Vec<TaskFailure> {
        self.causes
    }

    /// Number of parties in the race.
    pub fn party_count(&self) -> usize {
        self.party_count
    }

    /// Number of parties that had reported when the wait ended.
    pub fn finished(&self) -> usize {
        self.finished
    }

    /// Whether the wait ended because the deadline passed.
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }
}

impl fmt::Display for AggregatedRaceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.timed_out {
            write!(
                f,
                "countdown race timed out with {} of {} parties finished and {} failure(s)",
                self.finished,
                self.party_count,
                self.causes.len()
            )?;
        } else {
            write!(
                f,
                "countdown race failed: {} of {} parties failed",
                self.causes.len(),
                self.party_count
            )?;
        }
        if let Some(first) = self.first_cause() {
            write!(f, "; first cause: {first}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregatedRaceFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.first_cause()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}
