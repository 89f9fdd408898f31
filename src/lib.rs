//! Asynchronous task execution with request-scoped context propagation.
//!
//! Work scheduled through this crate runs on a worker thread but sees the
//! request context (cache map, access/identity, interceptor chain) that was
//! current on the thread that scheduled it, as it was at that moment. Two
//! coordinators build on that:
//!
//! - [`ParallelRunner`] fans out independent tasks and reports all failures
//!   in one error;
//! - [`CountdownRace`] runs a fixed number of parties and waits for all of
//!   them or a deadline, whichever comes first.
//!
//! # Overview
//!
//! ```text
//! caller thread ──capture──▶ ContextSnapshot ──move──▶ worker thread
//!                                                      install ─▶ run ─▶ clear
//!                                                                  │
//! caller thread ◀──── aggregated result ◀── coordinator ◀─ outcome ┘
//! ```
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use scoped_async::{AsyncConfig, AsyncManager};
//! use scoped_async::context::{current, AccessContext};
//!
//! let manager = AsyncManager::new(AsyncConfig::default()).unwrap();
//! current::set_access(Some(AccessContext::new("user-1")));
//!
//! manager
//!     .parallel()
//!     .run_each(0..4, |_| {
//!         || match current::access() {
//!             Some(access) if access.subject == "user-1" => Ok(()),
//!             _ => Err("context missing"),
//!         }
//!     })
//!     .unwrap();
//!
//! manager
//!     .race()
//!     .run(2, Some(Duration::from_secs(5)), |_| || Ok::<(), std::io::Error>(()))
//!     .unwrap();
//! # current::clear();
//! ```
//!
//! # Module Organization
//!
//! - [`context`] - Snapshot, propagator and the thread-local context
//! - [`manager`] - [`AsyncManager`], the scheduling entry point
//! - [`parallel`] - [`ParallelRunner`]
//! - [`race`] - [`CountdownRace`]
//! - [`task`] - [`Task`], outcomes and failures
//! - [`error`] - Aggregated errors
//! - [`sink`] - Process-wide sink for fire-and-forget failures
//! - [`config`] - TOML/environment configuration

pub mod config;
pub mod context;
pub mod error;
mod latch;
#[cfg(feature = "logging")]
pub mod logging;
pub mod manager;
pub mod parallel;
pub mod race;
pub mod sink;
pub mod task;

// Re-exports for ergonomic access
pub use config::{AsyncConfig, PropagationConfig};
pub use context::{AccessContext, ContextPropagator, ContextSnapshot, InterceptorChain};
pub use error::{AggregatedFailure, AggregatedRaceFailure, AsyncError, Result};
pub use manager::{AsyncManager, SpawnOptions};
pub use parallel::ParallelRunner;
pub use race::{CountdownRace, RaceEntry};
pub use task::{Task, TaskFailure, TaskId, TaskInfo, TaskOutcome};
