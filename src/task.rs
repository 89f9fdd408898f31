//! Units of work and their outcomes.
//!
//! A [`Task`] is a zero-argument unit of work that either succeeds with no
//! value or fails. Any `FnOnce() -> Result<(), E>` closure where `E` converts
//! into a boxed error is a task:
//!
//! ```
//! use scoped_async::task::Task;
//!
//! fn assert_task<T: Task>(_: T) {}
//!
//! assert_task(|| -> Result<(), std::io::Error> { Ok(()) });
//! assert_task(|| Err::<(), _>("nope"));
//! ```
//!
//! Each scheduled task produces exactly one [`TaskOutcome`].

use std::any::Any;
use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Boxed error type accepted from task bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A heap-allocated task, for mixing different closures in one collection.
pub type BoxedTask = Box<dyn FnOnce() -> Result<(), BoxError> + Send + 'static>;

/// Box a closure so tasks of different types can share a `Vec`.
///
/// ```
/// use scoped_async::task::{boxed, BoxedTask};
///
/// let tasks: Vec<BoxedTask> = vec![
///     boxed(|| Ok::<(), std::io::Error>(())),
///     boxed(|| Err::<(), _>("failed")),
/// ];
/// assert_eq!(tasks.len(), 2);
/// ```
pub fn boxed<F, E>(f: F) -> BoxedTask
where
    F: FnOnce() -> Result<(), E> + Send + 'static,
    E: Into<BoxError>,
{
    Box::new(move || f().map_err(Into::into))
}

/// A zero-argument unit of work with no return value.
pub trait Task: Send + 'static {
    /// Run the task, consuming it.
    fn run(self: Box<Self>) -> Result<(), BoxError>;
}

impl<F, E> Task for F
where
    F: FnOnce() -> Result<(), E> + Send + 'static,
    E: Into<BoxError>,
{
    fn run(self: Box<Self>) -> Result<(), BoxError> {
        (*self)().map_err(Into::into)
    }
}

/// Unique identifier assigned to every scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generate a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Identity of a scheduled task, used in logs and failure reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Assigned id.
    pub id: TaskId,
    /// Optional caller-supplied name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl TaskInfo {
    /// Info for an anonymous task with a fresh id.
    pub fn new() -> Self {
        Self {
            id: TaskId::new(),
            name: None,
        }
    }

    /// Info for a named task with a fresh id.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(),
            name: Some(name.into()),
        }
    }
}

impl Default for TaskInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "'{name}' ({})", self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// A failure captured from a task body.
#[derive(Debug, Error)]
pub enum TaskFailure {
    /// The task returned an error.
    #[error("task {info} failed: {source}")]
    Error {
        /// The failing task.
        info: TaskInfo,
        /// The error it returned.
        #[source]
        source: BoxError,
    },

    /// The task panicked.
    #[error("task {info} panicked: {message}")]
    Panic {
        /// The failing task.
        info: TaskInfo,
        /// The panic payload, when it was a string.
        message: String,
    },

    /// The task was discarded by the worker facility before it could run.
    #[error("task {info} was dropped before it ran")]
    Abandoned {
        /// The discarded task.
        info: TaskInfo,
    },
}

impl TaskFailure {
    /// The task this failure belongs to.
    pub fn info(&self) -> &TaskInfo {
        match self {
            Self::Error { info, .. } | Self::Panic { info, .. } | Self::Abandoned { info } => info,
        }
    }

    /// Whether the task panicked rather than returning an error.
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panic { .. })
    }

    /// Downcast the returned error to a concrete type.
    ///
    /// Returns `None` for panics, abandoned tasks, or a type mismatch.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::Error { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }

    pub(crate) fn from_panic(info: TaskInfo, payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panic { info, message }
    }
}

/// The result of one task execution.
#[derive(Debug)]
pub struct TaskOutcome {
    /// The task that ran.
    pub info: TaskInfo,
    /// When the task finished, after its context was disposed.
    pub finished_at: Instant,
    /// Success or the captured failure.
    pub result: Result<(), TaskFailure>,
}

impl TaskOutcome {
    /// Whether the task succeeded.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Take the failure out of the outcome, if any.
    pub fn into_failure(self) -> Option<TaskFailure> {
        self.result.err()
    }
}
