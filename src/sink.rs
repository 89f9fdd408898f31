//! Process-wide sink for failures nobody is waiting on.
//!
//! A task scheduled with [`AsyncManager::spawn`](crate::AsyncManager::spawn)
//! has no caller to report to. When it fails, the failure goes to the sink
//! installed here. The default sink logs it with `tracing::error!`.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use scoped_async::sink::{self, UnhandledFailureSink};
//! use scoped_async::task::TaskFailure;
//!
//! struct Alerting;
//!
//! impl UnhandledFailureSink for Alerting {
//!     fn on_unhandled(&self, failure: &TaskFailure) {
//!         eprintln!("background task failed: {failure}");
//!     }
//! }
//!
//! let previous = sink::set_unhandled_failure_sink(Arc::new(Alerting));
//! assert!(previous.is_none());
//! sink::reset_unhandled_failure_sink();
//! ```

use std::sync::Arc;

use parking_lot::RwLock;

use crate::task::TaskFailure;

/// Receives failures of fire-and-forget tasks.
pub trait UnhandledFailureSink: Send + Sync {
    /// Called on the worker thread, after the task's context was disposed.
    fn on_unhandled(&self, failure: &TaskFailure);
}

/// Default sink: logs at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

impl UnhandledFailureSink for LoggingSink {
    fn on_unhandled(&self, failure: &TaskFailure) {
        let info = failure.info();
        tracing::error!(
            task_id = %info.id,
            task_name = info.name.as_deref().unwrap_or(""),
            panic = failure.is_panic(),
            "unhandled async task failure: {}",
            failure
        );
    }
}

static SINK: RwLock<Option<Arc<dyn UnhandledFailureSink>>> = parking_lot::const_rwlock(None);

/// Install a custom sink, returning the previously installed one.
pub fn set_unhandled_failure_sink(
    sink: Arc<dyn UnhandledFailureSink>,
) -> Option<Arc<dyn UnhandledFailureSink>> {
    SINK.write().replace(sink)
}

/// Go back to [`LoggingSink`].
pub fn reset_unhandled_failure_sink() {
    SINK.write().take();
}

pub(crate) fn report_unhandled(failure: &TaskFailure) {
    // Sink runs outside the lock.
    let sink = SINK.read().clone();
    match sink {
        Some(sink) => sink.on_unhandled(failure),
        None => LoggingSink.on_unhandled(failure),
    }
}
