//! Interceptor chain carried across threads.
//!
//! Interceptors are cross-cutting hooks the request layer registers for the
//! current request: SQL logging, auditing, metrics. When a task is scheduled
//! the chain travels with the context snapshot, and the worker runs the hooks
//! around the task body:
//!
//! 1. `before_task()` for each interceptor, lowest priority first
//! 2. the task body
//! 3. `after_task()` for each interceptor, in reverse order
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use scoped_async::context::{InterceptorChain, TaskInterceptor};
//! use scoped_async::task::{BoxError, TaskFailure, TaskInfo};
//!
//! struct Audit;
//!
//! impl TaskInterceptor for Audit {
//!     fn before_task(&self, info: &TaskInfo) -> Result<(), BoxError> {
//!         tracing::info!("starting {}", info);
//!         Ok(())
//!     }
//!
//!     fn after_task(&self, info: &TaskInfo, failure: Option<&TaskFailure>) {
//!         tracing::info!("finished {} (failed: {})", info, failure.is_some());
//!     }
//! }
//!
//! let chain = InterceptorChain::new().with(Arc::new(Audit));
//! assert_eq!(chain.len(), 1);
//! ```

use std::fmt;
use std::sync::Arc;

use crate::task::{BoxError, TaskFailure, TaskInfo};

/// Hooks run around a task body on the worker thread.
pub trait TaskInterceptor: Send + Sync {
    /// Called before the task body runs.
    ///
    /// Returning an error skips the body (and the remaining `before_task`
    /// hooks); the error becomes the task's failure.
    fn before_task(&self, info: &TaskInfo) -> Result<(), BoxError> {
        let _ = info;
        Ok(())
    }

    /// Called after the task body, with its failure if it had one.
    fn after_task(&self, info: &TaskInfo, failure: Option<&TaskFailure>) {
        let _ = (info, failure);
    }

    /// Priority for ordering (lower runs first). Default is 50.
    fn priority(&self) -> i32 {
        50
    }

    /// Name used in log lines.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Ordered, immutable-once-shared list of interceptors.
///
/// Cloning is cheap: the interceptors themselves are behind `Arc`.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn TaskInterceptor>>,
}

impl InterceptorChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an interceptor, keeping the chain sorted by priority.
    pub fn add(&mut self, interceptor: Arc<dyn TaskInterceptor>) {
        self.interceptors.push(interceptor);
        self.interceptors.sort_by_key(|i| i.priority());
    }

    /// Builder form of [`add`](Self::add).
    pub fn with(mut self, interceptor: Arc<dyn TaskInterceptor>) -> Self {
        self.add(interceptor);
        self
    }

    /// Number of interceptors.
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// Whether the chain has no interceptors.
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Interceptor names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    /// Run every `before_task` hook, stopping at the first error.
    pub(crate) fn before_task(&self, info: &TaskInfo) -> Result<(), BoxError> {
        for interceptor in &self.interceptors {
            if let Err(e) = interceptor.before_task(info) {
                tracing::warn!(
                    task_id = %info.id,
                    interceptor = interceptor.name(),
                    "interceptor rejected task: {}",
                    e
                );
                return Err(e);
            }
        }
        Ok(())
    }

    /// Run every `after_task` hook in reverse order.
    pub(crate) fn after_task(&self, info: &TaskInfo, failure: Option<&TaskFailure>) {
        for interceptor in self.interceptors.iter().rev() {
            interceptor.after_task(info, failure);
        }
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("interceptors", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recording {
        label: &'static str,
        priority: i32,
        log: Arc<Mutex<Vec<String>>>,
        reject: bool,
    }

    impl TaskInterceptor for Recording {
        fn before_task(&self, _info: &TaskInfo) -> Result<(), BoxError> {
            self.log.lock().push(format!("before:{}", self.label));
            if self.reject {
                return Err("rejected".into());
            }
            Ok(())
        }

        fn after_task(&self, _info: &TaskInfo, failure: Option<&TaskFailure>) {
            self.log
                .lock()
                .push(format!("after:{}:{}", self.label, failure.is_some()));
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn name(&self) -> &str {
            self.label
        }
    }

    fn recording(
        label: &'static str,
        priority: i32,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> Arc<Recording> {
        Arc::new(Recording {
            label,
            priority,
            log: Arc::clone(log),
            reject: false,
        })
    }

    #[test]
    fn hooks_run_in_priority_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new()
            .with(recording("late", 90, &log))
            .with(recording("early", 10, &log));

        assert_eq!(chain.names(), vec!["early", "late"]);

        let info = TaskInfo::new();
        chain.before_task(&info).unwrap();
        chain.after_task(&info, None);

        assert_eq!(
            *log.lock(),
            vec![
                "before:early",
                "before:late",
                "after:late:false",
                "after:early:false"
            ]
        );
    }

    #[test]
    fn rejection_short_circuits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new()
            .with(Arc::new(Recording {
                label: "gate",
                priority: 10,
                log: Arc::clone(&log),
                reject: true,
            }))
            .with(recording("never", 20, &log));

        let err = chain.before_task(&TaskInfo::new()).unwrap_err();
        assert_eq!(err.to_string(), "rejected");
        assert_eq!(*log.lock(), vec!["before:gate"]);
    }

    #[test]
    fn debug_lists_names() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new().with(recording("sql-log", 50, &log));
        assert!(format!("{chain:?}").contains("sql-log"));
        assert!(!chain.is_empty());
    }
}
