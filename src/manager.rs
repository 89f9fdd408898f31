//! Scheduling tasks on worker threads with propagated context.
//!
//! [`AsyncManager`] is the entry point of the crate. Scheduling a task:
//!
//! 1. captures a [`ContextSnapshot`] of the calling thread (the slice selected
//!    by [`SpawnOptions::propagation`]);
//! 2. moves the snapshot and the task into a job on the worker pool;
//! 3. on the worker, installs the snapshot, runs the interceptor hooks and
//!    the task body, then clears the context;
//! 4. reports the outcome to the caller-supplied observer, or to the
//!    [unhandled-failure sink](crate::sink) when nobody is observing.
//!
//! Task errors and panics are both captured in step 3; neither escapes the
//! worker thread, which stays available for the next task.
//!
//! # Examples
//!
//! ```
//! use scoped_async::{AsyncConfig, AsyncManager};
//! use scoped_async::context::{current, AccessContext};
//!
//! let manager = AsyncManager::new(AsyncConfig::default()).unwrap();
//! current::set_access(Some(AccessContext::new("user-1")));
//!
//! let (tx, rx) = std::sync::mpsc::channel();
//! manager
//!     .spawn(move || {
//!         let subject = current::access().map(|a| a.subject);
//!         tx.send(subject).ok();
//!         Ok::<(), std::io::Error>(())
//!     })
//!     .unwrap();
//!
//! assert_eq!(rx.recv().unwrap().as_deref(), Some("user-1"));
//! # current::clear();
//! ```
//!
//! # Threads
//!
//! Task bodies run on the blocking pool of a dedicated tokio runtime, sized
//! by [`AsyncConfig::max_threads`]. The coordinators block their caller, so
//! calling them from inside a task on a saturated pool deadlocks.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};

use crate::config::{AsyncConfig, PropagationConfig};
use crate::context::{current, ContextPropagator, ContextSnapshot};
use crate::error::{AsyncError, Result};
use crate::parallel::ParallelRunner;
use crate::race::CountdownRace;
use crate::sink;
use crate::task::{Task, TaskFailure, TaskId, TaskInfo, TaskOutcome};

static GLOBAL: OnceLock<AsyncManager> = OnceLock::new();

/// Per-task scheduling options.
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    /// Name shown in logs and failure reports.
    pub name: Option<String>,
    /// Context fields to propagate. `None` uses the manager's configuration.
    pub propagation: Option<PropagationConfig>,
}

impl SpawnOptions {
    /// Options with a task name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            propagation: None,
        }
    }

    /// Select which context fields to propagate.
    pub fn with_propagation(mut self, propagation: PropagationConfig) -> Self {
        self.propagation = Some(propagation);
        self
    }
}

type Observer = Box<dyn FnOnce(TaskOutcome) + Send + 'static>;

/// Delivers a task's outcome exactly once.
///
/// If the job is dropped without running, the observer still hears about
/// it, as [`TaskFailure::Abandoned`].
struct OutcomeReporter {
    info: TaskInfo,
    observer: Option<Observer>,
}

impl OutcomeReporter {
    fn report(mut self, result: std::result::Result<(), TaskFailure>) {
        if let Some(observer) = self.observer.take() {
            observer(TaskOutcome {
                info: self.info.clone(),
                finished_at: Instant::now(),
                result,
            });
        }
    }
}

impl Drop for OutcomeReporter {
    fn drop(&mut self) {
        if let Some(observer) = self.observer.take() {
            tracing::warn!(task_id = %self.info.id, "async task dropped before it ran");
            observer(TaskOutcome {
                info: self.info.clone(),
                finished_at: Instant::now(),
                result: Err(TaskFailure::Abandoned {
                    info: self.info.clone(),
                }),
            });
        }
    }
}

/// Schedules tasks on worker threads with the caller's context.
pub struct AsyncManager {
    config: AsyncConfig,
    handle: Handle,
    runtime: Mutex<Option<Runtime>>,
    accepting: AtomicBool,
}

impl AsyncManager {
    /// Build a manager with its own worker pool.
    pub fn new(config: AsyncConfig) -> Result<Self> {
        config.validate()?;

        // Task bodies only ever run on the blocking pool; one driver thread
        // is enough for the runtime itself.
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(config.max_threads)
            .thread_name(config.thread_name.clone())
            .thread_keep_alive(config.keep_alive())
            .build()?;

        tracing::debug!(
            max_threads = config.max_threads,
            thread_name = %config.thread_name,
            "async manager started"
        );

        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
            accepting: AtomicBool::new(true),
            config,
        })
    }

    /// Process-wide manager, built on first use from [`AsyncConfig::load`].
    ///
    /// A configuration that fails to load is logged and replaced by the
    /// defaults.
    pub fn global() -> Result<&'static AsyncManager> {
        if let Some(manager) = GLOBAL.get() {
            return Ok(manager);
        }
        let config = AsyncConfig::load().unwrap_or_else(|e| {
            tracing::warn!("falling back to default async config: {}", e);
            AsyncConfig::default()
        });
        let manager = Self::new(config)?;
        Ok(GLOBAL.get_or_init(|| manager))
    }

    /// The configuration this manager was built with.
    pub fn config(&self) -> &AsyncConfig {
        &self.config
    }

    /// Whether the manager still accepts work.
    pub fn is_running(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Schedule a fire-and-forget task.
    ///
    /// Returns as soon as the task is queued; it may not have started yet.
    /// A failure is reported to the [unhandled-failure sink](crate::sink).
    pub fn spawn<T: Task>(&self, task: T) -> Result<TaskId> {
        self.spawn_with(task, SpawnOptions::default())
    }

    /// Schedule a fire-and-forget task with options.
    pub fn spawn_with<T: Task>(&self, task: T, options: SpawnOptions) -> Result<TaskId> {
        self.submit(Box::new(task), options, None)
    }

    /// Schedule a task and hand its outcome to `observer`.
    ///
    /// The observer runs on the worker thread after the task's context has
    /// been cleared. It is called exactly once, even if the job is discarded
    /// before it runs.
    pub fn spawn_observed<T, F>(&self, task: T, options: SpawnOptions, observer: F) -> Result<TaskId>
    where
        T: Task,
        F: FnOnce(TaskOutcome) + Send + 'static,
    {
        self.submit(Box::new(task), options, Some(Box::new(observer)))
    }

    /// A parallel runner on this manager.
    pub fn parallel(&self) -> ParallelRunner<'_> {
        ParallelRunner::new(self)
    }

    /// A countdown race on this manager.
    pub fn race(&self) -> CountdownRace<'_> {
        CountdownRace::new(self)
    }

    /// Stop accepting work and wait for running tasks.
    ///
    /// Waits up to [`AsyncConfig::shutdown_timeout`]; tasks still running
    /// after that are left to finish on their own. Calling it again is a
    /// no-op.
    ///
    /// Inside an async context blocking is not allowed, so the manager
    /// stops in the background without waiting.
    pub fn shutdown(&self) {
        self.accepting.store(false, Ordering::Release);
        if let Some(runtime) = self.runtime.lock().take() {
            if Handle::try_current().is_ok() {
                tracing::debug!("async manager shutting down in the background");
                runtime.shutdown_background();
            } else {
                tracing::debug!("async manager shutting down");
                runtime.shutdown_timeout(self.config.shutdown_timeout());
            }
        }
    }

    fn submit(
        &self,
        task: Box<dyn Task>,
        options: SpawnOptions,
        observer: Option<Observer>,
    ) -> Result<TaskId> {
        if let Some(name) = &options.name {
            if name.trim().is_empty() {
                return Err(AsyncError::argument("task name must not be blank"));
            }
        }
        if !self.is_running() {
            return Err(AsyncError::ShutDown);
        }

        let propagation = options.propagation.unwrap_or(self.config.propagation);
        let snapshot = ContextSnapshot::capture_selected(&propagation);
        let info = TaskInfo {
            id: TaskId::new(),
            name: options.name,
        };
        let task_id = info.id;
        let reporter = observer.map(|observer| OutcomeReporter {
            info: info.clone(),
            observer: Some(observer),
        });
        let log_lifecycle = self.config.log_task_lifecycle;

        self.handle.spawn_blocking(move || {
            let span = tracing::info_span!(
                "async_task",
                task_id = %info.id,
                task_name = info.name.as_deref().unwrap_or("")
            );
            let _entered = span.enter();
            if log_lifecycle {
                tracing::debug!("async task started");
            }

            let result = {
                let _installed = ContextPropagator::install(snapshot);
                execute(task, &info)
            };

            if log_lifecycle {
                tracing::debug!(success = result.is_ok(), "async task finished");
            }

            match reporter {
                Some(reporter) => reporter.report(result),
                None => {
                    if let Err(failure) = result {
                        sink::report_unhandled(&failure);
                    }
                }
            }
        });

        Ok(task_id)
    }
}

/// Run interceptor hooks and the task body on the current thread.
///
/// A panic anywhere in the sequence, hooks included, becomes
/// [`TaskFailure::Panic`].
fn execute(task: Box<dyn Task>, info: &TaskInfo) -> std::result::Result<(), TaskFailure> {
    panic::catch_unwind(AssertUnwindSafe(|| run_hooked(task, info))).unwrap_or_else(|payload| {
        tracing::warn!(task_id = %info.id, "interceptor panicked");
        Err(TaskFailure::from_panic(info.clone(), payload.as_ref()))
    })
}

fn run_hooked(task: Box<dyn Task>, info: &TaskInfo) -> std::result::Result<(), TaskFailure> {
    let chain = current::interceptors();

    if let Some(chain) = &chain {
        if let Err(source) = chain.before_task(info) {
            let failure = TaskFailure::Error {
                info: info.clone(),
                source,
            };
            chain.after_task(info, Some(&failure));
            return Err(failure);
        }
    }

    let result = match panic::catch_unwind(AssertUnwindSafe(|| task.run())) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(TaskFailure::Error {
            info: info.clone(),
            source,
        }),
        Err(payload) => Err(TaskFailure::from_panic(info.clone(), payload.as_ref())),
    };

    if let Some(chain) = &chain {
        chain.after_task(info, result.as_ref().err());
    }

    result
}

impl Drop for AsyncManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for AsyncManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncManager")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish()
    }
}
