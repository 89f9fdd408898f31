//! Integration tests for context propagation onto worker threads.
//!
//! Covers snapshot fidelity (the worker sees the context as it was at
//! submission), isolation in both directions, disposal on reused worker
//! threads, propagation selection, and interceptor hooks.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use scoped_async::context::{current, AccessContext, CacheMap, InterceptorChain, TaskInterceptor};
use scoped_async::task::{boxed, BoxError, TaskFailure, TaskInfo};
use scoped_async::{AsyncConfig, AsyncManager, PropagationConfig, SpawnOptions};

const WAIT: Duration = Duration::from_secs(5);

fn cache_with(key: &str, value: serde_json::Value) -> CacheMap {
    let mut cache = CacheMap::new();
    cache.insert(key.to_string(), value);
    cache
}

mod fidelity_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_worker_sees_access_at_capture_time() {
        let manager = AsyncManager::new(AsyncConfig::development()).unwrap();
        current::clear();
        current::set_access(Some(AccessContext::new("V")));

        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let (seen_tx, seen_rx) = mpsc::channel();
        manager
            .spawn(move || {
                // Hold the body until the caller has reassigned its context.
                gate_rx.recv().ok();
                seen_tx.send(current::access()).ok();
                Ok::<(), anyhow::Error>(())
            })
            .unwrap();

        current::set_access(Some(AccessContext::new("V'")));
        gate_tx.send(()).unwrap();

        let seen = seen_rx.recv_timeout(WAIT).unwrap();
        assert_eq!(seen.map(|a| a.subject), Some("V".to_string()));
        assert_eq!(current::access().unwrap().subject, "V'");
        current::clear();
    }

    #[test]
    fn test_absent_fields_stay_absent() {
        let manager = AsyncManager::new(AsyncConfig::development()).unwrap();
        current::clear();
        current::set_cache(Some(cache_with("locale", json!("ja"))));

        let (tx, rx) = mpsc::channel();
        manager
            .spawn(move || {
                tx.send((current::cache(), current::access(), current::interceptors().is_some()))
                    .ok();
                Ok::<(), anyhow::Error>(())
            })
            .unwrap();

        let (cache, access, has_interceptors) = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(cache, Some(cache_with("locale", json!("ja"))));
        assert_eq!(access, None);
        assert!(!has_interceptors);
        current::clear();
    }
}

mod isolation_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_worker_cache_mutation_does_not_reach_caller() {
        let manager = AsyncManager::new(AsyncConfig::development()).unwrap();
        current::clear();
        current::set_cache(Some(cache_with("count", json!(1))));

        manager
            .parallel()
            .run(vec![boxed(|| {
                current::with_cache_mut(|cache| cache.insert("count".to_string(), json!(2)));
                current::with_cache_mut(|cache| cache.insert("worker".to_string(), json!(true)));
                match current::cache() {
                    Some(cache) if cache["count"] == json!(2) => Ok(()),
                    _ => Err("worker did not see its own write"),
                }
            })])
            .unwrap();

        assert_eq!(current::cache(), Some(cache_with("count", json!(1))));
        current::clear();
    }

    #[test]
    fn test_selection_limits_what_is_propagated() {
        let manager = AsyncManager::new(AsyncConfig::development()).unwrap();
        current::clear();
        current::set_cache(Some(cache_with("k", json!("v"))));
        current::set_access(Some(AccessContext::new("u")));

        let (tx, rx) = mpsc::channel();
        manager
            .spawn_with(
                move || {
                    tx.send((current::cache().is_some(), current::access().is_some()))
                        .ok();
                    Ok::<(), anyhow::Error>(())
                },
                SpawnOptions::named("access-only").with_propagation(PropagationConfig {
                    cache: false,
                    access: true,
                    interceptors: false,
                }),
            )
            .unwrap();

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), (false, true));
        current::clear();
    }

    #[test]
    fn test_config_default_selection() {
        let manager = AsyncManager::new(AsyncConfig {
            propagation: PropagationConfig {
                cache: true,
                access: false,
                interceptors: true,
            },
            ..AsyncConfig::development()
        })
        .unwrap();
        current::clear();
        current::set_access(Some(AccessContext::new("u")));

        let (tx, rx) = mpsc::channel();
        manager
            .spawn(move || {
                tx.send(current::access()).ok();
                Ok::<(), anyhow::Error>(())
            })
            .unwrap();

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), None);
        current::clear();
    }
}

mod disposal_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reused_worker_has_no_residue() {
        let manager = AsyncManager::new(AsyncConfig::single_worker()).unwrap();
        let threads: Arc<Mutex<Vec<ThreadId>>> = Arc::new(Mutex::new(Vec::new()));

        current::clear();
        current::set_access(Some(AccessContext::new("first")));
        current::set_cache(Some(cache_with("request", json!("first"))));

        let recorder = Arc::clone(&threads);
        manager
            .parallel()
            .run(vec![boxed(move || {
                recorder.lock().push(std::thread::current().id());
                if current::access().is_none() {
                    return Err("first task lost its context");
                }
                Ok(())
            })])
            .unwrap();

        current::clear();

        let recorder = Arc::clone(&threads);
        manager
            .parallel()
            .run(vec![boxed(move || {
                recorder.lock().push(std::thread::current().id());
                if current::is_empty() {
                    Ok(())
                } else {
                    Err("context left behind by the previous task")
                }
            })])
            .unwrap();

        let threads = threads.lock();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0], threads[1], "single worker should be reused");
    }

    #[test]
    fn test_context_is_cleared_after_failure() {
        let manager = AsyncManager::new(AsyncConfig::single_worker()).unwrap();
        current::clear();
        current::set_access(Some(AccessContext::new("doomed")));

        let failed = manager.parallel().run(vec![boxed(|| -> Result<(), BoxError> {
            panic!("task failed mid-flight")
        })]);
        assert!(failed.unwrap_err().as_parallel().unwrap().causes()[0].is_panic());

        current::clear();
        manager
            .parallel()
            .run(vec![boxed(|| {
                if current::is_empty() {
                    Ok(())
                } else {
                    Err("panicking task left context behind")
                }
            })])
            .unwrap();
    }

    #[test]
    fn test_worker_threads_use_configured_name() {
        let manager = AsyncManager::new(AsyncConfig {
            thread_name: "req-async".to_string(),
            ..AsyncConfig::development()
        })
        .unwrap();

        let (tx, rx) = mpsc::channel();
        manager
            .spawn(move || {
                tx.send(std::thread::current().name().map(str::to_string))
                    .ok();
                Ok::<(), anyhow::Error>(())
            })
            .unwrap();

        assert_eq!(rx.recv_timeout(WAIT).unwrap().as_deref(), Some("req-async"));
    }
}

mod interceptor_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Recording {
        log: Arc<Mutex<Vec<String>>>,
        reject: bool,
    }

    impl TaskInterceptor for Recording {
        fn before_task(&self, info: &TaskInfo) -> Result<(), BoxError> {
            let thread = std::thread::current().name().unwrap_or("").to_string();
            self.log.lock().push(format!(
                "before:{}:{}",
                info.name.as_deref().unwrap_or(""),
                thread
            ));
            if self.reject {
                return Err("not allowed".into());
            }
            Ok(())
        }

        fn after_task(&self, info: &TaskInfo, failure: Option<&TaskFailure>) {
            self.log.lock().push(format!(
                "after:{}:{}",
                info.name.as_deref().unwrap_or(""),
                failure.is_some()
            ));
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    #[test]
    fn test_hooks_run_around_task_on_worker() {
        let manager = AsyncManager::new(AsyncConfig::development()).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        current::clear();
        current::set_interceptors(Some(InterceptorChain::new().with(Arc::new(Recording {
            log: Arc::clone(&log),
            reject: false,
        }))));

        let body_log = Arc::clone(&log);
        manager
            .parallel()
            .named("audited")
            .run(vec![boxed(move || {
                body_log.lock().push("body".to_string());
                Ok::<(), anyhow::Error>(())
            })])
            .unwrap();

        assert_eq!(
            *log.lock(),
            vec![
                "before:audited#0:scoped-async-worker".to_string(),
                "body".to_string(),
                "after:audited#0:false".to_string(),
            ]
        );
        current::clear();
    }

    struct PanicsAfter;

    impl TaskInterceptor for PanicsAfter {
        fn after_task(&self, _info: &TaskInfo, _failure: Option<&TaskFailure>) {
            panic!("audit log unavailable");
        }
    }

    #[test]
    fn test_panicking_interceptor_is_a_panic_cause() {
        let manager = AsyncManager::new(AsyncConfig::single_worker()).unwrap();
        current::clear();
        current::set_interceptors(Some(InterceptorChain::new().with(Arc::new(PanicsAfter))));

        let err = manager
            .parallel()
            .named("audited")
            .run(vec![boxed(|| Ok::<(), anyhow::Error>(()))])
            .unwrap_err();
        current::clear();

        let cause = err.as_parallel().unwrap().first_cause().unwrap();
        assert!(cause.is_panic());
        assert!(cause.to_string().contains("audit log unavailable"));
        assert_eq!(cause.info().name.as_deref(), Some("audited#0"));

        // The worker and its context survive the hook panic.
        manager
            .parallel()
            .run(vec![boxed(|| {
                if current::is_empty() {
                    Ok(())
                } else {
                    Err("context left behind by a panicking hook")
                }
            })])
            .unwrap();
    }

    #[test]
    fn test_rejecting_interceptor_skips_body() {
        let manager = AsyncManager::new(AsyncConfig::development()).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        current::clear();
        current::set_interceptors(Some(InterceptorChain::new().with(Arc::new(Recording {
            log: Arc::clone(&log),
            reject: true,
        }))));

        let body_log = Arc::clone(&log);
        let err = manager
            .parallel()
            .named("gated")
            .run(vec![boxed(move || {
                body_log.lock().push("body".to_string());
                Ok::<(), anyhow::Error>(())
            })])
            .unwrap_err();

        let cause = err.as_parallel().unwrap().first_cause().unwrap();
        assert!(cause.to_string().contains("not allowed"));
        assert!(!log.lock().contains(&"body".to_string()));
        assert_eq!(log.lock().last().unwrap(), "after:gated#0:true");
        current::clear();
    }
}
