//! Request-scoped context and its propagation to worker threads.
//!
//! Three pieces of thread-local state follow a task onto its worker:
//!
//! - a generic cache map ([`CacheMap`])
//! - the access/identity descriptor ([`AccessContext`])
//! - the interceptor chain ([`InterceptorChain`])
//!
//! [`ContextSnapshot::capture`] copies them from the calling thread at
//! submission time. [`ContextPropagator::install`] writes the snapshot onto
//! the worker and hands back a guard that clears the worker's context when
//! the task is done, however it ends.
//!
//! # Example
//!
//! ```
//! use scoped_async::context::{current, AccessContext, ContextPropagator, ContextSnapshot};
//!
//! current::set_access(Some(AccessContext::new("user-7")));
//! let snapshot = ContextSnapshot::capture();
//! current::clear();
//!
//! let subject = std::thread::spawn(move || {
//!     ContextPropagator::scope(snapshot, || current::access().map(|a| a.subject))
//! })
//! .join()
//! .unwrap();
//!
//! assert_eq!(subject.as_deref(), Some("user-7"));
//! ```

use std::collections::HashMap;

use serde_json::Value;

mod access;
pub mod current;
mod interceptor;
mod snapshot;

pub use access::AccessContext;
pub use interceptor::{InterceptorChain, TaskInterceptor};
pub use snapshot::{ContextPropagator, ContextSnapshot, InstalledContext};

/// Key/value cache shared by code running for one request.
pub type CacheMap = HashMap<String, Value>;
