//! Thread-local context of the current thread.
//!
//! The request-handling layer populates these fields on the request thread.
//! [`ContextSnapshot::capture`](super::ContextSnapshot::capture) reads them,
//! and the propagator writes them on worker threads. Nothing here ever
//! touches another thread's storage.

use std::cell::RefCell;

use super::{AccessContext, CacheMap, InterceptorChain};

#[derive(Default)]
pub(crate) struct ThreadContext {
    pub(crate) cache: Option<CacheMap>,
    pub(crate) access: Option<AccessContext>,
    pub(crate) interceptors: Option<InterceptorChain>,
}

thread_local! {
    static CURRENT: RefCell<ThreadContext> = RefCell::new(ThreadContext::default());
}

pub(crate) fn with<R>(f: impl FnOnce(&ThreadContext) -> R) -> R {
    CURRENT.with(|cell| f(&cell.borrow()))
}

pub(crate) fn with_mut<R>(f: impl FnOnce(&mut ThreadContext) -> R) -> R {
    CURRENT.with(|cell| f(&mut cell.borrow_mut()))
}

/// A copy of the current cache map.
pub fn cache() -> Option<CacheMap> {
    with(|ctx| ctx.cache.clone())
}

/// Replace the cache map.
pub fn set_cache(cache: Option<CacheMap>) {
    with_mut(|ctx| ctx.cache = cache);
}

/// Mutate the cache map in place, creating an empty one if absent.
///
/// ```
/// use scoped_async::context::current;
/// use serde_json::json;
///
/// current::with_cache_mut(|cache| {
///     cache.insert("visits".to_string(), json!(1));
/// });
/// assert_eq!(current::cache().unwrap()["visits"], json!(1));
/// current::clear();
/// ```
pub fn with_cache_mut<R>(f: impl FnOnce(&mut CacheMap) -> R) -> R {
    with_mut(|ctx| f(ctx.cache.get_or_insert_with(CacheMap::new)))
}

/// A copy of the current access context.
pub fn access() -> Option<AccessContext> {
    with(|ctx| ctx.access.clone())
}

/// Replace the access context.
pub fn set_access(access: Option<AccessContext>) {
    with_mut(|ctx| ctx.access = access);
}

/// The current interceptor chain.
pub fn interceptors() -> Option<InterceptorChain> {
    with(|ctx| ctx.interceptors.clone())
}

/// Replace the interceptor chain.
pub fn set_interceptors(chain: Option<InterceptorChain>) {
    with_mut(|ctx| ctx.interceptors = chain);
}

/// Clear every field.
pub fn clear() {
    with_mut(|ctx| *ctx = ThreadContext::default());
}

/// Whether every field is absent.
pub fn is_empty() -> bool {
    with(|ctx| ctx.cache.is_none() && ctx.access.is_none() && ctx.interceptors.is_none())
}
