//! Capturing context on one thread and installing it on another.

use std::marker::PhantomData;

use super::{current, AccessContext, CacheMap, InterceptorChain};
use crate::config::PropagationConfig;

/// Immutable capture of the request-scoped context of a thread.
///
/// Each of the three fields is independently present or absent. A snapshot
/// owns its data: later changes on the thread it was captured from are not
/// visible through it, and installing it never writes back to that thread.
#[derive(Debug, Clone, Default)]
pub struct ContextSnapshot {
    cache: Option<CacheMap>,
    access: Option<AccessContext>,
    interceptors: Option<InterceptorChain>,
}

impl ContextSnapshot {
    /// A snapshot with every field absent.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Capture every field of the calling thread's context.
    pub fn capture() -> Self {
        Self::capture_selected(&PropagationConfig::default())
    }

    /// Capture the fields enabled in `selection`.
    ///
    /// Fields that are not selected are recorded as absent.
    pub fn capture_selected(selection: &PropagationConfig) -> Self {
        current::with(|ctx| Self {
            cache: ctx.cache.clone().filter(|_| selection.cache),
            access: ctx.access.clone().filter(|_| selection.access),
            interceptors: ctx.interceptors.clone().filter(|_| selection.interceptors),
        })
    }

    /// Set the cache map.
    pub fn with_cache(mut self, cache: CacheMap) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set the access context.
    pub fn with_access(mut self, access: AccessContext) -> Self {
        self.access = Some(access);
        self
    }

    /// Set the interceptor chain.
    pub fn with_interceptors(mut self, chain: InterceptorChain) -> Self {
        self.interceptors = Some(chain);
        self
    }

    /// The captured cache map.
    pub fn cache(&self) -> Option<&CacheMap> {
        self.cache.as_ref()
    }

    /// The captured access context.
    pub fn access(&self) -> Option<&AccessContext> {
        self.access.as_ref()
    }

    /// The captured interceptor chain.
    pub fn interceptors(&self) -> Option<&InterceptorChain> {
        self.interceptors.as_ref()
    }

    /// Whether every field is absent.
    pub fn is_empty(&self) -> bool {
        self.cache.is_none() && self.access.is_none() && self.interceptors.is_none()
    }
}

/// Installs snapshots on the executing thread.
pub struct ContextPropagator;

impl ContextPropagator {
    /// Write every present field of `snapshot` onto the current thread.
    ///
    /// Absent fields are left as they are. The returned guard clears the
    /// thread's context when dropped, on every exit path including unwinding;
    /// worker threads start with an empty context so clearing restores them.
    #[must_use = "the context is cleared as soon as the guard is dropped"]
    pub fn install(snapshot: ContextSnapshot) -> InstalledContext {
        let ContextSnapshot {
            cache,
            access,
            interceptors,
        } = snapshot;
        current::with_mut(|ctx| {
            if cache.is_some() {
                ctx.cache = cache;
            }
            if access.is_some() {
                ctx.access = access;
            }
            if interceptors.is_some() {
                ctx.interceptors = interceptors;
            }
        });
        InstalledContext {
            _not_send: PhantomData,
        }
    }

    /// Run `f` with `snapshot` installed, clearing the context afterwards.
    pub fn scope<R>(snapshot: ContextSnapshot, f: impl FnOnce() -> R) -> R {
        let _installed = Self::install(snapshot);
        f()
    }
}

/// Guard returned by [`ContextPropagator::install`].
///
/// Bound to the thread it was created on.
#[derive(Debug)]
pub struct InstalledContext {
    _not_send: PhantomData<*const ()>,
}

impl Drop for InstalledContext {
    fn drop(&mut self) {
        current::clear();
    }
}
