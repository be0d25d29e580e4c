//! Lifecycle policies.

mod cache;

pub use cache::ObjectCache;
pub(crate) use cache::CacheKey;

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::container::BuildSession;

/// Caching scope of built objects.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::prelude::*;
/// use std::sync::Arc;
///
/// struct Database;
/// struct Request;
///
/// let mut registry = Registry::new();
/// registry
///     .for_type::<Database>()
///     .use_instance(Instance::lambda(|_| Ok(Arc::new(Database))).singleton());
/// registry
///     .for_type::<Request>()
///     .use_instance(Instance::lambda(|_| Ok(Arc::new(Request))).container_scoped());
///
/// let container = Container::new(registry);
/// let nested = container.nested();
///
/// // Singletons are shared with nested containers
/// let db1 = container.get_instance::<Database>().unwrap();
/// let db2 = nested.get_instance::<Database>().unwrap();
/// assert!(Arc::ptr_eq(&db1, &db2));
///
/// // Container-scoped objects are not
/// let r1 = container.get_instance::<Request>().unwrap();
/// let r2 = nested.get_instance::<Request>().unwrap();
/// assert!(Arc::ptr_eq(&r1, &container.get_instance::<Request>().unwrap()));
/// assert!(!Arc::ptr_eq(&r1, &r2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Lifecycle {
    /// Never cached; every request builds a new object.
    #[default]
    Transient,
    /// Cached for one top-level resolution, so a graph shares one object.
    PerRequest,
    /// Cached once for the root container and every nested container.
    Singleton,
    /// Cached per container; a nested container has its own cache.
    ContainerScoped,
    /// Cached per calling thread until [`Container::eject_thread_local`](crate::Container::eject_thread_local).
    ThreadLocal,
}

impl Lifecycle {
    /// Finds the cache holding objects of this lifecycle for `session`.
    ///
    /// Transient objects have no cache. While validating, every cached
    /// lifecycle uses the session's own cache so validation never touches
    /// the container's caches.
    pub(crate) fn find_cache(self, session: &BuildSession) -> Option<Arc<ObjectCache>> {
        let container = session.container();
        match self {
            Lifecycle::Transient => None,
            _ if session.is_validating() => Some(session.request_cache().clone()),
            Lifecycle::PerRequest => Some(session.request_cache().clone()),
            Lifecycle::Singleton => Some(container.singletons().clone()),
            Lifecycle::ContainerScoped => Some(container.container_cache().clone()),
            Lifecycle::ThreadLocal => Some(thread_cache(container.graph_id())),
        }
    }

    pub fn is_cached(self) -> bool {
        self != Lifecycle::Transient
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifecycle::Transient => "Transient",
            Lifecycle::PerRequest => "PerRequest",
            Lifecycle::Singleton => "Singleton",
            Lifecycle::ContainerScoped => "ContainerScoped",
            Lifecycle::ThreadLocal => "ThreadLocal",
        };
        f.write_str(name)
    }
}

thread_local! {
    // One cache per plugin graph on each thread.
    static THREAD_CACHES: RefCell<AHashMap<u64, Arc<ObjectCache>>> = RefCell::new(AHashMap::new());
}

/// The calling thread's cache for the graph `graph_id`.
pub(crate) fn thread_cache(graph_id: u64) -> Arc<ObjectCache> {
    THREAD_CACHES.with(|caches| {
        caches
            .borrow_mut()
            .entry(graph_id)
            .or_insert_with(|| Arc::new(ObjectCache::new()))
            .clone()
    })
}

/// Drops the calling thread's cache for `graph_id`, disposing its objects.
pub(crate) fn eject_thread_cache(graph_id: u64) {
    let removed = THREAD_CACHES.with(|caches| caches.borrow_mut().remove(&graph_id));
    if let Some(cache) = removed {
        cache.eject_all();
    }
}

/// The calling thread's cache for `graph_id`, if one was created.
pub(crate) fn existing_thread_cache(graph_id: u64) -> Option<Arc<ObjectCache>> {
    THREAD_CACHES.with(|caches| caches.borrow().get(&graph_id).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_is_the_default_and_uncached() {
        assert_eq!(Lifecycle::default(), Lifecycle::Transient);
        assert!(!Lifecycle::Transient.is_cached());
        assert!(Lifecycle::ThreadLocal.is_cached());
    }

    #[test]
    fn thread_caches_are_per_thread() {
        let here = thread_cache(u64::MAX);
        assert!(Arc::ptr_eq(&here, &thread_cache(u64::MAX)));

        let there = std::thread::spawn(|| thread_cache(u64::MAX)).join().unwrap();
        assert!(!Arc::ptr_eq(&here, &there));

        eject_thread_cache(u64::MAX);
        assert!(existing_thread_cache(u64::MAX).is_none());
    }

    #[test]
    fn lifecycles_round_trip_through_json() {
        let json = serde_json::to_string(&Lifecycle::ContainerScoped).unwrap();
        assert_eq!(json, "\"ContainerScoped\"");
        assert_eq!(serde_json::from_str::<Lifecycle>(&json).unwrap(), Lifecycle::ContainerScoped);
    }
}
