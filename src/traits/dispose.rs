//! Disposal contract for cached objects.

/// Synchronous teardown hook for objects held by a lifecycle cache.
///
/// Declare it on a type descriptor with
/// [`TypeDescriptorBuilder::disposable`](crate::TypeDescriptorBuilder::disposable).
/// Cached objects are disposed when they are ejected from their cache, when
/// their registration is removed, or when the owning container is disposed.
/// Transient objects are never tracked and therefore never disposed by the
/// container.
///
/// # Examples
///
/// ```
/// use ferrous_ioc::{Container, Dispose, Instance, Registry, TypeDescriptor};
/// use ferrous_ioc::prelude::*;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// static CLOSED: AtomicBool = AtomicBool::new(false);
///
/// struct Connection;
///
/// impl Dispose for Connection {
///     fn dispose(&self) {
///         CLOSED.store(true, Ordering::SeqCst);
///     }
/// }
///
/// let connection = TypeDescriptor::of::<Connection>()
///     .constructor(|c| c.build(|_| Ok(Connection)))
///     .disposable()
///     .build();
///
/// let mut registry = Registry::new();
/// registry
///     .for_type::<Connection>()
///     .use_instance(Instance::constructed(connection).singleton());
///
/// let container = Container::new(registry);
/// let _conn = container.get_instance::<Connection>().unwrap();
/// container.eject::<Connection>(None);
/// assert!(CLOSED.load(Ordering::SeqCst));
/// ```
pub trait Dispose: Send + Sync + 'static {
    /// Release the resources held by this object.
    fn dispose(&self);
}
