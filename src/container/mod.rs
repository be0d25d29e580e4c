//! The container: resolution entry points, caches and ejection.

mod session;
mod validation;

pub use session::BuildSession;
pub use validation::{BuildFailure, ValidationFailure, ValidationReport};

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::dependencies::DependencyCollection;
use crate::error::{DiError, DiResult};
use crate::graph::{GraphModel, PluginGraph};
use crate::instance::{Configurable, InstanceId};
use crate::key::{GenericType, TypeKey};
use crate::lifecycle::{self, CacheKey, ObjectCache};
use crate::plan::BuildPlan;
use crate::registry::Registry;
use crate::value::Value;
use validation::ValidationState;

struct ContainerInner {
    graph: Arc<PluginGraph>,
    singletons: Arc<ObjectCache>,
    container_cache: Arc<ObjectCache>,
    nested: bool,
}

/// Resolves services from a configured [`Registry`].
///
/// Cloning a container is cheap and yields a handle to the same container.
/// [`nested`](Container::nested) creates a child that shares configuration
/// and singletons but has its own container-scoped objects.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::prelude::*;
/// use std::sync::Arc;
///
/// trait Widget: Send + Sync {
///     fn color(&self) -> &str;
/// }
///
/// struct ColorWidget {
///     color: String,
/// }
///
/// impl Widget for ColorWidget {
///     fn color(&self) -> &str {
///         &self.color
///     }
/// }
///
/// let descriptor = TypeDescriptor::of::<ColorWidget>()
///     .constructor(|c| {
///         c.primitive::<String>("color")
///             .build(|args| Ok(ColorWidget { color: args.value("color")? }))
///     })
///     .plugs_into::<dyn Widget>(|w| w)
///     .build();
///
/// let mut registry = Registry::new();
/// registry.for_type::<dyn Widget>().use_instance(
///     Instance::constructed(descriptor)
///         .with_value("color", "Red".to_string())
///         .singleton(),
/// );
///
/// let container = Container::new(registry);
/// let first = container.get_instance::<dyn Widget>().unwrap();
/// let second = container.get_instance::<dyn Widget>().unwrap();
/// assert!(Arc::ptr_eq(&first, &second));
/// assert_eq!(first.color(), "Red");
///
/// assert!(container.eject::<dyn Widget>(None));
/// let third = container.get_instance::<dyn Widget>().unwrap();
/// assert!(!Arc::ptr_eq(&first, &third));
/// assert_eq!(third.color(), "Red");
/// ```
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    pub fn new(registry: Registry) -> Self {
        let graph = Arc::new(PluginGraph::new(registry.state));
        debug!(target: "ferrous_ioc", graph = graph.id(), "container created");
        Self {
            inner: Arc::new(ContainerInner {
                graph,
                singletons: Arc::new(ObjectCache::new()),
                container_cache: Arc::new(ObjectCache::new()),
                nested: false,
            }),
        }
    }

    /// Adds registrations at runtime. Memoized build plans are discarded;
    /// already cached objects stay cached.
    pub fn configure<F>(&self, configure: F)
    where
        F: FnOnce(&mut Registry),
    {
        let mut registry = Registry::new();
        configure(&mut registry);
        self.inner.graph.configure(registry.state);
    }

    /// A child container sharing configuration and singletons, with its own
    /// container-scoped cache.
    pub fn nested(&self) -> Container {
        Self {
            inner: Arc::new(ContainerInner {
                graph: self.inner.graph.clone(),
                singletons: self.inner.singletons.clone(),
                container_cache: Arc::new(ObjectCache::new()),
                nested: true,
            }),
        }
    }

    pub(crate) fn graph(&self) -> &PluginGraph {
        &self.inner.graph
    }

    pub(crate) fn graph_id(&self) -> u64 {
        self.inner.graph.id()
    }

    pub(crate) fn singletons(&self) -> &Arc<ObjectCache> {
        &self.inner.singletons
    }

    pub(crate) fn container_cache(&self) -> &Arc<ObjectCache> {
        &self.inner.container_cache
    }

    fn plan(&self, plugin: &TypeKey, name: Option<&str>) -> DiResult<Arc<BuildPlan>> {
        match name {
            Some(name) => self.graph().named_plan(plugin, name),
            None => self.graph().default_plan(plugin),
        }
    }

    /// Resolves `plugin` by key, returning the type-erased value.
    pub fn get_instance_by_key(&self, plugin: &TypeKey, name: Option<&str>) -> DiResult<Value> {
        let plan = self.plan(plugin, name)?;
        BuildSession::new(self.clone()).build(&plan)
    }

    /// Async variant of [`get_instance_by_key`](Self::get_instance_by_key).
    pub async fn get_instance_by_key_async(&self, plugin: &TypeKey, name: Option<&str>) -> DiResult<Value> {
        let plan = self.plan(plugin, name)?;
        let session = BuildSession::new(self.clone());
        session.build_async(&plan).await
    }

    /// Resolves the default `T`.
    pub fn get_instance<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        self.get_instance_by_key(&TypeKey::of::<T>(), None)?.expect_type::<T>()
    }

    /// Resolves the `T` registered under `name`.
    pub fn get_named_instance<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> DiResult<Arc<T>> {
        self.get_instance_by_key(&TypeKey::of::<T>(), Some(name))?.expect_type::<T>()
    }

    /// Resolves a closed generic `T`, closing an open generic family on the
    /// first request.
    pub fn get_generic_instance<T: ?Sized + GenericType + Send + Sync>(&self) -> DiResult<Arc<T>> {
        self.get_instance_by_key(&TypeKey::of_generic::<T>(), None)?.expect_type::<T>()
    }

    /// Like [`get_instance`](Self::get_instance), but `None` when nothing is
    /// registered for `T`. Every other failure is still an error.
    pub fn try_get_instance<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Option<Arc<T>>> {
        not_registered_is_none(self.get_instance::<T>())
    }

    /// Like [`get_named_instance`](Self::get_named_instance), but `None` when
    /// no instance has that name.
    pub fn try_get_named_instance<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> DiResult<Option<Arc<T>>> {
        not_registered_is_none(self.get_named_instance::<T>(name))
    }

    /// Every registered `T`, in registration order, built in one session.
    pub fn get_all_instances<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Vec<Arc<T>>> {
        BuildSession::new(self.clone()).get_all_instances::<T>()
    }

    /// Resolves the default `T`, awaiting async lambdas and interceptors.
    pub async fn get_instance_async<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        self.get_instance_by_key_async(&TypeKey::of::<T>(), None)
            .await?
            .expect_type::<T>()
    }

    pub async fn get_named_instance_async<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> DiResult<Arc<T>> {
        self.get_instance_by_key_async(&TypeKey::of::<T>(), Some(name))
            .await?
            .expect_type::<T>()
    }

    /// Async variant of [`get_all_instances`](Self::get_all_instances).
    pub async fn get_all_instances_async<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Vec<Arc<T>>> {
        let session = BuildSession::new(self.clone());
        session
            .resolve_all_async(&TypeKey::of::<T>())
            .await?
            .iter()
            .map(Value::expect_type::<T>)
            .collect()
    }

    /// Builds a fresh `T` from its default instance with `overrides` merged
    /// over the instance's explicit dependencies. The result is never cached.
    /// Only constructed instances accept overrides; other kinds resolve
    /// normally.
    pub fn get_instance_with<T: ?Sized + Send + Sync + 'static>(&self, overrides: &DependencyCollection) -> DiResult<Arc<T>> {
        let plugin = TypeKey::of::<T>();
        let instance = self.graph().default_instance(&plugin)?;
        let plan = match instance.with_overrides(overrides) {
            Some(copy) => self.graph().detached_plan(&plugin, &Arc::new(copy.transient())),
            None => self.graph().plan_for(&plugin, &instance),
        };
        BuildSession::new(self.clone()).build(&plan)?.expect_type::<T>()
    }

    /// The build plan of the default `T`, or of the one named `name`.
    pub fn build_plan<T: ?Sized + 'static>(&self, name: Option<&str>) -> DiResult<Arc<BuildPlan>> {
        self.plan(&TypeKey::of::<T>(), name)
    }

    /// Renders the build plan of `T` as a tree.
    pub fn describe<T: ?Sized + 'static>(&self, name: Option<&str>) -> DiResult<String> {
        Ok(self.build_plan::<T>(name)?.describe())
    }

    /// A serializable snapshot of the configuration.
    pub fn model(&self) -> GraphModel {
        self.graph().model()
    }

    fn caches(&self) -> Vec<Arc<ObjectCache>> {
        let mut caches = vec![self.inner.singletons.clone(), self.inner.container_cache.clone()];
        caches.extend(lifecycle::existing_thread_cache(self.graph_id()));
        caches
    }

    fn eject_ids(&self, plugin: &TypeKey, ids: &[InstanceId]) -> bool {
        let mut ejected = false;
        for cache in self.caches() {
            for id in ids {
                ejected |= cache.eject(&CacheKey::new(plugin.clone(), *id));
            }
        }
        ejected
    }

    /// Ejects the cached object of the default `T`, or of the one named
    /// `name`, disposing it. The next request builds a new object. Returns
    /// false when nothing was cached.
    pub fn eject<T: ?Sized + 'static>(&self, name: Option<&str>) -> bool {
        let plugin = TypeKey::of::<T>();
        let ids: Vec<InstanceId> = match name {
            Some(name) => self.graph().instance_ids(&plugin, Some(name)),
            None => self.graph().default_id(&plugin).into_iter().collect(),
        };
        let ejected = self.eject_ids(&plugin, &ids);
        debug!(target: "ferrous_ioc", plugin = %plugin, instance = ?name, ejected, "eject");
        ejected
    }

    /// Ejects the named `T` and removes its registration. Returns false when
    /// no such instance was registered.
    pub fn eject_and_remove<T: ?Sized + 'static>(&self, name: &str) -> bool {
        let plugin = TypeKey::of::<T>();
        match self.graph().remove(&plugin, name) {
            Some(id) => {
                self.eject_ids(&plugin, &[id]);
                debug!(target: "ferrous_ioc", plugin = %plugin, instance = name, "ejected and removed");
                true
            }
            None => false,
        }
    }

    /// Ejects every cached object built as `T`. Returns how many were ejected.
    pub fn eject_all_of<T: ?Sized + 'static>(&self) -> usize {
        let plugin = TypeKey::of::<T>();
        self.caches()
            .iter()
            .map(|cache| cache.eject_where(|key| key.plugin == plugin))
            .sum()
    }

    /// Drops the calling thread's thread-local objects for this container's
    /// configuration, disposing them.
    pub fn eject_thread_local(&self) {
        lifecycle::eject_thread_cache(self.graph_id());
    }

    /// Disposes every object this container owns: container-scoped objects,
    /// the calling thread's thread-local objects and, for a root container,
    /// singletons.
    pub fn dispose(&self) {
        self.inner.container_cache.eject_all();
        if !self.inner.nested {
            self.inner.singletons.eject_all();
            self.eject_thread_local();
        }
        debug!(target: "ferrous_ioc", graph = self.graph_id(), nested = self.inner.nested, "container disposed");
    }

    /// Compiles and builds every registered instance, collecting every
    /// failure instead of stopping at the first.
    ///
    /// Validation builds objects in private caches, so the container's
    /// caches are untouched. Plans that need async resolution are only
    /// checked for configuration errors.
    pub fn assert_configuration_is_valid(&self) -> Result<(), ValidationReport> {
        let state = Arc::new(ValidationState::default());
        let registrations = self.graph().registrations();

        for (plugin, instance) in &registrations {
            let plan = self.graph().plan_for(plugin, instance);
            if state.has_failed(&plan) {
                continue;
            }
            if plan.requires_async() {
                if let Err(err) = plan.executable() {
                    state.record(&plan, err.into());
                }
                continue;
            }
            // Failures are recorded by the session.
            let _ = BuildSession::validating(self.clone(), state.clone()).build(&plan);
        }

        let report = state.report();
        info!(
            target: "ferrous_ioc",
            instances = registrations.len(),
            build_failures = report.build_failures.len(),
            validation_errors = report.validation_errors.len(),
            "configuration validated"
        );
        if report.is_valid() {
            Ok(())
        } else {
            Err(report)
        }
    }
}

fn not_registered_is_none<T: ?Sized>(result: DiResult<Arc<T>>) -> DiResult<Option<Arc<T>>> {
    match result {
        Ok(found) => Ok(Some(found)),
        Err(DiError::MissingDefault { .. } | DiError::MissingNamed { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("graph", &self.inner.graph)
            .field("nested", &self.inner.nested)
            .field("singletons", &self.inner.singletons.len())
            .field("container_scoped", &self.inner.container_cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Instance;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counted(usize);

    fn counting_registry(counter: Arc<AtomicUsize>) -> Registry {
        let mut registry = Registry::new();
        registry.for_type::<Counted>().use_instance(
            Instance::lambda(move |_| Ok(Arc::new(Counted(counter.fetch_add(1, Ordering::SeqCst))))).singleton(),
        );
        registry
    }

    #[test]
    fn eject_before_build_is_a_no_op() {
        let built = Arc::new(AtomicUsize::new(0));
        let container = Container::new(counting_registry(built.clone()));

        assert!(!container.eject::<Counted>(None));
        assert_eq!(built.load(Ordering::SeqCst), 0);

        let first = container.get_instance::<Counted>().unwrap();
        assert!(container.eject::<Counted>(None));
        let second = container.get_instance::<Counted>().unwrap();
        assert_eq!((first.0, second.0), (0, 1));
    }

    #[test]
    fn nested_containers_share_singletons() {
        let container = Container::new(counting_registry(Arc::new(AtomicUsize::new(0))));
        let nested = container.nested();
        assert!(Arc::ptr_eq(
            &container.get_instance::<Counted>().unwrap(),
            &nested.get_instance::<Counted>().unwrap()
        ));

        nested.dispose();
        assert_eq!(container.singletons().len(), 1);
        container.dispose();
        assert_eq!(container.singletons().len(), 0);
    }

    #[test]
    fn try_get_returns_none_only_when_unregistered() {
        let container = Container::new(Registry::new());
        assert!(container.try_get_instance::<Counted>().unwrap().is_none());
        assert!(container.try_get_named_instance::<Counted>("x").unwrap().is_none());
    }

    #[test]
    fn configure_adds_registrations_at_runtime() {
        let container = Container::new(Registry::new());
        assert!(container.get_instance::<u8>().is_err());

        container.configure(|registry| {
            registry.for_type::<u8>().use_instance(Instance::value(9u8));
        });
        assert_eq!(*container.get_instance::<u8>().unwrap(), 9);
    }
}
