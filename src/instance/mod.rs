//! Declarative descriptions of how to produce a value for a plugin type.
//!
//! An [`Instance`] is shared state ([`InstanceCore`]: identity, name,
//! lifecycle override, interceptors) plus one of five kinds:
//!
//! | Kind | Built by | Produces |
//! |------|----------|----------|
//! | constructed | [`Instance::constructed`] | a concrete type through its selected constructor and setters |
//! | lambda | [`Instance::lambda`], [`Instance::async_lambda`] | whatever the factory returns |
//! | literal | [`Instance::object`], [`Instance::value`] | one pre-built object, never re-created |
//! | referenced | [`Instance::referenced`] | another named instance |
//! | serialized | [`Instance::serialized`] | a fresh copy deserialized on every build |
//!
//! Every kind has a builder type implementing [`Configurable`] and converts
//! into [`Instance`] with `From`.

mod constructed;
mod lambda;
mod literal;
mod referenced;
mod serialized;

pub use constructed::ConstructedInstance;
pub use lambda::LambdaInstance;
pub use literal::LiteralInstance;
pub use referenced::ReferencedInstance;
pub use serialized::SerializedInstance;

pub(crate) use constructed::ConstructedSpec;
pub(crate) use lambda::{LambdaFactory, LambdaSpec};
pub(crate) use literal::LiteralSpec;
pub(crate) use referenced::ReferencedSpec;
pub(crate) use serialized::SerializedSpec;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::container::{BuildSession, Container};
use crate::descriptor::TypeDescriptor;
use crate::error::{BoxError, DiResult};
use crate::interception::Interceptor;
use crate::key::TypeKey;
use crate::lifecycle::Lifecycle;

/// Identity of an instance. Build plans and cached objects are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(Uuid);

impl InstanceId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// State shared by every instance kind.
#[derive(Clone)]
pub struct InstanceCore {
    pub(crate) id: InstanceId,
    pub(crate) name: String,
    pub(crate) lifecycle: Option<Lifecycle>,
    pub(crate) interceptors: Vec<Interceptor>,
}

impl InstanceCore {
    pub(crate) fn new() -> Self {
        let id = InstanceId::new();
        Self {
            id,
            name: id.to_string(),
            lifecycle: None,
            interceptors: Vec::new(),
        }
    }

    /// Copy with a fresh identity.
    fn renewed(&self) -> Self {
        Self {
            id: InstanceId::new(),
            ..self.clone()
        }
    }
}

#[derive(Clone)]
pub(crate) enum InstanceKind {
    Constructed(ConstructedSpec),
    Lambda(LambdaSpec),
    Literal(LiteralSpec),
    Referenced(ReferencedSpec),
    Serialized(SerializedSpec),
}

/// How to produce one value for a plugin type.
pub struct Instance {
    pub(crate) core: InstanceCore,
    pub(crate) kind: InstanceKind,
}

/// Settings shared by every instance builder.
///
/// ```rust
/// use ferrous_ioc::prelude::*;
///
/// let instance: Instance = Instance::value(3u8)
///     .named("three")
///     .singleton()
///     .on_activation::<u8, _>("check", |v| assert_eq!(*v, 3))
///     .into();
///
/// assert_eq!(instance.name(), "three");
/// assert_eq!(Instance::lifecycle(&instance), Some(Lifecycle::Singleton));
/// assert_eq!(instance.interceptors().len(), 1);
/// ```
pub trait Configurable: Sized {
    #[doc(hidden)]
    fn core_mut(&mut self) -> &mut InstanceCore;

    /// Names the instance. Unnamed instances get a generated unique name.
    fn named(mut self, name: &str) -> Self {
        self.core_mut().name = name.to_string();
        self
    }

    /// Overrides the family's lifecycle for this instance.
    fn lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.core_mut().lifecycle = Some(lifecycle);
        self
    }

    fn transient(self) -> Self {
        self.lifecycle(Lifecycle::Transient)
    }

    fn per_request(self) -> Self {
        self.lifecycle(Lifecycle::PerRequest)
    }

    fn singleton(self) -> Self {
        self.lifecycle(Lifecycle::Singleton)
    }

    fn container_scoped(self) -> Self {
        self.lifecycle(Lifecycle::ContainerScoped)
    }

    fn thread_local(self) -> Self {
        self.lifecycle(Lifecycle::ThreadLocal)
    }

    /// Adds an interceptor. Instance interceptors run before family and
    /// policy interceptors.
    fn intercept(mut self, interceptor: Interceptor) -> Self {
        self.core_mut().interceptors.push(interceptor);
        self
    }

    /// Shorthand for an [`Interceptor::activator`].
    fn on_activation<T, F>(self, description: &str, activate: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.intercept(Interceptor::activator::<T, F>(description, activate))
    }

    /// Shorthand for an [`Interceptor::decorator`].
    fn decorate_with<T, F>(self, description: &str, decorate: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<T>) -> Arc<T> + Send + Sync + 'static,
    {
        self.intercept(Interceptor::decorator::<T, F>(description, decorate))
    }
}

impl Configurable for Instance {
    fn core_mut(&mut self) -> &mut InstanceCore {
        &mut self.core
    }
}

impl Instance {
    fn from_kind(core: InstanceCore, kind: InstanceKind) -> Self {
        Self { core, kind }
    }

    /// Builds the concrete type described by `descriptor`.
    pub fn constructed(descriptor: Arc<TypeDescriptor>) -> ConstructedInstance {
        ConstructedInstance::new(descriptor)
    }

    /// Calls `factory` on every build.
    ///
    /// The factory receives the [`BuildSession`], through which it can
    /// resolve further services sharing the same per-request cache.
    pub fn lambda<P, F>(factory: F) -> LambdaInstance
    where
        P: ?Sized + Send + Sync + 'static,
        F: Fn(&BuildSession) -> Result<Arc<P>, BoxError> + Send + Sync + 'static,
    {
        LambdaInstance::new::<P, F>(factory)
    }

    /// Awaits `factory` on every build. Only async resolution can build it.
    pub fn async_lambda<P, F, Fut>(factory: F) -> LambdaInstance
    where
        P: ?Sized + Send + Sync + 'static,
        F: Fn(Container) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<P>, BoxError>> + Send + 'static,
    {
        LambdaInstance::new_async::<P, F, Fut>(factory)
    }

    /// A pre-built shared object.
    pub fn object<P: ?Sized + Send + Sync + 'static>(object: Arc<P>) -> LiteralInstance {
        LiteralInstance::object(object)
    }

    /// A pre-built plain value; its `Debug` text appears in plan descriptions.
    pub fn value<V: fmt::Debug + Send + Sync + 'static>(value: V) -> LiteralInstance {
        LiteralInstance::value(value)
    }

    /// Delegates to the instance named `name` in the requested plugin family.
    pub fn referenced(name: &str) -> ReferencedInstance {
        ReferencedInstance::new(name)
    }

    /// Serializes `value` now and deserializes a fresh copy on every build.
    pub fn serialized<T>(value: &T) -> DiResult<SerializedInstance>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        SerializedInstance::new(value)
    }

    pub fn id(&self) -> InstanceId {
        self.core.id
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Lifecycle override, if any.
    pub fn lifecycle(&self) -> Option<Lifecycle> {
        self.core.lifecycle
    }

    pub fn interceptors(&self) -> &[Interceptor] {
        &self.core.interceptors
    }

    /// The type this instance produces before any upcast to the plugin type.
    pub fn returned_type(&self) -> TypeKey {
        match &self.kind {
            InstanceKind::Constructed(spec) => spec.descriptor.type_key().clone(),
            InstanceKind::Lambda(spec) => spec.returned.clone(),
            InstanceKind::Literal(spec) => spec.value.type_key().clone(),
            InstanceKind::Referenced(spec) => spec.plugin.clone().unwrap_or_else(|| TypeKey::of::<()>()),
            InstanceKind::Serialized(spec) => spec.returned.clone(),
        }
    }

    /// One-line summary used in plan descriptions and the model.
    pub fn description(&self) -> String {
        match &self.kind {
            InstanceKind::Constructed(spec) => spec.descriptor.display_name(),
            InstanceKind::Lambda(spec) => spec.description(),
            InstanceKind::Literal(spec) => spec.description(),
            InstanceKind::Referenced(spec) => spec.description(),
            InstanceKind::Serialized(spec) => format!("Serialized {}", spec.returned),
        }
    }

    /// True for constructed instances of an open generic template.
    pub fn is_open_generic(&self) -> bool {
        matches!(&self.kind, InstanceKind::Constructed(spec) if spec.descriptor.is_open())
    }

    /// True when building needs async resolution.
    pub fn is_async(&self) -> bool {
        matches!(&self.kind, InstanceKind::Lambda(spec) if spec.is_async())
            || self.core.interceptors.iter().any(Interceptor::is_async)
    }

    /// Copy with a new identity and name. Dependencies are copied, not shared.
    pub fn clone_with_name(&self, name: &str) -> Instance {
        let mut core = self.core.renewed();
        core.name = name.to_string();
        Instance::from_kind(core, self.kind.clone())
    }

    /// Closes an open generic instance over `arguments`, recursively closing
    /// nested open instances among its dependencies.
    ///
    /// Returns `None` when this instance is not open or cannot be closed for
    /// these arguments.
    pub fn close_type(&self, arguments: &[TypeKey]) -> Option<Instance> {
        match &self.kind {
            InstanceKind::Constructed(spec) => spec
                .close(arguments)
                .map(|closed| Instance::from_kind(self.core.renewed(), InstanceKind::Constructed(closed))),
            _ => None,
        }
    }

    /// A copy of a constructed instance with `overrides` merged over its
    /// explicit dependencies. Other kinds return `None`.
    pub fn with_overrides(&self, overrides: &crate::DependencyCollection) -> Option<Instance> {
        match &self.kind {
            InstanceKind::Constructed(spec) => {
                let mut spec = spec.clone();
                spec.dependencies.merge(overrides);
                Some(Instance::from_kind(self.core.renewed(), InstanceKind::Constructed(spec)))
            }
            _ => None,
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("name", &self.core.name)
            .field("description", &self.description())
            .field("lifecycle", &self.core.lifecycle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::GenericType;
    use std::marker::PhantomData;

    trait Repository: Send + Sync {
        fn entity(&self) -> &'static str;
    }

    trait Store<E>: Send + Sync {}
    impl<E: 'static> GenericType for dyn Store<E> {
        const TEMPLATE: &'static str = "Store";
        fn type_arguments() -> Vec<TypeKey> {
            vec![TypeKey::of::<E>()]
        }
    }

    struct MemoryStore<E>(PhantomData<fn() -> E>);
    impl<E: 'static> Store<E> for MemoryStore<E> {}

    struct GenericRepository<E> {
        _store: Arc<dyn Store<E>>,
    }
    impl<E: 'static> Repository for GenericRepository<E> {
        fn entity(&self) -> &'static str {
            std::any::type_name::<E>()
        }
    }

    fn open_store() -> Arc<TypeDescriptor> {
        TypeDescriptor::open("MemoryStore", |args| {
            if args.first()? == &TypeKey::of::<u32>() {
                Some(
                    TypeDescriptor::of::<MemoryStore<u32>>()
                        .constructor(|c| c.build(|_| Ok(MemoryStore(PhantomData))))
                        .plugs_into_generic::<dyn Store<u32>>(|s| s)
                        .build(),
                )
            } else {
                None
            }
        })
    }

    fn open_repository() -> Arc<TypeDescriptor> {
        TypeDescriptor::open("GenericRepository", |args| {
            if args.first()? == &TypeKey::of::<u32>() {
                Some(
                    TypeDescriptor::of::<GenericRepository<u32>>()
                        .constructor(|c| {
                            c.generic_service::<dyn Store<u32>>("store").build(|a| {
                                Ok(GenericRepository {
                                    _store: a.get("store")?,
                                })
                            })
                        })
                        .plugs_into::<dyn Repository>(|r| r)
                        .build(),
                )
            } else {
                None
            }
        })
    }

    #[test]
    fn unnamed_instances_get_unique_names() {
        let a: Instance = Instance::value(1u8).into();
        let b: Instance = Instance::value(1u8).into();
        assert_ne!(a.name(), b.name());
        assert_ne!(a.id(), b.id());
        assert_eq!(a.name(), a.id().to_string());
    }

    #[test]
    fn clone_with_name_gets_a_new_identity() {
        let original: Instance = Instance::value("x".to_string()).named("first").singleton().into();
        let copy = original.clone_with_name("second");

        assert_eq!(copy.name(), "second");
        assert_ne!(copy.id(), original.id());
        assert_eq!(Instance::lifecycle(&copy), Some(Lifecycle::Singleton));
        assert_eq!(copy.returned_type(), TypeKey::of::<String>());
    }

    #[test]
    fn closing_substitutes_nested_open_dependencies() {
        let open: Instance = Instance::constructed(open_repository())
            .with_dependency::<dyn Store<u32>>("store", Instance::constructed(open_store()))
            .named("repo")
            .into();
        assert!(open.is_open_generic());

        let closed = open.close_type(&[TypeKey::of::<u32>()]).unwrap();
        assert!(!closed.is_open_generic());
        assert_eq!(closed.name(), "repo");
        assert_eq!(closed.returned_type(), TypeKey::of::<GenericRepository<u32>>());

        let InstanceKind::Constructed(spec) = &closed.kind else {
            panic!("expected a constructed instance");
        };
        let nested: Vec<_> = spec.dependencies.nested_instances().collect();
        assert_eq!(nested.len(), 1);
        assert!(!nested[0].is_open_generic());
    }

    #[test]
    fn failing_to_close_is_a_silent_miss() {
        let open: Instance = Instance::constructed(open_repository()).into();
        assert!(open.close_type(&[TypeKey::of::<String>()]).is_none());

        let closed: Instance = Instance::value(1u8).into();
        assert!(closed.close_type(&[TypeKey::of::<u32>()]).is_none());
    }

    #[test]
    fn overrides_copy_the_dependency_collection() {
        let mut overrides = crate::DependencyCollection::new();
        overrides.add(
            Some("store"),
            TypeKey::of::<u8>(),
            crate::Dependency::Value(crate::Value::described(1u8)),
        );

        let base: Instance = Instance::constructed(open_store()).into();
        let overridden = base.with_overrides(&overrides).unwrap();
        assert_ne!(overridden.id(), base.id());

        let (InstanceKind::Constructed(a), InstanceKind::Constructed(b)) = (&base.kind, &overridden.kind) else {
            panic!("expected constructed instances");
        };
        assert!(a.dependencies.is_empty());
        assert_eq!(b.dependencies.len(), 1);
        assert!(Instance::from(Instance::value(1u8)).with_overrides(&overrides).is_none());
    }

    #[test]
    fn repository_entity_names_are_stable() {
        let repo = GenericRepository::<u32> {
            _store: Arc::new(MemoryStore(PhantomData)),
        };
        assert_eq!(repo.entity(), "u32");
    }
}
