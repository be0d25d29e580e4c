//! Code-first configuration.
//!
//! A [`Registry`] collects plugin families, global policies and setter
//! policies. It is consumed by [`Container::new`](crate::Container::new) and by
//! [`Container::configure`](crate::Container::configure).

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::container::{BuildSession, Container};
use crate::descriptor::{ConstructorStrategy, Setter};
use crate::error::BoxError;
use crate::graph::{GraphState, OpenFamily, PluginFamily};
use crate::instance::Instance;
use crate::interception::{Interceptor, InterceptorPolicy};
use crate::key::{GenericType, TypeKey};
use crate::lifecycle::Lifecycle;

/// Registration set applied to a container.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::prelude::*;
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
///
/// struct English;
/// impl Greeter for English {
///     fn greet(&self) -> String {
///         "hello".to_string()
///     }
/// }
///
/// struct French;
/// impl Greeter for French {
///     fn greet(&self) -> String {
///         "bonjour".to_string()
///     }
/// }
///
/// let mut registry = Registry::new();
/// registry
///     .for_type::<dyn Greeter>()
///     .use_object(Arc::new(English))
///     .add(Instance::object::<dyn Greeter>(Arc::new(French)).named("fr"));
///
/// let container = Container::new(registry);
/// assert_eq!(container.get_instance::<dyn Greeter>().unwrap().greet(), "hello");
/// assert_eq!(container.get_named_instance::<dyn Greeter>("fr").unwrap().greet(), "bonjour");
/// assert_eq!(container.get_all_instances::<dyn Greeter>().unwrap().len(), 2);
/// ```
#[derive(Clone, Default)]
pub struct Registry {
    pub(crate) state: GraphState,
}

/// A reusable group of registrations.
pub trait RegistryModule {
    fn configure(&self, registry: &mut Registry);
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the family of plugin type `P`.
    pub fn for_type<P: ?Sized + Send + Sync + 'static>(&mut self) -> FamilyExpression<'_, P> {
        FamilyExpression::new(self, TypeKey::of::<P>())
    }

    /// Configures the family of a closed generic plugin type, keeping its
    /// type arguments.
    pub fn for_generic<P: ?Sized + GenericType + Send + Sync>(&mut self) -> FamilyExpression<'_, P> {
        FamilyExpression::new(self, TypeKey::of_generic::<P>())
    }

    /// Configures the open generic family `template`. Closed plugin types
    /// naming this template are served from it on first request.
    pub fn for_open_generic(&mut self, template: &'static str) -> OpenFamilyExpression<'_> {
        OpenFamilyExpression {
            family: self.state.open_family_mut(template),
        }
    }

    /// Registers `instance` for `plugin_type`, optionally renaming it.
    pub fn register(&mut self, plugin_type: TypeKey, instance: impl Into<Instance>, name: Option<&str>) -> &mut Self {
        let mut instance: Instance = instance.into();
        if let Some(name) = name {
            instance = instance.clone_with_name(name);
        }
        self.state.family_mut(&plugin_type).add(Arc::new(instance));
        self
    }

    /// Registers `instance` for `plugin_type` and makes it the default.
    pub fn set_default(&mut self, plugin_type: TypeKey, instance: impl Into<Instance>) -> &mut Self {
        self.state.family_mut(&plugin_type).set_default(Arc::new(instance.into()));
        self
    }

    /// Adds a global interceptor policy.
    pub fn add_policy(&mut self, policy: impl InterceptorPolicy + 'static) -> &mut Self {
        self.state.policies.interceptors.push(Arc::new(policy));
        self
    }

    /// Adds a constructor strategy consulted before the built-in ones.
    pub fn add_constructor_selector(&mut self, strategy: impl ConstructorStrategy + 'static) -> &mut Self {
        self.state.policies.constructors.add(Arc::new(strategy));
        self
    }

    /// Fills every optional setter of type `P` by auto-wiring.
    pub fn fill_all_setters_of<P: ?Sized + 'static>(&mut self) -> &mut Self {
        self.state.policies.setters.types.push(TypeKey::of::<P>());
        self
    }

    /// Fills every optional setter matching `filter` by auto-wiring.
    pub fn fill_setters_where<F>(&mut self, filter: F) -> &mut Self
    where
        F: Fn(&Setter) -> bool + Send + Sync + 'static,
    {
        self.state.policies.setters.filters.push(Arc::new(filter));
        self
    }

    /// Applies a module's registrations.
    pub fn include(&mut self, module: &dyn RegistryModule) -> &mut Self {
        module.configure(self);
        self
    }

    /// Merges another registry's registrations into this one.
    pub fn include_registry(&mut self, other: Registry) -> &mut Self {
        self.state.merge(other.state);
        self
    }

    /// True when `P` has a family.
    pub fn has_family<P: ?Sized + 'static>(&self) -> bool {
        self.state.families.contains_key(&TypeKey::of::<P>())
    }
}

/// Fluent configuration of one plugin family.
pub struct FamilyExpression<'a, P: ?Sized> {
    registry: &'a mut Registry,
    plugin: TypeKey,
    _plugin: PhantomData<fn() -> Arc<P>>,
}

impl<'a, P: ?Sized + Send + Sync + 'static> FamilyExpression<'a, P> {
    fn new(registry: &'a mut Registry, plugin: TypeKey) -> Self {
        registry.state.family_mut(&plugin);
        Self {
            registry,
            plugin,
            _plugin: PhantomData,
        }
    }

    fn family(&mut self) -> &mut PluginFamily {
        self.registry.state.family_mut(&self.plugin)
    }

    /// Registers `instance` and makes it the default.
    pub fn use_instance(&mut self, instance: impl Into<Instance>) -> &mut Self {
        self.family().set_default(Arc::new(instance.into()));
        self
    }

    /// Registers an additional instance.
    pub fn add(&mut self, instance: impl Into<Instance>) -> &mut Self {
        self.family().add(Arc::new(instance.into()));
        self
    }

    /// Uses a pre-built object as the default.
    pub fn use_object(&mut self, object: Arc<P>) -> &mut Self {
        self.use_instance(Instance::object(object))
    }

    /// Registers an additional pre-built object.
    pub fn add_object(&mut self, object: Arc<P>) -> &mut Self {
        self.add(Instance::object(object))
    }

    /// Uses a factory as the default.
    pub fn use_lambda<F>(&mut self, factory: F) -> &mut Self
    where
        F: Fn(&BuildSession) -> Result<Arc<P>, BoxError> + Send + Sync + 'static,
    {
        self.use_instance(Instance::lambda(factory))
    }

    /// Uses an async factory as the default.
    pub fn use_async_lambda<F, Fut>(&mut self, factory: F) -> &mut Self
    where
        F: Fn(Container) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<P>, BoxError>> + Send + 'static,
    {
        self.use_instance(Instance::async_lambda(factory))
    }

    /// Names the default instance among those registered.
    pub fn default_named(&mut self, name: &str) -> &mut Self {
        self.family().default = Some(name.to_string());
        self
    }

    /// Lifecycle for every instance of the family that does not override it.
    pub fn lifecycle(&mut self, lifecycle: Lifecycle) -> &mut Self {
        self.family().lifecycle = Some(lifecycle);
        self
    }

    pub fn transient(&mut self) -> &mut Self {
        self.lifecycle(Lifecycle::Transient)
    }

    pub fn per_request(&mut self) -> &mut Self {
        self.lifecycle(Lifecycle::PerRequest)
    }

    pub fn singleton(&mut self) -> &mut Self {
        self.lifecycle(Lifecycle::Singleton)
    }

    pub fn container_scoped(&mut self) -> &mut Self {
        self.lifecycle(Lifecycle::ContainerScoped)
    }

    pub fn thread_local(&mut self) -> &mut Self {
        self.lifecycle(Lifecycle::ThreadLocal)
    }

    /// Used when the family has no default.
    pub fn fallback(&mut self, instance: impl Into<Instance>) -> &mut Self {
        self.family().fallback = Some(Arc::new(instance.into()));
        self
    }

    /// Template for instances requested by a name that is not registered.
    pub fn on_missing_named(&mut self, instance: impl Into<Instance>) -> &mut Self {
        self.family().missing_named = Some(Arc::new(instance.into()));
        self
    }

    /// Adds an interceptor for every instance built as `P`.
    pub fn intercept_with(&mut self, interceptor: Interceptor) -> &mut Self {
        self.family().interceptors.push(interceptor);
        self
    }

    /// Runs `activate` on every object built as `P`.
    pub fn on_creation_for_all<F>(&mut self, description: &str, activate: F) -> &mut Self
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        self.intercept_with(Interceptor::activator::<P, F>(description, activate))
    }

    /// Wraps every object built as `P`. Decorators compose in registration
    /// order, so the last one registered is outermost.
    pub fn decorate_all_with<F>(&mut self, description: &str, decorate: F) -> &mut Self
    where
        F: Fn(Arc<P>) -> Arc<P> + Send + Sync + 'static,
    {
        self.intercept_with(Interceptor::decorator::<P, F>(description, decorate))
    }
}

/// Fluent configuration of an open generic family.
pub struct OpenFamilyExpression<'a> {
    family: &'a mut OpenFamily,
}

impl OpenFamilyExpression<'_> {
    /// Registers an open instance and makes it the default.
    pub fn use_instance(&mut self, instance: impl Into<Instance>) -> &mut Self {
        let instance: Instance = instance.into();
        self.family.default = Some(instance.name().to_string());
        self.family.add(Arc::new(instance));
        self
    }

    pub fn add(&mut self, instance: impl Into<Instance>) -> &mut Self {
        self.family.add(Arc::new(instance.into()));
        self
    }

    pub fn lifecycle(&mut self, lifecycle: Lifecycle) -> &mut Self {
        self.family.lifecycle = Some(lifecycle);
        self
    }

    pub fn singleton(&mut self) -> &mut Self {
        self.lifecycle(Lifecycle::Singleton)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Configurable;

    struct Services;
    impl RegistryModule for Services {
        fn configure(&self, registry: &mut Registry) {
            registry.for_type::<u32>().use_instance(Instance::value(7u32).named("seven"));
        }
    }

    #[test]
    fn family_expressions_chain() {
        let mut registry = Registry::new();
        registry
            .for_type::<String>()
            .add(Instance::value("a".to_string()).named("a"))
            .add(Instance::value("b".to_string()).named("b"))
            .default_named("b")
            .singleton();

        let family = &registry.state.families[&TypeKey::of::<String>()];
        assert_eq!(family.instances.len(), 2);
        assert_eq!(family.default_instance().unwrap().name(), "b");
        assert_eq!(family.lifecycle, Some(Lifecycle::Singleton));
    }

    #[test]
    fn register_renames_and_modules_apply() {
        let mut registry = Registry::new();
        registry.include(&Services);
        registry.register(TypeKey::of::<u32>(), Instance::value(8u32), Some("eight"));

        assert!(registry.has_family::<u32>());
        let family = &registry.state.families[&TypeKey::of::<u32>()];
        let names: Vec<&str> = family.instances.iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["seven", "eight"]);
        assert_eq!(family.default_instance().unwrap().name(), "seven");
    }

    #[test]
    fn included_registries_merge_families() {
        let mut first = Registry::new();
        first.for_type::<u32>().add(Instance::value(1u32).named("one"));
        let mut second = Registry::new();
        second.for_type::<u32>().add(Instance::value(2u32).named("two")).singleton();

        first.include_registry(second);
        let family = &first.state.families[&TypeKey::of::<u32>()];
        assert_eq!(family.instances.len(), 2);
        assert_eq!(family.lifecycle, Some(Lifecycle::Singleton));
    }
}
