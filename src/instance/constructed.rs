//! Instances built through a concrete type's constructor.

use std::fmt;
use std::sync::Arc;

use super::{Configurable, Instance, InstanceCore, InstanceKind};
use crate::dependencies::{Dependency, DependencyCollection};
use crate::descriptor::TypeDescriptor;
use crate::key::TypeKey;
use crate::value::Value;

#[derive(Clone)]
pub(crate) struct ConstructedSpec {
    pub(crate) descriptor: Arc<TypeDescriptor>,
    pub(crate) dependencies: DependencyCollection,
    pub(crate) constructor: Option<&'static str>,
}

impl ConstructedSpec {
    pub(crate) fn close(&self, arguments: &[TypeKey]) -> Option<ConstructedSpec> {
        let descriptor = self.descriptor.close(arguments)?;
        let dependencies = self.dependencies.try_map_instances(|nested| {
            if nested.is_open_generic() {
                nested.close_type(arguments).map(Arc::new)
            } else {
                Some(nested.clone())
            }
        })?;
        Some(ConstructedSpec {
            descriptor,
            dependencies,
            constructor: self.constructor,
        })
    }
}

/// Builder for an instance of a concrete type.
///
/// Members not overridden here are auto-wired when the plan is compiled.
///
/// ```rust
/// use ferrous_ioc::prelude::*;
/// use std::sync::Arc;
///
/// struct Greeting {
///     text: String,
/// }
///
/// let descriptor = TypeDescriptor::of::<Greeting>()
///     .constructor(|c| c.primitive::<String>("text").build(|a| Ok(Greeting { text: a.value("text")? })))
///     .build();
///
/// let mut registry = Registry::new();
/// registry
///     .for_type::<Greeting>()
///     .use_instance(Instance::constructed(descriptor).with_value("text", "hi".to_string()));
///
/// let container = Container::new(registry);
/// assert_eq!(container.get_instance::<Greeting>().unwrap().text, "hi");
/// ```
pub struct ConstructedInstance {
    core: InstanceCore,
    spec: ConstructedSpec,
}

impl ConstructedInstance {
    pub(crate) fn new(descriptor: Arc<TypeDescriptor>) -> Self {
        Self {
            core: InstanceCore::new(),
            spec: ConstructedSpec {
                descriptor,
                dependencies: DependencyCollection::new(),
                constructor: None,
            },
        }
    }

    /// Supplies a primitive or any plain value for the member `name`.
    pub fn with_value<V: fmt::Debug + Send + Sync + 'static>(mut self, name: &str, value: V) -> Self {
        self.spec
            .dependencies
            .add(Some(name), TypeKey::of::<V>(), Dependency::Value(Value::described(value)));
        self
    }

    /// Supplies an existing shared object for the member `name`.
    pub fn with_shared<P: ?Sized + Send + Sync + 'static>(mut self, name: &str, object: Arc<P>) -> Self {
        self.spec
            .dependencies
            .add(Some(name), TypeKey::of::<P>(), Dependency::Value(Value::new(object)));
        self
    }

    /// Builds the member `name` of type `P` from a nested instance.
    pub fn with_dependency<P: ?Sized + 'static>(mut self, name: &str, instance: impl Into<Instance>) -> Self {
        self.spec.dependencies.add(
            Some(name),
            TypeKey::of::<P>(),
            Dependency::Instance(Arc::new(instance.into())),
        );
        self
    }

    /// Builds every member of type `P` from a nested instance, whatever its name.
    pub fn with_dependency_of_type<P: ?Sized + 'static>(mut self, instance: impl Into<Instance>) -> Self {
        self.spec
            .dependencies
            .add(None, TypeKey::of::<P>(), Dependency::Instance(Arc::new(instance.into())));
        self
    }

    /// Supplies an explicit list for the enumerable member `name` with
    /// element type `E`, replacing "all registered instances".
    pub fn with_instances<E: ?Sized + 'static>(mut self, name: &str, instances: Vec<Instance>) -> Self {
        let instances = instances.into_iter().map(Arc::new).collect();
        self.spec
            .dependencies
            .add(Some(name), TypeKey::of::<E>(), Dependency::Instances(instances));
        self
    }

    /// Pins the constructor labelled `label` instead of running selection.
    pub fn using_constructor(mut self, label: &'static str) -> Self {
        self.spec.constructor = Some(label);
        self
    }

    pub fn dependencies(&self) -> &DependencyCollection {
        &self.spec.dependencies
    }
}

impl Configurable for ConstructedInstance {
    fn core_mut(&mut self) -> &mut InstanceCore {
        &mut self.core
    }
}

impl From<ConstructedInstance> for Instance {
    fn from(instance: ConstructedInstance) -> Self {
        Instance::from_kind(instance.core, InstanceKind::Constructed(instance.spec))
    }
}
