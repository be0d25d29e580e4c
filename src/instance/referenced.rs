//! Instances that delegate to another named instance.

use super::{Configurable, Instance, InstanceCore, InstanceKind};
use crate::key::TypeKey;

#[derive(Clone)]
pub(crate) struct ReferencedSpec {
    pub(crate) target: String,
    /// Family holding the target; `None` means the requested plugin family.
    pub(crate) plugin: Option<TypeKey>,
}

impl ReferencedSpec {
    pub(crate) fn description(&self) -> String {
        match &self.plugin {
            Some(plugin) => format!("Reference to '{}' of {}", self.target, plugin),
            None => format!("Reference to '{}'", self.target),
        }
    }
}

/// Builder for an instance that resolves another registered instance by name.
///
/// ```rust
/// use ferrous_ioc::prelude::*;
/// use std::sync::Arc;
///
/// let mut registry = Registry::new();
/// registry.for_type::<String>().add(Instance::value("primary".to_string()).named("main"));
/// registry.for_type::<String>().use_instance(Instance::referenced("main"));
///
/// let container = Container::new(registry);
/// assert_eq!(*container.get_instance::<String>().unwrap(), "primary");
/// ```
pub struct ReferencedInstance {
    core: InstanceCore,
    spec: ReferencedSpec,
}

impl ReferencedInstance {
    pub(crate) fn new(target: &str) -> Self {
        Self {
            core: InstanceCore::new(),
            spec: ReferencedSpec {
                target: target.to_string(),
                plugin: None,
            },
        }
    }

    /// Looks the target up in the family of `P` instead of the requested one.
    /// The target must be pluggable into the requested plugin type.
    pub fn in_family<P: ?Sized + 'static>(mut self) -> Self {
        self.spec.plugin = Some(TypeKey::of::<P>());
        self
    }
}

impl Configurable for ReferencedInstance {
    fn core_mut(&mut self) -> &mut InstanceCore {
        &mut self.core
    }
}

impl From<ReferencedInstance> for Instance {
    fn from(instance: ReferencedInstance) -> Self {
        Instance::from_kind(instance.core, InstanceKind::Referenced(instance.spec))
    }
}
