//! Plugin families: every instance registered for one plugin type.

use std::sync::Arc;

use tracing::trace;

use crate::instance::{Instance, InstanceId};
use crate::interception::Interceptor;
use crate::key::{GenericArgs, TypeKey};
use crate::lifecycle::Lifecycle;

/// All instances registered for one plugin type, plus family-wide settings.
#[derive(Clone)]
pub(crate) struct PluginFamily {
    pub(crate) plugin_type: TypeKey,
    /// Registration order; enumerable dependencies see this order.
    pub(crate) instances: Vec<Arc<Instance>>,
    pub(crate) default: Option<String>,
    pub(crate) fallback: Option<Arc<Instance>>,
    pub(crate) missing_named: Option<Arc<Instance>>,
    pub(crate) lifecycle: Option<Lifecycle>,
    pub(crate) interceptors: Vec<Interceptor>,
}

impl PluginFamily {
    pub(crate) fn new(plugin_type: TypeKey) -> Self {
        Self {
            plugin_type,
            instances: Vec::new(),
            default: None,
            fallback: None,
            missing_named: None,
            lifecycle: None,
            interceptors: Vec::new(),
        }
    }

    /// Adds an instance. One with the same name is replaced in place.
    pub(crate) fn add(&mut self, instance: Arc<Instance>) {
        match self.instances.iter_mut().find(|i| i.name() == instance.name()) {
            Some(existing) => {
                trace!(target: "ferrous_ioc", plugin = %self.plugin_type, instance = instance.name(), "replacing instance");
                *existing = instance;
            }
            None => self.instances.push(instance),
        }
    }

    /// Adds an instance and makes it the default.
    pub(crate) fn set_default(&mut self, instance: Arc<Instance>) {
        self.default = Some(instance.name().to_string());
        self.add(instance);
    }

    /// Removes the named instance. Returns false when it was not registered.
    pub(crate) fn remove(&mut self, name: &str) -> bool {
        let before = self.instances.len();
        self.instances.retain(|i| i.name() != name);
        if self.default.as_deref() == Some(name) {
            self.default = None;
        }
        if self.fallback.as_ref().map(|f| f.name()) == Some(name) {
            self.fallback = None;
        }
        before != self.instances.len()
    }

    /// The explicit default, else the only instance, else the fallback.
    pub(crate) fn default_instance(&self) -> Option<Arc<Instance>> {
        if let Some(name) = &self.default {
            if let Some(found) = self.find(name) {
                return Some(found);
            }
        }
        match self.instances.as_slice() {
            [only] => Some(only.clone()),
            _ => self.fallback.clone(),
        }
    }

    /// The instance registered under `name`, including the fallback.
    pub(crate) fn find(&self, name: &str) -> Option<Arc<Instance>> {
        self.instances
            .iter()
            .chain(self.fallback.iter())
            .find(|i| i.name() == name)
            .cloned()
    }

    pub(crate) fn contains(&self, id: InstanceId) -> bool {
        self.instances.iter().chain(self.fallback.iter()).any(|i| i.id() == id)
    }

    /// Every instance including the fallback, for validation.
    pub(crate) fn all_with_fallback(&self) -> impl Iterator<Item = &Arc<Instance>> {
        self.instances.iter().chain(self.fallback.iter())
    }

    /// Merges `other` into this family; its settings win where set.
    pub(crate) fn merge(&mut self, other: PluginFamily) {
        for instance in other.instances {
            self.add(instance);
        }
        if other.default.is_some() {
            self.default = other.default;
        }
        if other.fallback.is_some() {
            self.fallback = other.fallback;
        }
        if other.missing_named.is_some() {
            self.missing_named = other.missing_named;
        }
        if other.lifecycle.is_some() {
            self.lifecycle = other.lifecycle;
        }
        self.interceptors.extend(other.interceptors);
    }
}

/// Open generic instances registered under a template name.
#[derive(Clone)]
pub(crate) struct OpenFamily {
    pub(crate) template: &'static str,
    pub(crate) instances: Vec<Arc<Instance>>,
    pub(crate) default: Option<String>,
    pub(crate) lifecycle: Option<Lifecycle>,
}

impl OpenFamily {
    pub(crate) fn new(template: &'static str) -> Self {
        Self {
            template,
            instances: Vec::new(),
            default: None,
            lifecycle: None,
        }
    }

    pub(crate) fn add(&mut self, instance: Arc<Instance>) {
        match self.instances.iter_mut().find(|i| i.name() == instance.name()) {
            Some(existing) => *existing = instance,
            None => self.instances.push(instance),
        }
    }

    /// Closes every instance that can be closed over `args`. Instances that
    /// cannot be closed are skipped; `None` when nothing closed.
    pub(crate) fn close(&self, plugin_type: &TypeKey, args: &GenericArgs) -> Option<PluginFamily> {
        let mut family = PluginFamily::new(plugin_type.clone());
        for instance in &self.instances {
            if let Some(closed) = instance.close_type(&args.arguments) {
                family.add(Arc::new(closed));
            }
        }
        if family.instances.is_empty() {
            return None;
        }
        family.default = self.default.clone();
        family.lifecycle = self.lifecycle;
        Some(family)
    }

    /// True when some instance can be closed over `args`.
    pub(crate) fn can_close(&self, args: &GenericArgs) -> bool {
        self.instances
            .iter()
            .any(|i| i.close_type(&args.arguments).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Configurable;

    fn named(name: &str, value: u32) -> Arc<Instance> {
        Arc::new(Instance::value(value).named(name).into())
    }

    #[test]
    fn same_name_replaces_in_place() {
        let mut family = PluginFamily::new(TypeKey::of::<u32>());
        family.add(named("a", 1));
        family.add(named("b", 2));
        family.add(named("a", 3));

        let names: Vec<&str> = family.instances.iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(family.find("a").unwrap().description(), "Value 3");
    }

    #[test]
    fn default_prefers_explicit_then_single_then_fallback() {
        let mut family = PluginFamily::new(TypeKey::of::<u32>());
        assert!(family.default_instance().is_none());

        family.fallback = Some(named("fallback", 0));
        assert_eq!(family.default_instance().unwrap().name(), "fallback");

        family.add(named("only", 1));
        assert_eq!(family.default_instance().unwrap().name(), "only");

        family.add(named("second", 2));
        assert_eq!(family.default_instance().unwrap().name(), "fallback");

        family.default = Some("second".to_string());
        assert_eq!(family.default_instance().unwrap().name(), "second");
    }

    #[test]
    fn removing_the_default_clears_it() {
        let mut family = PluginFamily::new(TypeKey::of::<u32>());
        family.set_default(named("main", 1));
        family.add(named("other", 2));

        assert!(family.remove("main"));
        assert!(!family.remove("main"));
        assert!(family.default.is_none());
        assert_eq!(family.default_instance().unwrap().name(), "other");
    }
}
