//! The pipeline graph: registered families, policies and memoized plans.
//!
//! The graph owns configuration ([`GraphState`], behind a `RwLock`) and the
//! plan memo (a `DashMap`, so compiling different instances never blocks).
//! It is shared by a root container and all of its nested containers; each
//! graph has a process-unique id used to key thread-local caches.

mod family;
mod model;

pub(crate) use family::{OpenFamily, PluginFamily};
pub use model::{FamilyModel, GraphModel, InstanceModel};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::descriptor::{ConstructorSelector, Setter};
use crate::error::{DiError, DiResult};
use crate::instance::{Instance, InstanceId};
use crate::interception::{Interceptor, InterceptorPolicy};
use crate::key::TypeKey;
use crate::lifecycle::{CacheKey, Lifecycle};
use crate::plan::{BuildPlan, PlanCompiler};

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(1);

type SetterFilter = Arc<dyn Fn(&Setter) -> bool + Send + Sync>;

/// Selects optional setters that are filled by auto-wiring.
#[derive(Clone, Default)]
pub(crate) struct SetterPolicies {
    pub(crate) types: Vec<TypeKey>,
    pub(crate) filters: Vec<SetterFilter>,
}

impl SetterPolicies {
    fn selects(&self, setter: &Setter) -> bool {
        self.types.contains(setter.ty()) || self.filters.iter().any(|filter| filter(setter))
    }
}

/// Graph-wide policies.
#[derive(Clone, Default)]
pub(crate) struct Policies {
    pub(crate) interceptors: Vec<Arc<dyn InterceptorPolicy>>,
    pub(crate) constructors: ConstructorSelector,
    pub(crate) setters: SetterPolicies,
}

/// Everything a registry configures.
#[derive(Clone, Default)]
pub(crate) struct GraphState {
    pub(crate) families: AHashMap<TypeKey, PluginFamily>,
    pub(crate) open_families: AHashMap<&'static str, OpenFamily>,
    pub(crate) policies: Policies,
}

impl GraphState {
    pub(crate) fn family_mut(&mut self, plugin: &TypeKey) -> &mut PluginFamily {
        self.families
            .entry(plugin.clone())
            .or_insert_with(|| PluginFamily::new(plugin.clone()))
    }

    pub(crate) fn open_family_mut(&mut self, template: &'static str) -> &mut OpenFamily {
        self.open_families
            .entry(template)
            .or_insert_with(|| OpenFamily::new(template))
    }

    /// Merges another configuration into this one.
    pub(crate) fn merge(&mut self, other: GraphState) {
        for (plugin, family) in other.families {
            match self.families.get_mut(&plugin) {
                Some(existing) => existing.merge(family),
                None => {
                    self.families.insert(plugin, family);
                }
            }
        }
        for (template, open) in other.open_families {
            let existing = self.open_family_mut(template);
            for instance in open.instances {
                existing.add(instance);
            }
            if open.default.is_some() {
                existing.default = open.default;
            }
            if open.lifecycle.is_some() {
                existing.lifecycle = open.lifecycle;
            }
        }
        self.policies.interceptors.extend(other.policies.interceptors);
        self.policies.constructors.extend(other.policies.constructors);
        self.policies.setters.types.extend(other.policies.setters.types);
        self.policies.setters.filters.extend(other.policies.setters.filters);
    }

    /// True when a default instance exists, or an open family can close for
    /// `plugin`.
    pub(crate) fn has_default(&self, plugin: &TypeKey) -> bool {
        if let Some(family) = self.families.get(plugin) {
            return family.default_instance().is_some();
        }
        plugin
            .generic()
            .and_then(|args| self.open_families.get(args.template).map(|open| open.can_close(args)))
            .unwrap_or(false)
    }

    pub(crate) fn find_instance(&self, plugin: &TypeKey, name: &str) -> Option<Arc<Instance>> {
        self.families.get(plugin).and_then(|family| family.find(name))
    }

    /// The family's lifecycle when `instance` is registered in it.
    pub(crate) fn family_lifecycle(&self, plugin: &TypeKey, instance: InstanceId) -> Option<Lifecycle> {
        self.families
            .get(plugin)
            .filter(|family| family.contains(instance))
            .and_then(|family| family.lifecycle)
    }

    /// Instance interceptors, then family interceptors, then policies.
    pub(crate) fn interceptors_for(&self, plugin: &TypeKey, instance: &Instance) -> Vec<Interceptor> {
        let mut interceptors = instance.interceptors().to_vec();
        if let Some(family) = self.families.get(plugin) {
            interceptors.extend(family.interceptors.iter().cloned());
        }
        for policy in &self.policies.interceptors {
            interceptors.extend(policy.determine_interceptors(plugin, instance));
        }
        interceptors
    }

    pub(crate) fn constructor_selector(&self) -> &ConstructorSelector {
        &self.policies.constructors
    }

    pub(crate) fn setter_selected(&self, setter: &Setter) -> bool {
        self.policies.setters.selects(setter)
    }
}

/// Configuration shared by a container and its nested containers.
pub(crate) struct PluginGraph {
    id: u64,
    state: RwLock<GraphState>,
    plans: DashMap<CacheKey, Arc<BuildPlan>>,
}

impl PluginGraph {
    pub(crate) fn new(state: GraphState) -> Self {
        Self {
            id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
            state: RwLock::new(state),
            plans: DashMap::new(),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Merges `changes` into the configuration and drops every memoized plan.
    pub(crate) fn configure(&self, changes: GraphState) {
        self.state.write().merge(changes);
        self.plans.clear();
        debug!(target: "ferrous_ioc", graph = self.id, "configuration changed; build plans invalidated");
    }

    /// Closes an open generic family for `plugin` if no family exists yet.
    fn ensure_family(&self, plugin: &TypeKey) {
        let Some(args) = plugin.generic() else {
            return;
        };
        if self.state.read().families.contains_key(plugin) {
            return;
        }

        let mut state = self.state.write();
        if state.families.contains_key(plugin) {
            return;
        }
        let closed = state
            .open_families
            .get(args.template)
            .and_then(|open| open.close(plugin, args));
        if let Some(family) = closed {
            debug!(
                target: "ferrous_ioc",
                plugin = %plugin,
                template = args.template,
                instances = family.instances.len(),
                "closed open generic family"
            );
            state.families.insert(plugin.clone(), family);
        }
    }

    /// The memoized plan for `instance` built as `plugin`.
    pub(crate) fn plan_for(&self, plugin: &TypeKey, instance: &Arc<Instance>) -> Arc<BuildPlan> {
        let key = CacheKey::new(plugin.clone(), instance.id());
        if let Some(plan) = self.plans.get(&key) {
            return plan.clone();
        }
        let state = self.state.read();
        PlanCompiler::new(&state, &self.plans).plan_for(plugin, instance)
    }

    /// Compiles a plan that is not memoized, for one-off instances.
    pub(crate) fn detached_plan(&self, plugin: &TypeKey, instance: &Arc<Instance>) -> Arc<BuildPlan> {
        let plans = DashMap::new();
        let state = self.state.read();
        PlanCompiler::new(&state, &plans).plan_for(plugin, instance)
    }

    /// The default instance of `plugin`.
    pub(crate) fn default_instance(&self, plugin: &TypeKey) -> DiResult<Arc<Instance>> {
        self.ensure_family(plugin);
        self.state
            .read()
            .families
            .get(plugin)
            .and_then(PluginFamily::default_instance)
            .ok_or_else(|| DiError::MissingDefault {
                plugin_type: plugin.short_name(),
            })
    }

    pub(crate) fn default_plan(&self, plugin: &TypeKey) -> DiResult<Arc<BuildPlan>> {
        let instance = self.default_instance(plugin)?;
        Ok(self.plan_for(plugin, &instance))
    }

    /// The plan for the named instance. On a miss, the family's missing-named
    /// handler manufactures an instance under that name and registers it.
    pub(crate) fn named_plan(&self, plugin: &TypeKey, name: &str) -> DiResult<Arc<BuildPlan>> {
        self.ensure_family(plugin);
        let found = self.state.read().find_instance(plugin, name);
        let instance = match found {
            Some(instance) => instance,
            None => self.add_missing_named(plugin, name)?,
        };
        Ok(self.plan_for(plugin, &instance))
    }

    fn add_missing_named(&self, plugin: &TypeKey, name: &str) -> DiResult<Arc<Instance>> {
        let mut state = self.state.write();
        let missing = || DiError::MissingNamed {
            plugin_type: plugin.short_name(),
            name: name.to_string(),
        };
        let family = state.families.get_mut(plugin).ok_or_else(missing)?;
        if let Some(existing) = family.find(name) {
            return Ok(existing);
        }
        let handler = family.missing_named.clone().ok_or_else(missing)?;
        let created = Arc::new(handler.clone_with_name(name));
        debug!(target: "ferrous_ioc", plugin = %plugin, instance = name, "created instance for missing name");
        family.add(created.clone());
        Ok(created)
    }

    /// Plans for every registered instance of `plugin`, in registration order.
    pub(crate) fn all_plans(&self, plugin: &TypeKey) -> Vec<Arc<BuildPlan>> {
        self.ensure_family(plugin);
        let instances: Vec<Arc<Instance>> = self
            .state
            .read()
            .families
            .get(plugin)
            .map(|family| family.instances.clone())
            .unwrap_or_default();
        instances.iter().map(|instance| self.plan_for(plugin, instance)).collect()
    }

    /// Every closed registration, for validation.
    pub(crate) fn registrations(&self) -> Vec<(TypeKey, Arc<Instance>)> {
        let state = self.state.read();
        let mut families: Vec<&PluginFamily> = state.families.values().collect();
        families.sort_by(|a, b| a.plugin_type.name().cmp(b.plugin_type.name()));
        families
            .into_iter()
            .flat_map(|family| {
                family
                    .all_with_fallback()
                    .map(move |instance| (family.plugin_type.clone(), instance.clone()))
            })
            .collect()
    }

    /// Identities of the named instance, or of every instance when `name` is
    /// `None`.
    pub(crate) fn instance_ids(&self, plugin: &TypeKey, name: Option<&str>) -> Vec<InstanceId> {
        let state = self.state.read();
        let Some(family) = state.families.get(plugin) else {
            return Vec::new();
        };
        match name {
            Some(name) => family.find(name).map(|i| i.id()).into_iter().collect(),
            None => family.all_with_fallback().map(|i| i.id()).collect(),
        }
    }

    /// The identity of the default instance.
    pub(crate) fn default_id(&self, plugin: &TypeKey) -> Option<InstanceId> {
        self.default_instance(plugin).ok().map(|i| i.id())
    }

    /// Removes the named instance and its memoized plans.
    pub(crate) fn remove(&self, plugin: &TypeKey, name: &str) -> Option<InstanceId> {
        let mut state = self.state.write();
        let family = state.families.get_mut(plugin)?;
        let id = family.find(name)?.id();
        family.remove(name);
        drop(state);
        self.plans.clear();
        Some(id)
    }

    pub(crate) fn model(&self) -> GraphModel {
        GraphModel::from_state(&self.state.read())
    }
}

impl fmt::Debug for PluginGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("PluginGraph")
            .field("id", &self.id)
            .field("families", &state.families.len())
            .field("open_families", &state.open_families.len())
            .field("plans", &self.plans.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Configurable;

    fn state_with(values: &[(&str, u32)]) -> GraphState {
        let mut state = GraphState::default();
        let family = state.family_mut(&TypeKey::of::<u32>());
        for (name, value) in values {
            family.add(Arc::new(Instance::value(*value).named(name).into()));
        }
        state
    }

    #[test]
    fn plans_are_memoized_by_instance() {
        let graph = PluginGraph::new(state_with(&[("one", 1)]));
        let first = graph.default_plan(&TypeKey::of::<u32>()).unwrap();
        let second = graph.default_plan(&TypeKey::of::<u32>()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn configure_invalidates_plans() {
        let graph = PluginGraph::new(state_with(&[("one", 1)]));
        let before = graph.default_plan(&TypeKey::of::<u32>()).unwrap();

        graph.configure(state_with(&[("one", 2)]));
        let after = graph.default_plan(&TypeKey::of::<u32>()).unwrap();

        assert!(!Arc::ptr_eq(&before, &after));
        assert_ne!(before.instance().id(), after.instance().id());
    }

    #[test]
    fn missing_named_handler_registers_the_created_instance() {
        let mut state = state_with(&[("one", 1)]);
        state.family_mut(&TypeKey::of::<u32>()).missing_named = Some(Arc::new(Instance::value(0u32).into()));
        let graph = PluginGraph::new(state);

        let plan = graph.named_plan(&TypeKey::of::<u32>(), "dynamic").unwrap();
        assert_eq!(plan.instance().name(), "dynamic");
        assert_eq!(graph.all_plans(&TypeKey::of::<u32>()).len(), 2);

        let again = graph.named_plan(&TypeKey::of::<u32>(), "dynamic").unwrap();
        assert!(Arc::ptr_eq(&plan, &again));
    }

    #[test]
    fn misses_without_handler_name_the_plugin_type() {
        let graph = PluginGraph::new(state_with(&[("one", 1), ("two", 2)]));
        let err = graph.named_plan(&TypeKey::of::<u32>(), "three").unwrap_err();
        assert!(matches!(err, DiError::MissingNamed { .. }));

        let err = graph.default_plan(&TypeKey::of::<String>()).unwrap_err();
        assert!(err.to_string().contains("String"));
    }
}
