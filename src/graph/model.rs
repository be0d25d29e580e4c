//! Serializable snapshot of the configuration for diagnostics.

use serde::Serialize;

use super::{GraphState, PluginFamily};
use crate::instance::Instance;
use crate::lifecycle::Lifecycle;

/// One registered instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceModel {
    pub name: String,
    pub description: String,
    pub lifecycle: Option<Lifecycle>,
    pub is_async: bool,
    pub interceptors: Vec<String>,
}

/// One plugin family, or one open generic template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FamilyModel {
    pub plugin_type: String,
    pub is_open_generic: bool,
    pub lifecycle: Option<Lifecycle>,
    pub default_instance: Option<String>,
    pub fallback: Option<String>,
    pub instances: Vec<InstanceModel>,
}

/// What a container knows about its configuration.
///
/// ```rust
/// use ferrous_ioc::prelude::*;
///
/// let mut registry = Registry::new();
/// registry.for_type::<u32>().use_instance(Instance::value(1u32).named("one")).singleton();
///
/// let model = Container::new(registry).model();
/// let family = model.family("u32").unwrap();
/// assert_eq!(family.default_instance.as_deref(), Some("one"));
/// assert_eq!(family.lifecycle, Some(Lifecycle::Singleton));
/// assert!(model.to_json().unwrap().contains("\"one\""));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphModel {
    /// Families sorted by plugin type name.
    pub families: Vec<FamilyModel>,
}

impl InstanceModel {
    fn of(instance: &Instance) -> Self {
        Self {
            name: instance.name().to_string(),
            description: instance.description(),
            lifecycle: instance.lifecycle(),
            is_async: instance.is_async(),
            interceptors: instance.interceptors().iter().map(ToString::to_string).collect(),
        }
    }
}

impl FamilyModel {
    fn of(family: &PluginFamily) -> Self {
        Self {
            plugin_type: family.plugin_type.short_name(),
            is_open_generic: false,
            lifecycle: family.lifecycle,
            default_instance: family.default_instance().map(|i| i.name().to_string()),
            fallback: family.fallback.as_ref().map(|i| i.name().to_string()),
            instances: family.instances.iter().map(|i| InstanceModel::of(i)).collect(),
        }
    }
}

impl GraphModel {
    pub(crate) fn from_state(state: &GraphState) -> Self {
        let mut families: Vec<FamilyModel> = state.families.values().map(FamilyModel::of).collect();
        families.extend(state.open_families.values().map(|open| FamilyModel {
            plugin_type: format!("{}<>", open.template),
            is_open_generic: true,
            lifecycle: open.lifecycle,
            default_instance: open.default.clone(),
            fallback: None,
            instances: open.instances.iter().map(|i| InstanceModel::of(i)).collect(),
        }));
        families.sort_by(|a, b| a.plugin_type.cmp(&b.plugin_type));
        Self { families }
    }

    /// The family whose plugin type is displayed as `plugin_type`.
    pub fn family(&self, plugin_type: &str) -> Option<&FamilyModel> {
        self.families.iter().find(|f| f.plugin_type == plugin_type)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
