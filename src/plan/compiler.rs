//! Compiles instances into build plans.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace};

use super::{ArgumentSource, BuildPlan, ConstructorStep, DependencySource, SetterStep};
use crate::dependencies::Dependency;
use crate::descriptor::{Caster, Collector, ConstructorSelector, ParameterKind, Setter, TypeDescriptor};
use crate::error::ConfigurationError;
use crate::graph::GraphState;
use crate::instance::{ConstructedSpec, Instance, InstanceKind};
use crate::interception;
use crate::key::TypeKey;
use crate::lifecycle::CacheKey;
use crate::value::Value;
use crate::DependencyCollection;

const MISSING_PRIMITIVE: &str = "required primitive dependency is not explicitly defined";

/// Compiles plans against one read-locked view of the graph.
///
/// Plans are memoized in `plans` by (plugin type, instance identity). The
/// compile path tracks references being compiled so a reference cycle becomes
/// a failed member instead of unbounded recursion.
pub(crate) struct PlanCompiler<'a> {
    graph: &'a GraphState,
    plans: &'a DashMap<CacheKey, Arc<BuildPlan>>,
    path: Vec<(CacheKey, String)>,
}

impl<'a> PlanCompiler<'a> {
    pub(crate) fn new(graph: &'a GraphState, plans: &'a DashMap<CacheKey, Arc<BuildPlan>>) -> Self {
        Self {
            graph,
            plans,
            path: Vec::new(),
        }
    }

    /// The memoized plan for `instance` built as `plugin`, compiling it on
    /// first use.
    pub(crate) fn plan_for(&mut self, plugin: &TypeKey, instance: &Arc<Instance>) -> Arc<BuildPlan> {
        let key = CacheKey::new(plugin.clone(), instance.id());
        if let Some(plan) = self.plans.get(&key) {
            return plan.clone();
        }

        if let Some(position) = self.path.iter().position(|(k, _)| *k == key) {
            let mut cycle: Vec<String> = self.path[position..].iter().map(|(_, n)| n.clone()).collect();
            cycle.push(instance.name().to_string());
            let failed = DependencySource::Failed {
                reason: ConfigurationError::CyclicReference { path: cycle }.to_string(),
                context: context(plugin, instance),
            };
            return Arc::new(self.finish(plugin, instance, failed));
        }

        self.path.push((key.clone(), instance.name().to_string()));
        let source = self.compile(plugin, instance);
        self.path.pop();

        let plan = Arc::new(self.finish(plugin, instance, source));
        if plan.is_valid() {
            trace!(target: "ferrous_ioc", plugin = %plugin, instance = instance.name(), "compiled build plan");
        } else {
            debug!(
                target: "ferrous_ioc",
                plugin = %plugin,
                instance = instance.name(),
                failures = plan.failures().len(),
                "compiled invalid build plan"
            );
        }
        self.plans.entry(key).or_insert(plan).clone()
    }

    fn finish(&self, plugin: &TypeKey, instance: &Arc<Instance>, source: DependencySource) -> BuildPlan {
        let lifecycle = instance
            .lifecycle()
            .or_else(|| self.graph.family_lifecycle(plugin, instance.id()))
            .unwrap_or_default();
        BuildPlan::new(plugin.clone(), instance.clone(), lifecycle, source)
    }

    fn compile(&mut self, plugin: &TypeKey, instance: &Arc<Instance>) -> DependencySource {
        let interceptors = self.graph.interceptors_for(plugin, instance);

        let compiled = match &instance.kind {
            InstanceKind::Constructed(spec) => self.constructed(plugin, instance, spec).map(|inner| {
                let descriptor = spec.descriptor.clone();
                (inner, descriptor.type_key().clone(), caster_of(descriptor))
            }),
            InstanceKind::Lambda(spec) => Ok((DependencySource::Lambda(spec.clone()), spec.returned.clone(), no_cast())),
            InstanceKind::Literal(spec) => {
                let returned = spec.value.type_key().clone();
                if returned == *plugin || !interceptors.is_empty() {
                    Ok((DependencySource::Constant(spec.value.clone()), returned, no_cast()))
                } else {
                    Err(ConfigurationError::ValueMismatch {
                        value_type: returned.short_name(),
                        plugin_type: plugin.short_name(),
                    })
                }
            }
            InstanceKind::Referenced(spec) => {
                let family = spec.plugin.as_ref().unwrap_or(plugin);
                match self.graph.find_instance(family, &spec.target) {
                    Some(target) => {
                        let nested = self.plan_for(plugin, &target);
                        Ok((DependencySource::Reference(nested), plugin.clone(), no_cast()))
                    }
                    None => Err(ConfigurationError::MissingReference {
                        plugin_type: family.short_name(),
                        name: spec.target.clone(),
                    }),
                }
            }
            InstanceKind::Serialized(spec) => {
                let serialized = spec.clone();
                let cast: Box<dyn Fn(&TypeKey) -> Option<Caster>> = Box::new(move |t| serialized.caster_for(t));
                Ok((DependencySource::Deserialize(spec.clone()), spec.returned.clone(), cast))
            }
        };

        let wrapped = compiled
            .and_then(|(inner, returned, cast)| interception::wrap(plugin, &returned, &*cast, inner, &interceptors));
        match wrapped {
            Ok(source) => source,
            Err(err) => DependencySource::Failed {
                reason: err.to_string(),
                context: context(plugin, instance),
            },
        }
    }

    fn constructed(
        &mut self,
        plugin: &TypeKey,
        instance: &Instance,
        spec: &ConstructedSpec,
    ) -> Result<DependencySource, ConfigurationError> {
        let descriptor = &spec.descriptor;
        if descriptor.is_open() {
            return Err(ConfigurationError::OpenGeneric {
                template: descriptor.display_name(),
            });
        }
        if !descriptor.can_be_plugged_into(plugin) {
            return Err(ConfigurationError::NotPluggable {
                concrete_type: descriptor.display_name(),
                plugin_type: plugin.short_name(),
            });
        }

        let constructor = match spec.constructor {
            Some(label) => ConstructorSelector::labelled(descriptor, label)?,
            None => self.graph.constructor_selector().select(descriptor)?,
        };

        let context = context(plugin, instance);
        let arguments = constructor
            .parameters()
            .iter()
            .map(|parameter| ArgumentSource {
                name: parameter.name(),
                source: match spec.dependencies.find(parameter.name(), parameter.ty()) {
                    Some(dependency) => self.explicit(parameter.ty(), dependency, parameter.collector(), &context),
                    None => self.auto_wired(
                        parameter.ty(),
                        parameter.kind(),
                        parameter.collector(),
                        parameter.default_value().cloned(),
                        &context,
                    ),
                },
            })
            .collect();

        let setters: Vec<SetterStep> = descriptor
            .setters()
            .iter()
            .filter_map(|setter| self.setter(setter, &spec.dependencies, &context))
            .collect();

        let step = ConstructorStep {
            descriptor: descriptor.clone(),
            constructor,
            arguments,
            context,
        };

        if setters.is_empty() {
            Ok(DependencySource::Constructor(step))
        } else {
            Ok(DependencySource::Setters { step, setters })
        }
    }

    /// Setters are filled when mandatory, explicitly supplied, or selected by
    /// a setter policy.
    fn setter(&mut self, setter: &Arc<Setter>, dependencies: &DependencyCollection, context: &Arc<str>) -> Option<SetterStep> {
        let source = match dependencies.find(setter.name(), setter.ty()) {
            Some(dependency) => self.explicit(setter.ty(), dependency, None, context),
            None if setter.is_mandatory() || self.graph.setter_selected(setter) => {
                self.auto_wired(setter.ty(), setter.kind(), None, None, context)
            }
            None => return None,
        };
        Some(SetterStep {
            setter: setter.clone(),
            source,
        })
    }

    fn explicit(
        &mut self,
        ty: &TypeKey,
        dependency: &Dependency,
        collect: Option<&Collector>,
        context: &Arc<str>,
    ) -> DependencySource {
        match (dependency, collect) {
            (Dependency::Value(value), _) => DependencySource::Constant(value.clone()),
            (Dependency::Instance(instance), None) => DependencySource::Reference(self.plan_for(ty, instance)),
            (Dependency::Instance(instance), Some(collect)) => DependencySource::ExplicitEnumerable {
                element: ty.clone(),
                items: vec![self.plan_for(ty, instance)],
                collect: collect.clone(),
            },
            (Dependency::Instances(instances), Some(collect)) => DependencySource::ExplicitEnumerable {
                element: ty.clone(),
                items: instances.iter().map(|i| self.plan_for(ty, i)).collect(),
                collect: collect.clone(),
            },
            (Dependency::Instances(_), None) => DependencySource::Failed {
                reason: format!("a list of instances cannot be supplied for a single {}", ty),
                context: context.clone(),
            },
        }
    }

    fn auto_wired(
        &self,
        ty: &TypeKey,
        kind: ParameterKind,
        collect: Option<&Collector>,
        default: Option<Value>,
        context: &Arc<str>,
    ) -> DependencySource {
        let failed = |reason: String| DependencySource::Failed {
            reason,
            context: context.clone(),
        };
        match (kind, collect) {
            (ParameterKind::Enumerable, Some(collect)) => DependencySource::EnumerableAll {
                element: ty.clone(),
                collect: collect.clone(),
            },
            (ParameterKind::Primitive, _) => match default {
                Some(value) => DependencySource::Constant(value),
                None => failed(MISSING_PRIMITIVE.to_string()),
            },
            _ if self.graph.has_default(ty) => DependencySource::Default { plugin: ty.clone() },
            _ => match default {
                Some(value) => DependencySource::Constant(value),
                None => failed(format!("no default instance is registered for {}", ty)),
            },
        }
    }
}

/// Names the instance and plugin type in build errors.
fn context(plugin: &TypeKey, instance: &Instance) -> Arc<str> {
    Arc::from(format!("instance '{}' of {}", instance.name(), plugin))
}

fn caster_of(descriptor: Arc<TypeDescriptor>) -> Box<dyn Fn(&TypeKey) -> Option<Caster>> {
    Box::new(move |target| descriptor.caster_for(target))
}

fn no_cast() -> Box<dyn Fn(&TypeKey) -> Option<Caster>> {
    Box::new(|_| None)
}
