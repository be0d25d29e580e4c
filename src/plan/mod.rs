//! Build plans: compiled, reusable descriptions of how to build a value.
//!
//! A [`BuildPlan`] is compiled once per (plugin type, instance) and memoized
//! by instance identity. Its body is a tree of [`DependencySource`] nodes that
//! is immutable after compilation and safe to execute repeatedly from any
//! thread. Compilation never fails outright: unresolvable members become
//! `Failed` nodes and the plan reports them through [`BuildPlan::failures`].
//! Only [`BuildPlan::executable`] turns them into a configuration error.

mod compiler;
mod visitor;

pub(crate) use compiler::PlanCompiler;
pub use visitor::{PlanNode, PlanVisitor};

use std::fmt;
use std::sync::Arc;

use crate::container::BuildSession;
use crate::descriptor::{Arguments, BoxedObject, Caster, Collector, Constructor, Setter, TypeDescriptor};
use crate::error::{ConfigurationError, DependencyFailure, DiError, DiResult};
use crate::instance::{Instance, LambdaFactory, LambdaSpec, SerializedSpec};
use crate::interception::InterceptionPlan;
use crate::internal::BoxFuture;
use crate::key::TypeKey;
use crate::lifecycle::{CacheKey, Lifecycle};
use crate::value::Value;

/// A constructor call with its ordered argument sources.
pub(crate) struct ConstructorStep {
    pub(crate) descriptor: Arc<TypeDescriptor>,
    pub(crate) constructor: Arc<Constructor>,
    pub(crate) arguments: Vec<ArgumentSource>,
    /// Names the instance and plugin type in build errors.
    pub(crate) context: Arc<str>,
}

pub(crate) struct ArgumentSource {
    pub(crate) name: &'static str,
    pub(crate) source: DependencySource,
}

pub(crate) struct SetterStep {
    pub(crate) setter: Arc<Setter>,
    pub(crate) source: DependencySource,
}

/// One node of a compiled plan.
pub(crate) enum DependencySource {
    /// A ready value.
    Constant(Value),
    /// Calls a constructor.
    Constructor(ConstructorStep),
    /// Calls a constructor, then fills setters in declaration order.
    Setters {
        step: ConstructorStep,
        setters: Vec<SetterStep>,
    },
    /// Every registered instance of `element`, in registration order.
    EnumerableAll { element: TypeKey, collect: Collector },
    /// An explicit list of nested instances.
    ExplicitEnumerable {
        element: TypeKey,
        items: Vec<Arc<BuildPlan>>,
        collect: Collector,
    },
    /// The default instance of `plugin`, auto-wired at build time.
    Default { plugin: TypeKey },
    /// A nested instance built through its own plan and lifecycle.
    Reference(Arc<BuildPlan>),
    Lambda(LambdaSpec),
    Deserialize(SerializedSpec),
    /// Upcasts the inner value to `target`.
    Cast {
        inner: Box<DependencySource>,
        target: TypeKey,
        caster: Caster,
    },
    Intercepted(Box<InterceptionPlan>),
    /// A member that could not be resolved, with the reason and the instance
    /// it belongs to.
    Failed { reason: String, context: Arc<str> },
}

impl ConstructorStep {
    fn argument_error(&self, member: String, source: DiError) -> DiError {
        DiError::Argument {
            concrete_type: self.descriptor.display_name(),
            member,
            source: Box::new(source),
        }
    }

    fn invoke(&self, arguments: Arguments) -> DiResult<BoxedObject> {
        self.constructor.invoke(&arguments).map_err(|source| DiError::Build {
            instance: self.context.to_string(),
            source,
        })
    }

    fn construct(&self, session: &BuildSession) -> DiResult<BoxedObject> {
        let mut arguments = Arguments::with_capacity(self.arguments.len());
        for argument in &self.arguments {
            let value = argument
                .source
                .execute(session)
                .map_err(|e| self.argument_error(format!("constructor argument '{}'", argument.name), e))?;
            arguments.push(argument.name, value);
        }
        self.invoke(arguments)
    }

    async fn construct_async(&self, session: &BuildSession) -> DiResult<BoxedObject> {
        let mut arguments = Arguments::with_capacity(self.arguments.len());
        for argument in &self.arguments {
            let value = argument
                .source
                .execute_async(session)
                .await
                .map_err(|e| self.argument_error(format!("constructor argument '{}'", argument.name), e))?;
            arguments.push(argument.name, value);
        }
        self.invoke(arguments)
    }

    fn apply(&self, object: &mut BoxedObject, step: &SetterStep, value: DiResult<Value>) -> DiResult<()> {
        let member = || format!("setter '{}'", step.setter.name());
        let value = value.map_err(|e| self.argument_error(member(), e))?;
        step.setter.apply(object.as_mut(), &value).map_err(|source| {
            self.argument_error(
                member(),
                DiError::Build {
                    instance: self.context.to_string(),
                    source,
                },
            )
        })
    }

    fn seal(&self, object: BoxedObject, session: &BuildSession) -> DiResult<Value> {
        let value = self.descriptor.seal(object)?;
        session.after_construction(&self.descriptor, &value);
        Ok(value)
    }
}

impl DependencySource {
    /// Builds a value. Async lambdas and interceptors fail with
    /// [`DiError::AsyncRequired`].
    pub(crate) fn execute(&self, session: &BuildSession) -> DiResult<Value> {
        match self {
            DependencySource::Constant(value) => Ok(value.clone()),
            DependencySource::Constructor(step) => {
                let object = step.construct(session)?;
                step.seal(object, session)
            }
            DependencySource::Setters { step, setters } => {
                let mut object = step.construct(session)?;
                for setter in setters {
                    let value = setter.source.execute(session);
                    step.apply(&mut object, setter, value)?;
                }
                step.seal(object, session)
            }
            DependencySource::EnumerableAll { element, collect } => collect(session.resolve_all(element)?),
            DependencySource::ExplicitEnumerable { items, collect, .. } => {
                let values = items
                    .iter()
                    .map(|plan| session.build(plan))
                    .collect::<DiResult<Vec<_>>>()?;
                collect(values)
            }
            DependencySource::Default { plugin } => session.resolve_default(plugin),
            DependencySource::Reference(plan) => session.build(plan),
            DependencySource::Lambda(spec) => match &spec.factory {
                LambdaFactory::Sync(factory) => factory(session).map_err(|source| DiError::Build {
                    instance: spec.description(),
                    source,
                }),
                LambdaFactory::Async(_) => Err(DiError::AsyncRequired {
                    plugin_type: spec.returned.short_name(),
                    instance: spec.description(),
                }),
            },
            DependencySource::Deserialize(spec) => spec.deserialize(),
            DependencySource::Cast { inner, caster, .. } => caster(&inner.execute(session)?),
            DependencySource::Intercepted(plan) => plan.execute(session),
            DependencySource::Failed { reason, context } => Err(unresolved(reason, context)),
        }
    }

    /// Builds a value, awaiting async lambdas and interceptors in order.
    pub(crate) fn execute_async<'a>(&'a self, session: &'a BuildSession) -> BoxFuture<'a, DiResult<Value>> {
        Box::pin(async move {
            match self {
                DependencySource::Constructor(step) => {
                    let object = step.construct_async(session).await?;
                    step.seal(object, session)
                }
                DependencySource::Setters { step, setters } => {
                    let mut object = step.construct_async(session).await?;
                    for setter in setters {
                        let value = setter.source.execute_async(session).await;
                        step.apply(&mut object, setter, value)?;
                    }
                    step.seal(object, session)
                }
                DependencySource::EnumerableAll { element, collect } => {
                    collect(session.resolve_all_async(element).await?)
                }
                DependencySource::ExplicitEnumerable { items, collect, .. } => {
                    let mut values = Vec::with_capacity(items.len());
                    for plan in items {
                        values.push(session.build_async(plan).await?);
                    }
                    collect(values)
                }
                DependencySource::Default { plugin } => session.resolve_default_async(plugin).await,
                DependencySource::Reference(plan) => session.build_async(plan).await,
                DependencySource::Lambda(spec) => match &spec.factory {
                    LambdaFactory::Sync(factory) => factory(session),
                    LambdaFactory::Async(factory) => factory(session.container().clone()).await,
                }
                .map_err(|source| DiError::Build {
                    instance: spec.description(),
                    source,
                }),
                DependencySource::Cast { inner, caster, .. } => caster(&inner.execute_async(session).await?),
                DependencySource::Intercepted(plan) => plan.execute_async(session).await,
                DependencySource::Constant(_) | DependencySource::Deserialize(_) | DependencySource::Failed { .. } => {
                    self.execute(session)
                }
            }
        })
    }

    /// True when this tree holds async lambdas or interceptors. Auto-wired
    /// members are resolved at build time and are not inspected.
    pub(crate) fn requires_async(&self) -> bool {
        match self {
            DependencySource::Constructor(step) => step.arguments.iter().any(|a| a.source.requires_async()),
            DependencySource::Setters { step, setters } => {
                step.arguments.iter().any(|a| a.source.requires_async())
                    || setters.iter().any(|s| s.source.requires_async())
            }
            DependencySource::ExplicitEnumerable { items, .. } => items.iter().any(|p| p.requires_async()),
            DependencySource::Reference(plan) => plan.requires_async(),
            DependencySource::Lambda(spec) => spec.is_async(),
            DependencySource::Cast { inner, .. } => inner.requires_async(),
            DependencySource::Intercepted(plan) => plan.requires_async(),
            DependencySource::Constant(_)
            | DependencySource::EnumerableAll { .. }
            | DependencySource::Default { .. }
            | DependencySource::Deserialize(_)
            | DependencySource::Failed { .. } => false,
        }
    }

    /// Collects failed members. An invalid nested plan fails the member that
    /// holds it; the nested plan keeps its own failures.
    fn collect_failures(&self, member: &str, out: &mut Failures) {
        match self {
            DependencySource::Failed { reason, .. } => out.own.push(DependencyFailure {
                member: member.to_string(),
                reason: reason.clone(),
            }),
            DependencySource::Constructor(step) => step.collect_failures(out),
            DependencySource::Setters { step, setters } => {
                step.collect_failures(out);
                for setter in setters {
                    setter
                        .source
                        .collect_failures(&format!("setter '{}'", setter.setter.name()), out);
                }
            }
            DependencySource::Reference(plan) => out.nested_plan(member, plan),
            DependencySource::ExplicitEnumerable { items, .. } => {
                for plan in items {
                    out.nested_plan(member, plan);
                }
            }
            DependencySource::Cast { inner, .. } => inner.collect_failures(member, out),
            DependencySource::Intercepted(plan) => plan.inner.collect_failures(member, out),
            DependencySource::Constant(_)
            | DependencySource::EnumerableAll { .. }
            | DependencySource::Default { .. }
            | DependencySource::Lambda(_)
            | DependencySource::Deserialize(_) => {}
        }
    }
}

impl ConstructorStep {
    fn collect_failures(&self, out: &mut Failures) {
        for argument in &self.arguments {
            argument
                .source
                .collect_failures(&format!("constructor argument '{}'", argument.name), out);
        }
    }
}

#[derive(Default)]
struct Failures {
    own: Vec<DependencyFailure>,
    nested: Vec<(DependencyFailure, Arc<BuildPlan>)>,
}

impl Failures {
    fn nested_plan(&mut self, member: &str, plan: &Arc<BuildPlan>) {
        if plan.is_valid() {
            return;
        }
        let reasons: Vec<&str> = plan.failures().iter().map(|f| f.reason.as_str()).collect();
        let failure = DependencyFailure {
            member: member.to_string(),
            reason: format!("nested instance '{}' is invalid: {}", plan.instance().name(), reasons.join("; ")),
        };
        self.nested.push((failure, plan.clone()));
    }
}

fn unresolved(reason: &str, context: &str) -> DiError {
    DiError::Build {
        instance: context.to_string(),
        source: reason.to_string().into(),
    }
}

/// The compiled plan for one instance built as one plugin type.
pub struct BuildPlan {
    plugin_type: TypeKey,
    instance: Arc<Instance>,
    lifecycle: Lifecycle,
    pub(crate) source: DependencySource,
    failures: Vec<DependencyFailure>,
    // Invalid nested plans, when this plan fails only because of them.
    invalid_nested: Vec<Arc<BuildPlan>>,
}

impl BuildPlan {
    pub(crate) fn new(plugin_type: TypeKey, instance: Arc<Instance>, lifecycle: Lifecycle, source: DependencySource) -> Self {
        let mut collected = Failures::default();
        source.collect_failures(&format!("instance '{}'", instance.name()), &mut collected);
        let Failures { own, nested } = collected;
        let invalid_nested = if own.is_empty() {
            nested.iter().map(|(_, plan)| plan.clone()).collect()
        } else {
            Vec::new()
        };
        let mut failures = own;
        failures.extend(nested.into_iter().map(|(failure, _)| failure));
        Self {
            plugin_type,
            instance,
            lifecycle,
            source,
            failures,
            invalid_nested,
        }
    }

    pub fn plugin_type(&self) -> &TypeKey {
        &self.plugin_type
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    /// Lifecycle governing where built values are cached.
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// True when no member of this plan failed to resolve.
    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures(&self) -> &[DependencyFailure] {
        &self.failures
    }

    /// The invalid nested plans when every failure of this plan comes from
    /// them; empty when the plan has failed members of its own.
    pub(crate) fn failing_nested(&self) -> &[Arc<BuildPlan>] {
        &self.invalid_nested
    }

    /// True when this plan can only be built by async resolution.
    pub fn requires_async(&self) -> bool {
        self.source.requires_async()
    }

    /// Succeeds for valid plans; otherwise names the concrete type and lists
    /// every failed member.
    pub fn executable(&self) -> Result<(), ConfigurationError> {
        if self.is_valid() {
            return Ok(());
        }
        Err(ConfigurationError::InvalidBuildPlan {
            concrete_type: self.instance.description(),
            plugin_type: self.plugin_type.short_name(),
            failures: self.failures.clone(),
        })
    }

    pub(crate) fn cache_key(&self) -> CacheKey {
        CacheKey::new(self.plugin_type.clone(), self.instance.id())
    }

    /// Walks the plan, including nested plans, without executing anything.
    pub fn accept(&self, visitor: &mut dyn PlanVisitor) {
        visitor::walk_plan(self, visitor);
    }

    /// Renders the plan as an indented tree.
    ///
    /// ```rust
    /// use ferrous_ioc::prelude::*;
    ///
    /// let mut registry = Registry::new();
    /// registry.for_type::<u32>().use_instance(Instance::value(7u32).named("seven"));
    ///
    /// let container = Container::new(registry);
    /// let plan = container.build_plan::<u32>(None).unwrap();
    /// assert_eq!(plan.describe(), "Build plan for u32 ('seven') [Transient]\n└── Value 7\n");
    /// ```
    pub fn describe(&self) -> String {
        let mut renderer = visitor::TreeRenderer::default();
        self.accept(&mut renderer);
        renderer.render()
    }
}

impl fmt::Debug for BuildPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildPlan")
            .field("plugin_type", &self.plugin_type)
            .field("instance", &self.instance.name())
            .field("lifecycle", &self.lifecycle)
            .field("failures", &self.failures)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::registry::Registry;

    #[test]
    fn unresolved_members_name_their_instance() {
        let session = BuildSession::new(Container::new(Registry::new()));
        let failed = DependencySource::Failed {
            reason: "no default instance is registered for dyn Service".to_string(),
            context: Arc::from("instance 'guy' of GuyWithService"),
        };

        match failed.execute(&session) {
            Err(DiError::Build { instance, source }) => {
                assert_eq!(instance, "instance 'guy' of GuyWithService");
                assert!(source.to_string().contains("dyn Service"));
            }
            other => panic!("unexpected outcome: {:?}", other.map(|_| ())),
        }
    }
}
