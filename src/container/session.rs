//! One top-level resolution.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use super::validation::ValidationState;
use super::Container;
use crate::descriptor::TypeDescriptor;
use crate::error::{DiError, DiResult};
use crate::internal::{next_id, BoxFuture, BuilderId, Frame, ResolutionStack};
use crate::key::TypeKey;
use crate::lifecycle::ObjectCache;
use crate::plan::BuildPlan;
use crate::value::Value;

/// State of one top-level resolution: the per-request cache and the stack of
/// plans being built.
///
/// Lambdas and session-aware interceptors receive the session, so services
/// they resolve share its per-request objects and circular detection. Ending
/// the session disposes its per-request objects.
pub struct BuildSession {
    id: u64,
    container: Container,
    request_cache: Arc<ObjectCache>,
    stack: ResolutionStack,
    validation: Option<Arc<ValidationState>>,
}

impl BuildSession {
    pub(crate) fn new(container: Container) -> Self {
        Self::with_validation(container, None)
    }

    pub(crate) fn validating(container: Container, state: Arc<ValidationState>) -> Self {
        Self::with_validation(container, Some(state))
    }

    fn with_validation(container: Container, validation: Option<Arc<ValidationState>>) -> Self {
        Self {
            id: next_id(),
            container,
            request_cache: Arc::new(ObjectCache::new()),
            stack: ResolutionStack::default(),
            validation,
        }
    }

    /// The container this session resolves from.
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// True while the session belongs to configuration validation.
    pub fn is_validating(&self) -> bool {
        self.validation.is_some()
    }

    pub(crate) fn request_cache(&self) -> &Arc<ObjectCache> {
        &self.request_cache
    }

    fn frame(plan: &BuildPlan) -> Frame {
        Frame {
            plugin: plan.plugin_type().clone(),
            instance: plan.instance().id(),
            name: plan.instance().name().to_string(),
        }
    }

    fn label(plan: &BuildPlan) -> impl FnOnce() -> String + '_ {
        move || Self::frame(plan).describe()
    }

    /// While validating, a plan that is invalid only through nested plans
    /// builds those instead, so the failure is recorded where it originates.
    fn build_failing_nested(&self, plan: &BuildPlan) -> Option<DiResult<Value>> {
        self.validation.as_ref()?;
        let nested = plan.failing_nested();
        if nested.is_empty() {
            return None;
        }
        let failure = nested.iter().find_map(|nested| self.build(nested).err());
        Some(Err(failure.unwrap_or_else(|| ValidationState::upstream(plan))))
    }

    /// Builds `plan` through its lifecycle's cache.
    pub(crate) fn build(&self, plan: &Arc<BuildPlan>) -> DiResult<Value> {
        if let Some(state) = &self.validation {
            state.check_known(plan)?;
        }
        if let Some(outcome) = self.build_failing_nested(plan) {
            return self.settle(plan, outcome);
        }
        let outcome = plan.executable().map_err(DiError::from).and_then(|()| {
            let _frame = self.stack.enter(Self::frame(plan))?;
            trace!(
                target: "ferrous_ioc",
                plugin = %plan.plugin_type(),
                instance = plan.instance().name(),
                lifecycle = %plan.lifecycle(),
                depth = self.stack.depth(),
                "building"
            );
            match plan.lifecycle().find_cache(self) {
                Some(cache) => cache.get_or_build(
                    &plan.cache_key(),
                    BuilderId::on_current_thread(self.id),
                    Self::label(plan),
                    || plan.source.execute(self),
                ),
                None => plan.source.execute(self),
            }
        });
        self.settle(plan, outcome)
    }

    /// Async variant of [`build`](Self::build).
    pub(crate) fn build_async<'a>(&'a self, plan: &'a Arc<BuildPlan>) -> BoxFuture<'a, DiResult<Value>> {
        Box::pin(async move {
            if let Some(state) = &self.validation {
                state.check_known(plan)?;
            }
            if let Some(outcome) = self.build_failing_nested(plan) {
                return self.settle(plan, outcome);
            }
            let outcome = match plan.executable() {
                Ok(()) => self.build_cached_async(plan).await,
                Err(err) => Err(err.into()),
            };
            self.settle(plan, outcome)
        })
    }

    async fn build_cached_async(&self, plan: &Arc<BuildPlan>) -> DiResult<Value> {
        let _frame = self.stack.enter(Self::frame(plan))?;
        trace!(
            target: "ferrous_ioc",
            plugin = %plan.plugin_type(),
            instance = plan.instance().name(),
            lifecycle = %plan.lifecycle(),
            "building async"
        );
        match plan.lifecycle().find_cache(self) {
            Some(cache) => {
                cache
                    .get_or_build_async(
                        &plan.cache_key(),
                        BuilderId::detached(self.id),
                        Self::label(plan),
                        || plan.source.execute_async(self),
                    )
                    .await
            }
            None => plan.source.execute_async(self).await,
        }
    }

    /// While validating, records the first failure of each plan and reports
    /// it upstream only once.
    fn settle(&self, plan: &BuildPlan, outcome: DiResult<Value>) -> DiResult<Value> {
        match (&self.validation, outcome) {
            (Some(state), Err(err)) => Err(state.record(plan, err)),
            (_, outcome) => outcome,
        }
    }

    /// Runs validation methods on a freshly built object while validating.
    pub(crate) fn after_construction(&self, descriptor: &TypeDescriptor, value: &Value) {
        let Some(state) = &self.validation else {
            return;
        };
        for method in descriptor.validation_methods() {
            if let Err(message) = method.run(value) {
                state.record_validation_error(descriptor.display_name(), method.name(), message);
            }
        }
    }

    pub(crate) fn resolve_default(&self, plugin: &TypeKey) -> DiResult<Value> {
        let plan = self.container.graph().default_plan(plugin)?;
        self.build(&plan)
    }

    pub(crate) async fn resolve_default_async(&self, plugin: &TypeKey) -> DiResult<Value> {
        let plan = self.container.graph().default_plan(plugin)?;
        self.build_async(&plan).await
    }

    pub(crate) fn resolve_named(&self, plugin: &TypeKey, name: &str) -> DiResult<Value> {
        let plan = self.container.graph().named_plan(plugin, name)?;
        self.build(&plan)
    }

    pub(crate) fn resolve_all(&self, element: &TypeKey) -> DiResult<Vec<Value>> {
        self.container
            .graph()
            .all_plans(element)
            .iter()
            .map(|plan| self.build(plan))
            .collect()
    }

    pub(crate) async fn resolve_all_async(&self, element: &TypeKey) -> DiResult<Vec<Value>> {
        let plans = self.container.graph().all_plans(element);
        let mut values = Vec::with_capacity(plans.len());
        for plan in &plans {
            values.push(self.build_async(plan).await?);
        }
        Ok(values)
    }

    /// Resolves the default `T` within this session.
    pub fn get_instance<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        self.resolve_default(&TypeKey::of::<T>())?.expect_type::<T>()
    }

    /// Resolves the `T` named `name` within this session.
    pub fn get_named_instance<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> DiResult<Arc<T>> {
        self.resolve_named(&TypeKey::of::<T>(), name)?.expect_type::<T>()
    }

    /// Like [`get_instance`](Self::get_instance), but `None` when nothing is
    /// registered for `T`.
    pub fn try_get_instance<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Option<Arc<T>>> {
        match self.get_instance::<T>() {
            Ok(found) => Ok(Some(found)),
            Err(DiError::MissingDefault { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Every registered `T` within this session, in registration order.
    pub fn get_all_instances<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Vec<Arc<T>>> {
        self.resolve_all(&TypeKey::of::<T>())?
            .iter()
            .map(Value::expect_type::<T>)
            .collect()
    }
}

impl Drop for BuildSession {
    fn drop(&mut self) {
        self.request_cache.eject_all();
    }
}

impl fmt::Debug for BuildSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildSession")
            .field("depth", &self.stack.depth())
            .field("request_cache", &self.request_cache.len())
            .field("validating", &self.is_validating())
            .finish()
    }
}
