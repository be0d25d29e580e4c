//! Wraps a build source with activators and decorators.

use tracing::trace;

use super::{Action, Interceptor, InterceptorRole};
use crate::container::BuildSession;
use crate::descriptor::Caster;
use crate::error::{BoxError, ConfigurationError, DiError, DiResult};
use crate::internal::BoxFuture;
use crate::key::TypeKey;
use crate::plan::DependencySource;
use crate::value::Value;

/// Activators sharing one accepted type.
pub(crate) struct ActivatorGroup {
    pub(crate) accepts: TypeKey,
    cast: Option<Caster>,
    pub(crate) activators: Vec<Interceptor>,
}

/// The inner source plus the interceptors applied to its value.
pub(crate) struct InterceptionPlan {
    pub(crate) plugin: TypeKey,
    pub(crate) inner: DependencySource,
    pub(crate) groups: Vec<ActivatorGroup>,
    to_plugin: Option<Caster>,
    pub(crate) decorators: Vec<Interceptor>,
}

/// Wraps `inner`, whose values have type `returned`, so that it yields
/// `plugin` values with every interceptor applied.
///
/// `cast` finds the upcast from `returned` to another type. Interceptor
/// types are checked here, so a mismatch is a configuration error of the
/// plan rather than a runtime failure.
pub(crate) fn wrap(
    plugin: &TypeKey,
    returned: &TypeKey,
    cast: &dyn Fn(&TypeKey) -> Option<Caster>,
    inner: DependencySource,
    interceptors: &[Interceptor],
) -> Result<DependencySource, ConfigurationError> {
    let to_plugin = if returned == plugin {
        None
    } else {
        Some(cast(plugin).ok_or_else(|| ConfigurationError::NotPluggable {
            concrete_type: returned.short_name(),
            plugin_type: plugin.short_name(),
        })?)
    };

    if interceptors.is_empty() {
        return Ok(match to_plugin {
            Some(caster) => DependencySource::Cast {
                inner: Box::new(inner),
                target: plugin.clone(),
                caster,
            },
            None => inner,
        });
    }

    let mut groups: Vec<ActivatorGroup> = Vec::new();
    let mut decorators = Vec::new();

    for interceptor in interceptors {
        match interceptor.role() {
            InterceptorRole::Decorator => {
                if interceptor.accepts() != plugin || interceptor.returns() != plugin {
                    return Err(ConfigurationError::DecoratorMismatch {
                        description: interceptor.description().to_string(),
                        plugin_type: plugin.short_name(),
                        accepts: interceptor.accepts().short_name(),
                        returns: interceptor.returns().short_name(),
                    });
                }
                decorators.push(interceptor.clone());
            }
            InterceptorRole::Activator => {
                let accepts = interceptor.accepts();
                if let Some(group) = groups.iter_mut().find(|g| g.accepts == *accepts) {
                    group.activators.push(interceptor.clone());
                    continue;
                }
                let group_cast = if accepts == returned {
                    None
                } else {
                    Some(cast(accepts).ok_or_else(|| ConfigurationError::ActivatorMismatch {
                        description: interceptor.description().to_string(),
                        accepts: accepts.short_name(),
                        returned_type: returned.short_name(),
                    })?)
                };
                groups.push(ActivatorGroup {
                    accepts: accepts.clone(),
                    cast: group_cast,
                    activators: vec![interceptor.clone()],
                });
            }
        }
    }

    Ok(DependencySource::Intercepted(Box::new(InterceptionPlan {
        plugin: plugin.clone(),
        inner,
        groups,
        to_plugin,
        decorators,
    })))
}

impl InterceptionPlan {
    pub(crate) fn requires_async(&self) -> bool {
        self.inner.requires_async()
            || self
                .groups
                .iter()
                .flat_map(|g| g.activators.iter())
                .chain(self.decorators.iter())
                .any(Interceptor::is_async)
    }

    fn failure(&self, interceptor: &Interceptor, source: BoxError) -> DiError {
        DiError::Interceptor {
            description: interceptor.description().to_string(),
            plugin_type: self.plugin.short_name(),
            source,
        }
    }

    fn run(&self, interceptor: &Interceptor, value: Value, session: &BuildSession) -> DiResult<Value> {
        trace!(target: "ferrous_ioc", plugin = %self.plugin, interceptor = interceptor.description(), "running interceptor");
        match interceptor.action() {
            Action::Sync(action) => action(value, session).map_err(|source| self.failure(interceptor, source)),
            Action::Async(_) => Err(DiError::AsyncRequired {
                plugin_type: self.plugin.short_name(),
                instance: format!("interceptor '{}'", interceptor.description()),
            }),
        }
    }

    async fn run_async(&self, interceptor: &Interceptor, value: Value, session: &BuildSession) -> DiResult<Value> {
        trace!(target: "ferrous_ioc", plugin = %self.plugin, interceptor = interceptor.description(), "running interceptor");
        let outcome = match interceptor.action() {
            Action::Sync(action) => action(value, session),
            Action::Async(action) => action(value).await,
        };
        outcome.map_err(|source| self.failure(interceptor, source))
    }

    fn view(group: &ActivatorGroup, built: &Value) -> DiResult<Value> {
        match &group.cast {
            Some(cast) => cast(built),
            None => Ok(built.clone()),
        }
    }

    fn to_plugin(&self, built: Value) -> DiResult<Value> {
        match &self.to_plugin {
            Some(cast) => cast(&built),
            None => Ok(built),
        }
    }

    /// Builds the inner value, runs activators group by group, casts to the
    /// plugin type and applies decorators innermost first.
    pub(crate) fn execute(&self, session: &BuildSession) -> DiResult<Value> {
        let built = self.inner.execute(session)?;

        for group in &self.groups {
            let view = Self::view(group, &built)?;
            for activator in &group.activators {
                self.run(activator, view.clone(), session)?;
            }
        }

        let mut current = self.to_plugin(built)?;
        for decorator in &self.decorators {
            current = self.run(decorator, current, session)?;
        }
        Ok(current)
    }

    /// Async variant of [`execute`](Self::execute); interceptors are awaited
    /// strictly one after another.
    pub(crate) fn execute_async<'a>(&'a self, session: &'a BuildSession) -> BoxFuture<'a, DiResult<Value>> {
        Box::pin(async move {
            let built = self.inner.execute_async(session).await?;

            for group in &self.groups {
                let view = Self::view(group, &built)?;
                for activator in &group.activators {
                    self.run_async(activator, view.clone(), session).await?;
                }
            }

            let mut current = self.to_plugin(built)?;
            for decorator in &self.decorators {
                current = self.run_async(decorator, current, session).await?;
            }
            Ok(current)
        })
    }
}
