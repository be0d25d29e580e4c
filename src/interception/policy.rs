//! Global interceptor policies.

use std::fmt;
use std::sync::Arc;

use super::Interceptor;
use crate::instance::Instance;
use crate::key::TypeKey;

/// Decides which interceptors apply to an instance built for a plugin type.
///
/// Policies are consulted when a build plan is compiled, after the
/// interceptors declared on the instance and on its family.
pub trait InterceptorPolicy: Send + Sync {
    /// Human readable summary used in diagnostics.
    fn description(&self) -> String;

    /// Interceptors for `instance` when built as `plugin_type`, in the order
    /// they should run.
    fn determine_interceptors(&self, plugin_type: &TypeKey, instance: &Instance) -> Vec<Interceptor>;
}

type Filter = Arc<dyn Fn(&TypeKey, &Instance) -> bool + Send + Sync>;

/// Applies a fixed list of interceptors wherever a filter matches.
///
/// ```rust
/// use ferrous_ioc::{Interceptor, InterceptorPolicy, MatchingPolicy};
///
/// trait Audit: Send + Sync {}
///
/// let policy = MatchingPolicy::for_plugin::<dyn Audit>(
///     Interceptor::activator::<dyn Audit, _>("audit", |_| {}),
/// );
/// assert!(policy.description().contains("Audit"));
/// ```
#[derive(Clone)]
pub struct MatchingPolicy {
    description: String,
    filter: Filter,
    interceptors: Vec<Interceptor>,
}

impl MatchingPolicy {
    /// Matches every instance built for plugin type `P`.
    pub fn for_plugin<P: ?Sized + 'static>(interceptor: Interceptor) -> Self {
        let plugin = TypeKey::of::<P>();
        Self {
            description: format!("Interceptors for plugin type {}", plugin),
            filter: Arc::new(move |requested: &TypeKey, _: &Instance| *requested == plugin),
            interceptors: vec![interceptor],
        }
    }

    /// Matches every instance whose returned concrete type is `C`.
    pub fn for_concrete<C: ?Sized + 'static>(interceptor: Interceptor) -> Self {
        let concrete = TypeKey::of::<C>();
        Self {
            description: format!("Interceptors for concrete type {}", concrete),
            filter: Arc::new(move |_: &TypeKey, instance: &Instance| instance.returned_type() == concrete),
            interceptors: vec![interceptor],
        }
    }

    /// Matches wherever `filter` returns true.
    pub fn when<F>(description: &str, filter: F, interceptor: Interceptor) -> Self
    where
        F: Fn(&TypeKey, &Instance) -> bool + Send + Sync + 'static,
    {
        Self {
            description: description.to_string(),
            filter: Arc::new(filter),
            interceptors: vec![interceptor],
        }
    }

    /// Appends another interceptor applied under the same filter.
    pub fn and(mut self, interceptor: Interceptor) -> Self {
        self.interceptors.push(interceptor);
        self
    }
}

impl InterceptorPolicy for MatchingPolicy {
    fn description(&self) -> String {
        self.description.clone()
    }

    fn determine_interceptors(&self, plugin_type: &TypeKey, instance: &Instance) -> Vec<Interceptor> {
        if (self.filter)(plugin_type, instance) {
            self.interceptors.clone()
        } else {
            Vec::new()
        }
    }
}

impl fmt::Debug for MatchingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchingPolicy")
            .field("description", &self.description)
            .field("interceptors", &self.interceptors)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{Configurable, Instance};

    trait Service: Send + Sync {}
    struct Impl;
    impl Service for Impl {}

    #[test]
    fn plugin_policies_match_only_their_plugin() {
        let policy = MatchingPolicy::for_plugin::<dyn Service>(Interceptor::activator::<dyn Service, _>("a", |_| {}))
            .and(Interceptor::activator::<dyn Service, _>("b", |_| {}));
        let instance: Instance = Instance::object::<dyn Service>(Arc::new(Impl)).into();

        let found = policy.determine_interceptors(&TypeKey::of::<dyn Service>(), &instance);
        let names: Vec<&str> = found.iter().map(Interceptor::description).collect();
        assert_eq!(names, vec!["a", "b"]);

        assert!(policy
            .determine_interceptors(&TypeKey::of::<String>(), &instance)
            .is_empty());
    }

    #[test]
    fn predicate_policies_see_the_instance() {
        let policy = MatchingPolicy::when(
            "named audited",
            |_, instance| instance.name() == "audited",
            Interceptor::activator::<String, _>("audit", |_| {}),
        );
        let plain: Instance = Instance::value("x".to_string()).into();
        let audited: Instance = Instance::value("y".to_string()).named("audited").into();

        assert!(policy.determine_interceptors(&TypeKey::of::<String>(), &plain).is_empty());
        assert_eq!(policy.determine_interceptors(&TypeKey::of::<String>(), &audited).len(), 1);
    }
}
