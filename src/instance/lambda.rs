//! Instances produced by user factories.

use std::future::Future;
use std::sync::Arc;

use super::{Configurable, Instance, InstanceCore, InstanceKind};
use crate::container::{BuildSession, Container};
use crate::error::BoxError;
use crate::internal::BoxFuture;
use crate::key::TypeKey;
use crate::value::Value;

type SyncFactory = Arc<dyn Fn(&BuildSession) -> Result<Value, BoxError> + Send + Sync>;
type AsyncFactory = Arc<dyn Fn(Container) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync>;

#[derive(Clone)]
pub(crate) enum LambdaFactory {
    Sync(SyncFactory),
    Async(AsyncFactory),
}

#[derive(Clone)]
pub(crate) struct LambdaSpec {
    pub(crate) returned: TypeKey,
    pub(crate) factory: LambdaFactory,
    label: Option<String>,
}

impl LambdaSpec {
    pub(crate) fn is_async(&self) -> bool {
        matches!(self.factory, LambdaFactory::Async(_))
    }

    pub(crate) fn description(&self) -> String {
        let kind = if self.is_async() { "Async lambda" } else { "Lambda" };
        match &self.label {
            Some(label) => format!("{}: {}", kind, label),
            None => format!("{} returning {}", kind, self.returned),
        }
    }
}

/// Builder for an instance produced by a factory function.
///
/// ```rust
/// use ferrous_ioc::prelude::*;
/// use std::sync::Arc;
///
/// struct Config {
///     url: String,
/// }
/// struct Client {
///     url: String,
/// }
///
/// let mut registry = Registry::new();
/// registry.for_type::<Config>().use_object(Arc::new(Config { url: "db://local".to_string() }));
/// registry.for_type::<Client>().use_instance(
///     Instance::lambda(|session| {
///         let config = session.get_instance::<Config>()?;
///         Ok(Arc::new(Client { url: config.url.clone() }))
///     })
///     .described("client from config"),
/// );
///
/// let container = Container::new(registry);
/// assert_eq!(container.get_instance::<Client>().unwrap().url, "db://local");
/// ```
pub struct LambdaInstance {
    core: InstanceCore,
    spec: LambdaSpec,
}

impl LambdaInstance {
    pub(crate) fn new<P, F>(factory: F) -> Self
    where
        P: ?Sized + Send + Sync + 'static,
        F: Fn(&BuildSession) -> Result<Arc<P>, BoxError> + Send + Sync + 'static,
    {
        let factory: SyncFactory = Arc::new(move |session: &BuildSession| -> Result<Value, BoxError> {
            factory(session).map(Value::new)
        });
        Self::from_factory(TypeKey::of::<P>(), LambdaFactory::Sync(factory))
    }

    pub(crate) fn new_async<P, F, Fut>(factory: F) -> Self
    where
        P: ?Sized + Send + Sync + 'static,
        F: Fn(Container) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<P>, BoxError>> + Send + 'static,
    {
        let factory: AsyncFactory = Arc::new(move |container: Container| -> BoxFuture<'static, Result<Value, BoxError>> {
            let pending = factory(container);
            Box::pin(async move { pending.await.map(Value::new) })
        });
        Self::from_factory(TypeKey::of::<P>(), LambdaFactory::Async(factory))
    }

    fn from_factory(returned: TypeKey, factory: LambdaFactory) -> Self {
        Self {
            core: InstanceCore::new(),
            spec: LambdaSpec {
                returned,
                factory,
                label: None,
            },
        }
    }

    /// Text shown for this lambda in plan descriptions.
    pub fn described(mut self, description: &str) -> Self {
        self.spec.label = Some(description.to_string());
        self
    }
}

impl Configurable for LambdaInstance {
    fn core_mut(&mut self) -> &mut InstanceCore {
        &mut self.core
    }
}

impl From<LambdaInstance> for Instance {
    fn from(instance: LambdaInstance) -> Self {
        Instance::from_kind(instance.core, InstanceKind::Lambda(instance.spec))
    }
}
