//! Construction-time interception: activators and decorators.
//!
//! An [`Interceptor`] runs after an object is constructed and before it is
//! handed to the requester or cached. *Activators* perform side effects on the
//! object; *decorators* replace it with a wrapper implementing the same plugin
//! type. Both come in sync and async flavors.
//!
//! Interceptors are collected for each plan from three places, in this order:
//! the instance itself, its plugin family, then every global
//! [`InterceptorPolicy`].
//!
//! # Examples
//!
//! ```rust
//! use ferrous_ioc::prelude::*;
//! use std::sync::Arc;
//!
//! trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//!
//! struct Plain;
//! impl Greeter for Plain {
//!     fn greet(&self) -> String {
//!         "hello".to_string()
//!     }
//! }
//!
//! struct Shouting(Arc<dyn Greeter>);
//! impl Greeter for Shouting {
//!     fn greet(&self) -> String {
//!         self.0.greet().to_uppercase()
//!     }
//! }
//!
//! let mut registry = Registry::new();
//! registry
//!     .for_type::<dyn Greeter>()
//!     .use_object(Arc::new(Plain))
//!     .intercept_with(Interceptor::decorator::<dyn Greeter, _>("shout", |inner| {
//!         Arc::new(Shouting(inner))
//!     }));
//!
//! let container = Container::new(registry);
//! assert_eq!(container.get_instance::<dyn Greeter>().unwrap().greet(), "HELLO");
//! ```

mod planner;
mod policy;
mod proxy;

pub(crate) use planner::{wrap, InterceptionPlan};
pub use policy::{InterceptorPolicy, MatchingPolicy};
pub use proxy::{InterceptedCallError, InterceptionChain, MethodCall, MethodInterceptor};

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::container::BuildSession;
use crate::error::BoxError;
use crate::internal::BoxFuture;
use crate::key::TypeKey;
use crate::value::Value;

/// What an interceptor does with the object it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InterceptorRole {
    /// Side effects only; the object passes through unchanged.
    Activator,
    /// Replaces the object with a wrapper of the same plugin type.
    Decorator,
}

type SyncAction = Arc<dyn Fn(Value, &BuildSession) -> Result<Value, BoxError> + Send + Sync>;
type AsyncAction = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync>;

#[derive(Clone)]
pub(crate) enum Action {
    Sync(SyncAction),
    Async(AsyncAction),
}

/// An activator or decorator applied to newly built objects.
#[derive(Clone)]
pub struct Interceptor {
    role: InterceptorRole,
    accepts: TypeKey,
    returns: TypeKey,
    description: Arc<str>,
    action: Action,
}

/// Async activation hook, for implementations that prefer a trait.
///
/// ```rust
/// use ferrous_ioc::{AsyncActivator, BoxError, Interceptor};
/// use std::sync::Arc;
///
/// struct Pool;
/// impl Pool {
///     async fn warm_up(&self) {}
/// }
///
/// struct WarmUp;
///
/// #[async_trait::async_trait]
/// impl AsyncActivator<Pool> for WarmUp {
///     async fn activate(&self, target: Arc<Pool>) -> Result<(), BoxError> {
///         target.warm_up().await;
///         Ok(())
///     }
/// }
///
/// let interceptor = Interceptor::from_async_activator::<Pool, _>("warm up", WarmUp);
/// assert!(interceptor.is_async());
/// ```
#[async_trait]
pub trait AsyncActivator<T: ?Sized + Send + Sync + 'static>: Send + Sync + 'static {
    async fn activate(&self, target: Arc<T>) -> Result<(), BoxError>;
}

/// Async decorating hook, for implementations that prefer a trait.
#[async_trait]
pub trait AsyncDecorator<T: ?Sized + Send + Sync + 'static>: Send + Sync + 'static {
    async fn decorate(&self, inner: Arc<T>) -> Result<Arc<T>, BoxError>;
}

impl Interceptor {
    fn new(role: InterceptorRole, accepts: TypeKey, returns: TypeKey, description: &str, action: Action) -> Self {
        Self {
            role,
            accepts,
            returns,
            description: Arc::from(description),
            action,
        }
    }

    /// An activator that inspects or mutates (through interior mutability)
    /// every object of type `T`.
    pub fn activator<T, F>(description: &str, activate: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        Self::try_activator::<T, _>(description, move |target| {
            activate(target);
            Ok(())
        })
    }

    /// A fallible activator.
    pub fn try_activator<T, F>(description: &str, activate: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self::activator_with_session::<T, _>(description, move |target, _| activate(target))
    }

    /// A fallible activator that can resolve further services from the session.
    pub fn activator_with_session<T, F>(description: &str, activate: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&T, &BuildSession) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let action: SyncAction = Arc::new(move |value: Value, session: &BuildSession| -> Result<Value, BoxError> {
            let target = value.expect_type::<T>()?;
            activate(&target, session)?;
            Ok(value)
        });
        let ty = TypeKey::of::<T>();
        Self::new(InterceptorRole::Activator, ty.clone(), ty, description, Action::Sync(action))
    }

    /// A decorator wrapping every object of plugin type `T`.
    pub fn decorator<T, F>(description: &str, decorate: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<T>) -> Arc<T> + Send + Sync + 'static,
    {
        Self::try_decorator::<T, _>(description, move |inner, _| Ok(decorate(inner)))
    }

    /// A fallible decorator that can resolve further services from the session.
    pub fn try_decorator<T, F>(description: &str, decorate: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<T>, &BuildSession) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        let action: SyncAction = Arc::new(move |value: Value, session: &BuildSession| -> Result<Value, BoxError> {
            let inner = value.expect_type::<T>()?;
            let outer = decorate(inner, session)?;
            Ok(Value::new(outer).inherit_disposer(&value))
        });
        let ty = TypeKey::of::<T>();
        Self::new(InterceptorRole::Decorator, ty.clone(), ty, description, Action::Sync(action))
    }

    /// An activator returning a future, awaited before the object is used.
    pub fn async_activator<T, F, Fut>(description: &str, activate: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let action: AsyncAction = Arc::new(move |value: Value| -> BoxFuture<'static, Result<Value, BoxError>> {
            match value.expect_type::<T>() {
                Ok(target) => {
                    let pending = activate(target);
                    Box::pin(async move {
                        pending.await?;
                        Ok(value)
                    })
                }
                Err(err) => Box::pin(async move { Err(err.into()) }),
            }
        });
        let ty = TypeKey::of::<T>();
        Self::new(InterceptorRole::Activator, ty.clone(), ty, description, Action::Async(action))
    }

    /// A decorator returning a future that yields the wrapper.
    pub fn async_decorator<T, F, Fut>(description: &str, decorate: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<T>, BoxError>> + Send + 'static,
    {
        let action: AsyncAction = Arc::new(move |value: Value| -> BoxFuture<'static, Result<Value, BoxError>> {
            match value.expect_type::<T>() {
                Ok(inner) => {
                    let pending = decorate(inner);
                    Box::pin(async move {
                        let outer = pending.await?;
                        Ok(Value::new(outer).inherit_disposer(&value))
                    })
                }
                Err(err) => Box::pin(async move { Err(err.into()) }),
            }
        });
        let ty = TypeKey::of::<T>();
        Self::new(InterceptorRole::Decorator, ty.clone(), ty, description, Action::Async(action))
    }

    /// Adapts an [`AsyncActivator`] implementation.
    pub fn from_async_activator<T, A>(description: &str, activator: A) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        A: AsyncActivator<T>,
    {
        let activator = Arc::new(activator);
        Self::async_activator::<T, _, _>(description, move |target| {
            let activator = activator.clone();
            async move { activator.activate(target).await }
        })
    }

    /// Adapts an [`AsyncDecorator`] implementation.
    pub fn from_async_decorator<T, D>(description: &str, decorator: D) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        D: AsyncDecorator<T>,
    {
        let decorator = Arc::new(decorator);
        Self::async_decorator::<T, _, _>(description, move |inner| {
            let decorator = decorator.clone();
            async move { decorator.decorate(inner).await }
        })
    }

    pub fn role(&self) -> InterceptorRole {
        self.role
    }

    /// The type this interceptor receives.
    pub fn accepts(&self) -> &TypeKey {
        &self.accepts
    }

    /// The type this interceptor hands on.
    pub fn returns(&self) -> &TypeKey {
        &self.returns
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_async(&self) -> bool {
        matches!(self.action, Action::Async(_))
    }

    pub(crate) fn action(&self) -> &Action {
        &self.action
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("role", &self.role)
            .field("accepts", &self.accepts)
            .field("description", &self.description)
            .field("async", &self.is_async())
            .finish()
    }
}

impl fmt::Display for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match (self.role, self.is_async()) {
            (InterceptorRole::Activator, false) => "Activator",
            (InterceptorRole::Activator, true) => "Async activator",
            (InterceptorRole::Decorator, false) => "Decorator",
            (InterceptorRole::Decorator, true) => "Async decorator",
        };
        write!(f, "{} of {}: {}", kind, self.accepts, self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Shape: Send + Sync {}
    struct Square;
    impl Shape for Square {}

    #[test]
    fn decorators_accept_and_return_the_same_type() {
        let decorator = Interceptor::decorator::<dyn Shape, _>("noop", |inner| inner);
        assert_eq!(decorator.role(), InterceptorRole::Decorator);
        assert_eq!(decorator.accepts(), decorator.returns());
        assert_eq!(decorator.accepts(), &TypeKey::of::<dyn Shape>());
        assert!(!decorator.is_async());
    }

    #[test]
    fn display_names_the_kind_and_description() {
        let activator = Interceptor::async_activator::<Square, _, _>("warm", |_| async { Ok(()) });
        assert_eq!(activator.to_string(), "Async activator of Square: warm");
    }
}
