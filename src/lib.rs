//! # ferrous-ioc
//!
//! An inversion-of-control container that compiles registrations into
//! reusable build plans.
//!
//! ## Features
//!
//! - **Build plans**: every registered instance is compiled once into an
//!   immutable tree of dependency sources and memoized by instance identity
//! - **Auto-wiring**: constructor arguments and setters resolve from the
//!   registered defaults unless an instance overrides them explicitly
//! - **Five lifecycles**: Transient, PerRequest, Singleton, ContainerScoped and
//!   ThreadLocal, with first-writer-wins caches under contention
//! - **Interception**: activators, decorators and global interceptor policies,
//!   with async variants awaited strictly in order
//! - **Open generics**: families registered for a template close on request
//! - **Aggregated validation**: every failure in one report, each root cause
//!   reported once
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrous_ioc::prelude::*;
//! use std::sync::Arc;
//!
//! trait Service: Send + Sync {
//!     fn name(&self) -> &'static str;
//! }
//!
//! struct DefaultService;
//! impl Service for DefaultService {
//!     fn name(&self) -> &'static str {
//!         "default"
//!     }
//! }
//!
//! struct GuyWithService {
//!     service: Arc<dyn Service>,
//! }
//!
//! let guy = TypeDescriptor::of::<GuyWithService>()
//!     .constructor(|c| {
//!         c.service::<dyn Service>("service")
//!             .build(|args| Ok(GuyWithService { service: args.get("service")? }))
//!     })
//!     .build();
//!
//! let mut registry = Registry::new();
//! registry.for_type::<dyn Service>().use_object(Arc::new(DefaultService));
//! registry.for_type::<GuyWithService>().use_instance(Instance::constructed(guy));
//!
//! let container = Container::new(registry);
//! let resolved = container.get_instance::<GuyWithService>().unwrap();
//! assert_eq!(resolved.service.name(), "default");
//! ```
//!
//! ## Lifecycles
//!
//! - **Transient**: built fresh on every request (the default)
//! - **PerRequest**: shared within one top-level resolution
//! - **Singleton**: built once and shared with nested containers
//! - **ContainerScoped**: built once per container
//! - **ThreadLocal**: built once per thread
//!
//! ## Logging
//!
//! The crate logs through `tracing` under the `ferrous_ioc` target and never
//! installs a subscriber.

pub mod container;
pub mod dependencies;
pub mod descriptor;
pub mod error;
pub mod graph;
pub mod instance;
pub mod interception;
pub mod key;
pub mod lifecycle;
pub mod plan;
pub mod registry;
pub mod traits;
pub mod value;

mod internal;

pub use container::{BuildFailure, BuildSession, Container, ValidationFailure, ValidationReport};
pub use dependencies::{Dependency, DependencyCollection};
pub use descriptor::{
    Arguments, Constructor, ConstructorBuilder, ConstructorSelector, ConstructorStrategy, DesignatedConstructor,
    GreediestConstructor, Parameter, ParameterKind, Setter, TypeDescriptor, TypeDescriptorBuilder, ValidationMethod,
};
pub use error::{BoxError, ConfigurationError, DependencyFailure, DiError, DiResult};
pub use graph::{FamilyModel, GraphModel, InstanceModel};
pub use instance::{
    Configurable, ConstructedInstance, Instance, InstanceCore, InstanceId, LambdaInstance, LiteralInstance,
    ReferencedInstance, SerializedInstance,
};
pub use interception::{
    AsyncActivator, AsyncDecorator, InterceptedCallError, InterceptionChain, Interceptor, InterceptorPolicy,
    InterceptorRole, MatchingPolicy, MethodCall, MethodInterceptor,
};
pub use internal::BoxFuture;
pub use key::{GenericArgs, GenericType, TypeKey};
pub use lifecycle::{Lifecycle, ObjectCache};
pub use plan::{BuildPlan, PlanNode, PlanVisitor};
pub use registry::{FamilyExpression, OpenFamilyExpression, Registry, RegistryModule};
pub use traits::Dispose;
pub use value::Value;

/// The types needed to configure and use a container.
pub mod prelude {
    pub use crate::{
        BuildSession, Configurable, Container, DependencyCollection, DiError, DiResult, Instance, Interceptor,
        Lifecycle, Registry, TypeDescriptor, TypeKey,
    };
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn singleton_resolution() {
        let mut registry = Registry::new();
        registry.for_type::<usize>().use_instance(Instance::value(42usize)).singleton();

        let container = Container::new(registry);
        let a = container.get_instance::<usize>().unwrap();
        let b = container.get_instance::<usize>().unwrap();

        assert_eq!(*a, 42);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn transient_resolution() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counting = counter.clone();

        let mut registry = Registry::new();
        registry.for_type::<String>().use_lambda(move |_| {
            let n = counting.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Arc::new(format!("instance-{}", n)))
        });

        let container = Container::new(registry);
        let a = container.get_instance::<String>().unwrap();
        let b = container.get_instance::<String>().unwrap();

        assert_eq!(a.as_str(), "instance-1");
        assert_eq!(b.as_str(), "instance-2");
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn per_request_objects_are_shared_within_one_resolution() {
        struct Unit;
        struct Pair {
            left: Arc<Unit>,
            right: Arc<Unit>,
        }

        let pair = TypeDescriptor::of::<Pair>()
            .constructor(|c| {
                c.service::<Unit>("left").service::<Unit>("right").build(|args| {
                    Ok(Pair {
                        left: args.get("left")?,
                        right: args.get("right")?,
                    })
                })
            })
            .build();

        let mut registry = Registry::new();
        registry.for_type::<Unit>().use_lambda(|_| Ok(Arc::new(Unit))).per_request();
        registry.for_type::<Pair>().use_instance(Instance::constructed(pair));

        let container = Container::new(registry);
        let first = container.get_instance::<Pair>().unwrap();
        let second = container.get_instance::<Pair>().unwrap();

        assert!(Arc::ptr_eq(&first.left, &first.right));
        assert!(!Arc::ptr_eq(&first.left, &second.left));
    }
}
