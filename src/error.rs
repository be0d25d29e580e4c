//! Error types for the container.
//!
//! Errors fall into four families that callers can tell apart:
//!
//! - configuration errors ([`ConfigurationError`]), detected when a build plan
//!   is compiled,
//! - build errors ([`DiError::Build`]), raised by user constructors and factories,
//! - interceptor errors ([`DiError::Interceptor`]), raised by activators and
//!   decorators after construction succeeded,
//! - validation errors, collected by
//!   [`Container::assert_configuration_is_valid`](crate::Container::assert_configuration_is_valid)
//!   into a [`ValidationReport`](crate::ValidationReport).

use std::fmt;

use thiserror::Error;

/// Boxed error produced by user code (constructors, lambdas, interceptors).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for container operations.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{DiError, DiResult};
///
/// fn lookup(found: bool) -> DiResult<u32> {
///     if found {
///         Ok(7)
///     } else {
///         Err(DiError::MissingDefault { plugin_type: "u32".to_string() })
///     }
/// }
///
/// assert_eq!(lookup(true).unwrap(), 7);
/// assert!(lookup(false).is_err());
/// ```
pub type DiResult<T> = Result<T, DiError>;

/// Errors raised while resolving from a [`Container`](crate::Container).
#[derive(Debug, Error)]
pub enum DiError {
    /// No default instance could be determined for the plugin type.
    #[error("No default instance is registered for plugin type {plugin_type}")]
    MissingDefault { plugin_type: String },

    /// No instance with the requested name exists in the family.
    #[error("No instance named '{name}' is registered for plugin type {plugin_type}")]
    MissingNamed { plugin_type: String, name: String },

    /// The configuration cannot produce a valid build plan.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// A user constructor, factory or deserializer failed.
    #[error("Failure while building '{instance}': {source}")]
    Build {
        instance: String,
        #[source]
        source: BoxError,
    },

    /// An activator or decorator failed after the object was constructed.
    #[error("Interceptor '{description}' failed while building {plugin_type}: {source}")]
    Interceptor {
        description: String,
        plugin_type: String,
        #[source]
        source: BoxError,
    },

    /// A dependency of a constructor argument or setter could not be built.
    #[error("Unable to resolve {member} of {concrete_type}: {source}")]
    Argument {
        concrete_type: String,
        member: String,
        #[source]
        source: Box<DiError>,
    },

    /// Bi-directional dependency between instances.
    #[error("Bi-directional dependency relationship detected: {}", .path.join(" -> "))]
    Circular { path: Vec<String> },

    /// A value could not be viewed as the requested type.
    #[error("Type mismatch: expected {expected}, found {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// A constructor asked for an argument that was never supplied.
    #[error("No argument named '{name}' was supplied to the constructor")]
    MissingArgument { name: String },

    /// The plan contains async lambdas or interceptors but was resolved synchronously.
    #[error("Instance '{instance}' of {plugin_type} requires async resolution; use get_instance_async")]
    AsyncRequired { plugin_type: String, instance: String },

    /// A dependency already failed during configuration validation.
    #[error("Instance '{instance}' of {plugin_type} already failed validation")]
    UpstreamFailure { plugin_type: String, instance: String },

    /// An instance could not be serialized at registration time.
    #[error("Unable to serialize instance of {type_name}: {source}")]
    Serialization {
        type_name: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DiError {
    /// Walks through [`DiError::Argument`] wrappers to the innermost failure.
    ///
    /// ```rust
    /// use ferrous_ioc::DiError;
    ///
    /// let inner = DiError::MissingDefault { plugin_type: "dyn Clock".to_string() };
    /// let outer = DiError::Argument {
    ///     concrete_type: "Scheduler".to_string(),
    ///     member: "constructor argument 'clock'".to_string(),
    ///     source: Box::new(inner),
    /// };
    /// assert!(matches!(outer.root_cause(), DiError::MissingDefault { .. }));
    /// ```
    pub fn root_cause(&self) -> &DiError {
        let mut current = self;
        while let DiError::Argument { source, .. } = current {
            current = source;
        }
        current
    }

    /// True when the innermost failure says nothing is registered.
    pub fn is_not_registered(&self) -> bool {
        matches!(
            self.root_cause(),
            DiError::MissingDefault { .. } | DiError::MissingNamed { .. }
        )
    }

    /// True when the innermost failure is a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self.root_cause(), DiError::Configuration(_))
    }
}

/// One unresolved member of a build plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyFailure {
    /// The member that failed, e.g. `constructor argument 'color'`.
    pub member: String,
    /// Why it failed.
    pub reason: String,
}

impl fmt::Display for DependencyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.member, self.reason)
    }
}

/// Errors in the shape of the configuration, detected at plan-compile time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The build plan has one or more failed members.
    #[error("Unable to create a build plan for concrete type {concrete_type} (plugin type {plugin_type}):{}", format_failures(.failures))]
    InvalidBuildPlan {
        concrete_type: String,
        plugin_type: String,
        failures: Vec<DependencyFailure>,
    },

    /// A concrete type declares no public constructor.
    #[error("No public constructor could be selected for concrete type {concrete_type}")]
    NoPublicConstructor { concrete_type: String },

    /// An instance pinned a constructor label the type does not declare.
    #[error("Concrete type {concrete_type} has no constructor labelled '{label}'")]
    UnknownConstructor { concrete_type: String, label: String },

    /// A concrete type cannot be plugged into the requested plugin type.
    #[error("{concrete_type} cannot be plugged into {plugin_type}")]
    NotPluggable {
        concrete_type: String,
        plugin_type: String,
    },

    /// A decorator's accepted or returned type is not exactly the plugin type.
    #[error("Decorator '{description}' accepts {accepts} and returns {returns}, but must accept and return exactly {plugin_type}")]
    DecoratorMismatch {
        description: String,
        plugin_type: String,
        accepts: String,
        returns: String,
    },

    /// An activator's accepted type cannot be assigned from the built value.
    #[error("Activator '{description}' accepts {accepts}, which is not assignable from {returned_type}")]
    ActivatorMismatch {
        description: String,
        accepts: String,
        returned_type: String,
    },

    /// Referenced instances form a cycle.
    #[error("Cyclic instance reference: {}", .path.join(" -> "))]
    CyclicReference { path: Vec<String> },

    /// A referenced instance does not exist.
    #[error("Referenced instance '{name}' of {plugin_type} is not registered")]
    MissingReference { plugin_type: String, name: String },

    /// An open generic template was requested without type arguments.
    #[error("Open generic template {template} cannot be built without closing it first")]
    OpenGeneric { template: String },

    /// A literal or serialized value does not match the plugin type.
    #[error("Value of type {value_type} cannot be used for plugin type {plugin_type}")]
    ValueMismatch {
        value_type: String,
        plugin_type: String,
    },
}

fn format_failures(failures: &[DependencyFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("\n  - {}", failure))
        .collect()
}
