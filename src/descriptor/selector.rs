//! Constructor selection.

use std::fmt;
use std::sync::Arc;

use super::{Constructor, TypeDescriptor};
use crate::error::ConfigurationError;

/// One link in the constructor selection chain.
///
/// Strategies return `None` to defer to the next link.
///
/// ```rust
/// use ferrous_ioc::{Constructor, ConstructorStrategy, TypeDescriptor};
/// use std::sync::Arc;
///
/// /// Prefers the constructor with the fewest parameters.
/// struct Leanest;
///
/// impl ConstructorStrategy for Leanest {
///     fn select(&self, descriptor: &TypeDescriptor) -> Option<Arc<Constructor>> {
///         descriptor.constructors().iter().min_by_key(|c| c.arity()).cloned()
///     }
/// }
/// ```
pub trait ConstructorStrategy: Send + Sync {
    fn select(&self, descriptor: &TypeDescriptor) -> Option<Arc<Constructor>>;
}

/// Picks the constructor marked with [`designated`](super::ConstructorBuilder::designated).
#[derive(Debug, Default, Clone, Copy)]
pub struct DesignatedConstructor;

impl ConstructorStrategy for DesignatedConstructor {
    fn select(&self, descriptor: &TypeDescriptor) -> Option<Arc<Constructor>> {
        descriptor.constructors().iter().find(|c| c.is_designated()).cloned()
    }
}

/// Picks the constructor with the most parameters; the first declared wins ties.
#[derive(Debug, Default, Clone, Copy)]
pub struct GreediestConstructor;

impl ConstructorStrategy for GreediestConstructor {
    fn select(&self, descriptor: &TypeDescriptor) -> Option<Arc<Constructor>> {
        let mut best: Option<&Arc<Constructor>> = None;
        for ctor in descriptor.constructors() {
            if best.map_or(true, |b| ctor.arity() > b.arity()) {
                best = Some(ctor);
            }
        }
        best.cloned()
    }
}

/// The ordered strategy chain: custom strategies first, then
/// [`DesignatedConstructor`], then [`GreediestConstructor`].
#[derive(Clone, Default)]
pub struct ConstructorSelector {
    custom: Vec<Arc<dyn ConstructorStrategy>>,
}

impl ConstructorSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a custom strategy, consulted before the built-in ones.
    pub fn add(&mut self, strategy: Arc<dyn ConstructorStrategy>) {
        self.custom.push(strategy);
    }

    pub(crate) fn extend(&mut self, other: ConstructorSelector) {
        self.custom.extend(other.custom);
    }

    /// Selects the constructor used to build `descriptor`'s type.
    ///
    /// A type with a single constructor always uses it. A type with none is a
    /// configuration error.
    pub fn select(&self, descriptor: &TypeDescriptor) -> Result<Arc<Constructor>, ConfigurationError> {
        let no_constructor = || ConfigurationError::NoPublicConstructor {
            concrete_type: descriptor.display_name(),
        };

        match descriptor.constructors() {
            [] => return Err(no_constructor()),
            [only] => return Ok(only.clone()),
            _ => {}
        }

        self.custom
            .iter()
            .map(|s| s.as_ref())
            .chain([&DesignatedConstructor as &dyn ConstructorStrategy, &GreediestConstructor])
            .find_map(|strategy| strategy.select(descriptor))
            .ok_or_else(no_constructor)
    }

    /// Finds the constructor carrying `label`.
    pub fn labelled(descriptor: &TypeDescriptor, label: &str) -> Result<Arc<Constructor>, ConfigurationError> {
        descriptor
            .constructors()
            .iter()
            .find(|c| c.label() == Some(label))
            .cloned()
            .ok_or_else(|| ConfigurationError::UnknownConstructor {
                concrete_type: descriptor.display_name(),
                label: label.to_string(),
            })
    }
}

impl fmt::Debug for ConstructorSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorSelector")
            .field("custom_strategies", &self.custom.len())
            .finish()
    }
}
