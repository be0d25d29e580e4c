//! Type-erased built objects.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{DiError, DiResult};
use crate::key::TypeKey;
use crate::traits::Dispose;

pub(crate) type AnyArc = Arc<dyn Any + Send + Sync>;

/// A built object viewed as exactly one static type.
///
/// The payload is an `Arc<T>` stored behind `dyn Any`, so trait objects
/// (`Arc<dyn Trait>`) and sized types travel the same way. Cloning a `Value`
/// never clones the object.
#[derive(Clone)]
pub struct Value {
    inner: AnyArc,
    ty: TypeKey,
    label: Option<Arc<str>>,
    disposer: Option<Arc<dyn Dispose>>,
}

impl Value {
    /// Wraps a shared object as a value of type `T`.
    pub fn new<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            inner: Arc::new(value),
            ty: TypeKey::of::<T>(),
            label: None,
            disposer: None,
        }
    }

    /// Wraps a plain value and records its `Debug` text for build plan descriptions.
    pub fn described<T: fmt::Debug + Send + Sync + 'static>(value: T) -> Self {
        let label: Arc<str> = Arc::from(format!("{:?}", value));
        Self::new(Arc::new(value)).with_label(label)
    }

    pub(crate) fn with_label(mut self, label: Arc<str>) -> Self {
        self.label = Some(label);
        self
    }

    pub(crate) fn with_disposer(mut self, disposer: Arc<dyn Dispose>) -> Self {
        self.disposer = Some(disposer);
        self
    }

    /// The static type this value is viewed as.
    pub fn type_key(&self) -> &TypeKey {
        &self.ty
    }

    /// Diagnostic text recorded for literal values.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Recovers the typed `Arc<T>`, or `None` when `T` is not the stored type.
    pub fn downcast<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.inner.downcast_ref::<Arc<T>>().cloned()
    }

    /// Like [`Value::downcast`], failing with [`DiError::TypeMismatch`].
    pub fn expect_type<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        self.downcast::<T>().ok_or_else(|| DiError::TypeMismatch {
            expected: crate::key::short_type_name(std::any::type_name::<T>()),
            actual: self.ty.short_name(),
        })
    }

    pub(crate) fn disposer(&self) -> Option<&Arc<dyn Dispose>> {
        self.disposer.as_ref()
    }

    /// Carries the disposal hook of `origin` when this value has none of its own.
    pub(crate) fn inherit_disposer(mut self, origin: &Value) -> Self {
        if self.disposer.is_none() {
            self.disposer = origin.disposer.clone();
        }
        self
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "Value<{}>({})", self.ty, label),
            None => write!(f, "Value<{}>", self.ty),
        }
    }
}
