//! Instances wrapping an already-built object.

use std::fmt;
use std::sync::Arc;

use super::{Configurable, Instance, InstanceCore, InstanceKind};
use crate::value::Value;

#[derive(Clone)]
pub(crate) struct LiteralSpec {
    pub(crate) value: Value,
}

impl LiteralSpec {
    pub(crate) fn description(&self) -> String {
        match self.value.label() {
            Some(label) => format!("Value {}", label),
            None => format!("Object of {}", self.value.type_key()),
        }
    }
}

/// Builder for an instance that always yields the same object.
pub struct LiteralInstance {
    core: InstanceCore,
    spec: LiteralSpec,
}

impl LiteralInstance {
    pub(crate) fn object<P: ?Sized + Send + Sync + 'static>(object: Arc<P>) -> Self {
        Self::from_value(Value::new(object))
    }

    pub(crate) fn value<V: fmt::Debug + Send + Sync + 'static>(value: V) -> Self {
        Self::from_value(Value::described(value))
    }

    fn from_value(value: Value) -> Self {
        Self {
            core: InstanceCore::new(),
            spec: LiteralSpec { value },
        }
    }
}

impl Configurable for LiteralInstance {
    fn core_mut(&mut self) -> &mut InstanceCore {
        &mut self.core
    }
}

impl From<LiteralInstance> for Instance {
    fn from(instance: LiteralInstance) -> Self {
        Instance::from_kind(instance.core, InstanceKind::Literal(instance.spec))
    }
}
