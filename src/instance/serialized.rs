//! Instances stored as JSON and deserialized on every build.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Configurable, Instance, InstanceCore, InstanceKind};
use crate::descriptor::Caster;
use crate::error::{DiError, DiResult};
use crate::key::TypeKey;
use crate::value::Value;

type Deserializer = Arc<dyn Fn(&str) -> Result<Value, serde_json::Error> + Send + Sync>;

#[derive(Clone)]
pub(crate) struct SerializedSpec {
    pub(crate) returned: TypeKey,
    pub(crate) json: Arc<str>,
    deserialize: Deserializer,
    casts: Vec<(TypeKey, Caster)>,
}

impl SerializedSpec {
    pub(crate) fn deserialize(&self) -> DiResult<Value> {
        (self.deserialize)(&self.json).map_err(|source| DiError::Build {
            instance: format!("serialized {}", self.returned),
            source: Box::new(source),
        })
    }

    pub(crate) fn caster_for(&self, plugin: &TypeKey) -> Option<Caster> {
        self.casts
            .iter()
            .find(|(target, _)| target == plugin)
            .map(|(_, caster)| caster.clone())
    }
}

/// Builder for an instance holding a serialized prototype.
///
/// Every build deserializes a new, independent object.
///
/// ```rust
/// use ferrous_ioc::prelude::*;
/// use serde::{Deserialize, Serialize};
/// use std::sync::Arc;
///
/// #[derive(Serialize, Deserialize)]
/// struct Settings {
///     retries: u32,
/// }
///
/// let mut registry = Registry::new();
/// registry
///     .for_type::<Settings>()
///     .use_instance(Instance::serialized(&Settings { retries: 3 }).unwrap());
///
/// let container = Container::new(registry);
/// let a = container.get_instance::<Settings>().unwrap();
/// let b = container.get_instance::<Settings>().unwrap();
/// assert_eq!(a.retries, 3);
/// assert!(!Arc::ptr_eq(&a, &b));
/// ```
pub struct SerializedInstance {
    core: InstanceCore,
    spec: SerializedSpec,
}

impl SerializedInstance {
    pub(crate) fn new<T>(value: &T) -> DiResult<Self>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let json = serde_json::to_string(value).map_err(|source| DiError::Serialization {
            type_name: crate::key::short_type_name(std::any::type_name::<T>()),
            source,
        })?;
        let deserialize: Deserializer = Arc::new(|json: &str| -> Result<Value, serde_json::Error> {
            serde_json::from_str::<T>(json).map(|object| Value::new(Arc::new(object)))
        });

        Ok(Self {
            core: InstanceCore::new(),
            spec: SerializedSpec {
                returned: TypeKey::of::<T>(),
                json: Arc::from(json),
                deserialize,
                casts: Vec::new(),
            },
        })
    }

    /// Lets the deserialized `T` be used as plugin type `P`.
    pub fn plugs_into<T, P>(mut self, cast: fn(Arc<T>) -> Arc<P>) -> Self
    where
        T: Send + Sync + 'static,
        P: ?Sized + Send + Sync + 'static,
    {
        let caster: Caster = Arc::new(move |value: &Value| -> DiResult<Value> {
            Ok(Value::new(cast(value.expect_type::<T>()?)))
        });
        self.spec.casts.push((TypeKey::of::<P>(), caster));
        self
    }

    /// The stored JSON text.
    pub fn json(&self) -> &str {
        &self.spec.json
    }
}

impl Configurable for SerializedInstance {
    fn core_mut(&mut self) -> &mut InstanceCore {
        &mut self.core
    }
}

impl From<SerializedInstance> for Instance {
    fn from(instance: SerializedInstance) -> Self {
        Instance::from_kind(instance.core, InstanceKind::Serialized(instance.spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn each_deserialization_is_a_fresh_object() {
        let instance = SerializedInstance::new(&Point { x: 1, y: 2 }).unwrap();
        assert_eq!(instance.json(), r#"{"x":1,"y":2}"#);

        let a = instance.spec.deserialize().unwrap().expect_type::<Point>().unwrap();
        let b = instance.spec.deserialize().unwrap().expect_type::<Point>().unwrap();
        assert_eq!(*a, Point { x: 1, y: 2 });
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
