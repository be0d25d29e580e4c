//! Explicit dependency overrides declared on a constructed instance.

use std::fmt;
use std::sync::Arc;

use crate::instance::Instance;
use crate::key::TypeKey;
use crate::value::Value;

/// An explicit override for one constructor parameter or setter.
#[derive(Clone)]
pub enum Dependency {
    /// A ready value, used as a constant.
    Value(Value),
    /// Another instance, built with its own lifecycle.
    Instance(Arc<Instance>),
    /// An explicit list of instances for an enumerable parameter.
    Instances(Vec<Arc<Instance>>),
}

impl Dependency {
    pub(crate) fn instances(&self) -> Vec<&Arc<Instance>> {
        match self {
            Dependency::Value(_) => Vec::new(),
            Dependency::Instance(instance) => vec![instance],
            Dependency::Instances(instances) => instances.iter().collect(),
        }
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Value(value) => write!(f, "{:?}", value),
            Dependency::Instance(instance) => write!(f, "Instance({})", instance.name()),
            Dependency::Instances(instances) => f
                .debug_list()
                .entries(instances.iter().map(|i| i.name()))
                .finish(),
        }
    }
}

#[derive(Clone, Debug)]
struct Entry {
    name: Option<String>,
    ty: TypeKey,
    dependency: Dependency,
}

/// Ordered overrides keyed by parameter name and type.
///
/// Lookups try the exact name and type first, then an entry registered for
/// the type alone. Anything else is left to auto-wiring.
///
/// ```rust
/// use ferrous_ioc::{Dependency, DependencyCollection, TypeKey, Value};
///
/// let mut deps = DependencyCollection::new();
/// deps.add(None, TypeKey::of::<u32>(), Dependency::Value(Value::described(1u32)));
/// deps.add(Some("port"), TypeKey::of::<u32>(), Dependency::Value(Value::described(8080u32)));
///
/// let port = deps.find("port", &TypeKey::of::<u32>()).unwrap();
/// assert!(matches!(port, Dependency::Value(v) if v.label() == Some("8080")));
///
/// let other = deps.find("timeout", &TypeKey::of::<u32>()).unwrap();
/// assert!(matches!(other, Dependency::Value(v) if v.label() == Some("1")));
///
/// assert!(deps.find("port", &TypeKey::of::<String>()).is_none());
/// ```
#[derive(Clone, Debug, Default)]
pub struct DependencyCollection {
    entries: Vec<Entry>,
}

impl DependencyCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an override, replacing any entry with the same name and type.
    pub fn add(&mut self, name: Option<&str>, ty: TypeKey, dependency: Dependency) {
        let name = name.map(str::to_string);
        match self.entries.iter_mut().find(|e| e.name == name && e.ty == ty) {
            Some(existing) => existing.dependency = dependency,
            None => self.entries.push(Entry { name, ty, dependency }),
        }
    }

    /// Finds the override for a member named `name` of type `ty`.
    pub fn find(&self, name: &str, ty: &TypeKey) -> Option<&Dependency> {
        self.entries
            .iter()
            .find(|e| e.name.as_deref() == Some(name) && e.ty == *ty)
            .or_else(|| self.entries.iter().find(|e| e.name.is_none() && e.ty == *ty))
            .map(|e| &e.dependency)
    }

    /// True when an override exists for `name` with type `ty`.
    pub fn has(&self, name: &str, ty: &TypeKey) -> bool {
        self.find(name, ty).is_some()
    }

    /// Copies every entry of `other` over this collection.
    pub fn merge(&mut self, other: &DependencyCollection) {
        for entry in &other.entries {
            self.add(entry.name.as_deref(), entry.ty.clone(), entry.dependency.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every nested instance, in declaration order.
    pub(crate) fn nested_instances(&self) -> impl Iterator<Item = &Arc<Instance>> {
        self.entries.iter().flat_map(|e| e.dependency.instances())
    }

    /// Rebuilds the collection with every nested instance passed through `map`.
    /// Returns `None` as soon as `map` does.
    pub(crate) fn try_map_instances<F>(&self, mut map: F) -> Option<DependencyCollection>
    where
        F: FnMut(&Arc<Instance>) -> Option<Arc<Instance>>,
    {
        let mut entries = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let dependency = match &entry.dependency {
                Dependency::Value(value) => Dependency::Value(value.clone()),
                Dependency::Instance(instance) => Dependency::Instance(map(instance)?),
                Dependency::Instances(instances) => Dependency::Instances(
                    instances.iter().map(&mut map).collect::<Option<Vec<_>>>()?,
                ),
            };
            entries.push(Entry {
                name: entry.name.clone(),
                ty: entry.ty.clone(),
                dependency,
            });
        }
        Some(DependencyCollection { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_and_type_replaces() {
        let mut deps = DependencyCollection::new();
        deps.add(Some("color"), TypeKey::of::<String>(), Dependency::Value(Value::described("Red".to_string())));
        deps.add(Some("color"), TypeKey::of::<String>(), Dependency::Value(Value::described("Blue".to_string())));

        assert_eq!(deps.len(), 1);
        let found = deps.find("color", &TypeKey::of::<String>()).unwrap();
        assert!(matches!(found, Dependency::Value(v) if v.label() == Some("\"Blue\"")));
    }

    #[test]
    fn unset_members_are_left_alone() {
        let deps = DependencyCollection::new();
        assert!(deps.is_empty());
        assert!(!deps.has("anything", &TypeKey::of::<u8>()));
    }

    #[test]
    fn merge_overrides_existing_entries() {
        let mut base = DependencyCollection::new();
        base.add(Some("size"), TypeKey::of::<u32>(), Dependency::Value(Value::described(1u32)));
        base.add(Some("name"), TypeKey::of::<String>(), Dependency::Value(Value::described("a".to_string())));

        let mut overrides = DependencyCollection::new();
        overrides.add(Some("size"), TypeKey::of::<u32>(), Dependency::Value(Value::described(2u32)));
        base.merge(&overrides);

        assert_eq!(base.len(), 2);
        let size = base.find("size", &TypeKey::of::<u32>()).unwrap();
        assert!(matches!(size, Dependency::Value(v) if v.label() == Some("2")));
    }
}
