//! Plugin type keys.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Identifies a plugin type or a concrete type.
///
/// Keys compare by [`TypeId`] only; the type name is carried for diagnostics.
/// Closed generic types may additionally carry their [`GenericArgs`] so that an
/// open generic family can manufacture an instance for them on request.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::TypeKey;
///
/// trait Clock: Send + Sync {}
///
/// let a = TypeKey::of::<dyn Clock>();
/// let b = TypeKey::of::<dyn Clock>();
/// assert_eq!(a, b);
/// assert_eq!(a.short_name(), "dyn Clock");
/// assert_eq!(TypeKey::of::<String>().short_name(), "String");
/// ```
#[derive(Clone)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
    generic: Option<Arc<GenericArgs>>,
}

/// Type arguments of a closed generic plugin type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericArgs {
    /// Name of the open generic template, e.g. `"Repository"`.
    pub template: &'static str,
    /// The type arguments, in declaration order.
    pub arguments: Vec<TypeKey>,
}

/// Implemented by closed generic types that can be resolved from an open
/// generic family.
///
/// ```rust
/// use ferrous_ioc::{GenericType, TypeKey};
///
/// trait Repository<E>: Send + Sync {}
///
/// impl<E: 'static> GenericType for dyn Repository<E> {
///     const TEMPLATE: &'static str = "Repository";
///     fn type_arguments() -> Vec<TypeKey> {
///         vec![TypeKey::of::<E>()]
///     }
/// }
///
/// struct User;
/// let key = TypeKey::of_generic::<dyn Repository<User>>();
/// assert_eq!(key.generic().unwrap().template, "Repository");
/// ```
pub trait GenericType: 'static {
    /// The open template this type closes.
    const TEMPLATE: &'static str;

    /// The type arguments that close the template.
    fn type_arguments() -> Vec<TypeKey>;
}

impl TypeKey {
    /// Key for any `'static` type, including trait objects.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            generic: None,
        }
    }

    /// Key for a closed generic type, carrying its template and arguments.
    pub fn of_generic<T: ?Sized + GenericType>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            generic: Some(Arc::new(GenericArgs {
                template: T::TEMPLATE,
                arguments: T::type_arguments(),
            })),
        }
    }

    /// The underlying [`TypeId`].
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Full `std::any::type_name` of the type.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name with module paths stripped.
    pub fn short_name(&self) -> String {
        short_type_name(self.name)
    }

    /// Generic arguments, when the key was created with [`TypeKey::of_generic`].
    pub fn generic(&self) -> Option<&GenericArgs> {
        self.generic.as_deref()
    }

    pub(crate) fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeKey {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_name())
    }
}

/// Strips `path::to::` prefixes from every segment of a type name.
pub(crate) fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut segment = String::new();
    let mut chars = full.chars().peekable();

    while let Some(c) = chars.next() {
        if c == ':' && chars.peek() == Some(&':') {
            chars.next();
            segment.clear();
        } else if c.is_alphanumeric() || c == '_' {
            segment.push(c);
        } else {
            out.push_str(&segment);
            segment.clear();
            out.push(c);
        }
    }
    out.push_str(&segment);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names_strip_paths() {
        assert_eq!(short_type_name("alloc::string::String"), "String");
        assert_eq!(short_type_name("dyn my_app::widgets::IWidget"), "dyn IWidget");
        assert_eq!(
            short_type_name("alloc::vec::Vec<alloc::sync::Arc<dyn app::IService>>"),
            "Vec<Arc<dyn IService>>"
        );
        assert_eq!(short_type_name("u32"), "u32");
    }

    #[test]
    fn keys_compare_by_type_id_only() {
        struct Marker;
        let plain = TypeKey::of::<Marker>();
        let again = TypeKey::of::<Marker>();
        assert_eq!(plain, again);
        assert_ne!(plain, TypeKey::of::<u8>());
        assert!(plain.is::<Marker>());
    }
}
