//! Constructor and setter descriptors for concrete types.
//!
//! Rust has no runtime reflection, so every concrete type the container builds
//! describes itself once through a typed builder. The resulting
//! [`TypeDescriptor`] lists the public constructors with their ordered
//! parameters, the settable properties, the plugin types the concrete type can
//! be plugged into, and any validation methods. Descriptors are immutable and
//! shared behind `Arc`.
//!
//! # Examples
//!
//! ```rust
//! use ferrous_ioc::{ParameterKind, TypeDescriptor};
//! use std::sync::Arc;
//!
//! trait Clock: Send + Sync {}
//!
//! struct Scheduler {
//!     clock: Arc<dyn Clock>,
//!     interval: u64,
//! }
//!
//! let descriptor = TypeDescriptor::of::<Scheduler>()
//!     .constructor(|c| {
//!         c.service::<dyn Clock>("clock")
//!             .primitive_or("interval", 30u64)
//!             .build(|args| {
//!                 Ok(Scheduler {
//!                     clock: args.get("clock")?,
//!                     interval: args.value("interval")?,
//!                 })
//!             })
//!     })
//!     .build();
//!
//! let ctor = &descriptor.constructors()[0];
//! assert_eq!(ctor.arity(), 2);
//! assert_eq!(ctor.parameters()[0].kind(), ParameterKind::Service);
//! assert!(ctor.parameters()[1].has_default());
//! ```

mod selector;

pub use selector::{ConstructorSelector, ConstructorStrategy, DesignatedConstructor, GreediestConstructor};

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::{BoxError, DiError, DiResult};
use crate::key::{GenericType, TypeKey};
use crate::traits::Dispose;
use crate::value::Value;

/// A freshly constructed object before it is sealed into a [`Value`].
pub(crate) type BoxedObject = Box<dyn Any + Send + Sync>;

type Invoke = Arc<dyn Fn(&Arguments) -> Result<BoxedObject, BoxError> + Send + Sync>;
type Seal = Arc<dyn Fn(BoxedObject) -> DiResult<Value> + Send + Sync>;
type Apply = Arc<dyn Fn(&mut (dyn Any + Send + Sync), &Value) -> Result<(), BoxError> + Send + Sync>;
type Check = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;
pub(crate) type Caster = Arc<dyn Fn(&Value) -> DiResult<Value> + Send + Sync>;
pub(crate) type Collector = Arc<dyn Fn(Vec<Value>) -> DiResult<Value> + Send + Sync>;
pub(crate) type Closer = Arc<dyn Fn(&[TypeKey]) -> Option<Arc<TypeDescriptor>> + Send + Sync>;

/// How a constructor parameter or setter is satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    /// A single service, auto-wired from the default instance of its type.
    Service,
    /// Every registered instance of the element type, in registration order.
    Enumerable,
    /// A primitive or string value that must be supplied explicitly.
    Primitive,
}

/// One constructor parameter.
#[derive(Clone)]
pub struct Parameter {
    name: &'static str,
    ty: TypeKey,
    kind: ParameterKind,
    default: Option<Value>,
    collect: Option<Collector>,
}

impl Parameter {
    /// Parameter name, used to match explicit dependencies.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared type. For enumerable parameters this is the element type.
    pub fn ty(&self) -> &TypeKey {
        &self.ty
    }

    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    /// True when the parameter declares a default value.
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub(crate) fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub(crate) fn collector(&self) -> Option<&Collector> {
        self.collect.as_ref()
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("kind", &self.kind)
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

/// A public constructor of a concrete type.
pub struct Constructor {
    label: Option<&'static str>,
    designated: bool,
    parameters: Vec<Parameter>,
    invoke: Invoke,
}

impl Constructor {
    /// Optional label an instance can use to pin this constructor.
    pub fn label(&self) -> Option<&'static str> {
        self.label
    }

    /// True when this constructor was marked as the designated one.
    pub fn is_designated(&self) -> bool {
        self.designated
    }

    /// Ordered parameters.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    pub(crate) fn invoke(&self, arguments: &Arguments) -> Result<BoxedObject, BoxError> {
        (self.invoke)(arguments)
    }

    /// `name(a, b)` style signature used in plan descriptions.
    pub(crate) fn signature(&self, concrete: &TypeKey) -> String {
        let names: Vec<&str> = self.parameters.iter().map(|p| p.name).collect();
        match self.label {
            Some(label) => format!("{}::{}({})", concrete, label, names.join(", ")),
            None => format!("{}({})", concrete, names.join(", ")),
        }
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("label", &self.label)
            .field("designated", &self.designated)
            .field("parameters", &self.parameters)
            .finish()
    }
}

/// A settable property of a concrete type.
pub struct Setter {
    name: &'static str,
    ty: TypeKey,
    kind: ParameterKind,
    mandatory: bool,
    apply: Apply,
}

impl Setter {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn ty(&self) -> &TypeKey {
        &self.ty
    }

    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    /// Mandatory setters are always filled; optional ones only when a setter
    /// policy selects them or an explicit dependency names them.
    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    pub(crate) fn apply(&self, target: &mut (dyn Any + Send + Sync), value: &Value) -> Result<(), BoxError> {
        (self.apply)(target, value)
    }
}

impl fmt::Debug for Setter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setter")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("mandatory", &self.mandatory)
            .finish()
    }
}

/// A user-defined post-construction check, run by configuration validation.
#[derive(Clone)]
pub struct ValidationMethod {
    name: &'static str,
    check: Check,
}

impl ValidationMethod {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn run(&self, value: &Value) -> Result<(), String> {
        (self.check)(value)
    }
}

#[derive(Clone)]
struct OpenTemplate {
    template: &'static str,
    closer: Closer,
}

/// Marker key for open templates, which have no concrete Rust type.
struct OpenGenericTemplate;

/// Everything the container knows about a concrete type.
pub struct TypeDescriptor {
    ty: TypeKey,
    constructors: Vec<Arc<Constructor>>,
    setters: Vec<Arc<Setter>>,
    casts: Vec<(TypeKey, Caster)>,
    validations: Vec<ValidationMethod>,
    seal: Option<Seal>,
    open: Option<OpenTemplate>,
}

impl TypeDescriptor {
    /// Starts describing the concrete type `T`.
    pub fn of<T: Send + Sync + 'static>() -> TypeDescriptorBuilder<T> {
        TypeDescriptorBuilder {
            constructors: Vec::new(),
            setters: Vec::new(),
            casts: Vec::new(),
            validations: Vec::new(),
            disposer: None,
            _marker: PhantomData,
        }
    }

    /// Describes an open generic template.
    ///
    /// The closer receives the type arguments of a requested closed type and
    /// returns the closed descriptor, or `None` when the arguments cannot close
    /// this template.
    ///
    /// ```rust
    /// use ferrous_ioc::{TypeDescriptor, TypeKey};
    /// use std::marker::PhantomData;
    ///
    /// struct Store<E>(PhantomData<E>);
    ///
    /// let open = TypeDescriptor::open("Store", |args| {
    ///     if args.first() == Some(&TypeKey::of::<u32>()) {
    ///         Some(
    ///             TypeDescriptor::of::<Store<u32>>()
    ///                 .constructor(|c| c.build(|_| Ok(Store(PhantomData))))
    ///                 .build(),
    ///         )
    ///     } else {
    ///         None
    ///     }
    /// });
    ///
    /// assert!(open.is_open());
    /// assert!(open.close(&[TypeKey::of::<u32>()]).is_some());
    /// assert!(open.close(&[TypeKey::of::<String>()]).is_none());
    /// ```
    pub fn open<F>(template: &'static str, closer: F) -> Arc<TypeDescriptor>
    where
        F: Fn(&[TypeKey]) -> Option<Arc<TypeDescriptor>> + Send + Sync + 'static,
    {
        Arc::new(TypeDescriptor {
            ty: TypeKey::of::<OpenGenericTemplate>(),
            constructors: Vec::new(),
            setters: Vec::new(),
            casts: Vec::new(),
            validations: Vec::new(),
            seal: None,
            open: Some(OpenTemplate {
                template,
                closer: Arc::new(closer),
            }),
        })
    }

    /// The concrete type.
    pub fn type_key(&self) -> &TypeKey {
        &self.ty
    }

    /// Display name: the short type name, or the template name for open types.
    pub fn display_name(&self) -> String {
        match &self.open {
            Some(open) => format!("{}<>", open.template),
            None => self.ty.short_name(),
        }
    }

    pub fn constructors(&self) -> &[Arc<Constructor>] {
        &self.constructors
    }

    pub fn setters(&self) -> &[Arc<Setter>] {
        &self.setters
    }

    pub fn validation_methods(&self) -> &[ValidationMethod] {
        &self.validations
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Closes an open template over `arguments`. Closed descriptors return `None`.
    pub fn close(&self, arguments: &[TypeKey]) -> Option<Arc<TypeDescriptor>> {
        self.open.as_ref().and_then(|open| (open.closer)(arguments))
    }

    /// True when values of this type can be used as `plugin`.
    pub fn can_be_plugged_into(&self, plugin: &TypeKey) -> bool {
        !self.is_open() && (self.ty == *plugin || self.casts.iter().any(|(target, _)| target == plugin))
    }

    /// Plugin types reachable through declared upcasts.
    pub fn plugin_types(&self) -> impl Iterator<Item = &TypeKey> {
        self.casts.iter().map(|(target, _)| target)
    }

    pub(crate) fn caster_for(&self, plugin: &TypeKey) -> Option<Caster> {
        self.casts
            .iter()
            .find(|(target, _)| target == plugin)
            .map(|(_, caster)| caster.clone())
    }

    /// Turns a constructed object into a [`Value`] of the concrete type.
    pub(crate) fn seal(&self, object: BoxedObject) -> DiResult<Value> {
        match &self.seal {
            Some(seal) => seal(object),
            None => Err(DiError::TypeMismatch {
                expected: self.display_name(),
                actual: "open generic template".to_string(),
            }),
        }
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("type", &self.display_name())
            .field("constructors", &self.constructors.len())
            .field("setters", &self.setters.len())
            .field("plugin_types", &self.casts.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .finish()
    }
}

/// Typed builder returned by [`TypeDescriptor::of`].
pub struct TypeDescriptorBuilder<T> {
    constructors: Vec<Arc<Constructor>>,
    setters: Vec<Arc<Setter>>,
    casts: Vec<(TypeKey, Caster)>,
    validations: Vec<ValidationMethod>,
    disposer: Option<fn(Arc<T>) -> Arc<dyn Dispose>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> TypeDescriptorBuilder<T> {
    /// Declares a public constructor. Declaration order matters for tie-breaks.
    pub fn constructor<F>(mut self, define: F) -> Self
    where
        F: FnOnce(ConstructorBuilder<T>) -> Constructor,
    {
        let ctor = define(ConstructorBuilder {
            label: None,
            designated: false,
            parameters: Vec::new(),
            _marker: PhantomData,
        });
        self.constructors.push(Arc::new(ctor));
        self
    }

    /// Declares an optional service setter.
    pub fn setter<P, F>(self, name: &'static str, apply: F) -> Self
    where
        P: ?Sized + Send + Sync + 'static,
        F: Fn(&mut T, Arc<P>) + Send + Sync + 'static,
    {
        self.push_setter::<P, F>(name, ParameterKind::Service, false, apply)
    }

    /// Declares a service setter that is always filled.
    pub fn required_setter<P, F>(self, name: &'static str, apply: F) -> Self
    where
        P: ?Sized + Send + Sync + 'static,
        F: Fn(&mut T, Arc<P>) + Send + Sync + 'static,
    {
        self.push_setter::<P, F>(name, ParameterKind::Service, true, apply)
    }

    /// Declares an optional primitive setter, filled only from explicit values.
    pub fn primitive_setter<V, F>(self, name: &'static str, apply: F) -> Self
    where
        V: Send + Sync + 'static,
        F: Fn(&mut T, Arc<V>) + Send + Sync + 'static,
    {
        self.push_setter::<V, F>(name, ParameterKind::Primitive, false, apply)
    }

    fn push_setter<P, F>(mut self, name: &'static str, kind: ParameterKind, mandatory: bool, apply: F) -> Self
    where
        P: ?Sized + Send + Sync + 'static,
        F: Fn(&mut T, Arc<P>) + Send + Sync + 'static,
    {
        let apply: Apply = Arc::new(move |target: &mut (dyn Any + Send + Sync), value: &Value| -> Result<(), BoxError> {
            let target = target.downcast_mut::<T>().ok_or_else(|| DiError::TypeMismatch {
                expected: crate::key::short_type_name(std::any::type_name::<T>()),
                actual: "setter target".to_string(),
            })?;
            apply(target, value.expect_type::<P>()?);
            Ok(())
        });
        self.setters.push(Arc::new(Setter {
            name,
            ty: TypeKey::of::<P>(),
            kind,
            mandatory,
            apply,
        }));
        self
    }

    /// Declares that `T` can be plugged into `P`, typically a trait object.
    ///
    /// ```rust
    /// use ferrous_ioc::{TypeDescriptor, TypeKey};
    /// use std::sync::Arc;
    ///
    /// trait Widget: Send + Sync {}
    /// struct Button;
    /// impl Widget for Button {}
    ///
    /// let descriptor = TypeDescriptor::of::<Button>()
    ///     .constructor(|c| c.build(|_| Ok(Button)))
    ///     .plugs_into::<dyn Widget>(|b| b)
    ///     .build();
    ///
    /// assert!(descriptor.can_be_plugged_into(&TypeKey::of::<dyn Widget>()));
    /// ```
    pub fn plugs_into<P: ?Sized + Send + Sync + 'static>(mut self, cast: fn(Arc<T>) -> Arc<P>) -> Self {
        let caster: Caster = Arc::new(move |value: &Value| -> DiResult<Value> {
            let concrete = value.expect_type::<T>()?;
            Ok(Value::new(cast(concrete)).inherit_disposer(value))
        });
        self.casts.push((TypeKey::of::<P>(), caster));
        self
    }

    /// Same as [`plugs_into`](Self::plugs_into) for a closed generic plugin type.
    pub fn plugs_into_generic<P: ?Sized + GenericType + Send + Sync>(mut self, cast: fn(Arc<T>) -> Arc<P>) -> Self {
        let caster: Caster = Arc::new(move |value: &Value| -> DiResult<Value> {
            let concrete = value.expect_type::<T>()?;
            Ok(Value::new(cast(concrete)).inherit_disposer(value))
        });
        self.casts.push((TypeKey::of_generic::<P>(), caster));
        self
    }

    /// Registers `T`'s [`Dispose`] implementation so cached objects are
    /// disposed on ejection.
    pub fn disposable(mut self) -> Self
    where
        T: Dispose,
    {
        self.disposer = Some(|object: Arc<T>| -> Arc<dyn Dispose> { object });
        self
    }

    /// Adds a validation method run by
    /// [`Container::assert_configuration_is_valid`](crate::Container::assert_configuration_is_valid).
    pub fn validation_method<F>(mut self, name: &'static str, check: F) -> Self
    where
        F: Fn(&T) -> Result<(), String> + Send + Sync + 'static,
    {
        let check: Check = Arc::new(move |value: &Value| -> Result<(), String> {
            let object = value.expect_type::<T>().map_err(|e| e.to_string())?;
            check(&object)
        });
        self.validations.push(ValidationMethod { name, check });
        self
    }

    pub fn build(self) -> Arc<TypeDescriptor> {
        let disposer = self.disposer;
        let seal: Seal = Arc::new(move |object: BoxedObject| -> DiResult<Value> {
            let object = object.downcast::<T>().map_err(|_| DiError::TypeMismatch {
                expected: crate::key::short_type_name(std::any::type_name::<T>()),
                actual: "constructed object".to_string(),
            })?;
            let shared: Arc<T> = Arc::from(object);
            let value = Value::new(shared.clone());
            Ok(match disposer {
                Some(to_dispose) => value.with_disposer(to_dispose(shared)),
                None => value,
            })
        });

        Arc::new(TypeDescriptor {
            ty: TypeKey::of::<T>(),
            constructors: self.constructors,
            setters: self.setters,
            casts: self.casts,
            validations: self.validations,
            seal: Some(seal),
            open: None,
        })
    }
}

/// Builder for one constructor, passed to [`TypeDescriptorBuilder::constructor`].
pub struct ConstructorBuilder<T> {
    label: Option<&'static str>,
    designated: bool,
    parameters: Vec<Parameter>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> ConstructorBuilder<T> {
    /// A service parameter of type `P`.
    pub fn service<P: ?Sized + Send + Sync + 'static>(self, name: &'static str) -> Self {
        self.param(name, TypeKey::of::<P>(), ParameterKind::Service, None, None)
    }

    /// A service parameter of a closed generic type, so open families can close for it.
    pub fn generic_service<P: ?Sized + GenericType + Send + Sync>(self, name: &'static str) -> Self {
        self.param(name, TypeKey::of_generic::<P>(), ParameterKind::Service, None, None)
    }

    /// A service parameter with a fallback value used when nothing is registered.
    pub fn service_or<P: ?Sized + Send + Sync + 'static>(self, name: &'static str, default: Arc<P>) -> Self {
        self.param(name, TypeKey::of::<P>(), ParameterKind::Service, Some(Value::new(default)), None)
    }

    /// An enumerable parameter receiving `Vec<Arc<E>>` of every registered `E`.
    pub fn all<E: ?Sized + Send + Sync + 'static>(self, name: &'static str) -> Self {
        let collect: Collector = Arc::new(|values: Vec<Value>| -> DiResult<Value> {
            let items = values
                .iter()
                .map(|value| value.expect_type::<E>())
                .collect::<DiResult<Vec<Arc<E>>>>()?;
            Ok(Value::new(Arc::new(items)))
        });
        self.param(name, TypeKey::of::<E>(), ParameterKind::Enumerable, None, Some(collect))
    }

    /// A primitive parameter that must be supplied explicitly.
    pub fn primitive<V: Send + Sync + 'static>(self, name: &'static str) -> Self {
        self.param(name, TypeKey::of::<V>(), ParameterKind::Primitive, None, None)
    }

    /// A primitive parameter with a default value.
    pub fn primitive_or<V: fmt::Debug + Send + Sync + 'static>(self, name: &'static str, default: V) -> Self {
        self.param(name, TypeKey::of::<V>(), ParameterKind::Primitive, Some(Value::described(default)), None)
    }

    /// Labels the constructor so instances can pin it.
    pub fn label(mut self, label: &'static str) -> Self {
        self.label = Some(label);
        self
    }

    /// Marks this constructor as the one to use when several are declared.
    pub fn designated(mut self) -> Self {
        self.designated = true;
        self
    }

    /// Finishes the constructor with the function that builds `T` from its arguments.
    pub fn build<F>(self, construct: F) -> Constructor
    where
        F: Fn(&Arguments) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let invoke: Invoke = Arc::new(move |args: &Arguments| -> Result<BoxedObject, BoxError> {
            construct(args).map(|object| Box::new(object) as BoxedObject)
        });
        Constructor {
            label: self.label,
            designated: self.designated,
            parameters: self.parameters,
            invoke,
        }
    }

    fn param(
        mut self,
        name: &'static str,
        ty: TypeKey,
        kind: ParameterKind,
        default: Option<Value>,
        collect: Option<Collector>,
    ) -> Self {
        self.parameters.push(Parameter {
            name,
            ty,
            kind,
            default,
            collect,
        });
        self
    }
}

/// Resolved constructor arguments, in declared parameter order.
#[derive(Debug, Default)]
pub struct Arguments {
    values: SmallVec<[(&'static str, Value); 4]>,
}

impl Arguments {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            values: SmallVec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, name: &'static str, value: Value) {
        self.values.push((name, value));
    }

    fn find(&self, name: &str) -> DiResult<&Value> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, value)| value)
            .ok_or_else(|| DiError::MissingArgument { name: name.to_string() })
    }

    /// The shared service passed as `name`.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> DiResult<Arc<T>> {
        self.find(name)?.expect_type::<T>()
    }

    /// A clone of the primitive passed as `name`.
    pub fn value<T: Clone + Send + Sync + 'static>(&self, name: &str) -> DiResult<T> {
        self.get::<T>(name).map(|v| (*v).clone())
    }

    /// The collection passed to an enumerable parameter.
    pub fn all<E: ?Sized + Send + Sync + 'static>(&self, name: &str) -> DiResult<Vec<Arc<E>>> {
        self.get::<Vec<Arc<E>>>(name).map(|items| items.as_ref().clone())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Argument names in evaluation order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.iter().map(|(name, _)| *name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English {
        name: String,
        punctuation: Option<Arc<String>>,
    }

    impl Greeter for English {
        fn greet(&self) -> String {
            let mark = self.punctuation.as_deref().map(String::as_str).unwrap_or(".");
            format!("Hello, {}{}", self.name, mark)
        }
    }

    fn english() -> Arc<TypeDescriptor> {
        TypeDescriptor::of::<English>()
            .constructor(|c| {
                c.primitive::<String>("name").build(|args| {
                    Ok(English {
                        name: args.value("name")?,
                        punctuation: None,
                    })
                })
            })
            .primitive_setter::<String, _>("punctuation", |e, p| e.punctuation = Some(p))
            .plugs_into::<dyn Greeter>(|e| e)
            .build()
    }

    #[test]
    fn constructs_seals_and_casts() {
        let descriptor = english();
        let mut args = Arguments::with_capacity(1);
        args.push("name", Value::described("Ada".to_string()));

        let object = descriptor.constructors()[0].invoke(&args).unwrap();
        let value = descriptor.seal(object).unwrap();
        let plugin = TypeKey::of::<dyn Greeter>();
        assert!(descriptor.can_be_plugged_into(&plugin));

        let cast = descriptor.caster_for(&plugin).unwrap()(&value).unwrap();
        assert_eq!(cast.expect_type::<dyn Greeter>().unwrap().greet(), "Hello, Ada.");
    }

    #[test]
    fn setters_mutate_before_sealing() {
        let descriptor = english();
        let mut args = Arguments::default();
        args.push("name", Value::described("Bob".to_string()));

        let mut object = descriptor.constructors()[0].invoke(&args).unwrap();
        let setter = &descriptor.setters()[0];
        assert!(!setter.is_mandatory());
        setter
            .apply(object.as_mut(), &Value::described("!".to_string()))
            .unwrap();

        let value = descriptor.seal(object).unwrap();
        assert_eq!(value.expect_type::<English>().unwrap().greet(), "Hello, Bob!");
    }

    #[test]
    fn missing_arguments_are_reported_by_name() {
        let descriptor = english();
        let err = descriptor.constructors()[0]
            .invoke(&Arguments::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("'name'"));
    }

    #[test]
    fn disposable_types_carry_a_disposer() {
        static DISPOSED: AtomicBool = AtomicBool::new(false);

        struct Handle;
        impl Dispose for Handle {
            fn dispose(&self) {
                DISPOSED.store(true, Ordering::SeqCst);
            }
        }

        let descriptor = TypeDescriptor::of::<Handle>()
            .constructor(|c| c.build(|_| Ok(Handle)))
            .disposable()
            .build();
        let object = descriptor.constructors()[0].invoke(&Arguments::default()).unwrap();
        let value = descriptor.seal(object).unwrap();

        value.disposer().unwrap().dispose();
        assert!(DISPOSED.load(Ordering::SeqCst));
    }

    #[test]
    fn enumerable_collectors_build_typed_vectors() {
        struct Sink {
            greeters: Vec<Arc<dyn Greeter>>,
        }
        let descriptor = TypeDescriptor::of::<Sink>()
            .constructor(|c| {
                c.all::<dyn Greeter>("greeters").build(|args| {
                    Ok(Sink {
                        greeters: args.all("greeters")?,
                    })
                })
            })
            .build();

        let param = &descriptor.constructors()[0].parameters()[0];
        assert_eq!(param.kind(), ParameterKind::Enumerable);

        let greeter: Arc<dyn Greeter> = Arc::new(English {
            name: "Cy".to_string(),
            punctuation: None,
        });
        let collected = param.collector().unwrap()(vec![Value::new(greeter)]).unwrap();
        let mut args = Arguments::default();
        args.push("greeters", collected);

        let sink = descriptor.constructors()[0].invoke(&args).unwrap();
        let sink = sink.downcast::<Sink>().ok().unwrap();
        assert_eq!(sink.greeters.len(), 1);
    }
}
