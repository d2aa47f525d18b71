//! Bridge between template code and host values.
//!
//! A host type opts in by implementing [`HostObject`] and describing itself
//! with a static [`HostClass`]: its readable properties and its (possibly
//! overloaded) methods. Member lookups are cached per `(host type, name)`
//! for the lifetime of the process, or until [`invalidate_caches`] is called.

use std::{
    any::{Any, TypeId},
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
    sync::{
        Arc, LazyLock, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::{
    Shared,
    overload::{OverloadSet, Signature},
    value::Value,
};

/// Native implementation of a host method. The receiver is `None` for
/// free functions.
pub type HostFn =
    Arc<dyn Fn(Option<&dyn HostObject>, &[Value]) -> Result<Value, String> + Send + Sync>;

type Getter = Arc<dyn Fn(&dyn HostObject) -> Result<Value, String> + Send + Sync>;

pub trait HostObject: Any + Send + Sync {
    fn class(&self) -> &'static HostClass;

    fn as_any(&self) -> &dyn Any;

    /// View of `self` as the Rust type registered for `type_id`. Types that
    /// extend a parent class return the embedded parent value here.
    fn as_type(&self, type_id: TypeId) -> Option<&dyn Any> {
        let any = self.as_any();
        (any.type_id() == type_id).then_some(any)
    }

    /// Identity by default.
    fn host_eq(&self, other: &dyn HostObject) -> bool {
        std::ptr::addr_eq(self as *const Self, other as *const dyn HostObject)
    }

    /// Text used when the object is interpolated, if it has one.
    fn display(&self) -> Option<String> {
        None
    }
}

#[derive(Clone)]
pub struct Property {
    pub name: SmolStr,
    getter: Getter,
}

impl Property {
    pub fn get(&self, receiver: &dyn HostObject) -> Result<Value, String> {
        (self.getter)(receiver)
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Property({})", self.name)
    }
}

#[derive(Clone)]
pub struct HostMethod {
    pub name: SmolStr,
    pub signature: Signature,
    invoke: HostFn,
}

impl HostMethod {
    pub fn new(
        name: impl Into<SmolStr>,
        signature: Signature,
        invoke: impl Fn(Option<&dyn HostObject>, &[Value]) -> Result<Value, String>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            signature,
            invoke: Arc::new(invoke),
        }
    }

    /// A free function: the receiver is ignored.
    pub fn function(
        name: impl Into<SmolStr>,
        signature: Signature,
        f: impl Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        Self::new(name, signature, move |_, args| f(args))
    }

    pub fn invoke(&self, receiver: Option<&dyn HostObject>, args: &[Value]) -> Result<Value, String> {
        (self.invoke)(receiver, args)
    }
}

impl fmt::Debug for HostMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.signature)
    }
}

/// Static description of a host type.
pub struct HostClass {
    name: &'static str,
    type_id: TypeId,
    parent: Option<&'static HostClass>,
    properties: Vec<Property>,
    methods: Vec<HostMethod>,
}

impl HostClass {
    pub fn builder<T: HostObject>(name: &'static str) -> HostClassBuilder<T> {
        HostClassBuilder {
            class: HostClass {
                name,
                type_id: TypeId::of::<T>(),
                parent: None,
                properties: Vec::new(),
                methods: Vec::new(),
            },
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parent(&self) -> Option<&'static HostClass> {
        self.parent
    }

    /// `self` or one of its ancestors is `other`.
    pub fn is_subclass_of(&self, other: &HostClass) -> bool {
        if self == other {
            return true;
        }
        self.parent.is_some_and(|parent| parent.is_subclass_of(other))
    }

    /// Class chain from `self` up to the root.
    pub fn ancestors(&'static self) -> impl Iterator<Item = &'static HostClass> {
        std::iter::successors(Some(self), |class| class.parent)
    }
}

impl PartialEq for HostClass {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for HostClass {}

impl Hash for HostClass {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for HostClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostClass")
            .field("name", &self.name)
            .field("parent", &self.parent.map(|p| p.name))
            .field("properties", &self.properties)
            .field("methods", &self.methods)
            .finish()
    }
}

/// Typed builder for a [`HostClass`]; getters and methods receive `&T`.
pub struct HostClassBuilder<T> {
    class: HostClass,
    _marker: PhantomData<fn() -> T>,
}

impl<T: HostObject> HostClassBuilder<T> {
    pub fn parent(mut self, parent: &'static HostClass) -> Self {
        self.class.parent = Some(parent);
        self
    }

    pub fn property(
        mut self,
        name: &str,
        getter: impl Fn(&T) -> Value + Send + Sync + 'static,
    ) -> Self {
        let property_name = SmolStr::new(name);
        let getter: Getter = Arc::new(move |receiver: &dyn HostObject| {
            downcast::<T>(receiver).map(&getter)
        });
        self.class.properties.push(Property {
            name: property_name,
            getter,
        });
        self
    }

    pub fn method(
        mut self,
        name: &str,
        signature: Signature,
        f: impl Fn(&T, &[Value]) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        self.class.methods.push(HostMethod::new(
            name,
            signature,
            move |receiver: Option<&dyn HostObject>, args: &[Value]| {
                let receiver = receiver.ok_or_else(|| "method called without a receiver".to_string())?;
                f(downcast::<T>(receiver)?, args)
            },
        ));
        self
    }

    pub fn build(self) -> HostClass {
        self.class
    }
}

fn downcast<T: HostObject>(receiver: &dyn HostObject) -> Result<&T, String> {
    receiver
        .as_type(TypeId::of::<T>())
        .and_then(|any| any.downcast_ref::<T>())
        .ok_or_else(|| {
            format!(
                "receiver of type {} is not a {}",
                receiver.class().name,
                std::any::type_name::<T>()
            )
        })
}

/// Result of a member lookup on a host class.
#[derive(Debug, Clone)]
pub enum Member {
    Property(Property),
    Methods(Shared<OverloadSet>),
    Missing,
}

static GENERATION: AtomicU64 = AtomicU64::new(0);

static MEMBER_CACHE: LazyLock<RwLock<FxHashMap<(TypeId, SmolStr), Member>>> =
    LazyLock::new(|| RwLock::new(FxHashMap::default()));

/// Current registry generation; overload caches compare against it.
pub fn generation() -> u64 {
    GENERATION.load(Ordering::Acquire)
}

/// Drops every cached member lookup and overload resolution.
pub fn invalidate_caches() {
    let mut cache = MEMBER_CACHE.write().unwrap_or_else(|e| e.into_inner());
    cache.clear();
    GENERATION.fetch_add(1, Ordering::AcqRel);
    tracing::debug!("host member caches invalidated");
}

/// Properties win over methods. Methods are collected along the parent
/// chain; a method re-declared with an identical signature in a subclass
/// hides the inherited one.
pub fn lookup_member(class: &'static HostClass, name: &str) -> Member {
    let key = (class.type_id, SmolStr::new(name));

    if let Some(member) = MEMBER_CACHE
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .get(&key)
    {
        return member.clone();
    }

    let mut cache = MEMBER_CACHE.write().unwrap_or_else(|e| e.into_inner());
    if let Some(member) = cache.get(&key) {
        return member.clone();
    }

    let member = introspect(class, name);
    tracing::trace!(class = class.name, member = name, "populating member cache");
    cache.insert(key, member.clone());
    member
}

fn introspect(class: &'static HostClass, name: &str) -> Member {
    if let Some(property) = class
        .ancestors()
        .flat_map(|c| c.properties.iter())
        .find(|p| p.name == name)
    {
        return Member::Property(property.clone());
    }

    let mut methods: Vec<HostMethod> = Vec::new();
    for method in class
        .ancestors()
        .flat_map(|c| c.methods.iter())
        .filter(|m| m.name == name)
    {
        if !methods.iter().any(|m| m.signature == method.signature) {
            methods.push(method.clone());
        }
    }

    if methods.is_empty() {
        Member::Missing
    } else {
        Member::Methods(Shared::new(OverloadSet::new(name, methods)))
    }
}
