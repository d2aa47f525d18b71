use std::{cmp::Ordering, fmt};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::{
    Shared,
    ast::{Expr, MacroDef, ParameterList},
    eval::env::NamespaceId,
    host::{HostClass, HostObject},
    ident::Ident,
    number::{Number, NumberKind, compare_numbers},
    overload::OverloadSet,
};

/// Precision of a date value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateKind {
    Date,
    Time,
    DateTime,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DateValue {
    pub kind: DateKind,
    pub value: NaiveDateTime,
}

impl DateValue {
    pub fn date(date: NaiveDate) -> Self {
        Self {
            kind: DateKind::Date,
            value: date.and_time(NaiveTime::MIN),
        }
    }

    pub fn time(time: NaiveTime) -> Self {
        Self {
            kind: DateKind::Time,
            value: NaiveDate::default().and_time(time),
        }
    }

    pub fn datetime(value: NaiveDateTime) -> Self {
        Self {
            kind: DateKind::DateTime,
            value,
        }
    }

    /// Dates only compare against dates of the same, known kind.
    pub fn compare(&self, other: &DateValue) -> Option<Ordering> {
        if self.kind == DateKind::Unknown || self.kind != other.kind {
            return None;
        }

        Some(match self.kind {
            DateKind::Date => self.value.date().cmp(&other.value.date()),
            DateKind::Time => self.value.time().cmp(&other.value.time()),
            _ => self.value.cmp(&other.value),
        })
    }
}

/// Where a range stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeEnd {
    /// `start..`: no upper bound. Clamps to the end when used as an index.
    Unbounded,
    /// `start..end`
    Inclusive(i64),
    /// `start..<end`
    Exclusive(i64),
    /// `start..*len`: at most `len` items. Clamps when used as an index.
    Length(i64),
}

/// An integer range. Ranges whose end lies below the start count downwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RangeValue {
    pub start: i64,
    pub end: RangeEnd,
}

impl RangeValue {
    pub fn new(start: i64, end: RangeEnd) -> Self {
        Self { start, end }
    }

    pub fn is_descending(&self) -> bool {
        match self.end {
            RangeEnd::Unbounded => false,
            RangeEnd::Inclusive(end) | RangeEnd::Exclusive(end) => end < self.start,
            RangeEnd::Length(len) => len < 0,
        }
    }

    /// Whether an index range may be cut short at the end of the indexed value.
    pub fn clamps(&self) -> bool {
        matches!(self.end, RangeEnd::Unbounded | RangeEnd::Length(_))
    }

    /// Number of items, `None` when unbounded or too large to count.
    pub fn size(&self) -> Option<usize> {
        let size = match self.end {
            RangeEnd::Unbounded => return None,
            RangeEnd::Inclusive(end) => self.start.abs_diff(end).checked_add(1)?,
            RangeEnd::Exclusive(end) => self.start.abs_diff(end),
            RangeEnd::Length(len) => len.unsigned_abs(),
        };
        usize::try_from(size).ok()
    }

    pub fn get(&self, index: usize) -> Option<i64> {
        if self.size().is_some_and(|size| index >= size) {
            return None;
        }
        if self.is_descending() {
            self.start.checked_sub_unsigned(index as u64)
        } else {
            self.start.checked_add_unsigned(index as u64)
        }
    }

    /// Last item, `None` for unbounded or empty ranges.
    pub fn last(&self) -> Option<i64> {
        self.size()
            .and_then(|size| size.checked_sub(1))
            .and_then(|i| self.get(i))
    }

    /// Items in order. Stops at the bounds of `i64` even when the size
    /// does not fit in a `usize`.
    pub fn iter(&self) -> impl Iterator<Item = i64> + use<> {
        let descending = self.is_descending();
        let start = self.start;
        let limit = match self.end {
            RangeEnd::Unbounded => None,
            _ => self.size(),
        };
        (0usize..)
            .take_while(move |i| limit.is_none_or(|size| *i < size))
            .map_while(move |i| {
                if descending {
                    start.checked_sub_unsigned(i as u64)
                } else {
                    start.checked_add_unsigned(i as u64)
                }
            })
    }
}

/// String-keyed map that keeps insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hash {
    entries: Vec<(SmolStr, Value)>,
    index: FxHashMap<SmolStr, usize>,
}

impl Hash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<SmolStr>, value: Value) {
        let key = key.into();
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &SmolStr> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SmolStr, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Keys of `other` win; new keys are appended in `other`'s order.
    pub fn merge(&self, other: &Hash) -> Hash {
        let mut merged = self.clone();
        for (k, v) in other.iter() {
            merged.insert(k.clone(), v.clone());
        }
        merged
    }
}

impl<K: Into<SmolStr>> FromIterator<(K, Value)> for Hash {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut hash = Hash::new();
        for (k, v) in iter {
            hash.insert(k, v);
        }
        hash
    }
}

/// A macro or function definition together with the namespace it was defined in.
#[derive(Debug, Clone)]
pub struct MacroRef {
    pub def: Shared<MacroDef>,
    pub namespace: NamespaceId,
}

/// A host method group, optionally bound to a receiver.
pub struct BoundMethod {
    pub receiver: Option<Shared<dyn HostObject>>,
    pub overloads: Shared<OverloadSet>,
}

impl fmt::Debug for BoundMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundMethod")
            .field("name", &self.overloads.name())
            .field("bound", &self.receiver.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum Curried {
    /// A macro whose supplied arguments were turned into constant defaults.
    Macro { base: MacroRef, params: Shared<ParameterList> },
    /// A host method with leading positional arguments fixed.
    Method {
        base: Shared<BoundMethod>,
        prefix: Vec<Value>,
    },
}

#[derive(Debug, Clone)]
pub struct Lambda {
    pub param: Ident,
    pub body: Shared<Expr>,
}

#[derive(Debug, Clone)]
pub enum Callable {
    Macro(MacroRef),
    Method(Shared<BoundMethod>),
    Curried(Shared<Curried>),
    Lambda(Shared<Lambda>),
}

impl Callable {
    pub fn name(&self) -> SmolStr {
        match self {
            Callable::Macro(m) => m.def.name.as_str(),
            Callable::Method(m) => m.overloads.name().clone(),
            Callable::Curried(c) => match c.as_ref() {
                Curried::Macro { base, .. } => base.def.name.as_str(),
                Curried::Method { base, .. } => base.overloads.name().clone(),
            },
            Callable::Lambda(l) => SmolStr::new(format!("{} -> ...", l.param)),
        }
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Callable::Macro(a), Callable::Macro(b)) => {
                Shared::ptr_eq(&a.def, &b.def) && a.namespace == b.namespace
            }
            (Callable::Method(a), Callable::Method(b)) => Shared::ptr_eq(a, b),
            (Callable::Curried(a), Callable::Curried(b)) => Shared::ptr_eq(a, b),
            (Callable::Lambda(a), Callable::Lambda(b)) => Shared::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Runtime type tag of a [`Value`], used to key overload caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Absent,
    Null,
    Boolean,
    Number(NumberKind),
    String,
    Date,
    Range,
    Sequence,
    Hash,
    Callable,
    Namespace,
    Host(&'static HostClass),
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Absent => write!(f, "missing"),
            ValueType::Null => write!(f, "null"),
            ValueType::Boolean => write!(f, "boolean"),
            ValueType::Number(kind) => write!(f, "{}", kind),
            ValueType::String => write!(f, "string"),
            ValueType::Date => write!(f, "date"),
            ValueType::Range => write!(f, "range"),
            ValueType::Sequence => write!(f, "sequence"),
            ValueType::Hash => write!(f, "hash"),
            ValueType::Callable => write!(f, "callable"),
            ValueType::Namespace => write!(f, "namespace"),
            ValueType::Host(class) => write!(f, "{}", class.name()),
        }
    }
}

#[derive(Clone, Default)]
pub enum Value {
    /// An unbound name or a missing member.
    #[default]
    Absent,
    Null,
    Boolean(bool),
    Number(Number),
    String(SmolStr),
    Date(DateValue),
    Range(RangeValue),
    Sequence(Shared<Vec<Value>>),
    Hash(Shared<Hash>),
    Callable(Callable),
    Namespace(NamespaceId),
    Host(Shared<dyn HostObject>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Absent, Value::Absent) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => compare_numbers(a, b) == Ordering::Equal,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::Sequence(a), Value::Sequence(b)) => a == b,
            (Value::Hash(a), Value::Hash(b)) => a == b,
            (Value::Callable(a), Value::Callable(b)) => a == b,
            (Value::Namespace(a), Value::Namespace(b)) => a == b,
            (Value::Host(a), Value::Host(b)) => a.host_eq(b.as_ref()),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Absent => write!(f, "Absent"),
            Value::Null => write!(f, "Null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{:?}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Date(d) => write!(f, "{:?}", d),
            Value::Range(r) => write!(f, "{:?}", r),
            Value::Sequence(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Hash(hash) => f.debug_map().entries(hash.iter()).finish(),
            Value::Callable(c) => write!(f, "Callable({})", c.name()),
            Value::Namespace(id) => write!(f, "Namespace({:?})", id),
            Value::Host(obj) => write!(f, "Host({})", obj.class().name()),
        }
    }
}

impl Value {
    pub const TRUE: Value = Value::Boolean(true);
    pub const FALSE: Value = Value::Boolean(false);

    pub fn sequence(items: Vec<Value>) -> Value {
        Value::Sequence(Shared::new(items))
    }

    pub fn hash<K: Into<SmolStr>>(entries: impl IntoIterator<Item = (K, Value)>) -> Value {
        Value::Hash(Shared::new(entries.into_iter().collect()))
    }

    pub fn host(object: impl HostObject) -> Value {
        Value::Host(Shared::new(object))
    }

    /// A receiver-less host function.
    pub fn function(overloads: OverloadSet) -> Value {
        Value::Callable(Callable::Method(Shared::new(BoundMethod {
            receiver: None,
            overloads: Shared::new(overloads),
        })))
    }

    #[inline(always)]
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// Absent and null both count as "missing" to the existence operators.
    #[inline(always)]
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Absent | Value::Null)
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Absent => ValueType::Absent,
            Value::Null => ValueType::Null,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Number(n) => ValueType::Number(n.kind()),
            Value::String(_) => ValueType::String,
            Value::Date(_) => ValueType::Date,
            Value::Range(_) => ValueType::Range,
            Value::Sequence(_) => ValueType::Sequence,
            Value::Hash(_) => ValueType::Hash,
            Value::Callable(_) => ValueType::Callable,
            Value::Namespace(_) => ValueType::Namespace,
            Value::Host(obj) => ValueType::Host(obj.class()),
        }
    }

    #[inline(always)]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Absent => "missing",
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Range(_) => "range",
            Value::Sequence(_) => "sequence",
            Value::Hash(_) => "hash",
            Value::Callable(_) => "callable",
            Value::Namespace(_) => "namespace",
            Value::Host(obj) => obj.class().name(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&Number> {
        match self {
            Value::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Length of a sequence-like value: sequences, bounded ranges and hashes.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Sequence(items) => Some(items.len()),
            Value::Range(range) => range.size(),
            Value::Hash(hash) => Some(hash.len()),
            Value::String(s) => Some(s.chars().count()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Items of a sequence or a bounded range.
    pub fn to_items(&self) -> Option<Vec<Value>> {
        match self {
            Value::Sequence(items) => Some(items.as_ref().clone()),
            Value::Range(range) => range
                .size()
                .map(|_| range.iter().map(|n| Value::Number(Number::Long(n))).collect()),
            _ => None,
        }
    }
}

macro_rules! value_from_number {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(Number::from(n))
                }
            }
        )*
    };
}

value_from_number!(i8, i16, i32, i64, f32, f64, usize);

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(SmolStr::new(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(SmolStr::from(s))
    }
}

impl From<SmolStr> for Value {
    fn from(s: SmolStr) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::sequence(items)
    }
}

impl From<Hash> for Value {
    fn from(hash: Hash) -> Self {
        Value::Hash(Shared::new(hash))
    }
}

impl From<DateValue> for Value {
    fn from(date: DateValue) -> Self {
        Value::Date(date)
    }
}

impl From<RangeValue> for Value {
    fn from(range: RangeValue) -> Self {
        Value::Range(range)
    }
}

impl From<Callable> for Value {
    fn from(callable: Callable) -> Self {
        Value::Callable(callable)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => Number::parse(&n.to_string())
                .map(Value::Number)
                .unwrap_or_else(|| n.as_f64().map_or(Value::Null, Value::from)),
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => {
                Value::sequence(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::hash(map.into_iter().map(|(k, v)| (k, Value::from(v))))
            }
        }
    }
}
