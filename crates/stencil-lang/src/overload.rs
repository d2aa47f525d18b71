//! Selection of the most specific applicable overload for a call.
//!
//! Candidates are partitioned by arity. For each arity a *marshal type* per
//! position (the least upper bound of every candidate's parameter type at
//! that position) rejects hopeless calls before the candidates are tried.
//! Fixed-arity candidates are tried first; variable-arity candidates only
//! when none applies. Among the applicable candidates the maximally
//! specific ones are found by pairwise elimination.

use std::{fmt, sync::RwLock};

use itertools::Itertools;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::{
    error::EvaluationError,
    host::{self, HostClass, HostMethod, HostObject},
    number::{Number, NumberKind},
    value::{Value, ValueType},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl Primitive {
    fn number_kind(self) -> Option<NumberKind> {
        match self {
            Primitive::Boolean => None,
            Primitive::Byte => Some(NumberKind::Byte),
            Primitive::Short => Some(NumberKind::Short),
            Primitive::Int => Some(NumberKind::Int),
            Primitive::Long => Some(NumberKind::Long),
            Primitive::Float => Some(NumberKind::Float),
            Primitive::Double => Some(NumberKind::Double),
        }
    }

    fn widens_to(self, other: Primitive) -> bool {
        match (self.number_kind(), other.number_kind()) {
            (Some(a), Some(b)) => a.widens_to(b),
            (None, None) => true,
            _ => false,
        }
    }

    fn boxed_name(self) -> &'static str {
        match self {
            Primitive::Boolean => "Boolean",
            Primitive::Byte => "Byte",
            Primitive::Short => "Short",
            Primitive::Int => "Integer",
            Primitive::Long => "Long",
            Primitive::Float => "Float",
            Primitive::Double => "Double",
        }
    }
}

/// Declared type of a host method parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    Primitive(Primitive),
    Boxed(Primitive),
    Decimal,
    Number,
    String,
    Date,
    Sequence,
    Hash,
    Callable,
    Host(&'static HostClass),
    Object,
}

impl ParamType {
    fn number_kind(&self) -> Option<NumberKind> {
        match self {
            ParamType::Primitive(p) | ParamType::Boxed(p) => p.number_kind(),
            ParamType::Decimal => Some(NumberKind::Decimal),
            _ => None,
        }
    }

    fn is_numeric(&self) -> bool {
        self.number_kind().is_some() || *self == ParamType::Number
    }

    /// Method invocation conversion from an actual argument's runtime type.
    pub fn accepts(&self, actual: ValueType) -> bool {
        if *self == ParamType::Object {
            return true;
        }

        match actual {
            ValueType::Absent | ValueType::Null => self.accepts_null(),
            ValueType::Boolean => matches!(
                self,
                ParamType::Primitive(Primitive::Boolean) | ParamType::Boxed(Primitive::Boolean)
            ),
            ValueType::Number(kind) => match self {
                ParamType::Number => true,
                _ => self.number_kind().is_some_and(|target| kind.widens_to(target)),
            },
            ValueType::String => *self == ParamType::String,
            ValueType::Date => *self == ParamType::Date,
            ValueType::Range | ValueType::Sequence => *self == ParamType::Sequence,
            ValueType::Hash => *self == ParamType::Hash,
            ValueType::Callable => *self == ParamType::Callable,
            ValueType::Namespace => false,
            ValueType::Host(class) => match self {
                ParamType::Host(target) => class.is_subclass_of(target),
                _ => false,
            },
        }
    }

    /// `self` is at least as specific as `other`: a value of `self` can be
    /// passed where `other` is declared.
    pub fn is_subtype_of(&self, other: &ParamType) -> bool {
        if self == other || *other == ParamType::Object {
            return true;
        }

        match (self, other) {
            (ParamType::Primitive(a), ParamType::Primitive(b)) => a.widens_to(*b),
            (ParamType::Primitive(a), ParamType::Boxed(b)) => a.widens_to(*b),
            (ParamType::Boxed(a), ParamType::Boxed(b)) => a.widens_to(*b),
            (ParamType::Boxed(a), ParamType::Primitive(b)) => a != b && a.widens_to(*b),
            (ParamType::Host(a), ParamType::Host(b)) => a.is_subclass_of(b),
            (a, ParamType::Decimal) => a.number_kind().is_some(),
            (a, ParamType::Number) => a.is_numeric(),
            _ => false,
        }
    }

    /// Least upper bound of two parameter types. The result accepts every
    /// argument either side accepts, `null` included.
    fn join(&self, other: &ParamType) -> ParamType {
        match self.widest(other) {
            ParamType::Primitive(p) if self.accepts_null() || other.accepts_null() => {
                ParamType::Boxed(p)
            }
            joined => joined,
        }
    }

    fn accepts_null(&self) -> bool {
        !matches!(self, ParamType::Primitive(_))
    }

    fn widest(&self, other: &ParamType) -> ParamType {
        if self.is_subtype_of(other) {
            return *other;
        }
        if other.is_subtype_of(self) {
            return *self;
        }

        match (self, other) {
            (a, b) if a.number_kind().is_some() && b.number_kind().is_some() => ParamType::Decimal,
            (a, b) if a.is_numeric() && b.is_numeric() => ParamType::Number,
            (ParamType::Host(a), ParamType::Host(b)) => a
                .ancestors()
                .find(|ancestor| b.is_subclass_of(ancestor))
                .map_or(ParamType::Object, ParamType::Host),
            _ => ParamType::Object,
        }
    }

    /// Converts an accepted argument to the representation the parameter
    /// declares, e.g. an `int` passed to a `double` parameter.
    pub fn coerce(&self, value: Value) -> Value {
        match (self.number_kind(), value) {
            (Some(kind), Value::Number(n)) => Value::Number(convert_number(&n, kind)),
            (_, Value::Absent) => Value::Null,
            (_, value) => value,
        }
    }
}

fn convert_number(n: &Number, kind: NumberKind) -> Number {
    if n.kind() == kind {
        return n.clone();
    }

    match kind {
        NumberKind::Byte => Number::Byte(n.to_i64().unwrap_or_default() as i8),
        NumberKind::Short => Number::Short(n.to_i64().unwrap_or_default() as i16),
        NumberKind::Int => Number::Int(n.to_i64().unwrap_or_default() as i32),
        NumberKind::Long => Number::Long(n.to_i64().unwrap_or_default()),
        NumberKind::Float => Number::Float(n.to_f64() as f32),
        NumberKind::Double => Number::Double(n.to_f64()),
        NumberKind::Decimal => n.to_decimal().map_or_else(|| n.clone(), Number::Decimal),
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Primitive(p) => write!(f, "{}", format!("{:?}", p).to_lowercase()),
            ParamType::Boxed(p) => write!(f, "{}", p.boxed_name()),
            ParamType::Decimal => write!(f, "BigDecimal"),
            ParamType::Number => write!(f, "Number"),
            ParamType::String => write!(f, "String"),
            ParamType::Date => write!(f, "Date"),
            ParamType::Sequence => write!(f, "List"),
            ParamType::Hash => write!(f, "Map"),
            ParamType::Callable => write!(f, "Callable"),
            ParamType::Host(class) => write!(f, "{}", class.name()),
            ParamType::Object => write!(f, "Object"),
        }
    }
}

/// Parameter types of one overload. For a variable-arity signature the last
/// type is the element type of the trailing arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub params: Vec<ParamType>,
    pub varargs: bool,
}

impl Signature {
    pub fn fixed(params: Vec<ParamType>) -> Self {
        Self {
            params,
            varargs: false,
        }
    }

    pub fn varargs(params: Vec<ParamType>) -> Self {
        let varargs = !params.is_empty();
        Self { params, varargs }
    }

    /// Number of parameters that must always be supplied.
    fn required(&self) -> usize {
        if self.varargs {
            self.params.len() - 1
        } else {
            self.params.len()
        }
    }

    fn accepts_arity(&self, arity: usize) -> bool {
        if self.varargs {
            arity >= self.required()
        } else {
            arity == self.params.len()
        }
    }

    /// Declared type of the `i`-th actual argument.
    fn param_at(&self, i: usize) -> ParamType {
        self.params
            .get(i)
            .or_else(|| self.params.last())
            .copied()
            .unwrap_or(ParamType::Object)
    }

    fn is_applicable(&self, args: &[ValueType]) -> bool {
        self.accepts_arity(args.len())
            && args
                .iter()
                .enumerate()
                .all(|(i, actual)| self.param_at(i).accepts(*actual))
    }

    /// Compared over `arity` positions.
    fn is_more_specific_than(&self, other: &Signature, arity: usize) -> bool {
        let width = arity.max(self.params.len()).max(other.params.len());
        (0..width).all(|i| self.param_at(i).is_subtype_of(&other.param_at(i)))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut params = self.params.iter().map(|p| p.to_string()).collect::<Vec<_>>();
        if self.varargs {
            if let Some(last) = params.last_mut() {
                last.push_str("...");
            }
        }
        write!(f, "({})", params.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolveError {
    NoSuchMethod,
    Ambiguous(Vec<usize>),
}

type ArgTypes = SmallVec<[ValueType; 4]>;

#[derive(Debug, Default)]
struct ResolutionCache {
    generation: u64,
    entries: FxHashMap<ArgTypes, Result<usize, ResolveError>>,
}

/// Every overload of one method name.
pub struct OverloadSet {
    name: SmolStr,
    methods: Vec<HostMethod>,
    marshal_types: FxHashMap<usize, Vec<ParamType>>,
    cache: RwLock<ResolutionCache>,
}

impl fmt::Debug for OverloadSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverloadSet")
            .field("name", &self.name)
            .field("methods", &self.methods)
            .finish()
    }
}

impl OverloadSet {
    pub fn new(name: impl Into<SmolStr>, methods: Vec<HostMethod>) -> Self {
        let mut marshal_types: FxHashMap<usize, Vec<ParamType>> = FxHashMap::default();
        for method in methods.iter().filter(|m| !m.signature.varargs) {
            let params = &method.signature.params;
            marshal_types
                .entry(params.len())
                .and_modify(|bounds| {
                    for (bound, param) in bounds.iter_mut().zip(params) {
                        *bound = bound.join(param);
                    }
                })
                .or_insert_with(|| params.clone());
        }

        Self {
            name: name.into(),
            methods,
            marshal_types,
            cache: RwLock::new(ResolutionCache {
                generation: host::generation(),
                entries: FxHashMap::default(),
            }),
        }
    }

    /// A single free function.
    pub fn function(
        name: impl Into<SmolStr>,
        signature: Signature,
        f: impl Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        let method = HostMethod::function(name.clone(), signature, f);
        Self::new(name, vec![method])
    }

    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn methods(&self) -> &[HostMethod] {
        &self.methods
    }

    /// Index of the selected overload for the given argument types.
    pub fn resolve(&self, args: &[ValueType]) -> Result<usize, ResolveError> {
        let key: ArgTypes = args.iter().copied().collect();
        let generation = host::generation();

        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if cache.generation == generation {
                if let Some(result) = cache.entries.get(&key) {
                    return result.clone();
                }
            }
        }

        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        if cache.generation != generation {
            cache.entries.clear();
            cache.generation = generation;
        }
        if let Some(result) = cache.entries.get(&key) {
            return result.clone();
        }

        let result = self.select(args);
        tracing::trace!(
            method = %self.name,
            args = %args.iter().join(", "),
            selected = ?result,
            "overload cache miss"
        );
        cache.entries.insert(key, result.clone());
        result
    }

    fn select(&self, args: &[ValueType]) -> Result<usize, ResolveError> {
        let passes_marshal = self.marshal_types.get(&args.len()).is_some_and(|bounds| {
            bounds
                .iter()
                .zip(args)
                .all(|(bound, actual)| bound.accepts(*actual))
        });

        if passes_marshal {
            let fixed = self.applicable(args, false);
            if !fixed.is_empty() {
                return self.most_specific(fixed, args.len());
            }
        }

        let varargs = self.applicable(args, true);
        if varargs.is_empty() {
            Err(ResolveError::NoSuchMethod)
        } else {
            self.most_specific(varargs, args.len())
        }
    }

    fn applicable(&self, args: &[ValueType], varargs: bool) -> Vec<usize> {
        self.methods
            .iter()
            .enumerate()
            .filter(|(_, m)| m.signature.varargs == varargs && m.signature.is_applicable(args))
            .map(|(i, _)| i)
            .collect()
    }

    fn most_specific(&self, candidates: Vec<usize>, arity: usize) -> Result<usize, ResolveError> {
        let methods = &self.methods;
        let dominates = |a: usize, b: usize| {
            methods[a]
                .signature
                .is_more_specific_than(&methods[b].signature, arity)
        };
        let maximal = candidates
            .iter()
            .copied()
            .filter(|&c| {
                !candidates
                    .iter()
                    .any(|&other| other != c && dominates(other, c) && !dominates(c, other))
            })
            .collect::<Vec<_>>();

        match maximal.as_slice() {
            [single] => Ok(*single),
            _ => Err(ResolveError::Ambiguous(maximal)),
        }
    }

    /// Resolves and calls the selected overload, packing trailing arguments
    /// of a variable-arity overload into a sequence.
    pub fn invoke(
        &self,
        receiver: Option<&dyn HostObject>,
        args: &[Value],
    ) -> Result<Value, EvaluationError> {
        let types = args.iter().map(Value::value_type).collect::<ArgTypes>();
        let index = self.resolve(&types).map_err(|e| self.resolve_error(e, &types))?;
        let method = &self.methods[index];
        let signature = &method.signature;

        let mut marshalled = Vec::with_capacity(signature.params.len());
        for (i, arg) in args.iter().take(signature.required()).enumerate() {
            marshalled.push(signature.param_at(i).coerce(arg.clone()));
        }
        if signature.varargs {
            let element = signature.param_at(signature.required());
            let rest = args
                .iter()
                .skip(signature.required())
                .map(|arg| element.coerce(arg.clone()))
                .collect();
            marshalled.push(Value::sequence(rest));
        }

        method
            .invoke(receiver, &marshalled)
            .map_err(|message| EvaluationError::Invocation {
                name: self.name.clone(),
                message,
            })
    }

    fn resolve_error(&self, error: ResolveError, types: &[ValueType]) -> EvaluationError {
        let args = types.iter().join(", ");
        match error {
            ResolveError::NoSuchMethod => EvaluationError::NoSuchMethod {
                name: self.name.clone(),
                args,
            },
            ResolveError::Ambiguous(candidates) => EvaluationError::AmbiguousMethod {
                name: self.name.clone(),
                args,
                candidates: candidates
                    .into_iter()
                    .map(|i| format!("{}{}", self.name, self.methods[i].signature))
                    .collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn tagged(tag: &'static str, signature: Signature) -> HostMethod {
        HostMethod::function("f", signature, move |_| Ok(Value::from(tag)))
    }

    fn p(primitive: Primitive) -> ParamType {
        ParamType::Primitive(primitive)
    }

    fn b(primitive: Primitive) -> ParamType {
        ParamType::Boxed(primitive)
    }

    #[rstest]
    #[case(p(Primitive::Long), ValueType::Number(NumberKind::Int), true)]
    #[case(p(Primitive::Int), ValueType::Number(NumberKind::Long), false)]
    #[case(p(Primitive::Double), ValueType::Number(NumberKind::Float), true)]
    #[case(p(Primitive::Int), ValueType::Null, false)]
    #[case(b(Primitive::Int), ValueType::Null, true)]
    #[case(ParamType::Decimal, ValueType::Number(NumberKind::Double), true)]
    #[case(p(Primitive::Double), ValueType::Number(NumberKind::Decimal), false)]
    #[case(ParamType::Number, ValueType::Number(NumberKind::Decimal), true)]
    #[case(ParamType::String, ValueType::Number(NumberKind::Int), false)]
    #[case(ParamType::Sequence, ValueType::Range, true)]
    #[case(ParamType::Object, ValueType::Hash, true)]
    fn test_accepts(#[case] param: ParamType, #[case] actual: ValueType, #[case] expected: bool) {
        assert_eq!(param.accepts(actual), expected);
    }

    #[rstest]
    #[case(p(Primitive::Int), p(Primitive::Long), true)]
    #[case(p(Primitive::Long), p(Primitive::Int), false)]
    #[case(p(Primitive::Int), b(Primitive::Int), true)]
    #[case(b(Primitive::Int), p(Primitive::Int), false)]
    #[case(p(Primitive::Double), ParamType::Decimal, true)]
    #[case(ParamType::Decimal, ParamType::Number, true)]
    #[case(ParamType::Number, ParamType::Decimal, false)]
    #[case(ParamType::String, ParamType::Object, true)]
    fn test_is_subtype_of(#[case] a: ParamType, #[case] b: ParamType, #[case] expected: bool) {
        assert_eq!(a.is_subtype_of(&b), expected);
    }

    #[test]
    fn test_selects_most_specific() {
        let set = OverloadSet::new(
            "f",
            vec![
                tagged("long", Signature::fixed(vec![p(Primitive::Long)])),
                tagged("int", Signature::fixed(vec![p(Primitive::Int)])),
                tagged("object", Signature::fixed(vec![ParamType::Object])),
            ],
        );

        assert_eq!(set.invoke(None, &[Value::from(1)]), Ok(Value::from("int")));
        assert_eq!(set.invoke(None, &[Value::from(1i64)]), Ok(Value::from("long")));
        assert_eq!(set.invoke(None, &[Value::from("x")]), Ok(Value::from("object")));
    }

    #[test]
    fn test_ambiguous() {
        let set = OverloadSet::new(
            "f",
            vec![
                tagged("a", Signature::fixed(vec![p(Primitive::Int), p(Primitive::Long)])),
                tagged("b", Signature::fixed(vec![p(Primitive::Long), p(Primitive::Int)])),
            ],
        );

        let result = set.invoke(None, &[Value::from(1), Value::from(2)]);
        assert!(matches!(
            result,
            Err(EvaluationError::AmbiguousMethod { ref candidates, .. }) if candidates.len() == 2
        ));
    }

    #[test]
    fn test_no_such_method() {
        let set = OverloadSet::new(
            "f",
            vec![tagged("int", Signature::fixed(vec![p(Primitive::Int)]))],
        );

        assert!(matches!(
            set.invoke(None, &[Value::from("x")]),
            Err(EvaluationError::NoSuchMethod { .. })
        ));
        assert!(matches!(
            set.invoke(None, &[]),
            Err(EvaluationError::NoSuchMethod { .. })
        ));
    }

    #[test]
    fn test_fixed_arity_preferred_over_varargs() {
        let set = OverloadSet::new(
            "f",
            vec![
                tagged("varargs", Signature::varargs(vec![ParamType::Object])),
                tagged("fixed", Signature::fixed(vec![ParamType::Object])),
            ],
        );

        assert_eq!(set.invoke(None, &[Value::from(1)]), Ok(Value::from("fixed")));
        assert_eq!(set.invoke(None, &[]), Ok(Value::from("varargs")));
        assert_eq!(
            set.invoke(None, &[Value::from(1), Value::from(2)]),
            Ok(Value::from("varargs"))
        );
    }

    #[test]
    fn test_varargs_are_packed() {
        let set = OverloadSet::function(
            "sum",
            Signature::varargs(vec![ParamType::String, p(Primitive::Long)]),
            |args| {
                let Value::Sequence(rest) = &args[1] else {
                    return Err("expected packed arguments".to_string());
                };
                Ok(Value::from(format!("{}:{}", args[0].as_str().unwrap_or_default(), rest.len())))
            },
        );

        assert_eq!(
            set.invoke(None, &[Value::from("n"), Value::from(1), Value::from(2)]),
            Ok(Value::from("n:2"))
        );
    }

    #[test]
    fn test_arguments_are_widened() {
        let set = OverloadSet::function(
            "kind",
            Signature::fixed(vec![p(Primitive::Double)]),
            |args| Ok(Value::from(args[0].type_name())),
        );
        let result = set.invoke(None, &[Value::from(3)]);
        assert_eq!(result, Ok(Value::from("number")));

        let set = OverloadSet::function(
            "echo",
            Signature::fixed(vec![p(Primitive::Double)]),
            |args| Ok(args[0].clone()),
        );
        assert_eq!(
            set.invoke(None, &[Value::from(3)]),
            Ok(Value::Number(Number::Double(3.0)))
        );
    }

    #[test]
    fn test_unrelated_overload_keeps_selection() {
        let base = vec![
            tagged("int", Signature::fixed(vec![p(Primitive::Int)])),
            tagged("string", Signature::fixed(vec![ParamType::String])),
        ];
        let before = OverloadSet::new("f", base.clone());
        let mut extended = base;
        extended.push(tagged("hash", Signature::fixed(vec![ParamType::Hash])));
        let after = OverloadSet::new("f", extended);

        for arg in [Value::from(1), Value::from("s")] {
            assert_eq!(before.invoke(None, &[arg.clone()]), after.invoke(None, &[arg]));
        }
    }

    #[test]
    fn test_resolution_is_cached() {
        let set = OverloadSet::new(
            "f",
            vec![tagged("int", Signature::fixed(vec![p(Primitive::Int)]))],
        );
        let types = [ValueType::Number(NumberKind::Int)];
        assert_eq!(set.resolve(&types), Ok(0));
        assert_eq!(set.resolve(&types), Ok(0));
        assert_eq!(set.cache.read().unwrap().entries.len(), 1);
    }

    #[test]
    fn test_marshal_join() {
        assert_eq!(p(Primitive::Int).join(&p(Primitive::Long)), p(Primitive::Long));
        assert_eq!(p(Primitive::Int).join(&ParamType::String), ParamType::Object);
        assert_eq!(b(Primitive::Int).join(&b(Primitive::Boolean)), ParamType::Object);
        assert_eq!(b(Primitive::Int).join(&p(Primitive::Long)), b(Primitive::Long));
        assert_eq!(p(Primitive::Long).join(&b(Primitive::Int)), b(Primitive::Long));
    }

    #[rstest]
    #[case::boxed_only(vec![b(Primitive::Int)])]
    #[case::boxed_and_wider_primitive(vec![b(Primitive::Int), p(Primitive::Long)])]
    #[case::wider_primitive_first(vec![p(Primitive::Long), b(Primitive::Int)])]
    fn test_null_reaches_boxed_overload(#[case] params: Vec<ParamType>) {
        let set = OverloadSet::new(
            "f",
            params
                .into_iter()
                .map(|param| {
                    let tag = if param == b(Primitive::Int) { "boxed-int" } else { "long" };
                    tagged(tag, Signature::fixed(vec![param]))
                })
                .collect(),
        );

        assert_eq!(set.invoke(None, &[Value::Null]), Ok(Value::from("boxed-int")));
    }
}
