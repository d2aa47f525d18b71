use std::{fmt, sync::LazyLock};

use bigdecimal::RoundingMode;
use itertools::Itertools;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use thiserror::Error;

use crate::{
    Shared,
    ast::{ArgsList, Expr},
    error::{EvaluationError, RuntimeError},
    format,
    number::Number,
    range::Range,
    value::{Callable, Curried, RangeEnd, Value},
};

use super::{
    env::Environment,
    params::{self, ArgValues},
};

type FunctionName = SmolStr;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown built-in \"?{0}\"")]
    NotDefined(FunctionName),
    #[error("?{0} expects {1} arguments, but {2} were given")]
    InvalidNumberOfArguments(FunctionName, ParamNum, usize),
    #[error("?{0} cannot be applied to {1}")]
    InvalidTarget(FunctionName, &'static str),
    #[error("Invalid arguments for ?{0}: {1}")]
    InvalidArguments(FunctionName, String),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl Error {
    fn into_runtime(self, range: Range) -> RuntimeError {
        match self {
            Error::Runtime(e) => e,
            e => RuntimeError::Evaluation(range, EvaluationError::Unsupported(e.to_string())),
        }
    }
}

type Builtin = fn(&mut Environment<'_>, &str, &Value, &[Value]) -> Result<Value, Error>;

#[derive(Clone, Debug)]
pub struct BuiltinFunction {
    pub num_params: ParamNum,
    pub func: Builtin,
}

#[derive(Clone, Copy, Debug)]
pub enum ParamNum {
    None,
    Fixed(u8),
    Range(u8, u8),
}

impl ParamNum {
    #[inline(always)]
    pub fn is_valid(&self, num_args: usize) -> bool {
        match self {
            ParamNum::None => num_args == 0,
            ParamNum::Fixed(n) => num_args == *n as usize,
            ParamNum::Range(min, max) => num_args >= *min as usize && num_args <= *max as usize,
        }
    }
}

impl fmt::Display for ParamNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamNum::None => write!(f, "0"),
            ParamNum::Fixed(n) => write!(f, "{n}"),
            ParamNum::Range(min, u8::MAX) => write!(f, "at least {min}"),
            ParamNum::Range(min, max) => write!(f, "{min} to {max}"),
        }
    }
}

impl BuiltinFunction {
    pub fn new(num_params: ParamNum, func: Builtin) -> Self {
        BuiltinFunction { num_params, func }
    }
}

fn text_op(name: &str, value: &Value, f: impl FnOnce(&str) -> String) -> Result<Value, Error> {
    match value {
        Value::String(s) => Ok(Value::from(f(s))),
        other => Err(Error::InvalidTarget(SmolStr::new(name), other.type_name())),
    }
}

fn number_op(name: &str, value: &Value, f: impl FnOnce(&Number) -> Number) -> Result<Value, Error> {
    match value {
        Value::Number(n) => Ok(Value::Number(f(n))),
        other => Err(Error::InvalidTarget(SmolStr::new(name), other.type_name())),
    }
}

fn items(name: &str, value: &Value) -> Result<Vec<Value>, Error> {
    value
        .to_items()
        .ok_or_else(|| Error::InvalidTarget(SmolStr::new(name), value.type_name()))
}

fn callable_arg<'a>(name: &str, args: &'a [Value]) -> Result<&'a Callable, Error> {
    match args {
        [Value::Callable(callable)] => Ok(callable),
        [other] => Err(Error::InvalidArguments(
            SmolStr::new(name),
            format!("expected a lambda or function, but got {}", other.type_name()),
        )),
        _ => unreachable!(),
    }
}

/// Text of a scalar under the current settings.
fn scalar_text(env: &Environment<'_>, name: &str, value: &Value) -> Result<String, Error> {
    match value {
        Value::String(s) => Ok(s.to_string()),
        Value::Number(n) => Ok(env.formatter.number(n)),
        Value::Boolean(b) => Ok(env.formatter.boolean(*b).to_string()),
        Value::Date(date) => env
            .formatter
            .date(date)
            .map_err(|e| Error::InvalidArguments(SmolStr::new(name), e)),
        Value::Host(object) => object
            .display()
            .ok_or_else(|| Error::InvalidTarget(SmolStr::new(name), value.type_name())),
        other => Err(Error::InvalidTarget(SmolStr::new(name), other.type_name())),
    }
}

fn has_content(value: &Value) -> bool {
    match value {
        Value::Absent | Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Sequence(_) | Value::Hash(_) | Value::Range(_) => !value.is_empty(),
        _ => true,
    }
}

fn cap_first(s: &str) -> String {
    let start = s.len() - s.trim_start().len();
    let (head, rest) = s.split_at(start);
    let mut chars = rest.chars();
    match chars.next() {
        Some(first) => format!("{head}{}{}", first.to_uppercase(), chars.as_str()),
        None => s.to_string(),
    }
}

fn curry(env: &Environment<'_>, name: &str, callable: &Callable, args: &[Value]) -> Result<Value, Error> {
    let curried = match callable {
        Callable::Macro(base) => {
            let params = params::curry(&base.def.name.as_str(), &base.def.params, ArgValues::from(args.to_vec()), env.location)?;
            Curried::Macro {
                base: base.clone(),
                params: Shared::new(params),
            }
        }
        Callable::Method(base) => Curried::Method {
            base: Shared::clone(base),
            prefix: args.to_vec(),
        },
        Callable::Curried(curried) => match curried.as_ref() {
            Curried::Macro { base, params } => {
                let params = params::curry(&base.def.name.as_str(), params, ArgValues::from(args.to_vec()), env.location)?;
                Curried::Macro {
                    base: base.clone(),
                    params: Shared::new(params),
                }
            }
            Curried::Method { base, prefix } => Curried::Method {
                base: Shared::clone(base),
                prefix: prefix.iter().chain(args).cloned().collect(),
            },
        },
        Callable::Lambda(_) => {
            return Err(Error::InvalidTarget(SmolStr::new(name), "lambda"));
        }
    };
    Ok(Value::Callable(Callable::Curried(Shared::new(curried))))
}

pub static BUILTIN_FUNCTIONS: LazyLock<FxHashMap<SmolStr, BuiltinFunction>> =
    LazyLock::new(|| {
        let mut map = FxHashMap::default();

        map.insert(
            SmolStr::new("size"),
            BuiltinFunction::new(ParamNum::None, |_, name, value, _| match value {
                Value::Sequence(_) | Value::Hash(_) => Ok(Value::from(value.len().unwrap_or_default())),
                Value::Range(range) => range.size().map(Value::from).ok_or_else(|| {
                    let reason = if range.end == RangeEnd::Unbounded {
                        "unbounded range"
                    } else {
                        "range too large"
                    };
                    Error::InvalidTarget(SmolStr::new(name), reason)
                }),
                other => Err(Error::InvalidTarget(SmolStr::new(name), other.type_name())),
            }),
        );
        map.insert(
            SmolStr::new("length"),
            BuiltinFunction::new(ParamNum::None, |_, name, value, _| match value {
                Value::String(s) => Ok(Value::from(s.chars().count())),
                other => Err(Error::InvalidTarget(SmolStr::new(name), other.type_name())),
            }),
        );
        map.insert(
            SmolStr::new("upper_case"),
            BuiltinFunction::new(ParamNum::None, |_, name, value, _| {
                text_op(name, value, str::to_uppercase)
            }),
        );
        map.insert(
            SmolStr::new("lower_case"),
            BuiltinFunction::new(ParamNum::None, |_, name, value, _| {
                text_op(name, value, str::to_lowercase)
            }),
        );
        map.insert(
            SmolStr::new("cap_first"),
            BuiltinFunction::new(ParamNum::None, |_, name, value, _| text_op(name, value, cap_first)),
        );
        map.insert(
            SmolStr::new("trim"),
            BuiltinFunction::new(ParamNum::None, |_, name, value, _| {
                text_op(name, value, |s| s.trim().to_string())
            }),
        );
        map.insert(
            SmolStr::new("string"),
            BuiltinFunction::new(ParamNum::Range(0, 2), |env, name, value, args| {
                match (value, args) {
                    (_, []) => scalar_text(env, name, value).map(Value::from),
                    (Value::Boolean(b), [Value::String(t), Value::String(f)]) => {
                        Ok(Value::String(if *b { t.clone() } else { f.clone() }))
                    }
                    (Value::Number(n), [Value::String(pattern)]) => env
                        .formatter
                        .number_with(n, pattern)
                        .map(Value::from)
                        .map_err(|e| Error::InvalidArguments(SmolStr::new(name), e)),
                    (Value::Date(date), [Value::String(pattern)]) => format::format_date(date, pattern)
                        .map(Value::from)
                        .map_err(|e| Error::InvalidArguments(SmolStr::new(name), e)),
                    (other, args) => Err(Error::InvalidArguments(
                        SmolStr::new(name),
                        format!(
                            "{} with ({})",
                            other.type_name(),
                            args.iter().map(Value::type_name).join(", ")
                        ),
                    )),
                }
            }),
        );
        map.insert(
            SmolStr::new("c"),
            BuiltinFunction::new(ParamNum::None, |_, name, value, _| match value {
                Value::Number(n) => Ok(Value::from(n.to_string())),
                Value::Boolean(b) => Ok(Value::from(if *b { "true" } else { "false" })),
                Value::String(_) => Ok(value.clone()),
                other => Err(Error::InvalidTarget(SmolStr::new(name), other.type_name())),
            }),
        );
        map.insert(
            SmolStr::new("has_content"),
            BuiltinFunction::new(ParamNum::None, |_, _, value, _| {
                Ok(Value::Boolean(has_content(value)))
            }),
        );
        map.insert(
            SmolStr::new("is_string"),
            BuiltinFunction::new(ParamNum::None, |_, _, value, _| {
                Ok(Value::Boolean(matches!(value, Value::String(_))))
            }),
        );
        map.insert(
            SmolStr::new("is_number"),
            BuiltinFunction::new(ParamNum::None, |_, _, value, _| {
                Ok(Value::Boolean(matches!(value, Value::Number(_))))
            }),
        );
        map.insert(
            SmolStr::new("is_boolean"),
            BuiltinFunction::new(ParamNum::None, |_, _, value, _| {
                Ok(Value::Boolean(matches!(value, Value::Boolean(_))))
            }),
        );
        map.insert(
            SmolStr::new("is_sequence"),
            BuiltinFunction::new(ParamNum::None, |_, _, value, _| {
                Ok(Value::Boolean(matches!(value, Value::Sequence(_) | Value::Range(_))))
            }),
        );
        map.insert(
            SmolStr::new("is_hash"),
            BuiltinFunction::new(ParamNum::None, |_, _, value, _| {
                Ok(Value::Boolean(matches!(value, Value::Hash(_))))
            }),
        );
        map.insert(
            SmolStr::new("is_callable"),
            BuiltinFunction::new(ParamNum::None, |_, _, value, _| {
                Ok(Value::Boolean(matches!(value, Value::Callable(_))))
            }),
        );
        map.insert(
            SmolStr::new("is_date"),
            BuiltinFunction::new(ParamNum::None, |_, _, value, _| {
                Ok(Value::Boolean(matches!(value, Value::Date(_))))
            }),
        );
        map.insert(
            SmolStr::new("keys"),
            BuiltinFunction::new(ParamNum::None, |_, name, value, _| match value {
                Value::Hash(hash) => Ok(Value::sequence(
                    hash.keys().cloned().map(Value::String).collect(),
                )),
                other => Err(Error::InvalidTarget(SmolStr::new(name), other.type_name())),
            }),
        );
        map.insert(
            SmolStr::new("values"),
            BuiltinFunction::new(ParamNum::None, |_, name, value, _| match value {
                Value::Hash(hash) => Ok(Value::sequence(hash.values().cloned().collect())),
                other => Err(Error::InvalidTarget(SmolStr::new(name), other.type_name())),
            }),
        );
        map.insert(
            SmolStr::new("first"),
            BuiltinFunction::new(ParamNum::None, |_, name, value, _| match value {
                Value::Range(range) => Ok(range.get(0).map(Value::from).unwrap_or_default()),
                _ => Ok(items(name, value)?.into_iter().next().unwrap_or_default()),
            }),
        );
        map.insert(
            SmolStr::new("last"),
            BuiltinFunction::new(ParamNum::None, |_, name, value, _| match value {
                Value::Range(range) => range
                    .size()
                    .map(|_| range.last().map(Value::from).unwrap_or_default())
                    .ok_or_else(|| Error::InvalidTarget(SmolStr::new(name), "unbounded range")),
                _ => Ok(items(name, value)?.pop().unwrap_or_default()),
            }),
        );
        map.insert(
            SmolStr::new("reverse"),
            BuiltinFunction::new(ParamNum::None, |_, name, value, _| {
                let mut items = items(name, value)?;
                items.reverse();
                Ok(Value::sequence(items))
            }),
        );
        map.insert(
            SmolStr::new("join"),
            BuiltinFunction::new(ParamNum::Fixed(1), |env, name, value, args| match args {
                [Value::String(separator)] => {
                    let parts = items(name, value)?
                        .iter()
                        .map(|item| scalar_text(env, name, item))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(Value::from(parts.join(separator.as_str())))
                }
                [other] => Err(Error::InvalidArguments(
                    SmolStr::new(name),
                    format!("expected a string separator, but got {}", other.type_name()),
                )),
                _ => unreachable!(),
            }),
        );
        map.insert(
            SmolStr::new("contains"),
            BuiltinFunction::new(ParamNum::Fixed(1), |_, name, value, args| match (value, args) {
                (Value::String(s), [Value::String(needle)]) => {
                    Ok(Value::Boolean(s.contains(needle.as_str())))
                }
                (Value::String(_), [other]) => Err(Error::InvalidArguments(
                    SmolStr::new(name),
                    format!("expected a string, but got {}", other.type_name()),
                )),
                (other, _) => Err(Error::InvalidTarget(SmolStr::new(name), other.type_name())),
            }),
        );
        map.insert(
            SmolStr::new("seq_contains"),
            BuiltinFunction::new(ParamNum::Fixed(1), |env, name, value, args| {
                let needle = &args[0];
                Ok(Value::Boolean(
                    items(name, value)?
                        .iter()
                        .any(|item| env.values_equal(item, needle)),
                ))
            }),
        );
        map.insert(
            SmolStr::new("abs"),
            BuiltinFunction::new(ParamNum::None, |_, name, value, _| number_op(name, value, Number::abs)),
        );
        map.insert(
            SmolStr::new("round"),
            BuiltinFunction::new(ParamNum::None, |_, name, value, _| {
                number_op(name, value, |n| n.round_with(RoundingMode::HalfUp))
            }),
        );
        map.insert(
            SmolStr::new("floor"),
            BuiltinFunction::new(ParamNum::None, |_, name, value, _| {
                number_op(name, value, |n| n.round_with(RoundingMode::Floor))
            }),
        );
        map.insert(
            SmolStr::new("ceiling"),
            BuiltinFunction::new(ParamNum::None, |_, name, value, _| {
                number_op(name, value, |n| n.round_with(RoundingMode::Ceiling))
            }),
        );
        map.insert(
            SmolStr::new("int"),
            BuiltinFunction::new(ParamNum::None, |_, name, value, _| {
                number_op(name, value, |n| {
                    let truncated = n.round_with(RoundingMode::Down);
                    truncated.to_i64().map(Number::Long).unwrap_or(truncated)
                })
            }),
        );
        map.insert(
            SmolStr::new("number"),
            BuiltinFunction::new(ParamNum::None, |_, name, value, _| match value {
                Value::Number(_) => Ok(value.clone()),
                Value::String(s) => Number::parse(s).map(Value::Number).ok_or_else(|| {
                    Error::InvalidArguments(SmolStr::new(name), format!("\"{s}\" is not a number"))
                }),
                other => Err(Error::InvalidTarget(SmolStr::new(name), other.type_name())),
            }),
        );
        map.insert(
            SmolStr::new("map"),
            BuiltinFunction::new(ParamNum::Fixed(1), |env, name, value, args| {
                let callable = callable_arg(name, args)?;
                let range = env.location;
                let mapped = items(name, value)?
                    .into_iter()
                    .map(|item| env.call_with(callable, vec![item], range))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::sequence(mapped))
            }),
        );
        map.insert(
            SmolStr::new("filter"),
            BuiltinFunction::new(ParamNum::Fixed(1), |env, name, value, args| {
                let callable = callable_arg(name, args)?;
                let range = env.location;
                let mut kept = Vec::new();
                for item in items(name, value)? {
                    match env.call_with(callable, vec![item.clone()], range)? {
                        Value::Boolean(true) => kept.push(item),
                        Value::Boolean(false) => {}
                        other => {
                            return Err(Error::InvalidArguments(
                                SmolStr::new(name),
                                format!("the predicate returned {}, not a boolean", other.type_name()),
                            ));
                        }
                    }
                }
                Ok(Value::sequence(kept))
            }),
        );
        map.insert(
            SmolStr::new("curry"),
            BuiltinFunction::new(ParamNum::Range(0, u8::MAX), |env, name, value, args| match value {
                Value::Callable(callable) => curry(env, name, callable, args),
                other => Err(Error::InvalidTarget(SmolStr::new(name), other.type_name())),
            }),
        );

        map
    });

/// Applies `?name(args)` to the value of `target`.
pub(crate) fn apply(
    env: &mut Environment<'_>,
    target: &Expr,
    name: &SmolStr,
    args: &ArgsList,
    range: Range,
) -> Result<Value, RuntimeError> {
    let builtin = BUILTIN_FUNCTIONS
        .get(name)
        .ok_or_else(|| Error::NotDefined(name.clone()).into_runtime(range))?;

    // Only `has_content` accepts a missing target.
    let value = if name == "has_content" {
        env.eval(target)?
    } else {
        env.eval_strict(target)?
    };

    let args = match env.eval_args(args)? {
        ArgValues::Empty => Vec::new(),
        ArgValues::Positional(values) => values,
        ArgValues::Named(_) => {
            return Err(Error::InvalidArguments(
                name.clone(),
                "built-ins take positional arguments only".to_string(),
            )
            .into_runtime(range));
        }
    };

    if !builtin.num_params.is_valid(args.len()) {
        return Err(
            Error::InvalidNumberOfArguments(name.clone(), builtin.num_params, args.len())
                .into_runtime(range),
        );
    }

    (builtin.func)(env, name, &value, &args).map_err(|e| e.into_runtime(range))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ast::{ArithOp, MacroDef, Param, ParameterList, Template},
        settings::Settings,
    };
    use rstest::rstest;

    fn eval(expr: &Expr) -> Result<Value, RuntimeError> {
        let mut out = String::new();
        let template = Shared::new(Template::new("test", vec![]));
        let mut env = Environment::new(Settings::default(), template, Value::Null, &mut out)?;
        env.eval(expr)
    }

    fn seq(items: Vec<Value>) -> Shared<Expr> {
        Expr::constant(Value::sequence(items))
    }

    fn apply(target: Shared<Expr>, name: &str, args: Vec<Shared<Expr>>) -> Result<Value, RuntimeError> {
        let args = if args.is_empty() {
            ArgsList::Empty
        } else {
            ArgsList::Positional(args)
        };
        eval(&Expr::builtin(target, name, args))
    }

    #[rstest]
    #[case(seq(vec![Value::from(1), Value::from(2)]), "size", vec![], Value::from(2))]
    #[case(Expr::string("héllo"), "length", vec![], Value::from(5))]
    #[case(Expr::string("abc"), "upper_case", vec![], Value::from("ABC"))]
    #[case(Expr::string("ABC"), "lower_case", vec![], Value::from("abc"))]
    #[case(Expr::string("  green"), "cap_first", vec![], Value::from("  Green"))]
    #[case(Expr::string(" x "), "trim", vec![], Value::from("x"))]
    #[case(Expr::number(3), "string", vec![Expr::string("0.00")], Value::from("3.00"))]
    #[case(Expr::boolean(false), "string", vec![Expr::string("on"), Expr::string("off")], Value::from("off"))]
    #[case(Expr::number(1234567), "c", vec![], Value::from("1234567"))]
    #[case(Expr::string(""), "has_content", vec![], Value::FALSE)]
    #[case(Expr::ident("undefined"), "has_content", vec![], Value::FALSE)]
    #[case(Expr::string("x"), "is_string", vec![], Value::TRUE)]
    #[case(Expr::range(Expr::number(1), Some(Expr::number(3)), crate::ast::RangeBound::Inclusive), "is_sequence", vec![], Value::TRUE)]
    #[case(Expr::constant(Value::hash([("a", Value::from(1))])), "keys", vec![], Value::sequence(vec![Value::from("a")]))]
    #[case(Expr::constant(Value::hash([("a", Value::from(1))])), "values", vec![], Value::sequence(vec![Value::from(1)]))]
    #[case(seq(vec![Value::from(1), Value::from(2)]), "first", vec![], Value::from(1))]
    #[case(seq(vec![Value::from(1), Value::from(2)]), "last", vec![], Value::from(2))]
    #[case(seq(vec![]), "first", vec![], Value::Absent)]
    #[case(Expr::range(Expr::number(5), Some(Expr::number(3)), crate::ast::RangeBound::Inclusive), "last", vec![], Value::from(3))]
    #[case(seq(vec![Value::from(1), Value::from(2)]), "reverse", vec![], Value::sequence(vec![Value::from(2), Value::from(1)]))]
    #[case(seq(vec![Value::from("a"), Value::from(1), Value::TRUE]), "join", vec![Expr::string(", ")], Value::from("a, 1, true"))]
    #[case(Expr::string("template"), "contains", vec![Expr::string("mp")], Value::TRUE)]
    #[case(seq(vec![Value::from("a"), Value::from(2)]), "seq_contains", vec![Expr::number(2)], Value::TRUE)]
    #[case(Expr::number(-4), "abs", vec![], Value::from(4))]
    #[case(Expr::number(2.5), "round", vec![], Value::from(3))]
    #[case(Expr::number(-2.5), "floor", vec![], Value::from(-3))]
    #[case(Expr::number(2.1), "ceiling", vec![], Value::from(3))]
    #[case(Expr::number(-2.7), "int", vec![], Value::from(-2))]
    #[case(Expr::string("12.5"), "number", vec![], Value::from(12.5))]
    fn test_builtins(
        #[case] target: Shared<Expr>,
        #[case] name: &str,
        #[case] args: Vec<Shared<Expr>>,
        #[case] expected: Value,
    ) {
        assert_eq!(apply(target, name, args).unwrap(), expected);
    }

    #[rstest]
    #[case(Expr::number(1), "nope", vec![])]
    #[case(Expr::number(1), "upper_case", vec![])]
    #[case(Expr::string("a"), "upper_case", vec![Expr::number(1)])]
    #[case(Expr::string("a"), "size", vec![])]
    #[case(Expr::string("abc"), "number", vec![])]
    #[case(Expr::range(Expr::number(1), None, crate::ast::RangeBound::Inclusive), "size", vec![])]
    #[case(Expr::constant(Value::Range(crate::value::RangeValue::new(i64::MIN, RangeEnd::Inclusive(i64::MAX)))), "size", vec![])]
    fn test_builtin_errors(
        #[case] target: Shared<Expr>,
        #[case] name: &str,
        #[case] args: Vec<Shared<Expr>>,
    ) {
        assert!(matches!(
            apply(target, name, args),
            Err(RuntimeError::Evaluation(_, EvaluationError::Unsupported(_)))
        ));
    }

    #[test]
    fn test_missing_target_is_an_error() {
        assert!(apply(Expr::ident("undefined"), "size", vec![]).unwrap_err().is_invalid_reference());
    }

    #[test]
    fn test_map_and_filter() {
        let numbers = seq((1..=4).map(Value::from).collect());
        let double = Expr::lambda("n", Expr::arithmetic(ArithOp::Mul, Expr::ident("n"), Expr::number(2)));
        let even = Expr::lambda(
            "n",
            Expr::compare(
                crate::ast::CmpOp::Eq,
                Expr::arithmetic(ArithOp::Mod, Expr::ident("n"), Expr::number(2)),
                Expr::number(0),
            ),
        );

        assert_eq!(
            apply(Shared::clone(&numbers), "map", vec![double]).unwrap(),
            Value::sequence(vec![Value::from(2), Value::from(4), Value::from(6), Value::from(8)])
        );
        assert_eq!(
            apply(Shared::clone(&numbers), "filter", vec![even]).unwrap(),
            Value::sequence(vec![Value::from(2), Value::from(4)])
        );

        let not_boolean = Expr::lambda("n", Expr::ident("n"));
        assert!(apply(numbers, "filter", vec![not_boolean]).is_err());
    }

    #[test]
    fn test_curry_macro() {
        let def = MacroDef::function(
            "add",
            ParameterList::new(vec![Param::new("a"), Param::new("b")]),
            vec![crate::ast::Instruction::ret(Some(Expr::add(Expr::ident("a"), Expr::ident("b"))))],
        );
        let add = Expr::constant(Value::Callable(Callable::Macro(crate::value::MacroRef {
            def: Shared::new(def),
            namespace: crate::arena::ArenaId::new(0),
        })));

        let add_ten = Expr::builtin(add, "curry", ArgsList::Positional(vec![Expr::number(10)]));
        let call = Expr::call(add_ten, ArgsList::named(vec![("b", Expr::number(5))]));
        assert_eq!(eval(&call).unwrap(), Value::from(15));
    }
}
