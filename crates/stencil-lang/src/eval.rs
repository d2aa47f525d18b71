// Expression evaluation. Instructions are executed in `exec`; both operate on
// the per-render `Environment` defined in `env`.
use std::cmp::Ordering;

use smol_str::SmolStr;

use crate::{
    Shared,
    ast::{ArithOp, CmpOp, Expr, ExprKind, RangeBound, Segment, SpecialVar},
    error::{BoundSide, EvaluationError, RuntimeError},
    host::{self, HostObject, Member},
    ident::Ident,
    number::Number,
    range::Range,
    value::{
        BoundMethod, Callable, Curried, DateValue, Hash, Lambda, MacroRef, RangeEnd, RangeValue,
        Value,
    },
};

pub mod builtin;
pub mod debugger;
pub mod env;
pub mod exec;
pub mod params;
pub mod resolver;

use env::Environment;
use exec::Flow;
use params::ArgValues;

/// Member `name` of a host object: a property value, or its methods bound to
/// the object.
pub(crate) fn host_member(object: &Shared<dyn HostObject>, name: &str) -> Result<Value, String> {
    match host::lookup_member(object.class(), name) {
        Member::Property(property) => property.get(object.as_ref()),
        Member::Methods(overloads) => Ok(Value::Callable(Callable::Method(Shared::new(
            BoundMethod {
                receiver: Some(Shared::clone(object)),
                overloads,
            },
        )))),
        Member::Missing => Ok(Value::Absent),
    }
}

#[inline(always)]
fn unsupported(range: Range, message: String) -> RuntimeError {
    RuntimeError::Evaluation(range, EvaluationError::Unsupported(message))
}

impl Environment<'_> {
    /// Evaluates `expr`. Unbound names evaluate to [`Value::Absent`]; every
    /// operator that needs a value turns that into `InvalidReference`.
    pub fn eval(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        if let Some(constant) = &expr.constant {
            return Ok(constant.clone());
        }

        match &expr.kind {
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Boolean(b) => Ok(Value::Boolean(*b)),
            ExprKind::Number(n) => Ok(Value::Number(n.clone())),
            ExprKind::String(s) => Ok(Value::String(s.clone())),
            ExprKind::Constant(value) => Ok(value.clone()),
            ExprKind::Interpolated(segments) => self.eval_interpolated(segments),
            ExprKind::List(items) => Ok(Value::sequence(
                items
                    .iter()
                    .map(|item| self.eval_strict(item))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            ExprKind::HashLiteral(entries) => {
                let mut hash = Hash::new();
                for (key_expr, value_expr) in entries {
                    let key = self.eval_strict(key_expr)?;
                    let Value::String(key) = key else {
                        return Err(RuntimeError::NonString(
                            key_expr.range,
                            key_expr.to_string(),
                            key.type_name(),
                        ));
                    };
                    hash.insert(key, self.eval_strict(value_expr)?);
                }
                Ok(Value::from(hash))
            }
            ExprKind::Ident(ident) => Ok(self.lookup(*ident)),
            ExprKind::Special(var) => self.eval_special(*var, expr.range),
            ExprKind::Paren(inner) => self.eval(inner),
            ExprKind::Negate(operand) => Ok(Value::Number(self.eval_number(operand)?.negate())),
            ExprKind::Not(operand) => Ok(Value::Boolean(!self.is_true(operand)?)),
            ExprKind::Add(lhs, rhs) => self.eval_add(lhs, rhs, expr.range),
            ExprKind::Arithmetic(op, lhs, rhs) => {
                let a = self.eval_number(lhs)?;
                let b = self.eval_number(rhs)?;
                let result = match op {
                    ArithOp::Sub => self.engine.subtract(&a, &b),
                    ArithOp::Mul => self.engine.multiply(&a, &b),
                    ArithOp::Div => self.engine.divide(&a, &b),
                    ArithOp::Mod => self.engine.modulus(&a, &b),
                };
                result
                    .map(Value::Number)
                    .map_err(|_| RuntimeError::DivisionByZero(expr.range))
            }
            ExprKind::Compare(op, lhs, rhs) => {
                Ok(Value::Boolean(self.eval_compare(*op, lhs, rhs, expr.range)?))
            }
            ExprKind::And(lhs, rhs) => Ok(Value::Boolean(self.is_true(lhs)? && self.is_true(rhs)?)),
            ExprKind::Or(lhs, rhs) => Ok(Value::Boolean(self.is_true(lhs)? || self.is_true(rhs)?)),
            ExprKind::Range(start, end, bound) => {
                let start = self.eval_integer(start)?;
                let end = match end {
                    None => RangeEnd::Unbounded,
                    Some(end) => {
                        let end = self.eval_integer(end)?;
                        match bound {
                            RangeBound::Inclusive => RangeEnd::Inclusive(end),
                            RangeBound::Exclusive => RangeEnd::Exclusive(end),
                            RangeBound::Length => RangeEnd::Length(end),
                        }
                    }
                };
                Ok(Value::Range(RangeValue::new(start, end)))
            }
            ExprKind::Dot(target, name) => {
                let value = self.eval_strict(target)?;
                self.member(&value, name, target, expr.range)
            }
            ExprKind::Index(target, key) => {
                let value = self.eval_strict(target)?;
                let key_value = self.eval_strict(key)?;
                self.index(&value, &key_value, target, expr.range)
            }
            ExprKind::Exists(operand) => {
                Ok(Value::Boolean(!self.eval_optional(operand)?.is_missing()))
            }
            ExprKind::Default(lhs, rhs) => {
                let value = self.eval_optional(lhs)?;
                if !value.is_missing() {
                    return Ok(value);
                }
                match rhs {
                    Some(rhs) => self.eval(rhs),
                    None => Ok(Value::String(SmolStr::default())),
                }
            }
            ExprKind::IfExists(operand) => {
                let value = self.eval_optional(operand)?;
                Ok(if value.is_missing() {
                    Value::String(SmolStr::default())
                } else {
                    value
                })
            }
            ExprKind::Call(callee, args) => {
                let value = self.eval_strict(callee)?;
                let Value::Callable(callable) = value else {
                    return Err(unsupported(
                        expr.range,
                        format!(
                            "\"{}\" is not callable, it has evaluated to {}",
                            callee,
                            value.type_name()
                        ),
                    ));
                };
                let args = self.eval_args(args)?;
                self.call(&callable, args, expr.range)
            }
            ExprKind::BuiltIn(target, name, args) => builtin::apply(self, target, name, args, expr.range),
            ExprKind::Lambda(param, body) => Ok(Value::Callable(Callable::Lambda(Shared::new(
                Lambda {
                    param: *param,
                    body: Shared::clone(body),
                },
            )))),
        }
    }

    /// Evaluates a condition, which must be a boolean.
    pub fn is_true(&mut self, expr: &Expr) -> Result<bool, RuntimeError> {
        let value = self.eval_strict(expr)?;
        value
            .as_bool()
            .ok_or_else(|| RuntimeError::NonBoolean(expr.range, expr.to_string(), value.type_name()))
    }

    /// Like [`Environment::eval`], but a missing result is an error.
    pub(crate) fn eval_strict(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        let value = self.eval(expr)?;
        if value.is_missing() {
            return Err(RuntimeError::InvalidReference(expr.range, expr.to_string()));
        }
        Ok(value)
    }

    pub(crate) fn eval_number(&mut self, expr: &Expr) -> Result<Number, RuntimeError> {
        match self.eval_strict(expr)? {
            Value::Number(n) => Ok(n),
            other => Err(RuntimeError::NonNumerical(
                expr.range,
                expr.to_string(),
                other.type_name(),
            )),
        }
    }

    pub(crate) fn eval_integer(&mut self, expr: &Expr) -> Result<i64, RuntimeError> {
        let number = self.eval_number(expr)?;
        number.to_i64().ok_or_else(|| {
            unsupported(
                expr.range,
                format!("Expected an integer, but \"{expr}\" has evaluated to {number}"),
            )
        })
    }

    /// Evaluates a scalar and renders it as text.
    pub(crate) fn eval_text(&mut self, expr: &Expr) -> Result<String, RuntimeError> {
        let value = self.eval_strict(expr)?;
        self.to_text(&value, expr)
    }

    /// Text of a scalar under the current settings.
    pub(crate) fn to_text(&self, value: &Value, expr: &Expr) -> Result<String, RuntimeError> {
        match value {
            Value::String(s) => Ok(s.to_string()),
            Value::Number(n) => Ok(self.formatter.number(n)),
            Value::Boolean(b) => Ok(self.formatter.boolean(*b).to_string()),
            Value::Date(date) => self
                .formatter
                .date(date)
                .map_err(|message| unsupported(expr.range, message)),
            Value::Absent | Value::Null => {
                Err(RuntimeError::InvalidReference(expr.range, expr.to_string()))
            }
            Value::Host(object) => object.display().ok_or_else(|| {
                RuntimeError::NonString(expr.range, expr.to_string(), value.type_name())
            }),
            _ => Err(RuntimeError::NonString(
                expr.range,
                expr.to_string(),
                value.type_name(),
            )),
        }
    }

    /// Operand of the existence operators. A reference failure inside a
    /// parenthesized operand counts as missing; without parentheses only a
    /// missing result does.
    fn eval_optional(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        match self.eval(expr) {
            Err(e) if e.is_invalid_reference() && matches!(expr.kind, ExprKind::Paren(_)) => {
                tracing::trace!(expr = %expr, "reference failure treated as missing");
                Ok(Value::Absent)
            }
            result => result,
        }
    }

    fn eval_interpolated(&mut self, segments: &[Segment]) -> Result<Value, RuntimeError> {
        let mut text = String::new();
        for segment in segments {
            match segment {
                Segment::Text(s) => text.push_str(s),
                Segment::Expr(e) => text.push_str(&self.eval_text(e)?),
            }
        }
        Ok(Value::from(text))
    }

    fn eval_special(&mut self, var: SpecialVar, range: Range) -> Result<Value, RuntimeError> {
        Ok(match var {
            SpecialVar::Error => match self.recovered.last() {
                Some(message) => Value::from(message.as_str()),
                None => {
                    return Err(RuntimeError::InvalidReference(
                        range,
                        format!(".{}", var.name()),
                    ));
                }
            },
            SpecialVar::Now => Value::Date(DateValue::datetime(chrono::Local::now().naive_local())),
            SpecialVar::Namespace => Value::Namespace(self.current_namespace()),
            SpecialVar::Main => Value::Namespace(self.main_namespace),
            SpecialVar::Globals => Value::hash(sorted_frame(&self.globals)),
            SpecialVar::Locals => {
                let activation = self.current_activation();
                if activation.is_macro {
                    Value::hash(sorted_frame(&activation.locals))
                } else {
                    Value::Absent
                }
            }
            SpecialVar::Locale => Value::from(self.settings.locale.as_str()),
            SpecialVar::Lang => Value::from(
                self.settings
                    .locale
                    .split(['_', '-'])
                    .next()
                    .unwrap_or_default(),
            ),
            SpecialVar::TemplateName => Value::String(self.template.name.clone()),
            SpecialVar::Version => Value::from(env!("CARGO_PKG_VERSION")),
            SpecialVar::DataModel => self.data_model.clone(),
        })
    }

    /// Numeric add, else sequence concatenation, else string concatenation,
    /// else hash merge.
    fn eval_add(&mut self, lhs: &Expr, rhs: &Expr, range: Range) -> Result<Value, RuntimeError> {
        let a = self.eval_strict(lhs)?;
        let b = self.eval_strict(rhs)?;

        if let (Value::Number(x), Value::Number(y)) = (&a, &b) {
            return self
                .engine
                .add(x, y)
                .map(Value::Number)
                .map_err(|_| RuntimeError::DivisionByZero(range));
        }

        if let (Some(x), Some(y)) = (a.to_items(), b.to_items()) {
            return Ok(Value::sequence(x.into_iter().chain(y).collect()));
        }

        let is_text = |v: &Value| {
            matches!(
                v,
                Value::String(_) | Value::Number(_) | Value::Date(_) | Value::Boolean(_)
            )
        };
        if (matches!(a, Value::String(_)) || matches!(b, Value::String(_)))
            && is_text(&a)
            && is_text(&b)
        {
            let mut text = self.to_text(&a, lhs)?;
            text.push_str(&self.to_text(&b, rhs)?);
            return Ok(Value::from(text));
        }

        if let (Value::Hash(x), Value::Hash(y)) = (&a, &b) {
            return Ok(Value::from(x.merge(y)));
        }

        Err(unsupported(
            range,
            format!("Cannot add {} to {}", b.type_name(), a.type_name()),
        ))
    }

    fn eval_compare(
        &mut self,
        op: CmpOp,
        lhs: &Expr,
        rhs: &Expr,
        range: Range,
    ) -> Result<bool, RuntimeError> {
        let a = self.eval_strict(lhs)?;
        let b = self.eval_strict(rhs)?;

        let ordering = match (&a, &b) {
            (Value::Number(x), Value::Number(y)) => self.engine.compare(x, y),
            (Value::Date(x), Value::Date(y)) => x.compare(y).ok_or_else(|| {
                unsupported(
                    range,
                    "Dates can only be compared with dates of the same known kind".to_string(),
                )
            })?,
            (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
            (Value::String(x), Value::String(y)) if op.is_equality() => {
                let equal = self.collator.equals(x, y);
                return Ok(equal == (op == CmpOp::Eq));
            }
            (Value::Host(x), Value::Host(y)) if op.is_equality() => {
                let equal = x.host_eq(y.as_ref());
                return Ok(equal == (op == CmpOp::Eq));
            }
            (Value::String(_), Value::String(_)) | (Value::Host(_), Value::Host(_)) => {
                return Err(unsupported(
                    range,
                    format!("Operator \"{op}\" cannot be used on {} values", a.type_name()),
                ));
            }
            _ => {
                return Err(unsupported(
                    range,
                    format!("Cannot compare {} with {}", a.type_name(), b.type_name()),
                ));
            }
        };

        Ok(match op {
            CmpOp::Eq => ordering == Ordering::Equal,
            CmpOp::Ne => ordering != Ordering::Equal,
            CmpOp::Lt => ordering == Ordering::Less,
            CmpOp::Le => ordering != Ordering::Greater,
            CmpOp::Gt => ordering == Ordering::Greater,
            CmpOp::Ge => ordering != Ordering::Less,
        })
    }

    /// `target.name`.
    fn member(
        &self,
        value: &Value,
        name: &str,
        target: &Expr,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        match value {
            Value::Hash(hash) => Ok(hash.get(name).cloned().unwrap_or_default()),
            Value::Namespace(id) => Ok(self.namespaces[*id]
                .vars
                .get(&Ident::new(name))
                .cloned()
                .unwrap_or_default()),
            Value::Host(object) => host_member(object, name).map_err(|message| {
                RuntimeError::Evaluation(
                    range,
                    EvaluationError::Invocation {
                        name: SmolStr::new(name),
                        message,
                    },
                )
            }),
            other => Err(RuntimeError::Evaluation(
                range,
                EvaluationError::NoSuchMember {
                    target: format!("\"{}\" ({})", target, other.type_name()),
                    name: SmolStr::new(name),
                },
            )),
        }
    }

    /// `target[key]`.
    fn index(
        &self,
        value: &Value,
        key: &Value,
        target: &Expr,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        match key {
            Value::Number(n) => {
                let i = n.to_i64().ok_or_else(|| {
                    unsupported(range, format!("Index must be an integer, but it was {n}"))
                })?;
                if i < 0 {
                    return Err(RuntimeError::NegativeIndex(range, i));
                }
                let i = i as usize;

                match value {
                    Value::Sequence(items) => Ok(items.get(i).cloned().unwrap_or_default()),
                    Value::Range(r) => Ok(r.get(i).map(Value::from).unwrap_or_default()),
                    Value::String(s) => s
                        .chars()
                        .nth(i)
                        .map(|c| Value::from(c.to_string()))
                        .ok_or(RuntimeError::IndexOutOfBounds {
                            range,
                            side: BoundSide::Right,
                            index: i as i64,
                            len: s.chars().count(),
                        }),
                    other => Err(unsupported(
                        range,
                        format!("{} cannot be indexed by a number", other.type_name()),
                    )),
                }
            }
            Value::String(name) => match value {
                Value::Hash(_) | Value::Namespace(_) | Value::Host(_) => {
                    self.member(value, name, target, range)
                }
                other => Err(unsupported(
                    range,
                    format!("{} cannot be indexed by a string", other.type_name()),
                )),
            },
            Value::Range(r) => match value {
                Value::String(s) => {
                    let chars = s.chars().collect::<Vec<_>>();
                    let (lo, hi, reverse) = slice_bounds(r, chars.len(), range)?;
                    let mut slice = chars[lo..hi].to_vec();
                    if reverse {
                        slice.reverse();
                    }
                    Ok(Value::from(slice.into_iter().collect::<String>()))
                }
                _ => {
                    let items = value.to_items().ok_or_else(|| {
                        unsupported(
                            range,
                            format!("{} cannot be sliced", value.type_name()),
                        )
                    })?;
                    let (lo, hi, reverse) = slice_bounds(r, items.len(), range)?;
                    let mut slice = items[lo..hi].to_vec();
                    if reverse {
                        slice.reverse();
                    }
                    Ok(Value::sequence(slice))
                }
            },
            other => Err(unsupported(
                range,
                format!("{} cannot be used as an index", other.type_name()),
            )),
        }
    }

    /// Calls `callable` with evaluated arguments.
    pub(crate) fn call(
        &mut self,
        callable: &Callable,
        args: ArgValues,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        match callable {
            Callable::Macro(macro_ref) => self.call_macro(macro_ref, &macro_ref.def.params, args, range),
            Callable::Method(method) => {
                let args = positional(args, range)?;
                self.call_method(method, &args, range)
            }
            Callable::Curried(curried) => match curried.as_ref() {
                Curried::Macro { base, params } => self.call_macro(base, params, args, range),
                Curried::Method { base, prefix } => {
                    let mut all = prefix.clone();
                    all.extend(positional(args, range)?);
                    self.call_method(base, &all, range)
                }
            },
            Callable::Lambda(lambda) => {
                let mut args = positional(args, range)?;
                if args.len() != 1 {
                    return Err(RuntimeError::ExtraneousParameter(
                        range,
                        callable.name().to_string(),
                        format!("a lambda takes exactly 1 argument, but {} were given", args.len()),
                    ));
                }
                self.apply_lambda(lambda, args.remove(0))
            }
        }
    }

    /// Calls `callable` with positional values, as built-ins do.
    pub(crate) fn call_with(
        &mut self,
        callable: &Callable,
        args: Vec<Value>,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        self.call(callable, ArgValues::from(args), range)
    }

    fn call_method(
        &mut self,
        method: &BoundMethod,
        args: &[Value],
        range: Range,
    ) -> Result<Value, RuntimeError> {
        method
            .overloads
            .invoke(method.receiver.as_deref(), args)
            .map_err(|e| RuntimeError::Evaluation(range, e))
    }

    /// A macro or function called for its value: output is dropped and the
    /// result is whatever `Return` supplied.
    fn call_macro(
        &mut self,
        macro_ref: &MacroRef,
        params: &crate::ast::ParameterList,
        args: ArgValues,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        let flow = self.discard(|env| env.invoke_macro(macro_ref, params, args, None, range))?;
        match flow {
            Flow::Return(value) => Ok(value.unwrap_or_default()),
            Flow::Stop(message) => Err(RuntimeError::Stopped(self.location, message)),
            Flow::Continue | Flow::Break => Ok(Value::Absent),
        }
    }

    /// Applies a lambda by substituting the argument into a copy of its body.
    pub(crate) fn apply_lambda(&mut self, lambda: &Lambda, arg: Value) -> Result<Value, RuntimeError> {
        let substitute = Expr::new(ExprKind::Constant(arg), lambda.body.range);
        let body = lambda.body.deep_clone(lambda.param, &substitute);
        self.eval(&body)
    }
}

fn positional(args: ArgValues, range: Range) -> Result<Vec<Value>, RuntimeError> {
    match args {
        ArgValues::Empty => Ok(Vec::new()),
        ArgValues::Positional(values) => Ok(values),
        ArgValues::Named(_) => Err(unsupported(
            range,
            "Named arguments can only be passed to macros and functions".to_string(),
        )),
    }
}

fn sorted_frame(frame: &env::Frame) -> Vec<(SmolStr, Value)> {
    let mut entries = frame
        .iter()
        .map(|(name, value)| (name.as_str(), value.clone()))
        .collect::<Vec<_>>();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

/// Half-open bounds of `r` within a value of length `len`, and whether the
/// slice runs backwards.
fn slice_bounds(
    r: &RangeValue,
    len: usize,
    range: Range,
) -> Result<(usize, usize, bool), RuntimeError> {
    let out_of_bounds = |side, index| RuntimeError::IndexOutOfBounds {
        range,
        side,
        index,
        len,
    };

    if r.start < 0 {
        return Err(RuntimeError::NegativeIndex(range, r.start));
    }
    let start = r.start as usize;
    if start > len {
        return Err(out_of_bounds(BoundSide::Left, r.start));
    }

    if r.is_descending() {
        if start >= len {
            return Err(out_of_bounds(BoundSide::Left, r.start));
        }
        let lo = match r.end {
            RangeEnd::Inclusive(end) if end < 0 => return Err(RuntimeError::NegativeIndex(range, end)),
            RangeEnd::Inclusive(end) => end as usize,
            RangeEnd::Exclusive(end) => (end + 1).max(0) as usize,
            RangeEnd::Length(n) => (r.start + n + 1).max(0) as usize,
            RangeEnd::Unbounded => start,
        };
        return Ok((lo, start + 1, true));
    }

    let hi = match r.end {
        RangeEnd::Unbounded => len,
        RangeEnd::Length(n) => (start + n as usize).min(len),
        RangeEnd::Inclusive(end) => {
            if end as usize >= len {
                return Err(out_of_bounds(BoundSide::Right, end));
            }
            end as usize + 1
        }
        RangeEnd::Exclusive(end) => {
            if end as usize > len {
                return Err(out_of_bounds(BoundSide::Right, end));
            }
            end as usize
        }
    };
    Ok((start, hi, false))
}
