//! Binding of actual arguments to formal parameters.
//!
//! Binding happens in two steps. [`bind`] places the supplied values into a
//! fresh frame, routing excess arguments to the catch-all parameter, and
//! reports required parameters that were left out. [`resolve_defaults`] then
//! runs inside the new activation and evaluates the default expressions of
//! the remaining parameters. Defaults may refer to one another in any order,
//! so they are retried until a pass makes no progress.

use crate::{
    Shared,
    ast::{ArgsList, Expr, ExprKind, Param, ParameterList},
    error::RuntimeError,
    ident::Ident,
    range::Range,
    value::{Hash, Value},
};

use super::env::{Environment, Frame};

/// Evaluated actual arguments. An absent value counts as not supplied.
#[derive(Debug, Clone, Default)]
pub enum ArgValues {
    #[default]
    Empty,
    Positional(Vec<Value>),
    Named(Vec<(Ident, Value)>),
}

impl ArgValues {
    pub fn len(&self) -> usize {
        match self {
            ArgValues::Empty => 0,
            ArgValues::Positional(args) => args.len(),
            ArgValues::Named(args) => args.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<Value>> for ArgValues {
    fn from(values: Vec<Value>) -> Self {
        if values.is_empty() {
            ArgValues::Empty
        } else {
            ArgValues::Positional(values)
        }
    }
}

impl Environment<'_> {
    /// Evaluates call arguments in the caller's context.
    pub(crate) fn eval_args(&mut self, args: &ArgsList) -> Result<ArgValues, RuntimeError> {
        Ok(match args {
            ArgsList::Empty => ArgValues::Empty,
            ArgsList::Positional(exprs) => ArgValues::Positional(
                exprs
                    .iter()
                    .map(|e| self.eval(e))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            ArgsList::Named(exprs) => ArgValues::Named(
                exprs
                    .iter()
                    .map(|(name, e)| Ok((*name, self.eval(e)?)))
                    .collect::<Result<Vec<_>, RuntimeError>>()?,
            ),
        })
    }
}

/// Places `args` into a new frame for `params`.
pub(crate) fn bind(
    callee: &str,
    params: &ParameterList,
    args: ArgValues,
    range: Range,
) -> Result<Frame, RuntimeError> {
    let mut frame = Frame::default();

    match args {
        ArgValues::Empty => {
            if let Some(catch_all) = params.catch_all {
                frame.insert(catch_all, Value::sequence(Vec::new()));
            }
        }
        ArgValues::Positional(values) => {
            let supplied = values.len();
            let mut rest = Vec::new();

            for (i, value) in values.into_iter().enumerate() {
                match params.params.get(i) {
                    Some(param) => {
                        if !value.is_absent() {
                            frame.insert(param.name, value);
                        }
                    }
                    None if params.catch_all.is_some() => rest.push(missing_as_null(value)),
                    None => {
                        return Err(RuntimeError::ExtraneousParameter(
                            range,
                            callee.to_string(),
                            format!(
                                "accepts at most {} arguments, but {} were given",
                                params.len(),
                                supplied
                            ),
                        ));
                    }
                }
            }

            if let Some(catch_all) = params.catch_all {
                frame.insert(catch_all, Value::sequence(rest));
            }
        }
        ArgValues::Named(values) => {
            let mut rest = Hash::new();

            for (name, value) in values {
                if params.position(name).is_some() {
                    if !value.is_absent() {
                        frame.insert(name, value);
                    }
                } else if params.catch_all.is_some() {
                    rest.insert(name.as_str(), missing_as_null(value));
                } else {
                    return Err(RuntimeError::ExtraneousParameter(
                        range,
                        callee.to_string(),
                        format!("it has no parameter named \"{name}\""),
                    ));
                }
            }

            if let Some(catch_all) = params.catch_all {
                frame.insert(catch_all, Value::from(rest));
            }
        }
    }

    if let Some(param) = params
        .params
        .iter()
        .find(|p| p.default.is_none() && !frame.contains_key(&p.name))
    {
        return Err(RuntimeError::MissingParameter(
            range,
            callee.to_string(),
            param.name.to_string(),
        ));
    }

    Ok(frame)
}

fn missing_as_null(value: Value) -> Value {
    if value.is_absent() { Value::Null } else { value }
}

/// Evaluates the defaults of every parameter not bound in the current
/// activation.
pub(crate) fn resolve_defaults(
    env: &mut Environment<'_>,
    params: &ParameterList,
) -> Result<(), RuntimeError> {
    let mut pending: Vec<&Param> = params
        .params
        .iter()
        .filter(|p| !env.current_activation().locals.contains_key(&p.name))
        .collect();

    while !pending.is_empty() {
        let mut unresolved = Vec::with_capacity(pending.len());
        let mut first_error = None;

        for param in pending.iter().copied() {
            let Some(default) = &param.default else {
                continue;
            };

            match env.eval(default) {
                Ok(value) if !value.is_missing() => {
                    let current = env.current;
                    env.activations[current].locals.insert(param.name, value);
                }
                Ok(_) => {
                    first_error.get_or_insert_with(|| {
                        RuntimeError::InvalidReference(default.range, default.to_string())
                    });
                    unresolved.push(param);
                }
                Err(e) if e.is_invalid_reference() => {
                    first_error.get_or_insert(e);
                    unresolved.push(param);
                }
                Err(e) => return Err(e),
            }
        }

        if unresolved.len() == pending.len() {
            if let Some(error) = first_error {
                return Err(error);
            }
            break;
        }
        pending = unresolved;
    }

    Ok(())
}

/// Parameter list of a curried macro: supplied arguments become constant
/// defaults, and defaults that depend on them are specialized.
pub(crate) fn curry(
    callee: &str,
    params: &ParameterList,
    args: ArgValues,
    range: Range,
) -> Result<ParameterList, RuntimeError> {
    let supplied: Vec<(Ident, Value)> = match args {
        ArgValues::Empty => Vec::new(),
        ArgValues::Positional(values) => {
            if values.len() > params.len() {
                return Err(RuntimeError::ExtraneousParameter(
                    range,
                    callee.to_string(),
                    format!(
                        "accepts at most {} arguments, but {} were curried",
                        params.len(),
                        values.len()
                    ),
                ));
            }
            params
                .params
                .iter()
                .zip(values)
                .map(|(param, value)| (param.name, value))
                .collect()
        }
        ArgValues::Named(values) => {
            if let Some((name, _)) = values.iter().find(|(name, _)| params.position(*name).is_none()) {
                return Err(RuntimeError::ExtraneousParameter(
                    range,
                    callee.to_string(),
                    format!("it has no parameter named \"{name}\""),
                ));
            }
            values
        }
    };

    let constants: Vec<(Ident, Expr)> = supplied
        .into_iter()
        .filter(|(_, value)| !value.is_absent())
        .map(|(name, value)| (name, Expr::new(ExprKind::Constant(value), range)))
        .collect();

    let curried = params
        .params
        .iter()
        .map(|param| {
            if let Some((_, constant)) = constants.iter().find(|(name, _)| *name == param.name) {
                return Param {
                    name: param.name,
                    default: Some(Shared::new(constant.clone())),
                };
            }

            let default = param.default.as_ref().map(|default| {
                constants
                    .iter()
                    .filter(|(name, _)| default.references(*name))
                    .fold(Shared::clone(default), |expr, (name, constant)| {
                        Shared::new(expr.deep_clone(*name, constant))
                    })
            });
            Param {
                name: param.name,
                default,
            }
        })
        .collect();

    Ok(ParameterList {
        params: curried,
        catch_all: params.catch_all,
    })
}
