use std::fmt::{self, Display, Formatter};

#[cfg(feature = "ast-json")]
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::{Shared, ident::Ident, number::Number, range::Range, value::Value};

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Sub,
    Mul,
    Div,
    Mod,
}

impl Display for ArithOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let op = match self {
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
        };
        write!(f, "{}", op)
    }
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn is_equality(self) -> bool {
        matches!(self, CmpOp::Eq | CmpOp::Ne)
    }
}

impl Display for CmpOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let op = match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        };
        write!(f, "{}", op)
    }
}

/// How the right operand of a range literal bounds it.
#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangeBound {
    #[default]
    Inclusive,
    Exclusive,
    Length,
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "ast-json", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialVar {
    Error,
    Now,
    Namespace,
    Main,
    Globals,
    Locals,
    Locale,
    TemplateName,
    Version,
    DataModel,
    Lang,
}

impl SpecialVar {
    pub fn name(&self) -> &'static str {
        match self {
            SpecialVar::Error => "error",
            SpecialVar::Now => "now",
            SpecialVar::Namespace => "namespace",
            SpecialVar::Main => "main",
            SpecialVar::Globals => "globals",
            SpecialVar::Locals => "locals",
            SpecialVar::Locale => "locale",
            SpecialVar::TemplateName => "template_name",
            SpecialVar::Version => "version",
            SpecialVar::DataModel => "data_model",
            SpecialVar::Lang => "lang",
        }
    }
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(SmolStr),
    Expr(Shared<Expr>),
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Null,
    Boolean(bool),
    Number(Number),
    String(SmolStr),
    Interpolated(Vec<Segment>),
    List(Vec<Shared<Expr>>),
    HashLiteral(Vec<(Shared<Expr>, Shared<Expr>)>),
    /// A value computed ahead of time, e.g. a curried argument.
    #[cfg_attr(feature = "ast-json", serde(skip))]
    Constant(Value),
    Ident(Ident),
    Special(SpecialVar),
    Paren(Shared<Expr>),
    Negate(Shared<Expr>),
    Not(Shared<Expr>),
    /// Numeric add, sequence concat, string concat or hash merge.
    Add(Shared<Expr>, Shared<Expr>),
    Arithmetic(ArithOp, Shared<Expr>, Shared<Expr>),
    Compare(CmpOp, Shared<Expr>, Shared<Expr>),
    And(Shared<Expr>, Shared<Expr>),
    Or(Shared<Expr>, Shared<Expr>),
    /// `start..end`; no end means unbounded.
    Range(Shared<Expr>, Option<Shared<Expr>>, RangeBound),
    Dot(Shared<Expr>, SmolStr),
    Index(Shared<Expr>, Shared<Expr>),
    Exists(Shared<Expr>),
    Default(Shared<Expr>, Option<Shared<Expr>>),
    IfExists(Shared<Expr>),
    Call(Shared<Expr>, ArgsList),
    BuiltIn(Shared<Expr>, SmolStr, ArgsList),
    Lambda(Ident, Shared<Expr>),
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    #[cfg_attr(feature = "ast-json", serde(default))]
    pub range: Range,
    /// Result of constant folding; evaluation returns it directly.
    #[cfg_attr(feature = "ast-json", serde(skip))]
    pub constant: Option<Value>,
}

impl Expr {
    pub fn new(kind: ExprKind, range: Range) -> Self {
        Self {
            kind,
            range,
            constant: None,
        }
    }

    pub fn shared(kind: ExprKind) -> Shared<Expr> {
        Shared::new(Self::new(kind, Range::default()))
    }

    pub fn at(mut self, range: Range) -> Self {
        self.range = range;
        self
    }

    pub fn null() -> Shared<Expr> {
        Self::shared(ExprKind::Null)
    }

    pub fn boolean(b: bool) -> Shared<Expr> {
        Self::shared(ExprKind::Boolean(b))
    }

    pub fn number(n: impl Into<Number>) -> Shared<Expr> {
        Self::shared(ExprKind::Number(n.into()))
    }

    pub fn string(s: &str) -> Shared<Expr> {
        Self::shared(ExprKind::String(SmolStr::new(s)))
    }

    pub fn constant(value: Value) -> Shared<Expr> {
        Self::shared(ExprKind::Constant(value))
    }

    pub fn ident(name: &str) -> Shared<Expr> {
        Self::shared(ExprKind::Ident(Ident::new(name)))
    }

    pub fn special(var: SpecialVar) -> Shared<Expr> {
        Self::shared(ExprKind::Special(var))
    }

    pub fn paren(inner: Shared<Expr>) -> Shared<Expr> {
        Self::shared(ExprKind::Paren(inner))
    }

    pub fn add(lhs: Shared<Expr>, rhs: Shared<Expr>) -> Shared<Expr> {
        Self::shared(ExprKind::Add(lhs, rhs))
    }

    pub fn arithmetic(op: ArithOp, lhs: Shared<Expr>, rhs: Shared<Expr>) -> Shared<Expr> {
        Self::shared(ExprKind::Arithmetic(op, lhs, rhs))
    }

    pub fn compare(op: CmpOp, lhs: Shared<Expr>, rhs: Shared<Expr>) -> Shared<Expr> {
        Self::shared(ExprKind::Compare(op, lhs, rhs))
    }

    pub fn range(start: Shared<Expr>, end: Option<Shared<Expr>>, bound: RangeBound) -> Shared<Expr> {
        Self::shared(ExprKind::Range(start, end, bound))
    }

    pub fn dot(target: Shared<Expr>, name: &str) -> Shared<Expr> {
        Self::shared(ExprKind::Dot(target, SmolStr::new(name)))
    }

    pub fn index(target: Shared<Expr>, key: Shared<Expr>) -> Shared<Expr> {
        Self::shared(ExprKind::Index(target, key))
    }

    pub fn call(callee: Shared<Expr>, args: ArgsList) -> Shared<Expr> {
        Self::shared(ExprKind::Call(callee, args))
    }

    pub fn builtin(target: Shared<Expr>, name: &str, args: ArgsList) -> Shared<Expr> {
        Self::shared(ExprKind::BuiltIn(target, SmolStr::new(name), args))
    }

    pub fn lambda(param: &str, body: Shared<Expr>) -> Shared<Expr> {
        Self::shared(ExprKind::Lambda(Ident::new(param), body))
    }

    /// Whether the node can be evaluated without an environment.
    pub fn is_literal(&self) -> bool {
        if self.constant.is_some() {
            return true;
        }

        match &self.kind {
            ExprKind::Null
            | ExprKind::Boolean(_)
            | ExprKind::Number(_)
            | ExprKind::String(_)
            | ExprKind::Constant(_) => true,
            ExprKind::Interpolated(segments) => segments.iter().all(|s| match s {
                Segment::Text(_) => true,
                Segment::Expr(e) => e.is_literal(),
            }),
            ExprKind::List(items) => items.iter().all(|e| e.is_literal()),
            ExprKind::HashLiteral(entries) => {
                entries.iter().all(|(k, v)| k.is_literal() && v.is_literal())
            }
            ExprKind::Paren(e) | ExprKind::Negate(e) | ExprKind::Not(e) => e.is_literal(),
            ExprKind::Add(a, b)
            | ExprKind::Arithmetic(_, a, b)
            | ExprKind::Compare(_, a, b)
            | ExprKind::And(a, b)
            | ExprKind::Or(a, b) => a.is_literal() && b.is_literal(),
            ExprKind::Range(start, end, _) => {
                start.is_literal() && end.as_ref().is_none_or(|e| e.is_literal())
            }
            _ => false,
        }
    }

    /// Copy of the tree with every free `name` replaced by `substitute`.
    /// A lambda binding the same name shadows it.
    pub fn deep_clone(&self, name: Ident, substitute: &Expr) -> Expr {
        let sub = |e: &Shared<Expr>| Shared::new(e.deep_clone(name, substitute));

        let kind = match &self.kind {
            ExprKind::Ident(ident) if *ident == name => return substitute.clone(),
            ExprKind::Lambda(param, _) if *param == name => return self.clone(),
            ExprKind::Null
            | ExprKind::Boolean(_)
            | ExprKind::Number(_)
            | ExprKind::String(_)
            | ExprKind::Constant(_)
            | ExprKind::Ident(_)
            | ExprKind::Special(_) => self.kind.clone(),
            ExprKind::Interpolated(segments) => ExprKind::Interpolated(
                segments
                    .iter()
                    .map(|s| match s {
                        Segment::Text(t) => Segment::Text(t.clone()),
                        Segment::Expr(e) => Segment::Expr(sub(e)),
                    })
                    .collect(),
            ),
            ExprKind::List(items) => ExprKind::List(items.iter().map(sub).collect()),
            ExprKind::HashLiteral(entries) => ExprKind::HashLiteral(
                entries.iter().map(|(k, v)| (sub(k), sub(v))).collect(),
            ),
            ExprKind::Paren(e) => ExprKind::Paren(sub(e)),
            ExprKind::Negate(e) => ExprKind::Negate(sub(e)),
            ExprKind::Not(e) => ExprKind::Not(sub(e)),
            ExprKind::Add(a, b) => ExprKind::Add(sub(a), sub(b)),
            ExprKind::Arithmetic(op, a, b) => ExprKind::Arithmetic(*op, sub(a), sub(b)),
            ExprKind::Compare(op, a, b) => ExprKind::Compare(*op, sub(a), sub(b)),
            ExprKind::And(a, b) => ExprKind::And(sub(a), sub(b)),
            ExprKind::Or(a, b) => ExprKind::Or(sub(a), sub(b)),
            ExprKind::Range(start, end, bound) => {
                ExprKind::Range(sub(start), end.as_ref().map(sub), *bound)
            }
            ExprKind::Dot(target, member) => ExprKind::Dot(sub(target), member.clone()),
            ExprKind::Index(target, key) => ExprKind::Index(sub(target), sub(key)),
            ExprKind::Exists(e) => ExprKind::Exists(sub(e)),
            ExprKind::Default(lhs, rhs) => ExprKind::Default(sub(lhs), rhs.as_ref().map(sub)),
            ExprKind::IfExists(e) => ExprKind::IfExists(sub(e)),
            ExprKind::Call(callee, args) => {
                ExprKind::Call(sub(callee), args.deep_clone(name, substitute))
            }
            ExprKind::BuiltIn(target, builtin, args) => ExprKind::BuiltIn(
                sub(target),
                builtin.clone(),
                args.deep_clone(name, substitute),
            ),
            ExprKind::Lambda(param, body) => ExprKind::Lambda(*param, sub(body)),
        };

        Expr {
            kind,
            range: self.range,
            constant: self.constant.clone(),
        }
    }

    /// Whether `name` occurs free anywhere in the tree.
    pub fn references(&self, name: Ident) -> bool {
        let refs = |e: &Shared<Expr>| e.references(name);

        match &self.kind {
            ExprKind::Ident(ident) => *ident == name,
            ExprKind::Lambda(param, body) => *param != name && refs(body),
            ExprKind::Null
            | ExprKind::Boolean(_)
            | ExprKind::Number(_)
            | ExprKind::String(_)
            | ExprKind::Constant(_)
            | ExprKind::Special(_) => false,
            ExprKind::Interpolated(segments) => segments.iter().any(|s| match s {
                Segment::Text(_) => false,
                Segment::Expr(e) => refs(e),
            }),
            ExprKind::List(items) => items.iter().any(refs),
            ExprKind::HashLiteral(entries) => entries.iter().any(|(k, v)| refs(k) || refs(v)),
            ExprKind::Paren(e)
            | ExprKind::Negate(e)
            | ExprKind::Not(e)
            | ExprKind::Exists(e)
            | ExprKind::IfExists(e)
            | ExprKind::Dot(e, _) => refs(e),
            ExprKind::Add(a, b)
            | ExprKind::Arithmetic(_, a, b)
            | ExprKind::Compare(_, a, b)
            | ExprKind::And(a, b)
            | ExprKind::Or(a, b)
            | ExprKind::Index(a, b) => refs(a) || refs(b),
            ExprKind::Range(a, b, _) | ExprKind::Default(a, b) => {
                refs(a) || b.as_ref().is_some_and(refs)
            }
            ExprKind::Call(callee, args) | ExprKind::BuiltIn(callee, _, args) => {
                refs(callee) || args.exprs().any(refs)
            }
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Null => write!(f, "null"),
            ExprKind::Boolean(b) => write!(f, "{}", b),
            ExprKind::Number(n) => write!(f, "{}", n),
            ExprKind::String(s) => write!(f, "{:?}", s.as_str()),
            ExprKind::Interpolated(segments) => {
                write!(f, "\"")?;
                for segment in segments {
                    match segment {
                        Segment::Text(t) => write!(f, "{}", t.escape_default())?,
                        Segment::Expr(e) => write!(f, "${{{}}}", e)?,
                    }
                }
                write!(f, "\"")
            }
            ExprKind::List(items) => {
                write!(f, "[")?;
                write_joined(f, items.iter())?;
                write!(f, "]")
            }
            ExprKind::HashLiteral(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            ExprKind::Constant(value) => write!(f, "{:?}", value),
            ExprKind::Ident(ident) => write!(f, "{}", ident),
            ExprKind::Special(var) => write!(f, ".{}", var.name()),
            ExprKind::Paren(e) => write!(f, "({})", e),
            ExprKind::Negate(e) => write!(f, "-{}", e),
            ExprKind::Not(e) => write!(f, "!{}", e),
            ExprKind::Add(a, b) => write!(f, "{} + {}", a, b),
            ExprKind::Arithmetic(op, a, b) => write!(f, "{} {} {}", a, op, b),
            ExprKind::Compare(op, a, b) => write!(f, "{} {} {}", a, op, b),
            ExprKind::And(a, b) => write!(f, "{} && {}", a, b),
            ExprKind::Or(a, b) => write!(f, "{} || {}", a, b),
            ExprKind::Range(start, end, bound) => match (end, bound) {
                (None, _) => write!(f, "{}..", start),
                (Some(end), RangeBound::Inclusive) => write!(f, "{}..{}", start, end),
                (Some(end), RangeBound::Exclusive) => write!(f, "{}..<{}", start, end),
                (Some(end), RangeBound::Length) => write!(f, "{}..*{}", start, end),
            },
            ExprKind::Dot(target, name) => write!(f, "{}.{}", target, name),
            ExprKind::Index(target, key) => write!(f, "{}[{}]", target, key),
            ExprKind::Exists(e) => write!(f, "{}??", e),
            ExprKind::Default(lhs, Some(rhs)) => write!(f, "{}!{}", lhs, rhs),
            ExprKind::Default(lhs, None) => write!(f, "{}!", lhs),
            ExprKind::IfExists(e) => write!(f, "{}?if_exists", e),
            ExprKind::Call(callee, args) => write!(f, "{}({})", callee, args),
            ExprKind::BuiltIn(target, name, ArgsList::Empty) => write!(f, "{}?{}", target, name),
            ExprKind::BuiltIn(target, name, args) => write!(f, "{}?{}({})", target, name, args),
            ExprKind::Lambda(param, body) => write!(f, "{} -> {}", param, body),
        }
    }
}

fn write_joined<'a>(
    f: &mut Formatter<'_>,
    items: impl Iterator<Item = &'a Shared<Expr>>,
) -> fmt::Result {
    for (i, item) in items.enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

/// Actual arguments of a call.
#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ArgsList {
    #[default]
    Empty,
    Positional(Vec<Shared<Expr>>),
    Named(Vec<(Ident, Shared<Expr>)>),
}

impl ArgsList {
    pub fn named(args: Vec<(&str, Shared<Expr>)>) -> Self {
        ArgsList::Named(
            args.into_iter()
                .map(|(name, expr)| (Ident::new(name), expr))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        match self {
            ArgsList::Empty => 0,
            ArgsList::Positional(args) => args.len(),
            ArgsList::Named(args) => args.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn exprs(&self) -> Box<dyn Iterator<Item = &Shared<Expr>> + '_> {
        match self {
            ArgsList::Empty => Box::new(std::iter::empty()),
            ArgsList::Positional(args) => Box::new(args.iter()),
            ArgsList::Named(args) => Box::new(args.iter().map(|(_, e)| e)),
        }
    }

    pub fn deep_clone(&self, name: Ident, substitute: &Expr) -> ArgsList {
        let sub = |e: &Shared<Expr>| Shared::new(e.deep_clone(name, substitute));
        match self {
            ArgsList::Empty => ArgsList::Empty,
            ArgsList::Positional(args) => ArgsList::Positional(args.iter().map(sub).collect()),
            ArgsList::Named(args) => {
                ArgsList::Named(args.iter().map(|(n, e)| (*n, sub(e))).collect())
            }
        }
    }
}

impl Display for ArgsList {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ArgsList::Empty => Ok(()),
            ArgsList::Positional(args) => write_joined(f, args.iter()),
            ArgsList::Named(args) => {
                for (i, (name, expr)) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", name, expr)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    #[cfg_attr(feature = "ast-json", serde(default))]
    pub default: Option<Shared<Expr>>,
}

impl Param {
    pub fn new(name: &str) -> Self {
        Self {
            name: Ident::new(name),
            default: None,
        }
    }

    pub fn with_default(name: &str, default: Shared<Expr>) -> Self {
        Self {
            name: Ident::new(name),
            default: Some(default),
        }
    }
}

/// Formal parameters of a macro or function. The catch-all, if any, is
/// always last.
#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterList {
    pub params: Vec<Param>,
    #[cfg_attr(feature = "ast-json", serde(default))]
    pub catch_all: Option<Ident>,
}

impl ParameterList {
    pub fn new(params: Vec<Param>) -> Self {
        Self {
            params,
            catch_all: None,
        }
    }

    pub fn with_catch_all(mut self, name: &str) -> Self {
        self.catch_all = Some(Ident::new(name));
        self
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty() && self.catch_all.is_none()
    }

    pub fn position(&self, name: Ident) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    pub fn get(&self, name: Ident) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }
}

impl Display for ParameterList {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match &param.default {
                Some(default) => write!(f, "{}={}", param.name, default)?,
                None => write!(f, "{}", param.name)?,
            }
        }
        if let Some(catch_all) = &self.catch_all {
            if !self.params.is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "{}...", catch_all)?;
        }
        Ok(())
    }
}
