use std::cmp::Ordering;

use crate::{
    Shared,
    ast::{
        ArgsList, ArithOp, Block, Branch, Case, CmpOp, Expr, ExprKind, InstrKind, Instruction,
        MacroDef, Param, ParameterList, RangeBound, Segment, Template,
    },
    number::{self, ArithmeticEngine, ArithmeticKind},
    value::{RangeEnd, RangeValue, Value},
};

/// Settings keys whose value changes the result of arithmetic.
const ENGINE_SETTINGS: [&str; 2] = ["arithmetic_engine", "decimal_scale"];

/// The `Optimizer` folds literal subtrees of a template into cached
/// constants, so evaluating them returns the stored value directly.
///
/// Only folds whose result cannot depend on render settings are applied.
/// Arithmetic is folded with the engine given to [`Optimizer::with_engine`],
/// and not at all when the template switches engines itself.
#[derive(Debug)]
pub struct Optimizer {
    engine: Option<Shared<dyn ArithmeticEngine>>,
    folds: usize,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimizer {
    /// Creates an `Optimizer` that leaves arithmetic alone.
    pub fn new() -> Self {
        Self {
            engine: None,
            folds: 0,
        }
    }

    pub fn with_engine(kind: ArithmeticKind, decimal_scale: u32) -> Self {
        Self {
            engine: Some(number::engine_for(kind, decimal_scale)),
            ..Self::new()
        }
    }

    /// Number of nodes folded so far.
    pub fn folds(&self) -> usize {
        self.folds
    }

    pub fn optimize(&mut self, template: &Template) -> Template {
        let engine = self.engine.take();
        if engine.is_some() && !switches_engine(template) {
            self.engine = engine.clone();
        }

        let root = self.optimize_block(&template.root);
        self.engine = engine;

        tracing::trace!(template = %template.name, folds = self.folds, "template optimized");

        Template {
            root,
            ..template.clone()
        }
    }

    fn optimize_block(&mut self, block: &[Instruction]) -> Block {
        block.iter().map(|i| self.optimize_instruction(i)).collect()
    }

    fn optimize_instruction(&mut self, instruction: &Instruction) -> Instruction {
        let kind = match &instruction.kind {
            InstrKind::Interpolation(expr) => InstrKind::Interpolation(self.optimize_expr(expr)),
            InstrKind::Block(body) => InstrKind::Block(self.optimize_block(body)),
            InstrKind::If(branches) => InstrKind::If(
                branches
                    .iter()
                    .map(|b| Branch {
                        condition: b.condition.as_ref().map(|c| self.optimize_expr(c)),
                        body: self.optimize_block(&b.body),
                    })
                    .collect(),
            ),
            InstrKind::Switch { subject, cases } => InstrKind::Switch {
                subject: self.optimize_expr(subject),
                cases: cases
                    .iter()
                    .map(|c| Case {
                        value: c.value.as_ref().map(|v| self.optimize_expr(v)),
                        body: self.optimize_block(&c.body),
                    })
                    .collect(),
            },
            InstrKind::List {
                sequence,
                var,
                body,
                otherwise,
            } => InstrKind::List {
                sequence: self.optimize_expr(sequence),
                var: *var,
                body: self.optimize_block(body),
                otherwise: otherwise.as_ref().map(|b| self.optimize_block(b)),
            },
            InstrKind::Return(value) => {
                InstrKind::Return(value.as_ref().map(|v| self.optimize_expr(v)))
            }
            InstrKind::Stop(value) => InstrKind::Stop(value.as_ref().map(|v| self.optimize_expr(v))),
            InstrKind::Assign { scope, targets } => InstrKind::Assign {
                scope: *scope,
                targets: targets
                    .iter()
                    .map(|(name, value)| (*name, self.optimize_expr(value)))
                    .collect(),
            },
            InstrKind::BlockAssign { scope, name, body } => InstrKind::BlockAssign {
                scope: *scope,
                name: *name,
                body: self.optimize_block(body),
            },
            InstrKind::MacroDef(def) => InstrKind::MacroDef(Shared::new(MacroDef {
                params: self.optimize_params(&def.params),
                body: self.optimize_block(&def.body),
                ..def.as_ref().clone()
            })),
            InstrKind::MacroCall {
                callee,
                args,
                body,
                loop_vars,
            } => InstrKind::MacroCall {
                callee: self.optimize_expr(callee),
                args: self.optimize_args(args),
                body: body.as_ref().map(|b| Shared::new(self.optimize_block(b))),
                loop_vars: loop_vars.clone(),
            },
            InstrKind::Nested(args) => {
                InstrKind::Nested(args.iter().map(|a| self.optimize_expr(a)).collect())
            }
            InstrKind::Attempt { attempt, recover } => InstrKind::Attempt {
                attempt: self.optimize_block(attempt),
                recover: self.optimize_block(recover),
            },
            InstrKind::Include(expr) => InstrKind::Include(self.optimize_expr(expr)),
            InstrKind::Import {
                template,
                namespace,
            } => InstrKind::Import {
                template: self.optimize_expr(template),
                namespace: *namespace,
            },
            InstrKind::Setting { name, value } => InstrKind::Setting {
                name: name.clone(),
                value: self.optimize_expr(value),
            },
            InstrKind::Text(_)
            | InstrKind::Break
            | InstrKind::Flush
            | InstrKind::Malformed(_) => instruction.kind.clone(),
        };

        Instruction::new(kind, instruction.range)
    }

    fn optimize_params(&mut self, params: &ParameterList) -> ParameterList {
        ParameterList {
            params: params
                .params
                .iter()
                .map(|p| Param {
                    name: p.name,
                    default: p.default.as_ref().map(|d| self.optimize_expr(d)),
                })
                .collect(),
            catch_all: params.catch_all,
        }
    }

    fn optimize_args(&mut self, args: &ArgsList) -> ArgsList {
        match args {
            ArgsList::Empty => ArgsList::Empty,
            ArgsList::Positional(exprs) => {
                ArgsList::Positional(exprs.iter().map(|e| self.optimize_expr(e)).collect())
            }
            ArgsList::Named(exprs) => ArgsList::Named(
                exprs
                    .iter()
                    .map(|(name, e)| (*name, self.optimize_expr(e)))
                    .collect(),
            ),
        }
    }

    fn optimize_expr(&mut self, expr: &Shared<Expr>) -> Shared<Expr> {
        let mut optimized = self.optimize_children(expr);
        if optimized.constant.is_none() {
            optimized.constant = self.fold(&optimized);
            if optimized.constant.is_some() {
                self.folds += 1;
            }
        }
        Shared::new(optimized)
    }

    fn optimize_children(&mut self, expr: &Expr) -> Expr {
        let kind = match &expr.kind {
            ExprKind::Interpolated(segments) => ExprKind::Interpolated(
                segments
                    .iter()
                    .map(|s| match s {
                        Segment::Text(t) => Segment::Text(t.clone()),
                        Segment::Expr(e) => Segment::Expr(self.optimize_expr(e)),
                    })
                    .collect(),
            ),
            ExprKind::List(items) => {
                ExprKind::List(items.iter().map(|e| self.optimize_expr(e)).collect())
            }
            ExprKind::HashLiteral(entries) => ExprKind::HashLiteral(
                entries
                    .iter()
                    .map(|(k, v)| (self.optimize_expr(k), self.optimize_expr(v)))
                    .collect(),
            ),
            ExprKind::Paren(e) => ExprKind::Paren(self.optimize_expr(e)),
            ExprKind::Negate(e) => ExprKind::Negate(self.optimize_expr(e)),
            ExprKind::Not(e) => ExprKind::Not(self.optimize_expr(e)),
            ExprKind::Add(a, b) => ExprKind::Add(self.optimize_expr(a), self.optimize_expr(b)),
            ExprKind::Arithmetic(op, a, b) => {
                ExprKind::Arithmetic(*op, self.optimize_expr(a), self.optimize_expr(b))
            }
            ExprKind::Compare(op, a, b) => {
                ExprKind::Compare(*op, self.optimize_expr(a), self.optimize_expr(b))
            }
            ExprKind::And(a, b) => ExprKind::And(self.optimize_expr(a), self.optimize_expr(b)),
            ExprKind::Or(a, b) => ExprKind::Or(self.optimize_expr(a), self.optimize_expr(b)),
            ExprKind::Range(start, end, bound) => ExprKind::Range(
                self.optimize_expr(start),
                end.as_ref().map(|e| self.optimize_expr(e)),
                *bound,
            ),
            ExprKind::Dot(target, name) => ExprKind::Dot(self.optimize_expr(target), name.clone()),
            ExprKind::Index(target, key) => {
                ExprKind::Index(self.optimize_expr(target), self.optimize_expr(key))
            }
            ExprKind::Exists(e) => ExprKind::Exists(self.optimize_expr(e)),
            ExprKind::Default(lhs, rhs) => ExprKind::Default(
                self.optimize_expr(lhs),
                rhs.as_ref().map(|e| self.optimize_expr(e)),
            ),
            ExprKind::IfExists(e) => ExprKind::IfExists(self.optimize_expr(e)),
            ExprKind::Call(callee, args) => {
                ExprKind::Call(self.optimize_expr(callee), self.optimize_args(args))
            }
            ExprKind::BuiltIn(target, name, args) => ExprKind::BuiltIn(
                self.optimize_expr(target),
                name.clone(),
                self.optimize_args(args),
            ),
            // The body is specialized per application and folded then.
            ExprKind::Lambda(..)
            | ExprKind::Null
            | ExprKind::Boolean(_)
            | ExprKind::Number(_)
            | ExprKind::String(_)
            | ExprKind::Constant(_)
            | ExprKind::Ident(_)
            | ExprKind::Special(_) => expr.kind.clone(),
        };

        Expr {
            kind,
            range: expr.range,
            constant: expr.constant.clone(),
        }
    }

    /// Value of `expr` when it can be computed without an environment.
    /// Anything that would fail at render time is left for the evaluator to
    /// report.
    fn fold(&self, expr: &Expr) -> Option<Value> {
        match &expr.kind {
            ExprKind::Null
            | ExprKind::Boolean(_)
            | ExprKind::Number(_)
            | ExprKind::String(_)
            | ExprKind::Constant(_) => None,
            ExprKind::Paren(e) => literal(e),
            ExprKind::Not(e) => match literal(e)? {
                Value::Boolean(b) => Some(Value::Boolean(!b)),
                _ => None,
            },
            ExprKind::Negate(e) => match literal(e)? {
                Value::Number(n) => Some(Value::Number(n.negate())),
                _ => None,
            },
            ExprKind::And(a, b) => match (literal(a)?, literal(b)) {
                (Value::Boolean(false), _) => Some(Value::FALSE),
                (Value::Boolean(true), Some(Value::Boolean(b))) => Some(Value::Boolean(b)),
                _ => None,
            },
            ExprKind::Or(a, b) => match (literal(a)?, literal(b)) {
                (Value::Boolean(true), _) => Some(Value::TRUE),
                (Value::Boolean(false), Some(Value::Boolean(b))) => Some(Value::Boolean(b)),
                _ => None,
            },
            ExprKind::Compare(op, a, b) => {
                let ordering = match (literal(a)?, literal(b)?) {
                    (Value::Number(x), Value::Number(y)) => number::compare_numbers(&x, &y),
                    (Value::Boolean(x), Value::Boolean(y)) => x.cmp(&y),
                    _ => return None,
                };
                Some(Value::Boolean(ordering_matches(*op, ordering)))
            }
            ExprKind::Add(a, b) => match (literal(a)?, literal(b)?) {
                (Value::String(x), Value::String(y)) => Some(Value::from(format!("{x}{y}"))),
                (Value::Number(x), Value::Number(y)) => {
                    self.engine.as_ref()?.add(&x, &y).ok().map(Value::Number)
                }
                _ => None,
            },
            ExprKind::Arithmetic(op, a, b) => {
                let engine = self.engine.as_ref()?;
                let (Value::Number(x), Value::Number(y)) = (literal(a)?, literal(b)?) else {
                    return None;
                };
                match op {
                    ArithOp::Sub => engine.subtract(&x, &y),
                    ArithOp::Mul => engine.multiply(&x, &y),
                    ArithOp::Div => engine.divide(&x, &y),
                    ArithOp::Mod => engine.modulus(&x, &y),
                }
                .ok()
                .map(Value::Number)
            }
            ExprKind::List(items) => items
                .iter()
                .map(|e| literal(e))
                .collect::<Option<Vec<_>>>()
                .map(Value::sequence),
            ExprKind::Interpolated(segments) => {
                let mut text = String::new();
                for segment in segments {
                    match segment {
                        Segment::Text(t) => text.push_str(t),
                        Segment::Expr(e) => match literal(e)? {
                            Value::String(s) => text.push_str(&s),
                            _ => return None,
                        },
                    }
                }
                Some(Value::from(text))
            }
            ExprKind::Range(start, end, bound) => {
                let start = integer(start)?;
                let end = match end {
                    None => RangeEnd::Unbounded,
                    Some(end) => {
                        let end = integer(end)?;
                        match bound {
                            RangeBound::Inclusive => RangeEnd::Inclusive(end),
                            RangeBound::Exclusive => RangeEnd::Exclusive(end),
                            RangeBound::Length => RangeEnd::Length(end),
                        }
                    }
                };
                Some(Value::Range(RangeValue::new(start, end)))
            }
            _ => None,
        }
    }
}

/// Value of a literal or already folded node.
fn literal(expr: &Expr) -> Option<Value> {
    if let Some(constant) = &expr.constant {
        return Some(constant.clone());
    }

    match &expr.kind {
        ExprKind::Null => Some(Value::Null),
        ExprKind::Boolean(b) => Some(Value::Boolean(*b)),
        ExprKind::Number(n) => Some(Value::Number(n.clone())),
        ExprKind::String(s) => Some(Value::String(s.clone())),
        ExprKind::Constant(value) => Some(value.clone()),
        _ => None,
    }
}

fn integer(expr: &Expr) -> Option<i64> {
    match literal(expr)? {
        Value::Number(n) if n.kind().is_integral() => n.to_i64(),
        _ => None,
    }
}

fn ordering_matches(op: CmpOp, ordering: Ordering) -> bool {
    match op {
        CmpOp::Eq => ordering == Ordering::Equal,
        CmpOp::Ne => ordering != Ordering::Equal,
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::Ge => ordering != Ordering::Less,
    }
}

fn switches_engine(template: &Template) -> bool {
    fn in_block(block: &[Instruction]) -> bool {
        block.iter().any(|instruction| match &instruction.kind {
            InstrKind::Setting { name, .. } => ENGINE_SETTINGS.contains(&name.as_str()),
            InstrKind::Block(body) | InstrKind::BlockAssign { body, .. } => in_block(body),
            InstrKind::If(branches) => branches.iter().any(|b| in_block(&b.body)),
            InstrKind::Switch { cases, .. } => cases.iter().any(|c| in_block(&c.body)),
            InstrKind::List {
                body, otherwise, ..
            } => in_block(body) || otherwise.as_deref().is_some_and(in_block),
            InstrKind::MacroDef(def) => in_block(&def.body),
            InstrKind::MacroCall { body, .. } => body.as_deref().is_some_and(|b| in_block(b)),
            InstrKind::Attempt { attempt, recover } => in_block(attempt) || in_block(recover),
            _ => false,
        })
    }

    template
        .header
        .keys()
        .any(|key| ENGINE_SETTINGS.contains(&key.as_str()))
        || in_block(&template.root)
}
