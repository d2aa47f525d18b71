use std::fmt;

use smol_str::SmolStr;
use thiserror::Error;

use crate::range::Range;

type ErrorRange = Range;
type CalleeName = String;
type ExprText = String;
type TypeName = &'static str;

/// Which end of a range index fell outside the indexed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundSide {
    Left,
    Right,
}

impl fmt::Display for BoundSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundSide::Left => write!(f, "left-side"),
            BoundSide::Right => write!(f, "right-side"),
        }
    }
}

/// Failures raised by the host bridge and by operations a value does not support.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("{target} has no member named \"{name}\"")]
    NoSuchMember { target: String, name: SmolStr },
    #[error("No compatible overloaded variation of \"{name}\" was found for arguments ({args})")]
    NoSuchMethod { name: SmolStr, args: String },
    #[error(
        "Multiple compatible overloaded variations of \"{name}\" were found for arguments ({args}): {}",
        candidates.join(", ")
    )]
    AmbiguousMethod {
        name: SmolStr,
        args: String,
        candidates: Vec<String>,
    },
    #[error("Call to \"{name}\" failed: {message}")]
    Invocation { name: SmolStr, message: String },
    #[error("{0}")]
    Unsupported(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("The following has evaluated to null or missing: {1}")]
    InvalidReference(ErrorRange, ExprText),
    #[error("Expected a boolean, but \"{1}\" has evaluated to {2}")]
    NonBoolean(ErrorRange, ExprText, TypeName),
    #[error("Expected a number, but \"{1}\" has evaluated to {2}")]
    NonNumerical(ErrorRange, ExprText, TypeName),
    #[error("Expected a string, but \"{1}\" has evaluated to {2}")]
    NonString(ErrorRange, ExprText, TypeName),
    #[error("{1}")]
    Evaluation(ErrorRange, EvaluationError),
    #[error("Extraneous parameter for \"{1}\": {2}")]
    ExtraneousParameter(ErrorRange, CalleeName, String),
    #[error("\"{1}\" requires a value for parameter \"{2}\"")]
    MissingParameter(ErrorRange, CalleeName, String),
    #[error("The {side} index of the range ({index}) is out of bounds for length {len}")]
    IndexOutOfBounds {
        range: ErrorRange,
        side: BoundSide,
        index: i64,
        len: usize,
    },
    #[error("Negative index {1} is not allowed")]
    NegativeIndex(ErrorRange, i64),
    #[error("Divided by 0")]
    DivisionByZero(ErrorRange),
    #[error("Maximum recursion depth exceeded \"{1}\"")]
    RecursionLimit(ErrorRange, u32),
    #[error("Return is not allowed outside a macro or function")]
    ReturnOutsideMacro(ErrorRange),
    #[error("Break is not allowed outside a loop or switch")]
    BreakOutsideLoop(ErrorRange),
    #[error(
        "Template processing was stopped{}",
        .1.as_deref().map(|m| format!(": {m}")).unwrap_or_default()
    )]
    Stopped(ErrorRange, Option<String>),
    #[error("Failed to load template \"{1}\": {2}")]
    TemplateLoad(ErrorRange, String, String),
    #[error("I/O error: {1}")]
    Io(ErrorRange, String),
    #[error("{1}")]
    Template(ErrorRange, String),
}

impl RuntimeError {
    #[cold]
    pub fn location(&self) -> Range {
        match self {
            RuntimeError::InvalidReference(range, _) => *range,
            RuntimeError::NonBoolean(range, _, _) => *range,
            RuntimeError::NonNumerical(range, _, _) => *range,
            RuntimeError::NonString(range, _, _) => *range,
            RuntimeError::Evaluation(range, _) => *range,
            RuntimeError::ExtraneousParameter(range, _, _) => *range,
            RuntimeError::MissingParameter(range, _, _) => *range,
            RuntimeError::IndexOutOfBounds { range, .. } => *range,
            RuntimeError::NegativeIndex(range, _) => *range,
            RuntimeError::DivisionByZero(range) => *range,
            RuntimeError::RecursionLimit(range, _) => *range,
            RuntimeError::ReturnOutsideMacro(range) => *range,
            RuntimeError::BreakOutsideLoop(range) => *range,
            RuntimeError::Stopped(range, _) => *range,
            RuntimeError::TemplateLoad(range, _, _) => *range,
            RuntimeError::Io(range, _) => *range,
            RuntimeError::Template(range, _) => *range,
        }
    }

    /// Short variant name used as the diagnostic code.
    pub fn kind(&self) -> &'static str {
        match self {
            RuntimeError::InvalidReference(..) => "InvalidReference",
            RuntimeError::NonBoolean(..) => "NonBoolean",
            RuntimeError::NonNumerical(..) => "NonNumerical",
            RuntimeError::NonString(..) => "NonString",
            RuntimeError::Evaluation(..) => "Evaluation",
            RuntimeError::ExtraneousParameter(..) => "ExtraneousParameter",
            RuntimeError::MissingParameter(..) => "MissingParameter",
            RuntimeError::IndexOutOfBounds { .. } => "IndexOutOfBounds",
            RuntimeError::NegativeIndex(..) => "NegativeIndex",
            RuntimeError::DivisionByZero(..) => "DivisionByZero",
            RuntimeError::RecursionLimit(..) => "RecursionLimit",
            RuntimeError::ReturnOutsideMacro(..) => "ReturnOutsideMacro",
            RuntimeError::BreakOutsideLoop(..) => "BreakOutsideLoop",
            RuntimeError::Stopped(..) => "Stopped",
            RuntimeError::TemplateLoad(..) => "TemplateLoad",
            RuntimeError::Io(..) => "Io",
            RuntimeError::Template(..) => "Template",
        }
    }

    /// Reference failures are the only errors the parenthesized existence
    /// operators swallow.
    pub fn is_invalid_reference(&self) -> bool {
        matches!(self, RuntimeError::InvalidReference(..))
    }
}
