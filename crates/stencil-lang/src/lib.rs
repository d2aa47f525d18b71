//! `stencil-lang` is the runtime of the stencil template language: it
//! evaluates compiled template trees against a data model and writes the
//! rendered text to an output sink.
//!
//! Trees are built with the constructors in [`ast`] or, with the `ast-json`
//! feature, loaded from JSON. There is no parser in this crate.
//!
//! ## Examples
//!
//! ```rust
//! use stencil_lang::{Engine, Shared, Value};
//! use stencil_lang::ast::{CmpOp, Expr, Instruction, Template};
//!
//! let template = Shared::new(Template::new(
//!     "sign",
//!     vec![Instruction::if_else(
//!         Expr::compare(CmpOp::Gt, Expr::ident("x"), Expr::number(0)),
//!         vec![Instruction::text("pos")],
//!         vec![Instruction::text("non-pos")],
//!     )],
//! ));
//!
//! let engine = Engine::default();
//! let data = Value::hash([("x", Value::from(-1))]);
//! assert_eq!(engine.render_to_string(&template, data).unwrap(), "non-pos");
//! ```
pub mod ast;
mod arena;
mod engine;
mod error;
mod eval;
mod format;
mod host;
mod ident;
mod number;
mod optimizer;
mod overload;
mod range;
mod settings;
mod value;

/// Reference-counted handle for immutable trees and shared runtime state.
pub type Shared<T> = std::sync::Arc<T>;

pub use arena::{Arena, ArenaId};
pub use engine::{Engine, Options};
pub use error::{BoundSide, Error, EvaluationError, RuntimeError};
pub use eval::builtin::{BUILTIN_FUNCTIONS, BuiltinFunction, ParamNum};
pub use eval::debugger::{
    Breakpoint, DebugContext, Debugger, DebuggerAction, DebuggerHandler, DefaultDebuggerHandler,
};
pub use eval::env::{
    Collator, Environment, Frame, Namespace, NamespaceId, OrdinalCollator, Output, WriteOutput,
};
pub use eval::exec::Flow;
pub use eval::params::ArgValues;
#[cfg(feature = "file-io")]
pub use eval::resolver::FileResolver;
pub use eval::resolver::{LoadError, MapResolver, TemplateResolver, resolve_name};
pub use format::{Formatter, NumberFormat, Symbols, format_date};
pub use host::{
    HostClass, HostClassBuilder, HostFn, HostMethod, HostObject, Member, Property,
    invalidate_caches, lookup_member,
};
pub use ident::Ident;
pub use number::{
    ArithmeticEngine, ArithmeticError, ArithmeticKind, ConservativeEngine, DecimalEngine, Number,
    NumberKind, compare_numbers, engine_for,
};
pub use optimizer::Optimizer;
pub use overload::{OverloadSet, ParamType, Primitive, ResolveError, Signature};
pub use range::{Position, Range};
pub use settings::{ConfigError, Settings};
pub use value::{
    BoundMethod, Callable, Curried, DateKind, DateValue, Hash, Lambda, MacroRef, RangeEnd,
    RangeValue, Value, ValueType,
};

pub type RenderResult = Result<String, Error>;
