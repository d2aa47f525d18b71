pub mod instruction;
pub mod node;
pub mod template;

pub use instruction::{
    AssignScope, Block, Branch, Case, InstrKind, Instruction, MacroDef, MacroKind,
};
pub use node::{
    ArgsList, ArithOp, CmpOp, Expr, ExprKind, Param, ParameterList, RangeBound, Segment,
    SpecialVar,
};
pub use template::Template;
