#[cfg(feature = "ast-json")]
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::{Shared, ident::Ident, range::Range};

use super::{ArgsList, Expr, ParameterList};

pub type Block = Vec<Instruction>;

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    /// `None` for the trailing else branch.
    #[cfg_attr(feature = "ast-json", serde(default))]
    pub condition: Option<Shared<Expr>>,
    pub body: Block,
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    /// `None` for the default case.
    #[cfg_attr(feature = "ast-json", serde(default))]
    pub value: Option<Shared<Expr>>,
    pub body: Block,
}

/// Frame an assignment writes to.
#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "ast-json", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssignScope {
    /// Local inside a macro, the current namespace otherwise.
    #[default]
    Unqualified,
    Local,
    Namespace,
    Global,
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "ast-json", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MacroKind {
    #[default]
    Macro,
    Function,
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct MacroDef {
    pub name: Ident,
    #[cfg_attr(feature = "ast-json", serde(default))]
    pub params: ParameterList,
    pub body: Block,
    #[cfg_attr(feature = "ast-json", serde(default))]
    pub kind: MacroKind,
    #[cfg_attr(feature = "ast-json", serde(default))]
    pub range: Range,
}

impl MacroDef {
    pub fn new(name: &str, params: ParameterList, body: Block) -> Self {
        Self {
            name: Ident::new(name),
            params,
            body,
            kind: MacroKind::Macro,
            range: Range::default(),
        }
    }

    pub fn function(name: &str, params: ParameterList, body: Block) -> Self {
        Self {
            kind: MacroKind::Function,
            ..Self::new(name, params, body)
        }
    }
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum InstrKind {
    Text(SmolStr),
    Interpolation(Shared<Expr>),
    Block(Block),
    If(Vec<Branch>),
    /// Execution falls through to later cases until a `Break`.
    Switch {
        subject: Shared<Expr>,
        cases: Vec<Case>,
    },
    /// Binds `var`, `<var>_index` and `<var>_has_next` for each item;
    /// `otherwise` runs when there are no items.
    List {
        sequence: Shared<Expr>,
        var: Ident,
        body: Block,
        #[cfg_attr(feature = "ast-json", serde(default))]
        otherwise: Option<Block>,
    },
    Break,
    Return(Option<Shared<Expr>>),
    Stop(Option<Shared<Expr>>),
    Assign {
        #[cfg_attr(feature = "ast-json", serde(default))]
        scope: AssignScope,
        targets: Vec<(Ident, Shared<Expr>)>,
    },
    /// Assigns the output of `body` as a string.
    BlockAssign {
        #[cfg_attr(feature = "ast-json", serde(default))]
        scope: AssignScope,
        name: Ident,
        body: Block,
    },
    MacroDef(Shared<MacroDef>),
    MacroCall {
        callee: Shared<Expr>,
        #[cfg_attr(feature = "ast-json", serde(default))]
        args: ArgsList,
        #[cfg_attr(feature = "ast-json", serde(default))]
        body: Option<Shared<Block>>,
        #[cfg_attr(feature = "ast-json", serde(default))]
        loop_vars: Vec<Ident>,
    },
    /// Renders the caller's nested body, binding its loop variables.
    Nested(Vec<Shared<Expr>>),
    Attempt {
        attempt: Block,
        recover: Block,
    },
    Include(Shared<Expr>),
    Import {
        template: Shared<Expr>,
        namespace: Ident,
    },
    Setting {
        name: SmolStr,
        value: Shared<Expr>,
    },
    Flush,
    /// A construct the parser could not make sense of; fails when reached.
    Malformed(SmolStr),
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub kind: InstrKind,
    #[cfg_attr(feature = "ast-json", serde(default))]
    pub range: Range,
}

impl Instruction {
    pub fn new(kind: InstrKind, range: Range) -> Self {
        Self { kind, range }
    }

    pub fn at(mut self, range: Range) -> Self {
        self.range = range;
        self
    }

    pub fn text(text: &str) -> Self {
        Self::from(InstrKind::Text(SmolStr::new(text)))
    }

    pub fn interpolation(expr: Shared<Expr>) -> Self {
        Self::from(InstrKind::Interpolation(expr))
    }

    pub fn if_else(condition: Shared<Expr>, then: Block, otherwise: Block) -> Self {
        Self::from(InstrKind::If(vec![
            Branch {
                condition: Some(condition),
                body: then,
            },
            Branch {
                condition: None,
                body: otherwise,
            },
        ]))
    }

    pub fn list(sequence: Shared<Expr>, var: &str, body: Block) -> Self {
        Self::from(InstrKind::List {
            sequence,
            var: Ident::new(var),
            body,
            otherwise: None,
        })
    }

    pub fn assign(scope: AssignScope, name: &str, value: Shared<Expr>) -> Self {
        Self::from(InstrKind::Assign {
            scope,
            targets: vec![(Ident::new(name), value)],
        })
    }

    pub fn macro_def(def: MacroDef) -> Self {
        Self::from(InstrKind::MacroDef(Shared::new(def)))
    }

    pub fn macro_call(callee: Shared<Expr>, args: ArgsList) -> Self {
        Self::from(InstrKind::MacroCall {
            callee,
            args,
            body: None,
            loop_vars: Vec::new(),
        })
    }

    pub fn ret(value: Option<Shared<Expr>>) -> Self {
        Self::from(InstrKind::Return(value))
    }

    /// Every macro definition reachable without entering a macro body.
    pub fn collect_macros(block: &[Instruction], out: &mut Vec<Shared<MacroDef>>) {
        for instruction in block {
            match &instruction.kind {
                InstrKind::MacroDef(def) => out.push(Shared::clone(def)),
                InstrKind::Block(body)
                | InstrKind::List { body, otherwise: None, .. }
                | InstrKind::BlockAssign { body, .. } => Self::collect_macros(body, out),
                InstrKind::List {
                    body,
                    otherwise: Some(otherwise),
                    ..
                } => {
                    Self::collect_macros(body, out);
                    Self::collect_macros(otherwise, out);
                }
                InstrKind::If(branches) => branches
                    .iter()
                    .for_each(|b| Self::collect_macros(&b.body, out)),
                InstrKind::Switch { cases, .. } => cases
                    .iter()
                    .for_each(|c| Self::collect_macros(&c.body, out)),
                InstrKind::Attempt { attempt, recover } => {
                    Self::collect_macros(attempt, out);
                    Self::collect_macros(recover, out);
                }
                InstrKind::MacroCall {
                    body: Some(body), ..
                } => Self::collect_macros(body, out),
                _ => {}
            }
        }
    }

    /// Short name used in logs and debugger contexts.
    pub fn name(&self) -> &'static str {
        match &self.kind {
            InstrKind::Text(_) => "text",
            InstrKind::Interpolation(_) => "interpolation",
            InstrKind::Block(_) => "block",
            InstrKind::If(_) => "if",
            InstrKind::Switch { .. } => "switch",
            InstrKind::List { .. } => "list",
            InstrKind::Break => "break",
            InstrKind::Return(_) => "return",
            InstrKind::Stop(_) => "stop",
            InstrKind::Assign { .. } => "assign",
            InstrKind::BlockAssign { .. } => "block_assign",
            InstrKind::MacroDef(_) => "macro",
            InstrKind::MacroCall { .. } => "macro_call",
            InstrKind::Nested(_) => "nested",
            InstrKind::Attempt { .. } => "attempt",
            InstrKind::Include(_) => "include",
            InstrKind::Import { .. } => "import",
            InstrKind::Setting { .. } => "setting",
            InstrKind::Flush => "flush",
            InstrKind::Malformed(_) => "malformed",
        }
    }
}

impl From<InstrKind> for Instruction {
    fn from(kind: InstrKind) -> Self {
        Self::new(kind, Range::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_macros_skips_macro_bodies() {
        let inner = MacroDef::new("inner", ParameterList::default(), vec![]);
        let outer = MacroDef::new(
            "outer",
            ParameterList::default(),
            vec![Instruction::macro_def(inner)],
        );
        let nested = MacroDef::function("nested", ParameterList::default(), vec![]);

        let block = vec![
            Instruction::text("hi"),
            Instruction::macro_def(outer),
            Instruction::if_else(Expr::boolean(true), vec![Instruction::macro_def(nested)], vec![]),
        ];

        let mut macros = Vec::new();
        Instruction::collect_macros(&block, &mut macros);

        let names = macros.iter().map(|m| m.name.to_string()).collect::<Vec<_>>();
        assert_eq!(names, vec!["outer", "nested"]);
        assert_eq!(macros[1].kind, MacroKind::Function);
    }
}
