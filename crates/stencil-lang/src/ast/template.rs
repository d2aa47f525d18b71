use std::collections::BTreeMap;

#[cfg(feature = "ast-json")]
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::Shared;

use super::{Block, Instruction, MacroDef};

/// A parsed template ready to be rendered.
#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    #[cfg_attr(feature = "ast-json", serde(default))]
    pub name: SmolStr,
    /// Source text, kept for error reports.
    #[cfg_attr(feature = "ast-json", serde(default))]
    pub source: Option<String>,
    /// Header attributes, applied as setting overrides when rendering starts.
    #[cfg_attr(feature = "ast-json", serde(default))]
    pub header: BTreeMap<SmolStr, SmolStr>,
    pub root: Block,
}

impl Template {
    pub fn new(name: impl Into<SmolStr>, root: Block) -> Self {
        Self {
            name: name.into(),
            source: None,
            header: BTreeMap::new(),
            root,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.header.insert(SmolStr::new(key), SmolStr::new(value));
        self
    }

    /// Macro definitions of this template. They are visible from the start
    /// of the render, before their definition point.
    pub fn macros(&self) -> Vec<Shared<MacroDef>> {
        let mut macros = Vec::new();
        Instruction::collect_macros(&self.root, &mut macros);
        macros
    }

    #[cfg(feature = "ast-json")]
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[cfg(feature = "ast-json")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
