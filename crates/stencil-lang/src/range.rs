#[cfg(feature = "ast-json")]
use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy, Hash)]
pub struct Position {
    pub line: u32,
    pub column: usize,
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}

impl Position {
    pub fn new(line: u32, column: usize) -> Self {
        Position { line, column }
    }
}

/// Source location of a node, as reported by the parser.
#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy, Default, Hash)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Range { start, end }
    }

    /// A range covering `len` columns of a single line.
    pub fn line(line: u32, column: usize, len: usize) -> Self {
        Range {
            start: Position::new(line, column),
            end: Position::new(line, column + len),
        }
    }

    pub fn contains(&self, position: &Position) -> bool {
        (self.start.line < position.line
            || (self.start.line == position.line && self.start.column <= position.column))
            && (self.end.line > position.line
                || (self.end.line == position.line && self.end.column >= position.column))
    }

    /// Smallest range covering both `self` and `other`.
    pub fn merge(&self, other: &Range) -> Range {
        Range {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.start.line, self.start.column)
    }
}
