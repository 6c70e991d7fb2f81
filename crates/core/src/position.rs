//! Source positions and ranges.
//!
//! Every token and AST node carries a [`Range`] so diagnostics can point
//! back at the exact source text that produced them, including text pulled
//! in through `Binde "<path>" ein.` includes (each included file keeps its
//! own name in the positions it produces).

use std::fmt;
use std::rc::Rc;

/// A single point in a source file: 1-based line and column, byte-oriented
/// file identity shared via `Rc<str>` so tokens don't each own a copy of
/// the (possibly long) include path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourcePosition {
    pub file: Rc<str>,
    pub line: u32,
    pub column: u32,
}

impl SourcePosition {
    pub fn new(file: Rc<str>, line: u32, column: u32) -> Self {
        Self { file, line, column }
    }

    /// The (1, 1) position at the start of `file`.
    pub fn start_of(file: Rc<str>) -> Self {
        Self::new(file, 1, 1)
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A half-open-in-spirit span between two positions in the same file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Range {
    pub start: SourcePosition,
    pub end: SourcePosition,
}

impl Range {
    pub fn new(start: SourcePosition, end: SourcePosition) -> Self {
        Self { start, end }
    }

    /// A zero-width range at a single position, used for synthesized tokens
    /// (e.g. the `<counter>` identifier injected into a for-loop body).
    pub fn point(pos: SourcePosition) -> Self {
        Self {
            end: pos.clone(),
            start: pos,
        }
    }

    /// Merge two ranges into the smallest range covering both, used when a
    /// parser rule spans several tokens (e.g. a whole `FuncCall`).
    pub fn merge(&self, other: &Range) -> Range {
        Range {
            start: self.start.clone(),
            end: other.end.clone(),
        }
    }

    pub fn file(&self) -> &str {
        &self.start.file
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start.line == self.end.line {
            write!(
                f,
                "{}:{}:{}-{}",
                self.start.file, self.start.line, self.start.column, self.end.column
            )
        } else {
            write!(f, "{} - {}", self.start, self.end)
        }
    }
}
