//! Structured diagnostics (spec §6 "Diagnostic format", §7 "Error Handling
//! Design").
//!
//! Every compiler stage reports through a [`DiagnosticSink`] rather than
//! returning `Result` from each visit method — this lets a stage keep
//! walking after an error (so later stages still get a chance to report
//! independent problems) while marking the translation unit "faulty" so
//! code emission is suppressed.

use crate::position::Range;
use std::fmt;

/// The stage that raised a diagnostic. Used only for categorizing numeric
/// codes into bands (1xxx lex, 2xxx syntax, 3xxx name, 4xxx type) — it does
/// not otherwise change how a diagnostic is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Lex,
    Syntax,
    Name,
    Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Forward-compatible slot for future lints; nothing in the core
    /// pipeline emits this today.
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub code: u32,
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub range: Range,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        code: u32,
        kind: DiagnosticKind,
        severity: Severity,
        range: Range,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            kind,
            severity,
            range,
            message: message.into(),
        }
    }

    pub fn error(code: u32, kind: DiagnosticKind, range: Range, message: impl Into<String>) -> Self {
        Self::new(code, kind, Severity::Error, range, message)
    }

    pub fn warning(code: u32, kind: DiagnosticKind, range: Range, message: impl Into<String>) -> Self {
        Self::new(code, kind, Severity::Warning, range, message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sev = match self.severity {
            Severity::Error => "Fehler",
            Severity::Warning => "Warnung",
            Severity::Info => "Hinweis",
        };
        write!(
            f,
            "{} [D{:04}] {}: {}",
            self.range, self.code, sev, self.message
        )
    }
}

/// Accumulates diagnostics for one translation unit across every stage.
///
/// `faulty()` becomes `true` the moment any `Severity::Error` diagnostic is
/// pushed; downstream stages check it to decide whether to suppress final
/// code emission while still running for additional diagnostic coverage
/// (spec §2 "Data flow").
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
    faulty: bool,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        if diagnostic.severity == Severity::Error {
            self.faulty = true;
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn faulty(&self) -> bool {
        self.faulty
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}
