//! DDP Core: the token model, source positions, and diagnostics shared by
//! every stage of the DDP compiler (scanner, parser, resolver, type
//! checker, IR emitter).
//!
//! This crate has no knowledge of the AST, the runtime's heap value
//! layouts, or code generation — it is the small, dependency-free
//! foundation the rest of the pipeline builds on.
//!
//! # Modules
//!
//! - `position`: `SourcePosition` / `Range`
//! - `types`: the five DDP primitive types plus `Liste von <primitive>`
//! - `token`: `Token`, `TokenKind`, keyword table
//! - `diagnostic`: `Diagnostic`, `Severity`, `DiagnosticSink`

pub mod diagnostic;
pub mod position;
pub mod token;
pub mod types;

pub use diagnostic::{Diagnostic, DiagnosticKind, DiagnosticSink, Severity};
pub use position::{Range, SourcePosition};
pub use token::{AliasParamInfo, Keyword, Token, TokenKind};
pub use types::{Primitive, Type};
