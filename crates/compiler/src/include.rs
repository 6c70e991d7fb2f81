//! `Binde "<path>" ein.` splicing (spec §4.1 "Include").
//!
//! The scanner tokenizes one file at a time and has no notion of the
//! filesystem beyond the name it was constructed with; this module is the
//! "outer scanner delegates to an inner scanner until EOF, then resumes"
//! mechanism spec §4.1 describes, implemented as a post-pass over the
//! already-tokenized stream rather than threading a scanner stack through
//! [`Scanner`] itself (spec §9 "Include cycles & alias tables" names the
//! scanner-stack shape as the intended re-architecture; splicing finished
//! token vectors gets the same externally-observable behavior today
//! without `Scanner` needing to know about paths or `DDPPATH` at all).
//!
//! A literal starting with `Duden` resolves relative to the installation
//! root (`DDPPATH/Duden`); any other literal resolves relative to the
//! including file's own directory. A set of canonicalised absolute paths
//! prevents double-inclusion — a repeated `Binde` is simply dropped.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use ddp_core::{Diagnostic, DiagnosticKind, DiagnosticSink, Keyword, Token, TokenKind};

use crate::scanner::Scanner;

/// Tokenizes `path` and recursively splices in every `Binde ... ein.`
/// target it contains, returning one flat token stream (a single
/// trailing `Eof`) as if the whole tree had been written in one file.
pub fn tokenize_with_includes(
    path: &Path,
    ddppath: Option<&Path>,
    strict_capitalization: bool,
    sink: &mut DiagnosticSink,
) -> Vec<Token> {
    let mut included = HashSet::new();
    let mut tokens = tokenize_one(path, strict_capitalization, sink, &mut included);
    resolve_includes(&mut tokens, path, ddppath, strict_capitalization, sink, &mut included);
    tokens
}

fn tokenize_one(
    path: &Path,
    strict_capitalization: bool,
    sink: &mut DiagnosticSink,
    included: &mut HashSet<PathBuf>,
) -> Vec<Token> {
    if let Ok(canon) = path.canonicalize() {
        included.insert(canon);
    }
    let source = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            sink.push(Diagnostic::error(
                7,
                DiagnosticKind::Lex,
                ddp_core::Range::point(ddp_core::SourcePosition::start_of(crate::scanner::file_name_rc(path))),
                format!("Datei konnte nicht gelesen werden: {e}"),
            ));
            return vec![Token {
                kind: TokenKind::Eof,
                literal_text: String::new(),
                indent_level: 0,
                file: crate::scanner::file_name_rc(path),
                range: ddp_core::Range::point(ddp_core::SourcePosition::start_of(crate::scanner::file_name_rc(path))),
            }];
        }
    };
    let mut scanner = Scanner::new(&source, crate::scanner::file_name_rc(path), strict_capitalization);
    scanner.tokenize(sink)
}

/// Walks `tokens` looking for `Binde "<path>" ein .` sequences and
/// replaces each with the included file's own (already-include-resolved)
/// tokens, dropping that file's trailing `Eof`. Runs to a fixed point by
/// scanning left to right once, since every replacement only inserts
/// tokens after the current position.
fn resolve_includes(
    tokens: &mut Vec<Token>,
    including_file: &Path,
    ddppath: Option<&Path>,
    strict_capitalization: bool,
    sink: &mut DiagnosticSink,
    included: &mut HashSet<PathBuf>,
) {
    let base_dir = including_file.parent().unwrap_or_else(|| Path::new("."));
    let mut i = 0;
    while i < tokens.len() {
        let is_binde = matches!(tokens[i].kind, TokenKind::Keyword(Keyword::Binde));
        if !is_binde {
            i += 1;
            continue;
        }
        let Some(TokenKind::String(literal)) = tokens.get(i + 1).map(|t| t.kind.clone()) else {
            i += 1;
            continue;
        };
        let is_ein = matches!(tokens.get(i + 2).map(|t| &t.kind), Some(TokenKind::Keyword(Keyword::Ein)));
        let is_dot = matches!(tokens.get(i + 3).map(|t| &t.kind), Some(TokenKind::Dot));
        if !(is_ein && is_dot) {
            i += 1;
            continue;
        }

        let target = resolve_include_path(&literal, base_dir, ddppath);
        let splice: Vec<Token> = match target {
            Some(path) => {
                let canon = path.canonicalize().unwrap_or_else(|_| path.clone());
                if included.contains(&canon) {
                    Vec::new()
                } else {
                    let mut inner = tokenize_one(&path, strict_capitalization, sink, included);
                    inner.pop(); // drop the inner Eof
                    resolve_includes(&mut inner, &path, ddppath, strict_capitalization, sink, included);
                    inner
                }
            }
            None => {
                sink.push(Diagnostic::error(
                    8,
                    DiagnosticKind::Lex,
                    tokens[i].range.clone(),
                    format!("eingebundene Datei nicht gefunden: {literal}"),
                ));
                Vec::new()
            }
        };

        let spliced_len = splice.len();
        tokens.splice(i..i + 4, splice);
        i += spliced_len;
    }
}

fn resolve_include_path(literal: &str, base_dir: &Path, ddppath: Option<&Path>) -> Option<PathBuf> {
    let candidate = if let Some(rest) = literal.strip_prefix("Duden") {
        let ddppath = ddppath?;
        ddppath.join("Duden").join(rest.trim_start_matches(['/', '\\']))
    } else {
        base_dir.join(literal)
    };
    if candidate.is_file() {
        Some(candidate)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn splices_included_file_inline() {
        let dir = tempfile::tempdir().unwrap();
        let included = dir.path().join("gruss.ddp");
        std::fs::write(&included, "Schreibe \"Hallo\".").unwrap();
        let main = dir.path().join("main.ddp");
        let mut f = std::fs::File::create(&main).unwrap();
        writeln!(f, "Binde \"gruss.ddp\" ein.\nSchreibe \"!\".").unwrap();
        drop(f);

        let mut sink = DiagnosticSink::default();
        let tokens = tokenize_with_includes(&main, None, false, &mut sink);
        assert!(!sink.faulty(), "{:?}", sink.diagnostics());
        let schreibe_count = tokens
            .iter()
            .filter(|t| matches!(t.kind, TokenKind::Keyword(Keyword::Schreibe)))
            .count();
        assert_eq!(schreibe_count, 2);
    }

    #[test]
    fn double_include_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let included = dir.path().join("gruss.ddp");
        std::fs::write(&included, "Schreibe \"Hallo\".").unwrap();
        let main = dir.path().join("main.ddp");
        std::fs::write(
            &main,
            "Binde \"gruss.ddp\" ein.\nBinde \"gruss.ddp\" ein.\nSchreibe \"!\".",
        )
        .unwrap();

        let mut sink = DiagnosticSink::default();
        let tokens = tokenize_with_includes(&main, None, false, &mut sink);
        assert!(!sink.faulty(), "{:?}", sink.diagnostics());
        let schreibe_count = tokens
            .iter()
            .filter(|t| matches!(t.kind, TokenKind::Keyword(Keyword::Schreibe)))
            .count();
        assert_eq!(schreibe_count, 2);
    }

    #[test]
    fn missing_include_is_diagnosed() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.ddp");
        std::fs::write(&main, "Binde \"fehlt.ddp\" ein.").unwrap();

        let mut sink = DiagnosticSink::default();
        tokenize_with_includes(&main, None, false, &mut sink);
        assert!(sink.faulty());
    }
}
