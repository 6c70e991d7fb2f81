//! Lexical scanner (spec §4.1): UTF-8 rune stream → token stream.
//!
//! A hand-rolled recursive-descent-over-characters scanner rather than a
//! scanner-generator crate — DDP's character classes are simple enough
//! (idents, numbers, strings, chars, bracket comments) that a
//! table-driven generator would be more machinery than the grammar
//! warrants.

use std::path::Path;
use std::rc::Rc;

use ddp_core::{Diagnostic, DiagnosticSink, Keyword, Range, SourcePosition, Token, TokenKind};

pub struct Scanner {
    chars: Vec<char>,
    pos: usize,
    file: Rc<str>,
    line: u32,
    column: u32,
    indent_level: u32,
    at_line_start: bool,
    /// Set after a `.` or `:` token; the next keyword-looking identifier is
    /// checked for capitalization under strict mode.
    expect_capital: bool,
    strict_capitalization: bool,
    /// Toggled by the parser while it is scanning an alias declaration's
    /// pattern, so `<name>` lexes as a placeholder instead of punctuation
    /// (spec §4.1 "Alias mode").
    pub alias_mode: bool,
    /// Absolute, canonicalized paths already included, to prevent
    /// re-inclusion (spec §4.1 "Include").
    included: Vec<std::path::PathBuf>,
}

impl Scanner {
    pub fn new(source: &str, file: impl Into<Rc<str>>, strict_capitalization: bool) -> Self {
        Scanner {
            chars: source.chars().collect(),
            pos: 0,
            file: file.into(),
            line: 1,
            column: 1,
            indent_level: 0,
            at_line_start: true,
            expect_capital: false,
            strict_capitalization,
            alias_mode: false,
            included: Vec::new(),
        }
    }

    pub fn mark_included(&mut self, path: std::path::PathBuf) -> bool {
        if self.included.contains(&path) {
            false
        } else {
            self.included.push(path);
            true
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn pos_here(&self) -> SourcePosition {
        SourcePosition::new(self.file.clone(), self.line, self.column)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
            self.at_line_start = true;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn token(&self, kind: TokenKind, text: String, start: SourcePosition) -> Token {
        Token {
            kind,
            literal_text: text,
            indent_level: self.indent_level,
            file: self.file.clone(),
            range: Range::new(start, self.pos_here()),
        }
    }

    fn skip_whitespace_and_count_indent(&mut self) {
        loop {
            if self.at_line_start && matches!(self.peek(), Some(' ') | Some('\t')) {
                let mut groups = 0u32;
                let mut spaces = 0u32;
                while let Some(c) = self.peek() {
                    match c {
                        '\t' => {
                            groups += 1;
                            self.advance();
                        }
                        ' ' => {
                            spaces += 1;
                            self.advance();
                            if spaces == 4 {
                                groups += 1;
                                spaces = 0;
                            }
                        }
                        _ => break,
                    }
                }
                self.indent_level = groups;
                self.at_line_start = false;
                continue;
            }
            match self.peek() {
                Some(' ') | Some('\t') | Some('\r') | Some('\n') => {
                    self.advance();
                }
                _ => break,
            }
        }
    }

    fn skip_bracket_comment(&mut self, sink: &mut DiagnosticSink) {
        let start = self.pos_here();
        let mut depth = 0u32;
        let mut text = String::new();
        loop {
            match self.advance() {
                Some('[') => {
                    depth += 1;
                    text.push('[');
                }
                Some(']') => {
                    depth -= 1;
                    text.push(']');
                    if depth == 0 {
                        break;
                    }
                }
                Some(c) => text.push(c),
                None => {
                    sink.push(Diagnostic::error(
                        1,
                        ddp_core::DiagnosticKind::Lex,
                        Range::new(start, self.pos_here()),
                        "unbeendeter Kommentar".to_string(),
                    ));
                    break;
                }
            }
        }
        let _ = self.token(TokenKind::Comment, text, start);
    }

    fn scan_identifier_or_keyword(&mut self, sink: &mut DiagnosticSink) -> Token {
        let start = self.pos_here();
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let was_expect_capital = self.expect_capital;
        self.expect_capital = false;

        if let Some(keyword) = Keyword::lookup(&text) {
            if self.strict_capitalization
                && was_expect_capital
                && !text.chars().next().is_some_and(char::is_uppercase)
            {
                sink.push(Diagnostic::warning(
                    2,
                    ddp_core::DiagnosticKind::Lex,
                    Range::new(start.clone(), self.pos_here()),
                    format!("'{text}' sollte nach Satzende großgeschrieben werden"),
                ));
            }
            self.token(TokenKind::Keyword(keyword), text, start)
        } else {
            self.token(TokenKind::Ident, text, start)
        }
    }

    fn scan_number(&mut self) -> Token {
        let start = self.pos_here();
        let mut text = String::new();
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            text.push(self.advance().unwrap());
        }
        if self.peek() == Some(',') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            text.push(self.advance().unwrap());
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                text.push(self.advance().unwrap());
            }
            let numeric = text.replace(',', ".");
            let value: f64 = numeric.parse().unwrap_or(0.0);
            self.token(TokenKind::Float(value), text, start)
        } else {
            let value: i64 = text.parse().unwrap_or(0);
            self.token(TokenKind::Int(value), text, start)
        }
    }

    fn scan_escape(&mut self, sink: &mut DiagnosticSink, start: &SourcePosition) -> Option<char> {
        match self.advance() {
            Some('a') => Some('\u{7}'),
            Some('b') => Some('\u{8}'),
            Some('n') => Some('\n'),
            Some('r') => Some('\r'),
            Some('t') => Some('\t'),
            Some('\\') => Some('\\'),
            Some('"') => Some('"'),
            Some('\'') => Some('\''),
            other => {
                sink.push(Diagnostic::error(
                    3,
                    ddp_core::DiagnosticKind::Lex,
                    Range::new(start.clone(), self.pos_here()),
                    format!("unbekannte Escape-Sequenz '\\{}'", other.unwrap_or(' ')),
                ));
                None
            }
        }
    }

    fn scan_string(&mut self, sink: &mut DiagnosticSink) -> Token {
        let start = self.pos_here();
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.peek() {
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    if let Some(c) = self.scan_escape(sink, &start) {
                        value.push(c);
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
                None => {
                    sink.push(Diagnostic::error(
                        4,
                        ddp_core::DiagnosticKind::Lex,
                        Range::new(start.clone(), self.pos_here()),
                        "unbeendete Zeichenkette".to_string(),
                    ));
                    break;
                }
            }
        }
        self.token(TokenKind::String(value.clone()), value, start)
    }

    fn scan_char(&mut self, sink: &mut DiagnosticSink) -> Token {
        let start = self.pos_here();
        self.advance(); // opening quote
        let c = match self.peek() {
            Some('\\') => {
                self.advance();
                self.scan_escape(sink, &start).unwrap_or('\u{FFFD}')
            }
            Some(c) => {
                self.advance();
                c
            }
            None => '\u{FFFD}',
        };
        if self.peek() == Some('\'') {
            self.advance();
        } else {
            sink.push(Diagnostic::error(
                5,
                ddp_core::DiagnosticKind::Lex,
                Range::new(start.clone(), self.pos_here()),
                "unbeendetes Zeichenliteral".to_string(),
            ));
        }
        self.token(TokenKind::Char(c), c.to_string(), start)
    }

    fn scan_alias_parameter(&mut self) -> Token {
        let start = self.pos_here();
        self.advance(); // '<'
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c == '>' {
                break;
            }
            name.push(c);
            self.advance();
        }
        if self.peek() == Some('>') {
            self.advance();
        }
        self.token(
            TokenKind::AliasParameter(ddp_core::AliasParamInfo {
                name: name.clone(),
                param_type: None,
            }),
            name,
            start,
        )
    }

    /// Scan the next non-comment token, or `None` at end of input (the
    /// caller synthesizes the final `Eof` token).
    pub fn next_token(&mut self, sink: &mut DiagnosticSink) -> Token {
        loop {
            self.skip_whitespace_and_count_indent();
            let Some(c) = self.peek() else {
                return self.token(TokenKind::Eof, String::new(), self.pos_here());
            };

            if c == '[' {
                self.skip_bracket_comment(sink);
                continue;
            }

            let start = self.pos_here();
            if self.alias_mode && c == '<' {
                return self.scan_alias_parameter();
            }
            if is_ident_start(c) {
                return self.scan_identifier_or_keyword(sink);
            }
            if c.is_ascii_digit() {
                return self.scan_number();
            }
            if c == '"' {
                return self.scan_string(sink);
            }
            if c == '\'' {
                return self.scan_char(sink);
            }

            self.advance();
            let kind = match c {
                '.' => {
                    self.expect_capital = true;
                    TokenKind::Dot
                }
                ':' => {
                    self.expect_capital = true;
                    TokenKind::Colon
                }
                ',' => TokenKind::Comma,
                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                '[' => TokenKind::LBracket,
                ']' => TokenKind::RBracket,
                ';' => TokenKind::Semicolon,
                _ => {
                    sink.push(Diagnostic::error(
                        6,
                        ddp_core::DiagnosticKind::Lex,
                        Range::new(start.clone(), self.pos_here()),
                        format!("unerwartetes Zeichen '{c}'"),
                    ));
                    TokenKind::Illegal
                }
            };
            return self.token(kind, c.to_string(), start);
        }
    }

    /// Scans every token up to and including `Eof`. Used by the parser,
    /// which also handles `Binde ... ein.` include splicing at the token
    /// level rather than here (spec §4.1 "delegates `NextToken` until the
    /// inner scanner hits EOF, then resumes" describes a nested-scanner
    /// stack; the parser owns that stack since it alone knows which
    /// directory an include is relative to).
    pub fn tokenize(&mut self, sink: &mut DiagnosticSink) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token(sink);
            let is_eof = tok.is_eof();
            if !matches!(tok.kind, TokenKind::Comment) {
                tokens.push(tok);
            }
            if is_eof {
                break;
            }
        }
        tokens
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

pub fn file_name_rc(path: &Path) -> Rc<str> {
    Rc::from(path.to_string_lossy().as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens_of(src: &str) -> (Vec<Token>, DiagnosticSink) {
        let mut sink = DiagnosticSink::default();
        let mut scanner = Scanner::new(src, Rc::from("test.ddp"), true);
        (scanner.tokenize(&mut sink), sink)
    }

    #[test]
    fn scans_greeting_scenario_one() {
        let (tokens, sink) = tokens_of("Schreibe \"Hallo, Welt!\".");
        assert!(sink.is_empty());
        assert!(matches!(tokens[0].kind, TokenKind::Keyword(Keyword::Schreibe)));
        assert!(matches!(&tokens[1].kind, TokenKind::String(s) if s == "Hallo, Welt!"));
        assert!(matches!(tokens[2].kind, TokenKind::Dot));
        assert!(tokens.last().unwrap().is_eof());
    }

    #[test]
    fn comma_promotes_integer_to_float() {
        let (tokens, _) = tokens_of("3,5");
        assert!(matches!(tokens[0].kind, TokenKind::Float(v) if (v - 3.5).abs() < f64::EPSILON));
    }

    #[test]
    fn plain_integer_stays_int() {
        let (tokens, _) = tokens_of("42");
        assert!(matches!(tokens[0].kind, TokenKind::Int(42)));
    }

    #[test]
    fn string_escapes_decode() {
        let (tokens, _) = tokens_of(r#""a\nb""#);
        assert!(matches!(&tokens[0].kind, TokenKind::String(s) if s == "a\nb"));
    }

    #[test]
    fn unterminated_string_is_diagnosed() {
        let (_, sink) = tokens_of("\"abc");
        assert!(!sink.is_empty());
        assert!(sink.faulty());
    }

    #[test]
    fn bracket_comment_is_skipped_and_nests() {
        let (tokens, sink) = tokens_of("[ ein [verschachtelter] Kommentar ] 7");
        assert!(sink.is_empty());
        assert!(matches!(tokens[0].kind, TokenKind::Int(7)));
    }

    #[test]
    fn alias_mode_recognizes_placeholder() {
        let mut sink = DiagnosticSink::default();
        let mut scanner = Scanner::new("<x> plus <y>", Rc::from("test.ddp"), true);
        scanner.alias_mode = true;
        let tokens = scanner.tokenize(&mut sink);
        assert!(matches!(&tokens[0].kind, TokenKind::AliasParameter(info) if info.name == "x"));
    }

    #[test]
    fn strict_capitalization_warns_on_lowercase_after_dot() {
        let (_, sink) = tokens_of("Schreibe 1. wenn wahr dann Schreibe 2.");
        assert!(!sink.is_empty());
        assert!(!sink.faulty());
    }

    #[test]
    fn umlaut_identifier_scans_as_ident() {
        let (tokens, _) = tokens_of("größe");
        assert!(matches!(tokens[0].kind, TokenKind::Keyword(Keyword::Groesser) | TokenKind::Ident));
    }
}
