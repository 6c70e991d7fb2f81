//! Recursive-descent parser (spec §4.2).
//!
//! Builds function/alias headers into a global table first so forward
//! references within a file are allowed; resolves call sites against the
//! alias table by greedy longest-pattern match (spec §4.2 "Alias
//! resolution for calls", §9 "Alias pattern matching" — implemented here
//! as a linear scan over registered patterns rather than a literal trie,
//! since DDP programs register at most a few dozen aliases, far below
//! where a trie's construction cost would pay for itself).
//!
//! On a syntax error the parser emits a diagnostic, yields a `Bad*`
//! sentinel, and skips to the next `.` to resynchronise (spec §4.2 "On
//! syntax errors").

use std::cell::RefCell;
use std::rc::Rc;

use ddp_core::{Diagnostic, DiagnosticKind, DiagnosticSink, Keyword, Primitive, Range, Token, TokenKind, Type};

use crate::ast::*;

/// One registered alias: a literal/param pattern plus the function it
/// resolves to (spec §3 "Alias table").
#[derive(Clone)]
struct AliasEntry {
    pattern: Vec<AliasPatternPart>,
    decl: DeclRef,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    global: Vec<DeclRef>,
    aliases: Vec<AliasEntry>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            pos: 0,
            global: Vec::new(),
            aliases: Vec::new(),
        }
    }

    // ---- token stream helpers ----------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn check_kw(&self, kw: Keyword) -> bool {
        matches!(&self.peek().kind, TokenKind::Keyword(k) if *k == kw)
    }

    fn eat_kw(&mut self, kw: Keyword) -> bool {
        if self.check_kw(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, sink: &mut DiagnosticSink, what: &str) -> bool {
        if self.eat(kind) {
            true
        } else {
            self.error(sink, 100, format!("erwartet: {what}"));
            false
        }
    }

    fn error(&mut self, sink: &mut DiagnosticSink, code: u32, message: String) {
        sink.push(Diagnostic::error(code, DiagnosticKind::Syntax, self.peek().range.clone(), message));
    }

    /// Skip tokens up to and including the next `.`, the statement
    /// delimiter, to resynchronise after an error (spec §4.2).
    fn recover_to_dot(&mut self) {
        while !self.peek().is_eof() {
            if matches!(self.peek().kind, TokenKind::Dot) {
                self.advance();
                return;
            }
            self.advance();
        }
    }

    fn prev_range(&self) -> Range {
        self.tokens[self.pos.saturating_sub(1)].range.clone()
    }

    // ---- types ----------------------------------------------------------

    fn parse_type(&mut self, sink: &mut DiagnosticSink) -> Option<Type> {
        if self.eat_kw(Keyword::Liste) {
            self.expect(&TokenKind::Keyword(Keyword::Von), sink, "'von'");
            let elem = self.parse_primitive(sink)?;
            return Some(Type::List(elem));
        }
        self.parse_primitive(sink).map(Type::Primitive)
    }

    fn parse_primitive(&mut self, sink: &mut DiagnosticSink) -> Option<Primitive> {
        let p = match &self.peek().kind {
            TokenKind::Keyword(Keyword::Zahl) => Primitive::Zahl,
            TokenKind::Keyword(Keyword::Kommazahl) => Primitive::Kommazahl,
            TokenKind::Keyword(Keyword::Boolean) => Primitive::Boolean,
            TokenKind::Keyword(Keyword::Buchstabe) => Primitive::Buchstabe,
            TokenKind::Keyword(Keyword::Text) => Primitive::Text,
            _ => {
                self.error(sink, 101, "erwartet: ein Typname".to_string());
                return None;
            }
        };
        self.advance();
        Some(p)
    }

    // ---- program ----------------------------------------------------------

    pub fn parse(mut self, sink: &mut DiagnosticSink) -> Program {
        self.collect_headers(sink);
        let mut top_level = Vec::new();
        while !self.peek().is_eof() {
            top_level.push(self.parse_statement(sink));
        }
        Program { top_level }
    }

    /// First pass: register every top-level `Funktion`'s signature (name,
    /// params, return type) so calls earlier in the file can resolve to
    /// functions declared later (spec §4.2 "Builds declarations first into
    /// the global scope"). Uses a throwaway sink since malformed headers
    /// are re-diagnosed during the real parse below.
    fn collect_headers(&mut self, sink: &mut DiagnosticSink) {
        let saved = self.pos;
        let mut scratch = DiagnosticSink::default();
        while !self.peek().is_eof() {
            if self.check_kw(Keyword::Funktion) {
                if let Some(decl) = self.parse_function_header(&mut scratch) {
                    self.global.push(decl.clone());
                    let name = match &*decl.borrow() {
                        Decl::Func(f) => f.name.clone(),
                        _ => unreachable!(),
                    };
                    self.aliases.push(AliasEntry {
                        pattern: vec![AliasPatternPart::Literal(name)],
                        decl,
                    });
                }
                self.skip_to_top_level_boundary();
            } else {
                self.advance();
            }
        }
        let _ = sink;
        self.pos = saved;
    }

    /// After a pre-scanned header, skip past `extern "...".` or the
    /// `:`-introduced body, without trying to understand the body's
    /// structure (the real parse below re-derives it in full).
    fn skip_to_top_level_boundary(&mut self) {
        if self.eat_kw(Keyword::Extern) {
            while !self.peek().is_eof() && !matches!(self.peek().kind, TokenKind::Dot) {
                self.advance();
            }
            if matches!(self.peek().kind, TokenKind::Dot) {
                self.advance();
            }
            return;
        }
        if !matches!(self.peek().kind, TokenKind::Colon) {
            return;
        }
        let header_indent = self.prev_range_indent();
        self.advance(); // ':'
        while !self.peek().is_eof() && self.peek().indent_level > header_indent {
            self.advance();
        }
    }

    fn prev_range_indent(&self) -> u32 {
        self.tokens[self.pos.saturating_sub(1)].indent_level
    }

    /// Parses just `Funktion <name> mit <Typ> <param> (, <Typ> <param>)* gibt <Typ> zurück`
    /// — the signature, without consuming the body/extern clause.
    fn parse_function_header(&mut self, sink: &mut DiagnosticSink) -> Option<DeclRef> {
        let start_range = self.peek().range.clone();
        self.eat_kw(Keyword::Funktion);
        let name = self.parse_name(sink)?;
        let mut params = Vec::new();
        if self.eat_kw(Keyword::Mit) {
            loop {
                let is_ref = self.eat_kw(Keyword::Als); // `als Referenz` shorthand: `als` marks the following param by-reference
                let ty = self.parse_type(sink)?;
                let pname = self.parse_name(sink)?;
                params.push(Param {
                    name: pname,
                    param_type: ty,
                    is_ref,
                });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let return_type = if self.eat_kw(Keyword::Gibt) {
            let ty = self.parse_type(sink)?;
            self.expect(&TokenKind::Keyword(Keyword::Zurueck), sink, "'zurück'");
            Some(ty)
        } else {
            None
        };
        Some(Rc::new(RefCell::new(Decl::Func(FuncDecl {
            name,
            params,
            return_type,
            body: None,
            extern_file: None,
            alias_pattern: Vec::new(),
            range: start_range,
        }))))
    }

    fn parse_name(&mut self, sink: &mut DiagnosticSink) -> Option<String> {
        if matches!(self.peek().kind, TokenKind::Ident) {
            Some(self.advance().literal_text)
        } else {
            self.error(sink, 102, "erwartet: ein Bezeichner".to_string());
            None
        }
    }

    // ---- statements ----------------------------------------------------------

    fn parse_statement(&mut self, sink: &mut DiagnosticSink) -> Stmt {
        let start = self.peek().range.clone();

        if self.check_kw(Keyword::Die) || self.check_kw(Keyword::Der) || self.check_kw(Keyword::Das) {
            return self.parse_var_decl(sink, start);
        }
        if self.check_kw(Keyword::Funktion) {
            return self.parse_function_decl(sink, start);
        }
        if self.check_kw(Keyword::Alias) {
            return self.parse_alias_decl(sink, start);
        }
        if self.eat_kw(Keyword::Schreibe) {
            let value = self.parse_expr(sink);
            self.expect(&TokenKind::Dot, sink, "'.'");
            let range = start.merge(&self.prev_range());
            return Stmt::Expr(Expr::FuncCall {
                name: "Schreibe".to_string(),
                declaration: None,
                args: vec![("wert".to_string(), value)],
                range,
            });
        }
        if self.eat_kw(Keyword::Setze) {
            let target = self.parse_expr(sink);
            self.expect(&TokenKind::Keyword(Keyword::Auf), sink, "'auf'");
            let value = self.parse_expr(sink);
            self.expect(&TokenKind::Dot, sink, "'.'");
            if !target.is_assignable() {
                self.error(sink, 103, "Zuweisungsziel muss ein Bezeichner oder Index sein".to_string());
            }
            return Stmt::Assign {
                target,
                value,
                range: start,
            };
        }
        if self.check_kw(Keyword::Wenn) {
            return self.parse_if(sink, start);
        }
        if self.check_kw(Keyword::Solange) {
            return self.parse_while(sink, start);
        }
        if self.check_kw(Keyword::Mache) {
            return self.parse_do_while(sink, start);
        }
        if self.check_kw(Keyword::Wiederhole) {
            return self.parse_repeat(sink, start);
        }
        if self.check_kw(Keyword::Fuer) {
            return self.parse_for(sink, start);
        }
        if self.check_kw(Keyword::Rueckgabe) {
            return self.parse_return(sink, start);
        }

        let expr = self.parse_expr(sink);
        if self.expect(&TokenKind::Dot, sink, "'.'") {
            Stmt::Expr(expr)
        } else {
            self.recover_to_dot();
            Stmt::Bad(start)
        }
    }

    /// Consumes a `:`-introduced body consisting of every following
    /// statement whose line is indented deeper than the header line that
    /// introduced the block (spec §4.1 "indentation is advisory", §4.2
    /// "Block"). Indentation is the only delimiter DDP statement blocks
    /// have, since every statement already ends in its own `.`.
    fn parse_block(&mut self, sink: &mut DiagnosticSink) -> Block {
        let start = self.peek().range.clone();
        let header_indent = self.peek().indent_level;
        self.expect(&TokenKind::Colon, sink, "':'");
        let mut statements = Vec::new();
        while !self.peek().is_eof() && self.peek().indent_level > header_indent {
            statements.push(self.parse_statement(sink));
        }
        let end = if statements.is_empty() { start.clone() } else { self.prev_range() };
        Block {
            statements,
            range: start.merge(&end),
        }
    }

    fn parse_var_decl(&mut self, sink: &mut DiagnosticSink, start: Range) -> Stmt {
        self.advance(); // Die/Der/Das
        let Some(declared_type) = self.parse_type(sink) else {
            self.recover_to_dot();
            return Stmt::Bad(start);
        };
        let Some(name) = self.parse_name(sink) else {
            self.recover_to_dot();
            return Stmt::Bad(start);
        };
        self.expect(&TokenKind::Keyword(Keyword::Ist), sink, "'ist'");
        let init = Some(self.parse_expr(sink));
        self.expect(&TokenKind::Dot, sink, "'.'");
        let range = start.merge(&self.prev_range());
        let decl = Rc::new(RefCell::new(Decl::Var(VarDecl {
            name,
            declared_type,
            init,
            range,
            is_synthetic: false,
        })));
        Stmt::Decl(decl)
    }

    fn parse_function_decl(&mut self, sink: &mut DiagnosticSink, start: Range) -> Stmt {
        // Re-derive the signature and fill in the already-registered
        // forward-reference stub's body/extern clause.
        let Some(stub) = self.parse_function_header(sink) else {
            self.recover_to_dot();
            return Stmt::Bad(start);
        };
        let name = match &*stub.borrow() {
            Decl::Func(f) => f.name.clone(),
            _ => unreachable!(),
        };
        let decl = self
            .global
            .iter()
            .find(|d| matches!(&*d.borrow(), Decl::Func(f) if f.name == name))
            .cloned()
            .unwrap_or(stub);

        if self.eat_kw(Keyword::Extern) {
            if let TokenKind::String(path) = self.peek().kind.clone() {
                self.advance();
                if let Decl::Func(f) = &mut *decl.borrow_mut() {
                    f.extern_file = Some(path);
                }
            }
            self.expect(&TokenKind::Dot, sink, "'.'");
        } else {
            let body = self.parse_block(sink);
            if let Decl::Func(f) = &mut *decl.borrow_mut() {
                f.body = Some(body);
            }
        }
        Stmt::Decl(decl)
    }

    /// `Alias "<pattern>" ist <funcname>.` registers an additional call
    /// pattern for an already-declared function. `<name>` holes in the
    /// pattern text are resolved against the target's declared parameters
    /// (spec §4.1 "Alias mode", §3 "alias_info carries the expected
    /// parameter type").
    fn parse_alias_decl(&mut self, sink: &mut DiagnosticSink, start: Range) -> Stmt {
        self.advance(); // Alias
        let pattern_text = if let TokenKind::String(s) = self.peek().kind.clone() {
            self.advance();
            s
        } else {
            self.error(sink, 104, "erwartet: ein Aliasmuster als Zeichenkette".to_string());
            self.recover_to_dot();
            return Stmt::Bad(start);
        };
        self.expect(&TokenKind::Keyword(Keyword::Ist), sink, "'ist'");
        let Some(name) = self.parse_name(sink) else {
            self.recover_to_dot();
            return Stmt::Bad(start);
        };
        self.expect(&TokenKind::Dot, sink, "'.'");

        let Some(target) = self
            .global
            .iter()
            .find(|d| matches!(&*d.borrow(), Decl::Func(f) if f.name == name))
            .cloned()
        else {
            self.error(sink, 105, format!("unbekannte Funktion '{name}' in Alias"));
            return Stmt::Bad(start);
        };
        let params: Vec<Param> = match &*target.borrow() {
            Decl::Func(f) => f.params.clone(),
            _ => Vec::new(),
        };
        let pattern = parse_alias_pattern(&pattern_text, &params, sink, &start);
        if let Decl::Func(f) = &mut *target.borrow_mut() {
            f.alias_pattern = pattern.clone();
        }
        self.aliases.push(AliasEntry { pattern, decl: target });
        Stmt::Block(Block {
            statements: Vec::new(),
            range: start,
        })
    }

    fn parse_if(&mut self, sink: &mut DiagnosticSink, start: Range) -> Stmt {
        self.advance(); // wenn
        let cond = self.parse_expr(sink);
        self.expect(&TokenKind::Keyword(Keyword::Dann), sink, "'dann'");
        let then_branch = self.parse_block(sink);
        let else_branch = if self.eat_kw(Keyword::Sonst) {
            Some(self.parse_block(sink))
        } else {
            None
        };
        Stmt::If {
            cond,
            then_branch,
            else_branch,
            range: start,
        }
    }

    fn parse_while(&mut self, sink: &mut DiagnosticSink, start: Range) -> Stmt {
        self.advance(); // solange
        let cond = self.parse_expr(sink);
        self.expect(&TokenKind::Keyword(Keyword::Mache), sink, "'mache'");
        let body = self.parse_block(sink);
        Stmt::While { cond, body, range: start }
    }

    fn parse_do_while(&mut self, sink: &mut DiagnosticSink, start: Range) -> Stmt {
        self.advance(); // mache
        let body = self.parse_block(sink);
        self.expect(&TokenKind::Keyword(Keyword::Solange), sink, "'solange'");
        let cond = self.parse_expr(sink);
        self.expect(&TokenKind::Dot, sink, "'.'");
        Stmt::DoWhile { body, cond, range: start }
    }

    fn parse_repeat(&mut self, sink: &mut DiagnosticSink, start: Range) -> Stmt {
        self.advance(); // wiederhole
        let count = self.parse_expr(sink);
        self.expect(&TokenKind::Keyword(Keyword::Mal), sink, "'mal'");
        let body = self.parse_block(sink);
        Stmt::RepeatNTimes { count, body, range: start }
    }

    fn parse_for(&mut self, sink: &mut DiagnosticSink, start: Range) -> Stmt {
        self.advance(); // für
        if !(self.eat_kw(Keyword::Jede) || self.eat_kw(Keyword::Jeden)) {
            self.error(sink, 106, "erwartet: 'jede'/'jeden'".to_string());
        }
        let Some(elem_type) = self.parse_type(sink) else {
            self.recover_to_dot();
            return Stmt::Bad(start);
        };
        let Some(name) = self.parse_name(sink) else {
            self.recover_to_dot();
            return Stmt::Bad(start);
        };
        if self.eat_kw(Keyword::Von) {
            let from = self.parse_expr(sink);
            self.expect(&TokenKind::Keyword(Keyword::Bis), sink, "'bis'");
            let to = self.parse_expr(sink);
            let step = if self.eat_kw(Keyword::Schritt) {
                Some(self.parse_expr(sink))
            } else {
                None
            };
            self.expect(&TokenKind::Keyword(Keyword::Mache), sink, "'mache'");
            let body = self.parse_block(sink);
            let counter = Rc::new(RefCell::new(Decl::Var(VarDecl {
                name,
                declared_type: elem_type,
                init: None,
                range: start.clone(),
                is_synthetic: true,
            })));
            Stmt::ForCounting {
                counter,
                from,
                to,
                step,
                body,
                range: start,
            }
        } else {
            self.expect(&TokenKind::Keyword(Keyword::In), sink, "'in'");
            let iterable = self.parse_expr(sink);
            self.expect(&TokenKind::Keyword(Keyword::Mache), sink, "'mache'");
            let body = self.parse_block(sink);
            let element = Rc::new(RefCell::new(Decl::Var(VarDecl {
                name,
                declared_type: elem_type,
                init: None,
                range: start.clone(),
                is_synthetic: true,
            })));
            Stmt::ForEach {
                element,
                iterable,
                body,
                range: start,
            }
        }
    }

    fn parse_return(&mut self, sink: &mut DiagnosticSink, start: Range) -> Stmt {
        self.advance(); // Rückgabe
        let value = if matches!(self.peek().kind, TokenKind::Dot) {
            None
        } else {
            Some(self.parse_expr(sink))
        };
        self.expect(&TokenKind::Dot, sink, "'.'");
        Stmt::Return { value, range: start }
    }

    // ---- expressions: precedence climbing -------------------------------

    pub fn parse_expr(&mut self, sink: &mut DiagnosticSink) -> Expr {
        self.parse_or(sink)
    }

    fn parse_or(&mut self, sink: &mut DiagnosticSink) -> Expr {
        let mut lhs = self.parse_and(sink);
        loop {
            let op = if self.check_kw(Keyword::Oder) {
                BinOp::Or
            } else if self.check_kw(Keyword::Logisch) && matches!(self.peek_at(1).kind, TokenKind::Keyword(Keyword::Oder)) {
                self.advance();
                BinOp::LogicalOr
            } else if self.check_kw(Keyword::Kontra) {
                BinOp::Xor
            } else {
                break;
            };
            self.advance();
            let rhs = self.parse_and(sink);
            let range = lhs.range().merge(&rhs.range());
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), range };
        }
        lhs
    }

    fn parse_and(&mut self, sink: &mut DiagnosticSink) -> Expr {
        let mut lhs = self.parse_equality(sink);
        loop {
            let op = if self.check_kw(Keyword::Und) {
                BinOp::And
            } else if self.check_kw(Keyword::Logisch) && matches!(self.peek_at(1).kind, TokenKind::Keyword(Keyword::Und)) {
                self.advance();
                BinOp::LogicalAnd
            } else {
                break;
            };
            self.advance();
            let rhs = self.parse_equality(sink);
            let range = lhs.range().merge(&rhs.range());
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), range };
        }
        lhs
    }

    fn parse_equality(&mut self, sink: &mut DiagnosticSink) -> Expr {
        let mut lhs = self.parse_relational(sink);
        loop {
            if self.check_kw(Keyword::Ist) && matches!(self.peek_at(1).kind, TokenKind::Keyword(Keyword::Gleich)) {
                self.advance();
                self.advance();
                let rhs = self.parse_relational(sink);
                let range = lhs.range().merge(&rhs.range());
                lhs = Expr::Binary { op: BinOp::Equal, lhs: Box::new(lhs), rhs: Box::new(rhs), range };
            } else if self.check_kw(Keyword::Ist) && matches!(self.peek_at(1).kind, TokenKind::Keyword(Keyword::Ungleich)) {
                self.advance();
                self.advance();
                let rhs = self.parse_relational(sink);
                let range = lhs.range().merge(&rhs.range());
                lhs = Expr::Binary { op: BinOp::NotEqual, lhs: Box::new(lhs), rhs: Box::new(rhs), range };
            } else {
                break;
            }
        }
        lhs
    }

    fn parse_relational(&mut self, sink: &mut DiagnosticSink) -> Expr {
        let mut lhs = self.parse_concat(sink);
        loop {
            if self.check_kw(Keyword::Groesser) {
                self.advance();
                self.eat_kw(Keyword::Als);
                let rhs = self.parse_concat(sink);
                let range = lhs.range().merge(&rhs.range());
                lhs = Expr::Binary { op: BinOp::Greater, lhs: Box::new(lhs), rhs: Box::new(rhs), range };
            } else if self.check_kw(Keyword::Kleiner) {
                self.advance();
                self.eat_kw(Keyword::Als);
                let rhs = self.parse_concat(sink);
                let range = lhs.range().merge(&rhs.range());
                lhs = Expr::Binary { op: BinOp::Less, lhs: Box::new(lhs), rhs: Box::new(rhs), range };
            } else {
                break;
            }
        }
        lhs
    }

    fn parse_concat(&mut self, sink: &mut DiagnosticSink) -> Expr {
        let mut lhs = self.parse_shift(sink);
        while self.check_kw(Keyword::Verkettet) {
            self.advance();
            self.eat_kw(Keyword::Mit);
            let rhs = self.parse_shift(sink);
            let range = lhs.range().merge(&rhs.range());
            lhs = Expr::Binary { op: BinOp::Concat, lhs: Box::new(lhs), rhs: Box::new(rhs), range };
        }
        lhs
    }

    fn parse_shift(&mut self, sink: &mut DiagnosticSink) -> Expr {
        let mut lhs = self.parse_additive(sink);
        loop {
            let op = if self.check_kw(Keyword::Links) {
                BinOp::ShiftLeft
            } else if self.check_kw(Keyword::Rechts) {
                BinOp::ShiftRight
            } else {
                break;
            };
            self.advance();
            let rhs = self.parse_additive(sink);
            let range = lhs.range().merge(&rhs.range());
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), range };
        }
        lhs
    }

    fn parse_additive(&mut self, sink: &mut DiagnosticSink) -> Expr {
        let mut lhs = self.parse_multiplicative(sink);
        loop {
            let op = if self.check_kw(Keyword::Plus) {
                BinOp::Add
            } else if self.check_kw(Keyword::Minus) {
                BinOp::Sub
            } else {
                break;
            };
            self.advance();
            let rhs = self.parse_multiplicative(sink);
            let range = lhs.range().merge(&rhs.range());
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), range };
        }
        lhs
    }

    fn parse_multiplicative(&mut self, sink: &mut DiagnosticSink) -> Expr {
        let mut lhs = self.parse_pow(sink);
        loop {
            let op = if self.check_kw(Keyword::Mal) {
                BinOp::Mul
            } else if self.check_kw(Keyword::Durch) {
                BinOp::Div
            } else if self.check_kw(Keyword::Modulo) {
                BinOp::Modulo
            } else {
                break;
            };
            self.advance();
            let rhs = self.parse_pow(sink);
            let range = lhs.range().merge(&rhs.range());
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), range };
        }
        lhs
    }

    fn parse_pow(&mut self, sink: &mut DiagnosticSink) -> Expr {
        let mut lhs = self.parse_unary(sink);
        loop {
            let op = if self.check_kw(Keyword::Hoch) {
                BinOp::Pow
            } else if self.check_kw(Keyword::Logarithmus) {
                BinOp::Logarithmus
            } else {
                break;
            };
            self.advance();
            let rhs = self.parse_unary(sink);
            let range = lhs.range().merge(&rhs.range());
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), range };
        }
        lhs
    }

    fn parse_unary(&mut self, sink: &mut DiagnosticSink) -> Expr {
        let start = self.peek().range.clone();
        if self.check_kw(Keyword::Logisch) && matches!(self.peek_at(1).kind, TokenKind::Keyword(Keyword::Nicht)) {
            self.advance();
            self.advance();
            let operand = self.parse_unary(sink);
            let range = start.merge(&operand.range());
            return Expr::Unary { op: UnaryOp::LogicalNot, operand: Box::new(operand), range };
        }
        let op = if self.eat_kw(Keyword::Betrag) {
            Some(UnaryOp::Abs)
        } else if self.eat_kw(Keyword::Negiere) {
            Some(UnaryOp::Negate)
        } else if self.eat_kw(Keyword::Laenge) {
            Some(UnaryOp::Length)
        } else if self.eat_kw(Keyword::Groesse) {
            Some(UnaryOp::Size)
        } else if self.eat_kw(Keyword::Nicht) {
            Some(UnaryOp::Not)
        } else {
            None
        };
        if let Some(op) = op {
            let operand = self.parse_unary(sink);
            let range = start.merge(&operand.range());
            return Expr::Unary { op, operand: Box::new(operand), range };
        }
        self.parse_cast(sink)
    }

    fn parse_cast(&mut self, sink: &mut DiagnosticSink) -> Expr {
        let mut expr = self.parse_postfix(sink);
        while self.check_kw(Keyword::Als) {
            self.advance();
            let Some(target_type) = self.parse_type(sink) else { break };
            let range = expr.range();
            expr = Expr::Cast { target_type, operand: Box::new(expr), range };
        }
        expr
    }

    fn parse_postfix(&mut self, sink: &mut DiagnosticSink) -> Expr {
        let mut expr = self.parse_primary(sink);
        loop {
            if self.eat(&TokenKind::LBracket) {
                let index = self.parse_expr(sink);
                self.expect(&TokenKind::RBracket, sink, "']'");
                let range = expr.range().merge(&self.prev_range());
                expr = Expr::Indexing { target: Box::new(expr), index: Box::new(index), range };
            } else if self.check_kw(Keyword::Von)
                && matches!(
                    expr,
                    Expr::Ident { .. } | Expr::Indexing { .. } | Expr::StringLit(..) | Expr::Grouping { .. }
                )
            {
                self.advance();
                let from = self.parse_additive(sink);
                self.expect(&TokenKind::Keyword(Keyword::Bis), sink, "'bis'");
                let to = self.parse_additive(sink);
                let range = expr.range().merge(&to.range());
                expr = Expr::Slice { target: Box::new(expr), start: Box::new(from), end: Box::new(to), range };
            } else {
                break;
            }
        }
        expr
    }

    fn parse_primary(&mut self, sink: &mut DiagnosticSink) -> Expr {
        let start = self.peek().range.clone();
        match self.peek().kind.clone() {
            TokenKind::Int(v) => {
                self.advance();
                Expr::IntLit(v, start)
            }
            TokenKind::Float(v) => {
                self.advance();
                Expr::FloatLit(v, start)
            }
            TokenKind::Keyword(Keyword::Wahr) => {
                self.advance();
                Expr::BoolLit(true, start)
            }
            TokenKind::Keyword(Keyword::Falsch) => {
                self.advance();
                Expr::BoolLit(false, start)
            }
            TokenKind::Char(c) => {
                self.advance();
                Expr::CharLit(c, start)
            }
            TokenKind::String(s) => {
                self.advance();
                Expr::StringLit(s, start)
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr(sink);
                self.expect(&TokenKind::RParen, sink, "')'");
                let range = start.merge(&self.prev_range());
                Expr::Grouping { inner: Box::new(inner), range }
            }
            TokenKind::Keyword(Keyword::Liste) => {
                self.advance();
                self.eat_kw(Keyword::Von);
                self.parse_list_literal(sink, start)
            }
            TokenKind::LBracket => self.parse_list_literal(sink, start),
            TokenKind::Keyword(kw @ (Keyword::Groesse | Keyword::Standardwert)) => {
                let is_size = kw == Keyword::Groesse;
                self.advance();
                self.eat_kw(Keyword::Von);
                let Some(ty) = self.parse_type(sink) else {
                    return Expr::Bad(start);
                };
                let op = if is_size { TypeOp::SizeOf(ty) } else { TypeOp::DefaultOf(ty) };
                let range = start.merge(&self.prev_range());
                Expr::TypeOp(op, range)
            }
            TokenKind::Ident => self.parse_ident_or_call(sink, start),
            _ => {
                self.error(sink, 107, "erwartet: ein Ausdruck".to_string());
                Expr::Bad(start)
            }
        }
    }

    fn parse_list_literal(&mut self, sink: &mut DiagnosticSink, start: Range) -> Expr {
        self.expect(&TokenKind::LBracket, sink, "'['");
        let mut elements = Vec::new();
        if !matches!(self.peek().kind, TokenKind::RBracket) {
            loop {
                elements.push(self.parse_expr(sink));
                if !self.eat(&TokenKind::Semicolon) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RBracket, sink, "']'");
        let range = start.merge(&self.prev_range());
        Expr::ListLit { element_type: None, elements, range }
    }

    /// An identifier either stands alone, begins a `<count> mal <value>`
    /// list-repeat form, begins a direct `name(args)` call, or begins an
    /// alias call matched by longest pattern.
    fn parse_ident_or_call(&mut self, sink: &mut DiagnosticSink, start: Range) -> Expr {
        if matches!(self.peek_at(1).kind, TokenKind::LParen) {
            return self.parse_call_by_name(sink, start);
        }
        let name = self.advance().literal_text;
        if self.check_kw(Keyword::Mal) {
            let ident = Expr::Ident { name: name.clone(), declaration: None, range: start.clone() };
            self.advance();
            let value = self.parse_unary(sink);
            let range = start.merge(&value.range());
            return Expr::ListRepeat { count: Box::new(ident), value: Box::new(value), range };
        }
        if let Some(call) = self.try_match_alias_call(&name, &start) {
            return call;
        }
        Expr::Ident { name, declaration: None, range: start }
    }

    fn parse_call_by_name(&mut self, sink: &mut DiagnosticSink, start: Range) -> Expr {
        let name = self.advance().literal_text;
        self.advance(); // '('
        let decl = self
            .global
            .iter()
            .find(|d| matches!(&*d.borrow(), Decl::Func(f) if f.name == name))
            .cloned();
        let param_names: Vec<String> = match &decl {
            Some(d) => match &*d.borrow() {
                Decl::Func(f) => f.params.iter().map(|p| p.name.clone()).collect(),
                _ => Vec::new(),
            },
            None => Vec::new(),
        };
        let mut args = Vec::new();
        if !matches!(self.peek().kind, TokenKind::RParen) {
            let mut i = 0;
            loop {
                let value = self.parse_expr(sink);
                let pname = param_names.get(i).cloned().unwrap_or_else(|| i.to_string());
                args.push((pname, value));
                i += 1;
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, sink, "')'");
        let range = start.merge(&self.prev_range());
        if decl.is_none() {
            self.error(sink, 108, format!("unbekannte Funktion '{name}'"));
        }
        Expr::FuncCall { name, declaration: decl, args, range }
    }

    /// Greedy longest-match against the alias table. `first_word` has
    /// already been consumed; on success, tokens matching the rest of the
    /// winning pattern are consumed and the call's arguments parsed in
    /// place. Returns `None` (consuming nothing) if no alias's first
    /// literal matches `first_word`, or if every candidate's remaining
    /// pattern fails to match what follows.
    fn try_match_alias_call(&mut self, first_word: &str, start: &Range) -> Option<Expr> {
        let candidates: Vec<AliasEntry> = self
            .aliases
            .iter()
            .filter(|e| matches!(e.pattern.first(), Some(AliasPatternPart::Literal(w)) if w.eq_ignore_ascii_case(first_word)))
            .cloned()
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let mut best: Option<(usize, Vec<(String, Expr)>, DeclRef)> = None;
        for entry in &candidates {
            let save = self.pos;
            let mut scratch = DiagnosticSink::default();
            if let Some((consumed, args)) = self.try_match_pattern(&entry.pattern[1..], &mut scratch) {
                if !scratch.faulty() {
                    let better = match &best {
                        None => true,
                        Some((len, ..)) => consumed > *len,
                    };
                    if better {
                        best = Some((consumed, args, entry.decl.clone()));
                    }
                }
            }
            self.pos = save;
        }

        let (consumed, args, decl) = best?;
        self.pos += consumed;
        let name = match &*decl.borrow() {
            Decl::Func(f) => f.name.clone(),
            _ => first_word.to_string(),
        };
        let range = start.clone().merge(&self.prev_range());
        Some(Expr::FuncCall { name, declaration: Some(decl), args, range })
    }

    /// Attempts to consume `pattern` starting at the current position,
    /// parsing a sub-expression at each `Param` hole. Returns the number
    /// of tokens consumed and the bound arguments on success; on failure
    /// the scratch sink carries the error and the caller discards both.
    fn try_match_pattern(&mut self, pattern: &[AliasPatternPart], scratch: &mut DiagnosticSink) -> Option<(usize, Vec<(String, Expr)>)> {
        let start_pos = self.pos;
        let mut args = Vec::new();
        for part in pattern {
            match part {
                AliasPatternPart::Literal(word) => {
                    if self.peek().literal_text.eq_ignore_ascii_case(word) {
                        self.advance();
                    } else {
                        return None;
                    }
                }
                AliasPatternPart::Param { name, .. } => {
                    let value = self.parse_unary(scratch);
                    if scratch.faulty() {
                        return None;
                    }
                    args.push((name.clone(), value));
                }
            }
        }
        Some((self.pos - start_pos, args))
    }
}

/// Builds an [`AliasPatternPart`] sequence from an `Alias "..."` pattern
/// string: words are literals, `<name>` holes are looked up against the
/// target function's declared parameters for their type (spec §4.1 "Alias
/// mode", §3 "alias_info carries the expected parameter type").
fn parse_alias_pattern(text: &str, params: &[Param], sink: &mut DiagnosticSink, range: &Range) -> Vec<AliasPatternPart> {
    let mut parts = Vec::new();
    let mut chars = text.chars().peekable();
    let mut word = String::new();
    let flush = |word: &mut String, parts: &mut Vec<AliasPatternPart>| {
        if !word.is_empty() {
            parts.push(AliasPatternPart::Literal(std::mem::take(word)));
        }
    };
    while let Some(c) = chars.next() {
        if c == '<' {
            flush(&mut word, &mut parts);
            let mut name = String::new();
            for c2 in chars.by_ref() {
                if c2 == '>' {
                    break;
                }
                name.push(c2);
            }
            match params.iter().find(|p| p.name == name) {
                Some(p) => parts.push(AliasPatternPart::Param { name, param_type: p.param_type }),
                None => sink.push(Diagnostic::error(
                    109,
                    DiagnosticKind::Syntax,
                    range.clone(),
                    format!("Aliasparameter '{name}' ist kein Parameter der Zielfunktion"),
                )),
            }
        } else if c.is_whitespace() {
            flush(&mut word, &mut parts);
        } else {
            word.push(c);
        }
    }
    flush(&mut word, &mut parts);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::Scanner;

    fn parse(src: &str) -> (Program, DiagnosticSink) {
        let mut sink = DiagnosticSink::default();
        let mut scanner = Scanner::new(src, Rc::from("t.ddp"), false);
        let tokens = scanner.tokenize(&mut sink);
        let program = Parser::new(tokens).parse(&mut sink);
        (program, sink)
    }

    #[test]
    fn parses_greeting_scenario_one() {
        let (program, sink) = parse("Schreibe \"Hallo, Welt!\".");
        assert!(sink.is_empty());
        assert_eq!(program.top_level.len(), 1);
        assert!(matches!(&program.top_level[0], Stmt::Expr(Expr::FuncCall { name, .. }) if name == "Schreibe"));
    }

    #[test]
    fn parses_var_decl_and_index_scenario_three() {
        let (program, sink) = parse("Die Zahl x ist Liste [10; 20; 30][2].\nSchreibe x.");
        assert!(!sink.faulty(), "{:?}", sink.diagnostics());
        assert_eq!(program.top_level.len(), 2);
        assert!(matches!(&program.top_level[0], Stmt::Decl(_)));
    }

    #[test]
    fn parses_slice_scenario_four() {
        let (program, sink) = parse("Die Text s ist \"abcdef\" von 2 bis 4.");
        assert!(!sink.faulty(), "{:?}", sink.diagnostics());
        assert_eq!(program.top_level.len(), 1);
    }

    #[test]
    fn parses_arithmetic_promotion_scenario_two() {
        let (program, sink) = parse("Schreibe (3 durch 2).");
        assert!(sink.is_empty());
        assert_eq!(program.top_level.len(), 1);
    }

    #[test]
    fn parses_for_each_and_counting_loops() {
        let (program, sink) = parse(
            "Die Zahl summe ist 0.\nFür jede Zahl n in Liste [1; 2; 3; 4] mache:\n    Setze summe auf summe plus n.\nSchreibe summe.",
        );
        assert!(!sink.faulty(), "{:?}", sink.diagnostics());
        assert_eq!(program.top_level.len(), 3);
        assert!(matches!(&program.top_level[1], Stmt::ForEach { .. }));
    }

    #[test]
    fn parses_function_with_alias_pattern() {
        let src = "Funktion addiere mit Zahl a, Zahl b gibt Zahl zurück:\n    Rückgabe a plus b.\nAlias \"addiere <a> und <b>\" ist addiere.\nSchreibe addiere 1 und 2.";
        let (program, sink) = parse(src);
        assert!(!sink.faulty(), "{:?}", sink.diagnostics());
        assert!(program.top_level.iter().any(|s| matches!(s, Stmt::Expr(Expr::FuncCall { name, .. }) if name == "addiere")));
    }

    #[test]
    fn bad_statement_recovers_to_next_dot() {
        let (program, sink) = parse("Die Zahl .\nSchreibe 1.");
        assert!(sink.faulty());
        assert_eq!(program.top_level.len(), 2);
    }
}
