//! Name resolution (spec §4.3 "Resolver").
//!
//! A pre-order walk over the parsed AST. Builds the scope tree spec §3's
//! "Symbol table" describes — variable-name→decl and function-name→decl
//! maps per scope, child scopes looking through to the parent on miss, the
//! global scope being the whole translation unit — and binds every `Ident`
//! and `FuncCall` node to the declaration it names.
//!
//! Top-level function signatures are hoisted into the global scope before
//! any body is walked, so one function may call another declared later in
//! the same file (mirrors the parser's own header pre-pass, spec §4.2).
//! Top-level variables are not hoisted: they resolve in declaration order,
//! same as a variable inside a function body.
//!
//! For-loop counters and elements are injected straight into the loop
//! body's own scope rather than an enclosing one, per spec §4.3, so that a
//! `Rückgabe` inside the body still sees the counter when the emitter's
//! scope stack later walks up to release it.

use std::cell::RefCell;
use std::rc::Rc;

use ddp_core::{Diagnostic, DiagnosticKind, DiagnosticSink, Range};

use crate::ast::{is_builtin_function, Block, Decl, DeclRef, Expr, Program, Stmt, VarDecl};

#[derive(Default)]
struct Scope {
    variables: std::collections::HashMap<String, DeclRef>,
    functions: std::collections::HashMap<String, DeclRef>,
}

/// Resolves every name in `program` in place, reporting duplicate
/// declarations and unresolved references through `sink`.
pub fn resolve(program: &mut Program, sink: &mut DiagnosticSink) {
    let mut resolver = Resolver {
        scopes: vec![Scope::default()],
        sink,
    };
    resolver.hoist_functions(program);
    for stmt in &mut program.top_level {
        resolver.resolve_stmt(stmt);
    }
}

struct Resolver<'a> {
    scopes: Vec<Scope>,
    sink: &'a mut DiagnosticSink,
}

impl<'a> Resolver<'a> {
    fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare_var(&mut self, name: &str, decl: DeclRef, range: &Range) {
        let scope = self.scopes.last_mut().expect("global scope always present");
        match scope.variables.get(name) {
            Some(existing) if Rc::ptr_eq(existing, &decl) => {}
            Some(_) => self.sink.push(Diagnostic::error(
                301,
                DiagnosticKind::Name,
                range.clone(),
                format!("Mehrfachdeklaration: Variable '{name}' existiert in diesem Gültigkeitsbereich bereits"),
            )),
            None => {
                scope.variables.insert(name.to_string(), decl);
            }
        }
    }

    fn declare_func(&mut self, name: &str, decl: &DeclRef, range: &Range) {
        let scope = self.scopes.last_mut().expect("global scope always present");
        match scope.functions.get(name) {
            Some(existing) if Rc::ptr_eq(existing, decl) => {}
            Some(_) => self.sink.push(Diagnostic::error(
                301,
                DiagnosticKind::Name,
                range.clone(),
                format!("Mehrfachdeklaration: Funktion '{name}' existiert bereits"),
            )),
            None => {
                scope.functions.insert(name.to_string(), decl.clone());
            }
        }
    }

    fn lookup_var(&self, name: &str) -> Option<DeclRef> {
        self.scopes.iter().rev().find_map(|s| s.variables.get(name).cloned())
    }

    fn lookup_func(&self, name: &str) -> Option<DeclRef> {
        self.scopes.iter().rev().find_map(|s| s.functions.get(name).cloned())
    }

    fn hoist_functions(&mut self, program: &Program) {
        for stmt in &program.top_level {
            if let Stmt::Decl(decl_ref) = stmt {
                let is_func = matches!(&*decl_ref.borrow(), Decl::Func(_));
                if is_func {
                    let (name, range) = {
                        let d = decl_ref.borrow();
                        (d.name().unwrap_or_default().to_string(), d.range())
                    };
                    self.declare_func(&name, decl_ref, &range);
                }
            }
        }
    }

    fn resolve_decl(&mut self, decl_ref: &DeclRef) {
        let mut d = decl_ref.borrow_mut();
        match &mut *d {
            Decl::Var(v) => {
                if let Some(init) = v.init.as_mut() {
                    self.resolve_expr(init);
                }
                let name = v.name.clone();
                let range = v.range.clone();
                drop(d);
                self.declare_var(&name, decl_ref.clone(), &range);
            }
            Decl::Func(f) => {
                let name = f.name.clone();
                let range = f.range.clone();
                let params = f.params.clone();
                self.declare_func(&name, decl_ref, &range);
                if let Some(body) = f.body.as_mut() {
                    self.push_scope();
                    for p in &params {
                        let param_decl: DeclRef = Rc::new(RefCell::new(Decl::Var(VarDecl {
                            name: p.name.clone(),
                            declared_type: p.param_type,
                            init: None,
                            range: range.clone(),
                            is_synthetic: true,
                        })));
                        self.declare_var(&p.name, param_decl, &range);
                    }
                    for stmt in &mut body.statements {
                        self.resolve_stmt(stmt);
                    }
                    self.pop_scope();
                }
            }
            Decl::Bad(_) => {}
        }
    }

    fn resolve_block(&mut self, block: &mut Block) {
        self.push_scope();
        for stmt in &mut block.statements {
            self.resolve_stmt(stmt);
        }
        self.pop_scope();
    }

    fn resolve_stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::Decl(decl_ref) => self.resolve_decl(decl_ref),
            Stmt::Expr(e) => self.resolve_expr(e),
            Stmt::Assign { target, value, .. } => {
                self.resolve_expr(target);
                self.resolve_expr(value);
            }
            Stmt::Block(b) => self.resolve_block(b),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                self.resolve_expr(cond);
                self.resolve_block(then_branch);
                if let Some(eb) = else_branch {
                    self.resolve_block(eb);
                }
            }
            Stmt::While { cond, body, .. } => {
                self.resolve_expr(cond);
                self.resolve_block(body);
            }
            Stmt::DoWhile { body, cond, .. } => {
                // Condition is evaluated after the body, in the body's own
                // scope, so it may reference locals the body just declared.
                self.push_scope();
                for s in &mut body.statements {
                    self.resolve_stmt(s);
                }
                self.resolve_expr(cond);
                self.pop_scope();
            }
            Stmt::RepeatNTimes { count, body, .. } => {
                self.resolve_expr(count);
                self.resolve_block(body);
            }
            Stmt::ForCounting {
                counter,
                from,
                to,
                step,
                body,
                ..
            } => {
                self.resolve_expr(from);
                self.resolve_expr(to);
                if let Some(s) = step {
                    self.resolve_expr(s);
                }
                self.push_scope();
                let (name, range) = {
                    let c = counter.borrow();
                    (c.name().unwrap_or_default().to_string(), c.range())
                };
                self.declare_var(&name, counter.clone(), &range);
                for s in &mut body.statements {
                    self.resolve_stmt(s);
                }
                self.pop_scope();
            }
            Stmt::ForEach {
                element,
                iterable,
                body,
                ..
            } => {
                self.resolve_expr(iterable);
                self.push_scope();
                let (name, range) = {
                    let e = element.borrow();
                    (e.name().unwrap_or_default().to_string(), e.range())
                };
                self.declare_var(&name, element.clone(), &range);
                for s in &mut body.statements {
                    self.resolve_stmt(s);
                }
                self.pop_scope();
            }
            Stmt::Return { value, .. } => {
                if let Some(v) = value {
                    self.resolve_expr(v);
                }
            }
            Stmt::Bad(_) => {}
        }
    }

    fn resolve_expr(&mut self, expr: &mut Expr) {
        match expr {
            Expr::IntLit(..)
            | Expr::FloatLit(..)
            | Expr::BoolLit(..)
            | Expr::CharLit(..)
            | Expr::StringLit(..)
            | Expr::TypeOp(..)
            | Expr::Bad(_) => {}
            Expr::ListLit { elements, .. } => {
                for e in elements {
                    self.resolve_expr(e);
                }
            }
            Expr::ListRepeat { count, value, .. } => {
                self.resolve_expr(count);
                self.resolve_expr(value);
            }
            Expr::Ident { name, declaration, range } => match self.lookup_var(name) {
                Some(d) => *declaration = Some(d),
                None => self.sink.push(Diagnostic::error(
                    302,
                    DiagnosticKind::Name,
                    range.clone(),
                    format!("nicht deklarierter Bezeichner '{name}'"),
                )),
            },
            Expr::Indexing { target, index, .. } => {
                self.resolve_expr(target);
                self.resolve_expr(index);
            }
            Expr::Unary { operand, .. } => self.resolve_expr(operand),
            Expr::Binary { lhs, rhs, .. } => {
                self.resolve_expr(lhs);
                self.resolve_expr(rhs);
            }
            Expr::Slice { target, start, end, .. } => {
                self.resolve_expr(target);
                self.resolve_expr(start);
                self.resolve_expr(end);
            }
            Expr::Cast { operand, .. } => self.resolve_expr(operand),
            Expr::Grouping { inner, .. } => self.resolve_expr(inner),
            Expr::FuncCall {
                name,
                declaration,
                args,
                range,
            } => {
                if !is_builtin_function(name) {
                    match self.lookup_func(name) {
                        Some(d) => *declaration = Some(d),
                        None => self.sink.push(Diagnostic::error(
                            303,
                            DiagnosticKind::Name,
                            range.clone(),
                            format!("unbekannte Funktion '{name}'"),
                        )),
                    }
                }
                for (_, arg) in args {
                    self.resolve_expr(arg);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::scanner::Scanner;
    use std::rc::Rc as StdRc;

    fn parse(src: &str) -> (Program, DiagnosticSink) {
        let mut sink = DiagnosticSink::default();
        let mut scanner = Scanner::new(src, StdRc::from("t.ddp"), false);
        let tokens = scanner.tokenize(&mut sink);
        let program = Parser::new(tokens).parse(&mut sink);
        (program, sink)
    }

    #[test]
    fn binds_identifier_to_its_declaration() {
        let (mut program, mut sink) = parse("Die Zahl x ist 1.\nSchreibe x.");
        resolve(&mut program, &mut sink);
        assert!(!sink.faulty(), "{:?}", sink.diagnostics());
        let found = program.top_level.iter().any(|stmt| match stmt {
            Stmt::Expr(Expr::FuncCall { args, .. }) => args.iter().any(|(_, e)| {
                matches!(e, Expr::Ident { declaration: Some(_), .. })
            }),
            _ => false,
        });
        assert!(found, "expected Schreibe's argument to resolve to x's declaration");
    }

    #[test]
    fn undeclared_identifier_is_diagnosed() {
        let (mut program, mut sink) = parse("Schreibe y.");
        resolve(&mut program, &mut sink);
        assert!(sink.faulty());
    }

    #[test]
    fn functions_may_call_each_other_regardless_of_order() {
        let src = "Funktion Eins gibt Zahl zurück:\n\tRückgabe Zwei().\nFunktion Zwei gibt Zahl zurück:\n\tRückgabe 1.";
        let (mut program, mut sink) = parse(src);
        resolve(&mut program, &mut sink);
        assert!(!sink.faulty(), "{:?}", sink.diagnostics());
    }

    #[test]
    fn duplicate_top_level_variable_is_diagnosed() {
        let (mut program, mut sink) = parse("Die Zahl x ist 1.\nDie Zahl x ist 2.");
        resolve(&mut program, &mut sink);
        assert!(sink.faulty());
    }

    #[test]
    fn for_counting_loop_counter_resolves_inside_body() {
        let src = "Für jede Zahl i von 1 bis 3 mache:\n\tSchreibe i.";
        let (mut program, mut sink) = parse(src);
        resolve(&mut program, &mut sink);
        assert!(!sink.faulty(), "{:?}", sink.diagnostics());
    }
}
