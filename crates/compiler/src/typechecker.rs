//! Bottom-up type synthesis (spec §4.4 "Type Checker").
//!
//! A second AST walk, run after [`crate::resolver`] has bound every
//! `Ident`/`FuncCall` to its declaration. Pure with respect to the tree: it
//! reads declared types off already-resolved `DeclRef`s and reports
//! mismatches through a [`DiagnosticSink`], but does not store a type back
//! onto each node — spec §8's "`typecheck(parse(e))` is deterministic and
//! depends only on the token stream... and the current symbol/alias
//! tables" licenses recomputing an expression's type on demand, so the
//! emitter calls [`synth_expr`] again rather than reading a cached
//! annotation off the tree.
//!
//! An expression whose operand already failed to type (`None`) does not
//! itself get a second diagnostic — errors don't cascade.

use ddp_core::{Diagnostic, DiagnosticKind, DiagnosticSink, Primitive, Range, Type};

use crate::ast::{is_builtin_function, BinOp, Decl, DeclRef, Expr, Program, Stmt, TypeOp, UnaryOp};

const ZAHL: Type = Type::Primitive(Primitive::Zahl);
const KOMMAZAHL: Type = Type::Primitive(Primitive::Kommazahl);
const BOOLEAN: Type = Type::Primitive(Primitive::Boolean);
const TEXT: Type = Type::Primitive(Primitive::Text);

/// Type-checks every statement in `program`, reporting through `sink`.
pub fn check(program: &Program, sink: &mut DiagnosticSink) {
    let mut checker = TypeChecker {
        sink,
        current_return_type: None,
    };
    for stmt in &program.top_level {
        checker.check_stmt(stmt);
    }
}

struct TypeChecker<'a> {
    sink: &'a mut DiagnosticSink,
    current_return_type: Option<Type>,
}

impl<'a> TypeChecker<'a> {
    fn check_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Decl(decl_ref) => self.check_decl(decl_ref),
            Stmt::Expr(e) => {
                self.synth_expr(e);
            }
            Stmt::Assign { target, value, range } => {
                let value_ty = self.synth_expr(value);
                let target_ty = self.synth_expr(target);
                if let (Some(vt), Some(tt)) = (value_ty, target_ty) {
                    if vt != tt {
                        self.sink.push(Diagnostic::error(
                            403,
                            DiagnosticKind::Type,
                            range.clone(),
                            format!("Zuweisung: Ziel hat Typ {tt}, Wert hat Typ {vt}"),
                        ));
                    }
                }
            }
            Stmt::Block(b) => {
                for s in &b.statements {
                    self.check_stmt(s);
                }
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                self.expect_type(cond, BOOLEAN, 407, "Bedingung");
                for s in &then_branch.statements {
                    self.check_stmt(s);
                }
                if let Some(eb) = else_branch {
                    for s in &eb.statements {
                        self.check_stmt(s);
                    }
                }
            }
            Stmt::While { cond, body, .. } => {
                self.expect_type(cond, BOOLEAN, 407, "Bedingung");
                for s in &body.statements {
                    self.check_stmt(s);
                }
            }
            Stmt::DoWhile { body, cond, .. } => {
                for s in &body.statements {
                    self.check_stmt(s);
                }
                self.expect_type(cond, BOOLEAN, 407, "Bedingung");
            }
            Stmt::RepeatNTimes { count, body, .. } => {
                self.expect_type(count, ZAHL, 402, "Wiederholungsanzahl");
                for s in &body.statements {
                    self.check_stmt(s);
                }
            }
            Stmt::ForCounting {
                counter, from, to, step, body, ..
            } => {
                let counter_ty = match &*counter.borrow() {
                    Decl::Var(v) => v.declared_type,
                    _ => ZAHL,
                };
                self.expect_type(from, counter_ty, 402, "Schleifenstart");
                self.expect_type(to, counter_ty, 402, "Schleifenende");
                if let Some(s) = step {
                    self.expect_type(s, counter_ty, 402, "Schrittweite");
                }
                for s in &body.statements {
                    self.check_stmt(s);
                }
            }
            Stmt::ForEach {
                element, iterable, body, ..
            } => {
                if let Some(it) = self.synth_expr(iterable) {
                    match it.element_type() {
                        Some(expected) => {
                            let declared = match &*element.borrow() {
                                Decl::Var(v) => Some(v.declared_type),
                                _ => None,
                            };
                            if let Some(d) = declared {
                                if d != expected {
                                    self.sink.push(Diagnostic::error(
                                        402,
                                        DiagnosticKind::Type,
                                        iterable.range(),
                                        format!("Schleifenvariable hat Typ {d}, Element hat Typ {expected}"),
                                    ));
                                }
                            }
                        }
                        None => self.sink.push(Diagnostic::error(
                            408,
                            DiagnosticKind::Type,
                            iterable.range(),
                            "für-jeden erfordert Text oder Liste".to_string(),
                        )),
                    }
                }
                for s in &body.statements {
                    self.check_stmt(s);
                }
            }
            Stmt::Return { value, range } => {
                let actual = value.as_ref().and_then(|v| self.synth_expr(v));
                match (self.current_return_type, value.is_some(), actual) {
                    (Some(expected), true, Some(actual_ty)) if actual_ty != expected => {
                        self.sink.push(Diagnostic::error(
                            411,
                            DiagnosticKind::Type,
                            range.clone(),
                            format!("Rückgabetyp passt nicht: erwartet {expected}, gefunden {actual_ty}"),
                        ));
                    }
                    (Some(_), false, _) => {
                        self.sink.push(Diagnostic::error(
                            411,
                            DiagnosticKind::Type,
                            range.clone(),
                            "Rückgabe ohne Wert in einer Funktion mit Rückgabetyp".to_string(),
                        ));
                    }
                    (None, true, _) => {
                        self.sink.push(Diagnostic::error(
                            411,
                            DiagnosticKind::Type,
                            range.clone(),
                            "Rückgabe mit Wert außerhalb einer Funktion mit Rückgabetyp".to_string(),
                        ));
                    }
                    _ => {}
                }
            }
            Stmt::Bad(_) => {}
        }
    }

    fn check_decl(&mut self, decl_ref: &DeclRef) {
        match &*decl_ref.borrow() {
            Decl::Var(v) => {
                if let Some(init) = &v.init {
                    if let Some(ity) = self.synth_expr(init) {
                        if ity != v.declared_type {
                            self.sink.push(Diagnostic::error(
                                402,
                                DiagnosticKind::Type,
                                v.range.clone(),
                                format!("'{}' ist als {} deklariert, Anfangswert hat Typ {ity}", v.name, v.declared_type),
                            ));
                        }
                    }
                }
            }
            Decl::Func(f) => {
                if let Some(body) = &f.body {
                    let prev = self.current_return_type;
                    self.current_return_type = f.return_type;
                    for s in &body.statements {
                        self.check_stmt(s);
                    }
                    self.current_return_type = prev;
                }
            }
            Decl::Bad(_) => {}
        }
    }

    fn expect_type(&mut self, expr: &Expr, expected: Type, code: u32, what: &str) {
        if let Some(t) = self.synth_expr(expr) {
            if t != expected {
                self.sink.push(Diagnostic::error(
                    code,
                    DiagnosticKind::Type,
                    expr.range(),
                    format!("{what}: erwartet {expected}, gefunden {t}"),
                ));
            }
        }
    }

    /// Synthesizes `expr`'s type, or `None` if it is already broken (either
    /// this expression or one of its operands failed to type, and a
    /// diagnostic was already pushed for that failure).
    fn synth_expr(&mut self, expr: &Expr) -> Option<Type> {
        match expr {
            Expr::IntLit(..) => Some(ZAHL),
            Expr::FloatLit(..) => Some(KOMMAZAHL),
            Expr::BoolLit(..) => Some(BOOLEAN),
            Expr::CharLit(..) => Some(Type::Primitive(Primitive::Buchstabe)),
            Expr::StringLit(..) => Some(TEXT),
            Expr::ListLit {
                element_type,
                elements,
                range,
            } => self.synth_list_literal(*element_type, elements, range),
            Expr::ListRepeat { count, value, range } => {
                self.expect_type(count, ZAHL, 402, "Wiederholungsanzahl");
                match self.synth_expr(value) {
                    Some(Type::Primitive(p)) => Some(Type::List(p)),
                    Some(Type::List(_)) => {
                        self.sink.push(Diagnostic::error(
                            410,
                            DiagnosticKind::Type,
                            range.clone(),
                            "Listen können nicht verschachtelt werden".to_string(),
                        ));
                        None
                    }
                    None => None,
                }
            }
            Expr::Ident { declaration, .. } => declaration.as_ref().and_then(|d| match &*d.borrow() {
                Decl::Var(v) => Some(v.declared_type),
                _ => None,
            }),
            Expr::Indexing { target, index, range } => {
                self.expect_type(index, ZAHL, 409, "Index");
                match self.synth_expr(target) {
                    Some(t) => match t.element_type() {
                        Some(elem) => Some(elem),
                        None => {
                            self.sink.push(Diagnostic::error(
                                408,
                                DiagnosticKind::Type,
                                range.clone(),
                                format!("Indizierung erfordert Text oder Liste, gefunden {t}"),
                            ));
                            None
                        }
                    },
                    None => None,
                }
            }
            Expr::Unary { op, operand, range } => self.synth_unary(*op, operand, range),
            Expr::Binary { op, lhs, rhs, range } => self.synth_binary(*op, lhs, rhs, range),
            Expr::Slice { target, start, end, range } => {
                self.expect_type(start, ZAHL, 409, "Slice-Start");
                self.expect_type(end, ZAHL, 409, "Slice-Ende");
                match self.synth_expr(target) {
                    Some(t) if t == TEXT || t.is_list() => Some(t),
                    Some(t) => {
                        self.sink.push(Diagnostic::error(
                            408,
                            DiagnosticKind::Type,
                            range.clone(),
                            format!("Slice erfordert Text oder Liste, gefunden {t}"),
                        ));
                        None
                    }
                    None => None,
                }
            }
            Expr::Cast {
                target_type,
                operand,
                range,
            } => match self.synth_expr(operand) {
                Some(from) if is_cast_allowed(from, *target_type) => Some(*target_type),
                Some(from) => {
                    self.sink.push(Diagnostic::error(
                        405,
                        DiagnosticKind::Type,
                        range.clone(),
                        format!("ungültige Umwandlung von {from} nach {target_type}"),
                    ));
                    None
                }
                None => None,
            },
            Expr::TypeOp(op, _) => match op {
                TypeOp::SizeOf(_) => Some(ZAHL),
                TypeOp::DefaultOf(t) => Some(*t),
            },
            Expr::Grouping { inner, .. } => self.synth_expr(inner),
            Expr::FuncCall {
                name,
                declaration,
                args,
                range,
            } => self.synth_call(name, declaration, args, range),
            Expr::Bad(_) => None,
        }
    }

    fn synth_list_literal(&mut self, element_type: Option<Type>, elements: &[Expr], _range: &Range) -> Option<Type> {
        let mut prim = match element_type {
            Some(Type::Primitive(p)) => Some(p),
            _ => None,
        };
        for el in elements {
            match self.synth_expr(el) {
                Some(Type::Primitive(p)) => match prim {
                    None => prim = Some(p),
                    Some(expected) if expected != p => {
                        self.sink.push(Diagnostic::error(
                            410,
                            DiagnosticKind::Type,
                            el.range(),
                            format!("Listenelement hat Typ {p}, erwartet {expected}"),
                        ));
                    }
                    _ => {}
                },
                Some(Type::List(_)) => {
                    self.sink.push(Diagnostic::error(
                        410,
                        DiagnosticKind::Type,
                        el.range(),
                        "Listen können nicht verschachtelt werden".to_string(),
                    ));
                }
                None => {}
            }
        }
        prim.map(Type::List)
    }

    fn synth_unary(&mut self, op: UnaryOp, operand: &Expr, range: &Range) -> Option<Type> {
        let operand_ty = self.synth_expr(operand);
        match op {
            UnaryOp::Abs | UnaryOp::Negate => match operand_ty {
                Some(t) if t.is_numeric() => Some(t),
                Some(t) => {
                    self.sink.push(Diagnostic::error(
                        401,
                        DiagnosticKind::Type,
                        range.clone(),
                        format!("Betrag/Negiere erfordert eine Zahl oder Kommazahl, gefunden {t}"),
                    ));
                    None
                }
                None => None,
            },
            UnaryOp::Length => match operand_ty {
                Some(t) if t == TEXT || t.is_list() => Some(ZAHL),
                Some(t) => {
                    self.sink.push(Diagnostic::error(
                        401,
                        DiagnosticKind::Type,
                        range.clone(),
                        format!("Länge erfordert Text oder Liste, gefunden {t}"),
                    ));
                    None
                }
                None => None,
            },
            UnaryOp::Size => Some(ZAHL),
            UnaryOp::LogicalNot | UnaryOp::Not => match operand_ty {
                Some(BOOLEAN) => Some(BOOLEAN),
                Some(t) => {
                    self.sink.push(Diagnostic::error(
                        401,
                        DiagnosticKind::Type,
                        range.clone(),
                        format!("logische Verneinung erfordert Boolean, gefunden {t}"),
                    ));
                    None
                }
                None => None,
            },
        }
    }

    fn synth_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, range: &Range) -> Option<Type> {
        let lt = self.synth_expr(lhs);
        let rt = self.synth_expr(rhs);
        let (lt, rt) = match (lt, rt) {
            (Some(a), Some(b)) => (a, b),
            _ => return None,
        };
        match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Modulo | BinOp::Pow | BinOp::Logarithmus => {
                match numeric_result(op, lt, rt) {
                    Some(t) => Some(t),
                    None => {
                        self.sink.push(Diagnostic::error(
                            401,
                            DiagnosticKind::Type,
                            range.clone(),
                            format!("arithmetischer Operator erfordert Zahlen, gefunden {lt} und {rt}"),
                        ));
                        None
                    }
                }
            }
            BinOp::And | BinOp::Or => {
                if lt == BOOLEAN && rt == BOOLEAN {
                    Some(BOOLEAN)
                } else {
                    self.sink.push(Diagnostic::error(
                        401,
                        DiagnosticKind::Type,
                        range.clone(),
                        format!("und/oder erfordert Boolean, gefunden {lt} und {rt}"),
                    ));
                    None
                }
            }
            BinOp::LogicalAnd | BinOp::LogicalOr | BinOp::Xor | BinOp::ShiftLeft | BinOp::ShiftRight => {
                if lt == ZAHL && rt == ZAHL {
                    Some(ZAHL)
                } else {
                    self.sink.push(Diagnostic::error(
                        401,
                        DiagnosticKind::Type,
                        range.clone(),
                        format!("bitweiser Operator erfordert Zahl, gefunden {lt} und {rt}"),
                    ));
                    None
                }
            }
            BinOp::Equal | BinOp::NotEqual => {
                if lt == rt {
                    Some(BOOLEAN)
                } else {
                    self.sink.push(Diagnostic::error(
                        401,
                        DiagnosticKind::Type,
                        range.clone(),
                        format!("Vergleich erfordert gleiche Typen, gefunden {lt} und {rt}"),
                    ));
                    None
                }
            }
            BinOp::Greater | BinOp::Less | BinOp::GreaterEq | BinOp::LessEq => {
                if lt == rt && lt.is_numeric() {
                    Some(BOOLEAN)
                } else {
                    self.sink.push(Diagnostic::error(
                        401,
                        DiagnosticKind::Type,
                        range.clone(),
                        format!("Relation erfordert gleiche numerische Typen, gefunden {lt} und {rt}"),
                    ));
                    None
                }
            }
            BinOp::Concat => match concat_type(lt, rt) {
                Some(t) => Some(t),
                None => {
                    self.sink.push(Diagnostic::error(
                        401,
                        DiagnosticKind::Type,
                        range.clone(),
                        format!("verkettet: keine gültige Kombination von {lt} und {rt}"),
                    ));
                    None
                }
            },
        }
    }

    fn synth_call(
        &mut self,
        name: &str,
        declaration: &Option<DeclRef>,
        args: &[(String, Expr)],
        range: &Range,
    ) -> Option<Type> {
        let arg_types: Vec<Option<Type>> = args.iter().map(|(_, e)| self.synth_expr(e)).collect();
        if is_builtin_function(name) {
            return self.check_builtin_call(name, &arg_types, range);
        }
        let decl = declaration.as_ref()?;
        let d = decl.borrow();
        let Decl::Func(f) = &*d else { return None };
        for ((param, arg_ty), (_, arg_expr)) in f.params.iter().zip(arg_types.iter()).zip(args.iter()) {
            if param.is_ref && !arg_expr.is_assignable() {
                self.sink.push(Diagnostic::error(
                    404,
                    DiagnosticKind::Type,
                    arg_expr.range(),
                    format!("Referenzparameter '{}' erfordert einen zuweisbaren Ausdruck", param.name),
                ));
            }
            if let Some(at) = arg_ty {
                if *at != param.param_type {
                    self.sink.push(Diagnostic::error(
                        402,
                        DiagnosticKind::Type,
                        arg_expr.range(),
                        format!("Parameter '{}': erwartet {}, gefunden {at}", param.name, param.param_type),
                    ));
                }
            }
        }
        f.return_type
    }

    fn check_builtin_call(&mut self, name: &str, arg_types: &[Option<Type>], range: &Range) -> Option<Type> {
        match name {
            "Schreibe" => {
                if let Some(Some(t)) = arg_types.first() {
                    if t.is_list() {
                        self.sink.push(Diagnostic::error(
                            412,
                            DiagnosticKind::Type,
                            range.clone(),
                            "Schreibe kann keine Liste ausgeben".to_string(),
                        ));
                    }
                }
                None
            }
            _ => None,
        }
    }
}

/// Arithmetic result type: `Zahl × Zahl → Zahl`, any float involvement
/// promotes to `Kommazahl`; division and `hoch`/`Logarithmus` always yield
/// `Kommazahl` (the runtime lowers both through `pow`/`log10`, spec §4.5);
/// modulo requires both operands `Zahl` (spec §4.4).
fn numeric_result(op: BinOp, lhs: Type, rhs: Type) -> Option<Type> {
    if !lhs.is_numeric() || !rhs.is_numeric() {
        return None;
    }
    match op {
        BinOp::Div | BinOp::Pow | BinOp::Logarithmus => Some(KOMMAZAHL),
        BinOp::Modulo => (lhs == ZAHL && rhs == ZAHL).then_some(ZAHL),
        _ => Some(if lhs == KOMMAZAHL || rhs == KOMMAZAHL { KOMMAZAHL } else { ZAHL }),
    }
}

/// Concatenation typing (spec §4.4 "verkettet"): same list type; a list and
/// its element type (either order); `Buchstabe` + `Buchstabe` → `Text` (not
/// a two-element list — the text/char carve-out beats the generic
/// element+element rule, see `DESIGN.md`); `Text`/`Buchstabe` combinations
/// → `Text`; two elements of any other matching primitive → a two-element
/// list of that primitive.
fn concat_type(lhs: Type, rhs: Type) -> Option<Type> {
    use Primitive::*;
    match (lhs, rhs) {
        (Type::List(a), Type::List(b)) if a == b => Some(Type::List(a)),
        (Type::List(a), Type::Primitive(b)) if a == b => Some(Type::List(a)),
        (Type::Primitive(a), Type::List(b)) if a == b => Some(Type::List(b)),
        (Type::Primitive(Text), Type::Primitive(Text)) => Some(TEXT),
        (Type::Primitive(Text), Type::Primitive(Buchstabe)) => Some(TEXT),
        (Type::Primitive(Buchstabe), Type::Primitive(Text)) => Some(TEXT),
        (Type::Primitive(Buchstabe), Type::Primitive(Buchstabe)) => Some(TEXT),
        (Type::Primitive(a), Type::Primitive(b)) if a == b => Some(Type::List(a)),
        _ => None,
    }
}

/// Allowed cast targets (spec §4.4 "Cast"), grounded on the runtime
/// conversion helpers actually declared in spec §4.6: the `_ddp_string_to_*`
/// family only goes `Text → {Zahl, Kommazahl}`, and `_ddp_{int,float,bool,
/// char}_to_string` only goes scalar `→ Text`; every other pairing here is a
/// plain numeric/bit reinterpretation with no dedicated runtime helper
/// needed. Identity casts (`text→text deep-copies` per spec §4.5) are
/// always allowed.
fn is_cast_allowed(from: Type, to: Type) -> bool {
    use Primitive::*;
    if from == to {
        return true;
    }
    matches!(
        (from, to),
        (Type::Primitive(Kommazahl), Type::Primitive(Zahl))
            | (Type::Primitive(Text), Type::Primitive(Zahl))
            | (Type::Primitive(Buchstabe), Type::Primitive(Zahl))
            | (Type::Primitive(Boolean), Type::Primitive(Zahl))
            | (Type::Primitive(Zahl), Type::Primitive(Kommazahl))
            | (Type::Primitive(Text), Type::Primitive(Kommazahl))
            | (Type::Primitive(Boolean), Type::Primitive(Kommazahl))
            | (Type::Primitive(Zahl), Type::Primitive(Boolean))
            | (Type::Primitive(Zahl), Type::Primitive(Buchstabe))
            | (Type::Primitive(Zahl), Type::Primitive(Text))
            | (Type::Primitive(Kommazahl), Type::Primitive(Text))
            | (Type::Primitive(Boolean), Type::Primitive(Text))
            | (Type::Primitive(Buchstabe), Type::Primitive(Text))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::resolver;
    use crate::scanner::Scanner;
    use std::rc::Rc;

    fn check_src(src: &str) -> DiagnosticSink {
        let mut sink = DiagnosticSink::default();
        let mut scanner = Scanner::new(src, Rc::from("t.ddp"), false);
        let tokens = scanner.tokenize(&mut sink);
        let mut program = Parser::new(tokens).parse(&mut sink);
        resolver::resolve(&mut program, &mut sink);
        check(&program, &mut sink);
        sink
    }

    #[test]
    fn arithmetic_promotes_to_float() {
        let sink = check_src("Schreibe (3 durch 2).");
        assert!(!sink.faulty(), "{:?}", sink.diagnostics());
    }

    #[test]
    fn var_decl_type_mismatch_is_diagnosed() {
        let sink = check_src("Die Zahl x ist wahr.");
        assert!(sink.faulty());
    }

    #[test]
    fn boolean_condition_required() {
        let sink = check_src("Wenn 1 dann:\n\tSchreibe 1.");
        assert!(sink.faulty());
    }

    #[test]
    fn list_index_yields_element_type() {
        let sink = check_src("Die Zahl x ist [1; 2; 3][1].\nSchreibe x.");
        assert!(!sink.faulty(), "{:?}", sink.diagnostics());
    }

    #[test]
    fn char_concat_char_yields_text() {
        let sink = check_src("Die Text s ist 'a' verkettet 'b'.");
        assert!(!sink.faulty(), "{:?}", sink.diagnostics());
    }
}
