//! IR Code Generation via Text (spec §4.5 "IR Emitter", §4.6 runtime
//! contract, §4.7/4.8 heap-value ownership + refcount pool).
//!
//! Generates LLVM IR as text and leaves invoking clang/gcc to
//! [`crate::driver`] — simpler and more portable than FFI bindings
//! (e.g. inkwell) into the LLVM C API. There is no stack-machine virtual
//! register threaded through every operation here: expressions lower
//! straight to SSA values, so there is no `%stack` parameter threaded
//! through every `define`.
//!
//! # Ownership discipline
//!
//! Every local that holds a heap-typed value (`Text`, `Liste von T`) is
//! tracked in a [`ScopeFrame`] pushed when its enclosing block is entered.
//! Leaving that scope — by falling off the end of the block or by an
//! early `Rückgabe` — releases every local the frame still owns, deepest
//! scope first, skipping whichever value a `Rückgabe` is carrying out
//! (spec §4.5 "Return": "unwind scope stack releasing heap locals except
//! returned value"). An expression statement whose value nobody stores
//! (a bare heap-producing expression used only for effect) is released
//! immediately rather than tracked, since no slot exists to track it in.
//!
//! # Representation
//!
//! | DDP type    | LLVM type        |
//! |-------------|-------------------|
//! | `Zahl`      | `i64`             |
//! | `Kommazahl` | `double`          |
//! | `Boolean`   | `i64` (0/1)       |
//! | `Buchstabe` | `i32` (codepoint) |
//! | `Text`      | `ptr` (`ddpstring`)|
//! | `Liste von T` | `ptr` (`ddp<T>list`) |
//!
//! `Boolean` stays `i64` end to end, matching the runtime ABI's own choice
//! (`_ddp_write_bool`, `_ddp_boollist_get`/`set` all take/return `i64`,
//! never `i1`) — an `icmp` result is `zext`ed to `i64` the moment it's
//! produced so every Boolean value in the emitted IR has one
//! representation, with no truncate/extend bookkeeping at use sites.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;

use ddp_core::{Primitive, Type};

use crate::ast::{
    is_builtin_function, BinOp, Block, Decl, DeclRef, Expr, FuncDecl, Program, Stmt, TypeOp, UnaryOp,
};

/// A small closed error type (`Internal`/`Format`, manual `Display`,
/// `From<std::fmt::Error>`) — every case here really is a
/// compiler-internal inconsistency: a well-typed program (spec §7: only a
/// typechecked `Program` reaches the emitter) never hits one of these at
/// the arm level, only at the
/// `write!`-failure level.
#[derive(Debug)]
pub enum CodeGenError {
    Internal(String),
    Format(std::fmt::Error),
}

impl std::fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeGenError::Internal(s) => write!(f, "interner Codegen-Fehler: {s}"),
            CodeGenError::Format(e) => write!(f, "Fehler beim Schreiben der IR: {e}"),
        }
    }
}

impl std::error::Error for CodeGenError {}

impl From<String> for CodeGenError {
    fn from(s: String) -> Self {
        CodeGenError::Internal(s)
    }
}

impl From<std::fmt::Error> for CodeGenError {
    fn from(e: std::fmt::Error) -> Self {
        CodeGenError::Format(e)
    }
}

type Result<T> = std::result::Result<T, CodeGenError>;

/// An already-lowered value: either a literal/constant operand or a
/// register name, plus the DDP type it carries. Constants are substituted
/// directly as LLVM operands rather than first being loaded into a
/// register — LLVM permits an immediate anywhere an SSA value is valid.
#[derive(Debug, Clone)]
struct Val {
    operand: String,
    ty: Type,
}

impl Val {
    fn new(operand: impl Into<String>, ty: Type) -> Self {
        Val { operand: operand.into(), ty }
    }
}

fn llvm_type(ty: Type) -> &'static str {
    match ty {
        Type::Primitive(Primitive::Zahl) => "i64",
        Type::Primitive(Primitive::Kommazahl) => "double",
        Type::Primitive(Primitive::Boolean) => "i64",
        Type::Primitive(Primitive::Buchstabe) => "i32",
        Type::Primitive(Primitive::Text) => "ptr",
        Type::List(_) => "ptr",
    }
}

fn list_tag(p: Primitive) -> &'static str {
    match p {
        Primitive::Zahl => "int",
        Primitive::Kommazahl => "float",
        Primitive::Boolean => "bool",
        Primitive::Buchstabe => "char",
        Primitive::Text => "string",
    }
}

/// Named LLVM struct type for a `Liste von <p>` (`%ddpintlist` etc.) —
/// visible layout only, the refcount header sits before it and is opaque
/// to emitted IR (spec §4.8 "the cell's address is what the value's
/// hidden header points at").
fn list_struct_name(p: Primitive) -> String {
    format!("%ddp{}list", list_tag(p))
}

fn free_fn(ty: Type) -> Result<String> {
    match ty {
        Type::Primitive(Primitive::Text) => Ok("_ddp_free_string".into()),
        Type::List(p) => Ok(format!("_ddp_free_{}list", list_tag(p))),
        _ => Err(CodeGenError::Internal(format!("{ty} ist kein Heap-Typ"))),
    }
}

fn deep_copy_fn(ty: Type) -> Result<String> {
    match ty {
        Type::Primitive(Primitive::Text) => Ok("_ddp_deep_copy_string".into()),
        Type::List(p) => Ok(format!("_ddp_deep_copy_{}list", list_tag(p))),
        _ => Err(CodeGenError::Internal(format!("{ty} ist kein Heap-Typ"))),
    }
}

fn equal_fn(ty: Type) -> Result<String> {
    match ty {
        Type::Primitive(Primitive::Text) => Ok("_ddp_string_equal".into()),
        Type::List(p) => Ok(format!("_ddp_{}list_equal", list_tag(p))),
        _ => Err(CodeGenError::Internal(format!("{ty} hat keine verkettete Gleichheitsfunktion"))),
    }
}

/// Concatenation dispatch table (spec §4.4 "verkettet"). Tag-driven rather
/// than hand-enumerated, since the runtime's own naming
/// (`_ddp_<tag>list_<tag>list_verkettet`, `_ddp_<tag>list_<tag>_verkettet`,
/// `_ddp_<tag>_<tag>list_verkettet`, `_ddp_<tag>_<tag>_verkettet`) is
/// perfectly regular for every primitive except `Buchstabe`, which the
/// runtime carves out into the `Text` family instead of a two-element
/// `Liste von Buchstabe` (spec §4.4's own text/char combination rule).
fn concat_runtime_fn(lhs: Type, rhs: Type) -> Result<(String, Type)> {
    use Primitive::*;
    match (lhs, rhs) {
        (Type::List(a), Type::List(b)) if a == b => {
            Ok((format!("_ddp_{0}list_{0}list_verkettet", list_tag(a)), Type::List(a)))
        }
        (Type::List(a), Type::Primitive(b)) if a == b => {
            Ok((format!("_ddp_{0}list_{0}_verkettet", list_tag(a)), Type::List(a)))
        }
        (Type::Primitive(a), Type::List(b)) if a == b => {
            Ok((format!("_ddp_{0}_{0}list_verkettet", list_tag(a)), Type::List(a)))
        }
        (Type::Primitive(Text), Type::Primitive(Text)) => {
            Ok(("_ddp_string_string_verkettet".into(), Type::Primitive(Text)))
        }
        (Type::Primitive(Text), Type::Primitive(Buchstabe)) => {
            Ok(("_ddp_string_char_verkettet".into(), Type::Primitive(Text)))
        }
        (Type::Primitive(Buchstabe), Type::Primitive(Text)) => {
            Ok(("_ddp_char_string_verkettet".into(), Type::Primitive(Text)))
        }
        (Type::Primitive(Buchstabe), Type::Primitive(Buchstabe)) => {
            Ok(("_ddp_char_char_verkettet".into(), Type::Primitive(Text)))
        }
        (Type::Primitive(a), Type::Primitive(b)) if a == b => {
            Ok((format!("_ddp_{0}_{0}_verkettet", list_tag(a)), Type::List(a)))
        }
        _ => Err(CodeGenError::Internal(format!("keine verkettet-Funktion für {lhs} und {rhs}"))),
    }
}

/// Heap-typed locals tracked for release when their declaring block exits
/// (spec §4.5 "scope stack mirrors the AST scope tree").
#[derive(Default)]
struct ScopeFrame {
    /// `(slot register, type)` for each heap-typed local declared directly
    /// in this scope — the slot holds a pointer to the *current* value, so
    /// release re-loads it rather than freeing a stale snapshot.
    heap_locals: Vec<(String, Type)>,
}

/// One identifier's storage: either a stack slot allocated by the callee
/// (`alloca`, for by-value params and plain locals) or an incoming pointer
/// owned by the caller (reference params — no separate alloca, the
/// parameter pointer *is* the slot).
#[derive(Clone)]
struct Slot {
    ptr: String,
    ty: Type,
}

pub struct Emitter {
    preamble: String,
    functions: String,
    body: String,
    string_constants: HashMap<String, String>,
    string_counter: usize,
    reg_counter: usize,
    label_counter: usize,
    locals: HashMap<usize, Slot>,
    scopes: Vec<ScopeFrame>,
    current_return_type: Option<Type>,
}

impl Default for Emitter {
    fn default() -> Self {
        Emitter {
            preamble: String::new(),
            functions: String::new(),
            body: String::new(),
            string_constants: HashMap::new(),
            string_counter: 0,
            reg_counter: 0,
            label_counter: 0,
            locals: HashMap::new(),
            scopes: Vec::new(),
            current_return_type: None,
        }
    }
}

/// Lowers a resolved, type-checked `program` to a complete `.ll` module
/// (spec §4.5 whole section). Callers are expected to have already
/// checked `sink.faulty()` — this function assumes a well-typed tree and
/// reports only compiler-internal inconsistencies.
pub fn emit_module(program: &Program) -> Result<String> {
    let mut cg = Emitter::default();
    cg.emit_preamble();

    let mut main_stmts = Vec::new();
    for stmt in &program.top_level {
        match stmt {
            Stmt::Decl(d) if matches!(&*d.borrow(), Decl::Func(_)) => cg.emit_function(d)?,
            other => main_stmts.push(other.clone()),
        }
    }
    cg.emit_main(&main_stmts)?;

    let mut out = String::new();
    out.push_str(&cg.preamble);
    out.push_str(&cg.functions);
    Ok(out)
}

/// Emits just the named list/string struct types and their runtime
/// function declarations, with no `_ddp_ddpmain` and no user functions —
/// the `.ll` module `kddp dump-list-defs` writes out (spec §6). Useful for
/// inspecting or pre-building the list-type definitions the link step
/// consumes without compiling a whole program.
pub fn emit_list_defs() -> String {
    let mut cg = Emitter::default();
    cg.emit_preamble();
    cg.preamble
}

impl Emitter {
    fn fresh_reg(&mut self) -> String {
        self.reg_counter += 1;
        format!("%t{}", self.reg_counter)
    }

    fn fresh_label(&mut self, hint: &str) -> String {
        self.label_counter += 1;
        format!("{hint}{}", self.label_counter)
    }

    fn emit(&mut self, line: impl std::fmt::Display) -> Result<()> {
        writeln!(self.body, "  {line}")?;
        Ok(())
    }

    fn emit_label(&mut self, label: &str) -> Result<()> {
        writeln!(self.body, "{label}:")?;
        Ok(())
    }

    /// Interns a string literal, emitting a fresh `@.str.N` global the
    /// first time a given text is seen (spec §4.5's "literal" lowering for
    /// `Text`).
    fn string_global(&mut self, s: &str) -> Result<String> {
        if let Some(name) = self.string_constants.get(s) {
            return Ok(name.clone());
        }
        let name = format!("@.str.{}", self.string_counter);
        self.string_counter += 1;
        let bytes = s.as_bytes();
        let mut escaped = String::new();
        for &b in bytes {
            if b == b'"' || b == b'\\' || b < 0x20 || b >= 0x7f {
                write!(escaped, "\\{b:02X}")?;
            } else {
                escaped.push(b as char);
            }
        }
        writeln!(
            self.preamble,
            "{name} = private unnamed_addr constant [{} x i8] c\"{escaped}\\00\"",
            bytes.len() + 1
        )?;
        self.string_constants.insert(s.to_string(), name.clone());
        Ok(name)
    }

    fn emit_preamble(&mut self) {
        self.preamble.push_str(
            "; DDP compiled module (spec \u{a7}4.5 \"Module preamble\")\n\
             target triple = \"x86_64-unknown-linux-gnu\"\n\n",
        );
        for p in [Primitive::Zahl, Primitive::Kommazahl, Primitive::Boolean, Primitive::Buchstabe, Primitive::Text] {
            let elem = match p {
                Primitive::Text => "ptr".to_string(),
                Primitive::Buchstabe => "i32".to_string(),
                _ => llvm_type(Type::Primitive(p)).to_string(),
            };
            let _ = writeln!(self.preamble, "{} = type {{ {elem}*, i64, i64 }}", list_struct_name(p));
        }
        self.preamble.push_str("%ddpstring = type { i8*, i64 }\n\n");

        let decls = [
            "declare ptr @_ddp_string_from_constant(ptr)",
            "declare ptr @_ddp_deep_copy_string(ptr)",
            "declare void @_ddp_free_string(ptr)",
            "declare i64 @_ddp_string_equal(ptr, ptr)",
            "declare i64 @_ddp_string_length(ptr)",
            "declare i32 @_ddp_string_index(ptr, i64)",
            "declare ptr @_ddp_string_slice(ptr, i64, i64)",
            "declare void @_ddp_replace_char_in_string(ptr, i64, i32)",
            "declare i64 @_ddp_string_to_int(ptr)",
            "declare double @_ddp_string_to_float(ptr)",
            "declare ptr @_ddp_int_to_string(i64)",
            "declare ptr @_ddp_float_to_string(double)",
            "declare ptr @_ddp_bool_to_string(i64)",
            "declare ptr @_ddp_char_to_string(i32)",
            "declare ptr @_ddp_string_string_verkettet(ptr, ptr)",
            "declare ptr @_ddp_string_char_verkettet(ptr, i32)",
            "declare ptr @_ddp_char_string_verkettet(i32, ptr)",
            "declare ptr @_ddp_char_char_verkettet(i32, i32)",
            "declare void @_ddp_write_int(i64)",
            "declare void @_ddp_write_float(double)",
            "declare void @_ddp_write_bool(i64)",
            "declare void @_ddp_write_char(i32)",
            "declare void @_ddp_write_string(ptr)",
            "declare i64 @llabs(i64)",
            "declare double @fabs(double)",
            "declare double @pow(double, double)",
            "declare double @log10(double)",
            "declare double @_ddp_sin(double)",
            "declare double @_ddp_cos(double)",
            "declare double @_ddp_tan(double)",
            "declare double @_ddp_asin(double)",
            "declare double @_ddp_acos(double)",
            "declare double @_ddp_atan(double)",
            "declare double @_ddp_sinh(double)",
            "declare double @_ddp_cosh(double)",
            "declare double @_ddp_tanh(double)",
            "declare void @out_of_bounds(i64, i64)",
        ];
        for d in decls {
            let _ = writeln!(self.preamble, "{d}");
        }
        self.preamble.push('\n');

        for p in [Primitive::Zahl, Primitive::Kommazahl, Primitive::Boolean, Primitive::Buchstabe, Primitive::Text] {
            let tag = list_tag(p);
            let elem_ty = match p {
                Primitive::Text => "ptr",
                Primitive::Buchstabe => "i32",
                _ => llvm_type(Type::Primitive(p)),
            };
            let l = list_struct_name(p);
            let decls = [
                format!("declare ptr @_ddp_{tag}list_from_constants(i64)"),
                format!("declare void @_ddp_free_{tag}list(ptr)"),
                format!("declare ptr @_ddp_deep_copy_{tag}list(ptr)"),
                format!("declare i64 @_ddp_{tag}list_equal(ptr, ptr)"),
                format!("declare ptr @_ddp_{tag}list_slice(ptr, i64, i64)"),
                format!("declare {elem_ty} @_ddp_{tag}list_get(ptr, i64)"),
                format!("declare void @_ddp_{tag}list_set(ptr, i64, {elem_ty})"),
                format!("declare ptr @_ddp_{tag}list_{tag}list_verkettet(ptr, ptr)"),
                format!("declare ptr @_ddp_{tag}list_{tag}_verkettet(ptr, {elem_ty})"),
                format!("declare ptr @_ddp_{tag}_{tag}list_verkettet({elem_ty}, ptr)"),
            ];
            for d in decls {
                let _ = writeln!(self.preamble, "{d}");
            }
            let _ = l; // struct name only needed for the type decl above
        }
        self.preamble.push_str(
            "declare ptr @_ddp_int_int_verkettet(i64, i64)\n\
             declare ptr @_ddp_float_float_verkettet(double, double)\n\
             declare ptr @_ddp_bool_bool_verkettet(i64, i64)\n\n",
        );
    }

    // ---- scope management --------------------------------------------

    fn push_scope(&mut self) {
        self.scopes.push(ScopeFrame::default());
    }

    fn track_heap_local(&mut self, slot: &str, ty: Type) {
        if ty.is_heap() {
            self.scopes
                .last_mut()
                .expect("a scope is always active while emitting statements")
                .heap_locals
                .push((slot.to_string(), ty));
        }
    }

    /// Releases every heap local this frame owns, deepest-declared first,
    /// by re-loading the slot's current value (an assignment may have
    /// replaced it since declaration) and calling the matching `_ddp_free_*`.
    fn release_frame(&mut self, frame: &ScopeFrame) -> Result<()> {
        for (slot, ty) in frame.heap_locals.iter().rev() {
            let v = self.fresh_reg();
            self.emit(format!("{v} = load ptr, ptr {slot}"))?;
            let free = free_fn(*ty)?;
            self.emit(format!("call void @{free}(ptr {v})"))?;
        }
        Ok(())
    }

    fn pop_scope_releasing(&mut self) -> Result<()> {
        let frame = self.scopes.pop().expect("pop_scope_releasing without a matching push_scope");
        self.release_frame(&frame)
    }

    /// Releases every scope from the top down to (and including) the
    /// function's own base scope, without popping them — used for a
    /// `Rückgabe` nested inside blocks/loops, which unwinds past enclosing
    /// scopes but does not end them (the statements lexically after the
    /// `Rückgabe`, if any, become unreachable IR rather than disappearing).
    fn release_all_scopes(&mut self) -> Result<()> {
        for i in (0..self.scopes.len()).rev() {
            let frame = std::mem::take(&mut self.scopes[i]);
            self.release_frame(&frame)?;
            self.scopes[i] = frame;
        }
        Ok(())
    }

    fn decl_key(decl: &DeclRef) -> usize {
        Rc::as_ptr(decl) as usize
    }

    // ---- functions ------------------------------------------------------

    fn emit_function(&mut self, decl_ref: &DeclRef) -> Result<()> {
        let f = match &*decl_ref.borrow() {
            Decl::Func(f) => f.clone(),
            _ => return Ok(()),
        };
        if f.extern_file.is_some() {
            // Declared elsewhere — no body to emit (spec §3 "FuncDecl{...,
            // extern_file?}"). The linker resolves the symbol from the
            // named object file via crate::driver.
            return Ok(());
        }
        let Some(body) = &f.body else { return Ok(()) };

        self.locals.clear();
        self.scopes.clear();
        self.reg_counter = 0;
        self.label_counter = 0;
        self.current_return_type = f.return_type;

        let ret_ty = f.return_type.map(llvm_type).unwrap_or("void");
        let params: Vec<String> = f
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{} %arg{i}", llvm_type(p.param_type)))
            .collect();
        self.body = String::new();
        writeln!(
            self.functions,
            "define {ret_ty} @{}({}) {{",
            mangle_function_name(&f.name),
            params.join(", ")
        )?;
        self.emit_label("entry")?;
        self.push_scope();

        // Spill non-reference parameters into fresh stack slots so every
        // in-body read/assignment is uniform with an ordinary local (spec
        // §4.5 "non-ref params spilled to fresh stack slots on entry");
        // reference parameters already are a slot — the incoming pointer.
        let param_decls = body_param_decls(&f);
        for (i, p) in f.params.iter().enumerate() {
            let arg = format!("%arg{i}");
            let lty = llvm_type(p.param_type);
            let decl = param_decls[i].clone();
            if p.is_ref {
                self.locals.insert(Self::decl_key(&decl), Slot { ptr: arg, ty: p.param_type });
            } else {
                let slot = self.fresh_reg();
                self.emit(format!("{slot} = alloca {lty}"))?;
                self.emit(format!("store {lty} {arg}, ptr {slot}"))?;
                self.locals.insert(Self::decl_key(&decl), Slot { ptr: slot.clone(), ty: p.param_type });
                self.track_heap_local(&slot, p.param_type);
            }
        }

        for stmt in &body.statements {
            self.emit_stmt(stmt)?;
        }
        self.pop_scope_releasing()?;
        match f.return_type {
            Some(t) => {
                // Only reached if the body fell through without a
                // `Rückgabe` on every path — the type checker does not
                // itself prove exhaustive return coverage, so emit a
                // trapping default rather than falling off the end of a
                // non-void function.
                let lty = llvm_type(t);
                let zero = match t {
                    Type::Primitive(Primitive::Kommazahl) => "0.0".to_string(),
                    _ if t.is_heap() => "null".to_string(),
                    _ => "0".to_string(),
                };
                self.emit(format!("ret {lty} {zero}"))?;
            }
            None => self.emit("ret void")?,
        }
        self.functions.push_str(&self.body);
        self.body = String::new();
        writeln!(self.functions, "}}")?;
        Ok(())
    }

    /// `_ddp_ddpmain()` wraps every top-level statement that isn't itself
    /// a function declaration (spec §4.5 "main entry `_ddp_ddpmain()`").
    fn emit_main(&mut self, stmts: &[Stmt]) -> Result<()> {
        self.locals.clear();
        self.scopes.clear();
        self.reg_counter = 0;
        self.label_counter = 0;
        self.current_return_type = None;

        self.body = String::new();
        writeln!(self.functions, "define i64 @_ddp_ddpmain() {{")?;
        self.emit_label("entry")?;
        self.push_scope();
        for stmt in stmts {
            self.emit_stmt(stmt)?;
        }
        self.pop_scope_releasing()?;
        self.emit("ret i64 0")?;
        self.functions.push_str(&self.body);
        self.body = String::new();
        writeln!(self.functions, "}}")?;
        Ok(())
    }

    // ---- statements ------------------------------------------------------

    fn emit_block(&mut self, block: &Block) -> Result<()> {
        self.push_scope();
        for stmt in &block.statements {
            self.emit_stmt(stmt)?;
        }
        self.pop_scope_releasing()
    }

    fn emit_local_decl(&mut self, decl_ref: &DeclRef) -> Result<()> {
        let (name, ty, init) = match &*decl_ref.borrow() {
            Decl::Var(v) => (v.name.clone(), v.declared_type, v.init.clone()),
            Decl::Func(_) => return Ok(()), // nested function decls aren't part of SPEC_FULL's surface
            Decl::Bad(_) => return Ok(()),
        };
        let lty = llvm_type(ty);
        let slot = self.fresh_reg();
        self.emit(format!("{slot} = alloca {lty}"))?;
        let value = match init {
            Some(e) => self.emit_expr(&e)?,
            None => Val::new(default_operand(ty), ty),
        };
        self.emit(format!("store {lty} {}, ptr {slot}", value.operand))?;
        self.locals.insert(Self::decl_key(decl_ref), Slot { ptr: slot.clone(), ty });
        let _ = name;
        self.track_heap_local(&slot, ty);
        Ok(())
    }

    fn emit_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Decl(d) => self.emit_local_decl(d),
            Stmt::Expr(e) => {
                let v = self.emit_expr(e)?;
                if v.ty.is_heap() {
                    // A bare expression-statement value has no owner to
                    // hand it to — release it immediately rather than leak
                    // it (spec §4.7 "every expression produces either a
                    // non-heap scalar or a newly owned heap value").
                    let free = free_fn(v.ty)?;
                    self.emit(format!("call void @{free}(ptr {})", v.operand))?;
                }
                Ok(())
            }
            Stmt::Assign { target, value, .. } => self.emit_assign(target, value),
            Stmt::Block(b) => self.emit_block(b),
            Stmt::If { cond, then_branch, else_branch, .. } => self.emit_if(cond, then_branch, else_branch.as_ref()),
            Stmt::While { cond, body, .. } => self.emit_while(cond, body),
            Stmt::DoWhile { body, cond, .. } => self.emit_do_while(body, cond),
            Stmt::RepeatNTimes { count, body, .. } => self.emit_repeat(count, body),
            Stmt::ForCounting { counter, from, to, step, body, .. } => {
                self.emit_for_counting(counter, from, to, step.as_ref(), body)
            }
            Stmt::ForEach { element, iterable, body, .. } => self.emit_for_each(element, iterable, body),
            Stmt::Return { value, .. } => self.emit_return(value.as_ref()),
            Stmt::Bad(_) => Ok(()),
        }
    }

    fn slot_ptr_of(&self, target: &Expr) -> Result<(String, Type)> {
        match target {
            Expr::Ident { declaration: Some(d), .. } => {
                let slot = self
                    .locals
                    .get(&Self::decl_key(d))
                    .ok_or_else(|| CodeGenError::Internal("Variable ohne Speicherplatz".to_string()))?;
                Ok((slot.ptr.clone(), slot.ty))
            }
            _ => Err(CodeGenError::Internal("Ziel ist keine einfache Variable".to_string())),
        }
    }

    fn emit_assign(&mut self, target: &Expr, value: &Expr) -> Result<()> {
        match target {
            Expr::Indexing { target: container, index, .. } => {
                return self.emit_indexed_assign(container, index, value);
            }
            _ => {}
        }
        let (slot, ty) = self.slot_ptr_of(target)?;
        let new_val = self.emit_expr(value)?;
        if ty.is_heap() {
            let old = self.fresh_reg();
            self.emit(format!("{old} = load ptr, ptr {slot}"))?;
            let free = free_fn(ty)?;
            self.emit(format!("call void @{free}(ptr {old})"))?;
        }
        self.emit(format!("store {} {}, ptr {slot}", llvm_type(ty), new_val.operand))?;
        Ok(())
    }

    /// `ziel[i] ist wert.` — indexed assignment (spec §4.5 "Assignment":
    /// "`_ddp_replace_char_in_string` for indexed text assignment"; a list
    /// element write goes through the bounds-checked `_ddp_<T>list_set`,
    /// which already releases the previous element itself).
    fn emit_indexed_assign(&mut self, container: &Expr, index: &Expr, value: &Expr) -> Result<()> {
        let (slot, container_ty) = self.slot_ptr_of(container)?;
        let container_ptr = self.fresh_reg();
        self.emit(format!("{container_ptr} = load ptr, ptr {slot}"))?;
        let idx = self.emit_expr(index)?;
        let val = self.emit_expr(value)?;
        match container_ty {
            Type::Primitive(Primitive::Text) => {
                self.emit(format!(
                    "call void @_ddp_replace_char_in_string(ptr {container_ptr}, i64 {}, i32 {})",
                    idx.operand, val.operand
                ))?;
            }
            Type::List(p) => {
                let tag = list_tag(p);
                let elem_ty = llvm_type(Type::Primitive(p));
                self.emit(format!(
                    "call void @_ddp_{tag}list_set(ptr {container_ptr}, i64 {}, {elem_ty} {})",
                    idx.operand, val.operand
                ))?;
            }
            _ => return Err(CodeGenError::Internal("Indizierte Zuweisung auf Nicht-Container".into())),
        }
        Ok(())
    }

    fn emit_return(&mut self, value: Option<&Expr>) -> Result<()> {
        match value {
            Some(e) => {
                let v = self.emit_expr(e)?;
                // Unwind every open scope, but never release the value
                // we're about to return even if it happens to sit in a
                // tracked local's slot (it's a freshly synthesized SSA
                // value here, not a slot, so nothing extra to special-case).
                self.release_all_scopes()?;
                self.emit(format!("ret {} {}", llvm_type(v.ty), v.operand))?;
            }
            None => {
                self.release_all_scopes()?;
                self.emit("ret void")?;
            }
        }
        // Anything lexically following the `Rückgabe` is unreachable but
        // must still sit in a well-formed block with its own terminator.
        let label = self.fresh_label("after_return");
        self.emit_label(&label)?;
        Ok(())
    }

    fn emit_if(&mut self, cond: &Expr, then_branch: &Block, else_branch: Option<&Block>) -> Result<()> {
        let c = self.emit_expr(cond)?;
        let cbit = self.fresh_reg();
        self.emit(format!("{cbit} = icmp ne i64 {}, 0", c.operand))?;
        let then_label = self.fresh_label("if_then");
        let else_label = self.fresh_label("if_else");
        let end_label = self.fresh_label("if_end");
        self.emit(format!("br i1 {cbit}, label %{then_label}, label %{else_label}"))?;

        self.emit_label(&then_label)?;
        self.emit_block(then_branch)?;
        self.emit(format!("br label %{end_label}"))?;

        self.emit_label(&else_label)?;
        if let Some(eb) = else_branch {
            self.emit_block(eb)?;
        }
        self.emit(format!("br label %{end_label}"))?;

        self.emit_label(&end_label)?;
        Ok(())
    }

    fn emit_while(&mut self, cond: &Expr, body: &Block) -> Result<()> {
        let cond_label = self.fresh_label("while_cond");
        let body_label = self.fresh_label("while_body");
        let end_label = self.fresh_label("while_end");
        self.emit(format!("br label %{cond_label}"))?;

        self.emit_label(&cond_label)?;
        let c = self.emit_expr(cond)?;
        let cbit = self.fresh_reg();
        self.emit(format!("{cbit} = icmp ne i64 {}, 0", c.operand))?;
        self.emit(format!("br i1 {cbit}, label %{body_label}, label %{end_label}"))?;

        self.emit_label(&body_label)?;
        self.emit_block(body)?;
        self.emit(format!("br label %{cond_label}"))?;

        self.emit_label(&end_label)?;
        Ok(())
    }

    fn emit_do_while(&mut self, body: &Block, cond: &Expr) -> Result<()> {
        let body_label = self.fresh_label("dowhile_body");
        let end_label = self.fresh_label("dowhile_end");
        self.emit(format!("br label %{body_label}"))?;

        self.emit_label(&body_label)?;
        // The condition is evaluated after the body in the body's own
        // scope (spec §4.3 resolver note mirrored here), so it's lowered
        // inline before the scope that declared the body's locals closes.
        self.push_scope();
        for s in &body.statements {
            self.emit_stmt(s)?;
        }
        let c = self.emit_expr(cond)?;
        let cbit = self.fresh_reg();
        self.emit(format!("{cbit} = icmp ne i64 {}, 0", c.operand))?;
        self.pop_scope_releasing()?;
        self.emit(format!("br i1 {cbit}, label %{body_label}, label %{end_label}"))?;

        self.emit_label(&end_label)?;
        Ok(())
    }

    fn emit_repeat(&mut self, count: &Expr, body: &Block) -> Result<()> {
        let count_val = self.emit_expr(count)?;
        let counter_slot = self.fresh_reg();
        self.emit(format!("{counter_slot} = alloca i64"))?;
        self.emit(format!("store i64 0, ptr {counter_slot}"))?;

        let cond_label = self.fresh_label("repeat_cond");
        let body_label = self.fresh_label("repeat_body");
        let end_label = self.fresh_label("repeat_end");
        self.emit(format!("br label %{cond_label}"))?;

        self.emit_label(&cond_label)?;
        let cur = self.fresh_reg();
        self.emit(format!("{cur} = load i64, ptr {counter_slot}"))?;
        let cbit = self.fresh_reg();
        self.emit(format!("{cbit} = icmp slt i64 {cur}, {}", count_val.operand))?;
        self.emit(format!("br i1 {cbit}, label %{body_label}, label %{end_label}"))?;

        self.emit_label(&body_label)?;
        self.emit_block(body)?;
        let next = self.fresh_reg();
        self.emit(format!("{next} = add i64 {cur}, 1"))?;
        self.emit(format!("store i64 {next}, ptr {counter_slot}"))?;
        self.emit(format!("br label %{cond_label}"))?;

        self.emit_label(&end_label)?;
        Ok(())
    }

    /// `Für jede/jeden <Typ> <name> von <from> bis <to> [schritt <step>]
    /// mache:` (spec §4.5 "numeric for": "condition block chooses
    /// counting up or down by the sign of the step"). The counter is
    /// declared directly in the body's own scope (mirroring the resolver),
    /// so `Rückgabe` inside the body still sees it, and no separate
    /// enclosing scope is pushed here.
    fn emit_for_counting(
        &mut self,
        counter: &DeclRef,
        from: &Expr,
        to: &Expr,
        step: Option<&Expr>,
        body: &Block,
    ) -> Result<()> {
        let counter_ty = match &*counter.borrow() {
            Decl::Var(v) => v.declared_type,
            _ => Type::Primitive(Primitive::Zahl),
        };
        let lty = llvm_type(counter_ty);
        let from_val = self.emit_expr(from)?;
        let to_val = self.emit_expr(to)?;
        let step_val = match step {
            Some(s) => self.emit_expr(s)?,
            None => Val::new(if counter_ty == Type::Primitive(Primitive::Kommazahl) { "1.0" } else { "1" }, counter_ty),
        };

        self.push_scope();
        let slot = self.fresh_reg();
        self.emit(format!("{slot} = alloca {lty}"))?;
        self.emit(format!("store {lty} {}, ptr {slot}", from_val.operand))?;
        self.locals.insert(Self::decl_key(counter), Slot { ptr: slot.clone(), ty: counter_ty });

        let is_float = counter_ty == Type::Primitive(Primitive::Kommazahl);
        let step_neg = self.fresh_reg();
        if is_float {
            self.emit(format!("{step_neg} = fcmp olt double {}, 0.0", step_val.operand))?;
        } else {
            self.emit(format!("{step_neg} = icmp slt i64 {}, 0", step_val.operand))?;
        }

        let cond_label = self.fresh_label("for_cond");
        let body_label = self.fresh_label("for_body");
        let incr_label = self.fresh_label("for_incr");
        let end_label = self.fresh_label("for_end");
        self.emit(format!("br label %{cond_label}"))?;

        self.emit_label(&cond_label)?;
        let cur = self.fresh_reg();
        self.emit(format!("{cur} = load {lty}, ptr {slot}"))?;
        let cond_up = self.fresh_reg();
        let cond_down = self.fresh_reg();
        if is_float {
            self.emit(format!("{cond_up} = fcmp ole double {cur}, {}", to_val.operand))?;
            self.emit(format!("{cond_down} = fcmp oge double {cur}, {}", to_val.operand))?;
        } else {
            self.emit(format!("{cond_up} = icmp sle i64 {cur}, {}", to_val.operand))?;
            self.emit(format!("{cond_down} = icmp sge i64 {cur}, {}", to_val.operand))?;
        }
        let cbit = self.fresh_reg();
        self.emit(format!("{cbit} = select i1 {step_neg}, i1 {cond_down}, i1 {cond_up}"))?;
        self.emit(format!("br i1 {cbit}, label %{body_label}, label %{end_label}"))?;

        self.emit_label(&body_label)?;
        for s in &body.statements {
            self.emit_stmt(s)?;
        }
        self.emit(format!("br label %{incr_label}"))?;

        self.emit_label(&incr_label)?;
        let cur2 = self.fresh_reg();
        self.emit(format!("{cur2} = load {lty}, ptr {slot}"))?;
        let next = self.fresh_reg();
        if is_float {
            self.emit(format!("{next} = fadd double {cur2}, {}", step_val.operand))?;
        } else {
            self.emit(format!("{next} = add i64 {cur2}, {}", step_val.operand))?;
        }
        self.emit(format!("store {lty} {next}, ptr {slot}"))?;
        self.emit(format!("br label %{cond_label}"))?;

        self.emit_label(&end_label)?;
        self.pop_scope_releasing()?;
        Ok(())
    }

    /// `Für jedes/jeden <Typ> <name> in <iterable> mache:` (spec §4.5
    /// "for-each": "scope-tracked iterable temporary, pre-test
    /// length==0, loop variable deep-copied per iteration if text").
    fn emit_for_each(&mut self, element: &DeclRef, iterable: &Expr, body: &Block) -> Result<()> {
        let iter_val = self.emit_expr(iterable)?;
        self.push_scope();
        let iter_slot = self.fresh_reg();
        self.emit(format!("{iter_slot} = alloca ptr"))?;
        self.emit(format!("store ptr {}, ptr {iter_slot}", iter_val.operand))?;
        self.track_heap_local(&iter_slot, iter_val.ty);

        let elem_ty = match &*element.borrow() {
            Decl::Var(v) => v.declared_type,
            _ => return Err(CodeGenError::Internal("für-jeden-Element ohne Typ".into())),
        };
        let len = self.fresh_reg();
        match iter_val.ty {
            Type::Primitive(Primitive::Text) => {
                let container = self.fresh_reg();
                self.emit(format!("{container} = load ptr, ptr {iter_slot}"))?;
                self.emit(format!("{len} = call i64 @_ddp_string_length(ptr {container})"))?;
            }
            Type::List(_) => {
                let container = self.fresh_reg();
                self.emit(format!("{container} = load ptr, ptr {iter_slot}"))?;
                let len_ptr = self.fresh_reg();
                self.emit(format!("{len_ptr} = getelementptr {}, ptr {container}, i32 0, i32 1", list_struct_type_literal(iter_val.ty)?))?;
                self.emit(format!("{len} = load i64, ptr {len_ptr}"))?;
            }
            _ => return Err(CodeGenError::Internal("für-jeden über Nicht-Container".into())),
        }

        let idx_slot = self.fresh_reg();
        self.emit(format!("{idx_slot} = alloca i64"))?;
        self.emit(format!("store i64 1, ptr {idx_slot}"))?;

        let cond_label = self.fresh_label("foreach_cond");
        let body_label = self.fresh_label("foreach_body");
        let end_label = self.fresh_label("foreach_end");
        self.emit(format!("br label %{cond_label}"))?;

        self.emit_label(&cond_label)?;
        let idx = self.fresh_reg();
        self.emit(format!("{idx} = load i64, ptr {idx_slot}"))?;
        let cbit = self.fresh_reg();
        self.emit(format!("{cbit} = icmp sle i64 {idx}, {len}"))?;
        self.emit(format!("br i1 {cbit}, label %{body_label}, label %{end_label}"))?;

        self.emit_label(&body_label)?;
        self.push_scope();
        let container = self.fresh_reg();
        self.emit(format!("{container} = load ptr, ptr {iter_slot}"))?;
        let elem_slot = self.fresh_reg();
        let elem_lty = llvm_type(elem_ty);
        self.emit(format!("{elem_slot} = alloca {elem_lty}"))?;
        match iter_val.ty {
            Type::Primitive(Primitive::Text) => {
                let v = self.fresh_reg();
                self.emit(format!("{v} = call i32 @_ddp_string_index(ptr {container}, i64 {idx})"))?;
                self.emit(format!("store i32 {v}, ptr {elem_slot}"))?;
            }
            Type::List(p) => {
                let tag = list_tag(p);
                let v = self.fresh_reg();
                self.emit(format!("{v} = call {elem_lty} @_ddp_{tag}list_get(ptr {container}, i64 {idx})"))?;
                self.emit(format!("store {elem_lty} {v}, ptr {elem_slot}"))?;
            }
            _ => unreachable!(),
        }
        self.locals.insert(Self::decl_key(element), Slot { ptr: elem_slot.clone(), ty: elem_ty });
        self.track_heap_local(&elem_slot, elem_ty);
        for s in &body.statements {
            self.emit_stmt(s)?;
        }
        self.pop_scope_releasing()?;
        let idx_cur = self.fresh_reg();
        self.emit(format!("{idx_cur} = load i64, ptr {idx_slot}"))?;
        let idx_next = self.fresh_reg();
        self.emit(format!("{idx_next} = add i64 {idx_cur}, 1"))?;
        self.emit(format!("store i64 {idx_next}, ptr {idx_slot}"))?;
        self.emit(format!("br label %{cond_label}"))?;

        self.emit_label(&end_label)?;
        self.pop_scope_releasing()?;
        Ok(())
    }

    // ---- expressions ------------------------------------------------------

    fn emit_expr(&mut self, expr: &Expr) -> Result<Val> {
        match expr {
            Expr::IntLit(v, _) => Ok(Val::new(v.to_string(), Type::Primitive(Primitive::Zahl))),
            Expr::FloatLit(v, _) => Ok(Val::new(format_float_literal(*v), Type::Primitive(Primitive::Kommazahl))),
            Expr::BoolLit(v, _) => Ok(Val::new(if *v { "1" } else { "0" }, Type::Primitive(Primitive::Boolean))),
            Expr::CharLit(c, _) => Ok(Val::new((*c as u32).to_string(), Type::Primitive(Primitive::Buchstabe))),
            Expr::StringLit(s, _) => {
                let g = self.string_global(s)?;
                let reg = self.fresh_reg();
                self.emit(format!("{reg} = call ptr @_ddp_string_from_constant(ptr {g})"))?;
                Ok(Val::new(reg, Type::Primitive(Primitive::Text)))
            }
            Expr::ListLit { element_type, elements, .. } => self.emit_list_literal(*element_type, elements),
            Expr::ListRepeat { count, value, .. } => self.emit_list_repeat(count, value),
            Expr::Ident { declaration: Some(d), .. } => self.emit_ident_read(d),
            Expr::Ident { name, .. } => Err(CodeGenError::Internal(format!("unaufgelöster Bezeichner '{name}' erreichte die Codegenerierung"))),
            Expr::Indexing { target, index, .. } => self.emit_indexing(target, index),
            Expr::Unary { op, operand, .. } => self.emit_unary(*op, operand),
            Expr::Binary { op, lhs, rhs, .. } => self.emit_binary(*op, lhs, rhs),
            Expr::Slice { target, start, end, .. } => self.emit_slice(target, start, end),
            Expr::Cast { target_type, operand, .. } => self.emit_cast(*target_type, operand),
            Expr::TypeOp(op, _) => self.emit_type_op(op),
            Expr::Grouping { inner, .. } => self.emit_expr(inner),
            Expr::FuncCall { name, declaration, args, .. } => self.emit_call(name, declaration, args),
            Expr::Bad(_) => Err(CodeGenError::Internal("Bad-Knoten erreichte die Codegenerierung".into())),
        }
    }

    /// Reading an identifier deep-copies a heap-typed value so the read
    /// never aliases the variable's own owned storage (spec §4.5
    /// "identifier reads (deep-copy heap)").
    fn emit_ident_read(&mut self, decl: &DeclRef) -> Result<Val> {
        let slot = self
            .locals
            .get(&Self::decl_key(decl))
            .cloned()
            .ok_or_else(|| CodeGenError::Internal("Variable ohne Speicherplatz".to_string()))?;
        let raw = self.fresh_reg();
        self.emit(format!("{raw} = load {}, ptr {}", llvm_type(slot.ty), slot.ptr))?;
        if slot.ty.is_heap() {
            let copy_fn = deep_copy_fn(slot.ty)?;
            let copied = self.fresh_reg();
            self.emit(format!("{copied} = call ptr @{copy_fn}(ptr {raw})"))?;
            Ok(Val::new(copied, slot.ty))
        } else {
            Ok(Val::new(raw, slot.ty))
        }
    }

    /// `target[index]` — dispatches to the bounds-checked
    /// `_ddp_string_index`/`_ddp_<T>list_get`, which already calls
    /// `out_of_bounds` on a violation, so no separate bounds check is
    /// emitted here (spec §4.5 "Indexing read").
    fn emit_indexing(&mut self, target: &Expr, index: &Expr) -> Result<Val> {
        let t = self.emit_expr(target)?;
        let idx = self.emit_expr(index)?;
        match t.ty {
            Type::Primitive(Primitive::Text) => {
                let reg = self.fresh_reg();
                self.emit(format!("{reg} = call i32 @_ddp_string_index(ptr {}, i64 {})", t.operand, idx.operand))?;
                self.maybe_release(&t)?;
                Ok(Val::new(reg, Type::Primitive(Primitive::Buchstabe)))
            }
            Type::List(p) => {
                let tag = list_tag(p);
                let elem_ty = llvm_type(Type::Primitive(p));
                let reg = self.fresh_reg();
                self.emit(format!("{reg} = call {elem_ty} @_ddp_{tag}list_get(ptr {}, i64 {})", t.operand, idx.operand))?;
                self.maybe_release(&t)?;
                Ok(Val::new(reg, Type::Primitive(p)))
            }
            _ => Err(CodeGenError::Internal("Indizierung auf Nicht-Container".into())),
        }
    }

    fn emit_slice(&mut self, target: &Expr, start: &Expr, end: &Expr) -> Result<Val> {
        let t = self.emit_expr(target)?;
        let s = self.emit_expr(start)?;
        let e = self.emit_expr(end)?;
        let (fn_name, result_ty) = match t.ty {
            Type::Primitive(Primitive::Text) => ("_ddp_string_slice".to_string(), t.ty),
            Type::List(p) => (format!("_ddp_{}list_slice", list_tag(p)), t.ty),
            _ => return Err(CodeGenError::Internal("Slice auf Nicht-Container".into())),
        };
        let reg = self.fresh_reg();
        self.emit(format!("{reg} = call ptr @{fn_name}(ptr {}, i64 {}, i64 {})", t.operand, s.operand, e.operand))?;
        self.maybe_release(&t)?;
        Ok(Val::new(reg, result_ty))
    }

    /// Releases a heap-typed operand once it's been consumed read-only by
    /// a runtime call that doesn't take ownership of it (spec §4.5's
    /// general rule that every synthesized heap temporary is released by
    /// whoever produced it, unless handed off to something that now owns
    /// it — an indexing/slice *source* is never consumed, only read).
    fn maybe_release(&mut self, v: &Val) -> Result<()> {
        if v.ty.is_heap() {
            let free = free_fn(v.ty)?;
            self.emit(format!("call void @{free}(ptr {})", v.operand))?;
        }
        Ok(())
    }

    fn emit_unary(&mut self, op: UnaryOp, operand: &Expr) -> Result<Val> {
        let v = self.emit_expr(operand)?;
        match op {
            UnaryOp::Abs => {
                let reg = self.fresh_reg();
                match v.ty {
                    Type::Primitive(Primitive::Kommazahl) => self.emit(format!("{reg} = call double @fabs(double {})", v.operand))?,
                    _ => self.emit(format!("{reg} = call i64 @llabs(i64 {})", v.operand))?,
                }
                Ok(Val::new(reg, v.ty))
            }
            UnaryOp::Negate => {
                let reg = self.fresh_reg();
                match v.ty {
                    Type::Primitive(Primitive::Kommazahl) => self.emit(format!("{reg} = fneg double {}", v.operand))?,
                    _ => self.emit(format!("{reg} = sub i64 0, {}", v.operand))?,
                }
                Ok(Val::new(reg, v.ty))
            }
            UnaryOp::Length => {
                let reg = self.fresh_reg();
                match v.ty {
                    Type::Primitive(Primitive::Text) => self.emit(format!("{reg} = call i64 @_ddp_string_length(ptr {})", v.operand))?,
                    Type::List(p) => {
                        let len_ptr = self.fresh_reg();
                        self.emit(format!("{len_ptr} = getelementptr {}, ptr {}, i32 0, i32 1", list_struct_type_literal(Type::List(p))?, v.operand))?;
                        self.emit(format!("{reg} = load i64, ptr {len_ptr}"))?;
                    }
                    _ => return Err(CodeGenError::Internal("Länge auf Skalar".into())),
                }
                self.maybe_release(&v)?;
                Ok(Val::new(reg, Type::Primitive(Primitive::Zahl)))
            }
            UnaryOp::Size => {
                // `Größe von <Ausdruck>` — the byte size of the operand's
                // own (runtime) type, distinct from `TypeOp::SizeOf`'s
                // `die Größe von <Typ>` naming a type keyword directly.
                // The operand is evaluated for its type only; its value,
                // if heap-typed, is released unused.
                let size = match v.ty {
                    Type::Primitive(Primitive::Buchstabe) => 4,
                    _ => 8,
                };
                self.maybe_release(&v)?;
                Ok(Val::new(size.to_string(), Type::Primitive(Primitive::Zahl)))
            }
            UnaryOp::LogicalNot | UnaryOp::Not => {
                let reg = self.fresh_reg();
                self.emit(format!("{reg} = xor i64 {}, 1", v.operand))?;
                Ok(Val::new(reg, Type::Primitive(Primitive::Boolean)))
            }
        }
    }

    fn emit_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Result<Val> {
        match op {
            BinOp::And => return self.emit_short_circuit(lhs, rhs, false),
            BinOp::Or => return self.emit_short_circuit(lhs, rhs, true),
            _ => {}
        }
        let l = self.emit_expr(lhs)?;
        let r = self.emit_expr(rhs)?;
        match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => self.emit_arith(op, l, r),
            BinOp::Modulo => {
                let reg = self.fresh_reg();
                self.emit(format!("{reg} = srem i64 {}, {}", l.operand, r.operand))?;
                Ok(Val::new(reg, Type::Primitive(Primitive::Zahl)))
            }
            BinOp::Pow => {
                let (lf, rf) = (self.promote_to_float(&l)?, self.promote_to_float(&r)?);
                let reg = self.fresh_reg();
                self.emit(format!("{reg} = call double @pow(double {lf}, double {rf})"))?;
                Ok(Val::new(reg, Type::Primitive(Primitive::Kommazahl)))
            }
            BinOp::Logarithmus => {
                let (lf, rf) = (self.promote_to_float(&l)?, self.promote_to_float(&r)?);
                let la = self.fresh_reg();
                self.emit(format!("{la} = call double @log10(double {lf})"))?;
                let ra = self.fresh_reg();
                self.emit(format!("{ra} = call double @log10(double {rf})"))?;
                let reg = self.fresh_reg();
                self.emit(format!("{reg} = fdiv double {la}, {ra}"))?;
                Ok(Val::new(reg, Type::Primitive(Primitive::Kommazahl)))
            }
            BinOp::LogicalAnd => self.emit_int_binop("and", l, r),
            BinOp::LogicalOr => self.emit_int_binop("or", l, r),
            BinOp::Xor => self.emit_int_binop("xor", l, r),
            BinOp::ShiftLeft => self.emit_int_binop("shl", l, r),
            BinOp::ShiftRight => self.emit_int_binop("ashr", l, r),
            BinOp::Equal | BinOp::NotEqual => self.emit_equality(op, l, r),
            BinOp::Greater | BinOp::Less | BinOp::GreaterEq | BinOp::LessEq => self.emit_relation(op, l, r),
            BinOp::Concat => self.emit_concat(l, r),
            BinOp::And | BinOp::Or => unreachable!("handled above"),
        }
    }

    fn emit_int_binop(&mut self, mnemonic: &str, l: Val, r: Val) -> Result<Val> {
        let reg = self.fresh_reg();
        self.emit(format!("{reg} = {mnemonic} i64 {}, {}", l.operand, r.operand))?;
        Ok(Val::new(reg, Type::Primitive(Primitive::Zahl)))
    }

    fn promote_to_float(&mut self, v: &Val) -> Result<String> {
        if v.ty == Type::Primitive(Primitive::Kommazahl) {
            return Ok(v.operand.clone());
        }
        let reg = self.fresh_reg();
        self.emit(format!("{reg} = sitofp i64 {} to double", v.operand))?;
        Ok(reg)
    }

    /// Arithmetic with int→float promotion (spec §4.4: "any float
    /// involvement promotes to `Kommazahl`; division always yields
    /// `Kommazahl`").
    fn emit_arith(&mut self, op: BinOp, l: Val, r: Val) -> Result<Val> {
        if op == BinOp::Div {
            let (lf, rf) = (self.promote_to_float(&l)?, self.promote_to_float(&r)?);
            let reg = self.fresh_reg();
            self.emit(format!("{reg} = fdiv double {lf}, {rf}"))?;
            return Ok(Val::new(reg, Type::Primitive(Primitive::Kommazahl)));
        }
        let is_float = l.ty == Type::Primitive(Primitive::Kommazahl) || r.ty == Type::Primitive(Primitive::Kommazahl);
        if is_float {
            let (lf, rf) = (self.promote_to_float(&l)?, self.promote_to_float(&r)?);
            let mnemonic = match op {
                BinOp::Add => "fadd",
                BinOp::Sub => "fsub",
                BinOp::Mul => "fmul",
                _ => unreachable!(),
            };
            let reg = self.fresh_reg();
            self.emit(format!("{reg} = {mnemonic} double {lf}, {rf}"))?;
            Ok(Val::new(reg, Type::Primitive(Primitive::Kommazahl)))
        } else {
            let mnemonic = match op {
                BinOp::Add => "add",
                BinOp::Sub => "sub",
                BinOp::Mul => "mul",
                _ => unreachable!(),
            };
            let reg = self.fresh_reg();
            self.emit(format!("{reg} = {mnemonic} i64 {}, {}", l.operand, r.operand))?;
            Ok(Val::new(reg, Type::Primitive(Primitive::Zahl)))
        }
    }

    fn emit_equality(&mut self, op: BinOp, l: Val, r: Val) -> Result<Val> {
        let reg = self.fresh_reg();
        match l.ty {
            Type::Primitive(Primitive::Kommazahl) => {
                let pred = if op == BinOp::Equal { "oeq" } else { "one" };
                self.emit(format!("{reg} = fcmp {pred} double {}, {}", l.operand, r.operand))?;
            }
            Type::Primitive(Primitive::Text) | Type::List(_) => {
                let eq_fn = equal_fn(l.ty)?;
                let raw = self.fresh_reg();
                self.emit(format!("{raw} = call i64 @{eq_fn}(ptr {}, ptr {})", l.operand, r.operand))?;
                self.maybe_release(&l)?;
                self.maybe_release(&r)?;
                let pred = if op == BinOp::Equal { "ne" } else { "eq" };
                self.emit(format!("{reg} = icmp {pred} i64 {raw}, 0"))?;
                let boolreg = self.fresh_reg();
                self.emit(format!("{boolreg} = zext i1 {reg} to i64"))?;
                return Ok(Val::new(boolreg, Type::Primitive(Primitive::Boolean)));
            }
            _ => {
                // Zahl, Boolean, and Buchstabe operands — `llvm_type` picks
                // `i64`/`i32` correctly so a `Buchstabe` comparison doesn't
                // get miscompared as `i64`.
                let pred = if op == BinOp::Equal { "eq" } else { "ne" };
                self.emit(format!("{reg} = icmp {pred} {} {}, {}", llvm_type(l.ty), l.operand, r.operand))?;
            }
        }
        let boolreg = self.fresh_reg();
        self.emit(format!("{boolreg} = zext i1 {reg} to i64"))?;
        Ok(Val::new(boolreg, Type::Primitive(Primitive::Boolean)))
    }

    fn emit_relation(&mut self, op: BinOp, l: Val, r: Val) -> Result<Val> {
        let is_float = l.ty == Type::Primitive(Primitive::Kommazahl);
        let bit = self.fresh_reg();
        if is_float {
            let pred = match op {
                BinOp::Greater => "ogt",
                BinOp::Less => "olt",
                BinOp::GreaterEq => "oge",
                BinOp::LessEq => "ole",
                _ => unreachable!(),
            };
            self.emit(format!("{bit} = fcmp {pred} double {}, {}", l.operand, r.operand))?;
        } else {
            let pred = match op {
                BinOp::Greater => "sgt",
                BinOp::Less => "slt",
                BinOp::GreaterEq => "sge",
                BinOp::LessEq => "sle",
                _ => unreachable!(),
            };
            self.emit(format!("{bit} = icmp {pred} i64 {}, {}", l.operand, r.operand))?;
        }
        let reg = self.fresh_reg();
        self.emit(format!("{reg} = zext i1 {bit} to i64"))?;
        Ok(Val::new(reg, Type::Primitive(Primitive::Boolean)))
    }

    fn emit_concat(&mut self, l: Val, r: Val) -> Result<Val> {
        let (fn_name, result_ty) = concat_runtime_fn(l.ty, r.ty)?;
        let lty = llvm_type(l.ty);
        let rty = llvm_type(r.ty);
        let reg = self.fresh_reg();
        self.emit(format!("{reg} = call ptr @{fn_name}({lty} {}, {rty} {})", l.operand, r.operand))?;
        // The runtime's `_verkettet` family takes both operands by
        // ownership for the heap-typed side(s) and copies as needed
        // internally; the caller's own references are spent here.
        Ok(Val::new(reg, result_ty))
    }

    /// `und`/`oder` short-circuit (spec §4.5 "three-block diamond with
    /// phi"): `is_or` selects whether a `true` lhs (for `oder`) or a
    /// `false` lhs (for `und`) skips evaluating `rhs` entirely.
    fn emit_short_circuit(&mut self, lhs: &Expr, rhs: &Expr, is_or: bool) -> Result<Val> {
        let l = self.emit_expr(lhs)?;
        let lbit = self.fresh_reg();
        self.emit(format!("{lbit} = icmp ne i64 {}, 0", l.operand))?;
        let rhs_label = self.fresh_label("sc_rhs");
        let merge_label = self.fresh_label("sc_merge");
        let short_value = if is_or { "1" } else { "0" };
        if is_or {
            self.emit(format!("br i1 {lbit}, label %{merge_label}, label %{rhs_label}"))?;
        } else {
            self.emit(format!("br i1 {lbit}, label %{rhs_label}, label %{merge_label}"))?;
        }
        let pred_label = self.current_block_label();

        self.emit_label(&rhs_label)?;
        let r = self.emit_expr(rhs)?;
        let rbit = self.fresh_reg();
        self.emit(format!("{rbit} = icmp ne i64 {}, 0", r.operand))?;
        let rhs_end_label = self.current_block_label();
        self.emit(format!("br label %{merge_label}"))?;

        self.emit_label(&merge_label)?;
        let reg = self.fresh_reg();
        self.emit(format!(
            "{reg} = phi i1 [ {short_value}, %{pred_label} ], [ {rbit}, %{rhs_end_label} ]"
        ))?;
        let result = self.fresh_reg();
        self.emit(format!("{result} = zext i1 {reg} to i64"))?;
        Ok(Val::new(result, Type::Primitive(Primitive::Boolean)))
    }

    /// The label most recently opened with `emit_label`, tracked so a phi
    /// can name its predecessor block even though this emitter writes IR
    /// as flat text rather than building a basic-block graph in memory.
    fn current_block_label(&self) -> String {
        self.body
            .lines()
            .rev()
            .find_map(|l| l.strip_suffix(':').map(|s| s.to_string()))
            .unwrap_or_else(|| "entry".to_string())
    }

    fn emit_cast(&mut self, target: Type, operand: &Expr) -> Result<Val> {
        let v = self.emit_expr(operand)?;
        use Primitive::*;
        if v.ty == target {
            return Ok(v);
        }
        let reg = self.fresh_reg();
        match (v.ty, target) {
            (Type::Primitive(Kommazahl), Type::Primitive(Zahl)) => {
                self.emit(format!("{reg} = fptosi double {} to i64", v.operand))?;
                Ok(Val::new(reg, target))
            }
            (Type::Primitive(Zahl), Type::Primitive(Kommazahl)) | (Type::Primitive(Boolean), Type::Primitive(Kommazahl)) => {
                self.emit(format!("{reg} = sitofp i64 {} to double", v.operand))?;
                Ok(Val::new(reg, target))
            }
            (Type::Primitive(Zahl), Type::Primitive(Boolean)) => {
                let bit = self.fresh_reg();
                self.emit(format!("{bit} = icmp ne i64 {}, 0", v.operand))?;
                self.emit(format!("{reg} = zext i1 {bit} to i64"))?;
                Ok(Val::new(reg, target))
            }
            (Type::Primitive(Boolean), Type::Primitive(Zahl)) => Ok(Val::new(v.operand, target)),
            (Type::Primitive(Zahl), Type::Primitive(Buchstabe)) => {
                self.emit(format!("{reg} = trunc i64 {} to i32", v.operand))?;
                Ok(Val::new(reg, target))
            }
            (Type::Primitive(Buchstabe), Type::Primitive(Zahl)) => {
                self.emit(format!("{reg} = zext i32 {} to i64", v.operand))?;
                Ok(Val::new(reg, target))
            }
            (Type::Primitive(Text), Type::Primitive(Zahl)) => {
                self.emit(format!("{reg} = call i64 @_ddp_string_to_int(ptr {})", v.operand))?;
                self.maybe_release(&v)?;
                Ok(Val::new(reg, target))
            }
            (Type::Primitive(Text), Type::Primitive(Kommazahl)) => {
                self.emit(format!("{reg} = call double @_ddp_string_to_float(ptr {})", v.operand))?;
                self.maybe_release(&v)?;
                Ok(Val::new(reg, target))
            }
            (from, Type::Primitive(Text)) => {
                let conv = match from {
                    Type::Primitive(Zahl) => "_ddp_int_to_string",
                    Type::Primitive(Kommazahl) => "_ddp_float_to_string",
                    Type::Primitive(Boolean) => "_ddp_bool_to_string",
                    Type::Primitive(Buchstabe) => "_ddp_char_to_string",
                    Type::Primitive(Text) => "_ddp_deep_copy_string",
                    _ => return Err(CodeGenError::Internal(format!("ungültige Umwandlung nach Text von {from}"))),
                };
                self.emit(format!("{reg} = call ptr @{conv}({} {})", llvm_type(from), v.operand))?;
                if from == Type::Primitive(Text) {
                    self.maybe_release(&v)?;
                }
                Ok(Val::new(reg, target))
            }
            _ => Err(CodeGenError::Internal(format!("nicht unterstützte Umwandlung von {} nach {target}", v.ty))),
        }
    }

    fn emit_type_op(&mut self, op: &TypeOp) -> Result<Val> {
        match op {
            TypeOp::SizeOf(t) => {
                let size = match t {
                    Type::Primitive(Primitive::Zahl) | Type::Primitive(Primitive::Boolean) => 8,
                    Type::Primitive(Primitive::Kommazahl) => 8,
                    Type::Primitive(Primitive::Buchstabe) => 4,
                    Type::Primitive(Primitive::Text) | Type::List(_) => 8, // pointer width
                };
                Ok(Val::new(size.to_string(), Type::Primitive(Primitive::Zahl)))
            }
            TypeOp::DefaultOf(t) => Ok(Val::new(default_operand(*t), *t)),
        }
    }

    fn emit_list_literal(&mut self, element_type: Option<Type>, elements: &[Expr]) -> Result<Val> {
        // The parser always leaves `element_type` unset (list element type
        // is never written in the surface syntax of a literal) and the
        // type checker validates elements without writing a type back onto
        // the tree (spec §4.4 "does not store a type back") — so unlike
        // every other construct here, the element type isn't available
        // ahead of time. Evaluate the first element (if any) before
        // allocating the backing list, and take its type as the element
        // type, exactly as `typechecker::synth_list_literal` does.
        let mut values = Vec::with_capacity(elements.len());
        for el in elements {
            values.push(self.emit_expr(el)?);
        }
        let prim = match element_type {
            Some(Type::Primitive(p)) => Some(p),
            _ => None,
        };
        let prim = match prim.or_else(|| values.first().map(|v| match v.ty {
            Type::Primitive(p) => p,
            Type::List(_) => Primitive::Zahl, // nested lists are rejected by the type checker; never reached for a well-typed program
        })) {
            Some(p) => p,
            None => Primitive::Zahl, // `[]` with no context — matches `TypeOp::DefaultOf`'s numeric-first convention
        };
        let tag = list_tag(prim);
        let reg = self.fresh_reg();
        self.emit(format!("{reg} = call ptr @_ddp_{tag}list_from_constants(i64 {})", elements.len()))?;
        let elem_lty = llvm_type(Type::Primitive(prim));
        for (i, v) in values.into_iter().enumerate() {
            self.emit(format!("call void @_ddp_{tag}list_set(ptr {reg}, i64 {}, {elem_lty} {})", i + 1, v.operand))?;
        }
        Ok(Val::new(reg, Type::List(prim)))
    }

    /// `<count> mal <value>` (spec §4.5 "Literal" count+value form).
    fn emit_list_repeat(&mut self, count: &Expr, value: &Expr) -> Result<Val> {
        let count_val = self.emit_expr(count)?;
        let first = self.emit_expr(value)?;
        let prim = match first.ty {
            Type::Primitive(p) => p,
            _ => return Err(CodeGenError::Internal("Listenwiederholung mit Listenelement".into())),
        };
        let tag = list_tag(prim);
        let reg = self.fresh_reg();
        self.emit(format!("{reg} = call ptr @_ddp_{tag}list_from_constants(i64 {})", count_val.operand))?;

        let idx_slot = self.fresh_reg();
        self.emit(format!("{idx_slot} = alloca i64"))?;
        self.emit(format!("store i64 0, ptr {idx_slot}"))?;
        let cond_label = self.fresh_label("repeatlit_cond");
        let body_label = self.fresh_label("repeatlit_body");
        let end_label = self.fresh_label("repeatlit_end");
        self.emit(format!("br label %{cond_label}"))?;
        self.emit_label(&cond_label)?;
        let idx = self.fresh_reg();
        self.emit(format!("{idx} = load i64, ptr {idx_slot}"))?;
        let cbit = self.fresh_reg();
        self.emit(format!("{cbit} = icmp slt i64 {idx}, {}", count_val.operand))?;
        self.emit(format!("br i1 {cbit}, label %{body_label}, label %{end_label}"))?;

        self.emit_label(&body_label)?;
        let elem_lty = llvm_type(first.ty);
        let idx1 = self.fresh_reg();
        self.emit(format!("{idx1} = add i64 {idx}, 1"))?;
        let elem_for_this_slot = if first.ty.is_heap() {
            let copy_fn = deep_copy_fn(first.ty)?;
            let copy = self.fresh_reg();
            self.emit(format!("{copy} = call ptr @{copy_fn}(ptr {})", first.operand))?;
            copy
        } else {
            first.operand.clone()
        };
        self.emit(format!("call void @_ddp_{tag}list_set(ptr {reg}, i64 {idx1}, {elem_lty} {elem_for_this_slot})"))?;
        let next = self.fresh_reg();
        self.emit(format!("{next} = add i64 {idx}, 1"))?;
        self.emit(format!("store i64 {next}, ptr {idx_slot}"))?;
        self.emit(format!("br label %{cond_label}"))?;

        self.emit_label(&end_label)?;
        if first.ty.is_heap() {
            // The original sample value was only needed as a template for
            // the copies stored above.
            self.maybe_release(&first)?;
        }
        Ok(Val::new(reg, Type::List(prim)))
    }

    /// `Schreibe <expr>.` and any other runtime builtin (spec §4.6 "I/O
    /// family").
    fn emit_call(&mut self, name: &str, declaration: &Option<DeclRef>, args: &[(String, Expr)]) -> Result<Val> {
        if is_builtin_function(name) {
            return self.emit_builtin_call(name, args);
        }
        let decl = declaration
            .as_ref()
            .ok_or_else(|| CodeGenError::Internal(format!("Aufruf von '{name}' ohne aufgelöste Deklaration")))?;
        let f = match &*decl.borrow() {
            Decl::Func(f) => f.clone(),
            _ => return Err(CodeGenError::Internal(format!("'{name}' ist keine Funktion"))),
        };
        let mut arg_operands = Vec::new();
        for (param, (_, arg_expr)) in f.params.iter().zip(args.iter()) {
            if param.is_ref {
                // A reference argument passes the callee a pointer to the
                // caller's own storage, not a value (spec §4.5 "reference
                // args pass storage pointer").
                let (slot, ty) = self.slot_ptr_of(arg_expr)?;
                arg_operands.push(format!("{} {slot}", llvm_type(ty)));
            } else {
                let v = self.emit_expr(arg_expr)?;
                arg_operands.push(format!("{} {}", llvm_type(v.ty), v.operand));
                // A by-value heap argument is consumed by the callee,
                // which releases it as one of its own spilled locals —
                // the caller does not also free it.
            }
        }
        match f.return_type {
            Some(ret) => {
                let reg = self.fresh_reg();
                self.emit(format!(
                    "{reg} = call {} @{}({})",
                    llvm_type(ret),
                    mangle_function_name(&f.name),
                    arg_operands.join(", ")
                ))?;
                Ok(Val::new(reg, ret))
            }
            None => {
                self.emit(format!("call void @{}({})", mangle_function_name(&f.name), arg_operands.join(", ")))?;
                Ok(Val::new("0", Type::Primitive(Primitive::Zahl)))
            }
        }
    }

    fn emit_builtin_call(&mut self, name: &str, args: &[(String, Expr)]) -> Result<Val> {
        match name {
            "Schreibe" => {
                let Some((_, arg)) = args.first() else {
                    return Err(CodeGenError::Internal("Schreibe ohne Argument".into()));
                };
                let v = self.emit_expr(arg)?;
                let write_fn = match v.ty {
                    Type::Primitive(Primitive::Zahl) => "_ddp_write_int",
                    Type::Primitive(Primitive::Kommazahl) => "_ddp_write_float",
                    Type::Primitive(Primitive::Boolean) => "_ddp_write_bool",
                    Type::Primitive(Primitive::Buchstabe) => "_ddp_write_char",
                    Type::Primitive(Primitive::Text) => "_ddp_write_string",
                    Type::List(_) => return Err(CodeGenError::Internal("Schreibe kann keine Liste ausgeben".into())),
                };
                self.emit(format!("call void @{write_fn}({} {})", llvm_type(v.ty), v.operand))?;
                self.maybe_release(&v)?;
                Ok(Val::new("0", Type::Primitive(Primitive::Zahl)))
            }
            other => Err(CodeGenError::Internal(format!("unbekannte eingebaute Funktion '{other}'"))),
        }
    }
}

fn mangle_function_name(name: &str) -> String {
    format!("ddp_{}", name.replace(' ', "_"))
}

fn format_float_literal(v: f64) -> String {
    if v.fract() == 0.0 && v.is_finite() {
        format!("{v:.1e}")
    } else {
        format!("{v}")
    }
}

fn default_operand(ty: Type) -> String {
    match ty {
        Type::Primitive(Primitive::Kommazahl) => "0.0".to_string(),
        _ if ty.is_heap() => "null".to_string(),
        _ => "0".to_string(),
    }
}

fn list_struct_type_literal(ty: Type) -> Result<String> {
    match ty {
        Type::List(p) => Ok(list_struct_name(p)),
        _ => Err(CodeGenError::Internal("kein Listentyp".to_string())),
    }
}

/// Recovers the exact `DeclRef` instances the resolver created for each of
/// `f`'s parameters (spec §4.3: the resolver synthesizes one fresh
/// `DeclRef` per parameter and installs it in the body's own scope, so
/// every `Ident` referencing that parameter anywhere in the body shares
/// the same `Rc`). `FuncDecl` itself doesn't carry those back out, so this
/// walks the body once collecting the first `Ident` bound to a synthetic
/// `Var` decl matching each parameter's name — a parameter never
/// mentioned in its own body gets a fresh placeholder `DeclRef` instead,
/// which is safe because nothing in the tree can key a lookup against it.
fn body_param_decls(f: &FuncDecl) -> Vec<DeclRef> {
    let mut by_name: HashMap<String, DeclRef> = HashMap::new();
    if let Some(body) = &f.body {
        collect_ident_decls(body, &mut by_name);
    }
    f.params
        .iter()
        .map(|p| {
            by_name.get(&p.name).cloned().unwrap_or_else(|| {
                Rc::new(std::cell::RefCell::new(Decl::Var(crate::ast::VarDecl {
                    name: p.name.clone(),
                    declared_type: p.param_type,
                    init: None,
                    range: f.range.clone(),
                    is_synthetic: true,
                })))
            })
        })
        .collect()
}

fn collect_ident_decls(block: &Block, by_name: &mut HashMap<String, DeclRef>) {
    for stmt in &block.statements {
        collect_ident_decls_stmt(stmt, by_name);
    }
}

fn collect_ident_decls_stmt(stmt: &Stmt, by_name: &mut HashMap<String, DeclRef>) {
    match stmt {
        Stmt::Decl(d) => {
            if let Decl::Var(v) = &*d.borrow() {
                if let Some(init) = &v.init {
                    collect_ident_decls_expr(init, by_name);
                }
            }
        }
        Stmt::Expr(e) => collect_ident_decls_expr(e, by_name),
        Stmt::Assign { target, value, .. } => {
            collect_ident_decls_expr(target, by_name);
            collect_ident_decls_expr(value, by_name);
        }
        Stmt::Block(b) => collect_ident_decls(b, by_name),
        Stmt::If { cond, then_branch, else_branch, .. } => {
            collect_ident_decls_expr(cond, by_name);
            collect_ident_decls(then_branch, by_name);
            if let Some(eb) = else_branch {
                collect_ident_decls(eb, by_name);
            }
        }
        Stmt::While { cond, body, .. } => {
            collect_ident_decls_expr(cond, by_name);
            collect_ident_decls(body, by_name);
        }
        Stmt::DoWhile { body, cond, .. } => {
            collect_ident_decls(body, by_name);
            collect_ident_decls_expr(cond, by_name);
        }
        Stmt::RepeatNTimes { count, body, .. } => {
            collect_ident_decls_expr(count, by_name);
            collect_ident_decls(body, by_name);
        }
        Stmt::ForCounting { from, to, step, body, .. } => {
            collect_ident_decls_expr(from, by_name);
            collect_ident_decls_expr(to, by_name);
            if let Some(s) = step {
                collect_ident_decls_expr(s, by_name);
            }
            collect_ident_decls(body, by_name);
        }
        Stmt::ForEach { iterable, body, .. } => {
            collect_ident_decls_expr(iterable, by_name);
            collect_ident_decls(body, by_name);
        }
        Stmt::Return { value, .. } => {
            if let Some(v) = value {
                collect_ident_decls_expr(v, by_name);
            }
        }
        Stmt::Bad(_) => {}
    }
}

fn collect_ident_decls_expr(expr: &Expr, by_name: &mut HashMap<String, DeclRef>) {
    match expr {
        Expr::Ident { name, declaration: Some(d), .. } => {
            let is_synthetic_match = matches!(&*d.borrow(), Decl::Var(v) if v.is_synthetic && &v.name == name);
            if is_synthetic_match {
                by_name.entry(name.clone()).or_insert_with(|| d.clone());
            }
        }
        Expr::ListLit { elements, .. } => {
            for e in elements {
                collect_ident_decls_expr(e, by_name);
            }
        }
        Expr::ListRepeat { count, value, .. } => {
            collect_ident_decls_expr(count, by_name);
            collect_ident_decls_expr(value, by_name);
        }
        Expr::Indexing { target, index, .. } => {
            collect_ident_decls_expr(target, by_name);
            collect_ident_decls_expr(index, by_name);
        }
        Expr::Unary { operand, .. } => collect_ident_decls_expr(operand, by_name),
        Expr::Binary { lhs, rhs, .. } => {
            collect_ident_decls_expr(lhs, by_name);
            collect_ident_decls_expr(rhs, by_name);
        }
        Expr::Slice { target, start, end, .. } => {
            collect_ident_decls_expr(target, by_name);
            collect_ident_decls_expr(start, by_name);
            collect_ident_decls_expr(end, by_name);
        }
        Expr::Cast { operand, .. } => collect_ident_decls_expr(operand, by_name),
        Expr::Grouping { inner, .. } => collect_ident_decls_expr(inner, by_name),
        Expr::FuncCall { args, .. } => {
            for (_, a) in args {
                collect_ident_decls_expr(a, by_name);
            }
        }
        _ => {}
    }
}
