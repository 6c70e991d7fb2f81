//! Abstract syntax tree (spec §3 "AST node variants", §4.3's "Marks
//! identifier nodes with their resolved declaration").
//!
//! A closed, tagged-variant tree with exhaustive `match` at each walker
//! (resolver, type checker, emitter) rather than a visitor-with-inheritance
//! interface — spec §9 "Visitor dispatch over AST" names this as the
//! intended re-architecture, and it keeps this tree as plain, inspectable
//! data the same way its sibling `ddp_core` types are.

use std::cell::RefCell;
use std::rc::Rc;

use ddp_core::{Range, Type};

/// A declaration, shared by reference once inserted into a scope so that
/// `Ident` nodes and the symbol table can both point at the same record
/// (spec §4.3 "Marks identifier nodes with their resolved declaration").
pub type DeclRef = Rc<RefCell<Decl>>;

#[derive(Debug, Clone)]
pub enum Decl {
    Var(VarDecl),
    Func(FuncDecl),
    Bad(Range),
}

impl Decl {
    pub fn range(&self) -> Range {
        match self {
            Decl::Var(v) => v.range.clone(),
            Decl::Func(f) => f.range.clone(),
            Decl::Bad(r) => r.clone(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Decl::Var(v) => Some(&v.name),
            Decl::Func(f) => Some(&f.name),
            Decl::Bad(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub name: String,
    pub declared_type: Type,
    pub init: Option<Expr>,
    pub range: Range,
    /// Set by the resolver: `true` for function parameters, loop counters,
    /// and other compiler-injected bindings that never appear in a
    /// top-level `Die ... ist ...` statement.
    pub is_synthetic: bool,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub param_type: Type,
    pub is_ref: bool,
}

#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<Type>,
    pub body: Option<Block>,
    /// `extern "<file>"`: a function declared but implemented elsewhere
    /// (spec §3 "FuncDecl{..., extern_file?}"); no body to emit.
    pub extern_file: Option<String>,
    /// The alias pattern this function is callable under (spec §3 "Alias
    /// table", §4.2 "Alias resolution for calls").
    pub alias_pattern: Vec<AliasPatternPart>,
    pub range: Range,
}

/// One token of an alias's surface pattern (spec §3 "Alias table").
#[derive(Debug, Clone, PartialEq)]
pub enum AliasPatternPart {
    Literal(String),
    Param { name: String, param_type: Type },
}

#[derive(Debug, Clone)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub range: Range,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Decl(DeclRef),
    Expr(Expr),
    Assign {
        target: Expr,
        value: Expr,
        range: Range,
    },
    Block(Block),
    If {
        cond: Expr,
        then_branch: Block,
        else_branch: Option<Block>,
        range: Range,
    },
    While {
        cond: Expr,
        body: Block,
        range: Range,
    },
    DoWhile {
        body: Block,
        cond: Expr,
        range: Range,
    },
    RepeatNTimes {
        count: Expr,
        body: Block,
        range: Range,
    },
    ForCounting {
        counter: DeclRef,
        from: Expr,
        to: Expr,
        step: Option<Expr>,
        body: Block,
        range: Range,
    },
    ForEach {
        element: DeclRef,
        iterable: Expr,
        body: Block,
        range: Range,
    },
    Return {
        value: Option<Expr>,
        range: Range,
    },
    Bad(Range),
}

impl Stmt {
    pub fn range(&self) -> Range {
        match self {
            Stmt::Decl(d) => d.borrow().range(),
            Stmt::Expr(e) => e.range(),
            Stmt::Assign { range, .. }
            | Stmt::If { range, .. }
            | Stmt::While { range, .. }
            | Stmt::DoWhile { range, .. }
            | Stmt::RepeatNTimes { range, .. }
            | Stmt::ForCounting { range, .. }
            | Stmt::ForEach { range, .. }
            | Stmt::Return { range, .. }
            | Stmt::Bad(range) => range.clone(),
            Stmt::Block(b) => b.range.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Modulo,
    Pow,
    Logarithmus,
    And,
    Or,
    LogicalAnd,
    LogicalOr,
    Xor,
    ShiftLeft,
    ShiftRight,
    Equal,
    NotEqual,
    Greater,
    Less,
    GreaterEq,
    LessEq,
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Abs,
    Negate,
    Length,
    Size,
    LogicalNot,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeOp {
    /// `die Größe von <Typ>` — the size in bytes of a type.
    SizeOf(Type),
    /// `der Standardwert von <Typ>` — the type's default value.
    DefaultOf(Type),
}

#[derive(Debug, Clone)]
pub enum Expr {
    IntLit(i64, Range),
    FloatLit(f64, Range),
    BoolLit(bool, Range),
    CharLit(char, Range),
    StringLit(String, Range),
    ListLit {
        element_type: Option<Type>,
        elements: Vec<Expr>,
        range: Range,
    },
    /// The `<count> mal <value>` list-construction form (spec §4.5
    /// "Literal" — "the count+value list form").
    ListRepeat {
        count: Box<Expr>,
        value: Box<Expr>,
        range: Range,
    },
    Ident {
        name: String,
        declaration: Option<DeclRef>,
        range: Range,
    },
    Indexing {
        target: Box<Expr>,
        index: Box<Expr>,
        range: Range,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        range: Range,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        range: Range,
    },
    /// `von <start> bis <end>` slice of `target`.
    Slice {
        target: Box<Expr>,
        start: Box<Expr>,
        end: Box<Expr>,
        range: Range,
    },
    Cast {
        target_type: Type,
        operand: Box<Expr>,
        range: Range,
    },
    TypeOp(TypeOp, Range),
    Grouping {
        inner: Box<Expr>,
        range: Range,
    },
    FuncCall {
        name: String,
        declaration: Option<DeclRef>,
        args: Vec<(String, Expr)>,
        range: Range,
    },
    Bad(Range),
}

impl Expr {
    pub fn range(&self) -> Range {
        match self {
            Expr::IntLit(_, r)
            | Expr::FloatLit(_, r)
            | Expr::BoolLit(_, r)
            | Expr::CharLit(_, r)
            | Expr::StringLit(_, r)
            | Expr::ListLit { range: r, .. }
            | Expr::ListRepeat { range: r, .. }
            | Expr::Ident { range: r, .. }
            | Expr::Indexing { range: r, .. }
            | Expr::Unary { range: r, .. }
            | Expr::Binary { range: r, .. }
            | Expr::Slice { range: r, .. }
            | Expr::Cast { range: r, .. }
            | Expr::TypeOp(_, r)
            | Expr::Grouping { range: r, .. }
            | Expr::FuncCall { range: r, .. }
            | Expr::Bad(r) => r.clone(),
        }
    }

    /// Whether this expression denotes a storage location (spec §4.2
    /// "Reference arguments", GLOSSARY "Assignable").
    pub fn is_assignable(&self) -> bool {
        matches!(self, Expr::Ident { .. } | Expr::Indexing { .. })
    }
}

/// A whole translation unit: top-level declarations and statements.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub top_level: Vec<Stmt>,
}

/// Names the parser desugars directly into a bare `FuncCall` rather than
/// registering as a user-declared function (`Schreibe <expr>.` has no
/// `Funktion Schreibe ...` declaration anywhere in a DDP program — it's
/// backed directly by the runtime). The resolver and type checker both
/// special-case these rather than treating a missing declaration as an
/// unresolved call.
pub fn is_builtin_function(name: &str) -> bool {
    matches!(name, "Schreibe")
}
