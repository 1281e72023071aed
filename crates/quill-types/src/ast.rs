//! AST node types consumed by the Quill runtime.
//!
//! Every node carries a [`Span`] for error reporting. Name references are
//! plain strings; their classification comes from the [`SymbolTable`] the
//! scope analysis attaches to each [`FuncDef`].

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::{Identifier, Span};

// ══════════════════════════════════════════════════════════════════════════════
// Colors & Symbols
// ══════════════════════════════════════════════════════════════════════════════

/// Static-vs-dynamic classification of a binding or resolved operator.
///
/// A `Static` value must be known without running side-effecting code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Static,
    Dynamic,
}

impl Color {
    /// `Static` only when both sides are.
    pub fn join(self, other: Color) -> Color {
        match (self, other) {
            (Color::Static, Color::Static) => Color::Static,
            _ => Color::Dynamic,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Static => write!(f, "static"),
            Color::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// Where a name lives, as decided by scope analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    /// A local of the function being executed.
    Local,
    /// A module-level binding.
    Global(Identifier),
    /// A local of an enclosing function; `level` indexes the closure,
    /// outermost first.
    Captured { level: usize },
}

/// Resolution record for one name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub color: Color,
}

impl Symbol {
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SymbolKind::Local,
            color: Color::Dynamic,
        }
    }

    pub fn global(name: impl Into<String>, fqn: Identifier, color: Color) -> Self {
        Self {
            name: name.into(),
            kind: SymbolKind::Global(fqn),
            color,
        }
    }

    pub fn captured(name: impl Into<String>, level: usize) -> Self {
        Self {
            name: name.into(),
            kind: SymbolKind::Captured { level },
            color: Color::Dynamic,
        }
    }
}

/// Per-function table of resolved names. Read-only during evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolTable {
    symbols: HashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a symbol, replacing any previous entry for the same name.
    pub fn add(&mut self, symbol: Symbol) {
        self.symbols.insert(symbol.name.clone(), symbol);
    }

    /// Builder-style [`SymbolTable::add`].
    pub fn with(mut self, symbol: Symbol) -> Self {
        self.add(symbol);
        self
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ══════════════════════════════════════════════════════════════════════════════

/// A spanned identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Functions
// ══════════════════════════════════════════════════════════════════════════════

/// `def name(args) -> return_type: body`
#[derive(Debug, Clone, PartialEq)]
pub struct FuncDef {
    pub name: Ident,
    pub color: Color,
    pub args: Vec<FuncArg>,
    /// Evaluated in the defining scope; must produce a type.
    pub return_type: Expr,
    pub body: Vec<Stmt>,
    pub symtable: SymbolTable,
    pub span: Span,
}

/// A parameter: `name: type`
#[derive(Debug, Clone, PartialEq)]
pub struct FuncArg {
    pub name: Ident,
    pub type_expr: Expr,
    pub color: Color,
    pub span: Span,
}

impl FuncArg {
    pub fn new(name: Ident, type_expr: Expr) -> Self {
        let span = name.span.merge(type_expr.span);
        Self {
            name,
            type_expr,
            color: Color::Dynamic,
            span,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════════════════════

/// A statement. One variant per kind; evaluation matches exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Return(ReturnStmt),
    /// Nested function definition. Shared so that the function values
    /// built from it can keep referring to the body.
    FuncDef(Rc<FuncDef>),
    VarDef(VarDef),
    Assign(Assign),
    Expr(ExprStmt),
    If(IfStmt),
    While(WhileStmt),
    SetAttr(SetAttr),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Return(s) => s.span,
            Stmt::FuncDef(s) => s.span,
            Stmt::VarDef(s) => s.span,
            Stmt::Assign(s) => s.span,
            Stmt::Expr(s) => s.span,
            Stmt::If(s) => s.span,
            Stmt::While(s) => s.span,
            Stmt::SetAttr(s) => s.span,
        }
    }
}

/// `return value`
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStmt {
    pub value: Expr,
    pub span: Span,
}

/// `var name: type = value`
#[derive(Debug, Clone, PartialEq)]
pub struct VarDef {
    pub name: Ident,
    pub type_expr: Expr,
    pub value: Expr,
    pub span: Span,
}

/// `target = value`
#[derive(Debug, Clone, PartialEq)]
pub struct Assign {
    pub target: Ident,
    pub value: Expr,
    pub span: Span,
}

/// `target.attr = value`
#[derive(Debug, Clone, PartialEq)]
pub struct SetAttr {
    pub target: Expr,
    pub attr: Ident,
    pub value: Expr,
    pub span: Span,
}

/// An expression evaluated for its side effects.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprStmt {
    pub value: Expr,
    pub span: Span,
}

/// `if test: then_body else: else_body`
#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub test: Expr,
    pub then_body: Vec<Stmt>,
    pub else_body: Vec<Stmt>,
    pub span: Span,
}

/// `while test: body`
#[derive(Debug, Clone, PartialEq)]
pub struct WhileStmt {
    pub test: Expr,
    pub body: Vec<Stmt>,
    pub span: Span,
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

/// Identity of one expression node. Never shared by two live nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(u64);

static NEXT_EXPR_ID: AtomicU64 = AtomicU64::new(0);

impl ExprId {
    fn fresh() -> Self {
        Self(NEXT_EXPR_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// An expression node with its source span.
///
/// Each node gets a fresh [`ExprId`] when built, cloning included.
/// Equality ignores the id and compares structure.
#[derive(Debug)]
pub struct Expr {
    id: ExprId,
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self {
            id: ExprId::fresh(),
            kind,
            span,
        }
    }

    pub fn id(&self) -> ExprId {
        self.id
    }
}

impl Clone for Expr {
    fn clone(&self) -> Self {
        Self::new(self.kind.clone(), self.span)
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.span == other.span
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Constant(Literal),
    /// Direct reference to a global binding.
    FqnConst(Identifier),
    Name(String),
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        op: CmpOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    /// A registered native helper, only valid as the callee of a `Call`.
    HelperFunc(String),
    GetItem {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    /// `value.attr`
    GetAttr {
        value: Box<Expr>,
        attr: Ident,
    },
}

/// Literal constants accepted by the parser.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i32),
    Bool(bool),
    Str(String),
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Mul,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Mul => "*",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtE => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtE => ">=",
        }
    }
}
