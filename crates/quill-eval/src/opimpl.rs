//! Two-phase operator resolution.
//!
//! Phase one ([`resolve`]) sees only operand *types* and yields either an
//! [`OpImpl`] descriptor or [`Resolution::NotImplemented`]. It consults the
//! left type's own capability (indexing) and then the [`MultiDispatch`]
//! table. Phase two ([`OpImpl::apply`]) runs the descriptor on real values.
//!
//! Attribute access resolves through [`resolve_attr`], which also sees the
//! operand's value when that value is static.

use std::ptr;

use quill_types::ast::{BinOp, CmpOp, Color};
use quill_types::Identifier;
use rustc_hash::FxHashMap;

use crate::error::EvalResult;
use crate::helpers::{self, Helper};
use crate::types::{TypeId, TypeRegistry};
use crate::value::Value;

/// Operators that go through resolution when no fixed rule applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Mul,
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    GetItem,
    GetAttr,
    SetAttr,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Mul => "*",
            Operator::Eq => "==",
            Operator::NotEq => "!=",
            Operator::Lt => "<",
            Operator::LtE => "<=",
            Operator::Gt => ">",
            Operator::GtE => ">=",
            Operator::GetItem => "[]",
            Operator::GetAttr => ".",
            Operator::SetAttr => ".=",
        }
    }
}

impl From<BinOp> for Operator {
    fn from(op: BinOp) -> Self {
        match op {
            BinOp::Add => Operator::Add,
            BinOp::Mul => Operator::Mul,
        }
    }
}

impl From<CmpOp> for Operator {
    fn from(op: CmpOp) -> Self {
        match op {
            CmpOp::Eq => Operator::Eq,
            CmpOp::NotEq => Operator::NotEq,
            CmpOp::Lt => Operator::Lt,
            CmpOp::LtE => Operator::LtE,
            CmpOp::Gt => Operator::Gt,
            CmpOp::GtE => Operator::GtE,
        }
    }
}

/// A resolved operator: which helper to run and its color.
#[derive(Debug, Clone, Copy)]
pub struct OpImpl {
    helper: &'static Helper,
    pub color: Color,
}

impl OpImpl {
    pub fn new(helper: &'static Helper, color: Color) -> Self {
        Self { helper, color }
    }

    pub fn helper(&self) -> &'static Helper {
        self.helper
    }

    pub fn result(&self) -> TypeId {
        self.helper.result
    }

    /// Phase two.
    pub fn apply(&self, args: &[Value]) -> EvalResult<Value> {
        self.helper.call(args)
    }
}

impl PartialEq for OpImpl {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.helper, other.helper) && self.color == other.color
    }
}

/// Outcome of phase one.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Impl(OpImpl),
    NotImplemented,
}

/// Global table keyed by operator and the exact pair of operand types.
#[derive(Debug, Default)]
pub struct MultiDispatch {
    table: FxHashMap<(Operator, TypeId, TypeId), OpImpl>,
}

impl MultiDispatch {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The table every runtime starts with: text concatenation and
    /// repetition.
    pub fn with_builtins() -> Self {
        let mut mm = Self::new();
        mm.register(
            Operator::Add,
            TypeId::STR,
            TypeId::STR,
            OpImpl::new(&helpers::STR_ADD, Color::Dynamic),
        );
        mm.register(
            Operator::Mul,
            TypeId::STR,
            TypeId::I32,
            OpImpl::new(&helpers::STR_MUL, Color::Dynamic),
        );
        mm
    }

    /// Register an entry, returning the one it replaces. An entry whose
    /// helper does not accept `(left, right)` never resolves.
    pub fn register(
        &mut self,
        op: Operator,
        left: TypeId,
        right: TypeId,
        imp: OpImpl,
    ) -> Option<OpImpl> {
        self.table.insert((op, left, right), imp)
    }

    pub fn lookup(&self, op: Operator, left: TypeId, right: TypeId) -> Resolution {
        match self.table.get(&(op, left, right)) {
            Some(imp) => Resolution::Impl(*imp),
            None => Resolution::NotImplemented,
        }
    }
}

/// Phase one. Pure in its inputs: same types, same order, same answer.
pub fn resolve(
    types: &TypeRegistry,
    mm: &MultiDispatch,
    op: Operator,
    left: TypeId,
    right: TypeId,
) -> Resolution {
    let candidate = match (op, types.getitem_override(left)) {
        (Operator::GetItem, Some(imp)) => Resolution::Impl(*imp),
        _ => mm.lookup(op, left, right),
    };
    match candidate {
        Resolution::Impl(imp) if imp.helper.accepts(&[left, right]) => Resolution::Impl(imp),
        _ => Resolution::NotImplemented,
    }
}

/// Outcome of attribute resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrResolution {
    /// An attribute of a module: the global it names.
    ModuleAttr(Identifier),
    NotImplemented,
}

/// Phase one for `value.attr` ([`Operator::GetAttr`]) and `value.attr = v`
/// ([`Operator::SetAttr`]).
///
/// `static_value` is the operand's value if it is known without running
/// the program. A module's attributes can only be resolved from a static
/// module value.
pub fn resolve_attr(
    op: Operator,
    ty: TypeId,
    static_value: Option<&Value>,
    attr: &str,
) -> AttrResolution {
    if !matches!(op, Operator::GetAttr | Operator::SetAttr) || ty != TypeId::MODULE {
        return AttrResolution::NotImplemented;
    }
    match static_value {
        Some(Value::Module(name)) => Identifier::try_new(&**name, attr)
            .map_or(AttrResolution::NotImplemented, AttrResolution::ModuleAttr),
        _ => AttrResolution::NotImplemented,
    }
}
