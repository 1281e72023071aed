//! Inline type checker for one function activation.
//!
//! Every expression node is checked once per activation; the result (its
//! static type, color and, for operators, the resolved descriptor) is
//! recorded and handed to the evaluator, which never evaluates a node the
//! checker has not accepted.
//!
//! Local declarations live in the activation's [`Namespace`], so closures
//! created later can still see the declared type of a captured name.

use std::rc::Rc;

use quill_types::ast::*;
use quill_types::{ErrorCode, Identifier, Span};
use rustc_hash::FxHashMap;

use crate::error::{EvalError, EvalResult};
use crate::function::{AstFunction, Closure};
use crate::helpers;
use crate::namespace::Namespace;
use crate::opimpl::{self, AttrResolution, OpImpl, Operator, Resolution};
use crate::types::TypeId;
use crate::value::Value;
use crate::vm::Runtime;

/// What the checker knows about one expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprInfo {
    pub color: Color,
    pub ty: TypeId,
    /// Set when the node is an operator resolved through [`opimpl::resolve`].
    pub op: Option<OpImpl>,
    /// Set for attribute reads: the global the attribute resolved to.
    pub attr: Option<Identifier>,
}

impl ExprInfo {
    fn plain(color: Color, ty: TypeId) -> Self {
        Self {
            color,
            ty,
            op: None,
            attr: None,
        }
    }
}

/// Where an assignment writes, decided from the target's symbol.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    Local,
    Global(Identifier),
    Captured { level: usize },
}

/// Type checker bound to one activation.
pub struct TypeChecker {
    fqn: Identifier,
    funcdef: Rc<FuncDef>,
    locals: Namespace,
    closure: Closure,
    result_type: TypeId,
    /// Keyed by node id, which no other live or future node shares.
    annotations: FxHashMap<ExprId, ExprInfo>,
}

impl TypeChecker {
    pub fn new(func: &AstFunction, locals: Namespace, result_type: TypeId) -> Self {
        Self {
            fqn: func.fqn.clone(),
            funcdef: Rc::clone(&func.funcdef),
            locals,
            closure: func.closure.clone(),
            result_type,
            annotations: FxHashMap::default(),
        }
    }

    pub fn result_type(&self) -> TypeId {
        self.result_type
    }

    /// The recorded check result for `expr`, if it has been checked.
    pub fn annotation(&self, expr: &Expr) -> Option<&ExprInfo> {
        self.annotations.get(&expr.id())
    }

    // ══════════════════════════════════════════════════════════════════════
    // Locals
    // ══════════════════════════════════════════════════════════════════════

    /// Declare a local. A local's type is fixed for the activation.
    pub fn declare_local(&mut self, vm: &Runtime, name: &str, ty: TypeId, span: Span) -> EvalResult<()> {
        if !self.locals.declare(name, ty) {
            let existing = self.locals.declared_type(name).unwrap_or(ty);
            return Err(EvalError::type_error(
                ErrorCode::VARIABLE_ALREADY_DECLARED,
                format!(
                    "variable `{name}` already declared as `{}` in `{}`",
                    vm.type_name(existing),
                    self.fqn
                ),
                span,
            ));
        }
        tracing::trace!(name, ty = vm.type_name(ty), "declared local");
        Ok(())
    }

    /// Verify that `value` may be stored into the local `name`.
    pub fn typecheck_store(&self, vm: &Runtime, name: &str, value: &Value, span: Span) -> EvalResult<()> {
        let declared = self.locals.declared_type(name).ok_or_else(|| {
            EvalError::type_error(
                ErrorCode::UNDECLARED_LOCAL,
                format!("cannot store into undeclared local `{name}`"),
                span,
            )
        })?;
        check_store_compat(vm, name, declared, value, span)
    }

    // ══════════════════════════════════════════════════════════════════════
    // Statements
    // ══════════════════════════════════════════════════════════════════════

    /// A returned expression must have the declared result type.
    pub fn check_return(&self, vm: &Runtime, info: &ExprInfo, span: Span) -> EvalResult<()> {
        if info.ty != self.result_type {
            return Err(mismatch(vm, self.result_type, info.ty, span));
        }
        Ok(())
    }

    /// `if`/`while` tests must be `bool`.
    pub fn check_condition(&self, vm: &Runtime, info: &ExprInfo, span: Span) -> EvalResult<()> {
        if info.ty != TypeId::BOOL {
            return Err(mismatch(vm, TypeId::BOOL, info.ty, span));
        }
        Ok(())
    }

    /// Classify an assignment target and check the assigned type against it.
    ///
    /// A local that is not declared yet is declared here with the type of
    /// the assigned expression.
    pub fn check_assign(
        &mut self,
        vm: &Runtime,
        target: &Ident,
        info: &ExprInfo,
        span: Span,
    ) -> EvalResult<AssignTarget> {
        let symbol = self.symbol(&target.name)?.clone();
        match symbol.kind {
            SymbolKind::Local => match self.locals.declared_type(&target.name) {
                Some(declared) if declared != info.ty => Err(mismatch(vm, declared, info.ty, span)),
                Some(_) => Ok(AssignTarget::Local),
                None => {
                    self.declare_local(vm, &target.name, info.ty, target.span)?;
                    Ok(AssignTarget::Local)
                }
            },
            SymbolKind::Global(fqn) => {
                let declared_color = vm.lookup_global_color(&fqn).unwrap_or(Color::Dynamic);
                if symbol.color == Color::Static || declared_color == Color::Static {
                    return Err(EvalError::type_error(
                        ErrorCode::STATIC_ASSIGNMENT,
                        format!("cannot assign to static global `{fqn}`"),
                        span,
                    ));
                }
                let declared = vm.lookup_global_type(&fqn).ok_or_else(|| {
                    EvalError::name(format!("`{fqn}` has no declared type. Bug in the scope analysis?"))
                })?;
                if declared != info.ty {
                    return Err(mismatch(vm, declared, info.ty, span));
                }
                Ok(AssignTarget::Global(fqn))
            }
            SymbolKind::Captured { level } => {
                let declared = self.captured_type(&target.name, level)?;
                if declared != info.ty {
                    return Err(mismatch(vm, declared, info.ty, span));
                }
                Ok(AssignTarget::Captured { level })
            }
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expressions
    // ══════════════════════════════════════════════════════════════════════

    /// Check `expr`, or return its recorded result if already checked.
    pub fn check_expr(&mut self, vm: &Runtime, expr: &Expr) -> EvalResult<ExprInfo> {
        let key = expr.id();
        if let Some(info) = self.annotations.get(&key) {
            return Ok(info.clone());
        }
        let info = match &expr.kind {
            ExprKind::Constant(lit) => self.check_constant(lit),
            ExprKind::FqnConst(fqn) => self.check_fqn_const(vm, fqn)?,
            ExprKind::Name(name) => self.check_name(vm, name, expr.span)?,
            ExprKind::BinOp { op, left, right } => {
                self.check_binop(vm, *op, left, right, expr.span)?
            }
            ExprKind::Compare { op, left, right } => {
                self.check_compare(vm, *op, left, right, expr.span)?
            }
            ExprKind::Call { func, args } => self.check_call(vm, func, args, expr.span)?,
            ExprKind::HelperFunc(name) => {
                return Err(EvalError::type_error(
                    ErrorCode::NOT_CALLABLE,
                    format!("helper `{name}` can only be used as the callee of a call"),
                    expr.span,
                ));
            }
            ExprKind::GetItem { value, index } => {
                self.check_getitem(vm, value, index, expr.span)?
            }
            ExprKind::GetAttr { value, attr } => self.check_getattr(vm, value, attr)?,
        };
        self.annotations.insert(key, info.clone());
        Ok(info)
    }

    /// Literals are static and have a fixed builtin type.
    pub fn check_constant(&self, lit: &Literal) -> ExprInfo {
        let ty = match lit {
            Literal::Int(_) => TypeId::I32,
            Literal::Bool(_) => TypeId::BOOL,
            Literal::Str(_) => TypeId::STR,
            Literal::None => TypeId::VOID,
        };
        ExprInfo::plain(Color::Static, ty)
    }

    /// The color comes from the global's declaration: constants are
    /// static, anything that can be stored into is dynamic.
    pub fn check_fqn_const(&self, vm: &Runtime, fqn: &Identifier) -> EvalResult<ExprInfo> {
        let ty = vm
            .lookup_global_type(fqn)
            .ok_or_else(|| EvalError::name(format!("`{fqn}` has no declared type")))?;
        let color = vm.lookup_global_color(fqn).unwrap_or(Color::Dynamic);
        Ok(ExprInfo::plain(color, ty))
    }

    pub fn check_name(&self, vm: &Runtime, name: &str, span: Span) -> EvalResult<ExprInfo> {
        let symbol = self.symbol(name)?;
        let ty = match &symbol.kind {
            SymbolKind::Local => self.locals.declared_type(name).ok_or_else(|| {
                EvalError::type_error(
                    ErrorCode::UNDECLARED_LOCAL,
                    format!("variable `{name}` is not declared"),
                    span,
                )
            })?,
            SymbolKind::Global(fqn) => vm.lookup_global_type(fqn).ok_or_else(|| {
                EvalError::name(format!("`{fqn}` has no declared type. Bug in the scope analysis?"))
            })?,
            SymbolKind::Captured { level } => self.captured_type(name, *level)?,
        };
        Ok(ExprInfo::plain(symbol.color, ty))
    }

    pub fn check_binop(
        &mut self,
        vm: &Runtime,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        span: Span,
    ) -> EvalResult<ExprInfo> {
        let l = self.check_expr(vm, left)?;
        let r = self.check_expr(vm, right)?;
        let color = l.color.join(r.color);
        if (l.ty, r.ty) == (TypeId::I32, TypeId::I32) {
            return Ok(ExprInfo::plain(color, TypeId::I32));
        }
        self.resolve_operator(vm, Operator::from(op), &l, &r, span)
    }

    pub fn check_compare(
        &mut self,
        vm: &Runtime,
        op: CmpOp,
        left: &Expr,
        right: &Expr,
        span: Span,
    ) -> EvalResult<ExprInfo> {
        let l = self.check_expr(vm, left)?;
        let r = self.check_expr(vm, right)?;
        if (l.ty, r.ty) == (TypeId::I32, TypeId::I32) {
            return Ok(ExprInfo::plain(l.color.join(r.color), TypeId::BOOL));
        }
        self.resolve_operator(vm, Operator::from(op), &l, &r, span)
    }

    pub fn check_getitem(
        &mut self,
        vm: &Runtime,
        value: &Expr,
        index: &Expr,
        span: Span,
    ) -> EvalResult<ExprInfo> {
        let v = self.check_expr(vm, value)?;
        let i = self.check_expr(vm, index)?;
        self.resolve_operator(vm, Operator::GetItem, &v, &i, span)
    }

    /// `value.attr`. Only a module known at check time has attributes:
    /// they resolve to the globals of that module.
    pub fn check_getattr(&mut self, vm: &Runtime, value: &Expr, attr: &Ident) -> EvalResult<ExprInfo> {
        let fqn = self.resolve_attr(vm, Operator::GetAttr, value, attr)?;
        let (ty, color) = declared_global(vm, &fqn, attr)?;
        Ok(ExprInfo {
            color,
            ty,
            op: None,
            attr: Some(fqn),
        })
    }

    /// `target.attr = value`. Returns the global that will be stored into.
    pub fn check_setattr(
        &mut self,
        vm: &Runtime,
        target: &Expr,
        attr: &Ident,
        info: &ExprInfo,
        span: Span,
    ) -> EvalResult<Identifier> {
        let fqn = self.resolve_attr(vm, Operator::SetAttr, target, attr)?;
        let (declared, color) = declared_global(vm, &fqn, attr)?;
        if color == Color::Static {
            return Err(EvalError::type_error(
                ErrorCode::STATIC_ASSIGNMENT,
                format!("cannot assign to static global `{fqn}`"),
                span,
            ));
        }
        if declared != info.ty {
            return Err(mismatch(vm, declared, info.ty, span));
        }
        Ok(fqn)
    }

    fn resolve_attr(
        &mut self,
        vm: &Runtime,
        op: Operator,
        value: &Expr,
        attr: &Ident,
    ) -> EvalResult<Identifier> {
        let info = self.check_expr(vm, value)?;
        let known = self.static_value(vm, value);
        match opimpl::resolve_attr(op, info.ty, known.as_ref(), &attr.name) {
            AttrResolution::ModuleAttr(fqn) => Ok(fqn),
            AttrResolution::NotImplemented => {
                let message = if info.ty == TypeId::MODULE {
                    format!(
                        "attributes of a module are only reachable through a static reference, not `{}`",
                        attr.name
                    )
                } else {
                    format!(
                        "type `{}` has no attribute `{}`",
                        vm.type_name(info.ty),
                        attr.name
                    )
                };
                Err(EvalError::type_error(
                    ErrorCode::UNSUPPORTED_OPERATION,
                    message,
                    attr.span,
                ))
            }
        }
    }

    pub fn check_call(
        &mut self,
        vm: &Runtime,
        func: &Expr,
        args: &[Expr],
        span: Span,
    ) -> EvalResult<ExprInfo> {
        if let ExprKind::HelperFunc(name) = &func.kind {
            return self.check_helper_call(vm, name, args, span);
        }
        let callee = self.check_expr(vm, func)?;
        let ft = vm.types().func_type(callee.ty).cloned().ok_or_else(|| {
            EvalError::type_error(
                ErrorCode::NOT_CALLABLE,
                format!("cannot call objects of type `{}`", vm.type_name(callee.ty)),
                func.span,
            )
        })?;
        if ft.params.len() != args.len() {
            return Err(EvalError::type_error(
                ErrorCode::WRONG_ARG_COUNT,
                format!(
                    "this function takes {} but {} {} supplied",
                    plural(ft.params.len(), "argument"),
                    plural(args.len(), "argument"),
                    if args.len() == 1 { "was" } else { "were" }
                ),
                span,
            ));
        }
        let mut color = ft.color.join(callee.color);
        for (param, arg) in ft.params.iter().zip(args) {
            let info = self.check_expr(vm, arg)?;
            if info.ty != param.ty {
                return Err(mismatch(vm, param.ty, info.ty, arg.span));
            }
            color = color.join(info.color);
        }
        Ok(ExprInfo::plain(color, ft.result))
    }

    fn check_helper_call(
        &mut self,
        vm: &Runtime,
        name: &str,
        args: &[Expr],
        span: Span,
    ) -> EvalResult<ExprInfo> {
        let helper =
            helpers::get(name).ok_or_else(|| EvalError::name(format!("unknown helper `{name}`")))?;
        if helper.params.len() != args.len() {
            return Err(EvalError::type_error(
                ErrorCode::WRONG_ARG_COUNT,
                format!(
                    "helper `{name}` takes {} but {} supplied",
                    plural(helper.params.len(), "argument"),
                    plural(args.len(), "argument")
                ),
                span,
            ));
        }
        for (&param, arg) in helper.params.iter().zip(args) {
            let info = self.check_expr(vm, arg)?;
            if info.ty != param {
                return Err(mismatch(vm, param, info.ty, arg.span));
            }
        }
        Ok(ExprInfo::plain(Color::Dynamic, helper.result))
    }

    fn resolve_operator(
        &self,
        vm: &Runtime,
        op: Operator,
        l: &ExprInfo,
        r: &ExprInfo,
        span: Span,
    ) -> EvalResult<ExprInfo> {
        match opimpl::resolve(vm.types(), vm.operators(), op, l.ty, r.ty) {
            Resolution::Impl(imp) => Ok(ExprInfo {
                color: l.color.join(r.color).join(imp.color),
                ty: imp.result(),
                op: Some(imp),
                attr: None,
            }),
            Resolution::NotImplemented => {
                let message = match op {
                    Operator::GetItem => format!(
                        "cannot do `{}`[`{}`]",
                        vm.type_name(l.ty),
                        vm.type_name(r.ty)
                    ),
                    _ => format!(
                        "cannot do `{}` {} `{}`",
                        vm.type_name(l.ty),
                        op.symbol(),
                        vm.type_name(r.ty)
                    ),
                };
                Err(EvalError::type_error(ErrorCode::UNSUPPORTED_OPERATION, message, span))
            }
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Symbols
    // ══════════════════════════════════════════════════════════════════════

    fn symbol(&self, name: &str) -> EvalResult<&Symbol> {
        self.funcdef.symtable.lookup(name).ok_or_else(|| {
            EvalError::name(format!(
                "no symbol for `{name}` in `{}`. Bug in the scope analysis?",
                self.fqn
            ))
        })
    }

    /// The current value of `expr` when it names a constant global.
    fn static_value(&self, vm: &Runtime, expr: &Expr) -> Option<Value> {
        let fqn = match &expr.kind {
            ExprKind::FqnConst(fqn) => fqn,
            ExprKind::Name(name) => match &self.funcdef.symtable.lookup(name)?.kind {
                SymbolKind::Global(fqn) => fqn,
                _ => return None,
            },
            _ => return None,
        };
        if vm.lookup_global_color(fqn)? != Color::Static {
            return None;
        }
        vm.lookup_global(fqn).map(|(_, value)| value)
    }

    fn captured_type(&self, name: &str, level: usize) -> EvalResult<TypeId> {
        self.closure
            .get(level)
            .and_then(|ns| ns.declared_type(name))
            .ok_or_else(|| {
                EvalError::name(format!(
                    "captured name `{name}` not found at closure level {level} of `{}`",
                    self.fqn
                ))
            })
    }
}

/// Exact type identity; see `Runtime::is_compatible_type`.
pub(crate) fn check_store_compat(
    vm: &Runtime,
    name: &str,
    declared: TypeId,
    value: &Value,
    span: Span,
) -> EvalResult<()> {
    if !vm.is_compatible_type(value, declared) {
        return Err(EvalError::type_error(
            ErrorCode::TYPE_MISMATCH,
            format!(
                "mismatched types: `{name}` is declared as `{}`, got `{}`",
                vm.type_name(declared),
                vm.type_name(value.dynamic_type())
            ),
            span,
        ));
    }
    Ok(())
}

fn declared_global(vm: &Runtime, fqn: &Identifier, attr: &Ident) -> EvalResult<(TypeId, Color)> {
    match (vm.lookup_global_type(fqn), vm.lookup_global_color(fqn)) {
        (Some(ty), Some(color)) => Ok((ty, color)),
        _ => Err(EvalError::type_error(
            ErrorCode::UNKNOWN_ATTRIBUTE,
            format!(
                "module `{}` has no attribute `{}`",
                fqn.module_path(),
                attr.name
            ),
            attr.span,
        )),
    }
}

fn mismatch(vm: &Runtime, expected: TypeId, got: TypeId, span: Span) -> EvalError {
    EvalError::type_error(
        ErrorCode::TYPE_MISMATCH,
        format!(
            "mismatched types: expected `{}`, got `{}`",
            vm.type_name(expected),
            vm.type_name(got)
        ),
        span,
    )
}

fn plural(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("{n} {noun}")
    } else {
        format!("{n} {noun}s")
    }
}
