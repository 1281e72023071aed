//! Tree-walking evaluator: one [`Frame`] per function activation.

use std::rc::Rc;

use quill_types::ast::*;
use quill_types::{ErrorCode, Identifier, Span};

use crate::checker::{check_store_compat, AssignTarget, ExprInfo, TypeChecker};
use crate::error::{EvalError, EvalResult};
use crate::function::{AstFunction, Function};
use crate::helpers;
use crate::namespace::Namespace;
use crate::opimpl::{self, AttrResolution, OpImpl, Operator, Resolution};
use crate::stack::ensure_sufficient_stack;
use crate::types::{FuncParam, TypeId};
use crate::value::Value;
use crate::vm::Runtime;

/// The value of one evaluated expression together with its static type.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameValue {
    pub static_type: TypeId,
    pub value: Value,
}

impl FrameValue {
    pub fn new(static_type: TypeId, value: Value) -> Self {
        Self { static_type, value }
    }
}

/// How a statement finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Normal,
    /// A `return` ran; unwind to the call boundary carrying this value.
    Returned(Value),
}

/// One in-progress execution of an interpreted function.
pub struct Frame<'a> {
    vm: &'a mut Runtime,
    func: &'a AstFunction,
    funcdef: Rc<FuncDef>,
    locals: Namespace,
    checker: TypeChecker,
}

impl<'a> Frame<'a> {
    pub fn new(vm: &'a mut Runtime, func: &'a AstFunction) -> EvalResult<Self> {
        let result_type = vm
            .types()
            .func_type(func.func_type)
            .map(|ft| ft.result)
            .ok_or_else(|| {
                EvalError::internal(format!("`{}` does not have a function type", func.fqn))
            })?;
        let locals = Namespace::new();
        let checker = TypeChecker::new(func, locals.clone(), result_type);
        Ok(Self {
            vm,
            func,
            funcdef: Rc::clone(&func.funcdef),
            locals,
            checker,
        })
    }

    pub fn locals(&self) -> &Namespace {
        &self.locals
    }

    pub fn checker(&self) -> &TypeChecker {
        &self.checker
    }

    /// Bind the arguments and run the body to completion.
    #[tracing::instrument(level = "debug", skip_all, fields(fqn = %self.func.fqn))]
    pub fn run(&mut self, args: Vec<Value>) -> EvalResult<Value> {
        self.init_arguments(args)?;
        let funcdef = Rc::clone(&self.funcdef);
        match self.exec_block(&funcdef.body)? {
            Outcome::Returned(value) => Ok(value),
            Outcome::Normal if self.checker.result_type() == TypeId::VOID => Ok(Value::None),
            Outcome::Normal => Err(EvalError::type_error(
                ErrorCode::MISSING_RETURN,
                "reached the end of the function without a `return`",
                funcdef.span.end_point(),
            )),
        }
    }

    fn init_arguments(&mut self, args: Vec<Value>) -> EvalResult<()> {
        let params: Vec<FuncParam> = self
            .vm
            .types()
            .func_type(self.func.func_type)
            .map(|ft| ft.params.clone())
            .unwrap_or_default();
        let funcdef = Rc::clone(&self.funcdef);
        if params.len() != args.len() || funcdef.args.len() != args.len() {
            return Err(EvalError::internal(format!(
                "`{}` bound with {} arguments for {} parameters",
                self.func.fqn,
                args.len(),
                params.len()
            )));
        }
        for ((arg, param), value) in funcdef.args.iter().zip(&params).zip(args) {
            self.checker
                .declare_local(self.vm, &param.name, param.ty, arg.span)?;
            self.store_local(&param.name, value, arg.span)?;
        }
        Ok(())
    }

    fn store_local(&mut self, name: &str, value: Value, span: Span) -> EvalResult<()> {
        self.checker.typecheck_store(self.vm, name, &value, span)?;
        self.locals.store(name, value);
        Ok(())
    }

    // ══════════════════════════════════════════════════════════════════════
    // Statements
    // ══════════════════════════════════════════════════════════════════════

    /// Run statements in order, stopping at the first `return`.
    pub fn exec_block(&mut self, stmts: &[Stmt]) -> EvalResult<Outcome> {
        for stmt in stmts {
            if let Outcome::Returned(value) = self.exec_stmt(stmt)? {
                return Ok(Outcome::Returned(value));
            }
        }
        Ok(Outcome::Normal)
    }

    pub fn exec_stmt(&mut self, stmt: &Stmt) -> EvalResult<Outcome> {
        self.vm.tick()?;
        tracing::trace!(span = %stmt.span(), "exec stmt");
        match stmt {
            Stmt::Return(ret) => self.exec_return(ret),
            Stmt::FuncDef(funcdef) => self.exec_funcdef(funcdef),
            Stmt::VarDef(vardef) => self.exec_vardef(vardef),
            Stmt::Assign(assign) => self.exec_assign(assign),
            Stmt::SetAttr(setattr) => self.exec_setattr(setattr),
            Stmt::Expr(stmt) => {
                self.eval_expr(&stmt.value)?;
                Ok(Outcome::Normal)
            }
            Stmt::If(if_stmt) => self.exec_if(if_stmt),
            Stmt::While(while_stmt) => self.exec_while(while_stmt),
        }
    }

    fn exec_return(&mut self, ret: &ReturnStmt) -> EvalResult<Outcome> {
        let info = self.checker.check_expr(self.vm, &ret.value)?;
        self.checker.check_return(self.vm, &info, ret.span)?;
        let fv = self.eval_expr(&ret.value)?;
        Ok(Outcome::Returned(fv.value))
    }

    fn exec_funcdef(&mut self, funcdef: &Rc<FuncDef>) -> EvalResult<Outcome> {
        let mut params = Vec::with_capacity(funcdef.args.len());
        for arg in &funcdef.args {
            let ty = self.eval_expr_type(&arg.type_expr)?;
            params.push(FuncParam {
                name: arg.name.name.clone(),
                ty,
                color: arg.color,
            });
        }
        let result = self.eval_expr_type(&funcdef.return_type)?;
        let func_type = self
            .vm
            .types_mut()
            .make_func_type(funcdef.color, params, result);
        let name = &funcdef.name.name;
        let fqn = self.func.nested_fqn(name)?;
        self.checker
            .declare_local(self.vm, name, func_type, funcdef.name.span)?;

        let inner = AstFunction {
            fqn,
            func_type,
            closure: self.func.extend_closure(&self.locals),
            funcdef: Rc::clone(funcdef),
        };
        tracing::debug!(fqn = %inner.fqn, "created closure");
        let value = Value::Function(Rc::new(Function::Ast(inner)));
        self.store_local(name, value, funcdef.span)?;
        Ok(Outcome::Normal)
    }

    fn exec_vardef(&mut self, vardef: &VarDef) -> EvalResult<Outcome> {
        let ty = self.eval_expr_type(&vardef.type_expr)?;
        self.checker
            .declare_local(self.vm, &vardef.name.name, ty, vardef.name.span)?;
        let info = self.checker.check_expr(self.vm, &vardef.value)?;
        if info.ty != ty {
            return Err(EvalError::type_error(
                ErrorCode::TYPE_MISMATCH,
                format!(
                    "mismatched types: expected `{}`, got `{}`",
                    self.vm.type_name(ty),
                    self.vm.type_name(info.ty)
                ),
                vardef.value.span,
            ));
        }
        let fv = self.eval_expr(&vardef.value)?;
        self.store_local(&vardef.name.name, fv.value, vardef.span)?;
        Ok(Outcome::Normal)
    }

    fn exec_assign(&mut self, assign: &Assign) -> EvalResult<Outcome> {
        let info = self.checker.check_expr(self.vm, &assign.value)?;
        let target = self
            .checker
            .check_assign(self.vm, &assign.target, &info, assign.span)?;
        let fv = self.eval_expr(&assign.value)?;
        let name = &assign.target.name;
        match target {
            AssignTarget::Local => self.store_local(name, fv.value, assign.span)?,
            AssignTarget::Global(fqn) => self.vm.store_global(&fqn, fv.value)?,
            AssignTarget::Captured { level } => {
                let ns = self.func.closure.get(level).ok_or_else(|| {
                    EvalError::name(format!("no closure level {level} for `{name}`"))
                })?;
                let declared = ns.declared_type(name).ok_or_else(|| {
                    EvalError::name(format!("captured name `{name}` vanished"))
                })?;
                check_store_compat(self.vm, name, declared, &fv.value, assign.span)?;
                ns.store(name, fv.value);
            }
        }
        Ok(Outcome::Normal)
    }

    fn exec_setattr(&mut self, setattr: &SetAttr) -> EvalResult<Outcome> {
        let info = self.checker.check_expr(self.vm, &setattr.value)?;
        let fqn = self.checker.check_setattr(
            self.vm,
            &setattr.target,
            &setattr.attr,
            &info,
            setattr.span,
        )?;
        let target = self.eval_expr(&setattr.target)?;
        self.reresolve_attr(Operator::SetAttr, Some(&fqn), &target, &setattr.attr)?;
        let fv = self.eval_expr(&setattr.value)?;
        self.vm.store_global(&fqn, fv.value)?;
        Ok(Outcome::Normal)
    }

    fn exec_if(&mut self, if_stmt: &IfStmt) -> EvalResult<Outcome> {
        if self.eval_condition(&if_stmt.test)? {
            self.exec_block(&if_stmt.then_body)
        } else {
            self.exec_block(&if_stmt.else_body)
        }
    }

    fn exec_while(&mut self, while_stmt: &WhileStmt) -> EvalResult<Outcome> {
        while self.eval_condition(&while_stmt.test)? {
            if let Outcome::Returned(value) = self.exec_block(&while_stmt.body)? {
                return Ok(Outcome::Returned(value));
            }
        }
        Ok(Outcome::Normal)
    }

    fn eval_condition(&mut self, test: &Expr) -> EvalResult<bool> {
        let info = self.checker.check_expr(self.vm, test)?;
        self.checker.check_condition(self.vm, &info, test.span)?;
        let fv = self.eval_expr(test)?;
        fv.value
            .as_bool()
            .ok_or_else(|| EvalError::internal("condition checked as `bool` produced another value"))
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expressions
    // ══════════════════════════════════════════════════════════════════════

    /// Check (once) and evaluate `expr`.
    ///
    /// The produced static type must equal the one the checker computed.
    pub fn eval_expr(&mut self, expr: &Expr) -> EvalResult<FrameValue> {
        ensure_sufficient_stack(|| self.eval_checked(expr))
    }

    fn eval_checked(&mut self, expr: &Expr) -> EvalResult<FrameValue> {
        self.vm.tick()?;
        let info = self.checker.check_expr(self.vm, expr)?;
        let fv = match &expr.kind {
            ExprKind::Constant(lit) => {
                let value = Value::from(lit);
                FrameValue::new(value.dynamic_type(), value)
            }
            ExprKind::FqnConst(fqn) => {
                let (ty, value) = self
                    .vm
                    .lookup_global(fqn)
                    .ok_or_else(|| EvalError::name(format!("`{fqn}` not found")))?;
                FrameValue::new(ty, value)
            }
            ExprKind::Name(name) => self.eval_name(name, expr.span)?,
            ExprKind::BinOp { op, left, right } => {
                let l = self.eval_expr(left)?;
                let r = self.eval_expr(right)?;
                self.eval_binop(*op, &info, l, r)?
            }
            ExprKind::Compare { op, left, right } => {
                let l = self.eval_expr(left)?;
                let r = self.eval_expr(right)?;
                self.eval_compare(*op, &info, l, r)?
            }
            ExprKind::Call { func, args } => self.eval_call(func, args)?,
            ExprKind::HelperFunc(name) => {
                return Err(EvalError::internal(format!(
                    "helper `{name}` evaluated outside a call"
                )));
            }
            ExprKind::GetItem { value, index } => {
                let v = self.eval_expr(value)?;
                let i = self.eval_expr(index)?;
                let imp = self.reresolve(Operator::GetItem, &info, &v, &i)?;
                FrameValue::new(imp.result(), imp.apply(&[v.value, i.value])?)
            }
            ExprKind::GetAttr { value, attr } => {
                let v = self.eval_expr(value)?;
                let fqn = self.reresolve_attr(Operator::GetAttr, info.attr.as_ref(), &v, attr)?;
                let (ty, value) = self
                    .vm
                    .lookup_global(&fqn)
                    .ok_or_else(|| EvalError::name(format!("`{fqn}` not found")))?;
                FrameValue::new(ty, value)
            }
        };
        if fv.static_type != info.ty {
            return Err(EvalError::internal(format!(
                "expression at {} evaluated to static type `{}`, checker said `{}`",
                expr.span,
                self.vm.type_name(fv.static_type),
                self.vm.type_name(info.ty)
            )));
        }
        Ok(fv)
    }

    /// Evaluate an expression in type position.
    pub fn eval_expr_type(&mut self, expr: &Expr) -> EvalResult<TypeId> {
        let fv = self.eval_expr(expr)?;
        match fv.value {
            Value::Type(ty) => Ok(ty),
            other => Err(EvalError::type_error(
                ErrorCode::EXPECTED_TYPE,
                format!(
                    "expected `type`, got `{}`",
                    self.vm.type_name(other.dynamic_type())
                ),
                expr.span,
            )),
        }
    }

    fn eval_name(&self, name: &str, span: Span) -> EvalResult<FrameValue> {
        let symbol = self
            .funcdef
            .symtable
            .lookup(name)
            .ok_or_else(|| EvalError::name(format!("no symbol for `{name}`")))?;
        let slot = match &symbol.kind {
            SymbolKind::Global(fqn) => {
                let (ty, value) = self.vm.lookup_global(fqn).ok_or_else(|| {
                    EvalError::name(format!("`{fqn}` not found. Bug in the scope analysis?"))
                })?;
                return Ok(FrameValue::new(ty, value));
            }
            SymbolKind::Local => self.locals.slot(name),
            SymbolKind::Captured { level } => {
                self.func.closure.get(*level).and_then(|ns| ns.slot(name))
            }
        };
        let slot = slot.ok_or_else(|| EvalError::name(format!("`{name}` has no slot")))?;
        let value = slot.value.ok_or_else(|| {
            EvalError::runtime_at(
                ErrorCode::UNINITIALIZED_LOCAL,
                format!("read from uninitialized local `{name}`"),
                span,
            )
        })?;
        Ok(FrameValue::new(slot.ty, value))
    }

    fn eval_binop(
        &self,
        op: BinOp,
        info: &ExprInfo,
        l: FrameValue,
        r: FrameValue,
    ) -> EvalResult<FrameValue> {
        if let (Value::Int(a), Value::Int(b)) = (&l.value, &r.value) {
            if info.op.is_none() {
                let n = match op {
                    BinOp::Add => a.wrapping_add(*b),
                    BinOp::Mul => a.wrapping_mul(*b),
                };
                return Ok(FrameValue::new(TypeId::I32, Value::Int(n)));
            }
        }
        let imp = self.reresolve(Operator::from(op), info, &l, &r)?;
        Ok(FrameValue::new(imp.result(), imp.apply(&[l.value, r.value])?))
    }

    fn eval_compare(
        &self,
        op: CmpOp,
        info: &ExprInfo,
        l: FrameValue,
        r: FrameValue,
    ) -> EvalResult<FrameValue> {
        if let (Value::Int(a), Value::Int(b)) = (&l.value, &r.value) {
            if info.op.is_none() {
                let res = match op {
                    CmpOp::Eq => a == b,
                    CmpOp::NotEq => a != b,
                    CmpOp::Lt => a < b,
                    CmpOp::LtE => a <= b,
                    CmpOp::Gt => a > b,
                    CmpOp::GtE => a >= b,
                };
                return Ok(FrameValue::new(TypeId::BOOL, Value::Bool(res)));
            }
        }
        let imp = self.reresolve(Operator::from(op), info, &l, &r)?;
        Ok(FrameValue::new(imp.result(), imp.apply(&[l.value, r.value])?))
    }

    /// Phase one again, from the operands' static types. Must agree with
    /// what the checker recorded.
    fn reresolve(
        &self,
        op: Operator,
        info: &ExprInfo,
        l: &FrameValue,
        r: &FrameValue,
    ) -> EvalResult<OpImpl> {
        let resolved = opimpl::resolve(
            self.vm.types(),
            self.vm.operators(),
            op,
            l.static_type,
            r.static_type,
        );
        match (resolved, &info.op) {
            (Resolution::Impl(imp), Some(recorded)) if imp == *recorded => Ok(imp),
            _ => Err(EvalError::internal(format!(
                "unsupported `{}` for `{}` and `{}`, bug in the type checker",
                op.symbol(),
                self.vm.type_name(l.static_type),
                self.vm.type_name(r.static_type)
            ))),
        }
    }

    /// Attribute resolution again, now from the runtime value. Must land on
    /// the global the checker recorded.
    fn reresolve_attr(
        &self,
        op: Operator,
        recorded: Option<&Identifier>,
        value: &FrameValue,
        attr: &Ident,
    ) -> EvalResult<Identifier> {
        let resolved = opimpl::resolve_attr(op, value.static_type, Some(&value.value), &attr.name);
        match (resolved, recorded) {
            (AttrResolution::ModuleAttr(fqn), Some(expected)) if fqn == *expected => Ok(fqn),
            _ => Err(EvalError::internal(format!(
                "unsupported `{}{}` on `{}`, bug in the type checker",
                op.symbol(),
                attr.name,
                self.vm.type_name(value.static_type)
            ))),
        }
    }

    fn eval_call(&mut self, func: &Expr, args: &[Expr]) -> EvalResult<FrameValue> {
        if let ExprKind::HelperFunc(name) = &func.kind {
            let helper = helpers::get(name)
                .ok_or_else(|| EvalError::name(format!("unknown helper `{name}`")))?;
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(self.eval_expr(arg)?.value);
            }
            return Ok(FrameValue::new(helper.result, helper.call(&values)?));
        }

        let callee = self.eval_expr(func)?;
        let Value::Function(f) = callee.value else {
            return Err(EvalError::internal(format!(
                "callee at {} is not a function",
                func.span
            )));
        };
        let result = self
            .vm
            .types()
            .func_type(callee.static_type)
            .map(|ft| ft.result)
            .ok_or_else(|| EvalError::internal("callee has no function type"))?;
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expr(arg)?.value);
        }
        let value = self.vm.call(&f, values)?;
        Ok(FrameValue::new(result, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_types::Identifier;

    fn e(kind: ExprKind) -> Expr {
        Expr::new(kind, Span::point(1, 1))
    }

    fn lit(lit: Literal) -> Expr {
        e(ExprKind::Constant(lit))
    }

    fn main_func(vm: &mut Runtime, body: Vec<Stmt>) -> Rc<Function> {
        vm.register_module("m").unwrap();
        let funcdef = FuncDef {
            name: Ident::new("main", Span::point(1, 1)),
            color: Color::Dynamic,
            args: vec![],
            return_type: e(ExprKind::FqnConst(Identifier::new("builtins", "i32"))),
            body,
            symtable: SymbolTable::new().with(Symbol::global(
                "i32",
                Identifier::new("builtins", "i32"),
                Color::Static,
            )),
            span: Span::point(1, 1),
        };
        vm.make_function("m", Rc::new(funcdef)).unwrap()
    }

    #[test]
    fn test_static_type_matches_checker() {
        let mut vm = Runtime::new();
        let func = main_func(&mut vm, vec![]);
        let Function::Ast(ast) = &*func else {
            panic!("expected an interpreted function");
        };
        let mut frame = Frame::new(&mut vm, ast).unwrap();

        let exprs = vec![
            lit(Literal::Int(4)),
            lit(Literal::None),
            e(ExprKind::Name("i32".into())),
            e(ExprKind::BinOp {
                op: BinOp::Mul,
                left: Box::new(lit(Literal::Str("x".into()))),
                right: Box::new(lit(Literal::Int(2))),
            }),
            e(ExprKind::Compare {
                op: CmpOp::GtE,
                left: Box::new(lit(Literal::Int(2))),
                right: Box::new(lit(Literal::Int(2))),
            }),
            e(ExprKind::GetItem {
                value: Box::new(lit(Literal::Str("hey".into()))),
                index: Box::new(lit(Literal::Int(0))),
            }),
            e(ExprKind::Call {
                func: Box::new(e(ExprKind::FqnConst(Identifier::new("builtins", "abs")))),
                args: vec![lit(Literal::Int(-3))],
            }),
        ];
        for expr in &exprs {
            let fv = frame.eval_expr(expr).unwrap();
            let info = frame.checker().annotation(expr).unwrap();
            assert_eq!(fv.static_type, info.ty, "{expr:?}");
            assert_eq!(fv.static_type, fv.value.dynamic_type());
        }
    }

    #[test]
    fn test_block_stops_at_return() {
        let mut vm = Runtime::new();
        let func = main_func(&mut vm, vec![]);
        let Function::Ast(ast) = &*func else {
            panic!("expected an interpreted function");
        };
        let mut frame = Frame::new(&mut vm, ast).unwrap();
        let span = Span::point(1, 1);
        let block = vec![
            Stmt::Return(ReturnStmt {
                value: lit(Literal::Int(1)),
                span,
            }),
            // Never checked: would fail with a type error.
            Stmt::Return(ReturnStmt {
                value: lit(Literal::Str("no".into())),
                span,
            }),
        ];
        let outcome = frame.exec_block(&block).unwrap();
        assert_eq!(outcome, Outcome::Returned(Value::Int(1)));
    }

    #[test]
    fn test_expr_stmt_is_normal() {
        let mut vm = Runtime::new();
        let func = main_func(&mut vm, vec![]);
        let Function::Ast(ast) = &*func else {
            panic!("expected an interpreted function");
        };
        let mut frame = Frame::new(&mut vm, ast).unwrap();
        let stmt = Stmt::Expr(ExprStmt {
            value: lit(Literal::Bool(true)),
            span: Span::point(1, 1),
        });
        assert_eq!(frame.exec_stmt(&stmt).unwrap(), Outcome::Normal);
        assert!(frame.locals().names().is_empty());
    }

    #[test]
    fn test_type_position_requires_type() {
        let mut vm = Runtime::new();
        let func = main_func(&mut vm, vec![]);
        let Function::Ast(ast) = &*func else {
            panic!("expected an interpreted function");
        };
        let mut frame = Frame::new(&mut vm, ast).unwrap();
        assert_eq!(
            frame.eval_expr_type(&e(ExprKind::Name("i32".into()))).unwrap(),
            TypeId::I32
        );
        let err = frame.eval_expr_type(&lit(Literal::Int(1))).unwrap_err();
        assert_eq!(err.code(), ErrorCode::EXPECTED_TYPE);
    }
}
