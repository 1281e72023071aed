//! The runtime: global table, module registry, and the call contract.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use quill_types::ast::{Color, Expr, ExprKind, FuncDef};
use quill_types::{ErrorCode, Identifier};
use rustc_hash::FxHashMap;

use crate::error::{EvalError, EvalResult};
use crate::frame::Frame;
use crate::function::{AstFunction, Function, NativeFunction};
use crate::opimpl::MultiDispatch;
use crate::stack::ensure_sufficient_stack;
use crate::types::{FuncParam, TypeId, TypeRegistry};
use crate::value::Value;

/// Name of the module every runtime starts with.
pub const BUILTINS_MODULE: &str = "builtins";

// ══════════════════════════════════════════════════════════════════════════
// Configuration
// ══════════════════════════════════════════════════════════════════════════

/// Limits applied to every call made through a [`Runtime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Maximum number of nested activations.
    pub max_call_depth: usize,
    /// Step budget: one unit per executed statement and evaluated
    /// expression. `None` means unlimited.
    pub gas_limit: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 512,
            gas_limit: None,
        }
    }
}

/// One entry of the global table.
#[derive(Debug, Clone)]
struct Global {
    ty: TypeId,
    value: Value,
    /// `Static` globals are constants: never stored into after declaration.
    color: Color,
}

/// A registered module. Owns identifiers, not values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    pub identifiers: BTreeSet<Identifier>,
}

// ══════════════════════════════════════════════════════════════════════════
// Runtime
// ══════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct Runtime {
    types: TypeRegistry,
    operators: MultiDispatch,
    modules: BTreeMap<String, Module>,
    globals: FxHashMap<Identifier, Global>,
    config: RuntimeConfig,
    depth: usize,
    gas_used: u64,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// A runtime with the `builtins` module already populated.
    pub fn with_config(config: RuntimeConfig) -> Self {
        let mut vm = Self {
            types: TypeRegistry::new(),
            operators: MultiDispatch::with_builtins(),
            modules: BTreeMap::new(),
            globals: FxHashMap::default(),
            config,
            depth: 0,
            gas_used: 0,
        };
        vm.install_builtins();
        vm
    }

    fn install_builtins(&mut self) {
        let mut module = Module {
            name: BUILTINS_MODULE.to_string(),
            identifiers: BTreeSet::new(),
        };
        for ty in TypeId::BUILTINS {
            let fqn = Identifier::new(BUILTINS_MODULE, self.types.name(ty));
            module.identifiers.insert(fqn.clone());
            self.globals.insert(
                fqn,
                Global {
                    ty: TypeId::TYPE,
                    value: Value::Type(ty),
                    color: Color::Static,
                },
            );
        }

        let abs_type = self.types.make_func_type(
            Color::Dynamic,
            vec![FuncParam::new("x", TypeId::I32)],
            TypeId::I32,
        );
        let fqn = Identifier::new(BUILTINS_MODULE, "abs");
        let abs = NativeFunction::unary(fqn.clone(), abs_type, |x: i32| x.wrapping_abs());
        module.identifiers.insert(fqn.clone());
        self.globals.insert(
            fqn,
            Global {
                ty: abs_type,
                value: Value::Function(Rc::new(Function::Native(abs))),
                color: Color::Static,
            },
        );

        self.modules.insert(module.name.clone(), module);
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        &mut self.types
    }

    pub fn operators(&self) -> &MultiDispatch {
        &self.operators
    }

    /// Hosts extend operator dispatch through this table.
    pub fn operators_mut(&mut self) -> &mut MultiDispatch {
        &mut self.operators
    }

    // ── Modules and globals ──────────────────────────────────────────────

    pub fn register_module(&mut self, name: &str) -> EvalResult<()> {
        if self.modules.contains_key(name) {
            return Err(EvalError::declaration(
                ErrorCode::DUPLICATE_MODULE,
                format!("module `{name}` is already registered"),
            ));
        }
        tracing::debug!(module = name, "registered module");
        self.modules.insert(
            name.to_string(),
            Module {
                name: name.to_string(),
                identifiers: BTreeSet::new(),
            },
        );
        Ok(())
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    /// The value standing for a registered module, for binding it to a
    /// global so programs can reach its attributes.
    pub fn module_value(&self, name: &str) -> Option<Value> {
        self.modules
            .get(name)
            .map(|module| Value::Module(Rc::from(module.name.as_str())))
    }

    /// Bind `fqn` once as a mutable global. Its module must be registered
    /// and `value` must have exactly type `ty`.
    pub fn declare_global(&mut self, fqn: Identifier, ty: TypeId, value: Value) -> EvalResult<()> {
        self.declare(fqn, ty, value, Color::Dynamic)
    }

    /// Like [`Runtime::declare_global`], but the binding is a static
    /// constant and can never be stored into.
    pub fn declare_const(&mut self, fqn: Identifier, ty: TypeId, value: Value) -> EvalResult<()> {
        self.declare(fqn, ty, value, Color::Static)
    }

    fn declare(&mut self, fqn: Identifier, ty: TypeId, value: Value, color: Color) -> EvalResult<()> {
        if self.globals.contains_key(&fqn) {
            return Err(EvalError::declaration(
                ErrorCode::DUPLICATE_GLOBAL,
                format!("`{fqn}` is already declared"),
            ));
        }
        if !self.is_compatible_type(&value, ty) {
            return Err(EvalError::declaration(
                ErrorCode::GLOBAL_TYPE_MISMATCH,
                format!(
                    "cannot declare `{fqn}` as `{}` with a value of type `{}`",
                    self.type_name(ty),
                    self.type_name(value.dynamic_type())
                ),
            ));
        }
        let module = self.modules.get_mut(fqn.module_path()).ok_or_else(|| {
            EvalError::declaration(
                ErrorCode::UNKNOWN_MODULE,
                format!("module `{}` is not registered", fqn.module_path()),
            )
        })?;
        module.identifiers.insert(fqn.clone());
        tracing::debug!(%fqn, ty = self.types.name(ty), ?color, "declared global");
        self.globals.insert(fqn, Global { ty, value, color });
        Ok(())
    }

    /// Absent bindings are `None`, not an error.
    pub fn lookup_global(&self, fqn: &Identifier) -> Option<(TypeId, Value)> {
        self.globals
            .get(fqn)
            .map(|global| (global.ty, global.value.clone()))
    }

    pub fn lookup_global_type(&self, fqn: &Identifier) -> Option<TypeId> {
        self.globals.get(fqn).map(|global| global.ty)
    }

    /// `Static` for constants, `Dynamic` for mutable globals.
    pub fn lookup_global_color(&self, fqn: &Identifier) -> Option<Color> {
        self.globals.get(fqn).map(|global| global.color)
    }

    /// Overwrite an already declared, non-constant global. The declared
    /// type never changes.
    pub fn store_global(&mut self, fqn: &Identifier, value: Value) -> EvalResult<()> {
        let (declared, color) = self
            .globals
            .get(fqn)
            .map(|global| (global.ty, global.color))
            .ok_or_else(|| {
                EvalError::declaration(
                    ErrorCode::UNDECLARED_GLOBAL,
                    format!("cannot store into undeclared global `{fqn}`"),
                )
            })?;
        if color == Color::Static {
            return Err(EvalError::declaration(
                ErrorCode::STATIC_ASSIGNMENT,
                format!("cannot store into static global `{fqn}`"),
            ));
        }
        if !self.is_compatible_type(&value, declared) {
            return Err(EvalError::declaration(
                ErrorCode::GLOBAL_TYPE_MISMATCH,
                format!(
                    "`{fqn}` is declared as `{}`, got `{}`",
                    self.type_name(declared),
                    self.type_name(value.dynamic_type())
                ),
            ));
        }
        if let Some(global) = self.globals.get_mut(fqn) {
            global.value = value;
        }
        Ok(())
    }

    // ── Types ────────────────────────────────────────────────────────────

    pub fn dynamic_type(&self, value: &Value) -> TypeId {
        value.dynamic_type()
    }

    /// Exact identity. No widening, no subtyping.
    pub fn is_compatible_type(&self, value: &Value, ty: TypeId) -> bool {
        value.dynamic_type() == ty
    }

    pub fn type_name(&self, ty: TypeId) -> &str {
        self.types.name(ty)
    }

    pub fn unwrap_i32(&self, value: Value) -> EvalResult<i32> {
        value.unwrap_as()
    }

    // ── Functions ────────────────────────────────────────────────────────

    /// Build a module-level function from `funcdef` and declare it as the
    /// constant `module::name`.
    ///
    /// Parameter and result annotations must name globals holding types,
    /// either in `module` or in `builtins`.
    pub fn make_function(&mut self, module: &str, funcdef: Rc<FuncDef>) -> EvalResult<Rc<Function>> {
        let mut params = Vec::with_capacity(funcdef.args.len());
        for arg in &funcdef.args {
            params.push(FuncParam {
                name: arg.name.name.clone(),
                ty: self.resolve_type_expr(module, &arg.type_expr)?,
                color: arg.color,
            });
        }
        let result = self.resolve_type_expr(module, &funcdef.return_type)?;
        let func_type = self.types.make_func_type(funcdef.color, params, result);
        let fqn = Identifier::try_new(module, funcdef.name.name.as_str())?;
        let func = Rc::new(Function::Ast(AstFunction {
            fqn: fqn.clone(),
            func_type,
            closure: Vec::new(),
            funcdef,
        }));
        self.declare_const(fqn, func_type, Value::Function(Rc::clone(&func)))?;
        Ok(func)
    }

    fn resolve_type_expr(&self, module: &str, expr: &Expr) -> EvalResult<TypeId> {
        let found = match &expr.kind {
            ExprKind::FqnConst(fqn) => self.lookup_global(fqn),
            ExprKind::Name(name) => [module, BUILTINS_MODULE]
                .into_iter()
                .filter_map(|m| Identifier::try_new(m, name.as_str()).ok())
                .find_map(|fqn| self.lookup_global(&fqn)),
            _ => None,
        };
        match found {
            Some((_, Value::Type(ty))) => Ok(ty),
            _ => Err(EvalError::type_error(
                ErrorCode::EXPECTED_TYPE,
                "expected a global holding a `type`",
                expr.span,
            )),
        }
    }

    /// Call `func` with `args`: check the boundary, then run an activation
    /// or invoke the host callable.
    #[tracing::instrument(level = "debug", skip_all, fields(fqn = %func.fqn()))]
    pub fn call(&mut self, func: &Function, args: Vec<Value>) -> EvalResult<Value> {
        let ft = self
            .types
            .func_type(func.func_type())
            .cloned()
            .ok_or_else(|| EvalError::internal(format!("`{}` has no function type", func.fqn())))?;
        if ft.params.len() != args.len() {
            return Err(EvalError::runtime(
                ErrorCode::CALL_MISMATCH,
                format!(
                    "`{}` expects {} argument(s), got {}",
                    func.fqn(),
                    ft.params.len(),
                    args.len()
                ),
            ));
        }
        for (param, arg) in ft.params.iter().zip(&args) {
            if !self.is_compatible_type(arg, param.ty) {
                return Err(EvalError::runtime(
                    ErrorCode::CALL_MISMATCH,
                    format!(
                        "argument `{}` of `{}` expects `{}`, got `{}`",
                        param.name,
                        func.fqn(),
                        self.type_name(param.ty),
                        self.type_name(arg.dynamic_type())
                    ),
                ));
            }
        }
        if self.depth >= self.config.max_call_depth {
            return Err(EvalError::runtime(
                ErrorCode::LIMIT_EXCEEDED,
                format!(
                    "maximum call depth of {} exceeded",
                    self.config.max_call_depth
                ),
            ));
        }

        self.depth += 1;
        let result = ensure_sufficient_stack(|| match func {
            Function::Ast(f) => Frame::new(self, f).and_then(|mut frame| frame.run(args)),
            Function::Native(f) => f.invoke(&args),
        });
        self.depth -= 1;
        let value = result?;

        if !self.is_compatible_type(&value, ft.result) {
            return Err(EvalError::runtime(
                ErrorCode::CALL_MISMATCH,
                format!(
                    "`{}` returned `{}`, declared `{}`",
                    func.fqn(),
                    self.type_name(value.dynamic_type()),
                    self.type_name(ft.result)
                ),
            ));
        }
        Ok(value)
    }

    /// Current activation depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn gas_used(&self) -> u64 {
        self.gas_used
    }

    pub fn reset_gas(&mut self) {
        self.gas_used = 0;
    }

    /// Charge one step against the gas budget.
    pub(crate) fn tick(&mut self) -> EvalResult<()> {
        self.gas_used += 1;
        match self.config.gas_limit {
            Some(limit) if self.gas_used > limit => Err(EvalError::runtime(
                ErrorCode::LIMIT_EXCEEDED,
                format!("gas limit of {limit} exhausted"),
            )),
            _ => Ok(()),
        }
    }
}
