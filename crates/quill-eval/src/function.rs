//! Callable values: interpreted functions with their captured scope, and
//! native functions backed by host closures.

use std::fmt;
use std::rc::Rc;

use quill_types::ast::FuncDef;
use quill_types::{Identifier, IdentifierError};

use crate::error::{EvalError, EvalResult};
use crate::namespace::Namespace;
use crate::types::TypeId;
use crate::value::Value;

/// Captured namespaces of the enclosing activations, outermost first.
pub type Closure = Vec<Namespace>;

/// Host callable behind a [`NativeFunction`].
pub type NativeFn = Rc<dyn Fn(&[Value]) -> EvalResult<Value>>;

/// Either kind of callable. Both are invoked through [`crate::Runtime::call`].
pub enum Function {
    Ast(AstFunction),
    Native(NativeFunction),
}

impl Function {
    pub fn fqn(&self) -> &Identifier {
        match self {
            Function::Ast(f) => &f.fqn,
            Function::Native(f) => &f.fqn,
        }
    }

    pub fn func_type(&self) -> TypeId {
        match self {
            Function::Ast(f) => f.func_type,
            Function::Native(f) => f.func_type,
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Ast(func) => f
                .debug_struct("AstFunction")
                .field("fqn", &func.fqn)
                .field("func_type", &func.func_type)
                .field("closure_depth", &func.closure.len())
                .finish(),
            Function::Native(func) => f
                .debug_struct("NativeFunction")
                .field("fqn", &func.fqn)
                .field("func_type", &func.func_type)
                .finish(),
        }
    }
}

/// A function whose body is walked by the evaluator.
pub struct AstFunction {
    pub fqn: Identifier,
    pub func_type: TypeId,
    pub closure: Closure,
    pub funcdef: Rc<FuncDef>,
}

impl AstFunction {
    /// Identifier for a function defined inside this one: `m::outer.inner`.
    pub fn nested_fqn(&self, inner: &str) -> Result<Identifier, IdentifierError> {
        Identifier::try_new(
            self.fqn.module_path(),
            format!("{}.{}", self.fqn.attr(), inner),
        )
    }

    /// This function's closure extended by one level.
    pub fn extend_closure(&self, locals: &Namespace) -> Closure {
        let mut closure = self.closure.clone();
        closure.push(locals.clone());
        closure
    }
}

/// A function implemented by the host.
pub struct NativeFunction {
    pub fqn: Identifier,
    pub func_type: TypeId,
    callable: NativeFn,
}

impl NativeFunction {
    pub fn new(
        fqn: Identifier,
        func_type: TypeId,
        callable: impl Fn(&[Value]) -> EvalResult<Value> + 'static,
    ) -> Self {
        Self {
            fqn,
            func_type,
            callable: Rc::new(callable),
        }
    }

    /// Wrap a one-argument host function: the argument is unwrapped to `A`
    /// and the result rewrapped.
    pub fn unary<A, R>(fqn: Identifier, func_type: TypeId, f: impl Fn(A) -> R + 'static) -> Self
    where
        A: TryFrom<Value, Error = EvalError>,
        R: Into<Value>,
    {
        Self::new(fqn, func_type, move |args| match args {
            [a] => Ok(f(A::try_from(a.clone())?).into()),
            _ => Err(arity_error(1, args.len())),
        })
    }

    /// Two-argument form of [`NativeFunction::unary`].
    pub fn binary<A, B, R>(
        fqn: Identifier,
        func_type: TypeId,
        f: impl Fn(A, B) -> R + 'static,
    ) -> Self
    where
        A: TryFrom<Value, Error = EvalError>,
        B: TryFrom<Value, Error = EvalError>,
        R: Into<Value>,
    {
        Self::new(fqn, func_type, move |args| match args {
            [a, b] => Ok(f(A::try_from(a.clone())?, B::try_from(b.clone())?).into()),
            _ => Err(arity_error(2, args.len())),
        })
    }

    pub fn invoke(&self, args: &[Value]) -> EvalResult<Value> {
        (self.callable)(args)
    }
}

fn arity_error(expected: usize, got: usize) -> EvalError {
    EvalError::internal(format!(
        "native function expects {expected} argument(s), got {got}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_types::ast::{Color, Expr, ExprKind, Ident, Literal, SymbolTable};
    use quill_types::Span;

    fn empty_funcdef(name: &str) -> Rc<FuncDef> {
        Rc::new(FuncDef {
            name: Ident::new(name, Span::point(1, 1)),
            color: Color::Dynamic,
            args: vec![],
            return_type: Expr::new(ExprKind::Constant(Literal::None), Span::point(1, 1)),
            body: vec![],
            symtable: SymbolTable::new(),
            span: Span::point(1, 1),
        })
    }

    #[test]
    fn test_native_unary_unwraps_and_rewraps() {
        let f = NativeFunction::unary(
            Identifier::new("builtins", "abs"),
            TypeId::OBJECT,
            |x: i32| x.wrapping_abs(),
        );
        assert_eq!(f.invoke(&[Value::from(-5)]).unwrap(), Value::from(5));
        assert!(f.invoke(&[Value::from("x")]).is_err());
        assert!(f.invoke(&[]).is_err());
    }

    #[test]
    fn test_native_binary() {
        let f = NativeFunction::binary(
            Identifier::new("m", "concat"),
            TypeId::OBJECT,
            |a: String, b: String| format!("{a}{b}"),
        );
        assert_eq!(
            f.invoke(&[Value::from("ab"), Value::from("cd")]).unwrap(),
            Value::from("abcd")
        );
    }

    #[test]
    fn test_nested_fqn_and_closure_extension() {
        let outer_locals = Namespace::new();
        let f = AstFunction {
            fqn: Identifier::new("app.main", "outer"),
            func_type: TypeId::OBJECT,
            closure: vec![],
            funcdef: empty_funcdef("outer"),
        };
        assert_eq!(
            f.nested_fqn("inner").unwrap().to_string(),
            "app.main::outer.inner"
        );
        assert!(f.nested_fqn("a::b").is_err());

        let closure = f.extend_closure(&outer_locals);
        assert_eq!(closure.len(), 1);
        assert!(closure[0].ptr_eq(&outer_locals));
    }

    #[test]
    fn test_debug_does_not_walk_closure() {
        let f = Function::Ast(AstFunction {
            fqn: Identifier::new("m", "f"),
            func_type: TypeId::OBJECT,
            closure: vec![Namespace::new()],
            funcdef: empty_funcdef("f"),
        });
        let text = format!("{f:?}");
        assert!(text.contains("closure_depth: 1"));
    }
}
