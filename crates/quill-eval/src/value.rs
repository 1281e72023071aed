//! Runtime values and the host bridge.

use std::fmt;
use std::rc::Rc;

use quill_types::ast::Literal;

use crate::error::{EvalError, EvalResult};
use crate::function::Function;
use crate::types::TypeId;

/// A runtime value.
///
/// Scalars are held inline; functions are shared by reference.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i32),
    Bool(bool),
    Str(Rc<str>),
    /// The absence value, the only inhabitant of `void`.
    None,
    Type(TypeId),
    Function(Rc<Function>),
    /// A registered module, by name.
    Module(Rc<str>),
}

impl Value {
    /// The dynamic type of this value. Needs no external context.
    pub fn dynamic_type(&self) -> TypeId {
        match self {
            Value::Int(_) => TypeId::I32,
            Value::Bool(_) => TypeId::BOOL,
            Value::Str(_) => TypeId::STR,
            Value::None => TypeId::VOID,
            Value::Type(_) => TypeId::TYPE,
            Value::Module(_) => TypeId::MODULE,
            Value::Function(f) => f.func_type(),
        }
    }

    /// Variant name used in host-bridge error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "i32",
            Value::Bool(_) => "bool",
            Value::Str(_) => "str",
            Value::None => "None",
            Value::Type(_) => "type",
            Value::Module(_) => "module",
            Value::Function(_) => "function",
        }
    }

    /// Extract a host-level value, failing if the variant does not match.
    pub fn unwrap_as<T>(self) -> EvalResult<T>
    where
        T: TryFrom<Value, Error = EvalError>,
    {
        T::try_from(self)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<TypeId> {
        match self {
            Value::Type(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Rc<Function>> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::None, Value::None) => true,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Module(a), Value::Module(b)) => a == b,
            // Functions compare by identity.
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::None => write!(f, "None"),
            Value::Type(t) => write!(f, "<type #{}>", t.raw()),
            Value::Module(name) => write!(f, "<module `{name}`>"),
            Value::Function(func) => write!(f, "<function `{}`>", func.fqn()),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Host bridge
// ══════════════════════════════════════════════════════════════════════════════

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::None
    }
}

impl From<TypeId> for Value {
    fn from(t: TypeId) -> Self {
        Value::Type(t)
    }
}

impl From<&Literal> for Value {
    fn from(lit: &Literal) -> Self {
        match lit {
            Literal::Int(n) => Value::Int(*n),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Str(s) => Value::from(s.as_str()),
            Literal::None => Value::None,
        }
    }
}

fn mismatch(expected: &'static str, found: &Value) -> EvalError {
    EvalError::HostTypeMismatch {
        expected,
        found: found.kind_name(),
    }
}

impl TryFrom<Value> for i32 {
    type Error = EvalError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Int(n) => Ok(n),
            other => Err(mismatch("i32", &other)),
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = EvalError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl TryFrom<Value> for String {
    type Error = EvalError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Str(s) => Ok(s.to_string()),
            other => Err(mismatch("str", &other)),
        }
    }
}

impl TryFrom<Value> for () {
    type Error = EvalError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::None => Ok(()),
            other => Err(mismatch("None", &other)),
        }
    }
}
