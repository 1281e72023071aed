//! Quill execution core.
//!
//! Runs scope-analysed Quill ASTs with a tree-walking evaluator that type
//! checks each node immediately before evaluating it. The [`Runtime`] owns
//! the global table and module registry and is the single entry point for
//! calls; every call of an interpreted function gets its own [`Frame`] and
//! [`TypeChecker`].

mod checker;
mod error;
mod frame;
mod function;
mod helpers;
mod namespace;
mod opimpl;
mod stack;
mod types;
mod value;
mod vm;

pub use checker::{AssignTarget, ExprInfo, TypeChecker};
pub use error::{EvalError, EvalResult};
pub use frame::{Frame, FrameValue, Outcome};
pub use function::{AstFunction, Closure, Function, NativeFn, NativeFunction};
pub use helpers::{Helper, HelperFn, MAX_STR_LEN, STR_ADD, STR_GETITEM, STR_MUL};
pub use namespace::{Namespace, Slot};
pub use opimpl::{resolve, resolve_attr, AttrResolution, MultiDispatch, OpImpl, Operator, Resolution};
pub use types::{FuncParam, FuncType, TypeId, TypeInfo, TypeKind, TypeRegistry};
pub use value::Value;
pub use vm::{Module, Runtime, RuntimeConfig, BUILTINS_MODULE};
