//! Native helpers that operators are lowered to.
//!
//! This is a closed table: operator descriptors and `HelperFunc` call
//! expressions can only name the helpers defined here.

use quill_types::ErrorCode;

use crate::error::{EvalError, EvalResult};
use crate::types::TypeId;
use crate::value::Value;

pub type HelperFn = fn(&[Value]) -> EvalResult<Value>;

/// A helper with its fixed signature.
#[derive(Debug)]
pub struct Helper {
    pub name: &'static str,
    pub params: &'static [TypeId],
    pub result: TypeId,
    func: HelperFn,
}

impl Helper {
    /// Whether the helper accepts arguments of exactly these static types.
    pub fn accepts(&self, arg_types: &[TypeId]) -> bool {
        self.params == arg_types
    }

    pub fn call(&self, args: &[Value]) -> EvalResult<Value> {
        (self.func)(args)
    }
}

pub static STR_ADD: Helper = Helper {
    name: "StrAdd",
    params: &[TypeId::STR, TypeId::STR],
    result: TypeId::STR,
    func: str_add,
};

pub static STR_MUL: Helper = Helper {
    name: "StrMul",
    params: &[TypeId::STR, TypeId::I32],
    result: TypeId::STR,
    func: str_mul,
};

pub static STR_GETITEM: Helper = Helper {
    name: "StrGetItem",
    params: &[TypeId::STR, TypeId::I32],
    result: TypeId::STR,
    func: str_getitem,
};

static HELPERS: [&Helper; 3] = [&STR_ADD, &STR_MUL, &STR_GETITEM];

/// Look up a helper by name.
pub fn get(name: &str) -> Option<&'static Helper> {
    HELPERS.iter().copied().find(|h| h.name == name)
}

fn two_args<A, B>(args: &[Value]) -> EvalResult<(A, B)>
where
    A: TryFrom<Value, Error = EvalError>,
    B: TryFrom<Value, Error = EvalError>,
{
    match args {
        [a, b] => Ok((A::try_from(a.clone())?, B::try_from(b.clone())?)),
        _ => Err(EvalError::internal(format!(
            "helper expects 2 arguments, got {}",
            args.len()
        ))),
    }
}

/// Longest string, in bytes, a helper may produce.
pub const MAX_STR_LEN: usize = 1 << 24;

fn check_str_len(len: Option<usize>) -> EvalResult<usize> {
    match len {
        Some(len) if len <= MAX_STR_LEN => Ok(len),
        _ => Err(EvalError::runtime(
            ErrorCode::LIMIT_EXCEEDED,
            format!("string result longer than {MAX_STR_LEN} bytes"),
        )),
    }
}

fn str_add(args: &[Value]) -> EvalResult<Value> {
    let (a, b): (String, String) = two_args(args)?;
    check_str_len(a.len().checked_add(b.len()))?;
    Ok(Value::from(a + &b))
}

fn str_mul(args: &[Value]) -> EvalResult<Value> {
    let (s, n): (String, i32) = two_args(args)?;
    let times = usize::try_from(n).unwrap_or(0);
    check_str_len(s.len().checked_mul(times))?;
    Ok(Value::from(s.repeat(times)))
}

fn str_getitem(args: &[Value]) -> EvalResult<Value> {
    let (s, i): (String, i32) = two_args(args)?;
    let len = s.chars().count() as i64;
    let index = if i < 0 { len + i64::from(i) } else { i64::from(i) };
    usize::try_from(index)
        .ok()
        .and_then(|index| s.chars().nth(index))
        .map(|c| Value::from(c.to_string()))
        .ok_or_else(|| {
            EvalError::runtime(
                ErrorCode::INDEX_OUT_OF_RANGE,
                format!("string index {i} out of range for length {len}"),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(get("StrAdd").map(|h| h.name), Some("StrAdd"));
        assert!(get("StrSub").is_none());
    }

    #[test]
    fn test_str_add() {
        let v = STR_ADD.call(&[Value::from("ab"), Value::from("cd")]).unwrap();
        assert_eq!(v, Value::from("abcd"));
    }

    #[test]
    fn test_str_mul() {
        let v = STR_MUL.call(&[Value::from("ab"), Value::from(3)]).unwrap();
        assert_eq!(v, Value::from("ababab"));
        let v = STR_MUL.call(&[Value::from("ab"), Value::from(-1)]).unwrap();
        assert_eq!(v, Value::from(""));
    }

    #[test]
    fn test_str_mul_is_bounded() {
        let err = STR_MUL
            .call(&[Value::from("ab"), Value::from(i32::MAX)])
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::LIMIT_EXCEEDED);

        let max = i32::try_from(MAX_STR_LEN).unwrap();
        let v = STR_MUL.call(&[Value::from("a"), Value::from(max)]).unwrap();
        assert!(matches!(v, Value::Str(s) if s.len() == MAX_STR_LEN));
    }

    #[test]
    fn test_str_getitem() {
        let s = Value::from("hello");
        assert_eq!(
            STR_GETITEM.call(&[s.clone(), Value::from(1)]).unwrap(),
            Value::from("e")
        );
        assert_eq!(
            STR_GETITEM.call(&[s.clone(), Value::from(-1)]).unwrap(),
            Value::from("o")
        );
        let err = STR_GETITEM.call(&[s, Value::from(5)]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::INDEX_OUT_OF_RANGE);
    }

    #[test]
    fn test_helper_rejects_wrong_host_values() {
        assert!(STR_ADD.call(&[Value::from(1), Value::from("x")]).is_err());
        assert!(STR_ADD.call(&[Value::from("x")]).is_err());
    }

    #[test]
    fn test_accepts_exact_signature() {
        assert!(STR_MUL.accepts(&[TypeId::STR, TypeId::I32]));
        assert!(!STR_MUL.accepts(&[TypeId::I32, TypeId::STR]));
    }
}
