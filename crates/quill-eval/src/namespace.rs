//! Per-activation local storage.
//!
//! A [`Namespace`] is a shared handle: the activation that created it and
//! every closure built inside that activation see the same slots, so a write
//! through one alias is visible through all of them.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::types::TypeId;
use crate::value::Value;

/// A declared local: its fixed type and, once assigned, its value.
#[derive(Debug, Clone)]
pub struct Slot {
    pub ty: TypeId,
    pub value: Option<Value>,
}

/// Shared name → slot mapping for one activation.
#[derive(Clone, Default)]
pub struct Namespace(Rc<RefCell<BTreeMap<String, Slot>>>);

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `name` as an uninitialized local of type `ty`.
    /// Returns `false` if the name is already declared.
    pub fn declare(&self, name: &str, ty: TypeId) -> bool {
        let mut slots = self.0.borrow_mut();
        if slots.contains_key(name) {
            return false;
        }
        slots.insert(name.to_string(), Slot { ty, value: None });
        true
    }

    pub fn declared_type(&self, name: &str) -> Option<TypeId> {
        self.0.borrow().get(name).map(|slot| slot.ty)
    }

    /// The slot for `name`, if declared.
    pub fn slot(&self, name: &str) -> Option<Slot> {
        self.0.borrow().get(name).cloned()
    }

    /// Overwrite the value of a declared name.
    /// Returns `false` if the name was never declared.
    pub fn store(&self, name: &str, value: Value) -> bool {
        match self.0.borrow_mut().get_mut(name) {
            Some(slot) => {
                slot.value = Some(value);
                true
            }
            None => false,
        }
    }

    /// Declared names, in order.
    pub fn names(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    /// Whether both handles refer to the same storage.
    pub fn ptr_eq(&self, other: &Namespace) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

// Slots may hold closures that capture this very namespace, so only the
// names are printed.
impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Namespace").field(&self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_once() {
        let ns = Namespace::new();
        assert!(ns.declare("x", TypeId::I32));
        assert!(!ns.declare("x", TypeId::STR));
        assert_eq!(ns.declared_type("x"), Some(TypeId::I32));
    }

    #[test]
    fn test_declared_slot_starts_uninitialized() {
        let ns = Namespace::new();
        ns.declare("x", TypeId::I32);
        assert!(ns.slot("x").unwrap().value.is_none());
        assert!(ns.slot("y").is_none());
    }

    #[test]
    fn test_store_requires_declaration() {
        let ns = Namespace::new();
        assert!(!ns.store("x", Value::from(1)));
        ns.declare("x", TypeId::I32);
        assert!(ns.store("x", Value::from(1)));
        assert_eq!(ns.slot("x").unwrap().value, Some(Value::from(1)));
    }

    #[test]
    fn test_aliases_share_storage() {
        let ns = Namespace::new();
        let alias = ns.clone();
        ns.declare("x", TypeId::I32);
        ns.store("x", Value::from(1));
        alias.store("x", Value::from(2));
        assert_eq!(ns.slot("x").unwrap().value, Some(Value::from(2)));
        assert!(ns.ptr_eq(&alias));
        assert!(!ns.ptr_eq(&Namespace::new()));
    }

    #[test]
    fn test_debug_lists_names() {
        let ns = Namespace::new();
        ns.declare("b", TypeId::I32);
        ns.declare("a", TypeId::I32);
        assert_eq!(format!("{ns:?}"), "Namespace([\"a\", \"b\"])");
    }
}
