//! Types as first-class runtime objects.
//!
//! Each distinct type is a [`TypeId`] handle into the [`TypeRegistry`], so
//! type equality is a handle comparison. Function types are interned by
//! signature: building the same signature twice yields the same handle.

use std::fmt::Write as _;

use quill_types::ast::Color;
use rustc_hash::FxHashMap;

use crate::helpers;
use crate::opimpl::OpImpl;

/// Handle to a type registered in a [`TypeRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    pub const OBJECT: TypeId = TypeId(0);
    pub const TYPE: TypeId = TypeId(1);
    pub const I32: TypeId = TypeId(2);
    pub const BOOL: TypeId = TypeId(3);
    pub const STR: TypeId = TypeId(4);
    pub const VOID: TypeId = TypeId(5);
    pub const MODULE: TypeId = TypeId(6);

    /// Builtin types, in registration order.
    pub const BUILTINS: [TypeId; 7] = [
        TypeId::OBJECT,
        TypeId::TYPE,
        TypeId::I32,
        TypeId::BOOL,
        TypeId::STR,
        TypeId::VOID,
        TypeId::MODULE,
    ];

    /// Position in the owning registry.
    pub fn raw(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

const BUILTIN_NAMES: [&str; 7] = ["object", "type", "i32", "bool", "str", "void", "module"];

/// One entry of a function type's parameter list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuncParam {
    pub name: String,
    pub ty: TypeId,
    pub color: Color,
}

impl FuncParam {
    pub fn new(name: impl Into<String>, ty: TypeId) -> Self {
        Self {
            name: name.into(),
            ty,
            color: Color::Dynamic,
        }
    }
}

/// Signature of a callable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuncType {
    pub color: Color,
    pub params: Vec<FuncParam>,
    pub result: TypeId,
}

#[derive(Debug, Clone)]
pub enum TypeKind {
    Builtin,
    Function(FuncType),
}

/// Everything the runtime knows about one type.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub name: String,
    pub kind: TypeKind,
    /// Set when the type overrides indexing.
    getitem: Option<OpImpl>,
}

/// Owner of every type handle in a runtime.
#[derive(Debug)]
pub struct TypeRegistry {
    types: Vec<TypeInfo>,
    func_types: FxHashMap<FuncType, TypeId>,
}

impl TypeRegistry {
    /// Create a registry holding the builtin types.
    pub fn new() -> Self {
        let types = BUILTIN_NAMES
            .iter()
            .map(|name| TypeInfo {
                name: (*name).to_string(),
                kind: TypeKind::Builtin,
                getitem: None,
            })
            .collect();
        let mut registry = Self {
            types,
            func_types: FxHashMap::default(),
        };
        registry.set_getitem(
            TypeId::STR,
            OpImpl::new(&helpers::STR_GETITEM, Color::Dynamic),
        );
        registry
    }

    pub fn get(&self, ty: TypeId) -> Option<&TypeInfo> {
        self.types.get(ty.index())
    }

    /// Display name, e.g. `i32` or `def(x: i32, y: i32) -> i32`.
    pub fn name(&self, ty: TypeId) -> &str {
        self.get(ty).map_or("<unknown>", |info| info.name.as_str())
    }

    pub fn func_type(&self, ty: TypeId) -> Option<&FuncType> {
        match &self.get(ty)?.kind {
            TypeKind::Function(ft) => Some(ft),
            TypeKind::Builtin => None,
        }
    }

    /// Intern a function type.
    pub fn make_func_type(&mut self, color: Color, params: Vec<FuncParam>, result: TypeId) -> TypeId {
        let ft = FuncType {
            color,
            params,
            result,
        };
        if let Some(&id) = self.func_types.get(&ft) {
            return id;
        }
        let name = self.func_type_name(&ft);
        let id = TypeId(self.types.len() as u32);
        self.types.push(TypeInfo {
            name,
            kind: TypeKind::Function(ft.clone()),
            getitem: None,
        });
        self.func_types.insert(ft, id);
        id
    }

    /// Declare that `ty` supports `value[index]` through `op`.
    pub fn set_getitem(&mut self, ty: TypeId, op: OpImpl) {
        if let Some(info) = self.types.get_mut(ty.index()) {
            info.getitem = Some(op);
        }
    }

    pub fn getitem_override(&self, ty: TypeId) -> Option<&OpImpl> {
        self.get(ty)?.getitem.as_ref()
    }

    fn func_type_name(&self, ft: &FuncType) -> String {
        let mut name = String::new();
        if ft.color == Color::Static {
            name.push_str("@static ");
        }
        name.push_str("def(");
        for (i, param) in ft.params.iter().enumerate() {
            if i > 0 {
                name.push_str(", ");
            }
            let _ = write!(name, "{}: {}", param.name, self.name(param.ty));
        }
        let _ = write!(name, ") -> {}", self.name(ft.result));
        name
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
