//! Modules and the per-module type interner.

use super::{EnumDef, InterfaceDef, StructDef, Symbol, Type};
use std::collections::HashMap;

/// Interns struct/enum/interface definitions for a module. `Type::Struct`,
/// `Type::Enum` and `Type::Interface` are name references into this table;
/// a `Type` never outlives the `TypeTable` of the module that defined it.
#[derive(Debug, Default)]
pub struct TypeTable {
    structs: HashMap<String, StructDef>,
    enums: HashMap<String, EnumDef>,
    interfaces: HashMap<String, InterfaceDef>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_struct(&mut self, def: StructDef) -> Option<StructDef> {
        self.structs.insert(def.name.clone(), def)
    }

    pub fn define_enum(&mut self, def: EnumDef) -> Option<EnumDef> {
        self.enums.insert(def.name.clone(), def)
    }

    pub fn define_interface(&mut self, def: InterfaceDef) -> Option<InterfaceDef> {
        self.interfaces.insert(def.name.clone(), def)
    }

    pub fn get_struct(&self, name: &str) -> Option<&StructDef> {
        self.structs.get(name)
    }

    pub fn get_enum(&self, name: &str) -> Option<&EnumDef> {
        self.enums.get(name)
    }

    pub fn get_interface(&self, name: &str) -> Option<&InterfaceDef> {
        self.interfaces.get(name)
    }

    /// Resolves the byte size of any type, following struct/enum
    /// definitions through this table. Interfaces and unresolved
    /// references have no fixed size (monomorphized dispatch means an
    /// interface value never exists on its own; it is always a concrete
    /// implementing type at the use site).
    pub fn size_of(&self, ty: &Type) -> Option<usize> {
        match ty {
            Type::Struct(name) => self.get_struct(name).and_then(|d| d.size(self)),
            Type::Enum(name) => self.get_enum(name).map(|d| d.underlying.bytes()),
            _ => ty.leaf_size(),
        }
    }
}

/// One compilation unit: a dotted module name, its imports, the global
/// symbols it exports, its type definitions, and the function bodies that
/// belong to it. The module owns all of these exclusively; nothing
/// outlives it except read-only resolved types referenced by name.
#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub imports: Vec<(String, Option<String>)>,
    pub globals: HashMap<String, Symbol>,
    pub types: TypeTable,
    pub function_names: Vec<String>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            imports: Vec::new(),
            globals: HashMap::new(),
            types: TypeTable::new(),
            function_names: Vec::new(),
        }
    }

    pub fn alias_for(&self, import_name: &str) -> Option<&str> {
        self.imports
            .iter()
            .find(|(name, _)| name == import_name)
            .and_then(|(_, alias)| alias.as_deref())
    }
}
