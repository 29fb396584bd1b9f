//! # MinZ Type System
//!
//! The type model used across semantic analysis, MIR, and the backends. A
//! `Type` is resolved exactly once per expression during analysis; nothing
//! downstream re-infers types, it only reads them.

pub mod module;
pub mod symbol;

pub use module::{Module, TypeTable};
pub use symbol::{Scope, StorageClass, Symbol, SymbolKind};

use std::fmt;

/// Integer bit width. MinZ's core backend (Z80) only ever materializes 8-bit
/// and 16-bit integers; wider widths are rejected by that backend at
/// selection time rather than modeled away entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntWidth {
    W8,
    W16,
}

impl IntWidth {
    pub fn bytes(self) -> usize {
        match self {
            IntWidth::W8 => 1,
            IntWidth::W16 => 2,
        }
    }
}

/// A field of a struct type, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDef {
    pub name: String,
    pub ty: Type,
}

/// A struct's shape: an ordered list of named fields. Offsets are computed
/// once, at definition time, and never change afterward.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl StructDef {
    /// Byte offset of `field` within an instance of this struct, computed by
    /// summing the sizes of the preceding fields.
    pub fn offset_of(&self, field: &str, table: &TypeTable) -> Option<usize> {
        let mut offset = 0usize;
        for f in &self.fields {
            if f.name == field {
                return Some(offset);
            }
            offset += table.size_of(&f.ty)?;
        }
        None
    }

    pub fn size(&self, table: &TypeTable) -> Option<usize> {
        self.fields.iter().try_fold(0usize, |acc, f| {
            table.size_of(&f.ty).map(|s| acc + s)
        })
    }
}

/// One variant of an enum, with an optional explicit discriminant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumVariant {
    pub name: String,
    pub value: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumDef {
    pub name: String,
    pub underlying: IntWidth,
    pub variants: Vec<EnumVariant>,
}

impl EnumDef {
    pub fn value_of(&self, variant: &str) -> Option<i64> {
        let mut next = 0i64;
        for v in &self.variants {
            let value = v.value.unwrap_or(next);
            if v.name == variant {
                return Some(value);
            }
            next = value + 1;
        }
        None
    }
}

/// A method signature within an interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterfaceMethod {
    pub name: String,
    pub params: Vec<Type>,
    pub ret: Box<Type>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterfaceDef {
    pub name: String,
    pub methods: Vec<InterfaceMethod>,
}

/// The MinZ source-level type.
///
/// Every expression has exactly one resolved `Type` after semantic analysis;
/// there is no remaining inference variable downstream of the analyzer,
/// except `Var` which exists transiently during generic call-site
/// monomorphization and is always resolved before MIR lowering begins.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int { signed: bool, width: IntWidth },
    Bool,
    Void,
    /// Raw pointer to `T`.
    Pointer(Box<Type>),
    /// Fixed-length array of `T`, length known at compile time.
    Array { element: Box<Type>, length: u16 },
    /// Named struct, looked up in the owning module's `TypeTable`.
    Struct(String),
    /// Named enum, looked up in the owning module's `TypeTable`.
    Enum(String),
    Function { params: Vec<Type>, ret: Box<Type> },
    /// Named interface, looked up in the owning module's `TypeTable`.
    Interface(String),
    /// `T?` — may additionally hold null.
    Optional(Box<Type>),
    /// Transient inference variable used only during generic instantiation.
    Var(u32),
}

impl Type {
    pub fn u8() -> Type {
        Type::Int { signed: false, width: IntWidth::W8 }
    }
    pub fn i8() -> Type {
        Type::Int { signed: true, width: IntWidth::W8 }
    }
    pub fn u16() -> Type {
        Type::Int { signed: false, width: IntWidth::W16 }
    }
    pub fn i16() -> Type {
        Type::Int { signed: true, width: IntWidth::W16 }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Int { .. })
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Type::Int { signed: true, .. })
    }

    pub fn int_width(&self) -> Option<IntWidth> {
        match self {
            Type::Int { width, .. } => Some(*width),
            Type::Bool => Some(IntWidth::W8),
            _ => None,
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Pointer(t) => Some(t),
            _ => None,
        }
    }

    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::Array { element, .. } => Some(element),
            _ => None,
        }
    }

    /// Size in bytes for types whose size does not depend on a `TypeTable`
    /// lookup (everything except named struct/enum/interface references).
    pub fn leaf_size(&self) -> Option<usize> {
        match self {
            Type::Int { width, .. } => Some(width.bytes()),
            Type::Bool => Some(1),
            Type::Void => Some(0),
            Type::Pointer(_) => Some(2),
            Type::Array { element, length } => {
                element.leaf_size().map(|s| s * (*length as usize))
            }
            Type::Optional(inner) => inner.leaf_size().map(|s| s + 1),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int { signed: true, width: IntWidth::W8 } => write!(f, "i8"),
            Type::Int { signed: true, width: IntWidth::W16 } => write!(f, "i16"),
            Type::Int { signed: false, width: IntWidth::W8 } => write!(f, "u8"),
            Type::Int { signed: false, width: IntWidth::W16 } => write!(f, "u16"),
            Type::Bool => write!(f, "bool"),
            Type::Void => write!(f, "void"),
            Type::Pointer(t) => write!(f, "*{}", t),
            Type::Array { element, length } => write!(f, "[{}; {}]", element, length),
            Type::Struct(name) | Type::Enum(name) | Type::Interface(name) => {
                write!(f, "{}", name)
            }
            Type::Function { params, ret } => {
                write!(f, "fun(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ") -> {}", ret)
            }
            Type::Optional(t) => write!(f, "{}?", t),
            Type::Var(n) => write!(f, "?{}", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_size_of_primitives() {
        assert_eq!(Type::u8().leaf_size(), Some(1));
        assert_eq!(Type::u16().leaf_size(), Some(2));
        assert_eq!(Type::Bool.leaf_size(), Some(1));
        assert_eq!(Type::Void.leaf_size(), Some(0));
    }

    #[test]
    fn array_size_multiplies() {
        let arr = Type::Array { element: Box::new(Type::u8()), length: 32 };
        assert_eq!(arr.leaf_size(), Some(32));
    }

    #[test]
    fn display_matches_source_syntax() {
        assert_eq!(Type::u16().to_string(), "u16");
        assert_eq!(Type::Pointer(Box::new(Type::u8())).to_string(), "*u8");
        assert_eq!(
            Type::Array { element: Box::new(Type::i8()), length: 4 }.to_string(),
            "[i8; 4]"
        );
    }

    #[test]
    fn enum_variant_values_default_to_sequential() {
        let def = EnumDef {
            name: "Color".into(),
            underlying: IntWidth::W8,
            variants: vec![
                EnumVariant { name: "Red".into(), value: None },
                EnumVariant { name: "Green".into(), value: Some(10) },
                EnumVariant { name: "Blue".into(), value: None },
            ],
        };
        assert_eq!(def.value_of("Red"), Some(0));
        assert_eq!(def.value_of("Green"), Some(10));
        assert_eq!(def.value_of("Blue"), Some(11));
    }
}
