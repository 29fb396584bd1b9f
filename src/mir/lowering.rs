//! Lowering contracts shared by the analyzer's syntax-directed translation.
//!
//! The analyzer (see `crate::analyzer`) performs the actual AST walk; the
//! helpers here encode the shape rules that translation must follow so
//! every call site applies them the same way: how an `if`/`case` join
//! computes its result type, and how a register is decided to live in a
//! register versus memory.

use crate::types::{Type, TypeTable};

/// The result type of an `if` or `case` expression is the least upper
/// bound of its arm types. `Void` unifies with anything (a branch that
/// only produces side effects), identical types unify with themselves,
/// and anything else is not a valid join.
pub fn join_type(a: &Type, b: &Type) -> Option<Type> {
    if a == b {
        return Some(a.clone());
    }
    match (a, b) {
        (Type::Void, other) | (other, Type::Void) => Some(other.clone()),
        _ => None,
    }
}

/// A struct or array value lives in a register only if it is at most 2
/// bytes and composed entirely of leaf (non-aggregate) types; everything
/// else lives in memory and is addressed through a pointer-valued
/// register instead.
pub fn is_register_representable(ty: &Type, table: &TypeTable) -> bool {
    match ty {
        Type::Struct(_) | Type::Array { .. } => {
            matches!(table.size_of(ty), Some(n) if n <= 2)
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_identical_types() {
        assert_eq!(join_type(&Type::u8(), &Type::u8()), Some(Type::u8()));
    }

    #[test]
    fn join_void_with_value_picks_value() {
        assert_eq!(join_type(&Type::Void, &Type::u16()), Some(Type::u16()));
    }

    #[test]
    fn join_mismatched_value_types_fails() {
        assert_eq!(join_type(&Type::u8(), &Type::Bool), None);
    }

    #[test]
    fn small_array_is_register_representable() {
        let table = TypeTable::new();
        let ty = Type::Array { element: Box::new(Type::u8()), length: 2 };
        assert!(is_register_representable(&ty, &table));
        let big = Type::Array { element: Box::new(Type::u8()), length: 8 };
        assert!(!is_register_representable(&big, &table));
    }
}
