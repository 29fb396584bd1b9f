//! Overload resolution and name mangling.

use crate::ast::TypeExpr;
use crate::error::{Error, Result, Span};
use crate::types::Type;

/// One overload of a source-level function name.
#[derive(Debug, Clone)]
pub struct Overload {
    /// The mangled name the backend will see.
    pub mangled: String,
    pub params: Vec<Type>,
    pub ret: Type,
}

/// Mangles `base` with its parameter types into a unique backend-visible
/// name, e.g. `print` taking `u16` becomes `print$u16`.
pub fn mangle(base: &str, params: &[Type]) -> String {
    if params.is_empty() {
        return base.to_string();
    }
    let mut name = base.to_string();
    for p in params {
        name.push('$');
        name.push_str(&type_tag(p));
    }
    name
}

fn type_tag(ty: &Type) -> String {
    match ty {
        Type::Int { signed: true, width } => format!("i{}", width.bytes() * 8),
        Type::Int { signed: false, width } => format!("u{}", width.bytes() * 8),
        Type::Bool => "bool".to_string(),
        Type::Void => "void".to_string(),
        Type::Pointer(inner) => format!("p{}", type_tag(inner)),
        Type::Array { element, length } => format!("a{}x{}", length, type_tag(element)),
        Type::Struct(name) | Type::Enum(name) | Type::Interface(name) => name.clone(),
        Type::Function { .. } => "fn".to_string(),
        Type::Optional(inner) => format!("opt{}", type_tag(inner)),
        Type::Var(n) => format!("var{}", n),
    }
}

/// Assignability used for overload candidate filtering: exact match beats
/// implicit widening of an integer; anything else is not assignable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Assignability {
    Exact,
    Widening,
    None,
}

pub fn assignability(from: &Type, to: &Type) -> Assignability {
    if from == to {
        return Assignability::Exact;
    }
    if let (
        Type::Int { signed: s1, width: w1 },
        Type::Int { signed: s2, width: w2 },
    ) = (from, to)
    {
        if s1 == s2 && w1.bytes() <= w2.bytes() {
            return Assignability::Widening;
        }
    }
    Assignability::None
}

/// Picks the best-matching overload for a call with `arg_types`, following
/// the rule: filter by arity, then by per-parameter assignability
/// (exact > widening > fail); ambiguity or no candidate is an error.
pub fn resolve<'a>(
    name: &str,
    candidates: &'a [Overload],
    arg_types: &[Type],
    span: Span,
) -> Result<&'a Overload> {
    let arity_matched: Vec<&Overload> = candidates
        .iter()
        .filter(|o| o.params.len() == arg_types.len())
        .collect();

    if arity_matched.is_empty() {
        return Err(Error::ArityMismatch {
            name: name.to_string(),
            span,
            expected: candidates.first().map(|o| o.params.len()).unwrap_or(0),
            got: arg_types.len(),
        });
    }

    let mut best: Vec<(&Overload, Vec<Assignability>)> = Vec::new();
    for o in &arity_matched {
        let ranks: Vec<Assignability> = o
            .params
            .iter()
            .zip(arg_types.iter())
            .map(|(p, a)| assignability(a, p))
            .collect();
        if ranks.iter().all(|r| *r != Assignability::None) {
            best.push((o, ranks));
        }
    }

    if best.is_empty() {
        return Err(Error::TypeMismatch {
            span,
            expected: format!("a parameter list assignable from {:?}", arg_types),
            got: "no matching overload".to_string(),
        });
    }

    // An overload whose ranks are componentwise <= another's (and not
    // equal) is strictly better; if no single overload dominates, it's
    // ambiguous.
    best.sort_by(|a, b| a.1.cmp(&b.1));
    let winner = &best[0];
    let tied: Vec<&str> = best
        .iter()
        .filter(|(_, ranks)| *ranks == winner.1)
        .map(|(o, _)| o.mangled.as_str())
        .collect();
    if tied.len() > 1 {
        return Err(Error::AmbiguousOverload {
            name: name.to_string(),
            span,
            candidates: tied.into_iter().map(String::from).collect(),
        });
    }
    Ok(winner.0)
}

/// Resolves a parsed `TypeExpr` into a `Type`, given a lookup for named
/// types (struct/enum/interface names declared in the module).
pub fn resolve_type_expr(
    expr: &TypeExpr,
    is_known_name: &impl Fn(&str) -> Option<Type>,
) -> Result<Type> {
    use crate::ast::TypeExprKind as K;
    match &expr.kind {
        K::Named(name) => match name.as_str() {
            "u8" => Ok(Type::u8()),
            "i8" => Ok(Type::i8()),
            "u16" => Ok(Type::u16()),
            "i16" => Ok(Type::i16()),
            "bool" => Ok(Type::Bool),
            "void" => Ok(Type::Void),
            other => is_known_name(other).ok_or_else(|| Error::UndefinedReference {
                name: other.to_string(),
                span: expr.span,
            }),
        },
        K::Pointer(inner) => Ok(Type::Pointer(Box::new(resolve_type_expr(inner, is_known_name)?))),
        K::Array { element, length } => Ok(Type::Array {
            element: Box::new(resolve_type_expr(element, is_known_name)?),
            length: *length,
        }),
        K::Optional(inner) => Ok(Type::Optional(Box::new(resolve_type_expr(inner, is_known_name)?))),
        K::Function { params, ret } => Ok(Type::Function {
            params: params
                .iter()
                .map(|p| resolve_type_expr(p, is_known_name))
                .collect::<Result<Vec<_>>>()?,
            ret: Box::new(resolve_type_expr(ret, is_known_name)?),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IntWidth;

    #[test]
    fn mangles_by_parameter_types() {
        assert_eq!(mangle("print", &[Type::u16()]), "print$u16");
        assert_eq!(mangle("print", &[]), "print");
    }

    #[test]
    fn exact_beats_widening() {
        let candidates = vec![
            Overload { mangled: "f$u8".into(), params: vec![Type::u8()], ret: Type::Void },
            Overload { mangled: "f$u16".into(), params: vec![Type::u16()], ret: Type::Void },
        ];
        let picked = resolve("f", &candidates, &[Type::u16()], Span::default()).unwrap();
        assert_eq!(picked.mangled, "f$u16");
    }

    #[test]
    fn ambiguous_when_no_overload_dominates() {
        let candidates = vec![
            Overload {
                mangled: "f$u8$u16".into(),
                params: vec![Type::u8(), Type::u16()],
                ret: Type::Void,
            },
            Overload {
                mangled: "f$u16$u8".into(),
                params: vec![Type::u16(), Type::u8()],
                ret: Type::Void,
            },
        ];
        let err = resolve(
            "f",
            &candidates,
            &[Type::Int { signed: false, width: IntWidth::W8 }, Type::Int { signed: false, width: IntWidth::W8 }],
            Span::default(),
        );
        assert!(matches!(err, Err(Error::AmbiguousOverload { .. })));
    }
}
