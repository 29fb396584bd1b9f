//! Purity analysis: fixed-point computation over the call graph.
//!
//! A function is pure iff it touches no globals or memory outside its own
//! locals, performs no I/O or inline assembly, is not `extern`, and calls
//! only other pure functions (directly or transitively). Recursion does
//! not disqualify a function from being pure.

use crate::mir::{Instr, MirModule};
use std::collections::{HashMap, HashSet};

/// Returns the set of function names considered impure by direct
/// inspection of their own instructions, ignoring callees. This is the
/// seed for the fixed-point closure over the call graph.
fn directly_impure(module: &MirModule) -> HashSet<String> {
    let mut impure = HashSet::new();
    for name in &module.function_order {
        let f = &module.functions[name];
        let touches_global_or_memory = f.instructions.iter().any(|i| {
            matches!(
                i,
                Instr::LoadIndirect { .. }
                    | Instr::StoreIndirect { .. }
                    | Instr::StoreField { .. }
                    | Instr::StoreElem { .. }
                    | Instr::LoadGlobalAddr { .. }
            )
        });
        if touches_global_or_memory {
            impure.insert(name.clone());
        }
    }
    impure
}

/// Computes purity for every function in `module`, returning the set of
/// pure function names. Extern functions (no body emitted by this
/// analyzer, i.e. zero instructions) are always impure, matching the rule
/// that purity cannot transitively reach an opaque `extern` callee.
pub fn analyze(module: &MirModule) -> HashMap<String, bool> {
    let mut impure = directly_impure(module);
    for name in &module.function_order {
        if module.functions[name].instructions.is_empty() {
            impure.insert(name.clone());
        }
    }

    loop {
        let mut changed = false;
        for name in &module.function_order {
            if impure.contains(name) {
                continue;
            }
            let f = &module.functions[name];
            let calls_impure = f.instructions.iter().any(|i| match i {
                Instr::Call { callee, .. } => {
                    !module.functions.contains_key(callee) || impure.contains(callee)
                }
                _ => false,
            });
            if calls_impure {
                impure.insert(name.clone());
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    module
        .function_order
        .iter()
        .map(|n| (n.clone(), !impure.contains(n)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{BinOp, MirFunction, Reg};
    use crate::types::Type;

    #[test]
    fn pure_leaf_function_is_pure() {
        let mut module = MirModule::new("m");
        let mut f = MirFunction::new("add", Type::u8());
        let r0 = f.fresh_reg();
        let r1 = f.fresh_reg();
        let r2 = f.fresh_reg();
        f.params = vec![(r0, Type::u8()), (r1, Type::u8())];
        f.push(Instr::Bin { dst: r2, op: BinOp::Add, lhs: r0, rhs: r1, ty: Type::u8() });
        f.push(Instr::Return(Some(r2)));
        module.add_function(f);

        let purity = analyze(&module);
        assert_eq!(purity["add"], true);
    }

    #[test]
    fn function_touching_memory_is_impure() {
        let mut module = MirModule::new("m");
        let mut f = MirFunction::new("poke", Type::Void);
        let ptr = f.fresh_reg();
        let val = f.fresh_reg();
        f.params = vec![(ptr, Type::Pointer(Box::new(Type::u8())))];
        f.push(Instr::ConstInt { dst: val, value: 1, ty: Type::u8() });
        f.push(Instr::StoreIndirect { ptr, src: val });
        f.push(Instr::Return(None));
        module.add_function(f);

        let purity = analyze(&module);
        assert_eq!(purity["poke"], false);
    }

    #[test]
    fn caller_of_impure_function_is_impure() {
        let mut module = MirModule::new("m");
        let mut poke = MirFunction::new("poke", Type::Void);
        let ptr = poke.fresh_reg();
        poke.params = vec![(ptr, Type::Pointer(Box::new(Type::u8())))];
        poke.push(Instr::StoreIndirect { ptr, src: Reg(99) });
        poke.push(Instr::Return(None));
        module.add_function(poke);

        let mut caller = MirFunction::new("wrapper", Type::Void);
        let p = caller.fresh_reg();
        caller.push(Instr::Call { dst: None, callee: "poke".into(), args: vec![p] });
        caller.push(Instr::Return(None));
        module.add_function(caller);

        let purity = analyze(&module);
        assert_eq!(purity["wrapper"], false);
    }
}
