//! Hint-driven inlining of small, straight-line callees. Only functions
//! with no internal control flow and no self-call are eligible — this
//! cheaply avoids questions of recursive inlining depth and label
//! renumbering correctness, leaving anything harder to the SMC-decision
//! and tail-call passes instead.

use crate::mir::{Instr, MirModule, Reg};
use std::collections::HashMap;

fn is_inline_candidate(name: &str, f: &crate::mir::MirFunction, threshold: usize) -> bool {
    if f.instructions.len() > threshold || f.instructions.is_empty() {
        return false;
    }
    let has_control_flow = f.instructions.iter().any(|i| {
        matches!(
            i,
            Instr::Label(_) | Instr::Jump(_) | Instr::JumpIfTrue { .. } | Instr::JumpIfFalse { .. } | Instr::TailCall { .. }
        )
    });
    if has_control_flow {
        return false;
    }
    let calls_self = f.instructions.iter().any(|i| matches!(i, Instr::Call { callee, .. } if callee == name));
    if calls_self {
        return false;
    }
    matches!(f.instructions.last(), Some(Instr::Return(_)))
}

pub fn run(module: &mut MirModule, threshold: usize) -> usize {
    let candidates: HashMap<String, crate::mir::MirFunction> = module
        .function_order
        .iter()
        .filter(|name| is_inline_candidate(name, &module.functions[*name], threshold))
        .map(|name| (name.clone(), module.functions[name].clone()))
        .collect();

    let mut inlined = 0;
    for name in module.function_order.clone() {
        let mut next_reg = module.functions[&name].next_reg;
        let is_self = |callee: &str| callee == name;
        let f = module.functions.get_mut(&name).unwrap();
        let mut rewritten = Vec::with_capacity(f.instructions.len());

        for instr in f.instructions.drain(..) {
            match &instr {
                Instr::Call { dst, callee, args } if candidates.contains_key(callee) && !is_self(callee) => {
                    let callee_fn = &candidates[callee];
                    let mut remap: HashMap<Reg, Reg> = HashMap::new();
                    for ((preg, _), arg) in callee_fn.params.iter().zip(args.iter()) {
                        let renamed = fresh_reg_for(&mut remap, &mut next_reg, *preg);
                        rewritten.push(Instr::Move { dst: renamed, src: *arg });
                    }
                    for body_instr in &callee_fn.instructions {
                        if let Instr::Return(ret) = body_instr {
                            if let (Some(d), Some(r)) = (dst, ret) {
                                let renamed = *remap.get(r).unwrap_or(r);
                                rewritten.push(Instr::Move { dst: *d, src: renamed });
                            }
                            continue;
                        }
                        rewritten.push(rename(body_instr, &mut remap, &mut next_reg));
                    }
                    inlined += 1;
                }
                _ => rewritten.push(instr),
            }
        }
        f.instructions = rewritten;
        f.next_reg = next_reg;
    }

    inlined
}

fn fresh_reg_for(remap: &mut HashMap<Reg, Reg>, next_reg: &mut u32, r: Reg) -> Reg {
    if let Some(existing) = remap.get(&r) {
        return *existing;
    }
    let nr = Reg(*next_reg);
    *next_reg += 1;
    remap.insert(r, nr);
    nr
}

fn rename(instr: &Instr, remap: &mut HashMap<Reg, Reg>, next_reg: &mut u32) -> Instr {
    macro_rules! m {
        ($r:expr) => {
            fresh_reg_for(remap, next_reg, $r)
        };
    }
    match instr.clone() {
        Instr::ConstInt { dst, value, ty } => Instr::ConstInt { dst: m!(dst), value, ty },
        Instr::ConstBool { dst, value } => Instr::ConstBool { dst: m!(dst), value },
        Instr::ConstString { dst, value } => Instr::ConstString { dst: m!(dst), value },
        Instr::LoadGlobalAddr { dst, name } => Instr::LoadGlobalAddr { dst: m!(dst), name },
        Instr::Move { dst, src } => Instr::Move { dst: m!(dst), src: m!(src) },
        Instr::Bin { dst, op, lhs, rhs, ty } => Instr::Bin { dst: m!(dst), op, lhs: m!(lhs), rhs: m!(rhs), ty },
        Instr::Un { dst, op, operand, ty } => Instr::Un { dst: m!(dst), op, operand: m!(operand), ty },
        Instr::LoadVar { dst, var } => Instr::LoadVar { dst: m!(dst), var: m!(var) },
        Instr::StoreVar { var, src } => Instr::StoreVar { var: m!(var), src: m!(src) },
        Instr::LoadParam { dst, index } => Instr::LoadParam { dst: m!(dst), index },
        Instr::LoadField { dst, base, offset, ty } => Instr::LoadField { dst: m!(dst), base: m!(base), offset, ty },
        Instr::StoreField { base, offset, src } => Instr::StoreField { base: m!(base), offset, src: m!(src) },
        Instr::LoadElem { dst, base, index, elem_size, ty } => {
            Instr::LoadElem { dst: m!(dst), base: m!(base), index: m!(index), elem_size, ty }
        }
        Instr::StoreElem { base, index, elem_size, src } => {
            Instr::StoreElem { base: m!(base), index: m!(index), elem_size, src: m!(src) }
        }
        Instr::LoadIndirect { dst, ptr, ty } => Instr::LoadIndirect { dst: m!(dst), ptr: m!(ptr), ty },
        Instr::StoreIndirect { ptr, src } => Instr::StoreIndirect { ptr: m!(ptr), src: m!(src) },
        Instr::Call { dst, callee, args } => Instr::Call {
            dst: dst.map(|r| fresh_reg_for(remap, next_reg, r)),
            callee,
            args: args.into_iter().map(|r| fresh_reg_for(remap, next_reg, r)).collect(),
        },
        Instr::Return(r) => Instr::Return(r.map(|r| fresh_reg_for(remap, next_reg, r))),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{BinOp, MirFunction};
    use crate::types::Type;

    #[test]
    fn inlines_small_leaf_callee() {
        let mut module = MirModule::new("m");
        let mut callee = MirFunction::new("double", Type::u8());
        let p = callee.fresh_reg();
        let two = callee.fresh_reg();
        let r = callee.fresh_reg();
        callee.params = vec![(p, Type::u8())];
        callee.push(Instr::ConstInt { dst: two, value: 2, ty: Type::u8() });
        callee.push(Instr::Bin { dst: r, op: BinOp::Mul, lhs: p, rhs: two, ty: Type::u8() });
        callee.push(Instr::Return(Some(r)));
        module.add_function(callee);

        let mut caller = MirFunction::new("main", Type::u8());
        let arg = caller.fresh_reg();
        let result = caller.fresh_reg();
        caller.push(Instr::ConstInt { dst: arg, value: 5, ty: Type::u8() });
        caller.push(Instr::Call { dst: Some(result), callee: "double".into(), args: vec![arg] });
        caller.push(Instr::Return(Some(result)));
        module.add_function(caller);

        let inlined = run(&mut module, 10);
        assert_eq!(inlined, 1);
        let main = &module.functions["main"];
        assert!(!main.instructions.iter().any(|i| matches!(i, Instr::Call { .. })));
    }
}
