//! Copy and move propagation: replaces uses of a register defined by a
//! plain `Move` with the register it was moved from, then lets dead-code
//! elimination remove the now-unused `Move`.

use crate::mir::{Instr, MirFunction, Reg};
use std::collections::HashMap;

pub fn run(f: &mut MirFunction) -> usize {
    let mut aliases: HashMap<Reg, Reg> = HashMap::new();
    let mut propagated = 0;

    for instr in f.instructions.iter_mut() {
        if matches!(instr, Instr::Label(_)) {
            aliases.clear();
            continue;
        }
        for used in instr.uses() {
            if let Some(&root) = aliases.get(&used) {
                if root != used {
                    propagated += 1;
                }
            }
        }
        substitute_uses(instr, &aliases);

        if let Instr::Move { dst, src } = instr {
            let root = *aliases.get(src).unwrap_or(src);
            aliases.insert(*dst, root);
        } else if let Some(dst) = instr.result() {
            aliases.remove(&dst);
        }
    }

    propagated
}

fn substitute_uses(instr: &mut Instr, aliases: &HashMap<Reg, Reg>) {
    let sub = |r: &mut Reg| {
        if let Some(&root) = aliases.get(r) {
            *r = root;
        }
    };
    match instr {
        Instr::Move { src, .. } => sub(src),
        Instr::Bin { lhs, rhs, .. } => {
            sub(lhs);
            sub(rhs);
        }
        Instr::Un { operand, .. } => sub(operand),
        Instr::StoreVar { src, .. } => sub(src),
        Instr::LoadField { base, .. } => sub(base),
        Instr::StoreField { base, src, .. } => {
            sub(base);
            sub(src);
        }
        Instr::LoadElem { base, index, .. } => {
            sub(base);
            sub(index);
        }
        Instr::StoreElem { base, index, src, .. } => {
            sub(base);
            sub(index);
            sub(src);
        }
        Instr::LoadIndirect { ptr, .. } => sub(ptr),
        Instr::StoreIndirect { ptr, src } => {
            sub(ptr);
            sub(src);
        }
        Instr::JumpIfTrue { cond, .. } | Instr::JumpIfFalse { cond, .. } => sub(cond),
        Instr::Call { args, .. } => args.iter_mut().for_each(sub),
        Instr::Return(Some(r)) => sub(r),
        Instr::PatchParam { src, .. } => sub(src),
        Instr::StorePatchSlot { src, .. } => sub(src),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{BinOp, MirFunction};
    use crate::types::Type;

    #[test]
    fn propagates_move_source_into_later_use() {
        let mut f = MirFunction::new("f", Type::u8());
        let a = f.fresh_reg();
        let b = f.fresh_reg();
        let c = f.fresh_reg();
        f.push(Instr::ConstInt { dst: a, value: 1, ty: Type::u8() });
        f.push(Instr::Move { dst: b, src: a });
        f.push(Instr::Bin { dst: c, op: BinOp::Add, lhs: b, rhs: a, ty: Type::u8() });
        run(&mut f);
        match &f.instructions[2] {
            Instr::Bin { lhs, .. } => assert_eq!(*lhs, a),
            _ => panic!("expected Bin"),
        }
    }
}
