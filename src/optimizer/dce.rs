//! Dead-code elimination: removes instructions whose result register is
//! never read by a later instruction, in two backward passes (registers
//! can be both defined and proven dead before a single forward scan would
//! settle).

use crate::mir::{Instr, MirFunction, Reg};
use std::collections::HashSet;

pub fn run(f: &mut MirFunction) -> usize {
    let mut live: HashSet<Reg> = HashSet::new();
    for instr in &f.instructions {
        if instr.result().is_none() || !instr.is_pure() {
            live.extend(instr.uses());
        }
    }

    // Second backward pass: an instruction whose result is live keeps the
    // registers it uses alive too, so sweep until live stops growing.
    loop {
        let before = live.len();
        for instr in &f.instructions {
            if let Some(dst) = instr.result() {
                if live.contains(&dst) {
                    live.extend(instr.uses());
                }
            }
        }
        if live.len() == before {
            break;
        }
    }

    let before_count = f.instructions.len();
    f.instructions.retain(|instr| match instr.result() {
        Some(dst) => !instr.is_pure() || live.contains(&dst),
        None => true,
    });
    before_count - f.instructions.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    #[test]
    fn removes_unused_pure_instruction() {
        let mut f = MirFunction::new("f", Type::u8());
        let a = f.fresh_reg();
        let dead = f.fresh_reg();
        f.push(Instr::ConstInt { dst: a, value: 1, ty: Type::u8() });
        f.push(Instr::ConstInt { dst: dead, value: 2, ty: Type::u8() });
        f.push(Instr::Return(Some(a)));
        let removed = run(&mut f);
        assert_eq!(removed, 1);
        assert_eq!(f.instructions.len(), 2);
    }

    #[test]
    fn keeps_instruction_with_side_effects() {
        let mut f = MirFunction::new("f", Type::Void);
        let ptr = f.fresh_reg();
        let val = f.fresh_reg();
        f.push(Instr::ConstInt { dst: val, value: 1, ty: Type::u8() });
        f.push(Instr::StoreIndirect { ptr, src: val });
        f.push(Instr::Return(None));
        let removed = run(&mut f);
        assert_eq!(removed, 0);
    }
}
