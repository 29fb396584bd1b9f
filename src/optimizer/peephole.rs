//! Local instruction-pair cleanup that runs last, after inlining and
//! tail-call conversion may have introduced redundant moves and jumps.

use crate::mir::{Instr, MirFunction};

pub fn run(f: &mut MirFunction) -> usize {
    let mut removed = 0;

    f.instructions.retain(|instr| {
        if let Instr::Move { dst, src } = instr {
            if dst == src {
                removed += 1;
                return false;
            }
        }
        true
    });

    removed += collapse_jump_to_next_label(f);
    removed
}

/// A `Jump` whose target label is the very next instruction is a no-op.
fn collapse_jump_to_next_label(f: &mut MirFunction) -> usize {
    let mut removed = 0;
    let mut out = Vec::with_capacity(f.instructions.len());
    let instrs = std::mem::take(&mut f.instructions);

    for i in 0..instrs.len() {
        if let Instr::Jump(target) = &instrs[i] {
            if matches!(instrs.get(i + 1), Some(Instr::Label(next)) if next == target) {
                removed += 1;
                continue;
            }
        }
        out.push(instrs[i].clone());
    }

    f.instructions = out;
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    #[test]
    fn removes_self_move() {
        let mut f = MirFunction::new("f", Type::u8());
        let a = f.fresh_reg();
        f.push(Instr::ConstInt { dst: a, value: 1, ty: Type::u8() });
        f.push(Instr::Move { dst: a, src: a });
        f.push(Instr::Return(Some(a)));

        let removed = run(&mut f);
        assert_eq!(removed, 1);
        assert_eq!(f.instructions.len(), 2);
    }

    #[test]
    fn collapses_jump_to_immediately_following_label() {
        let mut f = MirFunction::new("f", Type::Void);
        let l = f.fresh_label();
        f.push(Instr::Jump(l));
        f.push(Instr::Label(l));
        f.push(Instr::Return(None));

        let removed = run(&mut f);
        assert_eq!(removed, 1);
        assert!(matches!(f.instructions[0], Instr::Label(_)));
    }
}
