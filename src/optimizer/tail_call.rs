//! Tail-call conversion: a self-call immediately followed by returning its
//! result becomes a jump back to the function's own entry with its
//! parameter slots rebound, avoiding a fresh stack/SMC frame for
//! recursion in tail position.

use crate::mir::{Instr, MirFunction};

pub fn run(f: &mut MirFunction) -> usize {
    let param_regs: Vec<_> = f.params.iter().map(|(r, _)| *r).collect();
    let entry = f.entry;
    let name = f.name.clone();
    let mut converted = 0;
    let mut out = Vec::with_capacity(f.instructions.len());
    let mut i = 0;
    let instrs = std::mem::take(&mut f.instructions);

    while i < instrs.len() {
        if let (Instr::Call { dst: Some(call_dst), callee, args }, Some(Instr::Return(Some(ret_reg)))) =
            (&instrs[i], instrs.get(i + 1))
        {
            if callee == &name && call_dst == ret_reg {
                out.push(Instr::TailCall { entry, param_regs: param_regs.clone(), args: args.clone() });
                converted += 1;
                i += 2;
                continue;
            }
        }
        out.push(instrs[i].clone());
        i += 1;
    }

    f.instructions = out;
    converted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    #[test]
    fn converts_self_call_in_tail_position() {
        let mut f = MirFunction::new("count", Type::u8());
        let p = f.fresh_reg();
        f.params = vec![(p, Type::u8())];
        let dst = f.fresh_reg();
        f.push(Instr::Call { dst: Some(dst), callee: "count".into(), args: vec![p] });
        f.push(Instr::Return(Some(dst)));

        let converted = run(&mut f);
        assert_eq!(converted, 1);
        assert!(matches!(f.instructions[0], Instr::TailCall { .. }));
    }
}
