//! Constant folding: `Bin`/`Un` instructions whose operands are both
//! known-constant at a given program point become a single `ConstInt`/
//! `ConstBool`, the same tracking discipline CTIE's interpreter uses but
//! applied to compile-time-constant *literals*, not arbitrary pure calls.

use crate::mir::{BinOp, Instr, MirFunction, Reg, UnOp};
use crate::types::Type;
use std::collections::HashMap;

#[derive(Clone, Copy)]
enum Known {
    Int(i64),
    Bool(bool),
}

pub fn run(f: &mut MirFunction) -> usize {
    let mut known: HashMap<Reg, Known> = HashMap::new();
    let mut folded = 0;
    let mut out = Vec::with_capacity(f.instructions.len());

    for instr in f.instructions.drain(..) {
        match instr {
            Instr::Label(_) => {
                known.clear();
                out.push(instr);
            }
            Instr::ConstInt { dst, value, .. } => {
                known.insert(dst, Known::Int(value));
                out.push(instr);
            }
            Instr::ConstBool { dst, value } => {
                known.insert(dst, Known::Bool(value));
                out.push(instr);
            }
            Instr::Bin { dst, op, lhs, rhs, ty } => {
                match (known.get(&lhs), known.get(&rhs)) {
                    (Some(Known::Int(a)), Some(Known::Int(b))) => match fold_bin(op, *a, *b) {
                        Some(Known::Int(v)) => {
                            known.insert(dst, Known::Int(v));
                            out.push(Instr::ConstInt { dst, value: v, ty });
                            folded += 1;
                        }
                        Some(Known::Bool(v)) => {
                            known.insert(dst, Known::Bool(v));
                            out.push(Instr::ConstBool { dst, value: v });
                            folded += 1;
                        }
                        None => {
                            known.remove(&dst);
                            out.push(Instr::Bin { dst, op, lhs, rhs, ty });
                        }
                    },
                    _ => {
                        known.remove(&dst);
                        out.push(Instr::Bin { dst, op, lhs, rhs, ty });
                    }
                }
            }
            Instr::Un { dst, op, operand, ty } => match known.get(&operand) {
                Some(Known::Int(n)) => {
                    let v = match op {
                        UnOp::Neg => Known::Int(-n),
                        UnOp::Not => Known::Bool(*n == 0),
                        UnOp::BitNot => Known::Int(!n),
                    };
                    known.insert(dst, v);
                    match v {
                        Known::Int(v) => out.push(Instr::ConstInt { dst, value: v, ty }),
                        Known::Bool(v) => out.push(Instr::ConstBool { dst, value: v }),
                    }
                    folded += 1;
                }
                _ => {
                    known.remove(&dst);
                    out.push(Instr::Un { dst, op, operand, ty });
                }
            },
            other => {
                if let Some(d) = other.result() {
                    known.remove(&d);
                }
                out.push(other);
            }
        }
    }

    f.instructions = out;
    folded
}

fn fold_bin(op: BinOp, a: i64, b: i64) -> Option<Known> {
    Some(match op {
        BinOp::Add => Known::Int(a.wrapping_add(b)),
        BinOp::Sub => Known::Int(a.wrapping_sub(b)),
        BinOp::Mul => Known::Int(a.wrapping_mul(b)),
        BinOp::Div if b != 0 => Known::Int(a.wrapping_div(b)),
        BinOp::Mod if b != 0 => Known::Int(a.wrapping_rem(b)),
        BinOp::Div | BinOp::Mod => return None,
        BinOp::Eq => Known::Bool(a == b),
        BinOp::Ne => Known::Bool(a != b),
        BinOp::Lt => Known::Bool(a < b),
        BinOp::Le => Known::Bool(a <= b),
        BinOp::Gt => Known::Bool(a > b),
        BinOp::Ge => Known::Bool(a >= b),
        BinOp::And => Known::Int(a & b),
        BinOp::Or => Known::Int(a | b),
        BinOp::Xor => Known::Int(a ^ b),
        BinOp::Shl => Known::Int(a.wrapping_shl(b as u32)),
        BinOp::Shr => Known::Int(a.wrapping_shr(b as u32)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::Instr;

    #[test]
    fn folds_constant_addition() {
        let mut f = MirFunction::new("f", Type::u8());
        let a = f.fresh_reg();
        let b = f.fresh_reg();
        let c = f.fresh_reg();
        f.push(Instr::ConstInt { dst: a, value: 2, ty: Type::u8() });
        f.push(Instr::ConstInt { dst: b, value: 3, ty: Type::u8() });
        f.push(Instr::Bin { dst: c, op: BinOp::Add, lhs: a, rhs: b, ty: Type::u8() });
        let folded = run(&mut f);
        assert_eq!(folded, 1);
        assert!(matches!(f.instructions[2], Instr::ConstInt { value: 5, .. }));
    }

    #[test]
    fn division_by_constant_zero_is_left_unfolded() {
        let mut f = MirFunction::new("f", Type::u8());
        let a = f.fresh_reg();
        let b = f.fresh_reg();
        let c = f.fresh_reg();
        f.push(Instr::ConstInt { dst: a, value: 1, ty: Type::u8() });
        f.push(Instr::ConstInt { dst: b, value: 0, ty: Type::u8() });
        f.push(Instr::Bin { dst: c, op: BinOp::Div, lhs: a, rhs: b, ty: Type::u8() });
        run(&mut f);
        assert!(matches!(f.instructions[2], Instr::Bin { op: BinOp::Div, .. }));
    }
}
