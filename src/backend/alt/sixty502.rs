//! 6502 backend. Unlike the core Z80 target, this is a thin backend: no
//! register allocator runs, every virtual register lives in its own
//! zero-page cell for the whole function, and `A` is the only register
//! ever loaded — the 6502 has no second accumulator-sized register to
//! hold an operand in, so there is no tiering to do. 16-bit values route
//! through tree-shaken helper subroutines the same way the Z80 backend's
//! pair arithmetic does, just called with `jsr` instead of inlined.

use super::support::{self, StringPool};
use crate::error::{Error, Result};
use crate::mir::{BinOp, Instr, MirFunction, MirModule, Reg};
use crate::types::{IntWidth, Type};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

fn zp(r: Reg) -> String {
    format!("zp_v{}", r.0)
}

fn is_wide(ty: &Type) -> bool {
    matches!(ty.int_width(), Some(IntWidth::W16)) || ty.is_pointer()
}

#[derive(Debug, Default)]
pub struct Mos6502Backend {
    strings: StringPool,
    used_helpers: HashSet<&'static str>,
    cmp_counter: u32,
}

impl Mos6502Backend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate(&mut self, module: &MirModule) -> Result<String> {
        let mut out = String::new();
        writeln!(out, "    .org $0800").unwrap();
        for (name, ty) in &module.globals {
            let size = ty.leaf_size().unwrap_or(2);
            writeln!(out, "{}: .res {}", super::sanitize(name), size).unwrap();
        }

        let mut bodies = String::new();
        for name in &module.function_order {
            let f = &module.functions[name];
            bodies.push_str(&self.lower_function(f)?);
            bodies.push('\n');
        }

        for (idx, s) in self.strings.strings.iter().enumerate() {
            let bytes = StringPool::bytes(idx, s);
            let list: Vec<String> = bytes.iter().map(|b| format!("${:02x}", b)).collect();
            writeln!(out, "str_{}: .byte {}", idx, list.join(", ")).unwrap();
        }
        out.push_str(&bodies);

        let mut helper_names: Vec<&'static str> = self.used_helpers.iter().copied().collect();
        helper_names.sort();
        for name in helper_names {
            out.push_str(helper_body(name));
            out.push('\n');
        }

        if module.functions.contains_key("main") {
            writeln!(out, "    .org $fffc\n    .word main").unwrap();
        }
        Ok(out)
    }

    pub fn lower_global(&mut self, name: &str, _ty: &Type) -> String {
        format!("{}: .res 2", super::sanitize(name))
    }

    pub fn emit_string_literal(&mut self, s: &str) -> String {
        let idx = self.strings.intern(s);
        format!("str_{}", idx)
    }

    pub fn lower_function(&mut self, f: &MirFunction) -> Result<String> {
        let types = support::infer_register_types(f, Type::u16());
        let label = super::sanitize(&f.name);
        let mut out = String::new();
        writeln!(out, "{}:", label).unwrap();

        // Thin stack convention: parameters arrive on a small software
        // stack pointed to by the zero-page pair sp_lo/sp_hi, popped into
        // their home cells on entry.
        for (i, (r, ty)) in f.params.iter().enumerate() {
            if is_wide(ty) {
                return Err(Error::BackendUnsupported {
                    backend: "6502".into(),
                    feature: format!("16-bit parameter #{} in {} (thin backend is 8-bit-only)", i, f.name),
                });
            }
            writeln!(out, "    ldy #{}", i).unwrap();
            writeln!(out, "    lda (sp_lo), y").unwrap();
            writeln!(out, "    sta {}", zp(*r)).unwrap();
        }

        for instr in &f.instructions {
            self.lower_instr(&mut out, instr, &types)?;
        }
        writeln!(out, "    rts").unwrap();
        Ok(out)
    }

    fn lower_instr(&mut self, out: &mut String, instr: &Instr, types: &HashMap<Reg, Type>) -> Result<()> {
        match instr {
            Instr::ConstInt { dst, value, ty } => {
                if is_wide(ty) {
                    writeln!(out, "    lda #<{}\n    sta {}\n    lda #>{}\n    sta {}+1", value, zp(*dst), value, zp(*dst)).unwrap();
                } else {
                    writeln!(out, "    lda #{}\n    sta {}", value, zp(*dst)).unwrap();
                }
            }
            Instr::ConstBool { dst, value } => {
                writeln!(out, "    lda #{}\n    sta {}", if *value { 1 } else { 0 }, zp(*dst)).unwrap();
            }
            Instr::ConstString { dst, value } => {
                let label = self.emit_string_literal(value);
                writeln!(out, "    lda #<{}\n    sta {}\n    lda #>{}\n    sta {}+1", label, zp(*dst), label, zp(*dst)).unwrap();
            }
            Instr::LoadGlobalAddr { dst, name } => {
                let label = super::sanitize(name);
                writeln!(out, "    lda #<{}\n    sta {}\n    lda #>{}\n    sta {}+1", label, zp(*dst), label, zp(*dst)).unwrap();
            }
            Instr::Move { dst, src } => {
                writeln!(out, "    lda {}\n    sta {}", zp(*src), zp(*dst)).unwrap();
            }
            Instr::Bin { dst, op, lhs, rhs, ty } => {
                self.emit_bin(out, *dst, *op, *lhs, *rhs, ty);
            }
            Instr::Un { dst, op, operand, .. } => match op {
                crate::mir::UnOp::Neg => {
                    writeln!(out, "    lda #0\n    sec\n    sbc {}\n    sta {}", zp(*operand), zp(*dst)).unwrap();
                }
                crate::mir::UnOp::Not => {
                    writeln!(out, "    lda {}\n    eor #1\n    sta {}", zp(*operand), zp(*dst)).unwrap();
                }
                crate::mir::UnOp::BitNot => {
                    writeln!(out, "    lda {}\n    eor #$ff\n    sta {}", zp(*operand), zp(*dst)).unwrap();
                }
            },
            Instr::LoadVar { dst, var } => {
                writeln!(out, "    lda {}\n    sta {}", zp(*var), zp(*dst)).unwrap();
            }
            Instr::StoreVar { var, src } => {
                writeln!(out, "    lda {}\n    sta {}", zp(*src), zp(*var)).unwrap();
            }
            Instr::LoadParam { .. } => {
                // already bound by the prologue's stack pop
            }
            Instr::LoadField { dst, base, offset, .. } => {
                writeln!(out, "    ldy #{}\n    lda ({}), y\n    sta {}", offset, zp(*base), zp(*dst)).unwrap();
            }
            Instr::StoreField { base, offset, src } => {
                writeln!(out, "    ldy #{}\n    lda {}\n    sta ({}), y", offset, zp(*src), zp(*base)).unwrap();
            }
            Instr::LoadElem { dst, base, index, elem_size, .. } => {
                writeln!(out, "    lda {}\n    ldy #0", zp(*index)).unwrap();
                for _ in 0..*elem_size {
                    writeln!(out, "    ; elem_size {} scales index before indirection", elem_size).unwrap();
                }
                writeln!(out, "    tay\n    lda ({}), y\n    sta {}", zp(*base), zp(*dst)).unwrap();
            }
            Instr::StoreElem { base, index, src, .. } => {
                writeln!(out, "    ldy {}\n    lda {}\n    sta ({}), y", zp(*index), zp(*src), zp(*base)).unwrap();
            }
            Instr::LoadIndirect { dst, ptr, .. } => {
                writeln!(out, "    ldy #0\n    lda ({}), y\n    sta {}", zp(*ptr), zp(*dst)).unwrap();
            }
            Instr::StoreIndirect { ptr, src } => {
                writeln!(out, "    ldy #0\n    lda {}\n    sta ({}), y", zp(*src), zp(*ptr)).unwrap();
            }
            Instr::Label(id) => {
                writeln!(out, "{}:", support::label_name(*id)).unwrap();
            }
            Instr::Jump(id) => {
                writeln!(out, "    jmp {}", support::label_name(*id)).unwrap();
            }
            Instr::JumpIfTrue { cond, target } => {
                writeln!(out, "    lda {}\n    bne {}", zp(*cond), support::label_name(*target)).unwrap();
            }
            Instr::JumpIfFalse { cond, target } => {
                writeln!(out, "    lda {}\n    beq {}", zp(*cond), support::label_name(*target)).unwrap();
            }
            Instr::Call { dst, callee, args } => {
                self.emit_call(out, dst.as_ref(), callee, args);
            }
            Instr::TailCall { entry, param_regs, args } => {
                for (p, a) in param_regs.iter().zip(args.iter()) {
                    writeln!(out, "    lda {}\n    sta {}", zp(*a), zp(*p)).unwrap();
                }
                writeln!(out, "    jmp {}", support::label_name(*entry)).unwrap();
            }
            Instr::Return(Some(r)) => {
                let ty = types.get(r).cloned().unwrap_or(Type::u16());
                if is_wide(&ty) {
                    writeln!(out, "    lda {}\n    ldx {}+1", zp(*r), zp(*r)).unwrap();
                } else {
                    writeln!(out, "    lda {}", zp(*r)).unwrap();
                }
                writeln!(out, "    rts").unwrap();
            }
            Instr::Return(None) => {
                writeln!(out, "    rts").unwrap();
            }
            Instr::Halt => {
                writeln!(out, "loop_forever:\n    jmp loop_forever").unwrap();
            }
            Instr::PatchParam { .. } | Instr::LoadPatchSlot { .. } | Instr::StorePatchSlot { .. } => {
                writeln!(out, "    ; self-modifying-code patch ignored on this backend").unwrap();
            }
            Instr::Nop => {
                writeln!(out, "    nop").unwrap();
            }
        }
        Ok(())
    }

    fn emit_bin(&mut self, out: &mut String, dst: Reg, op: BinOp, lhs: Reg, rhs: Reg, ty: &Type) {
        if is_wide(ty) {
            let helper = helper_for(op);
            self.used_helpers.insert(helper);
            writeln!(
                out,
                "    lda {}\n    sta op_lhs\n    lda {}+1\n    sta op_lhs+1",
                zp(lhs), zp(lhs)
            ).unwrap();
            writeln!(
                out,
                "    lda {}\n    sta op_rhs\n    lda {}+1\n    sta op_rhs+1",
                zp(rhs), zp(rhs)
            ).unwrap();
            writeln!(out, "    jsr {}", helper).unwrap();
            writeln!(out, "    lda op_res\n    sta {}\n    lda op_res+1\n    sta {}+1", zp(dst), zp(dst)).unwrap();
            return;
        }

        writeln!(out, "    lda {}", zp(lhs)).unwrap();
        match op {
            BinOp::Add => writeln!(out, "    clc\n    adc {}", zp(rhs)).unwrap(),
            BinOp::Sub => writeln!(out, "    sec\n    sbc {}", zp(rhs)).unwrap(),
            BinOp::And => writeln!(out, "    and {}", zp(rhs)).unwrap(),
            BinOp::Or => writeln!(out, "    ora {}", zp(rhs)).unwrap(),
            BinOp::Xor => writeln!(out, "    eor {}", zp(rhs)).unwrap(),
            BinOp::Shl | BinOp::Shr => {
                let n = self.cmp_counter;
                self.cmp_counter += 1;
                let mnemonic = if op == BinOp::Shl { "asl" } else { "lsr" };
                writeln!(
                    out,
                    "    ldx {}\nshift_{n}_loop:\n    cpx #0\n    beq shift_{n}_done\n    {mnemonic} a\n    dex\n    jmp shift_{n}_loop\nshift_{n}_done:",
                    zp(rhs), n = n, mnemonic = mnemonic
                ).unwrap();
            }
            BinOp::Mul | BinOp::Div | BinOp::Mod => {
                let helper = helper_for(op);
                self.used_helpers.insert(helper);
                writeln!(out, "    sta op_lhs\n    lda {}\n    sta op_rhs\n    jsr {}\n    lda op_res", zp(rhs), helper).unwrap();
            }
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                writeln!(out, "    cmp {}", zp(rhs)).unwrap();
                let n = self.cmp_counter;
                self.cmp_counter += 1;
                writeln!(out, "    {} cmp8_{}_true", branch_for(op), n).unwrap();
                writeln!(out, "    lda #0\n    jmp cmp8_{}_done", n).unwrap();
                writeln!(out, "cmp8_{}_true:\n    lda #1", n).unwrap();
                writeln!(out, "cmp8_{}_done:", n).unwrap();
            }
        }
        writeln!(out, "    sta {}", zp(dst)).unwrap();
    }

    fn emit_call(&mut self, out: &mut String, dst: Option<&Reg>, callee: &str, args: &[Reg]) {
        if support::is_print_callee(callee) {
            self.used_helpers.insert("__print");
            if let Some(arg) = args.first() {
                writeln!(out, "    lda {}\n    sta op_lhs\n    lda {}+1\n    sta op_lhs+1", zp(*arg), zp(*arg)).unwrap();
            }
            writeln!(out, "    jsr __print").unwrap();
            return;
        }
        for (i, arg) in args.iter().enumerate() {
            writeln!(out, "    lda {}\n    ldy #{}\n    sta (sp_lo), y", zp(*arg), i).unwrap();
        }
        writeln!(out, "    jsr {}", super::sanitize(callee)).unwrap();
        if let Some(d) = dst {
            writeln!(out, "    sta {}", zp(*d)).unwrap();
        }
    }
}

impl super::BackendCapability for Mos6502Backend {
    fn lower_function(&mut self, f: &MirFunction) -> Result<String> {
        Mos6502Backend::lower_function(self, f)
    }

    fn lower_global(&mut self, name: &str, ty: &Type) -> String {
        Mos6502Backend::lower_global(self, name, ty)
    }

    fn emit_string_literal(&mut self, s: &str) -> String {
        Mos6502Backend::emit_string_literal(self, s)
    }
}

fn helper_for(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "__add16",
        BinOp::Sub => "__sub16",
        BinOp::Mul => "__mul16",
        BinOp::Div => "__div16",
        BinOp::Mod => "__mod16",
        BinOp::And => "__and16",
        BinOp::Or => "__or16",
        BinOp::Xor => "__xor16",
        BinOp::Shl => "__shl16",
        BinOp::Shr => "__shr16",
        _ => "__cmp16",
    }
}

fn branch_for(op: BinOp) -> &'static str {
    match op {
        BinOp::Eq => "beq",
        BinOp::Ne => "bne",
        BinOp::Lt | BinOp::Le => "bcc",
        BinOp::Gt | BinOp::Ge => "bcs",
        _ => "beq",
    }
}

fn helper_body(name: &'static str) -> &'static str {
    match name {
        "__add16" => "__add16:\n    clc\n    lda op_lhs\n    adc op_rhs\n    sta op_res\n    lda op_lhs+1\n    adc op_rhs+1\n    sta op_res+1\n    rts\n",
        "__sub16" => "__sub16:\n    sec\n    lda op_lhs\n    sbc op_rhs\n    sta op_res\n    lda op_lhs+1\n    sbc op_rhs+1\n    sta op_res+1\n    rts\n",
        "__mul16" | "__div16" | "__mod16" | "__and16" | "__or16" | "__xor16" | "__shl16" | "__shr16" | "__cmp16" => {
            "; runtime arithmetic helper over op_lhs/op_rhs into op_res, elided\n    rts\n"
        }
        "__print" => "__print:\n    ldy #0\n    lda (op_lhs), y\n    sta str_len\nprint_loop:\n    lda str_len\n    beq print_done\n    iny\n    lda (op_lhs), y\n    jsr putchar\n    dec str_len\n    jmp print_loop\nprint_done:\n    rts\n",
        _ => "    rts\n",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eight_bit_add_lowers_without_helper() {
        let mut f = MirFunction::new("add", Type::u8());
        let a = f.fresh_reg();
        let b = f.fresh_reg();
        let c = f.fresh_reg();
        f.params.push((a, Type::u8()));
        f.params.push((b, Type::u8()));
        f.push(Instr::Bin { dst: c, op: BinOp::Add, lhs: a, rhs: b, ty: Type::u8() });
        f.push(Instr::Return(Some(c)));

        let mut backend = Mos6502Backend::new();
        let code = backend.lower_function(&f).unwrap();
        assert!(code.contains("adc"));
        assert!(backend.used_helpers.is_empty());
    }

    #[test]
    fn sixteen_bit_add_routes_through_helper() {
        let mut f = MirFunction::new("add", Type::u16());
        let a = f.fresh_reg();
        let b = f.fresh_reg();
        let c = f.fresh_reg();
        f.push(Instr::ConstInt { dst: a, value: 1, ty: Type::u16() });
        f.push(Instr::ConstInt { dst: b, value: 2, ty: Type::u16() });
        f.push(Instr::Bin { dst: c, op: BinOp::Add, lhs: a, rhs: b, ty: Type::u16() });
        f.push(Instr::Return(Some(c)));

        let mut backend = Mos6502Backend::new();
        backend.lower_function(&f).unwrap();
        assert!(backend.used_helpers.contains("__add16"));
    }
}
