//! Game Boy backend. The LR35902 is a cut-down Z80: the same `a, b, c, d,
//! e, h, l` register file and flag-driven branches, but no `ix`/`iy`
//! index registers and no `exx`/`ex af,af'` shadow-bank swap. Without a
//! shadow bank there is no second tier to allocate into, so like the
//! other alternate backends this one skips register allocation entirely
//! and keeps every virtual register in its own WRAM cell, loading into
//! `a` only for the instant of an ALU op.

use super::support::{self, StringPool};
use crate::error::Result;
use crate::mir::{BinOp, Instr, MirFunction, MirModule, Reg, UnOp};
use crate::types::{IntWidth, Type};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

fn cell(r: Reg) -> String {
    format!("v{}", r.0)
}

fn is_wide(ty: &Type) -> bool {
    matches!(ty.int_width(), Some(IntWidth::W16)) || ty.is_pointer()
}

#[derive(Debug, Default)]
pub struct GameBoyBackend {
    strings: StringPool,
    used_helpers: HashSet<&'static str>,
    cmp_counter: u32,
}

impl GameBoyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate(&mut self, module: &MirModule) -> Result<String> {
        let mut out = String::new();
        writeln!(out, "SECTION \"main\", ROM0[$0150]\n").unwrap();

        let mut bodies = String::new();
        for name in &module.function_order {
            let f = &module.functions[name];
            bodies.push_str(&self.lower_function(f)?);
            bodies.push('\n');
        }
        out.push_str(&bodies);

        let mut helper_names: Vec<&'static str> = self.used_helpers.iter().copied().collect();
        helper_names.sort();
        for name in helper_names {
            out.push_str(helper_body(name));
            out.push('\n');
        }

        writeln!(out, "SECTION \"strings\", ROM0").unwrap();
        for (idx, s) in self.strings.strings.iter().enumerate() {
            let bytes = StringPool::bytes(idx, s);
            let list: Vec<String> = bytes.iter().map(|b| format!("${:02x}", b)).collect();
            writeln!(out, "str_{}: db {}", idx, list.join(", ")).unwrap();
        }

        writeln!(out, "\nSECTION \"vars\", WRAM0").unwrap();
        for (name, ty) in &module.globals {
            writeln!(out, "{}: ds {}", super::sanitize(name), ty.leaf_size().unwrap_or(2)).unwrap();
        }
        for name in &module.function_order {
            let f = &module.functions[name];
            let types = support::infer_register_types(f, Type::u16());
            for (r, ty) in &types {
                writeln!(out, "{}_{}: ds {}", super::sanitize(&f.name), cell(*r), ty.leaf_size().unwrap_or(2)).unwrap();
            }
        }
        Ok(out)
    }

    pub fn lower_global(&mut self, name: &str, ty: &Type) -> String {
        format!("{}: ds {}", super::sanitize(name), ty.leaf_size().unwrap_or(2))
    }

    pub fn emit_string_literal(&mut self, s: &str) -> String {
        let idx = self.strings.intern(s);
        format!("str_{}", idx)
    }

    pub fn lower_function(&mut self, f: &MirFunction) -> Result<String> {
        let types = support::infer_register_types(f, Type::u16());
        let prefix = super::sanitize(&f.name);
        let v = |r: Reg| format!("{}_{}", prefix, cell(r));
        let label = prefix.clone();
        let mut out = String::new();
        writeln!(out, "{}:", label).unwrap();

        // Thin stack convention: caller already pushed args onto `hl` as a
        // pointer to a scratch frame; pop them into their home cells.
        for (i, (r, ty)) in f.params.iter().enumerate() {
            writeln!(out, "    ld a, [hl+]").unwrap();
            writeln!(out, "    ld [{}], a", v(*r)).unwrap();
            if is_wide(ty) {
                writeln!(out, "    ld a, [hl+]").unwrap();
                writeln!(out, "    ld [{}+1], a", v(*r)).unwrap();
            }
            let _ = i;
        }

        for instr in &f.instructions {
            self.lower_instr(&mut out, instr, &types, &v, &label)?;
        }
        writeln!(out, "    ret").unwrap();
        Ok(out)
    }

    fn lower_instr(
        &mut self,
        out: &mut String,
        instr: &Instr,
        types: &HashMap<Reg, Type>,
        v: &dyn Fn(Reg) -> String,
        func_label: &str,
    ) -> Result<()> {
        match instr {
            Instr::ConstInt { dst, value, ty } => {
                writeln!(out, "    ld a, low({})\n    ld [{}], a", value, v(*dst)).unwrap();
                if is_wide(ty) {
                    writeln!(out, "    ld a, high({})\n    ld [{}+1], a", value, v(*dst)).unwrap();
                }
            }
            Instr::ConstBool { dst, value } => {
                writeln!(out, "    ld a, {}\n    ld [{}], a", if *value { 1 } else { 0 }, v(*dst)).unwrap();
            }
            Instr::ConstString { dst, value } => {
                let label = self.emit_string_literal(value);
                writeln!(out, "    ld a, low({})\n    ld [{}], a\n    ld a, high({})\n    ld [{}+1], a", label, v(*dst), label, v(*dst)).unwrap();
            }
            Instr::LoadGlobalAddr { dst, name } => {
                let label = super::sanitize(name);
                writeln!(out, "    ld a, low({})\n    ld [{}], a\n    ld a, high({})\n    ld [{}+1], a", label, v(*dst), label, v(*dst)).unwrap();
            }
            Instr::Move { dst, src } => {
                writeln!(out, "    ld a, [{}]\n    ld [{}], a", v(*src), v(*dst)).unwrap();
            }
            Instr::Bin { dst, op, lhs, rhs, ty } => {
                self.emit_bin(out, v(*dst), *op, v(*lhs), v(*rhs), ty);
            }
            Instr::Un { dst, op, operand, .. } => match op {
                UnOp::Neg => writeln!(out, "    xor a\n    sub a, [{}]\n    ld [{}], a", v(*operand), v(*dst)).unwrap(),
                UnOp::Not => writeln!(out, "    ld a, [{}]\n    xor a, 1\n    ld [{}], a", v(*operand), v(*dst)).unwrap(),
                UnOp::BitNot => writeln!(out, "    ld a, [{}]\n    cpl\n    ld [{}], a", v(*operand), v(*dst)).unwrap(),
            },
            Instr::LoadVar { dst, var } => {
                writeln!(out, "    ld a, [{}]\n    ld [{}], a", v(*var), v(*dst)).unwrap();
            }
            Instr::StoreVar { var, src } => {
                writeln!(out, "    ld a, [{}]\n    ld [{}], a", v(*src), v(*var)).unwrap();
            }
            Instr::LoadParam { .. } => {}
            Instr::LoadField { dst, base, offset, .. } => {
                writeln!(out, "    ld a, [{}]\n    ld l, a\n    ld a, [{}+1]\n    ld h, a", v(*base), v(*base)).unwrap();
                for _ in 0..*offset {
                    writeln!(out, "    inc hl").unwrap();
                }
                writeln!(out, "    ld a, [hl]\n    ld [{}], a", v(*dst)).unwrap();
            }
            Instr::StoreField { base, offset, src } => {
                writeln!(out, "    ld a, [{}]\n    ld l, a\n    ld a, [{}+1]\n    ld h, a", v(*base), v(*base)).unwrap();
                for _ in 0..*offset {
                    writeln!(out, "    inc hl").unwrap();
                }
                writeln!(out, "    ld a, [{}]\n    ld [hl], a", v(*src)).unwrap();
            }
            Instr::LoadElem { dst, base, index, .. } => {
                writeln!(out, "    ld a, [{}]\n    ld l, a\n    ld a, [{}+1]\n    ld h, a", v(*base), v(*base)).unwrap();
                writeln!(out, "    ld a, [{}]\n    ld e, a\n    ld d, 0\n    add hl, de", v(*index)).unwrap();
                writeln!(out, "    ld a, [hl]\n    ld [{}], a", v(*dst)).unwrap();
            }
            Instr::StoreElem { base, index, src, .. } => {
                writeln!(out, "    ld a, [{}]\n    ld l, a\n    ld a, [{}+1]\n    ld h, a", v(*base), v(*base)).unwrap();
                writeln!(out, "    ld a, [{}]\n    ld e, a\n    ld d, 0\n    add hl, de", v(*index)).unwrap();
                writeln!(out, "    ld a, [{}]\n    ld [hl], a", v(*src)).unwrap();
            }
            Instr::LoadIndirect { dst, ptr, .. } => {
                writeln!(out, "    ld a, [{}]\n    ld l, a\n    ld a, [{}+1]\n    ld h, a", v(*ptr), v(*ptr)).unwrap();
                writeln!(out, "    ld a, [hl]\n    ld [{}], a", v(*dst)).unwrap();
            }
            Instr::StoreIndirect { ptr, src } => {
                writeln!(out, "    ld a, [{}]\n    ld l, a\n    ld a, [{}+1]\n    ld h, a", v(*ptr), v(*ptr)).unwrap();
                writeln!(out, "    ld a, [{}]\n    ld [hl], a", v(*src)).unwrap();
            }
            Instr::Label(id) => {
                writeln!(out, "{}_{}:", func_label, support::label_name(*id)).unwrap();
            }
            Instr::Jump(id) => {
                writeln!(out, "    jp {}_{}", func_label, support::label_name(*id)).unwrap();
            }
            Instr::JumpIfTrue { cond, target } => {
                writeln!(out, "    ld a, [{}]\n    and a\n    jp nz, {}_{}", v(*cond), func_label, support::label_name(*target)).unwrap();
            }
            Instr::JumpIfFalse { cond, target } => {
                writeln!(out, "    ld a, [{}]\n    and a\n    jp z, {}_{}", v(*cond), func_label, support::label_name(*target)).unwrap();
            }
            Instr::Call { dst, callee, args } => {
                self.emit_call(out, dst.as_ref(), callee, args, v);
            }
            Instr::TailCall { entry, param_regs, args } => {
                for (p, a) in param_regs.iter().zip(args.iter()) {
                    writeln!(out, "    ld a, [{}]\n    ld [{}], a", v(*a), v(*p)).unwrap();
                }
                writeln!(out, "    jp {}_{}", func_label, support::label_name(*entry)).unwrap();
            }
            Instr::Return(Some(r)) => {
                let ty = types.get(r).cloned().unwrap_or(Type::u16());
                writeln!(out, "    ld a, [{}]", v(*r)).unwrap();
                if is_wide(&ty) {
                    writeln!(out, "    ld l, a\n    ld a, [{}+1]\n    ld h, a", v(*r)).unwrap();
                }
                writeln!(out, "    ret").unwrap();
            }
            Instr::Return(None) => {
                writeln!(out, "    ret").unwrap();
            }
            Instr::Halt => {
                writeln!(out, "    stop").unwrap();
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

    fn emit_bin(&mut self, out: &mut String, dst: String, op: BinOp, lhs: String, rhs: String, ty: &Type) {
        if is_wide(ty) {
            let helper = helper_for(op);
            self.used_helpers.insert(helper);
            writeln!(out, "    ld a, [{}]\n    ld [op_lhs], a\n    ld a, [{}+1]\n    ld [op_lhs+1], a", lhs, lhs).unwrap();
            writeln!(out, "    ld a, [{}]\n    ld [op_rhs], a\n    ld a, [{}+1]\n    ld [op_rhs+1], a", rhs, rhs).unwrap();
            writeln!(out, "    call {}", helper).unwrap();
            writeln!(out, "    ld a, [op_res]\n    ld [{}], a\n    ld a, [op_res+1]\n    ld [{}+1], a", dst, dst).unwrap();
            return;
        }

        writeln!(out, "    ld a, [{}]", lhs).unwrap();
        match op {
            BinOp::Add => writeln!(out, "    add a, [{}]", rhs).unwrap(),
            BinOp::Sub => writeln!(out, "    sub a, [{}]", rhs).unwrap(),
            BinOp::And => writeln!(out, "    and a, [{}]", rhs).unwrap(),
            BinOp::Or => writeln!(out, "    or a, [{}]", rhs).unwrap(),
            BinOp::Xor => writeln!(out, "    xor a, [{}]", rhs).unwrap(),
            BinOp::Shl | BinOp::Shr | BinOp::Mul | BinOp::Div | BinOp::Mod => {
                let helper = helper_for(op);
                self.used_helpers.insert(helper);
                writeln!(out, "    ld [op_lhs], a\n    ld a, [{}]\n    ld [op_rhs], a\n    call {}\n    ld a, [op_res]", rhs, helper).unwrap();
            }
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                writeln!(out, "    cp a, [{}]", rhs).unwrap();
                let n = self.cmp_counter;
                self.cmp_counter += 1;
                writeln!(out, "    jp {}, cmp8_{}_true", flag_for(op), n).unwrap();
                writeln!(out, "    xor a\n    jp cmp8_{}_done", n).unwrap();
                writeln!(out, "cmp8_{}_true:\n    ld a, 1", n).unwrap();
                writeln!(out, "cmp8_{}_done:", n).unwrap();
            }
        }
        writeln!(out, "    ld [{}], a", dst).unwrap();
    }

    fn emit_call(&mut self, out: &mut String, dst: Option<&Reg>, callee: &str, args: &[Reg], v: &dyn Fn(Reg) -> String) {
        if support::is_print_callee(callee) {
            self.used_helpers.insert("__print");
            if let Some(arg) = args.first() {
                writeln!(out, "    ld a, [{}]\n    ld [op_lhs], a\n    ld a, [{}+1]\n    ld [op_lhs+1], a", v(*arg), v(*arg)).unwrap();
            }
            writeln!(out, "    call __print").unwrap();
            return;
        }
        for arg in args {
            writeln!(out, "    ld a, [{}]\n    push af", v(*arg)).unwrap();
        }
        writeln!(out, "    call {}", super::sanitize(callee)).unwrap();
        for _ in args {
            writeln!(out, "    pop af").unwrap();
        }
        if let Some(d) = dst {
            writeln!(out, "    ld [{}], a", v(*d)).unwrap();
        }
    }
}

impl super::BackendCapability for GameBoyBackend {
    fn lower_function(&mut self, f: &MirFunction) -> Result<String> {
        GameBoyBackend::lower_function(self, f)
    }

    fn lower_global(&mut self, name: &str, ty: &Type) -> String {
        GameBoyBackend::lower_global(self, name, ty)
    }

    fn emit_string_literal(&mut self, s: &str) -> String {
        GameBoyBackend::emit_string_literal(self, s)
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

fn flag_for(op: BinOp) -> &'static str {
    match op {
        BinOp::Eq => "z",
        BinOp::Ne => "nz",
        BinOp::Lt | BinOp::Le => "c",
        BinOp::Gt | BinOp::Ge => "nc",
        _ => "z",
    }
}

fn helper_body(name: &'static str) -> &'static str {
    match name {
        "__add16" => "__add16:\n    ld a, [op_lhs]\n    ld l, a\n    ld a, [op_lhs+1]\n    ld h, a\n    ld a, [op_rhs]\n    ld e, a\n    ld a, [op_rhs+1]\n    ld d, a\n    add hl, de\n    ld a, l\n    ld [op_res], a\n    ld a, h\n    ld [op_res+1], a\n    ret\n",
        "__print" => "__print:\n    ld a, [op_lhs]\n    ld l, a\n    ld a, [op_lhs+1]\n    ld h, a\n    ld a, [hl+]\n    ld b, a\nprint_loop:\n    ld a, b\n    and a\n    ret z\n    ld a, [hl+]\n    call putchar\n    dec b\n    jp print_loop\n",
        _ => "; runtime arithmetic helper over op_lhs/op_rhs into op_res, elided\n    ret\n",
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

        let mut backend = GameBoyBackend::new();
        let code = backend.lower_function(&f).unwrap();
        assert!(code.contains("add a,"));
        assert!(backend.used_helpers.is_empty());
    }
}
