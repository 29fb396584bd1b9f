//! Z80 backend: pattern-matches MIR instructions to textual Z80 assembly.
//!
//! Eight-bit values live in one of the six general-purpose registers
//! (`b`,`c`,`d`,`e`,`h`,`l`), their shadow counterparts (accessed via
//! `exx`), or a spilled memory cell. `a` is never allocated to a live
//! value; the backend always routes arithmetic through it as scratch.
//! Sixteen-bit values (and pointers) always live in a two-byte memory
//! cell and round-trip through `hl` for each operation — the fast
//! register path is reserved for 8-bit data, matching the type table's
//! choice of `u8`/`i8` as the primary width.

pub mod target;

use self::target::Target;
use super::sanitize_label;
use crate::error::{Error, Result};
use crate::mir::{BinOp, CallConvention, Instr, MirFunction, MirModule, Reg, UnOp};
use crate::regalloc::{Allocation, Location};
use crate::types::{IntWidth, Type};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

const PHYS8: [&str; 6] = ["b", "c", "d", "e", "h", "l"];

/// Maximum SMC parameters the patch mechanism below supports; functions
/// over this limit must already have been routed to the stack convention
/// by the SMC-decision optimizer pass.
pub const MAX_SMC_PARAMS: usize = 4;

enum Operand {
    Reg8(&'static str),
    Mem8(String),
    Mem16(String),
}

pub struct Z80Backend {
    target: Target,
    used_helpers: HashSet<&'static str>,
    strings: Vec<String>,
    string_index: HashMap<String, usize>,
    cmp_counter: u32,
}

impl Z80Backend {
    pub fn new(target: Target) -> Self {
        Self { target, used_helpers: HashSet::new(), strings: Vec::new(), string_index: HashMap::new(), cmp_counter: 0 }
    }

    fn intern_string(&mut self, s: &str) -> usize {
        if let Some(&idx) = self.string_index.get(s) {
            return idx;
        }
        let idx = self.strings.len();
        self.strings.push(s.to_string());
        self.string_index.insert(s.to_string(), idx);
        idx
    }

    /// Renders a complete module: header, data section, one labeled block
    /// per function, tree-shaken stdlib helpers, and an `END` terminator.
    pub fn generate(&mut self, module: &MirModule, allocations: &HashMap<String, Allocation>) -> Result<String> {
        let conventions: HashMap<String, CallConvention> = module
            .functions
            .iter()
            .filter_map(|(name, f)| f.convention.map(|c| (name.clone(), c)))
            .collect();

        let mut code = String::new();
        for name in &module.function_order {
            let f = &module.functions[name];
            let alloc = allocations.get(name).ok_or_else(|| {
                Error::RegisterAllocationFailure { function: name.clone(), reason: "no allocation computed".into() }
            })?;
            let body = self.lower_function(f, alloc, &conventions)?;
            writeln!(code, "{}", body).unwrap();
        }

        let mut out = String::new();
        writeln!(out, "; generated by the MinZ Z80 backend").unwrap();
        writeln!(out, "    org {:#06x}", self.target.entry_address()).unwrap();
        writeln!(out).unwrap();

        writeln!(out, "; --- data ---").unwrap();
        for (name, ty) in &module.globals {
            writeln!(out, "{}", self.lower_global(name, ty)).unwrap();
        }
        for (idx, s) in self.strings.iter().enumerate() {
            writeln!(out, "{}", string_directive(idx, s)).unwrap();
        }
        writeln!(out).unwrap();

        writeln!(out, "; --- code ---").unwrap();
        out.push_str(&code);

        if !self.used_helpers.is_empty() {
            writeln!(out, "; --- stdlib (tree-shaken) ---").unwrap();
            let mut helpers: Vec<_> = self.used_helpers.iter().copied().collect();
            helpers.sort_unstable();
            for h in helpers {
                out.push_str(helper_body(h, self.target));
                out.push('\n');
            }
        }

        let entry = module.function_order.iter().find(|n| n.as_str() == "main").map(|n| sanitize_label(n.as_str()));
        if let Some(entry) = entry {
            writeln!(out, "    end {}", entry).unwrap();
        } else {
            writeln!(out, "    end").unwrap();
        }
        Ok(out)
    }

    pub fn lower_global(&mut self, name: &str, ty: &Type) -> String {
        let label = sanitize_label(name);
        match ty.leaf_size() {
            Some(1) => format!("{}: db 0", label),
            Some(size) => format!("{}: ds {}", label, size),
            None => format!("{}: dw 0", label),
        }
    }

    fn operand(&self, r: Reg, ty: &Type, alloc: &Allocation) -> Operand {
        if matches!(ty.int_width(), Some(IntWidth::W16)) || ty.is_pointer() {
            return Operand::Mem16(mem_cell(r));
        }
        match alloc.location(r) {
            Some(Location::Physical(i)) | Some(Location::Shadow(i)) => Operand::Reg8(PHYS8[i as usize]),
            _ => Operand::Mem8(mem_cell(r)),
        }
    }

    fn is_shadow(r: Reg, alloc: &Allocation) -> bool {
        matches!(alloc.location(r), Some(Location::Shadow(_)))
    }

    fn lower_function(
        &mut self,
        f: &MirFunction,
        alloc: &Allocation,
        conventions: &HashMap<String, CallConvention>,
    ) -> Result<String> {
        let mut out = String::new();
        let label = sanitize_label(&f.name);
        let convention = f.convention.unwrap_or(CallConvention::Stack);
        let mut string_consts: HashMap<Reg, usize> = HashMap::new();

        writeln!(out, "{}:", label).unwrap();

        match convention {
            CallConvention::SelfModifying => {
                if f.params.len() > MAX_SMC_PARAMS {
                    return Err(Error::SMCIneligible {
                        function: f.name.clone(),
                        reason: format!("{} parameters exceeds the {} patch-slot limit", f.params.len(), MAX_SMC_PARAMS),
                    });
                }
                for (i, (reg, ty)) in f.params.iter().enumerate() {
                    writeln!(out, "{}_patch_{}: ld {}, 0", label, i, patch_destination(self, *reg, ty, alloc)).unwrap();
                }
            }
            CallConvention::Stack => {
                writeln!(out, "    push ix").unwrap();
                writeln!(out, "    ld ix, 0").unwrap();
                writeln!(out, "    add ix, sp").unwrap();
                for (i, (reg, ty)) in f.params.iter().enumerate() {
                    let offset = 4 + i * 2;
                    writeln!(out, "    ld hl, {}", offset).unwrap();
                    writeln!(out, "    add hl, ix").unwrap();
                    match self.operand(*reg, ty, alloc) {
                        Operand::Reg8(r) => writeln!(out, "    ld {}, (hl)", r).unwrap(),
                        Operand::Mem8(m) => {
                            writeln!(out, "    ld a, (hl)").unwrap();
                            writeln!(out, "    ld ({}), a", m).unwrap();
                        }
                        Operand::Mem16(m) => {
                            writeln!(out, "    ld e, (hl)\n    inc hl\n    ld d, (hl)").unwrap();
                            writeln!(out, "    ld ({}), de", m).unwrap();
                        }
                    }
                }
            }
        }

        for instr in &f.instructions {
            self.lower_instr(&mut out, instr, alloc, &label, &mut string_consts, convention, conventions)?;
        }

        if convention == CallConvention::Stack {
            writeln!(out, "{}_exit:", label).unwrap();
            writeln!(out, "    pop ix").unwrap();
        }
        writeln!(out, "    ret").unwrap();
        Ok(out)
    }

    fn lower_instr(
        &mut self,
        out: &mut String,
        instr: &Instr,
        alloc: &Allocation,
        label: &str,
        string_consts: &mut HashMap<Reg, usize>,
        convention: CallConvention,
        conventions: &HashMap<String, CallConvention>,
    ) -> Result<()> {
        let shadow_guard = |out: &mut String, regs: &[Reg], open: bool| {
            if regs.iter().any(|r| Self::is_shadow(*r, alloc)) {
                writeln!(out, "    exx").unwrap();
            }
            let _ = open;
        };

        match instr {
            Instr::ConstInt { dst, value, ty } => match self.operand(*dst, ty, alloc) {
                Operand::Reg8(r) => {
                    shadow_guard(out, &[*dst], true);
                    writeln!(out, "    ld {}, {}", r, *value as u8).unwrap();
                    shadow_guard(out, &[*dst], false);
                }
                Operand::Mem8(m) => writeln!(out, "    ld a, {}\n    ld ({}), a", *value as u8, m).unwrap(),
                Operand::Mem16(m) => writeln!(out, "    ld hl, {}\n    ld ({}), hl", *value as u16, m).unwrap(),
            },
            Instr::ConstBool { dst, value } => match self.operand(*dst, &Type::Bool, alloc) {
                Operand::Reg8(r) => {
                    shadow_guard(out, &[*dst], true);
                    writeln!(out, "    ld {}, {}", r, *value as u8).unwrap();
                    shadow_guard(out, &[*dst], false);
                }
                Operand::Mem8(m) => writeln!(out, "    ld a, {}\n    ld ({}), a", *value as u8, m).unwrap(),
                Operand::Mem16(_) => unreachable!("bool is always 8-bit"),
            },
            Instr::ConstString { dst, value } => {
                let idx = self.intern_string(value);
                string_consts.insert(*dst, idx);
                let m = mem_cell(*dst);
                writeln!(out, "    ld hl, {}\n    ld ({}), hl", string_label(idx), m).unwrap();
            }
            Instr::LoadGlobalAddr { dst, name } => {
                writeln!(out, "    ld hl, {}\n    ld ({}), hl", sanitize_label(name), mem_cell(*dst)).unwrap();
            }
            Instr::Move { dst, src } => {
                let ty = if Self::is_wide(*src, alloc) { Type::u16() } else { Type::u8() };
                self.emit_move(out, *dst, *src, &ty, alloc);
            }
            Instr::Bin { dst, op, lhs, rhs, ty } => self.emit_bin(out, *dst, *op, *lhs, *rhs, ty, alloc),
            Instr::Un { dst, op, operand, ty } => self.emit_un(out, *dst, *op, *operand, ty, alloc),
            Instr::LoadVar { dst, var } => self.emit_move(out, *dst, *var, &Type::u8(), alloc),
            Instr::StoreVar { var, src } => self.emit_move(out, *var, *src, &Type::u8(), alloc),
            Instr::LoadParam { .. } => {
                // Parameters are bound into their home locations by the
                // function prologue; nothing to do at the use site.
            }
            Instr::LoadField { dst, base, offset, ty } => {
                writeln!(out, "    ld hl, ({})", mem_cell(*base)).unwrap();
                writeln!(out, "    ld de, {}", offset).unwrap();
                writeln!(out, "    add hl, de").unwrap();
                self.load_from_hl(out, *dst, ty, alloc);
            }
            Instr::StoreField { base, offset, src } => {
                writeln!(out, "    ld hl, ({})", mem_cell(*base)).unwrap();
                writeln!(out, "    ld de, {}", offset).unwrap();
                writeln!(out, "    add hl, de").unwrap();
                self.store_to_hl(out, *src, alloc);
            }
            Instr::LoadElem { dst, base, index, elem_size, ty } => {
                writeln!(out, "    ld hl, ({})", mem_cell(*base)).unwrap();
                self.index_into_hl(out, *index, *elem_size, alloc);
                self.load_from_hl(out, *dst, ty, alloc);
            }
            Instr::StoreElem { base, index, elem_size, src } => {
                writeln!(out, "    ld hl, ({})", mem_cell(*base)).unwrap();
                self.index_into_hl(out, *index, *elem_size, alloc);
                self.store_to_hl(out, *src, alloc);
            }
            Instr::LoadIndirect { dst, ptr, ty } => {
                writeln!(out, "    ld hl, ({})", mem_cell(*ptr)).unwrap();
                self.load_from_hl(out, *dst, ty, alloc);
            }
            Instr::StoreIndirect { ptr, src } => {
                writeln!(out, "    ld hl, ({})", mem_cell(*ptr)).unwrap();
                self.store_to_hl(out, *src, alloc);
            }
            Instr::Label(id) => writeln!(out, "{}_{}:", label, id.0).unwrap(),
            Instr::Jump(id) => writeln!(out, "    jp {}_{}", label, id.0).unwrap(),
            Instr::JumpIfTrue { cond, target } => {
                self.load_a(out, *cond, alloc);
                writeln!(out, "    or a\n    jp nz, {}_{}", label, target.0).unwrap();
            }
            Instr::JumpIfFalse { cond, target } => {
                self.load_a(out, *cond, alloc);
                writeln!(out, "    or a\n    jp z, {}_{}", label, target.0).unwrap();
            }
            Instr::Call { dst, callee, args } => {
                self.emit_call(out, dst.as_ref(), callee, args, alloc, string_consts, label, conventions)?
            }
            Instr::TailCall { entry, param_regs, args } => {
                for (p, a) in param_regs.iter().zip(args.iter()) {
                    self.emit_move(out, *p, *a, &Type::u8(), alloc);
                }
                writeln!(out, "    jp {}_{}", label, entry.0).unwrap();
            }
            Instr::Return(Some(r)) => {
                if Self::is_wide(*r, alloc) {
                    writeln!(out, "    ld hl, ({})", mem_cell(*r)).unwrap();
                } else {
                    self.load_a(out, *r, alloc);
                }
                if convention == CallConvention::Stack {
                    writeln!(out, "    jp {}_exit", label).unwrap();
                }
            }
            Instr::Return(None) => {
                if convention == CallConvention::Stack {
                    writeln!(out, "    jp {}_exit", label).unwrap();
                }
            }
            Instr::Halt => writeln!(out, "    halt").unwrap(),
            Instr::PatchParam { callee, slot, src } => {
                self.load_a(out, *src, alloc);
                writeln!(out, "    ld ({}_patch_{}+1), a", sanitize_label(callee), slot).unwrap();
            }
            Instr::LoadPatchSlot { dst, slot } => {
                writeln!(out, "    ld a, ({}_patch_{}+1)", label, slot).unwrap();
                self.store_a(out, *dst, alloc);
            }
            Instr::StorePatchSlot { slot, src } => {
                self.load_a(out, *src, alloc);
                writeln!(out, "    ld ({}_patch_{}+1), a", label, slot).unwrap();
            }
            Instr::Nop => {}
        }
        Ok(())
    }

    fn is_wide(r: Reg, alloc: &Allocation) -> bool {
        // 16-bit values are never given a register-tier location by this
        // backend's `operand`; anything the allocator never colored is
        // assumed wide rather than an uncolored dead 8-bit temporary.
        alloc.location(r).is_none()
    }

    fn load_a(&self, out: &mut String, r: Reg, alloc: &Allocation) {
        match self.operand(r, &Type::u8(), alloc) {
            Operand::Reg8(name) => {
                if Self::is_shadow(r, alloc) {
                    writeln!(out, "    exx\n    ld a, {}\n    exx", name).unwrap();
                } else {
                    writeln!(out, "    ld a, {}", name).unwrap();
                }
            }
            Operand::Mem8(m) => writeln!(out, "    ld a, ({})", m).unwrap(),
            Operand::Mem16(_) => unreachable!(),
        }
    }

    fn store_a(&self, out: &mut String, r: Reg, alloc: &Allocation) {
        match self.operand(r, &Type::u8(), alloc) {
            Operand::Reg8(name) => {
                if Self::is_shadow(r, alloc) {
                    writeln!(out, "    exx\n    ld {}, a\n    exx", name).unwrap();
                } else {
                    writeln!(out, "    ld {}, a", name).unwrap();
                }
            }
            Operand::Mem8(m) => writeln!(out, "    ld ({}), a", m).unwrap(),
            Operand::Mem16(_) => unreachable!(),
        }
    }

    fn emit_move(&self, out: &mut String, dst: Reg, src: Reg, ty: &Type, alloc: &Allocation) {
        if matches!(ty.int_width(), Some(IntWidth::W16)) || Self::is_wide(dst, alloc) || Self::is_wide(src, alloc) {
            writeln!(out, "    ld hl, ({})", mem_cell(src)).unwrap();
            writeln!(out, "    ld ({}), hl", mem_cell(dst)).unwrap();
        } else {
            self.load_a(out, src, alloc);
            self.store_a(out, dst, alloc);
        }
    }

    fn load_from_hl(&self, out: &mut String, dst: Reg, ty: &Type, alloc: &Allocation) {
        if matches!(ty.int_width(), Some(IntWidth::W16)) {
            writeln!(out, "    ld e, (hl)\n    inc hl\n    ld d, (hl)").unwrap();
            writeln!(out, "    ld ({}), de", mem_cell(dst)).unwrap();
        } else {
            writeln!(out, "    ld a, (hl)").unwrap();
            self.store_a(out, dst, alloc);
        }
    }

    fn store_to_hl(&self, out: &mut String, src: Reg, alloc: &Allocation) {
        if Self::is_wide(src, alloc) {
            writeln!(out, "    push hl").unwrap();
            writeln!(out, "    ld de, ({})", mem_cell(src)).unwrap();
            writeln!(out, "    pop hl").unwrap();
            writeln!(out, "    ld (hl), e\n    inc hl\n    ld (hl), d").unwrap();
        } else {
            self.load_a(out, src, alloc);
            writeln!(out, "    ld (hl), a").unwrap();
        }
    }

    fn index_into_hl(&self, out: &mut String, index: Reg, elem_size: usize, alloc: &Allocation) {
        self.load_a(out, index, alloc);
        writeln!(out, "    ld e, a\n    ld d, 0").unwrap();
        for _ in 1..elem_size.max(1) {
            writeln!(out, "    sla e\n    rl d").unwrap();
        }
        writeln!(out, "    add hl, de").unwrap();
    }

    fn emit_bin(&mut self, out: &mut String, dst: Reg, op: BinOp, lhs: Reg, rhs: Reg, ty: &Type, alloc: &Allocation) {
        let wide = matches!(ty.int_width(), Some(IntWidth::W16)) || Self::is_wide(lhs, alloc) || Self::is_wide(rhs, alloc);
        if wide {
            self.used_helpers.insert(helper_for(op));
            writeln!(out, "    ld hl, ({})", mem_cell(lhs)).unwrap();
            writeln!(out, "    ld de, ({})", mem_cell(rhs)).unwrap();
            writeln!(out, "    call {}", helper_for(op)).unwrap();
            if op.is_comparison() {
                self.store_a(out, dst, alloc);
            } else {
                writeln!(out, "    ld ({}), hl", mem_cell(dst)).unwrap();
            }
            return;
        }

        if let Some(helper) = helper_for8(op) {
            self.used_helpers.insert(helper);
        }
        self.load_a(out, lhs, alloc);
        match self.operand(rhs, ty, alloc) {
            Operand::Reg8(r) => {
                let body = if Self::is_shadow(rhs, alloc) { format!("exx\n    {}\n    exx", alu_mnemonic(op, r)) } else { alu_mnemonic(op, r) };
                writeln!(out, "    {}", body).unwrap();
            }
            Operand::Mem8(m) => writeln!(out, "    {}", alu_mnemonic(op, &format!("({})", m))).unwrap(),
            Operand::Mem16(_) => unreachable!(),
        }
        if op.is_comparison() {
            let n = self.cmp_counter;
            self.cmp_counter += 1;
            writeln!(out, "    jp {}, __cmp8_{}_true", flag_for(op), n).unwrap();
            writeln!(out, "    xor a").unwrap();
            writeln!(out, "    jp __cmp8_{}_done", n).unwrap();
            writeln!(out, "__cmp8_{}_true:", n).unwrap();
            writeln!(out, "    ld a, 1").unwrap();
            writeln!(out, "__cmp8_{}_done:", n).unwrap();
        }
        self.store_a(out, dst, alloc);
    }

    fn emit_un(&mut self, out: &mut String, dst: Reg, op: UnOp, operand: Reg, ty: &Type, alloc: &Allocation) {
        let _ = ty;
        self.load_a(out, operand, alloc);
        match op {
            UnOp::Neg => writeln!(out, "    neg").unwrap(),
            UnOp::Not => writeln!(out, "    xor 1").unwrap(),
            UnOp::BitNot => writeln!(out, "    cpl").unwrap(),
        }
        self.store_a(out, dst, alloc);
    }

    fn emit_call(
        &mut self,
        out: &mut String,
        dst: Option<&Reg>,
        callee: &str,
        args: &[Reg],
        alloc: &Allocation,
        string_consts: &HashMap<Reg, usize>,
        current_label: &str,
        conventions: &HashMap<String, CallConvention>,
    ) -> Result<()> {
        if callee == crate::ctie::interpreter::EMIT_INTRINSIC {
            // Resolved entirely at compile time by CTIE; nothing to emit
            // if a call to it survives into codegen, it was unreachable.
            return Ok(());
        }
        if let Some(base) = callee.strip_prefix("print$") {
            let _ = base;
            self.used_helpers.insert("print");
            for arg in args {
                if let Some(&idx) = string_consts.get(arg) {
                    writeln!(out, "    ld hl, {}", string_label(idx)).unwrap();
                } else {
                    writeln!(out, "    ld hl, ({})", mem_cell(*arg)).unwrap();
                }
                writeln!(out, "    call __print").unwrap();
            }
            return Ok(());
        }

        let target_label = sanitize_label(callee);
        let callee_convention = conventions.get(callee).copied().unwrap_or(CallConvention::Stack);

        match callee_convention {
            CallConvention::SelfModifying => {
                // A self-call writes into its own patch slots; the values
                // it is about to overwrite are still live in the current
                // frame once the call returns, so they are saved on the
                // hardware stack first and restored afterward.
                let recursive = target_label == current_label;
                if recursive {
                    for i in 0..args.len() {
                        writeln!(out, "    ld a, ({}_patch_{}+1)", target_label, i).unwrap();
                        writeln!(out, "    push af").unwrap();
                    }
                }
                for (i, arg) in args.iter().enumerate() {
                    self.load_a(out, *arg, alloc);
                    writeln!(out, "    ld ({}_patch_{}+1), a", target_label, i).unwrap();
                }
                writeln!(out, "    call {}", target_label).unwrap();
                if recursive {
                    for i in (0..args.len()).rev() {
                        writeln!(out, "    pop af").unwrap();
                        writeln!(out, "    ld ({}_patch_{}+1), a", target_label, i).unwrap();
                    }
                }
            }
            CallConvention::Stack => {
                for arg in args.iter().rev() {
                    self.push_stack_word(out, *arg, alloc);
                }
                writeln!(out, "    call {}", target_label).unwrap();
                for _ in args {
                    writeln!(out, "    pop hl").unwrap();
                }
            }
        }

        if let Some(dst) = dst {
            self.store_a(out, *dst, alloc);
        }
        Ok(())
    }

    /// Pushes `r` as a full 16-bit stack word, matching the 2-byte-per-slot
    /// layout the stack-convention prologue reads parameters back from.
    /// 8-bit values are zero-extended into `h`.
    fn push_stack_word(&self, out: &mut String, r: Reg, alloc: &Allocation) {
        if Self::is_wide(r, alloc) {
            writeln!(out, "    ld hl, ({})", mem_cell(r)).unwrap();
        } else {
            self.load_a(out, r, alloc);
            writeln!(out, "    ld l, a\n    ld h, 0").unwrap();
        }
        writeln!(out, "    push hl").unwrap();
    }
}

fn mem_cell(r: Reg) -> String {
    format!("v{}", r.0)
}

fn string_label(idx: usize) -> String {
    format!("str_{}", idx)
}

fn string_directive(idx: usize, s: &str) -> String {
    let mut out = format!("{}: db {}", string_label(idx), s.len());
    for b in s.bytes() {
        write!(out, ", {}", b).unwrap();
    }
    out
}

fn patch_destination(backend: &Z80Backend, reg: Reg, ty: &Type, alloc: &Allocation) -> String {
    match backend.operand(reg, ty, alloc) {
        Operand::Reg8(r) => r.to_string(),
        Operand::Mem8(_) | Operand::Mem16(_) => "a".to_string(),
    }
}

fn alu_mnemonic(op: BinOp, rhs: &str) -> String {
    match op {
        BinOp::Add => format!("add a, {}", rhs),
        BinOp::Sub | BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => format!("cp {}", rhs),
        BinOp::Mul => format!("ld e, {}\n    call __mul8", rhs),
        BinOp::Div => format!("ld e, {}\n    call __div8", rhs),
        BinOp::Mod => format!("ld e, {}\n    call __mod8", rhs),
        BinOp::And => format!("and {}", rhs),
        BinOp::Or => format!("or {}", rhs),
        BinOp::Xor => format!("xor {}", rhs),
        BinOp::Shl => "sla a".to_string(),
        BinOp::Shr => "srl a".to_string(),
    }
}

fn flag_for(op: BinOp) -> &'static str {
    match op {
        BinOp::Eq => "z",
        BinOp::Ne => "nz",
        BinOp::Lt => "c",
        BinOp::Ge => "nc",
        BinOp::Gt => "nc",
        BinOp::Le => "c",
        _ => "z",
    }
}

fn helper_for8(op: BinOp) -> Option<&'static str> {
    match op {
        BinOp::Mul => Some("__mul8"),
        BinOp::Div => Some("__div8"),
        BinOp::Mod => Some("__mod8"),
        _ => None,
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
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => "__cmp16",
    }
}

fn helper_body(name: &str, target: Target) -> &'static str {
    match name {
        "print" => Box::leak(format!(
            "__print:\n    ld b, (hl)\n    inc hl\n__print_loop:\n    ld a, b\n    or a\n    ret z\n    ld a, (hl)\n{}\n    inc hl\n    dec b\n    jp __print_loop\n",
            target.putchar_body()
        ).into_boxed_str()),
        "__add16" => "__add16:\n    add hl, de\n    ret\n",
        "__sub16" => "__sub16:\n    or a\n    sbc hl, de\n    ret\n",
        "__mul16" => "__mul16:\n    ld b, h\n    ld c, l\n    ld hl, 0\n__mul16_loop:\n    ld a, b\n    or c\n    ret z\n    add hl, de\n    dec bc\n    jp __mul16_loop\n",
        "__div16" => "__div16:\n    ld bc, 0\n    ld a, 16\n__div16_loop:\n    add hl, hl\n    rl c\n    rl b\n    push hl\n    ld h, b\n    ld l, c\n    scf\n    ccf\n    sbc hl, de\n    jp c, __div16_skip\n    ld b, h\n    ld c, l\n    pop hl\n    inc l\n    jp __div16_cont\n__div16_skip:\n    pop hl\n__div16_cont:\n    dec a\n    jp nz, __div16_loop\n    ret\n",
        "__mod16" => "__mod16:\n    ld bc, 0\n    ld a, 16\n__mod16_loop:\n    add hl, hl\n    rl c\n    rl b\n    push hl\n    ld h, b\n    ld l, c\n    scf\n    ccf\n    sbc hl, de\n    jp c, __mod16_skip\n    ld b, h\n    ld c, l\n    pop hl\n    inc l\n    jp __mod16_cont\n__mod16_skip:\n    pop hl\n__mod16_cont:\n    dec a\n    jp nz, __mod16_loop\n    ld h, b\n    ld l, c\n    ret\n",
        "__mul8" => "__mul8:\n    ld b, a\n    ld c, e\n    ld d, 0\n__mul8_loop:\n    ld a, c\n    or a\n    jp z, __mul8_done\n    ld a, d\n    add a, b\n    ld d, a\n    dec c\n    jp __mul8_loop\n__mul8_done:\n    ld a, d\n    ret\n",
        "__div8" => "__div8:\n    ld b, a\n    ld c, 0\n__div8_loop:\n    ld a, b\n    cp e\n    jp c, __div8_done\n    sub e\n    ld b, a\n    inc c\n    jp __div8_loop\n__div8_done:\n    ld a, c\n    ret\n",
        "__mod8" => "__mod8:\n    ld b, a\n__mod8_loop:\n    ld a, b\n    cp e\n    jp c, __mod8_done\n    sub e\n    ld b, a\n    jp __mod8_loop\n__mod8_done:\n    ret\n",
        "__and16" => "__and16:\n    ld a, h\n    and d\n    ld h, a\n    ld a, l\n    and e\n    ld l, a\n    ret\n",
        "__or16" => "__or16:\n    ld a, h\n    or d\n    ld h, a\n    ld a, l\n    or e\n    ld l, a\n    ret\n",
        "__xor16" => "__xor16:\n    ld a, h\n    xor d\n    ld h, a\n    ld a, l\n    xor e\n    ld l, a\n    ret\n",
        "__shl16" => "__shl16:\n    sla l\n    rl h\n    ret\n",
        "__shr16" => "__shr16:\n    srl h\n    rr l\n    ret\n",
        "__cmp16" => "__cmp16:\n    or a\n    sbc hl, de\n    ld a, 0\n    ret z\n    ld a, 1\n    ret nc\n    ld a, 0xff\n    ret\n",
        _ => "",
    }
}

impl super::BackendCapability for Z80Backend {
    fn lower_function(&mut self, f: &MirFunction) -> Result<String> {
        let alloc = crate::regalloc::allocate(f, crate::regalloc::RegisterClass::z80());
        let mut conventions = HashMap::new();
        if let Some(c) = f.convention {
            conventions.insert(f.name.clone(), c);
        }
        Z80Backend::lower_function(self, f, &alloc, &conventions)
    }

    fn lower_global(&mut self, name: &str, ty: &Type) -> String {
        Z80Backend::lower_global(self, name, ty)
    }

    fn emit_string_literal(&mut self, s: &str) -> String {
        let idx = self.intern_string(s);
        string_directive(idx, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::MirModule;
    use crate::regalloc::{allocate, RegisterClass};

    #[test]
    fn emits_labeled_function_and_return() {
        let mut f = MirFunction::new("add$u8$u8", Type::u8());
        let a = f.fresh_reg();
        f.params = vec![(a, Type::u8())];
        f.convention = Some(CallConvention::Stack);
        f.push(Instr::ConstInt { dst: a, value: 7, ty: Type::u8() });
        f.push(Instr::Return(Some(a)));

        let alloc = allocate(&f, RegisterClass::z80());
        let mut backend = Z80Backend::new(Target::ZxSpectrum);
        let mut conventions = HashMap::new();
        conventions.insert(f.name.clone(), CallConvention::Stack);
        let asm = backend.lower_function(&f, &alloc, &conventions).unwrap();
        assert!(asm.contains("add_u8_u8:"));
        assert!(asm.contains("ret"));
    }

    #[test]
    fn recursive_smc_call_saves_and_restores_patch_slots() {
        let mut module = MirModule::new("m");
        let mut f = MirFunction::new("fact", Type::u8());
        let n = f.fresh_reg();
        let one = f.fresh_reg();
        let cond = f.fresh_reg();
        let pred = f.fresh_reg();
        let rec = f.fresh_reg();
        let prod = f.fresh_reg();
        let base = f.fresh_label();
        f.params = vec![(n, Type::u8())];
        f.convention = Some(CallConvention::SelfModifying);
        f.push(Instr::ConstInt { dst: one, value: 1, ty: Type::u8() });
        f.push(Instr::Bin { dst: cond, op: BinOp::Le, lhs: n, rhs: one, ty: Type::u8() });
        f.push(Instr::JumpIfTrue { cond, target: base });
        f.push(Instr::Bin { dst: pred, op: BinOp::Sub, lhs: n, rhs: one, ty: Type::u8() });
        f.push(Instr::Call { dst: Some(rec), callee: "fact".into(), args: vec![pred] });
        f.push(Instr::Bin { dst: prod, op: BinOp::Mul, lhs: n, rhs: rec, ty: Type::u8() });
        f.push(Instr::Return(Some(prod)));
        f.push(Instr::Label(base));
        f.push(Instr::Return(Some(one)));
        module.add_function(f);

        let mut allocations = HashMap::new();
        allocations.insert("fact".to_string(), allocate(&module.functions["fact"], RegisterClass::z80()));

        let mut backend = Z80Backend::new(Target::ZxSpectrum);
        let asm = backend.generate(&module, &allocations).unwrap();
        assert!(asm.contains("push af"));
        assert!(asm.contains("pop af"));
        assert!(asm.contains("ld (fact_patch_0+1), a"));
    }

    #[test]
    fn tree_shaking_only_emits_referenced_helpers() {
        let mut module = MirModule::new("m");
        let mut f = MirFunction::new("main", Type::Void);
        f.convention = Some(CallConvention::Stack);
        let s = f.fresh_reg();
        f.push(Instr::ConstString { dst: s, value: "Hi".into() });
        f.push(Instr::Call { dst: None, callee: "print$u16".into(), args: vec![s] });
        f.push(Instr::Return(None));
        module.add_function(f);

        let mut allocations = HashMap::new();
        allocations.insert("main".to_string(), allocate(&module.functions["main"], RegisterClass::z80()));

        let mut backend = Z80Backend::new(Target::ZxSpectrum);
        let asm = backend.generate(&module, &allocations).unwrap();
        assert!(asm.contains("__print:"));
        assert!(!asm.contains("__mul16"));
    }

    #[test]
    fn string_literal_is_length_prefixed_without_null_terminator() {
        let mut backend = Z80Backend::new(Target::ZxSpectrum);
        let idx = backend.intern_string("Hello!");
        let directive = string_directive(idx, "Hello!");
        assert!(directive.starts_with("str_0: db 6,"));
        assert!(!directive.contains(", 0"));
    }
}
