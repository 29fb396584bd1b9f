//! WebAssembly text format backend.
//!
//! WebAssembly has no `goto`: branches only ever target an enclosing
//! `block`/`loop`. MIR's flat instruction stream has arbitrary jumps, so
//! this backend uses the standard trampoline translation: the function
//! body is split into segments at each `Label`, wrapped in one `loop`
//! nested inside N `block`s (one per segment, innermost first), and a
//! `$pc` local plus a leading `br_table` dispatches to the right segment
//! on every iteration. A `Jump` becomes `local.set $pc` followed by
//! `br $top` back to the dispatcher instead of a direct branch.

use super::support::{self, StringPool};
use crate::error::Result;
use crate::mir::{BinOp, Instr, LabelId, MirFunction, MirModule, Reg, UnOp};
use crate::types::{IntWidth, Type};
use std::collections::HashMap;
use std::fmt::Write as _;

#[derive(Debug, Default)]
pub struct WasmBackend {
    strings: StringPool,
    global_addrs: HashMap<String, usize>,
}

impl WasmBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate(&mut self, module: &MirModule) -> Result<String> {
        let mut out = String::new();
        writeln!(out, "(module").unwrap();
        writeln!(out, "  (import \"env\" \"print\" (func $__print (param i32)))").unwrap();
        writeln!(out, "  (memory (export \"memory\") 1)").unwrap();

        let mut data = String::new();
        for name in &module.function_order {
            let f = &module.functions[name];
            out.push_str(&self.lower_function(f)?);
        }
        for (idx, s) in self.strings.strings.iter().enumerate() {
            let bytes = StringPool::bytes(idx, s);
            let escaped: String = bytes.iter().map(|b| format!("\\{:02x}", b)).collect();
            writeln!(data, "  (data (i32.const {}) \"{}\")", idx * 256, escaped).unwrap();
        }
        out.push_str(&data);
        if module.functions.contains_key("main") {
            writeln!(out, "  (export \"main\" (func $main))").unwrap();
        }
        writeln!(out, ")").unwrap();
        Ok(out)
    }

    pub fn lower_global(&mut self, name: &str, ty: &Type) -> String {
        format!("(global ${} (mut {}) ({}.const 0))", super::sanitize(name), wasm_type(ty), wasm_type(ty))
    }

    pub fn emit_string_literal(&mut self, s: &str) -> String {
        let idx = self.strings.intern(s);
        // Data segments are laid out at fixed 256-byte strides; the pointer
        // a `ConstString` materializes is just that segment's base address.
        (idx * 256).to_string()
    }

    /// Aggregate-literal backing globals get their own 256-byte-stride
    /// address space above the string pool's, assigned on first use.
    fn global_addr(&mut self, name: &str) -> usize {
        if let Some(&addr) = self.global_addrs.get(name) {
            return addr;
        }
        let addr = 0x10000 + self.global_addrs.len() * 256;
        self.global_addrs.insert(name.to_string(), addr);
        addr
    }

    pub fn lower_function(&mut self, f: &MirFunction) -> Result<String> {
        let types = support::infer_register_types(f, Type::u16());
        let name = super::sanitize(&f.name);
        let mut out = String::new();

        let params: Vec<String> = f.params.iter().map(|(_, ty)| format!("(param {})", wasm_type(ty))).collect();
        let result = if matches!(f.ret, Type::Void) { String::new() } else { format!(" (result {})", wasm_type(&f.ret)) };
        writeln!(out, "  (func ${} {}{}", name, params.join(" "), result).unwrap();

        writeln!(out, "    (local $pc i32)").unwrap();
        let mut regs: Vec<Reg> = types.keys().copied().collect();
        regs.sort();
        let param_regs: std::collections::HashSet<Reg> = f.params.iter().map(|(r, _)| *r).collect();
        for r in &regs {
            if !param_regs.contains(r) {
                writeln!(out, "    (local {} {})", support::register_name(*r), wasm_type(&types[r])).unwrap();
            }
        }
        for (i, (r, _)) in f.params.iter().enumerate() {
            writeln!(out, "    (local.set {} (local.get {}))", support::register_name(*r), i).unwrap();
            let _ = i;
        }

        let segments = split_into_segments(&f.instructions);
        let segment_index: HashMap<LabelId, usize> = segments
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.label.map(|l| (l, i)))
            .collect();

        writeln!(out, "    (block $done").unwrap();
        writeln!(out, "    (loop $top").unwrap();
        for i in (0..segments.len()).rev() {
            writeln!(out, "    (block $b{}", i).unwrap();
        }
        let targets: Vec<String> = (0..segments.len()).map(|i| format!("$b{}", i)).collect();
        writeln!(out, "      (br_table {} (local.get $pc))", targets.join(" ")).unwrap();
        writeln!(out, "    )").unwrap();

        for (i, segment) in segments.iter().enumerate() {
            for instr in &segment.body {
                self.lower_instr(&mut out, instr, &types, &segment_index, i)?;
            }
            writeln!(out, "    )").unwrap();
        }
        writeln!(out, "    )").unwrap();
        writeln!(out, "    )").unwrap();
        if !matches!(f.ret, Type::Void) {
            writeln!(out, "    {}.const 0", wasm_type(&f.ret)).unwrap();
        }
        writeln!(out, "  )").unwrap();
        Ok(out)
    }

    fn lower_instr(
        &mut self,
        out: &mut String,
        instr: &Instr,
        types: &HashMap<Reg, Type>,
        segment_index: &HashMap<LabelId, usize>,
        current_segment: usize,
    ) -> Result<()> {
        let v = support::register_name;
        let ty_of = |r: &Reg| types.get(r).cloned().unwrap_or(Type::u16());
        match instr {
            Instr::ConstInt { dst, value, .. } => {
                writeln!(out, "      (local.set {} (i32.const {}))", v(*dst), value).unwrap();
            }
            Instr::ConstBool { dst, value } => {
                writeln!(out, "      (local.set {} (i32.const {}))", v(*dst), if *value { 1 } else { 0 }).unwrap();
            }
            Instr::ConstString { dst, value } => {
                let addr = self.emit_string_literal(value);
                writeln!(out, "      (local.set {} (i32.const {}))", v(*dst), addr).unwrap();
            }
            Instr::LoadGlobalAddr { dst, name } => {
                let addr = self.global_addr(name);
                writeln!(out, "      (local.set {} (i32.const {}))", v(*dst), addr).unwrap();
            }
            Instr::Move { dst, src } => {
                writeln!(out, "      (local.set {} (local.get {}))", v(*dst), v(*src)).unwrap();
            }
            Instr::Bin { dst, op, lhs, rhs, ty } => {
                writeln!(
                    out,
                    "      (local.set {} ({} (local.get {}) (local.get {})))",
                    v(*dst), wasm_binop(*op, ty), v(*lhs), v(*rhs)
                ).unwrap();
            }
            Instr::Un { dst, op, operand, .. } => match op {
                UnOp::Neg => writeln!(out, "      (local.set {} (i32.sub (i32.const 0) (local.get {})))", v(*dst), v(*operand)).unwrap(),
                UnOp::Not => writeln!(out, "      (local.set {} (i32.xor (local.get {}) (i32.const 1)))", v(*dst), v(*operand)).unwrap(),
                UnOp::BitNot => writeln!(out, "      (local.set {} (i32.xor (local.get {}) (i32.const -1)))", v(*dst), v(*operand)).unwrap(),
            },
            Instr::LoadVar { dst, var } => {
                writeln!(out, "      (local.set {} (local.get {}))", v(*dst), v(*var)).unwrap();
            }
            Instr::StoreVar { var, src } => {
                writeln!(out, "      (local.set {} (local.get {}))", v(*var), v(*src)).unwrap();
            }
            Instr::LoadParam { .. } => {}
            Instr::LoadField { dst, base, offset, ty } => {
                writeln!(out, "      (local.set {} ({} offset={} (local.get {})))", v(*dst), load_op(ty), offset, v(*base)).unwrap();
            }
            Instr::StoreField { base, offset, src } => {
                let ty = ty_of(src);
                writeln!(out, "      ({} offset={} (local.get {}) (local.get {}))", store_op(&ty), offset, v(*base), v(*src)).unwrap();
            }
            Instr::LoadElem { dst, base, index, elem_size, ty } => {
                writeln!(
                    out,
                    "      (local.set {} ({} (i32.add (local.get {}) (i32.mul (local.get {}) (i32.const {})))))",
                    v(*dst), load_op(ty), v(*base), v(*index), elem_size
                ).unwrap();
            }
            Instr::StoreElem { base, index, elem_size, src } => {
                let ty = ty_of(src);
                writeln!(
                    out,
                    "      ({} (i32.add (local.get {}) (i32.mul (local.get {}) (i32.const {}))) (local.get {}))",
                    store_op(&ty), v(*base), v(*index), elem_size, v(*src)
                ).unwrap();
            }
            Instr::LoadIndirect { dst, ptr, ty } => {
                writeln!(out, "      (local.set {} ({} (local.get {})))", v(*dst), load_op(ty), v(*ptr)).unwrap();
            }
            Instr::StoreIndirect { ptr, src } => {
                let ty = ty_of(src);
                writeln!(out, "      ({} (local.get {}) (local.get {}))", store_op(&ty), v(*ptr), v(*src)).unwrap();
            }
            Instr::Label(_) => {}
            Instr::Jump(target) => {
                self.emit_goto(out, *target, segment_index, current_segment);
            }
            Instr::JumpIfTrue { cond, target } => {
                writeln!(out, "      (if (local.get {})", v(*cond)).unwrap();
                writeln!(out, "        (then").unwrap();
                self.emit_goto(out, *target, segment_index, current_segment);
                writeln!(out, "      ))").unwrap();
            }
            Instr::JumpIfFalse { cond, target } => {
                writeln!(out, "      (if (i32.eqz (local.get {}))", v(*cond)).unwrap();
                writeln!(out, "        (then").unwrap();
                self.emit_goto(out, *target, segment_index, current_segment);
                writeln!(out, "      ))").unwrap();
            }
            Instr::Call { dst, callee, args } => {
                if support::is_print_callee(callee) {
                    if let Some(arg) = args.first() {
                        writeln!(out, "      (call $__print (local.get {}))", v(*arg)).unwrap();
                    }
                } else {
                    let arg_list: Vec<String> = args.iter().copied().map(|a| format!("(local.get {})", v(a))).collect();
                    let call = format!("(call ${} {})", super::sanitize(callee), arg_list.join(" "));
                    match dst {
                        Some(d) => writeln!(out, "      (local.set {} {})", v(*d), call).unwrap(),
                        None => writeln!(out, "      {}", call).unwrap(),
                    }
                }
            }
            Instr::TailCall { entry, param_regs, args } => {
                for (p, a) in param_regs.iter().zip(args.iter()) {
                    writeln!(out, "      (local.set {} (local.get {}))", v(*p), v(*a)).unwrap();
                }
                self.emit_goto(out, *entry, segment_index, current_segment);
            }
            Instr::Return(Some(r)) => {
                writeln!(out, "      (return (local.get {}))", v(*r)).unwrap();
            }
            Instr::Return(None) => {
                writeln!(out, "      (return)").unwrap();
            }
            Instr::Halt => {
                writeln!(out, "      unreachable").unwrap();
            }
            Instr::PatchParam { .. } | Instr::LoadPatchSlot { .. } | Instr::StorePatchSlot { .. } => {
                writeln!(out, "      ;; self-modifying-code patch ignored on this backend").unwrap();
            }
            Instr::Nop => {}
        }
        Ok(())
    }

    fn emit_goto(&self, out: &mut String, target: LabelId, segment_index: &HashMap<LabelId, usize>, current_segment: usize) {
        let target_segment = segment_index.get(&target).copied().unwrap_or(current_segment + 1);
        writeln!(out, "      (local.set $pc (i32.const {}))", target_segment).unwrap();
        writeln!(out, "      (br $top)").unwrap();
    }
}

impl super::BackendCapability for WasmBackend {
    fn lower_function(&mut self, f: &MirFunction) -> Result<String> {
        WasmBackend::lower_function(self, f)
    }

    fn lower_global(&mut self, name: &str, ty: &Type) -> String {
        WasmBackend::lower_global(self, name, ty)
    }

    fn emit_string_literal(&mut self, s: &str) -> String {
        WasmBackend::emit_string_literal(self, s)
    }
}

struct Segment {
    label: Option<LabelId>,
    body: Vec<Instr>,
}

/// Splits a flat instruction stream into segments at each `Label`. The
/// first segment (index 0) has no label — it is simply where `$pc` starts.
fn split_into_segments(instructions: &[Instr]) -> Vec<Segment> {
    let mut segments = vec![Segment { label: None, body: Vec::new() }];
    for instr in instructions {
        if let Instr::Label(id) = instr {
            segments.push(Segment { label: Some(*id), body: Vec::new() });
            continue;
        }
        segments.last_mut().unwrap().body.push(instr.clone());
    }
    segments
}

fn wasm_type(ty: &Type) -> &'static str {
    let _ = ty;
    "i32"
}

fn load_op(ty: &Type) -> &'static str {
    match ty.int_width() {
        Some(IntWidth::W8) => "i32.load8_u",
        _ => "i32.load",
    }
}

fn store_op(ty: &Type) -> &'static str {
    match ty.int_width() {
        Some(IntWidth::W8) => "i32.store8",
        _ => "i32.store",
    }
}

fn wasm_binop(op: BinOp, ty: &Type) -> String {
    let signed = ty.is_signed();
    match op {
        BinOp::Add => "i32.add".into(),
        BinOp::Sub => "i32.sub".into(),
        BinOp::Mul => "i32.mul".into(),
        BinOp::Div if signed => "i32.div_s".into(),
        BinOp::Div => "i32.div_u".into(),
        BinOp::Mod if signed => "i32.rem_s".into(),
        BinOp::Mod => "i32.rem_u".into(),
        BinOp::Eq => "i32.eq".into(),
        BinOp::Ne => "i32.ne".into(),
        BinOp::Lt if signed => "i32.lt_s".into(),
        BinOp::Lt => "i32.lt_u".into(),
        BinOp::Le if signed => "i32.le_s".into(),
        BinOp::Le => "i32.le_u".into(),
        BinOp::Gt if signed => "i32.gt_s".into(),
        BinOp::Gt => "i32.gt_u".into(),
        BinOp::Ge if signed => "i32.ge_s".into(),
        BinOp::Ge => "i32.ge_u".into(),
        BinOp::And => "i32.and".into(),
        BinOp::Or => "i32.or".into(),
        BinOp::Xor => "i32.xor".into(),
        BinOp::Shl => "i32.shl".into(),
        BinOp::Shr if signed => "i32.shr_s".into(),
        BinOp::Shr => "i32.shr_u".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::BinOp;

    #[test]
    fn straight_line_function_has_single_segment_dispatch() {
        let mut f = MirFunction::new("add_one", Type::u8());
        let p = f.fresh_reg();
        f.params.push((p, Type::u8()));
        let one = f.fresh_reg();
        let sum = f.fresh_reg();
        f.push(Instr::ConstInt { dst: one, value: 1, ty: Type::u8() });
        f.push(Instr::Bin { dst: sum, op: BinOp::Add, lhs: p, rhs: one, ty: Type::u8() });
        f.push(Instr::Return(Some(sum)));

        let mut backend = WasmBackend::new();
        let wat = backend.lower_function(&f).unwrap();
        assert!(wat.contains("br_table $b0"));
        assert!(wat.contains("i32.add"));
    }

    #[test]
    fn jump_rewrites_to_pc_assignment_and_loop_branch() {
        let mut f = MirFunction::new("loopy", Type::Void);
        let top = f.fresh_label();
        f.entry = top;
        f.push(Instr::Label(top));
        f.push(Instr::Jump(top));

        let mut backend = WasmBackend::new();
        let wat = backend.lower_function(&f).unwrap();
        assert!(wat.contains("local.set $pc"));
        assert!(wat.contains("br $top"));
    }
}
