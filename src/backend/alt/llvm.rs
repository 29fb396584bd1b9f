//! LLVM textual IR backend. MIR basic blocks map directly onto LLVM basic
//! blocks (LLVM has native arbitrary-CFG `br`, unlike WebAssembly), and
//! every virtual register gets a stack slot via `alloca` with a `load`
//! before each use and a `store` after each definition — the same
//! non-SSA shape a `-O0` Clang frontend emits, left for `mem2reg` to
//! clean up downstream.

use super::support::{self, StringPool};
use crate::error::Result;
use crate::mir::{BinOp, Instr, MirFunction, MirModule, Reg, UnOp};
use crate::types::{IntWidth, Type};
use std::collections::HashMap;
use std::fmt::Write as _;

#[derive(Debug, Default)]
pub struct LlvmBackend {
    strings: StringPool,
    next_tmp: u32,
    globals: HashMap<String, Type>,
}

impl LlvmBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn tmp(&mut self) -> String {
        let n = self.next_tmp;
        self.next_tmp += 1;
        format!("%t{}", n)
    }

    pub fn generate(&mut self, module: &MirModule) -> Result<String> {
        let mut out = String::new();
        writeln!(out, "declare void @__print(i8*)\n").unwrap();
        self.globals = module.globals.clone();
        for (name, ty) in &module.globals {
            writeln!(out, "{}", self.lower_global(name, ty)).unwrap();
        }
        for name in &module.function_order {
            let f = &module.functions[name];
            out.push_str(&self.lower_function(f)?);
            out.push('\n');
        }
        let mut prelude = String::new();
        for (idx, s) in self.strings.strings.iter().enumerate() {
            let bytes = StringPool::bytes(idx, s);
            writeln!(
                prelude,
                "@str.{} = private constant [{} x i8] [{}]",
                idx,
                bytes.len(),
                bytes.iter().map(|b| format!("i8 {}", b)).collect::<Vec<_>>().join(", ")
            ).unwrap();
        }
        Ok(format!("{}{}", prelude, out))
    }

    pub fn lower_global(&mut self, name: &str, ty: &Type) -> String {
        format!("@{} = global {} zeroinitializer", super::sanitize(name), llvm_type(ty))
    }

    pub fn emit_string_literal(&mut self, s: &str) -> String {
        let idx = self.strings.intern(s);
        format!("@str.{}", idx)
    }

    pub fn lower_function(&mut self, f: &MirFunction) -> Result<String> {
        let types = support::infer_register_types(f, Type::i16());
        let name = super::sanitize(&f.name);
        let mut out = String::new();

        let params: Vec<String> = f
            .params
            .iter()
            .enumerate()
            .map(|(i, (_, ty))| format!("{} %p{}", llvm_type(ty), i))
            .collect();
        writeln!(out, "define {} @{}({}) {{", llvm_type(&f.ret), name, params.join(", ")).unwrap();
        writeln!(out, "entry:").unwrap();

        let mut regs: Vec<Reg> = types.keys().copied().collect();
        regs.sort();
        for r in &regs {
            writeln!(out, "  %{} = alloca {}", support::register_name(*r), llvm_type(&types[r])).unwrap();
        }
        for (i, (r, ty)) in f.params.iter().enumerate() {
            writeln!(out, "  store {} %p{}, {}* %{}", llvm_type(ty), i, llvm_type(ty), support::register_name(*r)).unwrap();
        }

        for instr in &f.instructions {
            self.lower_instr(&mut out, instr, &types)?;
        }
        writeln!(out, "}}").unwrap();
        Ok(out)
    }

    fn load(&mut self, out: &mut String, r: Reg, ty: &Type) -> String {
        let t = self.tmp();
        writeln!(out, "  {} = load {}, {}* %{}", t, llvm_type(ty), llvm_type(ty), support::register_name(r)).unwrap();
        t
    }

    fn store(&mut self, out: &mut String, r: Reg, ty: &Type, value: &str) {
        writeln!(out, "  store {} {}, {}* %{}", llvm_type(ty), value, llvm_type(ty), support::register_name(r)).unwrap();
    }

    fn lower_instr(&mut self, out: &mut String, instr: &Instr, types: &HashMap<Reg, Type>) -> Result<()> {
        let ty_of = |r: &Reg| types.get(r).cloned().unwrap_or(Type::i16());
        match instr {
            Instr::ConstInt { dst, value, ty } => {
                self.store(out, *dst, ty, &value.to_string());
            }
            Instr::ConstBool { dst, value } => {
                self.store(out, *dst, &Type::Bool, if *value { "1" } else { "0" });
            }
            Instr::ConstString { dst, value } => {
                let label = self.emit_string_literal(value);
                let t = self.tmp();
                writeln!(out, "  {} = bitcast [{} x i8]* {} to i8*", t, value.len() + 1, label).unwrap();
                self.store(out, *dst, &Type::Pointer(Box::new(Type::u8())), &t);
            }
            Instr::LoadGlobalAddr { dst, name } => {
                let global_ty = self.globals.get(name).cloned().unwrap_or(Type::u8());
                let t = self.tmp();
                writeln!(out, "  {} = bitcast {}* @{} to i8*", t, llvm_type(&global_ty), super::sanitize(name)).unwrap();
                self.store(out, *dst, &Type::Pointer(Box::new(Type::u8())), &t);
            }
            Instr::Move { dst, src } => {
                let ty = ty_of(src);
                let v = self.load(out, *src, &ty);
                self.store(out, *dst, &ty_of(dst), &v);
            }
            Instr::Bin { dst, op, lhs, rhs, ty } => {
                let l = self.load(out, *lhs, ty);
                let r = self.load(out, *rhs, ty);
                let t = self.tmp();
                writeln!(out, "  {} = {} {} {}, {}", t, llvm_binop(*op, ty), llvm_type(ty), l, r).unwrap();
                let result_ty = if op.is_comparison() { Type::Bool } else { ty.clone() };
                self.store(out, *dst, &result_ty, &t);
            }
            Instr::Un { dst, op, operand, ty } => {
                let v = self.load(out, *operand, ty);
                let t = self.tmp();
                match op {
                    UnOp::Neg => writeln!(out, "  {} = sub {} 0, {}", t, llvm_type(ty), v).unwrap(),
                    UnOp::Not => writeln!(out, "  {} = xor {} {}, 1", t, llvm_type(ty), v).unwrap(),
                    UnOp::BitNot => writeln!(out, "  {} = xor {} {}, -1", t, llvm_type(ty), v).unwrap(),
                }
                self.store(out, *dst, ty, &t);
            }
            Instr::LoadVar { dst, var } => {
                let ty = ty_of(var);
                let v = self.load(out, *var, &ty);
                self.store(out, *dst, &ty_of(dst), &v);
            }
            Instr::StoreVar { var, src } => {
                let ty = ty_of(src);
                let v = self.load(out, *src, &ty);
                self.store(out, *var, &ty_of(var), &v);
            }
            Instr::LoadParam { dst, .. } => {
                // Parameters are already stored into their home slots in
                // the function prologue; nothing to do here.
                let _ = dst;
            }
            Instr::LoadField { dst, base, offset, ty } => {
                let base_v = self.load(out, *base, &Type::Pointer(Box::new(Type::u8())));
                let gep = self.tmp();
                writeln!(out, "  {} = getelementptr i8, i8* {}, i64 {}", gep, base_v, offset).unwrap();
                let cast = self.tmp();
                writeln!(out, "  {} = bitcast i8* {} to {}*", cast, gep, llvm_type(ty)).unwrap();
                let t = self.tmp();
                writeln!(out, "  {} = load {}, {}* {}", t, llvm_type(ty), llvm_type(ty), cast).unwrap();
                self.store(out, *dst, ty, &t);
            }
            Instr::StoreField { base, offset, src } => {
                let ty = ty_of(src);
                let base_v = self.load(out, *base, &Type::Pointer(Box::new(Type::u8())));
                let gep = self.tmp();
                writeln!(out, "  {} = getelementptr i8, i8* {}, i64 {}", gep, base_v, offset).unwrap();
                let cast = self.tmp();
                writeln!(out, "  {} = bitcast i8* {} to {}*", cast, gep, llvm_type(&ty)).unwrap();
                let v = self.load(out, *src, &ty);
                writeln!(out, "  store {} {}, {}* {}", llvm_type(&ty), v, llvm_type(&ty), cast).unwrap();
            }
            Instr::LoadElem { dst, base, index, elem_size, ty } => {
                let base_v = self.load(out, *base, &Type::Pointer(Box::new(Type::u8())));
                let idx_v = self.load(out, *index, &Type::u16());
                let scaled = self.tmp();
                writeln!(out, "  {} = mul i16 {}, {}", scaled, idx_v, elem_size).unwrap();
                let gep = self.tmp();
                writeln!(out, "  {} = getelementptr i8, i8* {}, i16 {}", gep, base_v, scaled).unwrap();
                let cast = self.tmp();
                writeln!(out, "  {} = bitcast i8* {} to {}*", cast, gep, llvm_type(ty)).unwrap();
                let t = self.tmp();
                writeln!(out, "  {} = load {}, {}* {}", t, llvm_type(ty), llvm_type(ty), cast).unwrap();
                self.store(out, *dst, ty, &t);
            }
            Instr::StoreElem { base, index, elem_size, src } => {
                let ty = ty_of(src);
                let base_v = self.load(out, *base, &Type::Pointer(Box::new(Type::u8())));
                let idx_v = self.load(out, *index, &Type::u16());
                let scaled = self.tmp();
                writeln!(out, "  {} = mul i16 {}, {}", scaled, idx_v, elem_size).unwrap();
                let gep = self.tmp();
                writeln!(out, "  {} = getelementptr i8, i8* {}, i16 {}", gep, base_v, scaled).unwrap();
                let cast = self.tmp();
                writeln!(out, "  {} = bitcast i8* {} to {}*", cast, gep, llvm_type(&ty)).unwrap();
                let v = self.load(out, *src, &ty);
                writeln!(out, "  store {} {}, {}* {}", llvm_type(&ty), v, llvm_type(&ty), cast).unwrap();
            }
            Instr::LoadIndirect { dst, ptr, ty } => {
                let ptr_v = self.load(out, *ptr, &Type::Pointer(Box::new(ty.clone())));
                let cast = self.tmp();
                writeln!(out, "  {} = bitcast i8* {} to {}*", cast, ptr_v, llvm_type(ty)).unwrap();
                let t = self.tmp();
                writeln!(out, "  {} = load {}, {}* {}", t, llvm_type(ty), llvm_type(ty), cast).unwrap();
                self.store(out, *dst, ty, &t);
            }
            Instr::StoreIndirect { ptr, src } => {
                let ty = ty_of(src);
                let ptr_v = self.load(out, *ptr, &Type::Pointer(Box::new(ty.clone())));
                let cast = self.tmp();
                writeln!(out, "  {} = bitcast i8* {} to {}*", cast, ptr_v, llvm_type(&ty)).unwrap();
                let v = self.load(out, *src, &ty);
                writeln!(out, "  store {} {}, {}* {}", llvm_type(&ty), v, llvm_type(&ty), cast).unwrap();
            }
            Instr::Label(id) => {
                writeln!(out, "{}:", support::label_name(*id)).unwrap();
            }
            Instr::Jump(id) => {
                writeln!(out, "  br label %{}", support::label_name(*id)).unwrap();
            }
            Instr::JumpIfTrue { cond, target } => {
                let v = self.load(out, *cond, &Type::Bool);
                let t = self.tmp();
                writeln!(out, "  {} = icmp ne i8 {}, 0", t, v).unwrap();
                writeln!(out, "  br i1 {}, label %{}, label %{}.fallthrough", t, support::label_name(*target), support::label_name(*target)).unwrap();
                writeln!(out, "{}.fallthrough:", support::label_name(*target)).unwrap();
            }
            Instr::JumpIfFalse { cond, target } => {
                let v = self.load(out, *cond, &Type::Bool);
                let t = self.tmp();
                writeln!(out, "  {} = icmp eq i8 {}, 0", t, v).unwrap();
                writeln!(out, "  br i1 {}, label %{}, label %{}.fallthrough", t, support::label_name(*target), support::label_name(*target)).unwrap();
                writeln!(out, "{}.fallthrough:", support::label_name(*target)).unwrap();
            }
            Instr::Call { dst, callee, args } => {
                if support::is_print_callee(callee) {
                    if let Some(arg) = args.first() {
                        let v = self.load(out, *arg, &Type::Pointer(Box::new(Type::u8())));
                        writeln!(out, "  call void @__print(i8* {})", v).unwrap();
                    }
                } else {
                    let mut arg_strs = Vec::new();
                    for a in args {
                        let ty = ty_of(a);
                        let v = self.load(out, *a, &ty);
                        arg_strs.push(format!("{} {}", llvm_type(&ty), v));
                    }
                    let call = format!("call i16 @{}({})", super::sanitize(callee), arg_strs.join(", "));
                    match dst {
                        Some(d) => {
                            let t = self.tmp();
                            writeln!(out, "  {} = {}", t, call).unwrap();
                            self.store(out, *d, &ty_of(d), &t);
                        }
                        None => {
                            writeln!(out, "  {}", call).unwrap();
                        }
                    }
                }
            }
            Instr::TailCall { entry, param_regs, args } => {
                for (p, a) in param_regs.iter().zip(args.iter()) {
                    let ty = ty_of(a);
                    let v = self.load(out, *a, &ty);
                    self.store(out, *p, &ty_of(p), &v);
                }
                writeln!(out, "  br label %{}", support::label_name(*entry)).unwrap();
            }
            Instr::Return(Some(r)) => {
                let ty = ty_of(r);
                let v = self.load(out, *r, &ty);
                writeln!(out, "  ret {} {}", llvm_type(&ty), v).unwrap();
            }
            Instr::Return(None) => {
                writeln!(out, "  ret void").unwrap();
            }
            Instr::Halt => {
                writeln!(out, "  unreachable").unwrap();
            }
            Instr::PatchParam { .. } | Instr::LoadPatchSlot { .. } | Instr::StorePatchSlot { .. } => {
                writeln!(out, "  ; self-modifying-code patch ignored on this backend").unwrap();
            }
            Instr::Nop => {}
        }
        Ok(())
    }
}

impl super::BackendCapability for LlvmBackend {
    fn lower_function(&mut self, f: &MirFunction) -> Result<String> {
        LlvmBackend::lower_function(self, f)
    }

    fn lower_global(&mut self, name: &str, ty: &Type) -> String {
        LlvmBackend::lower_global(self, name, ty)
    }

    fn emit_string_literal(&mut self, s: &str) -> String {
        LlvmBackend::emit_string_literal(self, s)
    }
}

fn llvm_type(ty: &Type) -> String {
    match ty {
        Type::Int { width: IntWidth::W8, .. } => "i8".to_string(),
        Type::Int { width: IntWidth::W16, .. } => "i16".to_string(),
        Type::Bool => "i8".to_string(),
        Type::Void => "void".to_string(),
        Type::Pointer(_) => "i8*".to_string(),
        Type::Array { element, length } => format!("[{} x {}]", length, llvm_type(element)),
        _ => "i16".to_string(),
    }
}

fn llvm_binop(op: BinOp, ty: &Type) -> &'static str {
    let signed = ty.is_signed();
    match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::Div if signed => "sdiv",
        BinOp::Div => "udiv",
        BinOp::Mod if signed => "srem",
        BinOp::Mod => "urem",
        BinOp::Eq => "icmp eq",
        BinOp::Ne => "icmp ne",
        BinOp::Lt if signed => "icmp slt",
        BinOp::Lt => "icmp ult",
        BinOp::Le if signed => "icmp sle",
        BinOp::Le => "icmp ule",
        BinOp::Gt if signed => "icmp sgt",
        BinOp::Gt => "icmp ugt",
        BinOp::Ge if signed => "icmp sge",
        BinOp::Ge => "icmp uge",
        BinOp::And => "and",
        BinOp::Or => "or",
        BinOp::Xor => "xor",
        BinOp::Shl => "shl",
        BinOp::Shr if signed => "ashr",
        BinOp::Shr => "lshr",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::BinOp;

    #[test]
    fn lowers_function_with_alloca_per_register() {
        let mut f = MirFunction::new("add_one", Type::u8());
        let p = f.fresh_reg();
        f.params.push((p, Type::u8()));
        let one = f.fresh_reg();
        let sum = f.fresh_reg();
        f.push(Instr::ConstInt { dst: one, value: 1, ty: Type::u8() });
        f.push(Instr::Bin { dst: sum, op: BinOp::Add, lhs: p, rhs: one, ty: Type::u8() });
        f.push(Instr::Return(Some(sum)));

        let mut backend = LlvmBackend::new();
        let ir = backend.lower_function(&f).unwrap();
        assert!(ir.contains("define i8 @add_one(i8 %p0)"));
        assert!(ir.contains("alloca i8"));
        assert!(ir.contains("ret i8"));
    }
}
