//! C backend: each MIR function becomes a C function with one local per
//! virtual register and explicit `goto`s for control flow, the same
//! unoptimized shape a `-O0` frontend emits before a real optimizer's
//! mem2reg pass would clean it up. Left to the host C compiler to
//! register-allocate and optimize.

use super::support::{self, StringPool};
use crate::error::Result;
use crate::mir::{BinOp, Instr, MirFunction, MirModule, Reg, UnOp};
use crate::types::{IntWidth, Type};
use std::collections::HashMap;
use std::fmt::Write as _;

#[derive(Debug, Default)]
pub struct CBackend {
    strings: StringPool,
}

impl CBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate(&mut self, module: &MirModule) -> Result<String> {
        let mut out = String::new();
        writeln!(out, "#include <stdint.h>").unwrap();
        writeln!(out, "#include <stddef.h>\n").unwrap();
        writeln!(out, "void __print(const uint8_t *s);\n").unwrap();

        for (name, ty) in &module.globals {
            writeln!(out, "{}", self.lower_global(name, ty)).unwrap();
        }
        if !module.globals.is_empty() {
            writeln!(out).unwrap();
        }

        for name in &module.function_order {
            let f = &module.functions[name];
            out.push_str(&self.lower_function(f)?);
            out.push('\n');
        }

        let mut prelude = String::new();
        for (idx, s) in self.strings.strings.iter().enumerate() {
            let bytes = StringPool::bytes(idx, s);
            let body: Vec<String> = bytes.iter().map(|b| b.to_string()).collect();
            writeln!(prelude, "static const uint8_t str_{}[] = {{{}}};", idx, body.join(", ")).unwrap();
        }
        Ok(format!("{}{}", prelude, out))
    }

    pub fn lower_global(&mut self, name: &str, ty: &Type) -> String {
        match ty {
            Type::Array { element, length } => format!("{} {}[{}];", c_type(element), super::sanitize(name), length),
            _ => format!("{} {};", c_type(ty), super::sanitize(name)),
        }
    }

    pub fn emit_string_literal(&mut self, s: &str) -> String {
        let idx = self.strings.intern(s);
        format!("str_{}", idx)
    }

    pub fn lower_function(&mut self, f: &MirFunction) -> Result<String> {
        let types = support::infer_register_types(f, Type::i16());
        let name = super::sanitize(&f.name);
        let mut out = String::new();

        let params: Vec<String> = f
            .params
            .iter()
            .enumerate()
            .map(|(i, (_, ty))| format!("{} p{}", c_type(ty), i))
            .collect();
        writeln!(out, "{} {}({})", c_type(&f.ret), name, params.join(", ")).unwrap();
        writeln!(out, "{{").unwrap();

        let mut locals: Vec<Reg> = types.keys().copied().collect();
        locals.sort();
        for r in &locals {
            writeln!(out, "    {} {};", c_type(&types[r]), support::register_name(*r)).unwrap();
        }

        for instr in &f.instructions {
            self.lower_instr(&mut out, instr, &types)?;
        }
        writeln!(out, "}}").unwrap();
        Ok(out)
    }

    fn lower_instr(&mut self, out: &mut String, instr: &Instr, types: &HashMap<Reg, Type>) -> Result<()> {
        let v = support::register_name;
        match instr {
            Instr::ConstInt { dst, value, .. } => {
                writeln!(out, "    {} = {};", v(*dst), value).unwrap();
            }
            Instr::ConstBool { dst, value } => {
                writeln!(out, "    {} = {};", v(*dst), if *value { 1 } else { 0 }).unwrap();
            }
            Instr::ConstString { dst, value } => {
                let label = self.emit_string_literal(value);
                writeln!(out, "    {} = (uint8_t*){};", v(*dst), label).unwrap();
            }
            Instr::LoadGlobalAddr { dst, name } => {
                writeln!(out, "    {} = &{};", v(*dst), super::sanitize(name)).unwrap();
            }
            Instr::Move { dst, src } => {
                writeln!(out, "    {} = {};", v(*dst), v(*src)).unwrap();
            }
            Instr::Bin { dst, op, lhs, rhs, .. } => {
                writeln!(out, "    {} = ({} {} {});", v(*dst), v(*lhs), bin_operator(*op), v(*rhs)).unwrap();
            }
            Instr::Un { dst, op, operand, .. } => {
                writeln!(out, "    {} = {}{};", v(*dst), un_operator(*op), v(*operand)).unwrap();
            }
            Instr::LoadVar { dst, var } => {
                writeln!(out, "    {} = {};", v(*dst), v(*var)).unwrap();
            }
            Instr::StoreVar { var, src } => {
                writeln!(out, "    {} = {};", v(*var), v(*src)).unwrap();
            }
            Instr::LoadParam { dst, index } => {
                writeln!(out, "    {} = p{};", v(*dst), index).unwrap();
            }
            Instr::LoadField { dst, base, offset, ty } => {
                writeln!(out, "    {} = *({}*)((uint8_t*){} + {});", v(*dst), c_type(ty), v(*base), offset).unwrap();
            }
            Instr::StoreField { base, offset, src } => {
                let ty = types.get(src).cloned().unwrap_or(Type::i16());
                writeln!(out, "    *({}*)((uint8_t*){} + {}) = {};", c_type(&ty), v(*base), offset, v(*src)).unwrap();
            }
            Instr::LoadElem { dst, base, index, elem_size, ty } => {
                writeln!(
                    out,
                    "    {} = *({}*)((uint8_t*){} + (size_t){} * {});",
                    v(*dst), c_type(ty), v(*base), v(*index), elem_size
                ).unwrap();
            }
            Instr::StoreElem { base, index, elem_size, src } => {
                let ty = types.get(src).cloned().unwrap_or(Type::i16());
                writeln!(
                    out,
                    "    *({}*)((uint8_t*){} + (size_t){} * {}) = {};",
                    c_type(&ty), v(*base), v(*index), elem_size, v(*src)
                ).unwrap();
            }
            Instr::LoadIndirect { dst, ptr, ty } => {
                writeln!(out, "    {} = *({}*){};", v(*dst), c_type(ty), v(*ptr)).unwrap();
            }
            Instr::StoreIndirect { ptr, src } => {
                let ty = types.get(src).cloned().unwrap_or(Type::i16());
                writeln!(out, "    *({}*){} = {};", c_type(&ty), v(*ptr), v(*src)).unwrap();
            }
            Instr::Label(id) => {
                writeln!(out, "{}: ;", support::label_name(*id)).unwrap();
            }
            Instr::Jump(id) => {
                writeln!(out, "    goto {};", support::label_name(*id)).unwrap();
            }
            Instr::JumpIfTrue { cond, target } => {
                writeln!(out, "    if ({}) goto {};", v(*cond), support::label_name(*target)).unwrap();
            }
            Instr::JumpIfFalse { cond, target } => {
                writeln!(out, "    if (!{}) goto {};", v(*cond), support::label_name(*target)).unwrap();
            }
            Instr::Call { dst, callee, args } => {
                if support::is_print_callee(callee) {
                    let arg = args.first().copied().map(v).unwrap_or_else(|| "0".into());
                    writeln!(out, "    __print((const uint8_t*){});", arg).unwrap();
                } else {
                    let arglist: Vec<String> = args.iter().copied().map(v).collect();
                    let call = format!("{}({})", super::sanitize(callee), arglist.join(", "));
                    match dst {
                        Some(d) => writeln!(out, "    {} = {};", v(*d), call).unwrap(),
                        None => writeln!(out, "    {};", call).unwrap(),
                    }
                }
            }
            Instr::TailCall { entry, param_regs, args } => {
                for (p, a) in param_regs.iter().zip(args.iter()) {
                    writeln!(out, "    {} = {};", v(*p), v(*a)).unwrap();
                }
                writeln!(out, "    goto {};", support::label_name(*entry)).unwrap();
            }
            Instr::Return(Some(r)) => {
                writeln!(out, "    return {};", v(*r)).unwrap();
            }
            Instr::Return(None) => {
                writeln!(out, "    return;").unwrap();
            }
            Instr::Halt => {
                writeln!(out, "    for (;;) {{ }}").unwrap();
            }
            Instr::PatchParam { .. } | Instr::LoadPatchSlot { .. } | Instr::StorePatchSlot { .. } => {
                writeln!(out, "    /* self-modifying-code patch ignored on this backend */").unwrap();
            }
            Instr::Nop => {
                writeln!(out, "    ;").unwrap();
            }
        }
        Ok(())
    }
}

impl super::BackendCapability for CBackend {
    fn lower_function(&mut self, f: &MirFunction) -> Result<String> {
        CBackend::lower_function(self, f)
    }

    fn lower_global(&mut self, name: &str, ty: &Type) -> String {
        CBackend::lower_global(self, name, ty)
    }

    fn emit_string_literal(&mut self, s: &str) -> String {
        CBackend::emit_string_literal(self, s)
    }
}

fn c_type(ty: &Type) -> String {
    match ty {
        Type::Int { signed: true, width: IntWidth::W8 } => "int8_t".into(),
        Type::Int { signed: false, width: IntWidth::W8 } => "uint8_t".into(),
        Type::Int { signed: true, width: IntWidth::W16 } => "int16_t".into(),
        Type::Int { signed: false, width: IntWidth::W16 } => "uint16_t".into(),
        Type::Bool => "uint8_t".into(),
        Type::Void => "void".into(),
        Type::Pointer(inner) => format!("{}*", c_type(inner)),
        _ => "int16_t".into(),
    }
}

fn bin_operator(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge => ">=",
        BinOp::And => "&",
        BinOp::Or => "|",
        BinOp::Xor => "^",
        BinOp::Shl => "<<",
        BinOp::Shr => ">>",
    }
}

fn un_operator(op: UnOp) -> &'static str {
    match op {
        UnOp::Neg => "-",
        UnOp::Not => "!",
        UnOp::BitNot => "~",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::BinOp;

    #[test]
    fn lowers_constant_return_with_goto_labels() {
        let mut f = MirFunction::new("add_one", Type::u8());
        let p = f.fresh_reg();
        f.params.push((p, Type::u8()));
        let one = f.fresh_reg();
        let sum = f.fresh_reg();
        f.push(Instr::ConstInt { dst: one, value: 1, ty: Type::u8() });
        f.push(Instr::Bin { dst: sum, op: BinOp::Add, lhs: p, rhs: one, ty: Type::u8() });
        f.push(Instr::Return(Some(sum)));

        let mut backend = CBackend::new();
        let code = backend.lower_function(&f).unwrap();
        assert!(code.contains("uint8_t add_one(uint8_t p0)"));
        assert!(code.contains("return"));
    }

    #[test]
    fn print_call_routes_through_runtime_helper() {
        let mut f = MirFunction::new("main", Type::Void);
        let s = f.fresh_reg();
        f.push(Instr::ConstString { dst: s, value: "hi".into() });
        f.push(Instr::Call { dst: None, callee: "print$String".into(), args: vec![s] });
        f.push(Instr::Return(None));

        let mut backend = CBackend::new();
        let code = backend.lower_function(&f).unwrap();
        assert!(code.contains("__print"));
        assert!(!code.contains("print$String("));
    }
}
