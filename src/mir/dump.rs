//! Deterministic textual rendering of MIR, used when a driver requests the
//! intermediate representation to be written alongside the output.

use super::function::MirModule;
use super::instruction::Instr;
use std::fmt::Write as _;

pub fn dump_module(module: &MirModule) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "module {}", module.name);
    for (i, s) in module.string_table.iter().enumerate() {
        let _ = writeln!(out, "  .str {} = {:?}", i, s);
    }
    for name in &module.function_order {
        let f = &module.functions[name];
        let _ = writeln!(
            out,
            "fn {}({}) -> {} {{",
            f.name,
            f.params
                .iter()
                .map(|(r, t)| format!("{}: {}", r, t))
                .collect::<Vec<_>>()
                .join(", "),
            f.ret
        );
        for instr in &f.instructions {
            let _ = writeln!(out, "  {}", dump_instr(instr));
        }
        let _ = writeln!(out, "}}");
    }
    out
}

fn dump_instr(instr: &Instr) -> String {
    match instr {
        Instr::ConstInt { dst, value, ty } => format!("{} = const.{} {}", dst, ty, value),
        Instr::ConstBool { dst, value } => format!("{} = const.bool {}", dst, value),
        Instr::ConstString { dst, value } => format!("{} = const.str {:?}", dst, value),
        Instr::LoadGlobalAddr { dst, name } => format!("{} = load.globaladdr {}", dst, name),
        Instr::Move { dst, src } => format!("{} = move {}", dst, src),
        Instr::Bin { dst, op, lhs, rhs, .. } => format!("{} = {:?} {}, {}", dst, op, lhs, rhs),
        Instr::Un { dst, op, operand, .. } => format!("{} = {:?} {}", dst, op, operand),
        Instr::LoadVar { dst, var } => format!("{} = load.var {}", dst, var),
        Instr::StoreVar { var, src } => format!("store.var {}, {}", var, src),
        Instr::LoadParam { dst, index } => format!("{} = load.param {}", dst, index),
        Instr::LoadField { dst, base, offset, .. } => {
            format!("{} = load.field {}[{}]", dst, base, offset)
        }
        Instr::StoreField { base, offset, src } => {
            format!("store.field {}[{}], {}", base, offset, src)
        }
        Instr::LoadElem { dst, base, index, .. } => {
            format!("{} = load.elem {}[{}]", dst, base, index)
        }
        Instr::StoreElem { base, index, src, .. } => {
            format!("store.elem {}[{}], {}", base, index, src)
        }
        Instr::LoadIndirect { dst, ptr, .. } => format!("{} = load.ind *{}", dst, ptr),
        Instr::StoreIndirect { ptr, src } => format!("store.ind *{}, {}", ptr, src),
        Instr::Label(id) => format!("{}:", id),
        Instr::Jump(id) => format!("jump {}", id),
        Instr::JumpIfTrue { cond, target } => format!("jump.if {} -> {}", cond, target),
        Instr::JumpIfFalse { cond, target } => format!("jump.ifnot {} -> {}", cond, target),
        Instr::Call { dst, callee, args } => {
            let args = args.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ");
            match dst {
                Some(d) => format!("{} = call {}({})", d, callee, args),
                None => format!("call {}({})", callee, args),
            }
        }
        Instr::TailCall { entry, param_regs, args } => {
            format!(
                "tailcall {} ({} <- {})",
                entry,
                param_regs.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", "),
                args.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ")
            )
        }
        Instr::Return(Some(r)) => format!("return {}", r),
        Instr::Return(None) => "return".to_string(),
        Instr::Halt => "halt".to_string(),
        Instr::PatchParam { callee, slot, src } => format!("patch {}#{}, {}", callee, slot, src),
        Instr::LoadPatchSlot { dst, slot } => format!("{} = load.patch {}", dst, slot),
        Instr::StorePatchSlot { slot, src } => format!("store.patch {}, {}", slot, src),
        Instr::Nop => "nop".to_string(),
    }
}
