//! Post-optimizer MIR verifier: mechanically checks the invariants every
//! later pass relies on before handing a module to the register allocator
//! and backends. A violation here means a compiler bug, not a user error,
//! so every failure surfaces as `Error::InternalInvariant`.

use crate::error::{Error, Result};
use crate::mir::{CallConvention, Instr, LabelId, MirFunction, MirModule, Reg};
use std::collections::{HashMap, HashSet};

/// Callees resolved directly by a backend rather than by a MIR function
/// definition: the overloaded `print` intrinsic and the CTIE `@emit`
/// intrinsic. A call naming one of these is valid even though no
/// `MirFunction` with that name exists in the module.
fn is_builtin_callee(callee: &str) -> bool {
    callee == "print" || callee.starts_with("print$") || callee == crate::ctie::interpreter::EMIT_INTRINSIC
}

/// Checks every invariant that is local to a single function: each
/// register defined at most once, and every jump target resolving to a
/// label within the same function.
pub fn verify_function(f: &MirFunction) -> Result<()> {
    verify_single_assignment(f)?;
    verify_jump_targets(f)?;
    Ok(())
}

fn verify_single_assignment(f: &MirFunction) -> Result<()> {
    let mut defined: HashSet<Reg> = HashSet::new();
    for instr in &f.instructions {
        if let Some(dst) = instr.result() {
            if !defined.insert(dst) {
                return Err(Error::internal(format!(
                    "`{}` defines {} more than once before register allocation",
                    f.name, dst
                )));
            }
        }
    }
    Ok(())
}

fn verify_jump_targets(f: &MirFunction) -> Result<()> {
    let labels: HashSet<LabelId> = f
        .instructions
        .iter()
        .filter_map(|i| match i {
            Instr::Label(id) => Some(*id),
            _ => None,
        })
        .collect();

    let check = |target: LabelId| -> Result<()> {
        if labels.contains(&target) {
            Ok(())
        } else {
            Err(Error::internal(format!("`{}` jumps to undefined label {}", f.name, target)))
        }
    };

    for instr in &f.instructions {
        match instr {
            Instr::Jump(target) => check(*target)?,
            Instr::JumpIfTrue { target, .. } | Instr::JumpIfFalse { target, .. } => check(*target)?,
            Instr::TailCall { entry, .. } => {
                if *entry != f.entry {
                    return Err(Error::internal(format!(
                        "`{}` tail-calls into entry {} but its own entry is {}",
                        f.name, entry, f.entry
                    )));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Checks every invariant that spans the whole module: call-graph
/// reachability and SMC patch-slot accounting.
pub fn verify_module(module: &MirModule) -> Result<()> {
    for name in &module.function_order {
        verify_function(&module.functions[name])?;
    }
    verify_call_graph(module)?;
    verify_smc_patch_slots(module)?;
    Ok(())
}

fn verify_call_graph(module: &MirModule) -> Result<()> {
    for name in &module.function_order {
        let f = &module.functions[name];
        for instr in &f.instructions {
            let callee = match instr {
                Instr::Call { callee, .. } => Some(callee),
                Instr::TailCall { .. } => None,
                _ => None,
            };
            if let Some(callee) = callee {
                if !module.functions.contains_key(callee) && !is_builtin_callee(callee) {
                    return Err(Error::internal(format!(
                        "`{}` calls `{}`, which names neither a defined function nor a builtin",
                        name, callee
                    )));
                }
            }
        }
    }
    Ok(())
}

fn verify_smc_patch_slots(module: &MirModule) -> Result<()> {
    let conventions: HashMap<&str, CallConvention> =
        module.functions.iter().filter_map(|(n, f)| f.convention.map(|c| (n.as_str(), c))).collect();

    for name in &module.function_order {
        let f = &module.functions[name];
        if conventions.get(name.as_str()) != Some(&CallConvention::SelfModifying) {
            continue;
        }
        let slot_count = f.params.len();
        if slot_count > crate::backend::z80::MAX_SMC_PARAMS {
            return Err(Error::internal(format!(
                "`{}` is marked self-modifying with {} patch slots, exceeding the {}-slot limit",
                name,
                slot_count,
                crate::backend::z80::MAX_SMC_PARAMS
            )));
        }
        for instr in &f.instructions {
            let slot = match instr {
                Instr::LoadPatchSlot { slot, .. } | Instr::StorePatchSlot { slot, .. } => Some(*slot),
                Instr::PatchParam { callee, slot, .. } if callee == name => Some(*slot),
                _ => None,
            };
            if let Some(slot) = slot {
                if slot >= slot_count {
                    return Err(Error::internal(format!(
                        "`{}` references patch slot {} but only has {} parameter(s)",
                        name, slot, slot_count
                    )));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{BinOp, MirFunction, MirModule};
    use crate::types::Type;

    #[test]
    fn accepts_well_formed_function() {
        let mut f = MirFunction::new("f", Type::u8());
        let a = f.fresh_reg();
        f.push(Instr::ConstInt { dst: a, value: 1, ty: Type::u8() });
        f.push(Instr::Return(Some(a)));
        assert!(verify_function(&f).is_ok());
    }

    #[test]
    fn rejects_double_definition() {
        let mut f = MirFunction::new("f", Type::u8());
        let a = f.fresh_reg();
        f.push(Instr::ConstInt { dst: a, value: 1, ty: Type::u8() });
        f.push(Instr::ConstInt { dst: a, value: 2, ty: Type::u8() });
        f.push(Instr::Return(Some(a)));
        assert!(matches!(verify_function(&f), Err(Error::InternalInvariant(_))));
    }

    #[test]
    fn rejects_jump_to_missing_label() {
        let mut f = MirFunction::new("f", Type::Void);
        let bogus = LabelId(999);
        f.push(Instr::Jump(bogus));
        f.push(Instr::Return(None));
        assert!(verify_function(&f).is_err());
    }

    #[test]
    fn rejects_call_to_undefined_function() {
        let mut module = MirModule::new("m");
        let mut f = MirFunction::new("main", Type::Void);
        f.push(Instr::Call { dst: None, callee: "ghost".into(), args: vec![] });
        f.push(Instr::Return(None));
        module.add_function(f);
        assert!(verify_module(&module).is_err());
    }

    #[test]
    fn accepts_call_to_print_intrinsic() {
        let mut module = MirModule::new("m");
        let mut f = MirFunction::new("main", Type::Void);
        let s = f.fresh_reg();
        f.push(Instr::ConstString { dst: s, value: "Hi".into() });
        f.push(Instr::Call { dst: None, callee: "print$u16".into(), args: vec![s] });
        f.push(Instr::Return(None));
        module.add_function(f);
        assert!(verify_module(&module).is_ok());
    }

    #[test]
    fn rejects_smc_function_over_patch_slot_limit() {
        let mut module = MirModule::new("m");
        let mut f = MirFunction::new("wide", Type::u8());
        f.params = (0..6).map(|_| (f.fresh_reg(), Type::u8())).collect();
        f.convention = Some(CallConvention::SelfModifying);
        f.push(Instr::Return(None));
        module.add_function(f);
        assert!(verify_module(&module).is_err());
    }

    #[test]
    fn rejects_patch_slot_index_out_of_range() {
        let mut module = MirModule::new("m");
        let mut f = MirFunction::new("f", Type::u8());
        let p = f.fresh_reg();
        f.params = vec![(p, Type::u8())];
        f.convention = Some(CallConvention::SelfModifying);
        let saved = f.fresh_reg();
        f.push(Instr::LoadPatchSlot { dst: saved, slot: 3 });
        f.push(Instr::Return(None));
        module.add_function(f);
        assert!(verify_module(&module).is_err());
    }

    #[test]
    fn optimizer_run_twice_is_idempotent() {
        let mut module = MirModule::new("m");
        let mut f = MirFunction::new("f", Type::u8());
        let a = f.fresh_reg();
        let b = f.fresh_reg();
        let c = f.fresh_reg();
        f.push(Instr::ConstInt { dst: a, value: 2, ty: Type::u8() });
        f.push(Instr::ConstInt { dst: b, value: 3, ty: Type::u8() });
        f.push(Instr::Bin { dst: c, op: BinOp::Add, lhs: a, rhs: b, ty: Type::u8() });
        f.push(Instr::Return(Some(c)));
        module.add_function(f);

        crate::optimizer::run(&mut module, crate::optimizer::OptimizerOptions::default());
        let once = crate::mir::dump_module(&module);
        crate::optimizer::run(&mut module, crate::optimizer::OptimizerOptions::default());
        let twice = crate::mir::dump_module(&module);
        assert_eq!(once, twice);
        assert!(verify_module(&module).is_ok());
    }
}
