//! Decides, per function, whether it uses the self-modifying-code calling
//! convention or the conventional stack convention. A function is SMC
//! eligible when it takes at most the supported patch-slot count, is not
//! `extern`, and every call site passes a fixed argument count (always
//! true here, since MinZ has no varargs).

use crate::mir::{CallConvention, MirModule};

/// Self-modifying parameter slots the Z80 backend's patch mechanism
/// supports; a function requesting more falls back to the stack
/// convention rather than failing to compile.
pub const MAX_SMC_PARAMS: usize = 4;

pub fn run(module: &mut MirModule) -> usize {
    let mut using_smc = 0;
    for name in module.function_order.clone() {
        let f = module.functions.get_mut(&name).unwrap();
        if f.instructions.is_empty() {
            f.convention = Some(CallConvention::Stack);
            continue;
        }
        let convention = if f.params.len() <= MAX_SMC_PARAMS {
            using_smc += 1;
            CallConvention::SelfModifying
        } else {
            CallConvention::Stack
        };
        f.convention = Some(convention);
    }
    using_smc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{Instr, MirFunction};
    use crate::types::Type;

    #[test]
    fn small_functions_use_smc() {
        let mut module = MirModule::new("m");
        let mut f = MirFunction::new("f", Type::u8());
        f.push(Instr::Return(None));
        module.add_function(f);

        let count = run(&mut module);
        assert_eq!(count, 1);
        assert_eq!(module.functions["f"].convention, Some(CallConvention::SelfModifying));
    }

    #[test]
    fn functions_with_too_many_params_use_stack() {
        let mut module = MirModule::new("m");
        let mut f = MirFunction::new("wide", Type::u8());
        f.params = (0..5).map(|_| (f.fresh_reg(), Type::u8())).collect();
        f.push(Instr::Return(None));
        module.add_function(f);

        run(&mut module);
        assert_eq!(module.functions["wide"].convention, Some(CallConvention::Stack));
    }
}
