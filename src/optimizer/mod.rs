//! The fixed optimization pipeline: constant folding, copy propagation,
//! dead-code elimination, tail-call conversion, inlining, and the
//! SMC-decision pass, run in that order over every function.

mod constant_fold;
mod copy_prop;
mod dce;
mod inline;
mod peephole;
mod smc_decision;
mod tail_call;

use crate::mir::MirModule;

#[derive(Debug, Clone, Copy)]
pub struct OptimizerOptions {
    pub enable_inlining: bool,
    pub enable_smc: bool,
    /// Maximum instruction count a callee may have and still be inlined.
    pub inline_threshold: usize,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self { enable_inlining: true, enable_smc: true, inline_threshold: 24 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OptimizerStats {
    pub constants_folded: usize,
    pub copies_propagated: usize,
    pub instructions_removed: usize,
    pub tail_calls_converted: usize,
    pub functions_inlined: usize,
    pub functions_using_smc: usize,
}

/// Runs every pass of the pipeline, in the fixed order the design commits
/// to: passes that shrink or simplify the instruction stream run before
/// the passes (tail-call conversion, SMC decision) that need to see the
/// final call shape of a function.
pub fn run(module: &mut MirModule, opts: OptimizerOptions) -> OptimizerStats {
    let mut stats = OptimizerStats::default();

    for name in module.function_order.clone() {
        let f = module.functions.get_mut(&name).unwrap();
        stats.constants_folded += constant_fold::run(f);
        stats.copies_propagated += copy_prop::run(f);
        stats.instructions_removed += dce::run(f);
    }

    if opts.enable_inlining {
        stats.functions_inlined = inline::run(module, opts.inline_threshold);
        for name in module.function_order.clone() {
            let f = module.functions.get_mut(&name).unwrap();
            stats.instructions_removed += dce::run(f);
        }
    }

    for name in module.function_order.clone() {
        let f = module.functions.get_mut(&name).unwrap();
        stats.tail_calls_converted += tail_call::run(f);
        peephole::run(f);
    }

    if opts.enable_smc {
        stats.functions_using_smc = smc_decision::run(module);
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{BinOp, Instr, MirFunction};
    use crate::types::Type;

    #[test]
    fn pipeline_folds_and_removes_dead_constants() {
        let mut module = MirModule::new("m");
        let mut f = MirFunction::new("f", Type::u8());
        let a = f.fresh_reg();
        let b = f.fresh_reg();
        let c = f.fresh_reg();
        let dead = f.fresh_reg();
        f.push(Instr::ConstInt { dst: a, value: 2, ty: Type::u8() });
        f.push(Instr::ConstInt { dst: b, value: 3, ty: Type::u8() });
        f.push(Instr::Bin { dst: c, op: BinOp::Add, lhs: a, rhs: b, ty: Type::u8() });
        f.push(Instr::ConstInt { dst: dead, value: 99, ty: Type::u8() });
        f.push(Instr::Return(Some(c)));
        module.add_function(f);

        let stats = run(&mut module, OptimizerOptions::default());
        assert!(stats.constants_folded >= 1);
        assert!(stats.instructions_removed >= 1);
    }
}
