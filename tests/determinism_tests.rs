//! Property-based checks of the two determinism laws in the testable
//! properties this pipeline must satisfy: the optimizer converges to a
//! fixed point, and the Z80 backend is a pure function of its MIR input.

use minzc::backend::z80::target::Target;
use minzc::backend::z80::Z80Backend;
use minzc::mir::{dump_module, BinOp, Instr, MirFunction, MirModule};
use minzc::optimizer::{self, OptimizerOptions};
use minzc::regalloc::{self, RegisterClass};
use minzc::types::Type;
use proptest::prelude::*;

fn arithmetic_chain(ops: &[(i64, BinOp)]) -> MirFunction {
    let mut f = MirFunction::new("chain", Type::u8());
    let mut acc = f.fresh_reg();
    f.push(Instr::ConstInt { dst: acc, value: 1, ty: Type::u8() });
    for (value, op) in ops {
        let lit = f.fresh_reg();
        f.push(Instr::ConstInt { dst: lit, value: *value, ty: Type::u8() });
        let next = f.fresh_reg();
        f.push(Instr::Bin { dst: next, op: *op, lhs: acc, rhs: lit, ty: Type::u8() });
        acc = next;
    }
    f.push(Instr::Return(Some(acc)));
    f
}

fn bin_op() -> impl Strategy<Value = BinOp> {
    prop_oneof![Just(BinOp::Add), Just(BinOp::Sub), Just(BinOp::And), Just(BinOp::Or)]
}

proptest! {
    #[test]
    fn optimizer_converges_to_a_fixed_point(ops in prop::collection::vec((0i64..200, bin_op()), 0..20)) {
        let mut module = MirModule::new("m");
        module.add_function(arithmetic_chain(&ops));

        optimizer::run(&mut module, OptimizerOptions::default());
        let once = dump_module(&module);
        optimizer::run(&mut module, OptimizerOptions::default());
        let twice = dump_module(&module);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn z80_codegen_is_a_pure_function_of_its_mir(ops in prop::collection::vec((0i64..200, bin_op()), 0..20)) {
        let mut module = MirModule::new("m");
        let mut f = arithmetic_chain(&ops);
        f.convention = Some(minzc::mir::CallConvention::Stack);
        module.add_function(f);
        optimizer::run(&mut module, OptimizerOptions::default());

        let mut allocations = std::collections::HashMap::new();
        for name in &module.function_order {
            allocations.insert(name.clone(), regalloc::allocate(&module.functions[name], RegisterClass::z80()));
        }

        let first = Z80Backend::new(Target::ZxSpectrum).generate(&module, &allocations).unwrap();
        let second = Z80Backend::new(Target::ZxSpectrum).generate(&module, &allocations).unwrap();
        prop_assert_eq!(first, second);
    }
}
