//! Benchmarks over the three phases that dominate compile time on a
//! realistically sized function: the optimizer pipeline, register
//! allocation, and Z80 codegen lowering.

use criterion::{criterion_group, criterion_main, Criterion};
use minzc::mir::{BinOp, Instr, MirFunction, MirModule};
use minzc::optimizer::{self, OptimizerOptions};
use minzc::regalloc::{self, RegisterClass};
use minzc::types::Type;

/// A function with a long chain of redundant arithmetic: every pass in
/// the pipeline (constant folding, copy propagation, DCE) has real work
/// to do on it, and enough live registers to stress the allocator.
fn redundant_chain(len: usize) -> MirFunction {
    let mut f = MirFunction::new("chain", Type::u8());
    let mut prev = f.fresh_reg();
    f.push(Instr::ConstInt { dst: prev, value: 1, ty: Type::u8() });
    for i in 0..len {
        let lit = f.fresh_reg();
        f.push(Instr::ConstInt { dst: lit, value: (i % 7) as i64, ty: Type::u8() });
        let sum = f.fresh_reg();
        f.push(Instr::Bin { dst: sum, op: BinOp::Add, lhs: prev, rhs: lit, ty: Type::u8() });
        let copy = f.fresh_reg();
        f.push(Instr::Move { dst: copy, src: sum });
        prev = copy;
    }
    f.push(Instr::Return(Some(prev)));
    f
}

fn bench_optimizer_pipeline(c: &mut Criterion) {
    c.bench_function("optimizer_pipeline_200_instr_chain", |b| {
        b.iter_batched(
            || redundant_chain(200),
            |f| {
                let mut module = MirModule::new("bench");
                module.add_function(f);
                optimizer::run(&mut module, OptimizerOptions::default())
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_register_allocation(c: &mut Criterion) {
    c.bench_function("regalloc_200_instr_chain", |b| {
        b.iter_batched(
            || redundant_chain(200),
            |f| regalloc::allocate(&f, RegisterClass::z80()),
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_z80_codegen(c: &mut Criterion) {
    use minzc::backend::z80::target::Target;
    use minzc::backend::z80::Z80Backend;

    c.bench_function("z80_codegen_200_instr_chain", |b| {
        b.iter_batched(
            || {
                let mut f = redundant_chain(200);
                f.convention = Some(minzc::mir::CallConvention::Stack);
                let alloc = regalloc::allocate(&f, RegisterClass::z80());
                let mut module = MirModule::new("bench");
                let name = f.name.clone();
                module.add_function(f);
                let mut allocations = std::collections::HashMap::new();
                allocations.insert(name, alloc);
                (module, allocations)
            },
            |(module, allocations)| Z80Backend::new(Target::ZxSpectrum).generate(&module, &allocations),
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_optimizer_pipeline, bench_register_allocation, bench_z80_codegen);
criterion_main!(benches);
