//! Benchmarks for offload planning.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use polyoffload::ir::{
    AccessKind, Function, Instruction, MemoryAccessFact, Module, ModuleFacts, Param, RegionFacts, StatementFacts,
};
use polyoffload::OffloadConfig;

/// Benchmark size expression evaluation.
fn bench_evaluation(c: &mut Criterion) {
    let expr = "2 + 3840*(-1 + (720)) + 3*(-1 + (1280)) + 1";

    c.bench_function("evaluate_size_expr", |b| {
        b.iter(|| polyoffload::expr::evaluate(black_box(expr)).unwrap())
    });
}

/// A parent calling `regions` stencil kernels back to back.
fn stencil_module(regions: usize) -> (Module, ModuleFacts) {
    let mut functions = Vec::new();
    let mut facts = Vec::new();
    let mut main = Function::new("main", vec![Param::integer("n")]);

    for r in 0..regions {
        let name = format!("stencil_{}", r);
        functions.push(Function::new(
            name.clone(),
            vec![Param::pointer("A"), Param::pointer("B"), Param::integer("n")],
        ));
        let (src, dst) = if r % 2 == 0 { ("x", "y") } else { ("y", "x") };
        main.body.push(Instruction::call(name.clone(), &[src, dst, "n"]));

        let read = |sub: &str| MemoryAccessFact {
            kind: AccessKind::Read,
            base: "A".to_string(),
            num_dims: 2,
            scalar: false,
            subscripts: vec![sub.to_string(), "i1".to_string()],
            iterators: vec!["i0".to_string(), "i1".to_string()],
            relation: None,
        };
        facts.push(RegionFacts {
            function: name,
            context: "[n] -> { : n >= 3 }".to_string(),
            assumed_context: "[n] -> { : n <= 8192 }".to_string(),
            auto_parallel_depth: 2,
            statements: vec![StatementFacts {
                domain: "[n] -> { S[i0, i1] : i0 >= 1 and i0 <= -2 + n and i1 >= 0 and i1 <= -1 + n }"
                    .to_string(),
                accesses: vec![
                    read("-1 + i0"),
                    read("i0"),
                    read("1 + i0"),
                    MemoryAccessFact {
                        kind: AccessKind::MustWrite,
                        base: "B".to_string(),
                        ..read("i0")
                    },
                ],
            }],
            profile: None,
        });
    }
    functions.push(main);

    (Module { name: "stencils".to_string(), functions }, ModuleFacts { regions: facts })
}

/// Benchmark detection plus call-chain analysis.
fn bench_planning(c: &mut Criterion) {
    let (module, facts) = stencil_module(16);
    let config = OffloadConfig::default();

    c.bench_function("plan_16_stencils", |b| {
        b.iter(|| polyoffload::plan_module(black_box(&module), black_box(&facts), &config).unwrap())
    });
}

criterion_group!(benches, bench_evaluation, bench_planning);
criterion_main!(benches);
