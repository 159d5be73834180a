//! Lowering throughput over the bundled sample instruction set.
//!
//! Measures the full pipeline (attach, branch lowering, operation
//! lowering) for one instruction and for the whole set, sequential and
//! on the rayon pool. Graph construction is excluded via `iter_batched`.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use tcg_lower::samples::rv_isa;
use tcg_lower::{lower_instruction, lower_isa, LoweringConfig};

fn bench_single_instruction(c: &mut Criterion) {
    let config = LoweringConfig::default();
    for name in ["ADD", "BEQ", "JALR"] {
        c.bench_function(&format!("lower_{}", name.to_lowercase()), |b| {
            b.iter_batched(
                || {
                    let mut isa = rv_isa(64).unwrap();
                    isa.retain_named(&[name.to_string()]);
                    isa.instructions.remove(0)
                },
                |mut instruction| {
                    black_box(lower_instruction(&mut instruction, &config).unwrap());
                },
                BatchSize::SmallInput,
            )
        });
    }
}

fn bench_instruction_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("rv64i");
    for parallel in [false, true] {
        let config = LoweringConfig::default().with_parallel(parallel);
        let label = if parallel { "parallel" } else { "sequential" };
        group.bench_function(label, |b| {
            b.iter_batched(
                || rv_isa(64).unwrap(),
                |mut isa| black_box(lower_isa(&mut isa, &config).unwrap()),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_single_instruction, bench_instruction_set);
criterion_main!(benches);
