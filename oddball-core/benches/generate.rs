use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use oddball_core::Block;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Benchmarks block sequence generation across realistic session sizes.
pub fn bench_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_generate");

    for &trials in &[25usize, 100, 500] {
        group.bench_with_input(
            BenchmarkId::new("first_standard", trials),
            &trials,
            |b, &trials| {
                let mut rng = StdRng::seed_from_u64(42);
                b.iter(|| {
                    let block = Block::generate(1, black_box(trials), 0.2, true, &mut rng);
                    black_box(block.target_count());
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_generate);
criterion_main!(benches);
