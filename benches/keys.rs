use criterion::*;
use mimalloc::MiMalloc;
use stamina_node::primitives::*;
use stamina_node::stamina::keys::*;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub fn storage_key_benchmark(c: &mut Criterion) {
    let a = Address([1; 20]);
    let b = Address([2; 20]);

    c.bench_function("mapping key", |bench| {
        bench.iter(|| stamina_key(black_box(&a)))
    });

    c.bench_function("nested mapping key", |bench| {
        bench.iter(|| deposit_key(black_box(&a), black_box(&b)))
    });

    c.bench_function("withdrawal keys", |bench| {
        bench.iter(|| withdrawal_keys(black_box(&a), black_box(&b)))
    });
}

criterion_group!(benches, storage_key_benchmark);
criterion_main!(benches);
