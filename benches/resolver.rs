use criterion::*;
use mimalloc::MiMalloc;
use stamina_node::chain::{BalanceStore, MemorySlots};
use stamina_node::consensus::*;
use stamina_node::primitives::*;
use stamina_node::stamina::*;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn funded_store(ledger: &StaminaLedger, delegatee: &Address, spender: &Address) -> MemorySlots {
    let mut store = MemorySlots::at_block(0);
    write_genesis(&mut store, &StaminaGenesis::default(), ledger.operator()).unwrap();
    store.credit(spender, COIN).unwrap();
    ledger
        .deposit(&mut store, delegatee, delegatee, 1_000 * COIN)
        .unwrap();
    ledger.set_delegator(&mut store, delegatee, spender).unwrap();
    store.set_block_number(1);
    store
}

pub fn resolve_gas_payer_benchmark(c: &mut Criterion) {
    let ledger = StaminaLedger::with_operator(Address([0xaa; 20]));
    let delegatee = Address([1; 20]);
    let spender = Address([2; 20]);
    let store = funded_store(&ledger, &delegatee, &spender);
    let cost = gas_cost(TX_GAS, 1).unwrap();

    c.bench_function("resolve gas payer delegated", |b| {
        b.iter_batched(
            || store.clone(),
            |mut store| resolve_gas_payer(&ledger, &mut store, black_box(&spender), cost).unwrap(),
            BatchSize::SmallInput,
        )
    });

    c.bench_function("resolve gas payer native", |b| {
        b.iter_batched(
            || store.clone(),
            |mut store| {
                resolve_gas_payer(&ledger, &mut store, black_box(&delegatee), 0).unwrap()
            },
            BatchSize::SmallInput,
        )
    });

    c.bench_function("read stamina after recovery", |b| {
        let mut store = store.clone();
        store.set_block_number(DEFAULT_RECOVER_EPOCH_LENGTH * 3);
        b.iter(|| ledger.get_stamina(&store, black_box(&delegatee)).unwrap())
    });
}

criterion_group!(benches, resolve_gas_payer_benchmark);
criterion_main!(benches);
