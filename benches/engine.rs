use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use ledger_node::engine;
use ledger_node::model::Account;
use ledger_node::store::PartitionData;
use ledger_node::{Amount, Routing};

const TIMESTAMP: &str = "2026-08-08 12:00:00";

/// Partition pre-seeded with `accounts` well-funded accounts.
fn seeded_partition(accounts: u32) -> PartitionData {
    let mut data = PartitionData::default();
    for id in 0..accounts {
        data.accounts.insert(
            id,
            Account {
                id,
                client_id: id / 2,
                balance: Amount::from_float(1_000_000.0),
                kind: "CORRIENTE".to_string(),
            },
        );
    }
    data
}

fn bench_transfers(c: &mut Criterion) {
    let mut group = c.benchmark_group("transfer");
    for size in [100u32, 10_000] {
        group.bench_with_input(
            BenchmarkId::new("100_transfers_over", size),
            &size,
            |b, &size| {
                b.iter_batched(
                    || seeded_partition(size),
                    |mut data| {
                        for i in 0..100u32 {
                            let source = i % size;
                            let dest = (i + 7) % size;
                            engine::transfer(
                                &mut data,
                                source,
                                dest,
                                Amount::from_float(1.0),
                                TIMESTAMP.to_string(),
                            )
                            .unwrap();
                        }
                        data
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }
    group.finish();
}

fn bench_routing(c: &mut Criterion) {
    let mut group = c.benchmark_group("route");
    for (name, strategy) in [("modulo", Routing::Modulo), ("digest", Routing::Digest)] {
        group.bench_with_input(BenchmarkId::from_parameter(name), &strategy, |b, &strategy| {
            b.iter(|| {
                let mut spread = 0u32;
                for id in 0..1_000u32 {
                    spread = spread.wrapping_add(strategy.route(black_box(id)));
                }
                spread
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_transfers, bench_routing);
criterion_main!(benches);
