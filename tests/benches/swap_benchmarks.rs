//! # Atomic Swap Benchmarks
//!
//! | Area | Operation | Target |
//! |------|-----------|--------|
//! | Secrets | Generate secret + SHA-256 hashlock | < 10µs |
//! | Secrets | Verify a secret against a hashlock | < 5µs |
//! | Order store | Insert + two compare-and-swap transitions | < 100µs |

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use swap_core::adapters::{InMemoryKVStore, KvOrderStore};
use swap_core::domain::{LegParams, SwapOrderBuilder};
use swap_core::{
    canonical_hash, Amount, AssetId, ChainId, OrderStore, SecretManager, SecureSecret, SwapOrder,
    SwapStatus,
};

const NOW: u64 = 1_700_000_000;

fn order_for(manager: &SecretManager) -> (SwapOrder, SecureSecret) {
    let (secret, hashlock) = manager.generate_pair();
    let order = SwapOrderBuilder::new(hashlock, NOW)
        .source(LegParams {
            chain: ChainId::Ethereum,
            asset: AssetId::Native,
            amount: Amount::from(1_000u64),
            depositor: "0xuser".into(),
            claimer: "0xresolver".into(),
            timelock: NOW + 3_600,
        })
        .destination(LegParams {
            chain: ChainId::Near,
            asset: AssetId::Native,
            amount: Amount::from(1_000u64),
            depositor: "resolver.near".into(),
            claimer: "user.near".into(),
            timelock: NOW + 1_800,
        })
        .build()
        .unwrap();
    (order, secret)
}

// ============================================================================
// Secrets and hashlocks
// ============================================================================

fn bench_hashlock(c: &mut Criterion) {
    let mut group = c.benchmark_group("hashlock");
    let manager = SecretManager::new();

    group.bench_function("generate_pair", |b| {
        b.iter(|| black_box(manager.generate_pair()))
    });

    let (secret, hashlock) = manager.generate_pair();
    group.bench_function("verify", |b| {
        b.iter(|| black_box(manager.verify(black_box(&secret), &hashlock)))
    });

    for size in [10usize, 100, 1_000] {
        let secrets: Vec<_> = (0..size).map(|_| manager.generate_secret()).collect();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("canonical_hash_batch", size), &secrets, |b, s| {
            b.iter(|| {
                for secret in s {
                    black_box(canonical_hash(secret));
                }
            })
        });
    }

    group.finish();
}

// ============================================================================
// Order store compare-and-swap
// ============================================================================

fn bench_order_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_store");
    group.measurement_time(Duration::from_secs(5));
    let manager = SecretManager::new();

    group.bench_function("insert_and_two_transitions", |b| {
        let store = KvOrderStore::new(InMemoryKVStore::new());
        b.iter(|| {
            let (mut order, secret) = order_for(&manager);
            store.insert(&order, &secret).unwrap();
            order.source.deposit_tx = Some(swap_core::TxRef("0xsrc".into()));
            order.transition_to(SwapStatus::SrcDeposited, NOW + 1).unwrap();
            store.compare_and_swap(SwapStatus::Created, &order).unwrap();
            order.destination.deposit_tx = Some(swap_core::TxRef("dst".into()));
            order.transition_to(SwapStatus::DstDeposited, NOW + 2).unwrap();
            store
                .compare_and_swap(SwapStatus::SrcDeposited, &order)
                .unwrap();
        })
    });

    group.bench_function("stale_compare_and_swap", |b| {
        let store = KvOrderStore::new(InMemoryKVStore::new());
        let (mut order, secret) = order_for(&manager);
        store.insert(&order, &secret).unwrap();
        order.transition_to(SwapStatus::Expired, NOW + 1).unwrap();
        store.compare_and_swap(SwapStatus::Created, &order).unwrap();
        b.iter(|| black_box(store.compare_and_swap(SwapStatus::Created, &order).is_err()))
    });

    for open in [100usize, 1_000] {
        let store = KvOrderStore::new(InMemoryKVStore::new());
        for _ in 0..open {
            let (order, secret) = order_for(&manager);
            store.insert(&order, &secret).unwrap();
        }
        group.bench_with_input(BenchmarkId::new("expiry_candidates", open), &store, |b, s| {
            b.iter(|| black_box(s.expiry_candidates(NOW + 4_000).unwrap().len()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_hashlock, bench_order_store);
criterion_main!(benches);
