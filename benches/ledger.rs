// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Benchmarks for the ledger.
//!
//! Run with: cargo bench
//!
//! Benchmarks include:
//! - Single-threaded balance updates and transfers
//! - Opposing transfers on one pair of accounts
//! - Transfers spread over disjoint pairs
//! - Scaling with number of threads

use account_ledger_rs::{AccountId, Currency, Ledger, MemoryStore};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rayon::prelude::*;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup(count: usize, amount: i64) -> (Ledger, MemoryStore, Vec<AccountId>) {
    let ledger = Ledger::new();
    let store = MemoryStore::new();
    let ids = store
        .transaction(|tx| {
            let mut ids = Vec::with_capacity(count);
            for i in 0..count {
                let client = ledger.create_client(tx, &format!("client-{i}"))?;
                let account = ledger.create_account(tx, client.id(), Currency::Eur)?;
                ledger.update_amount(tx, account.id(), amount)?;
                ids.push(account.id());
            }
            Ok(ids)
        })
        .unwrap();
    (ledger, store, ids)
}

// =============================================================================
// Single-Threaded Benchmarks
// =============================================================================

fn bench_single_update(c: &mut Criterion) {
    let (ledger, store, ids) = setup(1, 0);

    c.bench_function("single_update", |b| {
        b.iter(|| {
            let account = store
                .transaction(|tx| ledger.update_amount(tx, ids[0], black_box(10)))
                .unwrap();
            black_box(account);
        })
    });
}

fn bench_single_transfer(c: &mut Criterion) {
    let (ledger, store, ids) = setup(2, 1_000_000);

    // Alternate direction so balances stay put across iterations.
    let mut forward = true;
    c.bench_function("single_transfer", |b| {
        b.iter(|| {
            let (src, dst) = if forward { (ids[0], ids[1]) } else { (ids[1], ids[0]) };
            forward = !forward;
            let account = store
                .transaction(|tx| ledger.transfer(tx, src, dst, black_box(5)))
                .unwrap();
            black_box(account);
        })
    });
}

fn bench_rejected_transfer(c: &mut Criterion) {
    let (ledger, store, ids) = setup(2, 0);

    c.bench_function("rejected_transfer", |b| {
        b.iter(|| {
            let result = store.transaction(|tx| ledger.transfer(tx, ids[0], ids[1], 5));
            black_box(result.is_err());
        })
    });
}

// =============================================================================
// Multi-Threaded Benchmarks
// =============================================================================

fn bench_parallel_opposing_transfers(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_opposing_transfers");

    for count in [1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let (ledger, store, ids) = setup(2, 1_000_000);

                (0..count).into_par_iter().for_each(|i| {
                    let (src, dst) = if i % 2 == 0 { (ids[0], ids[1]) } else { (ids[1], ids[0]) };
                    let _ = store.transaction(|tx| ledger.transfer(tx, src, dst, 1));
                });

                black_box(&ledger);
            })
        });
    }
    group.finish();
}

fn bench_parallel_disjoint_transfers(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_disjoint_transfers");

    for count in [1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                // 32 independent pairs.
                let (ledger, store, ids) = setup(64, 1_000_000);

                (0..count).into_par_iter().for_each(|i| {
                    let pair = (i % 32) * 2;
                    let _ = store.transaction(|tx| ledger.transfer(tx, ids[pair], ids[pair + 1], 1));
                });

                black_box(&ledger);
            })
        });
    }
    group.finish();
}

// =============================================================================
// Scaling Benchmarks
// =============================================================================

fn bench_thread_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("thread_scaling");
    let total_operations = 10_000usize;

    for num_threads in [1, 2, 4, 8].iter() {
        group.throughput(Throughput::Elements(total_operations as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_threads),
            num_threads,
            |b, &num_threads| {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .build()
                    .unwrap();

                b.iter(|| {
                    let (ledger, store, ids) = setup(100, 1_000_000);

                    pool.install(|| {
                        (0..total_operations).into_par_iter().for_each(|i| {
                            // Ring of transfers over 100 accounts
                            let src = ids[i % 100];
                            let dst = ids[(i + 1) % 100];
                            store
                                .transaction(|tx| ledger.transfer(tx, src, dst, 1))
                                .unwrap();
                        });
                    });

                    black_box(&ledger);
                })
            },
        );
    }
    group.finish();
}

criterion_group!(
    single_threaded,
    bench_single_update,
    bench_single_transfer,
    bench_rejected_transfer,
);

criterion_group!(
    multi_threaded,
    bench_parallel_opposing_transfers,
    bench_parallel_disjoint_transfers,
);

criterion_group!(scaling, bench_thread_scaling,);

criterion_main!(single_threaded, multi_threaded, scaling);
