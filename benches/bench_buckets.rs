/*
 * SPDX-FileCopyrightText: 2025 Inria
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use bucketing::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

const N: usize = 1_000_000;
const MAX_PRI: u32 = 100_000;

fn priorities() -> Vec<u32> {
    let mut rng = SmallRng::seed_from_u64(0);
    (0..N).map(|_| rng.gen_range(0..MAX_PRI)).collect()
}

fn bench_seed(c: &mut Criterion) {
    let pri = priorities();
    c.bench_function("seed", |b| {
        b.iter_batched(
            || pri.clone(),
            |p| {
                black_box(Buckets::new(
                    N,
                    move |i: u32| p[i as usize],
                    Order::Increasing,
                ))
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_update(c: &mut Criterion) {
    let pri = priorities();
    let mut rng = SmallRng::seed_from_u64(1);
    let batch: Vec<(u32, BucketDest)> = (0..N / 10)
        .map(|_| {
            (
                rng.gen_range(0..N as u32),
                rng.gen_range(0..128) as BucketDest,
            )
        })
        .collect();
    c.bench_function("update_buckets", |b| {
        b.iter_batched(
            || {
                let p = pri.clone();
                Buckets::new(N, move |i: u32| p[i as usize], Order::Increasing)
            },
            |mut buckets| buckets.update_buckets(|i| Some(batch[i]), batch.len()),
            BatchSize::SmallInput,
        )
    });
}

fn bench_drain(c: &mut Criterion) {
    let pri = priorities();
    c.bench_function("drain", |b| {
        b.iter_batched(
            || {
                let p = pri.clone();
                Buckets::new(N, move |i: u32| p[i as usize], Order::Increasing)
            },
            |mut buckets| {
                let mut total = 0;
                while let Some(bucket) = buckets.next_bucket() {
                    total += bucket.identifiers.len();
                }
                total
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_seed, bench_update, bench_drain);
criterion_main!(benches);
