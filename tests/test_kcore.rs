/*
 * SPDX-FileCopyrightText: 2025 Inria
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! End-to-end peeling test: computes core numbers with the bucketing
//! structure and checks them against a quadratic reference peeler.

use bucketing::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU32, Ordering};

fn random_graph(n: usize, p: f64, seed: u64) -> Vec<Vec<u32>> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut adj = vec![Vec::new(); n];
    for u in 0..n {
        for v in u + 1..n {
            if rng.gen_bool(p) {
                adj[u].push(v as u32);
                adj[v].push(u as u32);
            }
        }
    }
    adj
}

/// Removes a minimum-degree vertex at a time.
fn reference_cores(adj: &[Vec<u32>]) -> Vec<u32> {
    let n = adj.len();
    let mut deg: Vec<u32> = adj.iter().map(|a| a.len() as u32).collect();
    let mut removed = vec![false; n];
    let mut core = vec![0_u32; n];
    let mut cur = 0;
    for _ in 0..n {
        let v = (0..n)
            .filter(|&v| !removed[v])
            .min_by_key(|&v| deg[v])
            .unwrap();
        cur = cur.max(deg[v]);
        core[v] = cur;
        removed[v] = true;
        for &u in &adj[v] {
            let u = u as usize;
            if !removed[u] {
                deg[u] -= 1;
            }
        }
    }
    core
}

fn bucket_cores(adj: &[Vec<u32>], total_buckets: usize) -> Vec<u32> {
    let n = adj.len();
    let deg: Vec<AtomicU32> = adj.iter().map(|a| AtomicU32::new(a.len() as u32)).collect();
    let mut core = vec![0_u32; n];

    let d = |v: u32| deg[v as usize].load(Ordering::Relaxed);
    let mut buckets = Buckets::with_total_buckets(n, d, Order::Increasing, total_buckets);

    let mut delta = vec![0_u32; n];
    let mut touched = Vec::new();
    while let Some(bucket) = buckets.next_bucket() {
        let k = bucket.id as u32;
        for v in bucket.identifiers.iter() {
            core[v as usize] = k;
            for &u in &adj[v as usize] {
                if deg[u as usize].load(Ordering::Relaxed) > k {
                    if delta[u as usize] == 0 {
                        touched.push(u);
                    }
                    delta[u as usize] += 1;
                }
            }
        }
        let mut moved = Vec::with_capacity(touched.len());
        for &u in &touched {
            let old = deg[u as usize].load(Ordering::Relaxed);
            let new = old.saturating_sub(delta[u as usize]).max(k);
            delta[u as usize] = 0;
            if new != old {
                deg[u as usize].store(new, Ordering::Relaxed);
                let dest = buckets.get_bucket(old, new);
                if dest != NULL_BKT {
                    moved.push((u, dest));
                }
            }
        }
        touched.clear();
        buckets.update_buckets(|i| Some(moved[i]), moved.len());
    }
    core
}

#[test]
fn test_kcore_random() {
    for (n, p, seed) in [(50, 0.2, 0), (200, 0.05, 1), (400, 0.02, 2)] {
        let adj = random_graph(n, p, seed);
        let expected = reference_cores(&adj);
        // Small windows exercise redistribution; large ones do not.
        for total_buckets in [2, 4, 16, 128] {
            assert_eq!(
                bucket_cores(&adj, total_buckets),
                expected,
                "n = {}, p = {}, total_buckets = {}",
                n,
                p,
                total_buckets
            );
        }
    }
}

#[test]
fn test_kcore_clique_with_tail() {
    // A 10-clique with a pendant path: the clique peels at 9, the path at 1.
    let mut adj = vec![Vec::new(); 15];
    for u in 0..10 {
        for v in u + 1..10 {
            adj[u].push(v as u32);
            adj[v].push(u as u32);
        }
    }
    for u in 9..14 {
        adj[u].push(u as u32 + 1);
        adj[u + 1].push(u as u32);
    }
    let core = bucket_cores(&adj, 4);
    for v in 0..10 {
        assert_eq!(core[v], 9);
    }
    for v in 10..15 {
        assert_eq!(core[v], 1);
    }
}
