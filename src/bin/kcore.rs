/*
 * SPDX-FileCopyrightText: 2025 Inria
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use anyhow::Result;
use bucketing::prelude::*;
use clap::Parser;
use dsi_progress_logger::*;
use log::info;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Parser, Debug)]
#[command(about = "Computes core numbers of a random graph by bucket-based peeling", long_about = None)]
struct Args {
    /// The number of vertices
    n: usize,

    /// The average degree of the random graph
    #[arg(short, long, default_value = "8.0")]
    avg_degree: f64,

    /// The number of materialized buckets
    #[arg(short, long, default_value = "128")]
    total_buckets: usize,

    /// The seed for the random number generator
    #[arg(short, long, default_value = "0")]
    seed: u64,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .try_init()?;

    let args = Args::parse();
    let n = args.n;
    let mut rng = SmallRng::seed_from_u64(args.seed);

    let mut pl = ProgressLogger::default();

    pl.start("Generating random graph...");
    let num_edges = (n as f64 * args.avg_degree / 2.0) as usize;
    let mut adj = vec![Vec::new(); n];
    for _ in 0..num_edges {
        let u = rng.gen_range(0..n);
        let v = rng.gen_range(0..n);
        if u != v {
            adj[u].push(v as u32);
            adj[v].push(u as u32);
        }
    }
    pl.done_with_count(num_edges);

    let deg: Vec<AtomicU32> = adj.iter().map(|a| AtomicU32::new(a.len() as u32)).collect();
    let mut core = vec![0_u32; n];

    pl.start("Peeling...");
    let d = |v: u32| deg[v as usize].load(Ordering::Relaxed);
    let mut buckets = Buckets::with_total_buckets(n, d, Order::Increasing, args.total_buckets);

    // Per-round decrement accumulators, so that each touched vertex yields
    // exactly one relocation per round.
    let mut delta = vec![0_u32; n];
    let mut touched = Vec::new();
    let mut peeled = 0;

    while let Some(bucket) = buckets.next_bucket() {
        let k = bucket.id as u32;
        for v in bucket.identifiers.iter() {
            core[v as usize] = k;
            peeled += 1;
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
        pl.update_with_count(bucket.identifiers.len());
    }
    pl.done_with_count(peeled);

    let max_core = core.iter().max().copied().unwrap_or(0);
    info!(
        "Vertices: {} Edges: {} Buckets: {} Max core: {}",
        n, num_edges, args.total_buckets, max_core
    );

    Ok(())
}
