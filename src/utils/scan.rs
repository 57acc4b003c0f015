/*
 * SPDX-FileCopyrightText: 2025 Inria
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! A parallel exclusive prefix sum over a lazily indexed sequence.

use crate::utils::SEQ_THRESHOLD;
use rayon::prelude::*;

/// Writes into `out` the exclusive prefix sums of the sequence
/// `f(0)..f(out.len())` and returns the sum of the whole sequence.
///
/// The input is read through an index function rather than a slice so that
/// callers can scan a transposed or otherwise virtual view of their data
/// without materializing it; `f` is evaluated twice per position.
///
/// Short inputs are scanned sequentially; longer ones with a three-phase
/// chunked scan (per-chunk sums, a sequential scan of the chunk sums, and a
/// parallel rebasing pass).
///
/// # Examples
///
/// ```rust
/// use bucketing::utils::exclusive_scan;
///
/// let v = [3, 1, 4, 1, 5];
/// let mut out = [0; 5];
/// let sum = exclusive_scan(|i| v[i], &mut out);
/// assert_eq!(out, [0, 3, 4, 8, 9]);
/// assert_eq!(sum, 14);
/// ```
pub fn exclusive_scan<F>(f: F, out: &mut [u32]) -> u32
where
    F: Fn(usize) -> u32 + Sync,
{
    let n = out.len();
    if n < SEQ_THRESHOLD || rayon::current_num_threads() == 1 {
        let mut acc = 0;
        for (i, o) in out.iter_mut().enumerate() {
            *o = acc;
            acc += f(i);
        }
        return acc;
    }

    let num_chunks = (4 * rayon::current_num_threads()).min(n);
    let chunk_size = n.div_ceil(num_chunks);

    let mut sums: Vec<u32> = (0..n.div_ceil(chunk_size))
        .into_par_iter()
        .map(|c| {
            let start = c * chunk_size;
            let end = (start + chunk_size).min(n);
            (start..end).map(&f).sum()
        })
        .collect();

    let mut acc = 0;
    for s in sums.iter_mut() {
        let t = *s;
        *s = acc;
        acc += t;
    }

    out.par_chunks_mut(chunk_size)
        .enumerate()
        .for_each(|(c, chunk)| {
            let base = c * chunk_size;
            let mut run = sums[c];
            for (i, o) in chunk.iter_mut().enumerate() {
                *o = run;
                run += f(base + i);
            }
        });

    acc
}
