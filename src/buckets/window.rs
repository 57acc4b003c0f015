/*
 * SPDX-FileCopyrightText: 2025 Inria
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

/*!

A bucketing structure maintaining a materialized window over a large
priority space, after Laxman Dhulipala, Guy Blelloch, and Julian Shun,
“[Julienne: A Framework for Parallel Graph Algorithms using Work-efficient
Bucketing](https://dl.acm.org/doi/10.1145/3087556.3087580)”, *Proc. of the
29th ACM Symposium on Parallelism in Algorithms and Architectures, SPAA'17*,
pages 293–304, ACM, 2017.

Identifiers may start off spread over a huge number of buckets, but in
practice an algorithm opens very few of them. [`Buckets`] therefore
materializes only `total_buckets` slots: the first `total_buckets` − 1 are
*open* and correspond to a contiguous range of bucket numbers, while the
last one holds every identifier whose bucket falls outside the range. Each
time the range runs out of buckets the overflow slot is redistributed under
the next range. Experimenting with `total_buckets` is necessary to obtain
the best performance: small values redistribute often, large values cost
memory and setup time.

Identifiers are moved between buckets in bulk by a blocked parallel counting
sort over the slots of the window; an identifier whose priority changed is
simply inserted again, and the copy left in its old slot is discarded
lazily, at emission time, by checking the priority oracle.

*/

use crate::buckets::slot::Slot;
use crate::subset::Subset;
use crate::traits::{BucketDest, BucketId, Bucketer, NULL_BKT};
use crate::utils::{exclusive_scan, SEQ_THRESHOLD};
use mem_dbg::*;
use rayon::prelude::*;

/// Target number of batch items per block of the parallel bulk update.
const BLOCK_ITEMS: usize = 4096;
/// Cache line size, in bytes.
const CACHE_LINE: usize = 64;
/// Stride, in cells, keeping write-heavy cursor cells on distinct cache
/// lines.
const CURSOR_STRIDE: usize = CACHE_LINE / std::mem::size_of::<u32>();

/// The order in which buckets are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, MemDbg, MemSize)]
pub enum Order {
    /// Smaller bucket numbers first.
    Increasing,
    /// Larger bucket numbers first.
    Decreasing,
}

/// A non-empty bucket emitted by [`Buckets::next_bucket`].
#[derive(Debug, Clone, MemDbg, MemSize)]
pub struct Bucket {
    /// The bucket number.
    pub id: usize,
    /// The number of identifiers the slot held before stale entries were
    /// filtered out.
    pub num_filtered: usize,
    /// The identifiers currently in the bucket.
    pub identifiers: Subset,
}

/// A dynamic partitioning of the identifiers [0..*n*) into priority
/// buckets, materialized lazily as a window of `total_buckets` slots.
///
/// For an identifier *i*, `d.bucket(i)` is the bucket currently containing
/// *i*, or [`NULL_BKT`] if *i* is in no bucket. The structure seeds itself
/// from the oracle at construction; afterwards, every time the caller
/// changes the mapping of some identifiers it must report the moves through
/// [`update_buckets`](Buckets::update_buckets), routing each one through
/// [`get_bucket`](Buckets::get_bucket).
///
/// # Examples
///
/// ```rust
/// use bucketing::prelude::*;
///
/// let pri = [0_u32, 1, 2, 0, 1, 2];
/// let mut buckets =
///     Buckets::with_total_buckets(6, move |i: u32| pri[i as usize], Order::Increasing, 4);
///
/// let bucket = buckets.next_bucket().unwrap();
/// assert_eq!(bucket.id, 0);
/// let mut ids = bucket.identifiers.as_slice().to_vec();
/// ids.sort_unstable();
/// assert_eq!(ids, vec![0, 3]);
///
/// assert_eq!(buckets.next_bucket().unwrap().id, 1);
/// assert_eq!(buckets.next_bucket().unwrap().id, 2);
/// assert!(buckets.next_bucket().is_none());
/// ```
#[derive(Debug, MemDbg, MemSize)]
pub struct Buckets<D> {
    n: usize,
    d: D,
    order: Order,
    open_buckets: usize,
    total_buckets: usize,
    cur_bkt: usize,
    cur_range: usize,
    num_elms: usize,
    bkts: Box<[Slot]>,
}

impl<D: Bucketer> Buckets<D> {
    /// The default number of materialized slots.
    pub const DEFAULT_TOTAL_BUCKETS: usize = 128;

    /// Creates a bucketing structure over the identifiers [0..`n`) with
    /// [`DEFAULT_TOTAL_BUCKETS`](Buckets::DEFAULT_TOTAL_BUCKETS) slots.
    pub fn new(n: usize, d: D, order: Order) -> Self {
        Self::with_total_buckets(n, d, order, Self::DEFAULT_TOTAL_BUCKETS)
    }

    /// Creates a bucketing structure over the identifiers [0..`n`) with
    /// `total_buckets` materialized slots, of which `total_buckets` − 1 are
    /// open.
    ///
    /// # Panics
    ///
    /// If `total_buckets` < 2 or `n` > [`u32::MAX`].
    pub fn with_total_buckets(n: usize, d: D, order: Order, total_buckets: usize) -> Self {
        if total_buckets < 2 {
            panic!("Too few buckets: {} < 2", total_buckets);
        }
        if n > u32::MAX as usize {
            panic!("Too many identifiers: {} > {}", n, u32::MAX);
        }
        let open_buckets = total_buckets - 1;

        // Position the window so that it straddles the minimum (increasing)
        // or one past the maximum (decreasing) bucket in use.
        let cur_range = match order {
            Order::Increasing => {
                let min_bkt = (0..n)
                    .into_par_iter()
                    .map(|i| d.bucket(i as u32))
                    .min()
                    .unwrap_or(NULL_BKT);
                min_bkt as usize / open_buckets
            }
            Order::Decreasing => {
                let max_bkt = (0..n)
                    .into_par_iter()
                    .map(|i| match d.bucket(i as u32) {
                        NULL_BKT => 0,
                        b => b,
                    })
                    .max()
                    .unwrap_or(0);
                // When the maximum is an exact multiple of the number of
                // open buckets this lands the maximum on the bottom open
                // slot of the window, which is still within range.
                (max_bkt as usize + open_buckets) / open_buckets
            }
        };

        let mut bkts: Box<[Slot]> = (0..total_buckets)
            .map(|_| Slot::new())
            .collect::<Vec<_>>()
            .into();
        let mut num_elms = 0;

        // Seed with all (identifier, slot) pairs; identifiers mapped to
        // NULL_BKT are dropped by the bulk update.
        let seed = |i: usize| {
            let bkt = d.bucket(i as u32);
            let dest = if bkt == NULL_BKT {
                NULL_BKT
            } else {
                to_slot(order, cur_range, open_buckets, bkt)
            };
            Some((i as u32, dest))
        };
        update_slots(&mut bkts, &mut num_elms, &seed, n);

        Self {
            n,
            d,
            order,
            open_buckets,
            total_buckets,
            cur_bkt: 0,
            cur_range,
            num_elms,
            bkts,
        }
    }

    /// Returns the number of identifiers currently held across all slots,
    /// counting stale copies left behind by updates.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.num_elms
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.num_elms == 0
    }

    /// Returns the number of materialized slots, including the overflow
    /// slot.
    #[inline(always)]
    pub fn total_buckets(&self) -> usize {
        self.total_buckets
    }

    /// Computes the slot an identifier moving from bucket `prev` to bucket
    /// `next` must be inserted into, or [`NULL_BKT`] if no insertion is
    /// needed.
    ///
    /// No insertion is needed when the new bucket falls outside the window
    /// in the already-processed direction, or when the identifier is
    /// already physically queued in the destination slot, i.e., when `prev`
    /// and `next` map to the same open slot. The exception to the latter
    /// rule is the slot currently being emitted: its storage has just been
    /// drained, so an identifier whose priority still maps there must be
    /// inserted again.
    pub fn get_bucket(&self, prev: BucketId, next: BucketId) -> BucketDest {
        let pb = self.to_range(prev);
        let nb = self.to_range(next);
        if nb != NULL_BKT && (prev == NULL_BKT || pb != nb || nb as usize == self.cur_bkt) {
            return nb;
        }
        NULL_BKT
    }

    /// Routes `k` identifiers into their slots and returns the number
    /// actually inserted.
    ///
    /// The `i`-th identifier and its destination slot are given by `f(i)`;
    /// entries returning [`None`] or a [`NULL_BKT`] destination are
    /// skipped. Destinations are slot indices, as returned by
    /// [`get_bucket`](Buckets::get_bucket).
    pub fn update_buckets<F>(&mut self, f: F, k: usize) -> usize
    where
        F: Fn(usize) -> Option<(u32, BucketDest)> + Sync,
    {
        update_slots(&mut self.bkts, &mut self.num_elms, &f, k)
    }

    /// Returns the next non-empty bucket in the configured order, or
    /// [`None`] when no identifiers remain.
    ///
    /// The slot backing the returned bucket is drained, and identifiers
    /// whose current mapping no longer matches the bucket number are
    /// silently discarded; the pre-filter count is reported in
    /// [`num_filtered`](Bucket::num_filtered). Ownership of the returned
    /// set passes to the caller.
    pub fn next_bucket(&mut self) -> Option<Bucket> {
        loop {
            while !self.cur_bucket_non_empty() && self.num_elms > 0 {
                self.advance();
            }
            if self.num_elms == 0 {
                return None;
            }

            let cur_bkt_num = self.cur_bucket_num();
            let size = self.bkts[self.cur_bkt].len();
            self.num_elms -= size;
            let d = &self.d;
            // Stale entries, left behind by updates that moved their
            // identifier elsewhere, are dropped here.
            let ids: Vec<u32> = self.bkts[self.cur_bkt]
                .as_slice()
                .par_iter()
                .copied()
                .filter(|&id| d.bucket(id) as usize == cur_bkt_num)
                .collect();
            self.bkts[self.cur_bkt].clear();

            if ids.is_empty() {
                continue;
            }
            return Some(Bucket {
                id: cur_bkt_num,
                num_filtered: size,
                identifiers: Subset::new(self.n, ids),
            });
        }
    }

    #[inline(always)]
    fn cur_bucket_non_empty(&self) -> bool {
        self.bkts[self.cur_bkt].len() > 0
    }

    fn advance(&mut self) {
        self.cur_bkt += 1;
        if self.cur_bkt == self.open_buckets {
            self.unpack();
            self.cur_bkt = 0;
        }
    }

    /// Advances the range and redistributes the overflow slot under it.
    fn unpack(&mut self) {
        let m = self.bkts[self.open_buckets].len();
        let tmp = self.bkts[self.open_buckets].take();
        match self.order {
            Order::Increasing => self.cur_range += 1,
            Order::Decreasing => self.cur_range -= 1,
        }
        if m != self.num_elms {
            // The overflow slot must hold the last live identifiers: every
            // open slot has been scanned past and found empty.
            self.cur_bkt = 0;
            panic!(
                "corrupted bucket structure: {} identifiers in the overflow slot, {} pending (current bucket {})",
                m, self.num_elms, self.cur_bucket_num()
            );
        }

        let d = &self.d;
        let (order, cur_range, open_buckets) = (self.order, self.cur_range, self.open_buckets);
        let redistribute = |i: usize| {
            let id = tmp[i];
            Some((id, to_slot(order, cur_range, open_buckets, d.bucket(id))))
        };
        update_slots(&mut self.bkts, &mut self.num_elms, &redistribute, m);
        // The overflow contents have just been counted again by the bulk
        // update: compensate.
        self.num_elms -= m;
    }

    #[inline(always)]
    fn to_range(&self, bkt: BucketId) -> BucketDest {
        to_slot(self.order, self.cur_range, self.open_buckets, bkt)
    }

    /// The absolute bucket number of the slot at `cur_bkt`.
    fn cur_bucket_num(&self) -> usize {
        match self.order {
            Order::Increasing => self.cur_range * self.open_buckets + self.cur_bkt,
            Order::Decreasing => self.cur_range * self.open_buckets - self.cur_bkt - 1,
        }
    }
}

/// Maps an absolute bucket number to a slot of the current window: an open
/// slot for the in-range buckets, the overflow slot for buckets not yet
/// reached, and [`NULL_BKT`] for buckets in the direction already processed
/// (such entries are filtered out lazily).
///
/// The window covers [`cur_range` · `open_buckets`..(`cur_range` + 1) ·
/// `open_buckets`) in increasing order and [(`cur_range` − 1) ·
/// `open_buckets`..`cur_range` · `open_buckets`) in decreasing order.
#[inline]
fn to_slot(order: Order, cur_range: usize, open_buckets: usize, bkt: BucketId) -> BucketDest {
    let b = bkt as usize;
    match order {
        Order::Increasing => {
            if b < cur_range * open_buckets {
                NULL_BKT
            } else if b < (cur_range + 1) * open_buckets {
                (b % open_buckets) as BucketDest
            } else {
                open_buckets as BucketDest
            }
        }
        Order::Decreasing => {
            if b >= cur_range * open_buckets {
                NULL_BKT
            } else if b >= (cur_range - 1) * open_buckets {
                (open_buckets - 1 - b % open_buckets) as BucketDest
            } else {
                open_buckets as BucketDest
            }
        }
    }
}

/// A base pointer shared by the scatter blocks.
#[derive(Clone, Copy)]
struct SyncMutPtr(*mut u32);
unsafe impl Send for SyncMutPtr {}
unsafe impl Sync for SyncMutPtr {}

/// Routes a batch of `k` (identifier, slot) pairs into the slots with a
/// blocked counting sort: per-block histograms over the slot destinations,
/// an exclusive prefix sum in slot-major order, and a parallel scatter at
/// the resulting offsets.
fn update_slots<F>(bkts: &mut [Slot], num_elms: &mut usize, f: &F, k: usize) -> usize
where
    F: Fn(usize) -> Option<(u32, BucketDest)> + Sync,
{
    if k < SEQ_THRESHOLD || rayon::current_num_threads() == 1 {
        return update_slots_seq(bkts, num_elms, f, k);
    }
    let total_buckets = bkts.len();
    let ne_before = *num_elms;

    let num_blocks = (k / BLOCK_ITEMS).max(1).next_power_of_two();
    let block_size = k.div_ceil(num_blocks);

    // 1. Per-block histograms over the slot destinations. The buffer is
    // sized for the strided cursor cells of step 4, which reuse it.
    let mut hists = vec![0_u32; (num_blocks + 1) * total_buckets * CURSOR_STRIDE];
    hists[..num_blocks * total_buckets]
        .par_chunks_mut(total_buckets)
        .enumerate()
        .for_each(|(block, hist)| {
            let start = block * block_size;
            let end = (start + block_size).min(k);
            for i in start..end {
                if let Some((_, dest)) = f(i) {
                    if dest != NULL_BKT {
                        hist[dest as usize] += 1;
                    }
                }
            }
        });

    // 2. Exclusive prefix sum of the histograms, read in slot-major order,
    // so that outs[s * num_blocks] is the global offset of slot s.
    let mut outs = vec![0_u32; num_blocks * total_buckets + 1];
    let sum = exclusive_scan(
        |i| hists[(i % num_blocks) * total_buckets + i / num_blocks],
        &mut outs[..num_blocks * total_buckets],
    );
    outs[num_blocks * total_buckets] = sum;

    // 3. Reserve space in each slot; lengths are committed only after the
    // scatter, so offset writes never race with a length update.
    for s in 0..total_buckets {
        let inc = (outs[(s + 1) * num_blocks] - outs[s * num_blocks]) as usize;
        bkts[s].reserve(inc);
    }

    // 4. Per-(slot, block) insertion cursors, rebased to the start of each
    // slot and kept one cache line apart.
    hists
        .par_chunks_mut(num_blocks * CURSOR_STRIDE)
        .take(total_buckets)
        .enumerate()
        .for_each(|(s, cells)| {
            let start = outs[s * num_blocks];
            for block in 0..num_blocks {
                cells[block * CURSOR_STRIDE] = outs[s * num_blocks + block] - start;
            }
        });

    // 5. Scatter. Each block owns its own column of cursor cells, and the
    // prefix sums guarantee that distinct blocks write disjoint offset
    // ranges of each slot.
    let cursors = SyncMutPtr(hists.as_mut_ptr());
    let slots: Vec<SyncMutPtr> = bkts
        .iter_mut()
        .map(|slot| SyncMutPtr(slot.spare_ptr()))
        .collect();
    (0..num_blocks).into_par_iter().for_each(|block| {
        let cursors = cursors;
        let start = block * block_size;
        let end = (start + block_size).min(k);
        for i in start..end {
            if let Some((id, dest)) = f(i) {
                if dest != NULL_BKT {
                    let dest = dest as usize;
                    // SAFETY: the cursor cell is owned by this block, and
                    // the offset is within the space reserved in step 3.
                    unsafe {
                        let cell = cursors.0.add((dest * num_blocks + block) * CURSOR_STRIDE);
                        *slots[dest].0.add(*cell as usize) = id;
                        *cell += 1;
                    }
                }
            }
        }
    });

    // 6. Commit the new lengths.
    for s in 0..total_buckets {
        let inc = (outs[(s + 1) * num_blocks] - outs[s * num_blocks]) as usize;
        // SAFETY: the scatter has initialized exactly inc elements past the
        // committed length of slot s.
        unsafe { bkts[s].commit(inc) };
        *num_elms += inc;
    }

    *num_elms - ne_before
}

fn update_slots_seq<F>(bkts: &mut [Slot], num_elms: &mut usize, f: &F, k: usize) -> usize
where
    F: Fn(usize) -> Option<(u32, BucketDest)>,
{
    let ne_before = *num_elms;
    for i in 0..k {
        if let Some((id, dest)) = f(i) {
            if dest != NULL_BKT {
                bkts[dest as usize].push(id);
                *num_elms += 1;
            }
        }
    }
    *num_elms - ne_before
}
