/*
 * SPDX-FileCopyrightText: 2025 Inria
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The priority oracle queried by the bucketing structure.

/// The number of a priority bucket.
pub type BucketId = u32;

/// The index of a materialized slot of the bucket window, in [0..*T*), or
/// [`NULL_BKT`].
pub type BucketDest = u32;

/// Sentinel meaning “no bucket”: an identifier that is currently in no
/// bucket, or a destination outside the window in the direction that has
/// already been processed.
pub const NULL_BKT: BucketId = BucketId::MAX;

/// A map from identifiers to the bucket currently containing them.
///
/// The oracle is queried by [`Buckets`](crate::buckets::Buckets) whenever it
/// needs to (re)classify identifiers: once per identifier at construction,
/// and once per identifier each time a bucket is emitted or the overflow
/// slot is redistributed. It must therefore be cheap, and since it is called
/// from parallel contexts it must be [`Sync`].
///
/// Between two operations of the structure the oracle must be referentially
/// transparent: for a given identifier it must keep returning the same
/// bucket until the caller deliberately changes the mapping. Identifiers
/// mapped to [`NULL_BKT`] are in no bucket and are never emitted.
///
/// The blanket implementation for closures keeps the hot path free of
/// indirection:
///
/// ```rust
/// use bucketing::traits::Bucketer;
///
/// let d = |i: u32| i / 10;
/// assert_eq!(d.bucket(25), 2);
/// ```
///
/// Mutable priorities are typically kept in a shared array of atomics the
/// closure reads from:
///
/// ```rust
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use bucketing::traits::Bucketer;
///
/// let pri = vec![AtomicU32::new(4), AtomicU32::new(7)];
/// let d = |i: u32| pri[i as usize].load(Ordering::Relaxed);
/// assert_eq!(d.bucket(1), 7);
/// pri[1].store(2, Ordering::Relaxed);
/// assert_eq!(d.bucket(1), 2);
/// ```
pub trait Bucketer: Sync {
    /// Returns the bucket currently containing `id`, or [`NULL_BKT`] if
    /// `id` is in no bucket.
    fn bucket(&self, id: u32) -> BucketId;
}

impl<F: Fn(u32) -> BucketId + Sync> Bucketer for F {
    #[inline(always)]
    fn bucket(&self, id: u32) -> BucketId {
        self(id)
    }
}
