//! Cuckoo hashing primitives: seeded value hashing, buckets and
//! fingerprint sizing helpers.
//!
//! A value is mapped to a primary bucket, a secondary bucket and a 64-bit
//! fingerprint by three independently seeded hashes. Bucket and fingerprint
//! are pure functions of the value alone, so lookups recompute them without
//! any knowledge of the placement.

pub mod kicker;

use std::hash::BuildHasher;

use ahash::{AHashSet, RandomState};

use crate::bitmap::Bitmap;
use crate::error::{Error, Result};

/// Seed of the primary-bucket hash.
pub const SEED_PRIMARY_BUCKET: u64 = 17;
/// Seed of the secondary-bucket hash.
pub const SEED_SECONDARY_BUCKET: u64 = 23;
/// Seed of the fingerprint hash.
pub const SEED_FINGERPRINT: u64 = 42;

// Maximum load factors (occupied vs. all slots) per bucket width, obtained
// from the cuckoo filter paper (https://www.cs.cmu.edu/~dga/papers/cuckoo-conext2014.pdf).
// Empirically the kicking implementation here does not reach beyond them
// even without partial-key hashing.
pub const MAX_LOAD_FACTOR_1_SLOT: f64 = 0.49;
pub const MAX_LOAD_FACTOR_2_SLOTS: f64 = 0.84;
pub const MAX_LOAD_FACTOR_4_SLOTS: f64 = 0.95;
pub const MAX_LOAD_FACTOR_8_SLOTS: f64 = 0.98;

/// The empirical default load factor for a supported bucket width.
pub fn default_max_load_factor(slots_per_bucket: usize) -> Result<f64> {
    match slots_per_bucket {
        1 => Ok(MAX_LOAD_FACTOR_1_SLOT),
        2 => Ok(MAX_LOAD_FACTOR_2_SLOTS),
        4 => Ok(MAX_LOAD_FACTOR_4_SLOTS),
        8 => Ok(MAX_LOAD_FACTOR_8_SLOTS),
        n => Err(Error::config(format!(
            "no default max load factor for {n} slots per bucket"
        ))),
    }
}

/// Minimum number of buckets needed for `num_values` values under the
/// given load factor.
pub fn min_num_buckets(
    num_values: usize,
    slots_per_bucket: usize,
    max_load_factor: f64,
) -> usize {
    debug_assert!(max_load_factor > 0.0 && max_load_factor < 1.0);
    ((num_values as f64 / max_load_factor) / slots_per_bucket as f64).ceil() as usize
}

/// The three seeded hash states used to derive buckets and fingerprints.
///
/// Fixed secondary keys keep the states pure functions of their seed, so
/// identical inputs always hash identically.
pub struct CuckooHasher {
    primary: RandomState,
    secondary: RandomState,
    fingerprint: RandomState,
}

impl CuckooHasher {
    pub fn new() -> Self {
        Self {
            primary: seeded_state(SEED_PRIMARY_BUCKET),
            secondary: seeded_state(SEED_SECONDARY_BUCKET),
            fingerprint: seeded_state(SEED_FINGERPRINT),
        }
    }

    /// Maps `value` to its buckets and 64-bit fingerprint.
    pub fn cuckoo_value(&self, value: i32, num_buckets: usize) -> CuckooValue {
        CuckooValue {
            orig_value: value,
            primary_bucket: (self.primary.hash_one(value) % num_buckets as u64) as usize,
            secondary_bucket: (self.secondary.hash_one(value) % num_buckets as u64) as usize,
            fingerprint: self.fingerprint.hash_one(value),
        }
    }
}

impl Default for CuckooHasher {
    fn default() -> Self {
        Self::new()
    }
}

fn seeded_state(seed: u64) -> RandomState {
    RandomState::with_seeds(
        seed,
        0x9e37_79b9_7f4a_7c15,
        0x6a09_e667_f3bc_c909,
        0xbb67_ae85_84ca_a73b,
    )
}

/// A value as seen by the placement engine: both candidate buckets plus
/// the full 64-bit fingerprint.
#[derive(Clone, Copy, Debug)]
pub struct CuckooValue {
    pub orig_value: i32,
    pub primary_bucket: usize,
    pub secondary_bucket: usize,
    pub fingerprint: u64,
}

/// Build-time bucket state. `kicked` lists values whose primary bucket is
/// this one but which ended up in their secondary bucket; their
/// fingerprints can collide with residents during lookup and therefore
/// take part in fingerprint sizing.
pub struct Bucket {
    num_slots: usize,
    pub slots: Vec<CuckooValue>,
    pub kicked: Vec<CuckooValue>,
}

impl Bucket {
    pub fn new(num_slots: usize) -> Self {
        Self {
            num_slots,
            slots: Vec::new(),
            kicked: Vec::new(),
        }
    }

    /// Appends `value` if a slot is free; false if the bucket is full.
    pub fn insert_value(&mut self, value: CuckooValue) -> bool {
        if self.slots.len() < self.num_slots {
            self.slots.push(value);
            return true;
        }
        false
    }

    pub fn contains_value(&self, value: &CuckooValue) -> bool {
        self.slots
            .iter()
            .any(|resident| resident.orig_value == value.orig_value)
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() == self.num_slots
    }
}

/// Looks `value` up in its two candidate buckets. Returns
/// `Some(in_primary)` when found.
pub fn lookup_value_in_buckets(buckets: &[Bucket], value: &CuckooValue) -> Option<bool> {
    if buckets[value.primary_bucket].contains_value(value) {
        return Some(true);
    }
    if buckets[value.secondary_bucket].contains_value(value) {
        return Some(false);
    }
    None
}

/// Records every value residing in its secondary bucket in the `kicked`
/// list of its primary bucket. Values must all have been placed.
pub fn fill_kicked(values: &[CuckooValue], buckets: &mut [Bucket]) {
    for value in values {
        let in_primary = lookup_value_in_buckets(buckets, value)
            .expect("placed value not found in either candidate bucket");
        if !in_primary {
            buckets[value.primary_bucket].kicked.push(*value);
        }
    }
}

/// A slot's stored fingerprint: `num_bits` significant bits (prefix or
/// suffix of the 64-bit hash, per the bucket's selector), or inactive for
/// an empty slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fingerprint {
    pub active: bool,
    pub num_bits: usize,
    pub fingerprint: u64,
}

impl Fingerprint {
    pub const INACTIVE: Fingerprint = Fingerprint {
        active: false,
        num_bits: 0,
        fingerprint: 0,
    };
}

/// Mask with the lowest `num_bits` set.
#[inline]
pub fn fingerprint_suffix_mask(num_bits: usize) -> u64 {
    if num_bits >= 64 {
        u64::MAX
    } else {
        (1u64 << num_bits) - 1
    }
}

/// The lowest `num_bits` bits of `fingerprint`.
#[inline]
pub fn fingerprint_suffix(fingerprint: u64, num_bits: usize) -> u64 {
    fingerprint & fingerprint_suffix_mask(num_bits)
}

/// The highest `num_bits` bits of `fingerprint`, right-aligned.
#[inline]
pub fn fingerprint_prefix(fingerprint: u64, num_bits: usize) -> u64 {
    if num_bits == 0 {
        return 0;
    }
    if num_bits >= 64 {
        fingerprint
    } else {
        fingerprint >> (64 - num_bits)
    }
}

/// Minimum number of bits making `fingerprints` pairwise distinct, using
/// prefix or suffix bits as requested.
pub fn min_collision_free_fingerprint_length(
    fingerprints: &[u64],
    use_prefix_bits: bool,
) -> Result<usize> {
    if fingerprints.len() < 2 {
        return Ok(0);
    }
    for num_bits in 1..=64usize {
        let mut unique = AHashSet::with_capacity(fingerprints.len());
        let collision_free = fingerprints.iter().all(|&fp| {
            let bits = if use_prefix_bits {
                fingerprint_prefix(fp, num_bits)
            } else {
                fingerprint_suffix(fp, num_bits)
            };
            unique.insert(bits)
        });
        if collision_free {
            return Ok(num_bits);
        }
    }
    Err(Error::FingerprintOverflow)
}

/// Tries both suffix and prefix bits and returns the smaller choice as
/// `(num_bits, use_prefix_bits)`. Ties prefer suffix bits.
pub fn min_collision_free_fingerprint_prefix_or_suffix(
    fingerprints: &[u64],
) -> Result<(usize, bool)> {
    let num_suffix_bits = min_collision_free_fingerprint_length(fingerprints, false)?;
    if num_suffix_bits <= 1 {
        return Ok((num_suffix_bits, false));
    }
    let num_prefix_bits = min_collision_free_fingerprint_length(fingerprints, true)?;
    if num_suffix_bits <= num_prefix_bits {
        Ok((num_suffix_bits, false))
    } else {
        Ok((num_prefix_bits, true))
    }
}

/// True if every bucket's active slots share one fingerprint length.
pub fn buckets_have_uniform_fingerprint_lengths(
    fingerprints: &[Fingerprint],
    slots_per_bucket: usize,
) -> bool {
    fingerprints.chunks(slots_per_bucket).all(|bucket| {
        let mut lengths = bucket.iter().filter(|fp| fp.active).map(|fp| fp.num_bits);
        match lengths.next() {
            Some(first) => lengths.all(|len| len == first),
            None => true,
        }
    })
}

/// Derives the empty-buckets bitmap (bucket granularity) from the
/// empty-slots bitmap (slot granularity).
pub fn empty_buckets_bitmap(empty_slots_bitmap: &Bitmap, slots_per_bucket: usize) -> Bitmap {
    debug_assert_eq!(empty_slots_bitmap.len() % slots_per_bucket, 0);
    let num_buckets = empty_slots_bitmap.len() / slots_per_bucket;
    let mut bitmap = Bitmap::new(num_buckets);
    for bucket in 0..num_buckets {
        let first_slot = bucket * slots_per_bucket;
        let empty =
            (first_slot..first_slot + slots_per_bucket).all(|slot| empty_slots_bitmap.get(slot));
        if empty {
            bitmap.set(bucket, true);
        }
    }
    bitmap
}
