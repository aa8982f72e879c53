//! Cuckoo placement by kicking.
//!
//! Values are inserted into their primary bucket, falling back to the
//! secondary; when both are full, a victim is evicted and re-tried in its
//! alternative bucket, up to [`DEFAULT_MAX_KICKS`] evictions per insert.
//!
//! Skewed kicking biases victim selection towards values currently
//! residing in their secondary bucket. That raises the eventual
//! primary-placement rate, which shrinks fingerprints (kicked values
//! lengthen their primary bucket's collision set) at the price of build
//! time and a higher chance of placement failure.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{Bucket, CuckooValue};
use crate::error::{Error, Result};

/// Maximum evictions per inserted value before the build gives up.
pub const DEFAULT_MAX_KICKS: usize = 50_000;

/// Seed of the per-build victim-selection RNG.
const KICKER_RNG_SEED: u64 = 42;

// Skew factors obtained empirically on a random set of 1M items. Wider
// buckets need more skew: uniform kicking already lands most values in
// their primary bucket only at very high factors.
pub const KICK_SKEW_FACTOR_1_SLOT: f64 = 1.1;
pub const KICK_SKEW_FACTOR_2_SLOTS: f64 = 16.0;
pub const KICK_SKEW_FACTOR_4_SLOTS: f64 = 128.0;
pub const KICK_SKEW_FACTOR_8_SLOTS: f64 = 1024.0;

/// The empirical skew factor for a supported bucket width.
pub fn kick_skew_factor(slots_per_bucket: usize) -> Result<f64> {
    match slots_per_bucket {
        1 => Ok(KICK_SKEW_FACTOR_1_SLOT),
        2 => Ok(KICK_SKEW_FACTOR_2_SLOTS),
        4 => Ok(KICK_SKEW_FACTOR_4_SLOTS),
        8 => Ok(KICK_SKEW_FACTOR_8_SLOTS),
        n => Err(Error::config(format!(
            "no kick skew factor for {n} slots per bucket"
        ))),
    }
}

/// Distributes values to buckets with the kicking algorithm.
///
/// The RNG is seeded once per kicker, so identical inputs yield identical
/// placements.
pub struct Kicker<'a> {
    rng: ChaCha8Rng,
    slots_per_bucket: usize,
    buckets: &'a mut [Bucket],
    skew_kicking: bool,
    kick_skew_factor: f64,
    max_kicks: usize,

    max_kicks_observed: usize,
    successful_inserts: usize,
}

impl<'a> Kicker<'a> {
    pub fn new(
        slots_per_bucket: usize,
        buckets: &'a mut [Bucket],
        skew_kicking: bool,
    ) -> Result<Self> {
        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(KICKER_RNG_SEED),
            slots_per_bucket,
            buckets,
            skew_kicking,
            kick_skew_factor: kick_skew_factor(slots_per_bucket)?,
            max_kicks: DEFAULT_MAX_KICKS,
            max_kicks_observed: 0,
            successful_inserts: 0,
        })
    }

    /// Inserts all `values`; false if any value could not be placed within
    /// the kick budget.
    pub fn insert_values(&mut self, values: &[CuckooValue]) -> bool {
        for value in values {
            if !self.insert_value_with_kicking(*value) {
                return false;
            }
            self.successful_inserts += 1;
        }
        true
    }

    /// Highest number of kicks any single insert needed.
    pub fn max_kicks_observed(&self) -> usize {
        self.max_kicks_observed
    }

    pub fn successful_inserts(&self) -> usize {
        self.successful_inserts
    }

    /// Occupied share of all slots after the inserts so far.
    pub fn load_factor(&self) -> f64 {
        self.successful_inserts as f64 / (self.buckets.len() * self.slots_per_bucket) as f64
    }

    fn insert_value_with_kicking(&mut self, value: CuckooValue) -> bool {
        if self.buckets[value.primary_bucket].insert_value(value) {
            return true;
        }
        if self.buckets[value.secondary_bucket].insert_value(value) {
            return true;
        }

        // Both buckets are full; start evicting.
        let mut in_flight = value;
        for num_kicks in 0..=self.max_kicks {
            if self.insert_value_with_kick(&mut in_flight) {
                self.max_kicks_observed = self.max_kicks_observed.max(num_kicks);
                return true;
            }
        }
        false
    }

    /// Performs a single kick. True if the evicted victim fit into its
    /// alternative bucket; otherwise the victim becomes the new in-flight
    /// value.
    fn insert_value_with_kick(&mut self, value: &mut CuckooValue) -> bool {
        let (victim, victim_bucket_idx) = self.swap_with_random_value(*value);

        let alternative_bucket_idx = if victim_bucket_idx == victim.primary_bucket {
            victim.secondary_bucket
        } else {
            victim.primary_bucket
        };
        if self.buckets[alternative_bucket_idx].insert_value(victim) {
            return true;
        }
        *value = victim;
        false
    }

    /// Swaps `value` with a victim inside its primary or secondary bucket.
    /// Both buckets must be full.
    fn swap_with_random_value(&mut self, value: CuckooValue) -> (CuckooValue, usize) {
        debug_assert!(self.buckets[value.primary_bucket].is_full());
        debug_assert!(self.buckets[value.secondary_bucket].is_full());

        if !self.skew_kicking {
            let victim_bucket_idx = if self.rng.gen_bool(0.5) {
                value.primary_bucket
            } else {
                value.secondary_bucket
            };
            let victim_idx = self.rng.gen_range(0..self.slots_per_bucket);
            return (
                self.swap_with_value(victim_bucket_idx, victim_idx, value),
                victim_bucket_idx,
            );
        }

        let num_slots_both_buckets = 2 * self.slots_per_bucket;
        let num_in_secondary = self.num_secondary_items(value.primary_bucket)
            + self.num_secondary_items(value.secondary_bucket);

        if num_in_secondary == 0 || num_in_secondary == num_slots_both_buckets {
            // Skew is undefined; kick any item uniformly.
            let victim_bucket_idx = if self.rng.gen_bool(0.5) {
                value.primary_bucket
            } else {
                value.secondary_bucket
            };
            let victim_idx = self.rng.gen_range(0..self.slots_per_bucket);
            return (
                self.swap_with_value(victim_bucket_idx, victim_idx, value),
                victim_bucket_idx,
            );
        }
        let num_in_primary = num_slots_both_buckets - num_in_secondary;

        // Weigh the two victim sets by their sizes, so that with a skew
        // factor of 1.0 every slot is equally likely, then apply the skew
        // factor on top. The coin first picks the set, the victim is then
        // uniform within it.
        let secondary_weight_factor =
            self.kick_skew_factor * num_in_secondary as f64 / num_in_primary as f64;
        let weighted_probability = secondary_weight_factor / (secondary_weight_factor + 1.0);
        debug_assert!(weighted_probability > 0.0 && weighted_probability < 1.0);

        let kick_secondary = self.rng.gen_bool(weighted_probability);
        let num_potential_victims = if kick_secondary {
            num_in_secondary
        } else {
            num_in_primary
        };
        let victim_idx = self.rng.gen_range(0..num_potential_victims);

        let (victim_bucket_idx, idx_within_bucket) = self.find_victim(
            victim_idx,
            value.primary_bucket,
            value.secondary_bucket,
            kick_secondary,
        );
        (
            self.swap_with_value(victim_bucket_idx, idx_within_bucket, value),
            victim_bucket_idx,
        )
    }

    fn swap_with_value(
        &mut self,
        bucket_idx: usize,
        victim_idx: usize,
        value: CuckooValue,
    ) -> CuckooValue {
        std::mem::replace(&mut self.buckets[bucket_idx].slots[victim_idx], value)
    }

    /// Number of values in bucket `bucket_idx` residing in their secondary
    /// bucket.
    fn num_secondary_items(&self, bucket_idx: usize) -> usize {
        self.buckets[bucket_idx]
            .slots
            .iter()
            .filter(|value| value.secondary_bucket == bucket_idx)
            .count()
    }

    /// Locates the `victim_idx`-th member of the primary or secondary
    /// victim set across the two candidate buckets.
    fn find_victim(
        &self,
        victim_idx: usize,
        primary_bucket_idx: usize,
        secondary_bucket_idx: usize,
        kick_secondary: bool,
    ) -> (usize, usize) {
        let mut current = 0;
        for &bucket_idx in &[primary_bucket_idx, secondary_bucket_idx] {
            for (slot, value) in self.buckets[bucket_idx].slots.iter().enumerate() {
                let home = if kick_secondary {
                    value.secondary_bucket
                } else {
                    value.primary_bucket
                };
                if home == bucket_idx {
                    if current == victim_idx {
                        return (bucket_idx, slot);
                    }
                    current += 1;
                }
            }
        }
        unreachable!("no victim with index {victim_idx}");
    }
}
