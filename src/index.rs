//! The Cuckoo index: build pipeline, lookup API and serialization.
//!
//! Build data flow: column + stripe size → per-value stripe bitmaps →
//! distinct value set → cuckoo placement → per-bucket fingerprint sizing →
//! fingerprint store + concatenated RLE stripe bitmap → serialized blob.
//!
//! Lookup data flow: value → (primary bucket, secondary bucket, 64-bit
//! fingerprint) → probe the up-to-2K slots → on a fingerprint match, read
//! the matching slot's stripe bitmap out of the RLE stream.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bitmap::Bitmap;
use crate::codec::{ByteBuffer, ByteReader};
use crate::column::Column;
use crate::cuckoo::kicker::Kicker;
use crate::cuckoo::{
    fill_kicked, fingerprint_prefix, fingerprint_suffix,
    min_collision_free_fingerprint_length, min_collision_free_fingerprint_prefix_or_suffix,
    min_num_buckets, Bucket, CuckooHasher, CuckooValue, Fingerprint,
};
use crate::error::{Error, Result};
use crate::rle::RleBitmap;
use crate::store::FingerprintStore;

/// When placement fails, grow the bucket count by this factor and retry.
const NUM_BUCKETS_GROW_FACTOR: f64 = 1.01;

/// Cap on placement attempts before the build reports exhaustion.
const MAX_BUILD_RETRIES: usize = 64;

/// An index structure answering stripe-membership questions for a column.
///
/// Implementations are immutable after construction and safe to share
/// across threads; lookups never fail.
pub trait IndexStructure {
    /// True if stripe `stripe_id` may contain `value` (no false
    /// negatives).
    fn stripe_contains(&self, stripe_id: usize, value: i32) -> bool;

    /// Bitmap of possibly qualifying stripes for `value`, probing
    /// `num_stripes` stripes.
    fn get_qualifying_stripes(&self, value: i32, num_stripes: usize) -> Bitmap {
        let mut result = Bitmap::new(num_stripes);
        for stripe_id in 0..num_stripes {
            if self.stripe_contains(stripe_id, value) {
                result.set(stripe_id, true);
            }
        }
        result
    }

    fn name(&self) -> &str;

    /// In-memory size of the serialized index.
    fn byte_size(&self) -> usize;

    /// Size of the serialized index after generic byte compression.
    fn compressed_byte_size(&self) -> usize;
}

/// Creates index structures for columns; one factory per configuration.
pub trait IndexFactory {
    fn create(
        &self,
        column: &Column,
        num_rows_per_stripe: usize,
    ) -> Result<Box<dyn IndexStructure>>;

    fn index_name(&self) -> String;
}

/// How values are distributed over their two candidate buckets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CuckooAlgorithm {
    /// Classic kicking with uniform victim selection.
    Kicking,
    /// Victim selection biased towards values in their secondary bucket,
    /// which raises the primary-placement rate and shrinks fingerprints.
    SkewedKicking,
}

/// Flat configuration record for [`CuckooIndex`] builds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexOptions {
    pub cuckoo_alg: CuckooAlgorithm,
    /// Target share of occupied slots, in (0, 1).
    pub max_load_factor: f64,
    /// Target false-positive fraction per lookup, in (0, 1].
    pub scan_rate: f64,
    /// Bucket width; one of 1, 2, 4 or 8.
    pub slots_per_bucket: usize,
    /// Choose prefix vs. suffix fingerprint bits per bucket.
    pub prefix_bits_optimization: bool,
    /// Encode the store's bitmaps as RLE instead of dense.
    pub rle_block_bitmaps: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        IndexOptions {
            cuckoo_alg: CuckooAlgorithm::SkewedKicking,
            max_load_factor: crate::cuckoo::MAX_LOAD_FACTOR_1_SLOT,
            scan_rate: 0.01,
            slots_per_bucket: 1,
            prefix_bits_optimization: false,
            rle_block_bitmaps: false,
        }
    }
}

impl IndexOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.max_load_factor > 0.0 && self.max_load_factor < 1.0) {
            return Err(Error::config(format!(
                "max_load_factor {} not in (0, 1)",
                self.max_load_factor
            )));
        }
        if !(self.scan_rate > 0.0 && self.scan_rate <= 1.0) {
            return Err(Error::config(format!(
                "scan_rate {} not in (0, 1]",
                self.scan_rate
            )));
        }
        if !matches!(self.slots_per_bucket, 1 | 2 | 4 | 8) {
            return Err(Error::config(format!(
                "unsupported slots_per_bucket {}",
                self.slots_per_bucket
            )));
        }
        Ok(())
    }
}

/// Statistics reported by a successful build.
#[derive(Clone, Debug, Default, Serialize)]
pub struct BuildStats {
    pub num_values: usize,
    pub num_stripes: usize,
    pub num_buckets: usize,
    pub slots_per_bucket: usize,
    pub load_factor: f64,
    pub max_kicks_observed: usize,
    pub successful_inserts: usize,
    /// Placement attempts, counting the successful one.
    pub num_attempts: usize,
    /// Per real block: fingerprint length and bucket count.
    pub blocks: Vec<(usize, usize)>,
}

/// The assembled index. Immutable; lookups are pure.
pub struct CuckooIndex {
    name: String,
    num_buckets: usize,
    slots_per_bucket: usize,
    num_stripes: usize,
    hasher: CuckooHasher,
    fingerprint_store: FingerprintStore,
    /// Per bucket: whether fingerprints store prefix instead of suffix
    /// bits. Absent when the optimization is disabled.
    use_prefix_bits_bitmap: Option<Bitmap>,
    /// Stripe bitmaps of all active slots, concatenated in slot order.
    global_slot_bitmap: RleBitmap,
    byte_size: usize,
    compressed_byte_size: usize,
}

impl CuckooIndex {
    /// Builds an index over the complete stripes of `column`. A trailing
    /// partial stripe is dropped.
    pub fn build(
        column: &Column,
        num_rows_per_stripe: usize,
        options: &IndexOptions,
    ) -> Result<(CuckooIndex, BuildStats)> {
        options.validate()?;
        if num_rows_per_stripe == 0 {
            return Err(Error::config("num_rows_per_stripe must be positive"));
        }
        let num_stripes = column.num_rows() / num_rows_per_stripe;
        if num_stripes == 0 {
            return Err(Error::config(format!(
                "column '{}' has {} rows, shorter than one stripe of {num_rows_per_stripe}",
                column.name(),
                column.num_rows()
            )));
        }

        let mut value_to_bitmap = value_to_stripe_bitmaps(column, num_rows_per_stripe);
        // The distinct set of the *indexed* rows; may be smaller than the
        // column's if rows were dropped at the end. Sorted so placement is
        // insertion-order deterministic.
        let mut distinct_values: Vec<i32> = value_to_bitmap.keys().copied().collect();
        distinct_values.sort_unstable();

        let hasher = CuckooHasher::new();
        let mut num_buckets = min_num_buckets(
            distinct_values.len(),
            options.slots_per_bucket,
            options.max_load_factor,
        )
        .max(1);
        debug!(
            column = column.name(),
            num_values = distinct_values.len(),
            num_stripes,
            num_buckets,
            "building cuckoo index"
        );

        let skew = options.cuckoo_alg == CuckooAlgorithm::SkewedKicking;
        let mut stats = BuildStats {
            num_values: distinct_values.len(),
            num_stripes,
            slots_per_bucket: options.slots_per_bucket,
            ..BuildStats::default()
        };
        let (mut buckets, values) = loop {
            stats.num_attempts += 1;
            if stats.num_attempts > MAX_BUILD_RETRIES {
                return Err(Error::BuildExhaustion {
                    attempts: stats.num_attempts - 1,
                    num_values: distinct_values.len(),
                    num_buckets,
                });
            }
            let values: Vec<CuckooValue> = distinct_values
                .iter()
                .map(|&v| hasher.cuckoo_value(v, num_buckets))
                .collect();
            let mut buckets: Vec<Bucket> = (0..num_buckets)
                .map(|_| Bucket::new(options.slots_per_bucket))
                .collect();
            let mut kicker = Kicker::new(options.slots_per_bucket, &mut buckets, skew)?;
            if kicker.insert_values(&values) {
                stats.max_kicks_observed = kicker.max_kicks_observed();
                stats.successful_inserts = kicker.successful_inserts();
                stats.load_factor = kicker.load_factor();
                break (buckets, values);
            }
            let grown = (num_buckets as f64 * NUM_BUCKETS_GROW_FACTOR).ceil() as usize;
            num_buckets = grown.max(num_buckets + 1);
            debug!(num_buckets, attempt = stats.num_attempts, "placement failed, growing");
        };
        stats.num_buckets = num_buckets;
        fill_kicked(&values, &mut buckets);

        let (slot_fingerprints, use_prefix_bits_bitmap, slot_bitmaps) = create_slots(
            options.scan_rate,
            options.slots_per_bucket,
            &buckets,
            &mut value_to_bitmap,
            options.prefix_bits_optimization,
        )?;

        let fingerprint_store = FingerprintStore::new(
            &slot_fingerprints,
            options.slots_per_bucket,
            options.rle_block_bitmaps,
        );
        stats.blocks = fingerprint_store.block_stats();

        let global_slot_bitmap = RleBitmap::build(&Bitmap::concat(&slot_bitmaps));

        let mut index = CuckooIndex {
            name: index_name(options),
            num_buckets,
            slots_per_bucket: options.slots_per_bucket,
            num_stripes,
            hasher,
            fingerprint_store,
            use_prefix_bits_bitmap,
            global_slot_bitmap,
            byte_size: 0,
            compressed_byte_size: 0,
        };
        let encoded = index.encode();
        index.byte_size = encoded.len();
        index.compressed_byte_size = compress(&encoded)?.len();
        info!(
            name = %index.name,
            byte_size = index.byte_size,
            compressed_byte_size = index.compressed_byte_size,
            max_kicks = stats.max_kicks_observed,
            attempts = stats.num_attempts,
            "built cuckoo index"
        );
        Ok((index, stats))
    }

    /// Serializes the index: length-prefixed fingerprint store, the
    /// prefix-bits flag byte (with the bitmap if set), and the RLE stripe
    /// bitmap.
    pub fn encode(&self) -> Vec<u8> {
        let mut result = ByteBuffer::new();
        result.put_string(&self.fingerprint_store.encode(false));
        result.put_u8(u8::from(self.use_prefix_bits_bitmap.is_some()));
        if let Some(bitmap) = &self.use_prefix_bits_bitmap {
            result.put_string(RleBitmap::build(bitmap).data());
        }
        result.put_string(self.global_slot_bitmap.data());
        result.into_bytes()
    }

    /// Reverses [`CuckooIndex::encode`]. `options` must carry the
    /// `slots_per_bucket` and `rle_block_bitmaps` used at build time; the
    /// byte layout does not record them.
    pub fn decode(data: &[u8], options: &IndexOptions) -> Result<CuckooIndex> {
        options.validate()?;
        let mut reader = ByteReader::new(data);
        let fingerprint_store = FingerprintStore::decode(
            reader.get_string()?,
            options.slots_per_bucket,
            options.rle_block_bitmaps,
        )?;
        let num_buckets = fingerprint_store.num_slots() / options.slots_per_bucket;

        let use_prefix_bits_bitmap = if reader.get_u8()? != 0 {
            let rle = RleBitmap::from_bytes(reader.get_string()?.to_vec())?;
            if rle.len() != num_buckets {
                return Err(Error::format(format!(
                    "prefix-bits bitmap has {} bits for {num_buckets} buckets",
                    rle.len()
                )));
            }
            Some(rle.extract(0, num_buckets))
        } else {
            None
        };

        let global_slot_bitmap = RleBitmap::from_bytes(reader.get_string()?.to_vec())?;
        let active_slots = fingerprint_store.num_stored_fingerprints();
        let num_stripes = if active_slots == 0 {
            0
        } else {
            let len = global_slot_bitmap.len();
            if len % active_slots != 0 {
                return Err(Error::format(format!(
                    "stripe bitmap of {len} bits does not divide into {active_slots} slots"
                )));
            }
            len / active_slots
        };

        let mut index = CuckooIndex {
            name: index_name(options),
            num_buckets,
            slots_per_bucket: options.slots_per_bucket,
            num_stripes,
            hasher: CuckooHasher::new(),
            fingerprint_store,
            use_prefix_bits_bitmap,
            global_slot_bitmap,
            byte_size: data.len(),
            compressed_byte_size: 0,
        };
        index.compressed_byte_size = compress(data)?.len();
        Ok(index)
    }

    pub fn num_stripes(&self) -> usize {
        self.num_stripes
    }

    /// Number of occupied slots.
    pub fn active_slots(&self) -> usize {
        self.fingerprint_store.num_stored_fingerprints()
    }

    pub fn fingerprint_store(&self) -> &FingerprintStore {
        &self.fingerprint_store
    }

    /// Finds the slot whose fingerprint matches `value`, probing the
    /// primary bucket first.
    fn find_candidate_slot(&self, value: i32) -> Option<usize> {
        let cuckoo_value = self.hasher.cuckoo_value(value, self.num_buckets);
        self.bucket_contains(cuckoo_value.primary_bucket, cuckoo_value.fingerprint)
            .or_else(|| {
                self.bucket_contains(cuckoo_value.secondary_bucket, cuckoo_value.fingerprint)
            })
    }

    /// Probes all slots of `bucket` for `fingerprint`; the matching slot
    /// index, if any.
    fn bucket_contains(&self, bucket: usize, fingerprint: u64) -> Option<usize> {
        let use_prefix_bits = self
            .use_prefix_bits_bitmap
            .as_ref()
            .is_some_and(|bitmap| bitmap.get(bucket));
        let first_slot = bucket * self.slots_per_bucket;
        for slot in first_slot..first_slot + self.slots_per_bucket {
            let stored = self.fingerprint_store.get_fingerprint(slot);
            if !stored.active {
                continue;
            }
            let probe_bits = if use_prefix_bits {
                fingerprint_prefix(fingerprint, stored.num_bits)
            } else {
                fingerprint_suffix(fingerprint, stored.num_bits)
            };
            if stored.fingerprint == probe_bits {
                return Some(slot);
            }
        }
        None
    }

    /// Offset of `slot`'s stripe bitmap within the concatenated stream:
    /// empty slots contribute no bitmap, so only active slots before
    /// `slot` count.
    fn active_slot_rank(&self, slot: usize) -> usize {
        slot - self.fingerprint_store.empty_slots_bitmap().rank(slot)
    }
}

impl IndexStructure for CuckooIndex {
    fn stripe_contains(&self, stripe_id: usize, value: i32) -> bool {
        assert!(
            stripe_id < self.num_stripes,
            "stripe {stripe_id} out of range ({})",
            self.num_stripes
        );
        match self.find_candidate_slot(value) {
            None => false,
            Some(slot) => {
                let offset = self.num_stripes * self.active_slot_rank(slot) + stripe_id;
                self.global_slot_bitmap.get(offset)
            }
        }
    }

    fn get_qualifying_stripes(&self, value: i32, num_stripes: usize) -> Bitmap {
        debug_assert_eq!(num_stripes, self.num_stripes);
        match self.find_candidate_slot(value) {
            None => Bitmap::new(num_stripes),
            Some(slot) => self
                .global_slot_bitmap
                .extract(self.num_stripes * self.active_slot_rank(slot), self.num_stripes),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn byte_size(&self) -> usize {
        self.byte_size
    }

    fn compressed_byte_size(&self) -> usize {
        self.compressed_byte_size
    }
}

/// Factory wiring a fixed [`IndexOptions`] into the [`IndexFactory`]
/// interface.
pub struct CuckooIndexFactory {
    options: IndexOptions,
}

impl CuckooIndexFactory {
    pub fn new(options: IndexOptions) -> Result<CuckooIndexFactory> {
        options.validate()?;
        Ok(CuckooIndexFactory { options })
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }
}

impl IndexFactory for CuckooIndexFactory {
    fn create(
        &self,
        column: &Column,
        num_rows_per_stripe: usize,
    ) -> Result<Box<dyn IndexStructure>> {
        let (index, _stats) = CuckooIndex::build(column, num_rows_per_stripe, &self.options)?;
        Ok(Box::new(index))
    }

    fn index_name(&self) -> String {
        index_name(&self.options)
    }
}

fn index_name(options: &IndexOptions) -> String {
    format!(
        "CuckooIndex:{:?}:{}:{}",
        options.cuckoo_alg, options.max_load_factor, options.scan_rate
    )
}

/// Compresses `bytes` with the generic byte compressor used for the
/// `compressed_byte_size` statistic.
pub fn compress(bytes: &[u8]) -> Result<Vec<u8>> {
    Ok(zstd::encode_all(bytes, 0)?)
}

/// Maps every value of the indexed stripes to its stripe bitmap. Rows past
/// the last complete stripe are ignored.
fn value_to_stripe_bitmaps(
    column: &Column,
    num_rows_per_stripe: usize,
) -> AHashMap<i32, Bitmap> {
    let num_stripes = column.num_rows() / num_rows_per_stripe;
    let num_rows = num_stripes * num_rows_per_stripe;
    let mut bitmaps: AHashMap<i32, Bitmap> = AHashMap::new();
    for row in 0..num_rows {
        let value = column.value(row);
        bitmaps
            .entry(value)
            .or_insert_with(|| Bitmap::new(num_stripes))
            .set(row / num_rows_per_stripe, true);
    }
    bitmaps
}

/// Chooses each bucket's fingerprint length, fills the per-slot
/// fingerprints and moves the stripe bitmaps into slot order.
///
/// The length is first made collision-free within the bucket's possibly
/// colliding set (residents plus values kicked from here, which share the
/// primary hash), then raised until the bucket's expected scan rate drops
/// under the target.
fn create_slots(
    scan_rate: f64,
    slots_per_bucket: usize,
    buckets: &[Bucket],
    value_to_bitmap: &mut AHashMap<i32, Bitmap>,
    prefix_bits_optimization: bool,
) -> Result<(Vec<Fingerprint>, Option<Bitmap>, Vec<Option<Bitmap>>)> {
    let num_buckets = buckets.len();
    let num_slots = num_buckets * slots_per_bucket;
    let num_empty_buckets = buckets.iter().filter(|b| b.slots.is_empty()).count();
    // Empty buckets produce no false positives; scale the target
    // accordingly.
    let bucket_density = 1.0 - num_empty_buckets as f64 / num_buckets as f64;

    let mut slot_fingerprints = vec![Fingerprint::INACTIVE; num_slots];
    let mut use_prefix_bits_bitmap =
        prefix_bits_optimization.then(|| Bitmap::new(num_buckets));
    let mut slot_bitmaps: Vec<Option<Bitmap>> = Vec::new();
    slot_bitmaps.resize_with(num_slots, || None);

    for (bucket_id, bucket) in buckets.iter().enumerate() {
        let possibly_colliding: Vec<u64> = bucket
            .slots
            .iter()
            .chain(bucket.kicked.iter())
            .map(|value| value.fingerprint)
            .collect();

        let (mut num_bits, use_prefix_bits) = if prefix_bits_optimization {
            let (num_bits, use_prefix) =
                min_collision_free_fingerprint_prefix_or_suffix(&possibly_colliding)?;
            use_prefix_bits_bitmap
                .as_mut()
                .expect("selector bitmap present")
                .set(bucket_id, use_prefix);
            (num_bits, use_prefix)
        } else {
            (
                min_collision_free_fingerprint_length(&possibly_colliding, false)?,
                false,
            )
        };

        // Raise the length until the bucket meets the scan-rate target.
        // The bucket's rate is the residents' average local rate (a lookup
        // matches at most one fingerprint), doubled because both candidate
        // buckets are probed.
        if !bucket.slots.is_empty() {
            loop {
                let fp_prob = 0.5f64.powi(num_bits as i32);
                let sum_scan_rate: f64 = bucket
                    .slots
                    .iter()
                    .map(|value| {
                        let bitmap = &value_to_bitmap[&value.orig_value];
                        fp_prob * bitmap.count_ones() as f64 / bitmap.len() as f64
                    })
                    .sum();
                let actual_scan_rate =
                    sum_scan_rate / bucket.slots.len() as f64 * bucket_density * 2.0;
                if actual_scan_rate <= scan_rate {
                    break;
                }
                if num_bits == 64 {
                    return Err(Error::FingerprintOverflow);
                }
                num_bits += 1;
            }
        }

        for i in 0..slots_per_bucket {
            let slot = bucket_id * slots_per_bucket + i;
            match bucket.slots.get(i) {
                None => slot_fingerprints[slot] = Fingerprint::INACTIVE,
                Some(value) => {
                    let bits = if use_prefix_bits {
                        fingerprint_prefix(value.fingerprint, num_bits)
                    } else {
                        fingerprint_suffix(value.fingerprint, num_bits)
                    };
                    slot_fingerprints[slot] = Fingerprint {
                        active: true,
                        num_bits,
                        fingerprint: bits,
                    };
                    slot_bitmaps[slot] = Some(
                        value_to_bitmap
                            .remove(&value.orig_value)
                            .expect("stripe bitmap moved twice"),
                    );
                }
            }
        }
    }
    Ok((slot_fingerprints, use_prefix_bits_bitmap, slot_bitmaps))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_column(num_rows: usize, num_values: usize) -> Column {
        assert!(num_values > 0 && num_rows % num_values == 0);
        let factor = num_rows / num_values;
        Column::int_column(
            "int-column",
            (0..num_rows).map(|i| (i / factor) as i32).collect(),
        )
    }

    fn kicking_options(slots_per_bucket: usize, scan_rate: f64) -> IndexOptions {
        IndexOptions {
            cuckoo_alg: CuckooAlgorithm::Kicking,
            max_load_factor: crate::cuckoo::default_max_load_factor(slots_per_bucket).unwrap(),
            scan_rate,
            slots_per_bucket,
            prefix_bits_optimization: false,
            rle_block_bitmaps: false,
        }
    }

    #[test]
    fn rejects_invalid_options() {
        let mut options = IndexOptions::default();
        options.max_load_factor = 1.5;
        assert!(matches!(
            CuckooIndex::build(&fill_column(30, 3), 3, &options),
            Err(Error::InvalidConfig(_))
        ));
        let mut options = IndexOptions::default();
        options.slots_per_bucket = 3;
        assert!(options.validate().is_err());
        let mut options = IndexOptions::default();
        options.scan_rate = 0.0;
        assert!(options.validate().is_err());
    }

    #[test]
    fn rejects_column_shorter_than_a_stripe() {
        let column = fill_column(4, 4);
        assert!(matches!(
            CuckooIndex::build(&column, 8, &IndexOptions::default()),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn two_stripe_column() {
        let column = Column::int_column("c", vec![1, 1, 2, 2]);
        let (index, stats) = CuckooIndex::build(&column, 2, &kicking_options(2, 0.1)).unwrap();
        assert_eq!(stats.num_stripes, 2);
        assert!(index.stripe_contains(0, 1));
        assert!(index.stripe_contains(1, 2));
        assert!(!index.stripe_contains(0, 2));
        assert!(!index.stripe_contains(1, 1));
    }

    #[test]
    fn qualifying_stripes_match_stripe_contains() {
        let column = fill_column(300, 30);
        let (index, _) = CuckooIndex::build(&column, 3, &kicking_options(2, 0.05)).unwrap();
        for value in [0, 7, 29, 1000] {
            let stripes = index.get_qualifying_stripes(value, 100);
            for stripe_id in 0..100 {
                assert_eq!(stripes.get(stripe_id), index.stripe_contains(stripe_id, value));
            }
        }
    }

    #[test]
    fn factory_builds_boxed_index() {
        let factory = CuckooIndexFactory::new(kicking_options(2, 0.05)).unwrap();
        let column = fill_column(300, 30);
        let index = factory.create(&column, 3).unwrap();
        assert!(index.name().starts_with("CuckooIndex:Kicking"));
        assert!(index.byte_size() > 0);
        assert!(index.compressed_byte_size() > 0);
        assert!(index.stripe_contains(0, 0));
    }

    #[test]
    fn last_row_dropped() {
        // With 4 distinct rows and 3 rows per stripe, the trailing row is
        // not indexed and only 3 slots become active.
        let column = fill_column(4, 4);
        let (index, stats) = CuckooIndex::build(&column, 3, &kicking_options(2, 0.1)).unwrap();
        assert_eq!(index.active_slots(), 3);
        assert_eq!(stats.num_values, 3);
    }
}
