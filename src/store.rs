//! Variable-length fingerprint storage.
//!
//! Slots are grouped by fingerprint length into blocks, each block storing
//! its fingerprints bit-packed at a fixed width so individual entries stay
//! randomly accessible without decompression.
//!
//! Per block a bitmap records which buckets it holds. Bitmaps are
//! *compacted*: block `j` only addresses buckets not claimed by blocks
//! `0..j`, so bit `k` means the k-th still-unclaimed bucket. A virtual
//! "empty buckets" block comes first (derived from the empty-slots bitmap,
//! never serialized); the real blocks follow in order of decreasing
//! cardinality, which keeps the larger bitmaps in front where they shrink
//! the ones after them the most.
//!
//! Example for fingerprints {1, 101, 01, 0, 001}, one slot per bucket:
//!
//! ```text
//! block 0: 101 001   -- bit-packed 3-bit fingerprints no. 1 and 4
//! block 1: 1 0       -- 1-bit fingerprints no. 0 and 3
//! block 2: 01        -- the remaining 2-bit fingerprint
//!
//! bitmap 0: 01001    -- buckets 1 and 4 belong to block 0
//! bitmap 1: 101      -- of the 3 remaining buckets, the 1st and 3rd
//! bitmap 2: 1        -- the single remaining bucket
//! ```

use std::collections::BTreeMap;

use crate::bitmap::Bitmap;
use crate::bitpack::{
    self, bytes_required, max_bit_width64, store_bit_packed_u64, BitPackedReader,
};
use crate::codec::{ByteBuffer, ByteReader};
use crate::cuckoo::{
    buckets_have_uniform_fingerprint_lengths, empty_buckets_bitmap, fingerprint_suffix,
    Fingerprint,
};
use crate::error::{Error, Result};
use crate::rle::RleBitmap;

/// Fingerprints of one fixed length, bit-packed.
///
/// Layout: `varint num_bits`, `varint bit_width` (the packed width, which
/// may be below `num_bits`), the packed fingerprints, 8 slop bytes.
pub struct Block {
    num_bits: usize,
    num_fingerprints: usize,
    bit_width: u32,
    fingerprints_pos: usize,
    data: Vec<u8>,
}

impl Block {
    pub fn new(num_bits: usize, fingerprints: &[u64]) -> Block {
        let bit_width = max_bit_width64(fingerprints);
        assert!(
            bit_width as usize <= num_bits,
            "fingerprints use {bit_width} bits, block holds {num_bits}"
        );
        let mut result = ByteBuffer::new();
        result.put_varint32(num_bits as u32);
        // `num_fingerprints` is reconstructible from the block bitmap and
        // is not encoded.
        result.put_varint32(bit_width);
        let fingerprints_pos = result.pos();
        store_bit_packed_u64(fingerprints, bit_width, &mut result);
        bitpack::put_slop_bytes(&mut result);
        Block {
            num_bits,
            num_fingerprints: fingerprints.len(),
            bit_width,
            fingerprints_pos,
            data: result.into_bytes(),
        }
    }

    /// Reads one block back from `reader`; `num_fingerprints` comes from
    /// the enclosing store's bitmaps.
    fn decode(reader: &mut ByteReader<'_>, num_fingerprints: usize) -> Result<Block> {
        let num_bits = reader.get_varint32()? as usize;
        let bit_width = reader.get_varint32()?;
        if num_bits > 64 || bit_width as usize > num_bits {
            return Err(Error::format(format!(
                "block claims {bit_width}-bit packed fingerprints of {num_bits} bits"
            )));
        }
        let packed = reader.get_bytes(bytes_required(num_fingerprints * bit_width as usize))?;
        let slop = reader.get_bytes(bitpack::SLOP_BYTES)?;

        // Reassemble the block's owned bytes in its encoded layout.
        let mut data = ByteBuffer::new();
        data.put_varint32(num_bits as u32);
        data.put_varint32(bit_width);
        let fingerprints_pos = data.pos();
        data.put_bytes(packed);
        data.put_bytes(slop);
        Ok(Block {
            num_bits,
            num_fingerprints,
            bit_width,
            fingerprints_pos,
            data: data.into_bytes(),
        })
    }

    #[inline]
    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    #[inline]
    pub fn num_fingerprints(&self) -> usize {
        self.num_fingerprints
    }

    /// The fingerprint bits stored at `idx`.
    pub fn get(&self, idx: usize) -> u64 {
        assert!(idx < self.num_fingerprints, "fingerprint {idx} out of range");
        BitPackedReader::new(self.bit_width, &self.data[self.fingerprints_pos..]).get(idx)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Contents of one block while grouping slots by fingerprint length.
struct BlockContent {
    block_bitmap: Bitmap,
    fingerprints: Vec<u64>,
}

/// Stores variable-sized fingerprints in per-length blocks with compacted
/// block bitmaps; supports random reads by slot index.
pub struct FingerprintStore {
    /// One bit per slot; set means empty. Rank table initialized.
    empty_slots_bitmap: Bitmap,
    /// `block_bitmaps[0]` marks empty buckets; `block_bitmaps[j]` for
    /// `j > 0` is the compacted bitmap of `blocks[j - 1]`.
    block_bitmaps: Vec<Bitmap>,
    blocks: Vec<Block>,
    num_slots: usize,
    num_stored_fingerprints: usize,
    slots_per_bucket: usize,
    rle_block_bitmaps: bool,
}

impl FingerprintStore {
    /// Builds the store from one fingerprint per slot. Fingerprints within
    /// a bucket must share their length (inactive padding slots aside).
    pub fn new(
        fingerprints: &[Fingerprint],
        slots_per_bucket: usize,
        rle_block_bitmaps: bool,
    ) -> FingerprintStore {
        assert_eq!(fingerprints.len() % slots_per_bucket, 0);
        if slots_per_bucket > 1 {
            assert!(
                buckets_have_uniform_fingerprint_lengths(fingerprints, slots_per_bucket),
                "all fingerprints in a bucket need to share the same length"
            );
        }
        let num_slots = fingerprints.len();
        let num_buckets = num_slots / slots_per_bucket;

        let mut empty_slots_bitmap = Bitmap::new(num_slots);
        for (slot, fp) in fingerprints.iter().enumerate() {
            if !fp.active {
                empty_slots_bitmap.set(slot, true);
            }
        }
        empty_slots_bitmap.init_rank_table();
        let num_stored_fingerprints = empty_slots_bitmap.count_zeros();

        // Group fingerprints by length. A BTreeMap keeps the grouping
        // deterministic, which the cardinality sort below preserves for
        // equal-sized blocks.
        let mut contents: BTreeMap<usize, BlockContent> = BTreeMap::new();
        for (slot, fp) in fingerprints.iter().enumerate() {
            if !fp.active {
                continue;
            }
            let content = contents.entry(fp.num_bits).or_insert_with(|| BlockContent {
                block_bitmap: Bitmap::new(num_buckets),
                fingerprints: Vec::new(),
            });
            content.block_bitmap.set(slot / slots_per_bucket, true);
            content
                .fingerprints
                .push(fingerprint_suffix(fp.fingerprint, fp.num_bits));
        }

        // Order real blocks by decreasing cardinality.
        let mut lengths: Vec<usize> = contents.keys().copied().collect();
        lengths.sort_by_key(|length| {
            std::cmp::Reverse(contents[length].block_bitmap.count_ones())
        });

        let mut blocks = Vec::with_capacity(lengths.len());
        for &length in &lengths {
            blocks.push(Block::new(length, &contents[&length].fingerprints));
        }

        // The virtual empty-buckets block leads and is never compacted.
        let mut first = empty_buckets_bitmap(&empty_slots_bitmap, slots_per_bucket);
        first.init_rank_table();
        let mut block_bitmaps = vec![first];
        for &length in &lengths {
            let original = &contents[&length].block_bitmap;
            let num_bits = block_bitmaps.last().unwrap().count_zeros();
            let mut compacted = Bitmap::new(num_bits);
            for bucket_idx in original.true_bit_indices() {
                compacted.set(map_to_compacted(&block_bitmaps, bucket_idx), true);
            }
            compacted.init_rank_table();
            block_bitmaps.push(compacted);
        }

        FingerprintStore {
            empty_slots_bitmap,
            block_bitmaps,
            blocks,
            num_slots,
            num_stored_fingerprints,
            slots_per_bucket,
            rle_block_bitmaps,
        }
    }

    /// Reverses [`FingerprintStore::encode`].
    ///
    /// `slots_per_bucket` and `rle_block_bitmaps` are build-time inputs the
    /// byte layout does not carry; callers pass the values used at encode
    /// time.
    pub fn decode(
        data: &[u8],
        slots_per_bucket: usize,
        rle_block_bitmaps: bool,
    ) -> Result<FingerprintStore> {
        let mut reader = ByteReader::new(data);
        let num_blocks = reader.get_varint32()? as usize;
        if num_blocks == 0 {
            return Err(Error::format("fingerprint store without blocks"));
        }
        let num_real_blocks = num_blocks - 1;

        let num_slots = reader.get_varint32()? as usize;
        if slots_per_bucket == 0 || num_slots % slots_per_bucket != 0 {
            return Err(Error::format(format!(
                "{num_slots} slots do not divide into buckets of {slots_per_bucket}"
            )));
        }
        let mut empty_slots_bitmap =
            decode_bitmap(reader.get_string()?, num_slots, rle_block_bitmaps)?;
        empty_slots_bitmap.init_rank_table();

        let mut bitmap_lengths = Vec::with_capacity(num_real_blocks);
        for _ in 0..num_real_blocks {
            bitmap_lengths.push(reader.get_varint32()? as usize);
        }
        let total_bits: usize = bitmap_lengths.iter().sum();
        let global = decode_bitmap(reader.get_string()?, total_bits, rle_block_bitmaps)?;

        let mut first = empty_buckets_bitmap(&empty_slots_bitmap, slots_per_bucket);
        first.init_rank_table();
        let mut block_bitmaps = vec![first];
        let mut base = 0;
        for &num_bits in &bitmap_lengths {
            let mut compacted = Bitmap::new(num_bits);
            for bit in 0..num_bits {
                if global.get(base + bit) {
                    compacted.set(bit, true);
                }
            }
            compacted.init_rank_table();
            block_bitmaps.push(compacted);
            base += num_bits;
        }

        let mut store = FingerprintStore {
            empty_slots_bitmap,
            block_bitmaps,
            blocks: Vec::with_capacity(num_real_blocks),
            num_slots,
            num_stored_fingerprints: 0,
            slots_per_bucket,
            rle_block_bitmaps,
        };
        store.num_stored_fingerprints = store.empty_slots_bitmap.count_zeros();

        // Each block's entry count is the occupancy sum of its buckets.
        for bitmap_idx in 1..=num_real_blocks {
            let mut num_fingerprints = 0;
            for bit_idx in store.block_bitmaps[bitmap_idx].true_bit_indices() {
                let bucket_idx = store.bucket_index(bitmap_idx, bit_idx)?;
                num_fingerprints += store.items_in_bucket(bucket_idx);
            }
            store.blocks.push(Block::decode(&mut reader, num_fingerprints)?);
        }

        let stored: usize = store.blocks.iter().map(Block::num_fingerprints).sum();
        if stored != store.num_stored_fingerprints {
            return Err(Error::format(format!(
                "blocks hold {stored} fingerprints, empty-slots bitmap implies {}",
                store.num_stored_fingerprints
            )));
        }
        Ok(store)
    }

    /// The fingerprint stored in slot `slot_idx`.
    ///
    /// # Panics
    ///
    /// Panics if `slot_idx >= num_slots()`.
    pub fn get_fingerprint(&self, slot_idx: usize) -> Fingerprint {
        assert!(
            slot_idx < self.num_slots,
            "slot {slot_idx} out of range ({})",
            self.num_slots
        );
        if self.empty_slots_bitmap.get(slot_idx) {
            return Fingerprint::INACTIVE;
        }

        let bucket_idx = slot_idx / self.slots_per_bucket;
        // Walk the compaction chain: map the bucket position from one
        // bitmap's domain into the next.
        let mut pos = bucket_idx;
        for bitmap_idx in 0..self.block_bitmaps.len() {
            if bitmap_idx > 0 {
                pos -= self.block_bitmaps[bitmap_idx - 1].rank(pos);
            }
            if bitmap_idx == 0 {
                // The slot is occupied, so its bucket is not in the
                // empty-buckets block.
                continue;
            }
            if self.block_bitmaps[bitmap_idx].get(pos) {
                let block = &self.blocks[bitmap_idx - 1];
                let idx_in_block = self.index_of_fingerprint_in_block(bitmap_idx, pos, slot_idx);
                return Fingerprint {
                    active: true,
                    num_bits: block.num_bits(),
                    fingerprint: block.get(idx_in_block),
                };
            }
        }
        unreachable!("no block claims slot {slot_idx}");
    }

    /// Serializes the store. With `bitmaps_only` the per-block fingerprint
    /// data is left out (used for size statistics).
    pub fn encode(&self, bitmaps_only: bool) -> Vec<u8> {
        let mut result = ByteBuffer::new();
        result.put_varint32(self.block_bitmaps.len() as u32);
        result.put_varint32(self.empty_slots_bitmap.len() as u32);
        put_bitmap(&mut result, &self.empty_slots_bitmap, self.rle_block_bitmaps);

        // Compacted bitmaps of the real blocks, concatenated; the
        // empty-buckets bitmap is derived from the empty-slots bitmap on
        // decode and not serialized.
        for bitmap in &self.block_bitmaps[1..] {
            result.put_varint32(bitmap.len() as u32);
        }
        let real: Vec<Option<Bitmap>> = self.block_bitmaps[1..]
            .iter()
            .map(|bitmap| Some(bitmap.clone()))
            .collect();
        put_bitmap(&mut result, &Bitmap::concat(&real), self.rle_block_bitmaps);

        if !bitmaps_only {
            for block in &self.blocks {
                result.put_bytes(block.data());
            }
        }
        result.into_bytes()
    }

    #[inline]
    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn num_stored_fingerprints(&self) -> usize {
        self.num_stored_fingerprints
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn empty_slots_bitmap(&self) -> &Bitmap {
        &self.empty_slots_bitmap
    }

    /// `(fingerprint length, bucket count)` per real block, in stored
    /// order.
    pub fn block_stats(&self) -> Vec<(usize, usize)> {
        self.blocks
            .iter()
            .zip(&self.block_bitmaps[1..])
            .map(|(block, bitmap)| (block.num_bits(), bitmap.count_ones()))
            .collect()
    }

    pub fn size_in_bytes(&self, bitmaps_only: bool) -> usize {
        self.encode(bitmaps_only).len()
    }

    pub fn bits_per_fingerprint(&self, bitmaps_only: bool) -> f64 {
        (self.size_in_bytes(bitmaps_only) * 8) as f64 / self.num_stored_fingerprints as f64
    }

    /// The original bucket index that bit `bit_idx` of bitmap `bitmap_idx`
    /// addresses, obtained by chaining select-zero through the prior
    /// bitmaps.
    fn bucket_index(&self, bitmap_idx: usize, bit_idx: usize) -> Result<usize> {
        let mut pos = bit_idx;
        for prior in self.block_bitmaps[..bitmap_idx].iter().rev() {
            pos = prior.select_zero(pos).ok_or_else(|| {
                Error::format("insufficient zeros in compacted block bitmap")
            })?;
        }
        Ok(pos)
    }

    /// Number of occupied slots in bucket `bucket_idx`.
    fn items_in_bucket(&self, bucket_idx: usize) -> usize {
        let first_slot = bucket_idx * self.slots_per_bucket;
        (first_slot..first_slot + self.slots_per_bucket)
            .filter(|&slot| !self.empty_slots_bitmap.get(slot))
            .count()
    }

    /// Offset of slot `slot_idx`'s fingerprint within its block.
    fn index_of_fingerprint_in_block(
        &self,
        bitmap_idx: usize,
        idx_in_compacted: usize,
        slot_idx: usize,
    ) -> usize {
        let block_bitmap = &self.block_bitmaps[bitmap_idx];

        // One slot per bucket: the offset is simply the number of buckets
        // of this block before ours.
        if self.slots_per_bucket == 1 {
            return block_bitmap.rank(idx_in_compacted);
        }

        // Otherwise de-compact each earlier bucket of the block and count
        // its occupied slots, then adjust for empty slots in our own
        // bucket.
        let mut count = 0;
        for bit_idx in block_bitmap.true_bit_indices() {
            if bit_idx >= idx_in_compacted {
                break;
            }
            let bucket_idx = self
                .bucket_index(bitmap_idx, bit_idx)
                .expect("compaction chain broken");
            count += self.items_in_bucket(bucket_idx);
        }

        let bucket_idx = slot_idx / self.slots_per_bucket;
        let first_slot_in_bucket = bucket_idx * self.slots_per_bucket;
        let num_empty_before = (first_slot_in_bucket..slot_idx)
            .filter(|&slot| self.empty_slots_bitmap.get(slot))
            .count();

        count - num_empty_before + (slot_idx % self.slots_per_bucket)
    }
}

/// Maps `bucket_idx` into the compacted domain after all of `bitmaps`.
fn map_to_compacted(bitmaps: &[Bitmap], bucket_idx: usize) -> usize {
    let mut idx = bucket_idx;
    for bitmap in bitmaps {
        idx -= bitmap.rank(idx);
    }
    idx
}

fn put_bitmap(out: &mut ByteBuffer, bitmap: &Bitmap, rle: bool) {
    if rle {
        out.put_string(RleBitmap::build(bitmap).data());
    } else {
        let mut encoded = ByteBuffer::new();
        bitmap.dense_encode(&mut encoded);
        out.put_string(encoded.as_slice());
    }
}

fn decode_bitmap(encoded: &[u8], expected_bits: usize, rle: bool) -> Result<Bitmap> {
    let bitmap = if rle {
        let rle_bitmap = RleBitmap::from_bytes(encoded.to_vec())?;
        rle_bitmap.extract(0, rle_bitmap.len())
    } else {
        Bitmap::dense_decode(encoded)?
    };
    if bitmap.len() != expected_bits {
        return Err(Error::format(format!(
            "bitmap holds {} bits, expected {expected_bits}",
            bitmap.len()
        )));
    }
    Ok(bitmap)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MURMUR_CONSTANT: u64 = 0x5bd1_e995;
    const NUM_FINGERPRINTS: usize = 1000;

    /// Random fingerprints with lengths drawn from `lengths` (shorter ones
    /// more likely), all slots of a bucket sharing one length and every
    /// tenth slot inactive.
    fn random_fingerprints(
        n: usize,
        slots_per_bucket: usize,
        mut lengths: Vec<usize>,
    ) -> Vec<Fingerprint> {
        assert!(!lengths.is_empty());
        lengths.sort_unstable();
        let mut draw_from = Vec::new();
        for (i, &length) in lengths.iter().enumerate() {
            for _ in 0..lengths.len() - i {
                draw_from.push(length);
            }
        }

        let mut fingerprints = Vec::with_capacity(n);
        let mut i = 0;
        while i < n {
            let hash_bucket = (i as u64).wrapping_mul(MURMUR_CONSTANT);
            let num_bits = draw_from[(hash_bucket % draw_from.len() as u64) as usize];
            for j in 0..slots_per_bucket {
                let hash_slot = ((i + j) as u64).wrapping_mul(MURMUR_CONSTANT);
                fingerprints.push(Fingerprint {
                    active: (i + j) % 10 != 0,
                    num_bits,
                    fingerprint: hash_slot % (1u64 << num_bits),
                });
            }
            i += slots_per_bucket;
        }
        fingerprints
    }

    fn check_store_and_get(lengths: Vec<usize>, slots_per_bucket: usize, rle: bool) {
        let fingerprints = random_fingerprints(NUM_FINGERPRINTS, slots_per_bucket, lengths);
        let store = FingerprintStore::new(&fingerprints, slots_per_bucket, rle);
        for (i, expected) in fingerprints.iter().enumerate() {
            let fp = store.get_fingerprint(i);
            assert_eq!(fp.active, expected.active, "slot {i}");
            if fp.active {
                assert_eq!(fp.num_bits, expected.num_bits, "slot {i}");
                assert_eq!(fp.fingerprint, expected.fingerprint, "slot {i}");
            }
        }
    }

    #[test]
    fn get_fingerprint_single_block() {
        check_store_and_get(vec![8], 1, false);
    }

    #[test]
    fn get_fingerprint_single_block_rle() {
        check_store_and_get(vec![8], 1, true);
    }

    #[test]
    fn get_fingerprint_five_blocks() {
        check_store_and_get(vec![1, 2, 4, 8, 16], 1, false);
    }

    #[test]
    fn get_fingerprint_five_blocks_rle() {
        check_store_and_get(vec![1, 2, 4, 8, 16], 1, true);
    }

    #[test]
    fn get_fingerprint_zero_bits() {
        check_store_and_get(vec![0], 1, false);
    }

    #[test]
    fn get_fingerprint_zero_and_one_bits() {
        check_store_and_get(vec![0, 1], 1, false);
    }

    #[test]
    fn get_fingerprint_two_slots_per_bucket() {
        check_store_and_get(vec![1, 2, 4, 8, 16], 2, false);
    }

    #[test]
    fn blocks_ordered_by_descending_cardinality() {
        let fingerprints = random_fingerprints(NUM_FINGERPRINTS, 2, vec![1, 2, 4, 8, 16]);
        let store = FingerprintStore::new(&fingerprints, 2, false);
        let stats = store.block_stats();
        for pair in stats.windows(2) {
            assert!(pair[0].1 >= pair[1].1, "cardinalities not descending: {stats:?}");
        }
        // Compacted bitmap sizes shrink monotonically.
        let sizes: Vec<usize> = store.block_bitmaps[1..].iter().map(Bitmap::len).collect();
        for pair in sizes.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        for &slots_per_bucket in &[1usize, 2] {
            for &rle in &[false, true] {
                let fingerprints = random_fingerprints(
                    NUM_FINGERPRINTS,
                    slots_per_bucket,
                    vec![1, 2, 4, 8, 16],
                );
                let store = FingerprintStore::new(&fingerprints, slots_per_bucket, rle);
                let encoded = store.encode(false);
                let decoded =
                    FingerprintStore::decode(&encoded, slots_per_bucket, rle).unwrap();
                assert_eq!(decoded.num_slots(), store.num_slots());
                assert_eq!(
                    decoded.num_stored_fingerprints(),
                    store.num_stored_fingerprints()
                );
                for i in 0..fingerprints.len() {
                    assert_eq!(
                        decoded.get_fingerprint(i),
                        store.get_fingerprint(i),
                        "slot {i} (K={slots_per_bucket}, rle={rle})"
                    );
                }
                // Deterministic: re-encoding yields identical bytes.
                assert_eq!(decoded.encode(false), encoded);
            }
        }
    }

    #[test]
    fn decode_rejects_truncated_input() {
        let fingerprints = random_fingerprints(100, 1, vec![4]);
        let store = FingerprintStore::new(&fingerprints, 1, false);
        let encoded = store.encode(false);
        assert!(FingerprintStore::decode(&encoded[..encoded.len() / 2], 1, false).is_err());
    }

    #[test]
    fn bitmaps_only_encoding_is_smaller() {
        let fingerprints = random_fingerprints(1000, 1, vec![16]);
        let store = FingerprintStore::new(&fingerprints, 1, false);
        assert!(store.size_in_bytes(true) < store.size_in_bytes(false));
        assert!(store.bits_per_fingerprint(false) > 0.0);
    }

    #[test]
    fn all_slots_empty() {
        let fingerprints = vec![Fingerprint::INACTIVE; 8];
        let store = FingerprintStore::new(&fingerprints, 2, false);
        for i in 0..8 {
            assert!(!store.get_fingerprint(i).active);
        }
        let decoded = FingerprintStore::decode(&store.encode(false), 2, false).unwrap();
        assert!(!decoded.get_fingerprint(3).active);
    }
}
