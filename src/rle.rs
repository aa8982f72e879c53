//! Run-length encoded bitmap with random-access extraction.
//!
//! A single dense [`Bitmap`] is compressed with one of two encodings,
//! chosen per bitmap:
//!
//! * **dense**: a stream of run-length bytes, each either a verbatim run
//!   (`(count-1) << 1 | 1`, pushing one bit per element into a separate
//!   1-bit stream) or a repeat run (`(count-18) << 1`, pushing a single
//!   bit);
//! * **sparse**: byte offsets between successive set bits, with a virtual
//!   sentinel 1-bit at the end and `0` marking a 255-bit skip that does not
//!   terminate a run.
//!
//! A sqrt-sampled skip-offsets index is embedded so any sub-range can be
//! extracted without decoding from the start.

use crate::bitmap::Bitmap;
use crate::bitpack::{
    self, bytes_required, max_bit_width32, store_bit_packed_u32, BitPackedReader,
};
use crate::codec::{ByteBuffer, ByteReader};
use crate::error::{Error, Result};

/// Minimum length of a repeat run. Each repeat entry costs ~17 bits of
/// overhead (two run-length bytes plus the repeated bit), so shorter runs
/// are cheaper kept verbatim.
const MIN_DENSE_RUN_LENGTH: u32 = 18;
/// Maximum run length, keeping every run-length entry inside 8 bits. This
/// also helps the downstream byte compressor.
const MAX_DENSE_RUN_LENGTH: u32 = 128;

/// Slightly prefer the sparse encoding; it compresses better externally.
const SPARSE_FUDGE_FACTOR: f64 = 1.1;
/// Maximum offset per sparse entry; larger gaps chain `0` skip bytes.
const MAX_SPARSE_RUN_LENGTH: u32 = 255;

/// Immutable RLE-compressed bitmap owning its serialized bytes.
pub struct RleBitmap {
    is_sparse: bool,
    num_bits: usize,
    skip_offsets_step: usize,
    skip_offsets_size: usize,
    run_lengths_size: usize,
    bits_size: usize,
    skip_offsets_bit_width: u32,
    run_lengths_bit_width: u32,
    skip_offsets_pos: usize,
    run_lengths_pos: usize,
    bits_pos: usize,
    data: Vec<u8>,
}

impl RleBitmap {
    /// Compresses `bitmap`, choosing the denser of the two encodings.
    pub fn build(bitmap: &Bitmap) -> RleBitmap {
        let mut run_lengths: Vec<u32> = Vec::new();
        let mut bits: Vec<u32> = Vec::new();
        encode_dense_run_lengths(bitmap, &mut run_lengths, &mut bits);

        // For each 1-bit the sparse encoding has roughly one entry.
        let ones = bitmap.count_ones();
        let is_sparse = (ones as f64)
            < SPARSE_FUDGE_FACTOR * run_lengths.len() as f64 + bits.len() as f64 / 8.0;
        if is_sparse {
            run_lengths.clear();
            bits.clear();
            encode_sparse_run_lengths(bitmap, &mut run_lengths);
        }
        let skip_offsets_step = (run_lengths.len() as f64).sqrt() as usize;
        let skip_offsets = if is_sparse {
            compute_sparse_skip_offsets(&run_lengths, skip_offsets_step)
        } else {
            compute_dense_skip_offsets(&run_lengths, skip_offsets_step)
        };

        let mut result = ByteBuffer::new();
        result.put_varint32(u32::from(is_sparse));
        result.put_varint32(bitmap.len() as u32);
        result.put_varint32(skip_offsets_step as u32);
        result.put_varint32(skip_offsets.len() as u32);
        result.put_varint32(run_lengths.len() as u32);
        result.put_varint32(bits.len() as u32);

        let skip_offsets_bit_width = max_bit_width32(&skip_offsets);
        result.put_varint32(skip_offsets_bit_width);
        let skip_offsets_pos = result.pos();
        store_bit_packed_u32(&skip_offsets, skip_offsets_bit_width, &mut result);

        let run_lengths_bit_width = max_bit_width32(&run_lengths);
        debug_assert!(run_lengths_bit_width < 9);
        result.put_varint32(run_lengths_bit_width);
        let run_lengths_pos = result.pos();
        if !run_lengths.is_empty() {
            store_bit_packed_u32(&run_lengths, run_lengths_bit_width, &mut result);
        }

        let bits_pos = result.pos();
        if !bits.is_empty() {
            store_bit_packed_u32(&bits, 1, &mut result);
        }
        bitpack::put_slop_bytes(&mut result);

        RleBitmap {
            is_sparse,
            num_bits: bitmap.len(),
            skip_offsets_step,
            skip_offsets_size: skip_offsets.len(),
            run_lengths_size: run_lengths.len(),
            bits_size: bits.len(),
            skip_offsets_bit_width,
            run_lengths_bit_width,
            skip_offsets_pos,
            run_lengths_pos,
            bits_pos,
            data: result.into_bytes(),
        }
    }

    /// Re-opens a serialized RLE bitmap produced by [`RleBitmap::build`].
    pub fn from_bytes(data: Vec<u8>) -> Result<RleBitmap> {
        let mut reader = ByteReader::new(&data);
        let is_sparse = reader.get_varint32()? != 0;
        let num_bits = reader.get_varint32()? as usize;
        let skip_offsets_step = reader.get_varint32()? as usize;
        let skip_offsets_size = reader.get_varint32()? as usize;
        let run_lengths_size = reader.get_varint32()? as usize;
        let bits_size = reader.get_varint32()? as usize;

        let skip_offsets_bit_width = reader.get_varint32()?;
        if skip_offsets_bit_width > 32 {
            return Err(Error::format(format!(
                "skip-offsets bit-width {skip_offsets_bit_width} out of range"
            )));
        }
        let skip_offsets_pos = reader.pos();
        let skip_bytes = bytes_required(skip_offsets_size * skip_offsets_bit_width as usize);
        reader.get_bytes(skip_bytes)?;

        let run_lengths_bit_width = reader.get_varint32()?;
        if run_lengths_bit_width >= 9 {
            return Err(Error::format(format!(
                "run-lengths bit-width {run_lengths_bit_width} does not fit in 8 bits"
            )));
        }
        let run_lengths_pos = reader.pos();
        let run_bytes = bytes_required(run_lengths_size * run_lengths_bit_width as usize);
        reader.get_bytes(run_bytes)?;

        let bits_pos = reader.pos();
        let bits_bytes = bytes_required(bits_size);
        reader.get_bytes(bits_bytes)?;
        // The trailing slop must be present for the packed readers.
        reader.get_bytes(bitpack::SLOP_BYTES)?;

        Ok(RleBitmap {
            is_sparse,
            num_bits,
            skip_offsets_step,
            skip_offsets_size,
            run_lengths_size,
            bits_size,
            skip_offsets_bit_width,
            run_lengths_bit_width,
            skip_offsets_pos,
            run_lengths_pos,
            bits_pos,
            data,
        })
    }

    /// The serialized bytes (header, packed sections and slop).
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of bits in the uncompressed bitmap.
    pub fn len(&self) -> usize {
        self.num_bits
    }

    pub fn is_empty(&self) -> bool {
        self.num_bits == 0
    }

    pub fn is_sparse(&self) -> bool {
        self.is_sparse
    }

    /// Decompresses the slice `[offset, offset + size)` into a fresh bitmap.
    ///
    /// # Panics
    ///
    /// Panics if the requested window exceeds the bitmap.
    pub fn extract(&self, offset: usize, size: usize) -> Bitmap {
        assert!(
            offset + size <= self.num_bits,
            "slice [{offset}, {}) out of range ({})",
            offset + size,
            self.num_bits
        );
        if self.is_sparse {
            self.extract_sparse(offset, size)
        } else {
            self.extract_dense(offset, size)
        }
    }

    pub fn get(&self, pos: usize) -> bool {
        self.extract(pos, 1).get(0)
    }

    fn skip_offsets(&self) -> BitPackedReader<'_> {
        BitPackedReader::new(self.skip_offsets_bit_width, &self.data[self.skip_offsets_pos..])
    }

    fn run_lengths(&self) -> BitPackedReader<'_> {
        BitPackedReader::new(self.run_lengths_bit_width, &self.data[self.run_lengths_pos..])
    }

    fn bits(&self) -> BitPackedReader<'_> {
        BitPackedReader::new(1, &self.data[self.bits_pos..])
    }

    fn extract_dense(&self, mut offset: usize, size: usize) -> Bitmap {
        let mut result = Bitmap::new(size);

        let skip_offsets = self.skip_offsets();
        let mut rle_pos = 0usize;
        let mut bits_pos = 0usize;
        // Skip whole strides of run-lengths; even entries count uncompressed
        // bits, odd entries count consumed entries of the 1-bit stream.
        debug_assert!(self.skip_offsets_size % 2 == 0);
        let mut i = 0;
        while i < self.skip_offsets_size {
            let uncompressed = skip_offsets.get(i) as usize;
            if uncompressed > offset {
                break;
            }
            offset -= uncompressed;
            rle_pos += self.skip_offsets_step;
            bits_pos += skip_offsets.get(i + 1) as usize;
            i += 2;
        }

        let run_lengths = self.run_lengths();
        let bits = self.bits();
        let mut count_rep = 0usize;
        let mut count_raw = 0usize;
        for i in 0..offset + size {
            if count_rep == 0 && count_raw == 0 {
                let entry = run_lengths.get(rle_pos) as usize;
                rle_pos += 1;
                if entry & 1 == 1 {
                    count_raw = (entry >> 1) + 1;
                } else {
                    count_rep = (entry >> 1) + MIN_DENSE_RUN_LENGTH as usize;
                }
            }
            let bit;
            if count_rep > 0 {
                count_rep -= 1;
                bit = bits.get(bits_pos) != 0;
                if count_rep == 0 {
                    bits_pos += 1;
                }
            } else {
                count_raw -= 1;
                bit = bits.get(bits_pos) != 0;
                bits_pos += 1;
            }
            if i >= offset && bit {
                result.set(i - offset, true);
            }
        }
        result
    }

    fn extract_sparse(&self, mut offset: usize, size: usize) -> Bitmap {
        let mut result = Bitmap::new(size);

        let skip_offsets = self.skip_offsets();
        let mut rle_pos = 0usize;
        for i in 0..self.skip_offsets_size {
            let count = skip_offsets.get(i) as usize;
            if count > offset {
                break;
            }
            offset -= count;
            rle_pos += self.skip_offsets_step;
        }

        let run_lengths = self.run_lengths();
        let mut i: i64 = -1;
        while i < (offset + size) as i64 && rle_pos < self.run_lengths_size {
            let count = run_lengths.get(rle_pos);
            rle_pos += 1;
            if count == 0 {
                i += MAX_SPARSE_RUN_LENGTH as i64;
            } else {
                i += count as i64;
                if i >= offset as i64 && i < (offset + size) as i64 {
                    result.set((i - offset as i64) as usize, true);
                }
            }
        }
        result
    }
}

/// Encodes `bitmap` as dense runs. Run-length entries are `l..llr` bytes:
/// `r = 1` marks a verbatim run of `l + 1` bits, `r = 0` a repeat run of
/// `l + 18` copies of a single bit.
fn encode_dense_run_lengths(bitmap: &Bitmap, run_lengths: &mut Vec<u32>, bits: &mut Vec<u32>) {
    let mut i = 0usize;
    while i < bitmap.len() {
        // From `i` on, search for a repeated run of at least the minimum
        // length; everything before it becomes a verbatim run.
        let mut count_rep: u32 = 1;
        let mut count_raw: u32 = 0;
        let mut j = i + 1;
        while j < bitmap.len() {
            if count_rep >= MAX_DENSE_RUN_LENGTH + MIN_DENSE_RUN_LENGTH - 1
                || count_raw >= MAX_DENSE_RUN_LENGTH
            {
                break;
            }
            if bitmap.get(j) != bitmap.get(j - 1) {
                if count_rep >= MIN_DENSE_RUN_LENGTH {
                    break;
                }
                count_raw += count_rep;
                count_rep = 1;
            } else {
                count_rep += 1;
            }
            j += 1;
        }
        if count_rep < MIN_DENSE_RUN_LENGTH {
            count_raw += count_rep;
            count_rep = 0;
        }
        if count_raw > MAX_DENSE_RUN_LENGTH {
            count_raw = MAX_DENSE_RUN_LENGTH;
            count_rep = 0;
        }
        if count_raw > 0 {
            run_lengths.push((count_raw - 1) << 1 | 1);
            for k in 0..count_raw as usize {
                bits.push(u32::from(bitmap.get(i + k)));
            }
        }
        if count_rep > 0 {
            debug_assert!(count_rep >= MIN_DENSE_RUN_LENGTH);
            run_lengths.push((count_rep - MIN_DENSE_RUN_LENGTH) << 1);
            bits.push(u32::from(bitmap.get(i + count_raw as usize)));
        }
        i += (count_raw + count_rep) as usize;
    }
}

/// Encodes offsets from one 1-bit to the next, with a virtual sentinel
/// 1-bit at `bitmap.len()` so the trailing zero run needs no special case.
fn encode_sparse_run_lengths(bitmap: &Bitmap, run_lengths: &mut Vec<u32>) {
    let mut prev_index: i64 = -1;
    let indices = bitmap.true_bit_indices();
    for index in indices.into_iter().chain(std::iter::once(bitmap.len())) {
        let mut offset = index as i64 - prev_index;
        prev_index = index as i64;
        while offset > MAX_SPARSE_RUN_LENGTH as i64 {
            // 0 marks a run of 255 0-bits *not* terminated by a 1-bit.
            run_lengths.push(0);
            offset -= MAX_SPARSE_RUN_LENGTH as i64;
        }
        debug_assert!(offset >= 1);
        run_lengths.push(offset as u32);
    }
}

/// Per stride of `step` dense run-lengths, emits the pair (uncompressed bit
/// count, consumed 1-bit-stream entries) so extraction can skip both the
/// bitmap domain and the bits stream.
fn compute_dense_skip_offsets(run_lengths: &[u32], step: usize) -> Vec<u32> {
    let mut skip_offsets = Vec::new();
    let mut i = 0;
    while i < run_lengths.len() {
        let mut uncompressed_count: u32 = 0;
        let mut compressed_count: u32 = 0;
        let end_block = run_lengths.len().min(i + step);
        for &entry in &run_lengths[i..end_block] {
            let is_raw = entry & 1 == 1;
            let count = (entry >> 1) + if is_raw { 1 } else { MIN_DENSE_RUN_LENGTH };
            uncompressed_count += count;
            compressed_count += if is_raw { count } else { 1 };
        }
        skip_offsets.push(uncompressed_count);
        skip_offsets.push(compressed_count);
        i += step.max(1);
    }
    skip_offsets
}

/// Per stride of `step` sparse run-lengths, emits the summed bit offset.
fn compute_sparse_skip_offsets(run_lengths: &[u32], step: usize) -> Vec<u32> {
    let mut skip_offsets = Vec::new();
    let mut i = 0;
    while i < run_lengths.len() {
        let end_block = run_lengths.len().min(i + step);
        let count: u32 = run_lengths[i..end_block]
            .iter()
            .map(|&entry| if entry == 0 { MAX_SPARSE_RUN_LENGTH } else { entry })
            .sum();
        skip_offsets.push(count);
        i += step.max(1);
    }
    skip_offsets
}
