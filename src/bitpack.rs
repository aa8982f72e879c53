//! Fixed bit-width integer packing.
//!
//! Bit-packing here means storing each value of a sequence with the same,
//! minimal number of bits, LSB-first in a contiguous little-endian byte
//! stream. Readers fetch any element with a single unaligned 64-bit load
//! (two for widths above 58), which requires the stream to be followed by
//! [`SLOP_BYTES`] readable bytes — writers append them once, at the end of
//! the enclosing buffer, via [`put_slop_bytes`].

use crate::codec::ByteBuffer;

/// Number of sentinel bytes readers may touch past the logical end.
pub const SLOP_BYTES: usize = 8;

/// Widths up to this value are served by a single 64-bit load in
/// [`BitPackedReader::get`]. A packed value starts at most 7 bits into its
/// first byte, so 57 payload bits always fit; 58 works too because
/// 58-bit values only ever start at even bit offsets.
const MAX_SINGLE_WORD_BIT_WIDTH: u32 = 58;

/// Values per unrolled group in [`BitPackedReader::get_batch`].
const UNROLL: usize = 32;

/// Number of bits needed to represent `value`, with 0 bits for 0.
#[inline]
pub fn bit_width32(value: u32) -> u32 {
    32 - value.leading_zeros()
}

/// Number of bits needed to represent `value`, with 0 bits for 0.
#[inline]
pub fn bit_width64(value: u64) -> u32 {
    64 - value.leading_zeros()
}

/// Maximum bit width over the array; 0 for an empty or all-zero array.
pub fn max_bit_width32(values: &[u32]) -> u32 {
    values.iter().copied().max().map_or(0, bit_width32)
}

/// Maximum bit width over the array; 0 for an empty or all-zero array.
pub fn max_bit_width64(values: &[u64]) -> u32 {
    values.iter().copied().max().map_or(0, bit_width64)
}

/// Bytes required to hold `num_bits` bits.
#[inline]
pub fn bytes_required(num_bits: usize) -> usize {
    (num_bits + 7) >> 3
}

/// Mask with the lowest `num_bits` set. Only valid for `num_bits < 64`.
#[inline]
fn fast_bit_mask(num_bits: u32) -> u64 {
    (1u64 << num_bits) - 1
}

/// Unaligned little-endian 64-bit load.
///
/// Panics if fewer than 8 bytes are available at `byte_offset`; the slop
/// bytes appended by [`put_slop_bytes`] make this unreachable for well
/// formed streams.
#[inline]
fn load_u64_le(data: &[u8], byte_offset: usize) -> u64 {
    u64::from_le_bytes(data[byte_offset..byte_offset + 8].try_into().unwrap())
}

/// Appends the slop bytes required by bit-packed readers. Needed once per
/// buffer, after the last bit-packed array.
pub fn put_slop_bytes(buffer: &mut ByteBuffer) {
    buffer.put_u64(0);
}

fn store_impl<I>(values: I, bit_width: u32, buffer: &mut ByteBuffer, total: usize)
where
    I: Iterator<Item = u64>,
{
    if bit_width == 0 {
        return;
    }
    let num_bytes = bytes_required(bit_width as usize * total);
    let new_pos = buffer.pos() + num_bytes;
    // The write loop below stores whole 64-bit words and may touch up to 8
    // bytes past the last payload byte.
    buffer.ensure_size(new_pos + SLOP_BYTES);

    let mut offset = buffer.pos();
    let mut word: u64 = 0;
    let mut shift: u32 = 0;
    for val in values {
        debug_assert!(bit_width64(val) <= bit_width);
        word |= val << shift;
        shift += bit_width;

        buffer.put_u64_at(offset, word);
        // Flush the bytes completed so far out of `word`.
        let flushed_bits = shift & !0x7;
        shift &= 0x7;
        word = if flushed_bits == 64 { 0 } else { word >> flushed_bits };
        offset += (flushed_bits >> 3) as usize;
        if flushed_bits == 64 && shift > 0 {
            // The high bits of `val` did not fit into the flushed word.
            word = val >> (bit_width - shift);
        }
        debug_assert_eq!(word & !fast_bit_mask(shift), 0);
    }
    buffer.put_u64_at(offset, word);
    buffer.set_pos(new_pos);
}

/// Appends `values` in fixed `bit_width` encoding to `buffer`.
pub fn store_bit_packed_u32(values: &[u32], bit_width: u32, buffer: &mut ByteBuffer) {
    debug_assert!(bit_width <= 32);
    store_impl(
        values.iter().map(|&v| u64::from(v)),
        bit_width,
        buffer,
        values.len(),
    );
}

/// Appends `values` in fixed `bit_width` encoding to `buffer`.
pub fn store_bit_packed_u64(values: &[u64], bit_width: u32, buffer: &mut ByteBuffer) {
    debug_assert!(bit_width <= 64);
    store_impl(values.iter().copied(), bit_width, buffer, values.len());
}

/// Random-access reader over an array written by [`store_bit_packed_u32`]
/// or [`store_bit_packed_u64`].
///
/// Borrows the underlying bytes; the slice must extend [`SLOP_BYTES`] past
/// the packed payload. The reader itself is cheap to construct, so owners
/// of encoded data typically hand out fresh readers per access path.
#[derive(Clone, Copy)]
pub struct BitPackedReader<'a> {
    bit_width: u32,
    data: &'a [u8],
}

impl<'a> BitPackedReader<'a> {
    /// `data` must start at the first packed byte and include the slop.
    pub fn new(bit_width: u32, data: &'a [u8]) -> Self {
        debug_assert!(bit_width <= 64);
        Self { bit_width, data }
    }

    #[inline]
    pub fn bit_width(&self) -> u32 {
        self.bit_width
    }

    /// Reads the value at `index` in O(1).
    #[inline]
    pub fn get(&self, index: usize) -> u64 {
        let bit0_offset = index * self.bit_width as usize;
        let byte0_offset = bit0_offset >> 3;
        let start = (bit0_offset & 0x7) as u32;
        let val = load_u64_le(self.data, byte0_offset) >> start;

        if self.bit_width > MAX_SINGLE_WORD_BIT_WIDTH {
            let next_word_bits = start as i64 + self.bit_width as i64 - 64;
            let val = if next_word_bits > 0 {
                val | load_u64_le(self.data, byte0_offset + 8)
                    << (self.bit_width - next_word_bits as u32)
            } else {
                val
            };
            return if self.bit_width == 64 {
                val
            } else {
                val & fast_bit_mask(self.bit_width)
            };
        }
        // Also correct for bit_width == 0: the mask is empty, and exactly 8
        // bytes past the end are read, which is what the slop provides.
        val & fast_bit_mask(self.bit_width)
    }

    /// Decodes the first `size` values, calling `add_value(i, value)` for
    /// increasing `i`.
    ///
    /// Only implemented for the u32 domain (widths 0..=32): the width is
    /// turned into a compile-time constant and values are decoded in
    /// unrolled groups of 32, which saves the per-element offset
    /// arithmetic of [`BitPackedReader::get`].
    pub fn get_batch<F: FnMut(usize, u32)>(&self, size: usize, mut add_value: F) {
        macro_rules! dispatch {
            ($($w:literal)*) => {
                match self.bit_width {
                    $($w => self.get_batch_impl::<$w, F>(size, &mut add_value),)*
                    w => unreachable!("unexpected bit-width for batched decode: {w}"),
                }
            };
        }
        dispatch! {
            0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16
            17 18 19 20 21 22 23 24 25 26 27 28 29 30 31 32
        }
    }

    fn get_batch_impl<const W: u32, F: FnMut(usize, u32)>(
        &self,
        size: usize,
        add_value: &mut F,
    ) {
        let mask = fast_bit_mask(W);
        let mut offset = 0;
        // Byte position of the 32-bit word the next value starts in.
        let mut word_offset = 0usize;
        while offset + UNROLL <= size {
            let mut shift: u32 = 0;
            // Fixed trip count and constant `W` let the compiler unroll
            // this into straight shift/mask code.
            for i in 0..UNROLL {
                let word = load_u64_le(self.data, word_offset);
                add_value(offset + i, ((word >> shift) & mask) as u32);
                shift += W;
                if shift >= 32 {
                    shift -= 32;
                    word_offset += 4;
                }
            }
            offset += UNROLL;
        }
        while offset < size {
            add_value(offset, self.get(offset) as u32);
            offset += 1;
        }
    }
}
