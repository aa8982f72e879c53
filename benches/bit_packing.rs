//! Micro-benchmarks for the bit-packing codec: indexed reads vs. batched
//! decode at a few representative widths.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use cuckoo_stripe::bitpack::{put_slop_bytes, store_bit_packed_u32, BitPackedReader};
use cuckoo_stripe::codec::ByteBuffer;

const NUM_VALUES: usize = 16 * 1024;

fn packed_values(bit_width: u32) -> (Vec<u32>, Vec<u8>) {
    let mask = if bit_width == 32 {
        u32::MAX
    } else {
        (1u32 << bit_width) - 1
    };
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let values: Vec<u32> = (0..NUM_VALUES).map(|_| rng.gen::<u32>() & mask).collect();
    let mut buffer = ByteBuffer::new();
    store_bit_packed_u32(&values, bit_width, &mut buffer);
    put_slop_bytes(&mut buffer);
    (values, buffer.into_bytes())
}

fn bench_indexed_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("indexed_get");
    for bit_width in [1u32, 7, 13, 32] {
        let (_, data) = packed_values(bit_width);
        group.bench_with_input(BenchmarkId::from_parameter(bit_width), &data, |b, data| {
            let reader = BitPackedReader::new(bit_width, data);
            b.iter(|| {
                let mut sum = 0u64;
                for i in 0..NUM_VALUES {
                    sum = sum.wrapping_add(reader.get(i));
                }
                black_box(sum)
            });
        });
    }
    group.finish();
}

fn bench_batched_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("batched_get");
    for bit_width in [1u32, 7, 13, 32] {
        let (_, data) = packed_values(bit_width);
        group.bench_with_input(BenchmarkId::from_parameter(bit_width), &data, |b, data| {
            let reader = BitPackedReader::new(bit_width, data);
            b.iter(|| {
                let mut sum = 0u64;
                reader.get_batch(NUM_VALUES, |_, v| sum = sum.wrapping_add(u64::from(v)));
                black_box(sum)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_indexed_get, bench_batched_get);
criterion_main!(benches);
