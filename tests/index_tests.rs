//! End-to-end tests of the cuckoo stripe index.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use cuckoo_stripe::{
    cuckoo::{MAX_LOAD_FACTOR_1_SLOT, MAX_LOAD_FACTOR_2_SLOTS},
    Column, CuckooAlgorithm, CuckooIndex, IndexOptions, IndexStructure,
};

const NUM_ROWS: usize = 300;
const NUM_ROWS_PER_STRIPE: usize = 3;
const NUM_NEGATIVE_LOOKUPS: usize = 10_000;

/// A column with `num_rows / num_values`-long runs of increasing values.
fn fill_column(num_rows: usize, num_values: usize) -> Column {
    assert!(num_values > 0 && num_rows >= num_values && num_rows % num_values == 0);
    let factor = num_rows / num_values;
    Column::int_column(
        "int-column",
        (0..num_rows).map(|i| (i / factor) as i32).collect(),
    )
}

fn kicking_options(slots_per_bucket: usize, scan_rate: f64, prefix_bits: bool) -> IndexOptions {
    let max_load_factor = match slots_per_bucket {
        1 => MAX_LOAD_FACTOR_1_SLOT,
        2 => MAX_LOAD_FACTOR_2_SLOTS,
        other => panic!("unexpected bucket width {other}"),
    };
    IndexOptions {
        cuckoo_alg: CuckooAlgorithm::Kicking,
        max_load_factor,
        scan_rate,
        slots_per_bucket,
        prefix_bits_optimization: prefix_bits,
        rle_block_bitmaps: false,
    }
}

/// Checks that lookups of all member values are exact.
fn check_positive_lookups(column: &Column, index: &CuckooIndex) {
    let num_stripes = column.num_rows() / NUM_ROWS_PER_STRIPE;
    for value in column.distinct_values() {
        for stripe_id in 0..num_stripes {
            assert_eq!(
                index.stripe_contains(stripe_id, value),
                column.stripe_contains(NUM_ROWS_PER_STRIPE, stripe_id, value),
                "value={value} stripe={stripe_id}"
            );
        }
    }
}

/// Average scan rate over `NUM_NEGATIVE_LOOKUPS` non-member lookups.
fn negative_lookup_scan_rate(column: &Column, index: &CuckooIndex) -> f64 {
    let num_stripes = column.num_rows() / NUM_ROWS_PER_STRIPE;
    let start = column.max() + 1;
    assert!(start as i64 + NUM_NEGATIVE_LOOKUPS as i64 <= i32::MAX as i64);
    let mut false_positive_stripes = 0usize;
    for value in start..start + NUM_NEGATIVE_LOOKUPS as i32 {
        for stripe_id in 0..num_stripes {
            if index.stripe_contains(stripe_id, value) {
                false_positive_stripes += 1;
            }
        }
    }
    false_positive_stripes as f64 / (num_stripes * NUM_NEGATIVE_LOOKUPS) as f64
}

fn positive_lookups(num_values: usize, prefix_bits: bool) {
    let column = fill_column(NUM_ROWS, num_values);
    let (index, _) = CuckooIndex::build(
        &column,
        NUM_ROWS_PER_STRIPE,
        &kicking_options(2, 0.05, prefix_bits),
    )
    .unwrap();
    check_positive_lookups(&column, &index);
}

fn negative_lookups(num_values: usize, prefix_bits: bool) {
    let column = fill_column(NUM_ROWS, num_values);
    let (index, _) = CuckooIndex::build(
        &column,
        NUM_ROWS_PER_STRIPE,
        &kicking_options(2, 0.1, prefix_bits),
    )
    .unwrap();
    let scan_rate = negative_lookup_scan_rate(&column, &index);
    assert!(scan_rate <= 0.101, "scan rate {scan_rate} above bound");
}

#[test]
fn two_stripes_answer_exactly() {
    let column = Column::int_column("pair", vec![1, 1, 2, 2]);
    let (index, _) = CuckooIndex::build(&column, 2, &kicking_options(2, 0.05, false)).unwrap();
    assert!(index.stripe_contains(0, 1));
    assert!(index.stripe_contains(1, 2));
    assert!(!index.stripe_contains(0, 2));
    assert!(!index.stripe_contains(1, 1));
}

#[test]
fn positive_lookups_single_value() {
    positive_lookups(1, false);
}

#[test]
fn positive_lookups_single_value_with_prefix_bits_optimization() {
    positive_lookups(1, true);
}

#[test]
fn negative_lookups_single_value() {
    negative_lookups(1, false);
}

#[test]
fn negative_lookups_single_value_with_prefix_bits_optimization() {
    negative_lookups(1, true);
}

#[test]
fn positive_lookups_few_values() {
    positive_lookups(30, false);
}

#[test]
fn positive_lookups_few_values_with_prefix_bits_optimization() {
    positive_lookups(30, true);
}

#[test]
fn negative_lookups_few_values() {
    negative_lookups(30, false);
}

#[test]
fn negative_lookups_few_values_with_prefix_bits_optimization() {
    negative_lookups(30, true);
}

#[test]
fn positive_lookups_all_uniques() {
    positive_lookups(NUM_ROWS, false);
}

#[test]
fn positive_lookups_all_uniques_with_prefix_bits_optimization() {
    positive_lookups(NUM_ROWS, true);
}

#[test]
fn negative_lookups_all_uniques() {
    negative_lookups(NUM_ROWS, false);
}

#[test]
fn all_unique_rows_activate_one_slot_each() {
    let column = fill_column(NUM_ROWS, NUM_ROWS);
    let (index, _) = CuckooIndex::build(
        &column,
        NUM_ROWS_PER_STRIPE,
        &kicking_options(2, 0.05, false),
    )
    .unwrap();
    assert_eq!(index.active_slots(), NUM_ROWS);
}

#[test]
fn last_row_dropped() {
    // Only complete stripes are indexed: with 4 distinct rows and 3 rows
    // per stripe, the 4th value never enters the index.
    let column = fill_column(4, 4);
    let (index, _) = CuckooIndex::build(&column, 3, &kicking_options(2, 0.1, false)).unwrap();
    assert_eq!(index.active_slots(), 3);
}

/// Zipf sampler over `1..=num_elements` with exponent `q`, via inverse CDF.
struct Zipf {
    cdf: Vec<f64>,
}

impl Zipf {
    fn new(num_elements: usize, q: f64) -> Zipf {
        let mut cdf = Vec::with_capacity(num_elements);
        let mut total = 0.0;
        for k in 1..=num_elements {
            total += (k as f64).powf(-q);
            cdf.push(total);
        }
        for entry in &mut cdf {
            *entry /= total;
        }
        Zipf { cdf }
    }

    fn sample(&self, rng: &mut impl Rng) -> i32 {
        let u: f64 = rng.gen();
        (self.cdf.partition_point(|&p| p < u) + 1) as i32
    }
}

#[test]
fn zipf_column_builds_with_skewed_kicking() {
    let zipf = Zipf::new(100_000, 2.0);
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let data: Vec<i32> = (0..1_000_000).map(|_| zipf.sample(&mut rng)).collect();
    let column = Column::int_column("zipf", data);

    let options = IndexOptions {
        cuckoo_alg: CuckooAlgorithm::SkewedKicking,
        max_load_factor: MAX_LOAD_FACTOR_1_SLOT,
        scan_rate: 0.01,
        slots_per_bucket: 1,
        prefix_bits_optimization: false,
        rle_block_bitmaps: false,
    };
    let (index, stats) = CuckooIndex::build(&column, 16_384, &options).unwrap();
    assert!(
        stats.num_attempts <= 3,
        "needed {} placement attempts",
        stats.num_attempts
    );
    assert_eq!(stats.num_stripes, 61);
    // Spot-check a few member lookups against ground truth.
    for value in [1, 2, 17, 100] {
        if !column.contains(value) {
            continue;
        }
        for stripe_id in 0..index.num_stripes() {
            assert_eq!(
                index.stripe_contains(stripe_id, value),
                column.stripe_contains(16_384, stripe_id, value),
                "value={value} stripe={stripe_id}"
            );
        }
    }
}

#[test]
fn builds_are_deterministic() {
    let column = fill_column(NUM_ROWS, 100);
    let build = || {
        CuckooIndex::build(
            &column,
            NUM_ROWS_PER_STRIPE,
            &kicking_options(2, 0.05, false),
        )
        .unwrap()
    };
    let (index_a, stats_a) = build();
    let (index_b, stats_b) = build();
    assert_eq!(index_a.encode(), index_b.encode());
    assert_eq!(
        index_a.fingerprint_store().encode(false),
        index_b.fingerprint_store().encode(false)
    );
    assert_eq!(stats_a.max_kicks_observed, stats_b.max_kicks_observed);
}

#[test]
fn serialization_round_trip_answers_identically() {
    for &prefix_bits in &[false, true] {
        for &rle in &[false, true] {
            let column = fill_column(NUM_ROWS, 60);
            let mut options = kicking_options(2, 0.05, prefix_bits);
            options.rle_block_bitmaps = rle;
            let (index, _) = CuckooIndex::build(&column, NUM_ROWS_PER_STRIPE, &options).unwrap();

            let encoded = index.encode();
            let decoded = CuckooIndex::decode(&encoded, &options).unwrap();
            assert_eq!(decoded.num_stripes(), index.num_stripes());
            assert_eq!(decoded.active_slots(), index.active_slots());

            let num_stripes = index.num_stripes();
            for value in (-5..70).chain([1000, i32::MAX]) {
                for stripe_id in 0..num_stripes {
                    assert_eq!(
                        decoded.stripe_contains(stripe_id, value),
                        index.stripe_contains(stripe_id, value),
                        "value={value} stripe={stripe_id} prefix={prefix_bits} rle={rle}"
                    );
                }
            }
            // The decoded index re-encodes to the same bytes.
            assert_eq!(decoded.encode(), encoded);
        }
    }
}

#[test]
fn qualifying_stripes_cover_members() {
    let column = fill_column(NUM_ROWS, 30);
    let (index, _) = CuckooIndex::build(
        &column,
        NUM_ROWS_PER_STRIPE,
        &kicking_options(2, 0.05, false),
    )
    .unwrap();
    let num_stripes = column.num_rows() / NUM_ROWS_PER_STRIPE;
    for value in column.distinct_values() {
        let stripes = index.get_qualifying_stripes(value, num_stripes);
        for stripe_id in 0..num_stripes {
            if column.stripe_contains(NUM_ROWS_PER_STRIPE, stripe_id, value) {
                assert!(stripes.get(stripe_id), "missed value={value} stripe={stripe_id}");
            }
        }
    }
}

#[test]
fn dict_encoded_string_column_round_trips() {
    let cities = ["berlin", "oslo", "NULL", "lima", "oslo", "lima", "berlin", "NULL"];
    let column = Column::string_column(
        "city",
        cities.iter().map(|s| s.to_string()).collect(),
    );
    let (index, _) = CuckooIndex::build(&column, 2, &kicking_options(1, 0.1, false)).unwrap();
    for value in column.distinct_values() {
        for stripe_id in 0..4 {
            assert_eq!(
                index.stripe_contains(stripe_id, value),
                column.stripe_contains(2, stripe_id, value)
            );
        }
    }
}
