//! Column and table inputs for the indexer.
//!
//! The index itself only ever sees a sequence of 32-bit integers. String
//! columns are dict-encoded up front: distinct strings get dense ids in an
//! order-preserving way, with id 0 reserved for NULL. Order preservation
//! keeps min/max pruning meaningful for dict-encoded data.

use std::collections::BTreeSet;
use std::path::Path;

use ahash::{AHashMap, AHashSet};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{Error, Result};

/// Dict-encoded id of NULL values.
pub const INT_NULL_SENTINEL: i32 = 0;
/// The string spelling recognized as NULL in CSV inputs.
pub const STRING_NULL_SENTINEL: &str = "NULL";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataType {
    String,
    Int,
}

/// A named, frozen column of dict-encoded or plain integers.
pub struct Column {
    name: String,
    data_type: DataType,
    data: Vec<i32>,
    distinct_values: AHashSet<i32>,
    min: i32,
    max: i32,
}

impl Column {
    /// Wraps an already-integer column.
    pub fn int_column(name: impl Into<String>, data: Vec<i32>) -> Column {
        Self::from_encoded(name.into(), DataType::Int, data)
    }

    /// Dict-encodes a string column. Distinct strings are assigned dense
    /// ids in sort order; NULL gets id 0.
    pub fn string_column(name: impl Into<String>, data: Vec<String>) -> Column {
        let mut distinct: BTreeSet<&str> = data.iter().map(String::as_str).collect();
        distinct.remove(STRING_NULL_SENTINEL);

        let mut dict: AHashMap<&str, i32> = AHashMap::with_capacity(distinct.len() + 1);
        dict.insert(STRING_NULL_SENTINEL, INT_NULL_SENTINEL);
        for (i, s) in distinct.iter().enumerate() {
            dict.insert(s, i as i32 + 1);
        }
        let encoded = data.iter().map(|s| dict[s.as_str()]).collect();
        Self::from_encoded(name.into(), DataType::String, encoded)
    }

    fn from_encoded(name: String, data_type: DataType, data: Vec<i32>) -> Column {
        let distinct_values: AHashSet<i32> = data.iter().copied().collect();
        let min = data.iter().copied().min().unwrap_or(0);
        let max = data.iter().copied().max().unwrap_or(0);
        Column {
            name,
            data_type,
            data,
            distinct_values,
            min,
            max,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn data(&self) -> &[i32] {
        &self.data
    }

    #[inline]
    pub fn value(&self, row: usize) -> i32 {
        self.data[row]
    }

    pub fn num_rows(&self) -> usize {
        self.data.len()
    }

    pub fn num_distinct_values(&self) -> usize {
        self.distinct_values.len()
    }

    /// Distinct values in ascending order.
    pub fn distinct_values(&self) -> Vec<i32> {
        let mut values: Vec<i32> = self.distinct_values.iter().copied().collect();
        values.sort_unstable();
        values
    }

    pub fn contains(&self, value: i32) -> bool {
        self.distinct_values.contains(&value)
    }

    pub fn min(&self) -> i32 {
        self.min
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    /// Ground truth: does stripe `stripe_id` contain `value`?
    ///
    /// # Panics
    ///
    /// Panics if `stripe_id` is past the last complete stripe.
    pub fn stripe_contains(
        &self,
        num_rows_per_stripe: usize,
        stripe_id: usize,
        value: i32,
    ) -> bool {
        let num_stripes = self.data.len() / num_rows_per_stripe;
        assert!(
            stripe_id < num_stripes,
            "stripe {stripe_id} out of range ({num_stripes})"
        );
        let begin = stripe_id * num_rows_per_stripe;
        self.data[begin..begin + num_rows_per_stripe]
            .iter()
            .any(|&v| v == value)
    }

    /// Reorders rows; `indexes[i]` names the row to move to position `i`.
    pub fn reorder(&mut self, indexes: &[usize]) {
        assert_eq!(self.data.len(), indexes.len());
        self.data = indexes.iter().map(|&i| self.data[i]).collect();
    }
}

/// A set of equally long columns.
pub struct Table {
    name: String,
    columns: Vec<Column>,
}

impl Table {
    pub fn create(name: impl Into<String>, columns: Vec<Column>) -> Result<Table> {
        if let Some(first) = columns.first() {
            let num_rows = first.num_rows();
            for column in &columns {
                if column.num_rows() != num_rows {
                    return Err(Error::config(format!(
                        "column '{}' has {} rows, expected {num_rows}",
                        column.name(),
                        column.num_rows()
                    )));
                }
            }
        }
        Ok(Table {
            name: name.into(),
            columns,
        })
    }

    /// Loads the named columns from a CSV file.
    ///
    /// Columns whose values are all unsigned digit strings (or NULL) are
    /// parsed as integers, the rest are dict-encoded strings. The parser
    /// splits on commas and does not handle quoting; evaluation inputs are
    /// plain numeric/text tables.
    pub fn from_csv(path: impl AsRef<Path>, column_names: &[String]) -> Result<Table> {
        let contents = std::fs::read_to_string(&path)?;
        let mut lines = contents.lines();
        let header = lines
            .next()
            .ok_or_else(|| Error::format("empty CSV file"))?;
        let present: Vec<&str> = header.split(',').map(str::trim).collect();

        let mut indices = Vec::with_capacity(column_names.len());
        for name in column_names {
            let index = present.iter().position(|&p| p == name).ok_or_else(|| {
                Error::config(format!(
                    "unknown column '{name}'; available columns: {}",
                    present.join(",")
                ))
            })?;
            indices.push(index);
        }

        let mut csv_data: Vec<Vec<String>> = vec![Vec::new(); column_names.len()];
        for (line_no, line) in lines.enumerate() {
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            for (i, &index) in indices.iter().enumerate() {
                let field = fields.get(index).ok_or_else(|| {
                    Error::format(format!("row {} has only {} fields", line_no + 2, fields.len()))
                })?;
                csv_data[i].push((*field).to_string());
            }
        }

        let mut columns = Vec::with_capacity(column_names.len());
        for (name, mut values) in column_names.iter().zip(csv_data) {
            let is_int = values.iter().all(|v| {
                v == STRING_NULL_SENTINEL
                    || (!v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()))
            });
            if is_int {
                for value in &mut values {
                    if value == STRING_NULL_SENTINEL {
                        *value = INT_NULL_SENTINEL.to_string();
                    }
                }
                let data = values
                    .iter()
                    .map(|v| {
                        v.parse::<i32>().map_err(|_| {
                            Error::format(format!("integer value '{v}' out of range"))
                        })
                    })
                    .collect::<Result<Vec<i32>>>()?;
                columns.push(Column::int_column(name.clone(), data));
            } else {
                columns.push(Column::string_column(name.clone(), values));
            }
        }
        Table::create("csv_table", columns)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name() == name)
    }

    /// Randomly shuffles the table rows, the same way for all columns.
    /// Seeded, so shuffles are reproducible.
    pub fn shuffle(&mut self) {
        let num_rows = match self.columns.first() {
            Some(column) => column.num_rows(),
            None => return,
        };
        let mut indexes: Vec<usize> = (0..num_rows).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        indexes.shuffle(&mut rng);
        for column in &mut self.columns {
            column.reorder(&indexes);
        }
    }

    /// Sorts rows lexicographically by all columns, lowest cardinality
    /// first. Clusters equal values, which shrinks per-value stripe
    /// bitmaps.
    pub fn sort_with_cardinality_key(&mut self) {
        let num_rows = match self.columns.first() {
            Some(column) => column.num_rows(),
            None => return,
        };
        let mut column_order: Vec<usize> = (0..self.columns.len()).collect();
        column_order.sort_by_key(|&i| self.columns[i].num_distinct_values());

        let mut indexes: Vec<usize> = (0..num_rows).collect();
        indexes.sort_by(|&row, &other_row| {
            for &c in &column_order {
                let column = &self.columns[c];
                match column.value(row).cmp(&column.value(other_row)) {
                    std::cmp::Ordering::Equal => continue,
                    ordering => return ordering,
                }
            }
            std::cmp::Ordering::Equal
        });
        for column in &mut self.columns {
            column.reorder(&indexes);
        }
    }
}

/// Generates a column of `num_rows` values drawn uniformly from
/// `[0, num_distinct)`, seeded for reproducibility.
pub fn generate_uniform_column(num_rows: usize, num_distinct: usize, seed: u64) -> Column {
    assert!(num_distinct > 0);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let data = (0..num_rows)
        .map(|_| rng.gen_range(0..num_distinct as i32))
        .collect();
    Column::int_column("uniform", data)
}
