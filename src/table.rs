//! The canonical time-indexed table.
//!
//! A [`Table`] is a timestamp index plus named numeric columns kept in
//! insertion order. Invariants, checked by [`Table::from_columns`]:
//!
//! - every column has exactly one value slot per index entry;
//! - column names are unique;
//! - a missing value is `None` (a NaN read from a source is stored as `None`).
//!
//! The index is timezone-naive, not necessarily unique and not necessarily
//! regular. All operations return a new table; nothing mutates in place, so
//! one filtered table can feed several aggregation requests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use chrono::{Datelike, Duration, NaiveDateTime};

use crate::model::{Aggregator, ConsoError, Result};
use crate::resample::Frequency;

/// A named column of optional values.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Column {
            name: name.into(),
            values: values
                .into_iter()
                .map(|v| v.filter(|x| !x.is_nan()))
                .collect(),
        }
    }

    pub fn count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }
}

/// Which row survives when an index value is repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keep {
    First,
    Last,
}

/// Result of aggregating a table's rows by an integer key (hour-of-day
/// minutes, weekday hundredths, ...). Keys are sorted ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedAggregate {
    pub keys: Vec<i64>,
    pub columns: Vec<Column>,
}

impl KeyedAggregate {
    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    index: Vec<NaiveDateTime>,
    columns: Vec<Column>,
}

impl Table {
    /// The empty table (no rows, no columns): the initial accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_columns(index: Vec<NaiveDateTime>, columns: Vec<Column>) -> Result<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if column.values.len() != index.len() {
                return Err(ConsoError::InvalidTable(format!(
                    "column '{}' has {} values for {} index entries",
                    column.name,
                    column.values.len(),
                    index.len()
                )));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(ConsoError::InvalidTable(format!(
                    "duplicate column '{}'",
                    column.name
                )));
            }
        }
        Ok(Table { index, columns })
    }

    /// One-column table.
    pub fn single(
        index: Vec<NaiveDateTime>,
        name: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<Self> {
        Self::from_columns(index, vec![Column::new(name, values)])
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True when the table has no rows or no columns.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty() || self.columns.is_empty()
    }

    pub fn index(&self) -> &[NaiveDateTime] {
        &self.index
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Like [`Table::column`] but reports the available names on failure.
    pub fn require_column(&self, name: &str) -> Result<&[Option<f64>]> {
        self.column(name).ok_or_else(|| self.unknown_variable(name))
    }

    pub fn unknown_variable(&self, name: &str) -> ConsoError {
        ConsoError::UnknownVariable {
            name: name.to_string(),
            available: self.column_names(),
        }
    }

    /// Non-missing values in `name`, 0 for an unknown column.
    pub fn count(&self, name: &str) -> usize {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(Column::count)
            .unwrap_or(0)
    }

    /// Distinct calendar years of the index, ascending.
    pub fn years(&self) -> Vec<i32> {
        let years: HashSet<i32> = self.index.iter().map(|ts| ts.year()).collect();
        let mut years: Vec<i32> = years.into_iter().collect();
        years.sort_unstable();
        years
    }

    // -----------------------------------------------------------------------
    // Row and column selection
    // -----------------------------------------------------------------------

    /// New table made of the given rows, in the given order.
    pub fn take_rows(&self, rows: &[usize]) -> Table {
        Table {
            index: rows.iter().map(|&r| self.index[r]).collect(),
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    values: rows.iter().map(|&r| c.values[r]).collect(),
                })
                .collect(),
        }
    }

    /// Rows for which `keep(row_position, timestamp)` is true.
    pub fn filter_rows<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(usize, &NaiveDateTime) -> bool,
    {
        let rows: Vec<usize> = self
            .index
            .iter()
            .enumerate()
            .filter(|(i, ts)| keep(*i, ts))
            .map(|(i, _)| i)
            .collect();
        self.take_rows(&rows)
    }

    pub fn select_columns(&self, names: &[String]) -> Result<Table> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let values = self.require_column(name)?;
            columns.push(Column {
                name: name.clone(),
                values: values.to_vec(),
            });
        }
        Table::from_columns(self.index.clone(), columns)
    }

    /// Add a column, replacing any existing one with the same name.
    pub fn with_column(&self, name: &str, values: Vec<Option<f64>>) -> Result<Table> {
        let mut columns = self.columns.clone();
        let column = Column::new(name, values);
        match columns.iter().position(|c| c.name == name) {
            Some(pos) => columns[pos] = column,
            None => columns.push(column),
        }
        Table::from_columns(self.index.clone(), columns)
    }

    /// Rows where at least one column has a value.
    pub fn drop_empty_rows(&self) -> Table {
        self.filter_rows(|i, _| self.columns.iter().any(|c| c.values[i].is_some()))
    }

    /// Rows where every column has a value.
    pub fn drop_incomplete_rows(&self) -> Table {
        self.filter_rows(|i, _| self.columns.iter().all(|c| c.values[i].is_some()))
    }

    // -----------------------------------------------------------------------
    // Index operations
    // -----------------------------------------------------------------------

    /// Stable sort by timestamp.
    pub fn sort_by_index(&self) -> Table {
        if self.is_sorted() {
            return self.clone();
        }
        self.take_rows(&self.sorted_positions())
    }

    pub fn is_sorted(&self) -> bool {
        self.index.windows(2).all(|w| w[0] <= w[1])
    }

    fn sorted_positions(&self) -> Vec<usize> {
        let mut rows: Vec<usize> = (0..self.len()).collect();
        rows.sort_by_key(|&r| self.index[r]);
        rows
    }

    pub fn shift_index(&self, offset: Duration) -> Table {
        Table {
            index: self.index.iter().map(|ts| *ts + offset).collect(),
            columns: self.columns.clone(),
        }
    }

    /// Drop rows whose timestamp already appeared (`Keep::First`) or
    /// appears again later (`Keep::Last`). Surviving rows keep their order.
    pub fn drop_duplicate_index(&self, keep: Keep) -> Table {
        let mut chosen: HashMap<NaiveDateTime, usize> = HashMap::with_capacity(self.len());
        for (i, ts) in self.index.iter().enumerate() {
            match keep {
                Keep::First => {
                    chosen.entry(*ts).or_insert(i);
                }
                Keep::Last => {
                    chosen.insert(*ts, i);
                }
            }
        }
        self.filter_rows(|i, ts| chosen.get(ts) == Some(&i))
    }

    /// Number of rows sharing their timestamp with an earlier row.
    pub fn duplicate_count(&self) -> usize {
        let unique: HashSet<&NaiveDateTime> = self.index.iter().collect();
        self.len() - unique.len()
    }

    // -----------------------------------------------------------------------
    // Combination
    // -----------------------------------------------------------------------

    /// Stack `other` below `self`. Columns keep `self`'s order; columns only
    /// one side has are missing on the other side's rows.
    pub fn concat(&self, other: &Table) -> Table {
        let mut names = self.column_names();
        for name in other.column_names() {
            if !names.contains(&name) {
                names.push(name);
            }
        }

        let mut index = self.index.clone();
        index.extend_from_slice(&other.index);

        let columns = names
            .into_iter()
            .map(|name| {
                let mut values = match self.column(&name) {
                    Some(v) => v.to_vec(),
                    None => vec![None; self.len()],
                };
                match other.column(&name) {
                    Some(v) => values.extend_from_slice(v),
                    None => values.extend(std::iter::repeat_n(None, other.len())),
                }
                Column { name, values }
            })
            .collect();

        Table { index, columns }
    }

    /// Outer join on the index.
    ///
    /// The result is sorted by timestamp and holds the union of both
    /// indexes. A timestamp repeated on both sides yields the cross product
    /// of its rows. A column present on both sides is coalesced, the left
    /// value winning.
    pub fn outer_join(&self, other: &Table) -> Table {
        let left = self.sorted_positions();
        let right = other.sorted_positions();

        let mut index = Vec::with_capacity(left.len().max(right.len()));
        let mut pairs: Vec<(Option<usize>, Option<usize>)> = Vec::with_capacity(index.capacity());

        let (mut i, mut j) = (0, 0);
        while i < left.len() || j < right.len() {
            let lt = left.get(i).map(|&r| self.index[r]);
            let rt = right.get(j).map(|&r| other.index[r]);
            match (lt, rt) {
                (Some(a), Some(b)) if a == b => {
                    let i_end = i + left[i..].iter().take_while(|&&r| self.index[r] == a).count();
                    let j_end = j + right[j..].iter().take_while(|&&r| other.index[r] == b).count();
                    for &l in &left[i..i_end] {
                        for &r in &right[j..j_end] {
                            index.push(a);
                            pairs.push((Some(l), Some(r)));
                        }
                    }
                    i = i_end;
                    j = j_end;
                }
                (Some(a), Some(b)) if a < b => {
                    index.push(a);
                    pairs.push((Some(left[i]), None));
                    i += 1;
                }
                (Some(a), None) => {
                    index.push(a);
                    pairs.push((Some(left[i]), None));
                    i += 1;
                }
                (_, Some(b)) => {
                    index.push(b);
                    pairs.push((None, Some(right[j])));
                    j += 1;
                }
                (None, None) => break,
            }
        }

        let mut columns: Vec<Column> = self
            .columns
            .iter()
            .map(|c| {
                let shared = other.column(&c.name);
                let values = pairs
                    .iter()
                    .map(|&(l, r)| {
                        let left_value = l.and_then(|l| c.values[l]);
                        left_value.or_else(|| match (shared, r) {
                            (Some(values), Some(r)) => values[r],
                            _ => None,
                        })
                    })
                    .collect();
                Column {
                    name: c.name.clone(),
                    values,
                }
            })
            .collect();

        for c in &other.columns {
            if self.has_column(&c.name) {
                continue;
            }
            columns.push(Column {
                name: c.name.clone(),
                values: pairs.iter().map(|&(_, r)| r.and_then(|r| c.values[r])).collect(),
            });
        }

        Table { index, columns }
    }

    // -----------------------------------------------------------------------
    // Aggregation
    // -----------------------------------------------------------------------

    /// Re-bucket the index at `freq`, aggregating every column with `agg`.
    ///
    /// The result covers every bucket from the first to the last sample,
    /// including empty ones (missing, or 0 for `Sum`/`Count`).
    pub fn resample(&self, freq: &Frequency, agg: Aggregator) -> Table {
        let (Some(first), Some(last)) = (self.index.iter().min(), self.index.iter().max()) else {
            return Table {
                index: Vec::new(),
                columns: self
                    .columns
                    .iter()
                    .map(|c| Column {
                        name: c.name.clone(),
                        values: Vec::new(),
                    })
                    .collect(),
            };
        };

        let origin = freq.origin(*first);
        let first_id = freq.bucket_id(origin, *first);
        let last_id = freq.bucket_id(origin, *last);
        let n_buckets = (last_id - first_id + 1) as usize;

        let slots: Vec<usize> = self
            .index
            .iter()
            .map(|ts| (freq.bucket_id(origin, *ts) - first_id) as usize)
            .collect();

        let index = (first_id..=last_id)
            .map(|id| freq.bucket_start(origin, id))
            .collect();

        let columns = self
            .columns
            .iter()
            .map(|c| {
                let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); n_buckets];
                for (slot, value) in slots.iter().zip(&c.values) {
                    if let Some(v) = value {
                        buckets[*slot].push(*v);
                    }
                }
                Column {
                    name: c.name.clone(),
                    values: buckets.iter().map(|b| agg.apply(b)).collect(),
                }
            })
            .collect();

        Table { index, columns }
    }

    /// Trailing mean over `window` rows. A row gets a value only when the
    /// full window is available and has no missing value.
    pub fn rolling_mean(&self, window: usize) -> Table {
        if window <= 1 {
            return self.clone();
        }
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let values = (0..c.values.len())
                    .map(|i| {
                        if i + 1 < window {
                            return None;
                        }
                        let slice = &c.values[i + 1 - window..=i];
                        let sum: Option<f64> = slice.iter().copied().sum();
                        sum.map(|s| s / window as f64)
                    })
                    .collect();
                Column {
                    name: c.name.clone(),
                    values,
                }
            })
            .collect();
        Table {
            index: self.index.clone(),
            columns,
        }
    }

    /// Group rows by `keys[row]` and aggregate each column with `agg`.
    ///
    /// Columns named in `skip` are left out; columns without a single
    /// value are dropped.
    pub fn aggregate_by_key(&self, keys: &[i64], agg: Aggregator, skip: &[&str]) -> KeyedAggregate {
        let mut groups: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (row, key) in keys.iter().enumerate().take(self.len()) {
            groups.entry(*key).or_default().push(row);
        }

        let columns = self
            .columns
            .iter()
            .filter(|c| !skip.contains(&c.name.as_str()) && c.count() > 0)
            .map(|c| Column {
                name: c.name.clone(),
                values: groups
                    .values()
                    .map(|rows| {
                        let values: Vec<f64> = rows.iter().filter_map(|&r| c.values[r]).collect();
                        agg.apply(&values)
                    })
                    .collect(),
            })
            .collect();

        KeyedAggregate {
            keys: groups.into_keys().collect(),
            columns,
        }
    }
}

const DISPLAY_EDGE_ROWS: usize = 5;

impl fmt::Display for Table {
    /// Text grid with the first and last rows, like a dataframe preview.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<19}", "")?;
        for c in &self.columns {
            write!(f, "  {:>14}", c.name)?;
        }
        writeln!(f)?;

        let n = self.len();
        let rows: Vec<usize> = if n <= 2 * DISPLAY_EDGE_ROWS {
            (0..n).collect()
        } else {
            (0..DISPLAY_EDGE_ROWS).chain(n - DISPLAY_EDGE_ROWS..n).collect()
        };

        for (k, &row) in rows.iter().enumerate() {
            if n > 2 * DISPLAY_EDGE_ROWS && k == DISPLAY_EDGE_ROWS {
                writeln!(f, "...")?;
            }
            write!(f, "{}", self.index[row].format("%Y-%m-%d %H:%M:%S"))?;
            for c in &self.columns {
                match c.values[row] {
                    Some(v) => write!(f, "  {:>14.4}", v)?,
                    None => write!(f, "  {:>14}", "NaN")?,
                }
            }
            writeln!(f)?;
        }
        write!(f, "[{} rows x {} columns]", n, self.columns.len())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
