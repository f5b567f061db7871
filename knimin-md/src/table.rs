//! Keyed metadata table
//!
//! Rows are held in key order so serialized output is stable across runs.
//! Columns keep the order in which they were first added. A row with no
//! entry for a column is absent (serialized as an empty field), which is
//! distinct from a `Cell::Unspecified` value.

use crate::types::Cell;
use std::collections::{BTreeMap, HashMap};

/// One table row: column name to cell
pub type Row = HashMap<String, Cell>;

/// How a join treats left-side keys without a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// Keep only keys present on both sides
    Inner,
    /// Keep every left key; unmatched right columns stay absent
    Left,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    index_name: String,
    columns: Vec<String>,
    rows: BTreeMap<String, Row>,
}

impl Table {
    pub fn new(index_name: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
            columns: Vec::new(),
            rows: BTreeMap::new(),
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row keys in order
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.rows.keys()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.rows.contains_key(key)
    }

    pub fn row(&self, key: &str) -> Option<&Row> {
        self.rows.get(key)
    }

    pub fn get(&self, key: &str, column: &str) -> Option<&Cell> {
        self.rows.get(key).and_then(|row| row.get(column))
    }

    /// Register a column without assigning any values
    pub fn add_column(&mut self, column: &str) {
        if !self.has_column(column) {
            self.columns.push(column.to_string());
        }
    }

    /// Insert or extend the row at `key`, registering new columns in iteration order
    pub fn insert_row<I>(&mut self, key: impl Into<String>, cells: I)
    where
        I: IntoIterator<Item = (String, Cell)>,
    {
        let key = key.into();
        let mut incoming = Vec::new();
        for (column, cell) in cells {
            self.add_column(&column);
            incoming.push((column, cell));
        }
        self.rows.entry(key).or_default().extend(incoming);
    }

    /// Set a single cell; the row must already exist
    pub fn set(&mut self, key: &str, column: &str, cell: Cell) {
        if let Some(row) = self.rows.get_mut(key) {
            row.insert(column.to_string(), cell);
            self.add_column(column);
        }
    }

    /// Assign the same value to every row
    pub fn fill_constant(&mut self, column: &str, cell: Cell) {
        self.add_column(column);
        for row in self.rows.values_mut() {
            row.insert(column.to_string(), cell.clone());
        }
    }

    /// Give every row a value for every column, using `cell` where none is set
    pub fn fill_missing(&mut self, cell: Cell) {
        for row in self.rows.values_mut() {
            for column in &self.columns {
                row.entry(column.clone()).or_insert_with(|| cell.clone());
            }
        }
    }

    /// Compute a column from each row
    pub fn derive_column<F>(&mut self, column: &str, mut f: F)
    where
        F: FnMut(&str, &Row) -> Cell,
    {
        self.add_column(column);
        for (key, row) in self.rows.iter_mut() {
            let cell = f(key, row);
            row.insert(column.to_string(), cell);
        }
    }

    /// Drop columns that are present; names not in the table are ignored
    pub fn drop_columns<S: AsRef<str>>(&mut self, columns: &[S]) {
        let doomed: Vec<&str> = columns.iter().map(|c| c.as_ref()).collect();
        self.columns.retain(|c| !doomed.contains(&c.as_str()));
        for row in self.rows.values_mut() {
            for column in &doomed {
                row.remove(*column);
            }
        }
    }

    /// Rename every column through `f`
    pub fn rename_columns<F>(&mut self, f: F)
    where
        F: Fn(&str) -> String,
    {
        let renamed: Vec<(String, String)> =
            self.columns.iter().map(|c| (c.clone(), f(c))).collect();
        for row in self.rows.values_mut() {
            for (old, new) in &renamed {
                if let Some(cell) = row.remove(old) {
                    row.insert(new.clone(), cell);
                }
            }
        }
        self.columns = renamed.into_iter().map(|(_, new)| new).collect();
    }

    /// Left join another table on the row key
    ///
    /// Columns of `other` are appended; rows of `self` without a match keep
    /// those columns absent.
    pub fn left_join(&mut self, other: &Table) {
        for column in &other.columns {
            self.add_column(column);
        }
        for (key, row) in self.rows.iter_mut() {
            if let Some(other_row) = other.rows.get(key) {
                for (column, cell) in other_row {
                    row.insert(column.clone(), cell.clone());
                }
            }
        }
    }

    /// Re-key rows through a `(current key, new key)` mapping
    ///
    /// Every mapping entry produces one output row (one current key may fan
    /// out to several new keys). The current key is kept as the first
    /// column, named after this table's index. With `JoinKind::Inner`
    /// entries whose current key has no row are skipped; with
    /// `JoinKind::Left` they produce a row holding only the key column.
    pub fn rekey(&self, mapping: &[(String, String)], new_index: &str, how: JoinKind) -> Table {
        let mut out = Table::new(new_index);
        out.add_column(&self.index_name);
        for column in &self.columns {
            if column != &self.index_name && column != new_index {
                out.add_column(column);
            }
        }

        for (current, new_key) in mapping {
            let source = self.rows.get(current);
            if source.is_none() && how == JoinKind::Inner {
                continue;
            }

            let mut row = Row::new();
            row.insert(self.index_name.clone(), Cell::text(current.clone()));
            if let Some(source) = source {
                for (column, cell) in source {
                    if column != &self.index_name && column != new_index {
                        row.insert(column.clone(), cell.clone());
                    }
                }
            }
            out.rows.insert(new_key.clone(), row);
        }

        out
    }

    /// Append the rows of another table, unioning columns
    pub fn append(&mut self, other: Table) {
        for column in &other.columns {
            self.add_column(column);
        }
        for (key, row) in other.rows {
            self.rows.insert(key, row);
        }
    }

    /// Serialize as tab-separated text with a header row
    ///
    /// The first column is the row key, headed by the index name.
    pub fn to_tsv(&self) -> Result<String, csv::Error> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        let mut header = Vec::with_capacity(self.columns.len() + 1);
        header.push(self.index_name.as_str());
        header.extend(self.columns.iter().map(String::as_str));
        writer.write_record(&header)?;

        for (key, row) in &self.rows {
            let mut record = Vec::with_capacity(self.columns.len() + 1);
            record.push(key.as_str());
            for column in &self.columns {
                record.push(row.get(column).map(Cell::as_str).unwrap_or(""));
            }
            writer.write_record(&record)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| {
                csv::Error::from(std::io::Error::new(e.error().kind(), e.error().to_string()))
            })?;
        String::from_utf8(bytes).map_err(|e| {
            csv::Error::from(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }
}
