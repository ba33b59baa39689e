use bytes::Bytes;

use crate::types::{Cell, Column, RowKey};

/// Single-row put accumulating cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Put {
    pub row: RowKey,
    pub cells: Vec<Cell>,
}

impl Put {
    pub fn new(row: impl Into<RowKey>) -> Self {
        Self {
            row: row.into(),
            cells: Vec::new(),
        }
    }

    pub fn add_column(
        mut self,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        value: impl Into<Bytes>,
    ) -> Self {
        self.push(Cell::new(family, qualifier, value));
        self
    }

    pub fn push(&mut self, cell: Cell) {
        self.cells.push(cell);
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Point lookup of one row, optionally restricted to some columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Get {
    pub row: RowKey,
    pub columns: Vec<Column>,
}

impl Get {
    pub fn new(row: impl Into<RowKey>) -> Self {
        Self {
            row: row.into(),
            columns: Vec::new(),
        }
    }

    pub fn add_column(mut self, family: impl Into<Vec<u8>>, qualifier: impl Into<Vec<u8>>) -> Self {
        self.columns.push(Column::new(family, qualifier));
        self
    }

    pub fn with_columns(mut self, columns: &[Column]) -> Self {
        self.columns.extend_from_slice(columns);
        self
    }
}

/// Row-level delete; with no columns the whole row goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delete {
    pub row: RowKey,
    pub columns: Vec<Column>,
}

impl Delete {
    pub fn new(row: impl Into<RowKey>) -> Self {
        Self {
            row: row.into(),
            columns: Vec::new(),
        }
    }

    pub fn add_column(mut self, family: impl Into<Vec<u8>>, qualifier: impl Into<Vec<u8>>) -> Self {
        self.columns.push(Column::new(family, qualifier));
        self
    }

    pub fn is_whole_row(&self) -> bool {
        self.columns.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowFilter {
    /// Keeps rows whose key starts with these bytes.
    Prefix(Vec<u8>),
}

impl RowFilter {
    pub fn matches(&self, key: &[u8]) -> bool {
        match self {
            RowFilter::Prefix(prefix) => key.starts_with(prefix),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowBound {
    pub key: RowKey,
    pub inclusive: bool,
}

/// Forward scan over a key range.
///
/// `caching` is the number of rows fetched per page; `batch`, when set, caps
/// the number of cells returned per result so wide rows come back in parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scan {
    pub start: Option<RowBound>,
    pub stop: Option<RowBound>,
    pub filter: Option<RowFilter>,
    pub columns: Vec<Column>,
    pub caching: usize,
    pub batch: Option<usize>,
}

impl Default for Scan {
    fn default() -> Self {
        Self {
            start: None,
            stop: None,
            filter: None,
            columns: Vec::new(),
            caching: 1,
            batch: None,
        }
    }
}

impl Scan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_start_row(mut self, key: impl Into<RowKey>, inclusive: bool) -> Self {
        self.start = Some(RowBound { key: key.into(), inclusive });
        self
    }

    pub fn with_stop_row(mut self, key: impl Into<RowKey>, inclusive: bool) -> Self {
        self.stop = Some(RowBound { key: key.into(), inclusive });
        self
    }

    pub fn with_filter(mut self, filter: RowFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn add_column(mut self, family: impl Into<Vec<u8>>, qualifier: impl Into<Vec<u8>>) -> Self {
        self.columns.push(Column::new(family, qualifier));
        self
    }

    pub fn with_columns(mut self, columns: &[Column]) -> Self {
        self.columns.extend_from_slice(columns);
        self
    }

    pub fn with_caching(mut self, rows: usize) -> Self {
        self.caching = rows.max(1);
        self
    }

    pub fn with_batch(mut self, cells: usize) -> Self {
        self.batch = if cells == 0 { None } else { Some(cells) };
        self
    }

    /// True once `key` sorts beyond the stop boundary.
    pub fn is_past_stop(&self, key: &[u8]) -> bool {
        match &self.stop {
            Some(stop) if stop.inclusive => key > stop.key.as_slice(),
            Some(stop) => key >= stop.key.as_slice(),
            None => false,
        }
    }

    pub fn is_before_start(&self, key: &[u8]) -> bool {
        match &self.start {
            Some(start) if start.inclusive => key < start.key.as_slice(),
            Some(start) => key <= start.key.as_slice(),
            None => false,
        }
    }

    /// Whether a row with this key belongs in the scan result.
    pub fn matches_key(&self, key: &[u8]) -> bool {
        !self.is_before_start(key)
            && !self.is_past_stop(key)
            && self.filter.as_ref().map_or(true, |f| f.matches(key))
    }

    pub fn selects(&self, column: &Column) -> bool {
        self.columns.is_empty() || self.columns.contains(column)
    }
}
