use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};

/// Opaque row identifier, ordered lexicographically over its raw bytes.
pub type RowKey = Vec<u8>;

/// Cells of one row keyed by `"family:qualifier"`.
pub type CellMap = HashMap<String, Bytes>;

/// Scan results keyed by row, in row-key order.
pub type RowMap = BTreeMap<RowKey, CellMap>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Column {
    pub family: Vec<u8>,
    pub qualifier: Vec<u8>,
}

impl Column {
    pub fn new(family: impl Into<Vec<u8>>, qualifier: impl Into<Vec<u8>>) -> Self {
        Self {
            family: family.into(),
            qualifier: qualifier.into(),
        }
    }

    /// The `"family:qualifier"` form used as a [`CellMap`] key.
    pub fn map_key(&self) -> String {
        column_key(&self.family, &self.qualifier)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub family: Vec<u8>,
    pub qualifier: Vec<u8>,
    pub value: Bytes,
}

impl Cell {
    pub fn new(
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        value: impl Into<Bytes>,
    ) -> Self {
        Self {
            family: family.into(),
            qualifier: qualifier.into(),
            value: value.into(),
        }
    }

    pub fn column(&self) -> Column {
        Column::new(self.family.clone(), self.qualifier.clone())
    }

    pub fn map_key(&self) -> String {
        column_key(&self.family, &self.qualifier)
    }
}

/// One row as returned by a get or by a scanner page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row {
    pub key: RowKey,
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn new(key: impl Into<RowKey>, cells: Vec<Cell>) -> Self {
        Self {
            key: key.into(),
            cells,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Flattens the cells into `map`; a later cell with the same column wins.
    pub fn merge_into(self, map: &mut CellMap) {
        for cell in self.cells {
            map.insert(cell.map_key(), cell.value);
        }
    }

    pub fn into_cell_map(self) -> CellMap {
        let mut map = CellMap::with_capacity(self.cells.len());
        self.merge_into(&mut map);
        map
    }
}

/// Result of an explicit buffer flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The buffer was submitted in one request holding this many row mutations.
    Flushed(usize),
    /// No buffer was open; nothing was sent.
    NothingBuffered,
}

fn column_key(family: &[u8], qualifier: &[u8]) -> String {
    format!(
        "{}:{}",
        String::from_utf8_lossy(family),
        String::from_utf8_lossy(qualifier)
    )
}
