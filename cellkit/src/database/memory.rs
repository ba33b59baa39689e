//! In-memory implementation of the store client.
//!
//! Tables are ordered maps of rows, so scans see keys in the same bytewise
//! order a real cluster returns. Failure switches on [`MemoryStore`] and
//! [`MemoryConnectionFactory`] let tests drive the facade's error paths.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use crate::config::StoreConfig;
use crate::errors::StoreError;
use crate::types::{Cell, Column, Row, RowKey};

use super::client::{ConnectionFactory, RowScanner, StoreConnection, StoreTable};
use super::request::{Delete, Get, Put, Scan};

type TableData = BTreeMap<RowKey, BTreeMap<Column, Bytes>>;

/// Shared in-memory cluster state. Clones see the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<HashMap<String, TableData>>>,
    unavailable: Arc<AtomicBool>,
    open_tables: Arc<AtomicUsize>,
    pages_fetched: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&self, name: &str) {
        self.tables.write().entry(name.to_string()).or_default();
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.read().contains_key(name)
    }

    pub fn row_count(&self, table: &str) -> Option<usize> {
        self.tables.read().get(table).map(|rows| rows.len())
    }

    /// Table handles opened and not yet closed.
    pub fn open_tables(&self) -> usize {
        self.open_tables.load(Ordering::SeqCst)
    }

    /// Scanner pages served so far.
    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched.load(Ordering::SeqCst)
    }

    /// While set, every RPC and health check fails with a transport error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::TransportError("region server unreachable".into()));
        }
        Ok(())
    }

    fn with_table<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut TableData) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.write();
        let data = tables
            .get_mut(name)
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))?;
        f(data)
    }

    fn put(&self, name: &str, puts: &[Put]) -> Result<(), StoreError> {
        if let Some(empty) = puts.iter().find(|p| p.is_empty()) {
            return Err(StoreError::TransportError(format!(
                "no columns to insert for row {}",
                String::from_utf8_lossy(&empty.row)
            )));
        }
        self.with_table(name, |data| {
            for put in puts {
                let row = data.entry(put.row.clone()).or_default();
                for cell in &put.cells {
                    row.insert(cell.column(), cell.value.clone());
                }
            }
            Ok(())
        })
    }

    fn get(&self, name: &str, get: Get) -> Result<Row, StoreError> {
        self.with_table(name, |data| {
            let cells = data
                .get(&get.row)
                .map(|row| project(row, &get.columns))
                .unwrap_or_default();
            Ok(Row::new(get.row, cells))
        })
    }

    fn delete(&self, name: &str, deletes: Vec<Delete>) -> Result<(), StoreError> {
        self.with_table(name, |data| {
            for delete in deletes {
                if delete.is_whole_row() {
                    data.remove(&delete.row);
                    continue;
                }
                let now_empty = match data.get_mut(&delete.row) {
                    Some(row) => {
                        for column in &delete.columns {
                            row.remove(column);
                        }
                        row.is_empty()
                    }
                    None => false,
                };
                if now_empty {
                    data.remove(&delete.row);
                }
            }
            Ok(())
        })
    }

    /// Up to `scan.caching` matching rows strictly after `after`.
    fn fetch_page(&self, name: &str, scan: &Scan, after: Option<&RowKey>) -> Result<Vec<Row>, StoreError> {
        self.with_table(name, |data| {
            let lower = match (after, &scan.start) {
                (Some(last), _) => Bound::Excluded(last.clone()),
                (None, Some(start)) if start.inclusive => Bound::Included(start.key.clone()),
                (None, Some(start)) => Bound::Excluded(start.key.clone()),
                (None, None) => Bound::Unbounded,
            };

            let rows = data
                .range((lower, Bound::Unbounded))
                .take_while(|(key, _)| !scan.is_past_stop(key))
                .filter(|(key, _)| scan.matches_key(key))
                .map(|(key, row)| Row::new(key.clone(), project(row, &scan.columns)))
                .filter(|row| !row.is_empty())
                .take(scan.caching)
                .collect();

            self.pages_fetched.fetch_add(1, Ordering::SeqCst);
            Ok(rows)
        })
    }
}

fn project(row: &BTreeMap<Column, Bytes>, columns: &[Column]) -> Vec<Cell> {
    row.iter()
        .filter(|(column, _)| columns.is_empty() || columns.contains(column))
        .map(|(column, value)| Cell::new(column.family.clone(), column.qualifier.clone(), value.clone()))
        .collect()
}

/// Connection factory over a [`MemoryStore`] with injectable connect failures.
pub struct MemoryConnectionFactory {
    store: MemoryStore,
    attempts: AtomicU32,
    fail_remaining: AtomicU32,
    active: Mutex<Option<Arc<MemoryConnection>>>,
}

impl MemoryConnectionFactory {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            attempts: AtomicU32::new(0),
            fail_remaining: AtomicU32::new(0),
            active: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// The next `count` connection attempts fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.fail_remaining.store(count, Ordering::SeqCst);
    }

    pub fn connect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Closes the most recently created connection, as a dropped session would.
    pub fn close_active(&self) {
        if let Some(conn) = self.active.lock().as_ref() {
            conn.closed.store(true, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl ConnectionFactory for MemoryConnectionFactory {
    async fn create(&self, config: &StoreConfig) -> Result<Arc<dyn StoreConnection>, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::ConnectionError(format!(
                "coordination quorum {}:{} unreachable",
                config.quorum(),
                config.port
            )));
        }

        let conn = Arc::new(MemoryConnection {
            store: self.store.clone(),
            closed: Arc::new(AtomicBool::new(false)),
        });
        *self.active.lock() = Some(conn.clone());
        Ok(conn)
    }
}

pub struct MemoryConnection {
    store: MemoryStore,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::ConnectionError("connection is closed".into()));
        }
        self.store.check_available()
    }

    fn table(&self, name: &str) -> Result<Box<dyn StoreTable>, StoreError> {
        if self.is_closed() {
            return Err(StoreError::ConnectionError("connection is closed".into()));
        }
        if !self.store.has_table(name) {
            return Err(StoreError::TableNotFound(name.to_string()));
        }
        self.store.open_tables.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryTable {
            store: self.store.clone(),
            name: name.to_string(),
            connection_closed: self.closed.clone(),
            closed: false,
        }))
    }

    fn driver_name(&self) -> &str {
        "memory"
    }
}

pub struct MemoryTable {
    store: MemoryStore,
    name: String,
    connection_closed: Arc<AtomicBool>,
    closed: bool,
}

impl MemoryTable {
    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::InvalidState(format!("table {} is closed", self.name)));
        }
        if self.connection_closed.load(Ordering::SeqCst) {
            return Err(StoreError::ConnectionError("connection is closed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTable for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, puts: &[Put]) -> Result<(), StoreError> {
        self.check_open()?;
        self.store.put(&self.name, puts)
    }

    async fn get(&self, get: Get) -> Result<Row, StoreError> {
        self.check_open()?;
        self.store.get(&self.name, get)
    }

    async fn scan(&self, scan: Scan) -> Result<Box<dyn RowScanner>, StoreError> {
        self.check_open()?;
        self.store.check_available()?;
        Ok(Box::new(MemoryScanner {
            store: self.store.clone(),
            table: self.name.clone(),
            scan,
            last_key: None,
            page: VecDeque::new(),
            exhausted: false,
        }))
    }

    async fn delete(&self, deletes: Vec<Delete>) -> Result<(), StoreError> {
        self.check_open()?;
        self.store.delete(&self.name, deletes)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if !self.closed {
            self.closed = true;
            self.store.open_tables.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Pages through a table `scan.caching` rows at a time.
///
/// Rows with more than `scan.batch` cells are returned as several partial
/// results sharing the row key.
pub struct MemoryScanner {
    store: MemoryStore,
    table: String,
    scan: Scan,
    last_key: Option<RowKey>,
    page: VecDeque<Row>,
    exhausted: bool,
}

impl MemoryScanner {
    fn fill_page(&mut self) -> Result<(), StoreError> {
        let rows = self.store.fetch_page(&self.table, &self.scan, self.last_key.as_ref())?;
        if rows.len() < self.scan.caching {
            self.exhausted = true;
        }
        if let Some(last) = rows.last() {
            self.last_key = Some(last.key.clone());
        }

        for row in rows {
            match self.scan.batch {
                Some(batch) if row.cells.len() > batch => {
                    for chunk in row.cells.chunks(batch) {
                        self.page.push_back(Row::new(row.key.clone(), chunk.to_vec()));
                    }
                }
                _ => self.page.push_back(row),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RowScanner for MemoryScanner {
    async fn next_row(&mut self) -> Result<Option<Row>, StoreError> {
        if self.page.is_empty() && !self.exhausted {
            self.fill_page()?;
        }
        Ok(self.page.pop_front())
    }
}
