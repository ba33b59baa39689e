use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, error, info};

use crate::buffer::WriteBuffer;
use crate::config::StoreConfig;
use crate::database::client::{ConnectionFactory, StoreTable, TableGuard};
use crate::database::connection::ConnectionManager;
use crate::database::request::{Delete, Get, Put, RowFilter, Scan};
use crate::database::retry::RetryPolicy;
use crate::errors::StoreError;
use crate::metrics;
use crate::types::{Cell, CellMap, Column, FlushOutcome, Row, RowKey, RowMap};

/// Data-access facade over a wide-column store.
///
/// Every operation makes sure the shared connection is alive, opens a table
/// handle for the duration of one call and releases it on every exit path.
/// Failures are logged here and returned as a typed [`StoreError`].
///
/// Reads, single-row writes and deletes take `&self`. The bulk-load buffer
/// operations take `&mut self`, which makes a facade single-writer for
/// buffered loads.
pub struct CellStore {
    connections: ConnectionManager,
    scan_cache: usize,
    include_start: bool,
    include_stop: bool,
    buffer: WriteBuffer,
}

impl CellStore {
    /// Builds a facade; the connection is opened on first use.
    pub fn new(factory: Arc<dyn ConnectionFactory>, config: StoreConfig) -> Self {
        let scan_cache = config.scan_cache.max(1);
        let include_start = config.include_start;
        let include_stop = config.include_stop;
        let buffer = WriteBuffer::new(config.max_buffer_size);
        Self {
            connections: ConnectionManager::new(factory, config),
            scan_cache,
            include_start,
            include_stop,
            buffer,
        }
    }

    /// Validates `config` and connects eagerly.
    pub async fn connect(
        factory: Arc<dyn ConnectionFactory>,
        config: StoreConfig,
    ) -> Result<Self, StoreError> {
        config.validate()?;
        let store = Self::new(factory, config);
        store.ensure_connection().await?;
        Ok(store)
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.connections = self.connections.with_retry_policy(retry);
        self
    }

    pub fn config(&self) -> &StoreConfig {
        self.connections.config()
    }

    pub fn set_scan_cache(&mut self, rows: usize) {
        self.scan_cache = rows.max(1);
    }

    pub fn set_include_start(&mut self, include: bool) {
        self.include_start = include;
    }

    pub fn set_include_stop(&mut self, include: bool) {
        self.include_stop = include;
    }

    pub fn set_max_buffer_size(&mut self, max: usize) {
        self.buffer.set_max_size(max);
    }

    /// Opens or heals the shared connection.
    pub async fn ensure_connection(&self) -> Result<(), StoreError> {
        match self.connections.ensure_connection().await {
            Ok(_) => Ok(()),
            Err(e) => {
                error!("Unable to reach store cluster: {}", e);
                Err(e)
            }
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.connections.is_connected().await
    }

    // ---- single-row writes ----

    pub async fn insert_cell(
        &self,
        table: &str,
        row: impl Into<RowKey>,
        family: impl Into<Vec<u8>>,
        column: impl Into<Vec<u8>>,
        value: impl Into<Bytes>,
    ) -> Result<(), StoreError> {
        let put = Put::new(row).add_column(family, column, value);
        self.observe("insert_cell", table, self.submit_puts(table, &[put])).await
    }

    /// Writes several qualifiers of one family in a single put.
    pub async fn insert_cells<Q, V>(
        &self,
        table: &str,
        row: impl Into<RowKey>,
        family: impl Into<Vec<u8>>,
        columns: impl IntoIterator<Item = (Q, V)>,
    ) -> Result<(), StoreError>
    where
        Q: Into<Vec<u8>>,
        V: Into<Bytes>,
    {
        let family = family.into();
        let mut put = Put::new(row);
        for (qualifier, value) in columns {
            put.push(Cell::new(family.clone(), qualifier, value));
        }
        self.observe("insert_cells", table, self.submit_puts(table, &[put])).await
    }

    /// Writes any set of `(family, qualifier)` cells of one row in a single put.
    pub async fn insert_family_cells<F, C, Q, V>(
        &self,
        table: &str,
        row: impl Into<RowKey>,
        families: impl IntoIterator<Item = (F, C)>,
    ) -> Result<(), StoreError>
    where
        F: Into<Vec<u8>>,
        C: IntoIterator<Item = (Q, V)>,
        Q: Into<Vec<u8>>,
        V: Into<Bytes>,
    {
        let mut put = Put::new(row);
        for (family, columns) in families {
            let family = family.into();
            for (qualifier, value) in columns {
                put.push(Cell::new(family.clone(), qualifier, value));
            }
        }
        self.observe("insert_family_cells", table, self.submit_puts(table, &[put])).await
    }

    // ---- buffered bulk writes ----

    /// Clears the pending mutation and any buffered mutations.
    pub fn begin_buffer(&mut self) {
        self.buffer.reset();
    }

    /// Starts a pending mutation for `row`. An unfinalized one is replaced and
    /// returned so the caller can see what was dropped.
    pub fn create_pending_mutation(&mut self, row: impl Into<RowKey>) -> Option<Put> {
        self.buffer.start(row.into())
    }

    pub fn add_cell_to_pending(
        &mut self,
        family: impl Into<Vec<u8>>,
        column: impl Into<Vec<u8>>,
        value: impl Into<Bytes>,
    ) -> Result<(), StoreError> {
        self.buffer.add_cell(Cell::new(family, column, value)).map_err(|e| {
            error!("add_cell_to_pending: {}", e);
            e
        })
    }

    /// Finalizes the pending mutation into the buffer, flushing a full buffer
    /// first. If that flush fails, the buffer and the pending mutation are
    /// left as they were.
    pub async fn append_pending_to_buffer(&mut self, table: &str) -> Result<(), StoreError> {
        if !self.buffer.has_pending() {
            let err = StoreError::InvalidState("no pending mutation to append".into());
            error!("append_pending_to_buffer on table {}: {}", table, err);
            return Err(err);
        }

        if self.buffer.is_full() {
            debug!(
                "Write buffer reached {} mutations, flushing to {}",
                self.buffer.max_size(),
                table
            );
            self.flush_buffer(table).await?;
        }

        self.buffer.append_pending()
    }

    /// Submits every buffered mutation in one batched put.
    ///
    /// The buffer is destroyed on success and kept untouched on failure so the
    /// flush can be retried.
    pub async fn flush_buffer(&mut self, table: &str) -> Result<FlushOutcome, StoreError> {
        let batch = match self.buffer.take_buffered() {
            Some(puts) => puts,
            None => return Ok(FlushOutcome::NothingBuffered),
        };
        let count = batch.len();

        let result = self.observe("flush_buffer", table, self.submit_puts(table, &batch)).await;
        if let Err(e) = result {
            self.buffer.restore_buffered(batch);
            return Err(e);
        }

        debug!("Flushed {} buffered mutations to {}", count, table);
        Ok(FlushOutcome::Flushed(count))
    }

    pub fn has_pending(&self) -> bool {
        self.buffer.has_pending()
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.buffered_len()
    }

    // ---- reads ----

    /// Cells of one row as `"family:qualifier" -> value`, optionally restricted
    /// to `selector`. A row without matching cells yields an empty map.
    pub async fn get_row(
        &self,
        table: &str,
        row: impl Into<RowKey>,
        selector: Option<&[Column]>,
    ) -> Result<CellMap, StoreError> {
        let get = Get::new(row).with_columns(selector.unwrap_or_default());
        self.observe("get_row", table, async {
            let handle = self.open_table(table).await?;
            let row = handle.get(get).await?;
            Ok(row.into_cell_map())
        })
        .await
    }

    pub async fn get_rows_by_prefix(
        &self,
        table: &str,
        prefix: impl Into<Vec<u8>>,
        selector: Option<&[Column]>,
    ) -> Result<RowMap, StoreError> {
        let scan = self.selecting_scan(selector).with_filter(RowFilter::Prefix(prefix.into()));
        self.observe("get_rows_by_prefix", table, self.collect_rows(table, scan)).await
    }

    /// Rows between `start` and `stop`, boundaries per the inclusivity settings.
    pub async fn get_rows_by_range(
        &self,
        table: &str,
        start: impl Into<RowKey>,
        stop: impl Into<RowKey>,
        selector: Option<&[Column]>,
    ) -> Result<RowMap, StoreError> {
        let scan = self.range_scan(self.selecting_scan(selector), start, stop);
        self.observe("get_rows_by_range", table, self.collect_rows(table, scan)).await
    }

    // ---- deletes ----

    pub async fn delete_cell(
        &self,
        table: &str,
        row: impl Into<RowKey>,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
    ) -> Result<(), StoreError> {
        let delete = Delete::new(row).add_column(family, qualifier);
        self.observe("delete_cell", table, self.submit_deletes(table, vec![delete])).await
    }

    pub async fn delete_cells<Q>(
        &self,
        table: &str,
        row: impl Into<RowKey>,
        family: impl Into<Vec<u8>>,
        qualifiers: impl IntoIterator<Item = Q>,
    ) -> Result<(), StoreError>
    where
        Q: Into<Vec<u8>>,
    {
        let family = family.into();
        let mut delete = Delete::new(row);
        for qualifier in qualifiers {
            delete = delete.add_column(family.clone(), qualifier);
        }
        self.observe("delete_cells", table, self.submit_column_delete(table, delete)).await
    }

    pub async fn delete_family_cells<F, I, Q>(
        &self,
        table: &str,
        row: impl Into<RowKey>,
        families: impl IntoIterator<Item = (F, I)>,
    ) -> Result<(), StoreError>
    where
        F: Into<Vec<u8>>,
        I: IntoIterator<Item = Q>,
        Q: Into<Vec<u8>>,
    {
        let mut delete = Delete::new(row);
        for (family, qualifiers) in families {
            let family = family.into();
            for qualifier in qualifiers {
                delete = delete.add_column(family.clone(), qualifier);
            }
        }
        self.observe("delete_family_cells", table, self.submit_column_delete(table, delete)).await
    }

    /// Deletes every row whose key starts with `prefix`, returning how many.
    ///
    /// With `column`, the scan only reads that column; rows lacking it are
    /// not matched and survive.
    pub async fn delete_by_prefix(
        &self,
        table: &str,
        prefix: impl Into<Vec<u8>>,
        column: Option<&Column>,
    ) -> Result<usize, StoreError> {
        let scan = self
            .narrowed_scan(column)
            .with_filter(RowFilter::Prefix(prefix.into()));
        self.observe("delete_by_prefix", table, self.delete_matching(table, scan)).await
    }

    pub async fn delete_by_range(
        &self,
        table: &str,
        start: impl Into<RowKey>,
        stop: impl Into<RowKey>,
        column: Option<&Column>,
    ) -> Result<usize, StoreError> {
        let scan = self.range_scan(self.narrowed_scan(column), start, stop);
        self.observe("delete_by_range", table, self.delete_matching(table, scan)).await
    }

    // ---- internals ----

    async fn observe<T>(
        &self,
        operation: &'static str,
        table: &str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        let start = Instant::now();
        let result = call.await;
        metrics::record_operation(operation, table, result.is_ok(), start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            error!("{} on table {} failed: {}", operation, table, e);
        }
        result
    }

    async fn open_table(&self, table: &str) -> Result<TableGuard, StoreError> {
        let conn = self.connections.ensure_connection().await?;
        TableGuard::open(conn.as_ref(), table)
    }

    async fn submit_puts(&self, table: &str, puts: &[Put]) -> Result<(), StoreError> {
        let handle = self.open_table(table).await?;
        handle.put(puts).await
    }

    async fn submit_deletes(&self, table: &str, deletes: Vec<Delete>) -> Result<(), StoreError> {
        let handle = self.open_table(table).await?;
        handle.delete(deletes).await
    }

    async fn submit_column_delete(&self, table: &str, delete: Delete) -> Result<(), StoreError> {
        // a column-less delete would remove the whole row
        if delete.is_whole_row() {
            return Err(StoreError::InvalidState(format!(
                "no columns given for cell delete on row {}",
                String::from_utf8_lossy(&delete.row)
            )));
        }
        self.submit_deletes(table, vec![delete]).await
    }

    fn selecting_scan(&self, selector: Option<&[Column]>) -> Scan {
        let scan = Scan::new().with_caching(self.scan_cache);
        match selector {
            Some(columns) => scan.with_columns(columns).with_batch(columns.len()),
            None => scan,
        }
    }

    fn narrowed_scan(&self, column: Option<&Column>) -> Scan {
        let scan = Scan::new().with_caching(self.scan_cache);
        match column {
            Some(column) => scan.with_columns(std::slice::from_ref(column)),
            None => scan,
        }
    }

    fn range_scan(&self, scan: Scan, start: impl Into<RowKey>, stop: impl Into<RowKey>) -> Scan {
        scan.with_start_row(start, self.include_start)
            .with_stop_row(stop, self.include_stop)
    }

    async fn collect_rows(&self, table: &str, scan: Scan) -> Result<RowMap, StoreError> {
        let handle = self.open_table(table).await?;
        let mut rows = RowMap::new();
        traverse(&*handle, scan, |row| {
            let cells = rows.entry(row.key.clone()).or_default();
            row.merge_into(cells);
        })
        .await?;
        Ok(rows)
    }

    async fn delete_matching(&self, table: &str, scan: Scan) -> Result<usize, StoreError> {
        let handle = self.open_table(table).await?;
        let mut keys: Vec<RowKey> = Vec::new();
        traverse(&*handle, scan, |row| {
            // batched scans repeat the key for each part of a wide row
            if keys.last() != Some(&row.key) {
                keys.push(row.key);
            }
        })
        .await?;

        let count = keys.len();
        if count > 0 {
            handle
                .delete(keys.into_iter().map(Delete::new).collect())
                .await?;
        }
        info!("Deleted {} rows from {}", count, table);
        Ok(count)
    }
}

/// Walks a scan to the end, handing each result to `visit`.
async fn traverse<F>(table: &dyn StoreTable, scan: Scan, mut visit: F) -> Result<(), StoreError>
where
    F: FnMut(Row) + Send,
{
    let mut scanner = table.scan(scan).await?;
    while let Some(row) = scanner.next_row().await? {
        visit(row);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::{MemoryConnectionFactory, MemoryStore};
    use crate::errors::ErrorKind;

    fn setup_with(config: StoreConfig) -> (CellStore, Arc<MemoryConnectionFactory>) {
        let store = MemoryStore::new();
        store.create_table("t");
        let factory = Arc::new(MemoryConnectionFactory::new(store));
        let facade = CellStore::new(factory.clone(), config);
        (facade, factory)
    }

    fn setup() -> (CellStore, Arc<MemoryConnectionFactory>) {
        setup_with(StoreConfig::default())
    }

    fn cells(pairs: &[(&str, &'static str)]) -> CellMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Bytes::from(*v)))
            .collect()
    }

    async fn seed_rows(facade: &CellStore, rows: &[&str]) {
        for row in rows {
            facade
                .insert_cell("t", row.as_bytes().to_vec(), "f", "c", Bytes::copy_from_slice(row.as_bytes()))
                .await
                .unwrap();
        }
    }

    fn keys(rows: &RowMap) -> Vec<String> {
        rows.keys().map(|k| String::from_utf8_lossy(k).into_owned()).collect()
    }

    #[tokio::test]
    async fn test_insert_scan_delete_scenario() {
        let (facade, _) = setup();

        facade.insert_cell("t", "r1", "f", "c", "v1").await.unwrap();
        assert_eq!(facade.get_row("t", "r1", None).await.unwrap(), cells(&[("f:c", "v1")]));

        facade.insert_cell("t", "r2", "f", "c", "v2").await.unwrap();
        let rows = facade.get_rows_by_prefix("t", "r", None).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[&b"r1".to_vec()], cells(&[("f:c", "v1")]));
        assert_eq!(rows[&b"r2".to_vec()], cells(&[("f:c", "v2")]));

        assert_eq!(facade.delete_by_prefix("t", "r", None).await.unwrap(), 2);
        assert!(facade.get_rows_by_prefix("t", "r", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_insert_is_idempotent() {
        let (facade, factory) = setup();

        facade.insert_cell("t", "r1", "f", "c", "v").await.unwrap();
        facade.insert_cell("t", "r1", "f", "c", "v").await.unwrap();

        assert_eq!(facade.get_row("t", "r1", None).await.unwrap(), cells(&[("f:c", "v")]));
        assert_eq!(factory.store().row_count("t"), Some(1));
    }

    #[tokio::test]
    async fn test_multi_cell_inserts() {
        let (facade, _) = setup();

        facade
            .insert_cells("t", "r1", "info", vec![("name", "alice"), ("age", "30")])
            .await
            .unwrap();
        facade
            .insert_family_cells(
                "t",
                "r2",
                vec![("info", vec![("name", "bob")]), ("stats", vec![("visits", "7"), ("score", "9")])],
            )
            .await
            .unwrap();

        assert_eq!(
            facade.get_row("t", "r1", None).await.unwrap(),
            cells(&[("info:name", "alice"), ("info:age", "30")])
        );
        assert_eq!(
            facade.get_row("t", "r2", None).await.unwrap(),
            cells(&[("info:name", "bob"), ("stats:visits", "7"), ("stats:score", "9")])
        );
    }

    #[tokio::test]
    async fn test_get_row_respects_selector() {
        let (facade, _) = setup();
        facade
            .insert_cells("t", "r1", "f", vec![("a", "1"), ("b", "2"), ("c", "3")])
            .await
            .unwrap();

        let selector = [Column::new("f", "a"), Column::new("f", "c"), Column::new("g", "x")];
        let row = facade.get_row("t", "r1", Some(&selector[..])).await.unwrap();
        assert_eq!(row, cells(&[("f:a", "1"), ("f:c", "3")]));

        // row exists but none of the selected cells do
        let row = facade.get_row("t", "r1", Some(&[Column::new("g", "x")][..])).await.unwrap();
        assert!(row.is_empty());

        assert!(facade.get_row("t", "missing", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prefix_scan_returns_only_matching_rows() {
        let (facade, _) = setup();
        seed_rows(&facade, &["user_1", "user_2", "user", "users", "admin_1", "zuser_1"]).await;

        let rows = facade.get_rows_by_prefix("t", "user_", None).await.unwrap();
        assert_eq!(keys(&rows), vec!["user_1", "user_2"]);
    }

    #[tokio::test]
    async fn test_prefix_scan_with_selector() {
        let (facade, _) = setup();
        facade.insert_cells("t", "p1", "f", vec![("a", "1"), ("b", "2")]).await.unwrap();
        facade.insert_cells("t", "p2", "f", vec![("b", "3")]).await.unwrap();

        let rows = facade
            .get_rows_by_prefix("t", "p", Some(&[Column::new("f", "a")][..]))
            .await
            .unwrap();

        assert_eq!(keys(&rows), vec!["p1"]);
        assert_eq!(rows[&b"p1".to_vec()], cells(&[("f:a", "1")]));
    }

    #[tokio::test]
    async fn test_range_scan_boundaries() {
        let (mut facade, _) = setup();
        seed_rows(&facade, &["a", "b", "c", "d", "e"]).await;

        // both boundaries included by default
        let rows = facade.get_rows_by_range("t", "b", "d", None).await.unwrap();
        assert_eq!(keys(&rows), vec!["b", "c", "d"]);

        facade.set_include_stop(false);
        let rows = facade.get_rows_by_range("t", "b", "d", None).await.unwrap();
        assert_eq!(keys(&rows), vec!["b", "c"]);

        facade.set_include_start(false);
        let rows = facade.get_rows_by_range("t", "b", "d", None).await.unwrap();
        assert_eq!(keys(&rows), vec!["c"]);

        facade.set_include_stop(true);
        let rows = facade.get_rows_by_range("t", "b", "d", None).await.unwrap();
        assert_eq!(keys(&rows), vec!["c", "d"]);
    }

    #[tokio::test]
    async fn test_scan_cache_controls_page_size() {
        let (mut facade, factory) = setup();
        seed_rows(&facade, &["r1", "r2", "r3", "r4", "r5"]).await;

        facade.set_scan_cache(2);
        let before = factory.store().pages_fetched();
        let rows = facade.get_rows_by_prefix("t", "r", None).await.unwrap();

        assert_eq!(rows.len(), 5);
        assert_eq!(factory.store().pages_fetched() - before, 3);
    }

    #[tokio::test]
    async fn test_buffer_flushes_once_at_threshold() {
        let config = StoreConfig { max_buffer_size: 3, ..Default::default() };
        let (mut facade, factory) = setup_with(config);
        facade.begin_buffer();

        for i in 0..5 {
            facade.create_pending_mutation(format!("row{}", i));
            facade.add_cell_to_pending("f", "c", format!("v{}", i)).unwrap();
            facade.append_pending_to_buffer("t").await.unwrap();
        }

        // one automatic flush of three rows, two still buffered
        assert_eq!(factory.store().row_count("t"), Some(3));
        assert_eq!(facade.buffered_len(), 2);

        assert_eq!(facade.flush_buffer("t").await.unwrap(), FlushOutcome::Flushed(2));
        assert_eq!(factory.store().row_count("t"), Some(5));
        assert_eq!(facade.buffered_len(), 0);
        assert_eq!(facade.flush_buffer("t").await.unwrap(), FlushOutcome::NothingBuffered);
    }

    #[tokio::test]
    async fn test_buffer_holds_max_when_evenly_divisible() {
        let config = StoreConfig { max_buffer_size: 3, ..Default::default() };
        let (mut facade, factory) = setup_with(config);

        for i in 0..6 {
            facade.create_pending_mutation(format!("row{}", i));
            facade.add_cell_to_pending("f", "c", "v").unwrap();
            facade.append_pending_to_buffer("t").await.unwrap();
        }

        assert_eq!(factory.store().row_count("t"), Some(3));
        assert_eq!(facade.buffered_len(), 3);
    }

    #[tokio::test]
    async fn test_flush_without_buffer_is_noop() {
        let (mut facade, _) = setup();
        facade.begin_buffer();
        assert_eq!(facade.flush_buffer("t").await.unwrap(), FlushOutcome::NothingBuffered);
    }

    #[tokio::test]
    async fn test_add_cell_without_pending_is_invalid_state() {
        let (mut facade, _) = setup();

        let err = facade.add_cell_to_pending("f", "c", "v").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let err = facade.append_pending_to_buffer("t").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_replacing_pending_mutation_returns_it() {
        let (mut facade, _) = setup();

        facade.create_pending_mutation("r1");
        facade.add_cell_to_pending("f", "c", "v").unwrap();
        let dropped = facade.create_pending_mutation("r2").unwrap();

        assert_eq!(dropped.row, b"r1".to_vec());
        assert!(facade.has_pending());
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_buffer_for_retry() {
        let (mut facade, factory) = setup();
        for row in ["a", "b"] {
            facade.create_pending_mutation(row);
            facade.add_cell_to_pending("f", "c", "v").unwrap();
            facade.append_pending_to_buffer("t").await.unwrap();
        }

        factory.store().set_unavailable(true);
        let err = facade.flush_buffer("t").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(facade.buffered_len(), 2);

        factory.store().set_unavailable(false);
        assert_eq!(facade.flush_buffer("t").await.unwrap(), FlushOutcome::Flushed(2));
        assert_eq!(factory.store().row_count("t"), Some(2));
    }

    #[tokio::test]
    async fn test_failed_automatic_flush_keeps_pending_mutation() {
        let config = StoreConfig { max_buffer_size: 1, ..Default::default() };
        let (mut facade, factory) = setup_with(config);

        facade.create_pending_mutation("a");
        facade.add_cell_to_pending("f", "c", "v").unwrap();
        facade.append_pending_to_buffer("t").await.unwrap();

        facade.create_pending_mutation("b");
        facade.add_cell_to_pending("f", "c", "v").unwrap();
        factory.store().set_unavailable(true);

        assert!(facade.append_pending_to_buffer("t").await.is_err());
        assert!(facade.has_pending());
        assert_eq!(facade.buffered_len(), 1);

        factory.store().set_unavailable(false);
        facade.append_pending_to_buffer("t").await.unwrap();
        assert_eq!(factory.store().row_count("t"), Some(1));
        assert_eq!(facade.buffered_len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_store_yields_errors_not_panics() {
        let (mut facade, factory) = setup();
        facade.insert_cell("t", "r1", "f", "c", "v").await.unwrap();
        factory.store().set_unavailable(true);

        let results = vec![
            facade.insert_cell("t", "r1", "f", "c", "v").await.err(),
            facade.insert_cells("t", "r1", "f", vec![("c", "v")]).await.err(),
            facade.get_row("t", "r1", None).await.err(),
            facade.get_rows_by_prefix("t", "r", None).await.err(),
            facade.get_rows_by_range("t", "a", "z", None).await.err(),
            facade.delete_cell("t", "r1", "f", "c").await.err(),
            facade.delete_by_prefix("t", "r", None).await.err(),
            facade.delete_by_range("t", "a", "z", None).await.err(),
        ];
        for err in results {
            assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::Transport));
        }

        facade.create_pending_mutation("r2");
        facade.add_cell_to_pending("f", "c", "v").unwrap();
        facade.append_pending_to_buffer("t").await.unwrap();
        assert!(facade.flush_buffer("t").await.is_err());

        assert_eq!(factory.store().open_tables(), 0);
    }

    #[tokio::test]
    async fn test_unknown_table_is_not_found() {
        let (facade, factory) = setup();
        let err = facade.get_row("nope", "r1", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(factory.store().open_tables(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_operations_fail_after_connect_retries_exhausted() {
        let (facade, factory) = setup();
        factory.fail_next_connects(u32::MAX);

        let err = facade.insert_cell("t", "r1", "f", "c", "v").await.unwrap_err();

        assert!(matches!(err, StoreError::ConnectionExhausted { attempts: 10, .. }));
        assert_eq!(factory.connect_attempts(), 10);
        assert!(!facade.is_connected().await);
    }

    #[tokio::test]
    async fn test_broken_connection_is_healed_transparently() {
        let (facade, factory) = setup();
        facade.insert_cell("t", "r1", "f", "c", "v1").await.unwrap();

        factory.close_active();

        facade.insert_cell("t", "r1", "f", "c", "v2").await.unwrap();
        assert_eq!(facade.get_row("t", "r1", None).await.unwrap(), cells(&[("f:c", "v2")]));
        assert_eq!(factory.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn test_connect_validates_config() {
        let factory = Arc::new(MemoryConnectionFactory::new(MemoryStore::new()));
        let config = StoreConfig { scan_cache: 0, ..Default::default() };

        let err = CellStore::connect(factory.clone(), config).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(factory.connect_attempts(), 0);

        let facade = CellStore::connect(factory.clone(), StoreConfig::default()).await.unwrap();
        assert!(facade.is_connected().await);
    }

    #[tokio::test]
    async fn test_cell_deletes() {
        let (facade, _) = setup();
        facade
            .insert_family_cells(
                "t",
                "r1",
                vec![("f", vec![("a", "1"), ("b", "2"), ("c", "3")]), ("g", vec![("x", "4"), ("y", "5")])],
            )
            .await
            .unwrap();

        facade.delete_cell("t", "r1", "f", "a").await.unwrap();
        facade.delete_cells("t", "r1", "f", vec!["b"]).await.unwrap();
        facade
            .delete_family_cells("t", "r1", vec![("g", vec!["x"])])
            .await
            .unwrap();

        assert_eq!(
            facade.get_row("t", "r1", None).await.unwrap(),
            cells(&[("f:c", "3"), ("g:y", "5")])
        );
    }

    #[tokio::test]
    async fn test_cell_delete_without_columns_is_refused() {
        let (facade, _) = setup();
        facade.insert_cell("t", "r1", "f", "c", "v").await.unwrap();

        let err = facade.delete_cells("t", "r1", "f", Vec::<&str>::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert!(!facade.get_row("t", "r1", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_by_prefix_leaves_other_rows() {
        let (facade, factory) = setup();
        seed_rows(&facade, &["job_1", "job_2", "jobless", "other"]).await;

        assert_eq!(facade.delete_by_prefix("t", "job_", None).await.unwrap(), 2);

        let rows = facade.get_rows_by_prefix("t", "", None).await.unwrap();
        assert_eq!(keys(&rows), vec!["jobless", "other"]);
        assert_eq!(factory.store().open_tables(), 0);
    }

    #[tokio::test]
    async fn test_delete_by_range_honors_boundaries() {
        let (mut facade, _) = setup();
        seed_rows(&facade, &["a", "b", "c", "d"]).await;
        facade.set_include_stop(false);

        assert_eq!(facade.delete_by_range("t", "b", "d", None).await.unwrap(), 2);

        let rows = facade.get_rows_by_prefix("t", "", None).await.unwrap();
        assert_eq!(keys(&rows), vec!["a", "d"]);
    }

    #[tokio::test]
    async fn test_narrowed_delete_by_range_with_exclusive_start() {
        let (mut facade, factory) = setup();
        for row in ["a", "b", "c", "d", "e"] {
            facade.insert_cell("t", row, "f", "other", "1").await.unwrap();
        }
        for row in ["a", "b", "d", "e"] {
            facade.insert_cell("t", row, "f", "flag", "1").await.unwrap();
        }
        facade.set_include_start(false);

        let column = Column::new("f", "flag");
        assert_eq!(facade.delete_by_range("t", "a", "d", Some(&column)).await.unwrap(), 2);

        // a sits on the excluded start, c lacks the column
        let rows = facade.get_rows_by_prefix("t", "", None).await.unwrap();
        assert_eq!(keys(&rows), vec!["a", "c", "e"]);
        assert_eq!(factory.store().open_tables(), 0);
    }

    #[tokio::test]
    async fn test_narrowed_delete_only_sees_rows_with_column() {
        let (facade, _) = setup();
        facade.insert_cell("t", "k1", "f", "flag", "1").await.unwrap();
        facade.insert_cell("t", "k2", "f", "other", "1").await.unwrap();

        let column = Column::new("f", "flag");
        assert_eq!(facade.delete_by_prefix("t", "k", Some(&column)).await.unwrap(), 1);

        let rows = facade.get_rows_by_prefix("t", "k", None).await.unwrap();
        assert_eq!(keys(&rows), vec!["k2"]);
    }

    #[tokio::test]
    async fn test_delete_with_no_matches_succeeds() {
        let (facade, _) = setup();
        assert_eq!(facade.delete_by_prefix("t", "none", None).await.unwrap(), 0);
    }
}
