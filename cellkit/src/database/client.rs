use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::config::StoreConfig;
use crate::errors::StoreError;
use crate::types::Row;

use super::request::{Delete, Get, Put, Scan};

/// Creates connections to the wide-column store cluster.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn create(&self, config: &StoreConfig) -> Result<Arc<dyn StoreConnection>, StoreError>;
}

/// A live connection to the store, shared by every operation of a facade.
#[async_trait]
pub trait StoreConnection: Send + Sync {
    fn is_closed(&self) -> bool;

    /// Round trip proving the cluster answers.
    async fn health_check(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::ConnectionError("connection is closed".into()));
        }
        Ok(())
    }

    /// Opens a lightweight per-call handle to a table.
    fn table(&self, name: &str) -> Result<Box<dyn StoreTable>, StoreError>;

    fn driver_name(&self) -> &str;
}

#[async_trait]
pub trait StoreTable: Send + Sync {
    fn name(&self) -> &str;

    async fn put(&self, puts: &[Put]) -> Result<(), StoreError>;

    /// Returns the row with whatever selected cells exist (possibly none).
    async fn get(&self, get: Get) -> Result<Row, StoreError>;

    async fn scan(&self, scan: Scan) -> Result<Box<dyn RowScanner>, StoreError>;

    async fn delete(&self, deletes: Vec<Delete>) -> Result<(), StoreError>;

    fn close(&mut self) -> Result<(), StoreError>;
}

/// Forward iteration over scan results, fetched page by page.
#[async_trait]
pub trait RowScanner: Send {
    async fn next_row(&mut self) -> Result<Option<Row>, StoreError>;
}

/// Table handle released on drop, whichever way the owning call exits.
pub struct TableGuard {
    inner: Box<dyn StoreTable>,
}

impl TableGuard {
    pub fn open(connection: &dyn StoreConnection, name: &str) -> Result<Self, StoreError> {
        let inner = connection.table(name)?;
        debug!("Opened table handle {} via {}", name, connection.driver_name());
        Ok(Self { inner })
    }
}

impl Deref for TableGuard {
    type Target = dyn StoreTable;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DerefMut for TableGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_mut()
    }
}

impl Drop for TableGuard {
    fn drop(&mut self) {
        if let Err(e) = self.inner.close() {
            error!("Failed to close table {}: {}", self.inner.name(), e);
        }
    }
}
