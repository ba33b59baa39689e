//! Data-access facade over a wide-column store.
//!
//! [`CellStore`] exposes cell-level put/get/delete, prefix and range scans,
//! and a bounded write buffer for bulk loads. The store client itself sits
//! behind the [`database::ConnectionFactory`] seam; [`database::memory`]
//! provides an in-process implementation.

pub mod buffer;
pub mod config;
pub mod database;
pub mod errors;
pub mod metrics;
pub mod store;
pub mod types;

pub use config::{HealthCheckPolicy, ObservabilityConfig, RetryConfig, StoreConfig};
pub use errors::{ErrorKind, StoreError, StoreResult};
pub use store::CellStore;
pub use types::{Cell, CellMap, Column, FlushOutcome, Row, RowKey, RowMap};
