pub mod client;
pub mod connection;
pub mod memory;
pub mod request;
pub mod retry;

pub use client::{ConnectionFactory, RowScanner, StoreConnection, StoreTable, TableGuard};
pub use connection::ConnectionManager;
pub use memory::{MemoryConnectionFactory, MemoryStore};
pub use request::{Delete, Get, Put, RowFilter, Scan};
pub use retry::RetryPolicy;
