use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{HealthCheckPolicy, StoreConfig};
use crate::errors::StoreError;
use crate::metrics;

use super::client::{ConnectionFactory, StoreConnection};
use super::retry::RetryPolicy;

/// Owns the single shared store connection of a facade.
///
/// The connection is created on first use and recreated whenever the
/// configured health check finds it unusable. Creation goes through the
/// retry policy; once that gives up, the caller receives
/// [`StoreError::ConnectionExhausted`].
pub struct ConnectionManager {
    factory: Arc<dyn ConnectionFactory>,
    config: StoreConfig,
    retry: RetryPolicy,
    health_check: HealthCheckPolicy,
    current: Mutex<Option<Arc<dyn StoreConnection>>>,
    connects: AtomicU64,
}

impl ConnectionManager {
    pub fn new(factory: Arc<dyn ConnectionFactory>, config: StoreConfig) -> Self {
        let retry = RetryPolicy::from(&config.connect_retry);
        let health_check = config.health_check;
        Self {
            factory,
            config,
            retry,
            health_check,
            current: Mutex::new(None),
            connects: AtomicU64::new(0),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Hands out the live connection, creating or replacing it if needed.
    pub async fn ensure_connection(&self) -> Result<Arc<dyn StoreConnection>, StoreError> {
        let mut current = self.current.lock().await;

        if let Some(conn) = current.as_ref() {
            if self.is_usable(conn.as_ref()).await {
                return Ok(conn.clone());
            }
            warn!("Store connection via {} is no longer usable, reconnecting", conn.driver_name());
            *current = None;
            metrics::set_active_connection(false);
        }

        let conn = self.connect().await?;
        *current = Some(conn.clone());
        metrics::set_active_connection(true);
        Ok(conn)
    }

    /// Whether a healthy-looking connection is cached right now.
    pub async fn is_connected(&self) -> bool {
        match self.current.lock().await.as_ref() {
            Some(conn) => !conn.is_closed(),
            None => false,
        }
    }

    /// Number of connections successfully established so far.
    pub fn connect_count(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }

    async fn is_usable(&self, conn: &dyn StoreConnection) -> bool {
        if conn.is_closed() {
            return false;
        }
        match self.health_check {
            HealthCheckPolicy::Passive => true,
            HealthCheckPolicy::Active => match conn.health_check().await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Store health check failed: {}", e);
                    false
                }
            },
        }
    }

    async fn connect(&self) -> Result<Arc<dyn StoreConnection>, StoreError> {
        info!(
            "Connecting to store cluster via coordination quorum {} (port {})",
            self.config.quorum(),
            self.config.port
        );

        let factory = &self.factory;
        let config = &self.config;
        let result = self
            .retry
            .execute(move || async move {
                metrics::record_connection_attempt();
                factory.create(config).await
            })
            .await;

        match result {
            Ok(conn) => {
                self.connects.fetch_add(1, Ordering::Relaxed);
                info!("Connected to store cluster using driver {}", conn.driver_name());
                Ok(conn)
            }
            Err(e) => Err(StoreError::ConnectionExhausted {
                attempts: self.retry.max_attempts(),
                last_error: e.to_string(),
            }),
        }
    }
}
