use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Coordination-service hosts used by the store client for cluster discovery.
    pub hosts: Vec<String>,
    pub port: u16,
    /// Rows fetched per scan page.
    pub scan_cache: usize,
    pub include_start: bool,
    pub include_stop: bool,
    pub max_buffer_size: usize,
    pub connect_retry: RetryConfig,
    pub health_check: HealthCheckPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["localhost".to_string()],
            port: 2181,
            scan_cache: 1000,
            include_start: true,
            include_stop: true,
            max_buffer_size: 1000,
            connect_retry: RetryConfig::default(),
            health_check: HealthCheckPolicy::default(),
        }
    }
}

impl StoreConfig {
    pub fn new(hosts: Vec<String>, port: u16) -> Self {
        Self {
            hosts,
            port,
            ..Default::default()
        }
    }

    /// Comma-joined host list, the form the coordination client expects.
    pub fn quorum(&self) -> String {
        self.hosts.join(",")
    }

    pub fn validate(&self) -> Result<(), crate::errors::StoreError> {
        use crate::errors::StoreError;

        if self.hosts.is_empty() || self.hosts.iter().any(|h| h.trim().is_empty()) {
            return Err(StoreError::ConfigError("at least one non-empty host is required".into()));
        }
        if self.scan_cache == 0 {
            return Err(StoreError::ConfigError("scan_cache must be positive".into()));
        }
        if self.max_buffer_size == 0 {
            return Err(StoreError::ConfigError("max_buffer_size must be positive".into()));
        }
        if self.connect_retry.max_attempts == 0 {
            return Err(StoreError::ConfigError("connect_retry.max_attempts must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    /// 1.0 keeps the delay fixed.
    pub exponential_base: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(1),
            exponential_base: 1.0,
        }
    }
}

/// How a cached connection is judged usable before it is handed out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthCheckPolicy {
    /// Trust the connection's own closed flag.
    #[default]
    Passive,
    /// Also issue a health-check round trip.
    Active,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
