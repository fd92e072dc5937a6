//! Cache configuration.
//!
//! Selects the backend and bounds how long cached reads may lag the store.

use std::fmt;
use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_REDIS_HOST: &str = "127.0.0.1";
const DEFAULT_REDIS_PORT: u16 = 6379;
const DEFAULT_TTL_SECS: u64 = 3600;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1000;
const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 500;
const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 5000;
const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    Redis,
    Memory,
    Disabled,
}

impl CacheBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheBackend::Redis => "redis",
            CacheBackend::Memory => "memory",
            CacheBackend::Disabled => "disabled",
        }
    }
}

impl std::str::FromStr for CacheBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(CacheBackend::Redis),
            "memory" => Ok(CacheBackend::Memory),
            "disabled" | "none" | "off" => Ok(CacheBackend::Disabled),
            other => Err(format!(
                "unknown cache backend `{other}` (expected redis|memory|disabled)"
            )),
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Lifetime of every cache entry; also the staleness bound for listings.
    pub ttl_seconds: u64,
    pub connect_timeout_ms: u64,
    pub operation_timeout_ms: u64,
    /// How long a failed connect keeps the backend marked down.
    pub reconnect_backoff_ms: u64,
    /// Maximum entries kept by the in-process backend.
    pub memory_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Redis,
            host: DEFAULT_REDIS_HOST.to_string(),
            port: DEFAULT_REDIS_PORT,
            username: None,
            password: None,
            ttl_seconds: DEFAULT_TTL_SECS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
            reconnect_backoff_ms: DEFAULT_RECONNECT_BACKOFF_MS,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
        }
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("backend", &self.backend)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("ttl_seconds", &self.ttl_seconds)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("operation_timeout_ms", &self.operation_timeout_ms)
            .field("reconnect_backoff_ms", &self.reconnect_backoff_ms)
            .field("memory_capacity", &self.memory_capacity)
            .finish()
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            backend: settings.backend,
            host: settings.host.clone(),
            port: settings.port,
            username: settings.username.clone(),
            password: settings.password.clone(),
            ttl_seconds: settings.ttl.as_secs(),
            connect_timeout_ms: duration_ms(settings.connect_timeout),
            operation_timeout_ms: duration_ms(settings.operation_timeout),
            reconnect_backoff_ms: duration_ms(settings.reconnect_backoff),
            memory_capacity: settings.memory_capacity.get(),
        }
    }
}

fn duration_ms(value: Duration) -> u64 {
    u64::try_from(value.as_millis()).unwrap_or(u64::MAX)
}

impl CacheConfig {
    /// In-process configuration used by tests and single-node deployments.
    pub fn memory() -> Self {
        Self {
            backend: CacheBackend::Memory,
            ..Default::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend != CacheBackend::Disabled
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.max(1))
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms.max(1))
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    /// Returns the memory capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
