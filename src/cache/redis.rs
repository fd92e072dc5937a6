//! Redis-backed cache store.
//!
//! The connection is opened lazily and shared through a
//! [`ConnectionManager`]. Every connect and command is bounded by a timeout.
//! A failed connect, or a command that times out or loses its connection,
//! marks the backend down for a backoff window so an outage costs callers one
//! fast error instead of a blocked request.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, RedisError};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::config::CacheConfig;
use super::store::{CacheError, CacheStore};

const SOURCE: &str = "cache::redis";

enum ConnectionState {
    Idle,
    Connected(ConnectionManager),
    Down { since: Instant },
}

pub struct RedisCacheStore {
    client: redis::Client,
    state: Mutex<ConnectionState>,
    connect_timeout: Duration,
    operation_timeout: Duration,
    reconnect_backoff: Duration,
}

impl RedisCacheStore {
    /// Build the store without touching the network.
    pub fn new(config: &CacheConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(connection_info(config))
            .map_err(|err| CacheError::Configuration(err.to_string()))?;

        Ok(Self {
            client,
            state: Mutex::new(ConnectionState::Idle),
            connect_timeout: config.connect_timeout(),
            operation_timeout: config.operation_timeout(),
            reconnect_backoff: config.reconnect_backoff(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let mut state = self.state.lock().await;
        match &*state {
            ConnectionState::Connected(manager) => return Ok(manager.clone()),
            ConnectionState::Down { since } if since.elapsed() < self.reconnect_backoff => {
                return Err(CacheError::Unavailable(
                    "backend marked down, waiting for reconnect backoff".to_string(),
                ));
            }
            _ => {}
        }

        let attempt = tokio::time::timeout(
            self.connect_timeout,
            ConnectionManager::new(self.client.clone()),
        )
        .await;

        match attempt {
            Ok(Ok(manager)) => {
                info!(target = SOURCE, "connected to redis");
                *state = ConnectionState::Connected(manager.clone());
                Ok(manager)
            }
            Ok(Err(err)) => {
                warn!(target = SOURCE, error = %err, "redis connect failed");
                *state = ConnectionState::Down {
                    since: Instant::now(),
                };
                Err(CacheError::Unavailable(err.to_string()))
            }
            Err(_) => {
                warn!(
                    target = SOURCE,
                    timeout_ms = self.connect_timeout.as_millis() as u64,
                    "redis connect timed out"
                );
                *state = ConnectionState::Down {
                    since: Instant::now(),
                };
                Err(CacheError::Timeout {
                    op: "connect",
                    timeout_ms: self.connect_timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn run<T, F, Fut>(&self, op: &'static str, command: F) -> Result<T, CacheError>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: std::future::Future<Output = Result<T, RedisError>>,
    {
        let manager = self.connection().await?;
        let err = match tokio::time::timeout(self.operation_timeout, command(manager)).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => map_redis_error(err),
            Err(_) => CacheError::Timeout {
                op,
                timeout_ms: self.operation_timeout.as_millis() as u64,
            },
        };
        self.record_failure(op, &err).await;
        Err(err)
    }

    /// Enter the backoff window when `err` means the backend is unreachable.
    async fn record_failure(&self, op: &'static str, err: &CacheError) {
        if !matches!(err, CacheError::Unavailable(_) | CacheError::Timeout { .. }) {
            return;
        }
        warn!(target = SOURCE, op, error = %err, "redis unreachable, backing off");
        *self.state.lock().await = ConnectionState::Down {
            since: Instant::now(),
        };
    }
}

fn connection_info(config: &CacheConfig) -> ConnectionInfo {
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
        redis: RedisConnectionInfo {
            username: config.username.clone().filter(|value| !value.is_empty()),
            password: config.password.clone().filter(|value| !value.is_empty()),
            ..Default::default()
        },
    }
}

fn map_redis_error(err: RedisError) -> CacheError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
        CacheError::Unavailable(err.to_string())
    } else if err.is_timeout() {
        CacheError::Timeout {
            op: "command",
            timeout_ms: 0,
        }
    } else {
        CacheError::Backend(err.to_string())
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let value: Option<Vec<u8>> = self
            .run("get", |mut conn| async move { conn.get(key).await })
            .await?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let seconds = ttl.as_secs().max(1);
        self.run("set", |mut conn| async move {
            conn.set_ex::<_, _, ()>(key, value.as_ref(), seconds).await
        })
        .await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let seconds = ttl.as_secs().max(1);
        let reply: Option<String> = self
            .run("set_nx", |mut conn| async move {
                redis::cmd("SET")
                    .arg(key)
                    .arg(value.as_ref())
                    .arg("EX")
                    .arg(seconds)
                    .arg("NX")
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.run("delete", |mut conn| async move {
            conn.del::<_, ()>(key).await
        })
        .await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let reply: String = self
            .run("ping", |mut conn| async move {
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await?;
        if reply.eq_ignore_ascii_case("PONG") {
            Ok(())
        } else {
            Err(CacheError::Backend(format!("unexpected PING reply `{reply}`")))
        }
    }

    async fn close(&self) {
        let mut state = self.state.lock().await;
        *state = ConnectionState::Idle;
        info!(target = SOURCE, "redis connection released");
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_info_carries_credentials() {
        let config = CacheConfig {
            host: "cache.internal".to_string(),
            port: 6380,
            username: Some("svc".to_string()),
            password: Some("secret".to_string()),
            ..Default::default()
        };

        let info = connection_info(&config);
        assert!(matches!(
            info.addr,
            ConnectionAddr::Tcp(ref host, 6380) if host == "cache.internal"
        ));
        assert_eq!(info.redis.username.as_deref(), Some("svc"));
        assert_eq!(info.redis.password.as_deref(), Some("secret"));
    }

    #[test]
    fn blank_credentials_are_omitted() {
        let config = CacheConfig {
            username: Some(String::new()),
            password: Some(String::new()),
            ..Default::default()
        };

        let info = connection_info(&config);
        assert!(info.redis.username.is_none());
        assert!(info.redis.password.is_none());
    }

    fn unreachable_config() -> CacheConfig {
        CacheConfig {
            host: "127.0.0.1".to_string(),
            // Nothing listens on the discard port in test environments.
            port: 9,
            connect_timeout_ms: 200,
            reconnect_backoff_ms: 60_000,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn lost_connection_enters_backoff() {
        let store = RedisCacheStore::new(&unreachable_config()).expect("client builds");
        store
            .record_failure(
                "get",
                &CacheError::Timeout {
                    op: "get",
                    timeout_ms: 250,
                },
            )
            .await;

        let started = Instant::now();
        let result = store.get("photo:id:a").await;
        assert!(matches!(result, Err(CacheError::Unavailable(_))));
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn command_errors_do_not_trigger_backoff() {
        let store = RedisCacheStore::new(&unreachable_config()).expect("client builds");
        store
            .record_failure("get", &CacheError::Backend("WRONGTYPE".to_string()))
            .await;
        assert!(matches!(*store.state.lock().await, ConnectionState::Idle));
    }

    #[tokio::test]
    async fn unreachable_backend_fails_fast_then_backs_off() {
        let store = RedisCacheStore::new(&unreachable_config()).expect("client builds");

        let first = store.get("photo:id:a").await;
        assert!(matches!(
            first,
            Err(CacheError::Unavailable(_) | CacheError::Timeout { .. })
        ));

        let started = Instant::now();
        let second = store.get("photo:id:a").await;
        assert!(matches!(second, Err(CacheError::Unavailable(_))));
        assert!(started.elapsed() < Duration::from_millis(100));
    }
}
