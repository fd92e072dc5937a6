//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{CliArgs, Command, MigrateArgs, ServeArgs, ServeOverrides};

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::ingest::{CapacityLimits, CapacityPolicy};
use crate::cache::CacheBackend;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "mediadex";
const ENV_PREFIX: &str = "MEDIADEX";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_CACHE_HOST: &str = "127.0.0.1";
const DEFAULT_CACHE_PORT: u16 = 6379;
const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
const DEFAULT_CACHE_CONNECT_TIMEOUT_MS: u64 = 1000;
const DEFAULT_CACHE_OPERATION_TIMEOUT_MS: u64 = 500;
const DEFAULT_CACHE_RECONNECT_BACKOFF_MS: u64 = 5000;
const DEFAULT_CACHE_MEMORY_CAPACITY: u64 = 10_000;
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES: u64 = 50 * 1024 * 1024;
const DEFAULT_PHOTO_LIMIT: u64 = 50;
const DEFAULT_VIDEO_LIMIT: u64 = 20;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub uploads: UploadSettings,
    pub catalog: CatalogSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Clone)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ttl: Duration,
    pub connect_timeout: Duration,
    pub operation_timeout: Duration,
    pub reconnect_backoff: Duration,
    pub memory_capacity: NonZeroUsize,
}

impl std::fmt::Debug for CacheSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheSettings")
            .field("backend", &self.backend)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("ttl", &self.ttl)
            .field("connect_timeout", &self.connect_timeout)
            .field("operation_timeout", &self.operation_timeout)
            .field("reconnect_backoff", &self.reconnect_backoff)
            .field("memory_capacity", &self.memory_capacity)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub directory: PathBuf,
    pub max_request_bytes: NonZeroU64,
}

#[derive(Debug, Clone, Copy)]
pub struct CatalogSettings {
    pub photo_limit: u64,
    pub video_limit: u64,
    pub capacity_policy: CapacityPolicy,
}

impl CatalogSettings {
    pub fn limits(&self) -> CapacityLimits {
        CapacityLimits {
            photos: self.photo_limit,
            videos: self.video_limit,
            policy: self.capacity_policy,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings: default file → local file → `--config-file` → `MEDIADEX__*`
/// env → legacy env aliases → CLI flags.
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_legacy_env(|name| std::env::var(name).ok())?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Migrate(args)) => {
            if let Some(url) = args.database_url.as_ref() {
                raw.database.url = Some(url.clone());
            }
        }
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    uploads: RawUploadSettings,
    catalog: RawCatalogSettings,
}

impl RawSettings {
    /// Fill still-unset fields from the unprefixed variables older deployments use.
    fn apply_legacy_env<F>(&mut self, lookup: F) -> Result<(), LoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if self.database.url.is_none() {
            self.database.url = lookup("DATABASE_URL");
        }
        if self.cache.host.is_none() {
            self.cache.host = lookup("REDIS_HOST");
        }
        if self.cache.port.is_none() {
            self.cache.port = lookup("REDIS_PORT")
                .map(|port| parse_port(&port, "cache.port"))
                .transpose()?;
        }
        if self.cache.username.is_none() {
            self.cache.username = lookup("REDIS_USERNAME");
        }
        if self.cache.password.is_none() {
            self.cache.password = lookup("REDIS_PASSWORD");
        }
        if self.server.port.is_none() {
            self.server.port = lookup("PORT")
                .map(|port| parse_port(&port, "server.port"))
                .transpose()?;
        }
        Ok(())
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(backend) = overrides.cache_backend.as_ref() {
            self.cache.backend = Some(backend.clone());
        }
        if let Some(host) = overrides.cache_host.as_ref() {
            self.cache.host = Some(host.clone());
        }
        if let Some(port) = overrides.cache_port {
            self.cache.port = Some(port);
        }
        if let Some(ttl) = overrides.cache_ttl_seconds {
            self.cache.ttl_seconds = Some(ttl);
        }
        if let Some(directory) = overrides.uploads_directory.as_ref() {
            self.uploads.directory = Some(directory.clone());
        }
        if let Some(limit) = overrides.uploads_max_request_bytes {
            self.uploads.max_request_bytes = Some(limit);
        }
        if let Some(limit) = overrides.catalog_photo_limit {
            self.catalog.photo_limit = Some(limit);
        }
        if let Some(limit) = overrides.catalog_video_limit {
            self.catalog.video_limit = Some(limit);
        }
        if let Some(policy) = overrides.catalog_capacity_policy.as_ref() {
            self.catalog.capacity_policy = Some(policy.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            uploads,
            catalog,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            uploads: build_upload_settings(uploads)?,
            catalog: build_catalog_settings(catalog)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);
    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let backend = match cache.backend {
        Some(raw) => CacheBackend::from_str(&raw)
            .map_err(|reason| LoadError::invalid("cache.backend", reason))?,
        None => CacheBackend::Redis,
    };

    let host = non_blank(cache.host).unwrap_or_else(|| DEFAULT_CACHE_HOST.to_string());
    let port = cache.port.unwrap_or(DEFAULT_CACHE_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "cache.port",
            "port must be greater than zero",
        ));
    }

    let ttl_seconds = cache.ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS);
    if ttl_seconds == 0 {
        return Err(LoadError::invalid(
            "cache.ttl_seconds",
            "must be greater than zero",
        ));
    }

    let connect_timeout = positive_millis(
        cache
            .connect_timeout_ms
            .unwrap_or(DEFAULT_CACHE_CONNECT_TIMEOUT_MS),
        "cache.connect_timeout_ms",
    )?;
    let operation_timeout = positive_millis(
        cache
            .operation_timeout_ms
            .unwrap_or(DEFAULT_CACHE_OPERATION_TIMEOUT_MS),
        "cache.operation_timeout_ms",
    )?;
    let reconnect_backoff = Duration::from_millis(
        cache
            .reconnect_backoff_ms
            .unwrap_or(DEFAULT_CACHE_RECONNECT_BACKOFF_MS),
    );

    let capacity = cache
        .memory_capacity
        .unwrap_or(DEFAULT_CACHE_MEMORY_CAPACITY);
    let memory_capacity = usize::try_from(capacity)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| {
            LoadError::invalid(
                "cache.memory_capacity",
                "must be greater than zero and fit in usize",
            )
        })?;

    Ok(CacheSettings {
        backend,
        host,
        port,
        username: non_blank(cache.username),
        password: non_blank(cache.password),
        ttl: Duration::from_secs(ttl_seconds),
        connect_timeout,
        operation_timeout,
        reconnect_backoff,
        memory_capacity,
    })
}

fn build_upload_settings(uploads: RawUploadSettings) -> Result<UploadSettings, LoadError> {
    let directory = uploads
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "uploads.directory",
            "path must not be empty",
        ));
    }

    let max_request_bytes_value = uploads
        .max_request_bytes
        .unwrap_or(DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES);
    let max_request_bytes = NonZeroU64::new(max_request_bytes_value).ok_or_else(|| {
        LoadError::invalid("uploads.max_request_bytes", "must be greater than zero")
    })?;
    usize::try_from(max_request_bytes_value).map_err(|_| {
        LoadError::invalid(
            "uploads.max_request_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(UploadSettings {
        directory,
        max_request_bytes,
    })
}

fn build_catalog_settings(catalog: RawCatalogSettings) -> Result<CatalogSettings, LoadError> {
    let capacity_policy = match catalog.capacity_policy {
        Some(raw) => CapacityPolicy::from_str(&raw)
            .map_err(|reason| LoadError::invalid("catalog.capacity_policy", reason))?,
        None => CapacityPolicy::Total,
    };

    Ok(CatalogSettings {
        photo_limit: catalog.photo_limit.unwrap_or(DEFAULT_PHOTO_LIMIT),
        video_limit: catalog.video_limit.unwrap_or(DEFAULT_VIDEO_LIMIT),
        capacity_policy,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    backend: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    ttl_seconds: Option<u64>,
    connect_timeout_ms: Option<u64>,
    operation_timeout_ms: Option<u64>,
    reconnect_backoff_ms: Option<u64>,
    memory_capacity: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUploadSettings {
    directory: Option<PathBuf>,
    max_request_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCatalogSettings {
    photo_limit: Option<u64>,
    video_limit: Option<u64>,
    capacity_policy: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn parse_port(raw: &str, key: &'static str) -> Result<u16, LoadError> {
    match raw.trim().parse::<u16>() {
        Ok(0) => Err(LoadError::invalid(key, "port must be greater than zero")),
        Ok(port) => Ok(port),
        Err(err) => Err(LoadError::invalid(key, format!("invalid port `{raw}`: {err}"))),
    }
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn positive_millis(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(value))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
