//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{net::SocketAddr, num::NonZeroUsize, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::catalog::{DEFAULT_MAX_PAGE_SIZE, MIN_MAX_PAGE_SIZE};
use crate::cache::{CachePolicy, TtlSettings};
use crate::infra::db::{
    DEFAULT_CATALOG_RELATION, DEFAULT_SNAPSHOT_RELATION, PoolSettings, RelationSettings,
};

pub use cli::{CliArgs, Command, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "catalogd";
const ENV_PREFIX: &str = "CATALOGD";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 30;
const DEFAULT_DB_MIN_CONNECTIONS: u32 = 5;
const DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_DB_IDLE_TIMEOUT_SECS: u64 = 5 * 60;
const DEFAULT_DB_MAX_LIFETIME_SECS: u64 = 2 * 60 * 60;
const DEFAULT_CACHE_MEMORY_CAPACITY: usize = 10_000;
const DEFAULT_TIMEOUT_CATALOG_MS: u64 = 6_000;
const DEFAULT_TIMEOUT_SEARCH_MS: u64 = 3_000;
const DEFAULT_TIMEOUT_PRODUCT_MS: u64 = 6_000;
const DEFAULT_TIMEOUT_RECENT_MS: u64 = 12_000;
const DEFAULT_TIMEOUT_CATEGORIES_MS: u64 = 4_000;
const DEFAULT_TIMEOUT_PRICE_RANGE_MS: u64 = 4_000;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub api: ApiSettings,
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
    pub pool: PoolSettings,
    pub relations: RelationSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    None,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    pub memory_capacity: NonZeroUsize,
    pub policy: CachePolicy,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub max_page_size: u32,
    pub timeouts: ApiTimeouts,
}

/// Per-route deadlines applied to each request context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiTimeouts {
    pub catalog: Duration,
    pub search: Duration,
    pub product: Duration,
    pub recent: Duration,
    pub categories: Duration,
    pub price_range: Duration,
}

impl Default for ApiTimeouts {
    fn default() -> Self {
        Self {
            catalog: Duration::from_millis(DEFAULT_TIMEOUT_CATALOG_MS),
            search: Duration::from_millis(DEFAULT_TIMEOUT_SEARCH_MS),
            product: Duration::from_millis(DEFAULT_TIMEOUT_PRODUCT_MS),
            recent: Duration::from_millis(DEFAULT_TIMEOUT_RECENT_MS),
            categories: Duration::from_millis(DEFAULT_TIMEOUT_CATEGORIES_MS),
            price_range: Duration::from_millis(DEFAULT_TIMEOUT_PRICE_RANGE_MS),
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

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    api: RawApiSettings,
}

impl RawSettings {
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
        if let Some(relation) = overrides.database_catalog_relation.as_ref() {
            self.database.catalog_relation = Some(relation.clone());
        }
        if let Some(backend) = overrides.cache_backend.as_ref() {
            self.cache.backend = Some(backend.clone());
        }
        if let Some(namespace) = overrides.cache_namespace.as_ref() {
            self.cache.namespace = Some(namespace.clone());
        }
        if let Some(capacity) = overrides.cache_memory_capacity {
            self.cache.memory_capacity = Some(capacity);
        }
        if let Some(size) = overrides.api_max_page_size {
            self.api.max_page_size = Some(size);
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
            api,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            api: build_api_settings(api)?,
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
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    if max_connections == 0 {
        return Err(LoadError::invalid(
            "database.max_connections",
            "must be greater than zero",
        ));
    }
    let min_connections = database
        .min_connections
        .unwrap_or(DEFAULT_DB_MIN_CONNECTIONS)
        .min(max_connections);

    let acquire_timeout = positive_secs(
        database.acquire_timeout_seconds,
        DEFAULT_DB_ACQUIRE_TIMEOUT_SECS,
        "database.acquire_timeout_seconds",
    )?;
    let idle_timeout = positive_secs(
        database.idle_timeout_seconds,
        DEFAULT_DB_IDLE_TIMEOUT_SECS,
        "database.idle_timeout_seconds",
    )?;
    let max_lifetime = positive_secs(
        database.max_lifetime_seconds,
        DEFAULT_DB_MAX_LIFETIME_SECS,
        "database.max_lifetime_seconds",
    )?;

    // Transaction-pooling proxies cannot keep prepared statements between queries.
    let statement_cache = !database.simple_protocol.unwrap_or(true);

    let relations = RelationSettings {
        catalog: database
            .catalog_relation
            .unwrap_or_else(|| DEFAULT_CATALOG_RELATION.to_string()),
        snapshots: database
            .snapshot_relation
            .unwrap_or_else(|| DEFAULT_SNAPSHOT_RELATION.to_string()),
    };

    Ok(DatabaseSettings {
        url,
        pool: PoolSettings {
            max_connections,
            min_connections,
            acquire_timeout,
            idle_timeout,
            max_lifetime,
            statement_cache,
        },
        relations,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let backend = match cache
        .backend
        .as_deref()
        .map(|value| value.trim().to_ascii_lowercase())
        .as_deref()
    {
        None | Some("memory") => CacheBackend::Memory,
        Some("none") | Some("off") => CacheBackend::None,
        Some(other) => {
            return Err(LoadError::invalid(
                "cache.backend",
                format!("unknown backend `{other}`, expected `memory` or `none`"),
            ));
        }
    };

    let capacity = cache
        .memory_capacity
        .unwrap_or(DEFAULT_CACHE_MEMORY_CAPACITY);
    let memory_capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
        LoadError::invalid("cache.memory_capacity", "must be greater than zero")
    })?;

    Ok(CacheSettings {
        backend,
        memory_capacity,
        policy: CachePolicy::new(cache.namespace.as_deref(), &cache.ttl_seconds),
    })
}

fn build_api_settings(api: RawApiSettings) -> Result<ApiSettings, LoadError> {
    let max_page_size = api
        .max_page_size
        .unwrap_or(DEFAULT_MAX_PAGE_SIZE)
        .max(MIN_MAX_PAGE_SIZE);

    let defaults = ApiTimeouts::default();
    let raw = api.timeouts_ms;
    let timeouts = ApiTimeouts {
        catalog: positive_millis(raw.catalog, defaults.catalog, "api.timeouts_ms.catalog")?,
        search: positive_millis(raw.search, defaults.search, "api.timeouts_ms.search")?,
        product: positive_millis(raw.product, defaults.product, "api.timeouts_ms.product")?,
        recent: positive_millis(raw.recent, defaults.recent, "api.timeouts_ms.recent")?,
        categories: positive_millis(
            raw.categories,
            defaults.categories,
            "api.timeouts_ms.categories",
        )?,
        price_range: positive_millis(
            raw.price_range,
            defaults.price_range,
            "api.timeouts_ms.price_range",
        )?,
    };

    Ok(ApiSettings {
        max_page_size,
        timeouts,
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
    min_connections: Option<u32>,
    acquire_timeout_seconds: Option<u64>,
    idle_timeout_seconds: Option<u64>,
    max_lifetime_seconds: Option<u64>,
    simple_protocol: Option<bool>,
    catalog_relation: Option<String>,
    snapshot_relation: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    backend: Option<String>,
    namespace: Option<String>,
    memory_capacity: Option<usize>,
    ttl_seconds: TtlSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawApiSettings {
    max_page_size: Option<u32>,
    timeouts_ms: RawApiTimeouts,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawApiTimeouts {
    catalog: Option<u64>,
    search: Option<u64>,
    product: Option<u64>,
    recent: Option<u64>,
    categories: Option<u64>,
    price_range: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn positive_secs(
    value: Option<u64>,
    default: u64,
    key: &'static str,
) -> Result<Duration, LoadError> {
    match value.unwrap_or(default) {
        0 => Err(LoadError::invalid(key, "must be greater than zero")),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn positive_millis(
    value: Option<u64>,
    default: Duration,
    key: &'static str,
) -> Result<Duration, LoadError> {
    match value {
        None => Ok(default),
        Some(0) => Err(LoadError::invalid(key, "must be greater than zero")),
        Some(ms) => Ok(Duration::from_millis(ms)),
    }
}
