//! # Engine Configuration
//!
//! Pure translation from dialect-specific settings to a connection URL and
//! pool options. Nothing in this module opens a connection.
//!
//! ## Dialects
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       EngineConfig (sum type)                           │
//! │                                                                         │
//! │  Postgres(NetworkConfig)                 Sqlite(EmbeddedConfig)        │
//! │  ───────────────────────                 ──────────────────────        │
//! │  host, port, name                        path (or ":memory:")          │
//! │  username, password                                                    │
//! │  pool_size, max_overflow                 fixed pool (5 / 1 for memory) │
//! │       │                                        │                        │
//! │       ▼                                        ▼                        │
//! │  postgresql+async://u:p@host:5432/name   sqlite+async://path?mode=rwc  │
//! │  postgresql+blocking://u:p@host:5432/..  sqlite+blocking://path?...    │
//! │                                                                         │
//! │  The async and blocking forms differ ONLY in the driver tag.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Validation
//! [`EngineConfigBuilder::build`] rejects missing fields with
//! [`DbError::Configuration`]. Configuration files deserialize through the
//! same builder, so a file with a missing host fails the same way.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::{DbError, DbResult};

/// SQLite path that selects a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// Default connection recycle interval (30 minutes).
pub const DEFAULT_RECYCLE_SECS: u64 = 1800;

// =============================================================================
// Dialect & Driver
// =============================================================================

/// Category of backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Networked relational store.
    Postgres,
    /// Embedded file-based store.
    Sqlite,
}

impl Dialect {
    /// URL scheme without a driver tag.
    pub fn scheme(self) -> &'static str {
        match self {
            Dialect::Postgres => "postgresql",
            Dialect::Sqlite => "sqlite",
        }
    }

    fn from_scheme(scheme: &str) -> DbResult<Self> {
        match scheme {
            "postgresql" | "postgres" => Ok(Dialect::Postgres),
            "sqlite" => Ok(Dialect::Sqlite),
            other => Err(DbError::Configuration(format!(
                "unsupported database scheme '{}'",
                other
            ))),
        }
    }
}

/// Execution mode encoded in the URL's driver tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Driver {
    /// Suspending I/O on the caller's Tokio runtime.
    Async,
    /// Calling thread blocks; I/O runs on the engine's private runtime.
    Blocking,
}

impl Driver {
    pub fn tag(self) -> &'static str {
        match self {
            Driver::Async => "async",
            Driver::Blocking => "blocking",
        }
    }

    fn from_tag(tag: &str) -> DbResult<Self> {
        match tag {
            "async" => Ok(Driver::Async),
            "blocking" => Ok(Driver::Blocking),
            other => Err(DbError::Configuration(format!(
                "unsupported driver tag '{}'",
                other
            ))),
        }
    }
}

// =============================================================================
// Pool Settings
// =============================================================================

/// Connection pool options.
///
/// `pool_size` connections form the steady pool, `max_overflow` more may be
/// opened under load. Connections older than `recycle_secs` are replaced,
/// and with `pre_ping` every checkout is liveness-checked first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub pool_size: u32,
    pub max_overflow: u32,
    pub recycle_secs: u64,
    pub acquire_timeout_secs: u64,
    pub pre_ping: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        PoolSettings {
            pool_size: 5,
            max_overflow: 10,
            recycle_secs: DEFAULT_RECYCLE_SECS,
            acquire_timeout_secs: 30,
            pre_ping: true,
        }
    }
}

impl PoolSettings {
    /// Pool options for the embedded dialect.
    ///
    /// An in-memory database exists per connection, so it gets exactly one.
    pub fn embedded(in_memory: bool) -> Self {
        PoolSettings {
            pool_size: if in_memory { 1 } else { 5 },
            max_overflow: 0,
            ..PoolSettings::default()
        }
    }

    /// Upper bound of simultaneously open connections.
    pub fn max_connections(&self) -> u32 {
        self.pool_size.saturating_add(self.max_overflow).max(1)
    }

    pub fn recycle(&self) -> Duration {
        Duration::from_secs(self.recycle_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

// =============================================================================
// Dialect Payloads
// =============================================================================

/// Settings for the networked dialect.
#[derive(Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    host: String,
    port: u16,
    name: String,
    username: String,
    password: String,
    pool: PoolSettings,
}

impl NetworkConfig {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn pool(&self) -> PoolSettings {
        self.pool
    }

    fn url(&self, driver: Driver) -> DbResult<String> {
        let base = format!(
            "{}+{}://{}:{}/{}",
            Dialect::Postgres.scheme(),
            driver.tag(),
            self.host,
            self.port,
            self.name
        );
        let mut url = Url::parse(&base)
            .map_err(|e| DbError::Configuration(format!("invalid database url: {}", e)))?;

        // Url percent-encodes credentials as it stores them
        url.set_username(&self.username)
            .map_err(|_| DbError::Configuration("username cannot be set on url".to_string()))?;
        url.set_password(Some(&self.password))
            .map_err(|_| DbError::Configuration("password cannot be set on url".to_string()))?;

        Ok(url.into())
    }
}

impl fmt::Debug for NetworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("username", &self.username)
            .field("password", &"***")
            .field("pool", &self.pool)
            .finish()
    }
}

/// Settings for the embedded dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedConfig {
    path: PathBuf,
}

impl EmbeddedConfig {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_memory(&self) -> bool {
        self.path.as_os_str() == MEMORY_PATH
    }

    fn url(&self, driver: Driver) -> String {
        let scheme = format!("{}+{}", Dialect::Sqlite.scheme(), driver.tag());
        if self.is_memory() {
            // `sqlite://:memory:` is not a valid URL authority
            format!("{}::memory:", scheme)
        } else {
            format!("{}://{}?mode=rwc", scheme, self.path.to_string_lossy())
        }
    }
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Resolved database configuration: exactly one dialect is active.
///
/// ## Example
/// ```rust
/// use strata_db::config::{Dialect, Driver, EngineConfig};
///
/// let config = EngineConfig::builder()
///     .dialect(Dialect::Postgres)
///     .host("db")
///     .port(5432)
///     .name("app")
///     .username("u")
///     .password("p")
///     .build()
///     .unwrap();
///
/// assert_eq!(
///     config.url(Driver::Async).unwrap(),
///     "postgresql+async://u:p@db:5432/app"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "EngineConfigBuilder")]
pub enum EngineConfig {
    Postgres(NetworkConfig),
    Sqlite(EmbeddedConfig),
}

impl EngineConfig {
    /// Starts an empty builder.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Embedded configuration for `path` (`":memory:"` for a private database).
    pub fn sqlite(path: impl Into<PathBuf>) -> DbResult<Self> {
        Self::builder().dialect(Dialect::Sqlite).path(path).build()
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            EngineConfig::Postgres(_) => Dialect::Postgres,
            EngineConfig::Sqlite(_) => Dialect::Sqlite,
        }
    }

    /// Connection URL for the given execution mode.
    ///
    /// Identical inputs always produce byte-identical output.
    pub fn url(&self, driver: Driver) -> DbResult<String> {
        match self {
            EngineConfig::Postgres(network) => network.url(driver),
            EngineConfig::Sqlite(embedded) => Ok(embedded.url(driver)),
        }
    }

    /// URL with the password masked, for logs.
    pub fn redacted_url(&self, driver: Driver) -> String {
        match self.url(driver) {
            Ok(url) => redact(&url),
            Err(_) => "<invalid url>".to_string(),
        }
    }

    /// Pool options for this dialect.
    pub fn pool_settings(&self) -> PoolSettings {
        match self {
            EngineConfig::Postgres(network) => network.pool,
            EngineConfig::Sqlite(embedded) => PoolSettings::embedded(embedded.is_memory()),
        }
    }
}

/// Unvalidated configuration; also the on-disk representation.
///
/// Fields that belong to the inactive dialect are ignored by [`build`].
///
/// [`build`]: EngineConfigBuilder::build
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfigBuilder {
    dialect: Option<Dialect>,
    host: Option<String>,
    port: Option<u16>,
    name: Option<String>,
    username: Option<String>,
    password: Option<String>,
    path: Option<PathBuf>,
    pool_size: Option<u32>,
    max_overflow: Option<u32>,
    recycle_secs: Option<u64>,
}

impl EngineConfigBuilder {
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = Some(pool_size);
        self
    }

    pub fn max_overflow(mut self, max_overflow: u32) -> Self {
        self.max_overflow = Some(max_overflow);
        self
    }

    pub fn recycle_secs(mut self, recycle_secs: u64) -> Self {
        self.recycle_secs = Some(recycle_secs);
        self
    }

    /// Validates and freezes the configuration.
    pub fn build(self) -> DbResult<EngineConfig> {
        match self.dialect.ok_or_else(|| DbError::missing("dialect"))? {
            Dialect::Postgres => {
                let defaults = PoolSettings::default();
                let pool = PoolSettings {
                    pool_size: self.pool_size.unwrap_or(defaults.pool_size),
                    max_overflow: self.max_overflow.unwrap_or(defaults.max_overflow),
                    recycle_secs: self.recycle_secs.unwrap_or(defaults.recycle_secs),
                    ..defaults
                };

                Ok(EngineConfig::Postgres(NetworkConfig {
                    host: required_text(self.host, "host")?,
                    port: self
                        .port
                        .filter(|port| *port != 0)
                        .ok_or_else(|| DbError::missing("port"))?,
                    name: required_text(self.name, "name")?,
                    username: required_text(self.username, "username")?,
                    password: required_text(self.password, "password")?,
                    pool,
                }))
            }
            Dialect::Sqlite => {
                let path = self
                    .path
                    .filter(|path| !path.as_os_str().is_empty())
                    .ok_or_else(|| DbError::missing("path"))?;

                Ok(EngineConfig::Sqlite(EmbeddedConfig { path }))
            }
        }
    }
}

impl TryFrom<EngineConfigBuilder> for EngineConfig {
    type Error = DbError;

    fn try_from(builder: EngineConfigBuilder) -> DbResult<Self> {
        builder.build()
    }
}

fn required_text(value: Option<String>, field: &str) -> DbResult<String> {
    value
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| DbError::missing(field))
}

// =============================================================================
// URL Parsing
// =============================================================================

/// A connection URL split into its dialect, driver and the driver-free form
/// handed to sqlx.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionUrl {
    dialect: Dialect,
    driver: Driver,
    target: String,
}

impl ConnectionUrl {
    /// Parses `<scheme>[+<driver>]:<rest>`. A missing driver tag means async.
    pub fn parse(url: &str) -> DbResult<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(DbError::Configuration("url is empty".to_string()));
        }

        let (scheme, rest) = url
            .split_once(':')
            .ok_or_else(|| DbError::Configuration("url has no scheme".to_string()))?;
        let (base, tag) = match scheme.split_once('+') {
            Some((base, tag)) => (base, Some(tag)),
            None => (scheme, None),
        };

        let dialect = Dialect::from_scheme(base)?;
        let driver = match tag {
            Some(tag) => Driver::from_tag(tag)?,
            None => Driver::Async,
        };

        Ok(ConnectionUrl {
            dialect,
            driver,
            target: format!("{}:{}", base, rest),
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn driver(&self) -> Driver {
        self.driver
    }

    /// The URL without the driver tag.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// True for SQLite databases that live only as long as their connection.
    pub fn is_memory(&self) -> bool {
        self.dialect == Dialect::Sqlite
            && (self.target.contains(MEMORY_PATH) || self.target.contains("mode=memory"))
    }

    /// The driver-free URL with the password masked.
    pub fn redacted(&self) -> String {
        redact(&self.target)
    }
}

fn redact(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            // set_password only fails for URLs without a host, excluded above
            let _ = parsed.set_password(Some("***"));
            parsed.into()
        }
        Ok(parsed) => parsed.into(),
        Err(_) => "<unparseable url>".to_string(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> EngineConfigBuilder {
        EngineConfig::builder()
            .dialect(Dialect::Postgres)
            .host("db")
            .port(5432)
            .name("app")
            .username("u")
            .password("p")
    }

    #[test]
    fn test_async_and_blocking_urls_differ_only_in_driver_tag() {
        let config = network().build().unwrap();

        let async_url = config.url(Driver::Async).unwrap();
        let blocking_url = config.url(Driver::Blocking).unwrap();

        assert_eq!(async_url, "postgresql+async://u:p@db:5432/app");
        assert_eq!(blocking_url, "postgresql+blocking://u:p@db:5432/app");
        assert_eq!(
            async_url.replacen("+async", "", 1),
            blocking_url.replacen("+blocking", "", 1)
        );
    }

    #[test]
    fn test_url_is_deterministic() {
        let a = network().build().unwrap();
        let b = network().build().unwrap();

        assert_eq!(a.url(Driver::Async).unwrap(), b.url(Driver::Async).unwrap());
    }

    #[test]
    fn test_credentials_are_percent_encoded() {
        let config = network().username("app user").password("p@ss:word").build().unwrap();

        assert_eq!(
            config.url(Driver::Async).unwrap(),
            "postgresql+async://app%20user:p%40ss%3Aword@db:5432/app"
        );
    }

    #[test]
    fn test_missing_network_fields_fail_before_connecting() {
        let no_host = EngineConfig::builder()
            .dialect(Dialect::Postgres)
            .port(5432)
            .name("a")
            .username("u")
            .password("p");
        let no_port = EngineConfig::builder()
            .dialect(Dialect::Postgres)
            .host("db")
            .name("a")
            .username("u")
            .password("p");

        let cases = [
            (no_host, "host"),
            (network().host("  "), "host"),
            (no_port, "port"),
            (network().name(""), "name"),
            (network().password(""), "password"),
        ];

        for (builder, field) in cases {
            match builder.build() {
                Err(DbError::Configuration(msg)) => {
                    assert_eq!(msg, format!("{} is required", field))
                }
                other => panic!("expected configuration error for {}, got {:?}", field, other),
            }
        }
    }

    #[test]
    fn test_missing_dialect_and_path() {
        assert!(matches!(
            EngineConfig::builder().host("db").build(),
            Err(DbError::Configuration(_))
        ));
        assert!(matches!(
            EngineConfig::builder().dialect(Dialect::Sqlite).host("ignored").build(),
            Err(DbError::Configuration(_))
        ));
    }

    #[test]
    fn test_pool_settings_follow_config() {
        let config = network().pool_size(5).max_overflow(10).build().unwrap();
        let pool = config.pool_settings();

        assert_eq!(pool.pool_size, 5);
        assert_eq!(pool.max_overflow, 10);
        assert_eq!(pool.max_connections(), 15);
        assert_eq!(pool.recycle(), Duration::from_secs(1800));
        assert!(pool.pre_ping);
    }

    #[test]
    fn test_sqlite_urls() {
        let file = EngineConfig::sqlite("/var/lib/app/app.db").unwrap();
        assert_eq!(
            file.url(Driver::Async).unwrap(),
            "sqlite+async:///var/lib/app/app.db?mode=rwc"
        );
        assert_eq!(file.pool_settings().max_connections(), 5);

        let memory = EngineConfig::sqlite(MEMORY_PATH).unwrap();
        assert_eq!(memory.url(Driver::Blocking).unwrap(), "sqlite+blocking::memory:");
        assert_eq!(memory.pool_settings().max_connections(), 1);
    }

    #[test]
    fn test_parse_strips_driver_tag() {
        let parsed = ConnectionUrl::parse("postgresql+blocking://u:p@db:5432/app").unwrap();

        assert_eq!(parsed.dialect(), Dialect::Postgres);
        assert_eq!(parsed.driver(), Driver::Blocking);
        assert_eq!(parsed.target(), "postgresql://u:p@db:5432/app");
        assert_eq!(parsed.redacted(), "postgresql://u:***@db:5432/app");

        let untagged = ConnectionUrl::parse("sqlite::memory:").unwrap();
        assert_eq!(untagged.driver(), Driver::Async);
        assert_eq!(untagged.target(), "sqlite::memory:");
    }

    #[test]
    fn test_memory_urls_are_recognised() {
        assert!(ConnectionUrl::parse("sqlite::memory:").unwrap().is_memory());
        assert!(ConnectionUrl::parse("sqlite+async://shared?mode=memory&cache=shared")
            .unwrap()
            .is_memory());
        assert!(!ConnectionUrl::parse("sqlite:///tmp/app.db?mode=rwc").unwrap().is_memory());
        assert!(!ConnectionUrl::parse("postgresql://u:p@db/app").unwrap().is_memory());
    }

    #[test]
    fn test_parse_rejects_empty_and_unknown() {
        match ConnectionUrl::parse("   ") {
            Err(DbError::Configuration(msg)) => assert_eq!(msg, "url is empty"),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(ConnectionUrl::parse("mysql://db/app").is_err());
        assert!(ConnectionUrl::parse("postgresql+odbc://db/app").is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let config = network().password("hunter2").build().unwrap();
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
