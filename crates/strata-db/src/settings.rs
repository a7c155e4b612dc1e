//! # Settings
//!
//! Database settings loaded from TOML files and environment variables.
//!
//! ## Layering
//! ```text
//! files, in the order given      later files override earlier ones
//!        │
//!        ▼
//! STRATA__DB__HOST=db            environment overrides every file
//! STRATA__REPLICA__PATH=...      (`__` separates nesting levels)
//!        │
//!        ▼
//! Settings { db, replica }       each validated by EngineConfigBuilder
//! ```
//!
//! ## Example File
//! ```toml
//! [db]
//! dialect = "postgres"
//! host = "localhost"
//! port = 5432
//! name = "app"
//! username = "app"
//! password = "secret"
//! pool_size = 5
//! max_overflow = 10
//! ```

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

use crate::config::{Driver, EngineConfig};
use crate::error::{DbError, DbResult};

/// Prefix of environment variables read by [`Settings::load`].
pub const ENV_PREFIX: &str = "STRATA";

/// Resolved database settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Primary database.
    #[serde(default)]
    pub db: Option<EngineConfig>,

    /// Optional read replica.
    #[serde(default)]
    pub replica: Option<EngineConfig>,
}

impl Settings {
    /// Loads `paths` in order, then `STRATA__*` environment variables.
    ///
    /// Every listed file must exist.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> DbResult<Self> {
        Self::load_with_prefix(paths, ENV_PREFIX)
    }

    /// Like [`load`](Self::load) with a custom environment prefix.
    pub fn load_with_prefix<P: AsRef<Path>>(paths: &[P], prefix: &str) -> DbResult<Self> {
        let mut builder = Config::builder();
        for path in paths {
            let path = path.as_ref();
            debug!(path = %path.display(), "Adding settings file");
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| DbError::Configuration(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| DbError::Configuration(e.to_string()))
    }

    /// Parses settings from TOML text, without environment overrides.
    pub fn from_toml(text: &str) -> DbResult<Self> {
        Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| DbError::Configuration(e.to_string()))
    }

    /// The primary database configuration.
    ///
    /// ## Errors
    /// `Configuration("set db in config")` when absent.
    pub fn require_db(&self) -> DbResult<&EngineConfig> {
        self.db
            .as_ref()
            .ok_or_else(|| DbError::Configuration("set db in config".to_string()))
    }

    /// Connection URL of the primary database.
    pub fn database_url(&self, driver: Driver) -> DbResult<String> {
        self.require_db()?.url(driver)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Dialect;
    use std::io::Write;

    const NETWORK: &str = r#"
        [db]
        dialect = "postgres"
        host = "db"
        port = 5432
        name = "app"
        username = "u"
        password = "p"
    "#;

    fn write_file(dir: &tempfile::TempDir, name: &str, text: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_from_toml_builds_network_config() {
        let settings = Settings::from_toml(NETWORK).unwrap();

        assert_eq!(
            settings.database_url(Driver::Async).unwrap(),
            "postgresql+async://u:p@db:5432/app"
        );
        assert!(settings.replica.is_none());
    }

    #[test]
    fn test_missing_field_in_file_is_configuration_error() {
        let result = Settings::from_toml("[db]\ndialect = \"postgres\"\nport = 5432\n");
        match result {
            Err(DbError::Configuration(msg)) => {
                assert!(msg.contains("host is required"), "{}", msg)
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_require_db() {
        let empty = Settings::from_toml("").unwrap();
        match empty.require_db() {
            Err(DbError::Configuration(msg)) => assert_eq!(msg, "set db in config"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_later_files_and_environment_override() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_file(&dir, "base.toml", NETWORK);
        let local = write_file(
            &dir,
            "local.toml",
            "[db]\nhost = \"local-db\"\n\n[replica]\ndialect = \"sqlite\"\npath = \"replica.db\"\n",
        );

        std::env::set_var("STRATA_SETTINGS_TEST__DB__PORT", "6543");
        let settings = Settings::load_with_prefix(&[base, local], "STRATA_SETTINGS_TEST").unwrap();
        std::env::remove_var("STRATA_SETTINGS_TEST__DB__PORT");

        assert_eq!(
            settings.database_url(Driver::Blocking).unwrap(),
            "postgresql+blocking://u:p@local-db:6543/app"
        );
        assert_eq!(settings.replica.map(|r| r.dialect()), Some(Dialect::Sqlite));
    }

    #[test]
    fn test_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result =
            Settings::load_with_prefix(&[dir.path().join("absent.toml")], "STRATA_SETTINGS_ABSENT");
        assert!(matches!(result, Err(DbError::Configuration(_))));
    }
}
