//! # RoboSats Conf
//!
//! Settings for the RoboSats schema tooling.
//!
//! Settings are read from a TOML file and then overridden by environment
//! variables carrying the `ROBOSATS_` prefix:
//!
//! | Variable                    | Setting                       |
//! |-----------------------------|-------------------------------|
//! | `ROBOSATS_DATABASE_URL`     | `database.url`                |
//! | `ROBOSATS_MIGRATIONS_TABLE` | `migrations.table`            |
//! | `ROBOSATS_TRANSACTION_MODE` | `migrations.transaction_mode` |
//! | `ROBOSATS_LOG_LEVEL`        | `logging.level`               |
//! | `ROBOSATS_LOG_FORMAT`       | `logging.format`              |
//!
//! ```toml
//! [database]
//! engine = "postgresql"
//! name = "robosats"
//! user = "postgres"
//! password = "example"
//! host = "localhost"
//! port = 5432
//!
//! [migrations]
//! table = "robosats_migrations"
//! transaction_mode = "respect_migration_flags"
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! ```

pub mod settings;

pub use settings::{
	DatabaseConfig, DatabaseEngine, ENV_PREFIX, LogFormat, LoggingSettings, MigrationSettings,
	Settings, SettingsError, TransactionMode, is_valid_identifier,
};
