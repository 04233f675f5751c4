//! Database connections
//!
//! [`DatabaseConnection`] wraps a `sqlx::AnyPool` so the migration engine can
//! drive SQLite and PostgreSQL through one code path. Statements are written
//! per dialect by the schema editors; this module only knows how to connect
//! and which dialect it is talking to.

use robosats_conf::DatabaseConfig;
use serde::{Deserialize, Serialize};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyPool, Executor};
use std::fmt;
use std::sync::Once;
use thiserror::Error;
use tracing::debug;

static INIT_DRIVERS: Once = Once::new();

fn init_drivers() {
	INIT_DRIVERS.call_once(sqlx::any::install_default_drivers);
}

#[derive(Debug, Error)]
pub enum DatabaseError {
	#[error("Unsupported database URL: {0}")]
	UnsupportedUrl(String),

	#[error("Connection error: {0}")]
	ConnectionError(#[source] sqlx::Error),

	#[error("Query error: {0}")]
	QueryError(#[from] sqlx::Error),
}

/// Database type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseType {
	Postgres,
	Sqlite,
}

impl DatabaseType {
	/// Detect the dialect from a connection URL
	///
	/// # Examples
	///
	/// ```
	/// use robosats_db::backends::DatabaseType;
	///
	/// assert_eq!(DatabaseType::from_url("sqlite::memory:").unwrap(), DatabaseType::Sqlite);
	/// assert_eq!(
	///     DatabaseType::from_url("postgresql://localhost/robosats").unwrap(),
	///     DatabaseType::Postgres
	/// );
	/// assert!(DatabaseType::from_url("mysql://localhost/robosats").is_err());
	/// ```
	pub fn from_url(url: &str) -> Result<Self, DatabaseError> {
		if url.starts_with("sqlite:") {
			Ok(DatabaseType::Sqlite)
		} else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
			Ok(DatabaseType::Postgres)
		} else {
			let scheme = url.split(':').next().unwrap_or_default();
			Err(DatabaseError::UnsupportedUrl(format!("{}:", scheme)))
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			DatabaseType::Postgres => "postgresql",
			DatabaseType::Sqlite => "sqlite",
		}
	}
}

impl fmt::Display for DatabaseType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

fn is_memory_url(url: &str) -> bool {
	url.contains(":memory:") || url.contains("mode=memory")
}

/// Pooled connection to the database being migrated
#[derive(Clone)]
pub struct DatabaseConnection {
	pool: AnyPool,
	database_type: DatabaseType,
}

impl DatabaseConnection {
	/// Connect to `url`
	///
	/// SQLite connections turn on `PRAGMA foreign_keys` so that delete
	/// actions are enforced. An in-memory SQLite database lives as long as its
	/// connection, so the pool keeps exactly one connection open forever.
	pub async fn connect(url: &str) -> Result<Self, DatabaseError> {
		init_drivers();
		let database_type = DatabaseType::from_url(url)?;

		let mut options = AnyPoolOptions::new();
		if database_type == DatabaseType::Sqlite {
			options = options.after_connect(|conn, _meta| {
				Box::pin(async move {
					conn.execute("PRAGMA foreign_keys = ON").await?;
					Ok(())
				})
			});
			if is_memory_url(url) {
				options = options
					.min_connections(1)
					.max_connections(1)
					.idle_timeout(None)
					.max_lifetime(None);
			}
		}

		let pool = options
			.connect(url)
			.await
			.map_err(DatabaseError::ConnectionError)?;
		debug!(database = %database_type, "Connected");

		Ok(Self {
			pool,
			database_type,
		})
	}

	/// Connect using the `[database]` settings section
	pub async fn from_config(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
		Self::connect(&config.to_url()).await
	}

	pub fn database_type(&self) -> DatabaseType {
		self.database_type
	}

	pub fn pool(&self) -> &AnyPool {
		&self.pool
	}

	/// Check a connection out of the pool
	pub async fn acquire(&self) -> Result<PoolConnection<Any>, DatabaseError> {
		Ok(self.pool.acquire().await?)
	}

	/// Execute a statement without bind parameters
	pub async fn execute(&self, sql: &str) -> Result<u64, DatabaseError> {
		let result = sqlx::query(sql).execute(&self.pool).await?;
		Ok(result.rows_affected())
	}

	/// Run a query without bind parameters and collect its rows
	pub async fn fetch_all(&self, sql: &str) -> Result<Vec<AnyRow>, DatabaseError> {
		Ok(sqlx::query(sql).fetch_all(&self.pool).await?)
	}

	pub async fn close(&self) {
		self.pool.close().await;
	}
}

impl fmt::Debug for DatabaseConnection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DatabaseConnection")
			.field("database_type", &self.database_type)
			.field("size", &self.pool.size())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use sqlx::Row;

	#[rstest]
	#[case("sqlite::memory:", DatabaseType::Sqlite)]
	#[case("sqlite://robosats.sqlite3?mode=rwc", DatabaseType::Sqlite)]
	#[case("postgres://postgres@localhost/robosats", DatabaseType::Postgres)]
	#[case("postgresql://localhost:5432/robosats", DatabaseType::Postgres)]
	fn test_database_type_from_url(#[case] url: &str, #[case] expected: DatabaseType) {
		assert_eq!(DatabaseType::from_url(url).unwrap(), expected);
	}

	#[rstest]
	fn test_unsupported_url() {
		let err = DatabaseType::from_url("mysql://localhost/robosats").unwrap_err();
		assert!(matches!(err, DatabaseError::UnsupportedUrl(ref scheme) if scheme == "mysql:"));
	}

	#[rstest]
	#[tokio::test]
	async fn test_memory_database_survives_between_queries() {
		let connection = DatabaseConnection::connect("sqlite::memory:").await.unwrap();
		connection
			.execute("CREATE TABLE probe (id INTEGER PRIMARY KEY)")
			.await
			.unwrap();
		connection.execute("INSERT INTO probe (id) VALUES (1)").await.unwrap();

		let rows = connection.fetch_all("SELECT COUNT(*) AS n FROM probe").await.unwrap();
		assert_eq!(rows[0].get::<i64, _>("n"), 1);
	}

	#[rstest]
	#[tokio::test]
	async fn test_sqlite_foreign_keys_enabled() {
		let connection = DatabaseConnection::connect("sqlite::memory:").await.unwrap();
		let rows = connection.fetch_all("PRAGMA foreign_keys").await.unwrap();
		assert_eq!(rows[0].get::<i64, _>(0), 1);
	}
}
