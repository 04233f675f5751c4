//! Test fixtures
//!
//! Every fixture builds fresh state, so tests never share a database or a
//! registry.

use robosats_api::ApiMigrations;
use robosats_db::DatabaseConnection;
use robosats_db::migrations::{LocalRegistry, Migration, MigrationExecutor, MigrationProvider};
use rstest::*;

/// Route engine logs to the test harness; `RUST_LOG` selects what is shown
pub fn init_test_logging() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

async fn connect_memory() -> DatabaseConnection {
	DatabaseConnection::connect("sqlite::memory:")
		.await
		.expect("Failed to connect to in-memory SQLite")
}

/// Fresh in-memory SQLite database
///
/// The pool holds a single connection, so release any connection acquired
/// from it before running statements through the pool.
///
/// # Examples
///
/// ```rust,ignore
/// #[rstest]
/// #[tokio::test]
/// async fn test_with_database(#[future] sqlite_connection: DatabaseConnection) {
///     let connection = sqlite_connection.await;
///     connection.execute("CREATE TABLE t (id integer)").await.unwrap();
/// }
/// ```
#[fixture]
pub async fn sqlite_connection() -> DatabaseConnection {
	init_test_logging();
	connect_memory().await
}

/// Creates a new isolated migration registry for testing
#[fixture]
pub fn migration_registry() -> LocalRegistry {
	LocalRegistry::new()
}

/// Every migration of the `api` app
#[fixture]
pub fn api_migrations() -> Vec<Migration> {
	ApiMigrations::migrations()
}

/// Executor over a fresh in-memory SQLite database with the default ledger
/// table
#[fixture]
pub async fn api_executor() -> MigrationExecutor {
	init_test_logging();
	MigrationExecutor::new(connect_memory().await).expect("default ledger table name is valid")
}

#[cfg(test)]
mod tests {
	use super::*;
	use robosats_db::migrations::MigrationRegistry;

	#[rstest]
	fn test_migration_registry_fixture(migration_registry: LocalRegistry) {
		assert!(migration_registry.all_migrations().is_empty());
	}

	#[rstest]
	fn test_api_migrations_fixture(
		migration_registry: LocalRegistry,
		api_migrations: Vec<Migration>,
	) {
		for migration in api_migrations {
			migration_registry.register(migration).unwrap();
		}
		assert_eq!(migration_registry.migrations_for_app("api").len(), 3);
	}

	#[rstest]
	#[tokio::test]
	async fn test_executor_starts_empty(#[future] api_executor: MigrationExecutor) {
		let executor = api_executor.await;
		assert!(executor.applied().await.unwrap().is_empty());
	}
}
