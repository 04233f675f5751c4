//! Schema assertions
//!
//! Each helper checks a connection out of the pool and returns it before
//! asserting, which keeps them usable on single-connection SQLite pools.

use robosats_db::DatabaseConnection;
use robosats_db::migrations::{ColumnInfo, DatabaseIntrospector, ForeignKeyAction, ForeignKeyInfo};

fn introspector(connection: &DatabaseConnection) -> DatabaseIntrospector {
	DatabaseIntrospector::new(connection.database_type())
}

pub async fn table_exists(connection: &DatabaseConnection, table: &str) -> bool {
	let mut conn = connection.acquire().await.expect("Failed to acquire connection");
	introspector(connection)
		.table_exists(&mut conn, table)
		.await
		.expect("Failed to inspect tables")
}

/// Metadata of `table.column`, panicking when the column does not exist
pub async fn column(connection: &DatabaseConnection, table: &str, column: &str) -> ColumnInfo {
	let mut conn = connection.acquire().await.expect("Failed to acquire connection");
	let columns = introspector(connection)
		.columns(&mut conn, table)
		.await
		.expect("Failed to inspect columns");
	columns
		.into_iter()
		.find(|info| info.name == column)
		.unwrap_or_else(|| panic!("column {}.{} does not exist", table, column))
}

/// Foreign key declared on `table.column`, if any
pub async fn foreign_key(
	connection: &DatabaseConnection,
	table: &str,
	column: &str,
) -> Option<ForeignKeyInfo> {
	let mut conn = connection.acquire().await.expect("Failed to acquire connection");
	introspector(connection)
		.foreign_keys(&mut conn, table)
		.await
		.expect("Failed to inspect foreign keys")
		.into_iter()
		.find(|info| info.column == column)
}

pub async fn index_names(connection: &DatabaseConnection, table: &str) -> Vec<String> {
	let mut conn = connection.acquire().await.expect("Failed to acquire connection");
	introspector(connection)
		.index_names(&mut conn, table)
		.await
		.expect("Failed to inspect indexes")
}

pub async fn assert_table_exists(connection: &DatabaseConnection, table: &str) {
	assert!(table_exists(connection, table).await, "table {} does not exist", table);
}

pub async fn assert_table_missing(connection: &DatabaseConnection, table: &str) {
	assert!(!table_exists(connection, table).await, "table {} exists", table);
}

pub async fn assert_column_nullable(
	connection: &DatabaseConnection,
	table: &str,
	column_name: &str,
	nullable: bool,
) {
	let info = column(connection, table, column_name).await;
	assert_eq!(
		info.nullable, nullable,
		"{}.{} nullable: expected {}, got {}",
		table, column_name, nullable, info.nullable
	);
}

/// Assert that `table.column` references `referenced_table` with `on_delete`
pub async fn assert_foreign_key(
	connection: &DatabaseConnection,
	table: &str,
	column_name: &str,
	referenced_table: &str,
	on_delete: ForeignKeyAction,
) {
	let info = foreign_key(connection, table, column_name)
		.await
		.unwrap_or_else(|| panic!("{}.{} has no foreign key", table, column_name));
	assert_eq!(info.referenced_table, referenced_table);
	assert_eq!(
		info.on_delete, on_delete,
		"{}.{} on delete: expected {}, got {}",
		table, column_name, on_delete, info.on_delete
	);
}

pub async fn assert_index_exists(connection: &DatabaseConnection, table: &str, index: &str) {
	let indexes = index_names(connection, table).await;
	assert!(
		indexes.iter().any(|name| name == index),
		"index {} not found on {}: {:?}",
		index,
		table,
		indexes
	);
}
