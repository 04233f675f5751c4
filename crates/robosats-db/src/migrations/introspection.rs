//! Live schema introspection
//!
//! Reads tables, columns and foreign keys from `sqlite_master` / `PRAGMA`
//! table functions on SQLite and from the system catalogs on PostgreSQL.
//! Catalog values are cast to `text` on PostgreSQL so they decode through
//! the `Any` driver.

use super::fields::ForeignKeyAction;
use super::{MigrationError, Result};
use crate::backends::DatabaseType;
use sqlx::{AnyConnection, Row};

/// Column metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
	pub name: String,
	/// Declared type as reported by the database
	pub data_type: String,
	pub nullable: bool,
	pub primary_key: bool,
}

/// Foreign key constraint metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyInfo {
	/// Constraint name; SQLite does not report one
	pub name: Option<String>,
	pub column: String,
	pub referenced_table: String,
	pub referenced_column: Option<String>,
	pub on_delete: ForeignKeyAction,
}

/// Foreign key a column is expected to carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedReference {
	pub table: String,
	pub column: String,
	pub action: ForeignKeyAction,
}

pub struct DatabaseIntrospector {
	database_type: DatabaseType,
}

impl DatabaseIntrospector {
	pub fn new(database_type: DatabaseType) -> Self {
		Self { database_type }
	}

	pub fn database_type(&self) -> DatabaseType {
		self.database_type
	}

	pub async fn table_exists(&self, conn: &mut AnyConnection, table: &str) -> Result<bool> {
		let sql = match self.database_type {
			DatabaseType::Sqlite => {
				"SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = ?"
			}
			DatabaseType::Postgres => {
				"SELECT COUNT(*) AS n FROM pg_catalog.pg_tables \
				 WHERE schemaname = current_schema() AND tablename = $1"
			}
		};
		let row = sqlx::query(sql).bind(table).fetch_one(&mut *conn).await?;
		Ok(row.try_get::<i64, _>("n")? > 0)
	}

	/// Columns of `table` in ordinal order
	pub async fn columns(&self, conn: &mut AnyConnection, table: &str) -> Result<Vec<ColumnInfo>> {
		match self.database_type {
			DatabaseType::Sqlite => {
				let rows = sqlx::query(
					"SELECT name, type, \"notnull\" AS not_null, pk FROM pragma_table_info(?)",
				)
				.bind(table)
				.fetch_all(&mut *conn)
				.await?;
				rows.iter()
					.map(|row| -> Result<ColumnInfo> {
						Ok(ColumnInfo {
							name: row.try_get("name")?,
							data_type: row.try_get("type")?,
							nullable: row.try_get::<i64, _>("not_null")? == 0,
							primary_key: row.try_get::<i64, _>("pk")? > 0,
						})
					})
					.collect()
			}
			DatabaseType::Postgres => {
				let rows = sqlx::query(
					"SELECT a.attname::text AS name, \
					        format_type(a.atttypid, a.atttypmod) AS data_type, \
					        NOT a.attnotnull AS nullable, \
					        EXISTS ( \
					            SELECT 1 FROM pg_catalog.pg_index i \
					            WHERE i.indrelid = a.attrelid AND i.indisprimary \
					              AND a.attnum = ANY(i.indkey) \
					        ) AS primary_key \
					 FROM pg_catalog.pg_attribute a \
					 JOIN pg_catalog.pg_class c ON c.oid = a.attrelid \
					 JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
					 WHERE c.relname = $1 AND n.nspname = current_schema() \
					   AND a.attnum > 0 AND NOT a.attisdropped \
					 ORDER BY a.attnum",
				)
				.bind(table)
				.fetch_all(&mut *conn)
				.await?;
				rows.iter()
					.map(|row| -> Result<ColumnInfo> {
						Ok(ColumnInfo {
							name: row.try_get("name")?,
							data_type: row.try_get("data_type")?,
							nullable: row.try_get("nullable")?,
							primary_key: row.try_get("primary_key")?,
						})
					})
					.collect()
			}
		}
	}

	pub async fn foreign_keys(
		&self,
		conn: &mut AnyConnection,
		table: &str,
	) -> Result<Vec<ForeignKeyInfo>> {
		match self.database_type {
			DatabaseType::Sqlite => {
				let rows = sqlx::query(
					"SELECT \"table\" AS referenced_table, \"from\" AS column_name, \
					        \"to\" AS referenced_column, on_delete \
					 FROM pragma_foreign_key_list(?)",
				)
				.bind(table)
				.fetch_all(&mut *conn)
				.await?;
				rows.iter()
					.map(|row| -> Result<ForeignKeyInfo> {
						let action: String = row.try_get("on_delete")?;
						Ok(ForeignKeyInfo {
							name: None,
							column: row.try_get("column_name")?,
							referenced_table: row.try_get("referenced_table")?,
							referenced_column: row.try_get("referenced_column")?,
							on_delete: parse_action(table, &action, ForeignKeyAction::from_sql_keyword)?,
						})
					})
					.collect()
			}
			DatabaseType::Postgres => {
				let rows = sqlx::query(
					"SELECT con.conname::text AS name, \
					        att.attname::text AS column_name, \
					        ref.relname::text AS referenced_table, \
					        ratt.attname::text AS referenced_column, \
					        con.confdeltype::text AS on_delete \
					 FROM pg_catalog.pg_constraint con \
					 JOIN pg_catalog.pg_class cls ON cls.oid = con.conrelid \
					 JOIN pg_catalog.pg_namespace ns ON ns.oid = cls.relnamespace \
					 JOIN pg_catalog.pg_class ref ON ref.oid = con.confrelid \
					 JOIN pg_catalog.pg_attribute att \
					   ON att.attrelid = con.conrelid AND att.attnum = con.conkey[1] \
					 JOIN pg_catalog.pg_attribute ratt \
					   ON ratt.attrelid = con.confrelid AND ratt.attnum = con.confkey[1] \
					 WHERE con.contype = 'f' AND cls.relname = $1 AND ns.nspname = current_schema() \
					 ORDER BY con.conname",
				)
				.bind(table)
				.fetch_all(&mut *conn)
				.await?;
				rows.iter()
					.map(|row| -> Result<ForeignKeyInfo> {
						let code: String = row.try_get("on_delete")?;
						Ok(ForeignKeyInfo {
							name: row.try_get("name")?,
							column: row.try_get("column_name")?,
							referenced_table: row.try_get("referenced_table")?,
							referenced_column: row.try_get("referenced_column")?,
							on_delete: parse_action(table, &code, ForeignKeyAction::from_pg_code)?,
						})
					})
					.collect()
			}
		}
	}

	/// Names of the explicit indexes on `table`
	pub async fn index_names(&self, conn: &mut AnyConnection, table: &str) -> Result<Vec<String>> {
		let sql = match self.database_type {
			DatabaseType::Sqlite => {
				"SELECT name FROM sqlite_master \
				 WHERE type = 'index' AND tbl_name = ? AND name NOT LIKE 'sqlite_%' ORDER BY name"
			}
			DatabaseType::Postgres => {
				"SELECT indexname::text AS name FROM pg_catalog.pg_indexes \
				 WHERE schemaname = current_schema() AND tablename = $1 ORDER BY indexname"
			}
		};
		let rows = sqlx::query(sql).bind(table).fetch_all(&mut *conn).await?;
		rows.iter()
			.map(|row| row.try_get::<String, _>("name").map_err(MigrationError::from))
			.collect()
	}
}

fn parse_action(
	table: &str,
	raw: &str,
	parse: impl Fn(&str) -> Option<ForeignKeyAction>,
) -> Result<ForeignKeyAction> {
	parse(raw).ok_or_else(|| {
		MigrationError::IntrospectionError(format!(
			"unknown delete action '{}' on a foreign key of {}",
			raw, table
		))
	})
}

/// Canonical spelling of a column type for comparison across dialects
///
/// # Examples
///
/// ```
/// use robosats_db::migrations::introspection::normalize_type;
///
/// assert_eq!(normalize_type("character varying(1200)"), normalize_type("varchar(1200)"));
/// assert_eq!(normalize_type("numeric(18,8)"), normalize_type("numeric(18, 8)"));
/// assert_eq!(normalize_type("BIGINT"), "bigint");
/// ```
pub fn normalize_type(data_type: &str) -> String {
	let compact: String = data_type
		.to_lowercase()
		.chars()
		.filter(|c| !c.is_whitespace())
		.collect();
	compact.replace("charactervarying", "varchar")
}

/// Whether a live column already has the given shape
///
/// Checks nullability and column type, then the foreign key on the column:
/// with an expected reference the column must point at that table (and
/// column, when reported) with that delete action; without one it must not
/// carry a foreign key at all.
pub fn column_matches(
	column: &ColumnInfo,
	foreign_keys: &[ForeignKeyInfo],
	null: bool,
	expected_type: &str,
	expected: Option<&ExpectedReference>,
) -> bool {
	if column.nullable != null {
		return false;
	}
	if normalize_type(&column.data_type) != normalize_type(expected_type) {
		return false;
	}

	let mut on_column = foreign_keys.iter().filter(|fk| fk.column == column.name);
	match expected {
		Some(reference) => on_column.any(|fk| {
			fk.referenced_table == reference.table
				&& fk
					.referenced_column
					.as_deref()
					.map(|name| name == reference.column)
					.unwrap_or(true)
				&& fk.on_delete == reference.action
		}),
		None => on_column.next().is_none(),
	}
}
