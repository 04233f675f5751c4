//! Migration recorder
//!
//! The ledger is a table with one row per applied migration and a
//! `UNIQUE (app, name)` constraint. Every method takes the connection it runs
//! on, so the executor can record a migration inside the transaction that
//! applied it.

use super::graph::MigrationKey;
use super::{MigrationError, Result};
use crate::backends::DatabaseType;
use crate::migrations::schema_editor::quote_identifier;
use chrono::{DateTime, Utc};
use sea_query::{
	Alias, Expr, ExprTrait, Func, OnConflict, Order, PostgresQueryBuilder, Query,
	QueryStatementWriter, SqliteQueryBuilder,
};
use sqlx::{AnyConnection, Row};
use std::collections::BTreeSet;

/// Migration record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
	pub app: String,
	pub name: String,
	pub applied: DateTime<Utc>,
}

impl MigrationRecord {
	pub fn key(&self) -> MigrationKey {
		MigrationKey::new(&self.app, &self.name)
	}
}

/// Database-backed migration recorder
#[derive(Debug, Clone)]
pub struct DatabaseMigrationRecorder {
	table: String,
	database_type: DatabaseType,
}

impl DatabaseMigrationRecorder {
	/// Create a recorder writing to `table`
	///
	/// # Examples
	///
	/// ```rust
	/// use robosats_db::DatabaseType;
	/// use robosats_db::migrations::DatabaseMigrationRecorder;
	///
	/// assert!(DatabaseMigrationRecorder::new("robosats_migrations", DatabaseType::Sqlite).is_ok());
	/// assert!(DatabaseMigrationRecorder::new("bad name", DatabaseType::Sqlite).is_err());
	/// ```
	pub fn new(table: impl Into<String>, database_type: DatabaseType) -> Result<Self> {
		let table = table.into();
		if !robosats_conf::is_valid_identifier(&table) {
			return Err(MigrationError::LedgerError(format!(
				"'{}' is not a valid ledger table name",
				table
			)));
		}
		Ok(Self {
			table,
			database_type,
		})
	}

	pub fn table(&self) -> &str {
		&self.table
	}

	pub async fn has_table(&self, conn: &mut AnyConnection) -> Result<bool> {
		let sql = match self.database_type {
			DatabaseType::Sqlite => {
				"SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = ?"
			}
			DatabaseType::Postgres => {
				"SELECT COUNT(*) AS n FROM pg_catalog.pg_tables \
				 WHERE schemaname = current_schema() AND tablename = $1"
			}
		};
		let row = sqlx::query(sql)
			.bind(&self.table)
			.fetch_one(&mut *conn)
			.await?;
		Ok(row.try_get::<i64, _>("n")? > 0)
	}

	pub async fn ensure_schema_table(&self, conn: &mut AnyConnection) -> Result<()> {
		let table = quote_identifier(&self.table);
		let id_column = match self.database_type {
			DatabaseType::Sqlite => "\"id\" integer NOT NULL PRIMARY KEY AUTOINCREMENT",
			DatabaseType::Postgres => {
				"\"id\" bigint NOT NULL PRIMARY KEY GENERATED BY DEFAULT AS IDENTITY"
			}
		};
		let sql = format!(
			"CREATE TABLE IF NOT EXISTS {} ({}, \"app\" varchar(255) NOT NULL, \
			 \"name\" varchar(255) NOT NULL, \"applied\" varchar(64) NOT NULL, \
			 CONSTRAINT {} UNIQUE (\"app\", \"name\"))",
			table,
			id_column,
			quote_identifier(&format!("{}_app_name_key", self.table))
		);
		sqlx::query(&sql).execute(&mut *conn).await?;
		Ok(())
	}

	/// Render a ledger statement for the connected dialect
	fn build_sql<T>(&self, statement: T) -> String
	where
		T: QueryStatementWriter,
	{
		match self.database_type {
			DatabaseType::Postgres => statement.to_string(PostgresQueryBuilder),
			DatabaseType::Sqlite => statement.to_string(SqliteQueryBuilder),
		}
	}

	/// Applied migrations in the order they were recorded
	pub async fn applied_migrations(&self, conn: &mut AnyConnection) -> Result<Vec<MigrationRecord>> {
		let stmt = Query::select()
			.columns([Alias::new("app"), Alias::new("name"), Alias::new("applied")])
			.from(Alias::new(self.table.clone()))
			.order_by(Alias::new("id"), Order::Asc)
			.to_owned();
		let sql = self.build_sql(stmt);

		let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;
		rows.iter()
			.map(|row| -> Result<MigrationRecord> {
				let applied: String = row.try_get("applied")?;
				let applied = DateTime::parse_from_rfc3339(&applied)
					.map_err(|error| {
						MigrationError::LedgerError(format!(
							"unreadable timestamp '{}': {}",
							applied, error
						))
					})?
					.with_timezone(&Utc);
				Ok(MigrationRecord {
					app: row.try_get("app")?,
					name: row.try_get("name")?,
					applied,
				})
			})
			.collect()
	}

	/// Applied migration keys; empty when the ledger does not exist yet
	pub async fn applied_set(&self, conn: &mut AnyConnection) -> Result<BTreeSet<MigrationKey>> {
		if !self.has_table(&mut *conn).await? {
			return Ok(BTreeSet::new());
		}
		Ok(self
			.applied_migrations(&mut *conn)
			.await?
			.iter()
			.map(MigrationRecord::key)
			.collect())
	}

	pub async fn is_applied(&self, conn: &mut AnyConnection, app: &str, name: &str) -> Result<bool> {
		let stmt = Query::select()
			.expr_as(Func::count(Expr::col(Alias::new("id"))), Alias::new("n"))
			.from(Alias::new(self.table.clone()))
			.and_where(Expr::col(Alias::new("app")).eq(app))
			.and_where(Expr::col(Alias::new("name")).eq(name))
			.to_owned();
		let sql = self.build_sql(stmt);

		let row = sqlx::query(&sql).fetch_one(&mut *conn).await?;
		Ok(row.try_get::<i64, _>("n")? > 0)
	}

	/// Insert a ledger row; recording an already recorded migration is a no-op
	pub async fn record_applied(&self, conn: &mut AnyConnection, app: &str, name: &str) -> Result<()> {
		let now = Utc::now().to_rfc3339();
		let stmt = Query::insert()
			.into_table(Alias::new(self.table.clone()))
			.columns([Alias::new("app"), Alias::new("name"), Alias::new("applied")])
			.values_panic([app.into(), name.into(), now.into()])
			.on_conflict(
				OnConflict::columns([Alias::new("app"), Alias::new("name")])
					.do_nothing()
					.to_owned(),
			)
			.to_owned();
		let sql = self.build_sql(stmt);

		sqlx::query(&sql).execute(&mut *conn).await?;
		Ok(())
	}

	pub async fn record_unapplied(&self, conn: &mut AnyConnection, app: &str, name: &str) -> Result<()> {
		let stmt = Query::delete()
			.from_table(Alias::new(self.table.clone()))
			.and_where(Expr::col(Alias::new("app")).eq(app))
			.and_where(Expr::col(Alias::new("name")).eq(name))
			.to_owned();
		let sql = self.build_sql(stmt);

		sqlx::query(&sql).execute(&mut *conn).await?;
		Ok(())
	}

	/// Take the session-level migration lock
	///
	/// PostgreSQL uses an advisory lock keyed on the ledger table name. SQLite
	/// serializes writers itself.
	pub async fn acquire_lock(&self, conn: &mut AnyConnection) -> Result<()> {
		if self.database_type == DatabaseType::Postgres {
			sqlx::query("SELECT 1 AS locked FROM pg_advisory_lock(hashtext($1))")
				.bind(&self.table)
				.execute(&mut *conn)
				.await?;
		}
		Ok(())
	}

	pub async fn release_lock(&self, conn: &mut AnyConnection) -> Result<()> {
		if self.database_type == DatabaseType::Postgres {
			sqlx::query("SELECT pg_advisory_unlock(hashtext($1)) AS unlocked")
				.bind(&self.table)
				.execute(&mut *conn)
				.await?;
		}
		Ok(())
	}
}
