//! # RoboSats Migrations
//!
//! Django-style schema migrations.
//!
//! ## Features
//!
//! - **Declarative operations**: `CreateModel`, `DeleteModel`, `AddField`,
//!   `AlterField` and `RemoveField`, each able to evolve a [`ProjectState`] and
//!   to emit dialect-specific DDL
//! - **Migration Graph**: dependencies form a DAG resolved by a deterministic
//!   topological sort
//! - **Ledger**: applied migrations are recorded in a table with a
//!   `UNIQUE (app, name)` constraint, inside the migration's own transaction
//! - **Idempotent AlterField**: the live column is introspected first and left
//!   untouched when it already matches
//! - **Auto-detection**: diff two project states into new migrations
//!
//! ## Writing a migration
//!
//! ```rust
//! use robosats_db::migrations::{AlterField, FieldDefinition, Migration, OnDelete, Operation};
//!
//! let migration = Migration::new("0038_alter_lnpayment_order_donated", "api")
//!     .add_dependency("api", "0037_lnpayment_order_donated_alter_lnpayment_concept_and_more")
//!     .add_operation(Operation::AlterField(AlterField::new(
//!         "lnpayment",
//!         FieldDefinition::foreign_key("order_donated", "api.order", OnDelete::SetNull)
//!             .null(true)
//!             .blank(true)
//!             .default(serde_json::Value::Null)
//!             .related_name("order_donated"),
//!     )));
//!
//! assert!(migration.validate().is_ok());
//! ```

pub mod autodetector;
pub mod executor;
pub mod fields;
pub mod graph;
pub mod introspection;
pub mod migration;
pub mod migration_namer;
pub mod operations;
pub mod plan;
pub mod recorder;
pub mod registry;
pub mod schema_editor;
pub mod state;

pub use autodetector::MigrationAutodetector;
pub use executor::{
	ExecutionResult, MigrationExecutor, MigrationStatus, MigrationTarget, OperationSql,
	sql_for_migration,
};
pub use fields::{FieldType, ForeignKeyAction, OnDelete};
pub use graph::{MigrationGraph, MigrationKey};
pub use introspection::{ColumnInfo, DatabaseIntrospector, ForeignKeyInfo};
pub use migration::Migration;
pub use migration_namer::MigrationNamer;
pub use operations::{
	AddField, AlterField, CreateModel, DeleteModel, FieldDefinition, ForeignKeyDefinition,
	MigrationOperation, Operation, RemoveField,
};
pub use plan::{Direction, MigrationPlan, PlanStep, TransactionMode};
pub use recorder::{DatabaseMigrationRecorder, MigrationRecord};
pub use registry::{LocalRegistry, MigrationRegistry};
pub use schema_editor::{PostgresSchemaEditor, SchemaEditor, SqliteSchemaEditor, editor_for};
pub use state::{ModelState, ProjectState};

use thiserror::Error;

/// Trait for types that provide migrations.
///
/// Migrations are collected at compile time: each app exposes one provider
/// listing its migration constructors.
///
/// # Example
///
/// ```rust,ignore
/// use robosats_db::migrations::{Migration, MigrationProvider};
///
/// pub mod _0037_lnpayment_order_donated_alter_lnpayment_concept_and_more;
/// pub mod _0038_alter_lnpayment_order_donated;
///
/// pub struct ApiMigrations;
///
/// impl MigrationProvider for ApiMigrations {
///     fn migrations() -> Vec<Migration> {
///         vec![
///             _0037_lnpayment_order_donated_alter_lnpayment_concept_and_more::migration(),
///             _0038_alter_lnpayment_order_donated::migration(),
///         ]
///     }
/// }
/// ```
pub trait MigrationProvider {
	/// Returns all migrations provided by this type.
	///
	/// Migrations should be returned in dependency order (base migrations first).
	fn migrations() -> Vec<Migration>;
}

#[derive(Debug, Error)]
pub enum MigrationError {
	#[error("Migration not found: {0}")]
	NotFound(String),

	#[error("Dependency error: {0}")]
	DependencyError(String),

	#[error("Inconsistent migration history: {0}")]
	InconsistentHistory(String),

	#[error("SQL error: {0}")]
	SqlError(#[from] sqlx::Error),

	#[error("Database error: {0}")]
	DatabaseError(#[from] crate::backends::DatabaseError),

	#[error("Invalid migration: {0}")]
	InvalidMigration(String),

	/// The database or project state lacks a table, column or model an
	/// operation relies on
	#[error("Schema integrity error: {0}")]
	SchemaIntegrity(String),

	#[error("Circular dependency detected: {cycle}")]
	CircularDependency { cycle: String },

	#[error("Node not found: {message} - {node}")]
	NodeNotFound { message: String, node: String },

	#[error("Duplicate migration: {0}")]
	DuplicateMigration(String),

	/// Foreign key integrity violation during table recreation
	///
	/// SQLite rebuilds tables with constraint enforcement suspended; rows left
	/// pointing at missing parents are reported here and the migration is
	/// rolled back.
	#[error("Foreign key violation: {0}")]
	ForeignKeyViolation(String),

	#[error("Introspection error: {0}")]
	IntrospectionError(String),

	#[error("Ledger error: {0}")]
	LedgerError(String),
}

pub type Result<T> = std::result::Result<T, MigrationError>;

// Prelude for migrations
pub mod prelude {
	pub use super::{
		AddField, AlterField, CreateModel, DeleteModel, FieldDefinition, FieldType, Migration,
		OnDelete, Operation, RemoveField,
	};
}
