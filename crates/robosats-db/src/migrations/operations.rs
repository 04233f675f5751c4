//! Migration operations
//!
//! Every operation knows how to:
//!
//! - evolve a [`ProjectState`] (`state_forwards`)
//! - render the DDL taking the database from one state to the next
//!   (`database_forwards` / `database_backwards`), through a [`SchemaEditor`]
//!
//! Both directions receive `(from, to)` states: `from` describes the schema as
//! it is before the statements run, `to` as it should be afterwards.

pub mod fields;
pub mod models;

pub use fields::{AddField, AlterField, RemoveField};
pub use models::{CreateModel, DeleteModel, FieldDefinition, ForeignKeyDefinition};

use super::schema_editor::SchemaEditor;
use super::state::ProjectState;
use super::Result;
use serde::{Deserialize, Serialize};
use sqlx::AnyConnection;

/// Naming and description hooks shared by all operations
pub trait MigrationOperation {
	/// Fragment used by [`MigrationNamer`](super::MigrationNamer) to build a
	/// migration name, e.g. `alter_lnpayment_order_donated`
	fn migration_name_fragment(&self) -> Option<String>;

	/// Human-readable description shown by `sqlmigrate` and `migrate --plan`
	fn describe(&self) -> String;
}

/// A single schema change inside a migration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Operation {
	CreateModel(CreateModel),
	DeleteModel(DeleteModel),
	AddField(AddField),
	AlterField(AlterField),
	RemoveField(RemoveField),
}

impl Operation {
	/// Name of the model this operation touches
	pub fn model_name(&self) -> &str {
		match self {
			Operation::CreateModel(op) => &op.name,
			Operation::DeleteModel(op) => &op.name,
			Operation::AddField(op) => &op.model_name,
			Operation::AlterField(op) => &op.model_name,
			Operation::RemoveField(op) => &op.model_name,
		}
	}

	/// Field definitions introduced by this operation
	pub fn fields(&self) -> Vec<&FieldDefinition> {
		match self {
			Operation::CreateModel(op) => op.fields.iter().collect(),
			Operation::AddField(op) => vec![&op.field],
			Operation::AlterField(op) => vec![&op.field],
			Operation::DeleteModel(_) | Operation::RemoveField(_) => Vec::new(),
		}
	}

	/// Validate the field definitions carried by this operation
	pub fn check(&self) -> Result<()> {
		if let Operation::CreateModel(op) = self {
			op.check()?;
		}
		for field in self.fields() {
			field.check()?;
		}
		Ok(())
	}

	pub fn state_forwards(&self, app_label: &str, state: &mut ProjectState) -> Result<()> {
		match self {
			Operation::CreateModel(op) => op.state_forwards(app_label, state),
			Operation::DeleteModel(op) => op.state_forwards(app_label, state),
			Operation::AddField(op) => op.state_forwards(app_label, state),
			Operation::AlterField(op) => op.state_forwards(app_label, state),
			Operation::RemoveField(op) => op.state_forwards(app_label, state),
		}
	}

	pub fn database_forwards(
		&self,
		app_label: &str,
		editor: &dyn SchemaEditor,
		from_state: &ProjectState,
		to_state: &ProjectState,
	) -> Result<Vec<String>> {
		match self {
			Operation::CreateModel(op) => op.database_forwards(app_label, editor, to_state),
			Operation::DeleteModel(op) => op.database_forwards(app_label, editor, from_state),
			Operation::AddField(op) => op.database_forwards(app_label, editor, from_state, to_state),
			Operation::AlterField(op) => {
				op.database_forwards(app_label, editor, from_state, to_state)
			}
			Operation::RemoveField(op) => {
				op.database_forwards(app_label, editor, from_state, to_state)
			}
		}
	}

	/// Render the statements undoing this operation
	///
	/// `from_state` includes the operation, `to_state` does not.
	pub fn database_backwards(
		&self,
		app_label: &str,
		editor: &dyn SchemaEditor,
		from_state: &ProjectState,
		to_state: &ProjectState,
	) -> Result<Vec<String>> {
		match self {
			Operation::CreateModel(op) => op.database_backwards(app_label, editor, from_state),
			Operation::DeleteModel(op) => op.database_backwards(app_label, editor, to_state),
			Operation::AddField(op) => {
				op.database_backwards(app_label, editor, from_state, to_state)
			}
			Operation::AlterField(op) => {
				op.database_backwards(app_label, editor, from_state, to_state)
			}
			Operation::RemoveField(op) => {
				op.database_backwards(app_label, editor, from_state, to_state)
			}
		}
	}

	/// Whether the live database still needs this operation
	///
	/// Only `AlterField` inspects the database; every other operation always
	/// runs.
	pub async fn needs_apply(
		&self,
		app_label: &str,
		editor: &dyn SchemaEditor,
		conn: &mut AnyConnection,
		from_state: &ProjectState,
		to_state: &ProjectState,
	) -> Result<bool> {
		match self {
			Operation::AlterField(op) => {
				op.needs_apply(app_label, editor, conn, from_state, to_state)
					.await
			}
			_ => Ok(true),
		}
	}
}

impl MigrationOperation for Operation {
	fn migration_name_fragment(&self) -> Option<String> {
		match self {
			Operation::CreateModel(op) => op.migration_name_fragment(),
			Operation::DeleteModel(op) => op.migration_name_fragment(),
			Operation::AddField(op) => op.migration_name_fragment(),
			Operation::AlterField(op) => op.migration_name_fragment(),
			Operation::RemoveField(op) => op.migration_name_fragment(),
		}
	}

	fn describe(&self) -> String {
		match self {
			Operation::CreateModel(op) => op.describe(),
			Operation::DeleteModel(op) => op.describe(),
			Operation::AddField(op) => op.describe(),
			Operation::AlterField(op) => op.describe(),
			Operation::RemoveField(op) => op.describe(),
		}
	}
}
