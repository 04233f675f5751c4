//! Field operations for migrations
//!
//! Adding, removing and altering fields of an existing model, modelled on
//! Django's `django/db/migrations/operations/fields.py`.
//!
//! # Example
//!
//! ```rust
//! use robosats_db::migrations::{
//!     AddField, AlterField, CreateModel, FieldDefinition, FieldType, OnDelete, ProjectState,
//! };
//!
//! let mut state = ProjectState::new();
//! CreateModel::new(
//!     "Order",
//!     vec![FieldDefinition::new("id", FieldType::BigAutoField).primary_key()],
//! )
//! .state_forwards("api", &mut state)
//! .unwrap();
//! CreateModel::new(
//!     "LNPayment",
//!     vec![FieldDefinition::new("id", FieldType::Uuid).primary_key()],
//! )
//! .state_forwards("api", &mut state)
//! .unwrap();
//!
//! AddField::new(
//!     "lnpayment",
//!     FieldDefinition::foreign_key("order_donated", "api.order", OnDelete::Cascade),
//! )
//! .state_forwards("api", &mut state)
//! .unwrap();
//!
//! AlterField::new(
//!     "lnpayment",
//!     FieldDefinition::foreign_key("order_donated", "api.order", OnDelete::SetNull).null(true),
//! )
//! .state_forwards("api", &mut state)
//! .unwrap();
//!
//! let field = state.get_model("api", "lnpayment").unwrap().get_field("order_donated").unwrap();
//! assert!(field.null);
//! ```

use super::MigrationOperation;
use super::models::FieldDefinition;
use crate::migrations::introspection::{self, DatabaseIntrospector, ExpectedReference};
use crate::migrations::schema_editor::SchemaEditor;
use crate::migrations::state::{ModelState, ProjectState};
use crate::migrations::{MigrationError, Result};
use serde::{Deserialize, Serialize};
use sqlx::AnyConnection;
use tracing::debug;

fn require_field<'a>(model: &'a ModelState, name: &str) -> Result<&'a FieldDefinition> {
	model.get_field(name).ok_or_else(|| {
		MigrationError::SchemaIntegrity(format!(
			"field {}.{}.{} does not exist",
			model.app_label, model.name, name
		))
	})
}

fn default_true() -> bool {
	true
}

/// Add a field to an existing model
///
/// With `preserve_default` off, the field's default only fills the rows that
/// exist when the column is added; the model state keeps no default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddField {
	pub model_name: String,
	pub field: FieldDefinition,
	#[serde(default = "default_true")]
	pub preserve_default: bool,
}

impl AddField {
	pub fn new(model_name: impl Into<String>, field: FieldDefinition) -> Self {
		Self {
			model_name: model_name.into(),
			field,
			preserve_default: true,
		}
	}

	pub fn preserve_default(mut self, preserve_default: bool) -> Self {
		self.preserve_default = preserve_default;
		self
	}

	/// Field as recorded in the project state
	fn state_field(&self) -> FieldDefinition {
		let mut field = self.field.clone();
		if !self.preserve_default {
			field.default = None;
		}
		field
	}

	pub fn state_forwards(&self, app_label: &str, state: &mut ProjectState) -> Result<()> {
		let model = state.get_model_mut(app_label, &self.model_name).ok_or_else(|| {
			MigrationError::SchemaIntegrity(format!(
				"model {}.{} does not exist",
				app_label, self.model_name
			))
		})?;
		if model.get_field(&self.field.name).is_some() {
			return Err(MigrationError::InvalidMigration(format!(
				"field {}.{}.{} already exists",
				app_label, self.model_name, self.field.name
			)));
		}
		model.add_field(self.state_field());
		Ok(())
	}

	pub fn database_forwards(
		&self,
		app_label: &str,
		editor: &dyn SchemaEditor,
		from_state: &ProjectState,
		to_state: &ProjectState,
	) -> Result<Vec<String>> {
		let from_model = from_state.require_model(app_label, &self.model_name)?;
		let to_model = to_state.require_model(app_label, &self.model_name)?;
		let field = require_field(to_model, &self.field.name)?;
		if self.preserve_default {
			return editor.add_field(from_model, to_model, field, to_state);
		}

		// Existing rows are filled from the one-off default
		let mut filled_field = field.clone();
		filled_field.default = self.field.default.clone();
		let mut filled_model = to_model.clone();
		filled_model.add_field(filled_field.clone());
		editor.add_field(from_model, &filled_model, &filled_field, to_state)
	}

	pub fn database_backwards(
		&self,
		app_label: &str,
		editor: &dyn SchemaEditor,
		from_state: &ProjectState,
		to_state: &ProjectState,
	) -> Result<Vec<String>> {
		let from_model = from_state.require_model(app_label, &self.model_name)?;
		let to_model = to_state.require_model(app_label, &self.model_name)?;
		let field = require_field(from_model, &self.field.name)?;
		editor.remove_field(from_model, to_model, field, to_state)
	}
}

/// Remove a field from a model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveField {
	pub model_name: String,
	pub name: String,
}

impl RemoveField {
	pub fn new(model_name: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			model_name: model_name.into(),
			name: name.into(),
		}
	}

	pub fn state_forwards(&self, app_label: &str, state: &mut ProjectState) -> Result<()> {
		let model = state.get_model_mut(app_label, &self.model_name).ok_or_else(|| {
			MigrationError::SchemaIntegrity(format!(
				"model {}.{} does not exist",
				app_label, self.model_name
			))
		})?;
		model.remove_field(&self.name).map(|_| ()).ok_or_else(|| {
			MigrationError::SchemaIntegrity(format!(
				"field {}.{}.{} does not exist",
				app_label, self.model_name, self.name
			))
		})
	}

	pub fn database_forwards(
		&self,
		app_label: &str,
		editor: &dyn SchemaEditor,
		from_state: &ProjectState,
		to_state: &ProjectState,
	) -> Result<Vec<String>> {
		let from_model = from_state.require_model(app_label, &self.model_name)?;
		let to_model = to_state.require_model(app_label, &self.model_name)?;
		let field = require_field(from_model, &self.name)?;
		editor.remove_field(from_model, to_model, field, to_state)
	}

	pub fn database_backwards(
		&self,
		app_label: &str,
		editor: &dyn SchemaEditor,
		from_state: &ProjectState,
		to_state: &ProjectState,
	) -> Result<Vec<String>> {
		let from_model = from_state.require_model(app_label, &self.model_name)?;
		let to_model = to_state.require_model(app_label, &self.model_name)?;
		let field = require_field(to_model, &self.name)?;
		editor.add_field(from_model, to_model, field, to_state)
	}
}

/// Alter the definition of an existing field
///
/// Before touching the table the live column is introspected. When it
/// already has the target nullability, type and foreign key the operation
/// emits nothing, so re-running it against a migrated database is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlterField {
	pub model_name: String,
	pub field: FieldDefinition,
}

impl AlterField {
	pub fn new(model_name: impl Into<String>, field: FieldDefinition) -> Self {
		Self {
			model_name: model_name.into(),
			field,
		}
	}

	pub fn name(&self) -> &str {
		&self.field.name
	}

	pub fn state_forwards(&self, app_label: &str, state: &mut ProjectState) -> Result<()> {
		let model = state.get_model_mut(app_label, &self.model_name).ok_or_else(|| {
			MigrationError::SchemaIntegrity(format!(
				"model {}.{} does not exist",
				app_label, self.model_name
			))
		})?;
		if model.get_field(&self.field.name).is_none() {
			return Err(MigrationError::SchemaIntegrity(format!(
				"field {}.{}.{} does not exist",
				app_label, self.model_name, self.field.name
			)));
		}
		model.add_field(self.field.clone());
		Ok(())
	}

	pub fn database_forwards(
		&self,
		app_label: &str,
		editor: &dyn SchemaEditor,
		from_state: &ProjectState,
		to_state: &ProjectState,
	) -> Result<Vec<String>> {
		let from_model = from_state.require_model(app_label, &self.model_name)?;
		let to_model = to_state.require_model(app_label, &self.model_name)?;
		let old_field = require_field(from_model, self.name())?;
		let new_field = require_field(to_model, self.name())?;
		editor.alter_field(from_model, to_model, old_field, new_field, to_state)
	}

	pub fn database_backwards(
		&self,
		app_label: &str,
		editor: &dyn SchemaEditor,
		from_state: &ProjectState,
		to_state: &ProjectState,
	) -> Result<Vec<String>> {
		// Altering back is the same alteration with the states swapped by the caller.
		self.database_forwards(app_label, editor, from_state, to_state)
	}

	/// Compare the live column against the field in `to_state`
	///
	/// Fails with [`MigrationError::SchemaIntegrity`] when the table, the
	/// column or the referenced table is missing.
	pub async fn needs_apply(
		&self,
		app_label: &str,
		editor: &dyn SchemaEditor,
		conn: &mut AnyConnection,
		from_state: &ProjectState,
		to_state: &ProjectState,
	) -> Result<bool> {
		let introspector = DatabaseIntrospector::new(editor.database_type());
		let from_model = from_state.require_model(app_label, &self.model_name)?;
		let to_model = to_state.require_model(app_label, &self.model_name)?;
		let old_field = require_field(from_model, self.name())?;
		let target = require_field(to_model, self.name())?;

		let table = from_model.table_name();
		if !introspector.table_exists(conn, &table).await? {
			return Err(MigrationError::SchemaIntegrity(format!(
				"table {} does not exist",
				table
			)));
		}

		let expected = match &target.relation {
			Some(relation) => {
				let referenced = to_state.resolve_relation(&relation.to)?;
				let referenced_table = referenced.table_name();
				if !introspector.table_exists(conn, &referenced_table).await? {
					return Err(MigrationError::SchemaIntegrity(format!(
						"table {} referenced by {}.{} does not exist",
						referenced_table, table, target.name
					)));
				}
				let primary_key = referenced.primary_key().ok_or_else(|| {
					MigrationError::SchemaIntegrity(format!(
						"model {}.{} has no primary key",
						referenced.app_label, referenced.name
					))
				})?;
				Some(ExpectedReference {
					table: referenced_table,
					column: primary_key.column(),
					action: relation.on_delete.foreign_key_action(),
				})
			}
			None => None,
		};

		let columns = introspector.columns(conn, &table).await?;
		let target_column = target.column();
		let live = match columns.iter().find(|column| column.name == target_column) {
			Some(column) => column,
			None => {
				let old_column = old_field.column();
				if !columns.iter().any(|column| column.name == old_column) {
					return Err(MigrationError::SchemaIntegrity(format!(
						"column {}.{} does not exist",
						table, old_column
					)));
				}
				return Ok(true);
			}
		};

		let foreign_keys = introspector.foreign_keys(conn, &table).await?;
		let expected_type = editor.column_type(target, to_state)?;
		let matches = introspection::column_matches(
			live,
			&foreign_keys,
			target.null,
			&expected_type,
			expected.as_ref(),
		);
		if matches {
			debug!(
				table = %table,
				column = %target_column,
				"Column already matches, skipping AlterField"
			);
		}
		Ok(!matches)
	}
}

impl MigrationOperation for AddField {
	fn migration_name_fragment(&self) -> Option<String> {
		Some(format!(
			"{}_{}",
			self.model_name.to_lowercase(),
			self.field.name.to_lowercase()
		))
	}

	fn describe(&self) -> String {
		format!("Add field {} to {}", self.field.name, self.model_name)
	}
}

impl MigrationOperation for RemoveField {
	fn migration_name_fragment(&self) -> Option<String> {
		Some(format!(
			"remove_{}_{}",
			self.model_name.to_lowercase(),
			self.name.to_lowercase()
		))
	}

	fn describe(&self) -> String {
		format!("Remove field {} from {}", self.name, self.model_name)
	}
}

impl MigrationOperation for AlterField {
	fn migration_name_fragment(&self) -> Option<String> {
		Some(format!(
			"alter_{}_{}",
			self.model_name.to_lowercase(),
			self.field.name.to_lowercase()
		))
	}

	fn describe(&self) -> String {
		format!("Alter field {} on {}", self.field.name, self.model_name)
	}
}
