//! Model operations and field definitions

use super::MigrationOperation;
use crate::backends::DatabaseType;
use crate::migrations::fields::{FieldType, OnDelete};
use crate::migrations::schema_editor::SchemaEditor;
use crate::migrations::state::{ModelState, ProjectState, split_relation};
use crate::migrations::{MigrationError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Target of a foreign key field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDefinition {
	/// Referenced model as `"app_label.Model"`
	pub to: String,
	pub on_delete: OnDelete,
	/// Reverse accessor name on the referenced model
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub related_name: Option<String>,
}

/// Field definition for model operations
///
/// `default` distinguishes "no default" (`None`) from an explicit
/// `default=None` (`Some(Value::Null)`).
///
/// # Example
///
/// ```rust
/// use robosats_db::migrations::{FieldDefinition, OnDelete};
///
/// let field = FieldDefinition::foreign_key("order_donated", "api.order", OnDelete::SetNull)
///     .null(true)
///     .blank(true)
///     .default(serde_json::Value::Null)
///     .related_name("order_donated");
///
/// assert_eq!(field.column(), "order_donated_id");
/// assert!(field.check().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
	pub name: String,
	pub field_type: FieldType,
	#[serde(default)]
	pub primary_key: bool,
	#[serde(default)]
	pub null: bool,
	#[serde(default)]
	pub blank: bool,
	#[serde(default)]
	pub unique: bool,
	#[serde(
		default,
		deserialize_with = "deserialize_explicit_default",
		skip_serializing_if = "Option::is_none"
	)]
	pub default: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub db_column: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub relation: Option<ForeignKeyDefinition>,
}

fn deserialize_explicit_default<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
	D: Deserializer<'de>,
{
	Value::deserialize(deserializer).map(Some)
}

impl FieldDefinition {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			primary_key: false,
			null: false,
			blank: false,
			unique: false,
			default: None,
			db_column: None,
			relation: None,
		}
	}

	/// Foreign key to `to` (`"app_label.Model"`)
	pub fn foreign_key(name: impl Into<String>, to: impl Into<String>, on_delete: OnDelete) -> Self {
		let mut field = Self::new(name, FieldType::ForeignKey);
		field.relation = Some(ForeignKeyDefinition {
			to: to.into(),
			on_delete,
			related_name: None,
		});
		field
	}

	pub fn primary_key(mut self) -> Self {
		self.primary_key = true;
		self
	}

	pub fn null(mut self, null: bool) -> Self {
		self.null = null;
		self
	}

	pub fn blank(mut self, blank: bool) -> Self {
		self.blank = blank;
		self
	}

	pub fn unique(mut self, unique: bool) -> Self {
		self.unique = unique;
		self
	}

	pub fn default(mut self, value: Value) -> Self {
		self.default = Some(value);
		self
	}

	pub fn db_column(mut self, column: impl Into<String>) -> Self {
		self.db_column = Some(column.into());
		self
	}

	/// Set the reverse accessor; ignored on non-relational fields
	pub fn related_name(mut self, related_name: impl Into<String>) -> Self {
		if let Some(relation) = self.relation.as_mut() {
			relation.related_name = Some(related_name.into());
		}
		self
	}

	/// Database column backing this field
	pub fn column(&self) -> String {
		match (&self.db_column, &self.relation) {
			(Some(column), _) => column.clone(),
			(None, Some(_)) => format!("{}_id", self.name),
			(None, None) => self.name.clone(),
		}
	}

	pub fn on_delete(&self) -> Option<OnDelete> {
		self.relation.as_ref().map(|relation| relation.on_delete)
	}

	/// `(app_label, lowercase model)` of the referenced model
	pub fn related_model_key(&self) -> Option<(String, String)> {
		let relation = self.relation.as_ref()?;
		let (app_label, model_name) = split_relation(&relation.to).ok()?;
		Some((app_label.to_string(), model_name.to_lowercase()))
	}

	/// SQL literal of the declared default, if it is not `None`
	pub fn default_sql(&self, db: DatabaseType) -> Option<String> {
		match &self.default {
			Some(Value::Null) | None => None,
			Some(value) => Some(sql_literal(value, db)),
		}
	}

	/// Validate the field definition
	///
	/// A foreign key deleting with `SET_NULL` must be nullable, and one
	/// deleting with `SET_DEFAULT` must declare a non-null default.
	///
	/// # Examples
	///
	/// ```
	/// use robosats_db::migrations::{FieldDefinition, OnDelete};
	///
	/// let field = FieldDefinition::foreign_key("order_donated", "api.order", OnDelete::SetNull);
	/// assert!(field.check().is_err());
	/// assert!(field.null(true).check().is_ok());
	/// ```
	pub fn check(&self) -> Result<()> {
		if self.name.is_empty() {
			return Err(MigrationError::InvalidMigration(
				"field name must not be empty".to_string(),
			));
		}

		match (&self.field_type, &self.relation) {
			(FieldType::ForeignKey, None) => {
				return Err(MigrationError::InvalidMigration(format!(
					"field '{}' is a foreign key without a target",
					self.name
				)));
			}
			(other, Some(_)) if !other.is_relation() => {
				return Err(MigrationError::InvalidMigration(format!(
					"field '{}' has a relation but type {:?}",
					self.name, other
				)));
			}
			_ => {}
		}

		if let FieldType::Char(0) = self.field_type {
			return Err(MigrationError::InvalidMigration(format!(
				"field '{}' needs a positive max_length",
				self.name
			)));
		}

		if self.primary_key && self.null {
			return Err(MigrationError::InvalidMigration(format!(
				"primary key '{}' cannot be null",
				self.name
			)));
		}

		if let Some(relation) = &self.relation {
			split_relation(&relation.to)?;
			match relation.on_delete {
				OnDelete::SetNull if !self.null => {
					return Err(MigrationError::InvalidMigration(format!(
						"field '{}' specifies on_delete=SET_NULL, but cannot be null",
						self.name
					)));
				}
				OnDelete::SetDefault if self.default_sql(DatabaseType::Sqlite).is_none() => {
					return Err(MigrationError::InvalidMigration(format!(
						"field '{}' specifies on_delete=SET_DEFAULT, but has no default value",
						self.name
					)));
				}
				_ => {}
			}
		}

		Ok(())
	}
}

/// Render a JSON value as a SQL literal
pub(crate) fn sql_literal(value: &Value, db: DatabaseType) -> String {
	match value {
		Value::Null => "NULL".to_string(),
		Value::Bool(flag) => match (db, flag) {
			(DatabaseType::Sqlite, true) => "1".to_string(),
			(DatabaseType::Sqlite, false) => "0".to_string(),
			(DatabaseType::Postgres, true) => "true".to_string(),
			(DatabaseType::Postgres, false) => "false".to_string(),
		},
		Value::Number(number) => number.to_string(),
		Value::String(text) => quote_string(text),
		other => quote_string(&other.to_string()),
	}
}

fn quote_string(text: &str) -> String {
	format!("'{}'", text.replace('\'', "''"))
}

/// Create a new model and its table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateModel {
	pub name: String,
	pub fields: Vec<FieldDefinition>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub db_table: Option<String>,
}

impl CreateModel {
	pub fn new(name: impl Into<String>, fields: Vec<FieldDefinition>) -> Self {
		Self {
			name: name.into(),
			fields,
			db_table: None,
		}
	}

	pub fn with_db_table(mut self, db_table: impl Into<String>) -> Self {
		self.db_table = Some(db_table.into());
		self
	}

	pub(crate) fn check(&self) -> Result<()> {
		let mut seen = HashSet::new();
		for field in &self.fields {
			if !seen.insert(field.name.as_str()) {
				return Err(MigrationError::InvalidMigration(format!(
					"model {} declares field '{}' twice",
					self.name, field.name
				)));
			}
		}
		if self.fields.iter().filter(|field| field.primary_key).count() != 1 {
			return Err(MigrationError::InvalidMigration(format!(
				"model {} must declare exactly one primary key",
				self.name
			)));
		}
		Ok(())
	}

	/// Apply to project state (forward)
	pub fn state_forwards(&self, app_label: &str, state: &mut ProjectState) -> Result<()> {
		if state.get_model(app_label, &self.name).is_some() {
			return Err(MigrationError::InvalidMigration(format!(
				"model {}.{} already exists",
				app_label, self.name
			)));
		}

		let mut model = ModelState::new(app_label, &self.name);
		model.db_table = self.db_table.clone();
		for field in &self.fields {
			model.add_field(field.clone());
		}
		state.add_model(model);
		Ok(())
	}

	pub fn database_forwards(
		&self,
		app_label: &str,
		editor: &dyn SchemaEditor,
		to_state: &ProjectState,
	) -> Result<Vec<String>> {
		let model = to_state.require_model(app_label, &self.name)?;
		editor.create_model(model, to_state)
	}

	pub fn database_backwards(
		&self,
		app_label: &str,
		editor: &dyn SchemaEditor,
		from_state: &ProjectState,
	) -> Result<Vec<String>> {
		let model = from_state.require_model(app_label, &self.name)?;
		editor.delete_model(model)
	}
}

/// Drop a model and its table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteModel {
	pub name: String,
}

impl DeleteModel {
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into() }
	}

	pub fn state_forwards(&self, app_label: &str, state: &mut ProjectState) -> Result<()> {
		state
			.remove_model(app_label, &self.name)
			.map(|_| ())
			.ok_or_else(|| {
				MigrationError::SchemaIntegrity(format!(
					"model {}.{} does not exist",
					app_label, self.name
				))
			})
	}

	pub fn database_forwards(
		&self,
		app_label: &str,
		editor: &dyn SchemaEditor,
		from_state: &ProjectState,
	) -> Result<Vec<String>> {
		let model = from_state.require_model(app_label, &self.name)?;
		editor.delete_model(model)
	}

	pub fn database_backwards(
		&self,
		app_label: &str,
		editor: &dyn SchemaEditor,
		to_state: &ProjectState,
	) -> Result<Vec<String>> {
		let model = to_state.require_model(app_label, &self.name)?;
		editor.create_model(model, to_state)
	}
}

impl MigrationOperation for CreateModel {
	fn migration_name_fragment(&self) -> Option<String> {
		Some(self.name.to_lowercase())
	}

	fn describe(&self) -> String {
		format!("Create model {}", self.name)
	}
}

impl MigrationOperation for DeleteModel {
	fn migration_name_fragment(&self) -> Option<String> {
		Some(format!("delete_{}", self.name.to_lowercase()))
	}

	fn describe(&self) -> String {
		format!("Delete model {}", self.name)
	}
}
