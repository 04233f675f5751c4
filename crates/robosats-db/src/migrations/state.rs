//! In-memory model state built by replaying migrations
//!
//! A [`ProjectState`] is what the models looked like after some prefix of the
//! migration history. Operations evolve it through `state_forwards`; schema
//! editors read it to resolve foreign key targets and column types.

use super::operations::FieldDefinition;
use super::{Migration, MigrationError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Snapshot of one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
	pub app_label: String,

	/// Model name as declared, e.g. `LNPayment`
	pub name: String,

	/// Fields in declaration order
	pub fields: IndexMap<String, FieldDefinition>,

	/// Explicit table name overriding `<app_label>_<model>`
	#[serde(default)]
	pub db_table: Option<String>,
}

impl ModelState {
	pub fn new(app_label: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			app_label: app_label.into(),
			name: name.into(),
			fields: IndexMap::new(),
			db_table: None,
		}
	}

	pub fn with_field(mut self, field: FieldDefinition) -> Self {
		self.add_field(field);
		self
	}

	pub fn with_db_table(mut self, db_table: impl Into<String>) -> Self {
		self.db_table = Some(db_table.into());
		self
	}

	/// Add or replace a field, keeping the position of a replaced one
	pub fn add_field(&mut self, field: FieldDefinition) {
		self.fields.insert(field.name.clone(), field);
	}

	pub fn remove_field(&mut self, name: &str) -> Option<FieldDefinition> {
		self.fields.shift_remove(name)
	}

	pub fn get_field(&self, name: &str) -> Option<&FieldDefinition> {
		self.fields.get(name)
	}

	pub fn name_lower(&self) -> String {
		self.name.to_lowercase()
	}

	/// Database table backing this model
	///
	/// # Examples
	///
	/// ```
	/// use robosats_db::migrations::ModelState;
	///
	/// assert_eq!(ModelState::new("api", "LNPayment").table_name(), "api_lnpayment");
	/// ```
	pub fn table_name(&self) -> String {
		match &self.db_table {
			Some(table) => table.clone(),
			None => format!("{}_{}", self.app_label, self.name_lower()),
		}
	}

	pub fn primary_key(&self) -> Option<&FieldDefinition> {
		self.fields.values().find(|field| field.primary_key)
	}

	pub fn foreign_keys(&self) -> impl Iterator<Item = &FieldDefinition> {
		self.fields.values().filter(|field| field.relation.is_some())
	}
}

/// All models of all apps at one point of the migration history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
	/// Keyed by `(app_label, lowercase model name)`
	pub models: BTreeMap<(String, String), ModelState>,
}

impl ProjectState {
	pub fn new() -> Self {
		Self::default()
	}

	/// Replay migrations in the given order
	pub fn from_migrations<'a>(migrations: impl IntoIterator<Item = &'a Migration>) -> Result<Self> {
		let mut state = Self::new();
		for migration in migrations {
			migration.apply_to_state(&mut state)?;
		}
		Ok(state)
	}

	pub fn add_model(&mut self, model: ModelState) {
		let key = (model.app_label.clone(), model.name_lower());
		self.models.insert(key, model);
	}

	pub fn remove_model(&mut self, app_label: &str, model_name: &str) -> Option<ModelState> {
		self.models
			.remove(&(app_label.to_string(), model_name.to_lowercase()))
	}

	pub fn get_model(&self, app_label: &str, model_name: &str) -> Option<&ModelState> {
		self.models
			.get(&(app_label.to_string(), model_name.to_lowercase()))
	}

	pub fn get_model_mut(&mut self, app_label: &str, model_name: &str) -> Option<&mut ModelState> {
		self.models
			.get_mut(&(app_label.to_string(), model_name.to_lowercase()))
	}

	/// Look up a model, failing when an earlier migration never created it
	pub fn require_model(&self, app_label: &str, model_name: &str) -> Result<&ModelState> {
		self.get_model(app_label, model_name).ok_or_else(|| {
			MigrationError::SchemaIntegrity(format!(
				"model {}.{} does not exist",
				app_label, model_name
			))
		})
	}

	pub fn models_for_app<'a>(&'a self, app_label: &'a str) -> impl Iterator<Item = &'a ModelState> {
		self.models
			.iter()
			.filter(move |((app, _), _)| app == app_label)
			.map(|(_, model)| model)
	}

	pub fn app_labels(&self) -> Vec<String> {
		let mut labels: Vec<String> = self.models.keys().map(|(app, _)| app.clone()).collect();
		labels.dedup();
		labels
	}

	/// Resolve an `"app_label.Model"` reference
	///
	/// # Examples
	///
	/// ```
	/// use robosats_db::migrations::{ModelState, ProjectState};
	///
	/// let mut state = ProjectState::new();
	/// state.add_model(ModelState::new("api", "Order"));
	///
	/// assert_eq!(state.resolve_relation("api.order").unwrap().table_name(), "api_order");
	/// assert!(state.resolve_relation("api.robot").is_err());
	/// ```
	pub fn resolve_relation(&self, to: &str) -> Result<&ModelState> {
		let (app_label, model_name) = split_relation(to)?;
		self.require_model(app_label, model_name)
	}

	/// Fields of other models holding a foreign key to `app_label.model_name`
	pub fn referencing_fields(
		&self,
		app_label: &str,
		model_name: &str,
	) -> Vec<(&ModelState, &FieldDefinition)> {
		let target = (app_label.to_string(), model_name.to_lowercase());
		self.models
			.values()
			.flat_map(|model| model.foreign_keys().map(move |field| (model, field)))
			.filter(|(_, field)| {
				field
					.related_model_key()
					.map(|key| key == target)
					.unwrap_or(false)
			})
			.collect()
	}
}

/// Split `"app_label.Model"` into its parts
pub(crate) fn split_relation(to: &str) -> Result<(&str, &str)> {
	match to.split_once('.') {
		Some((app_label, model_name)) if !app_label.is_empty() && !model_name.is_empty() => {
			Ok((app_label, model_name))
		}
		_ => Err(MigrationError::InvalidMigration(format!(
			"relation target '{}' must be written as 'app_label.ModelName'",
			to
		))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::migrations::{FieldType, OnDelete};
	use rstest::rstest;

	fn order() -> ModelState {
		ModelState::new("api", "Order")
			.with_field(FieldDefinition::new("id", FieldType::BigAutoField).primary_key())
			.with_field(FieldDefinition::new("status", FieldType::PositiveSmallInteger))
	}

	#[rstest]
	fn test_lookup_is_case_insensitive() {
		let mut state = ProjectState::new();
		state.add_model(order());

		assert!(state.get_model("api", "order").is_some());
		assert!(state.get_model("api", "ORDER").is_some());
		assert!(state.get_model("other", "Order").is_none());
	}

	#[rstest]
	fn test_replacing_field_keeps_position() {
		let mut model = order();
		model.add_field(FieldDefinition::new("status", FieldType::SmallInteger));

		let names: Vec<&str> = model.fields.keys().map(String::as_str).collect();
		assert_eq!(names, vec!["id", "status"]);
		assert_eq!(model.fields["status"].field_type, FieldType::SmallInteger);
	}

	#[rstest]
	fn test_referencing_fields() {
		let mut state = ProjectState::new();
		state.add_model(order());
		state.add_model(ModelState::new("api", "LNPayment").with_field(
			FieldDefinition::foreign_key("order_donated", "api.Order", OnDelete::SetNull).null(true),
		));

		let referencing = state.referencing_fields("api", "order");
		assert_eq!(referencing.len(), 1);
		assert_eq!(referencing[0].0.name, "LNPayment");
		assert_eq!(referencing[0].1.name, "order_donated");
	}

	#[rstest]
	#[case("order")]
	#[case("api.")]
	#[case(".order")]
	fn test_malformed_relation(#[case] to: &str) {
		assert!(matches!(
			split_relation(to),
			Err(MigrationError::InvalidMigration(_))
		));
	}
}
