//! Migration definition

use super::graph::MigrationKey;
use super::state::ProjectState;
use super::{MigrationError, Operation, Result};
use serde::{Deserialize, Serialize};

/// A database migration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Migration {
	/// Migration name (e.g., "0038_alter_lnpayment_order_donated")
	pub name: String,

	/// App label
	pub app_label: String,

	/// Operations to apply, in order
	pub operations: Vec<Operation>,

	/// Dependencies (app_label, migration_name)
	pub dependencies: Vec<(String, String)>,

	/// Whether this is wrapped in a transaction
	pub atomic: bool,

	/// Whether this is an initial migration (explicit or inferred from dependencies)
	/// - `Some(true)`: Explicitly marked as initial
	/// - `Some(false)`: Explicitly marked as non-initial
	/// - `None`: Auto-infer from `dependencies.is_empty()`
	#[serde(default)]
	pub initial: Option<bool>,
}

impl Migration {
	/// Create a new migration
	///
	/// # Examples
	///
	/// ```rust
	/// use robosats_db::migrations::Migration;
	///
	/// let migration = Migration::new("0038_alter_lnpayment_order_donated", "api");
	/// assert_eq!(migration.app_label, "api");
	/// assert!(migration.atomic);
	/// ```
	pub fn new(name: impl Into<String>, app_label: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			app_label: app_label.into(),
			operations: Vec::new(),
			dependencies: Vec::new(),
			atomic: true,
			initial: None,
		}
	}

	/// Add an operation to this migration
	pub fn add_operation(mut self, operation: Operation) -> Self {
		self.operations.push(operation);
		self
	}

	/// Add a dependency to this migration
	///
	/// # Examples
	///
	/// ```rust
	/// use robosats_db::migrations::Migration;
	///
	/// let migration = Migration::new("0038_alter_lnpayment_order_donated", "api")
	///     .add_dependency("api", "0037_lnpayment_order_donated_alter_lnpayment_concept_and_more");
	///
	/// assert_eq!(migration.dependencies.len(), 1);
	/// assert!(!migration.is_initial());
	/// ```
	pub fn add_dependency(mut self, app_label: impl Into<String>, name: impl Into<String>) -> Self {
		self.dependencies.push((app_label.into(), name.into()));
		self
	}

	/// Set whether this migration should run in a transaction
	pub fn atomic(mut self, atomic: bool) -> Self {
		self.atomic = atomic;
		self
	}

	/// Set initial attribute explicitly
	pub fn initial(mut self, initial: bool) -> Self {
		self.initial = Some(initial);
		self
	}

	/// Check if this is an initial migration
	///
	/// Returns `true` if `initial` is `Some(true)`, or if it is unset and the
	/// migration has no dependencies.
	pub fn is_initial(&self) -> bool {
		match self.initial {
			Some(initial) => initial,
			None => self.dependencies.is_empty(),
		}
	}

	pub fn key(&self) -> MigrationKey {
		MigrationKey::new(&self.app_label, &self.name)
	}

	/// Get full migration identifier, e.g. `api.0038_alter_lnpayment_order_donated`
	pub fn id(&self) -> String {
		format!("{}.{}", self.app_label, self.name)
	}

	pub fn dependency_keys(&self) -> impl Iterator<Item = MigrationKey> + '_ {
		self.dependencies
			.iter()
			.map(|(app_label, name)| MigrationKey::new(app_label, name))
	}

	/// Structural checks run before anything touches the database
	pub fn validate(&self) -> Result<()> {
		if self.name.trim().is_empty() {
			return Err(MigrationError::InvalidMigration(format!(
				"migration in app '{}' has an empty name",
				self.app_label
			)));
		}
		if self.app_label.trim().is_empty() {
			return Err(MigrationError::InvalidMigration(format!(
				"migration '{}' has an empty app label",
				self.name
			)));
		}
		if self
			.dependencies
			.iter()
			.any(|(app_label, name)| *app_label == self.app_label && *name == self.name)
		{
			return Err(MigrationError::InvalidMigration(format!(
				"{} depends on itself",
				self.id()
			)));
		}
		for operation in &self.operations {
			operation.check().map_err(|error| match error {
				MigrationError::InvalidMigration(message) => {
					MigrationError::InvalidMigration(format!("{}: {}", self.id(), message))
				}
				other => other,
			})?;
		}
		Ok(())
	}

	/// Replay every operation onto `state`
	pub fn apply_to_state(&self, state: &mut ProjectState) -> Result<()> {
		for operation in &self.operations {
			operation.state_forwards(&self.app_label, state)?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::migrations::{AlterField, CreateModel, FieldDefinition, FieldType, OnDelete};
	use rstest::rstest;

	fn create_order() -> Migration {
		Migration::new("0001_initial", "api").add_operation(Operation::CreateModel(
			CreateModel::new(
				"Order",
				vec![FieldDefinition::new("id", FieldType::BigAutoField).primary_key()],
			),
		))
	}

	#[rstest]
	#[case(None, vec![], true)]
	#[case(None, vec![("api", "0001_initial")], false)]
	#[case(Some(true), vec![("api", "0001_initial")], true)]
	#[case(Some(false), vec![], false)]
	fn test_is_initial(
		#[case] initial: Option<bool>,
		#[case] dependencies: Vec<(&str, &str)>,
		#[case] expected: bool,
	) {
		let mut migration = Migration::new("0002_x", "api");
		migration.initial = initial;
		for (app_label, name) in dependencies {
			migration = migration.add_dependency(app_label, name);
		}
		assert_eq!(migration.is_initial(), expected);
	}

	#[rstest]
	fn test_id_and_key() {
		let migration = create_order();
		assert_eq!(migration.id(), "api.0001_initial");
		assert_eq!(migration.key().to_string(), "api.0001_initial");
	}

	#[rstest]
	fn test_self_dependency_is_rejected() {
		let migration = create_order().add_dependency("api", "0001_initial");
		assert!(matches!(
			migration.validate(),
			Err(MigrationError::InvalidMigration(message)) if message.contains("depends on itself")
		));
	}

	#[rstest]
	fn test_validate_reports_bad_field() {
		let migration = Migration::new("0002_bad", "api").add_operation(Operation::AlterField(
			AlterField::new(
				"lnpayment",
				FieldDefinition::foreign_key("order_donated", "api.order", OnDelete::SetNull),
			),
		));
		assert!(matches!(
			migration.validate(),
			Err(MigrationError::InvalidMigration(message)) if message.starts_with("api.0002_bad")
		));
	}

	#[rstest]
	fn test_apply_to_state() {
		let mut state = ProjectState::new();
		create_order().apply_to_state(&mut state).unwrap();
		assert!(state.get_model("api", "order").is_some());
	}
}
