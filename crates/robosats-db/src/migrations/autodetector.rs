//! Change detection between two project states
//!
//! [`MigrationAutodetector`] compares the state produced by the loaded
//! migrations with the state the models currently declare and emits the
//! operations bridging them. [`MigrationAutodetector::arrange_for_graph`]
//! then numbers and names one migration per app and wires its dependencies.

use super::graph::MigrationGraph;
use super::migration_namer::MigrationNamer;
use super::operations::{AddField, AlterField, CreateModel, DeleteModel, RemoveField};
use super::state::ProjectState;
use super::{Migration, Operation};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

type ModelKey = (String, String);
type FieldKey = (String, String, String);

/// Detected changes between two project states
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectedChanges {
	/// Models that were created: (app_label, model_name)
	pub created_models: Vec<ModelKey>,
	/// Models that were deleted: (app_label, model_name)
	pub deleted_models: Vec<ModelKey>,
	/// Fields that were added: (app_label, model_name, field_name)
	pub added_fields: Vec<FieldKey>,
	/// Fields that were removed: (app_label, model_name, field_name)
	pub removed_fields: Vec<FieldKey>,
	/// Fields whose definition changed: (app_label, model_name, field_name)
	pub altered_fields: Vec<FieldKey>,
}

impl DetectedChanges {
	pub fn is_empty(&self) -> bool {
		self.created_models.is_empty()
			&& self.deleted_models.is_empty()
			&& self.added_fields.is_empty()
			&& self.removed_fields.is_empty()
			&& self.altered_fields.is_empty()
	}
}

/// Migration autodetector
///
/// # Examples
///
/// ```rust
/// use robosats_db::migrations::{
///     FieldDefinition, FieldType, MigrationAutodetector, ModelState, ProjectState,
/// };
///
/// let from_state = ProjectState::new();
/// let mut to_state = ProjectState::new();
/// to_state.add_model(
///     ModelState::new("api", "Order")
///         .with_field(FieldDefinition::new("id", FieldType::BigAutoField).primary_key()),
/// );
///
/// let changes = MigrationAutodetector::new(from_state, to_state).detect_changes();
/// assert_eq!(changes.created_models, vec![("api".to_string(), "order".to_string())]);
/// ```
pub struct MigrationAutodetector {
	from_state: ProjectState,
	to_state: ProjectState,
}

impl MigrationAutodetector {
	pub fn new(from_state: ProjectState, to_state: ProjectState) -> Self {
		Self {
			from_state,
			to_state,
		}
	}

	pub fn detect_changes(&self) -> DetectedChanges {
		let from_models: BTreeSet<&ModelKey> = self.from_state.models.keys().collect();
		let to_models: BTreeSet<&ModelKey> = self.to_state.models.keys().collect();

		let mut changes = DetectedChanges {
			created_models: to_models.difference(&from_models).map(|key| (*key).clone()).collect(),
			deleted_models: from_models.difference(&to_models).map(|key| (*key).clone()).collect(),
			..Default::default()
		};

		for key in from_models.intersection(&to_models) {
			let (Some(old_model), Some(new_model)) =
				(self.from_state.models.get(*key), self.to_state.models.get(*key))
			else {
				continue;
			};
			let (app_label, model_name) = (*key).clone();

			for (name, new_field) in &new_model.fields {
				let field_key = (app_label.clone(), model_name.clone(), name.clone());
				match old_model.fields.get(name) {
					None => changes.added_fields.push(field_key),
					Some(old_field) if old_field != new_field => {
						changes.altered_fields.push(field_key)
					}
					Some(_) => {}
				}
			}
			for name in old_model.fields.keys() {
				if !new_model.fields.contains_key(name) {
					changes
						.removed_fields
						.push((app_label.clone(), model_name.clone(), name.clone()));
				}
			}
		}

		changes.created_models = self.order_created_models(&changes.created_models);
		changes.deleted_models.sort();
		changes.added_fields.sort();
		changes.removed_fields.sort();
		changes.altered_fields.sort();
		changes
	}

	/// Referenced models first, ties broken by key
	fn order_created_models(&self, created: &[ModelKey]) -> Vec<ModelKey> {
		let pending: BTreeSet<&ModelKey> = created.iter().collect();
		let mut dependencies: BTreeMap<&ModelKey, BTreeSet<ModelKey>> = BTreeMap::new();
		for key in &pending {
			let Some(model) = self.to_state.models.get(*key) else {
				continue;
			};
			let targets = model
				.foreign_keys()
				.filter_map(|field| field.related_model_key())
				.filter(|target| target != *key && pending.contains(target))
				.collect();
			dependencies.insert(*key, targets);
		}

		let mut ordered: Vec<ModelKey> = Vec::with_capacity(created.len());
		let mut done: BTreeSet<ModelKey> = BTreeSet::new();
		while ordered.len() < pending.len() {
			let next = pending.iter().find(|key| {
				!done.contains(**key)
					&& dependencies
						.get(**key)
						.is_none_or(|deps| deps.iter().all(|dep| done.contains(dep)))
			});
			match next {
				Some(key) => {
					done.insert((*key).clone());
					ordered.push((*key).clone());
				}
				None => {
					let remaining: Vec<String> = pending
						.iter()
						.filter(|key| !done.contains(**key))
						.map(|(app, name)| format!("{}.{}", app, name))
						.collect();
					warn!(
						models = %remaining.join(", "),
						"Circular foreign keys between new models, keeping name order"
					);
					ordered.extend(
						pending
							.iter()
							.filter(|key| !done.contains(**key))
							.map(|key| (*key).clone()),
					);
					break;
				}
			}
		}
		ordered
	}

	/// Operations per app, in the order they must run
	pub fn changes(&self) -> BTreeMap<String, Vec<Operation>> {
		let changes = self.detect_changes();
		let mut by_app: BTreeMap<String, Vec<Operation>> = BTreeMap::new();

		for (app_label, model_name) in &changes.created_models {
			if let Some(model) = self.to_state.get_model(app_label, model_name) {
				let mut operation =
					CreateModel::new(&model.name, model.fields.values().cloned().collect());
				operation.db_table = model.db_table.clone();
				by_app
					.entry(app_label.clone())
					.or_default()
					.push(Operation::CreateModel(operation));
			}
		}
		for (app_label, model_name) in &changes.deleted_models {
			if let Some(model) = self.from_state.get_model(app_label, model_name) {
				by_app
					.entry(app_label.clone())
					.or_default()
					.push(Operation::DeleteModel(DeleteModel::new(&model.name)));
			}
		}
		for (app_label, model_name, field_name) in &changes.removed_fields {
			by_app
				.entry(app_label.clone())
				.or_default()
				.push(Operation::RemoveField(RemoveField::new(model_name, field_name)));
		}
		for (app_label, model_name, field_name) in &changes.added_fields {
			if let Some(field) = self
				.to_state
				.get_model(app_label, model_name)
				.and_then(|model| model.get_field(field_name))
			{
				by_app
					.entry(app_label.clone())
					.or_default()
					.push(Operation::AddField(AddField::new(model_name, field.clone())));
			}
		}
		for (app_label, model_name, field_name) in &changes.altered_fields {
			if let Some(field) = self
				.to_state
				.get_model(app_label, model_name)
				.and_then(|model| model.get_field(field_name))
			{
				by_app
					.entry(app_label.clone())
					.or_default()
					.push(Operation::AlterField(AlterField::new(model_name, field.clone())));
			}
		}
		by_app
	}

	/// Turn per-app operations into numbered migrations following `graph`
	///
	/// Each migration depends on its app's current leaf, and on the leaf (or
	/// new migration) of every other app one of its foreign keys points into.
	pub fn arrange_for_graph(
		changes: BTreeMap<String, Vec<Operation>>,
		graph: &MigrationGraph,
	) -> Vec<Migration> {
		let mut names: BTreeMap<String, String> = BTreeMap::new();
		for (app_label, operations) in &changes {
			let leaves = graph.leaf_nodes(app_label);
			let number = leaves
				.iter()
				.filter_map(|leaf| migration_number(&leaf.name))
				.max()
				.map_or(1, |number| number + 1);
			let initial = leaves.is_empty();
			names.insert(
				app_label.clone(),
				format!(
					"{:04}_{}",
					number,
					MigrationNamer::suggest_name(operations, initial)
				),
			);
		}

		let mut migrations = Vec::with_capacity(changes.len());
		for (app_label, operations) in changes {
			let Some(name) = names.get(&app_label) else {
				continue;
			};
			let mut migration = Migration::new(name, &app_label);
			if graph.leaf_nodes(&app_label).is_empty() {
				migration = migration.initial(true);
			}

			let mut dependencies: BTreeSet<(String, String)> = graph
				.leaf_nodes(&app_label)
				.into_iter()
				.map(|leaf| (leaf.app_label, leaf.name))
				.collect();
			for operation in &operations {
				for field in operation.fields() {
					let Some((target_app, _)) = field.related_model_key() else {
						continue;
					};
					if target_app == app_label {
						continue;
					}
					match names.get(&target_app) {
						Some(target_name) => {
							dependencies.insert((target_app.clone(), target_name.clone()));
						}
						None => {
							for leaf in graph.leaf_nodes(&target_app) {
								dependencies.insert((leaf.app_label, leaf.name));
							}
						}
					}
				}
			}

			for (dependency_app, dependency_name) in dependencies {
				migration = migration.add_dependency(dependency_app, dependency_name);
			}
			for operation in operations {
				migration = migration.add_operation(operation);
			}
			migrations.push(migration);
		}
		migrations
	}
}

/// Leading number of a migration name, e.g. 38 for `0038_alter_...`
fn migration_number(name: &str) -> Option<u32> {
	let digits: String = name.chars().take_while(char::is_ascii_digit).collect();
	digits.parse().ok()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::migrations::{FieldDefinition, FieldType, ModelState, OnDelete};
	use rstest::rstest;

	fn order() -> ModelState {
		ModelState::new("api", "Order")
			.with_field(FieldDefinition::new("id", FieldType::BigAutoField).primary_key())
	}

	#[rstest]
	fn test_created_models_follow_foreign_keys() {
		let mut to_state = ProjectState::new();
		to_state.add_model(
			ModelState::new("api", "Book")
				.with_field(FieldDefinition::new("id", FieldType::BigAutoField).primary_key())
				.with_field(FieldDefinition::foreign_key("order", "api.zorder", OnDelete::Cascade)),
		);
		to_state.add_model(
			ModelState::new("api", "ZOrder")
				.with_field(FieldDefinition::new("id", FieldType::BigAutoField).primary_key()),
		);

		let changes = MigrationAutodetector::new(ProjectState::new(), to_state).detect_changes();
		assert_eq!(
			changes.created_models,
			vec![
				("api".to_string(), "zorder".to_string()),
				("api".to_string(), "book".to_string()),
			]
		);
	}

	#[rstest]
	fn test_no_changes() {
		let mut state = ProjectState::new();
		state.add_model(order());
		let detector = MigrationAutodetector::new(state.clone(), state);
		assert!(detector.detect_changes().is_empty());
		assert!(detector.changes().is_empty());
	}

	#[rstest]
	fn test_field_changes() {
		let mut from_state = ProjectState::new();
		from_state.add_model(order().with_field(FieldDefinition::new("status", FieldType::Integer)));
		let mut to_state = ProjectState::new();
		to_state.add_model(
			order()
				.with_field(FieldDefinition::new("status", FieldType::PositiveSmallInteger))
				.with_field(FieldDefinition::new("amount", FieldType::Text).null(true)),
		);

		let changes = MigrationAutodetector::new(from_state, to_state).changes();
		let operations = &changes["api"];
		assert_eq!(operations.len(), 2);
		assert!(matches!(operations[0], Operation::AddField(_)));
		assert!(matches!(operations[1], Operation::AlterField(_)));
	}

	#[rstest]
	fn test_first_migration_is_initial() {
		let mut to_state = ProjectState::new();
		to_state.add_model(order());
		let changes = MigrationAutodetector::new(ProjectState::new(), to_state).changes();

		let migrations = MigrationAutodetector::arrange_for_graph(changes, &MigrationGraph::new());
		assert_eq!(migrations.len(), 1);
		assert_eq!(migrations[0].name, "0001_initial");
		assert!(migrations[0].is_initial());
	}

	#[rstest]
	#[case("0038_alter_lnpayment_order_donated", Some(38))]
	#[case("initial", None)]
	fn test_migration_number(#[case] name: &str, #[case] expected: Option<u32>) {
		assert_eq!(migration_number(name), expected);
	}
}
