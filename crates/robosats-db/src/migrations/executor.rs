//! Migration executor
//!
//! Runs a plan against a live database. Before the first statement executes
//! the executor has:
//!
//! - loaded the graph and rejected cycles and duplicates
//! - read the ledger and rejected missing dependencies and inconsistent history
//! - validated every migration in the plan and replayed the project states it
//!   needs
//!
//! Each migration then runs in its own transaction (unless it opts out and the
//! transaction mode allows it), and its ledger row is written inside that
//! transaction. A failing migration leaves no partial DDL and no ledger row
//! behind on both supported dialects.

use super::graph::{MigrationGraph, MigrationKey};
use super::plan::{Direction, MigrationPlan, PlanStep, TransactionMode};
use super::recorder::{DatabaseMigrationRecorder, MigrationRecord};
use super::schema_editor::{SchemaEditor, editor_for};
use super::state::ProjectState;
use super::{Migration, MigrationError, MigrationOperation, Operation, Result};
use crate::backends::{DatabaseConnection, DatabaseType};
use robosats_conf::MigrationSettings;
use sqlx::{AnyConnection, Connection, Row};
use std::collections::BTreeSet;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// How far `migrate` should go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationTarget {
	/// Every loaded migration
	Latest,
	/// Every migration of one app, with its dependencies
	App(String),
	/// Exactly this migration: applied forwards if it is not applied yet,
	/// otherwise everything after it in the app is unapplied
	To { app_label: String, name: String },
	/// Unapply every migration of one app
	Zero(String),
}

impl MigrationTarget {
	pub fn to(app_label: impl Into<String>, name: impl Into<String>) -> Self {
		MigrationTarget::To {
			app_label: app_label.into(),
			name: name.into(),
		}
	}
}

/// Migrations touched by one `migrate` call, in execution order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
	pub applied: Vec<MigrationKey>,
	pub unapplied: Vec<MigrationKey>,
}

impl ExecutionResult {
	pub fn is_empty(&self) -> bool {
		self.applied.is_empty() && self.unapplied.is_empty()
	}
}

/// One line of `showmigrations`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
	pub key: MigrationKey,
	pub applied: bool,
}

/// Statements rendered for one operation by `sqlmigrate`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSql {
	pub description: String,
	pub statements: Vec<String>,
}

/// A plan step together with the project states around each of its operations
///
/// `states[0]` is the state without the migration and `states[i + 1]` the
/// state after its `i`-th operation, whatever the direction.
struct PreparedStep {
	step: PlanStep,
	states: Vec<ProjectState>,
}

pub struct MigrationExecutor {
	connection: DatabaseConnection,
	recorder: DatabaseMigrationRecorder,
	transaction_mode: TransactionMode,
	fake: bool,
	/// Serializes runs issued through this executor
	run_lock: Mutex<()>,
}

impl MigrationExecutor {
	/// Create an executor recording into the default ledger table
	pub fn new(connection: DatabaseConnection) -> Result<Self> {
		Self::from_settings(connection, &MigrationSettings::default())
	}

	pub fn from_settings(connection: DatabaseConnection, settings: &MigrationSettings) -> Result<Self> {
		let recorder = DatabaseMigrationRecorder::new(&settings.table, connection.database_type())?;
		Ok(Self {
			connection,
			recorder,
			transaction_mode: settings.transaction_mode,
			fake: false,
			run_lock: Mutex::new(()),
		})
	}

	pub fn with_transaction_mode(mut self, mode: TransactionMode) -> Self {
		self.transaction_mode = mode;
		self
	}

	/// Record migrations in the ledger without running their operations
	pub fn fake(mut self, fake: bool) -> Self {
		self.fake = fake;
		self
	}

	pub fn connection(&self) -> &DatabaseConnection {
		&self.connection
	}

	pub fn recorder(&self) -> &DatabaseMigrationRecorder {
		&self.recorder
	}

	/// Bring the database to `target`
	pub async fn migrate(
		&self,
		migrations: &[Migration],
		target: MigrationTarget,
	) -> Result<ExecutionResult> {
		let _guard = self.run_lock.lock().await;
		let mut conn = self.connection.acquire().await?;

		self.recorder.acquire_lock(&mut conn).await?;
		let result = self.migrate_locked(&mut conn, migrations, &target).await;
		if let Err(error) = self.recorder.release_lock(&mut conn).await {
			warn!(error = %error, "Failed to release migration lock");
		}
		result
	}

	/// Steps `migrate` would run, without running them
	pub async fn plan(&self, migrations: &[Migration], target: MigrationTarget) -> Result<MigrationPlan> {
		let graph = MigrationGraph::from_migrations(migrations.iter().cloned())?;
		let mut conn = self.connection.acquire().await?;
		let applied = self.recorder.applied_set(&mut conn).await?;
		validate_history(&graph, &applied)?;

		let steps = build_plan(&graph, &applied, &target)?;
		Ok(MigrationPlan {
			steps,
			transaction_mode: self.transaction_mode,
		})
	}

	/// Every loaded migration with its ledger status, in application order
	pub async fn show_migrations(
		&self,
		migrations: &[Migration],
		app_label: Option<&str>,
	) -> Result<Vec<MigrationStatus>> {
		let graph = MigrationGraph::from_migrations(migrations.iter().cloned())?;
		let mut conn = self.connection.acquire().await?;
		let applied = self.recorder.applied_set(&mut conn).await?;

		Ok(graph
			.topological_order()?
			.into_iter()
			.filter(|key| app_label.is_none_or(|app| key.app_label == app))
			.map(|key| MigrationStatus {
				applied: applied.contains(&key),
				key,
			})
			.collect())
	}

	/// Ledger rows; empty when nothing was ever migrated
	pub async fn applied(&self) -> Result<Vec<MigrationRecord>> {
		let mut conn = self.connection.acquire().await?;
		if !self.recorder.has_table(&mut conn).await? {
			return Ok(Vec::new());
		}
		self.recorder.applied_migrations(&mut conn).await
	}

	/// Render the DDL of one migration for this executor's dialect
	pub fn sql_for(
		&self,
		migrations: &[Migration],
		app_label: &str,
		name: &str,
		backwards: bool,
	) -> Result<Vec<OperationSql>> {
		sql_for_migration(
			self.connection.database_type(),
			migrations,
			&MigrationKey::new(app_label, name),
			backwards,
		)
	}

	async fn migrate_locked(
		&self,
		conn: &mut AnyConnection,
		migrations: &[Migration],
		target: &MigrationTarget,
	) -> Result<ExecutionResult> {
		let graph = MigrationGraph::from_migrations(migrations.iter().cloned())?;
		graph.check_cycles()?;

		let applied = self.recorder.applied_set(&mut *conn).await?;
		validate_history(&graph, &applied)?;

		let steps = build_plan(&graph, &applied, target)?;
		let prepared = prepare_steps(&graph, &applied, steps)?;
		if prepared.is_empty() {
			info!("No migrations to apply");
			return Ok(ExecutionResult::default());
		}

		self.recorder.ensure_schema_table(&mut *conn).await?;
		let editor = editor_for(self.connection.database_type());
		let mut result = ExecutionResult::default();

		for prepared_step in &prepared {
			let key = &prepared_step.step.key;
			let migration = graph
				.migration(key)
				.ok_or_else(|| MigrationError::NotFound(key.to_string()))?;
			let started = Instant::now();

			if self.fake {
				self.record(&mut *conn, prepared_step.step.direction, key).await?;
				warn!(migration = %key, direction = ?prepared_step.step.direction, "Faked migration");
			} else {
				info!(migration = %key, "{}", prepared_step.step);
				self.run_step(&mut *conn, editor.as_ref(), migration, prepared_step)
					.await?;
				info!(
					migration = %key,
					elapsed_ms = started.elapsed().as_millis() as u64,
					"Done"
				);
			}

			match prepared_step.step.direction {
				Direction::Forwards => result.applied.push(key.clone()),
				Direction::Backwards => result.unapplied.push(key.clone()),
			}
		}

		Ok(result)
	}

	async fn record(&self, conn: &mut AnyConnection, direction: Direction, key: &MigrationKey) -> Result<()> {
		match direction {
			Direction::Forwards => {
				self.recorder
					.record_applied(conn, &key.app_label, &key.name)
					.await
			}
			Direction::Backwards => {
				self.recorder
					.record_unapplied(conn, &key.app_label, &key.name)
					.await
			}
		}
	}

	/// Run one migration, suspending SQLite foreign key enforcement around it
	async fn run_step(
		&self,
		conn: &mut AnyConnection,
		editor: &dyn SchemaEditor,
		migration: &Migration,
		prepared: &PreparedStep,
	) -> Result<()> {
		let sqlite = self.connection.database_type() == DatabaseType::Sqlite;
		if sqlite {
			// Has no effect inside a transaction, so it must precede BEGIN.
			sqlx::query("PRAGMA foreign_keys = OFF")
				.execute(&mut *conn)
				.await?;
		}

		let outcome = if self.transaction_mode.wraps(migration.atomic) {
			self.run_in_transaction(conn, editor, migration, prepared)
				.await
		} else {
			debug!(migration = %migration.id(), "Running without a transaction");
			self.run_and_record(conn, editor, migration, prepared).await
		};

		if sqlite {
			if let Err(error) = sqlx::query("PRAGMA foreign_keys = ON")
				.execute(&mut *conn)
				.await
			{
				warn!(error = %error, "Failed to re-enable foreign key enforcement");
				if outcome.is_ok() {
					return Err(error.into());
				}
			}
		}
		outcome
	}

	async fn run_in_transaction(
		&self,
		conn: &mut AnyConnection,
		editor: &dyn SchemaEditor,
		migration: &Migration,
		prepared: &PreparedStep,
	) -> Result<()> {
		let mut tx = conn.begin().await?;
		match self.run_and_record(&mut tx, editor, migration, prepared).await {
			Ok(()) => {
				tx.commit().await?;
				Ok(())
			}
			Err(error) => {
				if let Err(rollback_error) = tx.rollback().await {
					warn!(error = %rollback_error, "Rollback failed");
				}
				Err(error)
			}
		}
	}

	async fn run_and_record(
		&self,
		conn: &mut AnyConnection,
		editor: &dyn SchemaEditor,
		migration: &Migration,
		prepared: &PreparedStep,
	) -> Result<()> {
		let operations = &migration.operations;
		let states = &prepared.states;

		match prepared.step.direction {
			Direction::Forwards => {
				for (index, operation) in operations.iter().enumerate() {
					self.run_operation(
						&mut *conn,
						editor,
						migration,
						operation,
						Direction::Forwards,
						&states[index],
						&states[index + 1],
					)
					.await?;
				}
			}
			Direction::Backwards => {
				for (index, operation) in operations.iter().enumerate().rev() {
					self.run_operation(
						&mut *conn,
						editor,
						migration,
						operation,
						Direction::Backwards,
						&states[index + 1],
						&states[index],
					)
					.await?;
				}
			}
		}

		if self.connection.database_type() == DatabaseType::Sqlite {
			check_foreign_keys(&mut *conn).await?;
		}
		self.record(conn, prepared.step.direction, &prepared.step.key)
			.await
	}

	#[allow(clippy::too_many_arguments)]
	async fn run_operation(
		&self,
		conn: &mut AnyConnection,
		editor: &dyn SchemaEditor,
		migration: &Migration,
		operation: &Operation,
		direction: Direction,
		from_state: &ProjectState,
		to_state: &ProjectState,
	) -> Result<()> {
		let app_label = &migration.app_label;
		if !operation
			.needs_apply(app_label, editor, &mut *conn, from_state, to_state)
			.await?
		{
			debug!(
				migration = %migration.id(),
				operation = %operation.describe(),
				"Operation already reflected in the database"
			);
			return Ok(());
		}

		let statements = match direction {
			Direction::Forwards => {
				operation.database_forwards(app_label, editor, from_state, to_state)?
			}
			Direction::Backwards => {
				operation.database_backwards(app_label, editor, from_state, to_state)?
			}
		};
		for sql in statements {
			debug!(migration = %migration.id(), sql = %sql, "Executing");
			sqlx::query(&sql).execute(&mut *conn).await?;
		}
		Ok(())
	}
}

impl std::fmt::Debug for MigrationExecutor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MigrationExecutor")
			.field("connection", &self.connection)
			.field("table", &self.recorder.table())
			.field("transaction_mode", &self.transaction_mode)
			.field("fake", &self.fake)
			.finish()
	}
}

/// Fail when a rebuilt SQLite table left rows pointing at missing parents
async fn check_foreign_keys(conn: &mut AnyConnection) -> Result<()> {
	let rows = sqlx::query("PRAGMA foreign_key_check")
		.fetch_all(&mut *conn)
		.await?;
	let Some(row) = rows.first() else {
		return Ok(());
	};

	let table: String = row.try_get("table")?;
	let parent: String = row.try_get("parent")?;
	let rowid: Option<i64> = row.try_get("rowid")?;
	Err(MigrationError::ForeignKeyViolation(format!(
		"{} row {} references a missing row in {} ({} violation(s) in total)",
		table,
		rowid.map(|id| id.to_string()).unwrap_or_else(|| "?".to_string()),
		parent,
		rows.len()
	)))
}

/// Reject dependencies that are neither loaded nor applied, and applied
/// migrations whose dependencies are not
pub fn validate_history(graph: &MigrationGraph, applied: &BTreeSet<MigrationKey>) -> Result<()> {
	for (dependent, dependency) in graph.missing_dependencies() {
		if !applied.contains(&dependency) {
			return Err(MigrationError::DependencyError(format!(
				"{} depends on {}, which is neither loaded nor applied",
				dependent, dependency
			)));
		}
	}

	for key in applied {
		let Some(migration) = graph.migration(key) else {
			continue;
		};
		for dependency in migration.dependency_keys() {
			if !applied.contains(&dependency) {
				return Err(MigrationError::InconsistentHistory(format!(
					"{} is applied before its dependency {}",
					key, dependency
				)));
			}
		}
	}
	Ok(())
}

/// Steps moving the ledger from `applied` to `target`
pub fn build_plan(
	graph: &MigrationGraph,
	applied: &BTreeSet<MigrationKey>,
	target: &MigrationTarget,
) -> Result<Vec<PlanStep>> {
	let order = graph.topological_order()?;

	let forwards = |wanted: BTreeSet<MigrationKey>| -> Vec<PlanStep> {
		order
			.iter()
			.filter(|key| wanted.contains(*key) && !applied.contains(*key))
			.cloned()
			.map(PlanStep::forwards)
			.collect()
	};
	let backwards = |wanted: BTreeSet<MigrationKey>| -> Vec<PlanStep> {
		order
			.iter()
			.rev()
			.filter(|key| wanted.contains(*key) && applied.contains(*key))
			.cloned()
			.map(PlanStep::backwards)
			.collect()
	};
	let require_app = |app_label: &str| -> Result<()> {
		if graph.app_labels().contains(app_label) {
			Ok(())
		} else {
			Err(MigrationError::NotFound(format!(
				"app '{}' has no migrations",
				app_label
			)))
		}
	};

	match target {
		MigrationTarget::Latest => Ok(forwards(order.iter().cloned().collect())),
		MigrationTarget::App(app_label) => {
			require_app(app_label.as_str())?;
			let mut wanted = BTreeSet::new();
			for leaf in graph.leaf_nodes(app_label) {
				wanted.extend(graph.forwards_plan(&leaf)?);
			}
			Ok(forwards(wanted))
		}
		MigrationTarget::To { app_label, name } => {
			let key = MigrationKey::new(app_label, name);
			if !graph.contains(&key) {
				return Err(MigrationError::NotFound(key.to_string()));
			}
			if !applied.contains(&key) {
				return Ok(forwards(graph.forwards_plan(&key)?.into_iter().collect()));
			}
			let mut wanted = BTreeSet::new();
			for child in graph.dependents(&key) {
				if child.app_label == key.app_label {
					wanted.extend(graph.backwards_plan(&child)?);
				}
			}
			Ok(backwards(wanted))
		}
		MigrationTarget::Zero(app_label) => {
			require_app(app_label.as_str())?;
			let mut wanted = BTreeSet::new();
			for root in graph.root_nodes(app_label) {
				wanted.extend(graph.backwards_plan(&root)?);
			}
			Ok(backwards(wanted))
		}
	}
}

/// Project states before and after each operation of `migration`
fn operation_states(migration: &Migration, base: ProjectState) -> Result<Vec<ProjectState>> {
	let mut states = Vec::with_capacity(migration.operations.len() + 1);
	let mut current = base;
	for operation in &migration.operations {
		let mut next = current.clone();
		operation.state_forwards(&migration.app_label, &mut next)?;
		states.push(current);
		current = next;
	}
	states.push(current);
	Ok(states)
}

/// Validate every planned migration and replay the states it runs against
fn prepare_steps(
	graph: &MigrationGraph,
	applied: &BTreeSet<MigrationKey>,
	steps: Vec<PlanStep>,
) -> Result<Vec<PreparedStep>> {
	let mut applied_now = applied.clone();
	let mut prepared = Vec::with_capacity(steps.len());

	for step in steps {
		let migration = graph
			.migration(&step.key)
			.ok_or_else(|| MigrationError::NotFound(step.key.to_string()))?;
		migration.validate()?;

		applied_now.remove(&step.key);
		let base = graph.project_state(|key| applied_now.contains(key))?;
		let states = operation_states(migration, base)?;
		if step.direction == Direction::Forwards {
			applied_now.insert(step.key.clone());
		}

		prepared.push(PreparedStep { step, states });
	}
	Ok(prepared)
}

/// Render the DDL of `key` without touching a database
///
/// The migration runs against the state produced by its dependencies.
pub fn sql_for_migration(
	database_type: DatabaseType,
	migrations: &[Migration],
	key: &MigrationKey,
	backwards: bool,
) -> Result<Vec<OperationSql>> {
	let graph = MigrationGraph::from_migrations(migrations.iter().cloned())?;
	let migration = graph
		.migration(key)
		.ok_or_else(|| MigrationError::NotFound(key.to_string()))?;
	migration.validate()?;

	let ancestors: BTreeSet<MigrationKey> = graph
		.forwards_plan(key)?
		.into_iter()
		.filter(|ancestor| ancestor != key)
		.collect();
	let base = graph.project_state(|candidate| ancestors.contains(candidate))?;
	let states = operation_states(migration, base)?;
	let editor = editor_for(database_type);

	let mut rendered = Vec::with_capacity(migration.operations.len());
	for (index, operation) in migration.operations.iter().enumerate() {
		let statements = if backwards {
			operation.database_backwards(
				&migration.app_label,
				editor.as_ref(),
				&states[index + 1],
				&states[index],
			)?
		} else {
			operation.database_forwards(
				&migration.app_label,
				editor.as_ref(),
				&states[index],
				&states[index + 1],
			)?
		};
		rendered.push(OperationSql {
			description: operation.describe(),
			statements,
		});
	}
	if backwards {
		rendered.reverse();
	}
	Ok(rendered)
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::{fixture, rstest};

	fn key(app_label: &str, name: &str) -> MigrationKey {
		MigrationKey::new(app_label, name)
	}

	#[fixture]
	fn graph() -> MigrationGraph {
		MigrationGraph::from_migrations(vec![
			Migration::new("0001_a", "api"),
			Migration::new("0002_b", "api").add_dependency("api", "0001_a"),
			Migration::new("0003_c", "api").add_dependency("api", "0002_b"),
			Migration::new("0001_a", "control").add_dependency("api", "0002_b"),
		])
		.unwrap()
	}

	#[rstest]
	fn test_latest_skips_applied(graph: MigrationGraph) {
		let applied = BTreeSet::from([key("api", "0001_a")]);
		let steps = build_plan(&graph, &applied, &MigrationTarget::Latest).unwrap();
		let keys: Vec<_> = steps.iter().map(|step| step.key.to_string()).collect();
		assert_eq!(keys, vec!["api.0002_b", "api.0003_c", "control.0001_a"]);
	}

	#[rstest]
	fn test_target_applied_migration_unapplies_later_ones(graph: MigrationGraph) {
		let applied: BTreeSet<_> = graph.topological_order().unwrap().into_iter().collect();
		let steps = build_plan(&graph, &applied, &MigrationTarget::to("api", "0001_a")).unwrap();
		assert!(steps.iter().all(PlanStep::is_backwards));
		let keys: Vec<_> = steps.iter().map(|step| step.key.to_string()).collect();
		assert_eq!(keys, vec!["control.0001_a", "api.0003_c", "api.0002_b"]);
	}

	#[rstest]
	fn test_zero_unapplies_whole_app(graph: MigrationGraph) {
		let applied = BTreeSet::from([key("api", "0001_a"), key("api", "0002_b")]);
		let steps = build_plan(&graph, &applied, &MigrationTarget::Zero("api".into())).unwrap();
		let keys: Vec<_> = steps.iter().map(|step| step.key.to_string()).collect();
		assert_eq!(keys, vec!["api.0002_b", "api.0001_a"]);
	}

	#[rstest]
	fn test_unknown_app(graph: MigrationGraph) {
		let result = build_plan(&graph, &BTreeSet::new(), &MigrationTarget::App("robots".into()));
		assert!(matches!(result, Err(MigrationError::NotFound(_))));
	}

	#[rstest]
	fn test_missing_dependency_in_ledger_is_accepted() {
		let graph = MigrationGraph::from_migrations(vec![
			Migration::new("0038_x", "api").add_dependency("api", "0037_y"),
		])
		.unwrap();
		assert!(matches!(
			validate_history(&graph, &BTreeSet::new()),
			Err(MigrationError::DependencyError(_))
		));
		assert!(validate_history(&graph, &BTreeSet::from([key("api", "0037_y")])).is_ok());
	}

	#[rstest]
	fn test_inconsistent_history(graph: MigrationGraph) {
		let applied = BTreeSet::from([key("api", "0002_b")]);
		assert!(matches!(
			validate_history(&graph, &applied),
			Err(MigrationError::InconsistentHistory(_))
		));
	}
}
