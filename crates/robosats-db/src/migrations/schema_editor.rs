//! Schema editors
//!
//! A [`SchemaEditor`] turns a state transition into DDL for one dialect. It
//! never executes anything, so the same statements serve `migrate` and
//! `sqlmigrate`.
//!
//! PostgreSQL alters tables in place. SQLite cannot change a column
//! definition, so [`SqliteSchemaEditor`] rebuilds the table instead:
//!
//! 1. `CREATE TABLE "new__<table>"` with the new definition
//! 2. copy the rows across with `INSERT INTO ... SELECT`
//! 3. `DROP TABLE "<table>"`
//! 4. rename the new table and recreate its foreign key indexes
//!
//! The executor suspends foreign key enforcement around that sequence and
//! runs `PRAGMA foreign_key_check` before committing.

use super::introspection::ExpectedReference;
use super::operations::FieldDefinition;
use super::state::{ModelState, ProjectState};
use super::{MigrationError, Result};
use crate::backends::DatabaseType;

/// PostgreSQL truncates identifiers beyond this length
const MAX_NAME_LENGTH: usize = 63;

/// Quote an identifier with double quotes, doubling embedded quotes
///
/// # Examples
///
/// ```rust
/// use robosats_db::migrations::schema_editor::quote_identifier;
///
/// assert_eq!(quote_identifier("order"), "\"order\"");
/// assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
/// ```
pub fn quote_identifier(identifier: &str) -> String {
	format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn truncate_name(name: String) -> String {
	if name.len() <= MAX_NAME_LENGTH {
		return name;
	}
	let mut end = MAX_NAME_LENGTH;
	while !name.is_char_boundary(end) {
		end -= 1;
	}
	name[..end].to_string()
}

/// Whether the difference between two field versions reaches the database
///
/// `blank` and `related_name` only matter to forms and the ORM.
pub fn field_should_be_altered(old: &FieldDefinition, new: &FieldDefinition) -> bool {
	let relation_key = |field: &FieldDefinition| {
		field
			.relation
			.as_ref()
			.map(|relation| (relation.to.to_lowercase(), relation.on_delete.foreign_key_action()))
	};

	old.field_type != new.field_type
		|| old.column() != new.column()
		|| old.null != new.null
		|| old.unique != new.unique
		|| old.primary_key != new.primary_key
		|| relation_key(old) != relation_key(new)
}

/// DDL generation for one SQL dialect
pub trait SchemaEditor: Send + Sync {
	fn database_type(&self) -> DatabaseType;

	fn quote_name(&self, name: &str) -> String {
		quote_identifier(name)
	}

	/// Column type, resolving foreign keys to the referenced primary key type
	fn column_type(&self, field: &FieldDefinition, state: &ProjectState) -> Result<String> {
		let db = self.database_type();
		match &field.relation {
			Some(relation) => {
				let target = state.resolve_relation(&relation.to)?;
				let primary_key = target.primary_key().ok_or_else(|| {
					MigrationError::SchemaIntegrity(format!(
						"model {}.{} has no primary key",
						target.app_label, target.name
					))
				})?;
				primary_key.field_type.rel_db_type(db).ok_or_else(|| {
					MigrationError::InvalidMigration(format!(
						"primary key {}.{} cannot be referenced",
						target.name, primary_key.name
					))
				})
			}
			None => field.field_type.db_type(db).ok_or_else(|| {
				MigrationError::InvalidMigration(format!(
					"field '{}' has no column type",
					field.name
				))
			}),
		}
	}

	/// Table, column and delete action a foreign key field points at
	fn reference(
		&self,
		field: &FieldDefinition,
		state: &ProjectState,
	) -> Result<Option<ExpectedReference>> {
		let Some(relation) = &field.relation else {
			return Ok(None);
		};
		let target = state.resolve_relation(&relation.to)?;
		let primary_key = target.primary_key().ok_or_else(|| {
			MigrationError::SchemaIntegrity(format!(
				"model {}.{} has no primary key",
				target.app_label, target.name
			))
		})?;
		Ok(Some(ExpectedReference {
			table: target.table_name(),
			column: primary_key.column(),
			action: relation.on_delete.foreign_key_action(),
		}))
	}

	fn foreign_key_name(&self, table: &str, column: &str) -> String {
		truncate_name(format!("{}_{}_fk", table, column))
	}

	fn index_name(&self, table: &str, column: &str) -> String {
		truncate_name(format!("{}_{}_idx", table, column))
	}

	fn unique_name(&self, table: &str, column: &str) -> String {
		truncate_name(format!("{}_{}_key", table, column))
	}

	fn references_sql(&self, reference: &ExpectedReference) -> String {
		format!(
			"REFERENCES {} ({}) ON DELETE {} DEFERRABLE INITIALLY DEFERRED",
			self.quote_name(&reference.table),
			self.quote_name(&reference.column),
			reference.action.to_sql_keyword()
		)
	}

	fn create_index_sql(&self, table: &str, column: &str) -> String {
		format!(
			"CREATE INDEX {} ON {} ({})",
			self.quote_name(&self.index_name(table, column)),
			self.quote_name(table),
			self.quote_name(column)
		)
	}

	fn delete_index_sql(&self, table: &str, column: &str) -> String {
		format!(
			"DROP INDEX IF EXISTS {}",
			self.quote_name(&self.index_name(table, column))
		)
	}

	/// `"name" type [DEFAULT x] NULL|NOT NULL [PRIMARY KEY ...] [UNIQUE] [CHECK (...)]`
	fn base_column_sql(
		&self,
		field: &FieldDefinition,
		state: &ProjectState,
		default: Option<&str>,
	) -> Result<String> {
		let db = self.database_type();
		let column = self.quote_name(&field.column());
		let mut parts = vec![column.clone(), self.column_type(field, state)?];

		if let Some(default) = default {
			parts.push(format!("DEFAULT {}", default));
		}
		parts.push(if field.null { "NULL" } else { "NOT NULL" }.to_string());
		if field.primary_key {
			parts.push("PRIMARY KEY".to_string());
			if let Some(suffix) = field.field_type.db_type_suffix(db) {
				parts.push(suffix.to_string());
			}
		} else if field.unique {
			parts.push("UNIQUE".to_string());
		}
		if let Some(check) = field.field_type.check_constraint(&column) {
			parts.push(format!("CHECK ({})", check));
		}

		Ok(parts.join(" "))
	}

	/// Full column definition as used in `CREATE TABLE`
	fn column_sql(
		&self,
		field: &FieldDefinition,
		state: &ProjectState,
		default: Option<&str>,
	) -> Result<String>;

	fn create_model(&self, model: &ModelState, state: &ProjectState) -> Result<Vec<String>>;

	fn delete_model(&self, model: &ModelState) -> Result<Vec<String>>;

	fn add_field(
		&self,
		old_model: &ModelState,
		new_model: &ModelState,
		field: &FieldDefinition,
		state: &ProjectState,
	) -> Result<Vec<String>>;

	fn remove_field(
		&self,
		old_model: &ModelState,
		new_model: &ModelState,
		field: &FieldDefinition,
		state: &ProjectState,
	) -> Result<Vec<String>>;

	fn alter_field(
		&self,
		old_model: &ModelState,
		new_model: &ModelState,
		old_field: &FieldDefinition,
		new_field: &FieldDefinition,
		state: &ProjectState,
	) -> Result<Vec<String>>;
}

/// Value filling existing rows for a column that is being added
fn fill_value(field: &FieldDefinition, db: DatabaseType) -> Option<String> {
	match field.default_sql(db) {
		Some(default) => Some(default),
		None if field.null => None,
		None => field.field_type.empty_default_sql(db),
	}
}

/// Choose the schema editor for a dialect
pub fn editor_for(database_type: DatabaseType) -> Box<dyn SchemaEditor> {
	match database_type {
		DatabaseType::Postgres => Box::new(PostgresSchemaEditor),
		DatabaseType::Sqlite => Box::new(SqliteSchemaEditor),
	}
}

/// PostgreSQL schema editor
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresSchemaEditor;

impl PostgresSchemaEditor {
	fn add_foreign_key_sql(&self, table: &str, column: &str, reference: &ExpectedReference) -> String {
		format!(
			"ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) {}",
			self.quote_name(table),
			self.quote_name(&self.foreign_key_name(table, column)),
			self.quote_name(column),
			self.references_sql(reference)
		)
	}

	fn drop_constraint_sql(&self, table: &str, name: &str) -> String {
		format!(
			"ALTER TABLE {} DROP CONSTRAINT {}",
			self.quote_name(table),
			self.quote_name(name)
		)
	}
}

impl SchemaEditor for PostgresSchemaEditor {
	fn database_type(&self) -> DatabaseType {
		DatabaseType::Postgres
	}

	fn column_sql(
		&self,
		field: &FieldDefinition,
		state: &ProjectState,
		default: Option<&str>,
	) -> Result<String> {
		self.base_column_sql(field, state, default)
	}

	fn create_model(&self, model: &ModelState, state: &ProjectState) -> Result<Vec<String>> {
		let table = model.table_name();
		let columns = model
			.fields
			.values()
			.map(|field| self.column_sql(field, state, None))
			.collect::<Result<Vec<_>>>()?;

		let mut statements = vec![format!(
			"CREATE TABLE {} ({})",
			self.quote_name(&table),
			columns.join(", ")
		)];
		for field in model.foreign_keys() {
			if let Some(reference) = self.reference(field, state)? {
				statements.push(self.add_foreign_key_sql(&table, &field.column(), &reference));
				statements.push(self.create_index_sql(&table, &field.column()));
			}
		}
		Ok(statements)
	}

	fn delete_model(&self, model: &ModelState) -> Result<Vec<String>> {
		Ok(vec![format!(
			"DROP TABLE {} CASCADE",
			self.quote_name(&model.table_name())
		)])
	}

	fn add_field(
		&self,
		_old_model: &ModelState,
		new_model: &ModelState,
		field: &FieldDefinition,
		state: &ProjectState,
	) -> Result<Vec<String>> {
		let table = new_model.table_name();
		let column = field.column();
		let default = fill_value(field, DatabaseType::Postgres);

		let mut statements = vec![format!(
			"ALTER TABLE {} ADD COLUMN {}",
			self.quote_name(&table),
			self.column_sql(field, state, default.as_deref())?
		)];
		if default.is_some() {
			statements.push(format!(
				"ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT",
				self.quote_name(&table),
				self.quote_name(&column)
			));
		}
		if let Some(reference) = self.reference(field, state)? {
			statements.push(self.add_foreign_key_sql(&table, &column, &reference));
			statements.push(self.create_index_sql(&table, &column));
		}
		Ok(statements)
	}

	fn remove_field(
		&self,
		old_model: &ModelState,
		_new_model: &ModelState,
		field: &FieldDefinition,
		_state: &ProjectState,
	) -> Result<Vec<String>> {
		Ok(vec![format!(
			"ALTER TABLE {} DROP COLUMN {} CASCADE",
			self.quote_name(&old_model.table_name()),
			self.quote_name(&field.column())
		)])
	}

	fn alter_field(
		&self,
		_old_model: &ModelState,
		new_model: &ModelState,
		old_field: &FieldDefinition,
		new_field: &FieldDefinition,
		state: &ProjectState,
	) -> Result<Vec<String>> {
		if !field_should_be_altered(old_field, new_field) {
			return Ok(Vec::new());
		}

		let table = new_model.table_name();
		let quoted_table = self.quote_name(&table);
		let old_column = old_field.column();
		let new_column = new_field.column();
		let quoted_column = self.quote_name(&new_column);
		let mut statements = Vec::new();

		let old_action = old_field
			.relation
			.as_ref()
			.map(|relation| (relation.to.to_lowercase(), relation.on_delete.foreign_key_action()));
		let new_action = new_field
			.relation
			.as_ref()
			.map(|relation| (relation.to.to_lowercase(), relation.on_delete.foreign_key_action()));
		let renamed = old_column != new_column;
		let drop_foreign_key = old_action.is_some() && (old_action != new_action || renamed);

		if drop_foreign_key {
			statements.push(
				self.drop_constraint_sql(&table, &self.foreign_key_name(&table, &old_column)),
			);
		}
		if old_field.unique && !new_field.unique && !old_field.primary_key {
			statements.push(self.drop_constraint_sql(&table, &self.unique_name(&table, &old_column)));
		}

		if renamed {
			statements.push(format!(
				"ALTER TABLE {} RENAME COLUMN {} TO {}",
				quoted_table,
				self.quote_name(&old_column),
				quoted_column
			));
		}

		let new_type = self.column_type(new_field, state)?;
		let old_type = self.column_type(old_field, state).ok();
		if old_type.as_deref() != Some(new_type.as_str()) {
			statements.push(format!(
				"ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{}",
				quoted_table, quoted_column, new_type, quoted_column, new_type
			));
		}

		if old_field.null && !new_field.null {
			if let Some(default) = new_field.default_sql(DatabaseType::Postgres) {
				statements.push(format!(
					"UPDATE {} SET {} = {} WHERE {} IS NULL",
					quoted_table, quoted_column, default, quoted_column
				));
			}
			statements.push(format!(
				"ALTER TABLE {} ALTER COLUMN {} SET NOT NULL",
				quoted_table, quoted_column
			));
		} else if !old_field.null && new_field.null {
			statements.push(format!(
				"ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL",
				quoted_table, quoted_column
			));
		}

		if !old_field.unique && new_field.unique && !new_field.primary_key {
			statements.push(format!(
				"ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
				quoted_table,
				self.quote_name(&self.unique_name(&table, &new_column)),
				quoted_column
			));
		}

		if let Some(reference) = self.reference(new_field, state)? {
			if drop_foreign_key || old_action.is_none() {
				statements.push(self.add_foreign_key_sql(&table, &new_column, &reference));
			}
		}

		let was_indexed = old_action.is_some();
		let is_indexed = new_action.is_some();
		if was_indexed && (!is_indexed || renamed) {
			statements.push(self.delete_index_sql(&table, &old_column));
		}
		if is_indexed && (!was_indexed || renamed) {
			statements.push(self.create_index_sql(&table, &new_column));
		}

		Ok(statements)
	}
}

/// SQLite schema editor
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteSchemaEditor;

impl SqliteSchemaEditor {
	/// Rebuild `new_model`'s table from `old_model`'s rows
	///
	/// `altered` names the field whose definition changed, so a column turning
	/// `NOT NULL` can be filled from its default.
	pub fn remake_table(
		&self,
		old_model: &ModelState,
		new_model: &ModelState,
		state: &ProjectState,
		altered: Option<(&FieldDefinition, &FieldDefinition)>,
	) -> Result<Vec<String>> {
		let db = DatabaseType::Sqlite;
		let table = new_model.table_name();
		let temp_table = format!("new__{}", table);

		let definitions = new_model
			.fields
			.values()
			.map(|field| self.column_sql(field, state, None))
			.collect::<Result<Vec<_>>>()?;

		let mut targets = Vec::new();
		let mut sources = Vec::new();
		for field in new_model.fields.values() {
			let source_field = match altered {
				Some((old, new)) if new.name == field.name => Some(old),
				_ => old_model.get_field(&field.name),
			};
			let source = match source_field {
				Some(old) => {
					let column = self.quote_name(&old.column());
					match field.default_sql(db) {
						Some(default) if old.null && !field.null => {
							format!("coalesce({}, {})", column, default)
						}
						_ => column,
					}
				}
				None => match fill_value(field, db) {
					Some(value) => value,
					None if field.null => continue,
					None => {
						return Err(MigrationError::InvalidMigration(format!(
							"cannot add non-nullable field {}.{} without a default",
							new_model.name, field.name
						)));
					}
				},
			};
			targets.push(self.quote_name(&field.column()));
			sources.push(source);
		}

		let mut statements = vec![format!(
			"CREATE TABLE {} ({})",
			self.quote_name(&temp_table),
			definitions.join(", ")
		)];
		if !targets.is_empty() {
			statements.push(format!(
				"INSERT INTO {} ({}) SELECT {} FROM {}",
				self.quote_name(&temp_table),
				targets.join(", "),
				sources.join(", "),
				self.quote_name(&old_model.table_name())
			));
		}
		statements.push(format!("DROP TABLE {}", self.quote_name(&old_model.table_name())));
		statements.push(format!(
			"ALTER TABLE {} RENAME TO {}",
			self.quote_name(&temp_table),
			self.quote_name(&table)
		));
		for field in new_model.foreign_keys() {
			statements.push(self.create_index_sql(&table, &field.column()));
		}
		Ok(statements)
	}
}

impl SchemaEditor for SqliteSchemaEditor {
	fn database_type(&self) -> DatabaseType {
		DatabaseType::Sqlite
	}

	/// Foreign keys are declared inline; SQLite cannot add them later.
	fn column_sql(
		&self,
		field: &FieldDefinition,
		state: &ProjectState,
		default: Option<&str>,
	) -> Result<String> {
		let mut sql = self.base_column_sql(field, state, default)?;
		if let Some(reference) = self.reference(field, state)? {
			sql.push(' ');
			sql.push_str(&self.references_sql(&reference));
		}
		Ok(sql)
	}

	fn create_model(&self, model: &ModelState, state: &ProjectState) -> Result<Vec<String>> {
		let table = model.table_name();
		let columns = model
			.fields
			.values()
			.map(|field| self.column_sql(field, state, None))
			.collect::<Result<Vec<_>>>()?;

		let mut statements = vec![format!(
			"CREATE TABLE {} ({})",
			self.quote_name(&table),
			columns.join(", ")
		)];
		for field in model.foreign_keys() {
			statements.push(self.create_index_sql(&table, &field.column()));
		}
		Ok(statements)
	}

	fn delete_model(&self, model: &ModelState) -> Result<Vec<String>> {
		Ok(vec![format!(
			"DROP TABLE {}",
			self.quote_name(&model.table_name())
		)])
	}

	fn add_field(
		&self,
		old_model: &ModelState,
		new_model: &ModelState,
		field: &FieldDefinition,
		state: &ProjectState,
	) -> Result<Vec<String>> {
		let simple = field.null
			&& field.default_sql(DatabaseType::Sqlite).is_none()
			&& !field.unique
			&& !field.primary_key;
		if !simple {
			return self.remake_table(old_model, new_model, state, None);
		}

		let table = new_model.table_name();
		let mut statements = vec![format!(
			"ALTER TABLE {} ADD COLUMN {}",
			self.quote_name(&table),
			self.column_sql(field, state, None)?
		)];
		if field.relation.is_some() {
			statements.push(self.create_index_sql(&table, &field.column()));
		}
		Ok(statements)
	}

	fn remove_field(
		&self,
		old_model: &ModelState,
		new_model: &ModelState,
		_field: &FieldDefinition,
		state: &ProjectState,
	) -> Result<Vec<String>> {
		self.remake_table(old_model, new_model, state, None)
	}

	fn alter_field(
		&self,
		old_model: &ModelState,
		new_model: &ModelState,
		old_field: &FieldDefinition,
		new_field: &FieldDefinition,
		state: &ProjectState,
	) -> Result<Vec<String>> {
		if !field_should_be_altered(old_field, new_field) {
			return Ok(Vec::new());
		}
		self.remake_table(old_model, new_model, state, Some((old_field, new_field)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::migrations::{FieldType, OnDelete};
	use rstest::{fixture, rstest};

	fn order() -> ModelState {
		ModelState::new("api", "Order")
			.with_field(FieldDefinition::new("id", FieldType::BigAutoField).primary_key())
			.with_field(FieldDefinition::new("status", FieldType::PositiveSmallInteger))
	}

	fn lnpayment(order_donated: FieldDefinition) -> ModelState {
		ModelState::new("api", "LNPayment")
			.with_field(FieldDefinition::new("id", FieldType::Uuid).primary_key())
			.with_field(FieldDefinition::new("num_satoshis", FieldType::PositiveBigInteger).null(true))
			.with_field(order_donated)
	}

	fn cascade() -> FieldDefinition {
		FieldDefinition::foreign_key("order_donated", "api.order", OnDelete::Cascade)
	}

	fn set_null() -> FieldDefinition {
		FieldDefinition::foreign_key("order_donated", "api.order", OnDelete::SetNull)
			.null(true)
			.blank(true)
			.default(serde_json::Value::Null)
			.related_name("order_donated")
	}

	#[fixture]
	fn state() -> ProjectState {
		let mut state = ProjectState::new();
		state.add_model(order());
		state.add_model(lnpayment(set_null()));
		state
	}

	#[rstest]
	fn test_postgres_create_model(state: ProjectState) {
		let sql = PostgresSchemaEditor
			.create_model(state.get_model("api", "order").unwrap(), &state)
			.unwrap();
		assert_eq!(
			sql,
			vec![
				"CREATE TABLE \"api_order\" (\"id\" bigint NOT NULL PRIMARY KEY GENERATED BY DEFAULT AS IDENTITY, \"status\" smallint NOT NULL CHECK (\"status\" >= 0))"
			]
		);
	}

	#[rstest]
	fn test_sqlite_create_model_inlines_foreign_key(state: ProjectState) {
		let sql = SqliteSchemaEditor
			.create_model(state.get_model("api", "lnpayment").unwrap(), &state)
			.unwrap();
		assert_eq!(sql.len(), 2);
		assert!(sql[0].contains(
			"\"order_donated_id\" bigint NULL REFERENCES \"api_order\" (\"id\") ON DELETE SET NULL DEFERRABLE INITIALLY DEFERRED"
		));
		assert_eq!(
			sql[1],
			"CREATE INDEX \"api_lnpayment_order_donated_id_idx\" ON \"api_lnpayment\" (\"order_donated_id\")"
		);
	}

	#[rstest]
	fn test_postgres_alter_to_set_null(state: ProjectState) {
		let old_model = lnpayment(cascade());
		let new_model = state.get_model("api", "lnpayment").unwrap();
		let sql = PostgresSchemaEditor
			.alter_field(&old_model, new_model, &cascade(), &set_null(), &state)
			.unwrap();

		assert_eq!(
			sql,
			vec![
				"ALTER TABLE \"api_lnpayment\" DROP CONSTRAINT \"api_lnpayment_order_donated_id_fk\"",
				"ALTER TABLE \"api_lnpayment\" ALTER COLUMN \"order_donated_id\" DROP NOT NULL",
				"ALTER TABLE \"api_lnpayment\" ADD CONSTRAINT \"api_lnpayment_order_donated_id_fk\" FOREIGN KEY (\"order_donated_id\") REFERENCES \"api_order\" (\"id\") ON DELETE SET NULL DEFERRABLE INITIALLY DEFERRED",
			]
		);
	}

	#[rstest]
	fn test_sqlite_alter_rebuilds_table(state: ProjectState) {
		let old_model = lnpayment(cascade());
		let new_model = state.get_model("api", "lnpayment").unwrap();
		let sql = SqliteSchemaEditor
			.alter_field(&old_model, new_model, &cascade(), &set_null(), &state)
			.unwrap();

		assert_eq!(sql.len(), 5);
		assert!(sql[0].starts_with("CREATE TABLE \"new__api_lnpayment\""));
		assert_eq!(
			sql[1],
			"INSERT INTO \"new__api_lnpayment\" (\"id\", \"num_satoshis\", \"order_donated_id\") SELECT \"id\", \"num_satoshis\", \"order_donated_id\" FROM \"api_lnpayment\""
		);
		assert_eq!(sql[2], "DROP TABLE \"api_lnpayment\"");
		assert_eq!(sql[3], "ALTER TABLE \"new__api_lnpayment\" RENAME TO \"api_lnpayment\"");
		assert!(sql[4].starts_with("CREATE INDEX \"api_lnpayment_order_donated_id_idx\""));
	}

	#[rstest]
	fn test_non_database_attributes_emit_nothing(state: ProjectState) {
		let model = state.get_model("api", "lnpayment").unwrap();
		let mut renamed_accessor = set_null();
		renamed_accessor.blank = false;
		renamed_accessor = renamed_accessor.related_name("donations");

		for editor in [editor_for(DatabaseType::Sqlite), editor_for(DatabaseType::Postgres)] {
			let sql = editor
				.alter_field(model, model, &set_null(), &renamed_accessor, &state)
				.unwrap();
			assert!(sql.is_empty());
		}
	}

	#[rstest]
	fn test_sqlite_add_not_null_field_fills_default(state: ProjectState) {
		let old_model = order();
		let field = FieldDefinition::new("is_swap", FieldType::Boolean).default(serde_json::json!(false));
		let new_model = order().with_field(field.clone());

		let sql = SqliteSchemaEditor
			.add_field(&old_model, &new_model, &field, &state)
			.unwrap();
		assert_eq!(
			sql[1],
			"INSERT INTO \"new__api_order\" (\"id\", \"status\", \"is_swap\") SELECT \"id\", \"status\", 0 FROM \"api_order\""
		);
	}

	#[rstest]
	fn test_postgres_add_field_drops_default(state: ProjectState) {
		let field = FieldDefinition::new("is_swap", FieldType::Boolean);
		let new_model = order().with_field(field.clone());

		let sql = PostgresSchemaEditor
			.add_field(&order(), &new_model, &field, &state)
			.unwrap();
		assert_eq!(
			sql,
			vec![
				"ALTER TABLE \"api_order\" ADD COLUMN \"is_swap\" boolean DEFAULT false NOT NULL",
				"ALTER TABLE \"api_order\" ALTER COLUMN \"is_swap\" DROP DEFAULT",
			]
		);
	}

	#[rstest]
	fn test_unknown_relation_target(state: ProjectState) {
		let field = FieldDefinition::foreign_key("robot", "api.robot", OnDelete::Cascade);
		assert!(matches!(
			SqliteSchemaEditor.column_type(&field, &state),
			Err(MigrationError::SchemaIntegrity(_))
		));
	}

	#[rstest]
	fn test_long_names_are_truncated() {
		let name = PostgresSchemaEditor.foreign_key_name(&"t".repeat(60), "column");
		assert_eq!(name.len(), 63);
	}
}
