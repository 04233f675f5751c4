use robosats_api::migrations::{
	_0037_lnpayment_order_donated_alter_lnpayment_concept_and_more as m0037,
	_0038_alter_lnpayment_order_donated as m0038,
};
use robosats_api::models;
use robosats_db::DatabaseType;
use robosats_db::migrations::{
	ForeignKeyAction, Migration, MigrationAutodetector, MigrationError, MigrationExecutor,
	MigrationGraph, MigrationKey, MigrationNamer, MigrationTarget, sql_for_migration,
};
use robosats_test::{
	api_executor, api_migrations, assert_column_nullable, assert_foreign_key,
	assert_index_exists, assert_table_missing,
};
use rstest::rstest;
use sqlx::Row;

const PAYMENT_ID: &str = "5b9ec2e4b1a94a6f8c3d1f0e2a7b6c5d";

fn key_0038() -> MigrationKey {
	MigrationKey::new("api", "0038_alter_lnpayment_order_donated")
}

fn up_to_0037(migrations: &[Migration]) -> Vec<Migration> {
	migrations
		.iter()
		.filter(|migration| migration.name != key_0038().name)
		.cloned()
		.collect()
}

#[rstest]
#[tokio::test]
async fn test_order_donated_becomes_nullable_set_null(
	#[future] api_executor: MigrationExecutor,
	api_migrations: Vec<Migration>,
) {
	let executor = api_executor.await;
	executor
		.migrate(&up_to_0037(&api_migrations), MigrationTarget::Latest)
		.await
		.unwrap();
	let connection = executor.connection();
	assert_column_nullable(connection, "api_lnpayment", "order_donated_id", false).await;
	assert_foreign_key(
		connection,
		"api_lnpayment",
		"order_donated_id",
		"api_order",
		ForeignKeyAction::Cascade,
	)
	.await;

	let result = executor
		.migrate(&api_migrations, MigrationTarget::Latest)
		.await
		.unwrap();

	assert_eq!(result.applied, vec![key_0038()]);
	assert_column_nullable(connection, "api_lnpayment", "order_donated_id", true).await;
	assert_foreign_key(
		connection,
		"api_lnpayment",
		"order_donated_id",
		"api_order",
		ForeignKeyAction::SetNull,
	)
	.await;
	assert_index_exists(
		connection,
		"api_lnpayment",
		"api_lnpayment_order_donated_id_idx",
	)
	.await;
}

#[rstest]
#[tokio::test]
async fn test_second_run_applies_nothing(
	#[future] api_executor: MigrationExecutor,
	api_migrations: Vec<Migration>,
) {
	let executor = api_executor.await;
	let first = executor
		.migrate(&api_migrations, MigrationTarget::Latest)
		.await
		.unwrap();
	assert_eq!(first.applied.len(), 3);

	let second = executor
		.migrate(&api_migrations, MigrationTarget::Latest)
		.await
		.unwrap();

	assert!(second.is_empty());
	assert_eq!(executor.applied().await.unwrap().len(), 3);
	assert_column_nullable(executor.connection(), "api_lnpayment", "order_donated_id", true).await;
}

#[rstest]
#[tokio::test]
async fn test_missing_dependency_fails_before_any_change(
	#[future] api_executor: MigrationExecutor,
) {
	let executor = api_executor.await;

	let result = executor
		.migrate(&[m0038::migration()], MigrationTarget::Latest)
		.await;

	match result {
		Err(MigrationError::DependencyError(message)) => {
			assert!(message.contains("0037_lnpayment_order_donated_alter_lnpayment_concept_and_more"))
		}
		other => panic!("expected a dependency error, got {:?}", other),
	}
	let connection = executor.connection();
	assert_table_missing(connection, "api_lnpayment").await;
	assert_table_missing(connection, "robosats_migrations").await;
}

#[rstest]
#[tokio::test]
async fn test_deleting_order_clears_reference(
	#[future] api_executor: MigrationExecutor,
	api_migrations: Vec<Migration>,
) {
	let executor = api_executor.await;
	executor
		.migrate(&api_migrations, MigrationTarget::Latest)
		.await
		.unwrap();
	let connection = executor.connection();

	connection
		.execute(
			"INSERT INTO \"api_order\" (\"id\", \"status\", \"type\", \"created_at\", \"expires_at\") \
			 VALUES (7, 0, 1, '2024-03-01 09:00:00', '2024-03-02 09:00:00')",
		)
		.await
		.unwrap();
	connection
		.execute(&format!(
			"INSERT INTO \"api_lnpayment\" \
			 (\"id\", \"type\", \"concept\", \"status\", \"created_at\", \"order_donated_id\") \
			 VALUES ('{}', 1, 0, 0, '2024-03-01 09:00:00', 7)",
			PAYMENT_ID
		))
		.await
		.unwrap();

	connection
		.execute("DELETE FROM \"api_order\" WHERE \"id\" = 7")
		.await
		.unwrap();

	let rows = connection
		.fetch_all(&format!(
			"SELECT \"order_donated_id\" FROM \"api_lnpayment\" WHERE \"id\" = '{}'",
			PAYMENT_ID
		))
		.await
		.unwrap();
	assert_eq!(rows.len(), 1);
	assert_eq!(rows[0].try_get::<Option<i64>, _>("order_donated_id").unwrap(), None);
}

#[rstest]
#[tokio::test]
async fn test_unapply_restores_cascade(
	#[future] api_executor: MigrationExecutor,
	api_migrations: Vec<Migration>,
) {
	let executor = api_executor.await;
	executor
		.migrate(&api_migrations, MigrationTarget::Latest)
		.await
		.unwrap();

	let result = executor
		.migrate(
			&api_migrations,
			MigrationTarget::to(
				"api",
				"0037_lnpayment_order_donated_alter_lnpayment_concept_and_more",
			),
		)
		.await
		.unwrap();

	assert_eq!(result.unapplied, vec![key_0038()]);
	assert_column_nullable(executor.connection(), "api_lnpayment", "order_donated_id", false).await;
	assert_foreign_key(
		executor.connection(),
		"api_lnpayment",
		"order_donated_id",
		"api_order",
		ForeignKeyAction::Cascade,
	)
	.await;
}

#[rstest]
fn test_postgres_sql(api_migrations: Vec<Migration>) {
	let rendered =
		sql_for_migration(DatabaseType::Postgres, &api_migrations, &key_0038(), false).unwrap();

	assert_eq!(rendered.len(), 1);
	assert_eq!(rendered[0].description, "Alter field order_donated on lnpayment");
	assert_eq!(
		rendered[0].statements,
		vec![
			"ALTER TABLE \"api_lnpayment\" DROP CONSTRAINT \"api_lnpayment_order_donated_id_fk\"",
			"ALTER TABLE \"api_lnpayment\" ALTER COLUMN \"order_donated_id\" DROP NOT NULL",
			"ALTER TABLE \"api_lnpayment\" ADD CONSTRAINT \"api_lnpayment_order_donated_id_fk\" \
			 FOREIGN KEY (\"order_donated_id\") REFERENCES \"api_order\" (\"id\") \
			 ON DELETE SET NULL DEFERRABLE INITIALLY DEFERRED",
		]
	);
}

#[rstest]
fn test_autodetector_writes_0038(api_migrations: Vec<Migration>) {
	let before = up_to_0037(&api_migrations);
	let graph = MigrationGraph::from_migrations(before.clone()).unwrap();
	let from_state = graph.project_state(|_| true).unwrap();

	let changes = MigrationAutodetector::new(from_state, models::current_state()).changes();
	let detected = MigrationAutodetector::arrange_for_graph(changes, &graph);

	let expected = m0038::migration();
	assert_eq!(detected.len(), 1);
	assert_eq!(detected[0].name, expected.name);
	assert_eq!(detected[0].dependencies, expected.dependencies);
	assert_eq!(detected[0].operations, expected.operations);
}

#[rstest]
fn test_models_match_migrations(api_migrations: Vec<Migration>) {
	let graph = MigrationGraph::from_migrations(api_migrations).unwrap();
	let state = graph.project_state(|_| true).unwrap();

	let changes = MigrationAutodetector::new(state, models::current_state()).detect_changes();
	assert!(changes.is_empty(), "unmigrated model changes: {:?}", changes);
}

#[rstest]
fn test_0037_name_describes_its_operations() {
	let migration = m0037::migration();
	let suggested = MigrationNamer::suggest_name(&migration.operations, false);

	assert_eq!(format!("0037_{}", suggested), migration.name);
}
