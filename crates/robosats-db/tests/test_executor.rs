use robosats_db::DatabaseConnection;
use robosats_db::migrations::{
	AlterField, CreateModel, FieldDefinition, FieldType, Migration, MigrationError,
	MigrationExecutor, MigrationKey, MigrationTarget, OnDelete, Operation, TransactionMode,
};
use rstest::{fixture, rstest};
use sqlx::Row;

fn create_order() -> Operation {
	Operation::CreateModel(CreateModel::new(
		"Order",
		vec![
			FieldDefinition::new("id", FieldType::BigAutoField).primary_key(),
			FieldDefinition::new("status", FieldType::PositiveSmallInteger),
		],
	))
}

fn create_payment() -> Operation {
	Operation::CreateModel(CreateModel::new(
		"LNPayment",
		vec![
			FieldDefinition::new("id", FieldType::BigAutoField).primary_key(),
			FieldDefinition::foreign_key("order_donated", "shop.order", OnDelete::Cascade),
		],
	))
}

fn relax_payment() -> Operation {
	Operation::AlterField(AlterField::new(
		"lnpayment",
		FieldDefinition::foreign_key("order_donated", "shop.order", OnDelete::SetNull)
			.null(true)
			.blank(true),
	))
}

fn history() -> Vec<Migration> {
	vec![
		Migration::new("0001_initial", "shop")
			.add_operation(create_order())
			.add_operation(create_payment()),
		Migration::new("0002_relax_payment", "shop")
			.add_dependency("shop", "0001_initial")
			.add_operation(relax_payment()),
	]
}

#[fixture]
async fn connection() -> DatabaseConnection {
	DatabaseConnection::connect("sqlite::memory:")
		.await
		.expect("Failed to connect to database")
}

async fn count(connection: &DatabaseConnection, sql: &str) -> i64 {
	let rows = connection.fetch_all(sql).await.unwrap();
	rows[0].try_get::<i64, _>("n").unwrap()
}

async fn table_exists(connection: &DatabaseConnection, table: &str) -> bool {
	count(
		connection,
		&format!(
			"SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = '{}'",
			table
		),
	)
	.await > 0
}

#[rstest]
#[tokio::test]
async fn test_migrate_applies_history_in_order(#[future] connection: DatabaseConnection) {
	let connection = connection.await;
	let executor = MigrationExecutor::new(connection.clone()).unwrap();

	let result = executor
		.migrate(&history(), MigrationTarget::Latest)
		.await
		.unwrap();

	assert_eq!(
		result.applied,
		vec![
			MigrationKey::new("shop", "0001_initial"),
			MigrationKey::new("shop", "0002_relax_payment"),
		]
	);
	assert!(table_exists(&connection, "shop_order").await);
	assert!(table_exists(&connection, "shop_lnpayment").await);

	let applied = executor.applied().await.unwrap();
	assert_eq!(applied.len(), 2);
}

#[rstest]
#[tokio::test]
async fn test_second_run_is_a_no_op(#[future] connection: DatabaseConnection) {
	let connection = connection.await;
	let executor = MigrationExecutor::new(connection.clone()).unwrap();

	executor
		.migrate(&history(), MigrationTarget::Latest)
		.await
		.unwrap();
	let second = executor
		.migrate(&history(), MigrationTarget::Latest)
		.await
		.unwrap();

	assert!(second.is_empty());
	assert_eq!(executor.applied().await.unwrap().len(), 2);
}

#[rstest]
#[tokio::test]
async fn test_failed_migration_rolls_back(#[future] connection: DatabaseConnection) {
	let connection = connection.await;
	connection
		.execute("CREATE TABLE \"shop_lnpayment\" (\"id\" integer)")
		.await
		.unwrap();
	let executor = MigrationExecutor::new(connection.clone()).unwrap();

	let result = executor
		.migrate(&history(), MigrationTarget::Latest)
		.await;

	assert!(matches!(result, Err(MigrationError::SqlError(_))));
	assert!(!table_exists(&connection, "shop_order").await);
	assert!(executor.applied().await.unwrap().is_empty());
}

#[rstest]
#[tokio::test]
async fn test_missing_dependency_changes_nothing(#[future] connection: DatabaseConnection) {
	let connection = connection.await;
	let executor = MigrationExecutor::new(connection.clone()).unwrap();
	let migrations = vec![history().remove(1)];

	let result = executor
		.migrate(&migrations, MigrationTarget::Latest)
		.await;

	assert!(matches!(result, Err(MigrationError::DependencyError(_))));
	assert!(!table_exists(&connection, "robosats_migrations").await);
}

#[rstest]
#[tokio::test]
async fn test_migrate_to_zero_reverts_everything(#[future] connection: DatabaseConnection) {
	let connection = connection.await;
	let executor = MigrationExecutor::new(connection.clone()).unwrap();
	executor
		.migrate(&history(), MigrationTarget::Latest)
		.await
		.unwrap();

	let result = executor
		.migrate(&history(), MigrationTarget::Zero("shop".to_string()))
		.await
		.unwrap();

	assert_eq!(
		result.unapplied,
		vec![
			MigrationKey::new("shop", "0002_relax_payment"),
			MigrationKey::new("shop", "0001_initial"),
		]
	);
	assert!(!table_exists(&connection, "shop_order").await);
	assert!(!table_exists(&connection, "shop_lnpayment").await);
	assert!(executor.applied().await.unwrap().is_empty());
}

#[rstest]
#[tokio::test]
async fn test_unapply_restores_not_null(#[future] connection: DatabaseConnection) {
	let connection = connection.await;
	let executor = MigrationExecutor::new(connection.clone()).unwrap();
	executor
		.migrate(&history(), MigrationTarget::Latest)
		.await
		.unwrap();

	executor
		.migrate(&history(), MigrationTarget::to("shop", "0001_initial"))
		.await
		.unwrap();

	let rows = connection
		.fetch_all(
			"SELECT \"notnull\" AS not_null FROM pragma_table_info('shop_lnpayment') \
			 WHERE name = 'order_donated_id'",
		)
		.await
		.unwrap();
	assert_eq!(rows[0].try_get::<i64, _>("not_null").unwrap(), 1);
}

#[rstest]
#[tokio::test]
async fn test_fake_only_records(#[future] connection: DatabaseConnection) {
	let connection = connection.await;
	let executor = MigrationExecutor::new(connection.clone()).unwrap().fake(true);

	let result = executor
		.migrate(&history(), MigrationTarget::Latest)
		.await
		.unwrap();

	assert_eq!(result.applied.len(), 2);
	assert!(!table_exists(&connection, "shop_order").await);
	assert_eq!(executor.applied().await.unwrap().len(), 2);
}

#[rstest]
#[tokio::test]
async fn test_orphaned_rows_abort_table_rebuild(#[future] connection: DatabaseConnection) {
	let connection = connection.await;
	let executor = MigrationExecutor::new(connection.clone()).unwrap();
	executor
		.migrate(&history()[..1], MigrationTarget::Latest)
		.await
		.unwrap();

	connection.execute("PRAGMA foreign_keys = OFF").await.unwrap();
	connection
		.execute("INSERT INTO \"shop_lnpayment\" (\"order_donated_id\") VALUES (42)")
		.await
		.unwrap();
	connection.execute("PRAGMA foreign_keys = ON").await.unwrap();

	let result = executor
		.migrate(&history(), MigrationTarget::Latest)
		.await;

	assert!(matches!(result, Err(MigrationError::ForeignKeyViolation(_))));
	assert_eq!(executor.applied().await.unwrap().len(), 1);
	assert_eq!(
		count(&connection, "SELECT COUNT(*) AS n FROM \"shop_lnpayment\"").await,
		1
	);
}

#[rstest]
#[tokio::test]
async fn test_plan_and_status(#[future] connection: DatabaseConnection) {
	let connection = connection.await;
	let executor = MigrationExecutor::new(connection.clone())
		.unwrap()
		.with_transaction_mode(TransactionMode::PerMigration);
	executor
		.migrate(&history()[..1], MigrationTarget::Latest)
		.await
		.unwrap();

	let plan = executor
		.plan(&history(), MigrationTarget::Latest)
		.await
		.unwrap();
	assert_eq!(plan.len(), 1);
	assert_eq!(plan.steps[0].to_string(), "Apply shop.0002_relax_payment");
	assert_eq!(plan.transaction_mode, TransactionMode::PerMigration);

	let status = executor.show_migrations(&history(), Some("shop")).await.unwrap();
	let flags: Vec<bool> = status.iter().map(|line| line.applied).collect();
	assert_eq!(flags, vec![true, false]);
}

#[rstest]
#[tokio::test]
async fn test_cycle_is_rejected_before_any_change(#[future] connection: DatabaseConnection) {
	let connection = connection.await;
	let executor = MigrationExecutor::new(connection.clone()).unwrap();
	let migrations = vec![
		Migration::new("0001_a", "shop")
			.add_dependency("shop", "0002_b")
			.add_operation(create_order()),
		Migration::new("0002_b", "shop").add_dependency("shop", "0001_a"),
	];

	let result = executor
		.migrate(&migrations, MigrationTarget::Latest)
		.await;

	assert!(matches!(
		result,
		Err(MigrationError::CircularDependency { .. })
	));
	assert!(!table_exists(&connection, "shop_order").await);
}
