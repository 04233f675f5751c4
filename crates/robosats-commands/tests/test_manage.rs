use clap::Parser;
use robosats_commands::{Cli, CommandError, execute};
use robosats_db::DatabaseConnection;
use robosats_db::migrations::{DatabaseIntrospector, ForeignKeyAction, MigrationExecutor};
use rstest::{fixture, rstest};
use std::path::PathBuf;
use tempfile::TempDir;

struct Project {
	_dir: TempDir,
	settings: PathBuf,
	database_url: String,
}

#[fixture]
fn project() -> Project {
	let dir = tempfile::tempdir().unwrap();
	let database = dir.path().join("robosats.sqlite3");
	let settings = dir.path().join("settings.toml");
	std::fs::write(
		&settings,
		format!(
			"[database]\nengine = \"sqlite\"\nname = \"{}\"\n\n[logging]\nlevel = \"warn\"\n",
			database.display()
		),
	)
	.unwrap();
	Project {
		database_url: format!("sqlite://{}?mode=rwc", database.display()),
		_dir: dir,
		settings,
	}
}

async fn manage(project: &Project, args: &[&str]) -> anyhow::Result<()> {
	let settings = project.settings.to_string_lossy().to_string();
	let mut argv = vec!["manage", "--settings", settings.as_str()];
	argv.extend_from_slice(args);
	execute(Cli::try_parse_from(argv).unwrap()).await
}

#[rstest]
#[tokio::test]
async fn test_migrate_command(project: Project) {
	manage(&project, &["migrate"]).await.unwrap();

	let connection = DatabaseConnection::connect(&project.database_url).await.unwrap();
	let mut conn = connection.acquire().await.unwrap();
	let introspector = DatabaseIntrospector::new(connection.database_type());
	let foreign_keys = introspector
		.foreign_keys(&mut conn, "api_lnpayment")
		.await
		.unwrap();
	assert_eq!(foreign_keys.len(), 1);
	assert_eq!(foreign_keys[0].column, "order_donated_id");
	assert_eq!(foreign_keys[0].on_delete, ForeignKeyAction::SetNull);
	drop(conn);

	let executor = MigrationExecutor::new(connection.clone()).unwrap();
	assert_eq!(executor.applied().await.unwrap().len(), 3);
	connection.close().await;
}

#[rstest]
#[tokio::test]
async fn test_migrate_back_and_forth_by_prefix(project: Project) {
	manage(&project, &["migrate"]).await.unwrap();
	manage(&project, &["migrate", "api", "0037"]).await.unwrap();

	let connection = DatabaseConnection::connect(&project.database_url).await.unwrap();
	let executor = MigrationExecutor::new(connection.clone()).unwrap();
	let names: Vec<String> = executor
		.applied()
		.await
		.unwrap()
		.into_iter()
		.map(|record| record.name)
		.collect();
	assert_eq!(
		names,
		vec![
			"0001_initial",
			"0037_lnpayment_order_donated_alter_lnpayment_concept_and_more",
		]
	);
	connection.close().await;
}

#[rstest]
#[tokio::test]
async fn test_plan_changes_nothing(project: Project) {
	manage(&project, &["migrate", "--plan"]).await.unwrap();
	manage(&project, &["showmigrations", "api"]).await.unwrap();

	let connection = DatabaseConnection::connect(&project.database_url).await.unwrap();
	let executor = MigrationExecutor::new(connection.clone()).unwrap();
	assert!(executor.applied().await.unwrap().is_empty());
	connection.close().await;
}

#[rstest]
#[tokio::test]
async fn test_unknown_migration_is_reported(project: Project) {
	let error = manage(&project, &["sqlmigrate", "api", "0099"])
		.await
		.unwrap_err();
	assert!(matches!(
		error.downcast_ref::<CommandError>(),
		Some(CommandError::UnknownMigration { .. })
	));
}

#[rstest]
#[tokio::test]
async fn test_makemigrations_check_passes(project: Project) {
	manage(&project, &["makemigrations", "--check"]).await.unwrap();
}
