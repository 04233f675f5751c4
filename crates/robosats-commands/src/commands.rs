//! Command implementations
//!
//! Migrations come from the `api` app's provider; the desired model state for
//! `makemigrations` from its model declarations.

use crate::cli::{Cli, Commands};
use crate::logging;
use anyhow::Context;
use console::style;
use robosats_api::{ApiMigrations, models};
use robosats_conf::Settings;
use robosats_db::migrations::{
	LocalRegistry, Migration, MigrationAutodetector, MigrationError, MigrationExecutor,
	MigrationGraph, MigrationKey, MigrationOperation, MigrationRegistry, MigrationTarget,
	sql_for_migration,
};
use robosats_db::{DatabaseConnection, DatabaseType};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CommandError {
	#[error("App '{0}' does not have migrations")]
	UnknownApp(String),

	#[error("Cannot find a migration matching '{name}' from app '{app_label}'")]
	UnknownMigration { app_label: String, name: String },

	#[error("More than one migration matches '{name}' in app '{app_label}': {candidates}")]
	AmbiguousMigration {
		app_label: String,
		name: String,
		candidates: String,
	},

	#[error("Model changes are missing migrations: {0}")]
	ChangesDetected(String),
}

/// Run a parsed command line
pub async fn execute(cli: Cli) -> anyhow::Result<()> {
	let mut settings =
		Settings::load(cli.settings.as_deref()).context("Failed to load settings")?;
	if let Some(url) = cli.database_url {
		settings.database.url = Some(url);
	}
	logging::init(&settings.logging, cli.verbosity);

	let migrations = load_migrations()?;
	debug!(count = migrations.len(), "Loaded migrations");

	match cli.command {
		Commands::Migrate {
			app_label,
			migration_name,
			fake,
			plan,
		} => {
			let target = resolve_target(&migrations, app_label, migration_name)?;
			migrate(&settings, &migrations, target, fake, plan).await
		}
		Commands::Showmigrations { app_label } => {
			show_migrations(&settings, &migrations, app_label.as_deref()).await
		}
		Commands::Sqlmigrate {
			app_label,
			migration_name,
			backwards,
		} => sqlmigrate(&settings, &migrations, &app_label, &migration_name, backwards),
		Commands::Makemigrations { app_label, check } => {
			makemigrations(&migrations, app_label.as_deref(), check)
		}
	}
}

/// Every migration known to the project
pub fn load_migrations() -> Result<Vec<Migration>, MigrationError> {
	let registry = LocalRegistry::new();
	registry.register_provider::<ApiMigrations>()?;
	Ok(registry.all_migrations())
}

/// Full name of the migration of `app_label` matching `name` exactly or by
/// unique prefix
pub fn resolve_migration_name(
	migrations: &[Migration],
	app_label: &str,
	name: &str,
) -> Result<String, CommandError> {
	let names: Vec<&str> = migrations
		.iter()
		.filter(|migration| migration.app_label == app_label)
		.map(|migration| migration.name.as_str())
		.collect();
	if names.is_empty() {
		return Err(CommandError::UnknownApp(app_label.to_string()));
	}
	if names.contains(&name) {
		return Ok(name.to_string());
	}

	let candidates: Vec<&str> = names
		.into_iter()
		.filter(|candidate| candidate.starts_with(name))
		.collect();
	match candidates.as_slice() {
		[single] => Ok(single.to_string()),
		[] => Err(CommandError::UnknownMigration {
			app_label: app_label.to_string(),
			name: name.to_string(),
		}),
		many => Err(CommandError::AmbiguousMigration {
			app_label: app_label.to_string(),
			name: name.to_string(),
			candidates: many.join(", "),
		}),
	}
}

/// Translate `migrate [APP] [MIGRATION|zero]` into a target
pub fn resolve_target(
	migrations: &[Migration],
	app_label: Option<String>,
	migration_name: Option<String>,
) -> Result<MigrationTarget, CommandError> {
	let Some(app_label) = app_label else {
		return Ok(MigrationTarget::Latest);
	};
	if !migrations
		.iter()
		.any(|migration| migration.app_label == app_label)
	{
		return Err(CommandError::UnknownApp(app_label));
	}

	match migration_name.as_deref() {
		None => Ok(MigrationTarget::App(app_label)),
		Some("zero") => Ok(MigrationTarget::Zero(app_label)),
		Some(name) => {
			let name = resolve_migration_name(migrations, &app_label, name)?;
			Ok(MigrationTarget::to(app_label, name))
		}
	}
}

async fn connect(settings: &Settings) -> anyhow::Result<DatabaseConnection> {
	DatabaseConnection::from_config(&settings.database)
		.await
		.context("Failed to connect to the database")
}

fn find<'a>(migrations: &'a [Migration], key: &MigrationKey) -> Option<&'a Migration> {
	migrations
		.iter()
		.find(|migration| migration.app_label == key.app_label && migration.name == key.name)
}

async fn migrate(
	settings: &Settings,
	migrations: &[Migration],
	target: MigrationTarget,
	fake: bool,
	plan: bool,
) -> anyhow::Result<()> {
	let connection = connect(settings).await?;
	let executor = MigrationExecutor::from_settings(connection, &settings.migrations)?.fake(fake);

	if plan {
		let plan = executor.plan(migrations, target).await?;
		println!("{}", style("Planned operations:").cyan().bold());
		if plan.is_empty() {
			println!("  No planned migration operations.");
		}
		for step in plan.iter() {
			println!("{}", step.key);
			let Some(migration) = find(migrations, &step.key) else {
				continue;
			};
			if step.is_backwards() {
				for operation in migration.operations.iter().rev() {
					println!("    Undo {}", operation.describe());
				}
			} else {
				for operation in &migration.operations {
					println!("    {}", operation.describe());
				}
			}
		}
		executor.connection().close().await;
		return Ok(());
	}

	println!("{}", style("Running migrations:").cyan().bold());
	let result = executor.migrate(migrations, target).await;
	executor.connection().close().await;
	let result = result?;

	if result.is_empty() {
		println!("  No migrations to apply.");
	}
	let outcome = if fake { "FAKED" } else { "OK" };
	for key in &result.applied {
		println!("  Applying {}... {}", key, style(outcome).green());
	}
	for key in &result.unapplied {
		println!("  Unapplying {}... {}", key, style(outcome).green());
	}
	Ok(())
}

async fn show_migrations(
	settings: &Settings,
	migrations: &[Migration],
	app_label: Option<&str>,
) -> anyhow::Result<()> {
	if let Some(app) = app_label
		&& !migrations.iter().any(|migration| migration.app_label == app)
	{
		return Err(CommandError::UnknownApp(app.to_string()).into());
	}

	let connection = connect(settings).await?;
	let executor = MigrationExecutor::from_settings(connection, &settings.migrations)?;
	let statuses = executor.show_migrations(migrations, app_label).await;
	executor.connection().close().await;

	let mut by_app: BTreeMap<String, Vec<(String, bool)>> = BTreeMap::new();
	for status in statuses? {
		by_app
			.entry(status.key.app_label)
			.or_default()
			.push((status.key.name, status.applied));
	}
	for (app, lines) in by_app {
		println!("{}", style(app).bold());
		for (name, applied) in lines {
			if applied {
				println!(" {} {}", style("[X]").green(), name);
			} else {
				println!(" [ ] {}", name);
			}
		}
	}
	Ok(())
}

/// Lines printed by `sqlmigrate` for one migration
pub fn render_sql(
	database_type: DatabaseType,
	migrations: &[Migration],
	key: &MigrationKey,
	backwards: bool,
) -> anyhow::Result<Vec<String>> {
	let migration = find(migrations, key).ok_or_else(|| MigrationError::NotFound(key.to_string()))?;
	let rendered = sql_for_migration(database_type, migrations, key, backwards)?;

	let mut lines = Vec::new();
	if migration.atomic {
		lines.push("BEGIN;".to_string());
	}
	for operation in rendered {
		lines.push("--".to_string());
		lines.push(format!("-- {}", operation.description));
		lines.push("--".to_string());
		if operation.statements.is_empty() {
			lines.push("-- (no-op)".to_string());
		}
		lines.extend(
			operation
				.statements
				.into_iter()
				.map(|statement| format!("{};", statement)),
		);
	}
	if migration.atomic {
		lines.push("COMMIT;".to_string());
	}
	Ok(lines)
}

fn sqlmigrate(
	settings: &Settings,
	migrations: &[Migration],
	app_label: &str,
	migration_name: &str,
	backwards: bool,
) -> anyhow::Result<()> {
	let name = resolve_migration_name(migrations, app_label, migration_name)?;
	let database_type = DatabaseType::from_url(&settings.database.to_url())?;
	let key = MigrationKey::new(app_label, name);

	for line in render_sql(database_type, migrations, &key, backwards)? {
		println!("{}", line);
	}
	Ok(())
}

/// Migrations the autodetector would write for the current models
pub fn detect_migrations(
	migrations: &[Migration],
	app_label: Option<&str>,
) -> Result<Vec<Migration>, MigrationError> {
	let graph = MigrationGraph::from_migrations(migrations.iter().cloned())?;
	graph.check_cycles()?;
	let from_state = graph.project_state(|_| true)?;

	let mut changes = MigrationAutodetector::new(from_state, models::current_state()).changes();
	if let Some(app) = app_label {
		changes.retain(|label, _| label == app);
	}
	Ok(MigrationAutodetector::arrange_for_graph(changes, &graph))
}

fn makemigrations(
	migrations: &[Migration],
	app_label: Option<&str>,
	check: bool,
) -> anyhow::Result<()> {
	let detected = detect_migrations(migrations, app_label)?;
	if detected.is_empty() {
		match app_label {
			Some(app) => println!("{}", style(format!("No changes detected in app '{}'", app)).green()),
			None => println!("{}", style("No changes detected").green()),
		}
		return Ok(());
	}

	for migration in &detected {
		println!(
			"{}",
			style(format!("Migrations for '{}':", migration.app_label))
				.cyan()
				.bold()
		);
		println!("  {}", style(&migration.name).bold());
		for operation in &migration.operations {
			println!("    - {}", operation.describe());
		}
	}

	if check {
		let names: Vec<String> = detected.iter().map(Migration::id).collect();
		return Err(CommandError::ChangesDetected(names.join(", ")).into());
	}
	println!(
		"{}",
		style("Nothing was written; add the migrations above to their app.").dim()
	);
	Ok(())
}
