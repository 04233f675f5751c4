//! Command-line interface of the `manage` binary

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// RoboSats schema management
#[derive(Debug, Parser)]
#[command(name = "manage")]
#[command(about = "RoboSats schema management", long_about = None)]
#[command(version)]
pub struct Cli {
	/// Subcommand to execute
	#[command(subcommand)]
	pub command: Commands,

	/// Settings file (TOML)
	#[arg(long, global = true, value_name = "FILE", env = "ROBOSATS_SETTINGS")]
	pub settings: Option<PathBuf>,

	/// Database URL, overriding the settings
	#[arg(long, global = true, value_name = "URL")]
	pub database_url: Option<String>,

	/// Verbosity level (can be repeated for more output)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbosity: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
	/// Apply database migrations
	Migrate {
		/// App label to migrate
		#[arg(value_name = "APP_LABEL")]
		app_label: Option<String>,

		/// Migration name (or unique prefix) to migrate to; `zero` unapplies the app
		#[arg(value_name = "MIGRATION_NAME", requires = "app_label")]
		migration_name: Option<String>,

		/// Fake migration (mark as applied without running)
		#[arg(long)]
		fake: bool,

		/// Show migration plan without applying
		#[arg(long)]
		plan: bool,
	},

	/// List migrations and whether they are applied
	Showmigrations {
		/// Only show this app
		#[arg(value_name = "APP_LABEL")]
		app_label: Option<String>,
	},

	/// Print the SQL statements of a migration
	Sqlmigrate {
		#[arg(value_name = "APP_LABEL")]
		app_label: String,

		/// Migration name or unique prefix
		#[arg(value_name = "MIGRATION_NAME")]
		migration_name: String,

		/// Print the SQL that unapplies the migration
		#[arg(long)]
		backwards: bool,
	},

	/// Report model changes that are not covered by a migration
	Makemigrations {
		/// Only check this app
		#[arg(value_name = "APP_LABEL")]
		app_label: Option<String>,

		/// Exit with a non-zero status if model changes are missing migrations
		#[arg(long)]
		check: bool,
	},
}
