//! # RoboSats Commands
//!
//! Django-style management commands over the `api` app's migrations.
//!
//! | Command          | Description                                          |
//! |------------------|------------------------------------------------------|
//! | `migrate`        | Apply or unapply migrations                          |
//! | `showmigrations` | List migrations with their applied state             |
//! | `sqlmigrate`     | Print the SQL of one migration                       |
//! | `makemigrations` | Report model changes that have no migration yet      |
//!
//! Settings come from `--settings <FILE>` (TOML) and `ROBOSATS_*` variables;
//! `--database-url` overrides both.

pub mod cli;
pub mod commands;
pub mod logging;

pub use cli::{Cli, Commands};
pub use commands::{CommandError, execute};
