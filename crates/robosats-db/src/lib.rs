//! # RoboSats DB
//!
//! Django-style schema migrations for the RoboSats backend.
//!
//! ## Overview
//!
//! - [`backends`]: connection pool wrapper over `sqlx::AnyPool` for SQLite and PostgreSQL
//! - [`migrations`]: migrations, operations, dependency graph, ledger and executor
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use robosats_db::backends::DatabaseConnection;
//! use robosats_db::migrations::{MigrationExecutor, MigrationTarget};
//!
//! let connection = DatabaseConnection::connect("sqlite::memory:").await?;
//! let executor = MigrationExecutor::new(connection)?;
//! let result = executor.migrate(&migrations, MigrationTarget::Latest).await?;
//! println!("applied {} migrations", result.applied.len());
//! ```

pub mod backends;
pub mod migrations;

pub use backends::{DatabaseConnection, DatabaseError, DatabaseType};
pub use migrations::{Migration, MigrationError, Result};
