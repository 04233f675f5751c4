//! # RoboSats Test
//!
//! Testing utilities for the RoboSats schema tooling.
//!
//! ## Overview
//!
//! - [`fixtures`]: `rstest` fixtures handing out in-memory SQLite databases,
//!   isolated migration registries and executors loaded with the `api` app
//! - [`assertions`]: schema assertions built on the database introspector
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use robosats_test::fixtures::*;
//! use robosats_db::migrations::{MigrationExecutor, MigrationTarget};
//! use rstest::*;
//!
//! #[rstest]
//! #[tokio::test]
//! async fn test_migrate(#[future] api_executor: MigrationExecutor) {
//!     let executor = api_executor.await;
//!     executor.migrate(&api_migrations(), MigrationTarget::Latest).await.unwrap();
//!     assert_column_nullable(executor.connection(), "api_lnpayment", "order_donated_id", true).await;
//! }
//! ```

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;
