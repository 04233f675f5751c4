//! # RoboSats API app
//!
//! Schema of the `api` app: the models as the application currently declares
//! them ([`models`]) and the migrations that bring a database there
//! ([`migrations`]).
//!
//! ## Migrations
//!
//! - `0001_initial`: the `Order` and `LNPayment` tables
//! - `0037_lnpayment_order_donated_alter_lnpayment_concept_and_more`: a
//!   required `LNPayment.order_donated` and new `type`/`concept` defaults
//! - `0038_alter_lnpayment_order_donated`: `order_donated` becomes optional
//!   and deleting the order sets it to NULL
//!
//! ```rust
//! use robosats_api::ApiMigrations;
//! use robosats_db::migrations::MigrationProvider;
//!
//! let names: Vec<String> = ApiMigrations::migrations()
//!     .into_iter()
//!     .map(|migration| migration.name)
//!     .collect();
//! assert_eq!(names.last().unwrap(), "0038_alter_lnpayment_order_donated");
//! ```

pub mod migrations;
pub mod models;

pub use migrations::ApiMigrations;
pub use models::APP_LABEL;
