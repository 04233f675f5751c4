//! Migrations of the `api` app
//!
//! Provides the migrations of the `api` app through the `MigrationProvider`
//! trait, in dependency order.

pub mod _0001_initial;
pub mod _0037_lnpayment_order_donated_alter_lnpayment_concept_and_more;
pub mod _0038_alter_lnpayment_order_donated;

use robosats_db::migrations::{Migration, MigrationProvider};

/// Migration provider for the `api` app
pub struct ApiMigrations;

impl MigrationProvider for ApiMigrations {
	fn migrations() -> Vec<Migration> {
		vec![
			_0001_initial::migration(),
			_0037_lnpayment_order_donated_alter_lnpayment_concept_and_more::migration(),
			_0038_alter_lnpayment_order_donated::migration(),
		]
	}
}
