//! Baseline schema of `Order` and `LNPayment`
//!
//! Stands for the history up to 0036 as far as these two tables are
//! concerned.

use robosats_db::migrations::prelude::*;
use serde_json::json;

pub fn migration() -> Migration {
	Migration::new("0001_initial", "api")
		.initial(true)
		.add_operation(Operation::CreateModel(CreateModel::new(
			"Order",
			vec![
				FieldDefinition::new("id", FieldType::BigAutoField).primary_key(),
				FieldDefinition::new("status", FieldType::PositiveSmallInteger).default(json!(0)),
				FieldDefinition::new("type", FieldType::PositiveSmallInteger),
				FieldDefinition::new(
					"amount",
					FieldType::Decimal {
						max_digits: 18,
						decimal_places: 8,
					},
				)
				.null(true)
				.blank(true),
				FieldDefinition::new("created_at", FieldType::DateTime),
				FieldDefinition::new("expires_at", FieldType::DateTime),
			],
		)))
		.add_operation(Operation::CreateModel(CreateModel::new(
			"LNPayment",
			vec![
				FieldDefinition::new("id", FieldType::Uuid).primary_key(),
				FieldDefinition::new("type", FieldType::PositiveSmallInteger).default(json!(0)),
				FieldDefinition::new("concept", FieldType::PositiveSmallInteger),
				FieldDefinition::new("status", FieldType::PositiveSmallInteger).default(json!(0)),
				FieldDefinition::new("invoice", FieldType::Char(1200))
					.null(true)
					.blank(true),
				FieldDefinition::new("num_satoshis", FieldType::PositiveBigInteger).null(true),
				FieldDefinition::new("created_at", FieldType::DateTime),
			],
		)))
}
