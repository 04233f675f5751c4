//! `LNPayment.order_donated` becomes optional
//!
//! Deleting the donated order keeps the payment and clears the reference.

use robosats_db::migrations::prelude::*;
use serde_json::Value;

pub fn migration() -> Migration {
	Migration::new("0038_alter_lnpayment_order_donated", "api")
		.add_dependency(
			"api",
			"0037_lnpayment_order_donated_alter_lnpayment_concept_and_more",
		)
		.add_operation(Operation::AlterField(AlterField::new(
			"lnpayment",
			FieldDefinition::foreign_key("order_donated", "api.order", OnDelete::SetNull)
				.null(true)
				.blank(true)
				.default(Value::Null)
				.related_name("order_donated"),
		)))
}
