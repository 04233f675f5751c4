use robosats_db::migrations::prelude::*;
use serde_json::json;

pub fn migration() -> Migration {
	Migration::new(
		"0037_lnpayment_order_donated_alter_lnpayment_concept_and_more",
		"api",
	)
	.add_dependency("api", "0001_initial")
	.add_operation(Operation::AddField(
		AddField::new(
			"lnpayment",
			FieldDefinition::foreign_key("order_donated", "api.order", OnDelete::Cascade)
				.default(json!(1))
				.related_name("order_donated"),
		)
		.preserve_default(false),
	))
	.add_operation(Operation::AlterField(AlterField::new(
		"lnpayment",
		FieldDefinition::new("concept", FieldType::PositiveSmallInteger).default(json!(0)),
	)))
	.add_operation(Operation::AlterField(AlterField::new(
		"lnpayment",
		FieldDefinition::new("type", FieldType::PositiveSmallInteger).default(json!(1)),
	)))
}
