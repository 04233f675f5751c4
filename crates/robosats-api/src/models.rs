//! Current model declarations of the `api` app
//!
//! Only the fields that take part in the schema are described. The
//! autodetector diffs [`current_state`] against the state built from
//! [`ApiMigrations`](crate::ApiMigrations); the two must agree once every
//! migration is written.

use robosats_db::migrations::{
	FieldDefinition, FieldType, ModelState, OnDelete, ProjectState,
};
use serde_json::{Value, json};

pub const APP_LABEL: &str = "api";

// The enums below mirror the application's integer choices in full; the
// schema only reads their defaults.

/// Lightning invoice kinds stored in `LNPayment.type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum PaymentType {
	Norm = 0,
	Hold = 1,
}

/// What an `LNPayment` is for, stored in `LNPayment.concept`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Concept {
	MakerBond = 0,
	TakerBond = 1,
	TradeEscrow = 2,
	PayBuyer = 3,
	WithdrawReward = 4,
}

/// Status of an `Order`; new orders start as `Waiting for maker bond`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum OrderStatus {
	WaitingForMakerBond = 0,
	Public = 1,
	Paused = 2,
	WaitingForTakerBond = 3,
	Cancelled = 4,
	Expired = 5,
}

impl PaymentType {
	pub fn as_value(self) -> Value {
		json!(self as u16)
	}
}

impl Concept {
	pub fn as_value(self) -> Value {
		json!(self as u16)
	}
}

impl OrderStatus {
	pub fn as_value(self) -> Value {
		json!(self as u16)
	}
}

pub fn order() -> ModelState {
	ModelState::new(APP_LABEL, "Order")
		.with_field(FieldDefinition::new("id", FieldType::BigAutoField).primary_key())
		.with_field(
			FieldDefinition::new("status", FieldType::PositiveSmallInteger)
				.default(OrderStatus::WaitingForMakerBond.as_value()),
		)
		.with_field(FieldDefinition::new("type", FieldType::PositiveSmallInteger))
		.with_field(
			FieldDefinition::new(
				"amount",
				FieldType::Decimal {
					max_digits: 18,
					decimal_places: 8,
				},
			)
			.null(true)
			.blank(true),
		)
		.with_field(FieldDefinition::new("created_at", FieldType::DateTime))
		.with_field(FieldDefinition::new("expires_at", FieldType::DateTime))
}

pub fn lnpayment() -> ModelState {
	ModelState::new(APP_LABEL, "LNPayment")
		.with_field(FieldDefinition::new("id", FieldType::Uuid).primary_key())
		.with_field(
			FieldDefinition::new("type", FieldType::PositiveSmallInteger)
				.default(PaymentType::Hold.as_value()),
		)
		.with_field(
			FieldDefinition::new("concept", FieldType::PositiveSmallInteger)
				.default(Concept::MakerBond.as_value()),
		)
		.with_field(FieldDefinition::new("status", FieldType::PositiveSmallInteger).default(json!(0)))
		.with_field(
			FieldDefinition::new("invoice", FieldType::Char(1200))
				.null(true)
				.blank(true),
		)
		.with_field(FieldDefinition::new("num_satoshis", FieldType::PositiveBigInteger).null(true))
		.with_field(FieldDefinition::new("created_at", FieldType::DateTime))
		.with_field(
			FieldDefinition::foreign_key("order_donated", "api.order", OnDelete::SetNull)
				.null(true)
				.blank(true)
				.default(Value::Null)
				.related_name("order_donated"),
		)
}

/// Models as the application declares them today
pub fn current_state() -> ProjectState {
	let mut state = ProjectState::new();
	state.add_model(order());
	state.add_model(lnpayment());
	state
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_order_donated_may_be_null() {
		let model = lnpayment();
		let field = model.get_field("order_donated").unwrap();

		assert!(field.null);
		assert!(field.blank);
		assert_eq!(field.on_delete(), Some(OnDelete::SetNull));
		assert_eq!(field.column(), "order_donated_id");
		assert!(field.check().is_ok());
	}

	#[rstest]
	#[case(PaymentType::Norm.as_value(), 0)]
	#[case(PaymentType::Hold.as_value(), 1)]
	#[case(Concept::PayBuyer.as_value(), 3)]
	#[case(Concept::WithdrawReward.as_value(), 4)]
	#[case(OrderStatus::Public.as_value(), 1)]
	#[case(OrderStatus::Expired.as_value(), 5)]
	fn test_choices_are_stored_as_integers(#[case] value: Value, #[case] stored: u64) {
		assert_eq!(value.as_u64(), Some(stored));
	}

	#[rstest]
	fn test_tables() {
		let state = current_state();
		let tables: Vec<String> = state
			.models_for_app(APP_LABEL)
			.map(|model| model.table_name())
			.collect();

		assert_eq!(tables, vec!["api_lnpayment", "api_order"]);
	}
}
