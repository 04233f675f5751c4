//! Migration name suggestion

use super::{MigrationOperation, Operation};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W+").expect("valid regex"));

/// Names longer than this get `_and_more` instead of another fragment
const MAX_NAME_LENGTH: usize = 52;

/// Builds the descriptive part of a migration name from its operations
pub struct MigrationNamer;

impl MigrationNamer {
	/// Suggest a name for a migration made of `operations`
	///
	/// # Examples
	///
	/// ```rust
	/// use robosats_db::migrations::{AlterField, FieldDefinition, MigrationNamer, OnDelete, Operation};
	///
	/// let operations = vec![Operation::AlterField(AlterField::new(
	///     "lnpayment",
	///     FieldDefinition::foreign_key("order_donated", "api.order", OnDelete::SetNull).null(true),
	/// ))];
	///
	/// assert_eq!(
	///     MigrationNamer::suggest_name(&operations, false),
	///     "alter_lnpayment_order_donated"
	/// );
	/// assert_eq!(MigrationNamer::suggest_name(&operations, true), "initial");
	/// ```
	pub fn suggest_name(operations: &[Operation], initial: bool) -> String {
		Self::suggest_name_at(operations, initial, Utc::now())
	}

	/// Same as [`suggest_name`](Self::suggest_name) with a fixed clock for the
	/// `auto_` fallback
	pub fn suggest_name_at(operations: &[Operation], initial: bool, now: DateTime<Utc>) -> String {
		if initial {
			return "initial".to_string();
		}

		let fragments: Vec<String> = operations
			.iter()
			.filter_map(|operation| operation.migration_name_fragment())
			.map(|fragment| NON_WORD.replace_all(&fragment, "_").into_owned())
			.collect();
		if fragments.is_empty() || fragments.len() != operations.len() {
			return format!("auto_{}", now.format("%Y%m%d_%H%M"));
		}

		let mut name = fragments[0].clone();
		for fragment in &fragments[1..] {
			let candidate = format!("{}_{}", name, fragment);
			if candidate.len() > MAX_NAME_LENGTH {
				name.push_str("_and_more");
				break;
			}
			name = candidate;
		}
		name
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::migrations::{AddField, AlterField, FieldDefinition, FieldType, OnDelete};
	use chrono::TimeZone;
	use rstest::rstest;

	#[rstest]
	fn test_and_more_after_length_limit() {
		let operations = vec![
			Operation::AddField(AddField::new(
				"lnpayment",
				FieldDefinition::foreign_key("order_donated", "api.order", OnDelete::Cascade),
			)),
			Operation::AlterField(AlterField::new(
				"lnpayment",
				FieldDefinition::new("concept", FieldType::PositiveSmallInteger),
			)),
			Operation::AlterField(AlterField::new(
				"lnpayment",
				FieldDefinition::new("type", FieldType::PositiveSmallInteger),
			)),
		];

		assert_eq!(
			MigrationNamer::suggest_name(&operations, false),
			"lnpayment_order_donated_alter_lnpayment_concept_and_more"
		);
	}

	#[rstest]
	fn test_empty_operations_fall_back_to_timestamp() {
		let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 5, 0).unwrap();
		assert_eq!(
			MigrationNamer::suggest_name_at(&[], false, now),
			"auto_20240301_0905"
		);
	}
}
