//! Field type definitions for migrations

use crate::backends::DatabaseType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents model field types
///
/// Column types follow the ones Django uses for the same field classes, so a
/// database migrated here reads the same as one migrated by `manage.py`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
	// Auto-incrementing primary keys
	AutoField,
	BigAutoField,

	// Integer types
	SmallInteger,
	Integer,
	BigInteger,
	PositiveSmallInteger,
	PositiveInteger,
	PositiveBigInteger,

	Boolean,

	// String types
	Char(u32),
	Text,

	Decimal {
		max_digits: u32,
		decimal_places: u32,
	},

	DateTime,
	Uuid,

	/// Column type comes from the primary key of the referenced model
	ForeignKey,
}

impl FieldType {
	/// Column type for this field in `db`
	///
	/// Returns `None` for [`FieldType::ForeignKey`], whose type is the
	/// [`rel_db_type`](Self::rel_db_type) of the referenced primary key.
	pub fn db_type(&self, db: DatabaseType) -> Option<String> {
		let sql = match (self, db) {
			(FieldType::AutoField, DatabaseType::Sqlite) => "integer".to_string(),
			(FieldType::AutoField, DatabaseType::Postgres) => "integer".to_string(),
			(FieldType::BigAutoField, DatabaseType::Sqlite) => "integer".to_string(),
			(FieldType::BigAutoField, DatabaseType::Postgres) => "bigint".to_string(),
			(FieldType::SmallInteger, _) => "smallint".to_string(),
			(FieldType::Integer, _) => "integer".to_string(),
			(FieldType::BigInteger, _) => "bigint".to_string(),
			(FieldType::PositiveSmallInteger, DatabaseType::Sqlite) => {
				"smallint unsigned".to_string()
			}
			(FieldType::PositiveSmallInteger, DatabaseType::Postgres) => "smallint".to_string(),
			(FieldType::PositiveInteger, DatabaseType::Sqlite) => "integer unsigned".to_string(),
			(FieldType::PositiveInteger, DatabaseType::Postgres) => "integer".to_string(),
			(FieldType::PositiveBigInteger, DatabaseType::Sqlite) => "bigint unsigned".to_string(),
			(FieldType::PositiveBigInteger, DatabaseType::Postgres) => "bigint".to_string(),
			(FieldType::Boolean, DatabaseType::Sqlite) => "bool".to_string(),
			(FieldType::Boolean, DatabaseType::Postgres) => "boolean".to_string(),
			(FieldType::Char(max_length), _) => format!("varchar({})", max_length),
			(FieldType::Text, _) => "text".to_string(),
			(FieldType::Decimal { .. }, DatabaseType::Sqlite) => "decimal".to_string(),
			(
				FieldType::Decimal {
					max_digits,
					decimal_places,
				},
				DatabaseType::Postgres,
			) => format!("numeric({}, {})", max_digits, decimal_places),
			(FieldType::DateTime, DatabaseType::Sqlite) => "datetime".to_string(),
			(FieldType::DateTime, DatabaseType::Postgres) => "timestamp with time zone".to_string(),
			(FieldType::Uuid, DatabaseType::Sqlite) => "char(32)".to_string(),
			(FieldType::Uuid, DatabaseType::Postgres) => "uuid".to_string(),
			(FieldType::ForeignKey, _) => return None,
		};
		Some(sql)
	}

	/// Column type of a foreign key pointing at a primary key of this type
	///
	/// # Examples
	///
	/// ```
	/// use robosats_db::backends::DatabaseType;
	/// use robosats_db::migrations::FieldType;
	///
	/// assert_eq!(FieldType::BigAutoField.rel_db_type(DatabaseType::Sqlite).unwrap(), "bigint");
	/// assert_eq!(FieldType::Uuid.rel_db_type(DatabaseType::Sqlite).unwrap(), "char(32)");
	/// ```
	pub fn rel_db_type(&self, db: DatabaseType) -> Option<String> {
		match self {
			FieldType::AutoField => FieldType::Integer.db_type(db),
			FieldType::BigAutoField => FieldType::BigInteger.db_type(db),
			FieldType::PositiveSmallInteger => FieldType::SmallInteger.db_type(db),
			FieldType::PositiveInteger => FieldType::Integer.db_type(db),
			FieldType::PositiveBigInteger => FieldType::BigInteger.db_type(db),
			other => other.db_type(db),
		}
	}

	/// Trailing clause for auto-incrementing primary keys
	pub fn db_type_suffix(&self, db: DatabaseType) -> Option<&'static str> {
		match (self, db) {
			(FieldType::AutoField | FieldType::BigAutoField, DatabaseType::Sqlite) => {
				Some("AUTOINCREMENT")
			}
			(FieldType::AutoField | FieldType::BigAutoField, DatabaseType::Postgres) => {
				Some("GENERATED BY DEFAULT AS IDENTITY")
			}
			_ => None,
		}
	}

	/// `CHECK` expression for positive integer types, given the quoted column
	pub fn check_constraint(&self, quoted_column: &str) -> Option<String> {
		match self {
			FieldType::PositiveSmallInteger
			| FieldType::PositiveInteger
			| FieldType::PositiveBigInteger => Some(format!("{} >= 0", quoted_column)),
			_ => None,
		}
	}

	pub fn is_auto(&self) -> bool {
		matches!(self, FieldType::AutoField | FieldType::BigAutoField)
	}

	pub fn is_relation(&self) -> bool {
		matches!(self, FieldType::ForeignKey)
	}

	/// Value used to fill existing rows when a `NOT NULL` column without a
	/// default is added
	pub fn empty_default_sql(&self, db: DatabaseType) -> Option<String> {
		match self {
			FieldType::SmallInteger
			| FieldType::Integer
			| FieldType::BigInteger
			| FieldType::PositiveSmallInteger
			| FieldType::PositiveInteger
			| FieldType::PositiveBigInteger
			| FieldType::Decimal { .. } => Some("0".to_string()),
			FieldType::Boolean => Some(match db {
				DatabaseType::Sqlite => "0".to_string(),
				DatabaseType::Postgres => "false".to_string(),
			}),
			FieldType::Char(_) | FieldType::Text => Some("''".to_string()),
			_ => None,
		}
	}
}

/// Referential action for foreign key constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForeignKeyAction {
	Cascade,
	SetNull,
	Restrict,
	SetDefault,
	NoAction,
}

impl ForeignKeyAction {
	/// Convert to SQL keyword
	pub fn to_sql_keyword(&self) -> &'static str {
		match self {
			ForeignKeyAction::Cascade => "CASCADE",
			ForeignKeyAction::SetNull => "SET NULL",
			ForeignKeyAction::Restrict => "RESTRICT",
			ForeignKeyAction::SetDefault => "SET DEFAULT",
			ForeignKeyAction::NoAction => "NO ACTION",
		}
	}

	/// Parse the keyword reported by `PRAGMA foreign_key_list`
	pub fn from_sql_keyword(keyword: &str) -> Option<Self> {
		match keyword.trim().to_ascii_uppercase().as_str() {
			"CASCADE" => Some(ForeignKeyAction::Cascade),
			"SET NULL" => Some(ForeignKeyAction::SetNull),
			"RESTRICT" => Some(ForeignKeyAction::Restrict),
			"SET DEFAULT" => Some(ForeignKeyAction::SetDefault),
			"NO ACTION" => Some(ForeignKeyAction::NoAction),
			_ => None,
		}
	}

	/// Parse `pg_constraint.confdeltype`
	pub fn from_pg_code(code: &str) -> Option<Self> {
		match code {
			"c" => Some(ForeignKeyAction::Cascade),
			"n" => Some(ForeignKeyAction::SetNull),
			"r" => Some(ForeignKeyAction::Restrict),
			"d" => Some(ForeignKeyAction::SetDefault),
			"a" => Some(ForeignKeyAction::NoAction),
			_ => None,
		}
	}
}

impl fmt::Display for ForeignKeyAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.to_sql_keyword())
	}
}

/// Deletion policy of a foreign key, named like Django's `on_delete` handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnDelete {
	Cascade,
	SetNull,
	Protect,
	Restrict,
	SetDefault,
	DoNothing,
}

impl OnDelete {
	/// Database action enforcing this policy
	///
	/// # Examples
	///
	/// ```
	/// use robosats_db::migrations::{ForeignKeyAction, OnDelete};
	///
	/// assert_eq!(OnDelete::SetNull.foreign_key_action(), ForeignKeyAction::SetNull);
	/// assert_eq!(OnDelete::Protect.foreign_key_action(), ForeignKeyAction::Restrict);
	/// ```
	pub fn foreign_key_action(&self) -> ForeignKeyAction {
		match self {
			OnDelete::Cascade => ForeignKeyAction::Cascade,
			OnDelete::SetNull => ForeignKeyAction::SetNull,
			OnDelete::Protect | OnDelete::Restrict => ForeignKeyAction::Restrict,
			OnDelete::SetDefault => ForeignKeyAction::SetDefault,
			OnDelete::DoNothing => ForeignKeyAction::NoAction,
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			OnDelete::Cascade => "CASCADE",
			OnDelete::SetNull => "SET_NULL",
			OnDelete::Protect => "PROTECT",
			OnDelete::Restrict => "RESTRICT",
			OnDelete::SetDefault => "SET_DEFAULT",
			OnDelete::DoNothing => "DO_NOTHING",
		}
	}
}

impl From<OnDelete> for ForeignKeyAction {
	fn from(on_delete: OnDelete) -> Self {
		on_delete.foreign_key_action()
	}
}

impl fmt::Display for OnDelete {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}
