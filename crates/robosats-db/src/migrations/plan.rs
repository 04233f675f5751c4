//! Migration execution plan

use super::graph::MigrationKey;
use std::fmt;

pub use robosats_conf::TransactionMode;

/// Whether a plan step applies or reverts its migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
	Forwards,
	Backwards,
}

/// One migration to run, and in which direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
	pub key: MigrationKey,
	pub direction: Direction,
}

impl PlanStep {
	pub fn forwards(key: MigrationKey) -> Self {
		Self {
			key,
			direction: Direction::Forwards,
		}
	}

	pub fn backwards(key: MigrationKey) -> Self {
		Self {
			key,
			direction: Direction::Backwards,
		}
	}

	pub fn is_backwards(&self) -> bool {
		self.direction == Direction::Backwards
	}
}

impl fmt::Display for PlanStep {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.direction {
			Direction::Forwards => write!(f, "Apply {}", self.key),
			Direction::Backwards => write!(f, "Unapply {}", self.key),
		}
	}
}

/// Migration execution plan
///
/// # Examples
///
/// ```rust
/// use robosats_db::migrations::{MigrationKey, MigrationPlan, PlanStep, TransactionMode};
///
/// let plan = MigrationPlan::new()
///     .with_transaction_mode(TransactionMode::PerMigration)
///     .with_step(PlanStep::forwards(MigrationKey::new("api", "0038_alter_lnpayment_order_donated")));
///
/// assert_eq!(plan.len(), 1);
/// assert_eq!(plan.steps[0].to_string(), "Apply api.0038_alter_lnpayment_order_donated");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationPlan {
	pub steps: Vec<PlanStep>,
	/// Transaction mode for execution
	pub transaction_mode: TransactionMode,
}

impl MigrationPlan {
	/// Create a new empty migration plan
	pub fn new() -> Self {
		Self::default()
	}

	/// Set transaction mode
	pub fn with_transaction_mode(mut self, mode: TransactionMode) -> Self {
		self.transaction_mode = mode;
		self
	}

	pub fn with_step(mut self, step: PlanStep) -> Self {
		self.steps.push(step);
		self
	}

	pub fn is_empty(&self) -> bool {
		self.steps.is_empty()
	}

	pub fn len(&self) -> usize {
		self.steps.len()
	}

	pub fn iter(&self) -> impl Iterator<Item = &PlanStep> {
		self.steps.iter()
	}
}
