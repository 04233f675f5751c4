//! Migration registry
//!
//! Apps hand their migrations to a registry through a
//! [`MigrationProvider`](super::MigrationProvider); the commands then read the
//! full set from it. A [`LocalRegistry`] is an owned instance, so tests can
//! build isolated registries.

use super::{Migration, MigrationError, MigrationProvider, Result};
use parking_lot::RwLock;

/// Storage for loaded migrations
pub trait MigrationRegistry: Send + Sync {
	/// Add a migration; a second migration with the same key is rejected
	fn register(&self, migration: Migration) -> Result<()>;

	/// Every registered migration, in registration order
	fn all_migrations(&self) -> Vec<Migration>;

	fn migrations_for_app(&self, app_label: &str) -> Vec<Migration> {
		self.all_migrations()
			.into_iter()
			.filter(|migration| migration.app_label == app_label)
			.collect()
	}

	fn clear(&self);
}

/// In-process registry
///
/// # Examples
///
/// ```rust
/// use robosats_db::migrations::{LocalRegistry, Migration, MigrationRegistry};
///
/// let registry = LocalRegistry::new();
/// registry.register(Migration::new("0001_initial", "api")).unwrap();
///
/// assert_eq!(registry.all_migrations().len(), 1);
/// assert!(registry.register(Migration::new("0001_initial", "api")).is_err());
/// ```
#[derive(Debug, Default)]
pub struct LocalRegistry {
	migrations: RwLock<Vec<Migration>>,
}

impl LocalRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register every migration of a provider
	pub fn register_provider<P: MigrationProvider>(&self) -> Result<()> {
		for migration in P::migrations() {
			self.register(migration)?;
		}
		Ok(())
	}

	pub fn len(&self) -> usize {
		self.migrations.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.migrations.read().is_empty()
	}
}

impl MigrationRegistry for LocalRegistry {
	fn register(&self, migration: Migration) -> Result<()> {
		let mut migrations = self.migrations.write();
		if migrations
			.iter()
			.any(|existing| existing.app_label == migration.app_label && existing.name == migration.name)
		{
			return Err(MigrationError::DuplicateMigration(migration.id()));
		}
		migrations.push(migration);
		Ok(())
	}

	fn all_migrations(&self) -> Vec<Migration> {
		self.migrations.read().clone()
	}

	fn clear(&self) {
		self.migrations.write().clear();
	}
}
