//! Migration dependency graph
//!
//! Edges point from a dependency to the migration depending on it, so a
//! topological order is an order in which migrations can be applied. Ties are
//! broken by `(app_label, name)`, which keeps plans stable across runs.

use super::state::ProjectState;
use super::{Migration, MigrationError, Result};
use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

/// `(app_label, name)` identity of a migration
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MigrationKey {
	pub app_label: String,
	pub name: String,
}

impl MigrationKey {
	pub fn new(app_label: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			app_label: app_label.into(),
			name: name.into(),
		}
	}
}

impl fmt::Display for MigrationKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}", self.app_label, self.name)
	}
}

/// Directed acyclic graph of loaded migrations
#[derive(Debug, Default)]
pub struct MigrationGraph {
	graph: DiGraph<MigrationKey, ()>,
	nodes: HashMap<MigrationKey, NodeIndex>,
	migrations: BTreeMap<MigrationKey, Migration>,
	/// Dependencies naming a migration that is not loaded, per dependent
	missing: BTreeMap<MigrationKey, BTreeSet<MigrationKey>>,
}

impl MigrationGraph {
	pub fn new() -> Self {
		Self::default()
	}

	/// Build a graph from a set of migrations
	///
	/// # Examples
	///
	/// ```rust
	/// use robosats_db::migrations::{Migration, MigrationGraph, MigrationKey};
	///
	/// let graph = MigrationGraph::from_migrations(vec![
	///     Migration::new("0002_b", "api").add_dependency("api", "0001_a"),
	///     Migration::new("0001_a", "api"),
	/// ])
	/// .unwrap();
	///
	/// assert_eq!(
	///     graph.topological_order().unwrap(),
	///     vec![MigrationKey::new("api", "0001_a"), MigrationKey::new("api", "0002_b")]
	/// );
	/// ```
	pub fn from_migrations(migrations: impl IntoIterator<Item = Migration>) -> Result<Self> {
		let mut graph = Self::new();
		for migration in migrations {
			graph.add_migration(migration)?;
		}
		Ok(graph)
	}

	/// Insert a migration, linking it to whatever dependencies are already known
	pub fn add_migration(&mut self, migration: Migration) -> Result<()> {
		let key = migration.key();
		if self.nodes.contains_key(&key) {
			return Err(MigrationError::DuplicateMigration(key.to_string()));
		}

		let index = self.graph.add_node(key.clone());
		self.nodes.insert(key.clone(), index);

		let mut waiting = Vec::new();
		for (dependent, deps) in self.missing.iter_mut() {
			if deps.remove(&key) {
				waiting.push(dependent.clone());
			}
		}
		self.missing.retain(|_, deps| !deps.is_empty());
		for dependent in waiting {
			if let Some(&dependent_index) = self.nodes.get(&dependent) {
				self.graph.update_edge(index, dependent_index, ());
			}
		}

		for dependency in migration.dependency_keys() {
			match self.nodes.get(&dependency) {
				Some(&dependency_index) => {
					self.graph.update_edge(dependency_index, index, ());
				}
				None => {
					self.missing
						.entry(key.clone())
						.or_default()
						.insert(dependency);
				}
			}
		}

		self.migrations.insert(key, migration);
		Ok(())
	}

	/// `(dependent, dependency)` pairs whose dependency is not loaded
	pub fn missing_dependencies(&self) -> Vec<(MigrationKey, MigrationKey)> {
		self.missing
			.iter()
			.flat_map(|(dependent, deps)| {
				deps.iter()
					.map(move |dependency| (dependent.clone(), dependency.clone()))
			})
			.collect()
	}

	pub fn migration(&self, key: &MigrationKey) -> Option<&Migration> {
		self.migrations.get(key)
	}

	pub fn contains(&self, key: &MigrationKey) -> bool {
		self.nodes.contains_key(key)
	}

	pub fn migrations(&self) -> impl Iterator<Item = &Migration> {
		self.migrations.values()
	}

	pub fn len(&self) -> usize {
		self.migrations.len()
	}

	pub fn is_empty(&self) -> bool {
		self.migrations.is_empty()
	}

	pub fn app_labels(&self) -> BTreeSet<String> {
		self.migrations
			.keys()
			.map(|key| key.app_label.clone())
			.collect()
	}

	/// Migrations of `app_label` no other migration of the same app depends on
	pub fn leaf_nodes(&self, app_label: &str) -> Vec<MigrationKey> {
		self.app_nodes_without(app_label, Direction::Outgoing)
	}

	/// Migrations of `app_label` depending on no other migration of the same app
	pub fn root_nodes(&self, app_label: &str) -> Vec<MigrationKey> {
		self.app_nodes_without(app_label, Direction::Incoming)
	}

	fn app_nodes_without(&self, app_label: &str, direction: Direction) -> Vec<MigrationKey> {
		self.migrations
			.keys()
			.filter(|key| key.app_label == app_label)
			.filter(|key| {
				let index = self.nodes[*key];
				!self
					.graph
					.neighbors_directed(index, direction)
					.any(|other| self.graph[other].app_label == app_label)
			})
			.cloned()
			.collect()
	}

	/// Migrations depending directly on `key`, sorted
	pub fn dependents(&self, key: &MigrationKey) -> Vec<MigrationKey> {
		let Some(&index) = self.nodes.get(key) else {
			return Vec::new();
		};
		let mut dependents: Vec<MigrationKey> = self
			.graph
			.neighbors_directed(index, Direction::Outgoing)
			.map(|node| self.graph[node].clone())
			.collect();
		dependents.sort();
		dependents
	}

	/// Fail with the first dependency cycle found
	pub fn check_cycles(&self) -> Result<()> {
		for component in tarjan_scc(&self.graph) {
			let cyclic = component.len() > 1
				|| self.graph.contains_edge(component[0], component[0]);
			if cyclic {
				return Err(MigrationError::CircularDependency {
					cycle: self.describe_cycle(&component),
				});
			}
		}
		Ok(())
	}

	/// Walk a strongly connected component until a node repeats
	fn describe_cycle(&self, component: &[NodeIndex]) -> String {
		let members: HashSet<NodeIndex> = component.iter().copied().collect();
		let Some(mut current) = component
			.iter()
			.copied()
			.min_by(|a, b| self.graph[*a].cmp(&self.graph[*b]))
		else {
			return String::new();
		};

		let mut path = vec![current];
		loop {
			let next = self
				.graph
				.neighbors_directed(current, Direction::Outgoing)
				.filter(|node| members.contains(node))
				.min_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
			let Some(next) = next else {
				break;
			};
			if let Some(position) = path.iter().position(|node| *node == next) {
				let mut cycle: Vec<String> = path[position..]
					.iter()
					.map(|node| self.graph[*node].to_string())
					.collect();
				cycle.push(self.graph[next].to_string());
				return cycle.join(" -> ");
			}
			path.push(next);
			current = next;
		}

		path.iter()
			.map(|node| self.graph[*node].to_string())
			.collect::<Vec<_>>()
			.join(" -> ")
	}

	/// Every migration, dependencies first, ties broken by key
	pub fn topological_order(&self) -> Result<Vec<MigrationKey>> {
		self.check_cycles()?;

		let mut in_degree: HashMap<NodeIndex, usize> = self
			.graph
			.node_indices()
			.map(|index| {
				(
					index,
					self.graph
						.neighbors_directed(index, Direction::Incoming)
						.count(),
				)
			})
			.collect();

		let mut ready: BTreeSet<(MigrationKey, NodeIndex)> = in_degree
			.iter()
			.filter(|(_, degree)| **degree == 0)
			.map(|(index, _)| (self.graph[*index].clone(), *index))
			.collect();

		let mut order = Vec::with_capacity(self.graph.node_count());
		while let Some((key, index)) = ready.pop_first() {
			order.push(key);
			for next in self.graph.neighbors_directed(index, Direction::Outgoing) {
				if let Some(degree) = in_degree.get_mut(&next) {
					*degree -= 1;
					if *degree == 0 {
						ready.insert((self.graph[next].clone(), next));
					}
				}
			}
		}

		if order.len() != self.graph.node_count() {
			return Err(MigrationError::CircularDependency {
				cycle: "unresolved nodes remain after sorting".to_string(),
			});
		}
		Ok(order)
	}

	fn node(&self, key: &MigrationKey) -> Result<NodeIndex> {
		self.nodes
			.get(key)
			.copied()
			.ok_or_else(|| MigrationError::NodeNotFound {
				message: "migration is not loaded".to_string(),
				node: key.to_string(),
			})
	}

	fn reachable(&self, start: NodeIndex, direction: Direction) -> HashSet<NodeIndex> {
		let mut seen = HashSet::from([start]);
		let mut stack = vec![start];
		while let Some(index) = stack.pop() {
			for next in self.graph.neighbors_directed(index, direction) {
				if seen.insert(next) {
					stack.push(next);
				}
			}
		}
		seen
	}

	/// `target` and everything it depends on, in application order
	pub fn forwards_plan(&self, target: &MigrationKey) -> Result<Vec<MigrationKey>> {
		let ancestors = self.reachable(self.node(target)?, Direction::Incoming);
		Ok(self
			.topological_order()?
			.into_iter()
			.filter(|key| ancestors.contains(&self.nodes[key]))
			.collect())
	}

	/// `target` and everything depending on it, in reverse application order
	pub fn backwards_plan(&self, target: &MigrationKey) -> Result<Vec<MigrationKey>> {
		let descendants = self.reachable(self.node(target)?, Direction::Outgoing);
		let mut plan: Vec<MigrationKey> = self
			.topological_order()?
			.into_iter()
			.filter(|key| descendants.contains(&self.nodes[key]))
			.collect();
		plan.reverse();
		Ok(plan)
	}

	/// Replay the migrations accepted by `include`, in topological order
	pub fn project_state(&self, include: impl Fn(&MigrationKey) -> bool) -> Result<ProjectState> {
		let mut state = ProjectState::new();
		for key in self.topological_order()? {
			if include(&key) {
				if let Some(migration) = self.migrations.get(&key) {
					migration.apply_to_state(&mut state)?;
				}
			}
		}
		Ok(state)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	fn key(app_label: &str, name: &str) -> MigrationKey {
		MigrationKey::new(app_label, name)
	}

	#[rstest]
	fn test_ties_are_broken_by_key() {
		let graph = MigrationGraph::from_migrations(vec![
			Migration::new("0001_initial", "control"),
			Migration::new("0001_initial", "api"),
			Migration::new("0002_b", "api").add_dependency("api", "0001_initial"),
		])
		.unwrap();

		assert_eq!(
			graph.topological_order().unwrap(),
			vec![
				key("api", "0001_initial"),
				key("api", "0002_b"),
				key("control", "0001_initial"),
			]
		);
	}

	#[rstest]
	fn test_dependency_loaded_later_is_linked() {
		let mut graph = MigrationGraph::new();
		graph
			.add_migration(Migration::new("0002_b", "api").add_dependency("api", "0001_a"))
			.unwrap();
		assert_eq!(graph.missing_dependencies().len(), 1);

		graph.add_migration(Migration::new("0001_a", "api")).unwrap();
		assert!(graph.missing_dependencies().is_empty());
		assert_eq!(graph.topological_order().unwrap()[0], key("api", "0001_a"));
	}

	#[rstest]
	fn test_cycle_is_reported() {
		let graph = MigrationGraph::from_migrations(vec![
			Migration::new("0001_a", "api").add_dependency("control", "0001_b"),
			Migration::new("0001_b", "control").add_dependency("api", "0001_a"),
		])
		.unwrap();

		match graph.topological_order() {
			Err(MigrationError::CircularDependency { cycle }) => {
				assert_eq!(cycle, "api.0001_a -> control.0001_b -> api.0001_a");
			}
			other => panic!("expected a cycle, got {:?}", other),
		}
	}

	#[rstest]
	fn test_duplicate_is_rejected() {
		let result = MigrationGraph::from_migrations(vec![
			Migration::new("0001_a", "api"),
			Migration::new("0001_a", "api"),
		]);
		assert!(matches!(result, Err(MigrationError::DuplicateMigration(_))));
	}

	#[rstest]
	fn test_plans_and_leaves() {
		let graph = MigrationGraph::from_migrations(vec![
			Migration::new("0001_a", "api"),
			Migration::new("0002_b", "api").add_dependency("api", "0001_a"),
			Migration::new("0003_c", "api").add_dependency("api", "0002_b"),
		])
		.unwrap();

		assert_eq!(
			graph.forwards_plan(&key("api", "0002_b")).unwrap(),
			vec![key("api", "0001_a"), key("api", "0002_b")]
		);
		assert_eq!(
			graph.backwards_plan(&key("api", "0002_b")).unwrap(),
			vec![key("api", "0003_c"), key("api", "0002_b")]
		);
		assert_eq!(graph.leaf_nodes("api"), vec![key("api", "0003_c")]);
		assert_eq!(graph.root_nodes("api"), vec![key("api", "0001_a")]);
		assert!(matches!(
			graph.forwards_plan(&key("api", "0009_missing")),
			Err(MigrationError::NodeNotFound { .. })
		));
	}
}
