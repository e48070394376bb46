use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Index of a node inside a `SequenceCounter` arena.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// A single trie vertex.
///
/// A `FrequencyNode` stands for the word sequence spelled by the path from
/// its sub-trie root, and stores how many times that sequence was inserted.
/// Children are referenced by arena index, the arena itself being owned by
/// the `SequenceCounter`.
///
/// ## Invariants
/// - A child is referenced by exactly one parent
/// - A node's count is at least the count of each of its children
///   (for non-negative increments)
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct FrequencyNode {
	/// Number of insertions that ended at, or passed through, this node.
	count: u64,
	/// Outgoing edges indexed by the next word.
	children: HashMap<String, NodeId>,
}

impl FrequencyNode {
	/// Creates a childless node holding `count`.
	pub fn new(count: u64) -> Self {
		Self { count, children: HashMap::new() }
	}

	pub fn count(&self) -> u64 {
		self.count
	}

	pub fn set_count(&mut self, count: u64) {
		self.count = count;
	}

	/// True when no sequence was ever extended past this node.
	pub fn is_leaf(&self) -> bool {
		self.children.is_empty()
	}

	/// Child reached by `word`, if any.
	pub fn child(&self, word: &str) -> Option<NodeId> {
		self.children.get(word).copied()
	}

	/// Number of distinct words observed after this node.
	pub fn num_children(&self) -> usize {
		self.children.len()
	}

	/// Iterates over `(word, child)` edges in arbitrary order.
	pub fn children(&self) -> impl Iterator<Item = (&str, NodeId)> {
		self.children.iter().map(|(word, id)| (word.as_str(), *id))
	}

	pub(crate) fn add_child(&mut self, word: &str, id: NodeId) {
		self.children.insert(word.to_owned(), id);
	}
}
