use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::frequency_node::{FrequencyNode, NodeId};
use crate::error::{ModelError, Result};

/// Key selecting the sub-trie a sequence lives in.
pub type RootKey = i32;

/// Discriminator shared by empty words, spaces and every word whose leading
/// character is neither an ASCII digit nor an ASCII letter.
pub const DEFAULT_ROOT: RootKey = -1;

/// Computes the sub-trie discriminator of a sequence's first word.
///
/// - `'0'..='9'` → `0..=9`
/// - ASCII letters, case-insensitive → `10..=35`
/// - anything else → `DEFAULT_ROOT`
///
/// Insertion and lookup must agree on this function, otherwise stored paths
/// become unreachable.
pub fn discriminator(word: &str) -> RootKey {
	word.chars()
		.next()
		.filter(char::is_ascii_alphanumeric)
		.and_then(|c| c.to_digit(36))
		.map_or(DEFAULT_ROOT, |digit| digit as RootKey)
}

/// Validates a `[start, end)` window over a sequence of `len` words.
///
/// `start == end` is accepted, including `start == end == len`. Callers that
/// turn an empty window into a single-word probe apply the stricter check in
/// `probe`.
///
/// # Errors
/// - `InvalidRange` if `end < start`
/// - `StartOutOfBounds` if `end > len` and `start` is past the last word
/// - `EndOutOfBounds` if `end > len` otherwise
pub fn check_range(len: usize, start: usize, end: usize) -> Result<()> {
	if end < start {
		return Err(ModelError::InvalidRange { start, end });
	}
	if end <= len {
		return Ok(());
	}
	if start >= len {
		return Err(ModelError::StartOutOfBounds { start, len });
	}
	Err(ModelError::EndOutOfBounds { end, len })
}

/// Forest of word tries counting how often each word sequence was inserted.
///
/// Each inserted sequence is stored in the sub-trie selected by the
/// discriminator of its first word. The split only bounds the fan-out of
/// the roots: lookups behave as if there were a single root.
///
/// All nodes live in one arena (`nodes`); roots and edges refer to them by
/// `NodeId`.
///
/// # Invariants
/// - `roots` always holds `DEFAULT_ROOT`
/// - Every `NodeId` stored in `roots` or in a node's children is a valid
///   arena index, and every node has at most one parent
/// - For each inserted `[w0..wk]` the path root(w0) → w0 → ... → wk exists
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SequenceCounter {
	/// Longest sequence the counter is sized for (informational only).
	max_length: usize,
	/// Sub-trie roots, one per discriminator.
	roots: BTreeMap<RootKey, NodeId>,
	/// Node arena.
	nodes: Vec<FrequencyNode>,
}

/// Borrowed view of a node, able to look at its children.
#[derive(Clone, Copy, Debug)]
pub struct NodeRef<'a> {
	counter: &'a SequenceCounter,
	id: NodeId,
}

impl<'a> NodeRef<'a> {
	pub fn node(&self) -> &'a FrequencyNode {
		self.counter.node(self.id)
	}

	pub fn count(&self) -> u64 {
		self.node().count()
	}

	pub fn is_leaf(&self) -> bool {
		self.node().is_leaf()
	}

	/// Number of distinct words observed after this node.
	pub fn num_children(&self) -> usize {
		self.node().num_children()
	}

	/// Sum of the counts of all direct children, `0` for a leaf.
	///
	/// This is the total number of one-word extensions observed after the
	/// sequence ending at this node. Saturates at `u64::MAX`, like the
	/// counts themselves.
	pub fn context_count(&self) -> u64 {
		self.node()
			.children()
			.map(|(_, child)| self.counter.node(child).count())
			.fold(0u64, |total, count| total.saturating_add(count))
	}

	/// Child reached by `word`, if any.
	pub fn child(&self, word: &str) -> Option<NodeRef<'a>> {
		self.node().child(word).map(|id| NodeRef { counter: self.counter, id })
	}

	/// Iterates over `(word, child)` pairs in arbitrary order.
	pub fn children(&self) -> impl Iterator<Item = (&'a str, NodeRef<'a>)> + 'a {
		let counter = self.counter;
		self.node()
			.children()
			.map(move |(word, id)| (word, NodeRef { counter, id }))
	}
}

impl SequenceCounter {
	/// Creates an empty counter with only the default root.
	pub fn new(max_length: usize) -> Self {
		let mut counter = Self { max_length, roots: BTreeMap::new(), nodes: Vec::new() };
		counter.root_or_insert(DEFAULT_ROOT);
		counter
	}

	pub fn max_length(&self) -> usize {
		self.max_length
	}

	/// Number of sub-trie roots, the default one included.
	pub fn root_count(&self) -> usize {
		self.roots.len()
	}

	/// Number of word nodes (roots excluded).
	pub fn node_count(&self) -> usize {
		self.nodes.len() - self.roots.len()
	}

	/// True until a non-empty sequence is inserted.
	pub fn is_empty(&self) -> bool {
		self.node_count() == 0
	}

	/// Discriminators that currently own a sub-trie, in ascending order.
	pub fn root_keys(&self) -> impl Iterator<Item = RootKey> + '_ {
		self.roots.keys().copied()
	}

	/// Root of the sub-trie selected by `key`, without creating it.
	pub fn root(&self, key: RootKey) -> Option<NodeRef<'_>> {
		self.roots.get(&key).map(|&id| NodeRef { counter: self, id })
	}

	fn node(&self, id: NodeId) -> &FrequencyNode {
		&self.nodes[id.0]
	}

	fn push_node(&mut self, node: FrequencyNode) -> NodeId {
		self.nodes.push(node);
		NodeId(self.nodes.len() - 1)
	}

	fn root_or_insert(&mut self, key: RootKey) -> NodeId {
		if let Some(&id) = self.roots.get(&key) {
			return id;
		}
		let id = self.push_node(FrequencyNode::default());
		self.roots.insert(key, id);
		id
	}

	/// Returns the child of `parent` reached by `word`, adding `increment` to
	/// its count, or creating it with `increment` as initial count.
	fn bump_child(&mut self, parent: NodeId, word: &str, increment: u64) -> NodeId {
		match self.node(parent).child(word) {
			Some(child) => {
				let node = &mut self.nodes[child.0];
				node.set_count(node.count().saturating_add(increment));
				child
			}
			None => {
				let child = self.push_node(FrequencyNode::new(increment));
				self.nodes[parent.0].add_child(word, child);
				child
			}
		}
	}

	/// Records one occurrence (weighted by `increment`) of `sequence`.
	///
	/// Every node on the path from the root to the last word is incremented,
	/// so each prefix of `sequence` is counted too. Missing nodes are created
	/// on the way. An empty sequence is ignored.
	pub fn insert<S: AsRef<str>>(&mut self, sequence: &[S], increment: u64) {
		let Some(first) = sequence.first() else {
			return;
		};
		let mut node = self.root_or_insert(discriminator(first.as_ref()));
		for word in sequence {
			node = self.bump_child(node, word.as_ref(), increment);
		}
		trace!(len = sequence.len(), increment, "inserted sequence");
	}

	/// Walks the exact path spelled by `sequence`.
	///
	/// Never creates nodes. Returns `None` for an empty sequence, when the
	/// first word's sub-trie does not exist, or when any step is missing.
	pub fn navigate<S: AsRef<str>>(&self, sequence: &[S]) -> Option<NodeRef<'_>> {
		let first = sequence.first()?;
		let mut node = self.root(discriminator(first.as_ref()))?;
		for word in sequence {
			node = node.child(word.as_ref())?;
		}
		Some(node)
	}

	/// Slice used by the single-word-probe queries: the word at `start` when
	/// the window is empty, `sequence[start..end]` otherwise.
	fn probe<S>(sequence: &[S], start: usize, end: usize) -> Result<&[S]> {
		check_range(sequence.len(), start, end)?;
		if start != end {
			return Ok(&sequence[start..end]);
		}
		if start >= sequence.len() {
			return Err(ModelError::StartOutOfBounds { start, len: sequence.len() });
		}
		Ok(&sequence[start..=start])
	}

	/// Number of times `sequence` was inserted (as a whole or as a prefix).
	///
	/// Returns `0` for an unseen sequence.
	pub fn count<S: AsRef<str>>(&self, sequence: &[S]) -> u64 {
		self.navigate(sequence).map_or(0, |node| node.count())
	}

	/// `count` of `sequence[start..end]`.
	///
	/// # Errors
	/// Bounds violation if the window is invalid (see `check_range`).
	pub fn count_range<S: AsRef<str>>(&self, sequence: &[S], start: usize, end: usize) -> Result<u64> {
		check_range(sequence.len(), start, end)?;
		Ok(self.count(&sequence[start..end]))
	}

	/// Total number of one-word continuations observed after the probe
	/// sequence (the single word at `start` when `start == end`).
	///
	/// Returns `0` when the probe sequence is unseen.
	///
	/// # Errors
	/// Bounds violation if the window is invalid, or if `start == end` does
	/// not address a word.
	pub fn context_count<S: AsRef<str>>(&self, sequence: &[S], start: usize, end: usize) -> Result<u64> {
		let probe = Self::probe(sequence, start, end)?;
		Ok(self.navigate(probe).map_or(0, |node| node.context_count()))
	}

	/// Number of distinct words observed after `sequence`, `0` if unseen.
	pub fn num_following<S: AsRef<str>>(&self, sequence: &[S]) -> u64 {
		self.navigate(sequence).map_or(0, |node| node.num_children() as u64)
	}

	/// `num_following` with the same probe rule as `context_count`.
	///
	/// # Errors
	/// Same as `context_count`.
	pub fn num_following_range<S: AsRef<str>>(&self, sequence: &[S], start: usize, end: usize) -> Result<u64> {
		let probe = Self::probe(sequence, start, end)?;
		Ok(self.num_following(probe))
	}

	/// Words observed right after `sequence`, in arbitrary order.
	///
	/// A leaf yields an empty vector.
	///
	/// # Errors
	/// `PathNotFound` if `sequence` was never inserted.
	pub fn following<S: AsRef<str>>(&self, sequence: &[S]) -> Result<Vec<String>> {
		let node = self.navigate(sequence).ok_or_else(|| {
			ModelError::PathNotFound(sequence.iter().map(|w| w.as_ref().to_owned()).collect())
		})?;
		Ok(node.children().map(|(word, _)| word.to_owned()).collect())
	}

	/// Adds every count of `other` into this counter.
	///
	/// Sub-tries and paths missing here are created. Counts of shared nodes
	/// are summed.
	pub fn merge(&mut self, other: &Self) {
		for (&key, &other_root) in &other.roots {
			let root = self.root_or_insert(key);
			let mut stack = vec![(other_root, root)];
			while let Some((from, into)) = stack.pop() {
				for (word, other_child) in other.node(from).children() {
					let child = self.bump_child(into, word, other.node(other_child).count());
					stack.push((other_child, child));
				}
			}
		}
		self.max_length = self.max_length.max(other.max_length);
	}

	/// Checks the structural invariants of a counter built outside `insert`,
	/// typically one decoded from a snapshot.
	///
	/// # Errors
	/// `CorruptSnapshot` describing the first violation found.
	pub fn validate(&self) -> Result<()> {
		let corrupt = |msg: String| Err(ModelError::CorruptSnapshot(msg));

		if !self.roots.contains_key(&DEFAULT_ROOT) {
			return corrupt("missing default root".to_owned());
		}

		let mut parents = vec![0u8; self.nodes.len()];
		let mut mark = |id: NodeId| -> bool {
			match parents.get_mut(id.0) {
				Some(seen) if *seen == 0 => {
					*seen = 1;
					true
				}
				_ => false,
			}
		};

		for (key, &id) in &self.roots {
			if !mark(id) {
				return corrupt(format!("root {key} points to invalid or shared node {}", id.0));
			}
		}
		for (index, node) in self.nodes.iter().enumerate() {
			for (word, child) in node.children() {
				if !mark(child) {
					return corrupt(format!("edge {index} -[{word}]-> {} is invalid or shared", child.0));
				}
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn words(s: &str) -> Vec<&str> {
		s.split_whitespace().collect()
	}

	#[test]
	fn discriminator_groups_by_leading_character() {
		assert_eq!(discriminator("7up"), 7);
		assert_eq!(discriminator("apple"), 10);
		assert_eq!(discriminator("Apple"), 10);
		assert_eq!(discriminator("zebra"), 35);
		assert_eq!(discriminator(""), DEFAULT_ROOT);
		assert_eq!(discriminator(" "), DEFAULT_ROOT);
		assert_eq!(discriminator("élan"), DEFAULT_ROOT);
		assert_eq!(discriminator("٣"), DEFAULT_ROOT);
	}

	#[test]
	fn every_prefix_is_counted() {
		let mut counter = SequenceCounter::new(6);
		counter.insert(&words("I am a super hero"), 1);

		assert_eq!(counter.count(&words("I am a super hero")), 1);
		assert_eq!(counter.count(&words("I am")), 1);
		assert_eq!(counter.count(&words("I")), 1);
		assert_eq!(counter.count(&words("am a")), 0);
		assert_eq!(counter.node_count(), 5);
	}

	#[test]
	fn increments_accumulate() {
		let mut counter = SequenceCounter::new(4);
		counter.insert(&words("He is not stupid"), 1);
		counter.insert(&words("He is not stupid"), 1);
		assert_eq!(counter.count(&words("He is not stupid")), 2);

		counter.insert(&words("He is"), 5);
		assert_eq!(counter.count(&words("He is")), 7);
		assert_eq!(counter.count(&words("He is not")), 2);

		counter.insert(&words("He is"), 0);
		assert_eq!(counter.count(&words("He is")), 7);
	}

	#[test]
	fn context_count_sums_children() {
		let mut counter = SequenceCounter::new(4);
		counter.insert(&words("She is not stupid"), 1);
		counter.insert(&words("She is stupid"), 1);

		let node = counter.navigate(&words("She is")).unwrap();
		assert_eq!(node.context_count(), 2);
		assert_eq!(node.num_children(), 2);

		let children_total: u64 = node.children().map(|(_, child)| child.count()).sum();
		assert_eq!(node.context_count(), children_total);

		let leaf = counter.navigate(&words("She is stupid")).unwrap();
		assert!(leaf.is_leaf());
		assert_eq!(leaf.context_count(), 0);
	}

	#[test]
	fn context_count_saturates_like_counts() {
		let mut counter = SequenceCounter::new(3);
		counter.insert(&["a", "b"], u64::MAX);
		counter.insert(&["a", "c"], 1);

		assert_eq!(counter.count(&["a"]), u64::MAX);
		assert_eq!(counter.context_count(&["a"], 0, 1).unwrap(), u64::MAX);
		assert_eq!(counter.navigate(&["a"]).unwrap().context_count(), u64::MAX);
	}

	#[test]
	fn unseen_sequence_counts_zero() {
		let counter = SequenceCounter::new(3);
		assert!(counter.is_empty());
		assert_eq!(counter.count(&words("Unseen Words")), 0);
		assert!(counter.navigate(&words("Unseen Words")).is_none());
		assert!(counter.navigate::<&str>(&[]).is_none());
		assert_eq!(counter.context_count(&words("Unseen Words"), 0, 2).unwrap(), 0);
		assert_eq!(counter.num_following(&words("Unseen")), 0);
	}

	#[test]
	fn shards_share_case_insensitive_roots() {
		let mut counter = SequenceCounter::new(3);
		counter.insert(&words("apple pie"), 1);
		counter.insert(&words("Avocado toast"), 1);
		counter.insert(&words("élan vital"), 1);

		assert_eq!(counter.root_keys().collect::<Vec<_>>(), vec![DEFAULT_ROOT, 10]);
		assert_eq!(counter.root(10).unwrap().num_children(), 2);
		assert_eq!(counter.count(&words("élan vital")), 1);
		assert_eq!(counter.count(&words("Apple pie")), 0);
	}

	#[test]
	fn empty_insert_is_ignored() {
		let mut counter = SequenceCounter::new(3);
		counter.insert::<&str>(&[], 4);
		assert!(counter.is_empty());
		assert_eq!(counter.root_count(), 1);
	}

	#[test]
	fn range_validation_rejects_bad_windows() {
		assert!(check_range(3, 0, 3).is_ok());
		assert!(check_range(3, 2, 2).is_ok());
		assert!(check_range(3, 3, 3).is_ok());
		assert!(matches!(check_range(3, 2, 1), Err(ModelError::InvalidRange { start: 2, end: 1 })));
		assert!(matches!(check_range(3, 1, 4), Err(ModelError::EndOutOfBounds { end: 4, len: 3 })));
		assert!(matches!(check_range(3, 3, 5), Err(ModelError::StartOutOfBounds { start: 3, len: 3 })));
	}

	#[test]
	fn count_range_validates_then_counts() {
		let mut counter = SequenceCounter::new(4);
		counter.insert(&words("She is stupid"), 1);
		let seq = words("x She is stupid");

		assert_eq!(counter.count_range(&seq, 1, 3).unwrap(), 1);
		assert_eq!(counter.count_range(&seq, 1, 1).unwrap(), 0);
		assert_eq!(counter.count_range(&seq, 4, 4).unwrap(), 0);
		assert!(counter.count_range(&seq, 3, 1).unwrap_err().is_bounds_violation());
		assert!(counter.count_range(&seq, 0, 5).unwrap_err().is_bounds_violation());
	}

	#[test]
	fn empty_window_probes_single_word() {
		let mut counter = SequenceCounter::new(4);
		counter.insert(&words("She is not"), 1);
		counter.insert(&words("She was"), 2);
		let seq = words("She is");

		assert_eq!(counter.context_count(&seq, 0, 0).unwrap(), 3);
		assert_eq!(counter.num_following_range(&seq, 0, 0).unwrap(), 2);
		assert_eq!(counter.context_count(&seq, 0, 2).unwrap(), 1);
		assert_eq!(counter.num_following_range(&seq, 0, 2).unwrap(), 1);

		let err = counter.context_count(&seq, 2, 2).unwrap_err();
		assert!(matches!(err, ModelError::StartOutOfBounds { start: 2, len: 2 }));
		assert!(counter.num_following_range(&seq, 1, 0).unwrap_err().is_bounds_violation());
	}

	#[test]
	fn following_lists_children_or_reports_missing() {
		let mut counter = SequenceCounter::new(4);
		counter.insert(&words("She is not stupid"), 1);
		counter.insert(&words("She is stupid"), 1);

		let mut next = counter.following(&words("She is")).unwrap();
		next.sort();
		assert_eq!(next, vec!["not", "stupid"]);

		assert!(counter.following(&words("She is stupid")).unwrap().is_empty());
		assert!(matches!(
			counter.following(&words("He is")),
			Err(ModelError::PathNotFound(path)) if path == vec!["He", "is"]
		));
	}

	#[test]
	fn merge_sums_counts() {
		let mut left = SequenceCounter::new(3);
		left.insert(&words("She is stupid"), 1);
		let mut right = SequenceCounter::new(3);
		right.insert(&words("She is clever"), 2);
		right.insert(&words("9 lives"), 1);

		left.merge(&right);
		assert_eq!(left.count(&words("She is")), 3);
		assert_eq!(left.count(&words("She is stupid")), 1);
		assert_eq!(left.count(&words("She is clever")), 2);
		assert_eq!(left.count(&words("9 lives")), 1);
		assert!(left.validate().is_ok());
	}

	#[test]
	fn validate_detects_dangling_edges() {
		let mut counter = SequenceCounter::new(3);
		counter.insert(&words("a b"), 1);
		assert!(counter.validate().is_ok());

		counter.nodes[0].add_child("ghost", NodeId(99));
		assert!(matches!(counter.validate(), Err(ModelError::CorruptSnapshot(_))));

		let mut shared = SequenceCounter::new(3);
		shared.insert(&words("a b"), 1);
		let root = shared.roots[&10];
		shared.nodes[root.0].add_child("alias", NodeId(2));
		assert!(matches!(shared.validate(), Err(ModelError::CorruptSnapshot(_))));
	}
}
