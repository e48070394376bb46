use rand::Rng;

use super::sequence_counter::NodeRef;

/// Picks one child of `node` using weighted random sampling.
///
/// The probability of selecting a word is proportional to the count of its
/// node. This performs:
/// - an O(n) scan to compute the total
/// - a cumulative subtraction to select a bucket
///
/// Returns `None` if the node is a leaf or all children have a zero count.
pub(crate) fn sample_child<'a, R: Rng + ?Sized>(node: NodeRef<'a>, rng: &mut R) -> Option<&'a str> {
	let total = node.context_count();
	if total == 0 {
		return None;
	}

	let mut r = rng.random_range(0..total);
	let mut fallback = None;
	for (word, child) in node.children() {
		let count = child.count();
		if r < count {
			return Some(word);
		}
		r -= count;
		if count > 0 {
			fallback = Some(word);
		}
	}

	// Unreachable while the total matches the children.
	fallback
}
