//! Error types for counting and estimation.

use thiserror::Error;

/// Errors raised by the sequence counter, the language model and snapshot I/O.
///
/// Missing trie paths are *not* errors for counting queries: they degrade to
/// zero so that estimation can fall back to the uniform floor. Only
/// `following` reports a missing path, through `PathNotFound`.
#[derive(Debug, Error)]
pub enum ModelError {
	/// `end` lies before `start`.
	#[error("End must be >= start. Found start={start} end={end}")]
	InvalidRange { start: usize, end: usize },

	/// `start` does not address a word of the sequence.
	#[error("Start must be less than the sequence length. Found start={start} length={len}")]
	StartOutOfBounds { start: usize, len: usize },

	/// `end` lies past the end of the sequence.
	#[error("End must be at most the sequence length. Found end={end} length={len}")]
	EndOutOfBounds { end: usize, len: usize },

	/// An estimation argument is unusable.
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),

	/// No trie node exists for the given word sequence.
	#[error("No trie path for sequence {0:?}")]
	PathNotFound(Vec<String>),

	/// Configuration error
	#[error("Configuration error: {0}")]
	Config(String),

	/// Snapshot written by an incompatible format version.
	#[error("Unsupported snapshot version: expected {expected}, got {found}")]
	UnsupportedVersion { expected: u32, found: u32 },

	/// Snapshot decoded but describes an inconsistent model.
	#[error("Corrupt snapshot: {0}")]
	CorruptSnapshot(String),

	/// Encoding error
	#[error("Encoding error: {0}")]
	Encoding(#[from] postcard::Error),

	/// IO error
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}

impl ModelError {
	/// True for the `(sequence, start, end)` bounds violations.
	pub fn is_bounds_violation(&self) -> bool {
		matches!(
			self,
			ModelError::InvalidRange { .. } | ModelError::StartOutOfBounds { .. } | ModelError::EndOutOfBounds { .. }
		)
	}
}

/// Result type for model operations
pub type Result<T> = std::result::Result<T, ModelError>;
