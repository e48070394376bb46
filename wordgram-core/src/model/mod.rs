//! Counting and estimation for the word n-gram language model.
//!
//! This module provides:
//! - Trie vertices holding occurrence counts (`FrequencyNode`)
//! - A discriminator-sharded forest of tries (`SequenceCounter`)
//! - The smoothed language model built on top of it (`LanguageModel`)
//! - Construction parameters (`ModelConfig`)

/// Single trie vertex: an occurrence count and edges to the next words.
pub mod frequency_node;

/// Forest of word tries, one root per first-word discriminator.
///
/// Supports insertion with increment, exact-path lookup, context counts
/// and enumeration of following words.
pub mod sequence_counter;

/// Interpolated n-gram language model.
///
/// Handles training, conditional and joint estimation, ranking of next
/// words, sampling, merging and snapshots.
pub mod language_model;

/// Validated construction parameters of a `LanguageModel`.
pub mod config;

/// Weighted random choice among the children of a node.
/// Not exposed publicly.
mod sampler;

pub use config::ModelConfig;
pub use frequency_node::{FrequencyNode, NodeId};
pub use language_model::{tokenize, LanguageModel};
pub use sequence_counter::{check_range, discriminator, NodeRef, RootKey, SequenceCounter, DEFAULT_ROOT};
