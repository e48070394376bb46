//! Word n-gram language model.
//!
//! This crate counts word sequences in a frequency trie and estimates, for
//! any context of preceding words, a smoothed probability of the next word:
//! - Discriminator-sharded frequency tries (`SequenceCounter`)
//! - Recursive linear interpolation across orders 1..N (`LanguageModel`)
//! - Ranking and sampling of next words
//! - Versioned binary snapshots
//!
//! ```
//! use wordgram_core::LanguageModel;
//!
//! let mut model = LanguageModel::new(3)?;
//! model.train("She is not stupid", 1);
//! model.train("She is stupid", 1);
//!
//! let ranked = model.most_probable(&["She", "is"])?;
//! assert_eq!(ranked.len(), 2);
//! # Ok::<(), wordgram_core::ModelError>(())
//! ```

/// Counting trie, language model and configuration.
pub mod model;

/// Error type shared by every operation.
pub mod error;

/// Snapshot encoding and file helpers.
pub mod io;

pub use error::{ModelError, Result};
pub use model::{LanguageModel, ModelConfig, SequenceCounter};
