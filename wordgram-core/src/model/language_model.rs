use std::io::{Read, Write};
use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::{self, ModelConfig};
use super::sampler::sample_child;
use super::sequence_counter::{check_range, SequenceCounter};
use crate::error::{ModelError, Result};
use crate::io;

/// Splits a raw statement into words on whitespace.
///
/// No other normalization is applied: case and punctuation are kept.
pub fn tokenize(text: &str) -> Vec<&str> {
	text.split_whitespace().collect()
}

/// Word n-gram language model with interpolated smoothing.
///
/// The model counts the word sequences it is trained on in a
/// `SequenceCounter` and estimates the probability of a word given the
/// words before it by blending the relative frequencies observed for
/// contexts of one word up to `ngram_order - 1` words (recursive
/// Jelinek-Mercer interpolation). When no context has been observed the
/// estimate falls back to `uniform_estimate`.
///
/// # Responsibilities
/// - Train from raw statements or word sequences
/// - Estimate conditional probabilities and log-domain joint scores
/// - Rank and sample likely next words
/// - Merge with another model of the same order
///
/// # Invariants
/// - `ngram_order >= 1` and never changes after construction
/// - `uniform_estimate` is in `(0, 1]`
/// - Counts only ever grow
///
/// # Concurrency
/// Training takes `&mut self` and estimation `&self`; wrap the model in a
/// `RwLock` to share it between threads.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LanguageModel {
	/// Maximum n-gram order `N`.
	ngram_order: usize,
	/// Smoothing strength, defaults to `N`.
	lambda_factor: f64,
	/// Assumed sequence length, only used to derive `uniform_estimate`.
	sequence_length: usize,
	/// Probability floor for contexts without evidence.
	uniform_estimate: f64,
	counter: SequenceCounter,
}

impl LanguageModel {
	/// Creates an untrained model of order `ngram_order` with default settings.
	///
	/// # Errors
	/// Returns an error if `ngram_order < 1`.
	pub fn new(ngram_order: usize) -> Result<Self> {
		Self::with_config(&ModelConfig::with_order(ngram_order))
	}

	/// Creates an untrained model from a validated configuration.
	///
	/// # Errors
	/// `ModelError::Config` if the configuration is invalid.
	pub fn with_config(config: &ModelConfig) -> Result<Self> {
		config.validate()?;
		Ok(Self {
			ngram_order: config.ngram_order,
			lambda_factor: config.lambda_factor(),
			sequence_length: config.sequence_length,
			uniform_estimate: 1.0 / config.sequence_length as f64,
			counter: SequenceCounter::new(config.ngram_order),
		})
	}

	pub fn ngram_order(&self) -> usize {
		self.ngram_order
	}

	pub fn lambda_factor(&self) -> f64 {
		self.lambda_factor
	}

	pub fn sequence_length(&self) -> usize {
		self.sequence_length
	}

	pub fn uniform_estimate(&self) -> f64 {
		self.uniform_estimate
	}

	/// Read access to the underlying counts.
	pub fn counter(&self) -> &SequenceCounter {
		&self.counter
	}

	/// True once any non-empty sequence has been trained.
	pub fn is_trained(&self) -> bool {
		!self.counter.is_empty()
	}

	/// Sets the assumed sequence length and recomputes
	/// `uniform_estimate = 1 / sequence_length`.
	///
	/// # Errors
	/// `ModelError::Config` if `sequence_length == 0`.
	pub fn set_sequence_length(&mut self, sequence_length: usize) -> Result<()> {
		config::validate_sequence_length(sequence_length)?;
		self.sequence_length = sequence_length;
		self.uniform_estimate = 1.0 / sequence_length as f64;
		Ok(())
	}

	/// Overrides the probability floor without touching `sequence_length`.
	///
	/// # Errors
	/// `ModelError::Config` unless `0 < uniform_estimate <= 1`.
	pub fn set_uniform_estimate(&mut self, uniform_estimate: f64) -> Result<()> {
		config::validate_uniform_estimate(uniform_estimate)?;
		self.uniform_estimate = uniform_estimate;
		Ok(())
	}

	/// Trains on a raw statement, split on whitespace.
	pub fn train(&mut self, statement: &str, increment: u64) {
		self.train_sequence(&tokenize(statement), increment);
	}

	/// Trains on an already tokenized sequence.
	///
	/// Only the full sequence (and thereby its prefixes) is counted. Windows
	/// starting later in the sequence are not; use `train_windows` for that.
	pub fn train_sequence<S: AsRef<str>>(&mut self, sequence: &[S], increment: u64) {
		self.counter.insert(sequence, increment);
	}

	/// Trains on every window `sequence[i..min(i + N, len)]`.
	///
	/// This gives contexts that do not start a training sentence their own
	/// counts, at the price of counting each word once per window it opens.
	pub fn train_windows<S: AsRef<str>>(&mut self, sequence: &[S], increment: u64) {
		for start in 0..sequence.len() {
			let end = (start + self.ngram_order).min(sequence.len());
			self.counter.insert(&sequence[start..end], increment);
		}
	}

	/// Log-domain score of `word` following `context`.
	///
	/// This is `mle_estimate(context ++ [word])`: a sum of log2 conditional
	/// estimates, not a probability in `[0, 1]`.
	pub fn probability<S: AsRef<str>>(&self, context: &[S], word: &str) -> Result<f64> {
		let mut sequence: Vec<&str> = context.iter().map(AsRef::as_ref).collect();
		sequence.push(word);
		self.mle_estimate(&sequence)
	}

	/// Log-domain joint estimate of the whole sequence.
	pub fn mle_estimate<S: AsRef<str>>(&self, sequence: &[S]) -> Result<f64> {
		self.mle_estimate_range(sequence, 0, sequence.len())
	}

	/// Sums `log2_conditional_estimate(sequence, start, i)` for
	/// `i in start+1..=end`.
	///
	/// Adding log probabilities replaces multiplying them, which would
	/// underflow on long sequences.
	///
	/// # Errors
	/// Bounds violation if the window is invalid.
	pub fn mle_estimate_range<S: AsRef<str>>(&self, sequence: &[S], start: usize, end: usize) -> Result<f64> {
		check_range(sequence.len(), start, end)?;
		let mut sum = 0.0;
		for i in start + 1..=end {
			sum += self.log2_conditional_estimate(sequence, start, i)?;
		}
		Ok(sum)
	}

	/// Base-2 logarithm of `conditional_estimate(sequence, start, end)`.
	///
	/// A zero estimate maps to negative infinity.
	pub fn log2_conditional_estimate<S: AsRef<str>>(&self, sequence: &[S], start: usize, end: usize) -> Result<f64> {
		Ok(self.conditional_estimate(sequence, start, end)?.log2())
	}

	/// Smoothed probability of `sequence[end-1]` given `sequence[start..end-1]`,
	/// using the model's own order and lambda factor.
	pub fn conditional_estimate<S: AsRef<str>>(&self, sequence: &[S], start: usize, end: usize) -> Result<f64> {
		self.conditional_estimate_with(sequence, start, end, self.ngram_order, self.lambda_factor)
	}

	/// Smoothed probability of `sequence[end-1]` given the preceding words
	/// of the `[start, end)` window.
	///
	/// Starts from `uniform_estimate` and, for contexts of growing length
	/// (the window's last word alone, then one more word to the left, up to
	/// `min(max_order, ngram_order)` words), blends in the observed relative
	/// frequency:
	///
	/// ```text
	/// lambda   = context_count / (context_count + lambda_factor * context_size)
	/// estimate = lambda * count / context_count + (1 - lambda) * estimate
	/// ```
	///
	/// Contexts never observed are skipped. `context_size` is the number of
	/// distinct continuations of the whole `[start, end)` window, the same
	/// for every order.
	///
	/// # Errors
	/// - `InvalidArgument` if `end < start`
	/// - Bounds violation if the window does not fit in `sequence`
	pub fn conditional_estimate_with<S: AsRef<str>>(
		&self,
		sequence: &[S],
		start: usize,
		end: usize,
		max_order: usize,
		lambda_factor: f64,
	) -> Result<f64> {
		if end < start {
			return Err(ModelError::InvalidArgument(format!(
				"conditional estimates require end >= start, found start={start} end={end}"
			)));
		}
		if end == start {
			return Ok(0.0);
		}

		let order = max_order.min(self.ngram_order);
		let context_start = start.max(end.saturating_sub(order));
		let context_end = end - 1;

		let mut estimate = self.uniform_estimate;
		for cursor in (context_start..=context_end).rev() {
			let context_count = self.counter.context_count(sequence, cursor, context_end)?;
			if context_count == 0 {
				continue;
			}

			let context_size = self.counter.num_following_range(sequence, start, end)?;
			let count = self.counter.count_range(sequence, cursor, end)?;
			let lambda = lambda(context_count as f64, context_size as f64, lambda_factor);

			estimate = lambda * (count as f64 / context_count as f64) + (1.0 - lambda) * estimate;
			debug!(
				window = ?sequence[cursor..end].iter().map(AsRef::as_ref).collect::<Vec<&str>>(),
				context_count,
				context_size,
				count,
				lambda,
				estimate,
				"interpolated order"
			);
		}
		Ok(estimate)
	}

	/// Naive unsmoothed estimate: the share of the occurrences of `sequence`
	/// that were extended by one more word.
	///
	/// Returns `0.0` for an unseen sequence.
	pub fn simple_estimate<S: AsRef<str>>(&self, sequence: &[S]) -> f64 {
		let Some(node) = self.counter.navigate(sequence) else {
			return 0.0;
		};
		if node.count() == 0 {
			return 0.0;
		}
		node.context_count() as f64 / node.count() as f64
	}

	/// Words observed after `context`, ranked by descending
	/// `probability(context, word)`; ties are ordered by word.
	///
	/// # Errors
	/// `PathNotFound` if `context` was never trained.
	pub fn most_probable<S: AsRef<str>>(&self, context: &[S]) -> Result<Vec<(String, f64)>> {
		let mut ranked = self
			.counter
			.following(context)?
			.into_iter()
			.map(|word| -> Result<(String, f64)> {
				let score = self.probability(context, &word)?;
				Ok((word, score))
			})
			.collect::<Result<Vec<_>>>()?;

		ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
		Ok(ranked)
	}

	/// The `limit` best entries of `most_probable`.
	pub fn most_probable_n<S: AsRef<str>>(&self, context: &[S], limit: usize) -> Result<Vec<(String, f64)>> {
		let mut ranked = self.most_probable(context)?;
		ranked.truncate(limit);
		Ok(ranked)
	}

	/// Samples a word observed after the exact `context`, weighted by count.
	///
	/// Returns `None` if the context is unseen or was never extended.
	pub fn sample_next<S: AsRef<str>>(&self, context: &[S]) -> Option<String> {
		self.sample_next_with(context, &mut rand::rng())
	}

	/// `sample_next` with a caller-provided random source.
	pub fn sample_next_with<S: AsRef<str>, R: Rng + ?Sized>(&self, context: &[S], rng: &mut R) -> Option<String> {
		let node = self.counter.navigate(context)?;
		sample_child(node, rng).map(str::to_owned)
	}

	/// Generates up to `max_words` words following `seed`.
	///
	/// Each step samples from the longest suffix of the running sequence
	/// (seed included) that has observed continuations. Generation stops
	/// early when no suffix has any.
	pub fn generate<S: AsRef<str>>(&self, seed: &[S], max_words: usize) -> Vec<String> {
		self.generate_with(seed, max_words, &mut rand::rng())
	}

	/// `generate` with a caller-provided random source.
	pub fn generate_with<S: AsRef<str>, R: Rng + ?Sized>(&self, seed: &[S], max_words: usize, rng: &mut R) -> Vec<String> {
		let mut running: Vec<String> = seed.iter().map(|w| w.as_ref().to_owned()).collect();
		let seed_len = running.len();

		while running.len() - seed_len < max_words {
			let next = (0..running.len())
				.filter_map(|start| self.counter.navigate(&running[start..]))
				.find_map(|node| sample_child(node, rng).map(str::to_owned));
			match next {
				Some(word) => running.push(word),
				None => break,
			}
		}
		running.split_off(seed_len)
	}

	/// Merges another model's counts into this one.
	///
	/// Scalar settings of `self` are kept.
	///
	/// # Errors
	/// `ModelError::Config` if the n-gram orders differ.
	pub fn merge(&mut self, other: &Self) -> Result<()> {
		if self.ngram_order != other.ngram_order {
			return Err(ModelError::Config(format!(
				"ngram_order mismatch: self={}, other={}",
				self.ngram_order, other.ngram_order
			)));
		}
		self.counter.merge(&other.counter);
		Ok(())
	}

	/// Checks a decoded model before handing it out.
	pub(crate) fn validate(&self) -> Result<()> {
		let config = ModelConfig {
			ngram_order: self.ngram_order,
			lambda_factor: Some(self.lambda_factor),
			sequence_length: self.sequence_length,
		};
		config.validate().map_err(|e| ModelError::CorruptSnapshot(e.to_string()))?;
		config::validate_uniform_estimate(self.uniform_estimate)
			.map_err(|e| ModelError::CorruptSnapshot(e.to_string()))?;
		self.counter.validate()
	}

	/// Encodes the model as a versioned snapshot.
	pub fn to_bytes(&self) -> Result<Vec<u8>> {
		io::encode_snapshot(self)
	}

	/// Restores a model from `to_bytes` output.
	///
	/// # Errors
	/// Decoding, version, or consistency errors.
	pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
		io::decode_snapshot(bytes)
	}

	/// Writes a snapshot to `writer`.
	pub fn save<W: Write>(&self, mut writer: W) -> Result<()> {
		writer.write_all(&self.to_bytes()?)?;
		writer.flush()?;
		Ok(())
	}

	/// Reads a snapshot from `reader` until end of input.
	pub fn load<R: Read>(mut reader: R) -> Result<Self> {
		let mut bytes = Vec::new();
		reader.read_to_end(&mut bytes)?;
		Self::from_bytes(&bytes)
	}

	/// Writes a snapshot file, creating parent directories as needed.
	pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
		io::write_snapshot_file(path, &self.to_bytes()?)
	}

	/// Loads a snapshot file written by `save_to_file`.
	pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
		Self::from_bytes(&io::read_snapshot_file(path)?)
	}
}

/// Interpolation weight given to a context of `count` observations and
/// `size` distinct continuations.
fn lambda(count: f64, size: f64, lambda_factor: f64) -> f64 {
	count / (count + lambda_factor * size)
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::SeedableRng;
	use rand::rngs::StdRng;

	fn words(s: &str) -> Vec<&str> {
		s.split_whitespace().collect()
	}

	fn she_model() -> LanguageModel {
		let mut model = LanguageModel::new(3).unwrap();
		model.train("She is not stupid", 1);
		model.train("She is stupid", 1);
		model.train("She is stupid but clever", 1);
		model
	}

	#[test]
	fn defaults_follow_order() {
		let model = LanguageModel::new(4).unwrap();
		assert_eq!(model.ngram_order(), 4);
		assert_eq!(model.lambda_factor(), 4.0);
		assert_eq!(model.sequence_length(), 15);
		assert_eq!(model.uniform_estimate(), 1.0 / 15.0);
		assert!(!model.is_trained());
		assert!(matches!(LanguageModel::new(0), Err(ModelError::Config(_))));
	}

	#[test]
	fn sequence_length_drives_uniform_estimate() {
		let mut model = LanguageModel::new(2).unwrap();
		model.set_sequence_length(4).unwrap();
		assert_eq!(model.uniform_estimate(), 0.25);
		assert!(model.set_sequence_length(0).is_err());
		assert_eq!(model.sequence_length(), 4);

		model.set_uniform_estimate(0.5).unwrap();
		assert_eq!(model.uniform_estimate(), 0.5);
		assert_eq!(model.sequence_length(), 4);
		assert!(model.set_uniform_estimate(0.0).is_err());
	}

	#[test]
	fn train_splits_on_whitespace() {
		let mut model = LanguageModel::new(3).unwrap();
		model.train("  I am\ta   super hero ", 1);
		assert!(model.is_trained());
		assert_eq!(model.counter().count(&words("I am a super hero")), 1);
		assert_eq!(model.counter().count(&words("I am")), 1);

		model.train("   ", 1);
		assert_eq!(model.counter().node_count(), 5);
	}

	#[test]
	fn train_keeps_only_the_full_sequence() {
		let mut model = LanguageModel::new(3).unwrap();
		model.train("She is stupid", 1);
		assert_eq!(model.counter().count(&words("is stupid")), 0);
	}

	#[test]
	fn train_windows_counts_every_window() {
		let mut model = LanguageModel::new(2).unwrap();
		model.train_windows(&words("She is stupid"), 1);
		assert_eq!(model.counter().count(&words("She is")), 1);
		assert_eq!(model.counter().count(&words("is stupid")), 1);
		assert_eq!(model.counter().count(&words("stupid")), 1);
		assert_eq!(model.counter().count(&words("She is stupid")), 0);
	}

	#[test]
	fn empty_window_is_neutral() {
		let model = she_model();
		assert_eq!(model.conditional_estimate(&words("She is"), 0, 0).unwrap(), 0.0);
		assert_eq!(model.conditional_estimate(&words("She is"), 2, 2).unwrap(), 0.0);
		assert_eq!(model.conditional_estimate::<&str>(&[], 0, 0).unwrap(), 0.0);
	}

	#[test]
	fn reversed_window_is_invalid_argument() {
		let model = she_model();
		let err = model.conditional_estimate(&words("She is"), 2, 1).unwrap_err();
		assert!(matches!(err, ModelError::InvalidArgument(_)));
	}

	#[test]
	fn window_past_sequence_is_bounds_violation() {
		let model = she_model();
		let err = model.conditional_estimate(&words("She is"), 0, 3).unwrap_err();
		assert!(err.is_bounds_violation());
		assert!(model.mle_estimate_range(&words("She is"), 0, 3).unwrap_err().is_bounds_violation());
	}

	#[test]
	fn unseen_context_falls_back_to_uniform() {
		let model = she_model();
		let estimate = model.conditional_estimate(&words("Nobody knows anything"), 0, 3).unwrap();
		assert_eq!(estimate, model.uniform_estimate());

		let untrained = LanguageModel::new(3).unwrap();
		assert_eq!(untrained.conditional_estimate(&words("a b"), 0, 2).unwrap(), 1.0 / 15.0);
	}

	#[test]
	fn interpolation_matches_hand_computation() {
		let model = she_model();
		let seq = words("She is stupid");
		let uniform = model.uniform_estimate();

		// [She, is]: order 3 gives cursors 1 and 0. Cursor 1 probes "is",
		// never a sentence start, so only cursor 0 contributes.
		// context_count([She]) = 3, count([She, is]) = 3,
		// context_size = |children([She, is])| = 2.
		let lambda = 3.0 / (3.0 + 3.0 * 2.0);
		let expected = lambda * (3.0 / 3.0) + (1.0 - lambda) * uniform;
		let estimate = model.conditional_estimate(&seq, 0, 2).unwrap();
		assert!((estimate - expected).abs() < 1e-12);

		// [She, is, stupid]: cursors 2 and 1 probe "stupid" and "is", both
		// unseen as sentence starts. Cursor 0 uses the two-word context:
		// context_count([She, is]) = 3, count([She, is, stupid]) = 2,
		// context_size = |children([She, is, stupid])| = 1.
		let lambda = 3.0 / (3.0 + 3.0 * 1.0);
		let expected = lambda * (2.0 / 3.0) + (1.0 - lambda) * uniform;
		let estimate = model.conditional_estimate(&seq, 0, 3).unwrap();
		assert!((estimate - expected).abs() < 1e-12);
	}

	#[test]
	fn order_caps_context_length() {
		let seq = words("She is stupid");
		let model = she_model();

		// With two words of history out of reach only the unseen one-word
		// probes remain.
		let capped = model.conditional_estimate_with(&seq, 0, 3, 2, 3.0).unwrap();
		assert_eq!(capped, model.uniform_estimate());

		let mut bigram = LanguageModel::new(2).unwrap();
		bigram.train("She is not stupid", 1);
		bigram.train("She is stupid", 1);
		bigram.train("She is stupid but clever", 1);
		assert_eq!(bigram.conditional_estimate(&seq, 0, 3).unwrap(), bigram.uniform_estimate());

		// A larger max_order is bounded by the model's own order.
		let wide = model.conditional_estimate_with(&seq, 0, 3, 10, 3.0).unwrap();
		assert_eq!(wide, model.conditional_estimate(&seq, 0, 3).unwrap());

		// A stronger lambda factor pulls the estimate toward the floor.
		let smoothed = model.conditional_estimate_with(&seq, 0, 3, 3, 30.0).unwrap();
		assert!(smoothed < wide);
		assert!(smoothed > model.uniform_estimate());
	}

	#[test]
	fn mle_estimate_sums_log2_conditionals() {
		let model = she_model();
		let seq = words("She is stupid");
		let expected: f64 = (1..=3)
			.map(|i| model.conditional_estimate(&seq, 0, i).unwrap().log2())
			.sum();
		let score = model.mle_estimate(&seq).unwrap();
		assert!((score - expected).abs() < 1e-12);
		assert_eq!(model.mle_estimate::<&str>(&[]).unwrap(), 0.0);
	}

	#[test]
	fn probability_appends_word() {
		let model = she_model();
		let direct = model.mle_estimate(&words("She is stupid")).unwrap();
		let appended = model.probability(&words("She is"), "stupid").unwrap();
		assert_eq!(direct, appended);
	}

	#[test]
	fn simple_estimate_is_extension_ratio() {
		let model = she_model();
		assert_eq!(model.simple_estimate(&words("She is")), 1.0);
		assert_eq!(model.simple_estimate(&words("She is stupid")), 0.5);
		assert_eq!(model.simple_estimate(&words("She is stupid but clever")), 0.0);
		assert_eq!(model.simple_estimate(&words("Unseen")), 0.0);
	}

	#[test]
	fn most_probable_ranks_and_breaks_ties() {
		let model = she_model();
		let ranked = model.most_probable(&words("She is")).unwrap();
		let words_only: Vec<&str> = ranked.iter().map(|(w, _)| w.as_str()).collect();
		let mut sorted = words_only.clone();
		sorted.sort();
		assert_eq!(sorted, vec!["not", "stupid"]);
		assert!(ranked.windows(2).all(|pair| {
			pair[0].1 > pair[1].1 || (pair[0].1 == pair[1].1 && pair[0].0 < pair[1].0)
		}));

		assert_eq!(model.most_probable_n(&words("She is"), 1).unwrap().len(), 1);
		assert!(matches!(
			model.most_probable(&words("He is")),
			Err(ModelError::PathNotFound(_))
		));
		assert!(model.most_probable(&words("She is not stupid")).unwrap().is_empty());
	}

	#[test]
	fn sampling_stays_on_observed_paths() {
		let model = she_model();
		let mut rng = StdRng::seed_from_u64(3);

		let next = model.sample_next_with(&words("She is"), &mut rng).unwrap();
		assert!(next == "not" || next == "stupid");
		assert_eq!(model.sample_next_with(&words("She is not stupid"), &mut rng), None);
		assert_eq!(model.sample_next(&words("Unseen")), None);
	}

	#[test]
	fn generate_extends_seed() {
		let mut model = LanguageModel::new(3).unwrap();
		model.train("the cat sat", 1);

		let mut rng = StdRng::seed_from_u64(11);
		assert_eq!(model.generate_with(&["the"], 5, &mut rng), vec!["cat", "sat"]);
		assert_eq!(model.generate_with(&["the"], 1, &mut rng), vec!["cat"]);
		assert!(model.generate(&["dog"], 5).is_empty());
		assert!(model.generate(&["the"], 0).is_empty());
	}

	#[test]
	fn merge_requires_same_order() {
		let mut left = she_model();
		let mut right = LanguageModel::new(3).unwrap();
		right.train("She is clever", 2);
		left.merge(&right).unwrap();
		assert_eq!(left.counter().count(&words("She is")), 5);

		let other = LanguageModel::new(2).unwrap();
		assert!(matches!(left.merge(&other), Err(ModelError::Config(_))));
	}
}
