use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Default assumed sequence length, giving a uniform floor of `1/15`.
pub const DEFAULT_SEQUENCE_LENGTH: usize = 15;

/// Default n-gram order.
pub const DEFAULT_NGRAM_ORDER: usize = 3;

/// Construction parameters of a `LanguageModel`.
///
/// # Invariants (checked by `validate`)
/// - `ngram_order >= 1`
/// - `sequence_length >= 1`
/// - `lambda_factor`, when set, is finite and non-negative
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ModelConfig {
	/// Maximum n-gram order `N`: contexts of up to `N-1` words are used.
	pub ngram_order: usize,

	/// Smoothing strength. `None` means "same as `ngram_order`".
	pub lambda_factor: Option<f64>,

	/// Assumed sequence length used to derive the uniform floor.
	pub sequence_length: usize,
}

impl Default for ModelConfig {
	fn default() -> Self {
		Self {
			ngram_order: DEFAULT_NGRAM_ORDER,
			lambda_factor: None,
			sequence_length: DEFAULT_SEQUENCE_LENGTH,
		}
	}
}

impl ModelConfig {
	/// Default configuration for an order-`ngram_order` model.
	pub fn with_order(ngram_order: usize) -> Self {
		Self { ngram_order, ..Self::default() }
	}

	/// Effective smoothing strength.
	pub fn lambda_factor(&self) -> f64 {
		self.lambda_factor.unwrap_or(self.ngram_order as f64)
	}

	/// Checks every field.
	///
	/// # Errors
	/// `ModelError::Config` naming the first invalid field.
	pub fn validate(&self) -> Result<()> {
		if self.ngram_order == 0 {
			return Err(ModelError::Config("ngram_order must be >= 1".to_owned()));
		}
		validate_sequence_length(self.sequence_length)?;
		if let Some(lambda_factor) = self.lambda_factor {
			if !lambda_factor.is_finite() || lambda_factor < 0.0 {
				return Err(ModelError::Config(format!(
					"lambda_factor must be finite and >= 0, got {lambda_factor}"
				)));
			}
		}
		Ok(())
	}
}

pub(crate) fn validate_sequence_length(sequence_length: usize) -> Result<()> {
	if sequence_length == 0 {
		return Err(ModelError::Config("sequence_length must be >= 1".to_owned()));
	}
	Ok(())
}

pub(crate) fn validate_uniform_estimate(uniform_estimate: f64) -> Result<()> {
	if !(uniform_estimate > 0.0 && uniform_estimate <= 1.0) {
		return Err(ModelError::Config(format!(
			"uniform_estimate must be in (0, 1], got {uniform_estimate}"
		)));
	}
	Ok(())
}
