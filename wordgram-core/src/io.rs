use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ModelError, Result};
use crate::model::language_model::LanguageModel;

/// Format version written by `encode_snapshot`.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Extension of snapshot files.
pub const SNAPSHOT_EXTENSION: &str = "bin";

/// Borrowed form, so that saving does not clone the trie.
#[derive(Serialize)]
struct SnapshotRef<'a> {
	version: u32,
	model: &'a LanguageModel,
}

/// Only the version is decoded first, so that snapshots of another format
/// are reported as such rather than as garbage.
#[derive(Deserialize)]
struct SnapshotHeader {
	version: u32,
}

/// Encodes `model` as `(version, model)` with postcard.
pub(crate) fn encode_snapshot(model: &LanguageModel) -> Result<Vec<u8>> {
	let snapshot = SnapshotRef { version: SNAPSHOT_VERSION, model };
	Ok(postcard::to_stdvec(&snapshot)?)
}

/// Decodes and validates a snapshot produced by `encode_snapshot`.
///
/// # Errors
/// - `UnsupportedVersion` if the leading version differs
/// - `Encoding` if the bytes are not a valid snapshot
/// - `CorruptSnapshot` if the decoded model breaks an invariant
pub(crate) fn decode_snapshot(bytes: &[u8]) -> Result<LanguageModel> {
	let (header, _) = postcard::take_from_bytes::<SnapshotHeader>(bytes)?;
	if header.version != SNAPSHOT_VERSION {
		warn!(found = header.version, "rejected snapshot version");
		return Err(ModelError::UnsupportedVersion { expected: SNAPSHOT_VERSION, found: header.version });
	}

	let (_, model): (u32, LanguageModel) = postcard::from_bytes(bytes)?;
	if let Err(e) = model.validate() {
		warn!(error = %e, "rejected inconsistent snapshot");
		return Err(e);
	}
	Ok(model)
}

/// Writes snapshot bytes to `path`, creating parent directories.
pub(crate) fn write_snapshot_file<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
	let path = path.as_ref();
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent)?;
	}
	fs::write(path, bytes)?;
	info!(path = %path.display(), bytes = bytes.len(), "saved model snapshot");
	Ok(())
}

/// Reads raw snapshot bytes from `path`.
pub(crate) fn read_snapshot_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
	let path = path.as_ref();
	let bytes = fs::read(path)?;
	info!(path = %path.display(), bytes = bytes.len(), "loaded model snapshot");
	Ok(bytes)
}

/// Builds the snapshot path of a named model inside `folder`.
///
/// Example:
/// `data` + `"shakespeare"` → `data/shakespeare.bin`
///
/// # Errors
/// `Config` if `name` is empty or would escape `folder`.
pub fn snapshot_path<P: AsRef<Path>>(folder: P, name: &str) -> Result<PathBuf> {
	let valid = !name.is_empty()
		&& name.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_');
	if !valid {
		return Err(ModelError::Config(format!("Invalid model name: {name:?}")));
	}

	let mut output = folder.as_ref().to_path_buf();
	output.push(name);
	output.set_extension(SNAPSHOT_EXTENSION);
	Ok(output)
}

/// Lists the names (file stems) of the snapshots stored in `folder`.
///
/// Returns names only, sorted.
pub fn list_snapshots<P: AsRef<Path>>(folder: P) -> Result<Vec<String>> {
	let mut names = Vec::new();

	for entry in fs::read_dir(folder)? {
		let path = entry?.path();
		if path.is_file() && path.extension() == Some(std::ffi::OsStr::new(SNAPSHOT_EXTENSION)) {
			if let Some(stem) = path.file_stem() {
				names.push(stem.to_string_lossy().to_string());
			}
		}
	}

	names.sort();
	Ok(names)
}
