//! Error types for extraction.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::payload::PayloadDefect;

/// Extraction or verification of a working directory failed.
///
/// The working directory is left dirty in every case.
#[derive(Debug, Error)]
pub enum UnpackError {
	/// The archive has no entry at the expected path.
	#[error("{archive} has no entry {entry}")]
	MissingEntry {
		/// Description of the archive.
		archive: String,
		/// Entry path that was looked up.
		entry: String,
	},

	/// An entry stream ended before its declared size.
	#[error("entry {entry} truncated: expected {expected} bytes, read {actual}")]
	Truncated {
		/// Entry path.
		entry: String,
		/// Size the archive declared.
		expected: u64,
		/// Bytes actually delivered.
		actual: u64,
	},

	/// The archive backing this working directory no longer exists.
	#[error("archive {archive} does not exist")]
	ArchiveMissing {
		/// Description of the archive.
		archive: String,
	},

	/// The working directory is not a clean extraction of the current archive.
	#[error("{dir} is not a current extraction")]
	NotCurrent {
		/// Working directory.
		dir: PathBuf,
	},

	/// The extracted payload file fails verification.
	#[error("corrupt payload {path}: {defect}")]
	CorruptPayload {
		/// Payload file.
		path: PathBuf,
		/// What is wrong with it.
		defect: PayloadDefect,
	},

	/// A filesystem or archive read failed.
	#[error("failed to {action} {path}: {source}")]
	Io {
		/// Operation that failed.
		action: &'static str,
		/// Path it was applied to.
		path: PathBuf,
		/// The underlying I/O error.
		#[source]
		source: io::Error,
	},
}

impl UnpackError {
	pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
		let path = path.into();
		move |source| Self::Io { action, path, source }
	}
}

/// Result type for extraction operations.
pub type Result<T> = std::result::Result<T, UnpackError>;
