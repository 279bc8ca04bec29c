//! Durable dirty/clean marker.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use crate::STATE_FILE;

/// Whether a working directory's payload may be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionState {
	Dirty,
	Clean,
}

impl ExtractionState {
	const DIRTY: u8 = 0;
	const CLEAN: u8 = 1;

	fn byte(self) -> u8 {
		match self {
			Self::Dirty => Self::DIRTY,
			Self::Clean => Self::CLEAN,
		}
	}
}

/// Reads the marker in `dir`. Absent, empty, unreadable or unknown means dirty.
pub fn read(dir: &Path) -> ExtractionState {
	match fs::read(dir.join(STATE_FILE)) {
		Ok(bytes) if bytes.first() == Some(&ExtractionState::CLEAN) => ExtractionState::Clean,
		Ok(_) => ExtractionState::Dirty,
		Err(error) => {
			tracing::trace!(dir = %dir.display(), %error, "state unreadable; treating as dirty");
			ExtractionState::Dirty
		}
	}
}

/// Overwrites the marker in `dir` and flushes it to stable storage.
pub fn write(dir: &Path, state: ExtractionState) -> io::Result<()> {
	let mut file = OpenOptions::new()
		.write(true)
		.create(true)
		.truncate(true)
		.open(dir.join(STATE_FILE))?;
	file.write_all(&[state.byte()])?;
	file.sync_all()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_marker_reads_dirty() {
		let dir = tempfile::tempdir().unwrap();
		assert_eq!(read(dir.path()), ExtractionState::Dirty);
	}

	#[test]
	fn unknown_and_empty_markers_read_dirty() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(dir.path().join(STATE_FILE), [7u8]).unwrap();
		assert_eq!(read(dir.path()), ExtractionState::Dirty);
		fs::write(dir.path().join(STATE_FILE), b"").unwrap();
		assert_eq!(read(dir.path()), ExtractionState::Dirty);
	}

	#[test]
	fn written_marker_is_a_single_byte() {
		let dir = tempfile::tempdir().unwrap();
		write(dir.path(), ExtractionState::Clean).unwrap();
		assert_eq!(fs::read(dir.path().join(STATE_FILE)).unwrap(), [1u8]);
		assert_eq!(read(dir.path()), ExtractionState::Clean);
		write(dir.path(), ExtractionState::Dirty).unwrap();
		assert_eq!(fs::read(dir.path().join(STATE_FILE)).unwrap(), [0u8]);
	}
}
