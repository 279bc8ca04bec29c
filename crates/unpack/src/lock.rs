//! Cross-process exclusive lock scoped to a working directory.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::LOCK_FILE;

/// Exclusive advisory lock on `<dir>/lock`, held until dropped.
///
/// Each guard opens its own descriptor, so guards exclude each other across threads
/// as well as processes. The kernel releases the lock if the holding process dies.
#[derive(Debug)]
pub struct DirLock {
	file: File,
	path: PathBuf,
}

impl DirLock {
	/// Blocks until the lock is acquired.
	pub fn acquire(dir: &Path) -> io::Result<Self> {
		let (file, path) = open(dir)?;
		FileExt::lock_exclusive(&file)?;
		tracing::trace!(path = %path.display(), "acquired directory lock");
		Ok(Self { file, path })
	}

	/// Acquires the lock only if no one else holds it.
	pub fn try_acquire(dir: &Path) -> io::Result<Option<Self>> {
		let (file, path) = open(dir)?;
		match FileExt::try_lock_exclusive(&file) {
			Ok(()) => Ok(Some(Self { file, path })),
			Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(None),
			Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
			Err(e) => Err(e),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

impl Drop for DirLock {
	fn drop(&mut self) {
		if let Err(error) = FileExt::unlock(&self.file) {
			tracing::warn!(path = %self.path.display(), %error, "failed to release directory lock");
		}
	}
}

fn open(dir: &Path) -> io::Result<(File, PathBuf)> {
	let path = dir.join(LOCK_FILE);
	let file = OpenOptions::new()
		.read(true)
		.write(true)
		.create(true)
		.truncate(false)
		.open(&path)?;
	Ok((file, path))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn second_guard_waits_for_the_first() {
		let dir = tempfile::tempdir().unwrap();
		let held = DirLock::acquire(dir.path()).unwrap();
		assert!(DirLock::try_acquire(dir.path()).unwrap().is_none());
		drop(held);
		assert!(DirLock::try_acquire(dir.path()).unwrap().is_some());
	}

	#[test]
	fn lock_file_is_left_empty() {
		let dir = tempfile::tempdir().unwrap();
		let guard = DirLock::acquire(dir.path()).unwrap();
		assert_eq!(std::fs::metadata(guard.path()).unwrap().len(), 0);
	}
}
