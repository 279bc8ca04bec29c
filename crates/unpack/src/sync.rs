//! Durability helpers.

use std::fs::{self, File};
use std::io;
use std::path::Path;

/// Flushes a directory's entries so renames and creations inside it survive a crash.
pub fn sync_dir(dir: &Path) -> io::Result<()> {
	#[cfg(unix)]
	{
		File::open(dir)?.sync_all()
	}
	#[cfg(not(unix))]
	{
		let _ = dir;
		Ok(())
	}
}

/// Flushes every file below `dir`, then every directory bottom-up. Entries named
/// `skip` are left alone.
pub fn sync_tree(dir: &Path, skip: &str) -> io::Result<()> {
	for entry in fs::read_dir(dir)? {
		let entry = entry?;
		if entry.file_name() == skip {
			continue;
		}
		let path = entry.path();
		if entry.file_type()?.is_dir() {
			sync_tree(&path, skip)?;
		} else {
			File::open(&path)?.sync_all()?;
		}
	}
	sync_dir(dir)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn syncs_nested_trees() {
		let dir = tempfile::tempdir().unwrap();
		fs::create_dir_all(dir.path().join("a/b")).unwrap();
		fs::write(dir.path().join("a/b/file"), b"x").unwrap();
		fs::write(dir.path().join("lock"), b"").unwrap();
		sync_tree(dir.path(), "lock").unwrap();
	}
}
