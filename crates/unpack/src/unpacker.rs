//! Check-and-extract over one working directory.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::state::{self, ExtractionState};
use crate::sync::{sync_dir, sync_tree};
use crate::{
	Archive, DirLock, FINGERPRINT_FILE, Fingerprint, LOCK_FILE, MODULES_DIR, PAYLOAD_FILE, Result, UnpackError,
	payload,
};

const TEMP_SUFFIX: &str = ".tmp";

/// Which archive entries make up a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadLayout {
	/// Entry framed into the `deps` file.
	pub manifest_entry: String,
	/// Archive directory whose files are extracted flat into `lib/`.
	pub module_prefix: Option<String>,
}

impl PayloadLayout {
	pub fn manifest(entry: impl Into<String>) -> Self {
		Self {
			manifest_entry: entry.into(),
			module_prefix: None,
		}
	}

	pub fn with_modules(mut self, prefix: impl Into<String>) -> Self {
		let mut prefix = prefix.into();
		if !prefix.is_empty() && !prefix.ends_with('/') {
			prefix.push('/');
		}
		self.module_prefix = Some(prefix);
		self
	}
}

/// Result of [`Unpacker::ensure_available`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
	/// The directory already held a clean extraction of the current archive.
	AlreadyCurrent,
	/// The payload was (re-)extracted by this call.
	Extracted,
}

/// Owns one private working directory and the archive it is extracted from.
#[derive(Debug, Clone)]
pub struct Unpacker {
	dir: PathBuf,
	archive: Arc<dyn Archive>,
	layout: PayloadLayout,
}

impl Unpacker {
	pub fn new(dir: impl Into<PathBuf>, archive: Arc<dyn Archive>, layout: PayloadLayout) -> Self {
		Self {
			dir: dir.into(),
			archive,
			layout,
		}
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	pub fn archive(&self) -> &Arc<dyn Archive> {
		&self.archive
	}

	pub fn layout(&self) -> &PayloadLayout {
		&self.layout
	}

	pub fn payload_path(&self) -> PathBuf {
		self.dir.join(PAYLOAD_FILE)
	}

	pub fn modules_dir(&self) -> PathBuf {
		self.dir.join(MODULES_DIR)
	}

	pub fn state(&self) -> ExtractionState {
		state::read(&self.dir)
	}

	/// Fingerprint recorded by the last extraction, if any.
	pub fn stored_fingerprint(&self) -> Option<Fingerprint> {
		fs::read(self.dir.join(FINGERPRINT_FILE)).ok().map(Fingerprint::from)
	}

	/// Makes the payload for the archive's current version available in the working
	/// directory, extracting it unless a clean extraction of that version is present.
	pub fn ensure_available(&self) -> Result<EnsureOutcome> {
		ensure_dir(&self.dir)?;
		let _lock = self.lock()?;

		let current = self.current_fingerprint()?;
		if self.state() == ExtractionState::Clean && self.stored_fingerprint().as_ref() == Some(&current) {
			tracing::debug!(dir = %self.dir.display(), "payload already current");
			return Ok(EnsureOutcome::AlreadyCurrent);
		}

		self.extract(&current)?;
		Ok(EnsureOutcome::Extracted)
	}

	/// Reads the extracted manifest, verifying its framing against the archive's
	/// current fingerprint.
	pub fn read_payload(&self) -> Result<Vec<u8>> {
		let path = self.payload_path();
		let bytes = fs::read(&path).map_err(UnpackError::io("read", &path))?;
		let current = self.current_fingerprint()?;
		payload::decode(&bytes, &current)
			.map(<[u8]>::to_vec)
			.map_err(|defect| UnpackError::CorruptPayload { path, defect })
	}

	/// Checks that the directory holds a clean, current, well-formed extraction.
	pub fn verify(&self) -> Result<()> {
		let current = self.current_fingerprint()?;
		if self.state() != ExtractionState::Clean || self.stored_fingerprint().as_ref() != Some(&current) {
			return Err(UnpackError::NotCurrent { dir: self.dir.clone() });
		}
		self.read_payload()?;
		if self.layout.module_prefix.is_some() && !self.modules_dir().is_dir() {
			return Err(UnpackError::NotCurrent { dir: self.dir.clone() });
		}
		Ok(())
	}

	/// Marks the directory dirty and deletes its payload, forcing the next
	/// [`ensure_available`](Self::ensure_available) to re-extract.
	pub fn invalidate(&self) -> Result<()> {
		if !self.dir.is_dir() {
			return Ok(());
		}
		let _lock = self.lock()?;
		state::write(&self.dir, ExtractionState::Dirty).map_err(UnpackError::io("mark dirty", &self.dir))?;

		for file in [PAYLOAD_FILE, FINGERPRINT_FILE] {
			let path = self.dir.join(file);
			remove_if_present(fs::remove_file(&path)).map_err(UnpackError::io("remove", &path))?;
		}
		let modules = self.modules_dir();
		remove_if_present(fs::remove_dir_all(&modules)).map_err(UnpackError::io("remove", &modules))?;
		sync_dir(&self.dir).map_err(UnpackError::io("sync", &self.dir))?;

		tracing::info!(dir = %self.dir.display(), "invalidated extraction");
		Ok(())
	}

	/// Takes the directory lock, noting when another caller already holds it.
	fn lock(&self) -> Result<DirLock> {
		let lock = |error: io::Error| UnpackError::io("lock", &self.dir)(error);
		if let Some(held) = DirLock::try_acquire(&self.dir).map_err(lock)? {
			return Ok(held);
		}
		tracing::debug!(dir = %self.dir.display(), "waiting for another extraction to finish");
		DirLock::acquire(&self.dir).map_err(lock)
	}

	fn current_fingerprint(&self) -> Result<Fingerprint> {
		if !self.archive.exists() {
			return Err(UnpackError::ArchiveMissing {
				archive: self.archive.describe(),
			});
		}
		self.archive.fingerprint().map_err(UnpackError::io("fingerprint", self.archive.describe()))
	}

	/// Runs the write sequence. The caller holds the directory lock.
	fn extract(&self, current: &Fingerprint) -> Result<()> {
		let dir = &self.dir;
		state::write(dir, ExtractionState::Dirty).map_err(UnpackError::io("mark dirty", dir))?;
		sync_dir(dir).map_err(UnpackError::io("sync", dir))?;

		let manifest = self.read_entry(&self.layout.manifest_entry)?;
		write_replacing(dir, PAYLOAD_FILE, |out| payload::write(out, current, &manifest))?;

		let mut modules = 0;
		if let Some(prefix) = &self.layout.module_prefix {
			modules = self.extract_modules(prefix)?;
		}

		write_replacing(dir, FINGERPRINT_FILE, |out| out.write_all(current.as_bytes()))?;
		sync_tree(dir, LOCK_FILE).map_err(UnpackError::io("sync", dir))?;

		state::write(dir, ExtractionState::Clean).map_err(UnpackError::io("mark clean", dir))?;
		sync_dir(dir).map_err(UnpackError::io("sync", dir))?;

		tracing::info!(
			dir = %dir.display(),
			archive = %self.archive.describe(),
			manifest_bytes = manifest.len(),
			modules,
			"extracted payload"
		);
		Ok(())
	}

	fn open(&self, entry: &str) -> Result<(Box<dyn Read + Send>, u64)> {
		let missing = || UnpackError::MissingEntry {
			archive: self.archive.describe(),
			entry: entry.to_string(),
		};
		let size = self
			.archive
			.entry_size(entry)
			.map_err(UnpackError::io("size", entry))?
			.ok_or_else(missing)?;
		let stream = self
			.archive
			.open_entry(entry)
			.map_err(UnpackError::io("open", entry))?
			.ok_or_else(missing)?;
		Ok((stream, size))
	}

	/// Reads exactly the declared size of `entry`.
	fn read_entry(&self, entry: &str) -> Result<Vec<u8>> {
		let (stream, size) = self.open(entry)?;
		let mut data = Vec::with_capacity(size.min(1 << 20) as usize);
		stream
			.take(size)
			.read_to_end(&mut data)
			.map_err(UnpackError::io("read", entry))?;
		if (data.len() as u64) < size {
			return Err(UnpackError::Truncated {
				entry: entry.to_string(),
				expected: size,
				actual: data.len() as u64,
			});
		}
		Ok(data)
	}

	/// Extracts the files directly under `prefix` into a staging directory, then swaps
	/// it in as `lib/`.
	fn extract_modules(&self, prefix: &str) -> Result<usize> {
		let staging = self.dir.join(format!("{MODULES_DIR}{TEMP_SUFFIX}"));
		remove_if_present(fs::remove_dir_all(&staging)).map_err(UnpackError::io("remove", &staging))?;
		fs::create_dir(&staging).map_err(UnpackError::io("create", &staging))?;

		let entries = self
			.archive
			.entries()
			.map_err(UnpackError::io("list", self.archive.describe()))?;
		let mut count = 0;
		for entry in entries {
			let Some(name) = entry.strip_prefix(prefix) else {
				continue;
			};
			if name.is_empty() || name.contains('/') {
				continue;
			}
			let (stream, size) = self.open(&entry)?;
			let target = staging.join(name);
			let mut out = File::create(&target).map_err(UnpackError::io("create", &target))?;
			let copied = io::copy(&mut stream.take(size), &mut out).map_err(UnpackError::io("extract", &target))?;
			if copied < size {
				return Err(UnpackError::Truncated {
					entry,
					expected: size,
					actual: copied,
				});
			}
			out.sync_all().map_err(UnpackError::io("sync", &target))?;
			count += 1;
		}

		let modules = self.modules_dir();
		remove_if_present(fs::remove_dir_all(&modules)).map_err(UnpackError::io("remove", &modules))?;
		fs::rename(&staging, &modules).map_err(UnpackError::io("rename", &staging))?;
		Ok(count)
	}
}

/// Creates `dir`, replacing any non-directory occupying its path.
fn ensure_dir(dir: &Path) -> Result<()> {
	if let Ok(meta) = fs::symlink_metadata(dir)
		&& !meta.is_dir()
	{
		tracing::warn!(path = %dir.display(), "replacing non-directory at working directory path");
		fs::remove_file(dir).map_err(UnpackError::io("remove", dir))?;
	}
	fs::create_dir_all(dir).map_err(UnpackError::io("create", dir))
}

/// Writes `name` through a temporary sibling, flushes it, and renames it into place.
fn write_replacing(dir: &Path, name: &str, write: impl FnOnce(&mut BufWriter<File>) -> io::Result<()>) -> Result<()> {
	let temp = dir.join(format!("{name}{TEMP_SUFFIX}"));
	let target = dir.join(name);
	let file = File::create(&temp).map_err(UnpackError::io("create", &temp))?;
	let mut out = BufWriter::new(file);
	write(&mut out).map_err(UnpackError::io("write", &temp))?;
	let file = out.into_inner().map_err(|e| UnpackError::Io {
		action: "flush",
		path: temp.clone(),
		source: e.into_error(),
	})?;
	file.sync_all().map_err(UnpackError::io("sync", &temp))?;
	fs::rename(&temp, &target).map_err(UnpackError::io("rename", &temp))
}

fn remove_if_present(result: io::Result<()>) -> io::Result<()> {
	match result {
		Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
		other => other,
	}
}

#[cfg(test)]
mod tests;
