//! Archive-wide precomputed dependency index.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwapOption;
use soload_deps::{DependencySet, DepsIndex, ModuleName};
use soload_unpack::{Archive, PayloadLayout, UnpackError, Unpacker};

use crate::error::LoadError;

/// Working directory for the catalog below the loader's work root.
pub const CATALOG_DIR: &str = "native_deps";

/// Where the index lives inside the application archive unless configured otherwise.
pub const DEFAULT_ENTRY: &str = "assets/native_deps.txt";

/// The native-deps index of the application archive, extracted and parsed on first use.
///
/// Lookups for modules the index does not list return `Ok(None)`; the resolver then
/// falls back to reading the module's own descriptor. An index that extracts cleanly
/// but does not parse is set aside the same way until the next [`invalidate`](Self::invalidate).
#[derive(Debug)]
pub struct DepsCatalog {
	unpacker: Unpacker,
	index: ArcSwapOption<DepsIndex>,
	unusable: AtomicBool,
}

impl DepsCatalog {
	pub fn new(unpacker: Unpacker) -> Self {
		Self {
			unpacker,
			index: ArcSwapOption::empty(),
			unusable: AtomicBool::new(false),
		}
	}

	/// Catalog for `archive` at [`DEFAULT_ENTRY`], unpacked into `work_root/native_deps`.
	pub fn for_archive(archive: Arc<dyn Archive>, work_root: &Path) -> Self {
		Self::with_entry(archive, work_root, DEFAULT_ENTRY)
	}

	pub fn with_entry(archive: Arc<dyn Archive>, work_root: &Path, entry: impl Into<String>) -> Self {
		Self::new(Unpacker::new(work_root.join(CATALOG_DIR), archive, PayloadLayout::manifest(entry)))
	}

	pub fn unpacker(&self) -> &Unpacker {
		&self.unpacker
	}

	/// Direct dependencies of `module` according to the index.
	///
	/// Extraction failures propagate so recovery can purge the working directory.
	pub fn dependencies(&self, module: &ModuleName) -> Result<Option<DependencySet>, LoadError> {
		Ok(self.index(module)?.and_then(|index| index.dependencies(module)))
	}

	/// True once the extracted index failed to parse.
	pub fn is_unusable(&self) -> bool {
		self.unusable.load(Ordering::Acquire)
	}

	/// True when an extraction exists on disk but is not clean and current.
	pub fn needs_purge(&self) -> bool {
		self.unpacker.dir().is_dir() && self.unpacker.verify().is_err()
	}

	/// Forgets the parsed index and invalidates the extraction on disk.
	pub fn invalidate(&self) -> Result<(), UnpackError> {
		self.index.store(None);
		self.unusable.store(false, Ordering::Release);
		self.unpacker.invalidate()
	}

	fn index(&self, module: &ModuleName) -> Result<Option<Arc<DepsIndex>>, LoadError> {
		if let Some(index) = self.index.load_full() {
			return Ok(Some(index));
		}
		if self.is_unusable() {
			return Ok(None);
		}

		let extraction = |source| LoadError::ExtractionFailed {
			module: module.clone(),
			source,
		};
		self.unpacker.ensure_available().map_err(extraction)?;
		let bytes = self.unpacker.read_payload().map_err(extraction)?;
		let index = match DepsIndex::parse(&bytes) {
			Ok(index) => index,
			Err(error) => {
				tracing::warn!(dir = %self.unpacker.dir().display(), %error, "native deps index unusable, reading module descriptors instead");
				self.unusable.store(true, Ordering::Release);
				return Ok(None);
			}
		};

		tracing::debug!(libraries = index.len(), dir = %self.unpacker.dir().display(), "native deps index ready");
		let index = Arc::new(index);
		self.index.store(Some(index.clone()));
		Ok(Some(index))
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use soload_unpack::MemArchive;

	use super::*;
	use crate::error::ErrorKind;

	fn catalog(text: &str) -> (tempfile::TempDir, Arc<MemArchive>, DepsCatalog) {
		let work = tempfile::tempdir().unwrap();
		let archive = Arc::new(MemArchive::new("app.apk", "v1").with_entry(DEFAULT_ENTRY, text.as_bytes().to_vec()));
		let catalog = DepsCatalog::for_archive(archive.clone(), work.path());
		(work, archive, catalog)
	}

	#[test]
	fn looks_up_through_the_extracted_index() {
		let (_work, archive, catalog) = catalog("a 1 2\nb 2\nc\n");
		assert_eq!(
			catalog.dependencies(&"liba.so".into()).unwrap(),
			Some(vec![ModuleName::new("libb.so"), ModuleName::new("libc.so")])
		);
		assert_eq!(catalog.dependencies(&"libc.so".into()).unwrap(), Some(vec![]));
		assert_eq!(catalog.dependencies(&"libz.so".into()).unwrap(), None);
		assert_eq!(archive.open_count(), 1);
		assert!(!catalog.needs_purge());
	}

	#[test]
	fn unparsable_index_is_set_aside() {
		let (_work, archive, catalog) = catalog("a 7\n");
		assert_eq!(catalog.dependencies(&"liba.so".into()).unwrap(), None);
		assert!(catalog.is_unusable());
		assert_eq!(catalog.dependencies(&"libb.so".into()).unwrap(), None);
		assert_eq!(archive.open_count(), 1);

		archive.insert(DEFAULT_ENTRY, b"a 1\nb\n".to_vec());
		catalog.invalidate().unwrap();
		assert!(!catalog.is_unusable());
		assert_eq!(
			catalog.dependencies(&"liba.so".into()).unwrap(),
			Some(vec![ModuleName::new("libb.so")])
		);
	}

	#[test]
	fn missing_entry_is_an_extraction_failure() {
		let work = tempfile::tempdir().unwrap();
		let archive = Arc::new(MemArchive::new("app.apk", "v1"));
		let catalog = DepsCatalog::for_archive(archive, work.path());
		let err = catalog.dependencies(&"liba.so".into()).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::ExtractionFailed);
		assert!(catalog.needs_purge());
	}

	#[test]
	fn invalidate_forces_a_fresh_extraction() {
		let (_work, archive, catalog) = catalog("a\n");
		catalog.dependencies(&"liba.so".into()).unwrap();
		archive.insert(DEFAULT_ENTRY, b"a 1\nb\n".to_vec());
		assert_eq!(catalog.dependencies(&"liba.so".into()).unwrap(), Some(vec![]));

		catalog.invalidate().unwrap();
		assert_eq!(
			catalog.dependencies(&"liba.so".into()).unwrap(),
			Some(vec![ModuleName::new("libb.so")])
		);
		assert_eq!(archive.open_count(), 2);
	}
}
