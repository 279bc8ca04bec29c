use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use soload_deps::{Abi, ModuleName, SplitManifest};
use soload_unpack::{Archive, PayloadLayout, UnpackError, Unpacker};

use super::{ModuleHandle, Resolution, SourceKind};
use crate::error::LoadError;

const STORE_PREFIX: &str = "lib-";

#[derive(Debug)]
struct Prepared {
	manifest: SplitManifest,
}

/// A named split of the application archive.
///
/// The first resolution of any module extracts the split's manifest and module files
/// into a private directory through an [`Unpacker`]; afterwards the split behaves like
/// a directory source over the extracted `lib/` directory, restricted to the modules
/// its manifest lists.
#[derive(Debug)]
pub struct SplitSource {
	name: String,
	abi: Abi,
	unpacker: Unpacker,
	prepared: ArcSwapOption<Prepared>,
}

impl SplitSource {
	/// Split `name` of `archive`, unpacked below `work_root` in `lib-<name>`.
	///
	/// The archive carries the manifest at `assets/<name>.soloader-manifest` and the
	/// modules under `lib/<abi>/`.
	pub fn new(name: impl Into<String>, archive: Arc<dyn Archive>, work_root: &Path, abi: Abi) -> Self {
		let name = name.into();
		let layout = PayloadLayout::manifest(format!("assets/{name}.soloader-manifest")).with_modules(format!("lib/{abi}"));
		let unpacker = Unpacker::new(work_root.join(format!("{STORE_PREFIX}{name}")), archive, layout);
		Self::with_unpacker(name, unpacker, abi)
	}

	pub fn with_unpacker(name: impl Into<String>, unpacker: Unpacker, abi: Abi) -> Self {
		Self {
			name: name.into(),
			abi,
			unpacker,
			prepared: ArcSwapOption::empty(),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn unpacker(&self) -> &Unpacker {
		&self.unpacker
	}

	pub fn resolve(&self, module: &ModuleName) -> Resolution {
		let prepared = match self.prepare(module) {
			Ok(prepared) => prepared,
			Err(error) => return Resolution::Failed(error),
		};
		if !prepared.manifest.contains(module) {
			return Resolution::Absent;
		}
		let path = self.unpacker.modules_dir().join(module.as_str());
		if !path.is_file() {
			return Resolution::Failed(LoadError::ExtractionFailed {
				module: module.clone(),
				source: UnpackError::NotCurrent {
					dir: self.unpacker.dir().to_path_buf(),
				},
			});
		}
		Resolution::Found(ModuleHandle::file(module.clone(), path, SourceKind::Split))
	}

	/// Whether the split's manifest lists `module`, if the split has been prepared.
	pub fn provides(&self, module: &ModuleName) -> bool {
		self.prepared
			.load_full()
			.is_some_and(|prepared| prepared.manifest.contains(module))
	}

	/// True when an extraction exists on disk but is not clean, current, and complete.
	pub fn needs_purge(&self) -> bool {
		if !self.unpacker.dir().is_dir() {
			return false;
		}
		if self.unpacker.verify().is_err() {
			return true;
		}
		let modules = self.unpacker.modules_dir();
		self.prepared.load_full().is_some_and(|prepared| {
			prepared
				.manifest
				.libraries
				.iter()
				.any(|lib| !modules.join(lib.as_str()).is_file())
		})
	}

	/// Forgets the prepared manifest and invalidates the extraction on disk.
	pub fn invalidate(&self) -> Result<(), UnpackError> {
		self.prepared.store(None);
		self.unpacker.invalidate()
	}

	pub fn describe(&self) -> String {
		format!("split {} ({})", self.name, self.unpacker.dir().display())
	}

	fn prepare(&self, module: &ModuleName) -> Result<Arc<Prepared>, LoadError> {
		if let Some(prepared) = self.prepared.load_full() {
			return Ok(prepared);
		}

		let extraction = |source| LoadError::ExtractionFailed {
			module: module.clone(),
			source,
		};
		let malformed = |source| LoadError::MalformedDescriptor {
			module: module.clone(),
			source,
		};
		self.unpacker.ensure_available().map_err(extraction)?;
		let bytes = self.unpacker.read_payload().map_err(extraction)?;
		let manifest = SplitManifest::parse(&bytes).map_err(malformed)?;
		manifest.require_abi(self.abi).map_err(malformed)?;

		tracing::debug!(split = %self.name, modules = manifest.libraries.len(), "split prepared");
		let prepared = Arc::new(Prepared { manifest });
		self.prepared.store(Some(prepared.clone()));
		Ok(prepared)
	}
}
