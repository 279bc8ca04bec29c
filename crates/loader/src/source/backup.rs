use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use rustc_hash::FxHashMap;
use soload_deps::ModuleName;

use super::{ModuleHandle, Resolution, SourceKind};

/// Flat fallback store of module files.
///
/// Modules merged into a host library at build time are listed as aliases; asking
/// for an alias yields the host. The store answers `Absent` for everything until it
/// is armed, which recovery does once the primary sources have failed a module.
#[derive(Debug)]
pub struct BackupSource {
	root: PathBuf,
	merged: FxHashMap<ModuleName, ModuleName>,
	armed: AtomicBool,
}

impl BackupSource {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self {
			root: root.into(),
			merged: FxHashMap::default(),
			armed: AtomicBool::new(false),
		}
	}

	/// Records that `module` was merged into `host`.
	pub fn with_merged(mut self, module: impl Into<ModuleName>, host: impl Into<ModuleName>) -> Self {
		self.merged.insert(module.into(), host.into());
		self
	}

	pub fn armed(self) -> Self {
		self.arm();
		self
	}

	pub fn arm(&self) {
		if !self.armed.swap(true, Ordering::AcqRel) {
			tracing::info!(root = %self.root.display(), "backup store armed");
		}
	}

	pub fn is_armed(&self) -> bool {
		self.armed.load(Ordering::Acquire)
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// The library that actually provides `module`.
	pub fn host_of<'a>(&'a self, module: &'a ModuleName) -> &'a ModuleName {
		self.merged.get(module).unwrap_or(module)
	}

	/// Whether the store has a file for `module`, armed or not.
	pub fn holds(&self, module: &ModuleName) -> bool {
		self.root.join(self.host_of(module).as_str()).is_file()
	}

	pub fn resolve(&self, module: &ModuleName) -> Resolution {
		if !self.is_armed() {
			return Resolution::Absent;
		}
		let host = self.host_of(module);
		let path = self.root.join(host.as_str());
		if !path.is_file() {
			return Resolution::Absent;
		}
		if host != module {
			tracing::debug!(module = %module, host = %host, "resolved merged module to its host");
		}
		Resolution::Found(ModuleHandle::file(host.clone(), path, SourceKind::Backup))
	}

	pub fn describe(&self) -> String {
		format!("backup store {}", self.root.display())
	}
}
