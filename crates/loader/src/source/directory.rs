use std::path::{Path, PathBuf};

use soload_deps::ModuleName;

use super::{ModuleHandle, Resolution, SourceKind};

/// Looks modules up by file name in one directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
	root: PathBuf,
	resolve_dependencies: bool,
}

impl DirectorySource {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self {
			root: root.into(),
			resolve_dependencies: true,
		}
	}

	/// A directory on the platform linker's own search path. The linker resolves
	/// dependencies of modules found here, so none are loaded explicitly.
	pub fn on_linker_path(root: impl Into<PathBuf>) -> Self {
		Self {
			root: root.into(),
			resolve_dependencies: false,
		}
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn resolve(&self, module: &ModuleName) -> Resolution {
		let path = self.root.join(module.as_str());
		if !path.is_file() {
			return Resolution::Absent;
		}
		let handle = ModuleHandle::file(module.clone(), path, SourceKind::Directory);
		Resolution::Found(if self.resolve_dependencies {
			handle
		} else {
			handle.with_declared(Vec::new())
		})
	}

	pub fn describe(&self) -> String {
		format!("directory {}", self.root.display())
	}
}
