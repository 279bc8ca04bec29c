//! Ordered providers of module locations.
//!
//! # Purpose
//!
//! Answers "where can module X be loaded from?" by asking a fixed, ordered list of
//! providers and taking the first positive answer.
//!
//! # Mental model
//!
//! Providers differ only in where their files come from:
//!
//! | Provider | Origin |
//! |---|---|
//! | [`DirectorySource`] | a directory of installed or previously unpacked files |
//! | [`SplitSource`] | a split of the application archive, unpacked on first use |
//! | [`BackupSource`] | a flat fallback store, optionally with merged-library aliases |
//! | [`SystemSource`] | the platform linker's own search path |
//!
//! Each answer is a [`Resolution`]: `Found` ends the walk, `Absent` moves on to the
//! next provider, `Failed` ends the walk with an error. Absence is never an error.
//!
//! # Invariants
//!
//! - The chain is assembled once and never reordered.
//! - Every provider attempt emits a source start/end pair on the observer bus.

use std::fmt;
use std::path::PathBuf;

use soload_deps::{DependencySet, ModuleName};

use crate::error::LoadError;
use crate::observer::ObserverRegistry;
use crate::platform::Location;

mod backup;
mod directory;
mod split;
mod system;

pub use backup::BackupSource;
pub use directory::DirectorySource;
pub use split::SplitSource;
pub use system::SystemSource;

/// Which kind of provider produced a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
	Directory,
	Split,
	Backup,
	System,
}

/// A located, loadable module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleHandle {
	/// The module that will actually be loaded. Differs from the requested name when
	/// the request was merged into a host library.
	pub module: ModuleName,
	pub location: Location,
	pub origin: SourceKind,
	/// Dependencies known without reading any descriptor. `Some(vec![])` means the
	/// platform resolves them itself.
	pub declared: Option<DependencySet>,
}

impl ModuleHandle {
	pub fn file(module: ModuleName, path: PathBuf, origin: SourceKind) -> Self {
		Self {
			module,
			location: Location::File(path),
			origin,
			declared: None,
		}
	}

	pub fn with_declared(mut self, declared: DependencySet) -> Self {
		self.declared = Some(declared);
		self
	}
}

/// One provider's answer for one module.
#[derive(Debug)]
pub enum Resolution {
	Found(ModuleHandle),
	Absent,
	Failed(LoadError),
}

/// A module provider.
#[derive(Debug)]
pub enum Source {
	Directory(DirectorySource),
	Split(SplitSource),
	Backup(BackupSource),
	System(SystemSource),
}

impl Source {
	pub fn resolve(&self, module: &ModuleName) -> Resolution {
		match self {
			Self::Directory(source) => source.resolve(module),
			Self::Split(source) => source.resolve(module),
			Self::Backup(source) => source.resolve(module),
			Self::System(source) => source.resolve(module),
		}
	}

	pub fn kind(&self) -> SourceKind {
		match self {
			Self::Directory(_) => SourceKind::Directory,
			Self::Split(_) => SourceKind::Split,
			Self::Backup(_) => SourceKind::Backup,
			Self::System(_) => SourceKind::System,
		}
	}

	pub fn describe(&self) -> String {
		match self {
			Self::Directory(source) => source.describe(),
			Self::Split(source) => source.describe(),
			Self::Backup(source) => source.describe(),
			Self::System(source) => source.describe(),
		}
	}
}

impl fmt::Display for Source {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.describe())
	}
}

impl From<DirectorySource> for Source {
	fn from(source: DirectorySource) -> Self {
		Self::Directory(source)
	}
}

impl From<SplitSource> for Source {
	fn from(source: SplitSource) -> Self {
		Self::Split(source)
	}
}

impl From<BackupSource> for Source {
	fn from(source: BackupSource) -> Self {
		Self::Backup(source)
	}
}

impl From<SystemSource> for Source {
	fn from(source: SystemSource) -> Self {
		Self::System(source)
	}
}

/// Fixed-order list of providers.
#[derive(Debug, Default)]
pub struct SourceChain {
	sources: Vec<Source>,
}

impl SourceChain {
	pub fn new(sources: Vec<Source>) -> Self {
		Self { sources }
	}

	pub fn with(mut self, source: impl Into<Source>) -> Self {
		self.sources.push(source.into());
		self
	}

	pub fn iter(&self) -> impl Iterator<Item = &Source> {
		self.sources.iter()
	}

	pub fn len(&self) -> usize {
		self.sources.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sources.is_empty()
	}

	pub fn splits(&self) -> impl Iterator<Item = &SplitSource> {
		self.sources.iter().filter_map(|source| match source {
			Source::Split(split) => Some(split),
			_ => None,
		})
	}

	pub fn backups(&self) -> impl Iterator<Item = &BackupSource> {
		self.sources.iter().filter_map(|source| match source {
			Source::Backup(backup) => Some(backup),
			_ => None,
		})
	}

	/// Asks each provider in order; the first `Found` or `Failed` answer wins.
	pub fn resolve(&self, module: &ModuleName, observers: &ObserverRegistry) -> Resolution {
		for source in &self.sources {
			observers.emit(|o| o.on_source_start(module, source));
			let resolution = source.resolve(module);
			let error = match &resolution {
				Resolution::Failed(error) => Some(error),
				_ => None,
			};
			observers.emit(|o| o.on_source_end(module, source, error));

			match resolution {
				Resolution::Absent => {
					tracing::trace!(module = %module, source = %source, "not found here");
				}
				Resolution::Found(handle) => {
					tracing::debug!(module = %module, source = %source, location = %handle.location, "found");
					return Resolution::Found(handle);
				}
				Resolution::Failed(error) => {
					tracing::debug!(module = %module, source = %source, %error, "source failed");
					return Resolution::Failed(error);
				}
			}
		}
		Resolution::Absent
	}
}

#[cfg(test)]
mod tests;
