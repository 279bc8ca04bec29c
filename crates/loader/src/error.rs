//! Load failure taxonomy.

use std::fmt;

use soload_deps::{DescriptorError, ModuleName};
use soload_unpack::UnpackError;
use thiserror::Error;

use crate::platform::{Location, PlatformError};

/// Coarse classification of a [`LoadError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	MalformedDescriptor,
	ExtractionFailed,
	UnresolvedDependency,
	CyclicDependency,
	PlatformLoad,
}

impl ErrorKind {
	/// Whether the recovery pipeline is consulted for this kind.
	///
	/// Bad metadata and dependency cycles are data bugs that no on-disk remediation
	/// can fix.
	pub fn is_recoverable(self) -> bool {
		matches!(self, Self::ExtractionFailed | Self::UnresolvedDependency | Self::PlatformLoad)
	}
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::MalformedDescriptor => "malformed descriptor",
			Self::ExtractionFailed => "extraction failed",
			Self::UnresolvedDependency => "unresolved dependency",
			Self::CyclicDependency => "cyclic dependency",
			Self::PlatformLoad => "platform load error",
		})
	}
}

/// Terminal failure of a load request, naming the module that caused it.
#[derive(Debug, Error)]
pub enum LoadError {
	/// A module's dependency metadata could not be parsed.
	#[error("malformed dependency descriptor for {module}: {source}")]
	MalformedDescriptor {
		module: ModuleName,
		#[source]
		source: DescriptorError,
	},

	/// Extracting or reading an unpacked payload failed.
	#[error("extraction failed while loading {module}: {source}")]
	ExtractionFailed {
		module: ModuleName,
		#[source]
		source: UnpackError,
	},

	/// No source in the chain provides the module.
	#[error("{module} not found in any source{}", requested_by(.requester))]
	UnresolvedDependency {
		module: ModuleName,
		/// The module whose dependency list named it, if it was not the top-level request.
		requester: Option<ModuleName>,
	},

	/// The dependency walk re-entered a module that was still being resolved.
	#[error("dependency cycle through {module}: {}", render_cycle(.cycle))]
	CyclicDependency {
		module: ModuleName,
		/// The walk from the first visit of `module` back to it.
		cycle: Vec<ModuleName>,
	},

	/// The platform load primitive refused the module.
	#[error("failed to load {module} from {location}: {source}")]
	PlatformLoad {
		module: ModuleName,
		location: Location,
		#[source]
		source: PlatformError,
	},
}

impl LoadError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::MalformedDescriptor { .. } => ErrorKind::MalformedDescriptor,
			Self::ExtractionFailed { .. } => ErrorKind::ExtractionFailed,
			Self::UnresolvedDependency { .. } => ErrorKind::UnresolvedDependency,
			Self::CyclicDependency { .. } => ErrorKind::CyclicDependency,
			Self::PlatformLoad { .. } => ErrorKind::PlatformLoad,
		}
	}

	/// The module the failure is attributed to.
	pub fn module(&self) -> &ModuleName {
		match self {
			Self::MalformedDescriptor { module, .. }
			| Self::ExtractionFailed { module, .. }
			| Self::UnresolvedDependency { module, .. }
			| Self::CyclicDependency { module, .. }
			| Self::PlatformLoad { module, .. } => module,
		}
	}

	pub(crate) fn descriptor(module: &ModuleName, path: &std::path::Path, error: DescriptorError) -> Self {
		match error {
			DescriptorError::Io(source) => Self::ExtractionFailed {
				module: module.clone(),
				source: UnpackError::Io {
					action: "read",
					path: path.to_path_buf(),
					source,
				},
			},
			source => Self::MalformedDescriptor {
				module: module.clone(),
				source,
			},
		}
	}
}

fn requested_by(requester: &Option<ModuleName>) -> String {
	match requester {
		Some(requester) => format!(" (required by {requester})"),
		None => String::new(),
	}
}

fn render_cycle(cycle: &[ModuleName]) -> String {
	cycle.iter().map(ModuleName::as_str).collect::<Vec<_>>().join(" -> ")
}

/// Result type for load operations.
pub type Result<T> = std::result::Result<T, LoadError>;
