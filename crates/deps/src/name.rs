//! Module identifiers.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

const PREFIX: &str = "lib";
const SUFFIX: &str = ".so";

/// Platform-canonical name of a native module, e.g. `libfoo.so`.
///
/// Cheap to clone; used as the deduplication key for a whole resolution run.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleName(Arc<str>);

impl ModuleName {
	pub fn new(name: impl AsRef<str>) -> Self {
		Self(Arc::from(name.as_ref()))
	}

	/// Maps a short library name to its canonical file name (`foo` -> `libfoo.so`).
	pub fn from_short(short: &str) -> Self {
		Self::new(format!("{PREFIX}{short}{SUFFIX}"))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Strips the `lib` prefix and `.so` suffix, if the name carries both.
	pub fn short_name(&self) -> Option<&str> {
		self.0
			.strip_prefix(PREFIX)
			.and_then(|rest| rest.strip_suffix(SUFFIX))
			.filter(|short| !short.is_empty())
	}

	/// Absolute-path dependencies are left to the platform linker.
	pub fn is_path(&self) -> bool {
		self.0.starts_with('/')
	}
}

impl fmt::Debug for ModuleName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(&*self.0, f)
	}
}

impl fmt::Display for ModuleName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl Borrow<str> for ModuleName {
	fn borrow(&self) -> &str {
		&self.0
	}
}

impl AsRef<str> for ModuleName {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

impl From<&str> for ModuleName {
	fn from(name: &str) -> Self {
		Self::new(name)
	}
}

impl From<String> for ModuleName {
	fn from(name: String) -> Self {
		Self(Arc::from(name))
	}
}

impl From<&ModuleName> for ModuleName {
	fn from(name: &ModuleName) -> Self {
		name.clone()
	}
}

/// Direct dependencies of one module, in declaration order. May be empty.
pub type DependencySet = Vec<ModuleName>;
