//! The process-level "load this module" primitive.
//!
//! The loader decides which modules to load, in what order and from where; actually
//! mapping a module into the process is delegated to a [`LoadPrimitive`]. The
//! primitive must tolerate being asked to load a module that is already loaded.

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use soload_deps::ModuleName;
use thiserror::Error;

/// Where a located module is loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
	/// A file on disk, loaded by path.
	File(PathBuf),
	/// A bare name handed to the platform's own search path.
	System(ModuleName),
}

impl fmt::Display for Location {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::File(path) => write!(f, "{}", path.display()),
			Self::System(name) => write!(f, "system path ({name})"),
		}
	}
}

/// The platform refused to load a module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PlatformError {
	/// Platform error code, when the primitive reports one.
	pub code: Option<i32>,
	pub message: String,
}

impl PlatformError {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			code: None,
			message: message.into(),
		}
	}

	pub fn with_code(mut self, code: i32) -> Self {
		self.code = Some(code);
		self
	}

	/// The loader rejected the file's ELF image, which usually means a damaged copy.
	///
	/// An image built for another machine is intact and is not counted here.
	pub fn is_corrupt_image(&self) -> bool {
		self.message.contains("ELF") && !self.is_wrong_abi()
	}

	/// The file was built for another machine.
	pub fn is_wrong_abi(&self) -> bool {
		self.message.contains("wrong ELF class") || self.message.contains("e_machine")
	}
}

/// Maps a located module into the process.
pub trait LoadPrimitive: Send + Sync {
	fn load(&self, location: &Location) -> Result<(), PlatformError>;
}

/// Open handles keyed by location.
///
/// The map lock is never held while a handle is being opened: library initializers
/// may re-enter the loader on this thread, or block on another thread that does.
/// Two callers racing on the same location may both open it; the first insert wins
/// and the duplicate handle is dropped.
struct Handles<H> {
	open: Mutex<FxHashMap<Location, H>>,
}

impl<H> Default for Handles<H> {
	fn default() -> Self {
		Self {
			open: Mutex::new(FxHashMap::default()),
		}
	}
}

impl<H> Handles<H> {
	fn len(&self) -> usize {
		self.open.lock().len()
	}

	fn contains(&self, location: &Location) -> bool {
		self.open.lock().contains_key(location)
	}

	fn get_or_open<E>(&self, location: &Location, open: impl FnOnce() -> Result<H, E>) -> Result<(), E> {
		if self.contains(location) {
			return Ok(());
		}
		let handle = open()?;
		self.open.lock().entry(location.clone()).or_insert(handle);
		Ok(())
	}
}

/// [`LoadPrimitive`] backed by the system dynamic linker.
///
/// Loaded libraries are never unloaded; handles are kept for the lifetime of the
/// primitive so a second load of the same location is a map lookup.
#[derive(Default)]
pub struct DlopenPrimitive {
	libraries: Handles<libloading::Library>,
}

impl DlopenPrimitive {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn loaded(&self) -> usize {
		self.libraries.len()
	}
}

impl fmt::Debug for DlopenPrimitive {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DlopenPrimitive")
			.field("loaded", &self.loaded())
			.finish()
	}
}

impl LoadPrimitive for DlopenPrimitive {
	fn load(&self, location: &Location) -> Result<(), PlatformError> {
		self.libraries.get_or_open(location, || {
			let target: OsString = match location {
				Location::File(path) => path.clone().into_os_string(),
				Location::System(name) => OsString::from(name.as_str()),
			};
			// SAFETY: running a library's initializers is the purpose of this primitive;
			// callers only hand it modules they intend to execute.
			let library = unsafe { libloading::Library::new(&target) }.map_err(|e| PlatformError::new(e.to_string()))?;
			tracing::debug!(location = %location, "dlopen succeeded");
			Ok(library)
		})
	}
}
