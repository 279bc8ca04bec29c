//! Read-only archive capability.

use std::fmt;
use std::io::{self, Read};

use crate::Fingerprint;

mod dir;
mod mem;

pub use dir::DirArchive;
pub use mem::MemArchive;

/// A read-only, possibly-compressed package of entries addressed by `/`-separated
/// relative paths.
pub trait Archive: Send + Sync + fmt::Debug {
	/// Human-readable identity for logs and errors.
	fn describe(&self) -> String;

	/// Whether the archive is still present at all.
	fn exists(&self) -> bool;

	/// Every entry path, sorted.
	fn entries(&self) -> io::Result<Vec<String>>;

	/// Opens an entry for streaming, or `None` if there is no such entry.
	fn open_entry(&self, path: &str) -> io::Result<Option<Box<dyn Read + Send>>>;

	/// Uncompressed size of an entry, or `None` if there is no such entry.
	fn entry_size(&self, path: &str) -> io::Result<Option<u64>>;

	/// Identity of the archive's current version.
	fn fingerprint(&self) -> io::Result<Fingerprint>;
}
