use std::collections::BTreeMap;
use std::io::{self, Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::Archive;
use crate::Fingerprint;

/// An archive held in memory.
///
/// Entries, fingerprint and presence can be changed while the archive is shared,
/// which is how an application update or a deleted package is simulated. Every
/// [`Archive::open_entry`] call is counted.
#[derive(Debug)]
pub struct MemArchive {
	name: String,
	inner: RwLock<Inner>,
	opened: AtomicUsize,
}

#[derive(Debug)]
struct Inner {
	entries: BTreeMap<String, Vec<u8>>,
	declared_sizes: BTreeMap<String, u64>,
	fingerprint: Fingerprint,
	present: bool,
}

impl MemArchive {
	pub fn new(name: impl Into<String>, fingerprint: impl Into<Fingerprint>) -> Self {
		Self {
			name: name.into(),
			inner: RwLock::new(Inner {
				entries: BTreeMap::new(),
				declared_sizes: BTreeMap::new(),
				fingerprint: fingerprint.into(),
				present: true,
			}),
			opened: AtomicUsize::new(0),
		}
	}

	pub fn with_entry(self, path: &str, data: impl Into<Vec<u8>>) -> Self {
		self.insert(path, data);
		self
	}

	pub fn insert(&self, path: &str, data: impl Into<Vec<u8>>) {
		self.inner.write().entries.insert(path.to_string(), data.into());
	}

	pub fn remove(&self, path: &str) {
		let mut inner = self.inner.write();
		inner.entries.remove(path);
		inner.declared_sizes.remove(path);
	}

	pub fn set_fingerprint(&self, fingerprint: impl Into<Fingerprint>) {
		self.inner.write().fingerprint = fingerprint.into();
	}

	pub fn set_present(&self, present: bool) {
		self.inner.write().present = present;
	}

	/// Makes [`Archive::entry_size`] report `size` for `path` regardless of its data,
	/// so a stream shorter than its declared size can be produced.
	pub fn declare_size(&self, path: &str, size: u64) {
		self.inner.write().declared_sizes.insert(path.to_string(), size);
	}

	/// Number of entry streams opened so far.
	pub fn open_count(&self) -> usize {
		self.opened.load(Ordering::SeqCst)
	}
}

impl Archive for MemArchive {
	fn describe(&self) -> String {
		format!("memory archive {}", self.name)
	}

	fn exists(&self) -> bool {
		self.inner.read().present
	}

	fn entries(&self) -> io::Result<Vec<String>> {
		Ok(self.inner.read().entries.keys().cloned().collect())
	}

	fn open_entry(&self, path: &str) -> io::Result<Option<Box<dyn Read + Send>>> {
		let data = self.inner.read().entries.get(path).cloned();
		Ok(data.map(|data| {
			self.opened.fetch_add(1, Ordering::SeqCst);
			Box::new(Cursor::new(data)) as Box<dyn Read + Send>
		}))
	}

	fn entry_size(&self, path: &str) -> io::Result<Option<u64>> {
		let inner = self.inner.read();
		let actual = inner.entries.get(path).map(|data| data.len() as u64);
		Ok(actual.map(|len| inner.declared_sizes.get(path).copied().unwrap_or(len)))
	}

	fn fingerprint(&self) -> io::Result<Fingerprint> {
		let inner = self.inner.read();
		if !inner.present {
			return Err(io::Error::new(io::ErrorKind::NotFound, format!("{} is gone", self.name)));
		}
		Ok(inner.fingerprint.clone())
	}
}
