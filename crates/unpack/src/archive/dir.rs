use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use super::Archive;
use crate::{Fingerprint, FingerprintBuilder};

const COMPRESSED_SUFFIX: &str = ".br";
const BROTLI_BUFFER: usize = 4096;
const FINGERPRINT_VERSION: u8 = 2;

/// An exploded archive on disk.
///
/// Entries are the regular files below `root`. A file named `<entry>.br` is a
/// brotli-compressed entry and is served decompressed under `<entry>`.
///
/// Installers identify a release by rewriting [`VERSION_ENTRY`](Self::VERSION_ENTRY);
/// files replaced below the root without touching it keep the old fingerprint.
#[derive(Debug, Clone)]
pub struct DirArchive {
	root: PathBuf,
}

enum Located {
	Plain(PathBuf),
	Compressed(PathBuf),
}

impl DirArchive {
	/// Top-level entry holding the installed release's version.
	pub const VERSION_ENTRY: &str = "version";

	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	fn locate(&self, entry: &str) -> Option<Located> {
		let relative = Path::new(entry);
		if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
			return None;
		}
		let plain = self.root.join(relative);
		if plain.is_file() {
			return Some(Located::Plain(plain));
		}
		let compressed = self.root.join(format!("{entry}{COMPRESSED_SUFFIX}"));
		compressed.is_file().then_some(Located::Compressed(compressed))
	}

	fn walk(&self, dir: &Path, prefix: &str, out: &mut Vec<(String, fs::Metadata)>) -> io::Result<()> {
		for entry in fs::read_dir(dir)? {
			let entry = entry?;
			let name = entry.file_name().to_string_lossy().into_owned();
			let path = format!("{prefix}{name}");
			let meta = entry.metadata()?;
			if meta.is_dir() {
				self.walk(&entry.path(), &format!("{path}/"), out)?;
			} else if meta.is_file() {
				out.push((path, meta));
			}
		}
		Ok(())
	}

	fn files(&self) -> io::Result<Vec<(String, fs::Metadata)>> {
		let mut files = Vec::new();
		self.walk(&self.root, "", &mut files)?;
		files.sort_by(|a, b| a.0.cmp(&b.0));
		Ok(files)
	}
}

impl Archive for DirArchive {
	fn describe(&self) -> String {
		format!("archive {}", self.root.display())
	}

	fn exists(&self) -> bool {
		self.root.is_dir()
	}

	fn entries(&self) -> io::Result<Vec<String>> {
		let mut entries: Vec<String> = self
			.files()?
			.into_iter()
			.map(|(path, _)| match path.strip_suffix(COMPRESSED_SUFFIX) {
				Some(stripped) => stripped.to_string(),
				None => path,
			})
			.collect();
		entries.sort();
		entries.dedup();
		Ok(entries)
	}

	fn open_entry(&self, path: &str) -> io::Result<Option<Box<dyn Read + Send>>> {
		Ok(match self.locate(path) {
			Some(Located::Plain(file)) => Some(Box::new(File::open(file)?)),
			Some(Located::Compressed(file)) => Some(Box::new(brotli::Decompressor::new(File::open(file)?, BROTLI_BUFFER))),
			None => None,
		})
	}

	fn entry_size(&self, path: &str) -> io::Result<Option<u64>> {
		match self.locate(path) {
			Some(Located::Plain(file)) => Ok(Some(fs::metadata(file)?.len())),
			Some(Located::Compressed(file)) => {
				let mut stream = brotli::Decompressor::new(File::open(file)?, BROTLI_BUFFER);
				Ok(Some(io::copy(&mut stream, &mut io::sink())?))
			}
			None => Ok(None),
		}
	}

	/// Canonical root path, the root's modification time and the version entry.
	///
	/// Never walks the stored entries.
	fn fingerprint(&self) -> io::Result<Fingerprint> {
		let canonical = fs::canonicalize(&self.root)?;
		let root_mtime = mtime(&fs::metadata(&canonical)?)?;
		let builder = FingerprintBuilder::new(FINGERPRINT_VERSION)
			.str(&canonical.to_string_lossy())
			.u64(root_mtime.as_secs())
			.u64(u64::from(root_mtime.subsec_nanos()));

		let version = match fs::read(canonical.join(Self::VERSION_ENTRY)) {
			Ok(version) => Some(version),
			Err(e) if e.kind() == io::ErrorKind::NotFound => None,
			Err(e) => return Err(e),
		};
		Ok(match version {
			Some(version) => builder.u64(1).bytes(&version),
			None => builder.u64(0),
		}
		.finish())
	}
}

fn mtime(meta: &fs::Metadata) -> io::Result<Duration> {
	Ok(meta.modified()?.duration_since(UNIX_EPOCH).unwrap_or_default())
}
