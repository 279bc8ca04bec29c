//! Precomputed dependency index shipped inside the application archive.
//!
//! The index is ASCII text, one library per line:
//!
//! ```text
//! <name> [dep_index ...]\n
//! ```
//!
//! Names carry neither the `lib` prefix nor the `.so` suffix; each `dep_index` is the
//! 0-based line number of a dependency. The whole text is validated when parsed, so a
//! lookup never discovers corruption halfway through a resolution.

use rustc_hash::FxHashMap;

use crate::{DependencySet, DescriptorError, ModuleName, Result};

#[derive(Debug)]
struct Entry {
	name: Box<str>,
	deps: Vec<usize>,
}

/// Parsed native-deps index.
#[derive(Debug, Default)]
pub struct DepsIndex {
	entries: Vec<Entry>,
	by_name: FxHashMap<Box<str>, usize>,
}

impl DepsIndex {
	pub fn parse(bytes: &[u8]) -> Result<Self> {
		let text = std::str::from_utf8(bytes).map_err(|_| DescriptorError::InvalidUtf8)?;
		let text = text.strip_suffix('\n').unwrap_or(text);

		let mut raw = Vec::new();
		if !text.is_empty() {
			for (index, line) in text.split('\n').enumerate() {
				let mut tokens = line.split_ascii_whitespace();
				let name = tokens.next().ok_or(DescriptorError::MissingName { line: index + 1 })?;
				raw.push((name, tokens));
			}
		}

		let count = raw.len();
		let mut index = DepsIndex {
			entries: Vec::with_capacity(count),
			by_name: FxHashMap::default(),
		};
		for (line, (name, tokens)) in raw.into_iter().enumerate() {
			let deps = tokens
				.map(|token| match token.parse::<usize>() {
					Ok(dep) if dep < count => Ok(dep),
					_ => Err(DescriptorError::BadIndex {
						line: line + 1,
						token: token.to_string(),
					}),
				})
				.collect::<Result<Vec<_>>>()?;
			index.by_name.entry(name.into()).or_insert(line);
			index.entries.push(Entry {
				name: name.into(),
				deps,
			});
		}

		tracing::debug!(libraries = index.entries.len(), "parsed native deps index");
		Ok(index)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn contains(&self, module: &ModuleName) -> bool {
		self.position(module).is_some()
	}

	/// Direct dependencies of `module`, or `None` if the index does not list it.
	pub fn dependencies(&self, module: &ModuleName) -> Option<DependencySet> {
		let entry = &self.entries[self.position(module)?];
		Some(
			entry
				.deps
				.iter()
				.map(|&dep| ModuleName::from_short(&self.entries[dep].name))
				.collect(),
		)
	}

	/// Every library the index lists, in line order.
	pub fn libraries(&self) -> impl Iterator<Item = ModuleName> + '_ {
		self.entries.iter().map(|entry| ModuleName::from_short(&entry.name))
	}

	fn position(&self, module: &ModuleName) -> Option<usize> {
		self.by_name.get(module.short_name()?).copied()
	}
}
