//! TOML loader configuration.
//!
//! ```toml
//! work_root = "/data/app/files"
//! primary_abi = "arm64-v8a"
//!
//! [deps_manifest]
//! archive = "/data/app/base"
//!
//! [[sources]]
//! kind = "split"
//! name = "camera"
//! archive = "/data/app/split_camera"
//!
//! [[sources]]
//! kind = "directory"
//! path = "/data/app/lib"
//!
//! [[sources]]
//! kind = "system"
//!
//! [recovery]
//! arm_backup_store = true
//! ```
//!
//! Archive paths name exploded archives ([`DirArchive`](soload_unpack::DirArchive)).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use soload_deps::Abi;
use thiserror::Error;

use crate::catalog::DEFAULT_ENTRY;

/// Errors that can occur when reading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error parsing TOML syntax or shape.
	#[error("TOML parse error: {0}")]
	Parse(#[from] toml::de::Error),

	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// `primary_abi` names no known ABI.
	#[error("unknown ABI: {0}")]
	UnknownAbi(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderConfig {
	/// Private working root; unpack directories are created below it.
	pub work_root: PathBuf,
	#[serde(default = "default_abi")]
	pub primary_abi: String,
	#[serde(default)]
	pub deps_manifest: Option<DepsManifestConfig>,
	/// Providers, in resolution order.
	#[serde(default)]
	pub sources: Vec<SourceConfig>,
	#[serde(default)]
	pub recovery: RecoveryConfig,
}

/// Location of the archive-wide native-deps index.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DepsManifestConfig {
	pub archive: PathBuf,
	#[serde(default = "default_entry")]
	pub entry: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
	Directory {
		path: PathBuf,
		/// `false` for directories on the platform linker's own search path.
		#[serde(default = "default_true")]
		resolve_dependencies: bool,
	},
	Split {
		name: String,
		archive: PathBuf,
	},
	Backup {
		path: PathBuf,
		/// Merged module name to host library name.
		#[serde(default)]
		merged: BTreeMap<String, String>,
	},
	System,
}

/// Toggles for the canonical recovery strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecoveryConfig {
	pub check_archive_exists: bool,
	pub purge_stale_unpack: bool,
	pub arm_backup_store: bool,
}

impl Default for RecoveryConfig {
	fn default() -> Self {
		Self {
			check_archive_exists: true,
			purge_stale_unpack: true,
			arm_backup_store: false,
		}
	}
}

fn default_abi() -> String {
	crate::DEFAULT_ABI.name().to_string()
}

fn default_entry() -> String {
	DEFAULT_ENTRY.to_string()
}

fn default_true() -> bool {
	true
}

impl LoaderConfig {
	pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(text)?;
		config.abi()?;
		Ok(config)
	}

	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		let config = Self::from_toml_str(&text)?;
		tracing::debug!(path = %path.display(), sources = config.sources.len(), "loaded config");
		Ok(config)
	}

	pub fn abi(&self) -> Result<Abi, ConfigError> {
		Abi::from_name(&self.primary_abi).ok_or_else(|| ConfigError::UnknownAbi(self.primary_abi.clone()))
	}
}
