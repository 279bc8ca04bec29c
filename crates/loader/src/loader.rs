use std::path::PathBuf;
use std::sync::Arc;

use soload_deps::{DependencySet, ModuleName};
use soload_unpack::{Archive, DirArchive};

use crate::catalog::DepsCatalog;
use crate::config::{ConfigError, LoaderConfig, SourceConfig};
use crate::error::LoadError;
use crate::observer::{self, ObserverRegistry};
use crate::platform::{LoadPrimitive, Location};
use crate::recovery::{RecoveryContext, RecoveryPipeline};
use crate::resolver::Resolver;
use crate::source::{BackupSource, DirectorySource, Source, SourceChain, SplitSource, SystemSource};

/// Result of a successful [`Loader::load_module`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loaded {
	/// The module that was requested.
	pub module: ModuleName,
	/// Every module handed to the platform primitive, dependencies first.
	pub loaded: Vec<ModuleName>,
	/// Whether recovery restarted the request.
	pub retried: bool,
}

/// Loads modules together with their dependencies, in dependency order.
///
/// Owns the source chain, the optional deps catalog and the recovery pipeline; all of
/// them are fixed at construction. Requests are independent of each other and may run
/// concurrently.
pub struct Loader {
	sources: SourceChain,
	catalog: Option<DepsCatalog>,
	recovery: RecoveryPipeline,
	platform: Arc<dyn LoadPrimitive>,
	observers: Arc<ObserverRegistry>,
}

impl std::fmt::Debug for Loader {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Loader")
			.field("sources", &self.sources)
			.field("catalog", &self.catalog)
			.field("recovery", &self.recovery)
			.field("observers", &self.observers)
			.finish_non_exhaustive()
	}
}

impl Loader {
	/// A loader over `sources` with the default recovery pipeline, reporting to the
	/// process-wide observer registry.
	pub fn new(sources: SourceChain, platform: Arc<dyn LoadPrimitive>) -> Self {
		Self {
			sources,
			catalog: None,
			recovery: RecoveryPipeline::standard(&Default::default()),
			platform,
			observers: observer::global(),
		}
	}

	pub fn with_catalog(mut self, catalog: DepsCatalog) -> Self {
		self.catalog = Some(catalog);
		self
	}

	pub fn with_recovery(mut self, recovery: RecoveryPipeline) -> Self {
		self.recovery = recovery;
		self
	}

	pub fn with_observers(mut self, observers: Arc<ObserverRegistry>) -> Self {
		self.observers = observers;
		self
	}

	/// Assembles sources, catalog and recovery as `config` describes them.
	pub fn from_config(config: &LoaderConfig, platform: Arc<dyn LoadPrimitive>) -> Result<Self, ConfigError> {
		let abi = config.abi()?;
		let sources = config
			.sources
			.iter()
			.map(|source| -> Source {
				match source {
					SourceConfig::Directory {
						path,
						resolve_dependencies: true,
					} => DirectorySource::new(path).into(),
					SourceConfig::Directory { path, .. } => DirectorySource::on_linker_path(path).into(),
					SourceConfig::Split { name, archive } => {
						let archive: Arc<dyn Archive> = Arc::new(DirArchive::new(archive));
						SplitSource::new(name.as_str(), archive, &config.work_root, abi).into()
					}
					SourceConfig::Backup { path, merged } => merged
						.iter()
						.fold(BackupSource::new(path), |backup, (module, host)| {
							backup.with_merged(module.as_str(), host.as_str())
						})
						.into(),
					SourceConfig::System => SystemSource.into(),
				}
			})
			.collect();

		let mut loader = Self::new(SourceChain::new(sources), platform).with_recovery(RecoveryPipeline::standard(&config.recovery));
		if let Some(deps) = &config.deps_manifest {
			let archive: Arc<dyn Archive> = Arc::new(DirArchive::new(&deps.archive));
			loader = loader.with_catalog(DepsCatalog::with_entry(archive, &config.work_root, deps.entry.as_str()));
		}
		tracing::debug!(sources = loader.sources.len(), catalog = loader.catalog.is_some(), recovery = ?loader.recovery, "loader assembled");
		Ok(loader)
	}

	pub fn sources(&self) -> &SourceChain {
		&self.sources
	}

	pub fn catalog(&self) -> Option<&DepsCatalog> {
		self.catalog.as_ref()
	}

	pub fn observers(&self) -> &Arc<ObserverRegistry> {
		&self.observers
	}

	/// Loads `module` and its transitive dependencies.
	///
	/// On a recoverable failure the recovery pipeline runs once; if it asks for a retry
	/// the whole request is restarted exactly once, and the retry's outcome is final.
	pub fn load_module(&self, module: impl Into<ModuleName>) -> Result<Loaded, LoadError> {
		let module = module.into();
		self.observers.emit(|o| o.on_load_start(&module));
		let result = self.load_with_recovery(&module);
		self.observers.emit(|o| o.on_load_end(&module, result.as_ref().err()));
		if let Err(error) = &result {
			tracing::error!(module = %module, kind = %error.kind(), %error, "load failed");
		}
		result
	}

	/// Loads a library by short name (`foo` loads `libfoo.so`).
	pub fn load_library(&self, short_name: &str) -> Result<Loaded, LoadError> {
		self.load_module(ModuleName::from_short(short_name))
	}

	/// Where `module` would be loaded from: a file path, or `None` if only the
	/// platform's own search path can provide it.
	pub fn library_path(&self, module: impl Into<ModuleName>) -> Result<Option<PathBuf>, LoadError> {
		let module = module.into();
		Ok(match self.resolver().locate(&module, None)?.location {
			Location::File(path) => Some(path),
			Location::System(_) => None,
		})
	}

	/// Direct dependencies of `module`, without loading anything.
	pub fn dependencies_of(&self, module: impl Into<ModuleName>) -> Result<DependencySet, LoadError> {
		let module = module.into();
		let resolver = self.resolver();
		let handle = resolver.locate(&module, None)?;
		resolver.dependencies(&module, &handle)
	}

	fn resolver(&self) -> Resolver<'_> {
		Resolver::new(&self.sources, self.catalog.as_ref(), self.platform.as_ref(), &self.observers)
	}

	fn load_with_recovery(&self, module: &ModuleName) -> Result<Loaded, LoadError> {
		let resolver = self.resolver();
		let error = match resolver.load(module) {
			Ok(session) => {
				return Ok(Loaded {
					module: module.clone(),
					loaded: session.into_order(),
					retried: false,
				});
			}
			Err(error) => error,
		};
		if !error.kind().is_recoverable() {
			return Err(error);
		}

		let ctx = RecoveryContext {
			module,
			error: &error,
			sources: &self.sources,
			catalog: self.catalog.as_ref(),
		};
		if !self.recovery.run(&ctx, &self.observers) {
			return Err(error);
		}

		tracing::warn!(module = %module, %error, "retrying load after recovery");
		let session = resolver.load(module)?;
		Ok(Loaded {
			module: module.clone(),
			loaded: session.into_order(),
			retried: true,
		})
	}
}
