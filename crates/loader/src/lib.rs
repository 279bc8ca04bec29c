//! Dependency-ordered loading of native shared modules.
//!
//! A [`Loader`] takes a module name, finds it through an ordered [`SourceChain`],
//! discovers its dependencies (from a precomputed [`DepsCatalog`] or from the
//! module's own ELF dynamic section), loads every dependency first, and finally hands
//! the module itself to a [`LoadPrimitive`]. Modules that live inside an application
//! archive are extracted on first use by [`soload_unpack::Unpacker`], which keeps the
//! extraction crash-safe across processes.
//!
//! Failures surface as a single [`LoadError`] naming the culprit module. Recoverable
//! ones are first handed to a [`RecoveryPipeline`], which may repair on-disk state and
//! restart the request once.
//!
//! Every phase is reported on an [`ObserverRegistry`]; see [`observer`].
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use soload::{DirectorySource, DlopenPrimitive, Loader, SourceChain, SystemSource};
//!
//! let chain = SourceChain::default()
//! 	.with(DirectorySource::new("/data/app/lib"))
//! 	.with(SystemSource);
//! let loader = Loader::new(chain, Arc::new(DlopenPrimitive::new()));
//! let loaded = loader.load_library("camera")?;
//! println!("{:?}", loaded.loaded);
//! # Ok::<(), soload::LoadError>(())
//! ```

use soload_deps::Abi;

mod catalog;
mod config;
mod error;
mod loader;
pub mod observer;
mod platform;
pub mod recovery;
mod resolver;
pub mod source;

pub use catalog::{CATALOG_DIR, DEFAULT_ENTRY, DepsCatalog};
pub use config::{ConfigError, DepsManifestConfig, LoaderConfig, RecoveryConfig, SourceConfig};
pub use error::{ErrorKind, LoadError, Result};
pub use loader::{Loaded, Loader};
pub use observer::{Observer, ObserverRegistry, TracingObserver, add_observer, reset_observers_for_testing};
pub use platform::{DlopenPrimitive, LoadPrimitive, Location, PlatformError};
pub use recovery::{RecoveryAction, RecoveryContext, RecoveryPipeline, RecoveryStrategy};
pub use resolver::{LoadSession, Phase, Resolver};
pub use soload_deps::{DependencySet, ModuleName};
pub use source::{
	BackupSource, DirectorySource, ModuleHandle, Resolution, SourceChain, SourceKind, SplitSource, SystemSource,
};

/// ABI assumed when a configuration names none.
pub const DEFAULT_ABI: Abi = Abi::Arm64V8a;
