use std::fs;
use std::path::Path;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use soload_deps::testing::ElfImage;

use super::*;
use crate::error::ErrorKind;
use crate::platform::PlatformError;
use crate::source::{BackupSource, DirectorySource, SystemSource};

#[derive(Default)]
struct Recorder {
	loads: Mutex<Vec<Location>>,
	refuse: Option<&'static str>,
}

impl LoadPrimitive for Recorder {
	fn load(&self, location: &Location) -> Result<(), PlatformError> {
		if let (Some(refused), Location::File(path)) = (self.refuse, location)
			&& path.ends_with(refused)
		{
			return Err(PlatformError::new(format!("{refused}: bad ELF magic")));
		}
		self.loads.lock().push(location.clone());
		Ok(())
	}
}

impl Recorder {
	fn names(&self) -> Vec<String> {
		self.loads
			.lock()
			.iter()
			.map(|location| match location {
				Location::File(path) => path.file_name().unwrap().to_string_lossy().into_owned(),
				Location::System(name) => name.to_string(),
			})
			.collect()
	}
}

fn module(dir: &Path, name: &str, deps: &[&str]) {
	fs::write(dir.join(name), ElfImage::new().needs(deps.iter().copied()).build()).unwrap();
}

fn load(chain: &SourceChain, primitive: &Recorder, name: &str) -> Result<LoadSession, LoadError> {
	let observers = ObserverRegistry::new();
	Resolver::new(chain, None, primitive, &observers).load(&ModuleName::new(name))
}

#[test]
fn dependencies_load_before_dependents_and_once() {
	let dir = tempfile::tempdir().unwrap();
	module(dir.path(), "liba.so", &["libb.so", "libc.so"]);
	module(dir.path(), "libb.so", &["libc.so"]);
	module(dir.path(), "libc.so", &[]);
	let chain = SourceChain::default().with(DirectorySource::new(dir.path()));
	let primitive = Recorder::default();

	let session = load(&chain, &primitive, "liba.so").unwrap();
	assert_eq!(primitive.names(), ["libc.so", "libb.so", "liba.so"]);
	assert_eq!(session.order(), [ModuleName::new("libc.so"), "libb.so".into(), "liba.so".into()]);
	assert_eq!(session.phase(), Phase::Done);
}

#[test]
fn diamond_loads_the_shared_base_once() {
	let dir = tempfile::tempdir().unwrap();
	module(dir.path(), "libtop.so", &["libleft.so", "libright.so"]);
	module(dir.path(), "libleft.so", &["libbase.so"]);
	module(dir.path(), "libright.so", &["libbase.so"]);
	module(dir.path(), "libbase.so", &[]);
	let chain = SourceChain::default().with(DirectorySource::new(dir.path()));
	let primitive = Recorder::default();

	load(&chain, &primitive, "libtop.so").unwrap();
	assert_eq!(primitive.names(), ["libbase.so", "libleft.so", "libright.so", "libtop.so"]);
}

#[test]
fn cycle_fails_without_loading_anything_on_it() {
	let dir = tempfile::tempdir().unwrap();
	module(dir.path(), "liba.so", &["libleaf.so", "libb.so"]);
	module(dir.path(), "libb.so", &["libc.so"]);
	module(dir.path(), "libc.so", &["libb.so"]);
	module(dir.path(), "libleaf.so", &[]);
	let chain = SourceChain::default().with(DirectorySource::new(dir.path()));
	let primitive = Recorder::default();

	let err = load(&chain, &primitive, "liba.so").unwrap_err();
	match &err {
		LoadError::CyclicDependency { module, cycle } => {
			assert_eq!(module.as_str(), "libb.so");
			assert_eq!(cycle, &[ModuleName::new("libb.so"), "libc.so".into(), "libb.so".into()]);
		}
		other => panic!("expected a cycle, got {other:?}"),
	}
	// only the sibling that precedes the cycle was loaded
	assert_eq!(primitive.names(), ["libleaf.so"]);
}

#[test]
fn self_reference_is_a_cycle() {
	let dir = tempfile::tempdir().unwrap();
	module(dir.path(), "libself.so", &["libself.so"]);
	let chain = SourceChain::default().with(DirectorySource::new(dir.path()));
	let primitive = Recorder::default();

	let err = load(&chain, &primitive, "libself.so").unwrap_err();
	assert_eq!(err.kind(), ErrorKind::CyclicDependency);
	assert!(primitive.names().is_empty());
}

#[test]
fn missing_dependency_names_the_requester() {
	let dir = tempfile::tempdir().unwrap();
	module(dir.path(), "liba.so", &["libmissing.so"]);
	let chain = SourceChain::default().with(DirectorySource::new(dir.path()));
	let primitive = Recorder::default();

	match load(&chain, &primitive, "liba.so").unwrap_err() {
		LoadError::UnresolvedDependency { module, requester } => {
			assert_eq!(module.as_str(), "libmissing.so");
			assert_eq!(requester, Some(ModuleName::new("liba.so")));
		}
		other => panic!("expected unresolved, got {other:?}"),
	}
}

#[test]
fn path_and_system_dependencies_are_left_to_the_platform() {
	let dir = tempfile::tempdir().unwrap();
	module(dir.path(), "liba.so", &["/system/lib64/libc.so", "liblog.so"]);
	let chain = SourceChain::default()
		.with(DirectorySource::new(dir.path()))
		.with(SystemSource);
	let primitive = Recorder::default();

	load(&chain, &primitive, "liba.so").unwrap();
	assert_eq!(primitive.names(), ["liblog.so", "liba.so"]);
}

#[test]
fn merged_modules_load_their_host_once() {
	let dir = tempfile::tempdir().unwrap();
	let backup = tempfile::tempdir().unwrap();
	module(dir.path(), "libapp.so", &["libpart1.so", "libpart2.so"]);
	module(backup.path(), "libmerged.so", &[]);
	let chain = SourceChain::default().with(DirectorySource::new(dir.path())).with(
		BackupSource::new(backup.path())
			.with_merged("libpart1.so", "libmerged.so")
			.with_merged("libpart2.so", "libmerged.so")
			.armed(),
	);
	let primitive = Recorder::default();

	let session = load(&chain, &primitive, "libapp.so").unwrap();
	assert_eq!(primitive.names(), ["libmerged.so", "libapp.so"]);
	assert!(session.is_loaded(&"libpart2.so".into()));
}

#[test]
fn refused_platform_load_carries_the_location() {
	let dir = tempfile::tempdir().unwrap();
	module(dir.path(), "liba.so", &["libb.so"]);
	module(dir.path(), "libb.so", &[]);
	let chain = SourceChain::default().with(DirectorySource::new(dir.path()));
	let primitive = Recorder {
		refuse: Some("libb.so"),
		..Recorder::default()
	};

	match load(&chain, &primitive, "liba.so").unwrap_err() {
		LoadError::PlatformLoad { module, location, source } => {
			assert_eq!(module.as_str(), "libb.so");
			assert_eq!(location, Location::File(dir.path().join("libb.so")));
			assert!(source.is_corrupt_image());
		}
		other => panic!("expected a platform failure, got {other:?}"),
	}
}

#[test]
fn unparseable_descriptor_is_malformed() {
	let dir = tempfile::tempdir().unwrap();
	fs::write(dir.path().join("libjunk.so"), b"this is not an ELF file at all").unwrap();
	let chain = SourceChain::default().with(DirectorySource::new(dir.path()));
	let primitive = Recorder::default();

	let err = load(&chain, &primitive, "libjunk.so").unwrap_err();
	assert_eq!(err.kind(), ErrorKind::MalformedDescriptor);
	assert!(primitive.names().is_empty());
}
