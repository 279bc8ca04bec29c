use std::fs;
use std::sync::Arc;

use soload_deps::{Abi, SplitManifest};
use soload_unpack::MemArchive;

use super::*;
use crate::error::ErrorKind;

fn name(s: &str) -> ModuleName {
	ModuleName::new(s)
}

fn split_archive(abi: Abi, libs: &[&str]) -> Arc<MemArchive> {
	let manifest = SplitManifest {
		abi,
		libraries: libs.iter().copied().map(ModuleName::new).collect(),
	};
	let archive = MemArchive::new("feature.apk", "v1").with_entry("assets/feature.soloader-manifest", manifest.encode());
	for lib in libs {
		archive.insert(&format!("lib/{abi}/{lib}"), b"\x7fELF".to_vec());
	}
	Arc::new(archive)
}

fn found(resolution: Resolution) -> ModuleHandle {
	match resolution {
		Resolution::Found(handle) => handle,
		other => panic!("expected Found, got {other:?}"),
	}
}

#[test]
fn first_provider_with_the_file_wins() {
	let first = tempfile::tempdir().unwrap();
	let second = tempfile::tempdir().unwrap();
	fs::write(second.path().join("liba.so"), b"").unwrap();
	fs::write(first.path().join("libb.so"), b"").unwrap();
	fs::write(second.path().join("libb.so"), b"").unwrap();

	let chain = SourceChain::default()
		.with(DirectorySource::new(first.path()))
		.with(DirectorySource::new(second.path()));
	let observers = ObserverRegistry::new();

	let a = found(chain.resolve(&name("liba.so"), &observers));
	assert_eq!(a.location, Location::File(second.path().join("liba.so")));
	let b = found(chain.resolve(&name("libb.so"), &observers));
	assert_eq!(b.location, Location::File(first.path().join("libb.so")));
	assert!(matches!(chain.resolve(&name("libc.so"), &observers), Resolution::Absent));
}

#[test]
fn system_source_is_always_plausible_and_terminal() {
	let chain = SourceChain::default().with(SystemSource);
	let handle = found(chain.resolve(&name("libanything.so"), &ObserverRegistry::new()));
	assert_eq!(handle.location, Location::System(name("libanything.so")));
	assert_eq!(handle.declared, Some(vec![]));
}

#[test]
fn linker_path_directories_declare_no_dependencies() {
	let dir = tempfile::tempdir().unwrap();
	fs::write(dir.path().join("libsys.so"), b"").unwrap();
	let handle = found(DirectorySource::on_linker_path(dir.path()).resolve(&name("libsys.so")));
	assert_eq!(handle.declared, Some(vec![]));
	let handle = found(DirectorySource::new(dir.path()).resolve(&name("libsys.so")));
	assert_eq!(handle.declared, None);
}

#[test]
fn failure_stops_the_walk() {
	let tmp = tempfile::tempdir().unwrap();
	let later = tempfile::tempdir().unwrap();
	fs::write(later.path().join("liba.so"), b"").unwrap();
	let broken = Arc::new(MemArchive::new("broken.apk", "v1"));

	let chain = SourceChain::default()
		.with(SplitSource::new("feature", broken, tmp.path(), Abi::Arm64V8a))
		.with(DirectorySource::new(later.path()));
	match chain.resolve(&name("liba.so"), &ObserverRegistry::new()) {
		Resolution::Failed(error) => assert_eq!(error.kind(), ErrorKind::ExtractionFailed),
		other => panic!("expected Failed, got {other:?}"),
	}
}

#[test]
fn split_extracts_on_first_use_and_serves_its_manifest() {
	let tmp = tempfile::tempdir().unwrap();
	let archive = split_archive(Abi::Arm64V8a, &["libfeature.so", "libhelper.so"]);
	let split = SplitSource::new("feature", archive.clone(), tmp.path(), Abi::Arm64V8a);

	let handle = found(split.resolve(&name("libfeature.so")));
	assert_eq!(handle.origin, SourceKind::Split);
	assert_eq!(
		handle.location,
		Location::File(tmp.path().join("lib-feature/lib/libfeature.so"))
	);
	assert!(matches!(split.resolve(&name("libother.so")), Resolution::Absent));
	found(split.resolve(&name("libhelper.so")));

	// manifest + two modules, once
	assert_eq!(archive.open_count(), 3);
	assert!(split.provides(&name("libhelper.so")));
	assert!(!split.needs_purge());
}

#[test]
fn split_for_another_abi_is_malformed() {
	let tmp = tempfile::tempdir().unwrap();
	let archive = split_archive(Abi::X86, &["libfeature.so"]);
	let split = SplitSource::new("feature", archive, tmp.path(), Abi::Arm64V8a);
	match split.resolve(&name("libfeature.so")) {
		Resolution::Failed(error) => assert_eq!(error.kind(), ErrorKind::MalformedDescriptor),
		other => panic!("expected Failed, got {other:?}"),
	}
}

#[test]
fn deleted_module_file_needs_purge() {
	let tmp = tempfile::tempdir().unwrap();
	let archive = split_archive(Abi::Arm64V8a, &["libfeature.so"]);
	let split = SplitSource::new("feature", archive, tmp.path(), Abi::Arm64V8a);
	found(split.resolve(&name("libfeature.so")));

	fs::remove_file(split.unpacker().modules_dir().join("libfeature.so")).unwrap();
	assert!(split.needs_purge());
	assert!(matches!(split.resolve(&name("libfeature.so")), Resolution::Failed(_)));

	split.invalidate().unwrap();
	found(split.resolve(&name("libfeature.so")));
	assert!(!split.needs_purge());
}

#[test]
fn backup_store_answers_only_once_armed() {
	let dir = tempfile::tempdir().unwrap();
	fs::write(dir.path().join("libmerged.so"), b"").unwrap();
	fs::write(dir.path().join("libplain.so"), b"").unwrap();
	let backup = BackupSource::new(dir.path()).with_merged("libpart.so", "libmerged.so");

	assert!(matches!(backup.resolve(&name("libplain.so")), Resolution::Absent));
	assert!(backup.holds(&name("libpart.so")));
	backup.arm();

	let handle = found(backup.resolve(&name("libpart.so")));
	assert_eq!(handle.module, name("libmerged.so"));
	assert_eq!(handle.origin, SourceKind::Backup);
	assert_eq!(found(backup.resolve(&name("libplain.so"))).module, name("libplain.so"));
	assert!(matches!(backup.resolve(&name("libnone.so")), Resolution::Absent));
}
