use std::sync::Barrier;
use std::thread;

use super::*;
use crate::{MemArchive, STATE_FILE};

const MANIFEST: &str = "assets/native_deps.txt";
const DEPS: &[u8] = b"c\nb 0\na 1 0\n";

fn archive() -> Arc<MemArchive> {
	Arc::new(MemArchive::new("app", "fingerprint-v1").with_entry(MANIFEST, DEPS))
}

fn unpacker(dir: &Path, archive: &Arc<MemArchive>) -> Unpacker {
	Unpacker::new(dir.join("native_deps"), archive.clone(), PayloadLayout::manifest(MANIFEST))
}

fn declared_len(unpacker: &Unpacker, fingerprint: &str) -> u32 {
	let bytes = fs::read(unpacker.payload_path()).unwrap();
	let at = fingerprint.len();
	u32::from_be_bytes(bytes[at..at + 4].try_into().unwrap())
}

#[test]
fn cold_directory_is_extracted_and_marked_clean() {
	let tmp = tempfile::tempdir().unwrap();
	let archive = archive();
	let unpacker = unpacker(tmp.path(), &archive);

	assert_eq!(unpacker.ensure_available().unwrap(), EnsureOutcome::Extracted);
	assert_eq!(unpacker.state(), ExtractionState::Clean);
	assert_eq!(unpacker.stored_fingerprint(), Some(Fingerprint::from("fingerprint-v1")));
	assert_eq!(unpacker.read_payload().unwrap(), DEPS);
	assert_eq!(declared_len(&unpacker, "fingerprint-v1") as usize, DEPS.len());
	assert!(unpacker.dir().join(LOCK_FILE).exists());
	assert!(!unpacker.dir().join("deps.tmp").exists());
	unpacker.verify().unwrap();
}

#[test]
fn second_call_takes_the_fast_path() {
	let tmp = tempfile::tempdir().unwrap();
	let archive = archive();
	let unpacker = unpacker(tmp.path(), &archive);

	assert_eq!(unpacker.ensure_available().unwrap(), EnsureOutcome::Extracted);
	let written = fs::metadata(unpacker.payload_path()).unwrap().modified().unwrap();
	assert_eq!(unpacker.ensure_available().unwrap(), EnsureOutcome::AlreadyCurrent);

	assert_eq!(archive.open_count(), 1);
	assert_eq!(fs::metadata(unpacker.payload_path()).unwrap().modified().unwrap(), written);
}

#[test]
fn dirty_directory_without_payload_is_extracted() {
	let tmp = tempfile::tempdir().unwrap();
	let archive = archive();
	let unpacker = unpacker(tmp.path(), &archive);
	fs::create_dir_all(unpacker.dir()).unwrap();
	fs::write(unpacker.dir().join(STATE_FILE), [0u8]).unwrap();

	assert_eq!(unpacker.ensure_available().unwrap(), EnsureOutcome::Extracted);
	assert_eq!(unpacker.state(), ExtractionState::Clean);
	let len = fs::metadata(unpacker.payload_path()).unwrap().len() as usize;
	assert_eq!(declared_len(&unpacker, "fingerprint-v1") as usize, len - "fingerprint-v1".len() - 4);
}

#[test]
fn interrupted_extraction_is_redone_in_full() {
	let tmp = tempfile::tempdir().unwrap();
	let archive = archive();
	let unpacker = unpacker(tmp.path(), &archive);
	unpacker.ensure_available().unwrap();

	// A writer died after marking dirty and clobbering part of the payload.
	state::write(unpacker.dir(), ExtractionState::Dirty).unwrap();
	fs::write(unpacker.payload_path(), b"fingerprint-v1\x00\x00").unwrap();

	assert_eq!(unpacker.ensure_available().unwrap(), EnsureOutcome::Extracted);
	assert_eq!(unpacker.read_payload().unwrap(), DEPS);
	assert_eq!(archive.open_count(), 2);
}

#[test]
fn archive_update_forces_reextraction() {
	let tmp = tempfile::tempdir().unwrap();
	let archive = archive();
	let unpacker = unpacker(tmp.path(), &archive);
	unpacker.ensure_available().unwrap();

	archive.set_fingerprint("fingerprint-v2");
	archive.insert(MANIFEST, b"z\n".to_vec());

	assert_eq!(unpacker.ensure_available().unwrap(), EnsureOutcome::Extracted);
	assert_eq!(unpacker.stored_fingerprint(), Some(Fingerprint::from("fingerprint-v2")));
	assert_eq!(unpacker.read_payload().unwrap(), b"z\n");
}

#[test]
fn tampered_stored_fingerprint_forces_reextraction() {
	let tmp = tempfile::tempdir().unwrap();
	let archive = archive();
	let unpacker = unpacker(tmp.path(), &archive);
	unpacker.ensure_available().unwrap();

	fs::write(unpacker.dir().join(FINGERPRINT_FILE), b"fingerprint-v0").unwrap();
	assert_eq!(unpacker.state(), ExtractionState::Clean);
	assert_eq!(unpacker.ensure_available().unwrap(), EnsureOutcome::Extracted);
}

#[test]
fn missing_entry_fails_and_leaves_directory_dirty_and_unlocked() {
	let tmp = tempfile::tempdir().unwrap();
	let archive = Arc::new(MemArchive::new("app", "v1"));
	let unpacker = unpacker(tmp.path(), &archive);

	let err = unpacker.ensure_available().unwrap_err();
	assert!(matches!(err, UnpackError::MissingEntry { ref entry, .. } if entry == MANIFEST), "{err}");
	assert_eq!(unpacker.state(), ExtractionState::Dirty);
	assert!(DirLock::try_acquire(unpacker.dir()).unwrap().is_some());
}

#[test]
fn truncated_entry_fails_then_heals() {
	let tmp = tempfile::tempdir().unwrap();
	let archive = archive();
	archive.declare_size(MANIFEST, DEPS.len() as u64 + 10);
	let unpacker = unpacker(tmp.path(), &archive);

	let err = unpacker.ensure_available().unwrap_err();
	assert!(matches!(err, UnpackError::Truncated { expected, actual, .. } if actual + 10 == expected), "{err}");
	assert_eq!(unpacker.state(), ExtractionState::Dirty);

	archive.insert(MANIFEST, DEPS.to_vec());
	archive.declare_size(MANIFEST, DEPS.len() as u64);
	assert_eq!(unpacker.ensure_available().unwrap(), EnsureOutcome::Extracted);
	assert_eq!(unpacker.state(), ExtractionState::Clean);
}

#[test]
fn file_in_place_of_the_directory_is_replaced() {
	let tmp = tempfile::tempdir().unwrap();
	let archive = archive();
	let unpacker = unpacker(tmp.path(), &archive);
	fs::write(unpacker.dir(), b"not a directory").unwrap();

	assert_eq!(unpacker.ensure_available().unwrap(), EnsureOutcome::Extracted);
	assert!(unpacker.dir().is_dir());
}

#[test]
fn short_payload_is_detected_and_invalidation_heals_it() {
	let tmp = tempfile::tempdir().unwrap();
	let archive = archive();
	let unpacker = unpacker(tmp.path(), &archive);
	unpacker.ensure_available().unwrap();

	let path = unpacker.payload_path();
	let bytes = fs::read(&path).unwrap();
	fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

	let err = unpacker.read_payload().unwrap_err();
	assert!(matches!(err, UnpackError::CorruptPayload { .. }), "{err}");
	assert!(unpacker.verify().is_err());
	// The marker alone still claims a clean extraction.
	assert_eq!(unpacker.ensure_available().unwrap(), EnsureOutcome::AlreadyCurrent);

	unpacker.invalidate().unwrap();
	assert_eq!(unpacker.state(), ExtractionState::Dirty);
	assert!(!path.exists());

	assert_eq!(unpacker.ensure_available().unwrap(), EnsureOutcome::Extracted);
	assert_eq!(unpacker.read_payload().unwrap(), DEPS);
}

#[test]
fn invalidating_a_missing_directory_is_a_no_op() {
	let tmp = tempfile::tempdir().unwrap();
	let archive = archive();
	unpacker(tmp.path(), &archive).invalidate().unwrap();
	assert!(!tmp.path().join("native_deps").exists());
}

#[test]
fn module_files_are_extracted_flat() {
	let tmp = tempfile::tempdir().unwrap();
	let archive = Arc::new(
		MemArchive::new("split", "v1")
			.with_entry("assets/feature.manifest", b"m".to_vec())
			.with_entry("lib/arm64-v8a/liba.so", b"AAAA".to_vec())
			.with_entry("lib/arm64-v8a/libb.so", b"BB".to_vec())
			.with_entry("lib/arm64-v8a/nested/libc.so", b"C".to_vec())
			.with_entry("lib/x86/liba.so", b"x".to_vec()),
	);
	let unpacker = Unpacker::new(
		tmp.path().join("lib-feature"),
		archive.clone(),
		PayloadLayout::manifest("assets/feature.manifest").with_modules("lib/arm64-v8a"),
	);

	assert_eq!(unpacker.ensure_available().unwrap(), EnsureOutcome::Extracted);
	let modules = unpacker.modules_dir();
	assert_eq!(fs::read(modules.join("liba.so")).unwrap(), b"AAAA");
	assert_eq!(fs::read(modules.join("libb.so")).unwrap(), b"BB");
	assert!(!modules.join("libc.so").exists());
	assert!(!modules.join("nested").exists());
	unpacker.verify().unwrap();

	unpacker.invalidate().unwrap();
	assert!(!modules.exists());
	assert!(unpacker.verify().is_err());
}

#[test]
fn vanished_archive_is_reported() {
	let tmp = tempfile::tempdir().unwrap();
	let archive = archive();
	let unpacker = unpacker(tmp.path(), &archive);
	archive.set_present(false);
	assert!(matches!(unpacker.ensure_available(), Err(UnpackError::ArchiveMissing { .. })));
}

#[test]
fn concurrent_cold_callers_extract_once() {
	let tmp = tempfile::tempdir().unwrap();
	let archive = archive();
	let barrier = Barrier::new(2);

	let outcomes: Vec<EnsureOutcome> = thread::scope(|scope| {
		let handles: Vec<_> = (0..2)
			.map(|_| {
				let unpacker = unpacker(tmp.path(), &archive);
				let barrier = &barrier;
				scope.spawn(move || {
					barrier.wait();
					unpacker.ensure_available().unwrap()
				})
			})
			.collect();
		handles.into_iter().map(|h| h.join().unwrap()).collect()
	});

	assert_eq!(archive.open_count(), 1);
	assert_eq!(outcomes.iter().filter(|o| **o == EnsureOutcome::Extracted).count(), 1);
	assert_eq!(outcomes.iter().filter(|o| **o == EnsureOutcome::AlreadyCurrent).count(), 1);

	let unpacker = unpacker(tmp.path(), &archive);
	assert_eq!(unpacker.state(), ExtractionState::Clean);
	assert_eq!(unpacker.stored_fingerprint(), Some(Fingerprint::from("fingerprint-v1")));
}

#[test]
fn held_lock_makes_callers_wait() {
	let tmp = tempfile::tempdir().unwrap();
	let archive = archive();
	let unpacker = unpacker(tmp.path(), &archive);
	fs::create_dir_all(unpacker.dir()).unwrap();
	let held = DirLock::acquire(unpacker.dir()).unwrap();

	thread::scope(|scope| {
		let waiting = scope.spawn(|| unpacker.ensure_available().unwrap());
		thread::sleep(std::time::Duration::from_millis(50));
		assert!(!waiting.is_finished());
		assert_eq!(archive.open_count(), 0);
		drop(held);
		assert_eq!(waiting.join().unwrap(), EnsureOutcome::Extracted);
	});
	assert_eq!(archive.open_count(), 1);
}
