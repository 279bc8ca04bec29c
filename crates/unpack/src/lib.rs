//! Extraction of archive payloads into private working directories.
//!
//! # Purpose
//!
//! Makes a payload embedded in a read-only application archive (a dependency
//! manifest, optionally followed by a flat set of module files) available on the
//! mutable filesystem exactly once per archive version, safely under concurrent
//! callers in this and other processes.
//!
//! # Mental model
//!
//! A working directory holds four well-known files:
//!
//! | File | Contents |
//! |---|---|
//! | `lock` | empty; exclusive advisory lock handle for the check-and-extract section |
//! | `state` | one byte, `0` dirty / `1` clean; absent or unreadable is dirty |
//! | `apk_id` | raw [`Fingerprint`] of the archive the payload came from |
//! | `deps` | `[fingerprint][u32 BE length][manifest bytes]` |
//!
//! plus an optional `lib/` directory of extracted modules.
//!
//! # Invariants
//!
//! - The payload is trusted iff `state` reads clean and `apk_id` equals the archive's
//!   current fingerprint byte-for-byte.
//! - `state` is durably dirty before the first payload write and becomes clean only
//!   after every payload file and directory entry has been flushed.
//! - Files are written to a temporary name and renamed into place.
//!
//! # Concurrency
//!
//! [`DirLock`] serializes [`Unpacker::ensure_available`] and [`Unpacker::invalidate`]
//! across threads and processes. The lock is an `flock`, so the kernel drops it when
//! a holder dies.
//!
//! # Failure modes
//!
//! Every failure leaves `state` dirty, so the next caller re-extracts from scratch.

mod archive;
mod error;
mod fingerprint;
mod lock;
pub mod payload;
pub mod state;
pub mod sync;
mod unpacker;

pub use archive::{Archive, DirArchive, MemArchive};
pub use error::{Result, UnpackError};
pub use fingerprint::{Fingerprint, FingerprintBuilder};
pub use lock::DirLock;
pub use state::ExtractionState;
pub use unpacker::{EnsureOutcome, PayloadLayout, Unpacker};

/// Lock handle file name inside a working directory.
pub const LOCK_FILE: &str = "lock";
/// Extraction state marker file name.
pub const STATE_FILE: &str = "state";
/// Stored archive fingerprint file name.
pub const FINGERPRINT_FILE: &str = "apk_id";
/// Framed payload file name.
pub const PAYLOAD_FILE: &str = "deps";
/// Directory receiving extracted module files.
pub const MODULES_DIR: &str = "lib";
