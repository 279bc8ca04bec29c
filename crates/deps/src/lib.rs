//! Dependency descriptors for native shared modules.
//!
//! A module's direct dependencies come from one of three places: the `DT_NEEDED`
//! entries of its ELF dynamic section ([`elf`]), a precomputed text index shipped in
//! the application archive ([`DepsIndex`]), or, for the membership of a split, the
//! split's binary manifest ([`SplitManifest`]).
//!
//! Every reader is all-or-nothing: a descriptor either parses completely into a
//! [`DependencySet`] or fails with a [`DescriptorError`]. Nothing here touches the
//! filesystem beyond the stream it is handed.

pub mod elf;
mod error;
mod manifest;
mod name;
mod native_deps;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use error::{DescriptorError, Result};
pub use manifest::{Abi, SplitManifest};
pub use name::{DependencySet, ModuleName};
pub use native_deps::DepsIndex;
