//! Error types for descriptor parsing.

use thiserror::Error;

/// A dependency descriptor could not be read.
///
/// Any of these means the descriptor is unusable as a whole; readers never hand back
/// a partial dependency set.
#[derive(Debug, Error)]
pub enum DescriptorError {
	/// The input ended before a structure it declares.
	#[error("descriptor truncated at offset {offset:#x}")]
	Truncated {
		/// Offset of the read that ran past the end of the input.
		offset: u64,
	},

	/// The fixed header does not carry the ELF magic.
	#[error("not an ELF image (magic {0:#010x})")]
	BadMagic(u32),

	/// The ELF class byte is neither 32- nor 64-bit.
	#[error("unsupported ELF class {0}")]
	BadClass(u8),

	/// No `PT_DYNAMIC` program header.
	#[error("no dynamic linking info")]
	NoDynamicSection,

	/// The dynamic table has no `DT_STRTAB` entry.
	#[error("dynamic string table not found")]
	NoStringTable,

	/// `DT_STRTAB` points outside every `PT_LOAD` segment.
	#[error("string table address {vaddr:#x} is not covered by any loadable segment")]
	StringTableUnmapped {
		/// Virtual address recorded in `DT_STRTAB`.
		vaddr: u64,
	},

	/// A count or length field exceeds what the input can hold.
	#[error("declared {what} of {declared} exceeds the {available} available")]
	LengthMismatch {
		/// The field that was inconsistent.
		what: &'static str,
		/// Value the descriptor declares.
		declared: u64,
		/// Bound implied by the input.
		available: u64,
	},

	/// A dependency index in the precomputed index is not a valid line number.
	#[error("line {line}: bad dependency index {token:?}")]
	BadIndex {
		/// 1-based line in the index text.
		line: usize,
		/// The offending token.
		token: String,
	},

	/// A line of the precomputed index has no library name.
	#[error("line {line}: missing library name")]
	MissingName {
		/// 1-based line in the index text.
		line: usize,
	},

	/// The split manifest names an ABI this loader does not know.
	#[error("unknown ABI id {0}")]
	UnknownAbi(u8),

	/// The split manifest was built for a different ABI.
	#[error("manifest built for {found}, expected {expected}")]
	AbiMismatch {
		/// ABI the loader runs as.
		expected: String,
		/// ABI the manifest declares.
		found: String,
	},

	/// Text in the descriptor is not valid UTF-8.
	#[error("descriptor contains invalid UTF-8")]
	InvalidUtf8,

	/// Reading the underlying stream failed.
	#[error("I/O error reading descriptor: {0}")]
	Io(#[from] std::io::Error),
}

/// Result type for descriptor operations.
pub type Result<T> = std::result::Result<T, DescriptorError>;
