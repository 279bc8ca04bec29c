//! Binary manifest describing the modules a split carries.
//!
//! Layout, big-endian throughout:
//!
//! | Field | Size |
//! |---|---|
//! | ABI id (1 arm64-v8a, 2 armeabi-v7a, 3 x86_64, 4 x86) | 1 |
//! | library count | 2 |
//! | per library: name length, UTF-8 name | 2 + n |

use std::io::{ErrorKind, Read};

use crate::{DescriptorError, ModuleName, Result};

/// Application binary interface a split was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Abi {
	Arm64V8a,
	ArmeabiV7a,
	X86_64,
	X86,
}

impl Abi {
	pub const ALL: [Abi; 4] = [Abi::Arm64V8a, Abi::ArmeabiV7a, Abi::X86_64, Abi::X86];

	pub fn from_id(id: u8) -> Result<Self> {
		match id {
			1 => Ok(Self::Arm64V8a),
			2 => Ok(Self::ArmeabiV7a),
			3 => Ok(Self::X86_64),
			4 => Ok(Self::X86),
			other => Err(DescriptorError::UnknownAbi(other)),
		}
	}

	pub fn id(self) -> u8 {
		match self {
			Self::Arm64V8a => 1,
			Self::ArmeabiV7a => 2,
			Self::X86_64 => 3,
			Self::X86 => 4,
		}
	}

	pub fn name(self) -> &'static str {
		match self {
			Self::Arm64V8a => "arm64-v8a",
			Self::ArmeabiV7a => "armeabi-v7a",
			Self::X86_64 => "x86_64",
			Self::X86 => "x86",
		}
	}

	pub fn from_name(name: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|abi| abi.name() == name)
	}
}

impl std::fmt::Display for Abi {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.name())
	}
}

/// Modules packaged in one split, and the ABI they target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitManifest {
	pub abi: Abi,
	pub libraries: Vec<ModuleName>,
}

impl SplitManifest {
	pub fn parse(mut bytes: &[u8]) -> Result<Self> {
		let manifest = Self::read(&mut bytes)?;
		if !bytes.is_empty() {
			return Err(DescriptorError::LengthMismatch {
				what: "trailing manifest bytes",
				declared: 0,
				available: bytes.len() as u64,
			});
		}
		Ok(manifest)
	}

	pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
		let mut offset = 0u64;
		let [abi] = read_array::<_, 1>(reader, &mut offset)?;
		let abi = Abi::from_id(abi)?;
		let count = u16::from_be_bytes(read_array(reader, &mut offset)?);

		let mut libraries = Vec::with_capacity(usize::from(count));
		for _ in 0..count {
			let len = u16::from_be_bytes(read_array(reader, &mut offset)?);
			let mut name = vec![0u8; usize::from(len)];
			read_exact(reader, &mut name, &mut offset)?;
			let name = String::from_utf8(name).map_err(|_| DescriptorError::InvalidUtf8)?;
			libraries.push(ModuleName::from(name));
		}
		Ok(Self { abi, libraries })
	}

	pub fn encode(&self) -> Vec<u8> {
		let mut out = vec![self.abi.id()];
		out.extend_from_slice(&(self.libraries.len() as u16).to_be_bytes());
		for lib in &self.libraries {
			out.extend_from_slice(&(lib.as_str().len() as u16).to_be_bytes());
			out.extend_from_slice(lib.as_str().as_bytes());
		}
		out
	}

	/// Fails unless the manifest targets `expected`.
	pub fn require_abi(&self, expected: Abi) -> Result<()> {
		if self.abi == expected {
			return Ok(());
		}
		Err(DescriptorError::AbiMismatch {
			expected: expected.to_string(),
			found: self.abi.to_string(),
		})
	}

	pub fn contains(&self, module: &ModuleName) -> bool {
		self.libraries.contains(module)
	}
}

fn read_array<R: Read, const N: usize>(reader: &mut R, offset: &mut u64) -> Result<[u8; N]> {
	let mut buf = [0u8; N];
	read_exact(reader, &mut buf, offset)?;
	Ok(buf)
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8], offset: &mut u64) -> Result<()> {
	reader.read_exact(buf).map_err(|e| match e.kind() {
		ErrorKind::UnexpectedEof => DescriptorError::Truncated { offset: *offset },
		_ => DescriptorError::Io(e),
	})?;
	*offset += buf.len() as u64;
	Ok(())
}
