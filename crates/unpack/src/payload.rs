//! Framing of the extracted manifest: `[fingerprint][u32 BE length][data]`.

use std::fmt;
use std::io::{self, Write};

use crate::Fingerprint;

const LENGTH_BYTES: usize = 4;

/// Why a payload file failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadDefect {
	/// Shorter than the fingerprint plus the length field.
	ShortHeader,
	/// The length field disagrees with the bytes that follow it.
	LengthMismatch { declared: u32, available: usize },
	/// Extracted from a different archive version.
	FingerprintMismatch,
	/// Data larger than the length field can express.
	Oversized,
}

impl fmt::Display for PayloadDefect {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::ShortHeader => f.write_str("shorter than its header"),
			Self::LengthMismatch { declared, available } => {
				write!(f, "declares {declared} bytes but {available} follow")
			}
			Self::FingerprintMismatch => f.write_str("fingerprint does not match the archive"),
			Self::Oversized => f.write_str("data exceeds the 32-bit length field"),
		}
	}
}

/// Writes a framed payload.
pub fn write<W: Write>(out: &mut W, fingerprint: &Fingerprint, data: &[u8]) -> io::Result<()> {
	let len = u32::try_from(data.len())
		.map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, PayloadDefect::Oversized.to_string()))?;
	out.write_all(fingerprint.as_bytes())?;
	out.write_all(&len.to_be_bytes())?;
	out.write_all(data)
}

/// Verifies a framed payload against the `expected` fingerprint and returns its data.
pub fn decode<'a>(bytes: &'a [u8], expected: &Fingerprint) -> Result<&'a [u8], PayloadDefect> {
	let header = expected.len() + LENGTH_BYTES;
	if bytes.len() < header {
		return Err(PayloadDefect::ShortHeader);
	}
	let (id, rest) = bytes.split_at(expected.len());
	let (len, data) = rest.split_at(LENGTH_BYTES);
	let declared = u32::from_be_bytes([len[0], len[1], len[2], len[3]]);
	if declared as usize != data.len() {
		return Err(PayloadDefect::LengthMismatch {
			declared,
			available: data.len(),
		});
	}
	if id != expected.as_bytes() {
		return Err(PayloadDefect::FingerprintMismatch);
	}
	Ok(data)
}
