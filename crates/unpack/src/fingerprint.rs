//! Archive version identity.

use std::fmt;

/// Opaque byte identity of one archive version, compared byte-for-byte.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(Box<[u8]>);

impl Fingerprint {
	pub fn new(bytes: impl Into<Box<[u8]>>) -> Self {
		Self(bytes.into())
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl fmt::Debug for Fingerprint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Fingerprint({} bytes:", self.0.len())?;
		for byte in self.0.iter().take(16) {
			write!(f, " {byte:02x}")?;
		}
		if self.0.len() > 16 {
			f.write_str(" ..")?;
		}
		f.write_str(")")
	}
}

impl From<Vec<u8>> for Fingerprint {
	fn from(bytes: Vec<u8>) -> Self {
		Self(bytes.into_boxed_slice())
	}
}

impl From<&[u8]> for Fingerprint {
	fn from(bytes: &[u8]) -> Self {
		Self(bytes.into())
	}
}

impl From<&str> for Fingerprint {
	fn from(s: &str) -> Self {
		Fingerprint::from(s.as_bytes())
	}
}

/// Accumulates length-prefixed fields into a [`Fingerprint`].
///
/// Every variable-length field carries its length, so distinct field sequences never
/// produce the same bytes.
#[derive(Debug)]
pub struct FingerprintBuilder {
	buf: Vec<u8>,
}

impl FingerprintBuilder {
	/// Starts a fingerprint tagged with a format `version` byte.
	pub fn new(version: u8) -> Self {
		Self { buf: vec![version] }
	}

	pub fn bytes(mut self, bytes: &[u8]) -> Self {
		self.buf.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
		self.buf.extend_from_slice(bytes);
		self
	}

	pub fn str(self, s: &str) -> Self {
		self.bytes(s.as_bytes())
	}

	pub fn u64(mut self, value: u64) -> Self {
		self.buf.extend_from_slice(&value.to_be_bytes());
		self
	}

	pub fn finish(self) -> Fingerprint {
		Fingerprint::from(self.buf)
	}
}
