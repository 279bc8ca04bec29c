//! Synthetic ELF images for tests.
//!
//! [`ElfImage`] lays out the smallest shared object the reader in [`crate::elf`]
//! accepts: an identification header, a `PT_LOAD` covering the whole file at a
//! non-zero virtual base, a `PT_DYNAMIC`, the dynamic table, and the string table.

const VBASE: u64 = 0x10000;

/// Builder for a minimal shared object with chosen `DT_NEEDED` entries.
#[derive(Debug, Clone)]
pub struct ElfImage {
	class64: bool,
	big_endian: bool,
	machine: u16,
	needed: Vec<String>,
	dynamic: bool,
	strtab: bool,
	extended_phnum: bool,
}

impl Default for ElfImage {
	fn default() -> Self {
		Self::new()
	}
}

impl ElfImage {
	/// 64-bit little-endian aarch64 image with no dependencies.
	pub fn new() -> Self {
		Self {
			class64: true,
			big_endian: false,
			machine: 183,
			needed: Vec::new(),
			dynamic: true,
			strtab: true,
			extended_phnum: false,
		}
	}

	pub fn elf32(mut self) -> Self {
		self.class64 = false;
		self.machine = 40;
		self
	}

	pub fn big_endian(mut self) -> Self {
		self.big_endian = true;
		self
	}

	pub fn machine(mut self, machine: u16) -> Self {
		self.machine = machine;
		self
	}

	pub fn needed(mut self, name: &str) -> Self {
		self.needed.push(name.to_string());
		self
	}

	pub fn needs<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
		self.needed.extend(names.into_iter().map(str::to_string));
		self
	}

	/// Omits `PT_DYNAMIC`, as in a static executable.
	pub fn without_dynamic(mut self) -> Self {
		self.dynamic = false;
		self
	}

	/// Omits the `DT_STRTAB` dynamic entry.
	pub fn without_string_table(mut self) -> Self {
		self.strtab = false;
		self
	}

	/// Stores the program header count in section header 0 (`e_phnum == PN_XNUM`).
	pub fn extended_phnum(mut self) -> Self {
		self.extended_phnum = true;
		self
	}

	pub fn build(&self) -> Vec<u8> {
		let (ehsize, phentsize, shentsize, dyn_size, word) = if self.class64 {
			(64u64, 56u64, 64u64, 16u64, 8usize)
		} else {
			(52, 32, 40, 8, 4)
		};

		let phnum: u64 = if self.dynamic { 2 } else { 1 };
		let phoff = ehsize;
		let shoff = phoff + phnum * phentsize;
		let dynoff = shoff + if self.extended_phnum { shentsize } else { 0 };
		let dyn_entries = self.needed.len() as u64 + u64::from(self.strtab) + 1;
		let stroff = dynoff + dyn_entries * dyn_size;

		let mut strings = vec![0u8];
		let mut name_offsets = Vec::new();
		for name in &self.needed {
			name_offsets.push(strings.len() as u64);
			strings.extend_from_slice(name.as_bytes());
			strings.push(0);
		}
		let total = stroff + strings.len() as u64;

		let mut out = Writer {
			buf: vec![0u8; total as usize],
			big_endian: self.big_endian,
		};

		out.buf[..4].copy_from_slice(&[0x7f, b'E', b'L', b'F']);
		out.buf[4] = if self.class64 { 2 } else { 1 };
		out.buf[5] = if self.big_endian { 2 } else { 1 };
		out.buf[6] = 1;
		out.put(0x10, 3, 2);
		out.put(0x12, u64::from(self.machine), 2);
		out.put(0x14, 1, 4);

		let (e_phoff, e_shoff, e_phentsize, e_phnum, e_shentsize, e_shnum) = if self.class64 {
			(0x20, 0x28, 0x36, 0x38, 0x3a, 0x3c)
		} else {
			(0x1c, 0x20, 0x2a, 0x2c, 0x2e, 0x30)
		};
		out.put(e_phoff, phoff, word);
		out.put(e_phentsize, phentsize, 2);
		out.put(e_shentsize, shentsize, 2);
		if self.extended_phnum {
			out.put(e_phnum, 0xffff, 2);
			out.put(e_shoff, shoff, word);
			out.put(e_shnum, 1, 2);
			let sh_info = if self.class64 { 0x2c } else { 0x1c };
			out.put(shoff + sh_info, phnum, 4);
		} else {
			out.put(e_phnum, phnum, 2);
		}

		let (p_offset, p_vaddr, p_filesz, p_memsz) = if self.class64 {
			(0x08, 0x10, 0x20, 0x28)
		} else {
			(0x04, 0x08, 0x10, 0x14)
		};
		out.put(phoff, 1, 4);
		out.put(phoff + p_offset, 0, word);
		out.put(phoff + p_vaddr, VBASE, word);
		out.put(phoff + p_filesz, total, word);
		out.put(phoff + p_memsz, total, word);
		if self.dynamic {
			let ph = phoff + phentsize;
			out.put(ph, 2, 4);
			out.put(ph + p_offset, dynoff, word);
			out.put(ph + p_vaddr, VBASE + dynoff, word);
			out.put(ph + p_filesz, dyn_entries * dyn_size, word);
			out.put(ph + p_memsz, dyn_entries * dyn_size, word);
		}

		let mut entry = dynoff;
		let mut push_dyn = |out: &mut Writer, tag: u64, val: u64| {
			out.put(entry, tag, word);
			out.put(entry + word as u64, val, word);
			entry += dyn_size;
		};
		for offset in &name_offsets {
			push_dyn(&mut out, 1, *offset);
		}
		if self.strtab {
			push_dyn(&mut out, 5, VBASE + stroff);
		}
		push_dyn(&mut out, 0, 0);

		out.buf[stroff as usize..].copy_from_slice(&strings);
		out.buf
	}
}

struct Writer {
	buf: Vec<u8>,
	big_endian: bool,
}

impl Writer {
	fn put(&mut self, offset: u64, value: u64, width: usize) {
		let offset = offset as usize;
		let bytes = if self.big_endian {
			value.to_be_bytes()[8 - width..].to_vec()
		} else {
			value.to_le_bytes()[..width].to_vec()
		};
		self.buf[offset..offset + width].copy_from_slice(&bytes);
	}
}
