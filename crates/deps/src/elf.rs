//! Minimal ELF reader for `DT_NEEDED` entries.
//!
//! Only the structures on the path to the dependency list are decoded:
//!
//! 1. The ELF identification (magic, class, data encoding).
//! 2. The program header table, to find `PT_DYNAMIC`. An `e_phnum` of `PN_XNUM`
//!    means the real count lives in `sh_info` of section header 0.
//! 3. The dynamic table, to count `DT_NEEDED` entries and find `DT_STRTAB`.
//! 4. The `PT_LOAD` segment covering `DT_STRTAB`, to turn its virtual address into a
//!    file offset.
//! 5. The NUL-terminated names themselves.
//!
//! Every offset read is bounds-checked against the stream length, so arbitrary input
//! either parses or fails with a [`DescriptorError`]; it never loops unboundedly.

use std::fs::File;
use std::io::{BufReader, Cursor, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use crate::{DependencySet, DescriptorError, ModuleName, Result};

const ELF_MAGIC: u32 = 0x464c_457f;
const EI_CLASS: u64 = 4;
const EI_DATA: u64 = 5;
const ELFCLASS32: u8 = 1;
const ELFCLASS64: u8 = 2;
const ELFDATA2MSB: u8 = 2;
const E_MACHINE: u64 = 0x12;

const PN_XNUM: u16 = 0xffff;
const PT_LOAD: u32 = 1;
const PT_DYNAMIC: u32 = 2;
const DT_NULL: u64 = 0;
const DT_NEEDED: u64 = 1;
const DT_STRTAB: u64 = 5;

const MAX_NAME_LEN: usize = 4096;

/// Field offsets for one ELF class.
struct Layout {
	e_phoff: u64,
	e_shoff: u64,
	e_phentsize: u64,
	e_phnum: u64,
	sh_info: u64,
	p_type: u64,
	p_offset: u64,
	p_vaddr: u64,
	p_memsz: u64,
	phdr_min: u64,
	dyn_size: u64,
	d_val: u64,
	word: u64,
}

const ELF32: Layout = Layout {
	e_phoff: 0x1c,
	e_shoff: 0x20,
	e_phentsize: 0x2a,
	e_phnum: 0x2c,
	sh_info: 0x1c,
	p_type: 0x00,
	p_offset: 0x04,
	p_vaddr: 0x08,
	p_memsz: 0x14,
	phdr_min: 0x20,
	dyn_size: 8,
	d_val: 4,
	word: 4,
};

const ELF64: Layout = Layout {
	e_phoff: 0x20,
	e_shoff: 0x28,
	e_phentsize: 0x36,
	e_phnum: 0x38,
	sh_info: 0x2c,
	p_type: 0x00,
	p_offset: 0x08,
	p_vaddr: 0x10,
	p_memsz: 0x28,
	phdr_min: 0x38,
	dyn_size: 16,
	d_val: 8,
	word: 8,
};

/// Instruction set recorded in `e_machine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isa {
	X86,
	Arm,
	X86_64,
	Aarch64,
	Other(u16),
}

impl Isa {
	fn from_machine(machine: u16) -> Self {
		match machine {
			3 => Self::X86,
			40 => Self::Arm,
			62 => Self::X86_64,
			183 => Self::Aarch64,
			other => Self::Other(other),
		}
	}
}

impl std::fmt::Display for Isa {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::X86 => f.write_str("x86"),
			Self::Arm => f.write_str("arm"),
			Self::X86_64 => f.write_str("x86_64"),
			Self::Aarch64 => f.write_str("aarch64"),
			Self::Other(machine) => write!(f, "e_machine {machine}"),
		}
	}
}

/// Reads the `DT_NEEDED` entries of the ELF image at `path`.
pub fn read_needed_from_path(path: &Path) -> Result<DependencySet> {
	let mut reader = BufReader::new(File::open(path)?);
	read_needed(&mut reader)
}

/// Reads the `DT_NEEDED` entries of an in-memory ELF image.
pub fn read_needed_from_bytes(bytes: &[u8]) -> Result<DependencySet> {
	read_needed(&mut Cursor::new(bytes))
}

/// Reads the `DT_NEEDED` entries of an ELF image, in the order they appear in the
/// dynamic table.
pub fn read_needed<R: Read + Seek>(reader: &mut R) -> Result<DependencySet> {
	let mut image = Image::open(reader)?;
	let phdrs = image.program_headers()?;

	let dynamic = phdrs
		.iter()
		.find(|ph| ph.kind == PT_DYNAMIC)
		.map(|ph| ph.offset)
		.ok_or(DescriptorError::NoDynamicSection)?;

	let mut needed_offsets = Vec::new();
	let mut strtab_vaddr = None;
	let mut entry = dynamic;
	loop {
		let tag = image.word_at(entry)?;
		match tag {
			DT_NULL => break,
			DT_NEEDED => needed_offsets.push(image.word_at(entry + image.layout.d_val)?),
			DT_STRTAB => strtab_vaddr = Some(image.word_at(entry + image.layout.d_val)?),
			_ => {}
		}
		entry = entry
			.checked_add(image.layout.dyn_size)
			.ok_or(DescriptorError::Truncated { offset: entry })?;
	}

	let vaddr = strtab_vaddr.ok_or(DescriptorError::NoStringTable)?;
	let strtab = phdrs
		.iter()
		.filter(|ph| ph.kind == PT_LOAD)
		.find(|ph| ph.vaddr <= vaddr && vaddr < ph.vaddr.saturating_add(ph.memsz))
		.and_then(|ph| (vaddr - ph.vaddr).checked_add(ph.offset))
		.ok_or(DescriptorError::StringTableUnmapped { vaddr })?;

	let mut needed = DependencySet::with_capacity(needed_offsets.len());
	for name_offset in needed_offsets {
		let at = strtab
			.checked_add(name_offset)
			.ok_or(DescriptorError::Truncated { offset: strtab })?;
		needed.push(ModuleName::from(image.c_str_at(at)?));
	}

	tracing::trace!(count = needed.len(), "read DT_NEEDED entries");
	Ok(needed)
}

/// Reads the instruction set an ELF image was built for.
pub fn read_isa<R: Read + Seek>(reader: &mut R) -> Result<Isa> {
	let mut image = Image::open(reader)?;
	Ok(Isa::from_machine(image.u16_at(E_MACHINE)?))
}

struct ProgramHeader {
	kind: u32,
	offset: u64,
	vaddr: u64,
	memsz: u64,
}

struct Image<'r, R> {
	reader: &'r mut R,
	layout: &'static Layout,
	big_endian: bool,
	len: u64,
}

impl<'r, R: Read + Seek> Image<'r, R> {
	fn open(reader: &'r mut R) -> Result<Self> {
		let len = reader.seek(SeekFrom::End(0))?;
		let mut image = Image {
			reader,
			layout: &ELF32,
			big_endian: false,
			len,
		};

		let magic = u32::from_le_bytes(image.bytes_at::<4>(0)?);
		if magic != ELF_MAGIC {
			return Err(DescriptorError::BadMagic(magic));
		}
		let [class] = image.bytes_at::<1>(EI_CLASS)?;
		image.layout = match class {
			ELFCLASS32 => &ELF32,
			ELFCLASS64 => &ELF64,
			other => return Err(DescriptorError::BadClass(other)),
		};
		let [data] = image.bytes_at::<1>(EI_DATA)?;
		image.big_endian = data == ELFDATA2MSB;
		Ok(image)
	}

	fn program_headers(&mut self) -> Result<Vec<ProgramHeader>> {
		let layout = self.layout;
		let phoff = self.word_at(layout.e_phoff)?;
		let phentsize = u64::from(self.u16_at(layout.e_phentsize)?);
		let mut phnum = u64::from(self.u16_at(layout.e_phnum)?);
		if phnum == u64::from(PN_XNUM) {
			let shoff = self.word_at(layout.e_shoff)?;
			phnum = u64::from(self.u32_at(shoff.saturating_add(layout.sh_info))?);
		}

		if phentsize < layout.phdr_min {
			return Err(DescriptorError::LengthMismatch {
				what: "program header size",
				declared: phentsize,
				available: layout.phdr_min,
			});
		}
		let table_end = phnum
			.checked_mul(phentsize)
			.and_then(|size| size.checked_add(phoff));
		if table_end.is_none_or(|end| end > self.len) {
			return Err(DescriptorError::LengthMismatch {
				what: "program header table",
				declared: phnum,
				available: self.len.saturating_sub(phoff) / phentsize,
			});
		}

		let mut headers = Vec::new();
		for index in 0..phnum {
			let base = phoff + index * phentsize;
			headers.push(ProgramHeader {
				kind: self.u32_at(base + layout.p_type)?,
				offset: self.word_at(base + layout.p_offset)?,
				vaddr: self.word_at(base + layout.p_vaddr)?,
				memsz: self.word_at(base + layout.p_memsz)?,
			});
		}
		Ok(headers)
	}

	fn bytes_at<const N: usize>(&mut self, offset: u64) -> Result<[u8; N]> {
		let mut buf = [0u8; N];
		self.reader.seek(SeekFrom::Start(offset))?;
		self.reader.read_exact(&mut buf).map_err(|e| match e.kind() {
			ErrorKind::UnexpectedEof => DescriptorError::Truncated { offset },
			_ => DescriptorError::Io(e),
		})?;
		Ok(buf)
	}

	fn u16_at(&mut self, offset: u64) -> Result<u16> {
		let bytes = self.bytes_at::<2>(offset)?;
		Ok(if self.big_endian {
			u16::from_be_bytes(bytes)
		} else {
			u16::from_le_bytes(bytes)
		})
	}

	fn u32_at(&mut self, offset: u64) -> Result<u32> {
		let bytes = self.bytes_at::<4>(offset)?;
		Ok(if self.big_endian {
			u32::from_be_bytes(bytes)
		} else {
			u32::from_le_bytes(bytes)
		})
	}

	/// Reads an address-sized field (`Elf32_Word` or `Elf64_Xword`).
	fn word_at(&mut self, offset: u64) -> Result<u64> {
		if self.layout.word == 4 {
			return self.u32_at(offset).map(u64::from);
		}
		let bytes = self.bytes_at::<8>(offset)?;
		Ok(if self.big_endian {
			u64::from_be_bytes(bytes)
		} else {
			u64::from_le_bytes(bytes)
		})
	}

	fn c_str_at(&mut self, offset: u64) -> Result<String> {
		self.reader.seek(SeekFrom::Start(offset))?;
		let mut out = Vec::new();
		let mut chunk = [0u8; 64];
		loop {
			let read = match self.reader.read(&mut chunk) {
				Ok(0) => {
					return Err(DescriptorError::Truncated {
						offset: offset + out.len() as u64,
					});
				}
				Ok(read) => read,
				Err(e) if e.kind() == ErrorKind::Interrupted => continue,
				Err(e) => return Err(e.into()),
			};
			if let Some(end) = chunk[..read].iter().position(|&b| b == 0) {
				out.extend_from_slice(&chunk[..end]);
				break;
			}
			out.extend_from_slice(&chunk[..read]);
			if out.len() > MAX_NAME_LEN {
				return Err(DescriptorError::LengthMismatch {
					what: "dependency name length",
					declared: out.len() as u64,
					available: MAX_NAME_LEN as u64,
				});
			}
		}
		String::from_utf8(out).map_err(|_| DescriptorError::InvalidUtf8)
	}
}
