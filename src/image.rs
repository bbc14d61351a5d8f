//! Thin view over an ELF blob taken from the archive.
//!
//! Parsing and validation are delegated to the `elf` crate; this module adds
//! what the placement logic needs on top: memory bounds across the loadable
//! segments, access to segment bytes and the raw program-header table that
//! gets handed to the kernel for user images.

use elf::ElfBytes;
use elf::abi::PT_LOAD;
use elf::endian::AnyEndian;
use elf::file::Class;
use elf::segment::ProgramHeader;

use crate::errors::LoaderError;

/// Which address column of the program headers to take bounds from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bounds {
	Virtual,
	Physical,
}

#[derive(Debug)]
pub struct ElfImage<'a> {
	data: &'a [u8],
	elf: ElfBytes<'a, AnyEndian>,
}

impl<'a> ElfImage<'a> {
	/// Validates magic, class, endianness and version and wraps the blob.
	///
	/// The archive guarantees 4-byte alignment for its members; anything
	/// less means the archive was not assembled by our tooling.
	pub fn parse(data: &'a [u8]) -> Result<Self, LoaderError> {
		if data.as_ptr().addr() % 4 != 0 {
			error!("ELF in CPIO not 4-byte aligned!");
			return Err(LoaderError::BadElf);
		}

		let elf = ElfBytes::minimal_parse(data).map_err(|_| LoaderError::BadElf)?;
		Ok(Self { data, elf })
	}

	pub fn class(&self) -> Class {
		self.elf.ehdr.class
	}

	pub fn entry(&self) -> u64 {
		self.elf.ehdr.e_entry
	}

	pub fn phnum(&self) -> u16 {
		self.elf.ehdr.e_phnum
	}

	pub fn phentsize(&self) -> u16 {
		self.elf.ehdr.e_phentsize
	}

	pub fn phoff(&self) -> u64 {
		self.elf.ehdr.e_phoff
	}

	/// All `PT_LOAD` program headers in file order.
	pub fn load_segments(&self) -> impl Iterator<Item = ProgramHeader> + 'a {
		self.elf
			.segments()
			.into_iter()
			.flat_map(|table| table.iter())
			.filter(|phdr| phdr.p_type == PT_LOAD)
	}

	/// File bytes backing a segment.
	pub fn segment_data(&self, phdr: &ProgramHeader) -> Result<&'a [u8], LoaderError> {
		let offset = usize::try_from(phdr.p_offset).map_err(|_| LoaderError::BadElf)?;
		let len = usize::try_from(phdr.p_filesz).map_err(|_| LoaderError::BadElf)?;
		self.data
			.get(offset..offset + len)
			.ok_or(LoaderError::BadElf)
	}

	/// Smallest and one-past-largest address of the loadable segments.
	///
	/// The ELF format uses 64-bit addresses regardless of class, so a 32-bit
	/// loader has to reject files it cannot address before narrowing.
	pub fn memory_bounds(&self, bounds: Bounds) -> Result<(usize, usize), LoaderError> {
		let mut min = u64::MAX;
		let mut max = 0;
		let mut any = false;

		for phdr in self.load_segments() {
			let base = match bounds {
				Bounds::Virtual => phdr.p_vaddr,
				Bounds::Physical => phdr.p_paddr,
			};
			min = min.min(base);
			max = max.max(base + phdr.p_memsz);
			any = true;
		}

		if !any {
			error!("Could not get image bounds!");
			return Err(LoaderError::BadElf);
		}

		if min > usize::MAX as u64 || max > usize::MAX as u64 {
			error!("ELF file uses addresses beyond what this loader can represent!");
			return Err(LoaderError::ElfTooBig);
		}

		Ok((min as usize, max as usize))
	}

	/// The raw program-header table, exactly as stored in the file.
	pub fn header_table(&self) -> Result<&'a [u8], LoaderError> {
		let offset = usize::try_from(self.elf.ehdr.e_phoff).map_err(|_| LoaderError::BadElf)?;
		let len = usize::from(self.phnum()) * usize::from(self.phentsize());
		self.data
			.get(offset..offset + len)
			.ok_or(LoaderError::BadElf)
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use std::vec;
	use std::vec::Vec;

	use elf::file::Class;

	use super::{Bounds, ElfImage};
	use crate::errors::LoaderError;

	pub struct TestSegment {
		pub vaddr: u64,
		pub paddr: u64,
		pub data: Vec<u8>,
		pub memsz: u64,
	}

	/// Hand-assembles a little-endian ELF64 executable.
	pub fn build_elf64(entry: u64, segments: &[TestSegment]) -> Vec<u8> {
		const EHSIZE: usize = 64;
		const PHENTSIZE: usize = 56;

		let phnum = segments.len();
		let data_start = EHSIZE + phnum * PHENTSIZE;

		let mut out = vec![0u8; data_start];
		out[0..4].copy_from_slice(&[0x7f, b'E', b'L', b'F']);
		out[4] = 2; // ELFCLASS64
		out[5] = 1; // little endian
		out[6] = 1; // EV_CURRENT
		out[16..18].copy_from_slice(&2u16.to_le_bytes()); // ET_EXEC
		out[18..20].copy_from_slice(&0xf3u16.to_le_bytes()); // EM_RISCV
		out[20..24].copy_from_slice(&1u32.to_le_bytes());
		out[24..32].copy_from_slice(&entry.to_le_bytes());
		out[32..40].copy_from_slice(&(EHSIZE as u64).to_le_bytes()); // e_phoff
		out[52..54].copy_from_slice(&(EHSIZE as u16).to_le_bytes());
		out[54..56].copy_from_slice(&(PHENTSIZE as u16).to_le_bytes());
		out[56..58].copy_from_slice(&(phnum as u16).to_le_bytes());

		let mut file_offset = data_start;
		for (i, segment) in segments.iter().enumerate() {
			let ph = EHSIZE + i * PHENTSIZE;
			let mut phdr = [0u8; PHENTSIZE];
			phdr[0..4].copy_from_slice(&1u32.to_le_bytes()); // PT_LOAD
			phdr[4..8].copy_from_slice(&7u32.to_le_bytes()); // RWX
			phdr[8..16].copy_from_slice(&(file_offset as u64).to_le_bytes());
			phdr[16..24].copy_from_slice(&segment.vaddr.to_le_bytes());
			phdr[24..32].copy_from_slice(&segment.paddr.to_le_bytes());
			phdr[32..40].copy_from_slice(&(segment.data.len() as u64).to_le_bytes());
			phdr[40..48].copy_from_slice(&segment.memsz.to_le_bytes());
			phdr[48..56].copy_from_slice(&0x1000u64.to_le_bytes());
			out[ph..ph + PHENTSIZE].copy_from_slice(&phdr);
			file_offset += segment.data.len();
		}

		for segment in segments {
			out.extend_from_slice(&segment.data);
		}
		out
	}

	fn simple_elf() -> Vec<u8> {
		build_elf64(
			0x8000_0010,
			&[TestSegment {
				vaddr: 0x8000_0000,
				paddr: 0x4000_0000,
				data: vec![0xaa; 0x100],
				memsz: 0x200,
			}],
		)
	}

	#[test]
	fn parses_valid_header() {
		let bytes = simple_elf();
		let image = ElfImage::parse(&bytes).unwrap();

		assert_eq!(image.class(), Class::ELF64);
		assert_eq!(image.entry(), 0x8000_0010);
		assert_eq!(image.phnum(), 1);
		assert_eq!(image.phentsize(), 56);
	}

	#[test]
	fn rejects_bad_magic() {
		let mut bytes = simple_elf();
		bytes[1] = b'X';
		assert_eq!(ElfImage::parse(&bytes).unwrap_err(), LoaderError::BadElf);
	}

	#[test]
	fn bounds_follow_the_requested_address_column() {
		let bytes = simple_elf();
		let image = ElfImage::parse(&bytes).unwrap();

		assert_eq!(
			image.memory_bounds(Bounds::Virtual).unwrap(),
			(0x8000_0000, 0x8000_0200)
		);
		assert_eq!(
			image.memory_bounds(Bounds::Physical).unwrap(),
			(0x4000_0000, 0x4000_0200)
		);
	}

	#[test]
	fn bounds_span_multiple_segments() {
		let bytes = build_elf64(
			0x1000,
			&[
				TestSegment {
					vaddr: 0x1000,
					paddr: 0x1000,
					data: vec![1; 0x80],
					memsz: 0x80,
				},
				TestSegment {
					vaddr: 0x5000,
					paddr: 0x5000,
					data: vec![2; 0x10],
					memsz: 0x400,
				},
			],
		);
		let image = ElfImage::parse(&bytes).unwrap();
		assert_eq!(
			image.memory_bounds(Bounds::Virtual).unwrap(),
			(0x1000, 0x5400)
		);
	}

	#[test]
	fn no_loadable_segments_is_an_error() {
		let bytes = build_elf64(0, &[]);
		let image = ElfImage::parse(&bytes).unwrap();
		assert_eq!(
			image.memory_bounds(Bounds::Virtual).unwrap_err(),
			LoaderError::BadElf
		);
	}

	#[test]
	fn header_table_round_trips() {
		let bytes = simple_elf();
		let image = ElfImage::parse(&bytes).unwrap();

		let table = image.header_table().unwrap();
		assert_eq!(table.len(), 56);
		assert_eq!(table, &bytes[64..64 + 56]);
	}

	#[test]
	fn segment_data_is_bounds_checked() {
		let bytes = simple_elf();
		let image = ElfImage::parse(&bytes).unwrap();
		let phdr = image.load_segments().next().unwrap();
		assert_eq!(image.segment_data(&phdr).unwrap().len(), 0x100);

		let truncated = &bytes[..bytes.len() - 1];
		let image = ElfImage::parse(truncated).unwrap();
		let phdr = image.load_segments().next().unwrap();
		assert_eq!(
			image.segment_data(&phdr).unwrap_err(),
			LoaderError::BadElf
		);
	}
}
