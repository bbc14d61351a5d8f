//! Placement of the archive payload into physical memory.
//!
//! Driven once by the boot core, with the MMU still off: the kernel goes to
//! the physical address its ELF demands, the device tree and the user images
//! are appended behind it, page by page. A single monotonic cursor decides
//! where the next object lands; every destination is checked against the
//! loader's own footprint first, because overwriting ourselves is the one
//! mistake we could never diagnose.

use core::ptr::NonNull;

use align_address::Align;
use heapless::Vec;
use memory_addresses::{PhysAddr, VirtAddr};

use crate::archive::Archive;
use crate::config::{MAX_USER_IMAGES, PAGE_SIZE};
use crate::errors::LoaderError;
use crate::image::{Bounds, ElfImage};
use crate::verify;

const KERNEL_IMAGE: &str = "kernel.elf";
const KERNEL_DTB: &str = "kernel.dtb";
const KERNEL_DIGEST: &str = "kernel.bin";
const APP_DIGEST: &str = "app.bin";

/// A half-open physical address range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
	pub start: usize,
	pub end: usize,
}

impl Region {
	pub const fn new(start: usize, end: usize) -> Self {
		Self { start, end }
	}

	pub fn overlaps(&self, other: Region) -> bool {
		self.start < other.end && other.start < self.end
	}
}

/// Where an image ended up and where it believes it lives.
#[derive(Clone, Copy, Debug)]
pub struct ImageInfo {
	pub phys_region_start: PhysAddr,
	pub phys_region_end: PhysAddr,
	pub virt_region_start: VirtAddr,
	pub virt_region_end: VirtAddr,
	pub virt_entry: VirtAddr,
	/// `phys_region_start - virt_region_start`, wrapping. Adding this to a
	/// virtual address inside the image yields its current physical address.
	pub phys_virt_offset: usize,
}

/// The relocated device tree blob.
#[derive(Clone, Copy, Debug)]
pub struct Dtb {
	pub paddr: PhysAddr,
	pub size: usize,
}

#[derive(Debug)]
pub struct LoadedImages {
	pub kernel: ImageInfo,
	pub user: Vec<ImageInfo, MAX_USER_IMAGES>,
	pub dtb: Option<Dtb>,
}

fn ensure_phys_range_valid(start: usize, end: usize, loader: Region) -> Result<(), LoaderError> {
	if Region::new(start, end).overlaps(loader) {
		error!("image load address overlaps with ELF-loader!");
		return Err(LoaderError::Overlap);
	}
	Ok(())
}

/// Unpacks one ELF to `dest_paddr` and returns its descriptor plus the first
/// free page after it.
///
/// With `keep_headers` the page following the image body receives a copy of
/// the program headers for the kernel to pick up: `phnum` at offset 0,
/// `phentsize` at offset 4, the raw header table from offset 8 on.
pub fn load_elf(
	image: &ElfImage<'_>,
	dest_paddr: usize,
	keep_headers: bool,
	loader: Region,
) -> Result<(ImageInfo, usize), LoaderError> {
	let (vaddr_start, vaddr_max) = image.memory_bounds(Bounds::Virtual)?;
	let vaddr_end = vaddr_max.align_up(PAGE_SIZE);
	let image_size = vaddr_end - vaddr_start;

	let entry = usize::try_from(image.entry()).map_err(|_| LoaderError::ElfTooBig)?;
	if !(vaddr_start..vaddr_end).contains(&entry) {
		error!("entry point {entry:#x} lies outside the image");
		return Err(LoaderError::BadElf);
	}

	info!("  paddr=[{:#x}..{:#x}]", dest_paddr, dest_paddr + image_size - 1);
	info!("  vaddr=[{:#x}..{:#x}]", vaddr_start, vaddr_end - 1);
	info!("  virt_entry={entry:#x}");

	if !dest_paddr.is_multiple_of(PAGE_SIZE) || !vaddr_start.is_multiple_of(PAGE_SIZE) {
		error!("physical or virtual address not aligned to {PAGE_SIZE:#x} pages!");
		return Err(LoaderError::Misaligned);
	}
	ensure_phys_range_valid(dest_paddr, dest_paddr + image_size, loader)?;

	let phys_virt_offset = dest_paddr.wrapping_sub(vaddr_start);

	// The ELF may be sparse; segment tails with memsz > filesz rely on this.
	unsafe {
		core::ptr::write_bytes(dest_paddr as *mut u8, 0, image_size);
	}

	for phdr in image.load_segments() {
		let data = image.segment_data(&phdr)?;
		if data.is_empty() {
			continue;
		}
		let dst = (phdr.p_vaddr as usize).wrapping_add(phys_virt_offset);
		debug!(
			"  copy segment [{:#x}..{:#x}] -> [{:#x}..{:#x}]",
			data.as_ptr() as usize,
			data.as_ptr() as usize + data.len() - 1,
			dst,
			dst + data.len() - 1
		);
		unsafe {
			core::ptr::copy_nonoverlapping(data.as_ptr(), dst as *mut u8, data.len());
		}
	}

	let info = ImageInfo {
		phys_region_start: PhysAddr::new(dest_paddr as u64),
		phys_region_end: PhysAddr::new((dest_paddr + image_size) as u64),
		virt_region_start: VirtAddr::new(vaddr_start as u64),
		virt_region_end: VirtAddr::new(vaddr_end as u64),
		virt_entry: VirtAddr::new(entry as u64),
		phys_virt_offset,
	};

	let mut next_phys = (dest_paddr + image_size).align_up(PAGE_SIZE);

	if keep_headers {
		// There is no way to share type definitions with the kernel, so the
		// layout is a handful of fixed offsets.
		ensure_phys_range_valid(next_phys, next_phys + PAGE_SIZE, loader)?;
		let table = image.header_table()?;
		let phnum = u32::from(image.phnum()).to_le_bytes();
		let phentsize = u32::from(image.phentsize()).to_le_bytes();
		unsafe {
			core::ptr::copy_nonoverlapping(phnum.as_ptr(), next_phys as *mut u8, 4);
			core::ptr::copy_nonoverlapping(phentsize.as_ptr(), (next_phys + 4) as *mut u8, 4);
			core::ptr::copy_nonoverlapping(table.as_ptr(), (next_phys + 8) as *mut u8, table.len());
		}
		next_phys += PAGE_SIZE;
	}

	Ok((info, next_phys))
}

/// The kernel is loaded at the physical address recorded in its program
/// headers; it is the only image with that privilege.
fn load_kernel(archive: &Archive<'_>, loader: Region) -> Result<(ImageInfo, usize), LoaderError> {
	info!("ELF-loading kernel");

	let Some(entry) = archive.find(KERNEL_IMAGE) else {
		error!("No kernel image present in archive");
		return Err(LoaderError::NoKernel);
	};
	info!("  CPIO ELF file, {} byte", entry.data.len());

	match archive.at_index(0) {
		Some(first) if first.name == KERNEL_IMAGE => {}
		_ => {
			error!("Kernel image not first image in archive");
			return Err(LoaderError::NoKernel);
		}
	}

	verify::check_hash(archive, entry.data, KERNEL_DIGEST)?;

	let image = ElfImage::parse(entry.data)?;
	let (phys_start, phys_end) = image.memory_bounds(Bounds::Physical)?;
	let (info, _) = load_elf(&image, phys_start, false, loader)?;

	Ok((info, phys_end.align_up(PAGE_SIZE)))
}

/// Relocates the device tree to the cursor. An archive DTB wins over the one
/// a previous boot stage handed us; packaging bugs are caught by insisting
/// the archive copy sits at index 1.
fn install_dtb(
	archive: &Archive<'_>,
	bootloader_dtb: Option<NonNull<u8>>,
	next_phys: usize,
	loader: Region,
) -> Result<(Option<Dtb>, usize, usize), LoaderError> {
	info!("installing DTB");

	let mut user_elf_offset = 1;
	let (fdt, src, cpio_len) = if let Some(entry) = archive.find(KERNEL_DTB) {
		info!("  CPIO DTB file, {} byte", entry.data.len());
		match archive.at_index(1) {
			Some(second) if second.name == KERNEL_DTB => {}
			_ => {
				error!("Kernel DTB not second image in archive.");
				return Err(LoaderError::BadDtb);
			}
		}
		user_elf_offset = 2;
		(
			fdt::Fdt::new(entry.data),
			entry.data.as_ptr(),
			entry.data.len(),
		)
	} else if let Some(dtb) = bootloader_dtb {
		let ptr = dtb.as_ptr().cast_const();
		info!("  Using DTB from bootloader at {ptr:p}.");
		(unsafe { fdt::Fdt::from_ptr(ptr) }, ptr, 0)
	} else {
		info!("  No DTB available");
		return Ok((None, user_elf_offset, next_phys));
	};

	let size = match fdt {
		Ok(fdt) => fdt.total_size(),
		Err(fdt::FdtError::BufferTooSmall) if cpio_len != 0 => {
			error!("parsed device tree is larger than its CPIO file ({cpio_len} byte)");
			return Err(LoaderError::BadDtb);
		}
		Err(_) => {
			error!("Invalid device tree blob supplied!");
			return Err(LoaderError::BadDtb);
		}
	};
	if size == 0 {
		error!("Invalid device tree blob supplied!");
		return Err(LoaderError::BadDtb);
	}

	let dest = next_phys;
	info!(
		"  put DTB behind kernel: [{:#x}..{:#x}] -> [{:#x}..{:#x}]",
		src as usize,
		src as usize + size - 1,
		dest,
		dest + size - 1
	);
	ensure_phys_range_valid(dest, dest + size, loader)?;

	// A firmware DTB can lie anywhere, including inside the target range.
	unsafe {
		core::ptr::copy(src, dest as *mut u8, size);
	}

	Ok((
		Some(Dtb {
			paddr: PhysAddr::new(dest as u64),
			size,
		}),
		user_elf_offset,
		(dest + size).align_up(PAGE_SIZE),
	))
}

/// Loads every remaining archive entry as a user image, keeping the ELF
/// headers next to each. The n'th image is meant for the n'th core; how the
/// kernel assigns them is its business.
fn load_user_images(
	archive: &Archive<'_>,
	first_index: usize,
	mut next_phys: usize,
	loader: Region,
	ram: Region,
) -> Result<Vec<ImageInfo, MAX_USER_IMAGES>, LoaderError> {
	// Default policy appends after the kernel and DTB. Alternatively the
	// images are packed against the top of RAM, leaving the space after the
	// kernel to the kernel's own allocator.
	#[cfg(feature = "rootservers-last")]
	{
		let mut total_user_image_size = 0;
		for i in 0..MAX_USER_IMAGES {
			let Some(entry) = archive.at_index(first_index + i) else {
				break;
			};
			let image = ElfImage::parse(entry.data)?;
			let (min_vaddr, max_vaddr) = image.memory_bounds(Bounds::Virtual)?;
			total_user_image_size += max_vaddr.align_up(PAGE_SIZE) - min_vaddr + PAGE_SIZE;
		}
		next_phys =
			ram.end.align_down(PAGE_SIZE) - total_user_image_size.align_up(PAGE_SIZE);
	}
	#[cfg(not(feature = "rootservers-last"))]
	let _ = ram;

	let mut user = Vec::new();
	for i in 0..MAX_USER_IMAGES {
		let Some(entry) = archive.at_index(first_index + i) else {
			break;
		};
		info!("ELF-loading app '{}'", entry.name);
		info!("  CPIO ELF file, {} byte", entry.data.len());

		verify::check_hash(archive, entry.data, APP_DIGEST)?;

		let image = ElfImage::parse(entry.data)?;
		let (info, next) = load_elf(&image, next_phys, true, loader)?;
		next_phys = next;
		user.push(info).ok();
	}

	Ok(user)
}

/// Runs the whole placement pipeline: kernel, then DTB, then user images.
///
/// `loader` is the physical range occupied by this loader itself, `ram` the
/// platform's memory window, `bootloader_dtb` whatever the previous boot
/// stage handed over (may be null).
pub fn load_images(
	archive: &Archive<'_>,
	loader: Region,
	bootloader_dtb: Option<NonNull<u8>>,
	ram: Region,
) -> Result<LoadedImages, LoaderError> {
	debug!(
		"loader image [{:#x}..{:#x}], RAM window [{:#x}..{:#x}]",
		loader.start, loader.end, ram.start, ram.end
	);

	let (kernel, next_phys) = load_kernel(archive, loader)?;
	let (dtb, user_elf_offset, next_phys) = install_dtb(archive, bootloader_dtb, next_phys, loader)?;
	let user = load_user_images(archive, user_elf_offset, next_phys, loader, ram)?;

	Ok(LoadedImages { kernel, user, dtb })
}

#[cfg(test)]
mod tests {
	use core::ptr::NonNull;
	use std::alloc::{Layout, alloc_zeroed, dealloc};
	use std::vec;
	use std::vec::Vec;

	use super::{LoadedImages, Region, load_images};
	use crate::archive::Archive;
	use crate::archive::tests::build_archive;
	use crate::config::PAGE_SIZE;
	use crate::errors::LoaderError;
	use crate::image::tests::{TestSegment, build_elf64};

	/// A page-aligned scratch buffer standing in for the platform RAM.
	struct TestRam {
		ptr: *mut u8,
		layout: Layout,
	}

	impl TestRam {
		fn new(size: usize) -> Self {
			let layout = Layout::from_size_align(size, PAGE_SIZE).unwrap();
			let ptr = unsafe { alloc_zeroed(layout) };
			assert!(!ptr.is_null());
			Self { ptr, layout }
		}

		fn base(&self) -> usize {
			self.ptr as usize
		}

		fn region(&self) -> Region {
			Region::new(self.base(), self.base() + self.layout.size())
		}

		fn bytes(&self, offset: usize, len: usize) -> &[u8] {
			unsafe { core::slice::from_raw_parts(self.ptr.add(offset), len) }
		}
	}

	impl Drop for TestRam {
		fn drop(&mut self) {
			unsafe { dealloc(self.ptr, self.layout) };
		}
	}

	/// A loader footprint far away from the test RAM.
	const FAKE_LOADER: Region = Region::new(0x10, 0x20);

	const KERNEL_VADDR: u64 = 0xFFFF_FF80_0000_0000;

	fn kernel_elf(paddr: u64, filesz: usize, memsz: u64) -> Vec<u8> {
		build_elf64(
			KERNEL_VADDR,
			&[TestSegment {
				vaddr: KERNEL_VADDR,
				paddr,
				data: vec![0x5a; filesz],
				memsz,
			}],
		)
	}

	fn run(ram: &TestRam, entries: &[(&str, &[u8])]) -> Result<LoadedImages, LoaderError> {
		let bytes = build_archive(entries);
		let archive = Archive::new(&bytes);
		load_images(&archive, FAKE_LOADER, None, ram.region())
	}

	#[test]
	fn minimal_archive_single_image() {
		let ram = TestRam::new(0x10000);
		let kernel = kernel_elf(ram.base() as u64, 0x4000, 0x4000);

		let images = run(&ram, &[("kernel.elf", &kernel)]).unwrap();

		assert_eq!(images.kernel.phys_region_start.as_u64(), ram.base() as u64);
		assert_eq!(
			images.kernel.phys_region_end.as_u64(),
			(ram.base() + 0x4000) as u64
		);
		assert_eq!(images.kernel.virt_region_start.as_u64(), KERNEL_VADDR);
		assert_eq!(images.kernel.virt_entry.as_u64(), KERNEL_VADDR);
		assert_eq!(
			images.kernel.phys_virt_offset,
			(ram.base() as u64).wrapping_sub(KERNEL_VADDR) as usize
		);
		assert!(images.user.is_empty());
		assert!(images.dtb.is_none());

		// The segment bytes must actually be there.
		assert!(ram.bytes(0, 0x4000).iter().all(|&b| b == 0x5a));
	}

	#[test]
	fn sparse_segments_are_zero_filled() {
		let ram = TestRam::new(0x10000);
		// 0x1000 bytes in the file, 0x3000 bytes in memory.
		let kernel = kernel_elf(ram.base() as u64, 0x1000, 0x3000);

		run(&ram, &[("kernel.elf", &kernel)]).unwrap();

		assert!(ram.bytes(0, 0x1000).iter().all(|&b| b == 0x5a));
		assert!(ram.bytes(0x1000, 0x2000).iter().all(|&b| b == 0));
	}

	#[test]
	fn kernel_plus_one_user_image() {
		let ram = TestRam::new(0x20000);
		let kernel = kernel_elf(ram.base() as u64, 0x4000, 0x4000);
		let app = build_elf64(
			0x40_0000,
			&[TestSegment {
				vaddr: 0x40_0000,
				paddr: 0,
				data: vec![0xc3; 0x1000],
				memsz: 0x1000,
			}],
		);

		let images = run(&ram, &[("kernel.elf", &kernel), ("app0.elf", &app)]).unwrap();

		assert_eq!(images.user.len(), 1);
		let user = &images.user[0];
		assert_eq!(user.phys_region_start.as_u64(), (ram.base() + 0x4000) as u64);
		assert_eq!(user.phys_region_end.as_u64(), (ram.base() + 0x5000) as u64);
		assert_eq!(user.virt_region_start.as_u64(), 0x40_0000);

		// The page after the image carries the ELF headers.
		let headers = ram.bytes(0x5000, 8 + 56);
		assert_eq!(u32::from_le_bytes(headers[0..4].try_into().unwrap()), 1);
		assert_eq!(u32::from_le_bytes(headers[4..8].try_into().unwrap()), 56);
		assert_eq!(&headers[8..8 + 56], &app[64..64 + 56]);
	}

	#[test]
	fn placement_is_monotonic() {
		let ram = TestRam::new(0x40000);
		let kernel = kernel_elf(ram.base() as u64, 0x4000, 0x4000);
		let mk_app = |vaddr: u64| {
			build_elf64(
				vaddr,
				&[TestSegment {
					vaddr,
					paddr: 0,
					data: vec![1; 0x800],
					memsz: 0x800,
				}],
			)
		};
		let app0 = mk_app(0x40_0000);
		let app1 = mk_app(0x50_0000);

		let images = run(
			&ram,
			&[("kernel.elf", &kernel), ("app0.elf", &app0), ("app1.elf", &app1)],
		)
		.unwrap();

		assert_eq!(images.user.len(), 2);
		let mut previous_end = images.kernel.phys_region_end.as_u64();
		for user in &images.user {
			assert!(user.phys_region_start.as_u64() >= previous_end);
			previous_end = user.phys_region_end.as_u64();
		}
	}

	fn fake_dtb(total_size: usize) -> Vec<u8> {
		let mut out = vec![0u8; total_size];
		let fields: [(usize, u32); 10] = [
			(0, 0xd00d_feed),          // magic
			(4, total_size as u32),    // totalsize
			(8, 56),                   // off_dt_struct
			(12, 72),                  // off_dt_strings
			(16, 40),                  // off_mem_rsvmap
			(20, 17),                  // version
			(24, 16),                  // last_comp_version
			(28, 0),                   // boot_cpuid_phys
			(32, 0),                   // size_dt_strings
			(36, 16),                  // size_dt_struct
		];
		for (offset, value) in fields {
			out[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
		}
		// memory reservation map: one all-zero terminator entry at 40..56.
		// structure block: BEGIN_NODE, empty name, END_NODE, END.
		for (offset, token) in [(56, 1u32), (60, 0), (64, 2), (68, 9)] {
			out[offset..offset + 4].copy_from_slice(&token.to_be_bytes());
		}
		out
	}

	#[test]
	fn archive_dtb_is_relocated_after_the_kernel() {
		let ram = TestRam::new(0x20000);
		let kernel = kernel_elf(ram.base() as u64, 0x4000, 0x4000);
		let dtb = fake_dtb(0x200);

		let images = run(&ram, &[("kernel.elf", &kernel), ("kernel.dtb", &dtb)]).unwrap();

		let placed = images.dtb.unwrap();
		assert_eq!(placed.paddr.as_u64(), (ram.base() + 0x4000) as u64);
		assert_eq!(placed.size, 0x200);
		assert_eq!(ram.bytes(0x4000, 0x200), &dtb[..]);
	}

	#[test]
	fn user_images_follow_the_dtb() {
		let ram = TestRam::new(0x20000);
		let kernel = kernel_elf(ram.base() as u64, 0x4000, 0x4000);
		let dtb = fake_dtb(0x200);
		let app = build_elf64(
			0x40_0000,
			&[TestSegment {
				vaddr: 0x40_0000,
				paddr: 0,
				data: vec![7; 0x1000],
				memsz: 0x1000,
			}],
		);

		let images = run(
			&ram,
			&[("kernel.elf", &kernel), ("kernel.dtb", &dtb), ("app0.elf", &app)],
		)
		.unwrap();

		// DTB occupies [0x4000..0x4200); the next page boundary is 0x5000.
		assert_eq!(
			images.user[0].phys_region_start.as_u64(),
			(ram.base() + 0x5000) as u64
		);
	}

	#[test]
	fn bootloader_dtb_is_used_when_archive_has_none() {
		let ram = TestRam::new(0x20000);
		let kernel = kernel_elf(ram.base() as u64, 0x4000, 0x4000);
		let dtb = fake_dtb(0x100);

		let bytes = build_archive(&[("kernel.elf", &kernel)]);
		let archive = Archive::new(&bytes);
		let firmware = NonNull::new(dtb.as_ptr().cast_mut()).unwrap();
		let images = load_images(&archive, FAKE_LOADER, Some(firmware), ram.region()).unwrap();

		let placed = images.dtb.unwrap();
		assert_eq!(placed.size, 0x100);
		assert_eq!(ram.bytes(0x4000, 0x100), &dtb[..]);
	}

	#[test]
	fn archive_dtb_must_be_second() {
		let ram = TestRam::new(0x20000);
		let kernel = kernel_elf(ram.base() as u64, 0x4000, 0x4000);
		let dtb = fake_dtb(0x100);
		let app = build_elf64(
			0x40_0000,
			&[TestSegment {
				vaddr: 0x40_0000,
				paddr: 0,
				data: vec![7; 0x100],
				memsz: 0x100,
			}],
		);

		let result = run(
			&ram,
			&[("kernel.elf", &kernel), ("app0.elf", &app), ("kernel.dtb", &dtb)],
		);
		assert_eq!(result.unwrap_err(), LoaderError::BadDtb);
	}

	#[test]
	fn oversized_dtb_is_rejected() {
		let ram = TestRam::new(0x20000);
		let kernel = kernel_elf(ram.base() as u64, 0x4000, 0x4000);
		// Header claims 0x300 bytes, but the archive record only carries 0x200.
		let dtb = fake_dtb(0x300);

		let result = run(&ram, &[("kernel.elf", &kernel), ("kernel.dtb", &dtb[..0x200])]);
		assert_eq!(result.unwrap_err(), LoaderError::BadDtb);
	}

	#[test]
	fn corrupt_dtb_is_rejected() {
		let ram = TestRam::new(0x20000);
		let kernel = kernel_elf(ram.base() as u64, 0x4000, 0x4000);
		let mut dtb = fake_dtb(0x100);
		dtb[0] = 0;

		let result = run(&ram, &[("kernel.elf", &kernel), ("kernel.dtb", &dtb)]);
		assert_eq!(result.unwrap_err(), LoaderError::BadDtb);
	}

	#[test]
	fn kernel_overlapping_the_loader_is_refused() {
		let ram = TestRam::new(0x10000);
		let kernel = kernel_elf(ram.base() as u64, 0x4000, 0x4000);

		let bytes = build_archive(&[("kernel.elf", &kernel)]);
		let archive = Archive::new(&bytes);
		// Pretend the loader sits right where the kernel wants to go.
		let loader = Region::new(ram.base() + 0x2000, ram.base() + 0x3000);
		let result = load_images(&archive, loader, None, ram.region());

		assert_eq!(result.unwrap_err(), LoaderError::Overlap);
	}

	#[test]
	fn missing_kernel_is_refused() {
		let ram = TestRam::new(0x10000);
		let result = run(&ram, &[("app0.elf", b"not checked")]);
		assert_eq!(result.unwrap_err(), LoaderError::NoKernel);
	}

	#[test]
	fn kernel_not_first_is_refused() {
		let ram = TestRam::new(0x10000);
		let kernel = kernel_elf(ram.base() as u64, 0x1000, 0x1000);
		let result = run(&ram, &[("other.bin", b"x"), ("kernel.elf", &kernel)]);
		assert_eq!(result.unwrap_err(), LoaderError::NoKernel);
	}

	#[test]
	fn unaligned_kernel_paddr_is_refused() {
		let ram = TestRam::new(0x10000);
		let kernel = kernel_elf((ram.base() + 0x10) as u64, 0x1000, 0x1000);
		let result = run(&ram, &[("kernel.elf", &kernel)]);
		assert_eq!(result.unwrap_err(), LoaderError::Misaligned);
	}

	#[test]
	fn entry_outside_the_image_is_refused() {
		let ram = TestRam::new(0x10000);
		let kernel = build_elf64(
			KERNEL_VADDR + 0x10_0000,
			&[TestSegment {
				vaddr: KERNEL_VADDR,
				paddr: ram.base() as u64,
				data: vec![0; 0x1000],
				memsz: 0x1000,
			}],
		);
		let result = run(&ram, &[("kernel.elf", &kernel)]);
		assert_eq!(result.unwrap_err(), LoaderError::BadElf);
	}

	#[cfg(feature = "rootservers-last")]
	#[test]
	fn rootservers_land_below_the_ram_top() {
		let ram = TestRam::new(0x20000);
		let kernel = kernel_elf(ram.base() as u64, 0x1000, 0x1000);
		let app = build_elf64(
			0x40_0000,
			&[TestSegment {
				vaddr: 0x40_0000,
				paddr: 0,
				data: vec![9; 0x1000],
				memsz: 0x1000,
			}],
		);

		let images = run(&ram, &[("kernel.elf", &kernel), ("app0.elf", &app)]).unwrap();

		// Image page plus headers page, packed against the top of RAM.
		let expected = ram.region().end - 0x2000;
		assert_eq!(images.user[0].phys_region_start.as_u64(), expected as u64);
	}
}
