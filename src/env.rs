//! The loader's own footprint, as laid out by the linker script.

use crate::archive::Archive;
use crate::load::Region;

unsafe extern "C" {
	static _text: u8;
	static _end: u8;
	static _bss: u8;
	static _bss_end: u8;
	static _archive_start: u8;
	static _archive_end: u8;
}

/// Physical bytes occupied by the loader image, including the embedded
/// archive and BSS. Nothing may ever be loaded into this range.
pub fn loader_region() -> Region {
	unsafe { Region::new(&raw const _text as usize, &raw const _end as usize) }
}

/// The CPIO archive baked into the loader image.
pub fn archive() -> Archive<'static> {
	unsafe {
		let start = &raw const _archive_start;
		let len = &raw const _archive_end as usize - start as usize;
		Archive::new(core::slice::from_raw_parts(start, len))
	}
}

/// Zeroes the BSS segment. Only needed on platforms whose startup shim does
/// not do this itself; running it twice is harmless as long as it happens
/// before the first use of any static.
pub fn clear_bss() {
	unsafe {
		let mut current = &raw const _bss as usize;
		let end = &raw const _bss_end as usize;
		while current < end {
			core::ptr::write_volatile(current as *mut u8, 0);
			current += 1;
		}
	}
}
