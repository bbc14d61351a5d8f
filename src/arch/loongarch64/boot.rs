//! LoongArch boot flow.
//!
//! The startup shim leaves us in direct-address mode with the console UART
//! reachable through a direct-mapped window. Everything here is about
//! getting the mapped-address world ready: page tables, the page-walk
//! controller, the TLB page sizes and the refill handler, then the switch
//! of CRMD from direct to paged translation right before the kernel entry.

use core::arch::asm;

use hermit_sync::OnceCell;

use super::paging::{self, PWCH_VALUE, PWCL_VALUE, PagePool, TablePage};
use crate::config::{MAX_NUM_NODES, PLATFORM_RAM};
use crate::load::{self, LoadedImages, Region};
use crate::{abort, drivers, env, logging};

static ROOT_PT: TablePage = TablePage::new();
static BOOT_PAGE_POOL: PagePool = PagePool::new();

static LOADED: OnceCell<LoadedImages> = OnceCell::new();

/// 32 MiB expressed as a TLB page-size exponent.
const PS_32M: u64 = 25;

/// CRMD value switching to paged translation, caches on.
const CRMD_PAGING: u64 = 0xb0;

unsafe extern "C" {
	/// TLB refill handler, provided by the startup shim.
	fn handle_tlb_refill();
	/// Trap stub that reports an unexpected exception and parks the core.
	fn trap_entry();
}

pub fn halt() {
	unsafe {
		asm!("idle 0", options(nomem, nostack));
	}
}

fn dbar() {
	unsafe {
		asm!("dbar 0", options(nostack));
	}
}

fn ibar() {
	unsafe {
		asm!("ibar 0", options(nostack));
	}
}

fn invtlb_all() {
	unsafe {
		asm!("invtlb 0x1, $zero, $zero", options(nostack));
	}
}

/// Programs the page-walk controller with our table geometry and points the
/// walker at the root for the high half of the address space.
fn setup_pw() {
	unsafe {
		asm!("csrwr {}, 0x1c", inlateout(reg) PWCL_VALUE => _); // PWCL
		asm!("csrwr {}, 0x1d", inlateout(reg) PWCH_VALUE => _); // PWCH
		asm!("csrwr {}, 0x1a", inlateout(reg) ROOT_PT.base() as u64 => _); // PGDH
	}
}

fn read_tlbidx_pagesize() -> u64 {
	let tlbidx: u64;
	unsafe {
		asm!("csrrd {}, 0x10", out(reg) tlbidx);
	}
	(tlbidx >> 24) & 0x3f
}

/// Selects 32 MiB pages in every TLB page-size register and installs the
/// refill handler. The hardware is free to ignore page sizes it does not
/// implement, so the value is read back and checked.
fn init_tlb() {
	unsafe {
		// TLBIDX.PS
		asm!(
			"csrxchg {}, {}, 0x10",
			inlateout(reg) PS_32M << 24 => _,
			in(reg) 0x3f00_0000u64,
		);
		// STLBPGSIZE
		asm!("csrwr {}, 0x1e", inlateout(reg) PS_32M => _);
		// TLBREHI.PS
		asm!(
			"csrxchg {}, {}, 0x8e",
			inlateout(reg) PS_32M => _,
			in(reg) 0x3fu64,
		);
	}

	if read_tlbidx_pagesize() != PS_32M {
		warn!("MMU doesn't support the 32 MiB page size");
	}

	unsafe {
		// TLBRENTRY
		asm!("csrwr {}, 0x88", inlateout(reg) handle_tlb_refill as usize as u64 => _);
	}
}

fn enable_virtual_memory() {
	setup_pw();
	init_tlb();
	invtlb_all();

	dbar();
	unsafe {
		// CRMD: direct address translation off, paging on.
		asm!("csrwr {}, 0x0", inlateout(reg) CRMD_PAGING => _);
	}
	ibar();
}

fn handover_to_next_boot_stage(hart_id: usize) -> ! {
	let Some(images) = LOADED.get() else {
		abort();
	};
	let kernel = &images.kernel;
	let user = images.user[0];
	let (dtb_ptr, dtb_size) = images
		.dtb
		.map_or((0, 0), |dtb| (dtb.paddr.as_usize(), dtb.size));

	info!("Enabling MMU and paging");
	enable_virtual_memory();

	unsafe {
		// Unexpected traps from here on land in the shim's report-and-park
		// stub.
		asm!("csrwr {}, 0xc", inlateout(reg) trap_entry as usize as u64 => _); // EENTRY
	}

	info!("Jumping to kernel-image entry point...");
	println!();
	info!(
		"kernel phys=[{:#x}..{:#x}], virt_entry={:#x}",
		kernel.phys_region_start.as_usize(),
		kernel.phys_region_end.as_usize(),
		kernel.virt_entry.as_usize()
	);
	info!("dtb physical address: {dtb_ptr:#x}, size: {dtb_size}");

	#[cfg(feature = "smp")]
	let entry: extern "C" fn(usize, usize, usize, usize, usize, usize, usize, usize) =
		unsafe { core::mem::transmute(kernel.virt_entry.as_usize()) };
	#[cfg(not(feature = "smp"))]
	let entry: extern "C" fn(usize, usize, usize, usize, usize, usize) =
		unsafe { core::mem::transmute(kernel.virt_entry.as_usize()) };

	#[cfg(feature = "smp")]
	entry(
		user.phys_region_start.as_usize(),
		user.phys_region_end.as_usize(),
		user.phys_virt_offset,
		user.virt_entry.as_usize(),
		dtb_ptr,
		dtb_size,
		hart_id,
		0,
	);
	#[cfg(not(feature = "smp"))]
	{
		let _ = hart_id;
		entry(
			user.phys_region_start.as_usize(),
			user.phys_region_end.as_usize(),
			user.phys_virt_offset,
			user.virt_entry.as_usize(),
			dtb_ptr,
			dtb_size,
		);
	}

	error!("ERROR: Kernel returned back to the ELF Loader");
	abort();
}

/// Boot-core entry, called by the startup shim.
#[unsafe(no_mangle)]
pub extern "C" fn main(hart_id: usize, bootloader_dtb: *const u8) -> ! {
	env::clear_bss();
	unsafe {
		logging::init();
	}

	let dtb_ptr = core::ptr::NonNull::new(bootloader_dtb.cast_mut());
	if let Some(dtb) = dtb_ptr {
		if let Ok(fdt) = unsafe { fdt::Fdt::from_ptr(dtb.as_ptr()) } {
			drivers::init_drivers(&fdt);
		}
	}

	info!("ELF-loader started on (HART {hart_id}) (NODES {MAX_NUM_NODES})");
	let loader = env::loader_region();
	info!("  paddr=[{:#x}..{:#x}]", loader.start, loader.end - 1);

	let ram = Region::new(PLATFORM_RAM.0, PLATFORM_RAM.1);
	let images = match load::load_images(&env::archive(), loader, dtb_ptr, ram) {
		Ok(images) => images,
		Err(err) => {
			error!("ERROR: image loading failed: {err}");
			abort();
		}
	};
	if images.user.len() != 1 {
		error!(
			"ERROR: expected to load just 1 app, actually loaded {} apps",
			images.user.len()
		);
		abort();
	}

	if let Err(err) = paging::map_kernel_window(&ROOT_PT, &BOOT_PAGE_POOL, &images.kernel) {
		error!("ERROR: could not map kernel window: {err}");
		abort();
	}

	LOADED.set(images).ok();

	handover_to_next_boot_stage(hart_id)
}
