//! RISC-V boot flow.
//!
//! Printing goes through the SBI console, so no UART driver is needed
//! before the kernel takes over. The startup shim calls [`main`] on the
//! boot hart; secondaries arrive in [`secondary_entry`], either started by
//! us through the HSM extension or released by firmware that had them
//! parked all along.

use core::arch::asm;

use hermit_sync::OnceCell;
use riscv::register::satp;
use riscv::register::satp::Satp;

use super::paging::{self, ACTIVE, PagePool, TablePage};
#[cfg(feature = "smp")]
use crate::config::FIRST_HART_ID;
use crate::config::{MAX_NUM_NODES, PLATFORM_RAM};
use crate::load::{self, LoadedImages, Region};
#[cfg(feature = "smp")]
use crate::smp::CORES;
use crate::{abort, console, env, logging};

static ROOT_PT: TablePage = TablePage::new();
static BOOT_PAGE_POOL: PagePool = PagePool::new();

/// Filled by the primary before the secondaries are released.
static LOADED: OnceCell<LoadedImages> = OnceCell::new();

pub fn halt() {
	riscv::asm::wfi();
}

fn enable_virtual_memory() {
	unsafe {
		asm!("sfence.vma", options(nostack));
		satp::write(Satp::from_bits(paging::satp_value(
			ACTIVE,
			ROOT_PT.base() as usize,
		)));
		asm!("fence.i", options(nostack));
	}
}

/// Jump into the kernel with the full eight-register ABI.
fn handover_to_next_boot_stage(hart_id: usize, core_id: usize) -> ! {
	let Some(images) = LOADED.get() else {
		abort();
	};
	let user = images.user[0];
	let (dtb_ptr, dtb_size) = images
		.dtb
		.map_or((0, 0), |dtb| (dtb.paddr.as_usize(), dtb.size));

	if core_id == 0 {
		info!("Enabling MMU and paging");
	}

	enable_virtual_memory();

	if core_id == 0 {
		info!("Jumping to kernel-image entry point...");
		println!();
	}

	let entry: extern "C" fn(usize, usize, usize, usize, usize, usize, usize, usize) =
		unsafe { core::mem::transmute(images.kernel.virt_entry.as_usize()) };
	entry(
		user.phys_region_start.as_usize(),
		user.phys_region_end.as_usize(),
		user.phys_virt_offset,
		user.virt_entry.as_usize(),
		dtb_ptr,
		dtb_size,
		hart_id,
		core_id,
	);

	error!("ERROR: ELF-loader didn't hand over control");
	abort();
}

fn run_elfloader(hart_id: usize, bootloader_dtb: *const u8) -> ! {
	let loader = env::loader_region();
	info!("  paddr=[{:#x}..{:#x}]", loader.start, loader.end - 1);

	let ram = Region::new(PLATFORM_RAM.0, PLATFORM_RAM.1);
	let dtb_ptr = core::ptr::NonNull::new(bootloader_dtb.cast_mut());
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

	// Identity map for the loader itself, then the kernel window. The MMU
	// stays off until every hart passed the ready barrier.
	let identity = Region::new(loader.start, loader.end);
	let kernel = &images.kernel;
	let mapped = paging::map_range(
		ACTIVE,
		&ROOT_PT,
		&BOOT_PAGE_POOL,
		identity.start,
		identity.start,
		identity.end - identity.start,
	)
	.and_then(|()| {
		paging::map_range(
			ACTIVE,
			&ROOT_PT,
			&BOOT_PAGE_POOL,
			kernel.virt_region_start.as_usize(),
			kernel.phys_region_start.as_usize(),
			kernel.virt_region_end.as_usize() - kernel.virt_region_start.as_usize(),
		)
	});
	if let Err(err) = mapped {
		error!("ERROR: could not map kernel window: {err}");
		abort();
	}

	LOADED.set(images).ok();

	smp_init(hart_id)
}

#[cfg(feature = "smp")]
fn smp_init(hart_id: usize) -> ! {
	unsafe extern "C" {
		/// Startup shim for harts we start through HSM; it sets up a stack
		/// and calls [`secondary_entry`] with the hart ID.
		fn secondary_harts();
	}

	let hsm_exists = sbi_rt::probe_extension(sbi_rt::Hsm).is_available();

	CORES.record_hart_id(0, hart_id);
	info!("Main entry hart_id:{hart_id}");

	// With HSM the secondaries are not running yet; without it they are
	// already spinning on the go flag.
	CORES.release_secondaries();

	if hsm_exists {
		for i in 0..MAX_NUM_NODES {
			let hart = i + FIRST_HART_ID;
			if hart == hart_id {
				continue;
			}
			let ret = sbi_rt::hart_start(hart, secondary_harts as usize, hart);
			if ret.is_err() {
				error!("ERROR: HART_START failed for hart {hart} (error {})", ret.error);
				abort();
			}
		}
	}

	info!("Hart ID {hart_id} core ID 0");
	CORES.mark_ready_and_wait(0);

	let core_id = CORES.logical_core_id(0, FIRST_HART_ID);
	handover_to_next_boot_stage(hart_id, core_id)
}

#[cfg(not(feature = "smp"))]
fn smp_init(hart_id: usize) -> ! {
	handover_to_next_boot_stage(hart_id, 0)
}

/// Boot-hart entry, called by the startup shim with the hart ID and the DTB
/// pointer the firmware handed over.
#[unsafe(no_mangle)]
pub extern "C" fn main(hart_id: usize, bootloader_dtb: *const u8) -> ! {
	env::clear_bss();
	unsafe {
		logging::init();
	}
	console::set_sbi();

	info!("ELF-loader started on (HART {hart_id}) (NODES {MAX_NUM_NODES})");

	run_elfloader(hart_id, bootloader_dtb)
}

/// Secondary-hart entry. The shim hands over the hart ID; the logical core
/// ID is assigned here, in arrival order.
#[cfg(feature = "smp")]
#[unsafe(no_mangle)]
pub extern "C" fn secondary_entry(hart_id: usize) -> ! {
	CORES.wait_for_go();

	let Ok(core_id) = CORES.alloc_core_id() else {
		error!("ERROR: {}", crate::LoaderError::TooManyCores);
		abort();
	};
	CORES.record_hart_id(core_id, hart_id);
	info!("Secondary entry hart_id:{hart_id} core_id:{core_id}");

	info!("Hart ID {hart_id} core ID {core_id}");
	CORES.mark_ready_and_wait(core_id);

	let core_id = CORES.logical_core_id(core_id, FIRST_HART_ID);
	handover_to_next_boot_stage(hart_id, core_id)
}
