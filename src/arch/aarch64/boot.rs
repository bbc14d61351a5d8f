//! AArch64 boot flow: load, build tables, start the other cores, enable the
//! MMU and drop into the kernel.
//!
//! The reset shim has set up a stack and cleared nothing else; it calls
//! [`main`] on the boot core and [`secondary_entry`] on everyone it starts
//! later, after loading the stack pointer published through
//! [`SECONDARY_CORE_STACK`].

use core::arch::asm;
use core::ptr::NonNull;

use aarch64_cpu::asm::barrier;
use aarch64_cpu::registers::{
	CurrentEL, MAIR_EL1, MAIR_EL2, SCTLR_EL1, SCTLR_EL2, TCR_EL1, TCR_EL2, TPIDR_EL1, TTBR0_EL1,
	TTBR0_EL2, TTBR1_EL1,
};
use hermit_sync::OnceCell;
use tock_registers::interfaces::{Readable, Writeable};

use super::paging::{self, BOOT_PAGE_POOL, BOOT_PGD_DOWN, BOOT_PGD_UP};
use super::psci;
use crate::config::{MAX_NUM_NODES, PLATFORM_RAM};
use crate::load::{self, LoadedImages, Region};
#[cfg(feature = "smp")]
use crate::smp::CORES;
use crate::{abort, drivers, env, logging};

/// Conduit for PSCI on this platform. Platforms that run the loader under a
/// hypervisor trap into it with HVC instead.
#[allow(dead_code)]
const PSCI_METHOD: psci::Method = psci::Method::Smc;

/// Filled by the primary before the secondaries are released.
static LOADED: OnceCell<LoadedImages> = OnceCell::new();

static EL2: OnceCell<bool> = OnceCell::new();

pub fn halt() {
	unsafe {
		asm!("wfi", options(nomem, nostack));
	}
}

/// Cleans and invalidates every cache line the loader may have dirtied.
/// Secondaries can come up with caches off, so nothing of the page tables
/// or the loaded images may linger in a dirty line. Cache lines are
/// conservatively assumed to be no smaller than 64 byte.
fn clean_inval_dcache(region: Region) {
	barrier::dsb(barrier::SY);
	let mut line = region.start;
	while line < region.end {
		unsafe {
			asm!("dc civac, {}", in(reg) line);
		}
		line += 64;
	}
	barrier::dsb(barrier::SY);
}

const MAIR_VALUE: u64 = {
	// Index 0 (0x00): device-nGnRnE, index 4: normal write-back cacheable.
	// The indices in between follow the usual kernel layout but stay unused.
	(0x04 << 8) | (0x0c << 16) | (0x44 << 24) | (0xff << 32)
};

const TCR_EL1_VALUE: u64 = {
	let t0sz = 16;
	let t1sz = 16 << 16;
	let irgn = (1 << 8) | (1 << 24); // write-back write-allocate
	let orgn = (1 << 10) | (1 << 26);
	let sh = (3 << 12) | (3 << 28); // inner shareable
	let tg1_4k = 2 << 30;
	let ips_48bit = 5 << 32;
	t0sz | t1sz | irgn | orgn | sh | tg1_4k | ips_48bit
};

const TCR_EL2_VALUE: u64 = {
	let res1 = (1 << 31) | (1 << 23);
	let t0sz = 16;
	let irgn0 = 1 << 8;
	let orgn0 = 1 << 10;
	let sh0 = 3 << 12;
	let ps_48bit = 5 << 16;
	res1 | t0sz | irgn0 | orgn0 | sh0 | ps_48bit
};

const SCTLR_M: u64 = 1 << 0;
const SCTLR_C: u64 = 1 << 2;
const SCTLR_I: u64 = 1 << 12;

fn enable_mmu(el2: bool) {
	let down = BOOT_PGD_DOWN.base() as u64;
	let up = BOOT_PGD_UP.base() as u64;

	barrier::dsb(barrier::SY);
	if el2 {
		MAIR_EL2.set(MAIR_VALUE);
		TCR_EL2.set(TCR_EL2_VALUE);
		TTBR0_EL2.set_baddr(down);
		barrier::isb(barrier::SY);
		SCTLR_EL2.set(SCTLR_EL2.get() | SCTLR_M | SCTLR_C | SCTLR_I);
	} else {
		MAIR_EL1.set(MAIR_VALUE);
		TCR_EL1.set(TCR_EL1_VALUE);
		TTBR0_EL1.set_baddr(down);
		TTBR1_EL1.set_baddr(up);
		barrier::isb(barrier::SY);
		SCTLR_EL1.set(SCTLR_EL1.get() | SCTLR_M | SCTLR_C | SCTLR_I);
	}
	barrier::isb(barrier::SY);
}

/// The kernel entry ABI: six register arguments, never returns. The logical
/// core ID travels in `TPIDR_EL1` instead of a register.
fn enter_kernel(core_id: usize) -> ! {
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

	TPIDR_EL1.set(core_id as u64);
	enable_mmu(*EL2.get().unwrap_or(&false));

	if core_id == 0 {
		info!("Jumping to kernel-image entry point...");
		println!();
	}

	let entry: extern "C" fn(usize, usize, usize, usize, usize, usize) =
		unsafe { core::mem::transmute(images.kernel.virt_entry.as_usize()) };
	entry(
		user.phys_region_start.as_usize(),
		user.phys_region_end.as_usize(),
		user.phys_virt_offset,
		user.virt_entry.as_usize(),
		dtb_ptr,
		dtb_size,
	);

	error!("ERROR: Kernel returned back to the ELF Loader");
	abort();
}

#[cfg(feature = "smp")]
mod smp {
	use core::cell::UnsafeCell;
	use core::sync::atomic::{AtomicUsize, Ordering};

	use super::abort;
	use crate::config::{CORE_STACK_SIZE, MAX_NUM_NODES};
	use crate::smp::CORES;

	unsafe extern "C" {
		/// Assembly trampoline that loads `SECONDARY_CORE_STACK` and calls
		/// [`super::secondary_entry`].
		fn _secondary_start();
	}

	#[repr(C, align(16))]
	struct CoreStack(UnsafeCell<[u8; CORE_STACK_SIZE]>);

	// Each stack is used by exactly one core.
	unsafe impl Sync for CoreStack {}

	static CORE_STACKS: [CoreStack; MAX_NUM_NODES] =
		[const { CoreStack(UnsafeCell::new([0; CORE_STACK_SIZE])) }; MAX_NUM_NODES];

	/// Read by the startup shim: the stack top for the core that is being
	/// started right now. Bring-up is serialized, so one slot is enough.
	#[unsafe(no_mangle)]
	static SECONDARY_CORE_STACK: AtomicUsize = AtomicUsize::new(0);

	#[cfg(feature = "plat-bcm2711")]
	fn start_core(core: usize) {
		use aarch64_cpu::asm::barrier;

		// Firmware spin table of the bcm2711: write the entry address into
		// the core's slot, then kick the event the cores wait on.
		const SPIN_TABLE: [usize; 4] = [0xd8, 0xe0, 0xe8, 0xf0];

		unsafe {
			core::ptr::write_volatile(
				SPIN_TABLE[core] as *mut u64,
				_secondary_start as usize as u64,
			);
		}
		barrier::dsb(barrier::SY);
		unsafe {
			core::arch::asm!("sev", options(nomem, nostack));
		}
	}

	#[cfg(not(feature = "plat-bcm2711"))]
	fn start_core(core: usize) {
		use super::PSCI_METHOD;
		use crate::arch::aarch64::psci;

		let ret = psci::cpu_on(
			PSCI_METHOD,
			core as u64,
			_secondary_start as usize as u64,
			core as u64,
		);
		if ret != psci::SUCCESS {
			error!("PSCI CPU_ON for core {core} failed ({ret})");
			abort();
		}
	}

	/// Starts all secondaries, one at a time, each taking its published
	/// stack before the next one is kicked.
	pub fn boot_secondary_cores() {
		const {
			assert!(
				!cfg!(feature = "plat-bcm2711") || MAX_NUM_NODES <= 4,
				"the bcm2711 spin table has four slots"
			);
		}

		for core in 1..MAX_NUM_NODES {
			let stack_top = CORE_STACKS[core].0.get() as usize + CORE_STACK_SIZE;
			SECONDARY_CORE_STACK.store(stack_top, Ordering::Release);

			start_core(core);
			CORES.wait_started(core);
			info!("Core {core} is up");
		}
	}
}

fn boot_dtb(bootloader_dtb: *const u8) -> Option<NonNull<u8>> {
	#[cfg(feature = "uefi")]
	{
		let _ = bootloader_dtb;
		crate::efi::firmware_dtb()
	}
	#[cfg(not(feature = "uefi"))]
	{
		NonNull::new(bootloader_dtb.cast_mut())
	}
}

/// Boot-core entry, called by the reset shim with whatever x0 carried at
/// reset (the DTB pointer on most firmware).
#[unsafe(no_mangle)]
pub extern "C" fn main(bootloader_dtb: *const u8) -> ! {
	env::clear_bss();
	unsafe {
		logging::init();
	}

	let dtb_ptr = boot_dtb(bootloader_dtb);
	if let Some(dtb) = dtb_ptr {
		if let Ok(fdt) = unsafe { fdt::Fdt::from_ptr(dtb.as_ptr()) } {
			drivers::init_drivers(&fdt);
		}
	}

	info!("ELF-loader started (NODES {MAX_NUM_NODES})");
	let loader = env::loader_region();
	info!("  paddr=[{:#x}..{:#x}]", loader.start, loader.end - 1);

	let el2 = CurrentEL.read(CurrentEL::EL) == 2;
	EL2.set(el2).ok();
	if el2 {
		info!("Running in EL2, using a single translation regime");
	}

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

	// The tables may be built with caches off; make sure nothing stale
	// shadows them once the MMU turns translation and caching on.
	clean_inval_dcache(loader);
	let dtb_region = images
		.dtb
		.map(|dtb| Region::new(dtb.paddr.as_usize(), dtb.paddr.as_usize() + dtb.size));
	if let Err(err) = paging::build_boot_vspace(
		&BOOT_PGD_DOWN,
		&BOOT_PGD_UP,
		&BOOT_PAGE_POOL,
		&images.kernel,
		loader,
		dtb_region,
		drivers::uart::mmio_base(),
		el2,
	) {
		error!("ERROR: building the boot address space failed: {err}");
		abort();
	}
	barrier::dsb(barrier::SY);
	clean_inval_dcache(loader);

	LOADED.set(images).ok();

	#[cfg(feature = "smp")]
	{
		info!("Main entry");
		smp::boot_secondary_cores();
		CORES.release_secondaries();
		info!("Hart ID 0 core ID 0");
		CORES.mark_ready_and_wait(0);
	}

	enter_kernel(0)
}

/// Secondary-core entry, called by the startup shim once the core runs on
/// its own stack.
#[cfg(feature = "smp")]
#[unsafe(no_mangle)]
pub extern "C" fn secondary_entry() -> ! {
	let Ok(core_id) = CORES.alloc_core_id() else {
		error!("ERROR: {}", crate::LoaderError::TooManyCores);
		abort();
	};
	CORES.mark_started(core_id);
	CORES.wait_for_go();

	info!("Secondary entry");
	info!("Hart ID {core_id} core ID {core_id}");
	CORES.record_hart_id(core_id, core_id);
	CORES.mark_ready_and_wait(core_id);

	enter_kernel(core_id)
}
