//! UEFI boot-services exit for AArch64 hosts.
//!
//! Firmware keeps a watchdog running while boot services are live, so the
//! loader says goodbye before touching hardware on its own: grab the final
//! memory map, call `ExitBootServices` with its key, and mask asynchronous
//! exceptions. The resulting status is stashed rather than acted upon; a
//! failed exit still boots, it is simply reported.

use core::arch::asm;
use core::ffi::c_void;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicPtr, Ordering};

use hermit_sync::OnceCell;
use uefi_raw::table::boot::{BootServices, MemoryDescriptor, MemoryType};
use uefi_raw::table::system::SystemTable;
use uefi_raw::{Guid, Handle, Status};

/// GUID of the device-tree configuration table.
const DTB_TABLE_GUID: Guid = Guid::from_bytes([
	0xd5, 0x21, 0xb6, 0xb1, 0x9c, 0xf1, 0xa5, 0x41, 0x83, 0x0b, 0xd9, 0x15, 0x2c, 0x69, 0xaa,
	0xe0,
]);

static APPLICATION_HANDLE: AtomicPtr<c_void> = AtomicPtr::new(core::ptr::null_mut());
static SYSTEM_TABLE: AtomicPtr<SystemTable> = AtomicPtr::new(core::ptr::null_mut());
static EXIT_BS_RESULT: OnceCell<Status> = OnceCell::new();

/// Entry shim for UEFI hosts, called before [`crate::arch::aarch64`]'s
/// `main`: records the firmware pointers and leaves boot services.
#[unsafe(no_mangle)]
pub extern "C" fn efi_init(application_handle: Handle, system_table: *mut SystemTable) {
	crate::env::clear_bss();
	APPLICATION_HANDLE.store(application_handle.cast(), Ordering::Relaxed);
	SYSTEM_TABLE.store(system_table, Ordering::Relaxed);

	EXIT_BS_RESULT.set(exit_boot_services()).ok();
}

/// Status of the boot-services exit, once it happened.
pub fn exit_boot_services_result() -> Option<Status> {
	EXIT_BS_RESULT.get().copied()
}

/// The DTB the firmware published in its configuration table, if any.
pub fn firmware_dtb() -> Option<NonNull<u8>> {
	let table = SYSTEM_TABLE.load(Ordering::Relaxed);
	if table.is_null() {
		return None;
	}

	unsafe {
		let count = (*table).number_of_configuration_table_entries;
		let entries = (*table).configuration_table;
		for i in 0..count {
			let entry = &*entries.add(i);
			if entry.vendor_guid == DTB_TABLE_GUID {
				return NonNull::new(entry.vendor_table.cast());
			}
		}
	}
	None
}

/// Fetches the memory map and exits boot services.
///
/// `GetMemoryMap` reports the needed buffer size, but allocating that
/// buffer can itself fragment the map. The spec bounds the growth to one
/// descriptor per allocation, so the retry loop adds exactly one
/// descriptor's worth of space each round instead of doubling.
fn exit_boot_services() -> Status {
	let table = SYSTEM_TABLE.load(Ordering::Relaxed);
	if table.is_null() {
		return Status::ABORTED;
	}
	let bs: *mut BootServices = unsafe { (*table).boot_services };

	let mut map_size = size_of::<MemoryDescriptor>() * 32;
	let mut buffer: *mut u8 = core::ptr::null_mut();
	let mut map_key = 0usize;
	let mut desc_size = 0usize;
	let mut desc_version = 0u32;

	loop {
		let status =
			unsafe { ((*bs).allocate_pool)(MemoryType::LOADER_DATA, map_size, &mut buffer) };
		if status != Status::SUCCESS {
			return status;
		}

		let status = unsafe {
			((*bs).get_memory_map)(
				&mut map_size,
				buffer.cast::<MemoryDescriptor>(),
				&mut map_key,
				&mut desc_size,
				&mut desc_version,
			)
		};
		if status == Status::SUCCESS {
			break;
		}

		let _ = unsafe { ((*bs).free_pool)(buffer) };
		if status != Status::BUFFER_TOO_SMALL {
			return status;
		}
		// `map_size` now holds the required size; one more descriptor
		// absorbs the fragmentation the next allocation may cause.
		map_size += desc_size;
	}

	let handle: Handle = APPLICATION_HANDLE.load(Ordering::Relaxed).cast();
	let status = unsafe { ((*bs).exit_boot_services)(handle, map_key) };

	if status == Status::SUCCESS {
		// Nobody owns the exception vectors anymore; mask everything until
		// the kernel installs its own.
		unsafe {
			asm!("msr daifset, #0xf", options(nomem, nostack));
		}
	}

	status
}
