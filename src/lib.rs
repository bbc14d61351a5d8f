//! Second-stage ELF loader.
//!
//! The loader is linked together with a small amount of platform assembly
//! (reset vector, stack setup, secondary-core trampolines) into a standalone
//! boot image. An embedded CPIO archive carries a kernel ELF, optionally a
//! device tree blob and one user ELF per core. The loader places all of them
//! into physical memory, builds the initial translation tables, brings up
//! the remaining cores and finally jumps into the kernel with the register
//! ABI the kernel expects.
//!
//! Everything runs on physical addresses until the very last step; there is
//! no allocator and no interrupt handling in here.

#![no_std]
#![allow(clippy::missing_safety_doc)]

#[cfg(test)]
extern crate std;

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;

#[macro_use]
mod macros;

pub mod arch;
pub mod archive;
pub mod config;
pub mod console;
pub mod drivers;
#[cfg(all(target_arch = "aarch64", target_os = "none", feature = "uefi"))]
pub mod efi;
#[cfg(target_os = "none")]
mod env;
pub mod errors;
pub mod image;
pub mod load;
pub mod logging;
#[cfg(target_os = "none")]
mod runtime_glue;
pub mod smp;
pub mod verify;

pub use errors::LoaderError;

use core::fmt;

#[doc(hidden)]
pub fn _print(args: fmt::Arguments<'_>) {
	use core::fmt::Write;

	console::CONSOLE.lock().write_fmt(args).unwrap();
}

/// Terminal error path: print a banner and park the core forever.
///
/// Nothing is ever unwound or cleaned up; on a boot error the only sane
/// reaction is to stop where the diagnostics still make sense.
#[cfg(target_os = "none")]
pub fn abort() -> ! {
	println!("HALT due to call to abort()");

	loop {
		arch::halt();
	}
}
