//! Build-time configuration of the loader.

/// Number of cores the loader brings up and synchronizes. The archive is
/// expected to carry one user image per core.
pub const MAX_NUM_NODES: usize = if cfg!(feature = "smp") { 4 } else { 1 };

/// Hart that must end up as logical core 0 when entering the kernel.
#[cfg(any(target_arch = "riscv32", target_arch = "riscv64", test))]
pub const FIRST_HART_ID: usize = 0;

/// Upper bound on user images taken from the archive.
pub const MAX_USER_IMAGES: usize = MAX_NUM_NODES;

/// Base translation granule. LoongArch uses 16 KiB pages, everything else
/// 4 KiB.
#[cfg(target_arch = "loongarch64")]
pub const PAGE_BITS: usize = 14;
#[cfg(not(target_arch = "loongarch64"))]
pub const PAGE_BITS: usize = 12;

pub const PAGE_SIZE: usize = 1 << PAGE_BITS;

/// Stack size handed to each secondary core.
#[cfg(all(target_arch = "aarch64", feature = "smp"))]
pub const CORE_STACK_SIZE: usize = 16 * 1024;

/// RAM window of the platform, used to place user images from the top when
/// the `rootservers-last` policy is selected.
#[cfg(target_arch = "aarch64")]
pub const PLATFORM_RAM: (usize, usize) = (0x4000_0000, 0x1_4000_0000);
#[cfg(not(target_arch = "aarch64"))]
pub const PLATFORM_RAM: (usize, usize) = (0x8000_0000, 0x1_8000_0000);
