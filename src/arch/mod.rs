// Platform-specific implementations.
//
// Exactly one architecture is live per build; the page-table builders are
// additionally compiled for unit tests on the build host, since they are
// plain memory transformations until the MMU registers get written.

#[cfg(any(target_arch = "aarch64", test))]
pub mod aarch64;

#[cfg(any(target_arch = "loongarch64", test))]
pub mod loongarch64;

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64", test))]
pub mod riscv;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub use self::aarch64::halt;
#[cfg(all(target_arch = "loongarch64", target_os = "none"))]
pub use self::loongarch64::halt;
#[cfg(all(
	any(target_arch = "riscv32", target_arch = "riscv64"),
	target_os = "none"
))]
pub use self::riscv::halt;
