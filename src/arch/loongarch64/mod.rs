pub mod paging;

#[cfg(all(target_arch = "loongarch64", target_os = "none"))]
mod boot;

#[cfg(all(target_arch = "loongarch64", target_os = "none"))]
pub use boot::halt;
