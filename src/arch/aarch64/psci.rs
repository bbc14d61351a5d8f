//! Power State Coordination Interface calls.
//!
//! Which conduit to use (secure monitor or hypervisor call) depends on what
//! the platform firmware implements, so every function takes the method as
//! an argument.

use core::arch::asm;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
	Smc,
	Hvc,
}

pub const SUCCESS: i32 = 0;

const FID_VERSION: u32 = 0x8400_0000;
const FID_CPU_OFF: u32 = 0x8400_0002;
const FID_CPU_ON: u32 = 0xc400_0003;
const FID_SYSTEM_RESET: u32 = 0x8400_0009;

fn psci_func(method: Method, function: u32, arg0: u64, arg1: u64, arg2: u64) -> i32 {
	let result: u64;
	unsafe {
		match method {
			Method::Smc => asm!(
				"smc #0",
				inlateout("x0") u64::from(function) => result,
				inlateout("x1") arg0 => _,
				inlateout("x2") arg1 => _,
				inlateout("x3") arg2 => _,
				options(nostack),
			),
			Method::Hvc => asm!(
				"hvc #0",
				inlateout("x0") u64::from(function) => result,
				inlateout("x1") arg0 => _,
				inlateout("x2") arg1 => _,
				inlateout("x3") arg2 => _,
				options(nostack),
			),
		}
	}
	result as i32
}

pub fn version(method: Method) -> i32 {
	psci_func(method, FID_VERSION, 0, 0, 0)
}

pub fn cpu_on(method: Method, target_cpu: u64, entry_point: u64, context_id: u64) -> i32 {
	psci_func(method, FID_CPU_ON, target_cpu, entry_point, context_id)
}

/// Does not return on success.
pub fn cpu_off(method: Method) -> i32 {
	psci_func(method, FID_CPU_OFF, 0, 0, 0)
}

pub fn system_reset(method: Method) -> i32 {
	psci_func(method, FID_SYSTEM_RESET, 0, 0, 0)
}
