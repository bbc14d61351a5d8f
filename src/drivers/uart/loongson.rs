//! UART of the Loongson 3A5000 bridge chip. Register layout is 16550-like,
//! but the ready bit to poll is "transmitter empty", not THRE.

use core::ptr;

use super::{UartDevice, UartDriver};

const DAT: usize = 0x00;
const LSR: usize = 0x05;

/// Transmitter empty.
const LSR_TE: u8 = 1 << 6;

unsafe fn putc(base: *mut u8, byte: u8) {
	unsafe {
		if byte == b'\n' {
			putc(base, b'\r');
		}
		while ptr::read_volatile(base.add(LSR)) & LSR_TE == 0 {}
		ptr::write_volatile(base.add(DAT), byte);
	}
}

fn init(base: *mut u8) -> UartDevice {
	UartDevice::new(base, putc)
}

pub static DRIVER: UartDriver = UartDriver {
	compatible: &["3A5000,loongson3A5000-uart", "loongson,ls7a-uart"],
	init,
};
