//! ARM PL011, the console on most ARM boards and on QEMU's virt machine.

use core::ptr;

use super::{UartDevice, UartDriver};

const UARTDR: usize = 0x00;
const UARTFR: usize = 0x18;

/// Transmit FIFO full.
const UARTFR_TXFF: u8 = 1 << 5;

unsafe fn putc(base: *mut u8, byte: u8) {
	unsafe {
		if byte == b'\n' {
			putc(base, b'\r');
		}
		while ptr::read_volatile(base.add(UARTFR)) & UARTFR_TXFF != 0 {}
		ptr::write_volatile(base.add(UARTDR), byte);
	}
}

fn init(base: *mut u8) -> UartDevice {
	UartDevice::new(base, putc)
}

pub static DRIVER: UartDriver = UartDriver {
	compatible: &["arm,pl011", "arm,primecell"],
	init,
};
