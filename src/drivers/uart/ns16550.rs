//! 16550-compatible UART with byte-wide registers, driven through the
//! memory-mapped flavor of the `uart_16550` crate.

use uart_16550::MmioSerialPort;

use super::{UartDevice, UartDriver};

unsafe fn putc(base: *mut u8, byte: u8) {
	let mut port = unsafe { MmioSerialPort::new(base as usize) };
	if byte == b'\n' {
		port.send(b'\r');
	}
	port.send(byte);
}

fn init(base: *mut u8) -> UartDevice {
	let mut port = unsafe { MmioSerialPort::new(base as usize) };
	port.init();
	UartDevice::new(base, putc)
}

pub static DRIVER: UartDriver = UartDriver {
	compatible: &["ns16550a", "ns16550"],
	init,
};
