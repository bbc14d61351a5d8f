use core::fmt;

use hermit_sync::SpinMutex;

use crate::drivers::uart::UartDevice;

/// The output sink selected during early platform bring-up.
pub enum ConsoleDevice {
	/// A memory-mapped UART found via the device tree.
	Uart(UartDevice),
	/// The SBI debug console; available before any MMIO is mapped.
	#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
	Sbi,
}

pub struct Console {
	device: Option<ConsoleDevice>,
}

impl Console {
	const fn new() -> Self {
		Self { device: None }
	}

	pub fn set_device(&mut self, device: ConsoleDevice) {
		self.device = Some(device);
	}

	/// Output is best effort: bytes written before a device is bound are
	/// dropped silently.
	fn write_byte(&mut self, byte: u8) {
		match &self.device {
			Some(ConsoleDevice::Uart(uart)) => uart.putc(byte),
			#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
			Some(ConsoleDevice::Sbi) => {
				sbi_rt::console_write_byte(byte);
			}
			None => {}
		}
	}
}

impl fmt::Write for Console {
	fn write_str(&mut self, s: &str) -> fmt::Result {
		for byte in s.bytes() {
			self.write_byte(byte);
		}
		Ok(())
	}
}

/// Also serves as the one diagnostic lock: whichever core holds it owns the
/// output stream for the duration of the write.
pub static CONSOLE: SpinMutex<Console> = SpinMutex::new(Console::new());

/// Makes `dev` the process-wide output sink. Called by the first matching
/// UART driver.
pub fn set_uart(dev: UartDevice) {
	CONSOLE.lock().set_device(ConsoleDevice::Uart(dev));
}

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
pub fn set_sbi() {
	CONSOLE.lock().set_device(ConsoleDevice::Sbi);
}

#[cfg(test)]
mod tests {
	use core::fmt::Write;

	use super::Console;

	#[test]
	fn unbound_console_drops_output() {
		let mut console = Console::new();
		// No device bound: writing must be a no-op instead of a fault.
		write!(console, "dropped {}", 42).unwrap();
	}
}
