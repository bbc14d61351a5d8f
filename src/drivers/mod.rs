//! Early device support. The only devices the loader ever touches are the
//! console UARTs; everything else belongs to the kernel.

pub mod uart;

use fdt::Fdt;

use crate::console;

/// Walks the driver table and binds the first UART whose `compatible` list
/// matches a device-tree node. The device's first MMIO region becomes the
/// console sink for the rest of the boot.
pub fn init_drivers(fdt: &Fdt<'_>) {
	for driver in uart::DRIVERS {
		let Some(node) = fdt.find_compatible(driver.compatible) else {
			continue;
		};
		let Some(region) = node.reg().and_then(|mut reg| reg.next()) else {
			continue;
		};

		let base = region.starting_address.cast_mut();
		uart::record_mmio_base(base as usize);
		let device = (driver.init)(base);
		console::set_uart(device);
		return;
	}
}
