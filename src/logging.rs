use log::{Level, LevelFilter, Metadata, Record};

/// Routes the `log` macros onto the loader console.
///
/// There is exactly one output stream and no timekeeping this early, so a
/// record is a level tag and the message, nothing else.
struct BootLogger;

static LOGGER: BootLogger = BootLogger;

impl log::Log for BootLogger {
	fn enabled(&self, metadata: &Metadata<'_>) -> bool {
		metadata.level() <= Level::Info
	}

	fn log(&self, record: &Record<'_>) {
		if self.enabled(record.metadata()) {
			println!("[{}] {}", record.level(), record.args());
		}
	}

	fn flush(&self) {}
}

/// Installs the logger. Called once by the boot core before any output.
///
/// # Safety
///
/// Must not race with other cores; the secondaries are not released before
/// the primary has finished `init()`.
pub unsafe fn init() {
	unsafe {
		log::set_logger_racy(&LOGGER).unwrap();
		log::set_max_level_racy(LevelFilter::Info);
	}
}

#[cfg(test)]
mod tests {
	use log::Level;

	#[test]
	fn debug_records_are_filtered() {
		use log::Log;

		let logger = super::BootLogger;
		let debug = log::Metadata::builder().level(Level::Debug).build();
		let info = log::Metadata::builder().level(Level::Info).build();
		assert!(!logger.enabled(&debug));
		assert!(logger.enabled(&info));
	}
}
