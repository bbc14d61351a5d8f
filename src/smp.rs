//! Rendezvous of all cores before the jump into the kernel.
//!
//! The primary finishes loading and page-table construction alone, then
//! releases the secondaries through `secondary_go`. Every core marks its
//! slot in the ready array and spins until all slots are set, so nobody
//! enables the MMU while the primary is still writing page tables. All
//! cross-core signalling is plain release/acquire atomics; the arch code
//! adds whatever fences the hardware wants on top.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::config::MAX_NUM_NODES;
use crate::errors::LoaderError;

pub struct CoreSync<const N: usize> {
	secondary_go: AtomicBool,
	core_ready: [AtomicBool; N],
	core_started: [AtomicBool; N],
	next_logical_core_id: AtomicUsize,
	hart_ids: [AtomicUsize; N],
}

impl<const N: usize> CoreSync<N> {
	pub const fn new() -> Self {
		Self {
			secondary_go: AtomicBool::new(false),
			core_ready: [const { AtomicBool::new(false) }; N],
			core_started: [const { AtomicBool::new(false) }; N],
			next_logical_core_id: AtomicUsize::new(1),
			hart_ids: [const { AtomicUsize::new(0) }; N],
		}
	}

	/// Primary only. Everything written before this call is visible to the
	/// secondaries once they observe the flag.
	pub fn release_secondaries(&self) {
		self.secondary_go.store(true, Ordering::Release);
	}

	pub fn wait_for_go(&self) {
		while !self.secondary_go.load(Ordering::Acquire) {
			core::hint::spin_loop();
		}
	}

	/// Hands out logical core IDs in arrival order; the primary owns 0.
	pub fn alloc_core_id(&self) -> Result<usize, LoaderError> {
		let core_id = self.next_logical_core_id.fetch_add(1, Ordering::Relaxed);
		if core_id >= N {
			return Err(LoaderError::TooManyCores);
		}
		Ok(core_id)
	}

	/// Signals that a secondary reached its Rust entry. Used by spin-table
	/// platforms where the primary has to wait for one core to take its
	/// stack before starting the next.
	pub fn mark_started(&self, core_id: usize) {
		self.core_started[core_id].store(true, Ordering::Release);
	}

	pub fn wait_started(&self, core_id: usize) {
		while !self.core_started[core_id].load(Ordering::Acquire) {
			core::hint::spin_loop();
		}
	}

	pub fn record_hart_id(&self, core_id: usize, hart_id: usize) {
		self.hart_ids[core_id].store(hart_id, Ordering::Relaxed);
	}

	/// Marks the own slot and blocks until every core has done the same.
	pub fn mark_ready_and_wait(&self, core_id: usize) {
		self.core_ready[core_id].store(true, Ordering::Release);

		for i in 0..N {
			while !self.core_ready[i].load(Ordering::Acquire) {
				core::hint::spin_loop();
			}
		}
	}

	pub fn all_ready(&self) -> bool {
		(0..N).all(|i| self.core_ready[i].load(Ordering::Acquire))
	}

	/// Logical core ID to hand to the kernel.
	///
	/// Arrival order is arbitrary, but the kernel expects core 0 to be the
	/// hart with `first_hart_id`. If another hart grabbed slot 0, the two
	/// slots are swapped. Every core computes the same answer from the
	/// `hart_ids` array, which is complete once the ready barrier fell.
	pub fn logical_core_id(&self, core_id: usize, first_hart_id: usize) -> usize {
		let hart_of = |i: usize| self.hart_ids[i].load(Ordering::Relaxed);

		if hart_of(0) == first_hart_id {
			return core_id;
		}
		let Some(designated) = (0..N).position(|i| hart_of(i) == first_hart_id) else {
			// The designated hart never came up; leave the order alone.
			return core_id;
		};

		if core_id == designated {
			0
		} else if core_id == 0 {
			designated
		} else {
			core_id
		}
	}
}

impl<const N: usize> Default for CoreSync<N> {
	fn default() -> Self {
		Self::new()
	}
}

/// The one instance used during boot.
pub static CORES: CoreSync<MAX_NUM_NODES> = CoreSync::new();

#[cfg(test)]
mod tests {
	use std::sync::Arc;
	use std::thread;

	use super::CoreSync;
	use crate::errors::LoaderError;

	#[test]
	fn barrier_holds_until_everyone_is_ready() {
		let sync = Arc::new(CoreSync::<2>::new());

		assert!(!sync.all_ready());

		let secondary = {
			let sync = Arc::clone(&sync);
			thread::spawn(move || {
				sync.wait_for_go();
				let core_id = sync.alloc_core_id().unwrap();
				sync.record_hart_id(core_id, 7);
				sync.mark_ready_and_wait(core_id);
			})
		};

		// Primary side.
		sync.record_hart_id(0, 0);
		sync.release_secondaries();
		sync.mark_ready_and_wait(0);

		secondary.join().unwrap();
		assert!(sync.all_ready());
	}

	#[test]
	fn core_ids_are_handed_out_in_arrival_order() {
		let sync = CoreSync::<3>::new();
		assert_eq!(sync.alloc_core_id().unwrap(), 1);
		assert_eq!(sync.alloc_core_id().unwrap(), 2);
		assert_eq!(sync.alloc_core_id().unwrap_err(), LoaderError::TooManyCores);
	}

	#[test]
	fn started_handshake() {
		let sync = Arc::new(CoreSync::<2>::new());
		let waiter = {
			let sync = Arc::clone(&sync);
			thread::spawn(move || sync.wait_started(1))
		};
		sync.mark_started(1);
		waiter.join().unwrap();
	}

	#[test]
	fn remap_swaps_the_designated_hart_to_core_zero() {
		let sync = CoreSync::<2>::new();
		// Hart 1 became core 0, hart 0 became core 1; FIRST_HART_ID is 0.
		sync.record_hart_id(0, 1);
		sync.record_hart_id(1, 0);

		assert_eq!(sync.logical_core_id(0, 0), 1);
		assert_eq!(sync.logical_core_id(1, 0), 0);
	}

	#[test]
	fn remap_is_the_identity_when_order_is_right() {
		let sync = CoreSync::<2>::new();
		sync.record_hart_id(0, 0);
		sync.record_hart_id(1, 1);

		assert_eq!(sync.logical_core_id(0, 0), 0);
		assert_eq!(sync.logical_core_id(1, 0), 1);
	}
}
