//! Eviction policies

// Imports
use {
	crate::config::EvictionPolicy,
	rand::{rngs::StdRng, Rng, SeedableRng},
	std::collections::VecDeque,
};

/// Seed of the pseudo-random policy
const PRND_SEED: u64 = 921;

/// Resident segments, tracked in load order.
#[derive(Clone, Debug)]
pub struct Residency {
	/// Policy
	policy: EvictionPolicy,

	/// Resident segments, from oldest to newest
	order: VecDeque<usize>,

	/// Reference bits, by segment
	referenced: Vec<bool>,

	/// Random number generator for [`EvictionPolicy::Prnd`]
	rng: StdRng,
}

impl Residency {
	/// Creates an empty residency for `segments` segments
	pub fn new(policy: EvictionPolicy, segments: usize) -> Self {
		Self {
			policy,
			order: VecDeque::new(),
			referenced: vec![false; segments],
			rng: StdRng::seed_from_u64(PRND_SEED),
		}
	}

	/// Returns the number of resident segments
	pub fn count(&self) -> usize {
		self.order.len()
	}

	/// Registers a newly loaded segment
	pub fn insert(&mut self, segment: usize) {
		self.order.push_back(segment);
		self.referenced[segment] = true;
	}

	/// Registers an access to a resident segment
	pub fn touch(&mut self, segment: usize) {
		self.referenced[segment] = true;
	}

	/// Removes a segment
	pub fn remove(&mut self, segment: usize) {
		if let Some(pos) = self.order.iter().position(|&idx| idx == segment) {
			self.order.remove(pos);
		}
		self.referenced[segment] = false;
	}

	/// Selects the segment to evict next.
	///
	/// Returns `None` if no segments are resident.
	pub fn select_victim(&mut self, is_dirty: impl Fn(usize) -> bool) -> Option<usize> {
		match self.policy {
			EvictionPolicy::Fifo => self.order.front().copied(),
			EvictionPolicy::Lifo => self.order.back().copied(),
			EvictionPolicy::Plru => self.second_chance(),
			EvictionPolicy::Prnd => match self.order.is_empty() {
				true => None,
				false => {
					let pos = self.rng.gen_range(0..self.order.len());
					Some(self.order[pos])
				},
			},
			EvictionPolicy::WiroFifo => self
				.order
				.iter()
				.copied()
				.find(|&idx| !is_dirty(idx))
				.or_else(|| self.order.front().copied()),
			EvictionPolicy::WiroLifo => self
				.order
				.iter()
				.rev()
				.copied()
				.find(|&idx| !is_dirty(idx))
				.or_else(|| self.order.back().copied()),
		}
	}

	/// Clock sweep over the load order, clearing reference bits until an
	/// unreferenced segment is found.
	fn second_chance(&mut self) -> Option<usize> {
		// Note: After one full sweep every reference bit is clear, so this
		//       always finishes within two sweeps.
		for _ in 0..=2 * self.order.len() {
			let idx = *self.order.front()?;
			match self.referenced[idx] {
				true => {
					self.referenced[idx] = false;
					self.order.rotate_left(1);
				},
				false => return Some(idx),
			}
		}

		self.order.front().copied()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn residency(policy: EvictionPolicy) -> Residency {
		let mut residency = Residency::new(policy, 8);
		for idx in [3, 1, 4, 5] {
			residency.insert(idx);
		}
		residency
	}

	#[test]
	fn fifo_and_lifo() {
		assert_eq!(self::residency(EvictionPolicy::Fifo).select_victim(|_| false), Some(3));
		assert_eq!(self::residency(EvictionPolicy::Lifo).select_victim(|_| false), Some(5));
	}

	#[test]
	fn empty_has_no_victim() {
		for &policy in EvictionPolicy::ALL {
			assert_eq!(Residency::new(policy, 4).select_victim(|_| false), None);
		}
	}

	#[test]
	fn plru_skips_recently_referenced() {
		let mut residency = self::residency(EvictionPolicy::Plru);

		// Every segment starts referenced, so the sweep clears them and comes back to the oldest
		assert_eq!(residency.select_victim(|_| false), Some(3));

		// Referencing it again gives it a second chance
		residency.touch(3);
		assert_eq!(residency.select_victim(|_| false), Some(1));
	}

	#[test]
	fn prnd_is_resident_and_reproducible() {
		let mut first = self::residency(EvictionPolicy::Prnd);
		let mut second = self::residency(EvictionPolicy::Prnd);
		for _ in 0..16 {
			let victim = first.select_victim(|_| false).expect("Has victims");
			assert!([3, 1, 4, 5].contains(&victim));
			assert_eq!(second.select_victim(|_| false), Some(victim));
		}
	}

	#[test]
	fn wiro_prefers_clean_segments() {
		let dirty = |idx: usize| idx == 3 || idx == 5;
		assert_eq!(self::residency(EvictionPolicy::WiroFifo).select_victim(dirty), Some(1));
		assert_eq!(self::residency(EvictionPolicy::WiroLifo).select_victim(dirty), Some(4));

		// With only dirty segments, falls back to the plain order
		assert_eq!(self::residency(EvictionPolicy::WiroFifo).select_victim(|_| true), Some(3));
		assert_eq!(self::residency(EvictionPolicy::WiroLifo).select_victim(|_| true), Some(5));
	}

	#[test]
	fn remove_forgets_segment() {
		let mut residency = self::residency(EvictionPolicy::Fifo);
		residency.remove(3);
		assert_eq!(residency.count(), 3);
		assert_eq!(residency.order, [1, 4, 5]);
		assert_eq!(residency.select_victim(|_| false), Some(1));
	}
}
