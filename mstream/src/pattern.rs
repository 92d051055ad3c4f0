//! Access patterns
//!
//! Every pass performs `alloc_size / chunk_size` steps, alternating between
//! writes and reads, starting with a write. Offsets are always multiples of the
//! chunk size (relative to the region being walked) within the chunk-aligned
//! span of that region, so no access ever crosses the end of the allocation.

// Imports
use crate::config::Mode;

/// Validates that `mode` can walk an allocation of `alloc_size` in chunks of `chunk_size`
pub fn validate(mode: Mode, alloc_size: usize, chunk_size: usize) -> Result<(), anyhow::Error> {
	anyhow::ensure!(chunk_size > 0, "Chunk size must be non-zero");
	anyhow::ensure!(
		chunk_size <= alloc_size,
		"Chunk size ({chunk_size}) must not exceed the allocation size ({alloc_size})"
	);
	if mode == Mode::Mixed {
		anyhow::ensure!(
			chunk_size <= alloc_size / 2,
			"Chunk size ({chunk_size}) must not exceed half the allocation size ({alloc_size}) in mixed mode"
		);
	}

	Ok(())
}

/// Access pattern of a rank
#[derive(Clone, Debug)]
pub struct Pattern {
	/// Mode
	mode: Mode,

	/// Allocation size
	alloc_size: usize,

	/// Chunk size
	chunk_size: usize,

	/// Seed of the pseudo-random walks
	seed: u32,
}

impl Pattern {
	/// Creates the pattern of rank `rank`
	pub fn new(mode: Mode, alloc_size: usize, chunk_size: usize, rank: usize) -> Result<Self, anyhow::Error> {
		self::validate(mode, alloc_size, chunk_size)?;

		Ok(Self {
			mode,
			alloc_size,
			chunk_size,
			seed: RandR::rank_seed(rank),
		})
	}

	/// Returns the mode
	pub fn mode(&self) -> Mode {
		self.mode
	}

	/// Returns the allocation size
	pub fn alloc_size(&self) -> usize {
		self.alloc_size
	}

	/// Returns the chunk size
	pub fn chunk_size(&self) -> usize {
		self.chunk_size
	}

	/// Returns the number of steps of each pass
	pub fn steps(&self) -> usize {
		self.alloc_size / self.chunk_size
	}

	/// Returns a new pass over the allocation.
	///
	/// Each pass restarts its walks, so all passes yield the same accesses.
	pub fn pass(&self) -> Pass {
		let chunk = self.chunk_size;
		let steps = self.steps();

		let (first, second) = match self.mode {
			Mode::Sequential => (Walk::strided(0, self.alloc_size, chunk, chunk, steps), None),
			Mode::Padding => (Walk::strided(0, self.alloc_size, chunk, 2 * chunk, steps), None),
			Mode::PseudoRandom => (Walk::random(0, self.alloc_size, chunk, self.seed, steps), None),
			Mode::Mixed => {
				// Note: The halves are split at a chunk boundary
				let half = (self.alloc_size / 2 / chunk) * chunk;
				let random_steps = steps / 2;
				(
					Walk::random(0, half, chunk, self.seed, random_steps),
					Some(Walk::strided(half, self.alloc_size - half, chunk, 2 * chunk, steps - random_steps)),
				)
			},
		};

		Pass { first, second }
	}
}

/// Access kind
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum AccessKind {
	/// Write
	Write,

	/// Read
	Read,
}

impl AccessKind {
	/// Returns the other access kind
	#[must_use]
	pub fn flip(self) -> Self {
		match self {
			Self::Write => Self::Read,
			Self::Read => Self::Write,
		}
	}
}

/// A single access
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct AccessOp {
	/// Offset within the allocation
	pub offset: usize,

	/// Length, in bytes
	pub len: usize,

	/// Kind
	pub kind: AccessKind,
}

/// A pass over the allocation
#[derive(Clone, Debug)]
pub struct Pass {
	/// First walk
	first: Walk,

	/// Second walk, for mixed passes
	second: Option<Walk>,
}

impl Iterator for Pass {
	type Item = AccessOp;

	fn next(&mut self) -> Option<Self::Item> {
		self.first
			.next()
			.or_else(|| self.second.as_mut().and_then(Walk::next))
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		let remaining = self.first.remaining + self.second.as_ref().map_or(0, |walk| walk.remaining);
		(remaining, Some(remaining))
	}
}

impl ExactSizeIterator for Pass {}

/// Walk over a region of the allocation
#[derive(Clone, Debug)]
struct Walk {
	/// Start of the region
	base: usize,

	/// Chunk-aligned length of the region
	span: usize,

	/// Chunk size
	chunk: usize,

	/// Steps remaining
	remaining: usize,

	/// Next access kind
	kind: AccessKind,

	/// Offset generator
	offsets: Offsets,
}

/// Offset generator of a [`Walk`]
#[derive(Clone, Debug)]
enum Offsets {
	/// Advances by `stride`, wrapping around the span
	Strided { next: usize, stride: usize },

	/// Pseudo-random chunks
	Random(RandR),
}

impl Walk {
	fn new(base: usize, region_len: usize, chunk: usize, steps: usize, offsets: Offsets) -> Self {
		Self {
			base,
			span: (region_len / chunk) * chunk,
			chunk,
			remaining: steps,
			kind: AccessKind::Write,
			offsets,
		}
	}

	fn strided(base: usize, region_len: usize, chunk: usize, stride: usize, steps: usize) -> Self {
		Self::new(base, region_len, chunk, steps, Offsets::Strided { next: 0, stride })
	}

	fn random(base: usize, region_len: usize, chunk: usize, seed: u32, steps: usize) -> Self {
		// Note: The first value of the sequence is discarded
		let mut rng = RandR::new(seed);
		rng.next_value();

		Self::new(base, region_len, chunk, steps, Offsets::Random(rng))
	}

	fn next(&mut self) -> Option<AccessOp> {
		if self.remaining == 0 {
			return None;
		}
		self.remaining -= 1;

		let rel_offset = match &mut self.offsets {
			Offsets::Strided { next, stride } => {
				let offset = *next;
				*next = (*next + *stride) % self.span;
				offset
			},
			Offsets::Random(rng) => {
				let value = u128::from(rng.next_value());
				((value * self.chunk as u128) % self.span as u128) as usize
			},
		};

		let kind = self.kind;
		self.kind = kind.flip();

		Some(AccessOp {
			offset: self.base + rel_offset,
			len: self.chunk,
			kind,
		})
	}
}

/// Pseudo-random generator with the same sequence as the C library's `rand_r`.
///
/// Yields values in `0..2^31`.
#[derive(Clone, Debug)]
pub struct RandR {
	/// Current state
	state: u32,
}

impl RandR {
	/// Creates a generator from a seed
	pub fn new(seed: u32) -> Self {
		Self { state: seed }
	}

	/// Returns the seed used by rank `rank`
	pub fn rank_seed(rank: usize) -> u32 {
		(rank as u32).wrapping_add(1).wrapping_mul(921)
	}

	/// Returns the next value
	pub fn next_value(&mut self) -> u32 {
		let mut next = self.state;

		next = next.wrapping_mul(1103515245).wrapping_add(12345);
		let mut result = (next / 65536) % 2048;

		next = next.wrapping_mul(1103515245).wrapping_add(12345);
		result <<= 10;
		result ^= (next / 65536) % 1024;

		next = next.wrapping_mul(1103515245).wrapping_add(12345);
		result <<= 10;
		result ^= (next / 65536) % 1024;

		self.state = next;
		result
	}
}
