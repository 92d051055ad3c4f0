//! Result aggregation

// Imports
use {
	crate::{backend::RunStats, bench::RunContext, runtime::Group, timer::PhaseTimestamps},
	itertools::Itertools,
	mstream_util::{TimeUnit, MIB},
	std::fmt,
};

/// Report of a single rank
#[derive(PartialEq, Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct RankReport {
	/// Rank
	pub rank: usize,

	/// Number of ranks
	pub ranks: usize,

	/// Allocation size of this rank
	pub alloc_size: usize,

	/// Allocation size of all ranks
	pub alloc_size_all: usize,

	/// Segment size
	pub seg_size: usize,

	/// Chunk size
	pub chunk_size: usize,

	/// Mode code
	pub mode: u8,

	/// Backend code
	pub backend: u8,

	/// Read-file flag
	pub read_file: u8,

	/// Eviction policy code
	pub policy: u8,

	/// Compute span, in seconds
	pub compute_secs: f64,

	/// Flush span, in seconds
	pub flush_secs: f64,

	/// Bandwidth, in MiB/s
	pub bandwidth_mib: f64,

	/// Barrier-inclusive span, in seconds
	pub barrier_secs: f64,

	/// Aggregate bandwidth of all ranks, in MiB/s
	pub aggregate_bandwidth_mib: f64,

	/// Read faults
	pub read_faults: u64,

	/// Write faults
	pub write_faults: u64,
}

impl RankReport {
	/// Builds the report of a run
	pub fn new(ctx: &RunContext<'_>, timestamps: &PhaseTimestamps, stats: RunStats) -> Self {
		let config = ctx.config;
		let compute_secs = TimeUnit::Secs.of(timestamps.compute.elapsed());
		let flush_secs = TimeUnit::Secs.of(timestamps.flush.elapsed());
		let barrier_secs = TimeUnit::Secs.of(timestamps.barrier.elapsed());

		let written = (ctx.alloc_size * ctx.tuning.measured_iters) as f64;
		Self {
			rank: ctx.rank,
			ranks: ctx.ranks,
			alloc_size: ctx.alloc_size,
			alloc_size_all: ctx.alloc_size * ctx.ranks,
			seg_size: config.seg_size,
			chunk_size: config.chunk_size,
			mode: config.mode.code(),
			backend: config.backend.code(),
			read_file: u8::from(config.read_file),
			policy: config.policy.code(),
			compute_secs,
			flush_secs,
			bandwidth_mib: written / compute_secs / MIB,
			barrier_secs,
			aggregate_bandwidth_mib: written * ctx.ranks as f64 / barrier_secs / MIB,
			read_faults: stats.read_faults,
			write_faults: stats.write_faults,
		}
	}
}

impl fmt::Display for RankReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let secs = |value: f64| format!("{value:.6}");
		let groups = [
			vec![self.rank.to_string(), self.ranks.to_string()],
			vec![
				self.alloc_size.to_string(),
				self.alloc_size_all.to_string(),
				self.seg_size.to_string(),
				self.chunk_size.to_string(),
				self.mode.to_string(),
				self.backend.to_string(),
				self.read_file.to_string(),
				self.policy.to_string(),
			],
			vec![
				secs(self.compute_secs),
				secs(self.flush_secs),
				secs(self.bandwidth_mib),
				secs(self.barrier_secs),
				secs(self.aggregate_bandwidth_mib),
			],
			vec![self.read_faults.to_string(), self.write_faults.to_string()],
		];

		write!(f, "{}", groups.iter().map(|group| group.iter().join(";")).join("; "))
	}
}

/// Runs `f` on each rank of `group`, one rank at a time, in ascending rank order.
///
/// Every rank must call this.
pub fn in_rank_order<G: Group>(group: &G, mut f: impl FnMut() -> Result<(), anyhow::Error>) -> Result<(), anyhow::Error> {
	for turn in 0..group.size() {
		group.barrier()?;
		if turn == group.rank() {
			f()?;
		}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use {
		super::*,
		crate::runtime::local::LocalGroup,
		std::sync::Mutex,
	};

	fn report() -> RankReport {
		RankReport {
			rank: 1,
			ranks: 4,
			alloc_size: 1048576,
			alloc_size_all: 4194304,
			seg_size: 65536,
			chunk_size: 4096,
			mode: 2,
			backend: 5,
			read_file: 0,
			policy: 3,
			compute_secs: 0.5,
			flush_secs: 0.125,
			bandwidth_mib: 20.0,
			barrier_secs: 1.0,
			aggregate_bandwidth_mib: 40.0,
			read_faults: 7,
			write_faults: 9,
		}
	}

	#[test]
	fn line_format() {
		assert_eq!(
			self::report().to_string(),
			"1;4; 1048576;4194304;65536;4096;2;5;0;3; 0.500000;0.125000;20.000000;1.000000;40.000000; 7;9"
		);
	}

	#[test]
	fn json_roundtrip() {
		let report = self::report();
		let json = serde_json::to_string(&report).expect("Unable to serialize");
		assert!(json.contains(r#""aggregate_bandwidth_mib":40.0"#), "{json}");
		assert_eq!(serde_json::from_str::<RankReport>(&json).expect("Unable to deserialize"), report);
	}

	#[test]
	fn turns_follow_rank_order() {
		let order = Mutex::new(vec![]);
		LocalGroup::launch(5, |group| {
			self::in_rank_order(group, || {
				order.lock().expect("Poisoned").push(group.rank());
				Ok(())
			})
		})
		.expect("Launch failed");

		assert_eq!(order.into_inner().expect("Poisoned"), [0, 1, 2, 3, 4]);
	}
}
