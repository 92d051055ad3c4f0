//! Benchmark run
//!
//! Drives a single run on one rank: sets up the temporary tree, acquires the
//! backend, executes and times the passes, reports and cleans up.

// Imports
use {
	crate::{
		backend::AcquireRequest,
		config::{Config, Tuning},
		exec::Executor,
		pattern::Pattern,
		report::{self, RankReport},
		runtime::Group,
		timer::PhaseTimer,
	},
	anyhow::Context,
	std::{
		io,
		path::{Path, PathBuf},
		time::Duration,
	},
};

/// Temporary folder, relative to the output folder
pub const TMP_FOLDER: &str = "tmp";

/// File name of the rank-local file
pub const RANK_FILE: &str = "mstream.tmp";

/// Paths of a run
#[derive(Clone, Debug)]
pub struct RunPaths {
	/// Temporary folder, removed after the run
	pub tmp: PathBuf,

	/// Folder of this configuration
	pub config_dir: PathBuf,

	/// Folder of this rank
	pub rank_dir: PathBuf,

	/// Rank-local file
	pub file: PathBuf,
}

impl RunPaths {
	/// Builds the paths of rank `rank` out of `ranks`
	pub fn new(config: &Config, rank: usize, ranks: usize) -> Self {
		let tmp = config.folder.join(TMP_FOLDER);
		let config_dir = tmp.join(format!(
			"{ranks}_{}_{}_{}_{}",
			config.mode,
			config.backend,
			u8::from(config.read_file),
			config.policy
		));
		let rank_dir = config_dir.join(format!("p{rank}"));
		let file = rank_dir.join(RANK_FILE);

		Self {
			tmp,
			config_dir,
			rank_dir,
			file,
		}
	}
}

/// Per-run state of a rank
#[derive(Clone, Debug)]
pub struct RunContext<'a> {
	/// Config
	pub config: &'a Config,

	/// Tuning
	pub tuning: &'a Tuning,

	/// Rank
	pub rank: usize,

	/// Number of ranks
	pub ranks: usize,

	/// Allocation size of this rank
	pub alloc_size: usize,

	/// Paths
	pub paths: RunPaths,
}

impl<'a> RunContext<'a> {
	/// Creates the context of rank `rank` out of `ranks`
	pub fn new(config: &'a Config, tuning: &'a Tuning, rank: usize, ranks: usize) -> Self {
		Self {
			config,
			tuning,
			rank,
			ranks,
			alloc_size: config.rank_alloc_size(rank, tuning),
			paths: RunPaths::new(config, rank, ranks),
		}
	}

	/// Returns the delay before the first measured pass
	pub fn stagger(&self) -> Duration {
		match self.config.dynamic {
			true => self.tuning.stagger(self.rank),
			false => Duration::ZERO,
		}
	}

	/// Returns the request to acquire the backend
	pub fn acquire_request(&self) -> AcquireRequest<'_> {
		AcquireRequest {
			size: self.alloc_size,
			seg_size: self.config.seg_size,
			path: &self.paths.file,
			read_file: self.config.read_file,
			policy: self.config.policy,
			max_resident_segments: self.tuning.max_resident_segments,
		}
	}
}

/// Runs the benchmark on the calling rank of `group`, writing the report line to `out`.
///
/// Every rank of `group` must call this with the same config.
pub fn run<G: Group>(
	group: &G,
	config: &Config,
	tuning: &Tuning,
	out: &mut dyn io::Write,
) -> Result<RankReport, anyhow::Error> {
	config.validate().context("Invalid config")?;
	tuning.validate().context("Invalid tuning")?;

	let ctx = RunContext::new(config, tuning, group.rank(), group.size());
	tracing::debug!(rank = ctx.rank, alloc_size = ctx.alloc_size, paths = ?ctx.paths, "Starting run");

	// Create the configuration folder, and then our own
	if ctx.rank == 0 {
		mstream_util::fs::create_dir(&ctx.paths.config_dir)
			.with_context(|| format!("Unable to create directory {:?}", ctx.paths.config_dir))?;
	}
	group.barrier().context("Unable to wait for configuration folder")?;
	mstream_util::fs::create_dir(&ctx.paths.rank_dir)
		.with_context(|| format!("Unable to create directory {:?}", ctx.paths.rank_dir))?;

	let pattern = Pattern::new(config.mode, ctx.alloc_size, config.chunk_size, ctx.rank)
		.context("Unable to create access pattern")?;
	let mut backend = config
		.backend
		.acquire(&ctx.acquire_request(), group)
		.with_context(|| format!("Unable to acquire {:?} backend", config.backend))?;
	group.barrier().context("Unable to wait for all backends")?;

	let mut timer = PhaseTimer::new();
	let mut executor = Executor::new(pattern, tuning, ctx.stagger());
	let output = executor
		.run(backend.as_mut(), &mut timer)
		.context("Unable to run benchmark")?;
	tracing::debug!(rank = ctx.rank, ?output, "Finished passes");

	timer.start_flush();
	backend.flush().context("Unable to flush backend")?;
	timer.stop_flush();
	timer.stop_compute();

	group.barrier().context("Unable to wait for all ranks to flush")?;
	timer.stop_barrier();

	let timestamps = timer.finish()?;
	let report = RankReport::new(&ctx, &timestamps, backend.stats());
	report::in_rank_order(group, || {
		writeln!(out, "{report}").context("Unable to write report")?;
		out.flush().context("Unable to flush report")
	})?;

	backend.release().context("Unable to release backend")?;
	group.barrier().context("Unable to wait for all ranks to release")?;

	if ctx.rank == 0 {
		match tuning.verify {
			true => tracing::info!(path = ?ctx.paths.tmp, "Keeping temporary folder for verification"),
			false => self::cleanup(&ctx.paths.tmp),
		}
	}

	Ok(report)
}

/// Deletes the temporary folder, logging any errors
fn cleanup(tmp: &Path) {
	if let Err(err) = mstream_util::fs::delete_dir(tmp) {
		tracing::error!(?tmp, %err, "Unable to delete temporary folder");
	}
}
