//! Page-fault latency probe
//!
//! Touches one byte of every page of several fresh allocations and reports the
//! mean time per page fault.

// Imports
use {
	crate::{
		backend::{AcquireRequest, Backend},
		config::{BackendKind, EvictionPolicy},
		mapping,
		report,
		runtime::Group,
	},
	anyhow::Context,
	itertools::Itertools,
	mstream_util::TimeUnit,
	std::{fmt, io, path::PathBuf, time::Instant},
};

/// Byte written on every touch
const TOUCH_VALUE: u8 = 21;

/// Probe configuration
#[derive(Clone, Debug)]
pub struct ProbeConfig {
	/// Total size of all allocations, in bytes
	pub size: usize,

	/// Backend.
	///
	/// Only memory and paging are supported.
	pub backend: BackendKind,

	/// Number of allocations
	pub num_alloc: usize,

	/// Folder for the paging files
	pub folder: PathBuf,

	/// Segment size of the paging backend
	pub seg_size: usize,
}

impl ProbeConfig {
	/// Returns the size of each allocation
	pub fn alloc_size(&self) -> usize {
		self.size / self.num_alloc.max(1)
	}

	/// Validates this configuration
	pub fn validate(&self) -> Result<(), anyhow::Error> {
		anyhow::ensure!(
			matches!(self.backend, BackendKind::Memory | BackendKind::Paging),
			"Backend {:?} isn't supported by the probe, use memory (0) or paging (2)",
			self.backend
		);
		anyhow::ensure!(self.num_alloc > 0, "At least one allocation is required");
		anyhow::ensure!(self.alloc_size() > 0, "Size {} is too small for {} allocations", self.size, self.num_alloc);
		anyhow::ensure!(self.seg_size > 0, "Segment size must be non-zero");

		Ok(())
	}

	/// Returns the file of allocation `alloc` of rank `rank`
	fn alloc_file(&self, rank: usize, alloc: usize) -> PathBuf {
		self.folder.join(format!("p{rank}_a{alloc}_pflatency.tmp"))
	}
}

/// Probe report of a single rank
#[derive(PartialEq, Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct ProbeReport {
	/// Rank
	pub rank: usize,

	/// Number of ranks
	pub ranks: usize,

	/// Total size
	pub size: usize,

	/// Segment size
	pub seg_size: usize,

	/// Backend code
	pub backend: u8,

	/// Number of allocations
	pub num_alloc: usize,

	/// Page faults caused
	pub faults: usize,

	/// Mean latency per page fault, in nanoseconds
	pub latency_ns: f64,
}

impl fmt::Display for ProbeReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let params = [self.size, self.seg_size, usize::from(self.backend), self.num_alloc];
		write!(
			f,
			"{};{}; {}; {:.6}",
			self.rank,
			self.ranks,
			params.iter().join(";"),
			self.latency_ns
		)
	}
}

/// Runs the probe on the calling rank of `group`, writing the report line to `out`.
///
/// Every rank of `group` must call this with the same config.
pub fn run<G: Group>(
	group: &G,
	config: &ProbeConfig,
	verify: bool,
	out: &mut dyn io::Write,
) -> Result<ProbeReport, anyhow::Error> {
	config.validate().context("Invalid probe config")?;
	let rank = group.rank();
	let uses_files = config.backend == BackendKind::Paging;

	if rank == 0 && uses_files {
		mstream_util::fs::create_dir(&config.folder)
			.with_context(|| format!("Unable to create directory {:?}", config.folder))?;
	}
	group.barrier().context("Unable to wait for folder")?;

	let alloc_size = config.alloc_size();
	let mut backends = (0..config.num_alloc)
		.map(|alloc| {
			let path = config.alloc_file(rank, alloc);
			let request = AcquireRequest {
				size: alloc_size,
				seg_size: config.seg_size,
				path: &path,
				read_file: false,
				policy: EvictionPolicy::Fifo,
				max_resident_segments: None,
			};
			config
				.backend
				.acquire(&request, group)
				.with_context(|| format!("Unable to acquire allocation {alloc}"))
		})
		.collect::<Result<Vec<_>, _>>()?;
	group.barrier().context("Unable to wait for all allocations")?;

	let page_size = mapping::page_size();
	let start = Instant::now();
	let faults = self::touch_pages(&mut backends, alloc_size, page_size)?;
	let elapsed = start.elapsed();

	let report = ProbeReport {
		rank,
		ranks: group.size(),
		size: config.size,
		seg_size: config.seg_size,
		backend: config.backend.code(),
		num_alloc: config.num_alloc,
		faults,
		latency_ns: TimeUnit::Nanos.of(elapsed) / faults.max(1) as f64,
	};
	report::in_rank_order(group, || {
		writeln!(out, "{report}").context("Unable to write report")?;
		out.flush().context("Unable to flush report")
	})?;

	for (alloc, backend) in backends.into_iter().enumerate() {
		backend
			.release()
			.with_context(|| format!("Unable to release allocation {alloc}"))?;
	}
	group.barrier().context("Unable to wait for all ranks to release")?;

	if rank == 0 && uses_files && !verify {
		if let Err(err) = mstream_util::fs::delete_dir(&config.folder) {
			tracing::error!(folder = ?config.folder, %err, "Unable to delete probe folder");
		}
	}

	Ok(report)
}

/// Touches the first byte of every page of all allocations.
///
/// Goes page by page, touching that page on every allocation before moving on.
/// Returns the number of touches.
fn touch_pages(backends: &mut [Box<dyn Backend>], alloc_size: usize, page_size: usize) -> Result<usize, anyhow::Error> {
	let mut touches = 0;
	for offset in (0..alloc_size).step_by(page_size) {
		for (alloc, backend) in backends.iter_mut().enumerate() {
			backend
				.write(offset, &[TOUCH_VALUE])
				.with_context(|| format!("Unable to touch offset {offset} of allocation {alloc}"))?;
			touches += 1;
		}
	}

	Ok(touches)
}

#[cfg(test)]
mod tests {
	use {super::*, crate::runtime::local::LocalGroup};

	fn config(folder: PathBuf, backend: BackendKind) -> ProbeConfig {
		ProbeConfig {
			size: 64 * mapping::page_size(),
			backend,
			num_alloc: 4,
			folder,
			seg_size: mapping::page_size(),
		}
	}

	#[test]
	fn rejects_unsupported() {
		let config = self::config(PathBuf::from("."), BackendKind::Mmap);
		assert!(config.validate().is_err());

		let config = ProbeConfig {
			num_alloc: 0,
			..self::config(PathBuf::from("."), BackendKind::Memory)
		};
		assert!(config.validate().is_err());
	}

	#[test]
	fn probes_every_page() {
		let tmp = tempfile::tempdir().expect("Unable to create temp dir");
		for backend in [BackendKind::Memory, BackendKind::Paging] {
			let folder = tmp.path().join(format!("probe_{backend}"));
			let config = self::config(folder.clone(), backend);

			let reports = LocalGroup::launch(2, |group| self::run(group, &config, false, &mut io::sink()))
				.unwrap_or_else(|err| panic!("{backend:?} failed: {err:?}"));
			for (rank, report) in reports.iter().enumerate() {
				assert_eq!(report.rank, rank);
				assert_eq!(report.faults, 64);
				assert!(report.latency_ns > 0.0);
			}

			assert!(!folder.exists(), "{backend:?}");
		}
	}

	#[test]
	fn line_format() {
		let report = ProbeReport {
			rank: 0,
			ranks: 2,
			size: 1048576,
			seg_size: 4096,
			backend: 2,
			num_alloc: 4,
			faults: 256,
			latency_ns: 1234.5,
		};
		assert_eq!(report.to_string(), "0;2; 1048576;4096;2;4; 1234.500000");
	}
}
