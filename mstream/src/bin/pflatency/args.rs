//! Arguments

// Imports
use {mstream::BackendKind, std::path::PathBuf};

/// Arguments
#[derive(Debug)]
#[derive(clap::Parser)]
#[clap(version, about = "Measures the mean page fault latency of fresh allocations")]
pub struct Args {
	/// Log file
	///
	/// Specifies a file to perform verbose logging to.
	/// You can use `RUST_LOG_FILE` to set filtering options
	#[clap(long = "log-file")]
	pub log_file: Option<PathBuf>,

	/// Whether to append to the log file
	#[clap(long = "log-file-append")]
	pub log_file_append: bool,

	/// Number of ranks
	#[clap(long = "ranks", default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
	pub ranks: u32,

	/// Keeps the paging files
	#[clap(long = "verify")]
	pub verify: bool,

	/// Total size of all allocations, in bytes
	pub size: usize,

	/// Backend (0: memory, 2: paging)
	pub backend: BackendKind,

	/// Number of allocations
	pub num_alloc: usize,

	/// Folder for the paging files
	pub folder: PathBuf,

	/// Segment size, in bytes.
	///
	/// Defaults to the page size
	pub seg_size: Option<usize>,
}
