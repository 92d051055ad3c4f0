//! Arguments

// Imports
use {
	mstream::{BackendKind, EvictionPolicy, Mode},
	std::path::PathBuf,
};

/// Arguments
#[derive(Debug)]
#[derive(clap::Parser)]
#[clap(version, about = "Measures storage backend throughput across a group of ranks")]
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

	/// Tuning file
	#[clap(long = "config")]
	pub tuning_file: Option<PathBuf>,

	/// Output file, receives all reports as json
	#[clap(long = "output")]
	pub output_file: Option<PathBuf>,

	/// Verifies all reads and keeps the temporary files
	#[clap(long = "verify")]
	pub verify: bool,

	/// Allocation size, in bytes
	pub alloc_size: usize,

	/// Segment size, in bytes
	pub seg_size: usize,

	/// Chunk size, in bytes
	pub chunk_size: usize,

	/// Mode (0: sequential, 1: padding, 2: pseudo-random, 3: mixed)
	pub mode: Mode,

	/// Backend (0: memory, 1: mmap, 2: paging, 3: window, 4: storage window, 5: file)
	pub backend: BackendKind,

	/// Whether the paging backend reads the file (0 / 1)
	#[clap(value_parser = parse_flag)]
	pub read_file: bool,

	/// Eviction policy (0: fifo, 1: lifo, 2: plru, 3: prnd, 4: wiro-fifo, 5: wiro-lifo)
	pub policy: EvictionPolicy,

	/// Whether to size allocations dynamically (0 / 1)
	#[clap(value_parser = parse_flag)]
	pub dynamic: bool,

	/// Output folder
	#[clap(default_value = ".")]
	pub folder: PathBuf,
}

/// Parses a `0` / `1` flag
pub fn parse_flag(s: &str) -> Result<bool, String> {
	match s.trim() {
		"0" => Ok(false),
		"1" => Ok(true),
		_ => Err(format!("expected 0 or 1, found {s:?}")),
	}
}
