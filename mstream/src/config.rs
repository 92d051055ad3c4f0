//! Configuration

// Imports
use {
	anyhow::Context,
	std::{
		fmt,
		fs,
		path::{Path, PathBuf},
		str::FromStr,
		time::Duration,
	},
};

/// Whether output verification is compiled in by default
pub const VERIFY_OUTPUT: bool = cfg!(feature = "verify-output");

/// Benchmark configuration.
///
/// Built once from the command line and never mutated afterwards.
#[derive(Clone, Debug)]
pub struct Config {
	/// Allocation size, in bytes
	pub alloc_size: usize,

	/// Segment size, in bytes.
	///
	/// Granularity hint for the paging backend and storage windows.
	pub seg_size: usize,

	/// Chunk size, in bytes per operation
	pub chunk_size: usize,

	/// Access mode
	pub mode: Mode,

	/// Backend
	pub backend: BackendKind,

	/// Whether the paging backend reads existing file contents on faults
	pub read_file: bool,

	/// Eviction policy of the paging backend
	pub policy: EvictionPolicy,

	/// Whether each rank sizes its allocation dynamically
	pub dynamic: bool,

	/// Folder holding the temporary directory tree
	pub folder: PathBuf,
}

impl Config {
	/// Validates this configuration
	pub fn validate(&self) -> Result<(), anyhow::Error> {
		anyhow::ensure!(self.seg_size > 0, "Segment size must be non-zero");
		crate::pattern::validate(self.mode, self.alloc_size, self.chunk_size)
	}

	/// Returns the allocation size of rank `rank`.
	///
	/// With dynamic sizing, each rank uses `min(alloc_size, base + (alloc_size >> rank))`.
	pub fn rank_alloc_size(&self, rank: usize, tuning: &Tuning) -> usize {
		match self.dynamic {
			true => {
				let shifted = u32::try_from(rank)
					.ok()
					.and_then(|rank| self.alloc_size.checked_shr(rank))
					.unwrap_or(0);
				let size = tuning.dynamic_base.saturating_add(shifted);
				self.alloc_size.min(size)
			},
			false => self.alloc_size,
		}
	}
}

/// Tuning.
///
/// Optional knobs read from a json file, all with defaults.
#[derive(Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Tuning {
	/// Warm-up iterations, not timed
	pub warmup_iters: usize,

	/// Measured iterations
	pub measured_iters: usize,

	/// Start delay per rank when sizing dynamically (in microseconds)
	pub stagger_us: u64,

	/// Base size when sizing dynamically, in bytes
	pub dynamic_base: usize,

	/// Maximum resident segments of the paging backend.
	///
	/// Unlimited if unset.
	pub max_resident_segments: Option<usize>,

	/// Output verification
	pub verify: bool,
}

impl Tuning {
	/// Reads the tuning from a json file
	pub fn from_file(path: &Path) -> Result<Self, anyhow::Error> {
		let file = fs::File::open(path).with_context(|| format!("Unable to open tuning file {path:?}"))?;
		serde_json::from_reader(file).with_context(|| format!("Unable to parse tuning file {path:?}"))
	}

	/// Validates this tuning
	pub fn validate(&self) -> Result<(), anyhow::Error> {
		anyhow::ensure!(self.measured_iters > 0, "At least one measured iteration is required");
		anyhow::ensure!(
			self.max_resident_segments != Some(0),
			"Maximum resident segments must be non-zero"
		);

		Ok(())
	}

	/// Returns the stagger delay for rank `rank`
	pub fn stagger(&self, rank: usize) -> Duration {
		Duration::from_micros(self.stagger_us.saturating_mul(rank as u64))
	}
}

impl Default for Tuning {
	fn default() -> Self {
		Self {
			warmup_iters:          0,
			measured_iters:        10,
			stagger_us:            921921,
			dynamic_base:          1 << 30,
			max_resident_segments: None,
			verify:                VERIFY_OUTPUT,
		}
	}
}

/// Declares an enum selected by a numeric code on the command line
macro_rules! coded_enum {
	(
		$(#[$meta:meta])*
		pub enum $Name:ident {
			$(
				$(#[$variant_meta:meta])*
				$Variant:ident = $code:literal,
			)*
		}
	) => {
		$(#[$meta])*
		#[derive(PartialEq, Eq, Clone, Copy, Debug)]
		pub enum $Name {
			$(
				$(#[$variant_meta])*
				$Variant,
			)*
		}

		impl $Name {
			/// All variants, by code
			pub const ALL: &'static [Self] = &[$(Self::$Variant,)*];

			/// Returns the code of this variant
			#[must_use]
			pub const fn code(self) -> u8 {
				match self {
					$(Self::$Variant => $code,)*
				}
			}

			/// Returns the variant with code `code`
			pub fn from_code(code: u8) -> Result<Self, anyhow::Error> {
				match code {
					$($code => Ok(Self::$Variant),)*
					_ => anyhow::bail!("Unknown {} code: {code}", stringify!($Name)),
				}
			}
		}

		impl FromStr for $Name {
			type Err = anyhow::Error;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				let code = s
					.trim()
					.parse::<u8>()
					.with_context(|| format!("Unable to parse {} code {s:?}", stringify!($Name)))?;
				Self::from_code(code)
			}
		}

		impl fmt::Display for $Name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.code())
			}
		}
	};
}

coded_enum! {
	/// Access mode
	pub enum Mode {
		/// Alternating write/read, advancing one chunk per step
		Sequential = 0,

		/// Alternating write/read, advancing two chunks per step
		Padding = 1,

		/// Alternating write/read at pseudo-random chunks
		PseudoRandom = 2,

		/// Pseudo-random over the first half, then padding over the second half
		Mixed = 3,
	}
}

coded_enum! {
	/// Backend kind
	pub enum BackendKind {
		/// Private anonymous memory
		Memory = 0,

		/// Shared file-backed mapping
		Mmap = 1,

		/// User-level paging
		Paging = 2,

		/// Window in memory
		WindowMemory = 3,

		/// Window with storage allocation
		WindowStorage = 4,

		/// Positioned file I/O through the runtime
		FileIo = 5,
	}
}

coded_enum! {
	/// Eviction policy of the paging backend
	pub enum EvictionPolicy {
		/// First-in first-out
		Fifo = 0,

		/// Last-in first-out
		Lifo = 1,

		/// Pseudo-LRU (second chance)
		Plru = 2,

		/// Pseudo-random
		Prnd = 3,

		/// Write-in read-out, first-in first-out
		WiroFifo = 4,

		/// Write-in read-out, last-in first-out
		WiroLifo = 5,
	}
}
