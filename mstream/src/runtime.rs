//! Message-passing runtime
//!
//! Process-group primitives the benchmark relies on: barriers, one-sided
//! put/get on collectively allocated windows, and rank-private positioned
//! files.

// Modules
pub mod local;

// Imports
use std::path::{Path, PathBuf};

/// Process group, as seen by one rank
pub trait Group {
	/// Window type
	type Window: Window + 'static;

	/// File type
	type File: CollectiveFile + 'static;

	/// Returns the rank of this process
	fn rank(&self) -> usize;

	/// Returns the number of ranks in the group
	fn size(&self) -> usize;

	/// Blocks until every rank has reached the barrier.
	///
	/// Fails if the group was aborted.
	fn barrier(&self) -> Result<(), anyhow::Error>;

	/// Collectively allocates a window, with a local partition of `len` bytes.
	///
	/// Every rank must call this, in the same order.
	fn allocate_window(&self, len: usize, hints: Option<&StorageHints>) -> Result<Self::Window, anyhow::Error>;

	/// Opens (creating if needed) a rank-private file
	fn open_file(&self, path: &Path) -> Result<Self::File, anyhow::Error>;
}

/// One-sided communication window
pub trait Window: Send {
	/// Starts an exclusive access epoch on `target`'s partition
	fn lock_exclusive(&mut self, target: usize) -> Result<(), anyhow::Error>;

	/// Ends the access epoch on `target`'s partition
	fn unlock(&mut self, target: usize) -> Result<(), anyhow::Error>;

	/// Puts `data` at `offset` of `target`'s partition
	fn put(&mut self, target: usize, offset: usize, data: &[u8]) -> Result<(), anyhow::Error>;

	/// Gets `buf.len()` bytes at `offset` of `target`'s partition
	fn get(&mut self, target: usize, offset: usize, buf: &mut [u8]) -> Result<(), anyhow::Error>;

	/// Completes all pending operations to `target` locally
	fn flush_local(&mut self, target: usize) -> Result<(), anyhow::Error>;

	/// Synchronizes the public and private copies of the window
	fn sync(&mut self) -> Result<(), anyhow::Error>;

	/// Collectively frees the window
	fn free(self) -> Result<(), anyhow::Error>;
}

/// Positioned file
pub trait CollectiveFile {
	/// Preallocates `len` bytes of storage
	fn preallocate(&mut self, len: u64) -> Result<(), anyhow::Error>;

	/// Writes all of `data` at `offset`
	fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), anyhow::Error>;

	/// Reads exactly `buf.len()` bytes at `offset`
	fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), anyhow::Error>;

	/// Syncs all data to storage
	fn sync(&mut self) -> Result<(), anyhow::Error>;

	/// Closes the file
	fn close(self) -> Result<(), anyhow::Error>;
}

/// Storage allocation hints of a window.
///
/// Requests that the window partition be backed by a file.
#[derive(PartialEq, Clone, Debug)]
pub struct StorageHints {
	/// Backing file
	pub filename: PathBuf,

	/// Offset within the backing file
	pub offset: u64,

	/// Whether to unlink the backing file once opened
	pub unlink: bool,

	/// Flush interval
	pub flush_interval: u64,

	/// Whether to read the existing file contents
	pub read_file: bool,

	/// Eviction policy hint.
	///
	/// Always `fifo`, and ignored by the runtime.
	pub policy: &'static str,

	/// Tier order
	pub order: &'static str,

	/// Memory factor
	pub factor: f64,

	/// Segment size
	pub seg_size: usize,
}

impl StorageHints {
	/// Allocation type key
	pub const KEY_ALLOC_TYPE: &'static str = "alloc_type";
	/// Allocation type value for storage
	pub const ALLOC_TYPE_STORAGE: &'static str = "storage";
	pub const KEY_FILENAME: &'static str = "storage_alloc_filename";
	pub const KEY_OFFSET: &'static str = "storage_alloc_offset";
	pub const KEY_UNLINK: &'static str = "storage_alloc_unlink";
	pub const KEY_FLUSH_INTERVAL: &'static str = "storage_alloc_flush_interval";
	pub const KEY_READ_FILE: &'static str = "storage_alloc_read_file";
	pub const KEY_POLICY: &'static str = "storage_alloc_policy";
	pub const KEY_ORDER: &'static str = "storage_alloc_order";
	pub const KEY_FACTOR: &'static str = "storage_alloc_factor";
	pub const KEY_SEG_SIZE: &'static str = "storage_alloc_seg_size";

	/// Creates the default hints for `filename`
	pub fn new(filename: impl Into<PathBuf>, seg_size: usize) -> Self {
		Self {
			filename: filename.into(),
			offset: 0,
			unlink: false,
			flush_interval: 921921,
			read_file: false,
			policy: "fifo",
			order: "mem_first",
			factor: 1.0,
			seg_size,
		}
	}

	/// Returns these hints as a key/value list
	pub fn to_info(&self) -> Vec<(&'static str, String)> {
		vec![
			(Self::KEY_ALLOC_TYPE, Self::ALLOC_TYPE_STORAGE.to_owned()),
			(Self::KEY_FILENAME, self.filename.display().to_string()),
			(Self::KEY_OFFSET, self.offset.to_string()),
			(Self::KEY_UNLINK, self.unlink.to_string()),
			(Self::KEY_FLUSH_INTERVAL, self.flush_interval.to_string()),
			(Self::KEY_READ_FILE, self.read_file.to_string()),
			(Self::KEY_POLICY, self.policy.to_owned()),
			(Self::KEY_ORDER, self.order.to_owned()),
			(Self::KEY_FACTOR, format!("{:.1}", self.factor)),
			(Self::KEY_SEG_SIZE, self.seg_size.to_string()),
		]
	}
}
