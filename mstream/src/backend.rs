//! Byte-range backends
//!
//! Every backend exposes a rank-local byte range of a fixed size, written and
//! read at arbitrary offsets.

// Modules
mod file_io;
mod memory;
mod mmap;
mod paging;
mod window;

// Exports
pub use self::{
	file_io::FileIoBackend,
	memory::MemoryBackend,
	mmap::MmapBackend,
	paging::PagingBackend,
	window::WindowBackend,
};

// Imports
use {
	crate::{
		config::{BackendKind, EvictionPolicy},
		runtime::{Group, StorageHints},
	},
	anyhow::Context,
	std::path::Path,
};

/// Byte-range backend
pub trait Backend {
	/// Writes `data` at `offset`
	fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), anyhow::Error>;

	/// Reads `buf.len()` bytes at `offset` into `buf`
	fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), anyhow::Error>;

	/// Flushes all writes to the backing store
	fn flush(&mut self) -> Result<(), anyhow::Error>;

	/// Returns the run statistics
	fn stats(&self) -> RunStats {
		RunStats::default()
	}

	/// Releases the byte range
	fn release(self: Box<Self>) -> Result<(), anyhow::Error>;
}

/// Run statistics
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
pub struct RunStats {
	/// Read faults
	pub read_faults: u64,

	/// Write faults
	pub write_faults: u64,
}

/// Request to acquire a backend
#[derive(Clone, Debug)]
pub struct AcquireRequest<'a> {
	/// Size of the range, in bytes
	pub size: usize,

	/// Segment size, in bytes
	pub seg_size: usize,

	/// Rank-local file, for backends that use one
	pub path: &'a Path,

	/// Whether the paging backend reads existing file contents
	pub read_file: bool,

	/// Eviction policy of the paging backend
	pub policy: EvictionPolicy,

	/// Residency limit of the paging backend
	pub max_resident_segments: Option<usize>,
}

impl BackendKind {
	/// Acquires a backend of this kind.
	///
	/// Window backends are allocated collectively, so every rank of `group`
	/// must acquire one at the same time.
	pub fn acquire<G: Group>(
		self,
		request: &AcquireRequest<'_>,
		group: &G,
	) -> Result<Box<dyn Backend>, anyhow::Error> {
		tracing::debug!(kind = ?self, size = request.size, path = ?request.path, "Acquiring backend");
		let backend: Box<dyn Backend> = match self {
			Self::Memory => Box::new(MemoryBackend::acquire(request.size)?),
			Self::Mmap => Box::new(MmapBackend::acquire(request.path, request.size)?),
			Self::Paging => Box::new(PagingBackend::acquire(request)?),
			Self::WindowMemory => Box::new(WindowBackend::acquire(group, request.size, None)?),
			Self::WindowStorage => {
				let hints = cfg!(feature = "storage-windows").then(|| StorageHints::new(request.path, request.seg_size));
				if hints.is_none() {
					tracing::debug!("Storage windows are disabled, using a memory window");
				}
				Box::new(WindowBackend::acquire(group, request.size, hints.as_ref())?)
			},
			Self::FileIo => Box::new(FileIoBackend::acquire(group, request.path, request.size)?),
		};

		Ok(backend)
	}
}

/// Returns `len` bytes of `data` at `offset`, or an error if out of range
fn range(data: &[u8], offset: usize, len: usize) -> Result<&[u8], anyhow::Error> {
	let size = data.len();
	data.get(offset..)
		.and_then(|rest| rest.get(..len))
		.with_context(|| format!("Access of {len} bytes at {offset} is out of range (size {size})"))
}

/// Mutable version of [`range`]
fn range_mut(data: &mut [u8], offset: usize, len: usize) -> Result<&mut [u8], anyhow::Error> {
	let size = data.len();
	data.get_mut(offset..)
		.and_then(|rest| rest.get_mut(..len))
		.with_context(|| format!("Access of {len} bytes at {offset} is out of range (size {size})"))
}
