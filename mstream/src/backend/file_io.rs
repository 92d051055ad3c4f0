//! Positioned file I/O backend

// Imports
use {
	super::Backend,
	crate::runtime::{CollectiveFile, Group},
	anyhow::Context,
	std::path::Path,
};

/// Rank-private file, accessed with positioned reads and writes
#[derive(Debug)]
pub struct FileIoBackend<F> {
	/// File
	file: F,

	/// Size of the range
	size: usize,
}

impl<F: CollectiveFile> FileIoBackend<F> {
	/// Opens the file at `path` through the runtime and preallocates `size` bytes
	pub fn acquire<G>(group: &G, path: &Path, size: usize) -> Result<Self, anyhow::Error>
	where
		G: Group<File = F>,
	{
		let mut file = group
			.open_file(path)
			.with_context(|| format!("Unable to open file {path:?}"))?;
		file.preallocate(size as u64)
			.with_context(|| format!("Unable to preallocate {size} bytes"))?;

		Ok(Self { file, size })
	}

	fn check_range(&self, offset: usize, len: usize) -> Result<(), anyhow::Error> {
		anyhow::ensure!(
			offset.checked_add(len).is_some_and(|end| end <= self.size),
			"Access of {len} bytes at {offset} is out of range (size {})",
			self.size
		);
		Ok(())
	}
}

impl<F: CollectiveFile> Backend for FileIoBackend<F> {
	fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), anyhow::Error> {
		self.check_range(offset, data.len())?;
		self.file.write_at(offset as u64, data)
	}

	fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), anyhow::Error> {
		self.check_range(offset, buf.len())?;
		self.file.read_at(offset as u64, buf)
	}

	fn flush(&mut self) -> Result<(), anyhow::Error> {
		self.file.sync().context("Unable to sync file")
	}

	fn release(self: Box<Self>) -> Result<(), anyhow::Error> {
		self.file.close().context("Unable to close file")
	}
}
