//! Shared file mapping backend

// Imports
use {
	super::Backend,
	crate::mapping::Mapping,
	anyhow::Context,
	std::path::Path,
};

/// Shared mapping of a rank-local file
#[derive(Debug)]
pub struct MmapBackend {
	/// Mapping
	mapping: Mapping,
}

impl MmapBackend {
	/// Creates the file at `path` with `size` bytes and maps it
	pub fn acquire(path: &Path, size: usize) -> Result<Self, anyhow::Error> {
		let file = mstream_util::fs::open_file(path, Some(size as u64))
			.with_context(|| format!("Unable to open file {path:?}"))?;
		let mapping = Mapping::shared(&file, size).with_context(|| format!("Unable to map file {path:?}"))?;

		// Note: The mapping keeps the file alive, so the descriptor may be closed
		drop(file);

		Ok(Self { mapping })
	}
}

impl Backend for MmapBackend {
	fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), anyhow::Error> {
		super::range_mut(self.mapping.as_mut_slice(), offset, data.len())?.copy_from_slice(data);
		Ok(())
	}

	fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), anyhow::Error> {
		buf.copy_from_slice(super::range(self.mapping.as_slice(), offset, buf.len())?);
		Ok(())
	}

	fn flush(&mut self) -> Result<(), anyhow::Error> {
		self.mapping.flush().context("Unable to sync mapping to file")
	}

	fn release(self: Box<Self>) -> Result<(), anyhow::Error> {
		self.mapping.unmap().context("Unable to unmap file")
	}
}
