//! Anonymous memory backend

// Imports
use {
	super::Backend,
	crate::mapping::Mapping,
	anyhow::Context,
};

/// Private anonymous memory
#[derive(Debug)]
pub struct MemoryBackend {
	/// Mapping
	mapping: Mapping,
}

impl MemoryBackend {
	/// Maps `size` bytes of zero-filled memory
	pub fn acquire(size: usize) -> Result<Self, anyhow::Error> {
		let mapping = Mapping::anonymous(size).with_context(|| format!("Unable to map {size} bytes of memory"))?;
		Ok(Self { mapping })
	}
}

impl Backend for MemoryBackend {
	fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), anyhow::Error> {
		super::range_mut(self.mapping.as_mut_slice(), offset, data.len())?.copy_from_slice(data);
		Ok(())
	}

	fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), anyhow::Error> {
		buf.copy_from_slice(super::range(self.mapping.as_slice(), offset, buf.len())?);
		Ok(())
	}

	fn flush(&mut self) -> Result<(), anyhow::Error> {
		self.mapping.flush().context("Unable to sync memory")
	}

	fn release(self: Box<Self>) -> Result<(), anyhow::Error> {
		self.mapping.unmap().context("Unable to unmap memory")
	}
}
