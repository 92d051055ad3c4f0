//! User-level paging backend

// Imports
use {
	super::{AcquireRequest, Backend, RunStats},
	crate::pager::{Pager, PagerConfig},
	anyhow::Context,
};

/// Range managed by the user-level pager
#[derive(Debug)]
pub struct PagingBackend {
	/// Pager
	pager: Pager,
}

impl PagingBackend {
	/// Creates the rank-local file and pages it
	pub fn acquire(request: &AcquireRequest<'_>) -> Result<Self, anyhow::Error> {
		let path = request.path;
		let file = mstream_util::fs::open_file(path, Some(request.size as u64))
			.with_context(|| format!("Unable to open file {path:?}"))?;

		let config = PagerConfig {
			size:         request.size,
			seg_size:     request.seg_size,
			read_file:    request.read_file,
			policy:       request.policy,
			max_resident: request.max_resident_segments,
		};
		let pager = Pager::allocate(file, config).context("Unable to allocate paged range")?;

		Ok(Self { pager })
	}
}

impl Backend for PagingBackend {
	fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), anyhow::Error> {
		self.pager.write(offset, data)
	}

	fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), anyhow::Error> {
		self.pager.read(offset, buf)
	}

	fn flush(&mut self) -> Result<(), anyhow::Error> {
		self.pager.sync().context("Unable to sync paged range")
	}

	fn stats(&self) -> RunStats {
		let stats = self.pager.stats();
		RunStats {
			read_faults:  stats.read_faults,
			write_faults: stats.write_faults,
		}
	}

	fn release(self: Box<Self>) -> Result<(), anyhow::Error> {
		self.pager.release().context("Unable to release paged range")
	}
}
