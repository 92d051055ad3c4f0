//! Window backends

// Imports
use {
	super::Backend,
	crate::runtime::{Group, StorageHints, Window},
	anyhow::Context,
};

/// Our own partition of a window, locked exclusively for the whole run
#[derive(Debug)]
pub struct WindowBackend<W> {
	/// Window
	window: W,

	/// Our rank
	rank: usize,
}

impl<W: Window> WindowBackend<W> {
	/// Collectively allocates a window with a partition of `size` bytes and locks our partition
	pub fn acquire<G>(group: &G, size: usize, hints: Option<&StorageHints>) -> Result<Self, anyhow::Error>
	where
		G: Group<Window = W>,
	{
		let rank = group.rank();
		let mut window = group
			.allocate_window(size, hints)
			.with_context(|| format!("Unable to allocate window of {size} bytes"))?;
		window
			.lock_exclusive(rank)
			.context("Unable to lock own partition")?;

		Ok(Self { window, rank })
	}
}

impl<W: Window> Backend for WindowBackend<W> {
	fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), anyhow::Error> {
		self.window
			.put(self.rank, offset, data)
			.context("Unable to put into window")?;
		self.window.flush_local(self.rank).context("Unable to complete put")
	}

	fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), anyhow::Error> {
		self.window
			.get(self.rank, offset, buf)
			.context("Unable to get from window")?;
		self.window.flush_local(self.rank).context("Unable to complete get")
	}

	fn flush(&mut self) -> Result<(), anyhow::Error> {
		self.window.sync().context("Unable to sync window")
	}

	fn release(mut self: Box<Self>) -> Result<(), anyhow::Error> {
		self.window.unlock(self.rank).context("Unable to unlock own partition")?;
		self.window.free().context("Unable to free window")
	}
}
