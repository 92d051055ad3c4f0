//! User-level pager
//!
//! Manages a byte range backed by a file in fixed-size segments. Segments are
//! faulted in on their first access, optionally reading their contents from
//! the file, and written back on synchronization or when evicted to stay under
//! the residency limit.

// Modules
pub mod policy;

// Exports
pub use self::policy::Residency;

// Imports
use {
	crate::{config::EvictionPolicy, pattern::AccessKind},
	anyhow::Context,
	std::{fs, io, os::unix::fs::FileExt},
};

/// Pager configuration
#[derive(Clone, Debug)]
pub struct PagerConfig {
	/// Size of the range, in bytes
	pub size: usize,

	/// Segment size, in bytes
	pub seg_size: usize,

	/// Whether faults read the existing file contents
	pub read_file: bool,

	/// Eviction policy
	pub policy: EvictionPolicy,

	/// Maximum resident segments.
	///
	/// Unlimited if unset.
	pub max_resident: Option<usize>,
}

/// Pager statistics
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
pub struct PagerStats {
	/// Faults caused by reads
	pub read_faults: u64,

	/// Faults caused by writes
	pub write_faults: u64,

	/// Segments evicted
	pub evictions: u64,

	/// Segments written back to the file
	pub write_backs: u64,
}

/// User-level pager
#[derive(Debug)]
pub struct Pager {
	/// Backing file
	file: fs::File,

	/// Config
	config: PagerConfig,

	/// All segments
	segments: Vec<Segment>,

	/// Resident segments
	residency: Residency,

	/// Statistics
	stats: PagerStats,
}

/// Segment
#[derive(Clone, Debug, Default)]
struct Segment {
	/// Data, if resident
	data: Option<Box<[u8]>>,

	/// Whether the data was modified since it was loaded or written back
	dirty: bool,

	/// Whether the segment was ever written back to the file
	written_back: bool,
}

impl Pager {
	/// Allocates a paged range over `file`
	pub fn allocate(file: fs::File, config: PagerConfig) -> Result<Self, anyhow::Error> {
		anyhow::ensure!(config.size > 0, "Paged range must not be empty");
		anyhow::ensure!(config.seg_size > 0, "Segment size must be non-zero");
		anyhow::ensure!(config.max_resident != Some(0), "Residency limit must be non-zero");

		let segment_count = config.size.div_ceil(config.seg_size);
		tracing::debug!(?config, segment_count, "Allocated paged range");

		Ok(Self {
			file,
			segments: vec![Segment::default(); segment_count],
			residency: Residency::new(config.policy, segment_count),
			config,
			stats: PagerStats::default(),
		})
	}

	/// Returns the statistics
	pub fn stats(&self) -> PagerStats {
		self.stats
	}

	/// Returns the number of resident segments
	pub fn resident(&self) -> usize {
		self.residency.count()
	}

	/// Writes `data` at `offset`
	pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), anyhow::Error> {
		self.check_range(offset, data.len())?;

		let mut done = 0;
		while done < data.len() {
			let (seg_idx, seg_offset, len) = self.locate(offset + done, data.len() - done);
			let segment = self.fault_in(seg_idx, AccessKind::Write)?;
			let seg_data = segment.data.as_mut().context("Segment wasn't resident after fault")?;

			seg_data[seg_offset..seg_offset + len].copy_from_slice(&data[done..done + len]);
			segment.dirty = true;
			done += len;
		}

		Ok(())
	}

	/// Reads into `buf` from `offset`
	pub fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), anyhow::Error> {
		self.check_range(offset, buf.len())?;

		let mut done = 0;
		while done < buf.len() {
			let (seg_idx, seg_offset, len) = self.locate(offset + done, buf.len() - done);
			let segment = self.fault_in(seg_idx, AccessKind::Read)?;
			let seg_data = segment.data.as_ref().context("Segment wasn't resident after fault")?;

			buf[done..done + len].copy_from_slice(&seg_data[seg_offset..seg_offset + len]);
			done += len;
		}

		Ok(())
	}

	/// Writes every dirty resident segment back and syncs the file
	pub fn sync(&mut self) -> Result<(), anyhow::Error> {
		for seg_idx in 0..self.segments.len() {
			self.write_back(seg_idx)
				.with_context(|| format!("Unable to write back segment {seg_idx}"))?;
		}

		self.file.sync_data().context("Unable to sync backing file")
	}

	/// Releases the range.
	///
	/// Dirty segments are discarded, call [`Pager::sync`] first to keep them.
	pub fn release(self) -> Result<(), anyhow::Error> {
		let dirty = self.segments.iter().filter(|segment| segment.dirty).count();
		tracing::debug!(stats = ?self.stats, dirty, "Released paged range");
		Ok(())
	}

	fn check_range(&self, offset: usize, len: usize) -> Result<(), anyhow::Error> {
		anyhow::ensure!(
			offset.checked_add(len).is_some_and(|end| end <= self.config.size),
			"Access of {len} bytes at {offset} is out of range (size {})",
			self.config.size
		);

		Ok(())
	}

	/// Returns the segment containing `pos`, the offset within it, and how
	/// many of `len` bytes lie within it.
	fn locate(&self, pos: usize, len: usize) -> (usize, usize, usize) {
		let seg_idx = pos / self.config.seg_size;
		let seg_offset = pos % self.config.seg_size;
		let seg_len = self.segment_len(seg_idx);

		(seg_idx, seg_offset, len.min(seg_len - seg_offset))
	}

	/// Returns the length of segment `seg_idx`.
	///
	/// Only the last segment may be shorter than the segment size.
	fn segment_len(&self, seg_idx: usize) -> usize {
		let start = seg_idx * self.config.seg_size;
		self.config.seg_size.min(self.config.size - start)
	}

	/// Makes segment `seg_idx` resident, evicting another if at the limit
	fn fault_in(&mut self, seg_idx: usize, kind: AccessKind) -> Result<&mut Segment, anyhow::Error> {
		if self.segments[seg_idx].data.is_some() {
			self.residency.touch(seg_idx);
			return Ok(&mut self.segments[seg_idx]);
		}

		match kind {
			AccessKind::Read => self.stats.read_faults += 1,
			AccessKind::Write => self.stats.write_faults += 1,
		}

		if let Some(max_resident) = self.config.max_resident {
			while self.residency.count() >= max_resident {
				let segments = &self.segments;
				let victim = self
					.residency
					.select_victim(|idx| segments[idx].dirty)
					.context("Residency limit reached with no resident segments")?;
				self.evict(victim)
					.with_context(|| format!("Unable to evict segment {victim}"))?;
			}
		}

		let data = self
			.load(seg_idx)
			.with_context(|| format!("Unable to load segment {seg_idx}"))?;
		let segment = &mut self.segments[seg_idx];
		segment.data = Some(data);
		segment.dirty = false;
		self.residency.insert(seg_idx);

		Ok(segment)
	}

	/// Loads the contents of segment `seg_idx`
	fn load(&self, seg_idx: usize) -> Result<Box<[u8]>, io::Error> {
		let mut data = vec![0; self.segment_len(seg_idx)].into_boxed_slice();
		if self.config.read_file || self.segments[seg_idx].written_back {
			let start = (seg_idx * self.config.seg_size) as u64;

			// Note: Anything past the end of the file stays zeroed
			let mut filled = 0;
			while filled < data.len() {
				match self.file.read_at(&mut data[filled..], start + filled as u64) {
					Ok(0) => break,
					Ok(read) => filled += read,
					Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
					Err(err) => return Err(err),
				}
			}
		}

		Ok(data)
	}

	/// Writes segment `seg_idx` back to the file, if resident and dirty
	fn write_back(&mut self, seg_idx: usize) -> Result<(), io::Error> {
		let segment = &mut self.segments[seg_idx];
		if let (Some(data), true) = (&segment.data, segment.dirty) {
			let start = (seg_idx * self.config.seg_size) as u64;
			self.file.write_all_at(data, start)?;
			segment.dirty = false;
			segment.written_back = true;
			self.stats.write_backs += 1;
		}

		Ok(())
	}

	/// Evicts segment `seg_idx`, writing it back first if dirty
	fn evict(&mut self, seg_idx: usize) -> Result<(), io::Error> {
		self.write_back(seg_idx)?;
		self.segments[seg_idx].data = None;
		self.residency.remove(seg_idx);
		self.stats.evictions += 1;

		Ok(())
	}
}
