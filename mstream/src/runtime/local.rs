//! In-process runtime
//!
//! Every rank is a thread of the current process. Windows are shared memory
//! between the threads, and files are plain rank-private files.

// Imports
use {
	super::{CollectiveFile, Group, StorageHints, Window},
	crate::mapping::Mapping,
	anyhow::Context,
	std::{
		cell::Cell,
		collections::HashMap,
		fs,
		io,
		os::{fd::AsRawFd, unix::fs::FileExt},
		path::{Path, PathBuf},
		sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
		thread,
		time::Duration,
	},
};

/// Interval at which lock waiters check if the group was aborted
const ABORT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// In-process group launcher
#[derive(Debug)]
pub struct LocalGroup;

impl LocalGroup {
	/// Runs `f` on `size` ranks, one thread each, and returns the outputs by rank.
	///
	/// If any rank fails or panics the group is aborted, every pending and future
	/// barrier fails, and the error of the failing rank is returned.
	pub fn launch<T, F>(size: usize, f: F) -> Result<Vec<T>, anyhow::Error>
	where
		T: Send,
		F: Fn(&LocalRank) -> Result<T, anyhow::Error> + Sync,
	{
		anyhow::ensure!(size > 0, "Group must have at least one rank");

		let shared = Arc::new(Shared::new(size));
		let results = thread::scope(|scope| {
			let mut handles = Vec::with_capacity(size);
			for rank in 0..size {
				let rank_shared = Arc::clone(&shared);
				let f = &f;
				let handle = thread::Builder::new()
					.name(format!("rank-{rank}"))
					.spawn_scoped(scope, move || {
						let shared = rank_shared;
						let _guard = AbortOnPanic { shared: &shared, rank };
						let local_rank = LocalRank::new(rank, Arc::clone(&shared));
						let res = f(&local_rank);
						if let Err(err) = &res {
							tracing::debug!(rank, ?err, "Rank failed, aborting group");
							shared.abort(rank);
						}
						res
					});

				match handle {
					Ok(handle) => handles.push(handle),
					Err(err) => {
						// Note: Ranks already running would wait forever on the next barrier otherwise
						shared.abort(rank);
						return Err(anyhow::Error::new(err).context(format!("Unable to spawn rank {rank}")));
					},
				}
			}

			let results = handles
				.into_iter()
				.enumerate()
				.map(|(rank, handle)| match handle.join() {
					Ok(res) => res,
					Err(_) => Err(anyhow::anyhow!("Rank {rank} panicked")),
				})
				.collect::<Vec<_>>();
			Ok(results)
		})?;

		if let Some(origin) = shared.aborted_by() {
			return match results.into_iter().nth(origin) {
				Some(Err(err)) => Err(err.context(format!("Rank {origin} failed"))),
				_ => Err(anyhow::anyhow!("Rank {origin} aborted the group")),
			};
		}

		results.into_iter().collect()
	}
}

/// Aborts the group if the rank panics
struct AbortOnPanic<'a> {
	shared: &'a Shared,
	rank:   usize,
}

impl Drop for AbortOnPanic<'_> {
	fn drop(&mut self) {
		if thread::panicking() {
			self.shared.abort(self.rank);
		}
	}
}

/// State shared by all ranks
#[derive(Debug)]
struct Shared {
	/// Group size
	size: usize,

	/// Barrier state
	barrier: Mutex<BarrierState>,

	/// Barrier condition, notified on every release and abort
	barrier_cond: Condvar,

	/// Partitions of windows being allocated, by window id and rank
	windows: Mutex<HashMap<u64, Vec<Option<Arc<Partition>>>>>,
}

#[derive(Debug)]
struct BarrierState {
	/// Ranks waiting
	waiting: usize,

	/// Barrier generation, incremented on every release
	generation: u64,

	/// Rank that aborted the group
	aborted_by: Option<usize>,
}

impl Shared {
	fn new(size: usize) -> Self {
		Self {
			size,
			barrier: Mutex::new(BarrierState {
				waiting:    0,
				generation: 0,
				aborted_by: None,
			}),
			barrier_cond: Condvar::new(),
			windows: Mutex::new(HashMap::new()),
		}
	}

	fn barrier(&self) -> Result<(), anyhow::Error> {
		let mut state = self::lock(&self.barrier);
		if let Some(origin) = state.aborted_by {
			anyhow::bail!("Group was aborted by rank {origin}");
		}

		state.waiting += 1;
		if state.waiting == self.size {
			state.waiting = 0;
			state.generation += 1;
			self.barrier_cond.notify_all();
			return Ok(());
		}

		let generation = state.generation;
		loop {
			state = self
				.barrier_cond
				.wait(state)
				.unwrap_or_else(PoisonError::into_inner);
			if state.generation != generation {
				return Ok(());
			}
			if let Some(origin) = state.aborted_by {
				anyhow::bail!("Group was aborted by rank {origin}");
			}
		}
	}

	fn abort(&self, rank: usize) {
		let mut state = self::lock(&self.barrier);
		state.aborted_by.get_or_insert(rank);
		self.barrier_cond.notify_all();
	}

	fn aborted_by(&self) -> Option<usize> {
		self::lock(&self.barrier).aborted_by
	}
}

/// Rank of a local group
#[derive(Debug)]
pub struct LocalRank {
	/// Rank
	rank: usize,

	/// Shared state
	shared: Arc<Shared>,

	/// Id of the next window allocated
	next_window_id: Cell<u64>,
}

impl LocalRank {
	fn new(rank: usize, shared: Arc<Shared>) -> Self {
		Self {
			rank,
			shared,
			next_window_id: Cell::new(0),
		}
	}
}

impl Group for LocalRank {
	type File = LocalFile;
	type Window = LocalWindow;

	fn rank(&self) -> usize {
		self.rank
	}

	fn size(&self) -> usize {
		self.shared.size
	}

	fn barrier(&self) -> Result<(), anyhow::Error> {
		self.shared.barrier()
	}

	fn allocate_window(&self, len: usize, hints: Option<&StorageHints>) -> Result<Self::Window, anyhow::Error> {
		let region = match hints {
			Some(hints) => Region::storage(hints, len).context("Unable to allocate storage partition")?,
			None => Region::Heap(vec![0; len].into_boxed_slice()),
		};
		let partition = Arc::new(Partition::new(region));

		// Note: Every rank allocates windows in the same order, so the ids match
		let id = self.next_window_id.get();
		self.next_window_id.set(id + 1);
		self::lock(&self.shared.windows)
			.entry(id)
			.or_insert_with(|| vec![None; self.shared.size])[self.rank] = Some(partition);

		self.barrier().context("Unable to wait for all partitions")?;
		let partitions = self::lock(&self.shared.windows)
			.get(&id)
			.context("Window was already unregistered")?
			.iter()
			.enumerate()
			.map(|(rank, partition)| {
				partition
					.clone()
					.with_context(|| format!("Rank {rank} didn't allocate its partition"))
			})
			.collect::<Result<Vec<_>, anyhow::Error>>()?;

		self.barrier().context("Unable to wait for all ranks to gather partitions")?;
		if self.rank == 0 {
			self::lock(&self.shared.windows).remove(&id);
		}

		tracing::trace!(rank = self.rank, id, len, "Allocated window");
		Ok(LocalWindow {
			rank: self.rank,
			shared: Arc::clone(&self.shared),
			epochs: vec![false; partitions.len()],
			partitions,
		})
	}

	fn open_file(&self, path: &Path) -> Result<Self::File, anyhow::Error> {
		let file = mstream_util::fs::open_file(path, None).with_context(|| format!("Unable to open file {path:?}"))?;
		Ok(LocalFile {
			path: path.to_owned(),
			file,
		})
	}
}

/// Window partition
#[derive(Debug)]
struct Partition {
	/// Memory
	region: Mutex<Region>,

	/// Rank holding the exclusive lock
	owner: Mutex<Option<usize>>,

	/// Notified when the lock is released
	released: Condvar,
}

impl Partition {
	fn new(region: Region) -> Self {
		Self {
			region:   Mutex::new(region),
			owner:    Mutex::new(None),
			released: Condvar::new(),
		}
	}
}

/// Partition memory
#[derive(Debug)]
enum Region {
	/// Heap memory
	Heap(Box<[u8]>),

	/// Shared mapping of a file
	Storage(Mapping),
}

impl Region {
	/// Maps the file described by `hints`
	fn storage(hints: &StorageHints, len: usize) -> Result<Self, anyhow::Error> {
		anyhow::ensure!(
			hints.offset == 0,
			"Storage partitions must start at offset 0, found {}",
			hints.offset
		);
		tracing::debug!(info = ?hints.to_info(), len, "Allocating storage partition");

		let path = &hints.filename;
		let file = mstream_util::fs::open_file(path, None).with_context(|| format!("Unable to open {path:?}"))?;
		if !hints.read_file {
			file.set_len(0).context("Unable to truncate storage file")?;
		}
		file.set_len(len as u64).context("Unable to size storage file")?;

		let mapping = Mapping::shared(&file, len).context("Unable to map storage file")?;
		if hints.unlink {
			fs::remove_file(path).with_context(|| format!("Unable to unlink {path:?}"))?;
		}

		Ok(Self::Storage(mapping))
	}

	fn as_slice(&self) -> &[u8] {
		match self {
			Self::Heap(data) => data,
			Self::Storage(mapping) => mapping.as_slice(),
		}
	}

	fn as_mut_slice(&mut self) -> &mut [u8] {
		match self {
			Self::Heap(data) => data,
			Self::Storage(mapping) => mapping.as_mut_slice(),
		}
	}

	fn sync(&self) -> Result<(), io::Error> {
		match self {
			Self::Heap(_) => Ok(()),
			Self::Storage(mapping) => mapping.flush(),
		}
	}
}

/// Window of a local group
#[derive(Debug)]
pub struct LocalWindow {
	/// Our rank
	rank: usize,

	/// Shared state
	shared: Arc<Shared>,

	/// Partitions, by rank
	partitions: Vec<Arc<Partition>>,

	/// Open access epochs, by target
	epochs: Vec<bool>,
}

impl LocalWindow {
	/// Returns the partition of `target`, checking that we have an epoch open on it
	fn open_partition(&self, target: usize) -> Result<&Partition, anyhow::Error> {
		let partition = self.partition(target)?;
		anyhow::ensure!(
			self.epochs[target],
			"Rank {} accessed partition {target} without an access epoch",
			self.rank
		);

		Ok(partition)
	}

	fn partition(&self, target: usize) -> Result<&Partition, anyhow::Error> {
		self.partitions
			.get(target)
			.map(Arc::as_ref)
			.with_context(|| format!("Target rank {target} is out of range"))
	}
}

impl Window for LocalWindow {
	fn lock_exclusive(&mut self, target: usize) -> Result<(), anyhow::Error> {
		let partition = self.partition(target)?;
		anyhow::ensure!(
			!self.epochs[target],
			"Rank {} already holds an epoch on partition {target}",
			self.rank
		);

		let mut owner = self::lock(&partition.owner);
		while owner.is_some() {
			if let Some(origin) = self.shared.aborted_by() {
				anyhow::bail!("Group was aborted by rank {origin} while waiting for lock");
			}
			(owner, _) = partition
				.released
				.wait_timeout(owner, ABORT_POLL_INTERVAL)
				.unwrap_or_else(PoisonError::into_inner);
		}
		*owner = Some(self.rank);
		drop(owner);

		self.epochs[target] = true;
		Ok(())
	}

	fn unlock(&mut self, target: usize) -> Result<(), anyhow::Error> {
		let partition = self.open_partition(target)?;
		*self::lock(&partition.owner) = None;
		partition.released.notify_all();

		self.epochs[target] = false;
		Ok(())
	}

	fn put(&mut self, target: usize, offset: usize, data: &[u8]) -> Result<(), anyhow::Error> {
		let partition = self.open_partition(target)?;
		let mut region = self::lock(&partition.region);
		let len = region.as_slice().len();
		region
			.as_mut_slice()
			.get_mut(offset..)
			.and_then(|rest| rest.get_mut(..data.len()))
			.with_context(|| format!("Put of {} bytes at {offset} exceeds partition of {len} bytes", data.len()))?
			.copy_from_slice(data);

		Ok(())
	}

	fn get(&mut self, target: usize, offset: usize, buf: &mut [u8]) -> Result<(), anyhow::Error> {
		let partition = self.open_partition(target)?;
		let region = self::lock(&partition.region);
		let src = region
			.as_slice()
			.get(offset..)
			.and_then(|rest| rest.get(..buf.len()))
			.with_context(|| {
				format!(
					"Get of {} bytes at {offset} exceeds partition of {} bytes",
					buf.len(),
					region.as_slice().len()
				)
			})?;
		buf.copy_from_slice(src);

		Ok(())
	}

	fn flush_local(&mut self, target: usize) -> Result<(), anyhow::Error> {
		// Note: Puts and gets complete before returning, so there's nothing pending
		self.open_partition(target).map(|_| ())
	}

	fn sync(&mut self) -> Result<(), anyhow::Error> {
		let partition = self.partition(self.rank)?;
		self::lock(&partition.region)
			.sync()
			.context("Unable to sync partition")
	}

	fn free(mut self) -> Result<(), anyhow::Error> {
		for target in 0..self.epochs.len() {
			if self.epochs[target] {
				tracing::warn!(rank = self.rank, target, "Freeing window with an open epoch");
				self.unlock(target)?;
			}
		}

		self.shared.barrier().context("Unable to wait for all ranks to free window")
	}
}

/// Rank-private file
#[derive(Debug)]
pub struct LocalFile {
	/// Path
	path: PathBuf,

	/// File
	file: fs::File,
}

impl CollectiveFile for LocalFile {
	fn preallocate(&mut self, len: u64) -> Result<(), anyhow::Error> {
		let len_off = libc::off_t::try_from(len).context("File length doesn't fit an offset")?;

		// SAFETY: The descriptor is valid while `self.file` is alive
		let res = unsafe { libc::posix_fallocate(self.file.as_raw_fd(), 0, len_off) };
		match res {
			0 => Ok(()),
			libc::EOPNOTSUPP | libc::EINVAL => {
				tracing::debug!(path = ?self.path, "File system doesn't support preallocation, resizing instead");
				if self.file.metadata().context("Unable to get file metadata")?.len() < len {
					self.file.set_len(len).context("Unable to resize file")?;
				}
				Ok(())
			},
			_ => Err(io::Error::from_raw_os_error(res)).with_context(|| format!("Unable to preallocate {:?}", self.path)),
		}
	}

	fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), anyhow::Error> {
		self.file
			.write_all_at(data, offset)
			.with_context(|| format!("Unable to write {} bytes at {offset}", data.len()))
	}

	fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), anyhow::Error> {
		let len = buf.len();
		self.file
			.read_exact_at(buf, offset)
			.with_context(|| format!("Unable to read {len} bytes at {offset}"))
	}

	fn sync(&mut self) -> Result<(), anyhow::Error> {
		self.file.sync_all().context("Unable to sync file")
	}

	fn close(self) -> Result<(), anyhow::Error> {
		tracing::trace!(path = ?self.path, "Closing file");
		drop(self.file);
		Ok(())
	}
}

/// Locks `mutex`, ignoring poisoning.
///
/// A rank that panics aborts the whole group, so the data is never observed in a bad state.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
	use {
		super::*,
		std::sync::atomic::{self, AtomicUsize},
	};

	#[test]
	fn outputs_by_rank() {
		let ranks = LocalGroup::launch(4, |group| Ok((group.rank(), group.size()))).expect("Launch failed");
		assert_eq!(ranks, [(0, 4), (1, 4), (2, 4), (3, 4)]);
	}

	#[test]
	fn barrier_waits_for_everyone() {
		let arrived = AtomicUsize::new(0);
		LocalGroup::launch(6, |group| {
			for round in 1..=3 {
				arrived.fetch_add(1, atomic::Ordering::SeqCst);
				group.barrier()?;
				assert!(arrived.load(atomic::Ordering::SeqCst) >= round * group.size());
				group.barrier()?;
			}
			Ok(())
		})
		.expect("Launch failed");
	}

	#[test]
	fn failure_aborts_group() {
		let err = LocalGroup::launch(4, |group| {
			if group.rank() == 2 {
				anyhow::bail!("Rank 2 is broken");
			}
			group.barrier()?;
			Ok(())
		})
		.expect_err("Launch should fail");

		let msg = format!("{err:?}");
		assert!(msg.contains("Rank 2 failed"), "{msg}");
		assert!(msg.contains("Rank 2 is broken"), "{msg}");
	}

	#[test]
	fn panic_aborts_group() {
		let err = LocalGroup::launch(3, |group| {
			if group.rank() == 0 {
				panic!("Rank 0 panicking");
			}
			group.barrier()?;
			Ok(())
		})
		.expect_err("Launch should fail");

		assert!(format!("{err:?}").contains("Rank 0 panicked"));
	}

	#[test]
	fn exclusive_lock_serializes() {
		const ROUNDS: u64 = 100;

		let totals = LocalGroup::launch(4, |group| {
			let mut window = group.allocate_window(8, None)?;
			for _ in 0..ROUNDS {
				window.lock_exclusive(0)?;
				let mut buf = [0; 8];
				window.get(0, 0, &mut buf)?;
				window.put(0, 0, &(u64::from_ne_bytes(buf) + 1).to_ne_bytes())?;
				window.flush_local(0)?;
				window.unlock(0)?;
			}
			group.barrier()?;

			let mut buf = [0; 8];
			window.lock_exclusive(0)?;
			window.get(0, 0, &mut buf)?;
			window.unlock(0)?;
			window.free()?;
			Ok(u64::from_ne_bytes(buf))
		})
		.expect("Launch failed");

		assert!(totals.iter().all(|&total| total == 4 * ROUNDS), "{totals:?}");
	}

	#[test]
	fn window_partitions_are_per_rank() {
		LocalGroup::launch(3, |group| {
			let rank = group.rank();
			let mut window = group.allocate_window(64, None)?;

			window.lock_exclusive(rank)?;
			window.put(rank, 10, &[rank as u8 + 1; 16])?;
			window.unlock(rank)?;
			group.barrier()?;

			let next = (rank + 1) % group.size();
			let mut buf = [0; 16];
			window.lock_exclusive(next)?;
			window.get(next, 10, &mut buf)?;
			assert!(window.put(next, 60, &[0; 8]).is_err());
			window.unlock(next)?;
			assert_eq!(buf, [next as u8 + 1; 16]);

			// No epoch, no access
			assert!(window.get(next, 0, &mut buf).is_err());
			window.free()
		})
		.expect("Launch failed");
	}

	#[test]
	fn storage_window_reaches_file() {
		let tmp = tempfile::tempdir().expect("Unable to create temp dir");
		let path = tmp.path().join("window.tmp");

		LocalGroup::launch(1, |group| {
			let hints = StorageHints::new(&path, 4096);
			let mut window = group.allocate_window(8192, Some(&hints))?;
			window.lock_exclusive(0)?;
			window.put(0, 4096, b"window")?;
			window.flush_local(0)?;
			window.sync()?;
			window.unlock(0)?;
			window.free()
		})
		.expect("Launch failed");

		let contents = fs::read(&path).expect("Unable to read file");
		assert_eq!(contents.len(), 8192);
		assert_eq!(&contents[4096..4102], b"window");
	}

	#[test]
	fn file_roundtrip() {
		let tmp = tempfile::tempdir().expect("Unable to create temp dir");
		LocalGroup::launch(2, |group| {
			let path = tmp.path().join(format!("p{}.tmp", group.rank()));
			let mut file = group.open_file(&path)?;
			file.preallocate(16384)?;
			file.write_at(8192, b"positioned")?;
			file.sync()?;

			let mut buf = [0; 10];
			file.read_at(8192, &mut buf)?;
			assert_eq!(&buf, b"positioned");
			file.close()?;

			assert!(fs::metadata(&path)?.len() >= 16384);
			Ok(())
		})
		.expect("Launch failed");
	}
}
