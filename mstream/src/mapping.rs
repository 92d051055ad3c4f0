//! Memory mappings

// Imports
use std::{
	fmt,
	fs,
	io,
	mem::ManuallyDrop,
	os::fd::AsRawFd,
	ptr::{self, NonNull},
	slice,
};

/// Protection of every mapping
const PROT: libc::c_int = libc::PROT_READ | libc::PROT_WRITE;

/// Returns the page size of the system
pub fn page_size() -> usize {
	// SAFETY: `sysconf` has no preconditions
	let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
	match usize::try_from(page_size) {
		Ok(page_size) if page_size > 0 => page_size,
		_ => 4096,
	}
}

/// Memory mapping.
///
/// Unmapped on drop.
pub struct Mapping {
	/// Start of the mapping
	ptr: NonNull<u8>,

	/// Length, in bytes
	len: usize,
}

// SAFETY: The mapping is exclusively owned, and all accesses go through `&self` / `&mut self`.
unsafe impl Send for Mapping {}

// SAFETY: See above, shared references only allow reads.
unsafe impl Sync for Mapping {}

impl Mapping {
	/// Maps `len` bytes of private, zero-filled, anonymous memory
	pub fn anonymous(len: usize) -> Result<Self, io::Error> {
		Self::map(len, libc::MAP_PRIVATE | libc::MAP_NORESERVE | libc::MAP_ANONYMOUS, -1)
	}

	/// Maps the first `len` bytes of `file`, shared.
	///
	/// The file may be closed afterwards.
	pub fn shared(file: &fs::File, len: usize) -> Result<Self, io::Error> {
		Self::map(len, libc::MAP_SHARED | libc::MAP_NORESERVE, file.as_raw_fd())
	}

	fn map(len: usize, flags: libc::c_int, fd: libc::c_int) -> Result<Self, io::Error> {
		if len == 0 {
			return Err(io::Error::new(io::ErrorKind::InvalidInput, "Cannot map an empty range"));
		}

		// SAFETY: We're asking for a new mapping, which doesn't alias any existing memory.
		let ptr = unsafe { libc::mmap(ptr::null_mut(), len, PROT, flags, fd, 0) };
		if ptr == libc::MAP_FAILED {
			return Err(io::Error::last_os_error());
		}

		let ptr = NonNull::new(ptr.cast::<u8>())
			.ok_or_else(|| io::Error::new(io::ErrorKind::Other, "Mapping returned a null pointer"))?;
		Ok(Self { ptr, len })
	}

	/// Returns the mapped bytes
	pub fn as_slice(&self) -> &[u8] {
		// SAFETY: The mapping is valid for reads of `len` bytes while we're alive.
		unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
	}

	/// Returns the mapped bytes, mutably
	pub fn as_mut_slice(&mut self) -> &mut [u8] {
		// SAFETY: The mapping is valid for writes of `len` bytes while we're alive,
		//         and `&mut self` guarantees we're the only ones accessing it.
		unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
	}

	/// Writes `value` at `offset` with a volatile write, so the access is never elided.
	///
	/// # Panics
	/// Panics if `offset` is out of bounds.
	pub fn touch(&mut self, offset: usize, value: u8) {
		assert!(offset < self.len, "Offset {offset} out of bounds (length {})", self.len);

		// SAFETY: `offset` is within the mapping, which is valid for writes.
		unsafe {
			ptr::write_volatile(self.ptr.as_ptr().add(offset), value);
		}
	}

	/// Synchronously flushes dirty pages to the backing store
	pub fn flush(&self) -> Result<(), io::Error> {
		// SAFETY: The range is exactly our mapping.
		let res = unsafe { libc::msync(self.ptr.as_ptr().cast(), self.len, libc::MS_SYNC) };
		match res {
			0 => Ok(()),
			_ => Err(io::Error::last_os_error()),
		}
	}

	/// Unmaps this mapping, returning any error
	pub fn unmap(self) -> Result<(), io::Error> {
		let this = ManuallyDrop::new(self);

		// SAFETY: The range is exactly our mapping and, since we're consumed,
		//         no references to it remain.
		let res = unsafe { libc::munmap(this.ptr.as_ptr().cast(), this.len) };
		match res {
			0 => Ok(()),
			_ => Err(io::Error::last_os_error()),
		}
	}
}

impl Drop for Mapping {
	fn drop(&mut self) {
		// SAFETY: See `unmap`
		let res = unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.len) };
		if res != 0 {
			tracing::warn!(err = %io::Error::last_os_error(), "Unable to unmap memory");
		}
	}
}

impl fmt::Debug for Mapping {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Mapping")
			.field("ptr", &self.ptr)
			.field("len", &self.len)
			.finish()
	}
}
