//! File-system helpers

// Imports
use std::{
	fs,
	io,
	os::unix::fs::OpenOptionsExt,
	path::Path,
};

/// Creates a directory, along with any missing parents.
///
/// Does nothing if it already exists.
pub fn create_dir(path: &Path) -> Result<(), io::Error> {
	fs::create_dir_all(path)
}

/// Deletes a directory and everything within it.
///
/// Does nothing if it doesn't exist.
pub fn delete_dir(path: &Path) -> Result<(), io::Error> {
	match fs::remove_dir_all(path) {
		Ok(()) => Ok(()),
		Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
		Err(err) => Err(err),
	}
}

/// Opens a file for reading and writing, creating it (owner-only permissions) if missing.
///
/// If `size` is set and the file has a different length, it is resized to it.
pub fn open_file(path: &Path, size: Option<u64>) -> Result<fs::File, io::Error> {
	let file = fs::OpenOptions::new()
		.read(true)
		.write(true)
		.create(true)
		.mode(0o600)
		.open(path)?;

	if let Some(size) = size {
		let len = file.metadata()?.len();
		if len != size {
			file.set_len(size)?;
		}
	}

	Ok(file)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn create_and_delete_nested() {
		let tmp = tempfile::tempdir().expect("Unable to create temp dir");
		let nested = tmp.path().join("a/b/c");

		create_dir(&nested).expect("Unable to create");
		create_dir(&nested).expect("Creating twice should be fine");
		assert!(nested.is_dir());

		delete_dir(&tmp.path().join("a")).expect("Unable to delete");
		assert!(!tmp.path().join("a").exists());
		delete_dir(&tmp.path().join("a")).expect("Deleting twice should be fine");
	}

	#[test]
	fn open_file_resizes() {
		let tmp = tempfile::tempdir().expect("Unable to create temp dir");
		let path = tmp.path().join("file.tmp");

		let file = open_file(&path, Some(8192)).expect("Unable to open");
		assert_eq!(file.metadata().expect("Unable to stat").len(), 8192);

		let file = open_file(&path, None).expect("Unable to reopen");
		assert_eq!(file.metadata().expect("Unable to stat").len(), 8192);

		let file = open_file(&path, Some(4096)).expect("Unable to reopen");
		assert_eq!(file.metadata().expect("Unable to stat").len(), 4096);
	}
}
