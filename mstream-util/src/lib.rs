//! Utilities

// Modules
pub mod fs;
pub mod logger;
pub mod time;

// Exports
pub use time::TimeUnit;

/// Number of bytes in a mebibyte
pub const MIB: f64 = 1048576.0;

/// Returns the marker byte written by step `step` of a pass.
///
/// Steps start at `0`, markers at `1`, wrapping after `255`.
#[must_use]
pub const fn step_marker(step: usize) -> u8 {
	(step.wrapping_add(1) % 256) as u8
}

/// Extension trait for byte slices filled with a single marker byte
#[extend::ext(name = MarkerBytes)]
pub impl [u8] {
	/// Fills this slice with `marker`
	fn fill_marker(&mut self, marker: u8) {
		self.fill(marker);
	}

	/// Returns the position of the first byte that isn't `marker`
	fn find_non_marker(&self, marker: u8) -> Option<usize> {
		self.iter().position(|&byte| byte != marker)
	}
}
