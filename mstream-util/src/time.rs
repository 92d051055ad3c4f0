//! Time units

// Imports
use std::time::Duration;

/// Unit in which elapsed times are reported
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum TimeUnit {
	/// Nanoseconds
	Nanos,

	/// Microseconds
	Micros,

	/// Milliseconds
	Millis,

	/// Seconds
	Secs,
}

impl TimeUnit {
	/// Number of nano-seconds per micro-second
	pub const NANOS_PER_MICRO: u64 = 1_000;
	/// Number of nano-seconds per milli-second
	pub const NANOS_PER_MILLI: u64 = 1_000_000;
	/// Number of nano-seconds per second
	pub const NANOS_PER_SEC: u64 = 1_000_000_000;

	/// Returns the number of nano-seconds in one of this unit
	#[must_use]
	pub const fn nanos(self) -> u64 {
		match self {
			Self::Nanos => 1,
			Self::Micros => Self::NANOS_PER_MICRO,
			Self::Millis => Self::NANOS_PER_MILLI,
			Self::Secs => Self::NANOS_PER_SEC,
		}
	}

	/// Returns `duration` expressed in this unit
	#[must_use]
	pub fn of(self, duration: Duration) -> f64 {
		duration.as_nanos() as f64 / self.nanos() as f64
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn converts_between_units() {
		let duration = Duration::from_millis(1500);
		assert_eq!(TimeUnit::Secs.of(duration), 1.5);
		assert_eq!(TimeUnit::Millis.of(duration), 1500.0);
		assert_eq!(TimeUnit::Micros.of(duration), 1_500_000.0);
		assert_eq!(TimeUnit::Nanos.of(duration), 1_500_000_000.0);
	}
}
