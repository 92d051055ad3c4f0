//! Phase timer

// Imports
use {
	anyhow::Context,
	std::time::{Duration, Instant},
};

/// Time span
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Span {
	/// Start
	pub start: Instant,

	/// Stop
	pub stop: Instant,
}

impl Span {
	/// Returns the elapsed time of this span
	pub fn elapsed(&self) -> Duration {
		self.stop.saturating_duration_since(self.start)
	}
}

/// Timestamps of a run
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct PhaseTimestamps {
	/// From the first measured pass until after the flush
	pub compute: Span,

	/// The flush alone
	pub flush: Span,

	/// From the first measured pass until after the barrier following the flush
	pub barrier: Span,
}

/// Phase timer.
///
/// Records the instants of a run, in order.
#[derive(Clone, Debug, Default)]
pub struct PhaseTimer {
	measured_start: Option<Instant>,
	flush_start:    Option<Instant>,
	flush_stop:     Option<Instant>,
	compute_stop:   Option<Instant>,
	barrier_stop:   Option<Instant>,
}

impl PhaseTimer {
	/// Creates a new timer
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns if the measured phase has started
	pub fn is_measuring(&self) -> bool {
		self.measured_start.is_some()
	}

	/// Starts the measured phase.
	///
	/// Starts both the compute and barrier-inclusive spans.
	pub fn start_measured(&mut self) {
		self.measured_start = Some(Instant::now());
	}

	/// Starts the flush
	pub fn start_flush(&mut self) {
		self.flush_start = Some(Instant::now());
	}

	/// Stops the flush
	pub fn stop_flush(&mut self) {
		self.flush_stop = Some(Instant::now());
	}

	/// Stops the compute span
	pub fn stop_compute(&mut self) {
		self.compute_stop = Some(Instant::now());
	}

	/// Stops the barrier-inclusive span
	pub fn stop_barrier(&mut self) {
		self.barrier_stop = Some(Instant::now());
	}

	/// Returns all timestamps.
	///
	/// Fails if any of them weren't recorded.
	pub fn finish(&self) -> Result<PhaseTimestamps, anyhow::Error> {
		let start = self.measured_start.context("Measured phase never started")?;
		let flush_start = self.flush_start.context("Flush never started")?;
		let flush_stop = self.flush_stop.context("Flush never stopped")?;
		let compute_stop = self.compute_stop.context("Compute span never stopped")?;
		let barrier_stop = self.barrier_stop.context("Barrier span never stopped")?;

		Ok(PhaseTimestamps {
			compute: Span {
				start,
				stop: compute_stop,
			},
			flush:   Span {
				start: flush_start,
				stop:  flush_stop,
			},
			barrier: Span {
				start,
				stop: barrier_stop,
			},
		})
	}
}

#[cfg(test)]
mod tests {
	use {super::*, std::thread};

	#[test]
	fn spans_nest() {
		let mut timer = PhaseTimer::new();
		assert!(!timer.is_measuring());
		timer.start_measured();
		assert!(timer.is_measuring());
		thread::sleep(Duration::from_millis(2));
		timer.start_flush();
		thread::sleep(Duration::from_millis(1));
		timer.stop_flush();
		timer.stop_compute();
		thread::sleep(Duration::from_millis(1));
		timer.stop_barrier();

		let timestamps = timer.finish().expect("All timestamps recorded");
		assert_eq!(timestamps.compute.start, timestamps.barrier.start);
		assert!(timestamps.flush.elapsed() <= timestamps.compute.elapsed());
		assert!(timestamps.compute.elapsed() <= timestamps.barrier.elapsed());
		assert!(timestamps.compute.elapsed() >= Duration::from_millis(3));
	}

	#[test]
	fn missing_timestamps_fail() {
		let mut timer = PhaseTimer::new();
		assert!(timer.finish().is_err());

		timer.start_measured();
		timer.start_flush();
		timer.stop_flush();
		timer.stop_compute();
		assert!(timer.finish().is_err());
	}
}
