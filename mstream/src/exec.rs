//! Benchmark executor

// Imports
use {
	crate::{
		backend::Backend,
		config::Tuning,
		pattern::{AccessKind, AccessOp, Pattern},
		timer::PhaseTimer,
	},
	anyhow::Context,
	mstream_util::MarkerBytes,
	std::{collections::HashMap, thread, time::Duration},
};

/// Executor phase
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Phase {
	/// Warm-up passes, not timed
	Warmup,

	/// Measured passes
	Measured,

	/// All passes done
	Done,
}

/// Benchmark executor.
///
/// Replays the pattern of a rank against a backend.
#[derive(Debug)]
pub struct Executor {
	/// Pattern
	pattern: Pattern,

	/// Warm-up passes
	warmup_passes: usize,

	/// Measured passes
	measured_passes: usize,

	/// Delay before the first measured pass
	stagger: Duration,

	/// Output verifier
	verifier: Option<Verifier>,
}

impl Executor {
	/// Creates a new executor.
	///
	/// The executor sleeps for `stagger` once the measured phase starts.
	pub fn new(pattern: Pattern, tuning: &Tuning, stagger: Duration) -> Self {
		Self {
			pattern,
			warmup_passes: tuning.warmup_iters,
			measured_passes: tuning.measured_iters,
			stagger,
			verifier: tuning.verify.then(Verifier::default),
		}
	}

	/// Returns the phase of pass `pass_idx`
	pub fn phase(&self, pass_idx: usize) -> Phase {
		match pass_idx {
			_ if pass_idx < self.warmup_passes => Phase::Warmup,
			_ if pass_idx < self.warmup_passes + self.measured_passes => Phase::Measured,
			_ => Phase::Done,
		}
	}

	/// Runs all passes against `backend`.
	///
	/// Starts the measured phase of `timer` right before the first measured pass.
	pub fn run(&mut self, backend: &mut dyn Backend, timer: &mut PhaseTimer) -> Result<RunOutput, anyhow::Error> {
		let mut buf = vec![0; self.pattern.chunk_size()];
		let mut ops = 0;

		let mut pass_idx = 0;
		loop {
			let phase = self.phase(pass_idx);
			if phase == Phase::Done {
				break;
			}

			// Note: Timing starts before the stagger, so staggered ranks report the delay too
			if phase == Phase::Measured && !timer.is_measuring() {
				timer.start_measured();
				if !self.stagger.is_zero() {
					tracing::debug!(stagger = ?self.stagger, "Staggering first measured pass");
					thread::sleep(self.stagger);
				}
			}

			tracing::trace!(pass_idx, ?phase, "Starting pass");
			for (step, op) in self.pattern.pass().enumerate() {
				self.access(backend, &mut buf, step, op)
					.with_context(|| format!("Unable to perform step {step} of pass {pass_idx}: {op:?}"))?;
				ops += 1;
			}

			pass_idx += 1;
		}

		Ok(RunOutput { passes: pass_idx, ops })
	}

	fn access(&mut self, backend: &mut dyn Backend, buf: &mut [u8], step: usize, op: AccessOp) -> Result<(), anyhow::Error> {
		let buf = &mut buf[..op.len];
		match op.kind {
			AccessKind::Write => {
				if let Some(verifier) = &mut self.verifier {
					let marker = mstream_util::step_marker(step);
					buf.fill_marker(marker);
					verifier.record(op.offset, marker);
				}
				backend.write(op.offset, buf).context("Unable to write")
			},
			AccessKind::Read => {
				backend.read(op.offset, buf).context("Unable to read")?;
				match &self.verifier {
					Some(verifier) => verifier.check(op.offset, buf),
					None => Ok(()),
				}
			},
		}
	}
}

/// Output of [`Executor::run`]
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct RunOutput {
	/// Passes performed
	pub passes: usize,

	/// Operations performed
	pub ops: usize,
}

/// Output verifier.
///
/// Remembers the last marker written at each offset.
#[derive(Clone, Debug, Default)]
struct Verifier {
	markers: HashMap<usize, u8>,
}

impl Verifier {
	fn record(&mut self, offset: usize, marker: u8) {
		self.markers.insert(offset, marker);
	}

	fn check(&self, offset: usize, data: &[u8]) -> Result<(), anyhow::Error> {
		let Some(&marker) = self.markers.get(&offset) else {
			return Ok(());
		};

		match data.find_non_marker(marker) {
			Some(pos) => anyhow::bail!(
				"Read back {:#04x} at {}, expected marker {marker:#04x}",
				data[pos],
				offset + pos
			),
			None => Ok(()),
		}
	}
}

#[cfg(test)]
mod tests {
	use {
		super::*,
		crate::{backend::RunStats, config::Mode},
	};

	const ALLOC: usize = 64 * 1024;
	const CHUNK: usize = 1024;

	/// Heap backend that records every access
	#[derive(Default)]
	struct Recorder {
		data:   Vec<u8>,
		ops:    Vec<AccessOp>,
		/// Corrupts every read if set
		flip:   bool,
		writes: u64,
	}

	impl Backend for Recorder {
		fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), anyhow::Error> {
			self.data[offset..offset + data.len()].copy_from_slice(data);
			self.ops.push(AccessOp {
				offset,
				len: data.len(),
				kind: AccessKind::Write,
			});
			self.writes += 1;
			Ok(())
		}

		fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), anyhow::Error> {
			buf.copy_from_slice(&self.data[offset..offset + buf.len()]);
			if self.flip {
				buf[0] ^= 0xff;
			}
			self.ops.push(AccessOp {
				offset,
				len: buf.len(),
				kind: AccessKind::Read,
			});
			Ok(())
		}

		fn flush(&mut self) -> Result<(), anyhow::Error> {
			Ok(())
		}

		fn stats(&self) -> RunStats {
			RunStats {
				read_faults:  0,
				write_faults: self.writes,
			}
		}

		fn release(self: Box<Self>) -> Result<(), anyhow::Error> {
			Ok(())
		}
	}

	fn recorder() -> Recorder {
		Recorder {
			data: vec![0; ALLOC],
			..Recorder::default()
		}
	}

	fn tuning(warmup_iters: usize, measured_iters: usize, verify: bool) -> Tuning {
		Tuning {
			warmup_iters,
			measured_iters,
			verify,
			..Tuning::default()
		}
	}

	#[test]
	fn replays_pattern_every_pass() {
		let pattern = Pattern::new(Mode::PseudoRandom, ALLOC, CHUNK, 1).expect("Valid pattern");
		let expected = pattern.pass().collect::<Vec<_>>();

		let mut executor = Executor::new(pattern, &self::tuning(2, 3, false), Duration::ZERO);
		let mut backend = self::recorder();
		let mut timer = PhaseTimer::new();
		let output = executor.run(&mut backend, &mut timer).expect("Run failed");

		assert_eq!(output, RunOutput { passes: 5, ops: 5 * 64 });
		assert!(timer.is_measuring());
		for pass in backend.ops.chunks(expected.len()) {
			assert_eq!(pass, expected);
		}
	}

	#[test]
	fn phases() {
		let pattern = Pattern::new(Mode::Sequential, ALLOC, CHUNK, 0).expect("Valid pattern");
		let executor = Executor::new(pattern, &self::tuning(1, 2, false), Duration::ZERO);
		assert_eq!(executor.phase(0), Phase::Warmup);
		assert_eq!(executor.phase(1), Phase::Measured);
		assert_eq!(executor.phase(2), Phase::Measured);
		assert_eq!(executor.phase(3), Phase::Done);
	}

	#[test]
	fn verification_writes_markers() {
		for &mode in Mode::ALL {
			let pattern = Pattern::new(mode, ALLOC, CHUNK, 0).expect("Valid pattern");
			let mut executor = Executor::new(pattern.clone(), &self::tuning(0, 2, true), Duration::ZERO);
			let mut backend = self::recorder();
			executor
				.run(&mut backend, &mut PhaseTimer::new())
				.unwrap_or_else(|err| panic!("{mode:?}: {err:?}"));

			// Every written chunk holds the marker of the last step that wrote it
			let markers = pattern
				.pass()
				.enumerate()
				.filter(|(_, op)| op.kind == AccessKind::Write)
				.map(|(step, op)| (op.offset, mstream_util::step_marker(step)))
				.collect::<HashMap<_, _>>();
			for (offset, marker) in markers {
				let chunk = &backend.data[offset..offset + CHUNK];
				assert_eq!(chunk.find_non_marker(marker), None, "{mode:?} at {offset}");
			}
		}
	}

	#[test]
	fn verification_catches_corruption() {
		// Note: Only the pseudo-random walks read back chunks they wrote
		for mode in [Mode::PseudoRandom, Mode::Mixed] {
			let pattern = Pattern::new(mode, ALLOC, CHUNK, 0).expect("Valid pattern");
			let mut executor = Executor::new(pattern, &self::tuning(0, 2, true), Duration::ZERO);
			let mut backend = Recorder {
				flip: true,
				..self::recorder()
			};
			assert!(executor.run(&mut backend, &mut PhaseTimer::new()).is_err(), "{mode:?}");
		}
	}

	#[test]
	fn stagger_is_timed() {
		let pattern = Pattern::new(Mode::Sequential, ALLOC, CHUNK, 0).expect("Valid pattern");
		let stagger = Duration::from_millis(20);
		let mut executor = Executor::new(pattern, &self::tuning(1, 1, false), stagger);
		let mut timer = PhaseTimer::new();
		executor.run(&mut self::recorder(), &mut timer).expect("Run failed");

		timer.start_flush();
		timer.stop_flush();
		timer.stop_compute();
		timer.stop_barrier();
		let timestamps = timer.finish().expect("All timestamps recorded");
		assert!(timestamps.compute.elapsed() >= stagger);
	}
}
